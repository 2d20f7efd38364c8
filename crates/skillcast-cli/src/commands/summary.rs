//! The `skillcast summary` command.

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::{Cell, Table};
use serde::Serialize;

use skillcast_core::model::{Category, Participant};
use skillcast_core::series::{self, ParticipantSeries, SeriesSummary};

use super::{load, pct};

#[derive(Serialize)]
struct SummaryRow<'a> {
    participant: &'a Participant,
    summary: SeriesSummary,
}

pub fn execute(
    data_path: PathBuf,
    participant: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    format: String,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, dataset) = load(&data_path, config_path)?;

    let mut grouped = series::group_by_participant(dataset.assessments.iter().cloned());
    let mut participants = dataset.all_participants();
    if let Some(id) = &participant {
        participants.retain(|p| &p.id == id);
        anyhow::ensure!(
            !participants.is_empty(),
            "participant '{id}' not found in dataset {}",
            dataset.name
        );
    }

    let rows: Vec<(SummaryRow<'_>, ParticipantSeries)> = participants
        .iter()
        .map(|p| -> Result<(SummaryRow<'_>, ParticipantSeries)> {
            let series = series::between(
                &grouped.remove(&p.id).unwrap_or_default(),
                from.unwrap_or(NaiveDate::MIN),
                to.unwrap_or(NaiveDate::MAX),
            )?;
            let summary = series::summarize(&series, config.rolling_window, config.recent_window);
            Ok((
                SummaryRow {
                    participant: p,
                    summary,
                },
                series,
            ))
        })
        .collect::<Result<_>>()?;

    match format.as_str() {
        "json" => {
            let out: Vec<&SummaryRow<'_>> = rows.iter().map(|(row, _)| row).collect();
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        _ => {
            println!("Dataset: {}", dataset.name);
            println!("{}", overview_table(&rows));
            if participant.is_some() {
                for (row, series) in &rows {
                    print_history(row, series);
                }
            }
        }
    }

    Ok(())
}

fn overview_table(rows: &[(SummaryRow<'_>, ParticipantSeries)]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Participant",
        "Assessments",
        "First",
        "Last",
        "Mean",
        "Recent",
        "Best",
        "Worst",
    ]);

    for (row, _) in rows {
        let s = &row.summary;
        let date = |d: Option<NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());
        table.add_row(vec![
            Cell::new(&row.participant.name),
            Cell::new(s.count),
            Cell::new(date(s.first_date)),
            Cell::new(date(s.last_date)),
            Cell::new(pct(s.mean_percent)),
            Cell::new(pct(s.recent_mean)),
            Cell::new(pct(s.best.as_ref().map(|m| m.total_percent))),
            Cell::new(pct(s.worst.as_ref().map(|m| m.total_percent))),
        ]);
    }
    table
}

fn print_history(row: &SummaryRow<'_>, series: &ParticipantSeries) {
    let s = &row.summary;
    println!("\n{} ({})", row.participant.name, row.participant.id);

    let mut history = Table::new();
    history.set_header(vec![
        "Date".to_string(),
        "Total".to_string(),
        format!("Rolling ({})", s.rolling_window),
        "Change".to_string(),
    ]);
    for ((a, mean), delta) in series.iter().zip(&s.rolling_mean).zip(&s.deltas) {
        history.add_row(vec![
            Cell::new(a.date()),
            Cell::new(format!("{:.1}%", a.total_percent())),
            Cell::new(pct(*mean)),
            Cell::new(delta.map_or_else(|| "-".to_string(), |d| format!("{d:+.1}"))),
        ]);
    }
    println!("{history}");

    let mut categories = Table::new();
    categories.set_header(vec!["Category", "Mean"]);
    for category in Category::ALL {
        categories.add_row(vec![
            Cell::new(category.label()),
            Cell::new(pct(s.category_trend.get(&category).copied())),
        ]);
    }
    println!("{categories}");
}
