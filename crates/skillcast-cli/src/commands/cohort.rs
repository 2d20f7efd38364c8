//! The `skillcast cohort` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use skillcast_core::engine::{CohortEngine, ProgressReporter};
use skillcast_core::report::{CohortReport, ForecastOutcome, ParticipantReport};
use skillcast_report::html::write_html_report;
use skillcast_report::tables::write_cohort_csv;

use super::{load, pct};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_participant_start(&self, participant_id: &str) {
        eprintln!("  Starting: {participant_id}");
    }

    fn on_participant_complete(&self, report: &ParticipantReport) {
        let forecast = match &report.forecast {
            ForecastOutcome::Available(f) => format!(
                "forecast {}",
                pct(f.last_point().map(|pt| pt.point_estimate))
            ),
            other => format!("forecast {}", other.status()),
        };
        eprintln!(
            "  Done: {} [{} assessments] {}",
            report.participant.id, report.summary.count, forecast
        );
    }

    fn on_participant_error(&self, participant_id: &str, error: &str) {
        eprintln!("  ERROR: {participant_id}: {error}");
    }

    fn on_cohort_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} analysed, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    data_path: PathBuf,
    output: Option<PathBuf>,
    format: String,
    parallelism: Option<usize>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, dataset) = load(&data_path, config_path)?;

    let mut engine_config = config.engine_config();
    if let Some(p) = parallelism {
        anyhow::ensure!(p >= 1, "parallelism must be at least 1");
        engine_config.parallelism = p;
    }
    let output = output.unwrap_or_else(|| config.output_dir.clone());

    eprintln!(
        "skillcast v{} - Analysing {} participants, {} assessments",
        env!("CARGO_PKG_VERSION"),
        dataset.all_participants().len(),
        dataset.assessments.len()
    );
    eprintln!();

    let engine = CohortEngine::new(engine_config);
    let report = engine.run(&dataset, &ConsoleReporter).await?;

    print_summary(&report);

    // Save outputs
    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");

    let formats: Vec<&str> = if format == "all" {
        vec!["json", "markdown", "html", "csv"]
    } else {
        format.split(',').map(str::trim).collect()
    };

    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "markdown" | "md" => {
                let path = output.join(format!("report-{timestamp}.md"));
                std::fs::write(&path, report.to_markdown())?;
                eprintln!("Markdown report: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            "csv" => {
                let dir = output.join(format!("csv-{timestamp}"));
                for path in write_cohort_csv(&report, &dir)? {
                    eprintln!("CSV export: {}", path.display());
                }
            }
            _ => {
                eprintln!("Unknown format: {fmt}");
            }
        }
    }

    Ok(())
}

fn print_summary(report: &CohortReport) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec![
        "Participant".to_string(),
        "Assessments".to_string(),
        "Mean".to_string(),
        "Recent".to_string(),
        "Latest".to_string(),
        format!("Forecast +{}d", report.forecast_settings.horizon_days),
        "Band".to_string(),
    ]);

    for p in &report.participants {
        let s = &p.summary;
        let latest = p.series.last().map(|a| a.total_percent());
        let (forecast, band) = match &p.forecast {
            ForecastOutcome::Available(f) => match f.last_point() {
                Some(pt) => (
                    format!("{:.1}%", pt.point_estimate),
                    format!("{:.1} to {:.1}", pt.lower_bound, pt.upper_bound),
                ),
                None => ("-".to_string(), "-".to_string()),
            },
            ForecastOutcome::Unavailable { .. } => ("n/a".to_string(), "-".to_string()),
            ForecastOutcome::Failed { .. } => ("failed".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(&p.participant.name),
            Cell::new(s.count),
            Cell::new(pct(s.mean_percent)),
            Cell::new(pct(s.recent_mean)),
            Cell::new(pct(latest)),
            Cell::new(forecast),
            Cell::new(band),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!(
        "Population: {} participants, mean total {:.1}%",
        report.population.participant_count, report.population.mean_total_percent
    );
}
