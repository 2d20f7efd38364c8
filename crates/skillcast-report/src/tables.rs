//! CSV exports.
//!
//! One row per forecast day or per assessment, for spreadsheets and plotting
//! tools.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use skillcast_core::aggregate;
use skillcast_core::forecast::{Forecast, ForecastPoint};
use skillcast_core::model::Category;
use skillcast_core::report::{CohortReport, ParticipantReport};

/// Write `date,point_estimate,lower_bound,upper_bound` rows.
pub fn write_forecast_csv<W: Write>(forecast: &Forecast, writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for point in &forecast.points {
        out.serialize(point)?;
    }
    out.flush()?;
    Ok(())
}

/// Forecast CSV as a string.
pub fn forecast_csv_string(forecast: &Forecast) -> Result<String> {
    let mut buf = Vec::new();
    write_forecast_csv(forecast, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}

#[derive(Serialize)]
struct CohortForecastRow<'a> {
    participant: &'a str,
    date: chrono::NaiveDate,
    point_estimate: f64,
    lower_bound: f64,
    upper_bound: f64,
}

impl<'a> CohortForecastRow<'a> {
    fn new(participant: &'a str, point: &ForecastPoint) -> Self {
        Self {
            participant,
            date: point.date,
            point_estimate: point.point_estimate,
            lower_bound: point.lower_bound,
            upper_bound: point.upper_bound,
        }
    }
}

/// Forecast rows for every participant that has one.
pub fn write_cohort_forecasts_csv<W: Write>(
    participants: &[ParticipantReport],
    writer: W,
) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    for p in participants {
        if let Some(forecast) = p.forecast.forecast() {
            for point in &forecast.points {
                out.serialize(CohortForecastRow::new(&p.participant.id, point))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn assessment_header() -> Vec<String> {
    let mut header: Vec<String> = [
        "participant",
        "date",
        "total_achieved",
        "total_maximum",
        "total_percent",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(Category::ALL.iter().map(|c| format!("{}_percent", c.key())));
    header
}

/// One row per assessment with totals and per-category percentages.
pub fn write_assessments_csv<W: Write>(participants: &[ParticipantReport], writer: W) -> Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    out.write_record(assessment_header())?;

    for p in participants {
        for a in p.series.iter() {
            let mut record = vec![
                p.participant.id.clone(),
                a.date().to_string(),
                a.total_achieved().to_string(),
                a.total_maximum().to_string(),
                format!("{:.2}", a.total_percent()),
            ];
            record.extend(
                aggregate::category_percents(a.scores())
                    .values()
                    .map(|v| format!("{v:.2}")),
            );
            out.write_record(&record)?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Write `assessments.csv` and `forecasts.csv` into `dir`.
pub fn write_cohort_csv(report: &CohortReport, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let assessments = dir.join("assessments.csv");
    let file = std::fs::File::create(&assessments)
        .with_context(|| format!("failed to create {}", assessments.display()))?;
    write_assessments_csv(&report.participants, file)?;

    let forecasts = dir.join("forecasts.csv");
    let file = std::fs::File::create(&forecasts)
        .with_context(|| format!("failed to create {}", forecasts.display()))?;
    write_cohort_forecasts_csv(&report.participants, file)?;

    Ok(vec![assessments, forecasts])
}
