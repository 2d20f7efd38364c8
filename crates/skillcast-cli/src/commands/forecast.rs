//! The `skillcast forecast` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use skillcast_core::forecast::{Forecast, ForecastEngine, ForecastModelKind};
use skillcast_core::model::Participant;
use skillcast_core::report::ForecastOutcome;
use skillcast_core::series;
use skillcast_report::tables::forecast_csv_string;

use super::{emit, load};

#[allow(clippy::too_many_arguments)]
pub fn execute(
    data_path: PathBuf,
    participant_id: String,
    horizon: Option<u32>,
    model: Option<String>,
    level: Option<f64>,
    format: String,
    out: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let (config, dataset) = load(&data_path, config_path)?;

    // Command-line flags take precedence over the config file.
    let mut settings = config.forecast;
    if let Some(h) = horizon {
        settings.horizon_days = h;
    }
    if let Some(m) = &model {
        settings.model = m
            .parse::<ForecastModelKind>()
            .map_err(|e| anyhow::anyhow!(e))?;
    }
    if let Some(l) = level {
        anyhow::ensure!(
            l > 0.0 && l < 1.0,
            "level must be between 0 and 1 (exclusive), got {l}"
        );
        settings.interval_level = l;
    }

    let series = series::order(dataset.assessments_for(&participant_id));
    let participant = match dataset.participant(&participant_id) {
        Some(p) => p.clone(),
        None if !series.is_empty() => Participant::anonymous(&participant_id),
        None => anyhow::bail!(
            "participant '{participant_id}' not found in dataset {}",
            dataset.name
        ),
    };

    let engine = ForecastEngine::new(settings);
    let outcome = ForecastOutcome::from_result(engine.forecast(&series));

    if let ForecastOutcome::Failed { message } = &outcome {
        anyhow::bail!("forecast for {participant_id} failed: {message}");
    }

    let content = match (format.as_str(), &outcome) {
        ("json", _) => format!("{}\n", serde_json::to_string_pretty(&outcome)?),
        ("csv", ForecastOutcome::Available(forecast)) => forecast_csv_string(forecast)?,
        ("csv", _) => anyhow::bail!(
            "no forecast available for {participant_id}: at least two assessments on distinct dates are needed"
        ),
        (_, ForecastOutcome::Available(forecast)) => render_text(&participant, forecast),
        (_, _) => format!(
            "{} ({}): no forecast available ({} assessment(s) on {} date(s))\n",
            participant.name,
            participant.id,
            series.len(),
            series.distinct_dates()
        ),
    };

    emit(&content, out.as_deref())
}

fn render_text(participant: &Participant, forecast: &Forecast) -> String {
    let d = &forecast.diagnostics;
    let mut text = format!(
        "{} ({}): {} model, {} observations, {:.0}% band, +{} days\n",
        participant.name,
        participant.id,
        d.model,
        d.observations,
        forecast.interval_level * 100.0,
        forecast.horizon_days
    );
    text.push_str(&format!(
        "Trend: {:+.3} points/day, residual sigma {:.2}{}\n",
        d.trend.slope_per_day,
        d.trend.residual_sigma,
        if d.trend.sigma_floor_applied {
            " (band at minimum width)"
        } else {
            ""
        }
    ));

    let mut table = Table::new();
    table.set_header(vec!["Date", "Estimate", "Lower", "Upper"]);
    for pt in &forecast.points {
        table.add_row(vec![
            Cell::new(pt.date),
            Cell::new(format!("{:.1}%", pt.point_estimate)),
            Cell::new(format!("{:.1}%", pt.lower_bound)),
            Cell::new(format!("{:.1}%", pt.upper_bound)),
        ]);
    }
    text.push_str(&format!("{table}\n"));
    text
}
