//! Report types with JSON persistence and Markdown rendering.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{self, Totals};
use crate::error::EngineError;
use crate::forecast::{Forecast, ForecastConfig};
use crate::model::{Category, CategoryMeans, Participant};
use crate::series::{ParticipantSeries, SeriesSummary};

/// What the forecaster produced for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Available(Forecast),
    /// Not enough history; show "no forecast available".
    Unavailable { reason: String },
    /// The fit failed; show the message instead of a chart.
    Failed { message: String },
}

impl ForecastOutcome {
    pub fn from_result(result: Result<Forecast, EngineError>) -> Self {
        match result {
            Ok(forecast) => ForecastOutcome::Available(forecast),
            Err(e) if e.is_insufficient_data() => ForecastOutcome::Unavailable {
                reason: e.to_string(),
            },
            Err(e) => ForecastOutcome::Failed {
                message: e.to_string(),
            },
        }
    }

    pub fn forecast(&self) -> Option<&Forecast> {
        match self {
            ForecastOutcome::Available(f) => Some(f),
            _ => None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.forecast().is_some()
    }

    pub fn status(&self) -> &'static str {
        match self {
            ForecastOutcome::Available(_) => "available",
            ForecastOutcome::Unavailable { .. } => "unavailable",
            ForecastOutcome::Failed { .. } => "failed",
        }
    }
}

/// Everything known about one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantReport {
    pub participant: Participant,
    /// Full history, date-ordered.
    pub series: ParticipantSeries,
    pub summary: SeriesSummary,
    pub forecast: ForecastOutcome,
}

/// Aggregates across every participant of a cohort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationStats {
    pub participant_count: usize,
    pub assessment_count: usize,
    /// Weighted per-category percentage over all assessments.
    pub category_means: CategoryMeans,
    pub totals: Totals,
    /// Unweighted mean of every assessment's total percent.
    pub mean_total_percent: f64,
}

impl PopulationStats {
    pub fn compute(participants: &[ParticipantReport]) -> Self {
        let entries = || participants.iter().flat_map(|p| p.series.entries());
        let all: Vec<_> = participants
            .iter()
            .flat_map(|p| p.series.iter().cloned())
            .collect();

        Self {
            participant_count: participants.len(),
            assessment_count: all.len(),
            category_means: aggregate::population_category_means(entries()),
            totals: aggregate::population_totals(entries()),
            mean_total_percent: aggregate::mean_total_percent(&all),
        }
    }
}

/// A complete cohort report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CohortReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Name of the analysed dataset.
    pub dataset: String,
    /// Forecast settings used for every participant.
    pub forecast_settings: ForecastConfig,
    /// One report per participant, sorted by participant id.
    pub participants: Vec<ParticipantReport>,
    pub population: PopulationStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"))
}

impl CohortReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: CohortReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn participant(&self, id: &str) -> Option<&ParticipantReport> {
        self.participants.iter().find(|p| p.participant.id == id)
    }

    /// Format the report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Cohort report: {}\n\n", self.dataset));
        md.push_str(&format!(
            "**Summary:** {} participants, {} assessments, mean total {:.1}%\n\n",
            self.population.participant_count,
            self.population.assessment_count,
            self.population.mean_total_percent
        ));

        md.push_str("## Category means\n\n");
        md.push_str("| Category | Mean |\n");
        md.push_str("|----------|------|\n");
        for category in Category::ALL {
            let value = self.population.category_means.get(&category).copied();
            md.push_str(&format!("| {} | {} |\n", category.label(), pct(value)));
        }
        md.push('\n');

        md.push_str("## Participants\n\n");
        md.push_str(&format!(
            "| Participant | Assessments | Mean | Recent | Best | Worst | Forecast (+{}d) |\n",
            self.forecast_settings.horizon_days
        ));
        md.push_str("|-------------|-------------|------|--------|------|-------|----------|\n");
        for p in &self.participants {
            let s = &p.summary;
            let forecast = match &p.forecast {
                ForecastOutcome::Available(f) => f.last_point().map_or_else(
                    || "-".to_string(),
                    |pt| {
                        format!(
                            "{:.1}% ({:.1}–{:.1})",
                            pt.point_estimate, pt.lower_bound, pt.upper_bound
                        )
                    },
                ),
                ForecastOutcome::Unavailable { .. } => "no forecast available".to_string(),
                ForecastOutcome::Failed { message } => format!("failed: {message}"),
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} | {} | {} |\n",
                p.participant.name,
                s.count,
                pct(s.mean_percent),
                pct(s.recent_mean),
                pct(s.best.as_ref().map(|m| m.total_percent)),
                pct(s.worst.as_ref().map(|m| m.total_percent)),
                forecast
            ));
        }

        md
    }
}
