//! End-to-end pipeline tests over the library crates.
//!
//! These tests drive the full flow (parse → validate → summarize → forecast
//! → render) on small in-memory datasets.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use skillcast_core::cache::ForecastCache;
use skillcast_core::engine::{CohortEngine, CohortEngineConfig, NoopReporter};
use skillcast_core::forecast::{ForecastConfig, ForecastEngine, ForecastModelKind};
use skillcast_core::model::{Category, RawScoreEntry};
use skillcast_core::parser;
use skillcast_core::report::ForecastOutcome;
use skillcast_core::series;
use skillcast_core::validator::{MaximumPolicy, ScoreValidator};

const DATASET: &str = r#"
[dataset]
name = "Pipeline"

[[participants]]
id = "rising"
name = "Rising"

[[participants]]
id = "single"
name = "Single"

[[assessments]]
participant = "rising"
date = 2024-01-01

[assessments.scores]
word_problems = { achieved = 4, maximum = 20 }
spatial_reasoning = { achieved = 4, maximum = 20 }
arithmetic = { achieved = 4, maximum = 20 }
number_range = { achieved = 3, maximum = 15 }
equations = { achieved = 3, maximum = 15 }
fractions = { achieved = 2, maximum = 10 }

[[assessments]]
participant = "rising"
date = 2024-01-11

[assessments.scores]
word_problems = { achieved = 8, maximum = 20 }
spatial_reasoning = { achieved = 8, maximum = 20 }
arithmetic = { achieved = 8, maximum = 20 }
number_range = { achieved = 6, maximum = 15 }
equations = { achieved = 6, maximum = 15 }
fractions = { achieved = 4, maximum = 10 }

[[assessments]]
participant = "rising"
date = 2024-01-21

[assessments.scores]
word_problems = { achieved = 12, maximum = 20 }
spatial_reasoning = { achieved = 12, maximum = 20 }
arithmetic = { achieved = 12, maximum = 20 }
number_range = { achieved = 9, maximum = 15 }
equations = { achieved = 9, maximum = 15 }
fractions = { achieved = 6, maximum = 10 }

[[assessments]]
participant = "single"
date = 2024-01-05

[assessments.scores]
word_problems = { achieved = 10, maximum = 20 }
spatial_reasoning = { achieved = 10, maximum = 20 }
arithmetic = { achieved = 10, maximum = 20 }
number_range = { achieved = 5, maximum = 15 }
equations = { achieved = 5, maximum = 15 }
fractions = { achieved = 5, maximum = 10 }
"#;

fn strict() -> ScoreValidator {
    ScoreValidator::new(MaximumPolicy::ExactTotal(100.0))
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

#[tokio::test]
async fn e2e_cohort_report() {
    let dataset = parser::parse_dataset_str(DATASET, &PathBuf::from("pipeline.toml"), &strict())
        .unwrap();
    assert!(parser::validate_dataset(&dataset, &strict()).is_empty());

    let report = CohortEngine::new(CohortEngineConfig {
        forecast: ForecastConfig {
            horizon_days: 10,
            ..ForecastConfig::default()
        },
        ..CohortEngineConfig::default()
    })
    .run(&dataset, &NoopReporter)
    .await
    .unwrap();

    assert_eq!(report.dataset, "Pipeline");
    assert_eq!(report.participants.len(), 2);

    // 20%, 40%, 60% ten days apart: two points per day.
    let rising = report.participant("rising").unwrap();
    assert!((rising.summary.mean_percent.unwrap() - 40.0).abs() < 1e-9);
    let forecast = rising.forecast.forecast().unwrap();
    assert_eq!(forecast.points.len(), 10);
    assert!((forecast.diagnostics.trend.slope_per_day - 2.0).abs() < 1e-9);
    let last = forecast.last_point().unwrap();
    assert_eq!(last.date, date("2024-01-31"));
    assert!((last.point_estimate - 80.0).abs() < 1e-9);
    assert!(last.lower_bound < last.point_estimate && last.point_estimate < last.upper_bound);

    let single = report.participant("single").unwrap();
    assert!(matches!(single.forecast, ForecastOutcome::Unavailable { .. }));
    assert!((single.summary.mean_percent.unwrap() - 45.0).abs() < 1e-9);

    let md = report.to_markdown();
    assert!(md.contains("no forecast available"));
    let html = skillcast_report::html::generate_html(&report);
    assert!(html.contains("Rising"));
}

#[test]
fn e2e_policy_rejects_and_validate_reports() {
    let off_total = DATASET.replace(
        "fractions = { achieved = 5, maximum = 10 }",
        "fractions = { achieved = 5, maximum = 20 }",
    );

    // Strict loading refuses the file.
    assert!(
        parser::parse_dataset_str(&off_total, &PathBuf::from("p.toml"), &strict()).is_err()
    );

    // Lenient loading followed by validation names the offender.
    let lenient = ScoreValidator::new(MaximumPolicy::Any);
    let dataset = parser::parse_dataset_str(&off_total, &PathBuf::from("p.toml"), &lenient)
        .unwrap();
    let warnings = parser::validate_dataset(&dataset, &strict());
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].participant_id.as_deref(), Some("single"));
    assert!(warnings[0].message.contains("110"));
}

#[test]
fn e2e_correction_invalidates_forecast() {
    let dataset = parser::parse_dataset_str(DATASET, &PathBuf::from("pipeline.toml"), &strict())
        .unwrap();
    let engine = ForecastEngine::default();
    let cache = Arc::new(ForecastCache::new());

    let original = series::order(dataset.assessments_for("rising"));
    let before = cache.get_or_compute(&engine, "rising", &original).unwrap();

    // Correct the last assessment down to 40%.
    let last = original.last().unwrap();
    let scores =
        RawScoreEntry::from_pairs(Category::ALL.map(|c| (c, 4.0, 10.0))).unwrap();
    let corrected = original.replace(last.corrected(last.date(), scores));
    assert_eq!(corrected.len(), 3);
    assert!((corrected.last().unwrap().total_percent() - 40.0).abs() < 1e-9);

    assert_eq!(cache.invalidate("rising"), 1);
    let after = cache.get_or_compute(&engine, "rising", &corrected).unwrap();
    assert!(after.diagnostics.trend.slope_per_day < before.diagnostics.trend.slope_per_day);
}

#[test]
fn e2e_models_agree_on_a_clean_line() {
    let dataset = parser::parse_dataset_str(DATASET, &PathBuf::from("pipeline.toml"), &strict())
        .unwrap();
    let series = series::order(dataset.assessments_for("rising"));

    for model in [ForecastModelKind::Linear, ForecastModelKind::Robust] {
        let forecast = ForecastEngine::new(ForecastConfig {
            model,
            horizon_days: 5,
            ..ForecastConfig::default()
        })
        .forecast(&series)
        .unwrap();
        let last = forecast.last_point().unwrap();
        assert!((last.point_estimate - 70.0).abs() < 1e-9, "{model}");
        assert_eq!(forecast.diagnostics.model, model.as_str());
    }
}
