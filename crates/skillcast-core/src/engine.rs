//! Cohort runner.
//!
//! Analyses every participant of an [`AssessmentSource`] with bounded
//! parallelism. Loading is async; the summary and forecast fit are CPU-bound
//! and run on the blocking pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::cache::ForecastCache;
use crate::forecast::{ForecastConfig, ForecastEngine};
use crate::model::Participant;
use crate::report::{CohortReport, ForecastOutcome, ParticipantReport, PopulationStats};
use crate::series::{self, ParticipantSeries};
use crate::traits::AssessmentSource;

/// Configuration for the cohort runner.
#[derive(Debug, Clone, Copy)]
pub struct CohortEngineConfig {
    /// Maximum participants analysed concurrently.
    pub parallelism: usize,
    /// Rolling mean window in summaries.
    pub rolling_window: usize,
    /// Number of latest assessments in the recent mean.
    pub recent_window: usize,
    pub forecast: ForecastConfig,
}

impl Default for CohortEngineConfig {
    fn default() -> Self {
        Self {
            parallelism: 4,
            rolling_window: 2,
            recent_window: 2,
            forecast: ForecastConfig::default(),
        }
    }
}

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_participant_start(&self, participant_id: &str);
    fn on_participant_complete(&self, report: &ParticipantReport);
    fn on_participant_error(&self, participant_id: &str, error: &str);
    fn on_cohort_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_participant_start(&self, _: &str) {}
    fn on_participant_complete(&self, _: &ParticipantReport) {}
    fn on_participant_error(&self, _: &str, _: &str) {}
    fn on_cohort_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Summarize and forecast one participant.
///
/// Forecast errors become a [`ForecastOutcome`] rather than failing the report.
pub fn analyze_participant(
    participant: Participant,
    series: ParticipantSeries,
    engine: &ForecastEngine,
    config: &CohortEngineConfig,
    cache: Option<&ForecastCache>,
) -> ParticipantReport {
    let summary = series::summarize(&series, config.rolling_window, config.recent_window);
    let result = match cache {
        Some(cache) => cache.get_or_compute(engine, &participant.id, &series),
        None => engine.forecast(&series),
    };
    if let Err(e) = &result {
        tracing::debug!(participant = %participant.id, "no forecast: {e}");
    }

    ParticipantReport {
        participant,
        series,
        summary,
        forecast: ForecastOutcome::from_result(result),
    }
}

/// The cohort runner.
pub struct CohortEngine {
    config: CohortEngineConfig,
    forecaster: Arc<ForecastEngine>,
    cache: Arc<ForecastCache>,
}

impl CohortEngine {
    pub fn new(config: CohortEngineConfig) -> Self {
        Self::with_cache(config, Arc::new(ForecastCache::new()))
    }

    /// Share a cache across runs, e.g. to re-run after a correction.
    pub fn with_cache(config: CohortEngineConfig, cache: Arc<ForecastCache>) -> Self {
        Self {
            forecaster: Arc::new(ForecastEngine::new(config.forecast)),
            config,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ForecastCache> {
        &self.cache
    }

    /// Analyse every participant the source knows about.
    ///
    /// A participant whose data fails to load is reported through `progress`
    /// and left out of the report; the run itself only fails if the
    /// participant list cannot be read.
    pub async fn run(
        &self,
        source: &dyn AssessmentSource,
        progress: &dyn ProgressReporter,
    ) -> Result<CohortReport> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

        let participants = source.participants().await?;
        let total = participants.len();
        tracing::info!(
            source = source.name(),
            participants = total,
            "starting cohort run {run_id}"
        );

        let mut futures = FuturesUnordered::new();

        for participant in participants {
            let semaphore = Arc::clone(&semaphore);
            let forecaster = Arc::clone(&self.forecaster);
            let cache = Arc::clone(&self.cache);
            let config = self.config;

            futures.push(async move {
                let ctx_participant = participant.id.clone();
                let inner = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| anyhow::anyhow!("semaphore closed"))?;

                    progress.on_participant_start(&participant.id);
                    let assessments = source.assessments(&participant.id).await?;
                    let series = series::order(assessments);

                    let report = tokio::task::spawn_blocking(move || {
                        analyze_participant(
                            participant,
                            series,
                            &forecaster,
                            &config,
                            Some(cache.as_ref()),
                        )
                    })
                    .await?;
                    Ok::<_, anyhow::Error>(report)
                };
                (ctx_participant, inner.await)
            });
        }

        let mut reports = Vec::new();
        let mut completed = 0usize;
        let mut failed = 0usize;

        while let Some((participant_id, result)) = futures.next().await {
            match result {
                Ok(report) => {
                    progress.on_participant_complete(&report);
                    reports.push(report);
                    completed += 1;
                }
                Err(e) => {
                    tracing::error!("analysis failed for {participant_id}: {e:#}");
                    progress.on_participant_error(&participant_id, &e.to_string());
                    failed += 1;
                }
            }
        }

        let elapsed = start.elapsed();
        progress.on_cohort_complete(total, completed, failed, elapsed);

        reports.sort_by(|a, b| a.participant.id.cmp(&b.participant.id));
        let population = PopulationStats::compute(&reports);

        Ok(CohortReport {
            id: run_id,
            created_at: chrono::Utc::now(),
            dataset: source.name().to_string(),
            forecast_settings: self.config.forecast,
            participants: reports,
            population,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Assessment, Category, Dataset, RawScoreEntry};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn at(participant: &str, day: &str, percent: f64) -> Assessment {
        let entry = RawScoreEntry::from_pairs(Category::ALL.map(|c| (c, percent, 100.0))).unwrap();
        Assessment::new(
            participant,
            NaiveDate::parse_from_str(day, "%Y-%m-%d").unwrap(),
            entry,
        )
    }

    fn dataset() -> Dataset {
        Dataset {
            name: "cohort".into(),
            participants: vec![Participant {
                id: "a".into(),
                name: "Avery".into(),
                cohort: None,
            }],
            assessments: vec![
                at("a", "2024-02-01", 60.0),
                at("a", "2024-01-01", 40.0),
                at("a", "2024-03-01", 80.0),
                at("b", "2024-01-15", 55.0),
                at("c", "2024-01-01", 20.0),
                at("c", "2024-01-20", 35.0),
            ],
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl ProgressReporter for Recorder {
        fn on_participant_start(&self, id: &str) {
            self.events.lock().unwrap().push(format!("start {id}"));
        }
        fn on_participant_complete(&self, report: &ParticipantReport) {
            self.events
                .lock()
                .unwrap()
                .push(format!("done {}", report.participant.id));
        }
        fn on_participant_error(&self, id: &str, _: &str) {
            self.events.lock().unwrap().push(format!("error {id}"));
        }
        fn on_cohort_complete(&self, total: usize, completed: usize, failed: usize, _: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("complete {total}/{completed}/{failed}"));
        }
    }

    #[tokio::test]
    async fn one_report_per_participant() {
        let engine = CohortEngine::new(CohortEngineConfig {
            parallelism: 2,
            ..CohortEngineConfig::default()
        });
        let report = engine.run(&dataset(), &NoopReporter).await.unwrap();

        let ids: Vec<&str> = report
            .participants
            .iter()
            .map(|p| p.participant.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(report.dataset, "cohort");
        assert_eq!(report.population.assessment_count, 6);

        let a = report.participant("a").unwrap();
        assert_eq!(a.participant.name, "Avery");
        assert_eq!(a.series.first().unwrap().date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(a.forecast.is_available());

        let b = report.participant("b").unwrap();
        assert!(matches!(b.forecast, ForecastOutcome::Unavailable { .. }));
        assert_eq!(b.summary.count, 1);
    }

    #[tokio::test]
    async fn progress_sees_every_participant() {
        let recorder = Recorder::default();
        CohortEngine::new(CohortEngineConfig::default())
            .run(&dataset(), &recorder)
            .await
            .unwrap();

        let events = recorder.events.lock().unwrap();
        assert_eq!(events.iter().filter(|e| e.starts_with("start")).count(), 3);
        assert_eq!(events.last().unwrap(), "complete 3/3/0");
    }

    #[tokio::test]
    async fn shared_cache_is_reused() {
        let cache = Arc::new(ForecastCache::new());
        let engine = CohortEngine::with_cache(CohortEngineConfig::default(), Arc::clone(&cache));
        let data = dataset();

        engine.run(&data, &NoopReporter).await.unwrap();
        assert_eq!(cache.len(), 2);
        engine.run(&data, &NoopReporter).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    struct Flaky;

    #[async_trait]
    impl AssessmentSource for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn participants(&self) -> Result<Vec<Participant>> {
            Ok(vec![Participant::anonymous("ok"), Participant::anonymous("bad")])
        }

        async fn assessments(&self, participant_id: &str) -> Result<Vec<Assessment>> {
            if participant_id == "bad" {
                anyhow::bail!("storage unavailable");
            }
            Ok(vec![at(participant_id, "2024-01-01", 10.0)])
        }
    }

    #[tokio::test]
    async fn failing_participant_does_not_abort() {
        let recorder = Recorder::default();
        let report = CohortEngine::new(CohortEngineConfig::default())
            .run(&Flaky, &recorder)
            .await
            .unwrap();

        assert_eq!(report.participants.len(), 1);
        let events = recorder.events.lock().unwrap();
        assert!(events.contains(&"error bad".to_string()));
        assert_eq!(events.last().unwrap(), "complete 2/1/1");
    }

    #[test]
    fn analyze_without_cache() {
        let series = series::order(vec![at("x", "2024-01-01", 10.0), at("x", "2024-01-08", 30.0)]);
        let report = analyze_participant(
            Participant::anonymous("x"),
            series,
            &ForecastEngine::default(),
            &CohortEngineConfig::default(),
            None,
        );
        assert!(report.forecast.is_available());
        assert_eq!(report.summary.count, 2);
    }
}
