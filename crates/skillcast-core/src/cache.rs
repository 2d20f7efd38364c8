//! Forecast memoization.
//!
//! Entries are keyed by participant, a SHA-256 digest of the series content
//! and the forecast settings, so any change to the assessments produces a new
//! key. Computing for a changed series evicts the participant's entries for
//! older series; [`ForecastCache::invalidate`] drops them explicitly.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Datelike;
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::forecast::{Forecast, ForecastEngine};
use crate::series::ParticipantSeries;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    participant_id: String,
    series_hash: [u8; 32],
    horizon_days: u32,
    model: &'static str,
    level_bits: u64,
    sigma_floor_bits: u64,
}

/// Thread-safe forecast cache. Share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct ForecastCache {
    entries: Mutex<HashMap<CacheKey, Forecast>>,
}

/// SHA-256 over the fields a forecast depends on: id, date and total percent
/// of every assessment, in series order.
pub fn series_digest(series: &ParticipantSeries) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for a in series {
        hasher.update(a.id().as_bytes());
        hasher.update(a.date().num_days_from_ce().to_le_bytes());
        hasher.update(a.total_percent().to_bits().to_le_bytes());
    }
    hasher.finalize().into()
}

impl ForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means another thread panicked mid-insert; the map
    // itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Forecast>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn key(engine: &ForecastEngine, participant_id: &str, series: &ParticipantSeries) -> CacheKey {
        let config = engine.config();
        CacheKey {
            participant_id: participant_id.to_string(),
            series_hash: series_digest(series),
            horizon_days: config.horizon_days,
            model: engine.model_name(),
            level_bits: config.interval_level.to_bits(),
            sigma_floor_bits: config.sigma_floor.to_bits(),
        }
    }

    /// Return the memoized forecast or compute and store it.
    ///
    /// Errors are never cached. The lock is not held while fitting.
    pub fn get_or_compute(
        &self,
        engine: &ForecastEngine,
        participant_id: &str,
        series: &ParticipantSeries,
    ) -> Result<Forecast, EngineError> {
        let key = Self::key(engine, participant_id, series);
        if let Some(hit) = self.lock().get(&key) {
            tracing::debug!(participant = participant_id, "forecast cache hit");
            return Ok(hit.clone());
        }

        let forecast = engine.forecast(series)?;
        let mut entries = self.lock();
        // Forecasts of an earlier version of this participant's history can never hit again.
        entries.retain(|k, _| {
            k.participant_id != key.participant_id || k.series_hash == key.series_hash
        });
        entries.insert(key, forecast.clone());
        Ok(forecast)
    }

    /// Drop every entry for a participant; returns how many were removed.
    pub fn invalidate(&self, participant_id: &str) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| key.participant_id != participant_id);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
