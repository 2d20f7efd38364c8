//! Chronological views over one participant's assessments.
//!
//! A [`ParticipantSeries`] is always date-ordered; everything else in this
//! module is a pure function of a series. Empty series yield empty or `None`
//! outputs, never errors.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate;
use crate::error::EngineError;
use crate::model::{Assessment, Category, CategoryMeans, RawScoreEntry};

/// One participant's assessments, sorted by date ascending.
///
/// Assessments sharing a date keep their insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Assessment>", into = "Vec<Assessment>")]
pub struct ParticipantSeries {
    assessments: Vec<Assessment>,
}

impl ParticipantSeries {
    pub fn assessments(&self) -> &[Assessment] {
        &self.assessments
    }

    pub fn len(&self) -> usize {
        self.assessments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assessments.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Assessment> {
        self.assessments.iter()
    }

    pub fn first(&self) -> Option<&Assessment> {
        self.assessments.first()
    }

    pub fn last(&self) -> Option<&Assessment> {
        self.assessments.last()
    }

    /// Owner of the series, taken from its first assessment.
    pub fn participant_id(&self) -> Option<&str> {
        self.first().map(Assessment::participant_id)
    }

    /// `total_percent` of every assessment, in order.
    pub fn percents(&self) -> Vec<f64> {
        self.iter().map(Assessment::total_percent).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.iter().map(Assessment::date).collect()
    }

    /// Number of distinct calendar dates.
    pub fn distinct_dates(&self) -> usize {
        let mut dates = self.dates();
        dates.dedup();
        dates.len()
    }

    /// Raw score entries, in order.
    pub fn entries(&self) -> impl Iterator<Item = &RawScoreEntry> + '_ {
        self.iter().map(Assessment::scores)
    }

    /// A new series where the assessment with `corrected.id()` is swapped for
    /// `corrected` and the result re-ordered. Unchanged if the id is absent.
    pub fn replace(&self, corrected: Assessment) -> Self {
        let mut assessments = self.assessments.clone();
        if let Some(slot) = assessments.iter_mut().find(|a| a.id() == corrected.id()) {
            *slot = corrected;
        }
        order(assessments)
    }

    /// A new series without the assessment `id`.
    pub fn remove(&self, id: Uuid) -> Self {
        Self {
            assessments: self.iter().filter(|a| a.id() != id).cloned().collect(),
        }
    }
}

impl From<Vec<Assessment>> for ParticipantSeries {
    fn from(assessments: Vec<Assessment>) -> Self {
        order(assessments)
    }
}

impl From<ParticipantSeries> for Vec<Assessment> {
    fn from(series: ParticipantSeries) -> Self {
        series.assessments
    }
}

impl<'a> IntoIterator for &'a ParticipantSeries {
    type Item = &'a Assessment;
    type IntoIter = std::slice::Iter<'a, Assessment>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Sort assessments by date ascending. Stable, so idempotent.
pub fn order(assessments: impl IntoIterator<Item = Assessment>) -> ParticipantSeries {
    let mut assessments: Vec<Assessment> = assessments.into_iter().collect();
    assessments.sort_by_key(Assessment::date);
    ParticipantSeries { assessments }
}

/// Split a mixed list into one ordered series per participant.
pub fn group_by_participant(
    assessments: impl IntoIterator<Item = Assessment>,
) -> BTreeMap<String, ParticipantSeries> {
    let mut grouped: BTreeMap<String, Vec<Assessment>> = BTreeMap::new();
    for assessment in assessments {
        grouped
            .entry(assessment.participant_id().to_string())
            .or_default()
            .push(assessment);
    }
    grouped
        .into_iter()
        .map(|(id, list)| (id, order(list)))
        .collect()
}

/// Highest `total_percent`; the earliest one on ties.
pub fn best(series: &ParticipantSeries) -> Option<&Assessment> {
    extreme(series, |candidate, current| candidate > current)
}

/// Lowest `total_percent`; the earliest one on ties.
pub fn worst(series: &ParticipantSeries) -> Option<&Assessment> {
    extreme(series, |candidate, current| candidate < current)
}

// Strict comparison over a date-ordered series keeps the earliest on ties.
fn extreme(series: &ParticipantSeries, better: impl Fn(f64, f64) -> bool) -> Option<&Assessment> {
    let mut iter = series.iter();
    let mut chosen = iter.next()?;
    for a in iter {
        if better(a.total_percent(), chosen.total_percent()) {
            chosen = a;
        }
    }
    Some(chosen)
}

/// Trailing mean of `total_percent` over `window` assessments.
///
/// One slot per assessment; `None` until a full window is available and
/// everywhere when `window` is 0.
pub fn rolling_mean(series: &ParticipantSeries, window: usize) -> Vec<Option<f64>> {
    let percents = series.percents();
    (0..percents.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                None
            } else {
                let slice = &percents[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

/// Change in `total_percent` from the previous assessment; the first slot is `None`.
pub fn delta_from_previous(series: &ParticipantSeries) -> Vec<Option<f64>> {
    let percents = series.percents();
    (0..percents.len())
        .map(|i| i.checked_sub(1).map(|prev| percents[i] - percents[prev]))
        .collect()
}

/// Mean `total_percent` of the last `n` assessments (all of them if fewer).
pub fn recent_mean(series: &ParticipantSeries, n: usize) -> Option<f64> {
    let percents = series.percents();
    let tail = &percents[percents.len().saturating_sub(n)..];
    if tail.is_empty() {
        None
    } else {
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

/// Assessments dated within `start..=end`.
pub fn between(
    series: &ParticipantSeries,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ParticipantSeries, EngineError> {
    if start > end {
        return Err(EngineError::InvalidDateRange { start, end });
    }
    Ok(ParticipantSeries {
        assessments: series
            .iter()
            .filter(|a| (start..=end).contains(&a.date()))
            .cloned()
            .collect(),
    })
}

/// Percentage of one category at each assessment date.
pub fn category_series(series: &ParticipantSeries, category: Category) -> Vec<(NaiveDate, f64)> {
    series
        .iter()
        .map(|a| (a.date(), aggregate::category_percent(a.scores(), category)))
        .collect()
}

/// A notable assessment, by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub assessment_id: Uuid,
    pub date: NaiveDate,
    pub total_percent: f64,
}

impl From<&Assessment> for Milestone {
    fn from(a: &Assessment) -> Self {
        Self {
            assessment_id: a.id(),
            date: a.date(),
            total_percent: a.total_percent(),
        }
    }
}

/// Everything a progress view shows about one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub count: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub mean_percent: Option<f64>,
    pub recent_window: usize,
    pub recent_mean: Option<f64>,
    pub best: Option<Milestone>,
    pub worst: Option<Milestone>,
    pub rolling_window: usize,
    pub rolling_mean: Vec<Option<f64>>,
    pub deltas: Vec<Option<f64>>,
    /// Weighted per-category percentage over the whole series.
    pub category_trend: CategoryMeans,
}

pub fn summarize(
    series: &ParticipantSeries,
    rolling_window: usize,
    recent_window: usize,
) -> SeriesSummary {
    let mean_percent = if series.is_empty() {
        None
    } else {
        Some(aggregate::mean_total_percent(series.assessments()))
    };

    SeriesSummary {
        count: series.len(),
        first_date: series.first().map(Assessment::date),
        last_date: series.last().map(Assessment::date),
        mean_percent,
        recent_window,
        recent_mean: recent_mean(series, recent_window),
        best: best(series).map(Milestone::from),
        worst: worst(series).map(Milestone::from),
        rolling_window,
        rolling_mean: rolling_mean(series, rolling_window),
        deltas: delta_from_previous(series),
        category_trend: aggregate::population_category_means(series.entries()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// An assessment whose total percent is exactly `percent`.
    fn at(participant: &str, day: &str, percent: f64) -> Assessment {
        let entry = RawScoreEntry::from_pairs(Category::ALL.map(|c| (c, percent, 100.0))).unwrap();
        Assessment::new(participant, date(day), entry)
    }

    fn rising() -> ParticipantSeries {
        order(vec![
            at("p", "2024-03-01", 80.0),
            at("p", "2024-01-01", 40.0),
            at("p", "2024-02-01", 60.0),
        ])
    }

    #[test]
    fn order_sorts_and_is_idempotent() {
        let series = rising();
        assert_eq!(
            series.dates(),
            vec![date("2024-01-01"), date("2024-02-01"), date("2024-03-01")]
        );
        let again = order(series.assessments().to_vec());
        assert_eq!(again, series);
    }

    #[test]
    fn order_is_stable_on_same_date() {
        let a = at("p", "2024-01-01", 10.0);
        let b = at("p", "2024-01-01", 20.0);
        let series = order(vec![a.clone(), b.clone()]);
        assert_eq!(series.first().unwrap().id(), a.id());
        assert_eq!(series.last().unwrap().id(), b.id());
        assert_eq!(series.distinct_dates(), 1);
    }

    #[test]
    fn best_worst_and_deltas() {
        let series = rising();
        assert_eq!(best(&series).unwrap().date(), date("2024-03-01"));
        assert_eq!(worst(&series).unwrap().date(), date("2024-01-01"));

        let deltas = delta_from_previous(&series);
        assert_eq!(deltas[0], None);
        assert!((deltas[1].unwrap() - 20.0).abs() < 1e-9);
        assert!((deltas[2].unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn ties_resolve_to_earliest() {
        let series = order(vec![
            at("p", "2024-01-15", 70.0),
            at("p", "2024-01-01", 70.0),
        ]);
        assert_eq!(best(&series).unwrap().date(), date("2024-01-01"));
        assert_eq!(worst(&series).unwrap().date(), date("2024-01-01"));
    }

    #[test]
    fn empty_series_is_not_an_error() {
        let series = ParticipantSeries::default();
        assert!(best(&series).is_none());
        assert!(worst(&series).is_none());
        assert!(rolling_mean(&series, 3).is_empty());
        assert!(delta_from_previous(&series).is_empty());
        assert_eq!(recent_mean(&series, 2), None);

        let summary = summarize(&series, 2, 2);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.mean_percent, None);
        assert!(summary.category_trend.values().all(|v| *v == 0.0));
    }

    #[test]
    fn rolling_mean_windows() {
        let series = rising();
        assert_eq!(
            rolling_mean(&series, 1),
            series.percents().into_iter().map(Some).collect::<Vec<_>>()
        );

        let two = rolling_mean(&series, 2);
        assert_eq!(two[0], None);
        assert!((two[1].unwrap() - 50.0).abs() < 1e-9);
        assert!((two[2].unwrap() - 70.0).abs() < 1e-9);

        assert_eq!(rolling_mean(&series, 0), vec![None; 3]);
        assert_eq!(rolling_mean(&series, 5), vec![None; 3]);
    }

    #[test]
    fn recent_mean_uses_tail() {
        let series = rising();
        assert!((recent_mean(&series, 2).unwrap() - 70.0).abs() < 1e-9);
        assert!((recent_mean(&series, 10).unwrap() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn between_is_inclusive_and_checks_range() {
        let series = rising();
        let window = between(&series, date("2024-01-01"), date("2024-02-01")).unwrap();
        assert_eq!(window.len(), 2);

        let err = between(&series, date("2024-03-01"), date("2024-01-01")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidDateRange { .. }));
    }

    #[test]
    fn replace_and_remove_return_new_series() {
        let series = rising();
        let first = series.first().unwrap().clone();
        let entry = RawScoreEntry::from_pairs(Category::ALL.map(|c| (c, 90.0, 100.0))).unwrap();

        let fixed = series.replace(first.corrected(date("2024-04-01"), entry));
        assert_eq!(fixed.len(), 3);
        assert_eq!(fixed.last().unwrap().id(), first.id());
        assert!((fixed.last().unwrap().total_percent() - 90.0).abs() < 1e-9);
        assert_eq!(series.first().unwrap().id(), first.id());

        let removed = series.remove(first.id());
        assert_eq!(removed.len(), 2);
        assert_eq!(removed.first().unwrap().date(), date("2024-02-01"));
    }

    #[test]
    fn grouping_splits_by_participant() {
        let grouped = group_by_participant(vec![
            at("b", "2024-02-01", 10.0),
            at("a", "2024-01-01", 20.0),
            at("b", "2024-01-01", 30.0),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["b"].len(), 2);
        assert_eq!(grouped["b"].first().unwrap().date(), date("2024-01-01"));
        assert_eq!(grouped["a"].participant_id(), Some("a"));
    }

    #[test]
    fn category_series_tracks_one_category() {
        let points = category_series(&rising(), Category::Fractions);
        assert_eq!(points.len(), 3);
        assert!((points[0].1 - 40.0).abs() < 1e-9);
    }

    #[test]
    fn summary_bundles_everything() {
        let summary = summarize(&rising(), 2, 2);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.first_date, Some(date("2024-01-01")));
        assert_eq!(summary.best.as_ref().unwrap().date, date("2024-03-01"));
        assert!((summary.mean_percent.unwrap() - 60.0).abs() < 1e-9);
        assert!((summary.category_trend[&Category::Equations] - 60.0).abs() < 1e-9);
        assert_eq!(summary.deltas.len(), 3);
    }

    #[test]
    fn serde_restores_order() {
        let series = rising();
        let mut list: Vec<Assessment> = series.clone().into();
        list.reverse();
        let json = serde_json::to_string(&list).unwrap();
        let back: ParticipantSeries = serde_json::from_str(&json).unwrap();
        assert_eq!(back.dates(), series.dates());
    }
}
