//! Score aggregation: per-assessment totals and per-category percentages.
//!
//! Every function here is total: empty input and zero maxima produce zeros,
//! and achieved values above their maximum produce percentages above 100
//! rather than errors.

use serde::{Deserialize, Serialize};

use crate::model::{Assessment, Category, CategoryMeans, RawScoreEntry};

/// Summed points and the resulting percentage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub total_achieved: f64,
    pub total_maximum: f64,
    pub total_percent: f64,
}

/// `100 * achieved / maximum`, or exactly 0 when `maximum` is 0.
pub fn percent(achieved: f64, maximum: f64) -> f64 {
    if maximum == 0.0 {
        0.0
    } else {
        100.0 * achieved / maximum
    }
}

/// Totals over all categories of one entry.
pub fn total(entry: &RawScoreEntry) -> Totals {
    let (total_achieved, total_maximum) = entry
        .iter()
        .fold((0.0, 0.0), |(a, m), (_, s)| (a + s.achieved, m + s.maximum));
    Totals {
        total_achieved,
        total_maximum,
        total_percent: percent(total_achieved, total_maximum),
    }
}

/// Percentage for a single category.
pub fn category_percent(entry: &RawScoreEntry, category: Category) -> f64 {
    let score = entry.score(category);
    percent(score.achieved, score.maximum)
}

/// Percentage for every category of one entry.
pub fn category_percents(entry: &RawScoreEntry) -> CategoryMeans {
    Category::ALL
        .into_iter()
        .map(|c| (c, category_percent(entry, c)))
        .collect()
}

/// Weighted per-category percentage across a group of entries.
///
/// Computed as `mean(achieved) / mean(maximum) * 100`, so entries with larger
/// maxima weigh more. This is deliberately not the mean of per-entry
/// percentages.
pub fn population_category_means<'a>(
    entries: impl IntoIterator<Item = &'a RawScoreEntry>,
) -> CategoryMeans {
    let mut achieved = [0.0f64; Category::COUNT];
    let mut maximum = [0.0f64; Category::COUNT];
    let mut count = 0usize;

    for entry in entries {
        for (i, category) in Category::ALL.into_iter().enumerate() {
            let score = entry.score(category);
            achieved[i] += score.achieved;
            maximum[i] += score.maximum;
        }
        count += 1;
    }

    Category::ALL
        .into_iter()
        .enumerate()
        .map(|(i, category)| {
            let value = if count == 0 {
                0.0
            } else {
                let n = count as f64;
                percent(achieved[i] / n, maximum[i] / n)
            };
            (category, value)
        })
        .collect()
}

/// Summed totals across a group of entries.
pub fn population_totals<'a>(entries: impl IntoIterator<Item = &'a RawScoreEntry>) -> Totals {
    let (total_achieved, total_maximum) = entries.into_iter().map(total).fold(
        (0.0, 0.0),
        |(a, m), t| (a + t.total_achieved, m + t.total_maximum),
    );
    Totals {
        total_achieved,
        total_maximum,
        total_percent: percent(total_achieved, total_maximum),
    }
}

/// Unweighted mean of `total_percent`, 0 for no assessments.
pub fn mean_total_percent(assessments: &[Assessment]) -> f64 {
    if assessments.is_empty() {
        return 0.0;
    }
    assessments.iter().map(Assessment::total_percent).sum::<f64>() / assessments.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(scores: [(f64, f64); 6]) -> RawScoreEntry {
        RawScoreEntry::from_pairs(
            Category::ALL
                .into_iter()
                .zip(scores)
                .map(|(c, (a, m))| (c, a, m)),
        )
        .unwrap()
    }

    fn scenario() -> RawScoreEntry {
        // A: 20/20, B: 30/50, C: 0/30, remaining categories unscored.
        entry([
            (20.0, 20.0),
            (30.0, 50.0),
            (0.0, 30.0),
            (0.0, 0.0),
            (0.0, 0.0),
            (0.0, 0.0),
        ])
    }

    #[test]
    fn scenario_totals() {
        let totals = total(&scenario());
        assert_eq!(totals.total_achieved, 50.0);
        assert_eq!(totals.total_maximum, 100.0);
        assert!((totals.total_percent - 50.0).abs() < 1e-9);
    }

    #[test]
    fn scenario_category_percents() {
        let percents = category_percents(&scenario());
        assert_eq!(percents.len(), Category::COUNT);
        assert_eq!(percents[&Category::WordProblems], 100.0);
        assert!((percents[&Category::SpatialReasoning] - 60.0).abs() < 1e-9);
        assert_eq!(percents[&Category::Equations], 0.0);
    }

    #[test]
    fn scenario_category_percent() {
        let e = scenario();
        assert!((category_percent(&e, Category::SpatialReasoning) - 60.0).abs() < 1e-9);
        assert_eq!(category_percent(&e, Category::Arithmetic), 0.0);
        assert_eq!(category_percent(&e, Category::Fractions), 0.0);
    }

    #[test]
    fn total_percent_matches_ratio_for_any_positive_maximum() {
        let samples = [
            [(1.0, 3.0), (2.0, 7.0), (0.5, 0.5), (0.0, 11.0), (4.0, 4.0), (9.0, 13.0)],
            [(0.1, 0.2), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.0, 0.0), (0.3, 0.3)],
            [(10.0, 10.0); 6],
        ];
        for sample in samples {
            let t = total(&entry(sample));
            assert!(t.total_maximum > 0.0);
            let expected = 100.0 * t.total_achieved / t.total_maximum;
            assert!((t.total_percent - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn zero_maximum_gives_zero_percent() {
        let t = total(&entry([(0.0, 0.0); 6]));
        assert_eq!(t.total_percent, 0.0);
    }

    #[test]
    fn achieved_above_maximum_is_visible_not_fatal() {
        let t = total(&entry([(12.0, 10.0); 6]));
        assert!((t.total_percent - 120.0).abs() < 1e-9);
    }

    #[test]
    fn single_entry_population_equals_entry() {
        let e = scenario();
        let means = population_category_means([&e]);
        for category in Category::ALL {
            assert_eq!(means[&category], category_percent(&e, category));
        }
    }

    #[test]
    fn population_means_are_weighted() {
        // 10/10 and 0/30: weighted mean is 5/20 = 25%, the mean of percents would be 50%.
        let a = entry([(10.0, 10.0); 6]);
        let b = entry([(0.0, 30.0); 6]);
        let means = population_category_means([&a, &b]);
        assert!((means[&Category::Equations] - 25.0).abs() < 1e-9);
    }

    #[test]
    fn empty_population_is_all_zero() {
        let means = population_category_means(std::iter::empty());
        assert_eq!(means.len(), 6);
        assert!(means.values().all(|v| *v == 0.0));
        assert_eq!(population_totals(std::iter::empty()).total_percent, 0.0);
    }

    #[test]
    fn mean_total_percent_of_assessments() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let a = Assessment::new("p", day, entry([(10.0, 10.0); 6]));
        let b = Assessment::new("p", day, entry([(5.0, 10.0); 6]));
        assert!((mean_total_percent(&[a, b]) - 75.0).abs() < 1e-9);
        assert_eq!(mean_total_percent(&[]), 0.0);
    }
}
