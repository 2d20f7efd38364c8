//! Raw score validation.
//!
//! Checks category inputs for well-formedness before they become a
//! [`RawScoreEntry`]. The maxima-sum rule is a domain policy supplied by the
//! caller, never an engine assumption.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate;
use crate::error::EngineError;
use crate::model::{Category, CategoryScore, RawScoreEntry, ScoreKind};

const TOTAL_TOLERANCE: f64 = 1e-9;

/// Rule applied to the sum of category maxima.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaximumPolicy {
    /// Any non-negative total is accepted.
    #[default]
    Any,
    /// Maxima must sum to exactly this total.
    ExactTotal(f64),
}

/// Validates raw category scores.
#[derive(Debug, Clone, Default)]
pub struct ScoreValidator {
    policy: MaximumPolicy,
}

impl ScoreValidator {
    pub fn new(policy: MaximumPolicy) -> Self {
        Self { policy }
    }

    /// `Some(total)` enforces [`MaximumPolicy::ExactTotal`], `None` accepts any total.
    pub fn with_maximum_total(total: Option<f64>) -> Self {
        Self::new(total.map_or(MaximumPolicy::Any, MaximumPolicy::ExactTotal))
    }

    pub fn policy(&self) -> MaximumPolicy {
        self.policy
    }

    /// Fail with `InvalidScore` if any category is missing, negative, or not a finite number.
    pub fn validate(
        &self,
        values: &BTreeMap<Category, f64>,
        kind: ScoreKind,
    ) -> Result<(), EngineError> {
        for category in Category::ALL {
            match values.get(&category) {
                Some(value) => check_value(category, kind, *value)?,
                None => return Err(EngineError::invalid(field(category, kind), "missing")),
            }
        }
        Ok(())
    }

    /// Parse one textual value (e.g. a CSV cell).
    pub fn parse_value(
        &self,
        category: Category,
        kind: ScoreKind,
        raw: &str,
    ) -> Result<f64, EngineError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EngineError::invalid(field(category, kind), "missing"));
        }
        let value: f64 = trimmed.parse().map_err(|_| {
            EngineError::invalid(field(category, kind), format!("'{trimmed}' is not a number"))
        })?;
        check_value(category, kind, value)?;
        Ok(value)
    }

    /// Validate achieved and maximum values and build an entry.
    ///
    /// Does not require `achieved <= maximum`. Values whose totals or
    /// percentages overflow are rejected.
    pub fn entry(
        &self,
        achieved: &BTreeMap<Category, f64>,
        maximum: &BTreeMap<Category, f64>,
    ) -> Result<RawScoreEntry, EngineError> {
        self.validate(achieved, ScoreKind::Achieved)?;
        self.validate(maximum, ScoreKind::Maximum)?;

        let scores = Category::ALL
            .into_iter()
            .map(|c| {
                let score = CategoryScore {
                    achieved: achieved.get(&c).copied().unwrap_or_default(),
                    maximum: maximum.get(&c).copied().unwrap_or_default(),
                };
                (c, score)
            })
            .collect();
        let entry = RawScoreEntry::from_validated(scores);
        check_derived(&entry)?;
        self.check_policy(&entry)?;
        Ok(entry)
    }

    /// Same as [`ScoreValidator::entry`], from combined per-category scores.
    pub fn entry_from_scores(
        &self,
        scores: &BTreeMap<Category, CategoryScore>,
    ) -> Result<RawScoreEntry, EngineError> {
        let achieved = scores.iter().map(|(c, s)| (*c, s.achieved)).collect();
        let maximum = scores.iter().map(|(c, s)| (*c, s.maximum)).collect();
        self.entry(&achieved, &maximum)
    }

    /// Apply the maxima-sum policy.
    pub fn check_policy(&self, entry: &RawScoreEntry) -> Result<(), EngineError> {
        if let MaximumPolicy::ExactTotal(expected) = self.policy {
            let actual = aggregate::total(entry).total_maximum;
            if (actual - expected).abs() > TOTAL_TOLERANCE {
                return Err(EngineError::invalid(
                    "total_maximum",
                    format!("category maxima sum to {actual}, expected {expected}"),
                ));
            }
        }
        Ok(())
    }

    /// The submission rule `achieved <= maximum` for every category.
    ///
    /// A zero maximum is only valid together with a zero achieved value.
    pub fn check_within_maximum(&self, entry: &RawScoreEntry) -> Result<(), EngineError> {
        for (category, score) in entry.iter() {
            if score.achieved > score.maximum {
                return Err(EngineError::invalid(
                    field(category, ScoreKind::Achieved),
                    format!("{} exceeds maximum {}", score.achieved, score.maximum),
                ));
            }
        }
        Ok(())
    }
}

fn field(category: Category, kind: ScoreKind) -> String {
    format!("{category}.{kind}")
}

fn check_value(category: Category, kind: ScoreKind, value: f64) -> Result<(), EngineError> {
    if !value.is_finite() {
        return Err(EngineError::invalid(
            field(category, kind),
            "is not a finite number",
        ));
    }
    if value < 0.0 {
        return Err(EngineError::invalid(
            field(category, kind),
            "must not be negative",
        ));
    }
    Ok(())
}

/// Finite inputs can still sum or divide past `f64::MAX`.
fn check_derived(entry: &RawScoreEntry) -> Result<(), EngineError> {
    let totals = aggregate::total(entry);
    for (name, value) in [
        ("total_achieved", totals.total_achieved),
        ("total_maximum", totals.total_maximum),
        ("total_percent", totals.total_percent),
    ] {
        if !value.is_finite() {
            return Err(EngineError::invalid(name, "overflows to a non-finite number"));
        }
    }
    for (category, percent) in aggregate::category_percents(entry) {
        if !percent.is_finite() {
            return Err(EngineError::invalid(
                format!("{category}.percent"),
                "overflows to a non-finite number",
            ));
        }
    }
    Ok(())
}
