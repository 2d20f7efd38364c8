//! Core data model types for skillcast.
//!
//! These are the fundamental types the whole system uses to represent skill
//! categories, raw scores, assessments, participants, and datasets.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{self, Totals};
use crate::error::EngineError;
use crate::validator::ScoreValidator;

/// Per-category percentages (or any per-category value), keyed by category.
pub type CategoryMeans = BTreeMap<Category, f64>;

/// One of the fixed skill areas scored in every assessment.
///
/// The set is closed: every assessment carries a score for each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    WordProblems,
    SpatialReasoning,
    Arithmetic,
    NumberRange,
    Equations,
    Fractions,
}

impl Category {
    /// Number of categories.
    pub const COUNT: usize = 6;

    /// All categories, in display order.
    pub const ALL: [Category; Category::COUNT] = [
        Category::WordProblems,
        Category::SpatialReasoning,
        Category::Arithmetic,
        Category::NumberRange,
        Category::Equations,
        Category::Fractions,
    ];

    /// Stable machine key, used in files, CSV headers and JSON.
    pub fn key(&self) -> &'static str {
        match self {
            Category::WordProblems => "word_problems",
            Category::SpatialReasoning => "spatial_reasoning",
            Category::Arithmetic => "arithmetic",
            Category::NumberRange => "number_range",
            Category::Equations => "equations",
            Category::Fractions => "fractions",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Category::WordProblems => "Word problems",
            Category::SpatialReasoning => "Spatial reasoning",
            Category::Arithmetic => "Basic arithmetic",
            Category::NumberRange => "Number range",
            Category::Equations => "Equations",
            Category::Fractions => "Fractions",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Category::ALL
            .into_iter()
            .find(|c| c.key() == wanted)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Which half of a category score a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreKind {
    Achieved,
    Maximum,
}

impl fmt::Display for ScoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreKind::Achieved => write!(f, "achieved"),
            ScoreKind::Maximum => write!(f, "maximum"),
        }
    }
}

/// Points achieved out of the points available for one category.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryScore {
    pub achieved: f64,
    pub maximum: f64,
}

/// A complete set of category scores for one assessment.
///
/// Always holds every [`Category`] with finite, non-negative values.
/// `achieved <= maximum` is not enforced here; see
/// [`ScoreValidator::check_within_maximum`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<Category, CategoryScore>",
    into = "BTreeMap<Category, CategoryScore>"
)]
pub struct RawScoreEntry {
    scores: BTreeMap<Category, CategoryScore>,
}

impl RawScoreEntry {
    pub(crate) fn from_validated(scores: BTreeMap<Category, CategoryScore>) -> Self {
        Self { scores }
    }

    /// Build an entry from `(category, achieved, maximum)` triples using the
    /// permissive default validator.
    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (Category, f64, f64)>,
    ) -> Result<Self, EngineError> {
        let scores = pairs
            .into_iter()
            .map(|(category, achieved, maximum)| (category, CategoryScore { achieved, maximum }))
            .collect();
        ScoreValidator::default().entry_from_scores(&scores)
    }

    /// The score for one category.
    pub fn score(&self, category: Category) -> CategoryScore {
        self.scores.get(&category).copied().unwrap_or_default()
    }

    /// Iterate over all categories in display order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, CategoryScore)> + '_ {
        self.scores.iter().map(|(c, s)| (*c, *s))
    }
}

impl TryFrom<BTreeMap<Category, CategoryScore>> for RawScoreEntry {
    type Error = EngineError;

    fn try_from(scores: BTreeMap<Category, CategoryScore>) -> Result<Self, Self::Error> {
        ScoreValidator::default().entry_from_scores(&scores)
    }
}

impl From<RawScoreEntry> for BTreeMap<Category, CategoryScore> {
    fn from(entry: RawScoreEntry) -> Self {
        entry.scores
    }
}

/// One dated scoring event for one participant.
///
/// Totals are derived from the scores at construction and never change; a
/// correction is a new value with the same `id` (see [`Assessment::corrected`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AssessmentRecord")]
pub struct Assessment {
    id: Uuid,
    participant_id: String,
    date: NaiveDate,
    scores: RawScoreEntry,
    total_achieved: f64,
    total_maximum: f64,
    total_percent: f64,
}

impl Assessment {
    /// Create a new assessment with a fresh identifier.
    pub fn new(participant_id: impl Into<String>, date: NaiveDate, scores: RawScoreEntry) -> Self {
        Self::with_id(Uuid::new_v4(), participant_id, date, scores)
    }

    /// Create an assessment with a known identifier.
    pub fn with_id(
        id: Uuid,
        participant_id: impl Into<String>,
        date: NaiveDate,
        scores: RawScoreEntry,
    ) -> Self {
        let Totals {
            total_achieved,
            total_maximum,
            total_percent,
        } = aggregate::total(&scores);
        Self {
            id,
            participant_id: participant_id.into(),
            date,
            scores,
            total_achieved,
            total_maximum,
            total_percent,
        }
    }

    /// A replacement for this assessment: same id and participant, new date and scores.
    pub fn corrected(&self, date: NaiveDate, scores: RawScoreEntry) -> Self {
        Self::with_id(self.id, self.participant_id.clone(), date, scores)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn scores(&self) -> &RawScoreEntry {
        &self.scores
    }

    pub fn total_achieved(&self) -> f64 {
        self.total_achieved
    }

    pub fn total_maximum(&self) -> f64 {
        self.total_maximum
    }

    pub fn total_percent(&self) -> f64 {
        self.total_percent
    }

    pub fn totals(&self) -> Totals {
        Totals {
            total_achieved: self.total_achieved,
            total_maximum: self.total_maximum,
            total_percent: self.total_percent,
        }
    }
}

/// Persistence-facing shape of an assessment.
///
/// Pre-computed totals are accepted but only compared against the recomputed
/// values; the scores are the source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRecord {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(alias = "participant")]
    pub participant_id: String,
    pub date: NaiveDate,
    pub scores: BTreeMap<Category, CategoryScore>,
    #[serde(default)]
    pub total_achieved: Option<f64>,
    #[serde(default)]
    pub total_maximum: Option<f64>,
    #[serde(default)]
    pub total_percent: Option<f64>,
}

const TOTAL_MISMATCH_TOLERANCE: f64 = 1e-6;

impl AssessmentRecord {
    /// Validate the scores and build the assessment, recomputing all totals.
    pub fn into_assessment(self, validator: &ScoreValidator) -> Result<Assessment, EngineError> {
        let scores = validator.entry_from_scores(&self.scores)?;
        let assessment = Assessment::with_id(
            self.id.unwrap_or_else(Uuid::new_v4),
            self.participant_id,
            self.date,
            scores,
        );

        let provided = [
            ("total_achieved", self.total_achieved, assessment.total_achieved),
            ("total_maximum", self.total_maximum, assessment.total_maximum),
            ("total_percent", self.total_percent, assessment.total_percent),
        ];
        for (name, given, computed) in provided {
            if let Some(given) = given {
                if (given - computed).abs() > TOTAL_MISMATCH_TOLERANCE {
                    tracing::warn!(
                        assessment = %assessment.id,
                        "stored {name} {given} differs from recomputed {computed}; using recomputed value"
                    );
                }
            }
        }

        Ok(assessment)
    }
}

impl TryFrom<AssessmentRecord> for Assessment {
    type Error = EngineError;

    fn try_from(record: AssessmentRecord) -> Result<Self, Self::Error> {
        record.into_assessment(&ScoreValidator::default())
    }
}

/// Identity of a program participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cohort: Option<String>,
}

impl Participant {
    /// A participant known only by id.
    pub fn anonymous(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            cohort: None,
        }
    }
}

/// A loaded collection of participants and their assessments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Human-readable name.
    pub name: String,
    /// Declared participants.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// All assessments, in load order.
    #[serde(default)]
    pub assessments: Vec<Assessment>,
}

impl Dataset {
    /// Look up a declared participant.
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Declared participants plus anonymous entries for ids that only appear
    /// in assessments, sorted by id.
    pub fn all_participants(&self) -> Vec<Participant> {
        let mut seen = BTreeSet::new();
        let mut all = Vec::new();
        for p in &self.participants {
            if seen.insert(p.id.clone()) {
                all.push(p.clone());
            }
        }
        for a in &self.assessments {
            if seen.insert(a.participant_id().to_string()) {
                all.push(Participant::anonymous(a.participant_id()));
            }
        }
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// The assessments belonging to one participant, in load order.
    pub fn assessments_for(&self, participant_id: &str) -> Vec<Assessment> {
        self.assessments
            .iter()
            .filter(|a| a.participant_id() == participant_id)
            .cloned()
            .collect()
    }

    /// Append another dataset's participants and assessments.
    pub fn merge(&mut self, other: Dataset) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        self.participants.extend(other.participants);
        self.assessments.extend(other.assessments);
    }
}
