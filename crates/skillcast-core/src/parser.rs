//! Dataset parser.
//!
//! Loads participants and assessments from TOML and CSV files and
//! directories, and validates them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::model::{
    Assessment, AssessmentRecord, Category, CategoryScore, Dataset, Participant, ScoreKind,
};
use crate::validator::ScoreValidator;

/// Intermediate TOML structure for dataset files.
#[derive(Debug, Deserialize)]
struct TomlDatasetFile {
    #[serde(default)]
    dataset: Option<TomlDatasetHeader>,
    #[serde(default)]
    participants: Vec<Participant>,
    #[serde(default)]
    assessments: Vec<TomlAssessment>,
}

#[derive(Debug, Deserialize)]
struct TomlDatasetHeader {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TomlAssessment {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "participant_id")]
    participant: String,
    date: toml::Value,
    scores: BTreeMap<String, CategoryScore>,
    #[serde(default)]
    total_achieved: Option<f64>,
    #[serde(default)]
    total_maximum: Option<f64>,
    #[serde(default)]
    total_percent: Option<f64>,
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid date '{raw}' (expected YYYY-MM-DD)"))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("invalid assessment id '{raw}'"))
}

impl TomlAssessment {
    fn into_assessment(self, validator: &ScoreValidator) -> Result<Assessment> {
        // Accept both `date = "2024-01-01"` and a bare TOML date.
        let date = match &self.date {
            toml::Value::String(s) => parse_date(s)?,
            toml::Value::Datetime(dt) => parse_date(&dt.to_string())?,
            other => anyhow::bail!("invalid date value: {other}"),
        };

        let scores = self
            .scores
            .into_iter()
            .map(|(key, score)| {
                let category: Category = key.parse().map_err(|e: String| anyhow::anyhow!(e))?;
                Ok((category, score))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        let record = AssessmentRecord {
            id: self.id.as_deref().map(parse_id).transpose()?,
            participant_id: self.participant,
            date,
            scores,
            total_achieved: self.total_achieved,
            total_maximum: self.total_maximum,
            total_percent: self.total_percent,
        };
        Ok(record.into_assessment(validator)?)
    }
}

/// Parse a single dataset file, choosing the format by extension.
pub fn parse_dataset(path: &Path, validator: &ScoreValidator) -> Result<Dataset> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read dataset file: {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => parse_csv_str(&content, path, validator),
        _ => parse_dataset_str(&content, path, validator),
    }
}

/// Parse a TOML string into a `Dataset` (useful for testing).
pub fn parse_dataset_str(
    content: &str,
    source_path: &Path,
    validator: &ScoreValidator,
) -> Result<Dataset> {
    let parsed: TomlDatasetFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let assessments = parsed
        .assessments
        .into_iter()
        .enumerate()
        .map(|(i, a)| {
            let participant = a.participant.clone();
            a.into_assessment(validator).with_context(|| {
                format!(
                    "{}: assessment #{} (participant {participant})",
                    source_path.display(),
                    i + 1
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Dataset {
        name: parsed
            .dataset
            .map(|d| d.name)
            .unwrap_or_else(|| file_stem(source_path)),
        participants: parsed.participants,
        assessments,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Column positions of a CSV header.
struct CsvColumns {
    participant: usize,
    date: usize,
    id: Option<usize>,
    name: Option<usize>,
    cohort: Option<usize>,
    scores: Vec<(Category, usize, usize)>,
}

impl CsvColumns {
    fn from_header(header: &csv::StringRecord) -> Result<Self> {
        let index: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().to_lowercase(), i))
            .collect();
        let find = |name: &str| index.get(name).copied();
        let require = |name: &str| find(name).with_context(|| format!("missing column '{name}'"));

        let participant = find("participant_id")
            .or_else(|| find("participant"))
            .context("missing column 'participant'")?;

        let scores = Category::ALL
            .into_iter()
            .map(|c| {
                let achieved = require(&format!("{}_{}", c.key(), ScoreKind::Achieved))?;
                let maximum = require(&format!("{}_{}", c.key(), ScoreKind::Maximum))?;
                Ok((c, achieved, maximum))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            participant,
            date: require("date")?,
            id: find("id"),
            name: find("name"),
            cohort: find("cohort"),
            scores,
        })
    }
}

/// Parse CSV text with one assessment per row.
///
/// Required columns: `participant`, `date` and `<category>_achieved` /
/// `<category>_maximum` for every category. Optional: `id`, `name`, `cohort`.
pub fn parse_csv_str(
    content: &str,
    source_path: &Path,
    validator: &ScoreValidator,
) -> Result<Dataset> {
    parse_csv_reader(content.as_bytes(), source_path, validator)
}

pub fn parse_csv_reader<R: Read>(
    reader: R,
    source_path: &Path,
    validator: &ScoreValidator,
) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let header = reader
        .headers()
        .with_context(|| format!("failed to read CSV header: {}", source_path.display()))?
        .clone();
    let columns = CsvColumns::from_header(&header)
        .with_context(|| format!("invalid CSV header: {}", source_path.display()))?;

    let mut participants: Vec<Participant> = Vec::new();
    let mut assessments = Vec::new();

    for result in reader.records() {
        let record = result
            .with_context(|| format!("failed to read CSV row: {}", source_path.display()))?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();

        let assessment = parse_csv_row(&record, &columns, validator)
            .with_context(|| format!("{}: line {line}", source_path.display()))?;

        if let Some(name) = columns.name.and_then(|i| record.get(i)).filter(|n| !n.is_empty()) {
            if !participants.iter().any(|p| p.id == assessment.participant_id()) {
                participants.push(Participant {
                    id: assessment.participant_id().to_string(),
                    name: name.to_string(),
                    cohort: columns
                        .cohort
                        .and_then(|i| record.get(i))
                        .filter(|c| !c.is_empty())
                        .map(str::to_string),
                });
            }
        }
        assessments.push(assessment);
    }

    Ok(Dataset {
        name: file_stem(source_path),
        participants,
        assessments,
    })
}

fn parse_csv_row(
    record: &csv::StringRecord,
    columns: &CsvColumns,
    validator: &ScoreValidator,
) -> Result<Assessment> {
    let cell = |i: usize| record.get(i).unwrap_or_default();

    let participant_id = cell(columns.participant);
    if participant_id.is_empty() {
        anyhow::bail!("participant is empty");
    }

    let mut scores = BTreeMap::new();
    for &(category, achieved, maximum) in &columns.scores {
        let score = CategoryScore {
            achieved: validator.parse_value(category, ScoreKind::Achieved, cell(achieved))?,
            maximum: validator.parse_value(category, ScoreKind::Maximum, cell(maximum))?,
        };
        scores.insert(category, score);
    }

    let id = match columns.id.map(cell).filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_id(raw)?),
        None => None,
    };

    let record = AssessmentRecord {
        id,
        participant_id: participant_id.to_string(),
        date: parse_date(cell(columns.date))?,
        scores,
        total_achieved: None,
        total_maximum: None,
        total_percent: None,
    };
    Ok(record.into_assessment(validator)?)
}

/// Load a dataset from a file or, recursively, from a directory.
pub fn load_dataset(path: &Path, validator: &ScoreValidator) -> Result<Dataset> {
    if path.is_dir() {
        load_dataset_directory(path, validator)
    } else {
        parse_dataset(path, validator)
    }
}

/// Recursively load and merge all `.toml` and `.csv` files under a directory.
///
/// The merged dataset is named after the directory. Files that fail to parse
/// and subdirectories that cannot be read are skipped with a warning.
pub fn load_dataset_directory(dir: &Path, validator: &ScoreValidator) -> Result<Dataset> {
    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    paths.sort();

    let mut dataset = Dataset::default();
    for path in paths {
        if path.is_dir() {
            match load_dataset_directory(&path, validator) {
                Ok(nested) => dataset.merge(nested),
                Err(e) => tracing::warn!("skipping {}: {:#}", path.display(), e),
            }
        } else if path
            .extension()
            .is_some_and(|ext| ext == "toml" || ext == "csv")
        {
            match parse_dataset(&path, validator) {
                Ok(loaded) => {
                    tracing::debug!(
                        "loaded {} assessment(s) from {}",
                        loaded.assessments.len(),
                        path.display()
                    );
                    dataset.merge(loaded);
                }
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    dataset.name = file_stem(dir);
    Ok(dataset)
}

/// A warning from dataset validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The participant concerned (if applicable).
    pub participant_id: Option<String>,
    /// The assessment concerned (if applicable).
    pub assessment_id: Option<Uuid>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn participant(id: &str, message: impl Into<String>) -> Self {
        Self {
            participant_id: Some(id.to_string()),
            assessment_id: None,
            message: message.into(),
        }
    }

    fn assessment(a: &Assessment, message: impl Into<String>) -> Self {
        Self {
            participant_id: Some(a.participant_id().to_string()),
            assessment_id: Some(a.id()),
            message: message.into(),
        }
    }
}

/// Validate a dataset for common issues.
pub fn validate_dataset(dataset: &Dataset, validator: &ScoreValidator) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    // Duplicate participant declarations
    let mut declared = HashSet::new();
    for p in &dataset.participants {
        if !declared.insert(p.id.as_str()) {
            warnings.push(ValidationWarning::participant(
                &p.id,
                format!("participant {} is declared more than once", p.id),
            ));
        }
    }

    // Duplicate assessment IDs
    let mut seen_ids = HashSet::new();
    for a in &dataset.assessments {
        if !seen_ids.insert(a.id()) {
            warnings.push(ValidationWarning::assessment(
                a,
                format!("duplicate assessment ID: {}", a.id()),
            ));
        }
    }

    // Assessments for undeclared participants
    if !dataset.participants.is_empty() {
        for a in &dataset.assessments {
            if !declared.contains(a.participant_id()) {
                warnings.push(ValidationWarning::assessment(
                    a,
                    format!("participant {} is not declared", a.participant_id()),
                ));
            }
        }
    }

    // Score rules
    for a in &dataset.assessments {
        if let Err(e) = validator.check_within_maximum(a.scores()) {
            warnings.push(ValidationWarning::assessment(a, e.to_string()));
        }
        if let Err(e) = validator.check_policy(a.scores()) {
            warnings.push(ValidationWarning::assessment(a, e.to_string()));
        }
    }

    // Several assessments on the same day
    let mut per_day: BTreeMap<(&str, NaiveDate), usize> = BTreeMap::new();
    for a in &dataset.assessments {
        *per_day.entry((a.participant_id(), a.date())).or_default() += 1;
    }
    for ((participant, date), count) in per_day {
        if count > 1 {
            warnings.push(ValidationWarning::participant(
                participant,
                format!("{count} assessments on {date}; forecasts count one date"),
            ));
        }
    }

    // Participants without history
    let assessed: HashSet<&str> = dataset
        .assessments
        .iter()
        .map(Assessment::participant_id)
        .collect();
    for p in &dataset.participants {
        if !assessed.contains(p.id.as_str()) {
            warnings.push(ValidationWarning::participant(
                &p.id,
                format!("participant {} has no assessments", p.id),
            ));
        }
    }

    warnings
}
