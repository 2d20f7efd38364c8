//! The `skillcast validate` command.

use std::path::PathBuf;

use anyhow::Result;

use skillcast_core::config::load_config_from;
use skillcast_core::parser;
use skillcast_core::validator::{MaximumPolicy, ScoreValidator};

pub fn execute(data_path: PathBuf, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;

    // Parse without the maxima policy so every violation is listed, not just the first.
    let lenient = ScoreValidator::new(MaximumPolicy::Any);
    let dataset = parser::load_dataset(&data_path, &lenient)?;

    println!(
        "Dataset: {} ({} participants, {} assessments)",
        dataset.name,
        dataset.all_participants().len(),
        dataset.assessments.len()
    );

    let warnings = parser::validate_dataset(&dataset, &config.validator());
    for w in &warnings {
        let prefix = w
            .participant_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Dataset valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
