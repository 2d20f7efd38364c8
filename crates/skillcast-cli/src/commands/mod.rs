pub mod cohort;
pub mod forecast;
pub mod init;
pub mod summary;
pub mod validate;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use skillcast_core::config::{load_config_from, SkillcastConfig};
use skillcast_core::model::Dataset;
use skillcast_core::parser;

/// Load the config, then the dataset under its validation rules.
fn load(data: &Path, config_path: Option<PathBuf>) -> Result<(SkillcastConfig, Dataset)> {
    let config = load_config_from(config_path.as_deref())?;
    let dataset = parser::load_dataset(data, &config.validator())?;
    Ok((config, dataset))
}

fn pct(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}%"))
}

/// Print to stdout, or write to `out` when given.
fn emit(content: &str, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Written to: {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}
