//! Configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::engine::CohortEngineConfig;
use crate::forecast::{ForecastConfig, ForecastModelKind};
use crate::validator::ScoreValidator;

/// File name searched for in the current directory.
pub const CONFIG_FILE_NAME: &str = "skillcast.toml";

/// Top-level skillcast configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillcastConfig {
    /// Forecast settings.
    #[serde(default)]
    pub forecast: ForecastConfig,
    /// Window for the rolling mean in summaries.
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    /// Number of latest assessments in the "recent" headline.
    #[serde(default = "default_recent_window")]
    pub recent_window: usize,
    /// Max participants analysed concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// When set, category maxima must sum to this total.
    #[serde(default)]
    pub maximum_total: Option<f64>,
}

fn default_rolling_window() -> usize {
    2
}
fn default_recent_window() -> usize {
    2
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./skillcast-results")
}

impl Default for SkillcastConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            rolling_window: default_rolling_window(),
            recent_window: default_recent_window(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            maximum_total: None,
        }
    }
}

impl SkillcastConfig {
    /// Validator enforcing the configured maxima policy.
    pub fn validator(&self) -> ScoreValidator {
        ScoreValidator::with_maximum_total(self.maximum_total)
    }

    /// Settings for the cohort runner.
    pub fn engine_config(&self) -> CohortEngineConfig {
        CohortEngineConfig {
            parallelism: self.parallelism.max(1),
            rolling_window: self.rolling_window,
            recent_window: self.recent_window,
            forecast: self.forecast,
        }
    }

    /// Apply `SKILLCAST_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = lookup("SKILLCAST_HORIZON_DAYS") {
            self.forecast.horizon_days = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid SKILLCAST_HORIZON_DAYS: '{raw}'"))?;
        }
        if let Some(raw) = lookup("SKILLCAST_MODEL") {
            self.forecast.model = raw
                .parse::<ForecastModelKind>()
                .map_err(|e| anyhow::anyhow!("invalid SKILLCAST_MODEL: {e}"))?;
        }
        let output_dir = self.output_dir.to_string_lossy().into_owned();
        if output_dir.contains("${") {
            self.output_dir = PathBuf::from(resolve_env_vars(&output_dir, &lookup));
        }
        Ok(())
    }
}

/// Resolve references like `${VAR_NAME}` in a string. Unset variables become empty.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = lookup(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order without a path:
/// 1. `skillcast.toml` in the current directory
/// 2. `~/.config/skillcast/config.toml`
///
/// Environment variable overrides: `SKILLCAST_HORIZON_DAYS`, `SKILLCAST_MODEL`.
pub fn load_config_from(path: Option<&Path>) -> Result<SkillcastConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            parse_config_file(&path)?
        }
        None => SkillcastConfig::default(),
    };

    config.apply_overrides(|name| std::env::var(name).ok())?;
    Ok(config)
}

fn parse_config_file(path: &Path) -> Result<SkillcastConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    toml::from_str::<SkillcastConfig>(&content)
        .with_context(|| format!("failed to parse config: {}", path.display()))
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("skillcast"))
}

/// Default config file contents written by `skillcast init`.
pub fn default_config_toml() -> &'static str {
    r#"# skillcast configuration

# Rolling mean window (assessments) in participant summaries.
rolling_window = 2
# Number of latest assessments averaged for the "recent" headline.
recent_window = 2
# Participants analysed concurrently by `skillcast cohort`.
parallelism = 4
# Where reports are written. ${VAR} references are expanded.
output_dir = "./skillcast-results"
# Uncomment to require category maxima to sum to a fixed total.
# maximum_total = 100.0

[forecast]
horizon_days = 30
interval_level = 0.8
sigma_floor = 1.0
# "linear" (least squares) or "robust" (Theil-Sen)
model = "linear"
"#
}
