use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::PulseError;
use crate::params::MetricParams;
use crate::types::OutputFormat;

/// Top-level configuration loaded from `.repopulse.toml`.
///
/// Resolution order for analyzer parameters: `--param` flags, then the
/// `[metrics.<name>]` table, then the analyzer's own defaults.
///
/// # Examples
///
/// ```
/// use repopulse_core::{OutputFormat, PulseConfig};
///
/// let config = PulseConfig::default();
/// assert_eq!(config.output.format, OutputFormat::Text);
/// assert!(config.source.max_files_per_commit.is_none());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Report rendering settings.
    #[serde(default)]
    pub output: OutputConfig,
    /// History mining settings.
    #[serde(default)]
    pub source: SourceConfig,
    /// Default parameters per analyzer, keyed by registry name.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricParams>,
}

impl PulseConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::FileNotFound`] if `path` does not exist,
    /// [`PulseError::Io`] if it cannot be read, or [`PulseError::Toml`] if
    /// the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use repopulse_core::PulseConfig;
    /// use std::path::Path;
    ///
    /// let config = PulseConfig::from_file(Path::new(".repopulse.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, PulseError> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PulseError::FileNotFound(path.to_path_buf()),
            _ => PulseError::Io(e),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_core::{ParamValue, PulseConfig};
    ///
    /// let toml = r#"
    /// [metrics.bus_factor]
    /// lookback_months = 12
    /// "#;
    /// let config = PulseConfig::from_toml(toml).unwrap();
    /// assert_eq!(
    ///     config.metric_params("bus_factor").get("lookback_months"),
    ///     Some(&ParamValue::Int(12))
    /// );
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PulseError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Configured parameters for `metric`, empty when the table is absent.
    pub fn metric_params(&self, metric: &str) -> MetricParams {
        self.metrics.get(metric).cloned().unwrap_or_default()
    }
}

/// Output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Default output format when `--format` is not given.
    #[serde(default)]
    pub format: OutputFormat,
}

/// History mining configuration.
///
/// # Examples
///
/// ```
/// use repopulse_core::SourceConfig;
///
/// let config = SourceConfig::default();
/// assert_eq!(config.max_files_per_commit, None);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Skip commits touching more files than this (bulk renames, vendoring).
    #[serde(default)]
    pub max_files_per_commit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use crate::params::ParamValue;

    use super::*;

    #[test]
    fn missing_file_is_file_not_found() {
        let path = std::env::temp_dir().join("repopulse-no-such-dir").join(".repopulse.toml");
        let err = PulseConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, PulseError::FileNotFound(ref missing) if *missing == path));
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = PulseConfig::from_toml("").unwrap();
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.metrics.is_empty());
        assert!(config.source.max_files_per_commit.is_none());
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = PulseConfig::from_toml("{{invalid}}");
        assert!(matches!(result, Err(PulseError::Toml(_))));
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
[output]
format = "json"

[source]
max_files_per_commit = 200

[metrics.velocity_trend]
weeks_lookback = 8

[metrics.cycle_time]
branch_patterns = ["feature/*", "hotfix/*"]
lookback_months = 3
"#;
        let config = PulseConfig::from_toml(toml).unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.source.max_files_per_commit, Some(200));
        assert_eq!(
            config.metric_params("velocity_trend").get("weeks_lookback"),
            Some(&ParamValue::Int(8))
        );
        let cycle = config.metric_params("cycle_time");
        assert_eq!(cycle.len(), 2);
        assert_eq!(
            cycle.get("branch_patterns"),
            Some(&ParamValue::List(vec!["feature/*".into(), "hotfix/*".into()]))
        );
    }

    #[test]
    fn missing_metric_table_is_empty() {
        let config = PulseConfig::from_toml("[output]\nformat = \"markdown\"\n").unwrap();
        assert!(config.metric_params("bus_factor").is_empty());
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        assert!(PulseConfig::from_toml("[output]\nformat = \"sarif\"\n").is_err());
    }
}
