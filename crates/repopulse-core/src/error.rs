use std::path::PathBuf;

/// Errors that can occur across repopulse.
///
/// Data absence is never an error: analyzers report it inside their result.
/// This type covers configuration mistakes and collaborator failures.
///
/// # Examples
///
/// ```
/// use repopulse_core::PulseError;
///
/// let err = PulseError::Config("missing metrics table".into());
/// assert!(err.to_string().contains("missing metrics table"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum PulseError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// Repository data source failure other than git itself.
    #[error("data source error: {0}")]
    Source(String),

    /// The registry has no analyzer under this name.
    #[error("unknown metric '{name}'. Available metrics: {available}")]
    #[diagnostic(help("run `repopulse metrics` to list the registered analyzers"))]
    UnknownMetric {
        /// The requested name.
        name: String,
        /// Comma separated registered names.
        available: String,
    },

    /// A parameter was unrecognized, mistyped, or out of range.
    #[error("invalid parameter for {metric}: {message}")]
    #[diagnostic(help("parameters are passed as --param key=value"))]
    InvalidParameter {
        /// Registry name of the analyzer that rejected the parameter.
        metric: String,
        /// What was wrong with it.
        message: String,
    },

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}

impl PulseError {
    /// Shorthand for [`PulseError::InvalidParameter`].
    pub fn invalid_parameter(metric: &str, message: impl Into<String>) -> Self {
        PulseError::InvalidParameter {
            metric: metric.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PulseError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn config_error_displays_message() {
        let err = PulseError::Config("bad value".into());
        assert_eq!(err.to_string(), "configuration error: bad value");
    }

    #[test]
    fn unknown_metric_lists_available_names() {
        let err = PulseError::UnknownMetric {
            name: "nope".into(),
            available: "bus_factor, cycle_time".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'nope'"));
        assert!(msg.contains("bus_factor, cycle_time"));
    }

    #[test]
    fn invalid_parameter_names_metric() {
        let err = PulseError::invalid_parameter("bus_factor", "knowledge_threshold must be in [0, 1]");
        assert_eq!(
            err.to_string(),
            "invalid parameter for bus_factor: knowledge_threshold must be in [0, 1]"
        );
    }

    #[test]
    fn file_not_found_shows_path() {
        let err = PulseError::FileNotFound(PathBuf::from("/tmp/.repopulse.toml"));
        assert!(err.to_string().contains("/tmp/.repopulse.toml"));
    }
}
