use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Categorical risk classification shared by the analyzers.
///
/// Serializes in upper case (`"CRITICAL"`), the way reports print it.
///
/// # Examples
///
/// ```
/// use repopulse_core::RiskLevel;
///
/// let level = RiskLevel::from_bus_factor(2);
/// assert_eq!(level, RiskLevel::High);
/// assert_eq!(level.to_string(), "HIGH");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Nothing needs attention.
    Low,
    /// Worth watching.
    Medium,
    /// Should be addressed soon.
    High,
    /// Needs immediate action.
    Critical,
}

impl RiskLevel {
    /// Map a project bus factor to a risk level.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_core::RiskLevel;
    ///
    /// assert_eq!(RiskLevel::from_bus_factor(0), RiskLevel::Critical);
    /// assert_eq!(RiskLevel::from_bus_factor(1), RiskLevel::Critical);
    /// assert_eq!(RiskLevel::from_bus_factor(3), RiskLevel::Medium);
    /// assert_eq!(RiskLevel::from_bus_factor(7), RiskLevel::Low);
    /// ```
    pub fn from_bus_factor(bus_factor: usize) -> Self {
        match bus_factor {
            0 | 1 => RiskLevel::Critical,
            2 => RiskLevel::High,
            3 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
            RiskLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use repopulse_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("sarif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn output_format_default_is_text() {
        assert_eq!(OutputFormat::default(), OutputFormat::Text);
    }

    #[test]
    fn risk_level_serializes_upper_case() {
        let json = serde_json::to_string(&RiskLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");

        let parsed: RiskLevel = serde_json::from_str("\"MEDIUM\"").unwrap();
        assert_eq!(parsed, RiskLevel::Medium);
    }

    #[test]
    fn risk_level_orders_by_severity() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High > RiskLevel::Medium);
        assert!(RiskLevel::Medium > RiskLevel::Low);
    }

    #[test]
    fn bus_factor_bands() {
        assert_eq!(RiskLevel::from_bus_factor(1), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_bus_factor(2), RiskLevel::High);
        assert_eq!(RiskLevel::from_bus_factor(3), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_bus_factor(4), RiskLevel::Low);
    }
}
