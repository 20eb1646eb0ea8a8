//! Path and content heuristics for file complexity and criticality.
//!
//! Analyzers take a [`FileScorer`]; every method has a default based on
//! file names, extensions and keyword counts. [`HeuristicScorer`] uses the
//! defaults as-is. A scorer backed by real parsing overrides the methods it
//! can do better.

use std::sync::LazyLock;

use regex::Regex;
use repopulse_core::RiskLevel;

/// Name fragments marking a file as central to the project.
pub const CORE_NAME_FRAGMENTS: &[&str] = &[
    "main",
    "index",
    "app",
    "core",
    "base",
    "config",
    "__init__",
    "setup",
    "requirements",
];

/// Complexity multiplier by extension, first match wins.
const EXTENSION_WEIGHTS: &[(&str, f64)] = &[
    (".py", 1.0),
    (".js", 1.0),
    (".ts", 1.0),
    (".rs", 1.0),
    (".java", 1.2),
    (".cpp", 1.3),
    (".c", 1.3),
    (".h", 1.1),
    (".css", 0.5),
    (".html", 0.3),
    (".md", 0.2),
    (".txt", 0.1),
];

const DEFAULT_EXTENSION_WEIGHT: f64 = 0.8;

const SOURCE_EXTENSIONS: &[&str] = &[".py", ".js", ".ts", ".java", ".cpp", ".c", ".rs"];

const SOURCE_DIRECTORIES: &[&str] = &["src", "lib", "core", "main"];

static DECISION_POINTS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bif\b",
        r"(?i)\belif\b",
        r"(?i)\belse\b",
        r"(?i)\bfor\b",
        r"(?i)\bwhile\b",
        r"(?i)\bdo\b",
        r"(?i)\btry\b",
        r"(?i)\bcatch\b",
        r"(?i)\bexcept\b",
        r"(?i)\bcase\b",
        r"(?i)\bswitch\b",
        r"&&",
        r"\|\|",
        r"\?.*:",
        r"(?i)\bthrow\b",
        r"(?i)\braise\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("valid regex literal"))
    .collect()
});

/// Scores files for the knowledge and criticality analyzers.
pub trait FileScorer {
    /// Knowledge multiplier for a file type (bus factor weights).
    fn extension_weight(&self, path: &str) -> f64 {
        EXTENSION_WEIGHTS
            .iter()
            .find(|(ext, _)| path.ends_with(ext))
            .map_or(DEFAULT_EXTENSION_WEIGHT, |(_, weight)| *weight)
    }

    /// Knowledge multiplier for central files: 1.5 for core names, else 1.0.
    fn name_criticality(&self, path: &str) -> f64 {
        if has_core_name(path) {
            1.5
        } else {
            1.0
        }
    }

    /// Complexity estimate from source text.
    ///
    /// `min(LOC/100, 5) × min(decision_points/10, 5)` where LOC counts
    /// non-blank lines and decision points start at 1. Missing or empty
    /// text scores 1.0.
    fn content_complexity(&self, content: Option<&str>) -> f64 {
        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return 1.0;
        };
        let loc = content.lines().filter(|l| !l.trim().is_empty()).count();
        let decisions = 1 + DECISION_POINTS
            .iter()
            .map(|re| re.find_iter(content).count())
            .sum::<usize>();
        let size_factor = (loc as f64 / 100.0).min(5.0);
        let decision_factor = (decisions as f64 / 10.0).min(5.0);
        size_factor * decision_factor
    }

    /// How much of the codebase is likely to depend on this file.
    ///
    /// Starts at 1.0, ×1.5 for a source extension, ×2.0 for a core name
    /// (including `package`), ×1.3 when a directory segment is a source root.
    fn dependency_impact(&self, path: &str) -> f64 {
        let mut impact = 1.0;
        if SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            impact *= 1.5;
        }
        if has_core_name(path) || path.to_lowercase().contains("package") {
            impact *= 2.0;
        }
        if path.contains('/') && path.split('/').any(|part| SOURCE_DIRECTORIES.contains(&part)) {
            impact *= 1.3;
        }
        impact
    }

    /// Criticality class: HIGH for core names, MEDIUM for source files, else LOW.
    fn file_criticality(&self, path: &str) -> RiskLevel {
        if has_core_name(path) {
            RiskLevel::High
        } else if path.ends_with(".h") || SOURCE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// The default name/extension based scorer.
///
/// # Examples
///
/// ```
/// use repopulse_core::RiskLevel;
/// use repopulse_metrics::heuristics::{FileScorer, HeuristicScorer};
///
/// let scorer = HeuristicScorer;
/// assert_eq!(scorer.extension_weight("src/engine.cpp"), 1.3);
/// assert_eq!(scorer.name_criticality("src/config.py"), 1.5);
/// assert_eq!(scorer.file_criticality("docs/guide.md"), RiskLevel::Low);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl FileScorer for HeuristicScorer {}

fn has_core_name(path: &str) -> bool {
    let lower = path.to_lowercase();
    CORE_NAME_FRAGMENTS.iter().any(|fragment| lower.contains(fragment))
}
