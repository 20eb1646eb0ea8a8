//! Single point of failure files: files one author dominates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use repopulse_core::{MetricParams, PulseError, RiskLevel};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome};
use crate::heuristics::{FileScorer, HeuristicScorer};
use crate::source::{CommitRecord, RepositorySource};
use crate::stats;
use crate::window::{self, commits_in_window, lookback_start};

/// Registry name.
pub const NAME: &str = "single_point_failure";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &[
    "lookback_months",
    "dominance_threshold",
    "min_contributor_threshold",
    "as_of",
];

/// Parameters for [`SinglePointFailureAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SinglePointFailureOptions {
    /// Months of history to consider (default: 6).
    pub lookback_months: u32,
    /// Flag files where one author's share exceeds this (default: 0.9).
    pub dominance_threshold: f64,
    /// Flag only files with fewer contributors than this (default: 3).
    pub min_contributor_threshold: u32,
    /// End of the window.
    pub as_of: DateTime<Utc>,
}

impl Default for SinglePointFailureOptions {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            dominance_threshold: 0.9,
            min_contributor_threshold: 3,
            as_of: Utc::now(),
        }
    }
}

impl SinglePointFailureOptions {
    /// Read and validate options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys or
    /// out-of-range values.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            lookback_months: reader
                .u32("lookback_months")?
                .unwrap_or(defaults.lookback_months),
            dominance_threshold: reader
                .f64("dominance_threshold")?
                .unwrap_or(defaults.dominance_threshold),
            min_contributor_threshold: reader
                .u32("min_contributor_threshold")?
                .unwrap_or(defaults.min_contributor_threshold),
            as_of: reader.time("as_of")?.unwrap_or(defaults.as_of),
        };
        reader.finish()?;

        window::ensure_nonzero(NAME, "lookback_months", options.lookback_months)?;
        window::ensure_at_most(
            NAME,
            "lookback_months",
            options.lookback_months,
            window::MAX_LOOKBACK_MONTHS,
        )?;
        window::ensure_fraction(NAME, "dominance_threshold", options.dominance_threshold)?;
        window::ensure_nonzero(
            NAME,
            "min_contributor_threshold",
            options.min_contributor_threshold,
        )?;
        Ok(options)
    }
}

/// A file dominated by one author.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpofFile {
    /// Path relative to the repository root.
    pub file: String,
    /// First author to reach the highest contribution.
    pub dominant_author: String,
    /// Dominant author's share of all changes.
    pub dominance_ratio: f64,
    /// Distinct authors.
    pub contributor_count: usize,
    /// Commits touching the file.
    pub total_changes: usize,
    /// Commits per author, in first-seen order.
    pub author_contributions: IndexMap<String, usize>,
    /// Commits touching the file in the window.
    pub recent_commits: usize,
    /// HIGH, MEDIUM or LOW.
    pub file_criticality: RiskLevel,
}

/// Counts by file criticality.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct CriticalityDistribution {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Summary over the flagged files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpofAnalysis {
    pub total_spof_files: usize,
    pub criticality_distribution: CriticalityDistribution,
    pub avg_dominance_ratio: f64,
    pub avg_contributor_count: f64,
    /// Authors dominating more than one file, with their file count.
    pub multi_file_dominators: BTreeMap<String, usize>,
    /// The five files with the highest dominance.
    pub highest_risk_files: Vec<SpofFile>,
    pub risk_summary: String,
}

/// Single point of failure result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinglePointFailureReport {
    /// Flagged files, highest dominance first.
    pub spof_files: Vec<SpofFile>,
    /// Number of flagged files.
    pub spof_count: usize,
    /// Summary.
    pub analysis: SpofAnalysis,
    /// Overall risk.
    pub risk_level: RiskLevel,
    /// Advice.
    pub recommendations: Vec<String>,
}

/// Find the dominated files in `commits`, highest dominance first.
pub fn find_spof_files(
    commits: &[CommitRecord],
    dominance_threshold: f64,
    min_contributor_threshold: u32,
    scorer: &dyn FileScorer,
) -> Vec<SpofFile> {
    let mut by_file: IndexMap<&str, IndexMap<String, usize>> = IndexMap::new();
    for commit in commits {
        for change in &commit.files {
            *by_file
                .entry(change.path.as_str())
                .or_default()
                .entry(commit.author.clone())
                .or_insert(0) += 1;
        }
    }

    let mut flagged = Vec::new();
    for (path, contributions) in by_file {
        let total: usize = contributions.values().sum();
        if total == 0 {
            continue;
        }
        let max = contributions.values().copied().max().unwrap_or(0);
        let ratio = max as f64 / total as f64;
        let contributor_count = contributions.len();
        if ratio <= dominance_threshold || contributor_count >= min_contributor_threshold as usize {
            continue;
        }
        let dominant_author = contributions
            .iter()
            .find(|(_, count)| **count == max)
            .map(|(author, _)| author.clone())
            .unwrap_or_default();
        flagged.push(SpofFile {
            file: path.to_string(),
            dominant_author,
            dominance_ratio: ratio,
            contributor_count,
            total_changes: total,
            author_contributions: contributions,
            recent_commits: total,
            file_criticality: scorer.file_criticality(path),
        });
    }
    flagged.sort_by(|a, b| b.dominance_ratio.total_cmp(&a.dominance_ratio));
    flagged
}

/// One-sentence risk summary.
pub fn risk_summary(total: usize, high_criticality: usize) -> String {
    if high_criticality > 5 {
        format!("CRITICAL: {high_criticality} high-criticality SPOF files detected")
    } else if high_criticality > 2 {
        format!("HIGH RISK: {high_criticality} high-criticality SPOF files detected")
    } else if total > 10 {
        format!("MODERATE RISK: {total} SPOF files detected")
    } else if total > 0 {
        format!("LOW RISK: {total} SPOF files detected")
    } else {
        "No single points of failure detected".to_string()
    }
}

/// Overall risk from the flagged and high-criticality counts.
///
/// # Examples
///
/// ```
/// use repopulse_core::RiskLevel;
/// use repopulse_metrics::single_point_failure::overall_risk;
///
/// assert_eq!(overall_risk(21, 0), RiskLevel::Critical);
/// assert_eq!(overall_risk(3, 3), RiskLevel::High);
/// assert_eq!(overall_risk(1, 1), RiskLevel::Medium);
/// assert_eq!(overall_risk(4, 0), RiskLevel::Low);
/// ```
pub fn overall_risk(total: usize, high_criticality: usize) -> RiskLevel {
    if high_criticality > 5 || total > 20 {
        RiskLevel::Critical
    } else if high_criticality > 2 || total > 10 {
        RiskLevel::High
    } else if high_criticality > 0 || total > 5 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Summarize flagged files.
pub fn summarize(files: &[SpofFile]) -> SpofAnalysis {
    let mut distribution = CriticalityDistribution::default();
    let mut dominated: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        match file.file_criticality {
            RiskLevel::High | RiskLevel::Critical => distribution.high += 1,
            RiskLevel::Medium => distribution.medium += 1,
            RiskLevel::Low => distribution.low += 1,
        }
        *dominated.entry(file.dominant_author.clone()).or_insert(0) += 1;
    }
    dominated.retain(|_, count| *count > 1);

    let ratios: Vec<f64> = files.iter().map(|f| f.dominance_ratio).collect();
    let contributors: Vec<f64> = files.iter().map(|f| f.contributor_count as f64).collect();

    SpofAnalysis {
        total_spof_files: files.len(),
        risk_summary: risk_summary(files.len(), distribution.high),
        criticality_distribution: distribution,
        avg_dominance_ratio: stats::mean(&ratios),
        avg_contributor_count: stats::mean(&contributors),
        multi_file_dominators: dominated,
        highest_risk_files: files.iter().take(5).cloned().collect(),
    }
}

/// Advice for the flagged files.
pub fn recommend(files: &[SpofFile]) -> Vec<String> {
    let count = files.len();
    if count == 0 {
        return vec!["Excellent! No single points of failure detected".to_string()];
    }

    let mut recs: Vec<String> = Vec::new();
    if count > 20 {
        recs.extend(
            [
                "URGENT: Critical number of SPOF files detected",
                "Implement immediate knowledge transfer sessions",
                "Establish mandatory pair programming for all SPOF files",
                "Create comprehensive documentation for all SPOF files",
            ]
            .map(String::from),
        );
    } else if count > 10 {
        recs.extend(
            [
                "High risk: Significant number of SPOF files",
                "Prioritize knowledge sharing for critical files",
                "Implement code review requirements for SPOF files",
            ]
            .map(String::from),
        );
    } else if count > 5 {
        recs.extend(
            [
                "Moderate risk: Address SPOF files systematically",
                "Encourage more contributors to work on isolated files",
            ]
            .map(String::from),
        );
    }

    let high = files
        .iter()
        .filter(|f| f.file_criticality == RiskLevel::High)
        .count();
    if high > 0 {
        recs.push(format!("PRIORITY: {high} critical files have SPOF risk"));
        recs.push("Schedule immediate knowledge transfer for critical files".to_string());
        recs.push("Consider refactoring to reduce complexity of critical files".to_string());
    }

    // authors in first-seen order
    let mut per_author: IndexMap<&str, usize> = IndexMap::new();
    for file in files {
        *per_author.entry(file.dominant_author.as_str()).or_insert(0) += 1;
    }
    let multi: Vec<&str> = per_author
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(author, _)| author)
        .collect();
    if !multi.is_empty() {
        recs.push(format!(
            "Focus on knowledge transfer from authors who dominate multiple files: {}",
            multi.join(", ")
        ));
    }
    recs
}

/// Flags files where one author made nearly every change.
pub struct SinglePointFailureAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
    scorer: Box<dyn FileScorer + 'a>,
}

impl<'a> SinglePointFailureAnalyzer<'a> {
    /// Analyzer over `repo` using [`HeuristicScorer`].
    pub fn new(repo: &'a dyn RepositorySource) -> Self {
        Self {
            repo,
            scorer: Box::new(HeuristicScorer),
        }
    }

    /// Replace the file scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl FileScorer + 'a) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error for the commit window.
    pub fn analyze(
        &self,
        options: &SinglePointFailureOptions,
    ) -> Result<Outcome<SinglePointFailureReport>, PulseError> {
        let since = lookback_start(NAME, options.as_of, options.lookback_months)?;
        let commits = commits_in_window(self.repo, since, options.as_of)?;
        if commits.is_empty() {
            return Ok(Outcome::no_data("No commits found in the specified timeframe"));
        }

        let files = find_spof_files(
            &commits,
            options.dominance_threshold,
            options.min_contributor_threshold,
            self.scorer.as_ref(),
        );
        let analysis = summarize(&files);
        tracing::debug!(flagged = files.len(), "single point of failure scan done");

        Ok(Outcome::Complete(SinglePointFailureReport {
            spof_count: files.len(),
            risk_level: overall_risk(files.len(), analysis.criticality_distribution.high),
            recommendations: recommend(&files),
            analysis,
            spof_files: files,
        }))
    }
}

impl MetricAnalyzer for SinglePointFailureAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Single Point of Failure Files"
    }

    fn description(&self) -> &'static str {
        "Identifies files with dangerously low contributor diversity where one person dominates changes."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = SinglePointFailureOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result.report() {
            Some(MetricReport::SinglePointFailure(report)) => recommend(&report.spof_files),
            _ => Vec::new(),
        }
    }
}
