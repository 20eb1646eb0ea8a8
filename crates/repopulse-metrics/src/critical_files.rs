//! Critical file identification.
//!
//! Each file touched in the window is scored as
//! `change_frequency × complexity × dependency_impact`; the top slice of the
//! ranking is flagged critical.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use repopulse_core::{MetricParams, PulseError, RiskLevel};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome, SkippedItem};
use crate::heuristics::{FileScorer, HeuristicScorer};
use crate::source::RepositorySource;
use crate::stats;
use crate::window::{self, commits_in_window, lookback_start};

/// Registry name.
pub const NAME: &str = "critical_files";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["lookback_months", "critical_threshold_percentile", "as_of"];

/// Parameters for [`CriticalFileAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct CriticalFilesOptions {
    /// Months of history to consider (default: 6).
    pub lookback_months: u32,
    /// Files above this rank percentile are critical (default: 0.8, the top 20%).
    pub critical_threshold_percentile: f64,
    /// End of the window.
    pub as_of: DateTime<Utc>,
}

impl Default for CriticalFilesOptions {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            critical_threshold_percentile: 0.8,
            as_of: Utc::now(),
        }
    }
}

impl CriticalFilesOptions {
    /// Read and validate options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys, a zero or
    /// oversized lookback or a percentile outside `[0, 1]`.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            lookback_months: reader
                .u32("lookback_months")?
                .unwrap_or(defaults.lookback_months),
            critical_threshold_percentile: reader
                .f64("critical_threshold_percentile")?
                .unwrap_or(defaults.critical_threshold_percentile),
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
        window::ensure_fraction(
            NAME,
            "critical_threshold_percentile",
            options.critical_threshold_percentile,
        )?;
        Ok(options)
    }
}

/// Scores for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetrics {
    /// Path relative to the repository root.
    pub file: String,
    /// Commits touching the file in the window.
    pub change_frequency: usize,
    /// Content complexity estimate.
    pub complexity: f64,
    /// Dependency impact estimate.
    pub dependency_impact: f64,
    /// `change_frequency × complexity × dependency_impact`.
    pub criticality_score: f64,
    /// Lines of current text, 0 when unavailable.
    pub file_size: usize,
    /// Newest commit touching the file.
    pub last_modified: DateTime<Utc>,
    /// CRITICAL, HIGH or MEDIUM.
    pub risk_level: RiskLevel,
}

/// Per-file risk bucket counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct RiskCategories {
    /// complexity > 10 or frequency > 20
    pub critical: usize,
    /// complexity > 5 or frequency > 10
    pub high: usize,
    /// everything else
    pub medium: usize,
}

/// Summary over the critical files.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalFilesAnalysis {
    /// Mean criticality score.
    pub avg_criticality_score: f64,
    /// Highest criticality score.
    pub max_criticality_score: f64,
    /// Mean change frequency.
    pub avg_change_frequency: f64,
    /// Mean complexity.
    pub avg_complexity: f64,
    /// Extension histogram (`no_extension` for bare names).
    pub file_types: BTreeMap<String, usize>,
    /// Risk bucket counts.
    pub risk_categories: RiskCategories,
}

/// Critical file result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriticalFilesReport {
    /// Flagged files, highest score first.
    pub critical_files: Vec<FileMetrics>,
    /// Files scored.
    pub total_files_analyzed: usize,
    /// Files flagged.
    pub critical_file_count: usize,
    /// Summary.
    pub analysis: CriticalFilesAnalysis,
    /// Files whose text could not be read.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
    /// Advice.
    pub recommendations: Vec<String>,
}

/// Risk bucket from complexity and change frequency.
///
/// # Examples
///
/// ```
/// use repopulse_core::RiskLevel;
/// use repopulse_metrics::critical_files::file_risk;
///
/// assert_eq!(file_risk(11.0, 1), RiskLevel::Critical);
/// assert_eq!(file_risk(1.0, 15), RiskLevel::High);
/// assert_eq!(file_risk(5.0, 10), RiskLevel::Medium);
/// ```
pub fn file_risk(complexity: f64, change_frequency: usize) -> RiskLevel {
    if complexity > 10.0 || change_frequency > 20 {
        RiskLevel::Critical
    } else if complexity > 5.0 || change_frequency > 10 {
        RiskLevel::High
    } else {
        RiskLevel::Medium
    }
}

/// Number of files to flag out of `total`: `max(1, floor(total × (1 − percentile)))`.
pub fn critical_count(total: usize, percentile: f64) -> usize {
    ((total as f64 * (1.0 - percentile)).floor() as usize).max(1).min(total)
}

/// Summarize the flagged files.
pub fn summarize(critical: &[FileMetrics]) -> CriticalFilesAnalysis {
    let scores: Vec<f64> = critical.iter().map(|f| f.criticality_score).collect();
    let frequencies: Vec<f64> = critical.iter().map(|f| f.change_frequency as f64).collect();
    let complexities: Vec<f64> = critical.iter().map(|f| f.complexity).collect();

    let mut file_types = BTreeMap::new();
    let mut risk_categories = RiskCategories::default();
    for file in critical {
        *file_types.entry(extension_label(&file.file)).or_insert(0) += 1;
        match file.risk_level {
            RiskLevel::Critical => risk_categories.critical += 1,
            RiskLevel::High => risk_categories.high += 1,
            _ => risk_categories.medium += 1,
        }
    }

    CriticalFilesAnalysis {
        avg_criticality_score: stats::mean(&scores),
        max_criticality_score: stats::min_max(&scores).1,
        avg_change_frequency: stats::mean(&frequencies),
        avg_complexity: stats::mean(&complexities),
        file_types,
        risk_categories,
    }
}

fn extension_label(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_else(|| "no_extension".to_string())
}

/// Advice for `critical` flagged files out of `total` scored.
pub fn recommend(critical: usize, total: usize) -> Vec<String> {
    if critical == 0 {
        return vec!["No critical files identified - good file health".to_string()];
    }
    let ratio = if total > 0 {
        critical as f64 / total as f64
    } else {
        0.0
    };

    let mut recs: Vec<String> = Vec::new();
    if ratio > 0.3 {
        recs.extend(
            [
                "HIGH RISK: Large proportion of files are critical",
                "Consider refactoring to reduce complexity",
                "Implement comprehensive testing for critical files",
                "Establish strict code review process for critical files",
            ]
            .map(String::from),
        );
    } else if ratio > 0.2 {
        recs.extend(
            [
                "Monitor critical files closely",
                "Increase test coverage for critical components",
                "Consider breaking down complex files",
            ]
            .map(String::from),
        );
    }
    recs.push(format!("Focus on the top {} most critical files", critical.min(5)));
    recs.extend(
        [
            "Implement monitoring for critical file changes",
            "Ensure critical files have comprehensive documentation",
            "Consider pair programming for changes to critical files",
        ]
        .map(String::from),
    );
    recs
}

/// Ranks files by change frequency, complexity and dependency impact.
pub struct CriticalFileAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
    scorer: Box<dyn FileScorer + 'a>,
}

impl<'a> CriticalFileAnalyzer<'a> {
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
    /// Propagates the source's error for the commit window. Per-file read
    /// failures are reported as skipped items.
    pub fn analyze(&self, options: &CriticalFilesOptions) -> Result<Outcome<CriticalFilesReport>, PulseError> {
        let since = lookback_start(NAME, options.as_of, options.lookback_months)?;
        let commits = commits_in_window(self.repo, since, options.as_of)?;

        // path -> (commit count, newest commit time)
        let mut touched: IndexMap<&str, (usize, DateTime<Utc>)> = IndexMap::new();
        for commit in &commits {
            for change in &commit.files {
                let entry = touched
                    .entry(change.path.as_str())
                    .or_insert((0, commit.timestamp));
                entry.0 += 1;
                entry.1 = entry.1.max(commit.timestamp);
            }
        }

        let mut skipped = Vec::new();
        let mut files = Vec::with_capacity(touched.len());
        for (path, (change_frequency, last_modified)) in touched {
            let content = match self.repo.file_content(path) {
                Ok(content) => content,
                Err(e) => {
                    skipped.push(SkippedItem::new(path, &e));
                    continue;
                }
            };
            let complexity = self.scorer.content_complexity(content.as_deref());
            let dependency_impact = self.scorer.dependency_impact(path);
            files.push(FileMetrics {
                file: path.to_string(),
                change_frequency,
                complexity,
                dependency_impact,
                criticality_score: change_frequency as f64 * complexity * dependency_impact,
                file_size: content.as_deref().map_or(0, |c| c.lines().count()),
                last_modified,
                risk_level: file_risk(complexity, change_frequency),
            });
        }

        if files.is_empty() {
            return Ok(Outcome::no_data_skipping("No files found for analysis", skipped));
        }

        let total_files_analyzed = files.len();
        files.sort_by(|a, b| b.criticality_score.total_cmp(&a.criticality_score));
        files.truncate(critical_count(total_files_analyzed, options.critical_threshold_percentile));
        tracing::debug!(total_files_analyzed, critical = files.len(), "critical files ranked");

        Ok(Outcome::Complete(CriticalFilesReport {
            analysis: summarize(&files),
            total_files_analyzed,
            critical_file_count: files.len(),
            recommendations: recommend(files.len(), total_files_analyzed),
            critical_files: files,
            skipped,
        }))
    }
}

impl MetricAnalyzer for CriticalFileAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Critical File Identification"
    }

    fn description(&self) -> &'static str {
        "Identifies files that pose highest risk due to complexity, change frequency, and dependency impact."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = CriticalFilesOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result.report() {
            Some(MetricReport::CriticalFiles(report)) => {
                recommend(report.critical_file_count, report.total_files_analyzed)
            }
            _ => Vec::new(),
        }
    }
}
