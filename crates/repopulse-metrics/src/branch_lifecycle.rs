//! Branch lifecycle analysis: setup, development and completion phases of
//! every non-main branch.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use repopulse_core::{MetricParams, PulseError};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome, SkippedItem};
use crate::branches::is_main_branch;
use crate::source::{BranchRecord, CommitRecord, RepositorySource};
use crate::stats;

/// Registry name.
pub const NAME: &str = "branch_lifecycle";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["include_active_branches", "as_of"];

const INSUFFICIENT_DATA: &str = "Unable to generate recommendations - insufficient data";

/// Parameters for [`BranchLifecycleAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct BranchLifecycleOptions {
    /// Treat branches without a detected merge as still open (default: false).
    pub include_active_branches: bool,
    /// Reference time for open branches.
    pub as_of: DateTime<Utc>,
}

impl Default for BranchLifecycleOptions {
    fn default() -> Self {
        Self {
            include_active_branches: false,
            as_of: Utc::now(),
        }
    }
}

impl BranchLifecycleOptions {
    /// Read options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys or
    /// mistyped values.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            include_active_branches: reader
                .bool("include_active_branches")?
                .unwrap_or(defaults.include_active_branches),
            as_of: reader.time("as_of")?.unwrap_or(defaults.as_of),
        };
        reader.finish()?;
        Ok(options)
    }
}

/// Lifecycle of one branch. Durations are in hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchLifecycle {
    pub branch: String,
    /// Completed, either by a detected merge or assumed at the last commit.
    pub is_merged: bool,
    /// Whether a merge commit was actually found.
    pub merge_detected: bool,
    pub setup_time_hours: f64,
    pub development_time_hours: f64,
    pub completion_time_hours: f64,
    pub total_lifecycle_hours: f64,
    pub commit_count: usize,
    pub commit_frequency_per_day: f64,
    pub avg_commit_interval_hours: f64,
    pub first_commit_date: DateTime<Utc>,
    pub last_commit_date: DateTime<Utc>,
    /// Distinct paths touched.
    pub files_changed: usize,
    pub total_lines_changed: u64,
}

/// Summary statistics for one lifecycle phase, over strictly positive samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseStats {
    pub phase: String,
    pub sample_size: usize,
    pub avg_hours: f64,
    pub median_hours: f64,
    /// Population standard deviation.
    pub std_deviation: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    pub avg_days: f64,
    pub median_days: f64,
}

impl PhaseStats {
    /// Statistics over the positive entries of `hours`.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_metrics::branch_lifecycle::PhaseStats;
    ///
    /// let stats = PhaseStats::from_hours("Setup", &[0.0, 24.0, 72.0]);
    /// assert_eq!(stats.sample_size, 2);
    /// assert_eq!(stats.avg_days, 2.0);
    /// assert_eq!(stats.std_deviation, 24.0);
    /// ```
    pub fn from_hours(phase: &str, hours: &[f64]) -> Self {
        let samples: Vec<f64> = hours.iter().copied().filter(|h| *h > 0.0).collect();
        let (min_hours, max_hours) = stats::min_max(&samples);
        let avg_hours = stats::mean(&samples);
        let median_hours = stats::median(&samples);
        Self {
            phase: phase.to_string(),
            sample_size: samples.len(),
            avg_hours,
            median_hours,
            std_deviation: stats::population_std_dev(&samples),
            min_hours,
            max_hours,
            avg_days: avg_hours / 24.0,
            median_days: median_hours / 24.0,
        }
    }
}

/// Per-phase statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseAnalysis {
    pub setup_phase: PhaseStats,
    pub development_phase: PhaseStats,
    pub completion_phase: PhaseStats,
    pub total_lifecycle: PhaseStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommitPatterns {
    pub avg_commits_per_branch: f64,
    pub median_commits_per_branch: f64,
    /// Mean over branches with a non-zero frequency.
    pub avg_commit_frequency_per_day: f64,
}

/// Delivery speed buckets by total lifecycle: fast under 3 days, normal up
/// to 14, slow beyond.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryPatterns {
    pub fast_delivery_count: usize,
    pub normal_delivery_count: usize,
    pub slow_delivery_count: usize,
    pub fast_delivery_percentage: f64,
    pub normal_delivery_percentage: f64,
    pub slow_delivery_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EfficiencyBuckets {
    /// above 0.7
    pub high: usize,
    /// 0.4 to 0.7
    pub medium: usize,
    /// below 0.4
    pub low: usize,
}

/// Development time over total lifecycle, for branches with a positive total.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyMetrics {
    pub sample_size: usize,
    pub avg_efficiency: f64,
    pub median_efficiency: f64,
    pub efficiency_distribution: EfficiencyBuckets,
}

/// Extreme branches, present only with three or more branches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LifecycleOutliers {
    /// Longest first.
    pub longest_lifecycle: Vec<BranchLifecycle>,
    /// Shortest first.
    pub shortest_lifecycle: Vec<BranchLifecycle>,
    pub highest_commit_count: Vec<BranchLifecycle>,
    pub lowest_commit_count: Vec<BranchLifecycle>,
}

/// Aggregates over every branch lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleAnalysis {
    pub total_branches_analyzed: usize,
    pub phase_analysis: PhaseAnalysis,
    pub commit_patterns: CommitPatterns,
    pub delivery_patterns: DeliveryPatterns,
    pub efficiency_metrics: EfficiencyMetrics,
    pub outliers: LifecycleOutliers,
}

/// Branch lifecycle result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchLifecycleReport {
    /// One entry per analyzed branch.
    pub lifecycle_data: Vec<BranchLifecycle>,
    pub analysis: LifecycleAnalysis,
    /// Branches whose history could not be read.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
    pub recommendations: Vec<String>,
}

fn hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

/// Lifecycle of one branch from its history (oldest first).
///
/// Returns `None` for an empty history.
pub fn branch_lifecycle(
    branch: &BranchRecord,
    history: &[CommitRecord],
    merge: Option<&CommitRecord>,
    options: &BranchLifecycleOptions,
) -> Option<BranchLifecycle> {
    let (first, last) = (history.first()?, history.last()?);
    let created = branch.created_at.unwrap_or(first.timestamp);

    let development_time_hours = hours(first.timestamp, last.timestamp);
    let intervals = history.len() - 1;
    let avg_commit_interval_hours = if intervals > 0 {
        development_time_hours / intervals as f64
    } else {
        0.0
    };
    let commit_frequency_per_day = if development_time_hours > 0.0 {
        history.len() as f64 / (development_time_hours / 24.0)
    } else {
        0.0
    };

    let (is_merged, completion_time_hours, total_lifecycle_hours) = match merge {
        Some(merge) => (
            true,
            hours(last.timestamp, merge.timestamp),
            hours(created, merge.timestamp),
        ),
        None if options.include_active_branches => (false, 0.0, hours(created, options.as_of)),
        None => (true, 0.0, hours(created, last.timestamp)),
    };

    let files: HashSet<&str> = history
        .iter()
        .flat_map(|c| c.files.iter().map(|f| f.path.as_str()))
        .collect();

    Some(BranchLifecycle {
        branch: branch.name.clone(),
        is_merged,
        merge_detected: merge.is_some(),
        setup_time_hours: hours(created, first.timestamp),
        development_time_hours,
        completion_time_hours,
        total_lifecycle_hours,
        commit_count: history.len(),
        commit_frequency_per_day,
        avg_commit_interval_hours,
        first_commit_date: first.timestamp,
        last_commit_date: last.timestamp,
        files_changed: files.len(),
        total_lines_changed: history.iter().map(CommitRecord::lines_changed).sum(),
    })
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn delivery_patterns(lifecycles: &[BranchLifecycle]) -> DeliveryPatterns {
    let (mut fast, mut normal, mut slow) = (0, 0, 0);
    for lifecycle in lifecycles {
        let days = lifecycle.total_lifecycle_hours / 24.0;
        if days < 3.0 {
            fast += 1;
        } else if days <= 14.0 {
            normal += 1;
        } else {
            slow += 1;
        }
    }
    let n = lifecycles.len();
    DeliveryPatterns {
        fast_delivery_count: fast,
        normal_delivery_count: normal,
        slow_delivery_count: slow,
        fast_delivery_percentage: percentage(fast, n),
        normal_delivery_percentage: percentage(normal, n),
        slow_delivery_percentage: percentage(slow, n),
    }
}

fn efficiency_metrics(lifecycles: &[BranchLifecycle]) -> EfficiencyMetrics {
    let ratios: Vec<f64> = lifecycles
        .iter()
        .filter(|l| l.total_lifecycle_hours > 0.0)
        .map(|l| l.development_time_hours / l.total_lifecycle_hours)
        .collect();
    let mut buckets = EfficiencyBuckets::default();
    for ratio in &ratios {
        if *ratio > 0.7 {
            buckets.high += 1;
        } else if *ratio >= 0.4 {
            buckets.medium += 1;
        } else {
            buckets.low += 1;
        }
    }
    EfficiencyMetrics {
        sample_size: ratios.len(),
        avg_efficiency: stats::mean(&ratios),
        median_efficiency: stats::median(&ratios),
        efficiency_distribution: buckets,
    }
}

fn outliers(lifecycles: &[BranchLifecycle]) -> LifecycleOutliers {
    if lifecycles.len() < 3 {
        return LifecycleOutliers::default();
    }
    let top3 = |mut sorted: Vec<BranchLifecycle>| {
        sorted.truncate(3);
        sorted
    };

    let mut by_time = lifecycles.to_vec();
    by_time.sort_by(|a, b| a.total_lifecycle_hours.total_cmp(&b.total_lifecycle_hours));
    let mut by_commits = lifecycles.to_vec();
    by_commits.sort_by_key(|l| l.commit_count);

    LifecycleOutliers {
        shortest_lifecycle: top3(by_time.clone()),
        longest_lifecycle: top3(by_time.into_iter().rev().collect()),
        lowest_commit_count: top3(by_commits.clone()),
        highest_commit_count: top3(by_commits.into_iter().rev().collect()),
    }
}

/// Aggregate per-branch lifecycles.
pub fn summarize(lifecycles: &[BranchLifecycle]) -> LifecycleAnalysis {
    let column = |f: fn(&BranchLifecycle) -> f64| lifecycles.iter().map(f).collect::<Vec<f64>>();
    let commit_counts = column(|l| l.commit_count as f64);
    let frequencies: Vec<f64> = column(|l| l.commit_frequency_per_day)
        .into_iter()
        .filter(|f| *f > 0.0)
        .collect();

    LifecycleAnalysis {
        total_branches_analyzed: lifecycles.len(),
        phase_analysis: PhaseAnalysis {
            setup_phase: PhaseStats::from_hours("Setup", &column(|l| l.setup_time_hours)),
            development_phase: PhaseStats::from_hours(
                "Development",
                &column(|l| l.development_time_hours),
            ),
            completion_phase: PhaseStats::from_hours(
                "Completion",
                &column(|l| l.completion_time_hours),
            ),
            total_lifecycle: PhaseStats::from_hours(
                "Total Lifecycle",
                &column(|l| l.total_lifecycle_hours),
            ),
        },
        commit_patterns: CommitPatterns {
            avg_commits_per_branch: stats::mean(&commit_counts),
            median_commits_per_branch: stats::median(&commit_counts),
            avg_commit_frequency_per_day: stats::mean(&frequencies),
        },
        delivery_patterns: delivery_patterns(lifecycles),
        efficiency_metrics: efficiency_metrics(lifecycles),
        outliers: outliers(lifecycles),
    }
}

/// Advice for an analysis.
pub fn recommend(analysis: &LifecycleAnalysis) -> Vec<String> {
    let mut recs: Vec<&str> = Vec::new();

    let total = &analysis.phase_analysis.total_lifecycle;
    if total.sample_size > 0 {
        if total.avg_days > 30.0 {
            recs.extend([
                "URGENT: Average feature delivery time is too long (>30 days)",
                "Break down large features into smaller, manageable pieces",
                "Implement feature flags for incremental delivery",
                "Review and streamline approval processes",
            ]);
        } else if total.avg_days > 14.0 {
            recs.extend([
                "Feature delivery time is longer than optimal (>14 days)",
                "Consider reducing feature scope or improving process efficiency",
                "Implement continuous integration practices",
            ]);
        } else if total.avg_days < 3.0 {
            recs.extend([
                "Very fast feature delivery - ensure quality is maintained",
                "Consider if features are appropriately sized",
                "Maintain current efficient processes",
            ]);
        }
    }

    if analysis.delivery_patterns.slow_delivery_percentage > 50.0 {
        recs.extend([
            "Over half of features take >14 days to deliver",
            "Investigate common causes of delays",
            "Implement work-in-progress limits",
        ]);
    }

    let efficiency = &analysis.efficiency_metrics;
    if efficiency.sample_size > 0 {
        if efficiency.avg_efficiency < 0.3 {
            recs.extend([
                "Low development efficiency detected",
                "Reduce waiting time between development phases",
                "Improve tooling and automation",
            ]);
        } else if efficiency.avg_efficiency > 0.8 {
            recs.push("Excellent development efficiency - maintain practices");
        }
    }

    if analysis.phase_analysis.setup_phase.avg_hours > 24.0 {
        recs.push("Branch setup time is high - improve onboarding automation");
    }

    recs.into_iter().map(String::from).collect()
}

/// Follows each branch from creation to merge.
pub struct BranchLifecycleAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
}

impl<'a> BranchLifecycleAnalyzer<'a> {
    /// Analyzer over `repo`.
    pub fn new(repo: &'a dyn RepositorySource) -> Self {
        Self { repo }
    }

    fn measure(
        &self,
        branch: &BranchRecord,
        options: &BranchLifecycleOptions,
    ) -> Result<Option<BranchLifecycle>, PulseError> {
        let history = branch.history(self.repo)?;
        if history.is_empty() {
            return Ok(None);
        }
        let merge = self.repo.merge_commit(branch)?;
        Ok(branch_lifecycle(branch, &history, merge.as_ref(), options))
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when branches cannot be listed.
    pub fn analyze(
        &self,
        options: &BranchLifecycleOptions,
    ) -> Result<Outcome<BranchLifecycleReport>, PulseError> {
        let mut lifecycles = Vec::new();
        let mut skipped = Vec::new();
        for branch in self.repo.branches()? {
            if is_main_branch(&branch.name) {
                continue;
            }
            match self.measure(&branch, options) {
                Ok(Some(lifecycle)) => lifecycles.push(lifecycle),
                Ok(None) => {}
                Err(e) => skipped.push(SkippedItem::new(&branch.name, &e)),
            }
        }
        tracing::debug!(branches = lifecycles.len(), skipped = skipped.len(), "branch lifecycles measured");

        if lifecycles.is_empty() {
            return Ok(Outcome::no_data_skipping(
                "No branches found for lifecycle analysis",
                skipped,
            ));
        }

        let analysis = summarize(&lifecycles);
        Ok(Outcome::Complete(BranchLifecycleReport {
            recommendations: recommend(&analysis),
            lifecycle_data: lifecycles,
            analysis,
            skipped,
        }))
    }
}

impl MetricAnalyzer for BranchLifecycleAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Branch Lifecycle Analysis"
    }

    fn description(&self) -> &'static str {
        "Analyzes the complete lifecycle of feature branches from conception to completion, identifying delivery patterns."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = BranchLifecycleOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result {
            Outcome::Complete(MetricReport::BranchLifecycle(report)) => recommend(&report.analysis),
            Outcome::NoData(_) => vec![INSUFFICIENT_DATA.to_string()],
            Outcome::Complete(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::source::{FileChange, MemorySource};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap()
    }

    fn make_commit(id: &str, hours: i64, path: &str) -> CommitRecord {
        CommitRecord::new(id, "alice", start() + Duration::hours(hours))
            .with_file(FileChange::new(path, 10, 2))
    }

    fn options() -> BranchLifecycleOptions {
        BranchLifecycleOptions {
            include_active_branches: false,
            as_of: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn feature(name: &str, hours: &[i64]) -> BranchRecord {
        BranchRecord::new(name).with_commits(
            hours
                .iter()
                .map(|h| make_commit(&format!("{name}-{h}"), *h, "src/lib.rs"))
                .collect(),
        )
    }

    #[test]
    fn phases_from_creation_merge_and_commits() {
        let branch = BranchRecord::new("feature/a").created_at(start() - Duration::hours(12));
        let history = vec![
            make_commit("1", 0, "a.py"),
            make_commit("2", 24, "b.py"),
            make_commit("3", 48, "a.py"),
        ];
        let merge = make_commit("m", 60, "a.py");
        let lifecycle = branch_lifecycle(&branch, &history, Some(&merge), &options()).unwrap();
        assert_eq!(lifecycle.setup_time_hours, 12.0);
        assert_eq!(lifecycle.development_time_hours, 48.0);
        assert_eq!(lifecycle.completion_time_hours, 12.0);
        assert_eq!(lifecycle.total_lifecycle_hours, 72.0);
        assert_eq!(lifecycle.avg_commit_interval_hours, 24.0);
        assert_eq!(lifecycle.commit_frequency_per_day, 1.5);
        assert_eq!(lifecycle.files_changed, 2);
        assert_eq!(lifecycle.total_lines_changed, 36);
        assert!(lifecycle.is_merged && lifecycle.merge_detected);
    }

    #[test]
    fn unmerged_branch_completes_at_last_commit_by_default() {
        let branch = BranchRecord::new("feature/b");
        let history = vec![make_commit("1", 0, "a.py"), make_commit("2", 30, "a.py")];
        let lifecycle = branch_lifecycle(&branch, &history, None, &options()).unwrap();
        assert_eq!(lifecycle.setup_time_hours, 0.0);
        assert_eq!(lifecycle.total_lifecycle_hours, 30.0);
        assert!(lifecycle.is_merged);
        assert!(!lifecycle.merge_detected);
    }

    #[test]
    fn active_branches_run_until_as_of() {
        let branch = BranchRecord::new("feature/c");
        let history = vec![make_commit("1", 0, "a.py")];
        let options = BranchLifecycleOptions {
            include_active_branches: true,
            as_of: start() + Duration::hours(100),
        };
        let lifecycle = branch_lifecycle(&branch, &history, None, &options).unwrap();
        assert!(!lifecycle.is_merged);
        assert_eq!(lifecycle.total_lifecycle_hours, 100.0);
        assert_eq!(lifecycle.commit_frequency_per_day, 0.0);
    }

    #[test]
    fn analyzer_skips_main_branches_and_buckets_delivery() {
        let source = MemorySource::new()
            .with_branch(feature("main", &[0, 500]))
            .with_branch(feature("feature/fast", &[0, 10]))
            .with_branch(feature("feature/normal", &[0, 24 * 5]))
            .with_branch(feature("feature/slow", &[0, 24 * 20]));
        let Outcome::Complete(report) = BranchLifecycleAnalyzer::new(&source).analyze(&options()).unwrap() else {
            panic!("expected report");
        };
        let analysis = &report.analysis;
        assert_eq!(analysis.total_branches_analyzed, 3);
        assert_eq!(analysis.delivery_patterns.fast_delivery_count, 1);
        assert_eq!(analysis.delivery_patterns.normal_delivery_count, 1);
        assert_eq!(analysis.delivery_patterns.slow_delivery_count, 1);
        assert_eq!(analysis.outliers.longest_lifecycle[0].branch, "feature/slow");
        assert_eq!(analysis.outliers.shortest_lifecycle[0].branch, "feature/fast");
        // no setup samples, development equals total
        assert_eq!(analysis.phase_analysis.setup_phase.sample_size, 0);
        assert_eq!(analysis.efficiency_metrics.efficiency_distribution.high, 3);
        assert!(report
            .recommendations
            .contains(&"Excellent development efficiency - maintain practices".to_string()));
    }

    #[test]
    fn outliers_need_three_branches() {
        let source = MemorySource::new().with_branch(feature("feature/x", &[0, 10]));
        let Outcome::Complete(report) = BranchLifecycleAnalyzer::new(&source).analyze(&options()).unwrap() else {
            panic!("expected report");
        };
        assert!(report.analysis.outliers.longest_lifecycle.is_empty());
    }

    #[test]
    fn long_lifecycles_get_urgent_advice() {
        let source = MemorySource::new().with_branch(feature("feature/epic", &[0, 24 * 40]));
        let analyzer = BranchLifecycleAnalyzer::new(&source);
        let result = analyzer.calculate(&MetricParams::new()).unwrap();
        let recs = analyzer.recommendations(&result);
        assert_eq!(recs[0], "URGENT: Average feature delivery time is too long (>30 days)");
        assert!(recs.contains(&"Over half of features take >14 days to deliver".to_string()));
    }

    #[test]
    fn only_main_branches_is_no_data() {
        let source = MemorySource::new().with_branch(feature("master", &[0, 10]));
        let analyzer = BranchLifecycleAnalyzer::new(&source);
        let result = analyzer.calculate(&MetricParams::new()).unwrap();
        assert_eq!(
            result.no_data_reason().map(|n| n.error.as_str()),
            Some("No branches found for lifecycle analysis")
        );
        assert_eq!(analyzer.recommendations(&result), vec![INSUFFICIENT_DATA]);
    }

    #[test]
    fn include_active_branches_param() {
        let params = MetricParams::new().with("include_active_branches", true);
        assert!(BranchLifecycleOptions::from_params(&params).unwrap().include_active_branches);
        let bad = MetricParams::new().with("include_active", true);
        assert!(BranchLifecycleOptions::from_params(&bad).is_err());
    }
}
