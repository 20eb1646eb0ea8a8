//! Cycle time distribution: first commit to completion for feature branches.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use repopulse_core::{MetricParams, PulseError};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome, SkippedItem};
use crate::branches::{is_main_branch, BranchPatterns};
use crate::source::{BranchRecord, CommitRecord, RepositorySource};
use crate::stats;
use crate::window::{self, lookback_start};

/// Registry name.
pub const NAME: &str = "cycle_time";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["branch_patterns", "lookback_months", "as_of"];

/// Planning percentiles.
pub const PERCENTILES: [u32; 6] = [50, 75, 85, 90, 95, 99];

/// Cycles shorter than this many hours are not counted as features.
const MIN_CYCLE_HOURS: f64 = 1.0;

const INSUFFICIENT_DATA: &str = "Unable to generate recommendations - insufficient data";

/// Parameters for [`CycleTimeAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct CycleTimeOptions {
    /// Branches to analyze (default: `feature/*`, `bugfix/*`, `hotfix/*`).
    pub branch_patterns: BranchPatterns,
    /// Months of history to consider (default: 6).
    pub lookback_months: u32,
    /// End of the window.
    pub as_of: DateTime<Utc>,
}

impl Default for CycleTimeOptions {
    fn default() -> Self {
        Self {
            branch_patterns: BranchPatterns::default(),
            lookback_months: 6,
            as_of: Utc::now(),
        }
    }
}

impl CycleTimeOptions {
    /// Read and validate options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys, mistyped
    /// values or a zero or oversized lookback.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            branch_patterns: reader
                .list("branch_patterns")?
                .map(BranchPatterns::new)
                .unwrap_or(defaults.branch_patterns),
            lookback_months: reader
                .u32("lookback_months")?
                .unwrap_or(defaults.lookback_months),
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
        Ok(options)
    }
}

/// Cycle time of one feature branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCycle {
    pub branch: String,
    pub cycle_time_hours: f64,
    pub cycle_time_days: f64,
    /// Branch commits inside the window.
    pub commits: usize,
    pub files_changed: usize,
    pub total_lines_changed: u64,
    /// `commits × files_changed`.
    pub complexity_indicator: usize,
    pub first_commit_date: DateTime<Utc>,
    pub completion_date: DateTime<Utc>,
    pub avg_lines_per_commit: f64,
    /// Whether completion is a detected merge commit.
    pub is_merged: bool,
}

/// One planning percentile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Percentile {
    pub percentile: u32,
    pub hours: f64,
    pub days: f64,
}

/// Per-bucket values: very fast under a day, fast up to 3, normal up to 7,
/// slow up to 14, very slow beyond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpeedBuckets<T> {
    pub very_fast: T,
    pub fast: T,
    pub normal: T,
    pub slow: T,
    pub very_slow: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionCategories {
    pub counts: SpeedBuckets<usize>,
    pub percentages: SpeedBuckets<f64>,
    pub total: usize,
}

impl DistributionCategories {
    fn from_cycles(cycles: &[FeatureCycle]) -> Self {
        let mut counts = SpeedBuckets::<usize>::default();
        for cycle in cycles {
            let days = cycle.cycle_time_days;
            if days < 1.0 {
                counts.very_fast += 1;
            } else if days <= 3.0 {
                counts.fast += 1;
            } else if days <= 7.0 {
                counts.normal += 1;
            } else if days <= 14.0 {
                counts.slow += 1;
            } else {
                counts.very_slow += 1;
            }
        }
        let total = cycles.len();
        let pct = |count: usize| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64 * 100.0
            }
        };
        Self {
            percentages: SpeedBuckets {
                very_fast: pct(counts.very_fast),
                fast: pct(counts.fast),
                normal: pct(counts.normal),
                slow: pct(counts.slow),
                very_slow: pct(counts.very_slow),
            },
            counts,
            total,
        }
    }
}

/// Distribution statistics over every feature cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleStatistics {
    pub count: usize,
    pub mean_hours: f64,
    pub median_hours: f64,
    /// Sample standard deviation.
    pub std_deviation_hours: f64,
    pub min_hours: f64,
    pub max_hours: f64,
    pub mean_days: f64,
    pub median_days: f64,
    /// In [`PERCENTILES`] order.
    pub percentiles: Vec<Percentile>,
    /// Cycles above p95.
    pub outliers: Vec<FeatureCycle>,
    /// Cycles below half of p50.
    pub fast_deliveries: Vec<FeatureCycle>,
    pub outlier_count: usize,
    pub fast_delivery_count: usize,
    pub distribution_categories: DistributionCategories,
}

impl CycleStatistics {
    /// Statistics for `cycles`.
    pub fn from_cycles(cycles: &[FeatureCycle]) -> Self {
        let hours: Vec<f64> = cycles.iter().map(|c| c.cycle_time_hours).collect();
        let sorted = stats::sorted(&hours);
        let (min_hours, max_hours) = stats::min_max(&hours);
        let mean_hours = stats::mean(&hours);
        let median_hours = stats::median(&hours);

        let percentiles: Vec<Percentile> = PERCENTILES
            .iter()
            .map(|p| {
                let hours = stats::percentile(&sorted, *p);
                Percentile {
                    percentile: *p,
                    hours,
                    days: hours / 24.0,
                }
            })
            .collect();
        let p95 = stats::percentile(&sorted, 95);
        let half_median = stats::percentile(&sorted, 50) / 2.0;

        let outliers: Vec<FeatureCycle> = cycles
            .iter()
            .filter(|c| c.cycle_time_hours > p95)
            .cloned()
            .collect();
        let fast_deliveries: Vec<FeatureCycle> = cycles
            .iter()
            .filter(|c| c.cycle_time_hours < half_median)
            .cloned()
            .collect();

        Self {
            count: cycles.len(),
            mean_hours,
            median_hours,
            std_deviation_hours: stats::sample_std_dev(&hours),
            min_hours,
            max_hours,
            mean_days: mean_hours / 24.0,
            median_days: median_hours / 24.0,
            percentiles,
            outlier_count: outliers.len(),
            fast_delivery_count: fast_deliveries.len(),
            outliers,
            fast_deliveries,
            distribution_categories: DistributionCategories::from_cycles(cycles),
        }
    }

    /// The entry for percentile `p`, if it is one of [`PERCENTILES`].
    pub fn percentile(&self, p: u32) -> Option<&Percentile> {
        self.percentiles.iter().find(|entry| entry.percentile == p)
    }

    fn percentile_days(&self, p: u32) -> f64 {
        self.percentile(p).map_or(0.0, |entry| entry.days)
    }
}

/// Cycle time result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleTimeReport {
    pub cycle_times: Vec<FeatureCycle>,
    pub statistics: CycleStatistics,
    /// Delivery estimates quoting the planning percentiles.
    pub planning_recommendations: Vec<String>,
    /// Branches whose history could not be read.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
    pub recommendations: Vec<String>,
}

/// Cycle of one branch restricted to `[since, as_of]`.
///
/// `history` must be oldest first. A merge commit outside the window is
/// ignored. Returns `None` when no commit falls inside the window or the
/// cycle is shorter than an hour.
pub fn feature_cycle(
    name: &str,
    history: &[CommitRecord],
    merge: Option<&CommitRecord>,
    since: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> Option<FeatureCycle> {
    let in_window = |t: DateTime<Utc>| t >= since && t <= as_of;
    let recent: Vec<&CommitRecord> = history.iter().filter(|c| in_window(c.timestamp)).collect();
    let (first, last) = (recent.first()?, recent.last()?);

    let merge = merge.filter(|m| in_window(m.timestamp));
    let completion = merge.map_or(last.timestamp, |m| m.timestamp);
    let cycle_time_hours = (completion - first.timestamp).num_seconds() as f64 / 3600.0;
    if cycle_time_hours < MIN_CYCLE_HOURS {
        return None;
    }

    let files: HashSet<&str> = recent
        .iter()
        .flat_map(|c| c.files.iter().map(|f| f.path.as_str()))
        .collect();
    let total_lines_changed: u64 = recent.iter().map(|c| c.lines_changed()).sum();

    Some(FeatureCycle {
        branch: name.to_string(),
        cycle_time_hours,
        cycle_time_days: cycle_time_hours / 24.0,
        commits: recent.len(),
        files_changed: files.len(),
        total_lines_changed,
        complexity_indicator: recent.len() * files.len(),
        first_commit_date: first.timestamp,
        completion_date: completion,
        avg_lines_per_commit: total_lines_changed as f64 / recent.len() as f64,
        is_merged: merge.is_some(),
    })
}

/// Delivery estimates and distribution warnings.
pub fn planning_recommendations(statistics: &CycleStatistics) -> Vec<String> {
    let mut recs = vec![
        format!(
            "For 50% confidence in delivery: plan {:.1} days",
            statistics.percentile_days(50)
        ),
        format!(
            "For 75% confidence in delivery: plan {:.1} days",
            statistics.percentile_days(75)
        ),
        format!(
            "For 90% confidence in delivery: plan {:.1} days",
            statistics.percentile_days(90)
        ),
    ];

    if statistics.mean_days > 14.0 {
        recs.push("High average cycle time - consider breaking down features".to_string());
        recs.push("Implement feature flags for incremental delivery".to_string());
    }
    if statistics.median_days > statistics.mean_days * 1.5 {
        recs.push("Cycle times are skewed by outliers - investigate long-running features".to_string());
    }
    let percentages = &statistics.distribution_categories.percentages;
    if percentages.very_slow > 20.0 {
        recs.push("Too many features take >14 days - review feature sizing".to_string());
    }
    if percentages.very_fast > 50.0 {
        recs.push("Many very fast deliveries - ensure adequate testing".to_string());
    }
    recs
}

/// General advice from the distribution.
pub fn recommend(statistics: &CycleStatistics) -> Vec<String> {
    let mut recs: Vec<&str> = Vec::new();
    let mean_days = statistics.mean_days;

    if mean_days > 21.0 {
        recs.extend([
            "URGENT: Very long average cycle time (>21 days)",
            "Implement feature decomposition practices",
            "Consider continuous delivery approaches",
            "Review and streamline approval processes",
        ]);
    } else if mean_days > 14.0 {
        recs.extend([
            "Long average cycle time (>14 days)",
            "Break down large features into smaller deliverables",
            "Implement work-in-progress limits",
        ]);
    } else if mean_days > 7.0 {
        recs.extend([
            "Moderate cycle time - room for improvement",
            "Consider optimizing development workflow",
        ]);
    } else {
        recs.push("Good average cycle time - maintain current practices");
    }

    if statistics.std_deviation_hours / 24.0 > mean_days {
        recs.extend([
            "High variability in cycle times",
            "Investigate causes of long-running features",
            "Improve estimation practices",
        ]);
    }

    if statistics.count > 0 && statistics.outlier_count as f64 / statistics.count as f64 > 0.1 {
        recs.push("High percentage of outlier features - investigate root causes");
    }

    let pct = &statistics.distribution_categories.percentages;
    if pct.normal + pct.fast + pct.very_fast > 80.0 {
        recs.push("Good cycle time distribution - most features delivered efficiently");
    }
    if pct.slow + pct.very_slow > 40.0 {
        recs.push("Too many slow features - focus on reducing cycle time");
    }

    recs.into_iter().map(String::from).collect()
}

/// Measures how long features take from first commit to completion.
pub struct CycleTimeAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
}

impl<'a> CycleTimeAnalyzer<'a> {
    /// Analyzer over `repo`.
    pub fn new(repo: &'a dyn RepositorySource) -> Self {
        Self { repo }
    }

    fn measure(
        &self,
        branch: &BranchRecord,
        since: DateTime<Utc>,
        as_of: DateTime<Utc>,
    ) -> Result<Option<FeatureCycle>, PulseError> {
        let history = branch.history(self.repo)?;
        if history.is_empty() {
            return Ok(None);
        }
        let merge = self.repo.merge_commit(branch)?;
        Ok(feature_cycle(&branch.name, &history, merge.as_ref(), since, as_of))
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when branches cannot be listed.
    pub fn analyze(&self, options: &CycleTimeOptions) -> Result<Outcome<CycleTimeReport>, PulseError> {
        let since = lookback_start(NAME, options.as_of, options.lookback_months)?;
        let mut cycles = Vec::new();
        let mut skipped = Vec::new();
        for branch in self.repo.branches()? {
            if is_main_branch(&branch.name) || !options.branch_patterns.matches(&branch.name) {
                continue;
            }
            match self.measure(&branch, since, options.as_of) {
                Ok(Some(cycle)) => cycles.push(cycle),
                Ok(None) => {}
                Err(e) => skipped.push(SkippedItem::new(&branch.name, &e)),
            }
        }
        tracing::debug!(features = cycles.len(), skipped = skipped.len(), "cycle times collected");

        if cycles.is_empty() {
            return Ok(Outcome::no_data_skipping(
                "No completed features found for cycle time analysis",
                skipped,
            ));
        }

        let statistics = CycleStatistics::from_cycles(&cycles);
        Ok(Outcome::Complete(CycleTimeReport {
            planning_recommendations: planning_recommendations(&statistics),
            recommendations: recommend(&statistics),
            cycle_times: cycles,
            statistics,
            skipped,
        }))
    }
}

impl MetricAnalyzer for CycleTimeAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Cycle Time Distribution"
    }

    fn description(&self) -> &'static str {
        "Analyzes feature delivery time patterns from first commit to completion for better planning and estimation."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = CycleTimeOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result {
            Outcome::Complete(MetricReport::CycleTime(report)) => recommend(&report.statistics),
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

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn make_commit(id: &str, hours: i64, path: &str) -> CommitRecord {
        CommitRecord::new(id, "alice", start() + Duration::hours(hours))
            .with_file(FileChange::new(path, 6, 2))
    }

    fn feature(name: &str, cycle_hours: i64) -> BranchRecord {
        BranchRecord::new(name).with_commits(vec![
            make_commit("a", 0, "a.py"),
            make_commit("b", cycle_hours, "b.py"),
        ])
    }

    fn cycle(hours: f64) -> FeatureCycle {
        FeatureCycle {
            branch: format!("feature/{hours}"),
            cycle_time_hours: hours,
            cycle_time_days: hours / 24.0,
            commits: 1,
            files_changed: 1,
            total_lines_changed: 1,
            complexity_indicator: 1,
            first_commit_date: start(),
            completion_date: start(),
            avg_lines_per_commit: 1.0,
            is_merged: false,
        }
    }

    fn options() -> CycleTimeOptions {
        CycleTimeOptions {
            as_of: as_of(),
            ..CycleTimeOptions::default()
        }
    }

    #[test]
    fn cycle_from_first_commit_to_last() {
        let history = vec![
            make_commit("1", 0, "a.py"),
            make_commit("2", 10, "b.py"),
            make_commit("3", 30, "a.py"),
        ];
        let cycle = feature_cycle("feature/x", &history, None, start(), as_of()).unwrap();
        assert_eq!(cycle.cycle_time_hours, 30.0);
        assert_eq!(cycle.commits, 3);
        assert_eq!(cycle.files_changed, 2);
        assert_eq!(cycle.complexity_indicator, 6);
        assert_eq!(cycle.total_lines_changed, 24);
        assert_eq!(cycle.avg_lines_per_commit, 8.0);
        assert!(!cycle.is_merged);
    }

    #[test]
    fn merge_inside_window_completes_cycle() {
        let history = vec![make_commit("1", 0, "a.py"), make_commit("2", 5, "a.py")];
        let merge = make_commit("m", 48, "a.py");
        let cycle = feature_cycle("feature/x", &history, Some(&merge), start(), as_of()).unwrap();
        assert_eq!(cycle.cycle_time_hours, 48.0);
        assert!(cycle.is_merged);

        // a merge after as_of is ignored
        let late = CommitRecord::new("late", "alice", as_of() + Duration::days(1));
        let cycle = feature_cycle("feature/x", &history, Some(&late), start(), as_of()).unwrap();
        assert_eq!(cycle.cycle_time_hours, 5.0);
    }

    #[test]
    fn commits_before_window_are_dropped() {
        let history = vec![
            make_commit("old", -24 * 10, "a.py"),
            make_commit("1", 0, "a.py"),
            make_commit("2", 12, "a.py"),
        ];
        let cycle = feature_cycle("feature/x", &history, None, start(), as_of()).unwrap();
        assert_eq!(cycle.cycle_time_hours, 12.0);
        assert_eq!(cycle.commits, 2);
    }

    #[test]
    fn sub_hour_cycles_are_discarded() {
        let history = vec![
            CommitRecord::new("1", "a", start()),
            CommitRecord::new("2", "a", start() + Duration::minutes(59)),
        ];
        assert!(feature_cycle("feature/x", &history, None, start(), as_of()).is_none());
    }

    #[test]
    fn percentiles_and_outliers() {
        let cycles: Vec<FeatureCycle> = [10.0, 20.0, 30.0, 40.0, 100.0].map(cycle).to_vec();
        let stats = CycleStatistics::from_cycles(&cycles);
        assert_eq!(stats.percentile(50).unwrap().hours, 30.0);
        assert_eq!(stats.percentile(75).unwrap().hours, 40.0);
        assert_eq!(stats.percentile(95).unwrap().hours, 100.0);
        assert_eq!(stats.outlier_count, 0);
        assert_eq!(stats.fast_delivery_count, 1);
        assert_eq!(stats.mean_hours, 40.0);
        assert_eq!(stats.distribution_categories.counts.very_fast, 4);
        assert_eq!(stats.distribution_categories.counts.normal, 1);
        assert!(stats.percentile(60).is_none());
    }

    #[test]
    fn planning_quotes_percentile_days() {
        let cycles: Vec<FeatureCycle> = [24.0, 48.0, 72.0, 96.0].map(cycle).to_vec();
        let stats = CycleStatistics::from_cycles(&cycles);
        let plan = planning_recommendations(&stats);
        assert_eq!(plan[0], "For 50% confidence in delivery: plan 3.0 days");
        assert_eq!(plan[1], "For 75% confidence in delivery: plan 4.0 days");
        assert_eq!(plan[2], "For 90% confidence in delivery: plan 4.0 days");
    }

    #[test]
    fn analyzer_filters_main_and_unmatched_branches() {
        let source = MemorySource::new()
            .with_branch(feature("feature/a", 24 * 4))
            .with_branch(feature("feature/b", 24 * 20))
            .with_branch(feature("release/x", 48))
            .with_branch(feature("main", 48));
        let Outcome::Complete(report) = CycleTimeAnalyzer::new(&source).analyze(&options()).unwrap() else {
            panic!("expected report");
        };
        assert_eq!(report.statistics.count, 2);
        assert_eq!(report.statistics.mean_days, 12.0);
        assert_eq!(report.recommendations[0], "Moderate cycle time - room for improvement");
        assert!(report
            .recommendations
            .contains(&"Too many slow features - focus on reducing cycle time".to_string()));
    }

    #[test]
    fn no_features_is_no_data() {
        let source = MemorySource::new().with_branch(feature("develop", 48));
        let analyzer = CycleTimeAnalyzer::new(&source);
        let result = analyzer
            .calculate(&MetricParams::new().with("as_of", as_of()))
            .unwrap();
        assert_eq!(
            result.no_data_reason().map(|n| n.error.as_str()),
            Some("No completed features found for cycle time analysis")
        );
        assert_eq!(analyzer.recommendations(&result), vec![INSUFFICIENT_DATA]);
    }
}
