//! Flow efficiency: active development days over total flow time per branch.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use repopulse_core::{MetricParams, PulseError};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome, SkippedItem};
use crate::branches::BranchPatterns;
use crate::source::{BranchRecord, CommitRecord, RepositorySource};
use crate::stats;

/// Registry name.
pub const NAME: &str = "flow_efficiency";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["branch_patterns", "as_of"];

const INSUFFICIENT_DATA: &str = "Unable to generate recommendations - insufficient data";

/// Parameters for [`FlowEfficiencyAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlowEfficiencyOptions {
    /// Branches to analyze (default: `feature/*`, `bugfix/*`, `hotfix/*`).
    pub branch_patterns: BranchPatterns,
    /// Commits and merges after this time are ignored.
    pub as_of: DateTime<Utc>,
}

impl Default for FlowEfficiencyOptions {
    fn default() -> Self {
        Self {
            branch_patterns: BranchPatterns::default(),
            as_of: Utc::now(),
        }
    }
}

impl FlowEfficiencyOptions {
    /// Read options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys, a
    /// non-list `branch_patterns` or a malformed `as_of`.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            branch_patterns: reader
                .list("branch_patterns")?
                .map(BranchPatterns::new)
                .unwrap_or(defaults.branch_patterns),
            as_of: reader.time("as_of")?.unwrap_or(defaults.as_of),
        };
        reader.finish()?;
        Ok(options)
    }
}

/// Flow measurements for one branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchFlow {
    pub branch: String,
    /// Whole days from first commit to completion, at least 1.
    pub flow_time_days: i64,
    /// Distinct UTC dates with a commit.
    pub active_days: usize,
    /// `min(active_days / flow_time_days, 1)`.
    pub flow_efficiency: f64,
    pub commits: usize,
    pub avg_commits_per_active_day: f64,
    pub first_commit_date: DateTime<Utc>,
    pub last_commit_date: DateTime<Utc>,
    /// Hours between the first and last branch commit.
    pub total_duration_hours: f64,
    /// Whether completion came from a detected merge commit.
    pub merged: bool,
}

/// Five efficiency buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PerformanceCategory {
    Excellent,
    Good,
    Average,
    Poor,
    VeryPoor,
}

impl PerformanceCategory {
    /// Bucket for an efficiency value.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_metrics::flow_efficiency::PerformanceCategory;
    ///
    /// assert_eq!(PerformanceCategory::from_efficiency(0.81), PerformanceCategory::Excellent);
    /// assert_eq!(PerformanceCategory::from_efficiency(0.8), PerformanceCategory::Good);
    /// assert_eq!(PerformanceCategory::from_efficiency(0.2), PerformanceCategory::VeryPoor);
    /// ```
    pub fn from_efficiency(efficiency: f64) -> Self {
        if efficiency > 0.8 {
            Self::Excellent
        } else if efficiency > 0.6 {
            Self::Good
        } else if efficiency > 0.4 {
            Self::Average
        } else if efficiency > 0.2 {
            Self::Poor
        } else {
            Self::VeryPoor
        }
    }
}

impl fmt::Display for PerformanceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Excellent => "EXCELLENT",
            Self::Good => "GOOD",
            Self::Average => "AVERAGE",
            Self::Poor => "POOR",
            Self::VeryPoor => "VERY_POOR",
        };
        f.write_str(label)
    }
}

/// Branch counts per [`PerformanceCategory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EfficiencyDistribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
    pub very_poor: usize,
}

impl EfficiencyDistribution {
    fn add(&mut self, efficiency: f64) {
        match PerformanceCategory::from_efficiency(efficiency) {
            PerformanceCategory::Excellent => self.excellent += 1,
            PerformanceCategory::Good => self.good += 1,
            PerformanceCategory::Average => self.average += 1,
            PerformanceCategory::Poor => self.poor += 1,
            PerformanceCategory::VeryPoor => self.very_poor += 1,
        }
    }
}

/// A branch singled out as a bottleneck or as an example to follow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowHighlight {
    pub branch: String,
    pub efficiency: f64,
    pub flow_time_days: i64,
    pub active_days: usize,
    /// What stands out.
    pub note: String,
}

impl FlowHighlight {
    fn new(flow: &BranchFlow, note: &str) -> Self {
        Self {
            branch: flow.branch.clone(),
            efficiency: flow.flow_efficiency,
            flow_time_days: flow.flow_time_days,
            active_days: flow.active_days,
            note: note.to_string(),
        }
    }
}

/// Aggregate flow figures.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowAnalysis {
    pub total_branches_analyzed: usize,
    /// Mean efficiency.
    pub overall_efficiency: f64,
    pub median_efficiency: f64,
    pub avg_flow_time_days: f64,
    pub avg_active_days: f64,
    pub efficiency_distribution: EfficiencyDistribution,
    /// Up to 10, lowest efficiency first.
    pub bottleneck_indicators: Vec<FlowHighlight>,
    /// Up to 5, highest efficiency first.
    pub best_practices: Vec<FlowHighlight>,
    pub performance_category: PerformanceCategory,
}

/// Flow efficiency result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowEfficiencyReport {
    /// One entry per analyzed branch.
    pub flow_metrics: Vec<BranchFlow>,
    /// Aggregates.
    pub analysis: FlowAnalysis,
    /// Branches whose history could not be read.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
    /// Advice.
    pub recommendations: Vec<String>,
}

/// Flow for one branch's history (oldest first) and optional merge commit.
///
/// Returns `None` for fewer than two commits or a zero time span.
pub fn branch_flow(name: &str, history: &[CommitRecord], merge: Option<&CommitRecord>) -> Option<BranchFlow> {
    let (first, last) = match history {
        [first, .., last] => (first, last),
        _ => return None,
    };
    let span = last.timestamp - first.timestamp;
    if span.num_seconds() == 0 {
        return None;
    }

    let active_days = history
        .iter()
        .map(|c| c.timestamp.date_naive())
        .collect::<BTreeSet<_>>()
        .len();
    let completion = merge.map_or(last.timestamp, |m| m.timestamp);
    let flow_time_days = (completion - first.timestamp).num_days().max(1);

    Some(BranchFlow {
        branch: name.to_string(),
        flow_time_days,
        active_days,
        flow_efficiency: (active_days as f64 / flow_time_days as f64).min(1.0),
        commits: history.len(),
        avg_commits_per_active_day: history.len() as f64 / active_days as f64,
        first_commit_date: first.timestamp,
        last_commit_date: last.timestamp,
        total_duration_hours: span.num_seconds() as f64 / 3600.0,
        merged: merge.is_some(),
    })
}

/// Aggregate per-branch flows. `flows` must not be empty.
pub fn summarize(flows: &[BranchFlow]) -> FlowAnalysis {
    let efficiencies: Vec<f64> = flows.iter().map(|f| f.flow_efficiency).collect();
    let flow_times: Vec<f64> = flows.iter().map(|f| f.flow_time_days as f64).collect();
    let active: Vec<f64> = flows.iter().map(|f| f.active_days as f64).collect();

    let mut distribution = EfficiencyDistribution::default();
    efficiencies.iter().for_each(|e| distribution.add(*e));

    let mut bottlenecks: Vec<FlowHighlight> = flows
        .iter()
        .filter(|f| f.flow_efficiency < 0.3 && f.flow_time_days > 7)
        .map(|f| FlowHighlight::new(f, "Low efficiency with long flow time"))
        .collect();
    bottlenecks.sort_by(|a, b| a.efficiency.total_cmp(&b.efficiency));
    bottlenecks.truncate(10);

    let mut best: Vec<FlowHighlight> = flows
        .iter()
        .filter(|f| f.flow_efficiency > 0.7 && f.flow_time_days <= 14)
        .map(|f| FlowHighlight::new(f, "High efficiency with reasonable flow time"))
        .collect();
    best.sort_by(|a, b| b.efficiency.total_cmp(&a.efficiency));
    best.truncate(5);

    let overall = stats::mean(&efficiencies);
    FlowAnalysis {
        total_branches_analyzed: flows.len(),
        overall_efficiency: overall,
        median_efficiency: stats::median(&efficiencies),
        avg_flow_time_days: stats::mean(&flow_times),
        avg_active_days: stats::mean(&active),
        efficiency_distribution: distribution,
        bottleneck_indicators: bottlenecks,
        best_practices: best,
        performance_category: PerformanceCategory::from_efficiency(overall),
    }
}

/// Advice for an analysis.
pub fn recommend(analysis: &FlowAnalysis) -> Vec<String> {
    let tier: &[&str] = match analysis.performance_category {
        PerformanceCategory::VeryPoor => &[
            "URGENT: Flow efficiency is critically low",
            "Investigate major process bottlenecks immediately",
            "Consider implementing continuous integration/deployment",
            "Review code review and approval processes",
        ],
        PerformanceCategory::Poor => &[
            "Flow efficiency needs significant improvement",
            "Identify and address process bottlenecks",
            "Consider reducing work-in-progress limits",
            "Implement automated testing to reduce review time",
        ],
        PerformanceCategory::Average => &[
            "Flow efficiency has room for improvement",
            "Optimize development workflows",
            "Consider improving tooling and automation",
        ],
        PerformanceCategory::Good | PerformanceCategory::Excellent => &[
            "Good flow efficiency - maintain current practices",
            "Continue monitoring for process degradation",
            "Share best practices with other teams",
        ],
    };

    let mut owned: Vec<String> = tier.iter().map(|s| s.to_string()).collect();
    if !analysis.bottleneck_indicators.is_empty() {
        owned.push(format!(
            "Address {} identified bottlenecks",
            analysis.bottleneck_indicators.len()
        ));
        owned.push("Focus on branches with long wait times".to_string());
        owned.push("Consider parallel development strategies".to_string());
    }
    if analysis.avg_flow_time_days > 14.0 {
        owned.push("Consider breaking down large features into smaller chunks".to_string());
    }
    if analysis.avg_flow_time_days > 30.0 {
        owned.push("PRIORITY: Feature delivery time is too long - review process".to_string());
    }
    owned
}

/// Measures how much of each branch's lifetime saw commits.
pub struct FlowEfficiencyAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
}

impl<'a> FlowEfficiencyAnalyzer<'a> {
    /// Analyzer over `repo`.
    pub fn new(repo: &'a dyn RepositorySource) -> Self {
        Self { repo }
    }

    fn measure(&self, branch: &BranchRecord, as_of: DateTime<Utc>) -> Result<Option<BranchFlow>, PulseError> {
        let mut history = branch.history(self.repo)?;
        history.retain(|c| c.timestamp <= as_of);
        if history.len() < 2 {
            return Ok(None);
        }
        let merge = self.repo.merge_commit(branch)?.filter(|m| m.timestamp <= as_of);
        Ok(branch_flow(&branch.name, &history, merge.as_ref()))
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when branches cannot be listed. A
    /// branch whose history fails to load is skipped.
    pub fn analyze(&self, options: &FlowEfficiencyOptions) -> Result<Outcome<FlowEfficiencyReport>, PulseError> {
        let mut flows = Vec::new();
        let mut skipped = Vec::new();
        for branch in self.repo.branches()? {
            if !options.branch_patterns.matches(&branch.name) {
                continue;
            }
            match self.measure(&branch, options.as_of) {
                Ok(Some(flow)) => flows.push(flow),
                Ok(None) => {}
                Err(e) => skipped.push(SkippedItem::new(&branch.name, &e)),
            }
        }
        tracing::debug!(branches = flows.len(), skipped = skipped.len(), "branch flow measured");

        if flows.is_empty() {
            return Ok(Outcome::no_data_skipping(
                "No suitable branches found for analysis",
                skipped,
            ));
        }

        let analysis = summarize(&flows);
        Ok(Outcome::Complete(FlowEfficiencyReport {
            recommendations: recommend(&analysis),
            flow_metrics: flows,
            analysis,
            skipped,
        }))
    }
}

impl MetricAnalyzer for FlowEfficiencyAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Flow Efficiency"
    }

    fn description(&self) -> &'static str {
        "Measures the ratio of active development time to total flow time, identifying bottlenecks in the development process."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = FlowEfficiencyOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result {
            Outcome::Complete(MetricReport::FlowEfficiency(report)) => recommend(&report.analysis),
            Outcome::NoData(_) => vec![INSUFFICIENT_DATA.to_string()],
            Outcome::Complete(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::source::MemorySource;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn make_commit(id: &str, hours: i64) -> CommitRecord {
        CommitRecord::new(id, "alice", start() + Duration::hours(hours))
    }

    fn branch(name: &str, hours: &[i64]) -> BranchRecord {
        BranchRecord::new(name).with_commits(
            hours
                .iter()
                .enumerate()
                .map(|(i, h)| make_commit(&format!("{name}-{i}"), *h))
                .collect(),
        )
    }

    #[test]
    fn efficiency_counts_distinct_days() {
        // commits on days 0, 0, 1 and 9
        let history = vec![
            make_commit("a", 0),
            make_commit("b", 2),
            make_commit("c", 24),
            make_commit("d", 24 * 9),
        ];
        let flow = branch_flow("feature/x", &history, None).unwrap();
        assert_eq!(flow.active_days, 3);
        assert_eq!(flow.flow_time_days, 9);
        assert!((flow.flow_efficiency - 3.0 / 9.0).abs() < 1e-9);
        assert_eq!(flow.total_duration_hours, 216.0);
        assert!(!flow.merged);
    }

    #[test]
    fn short_branches_floor_at_one_day_and_cap_at_one() {
        let history = vec![make_commit("a", 0), make_commit("b", 20)];
        let flow = branch_flow("feature/y", &history, None).unwrap();
        assert_eq!(flow.flow_time_days, 1);
        assert_eq!(flow.flow_efficiency, 1.0);
    }

    #[test]
    fn merge_commit_extends_flow_time() {
        let history = vec![make_commit("a", 0), make_commit("b", 24)];
        let merge = make_commit("m", 24 * 10);
        let flow = branch_flow("feature/z", &history, Some(&merge)).unwrap();
        assert_eq!(flow.flow_time_days, 10);
        assert!((flow.flow_efficiency - 0.2).abs() < 1e-9);
        assert!(flow.merged);
    }

    #[test]
    fn zero_span_and_single_commit_are_ignored() {
        assert!(branch_flow("b", &[make_commit("a", 0)], None).is_none());
        assert!(branch_flow("b", &[make_commit("a", 0), make_commit("b", 0)], None).is_none());
    }

    #[test]
    fn analyzer_filters_by_pattern_and_reports_bottlenecks() {
        let source = MemorySource::new()
            .with_branch(branch("feature/slow", &[0, 24 * 20]))
            .with_branch(branch("feature/fast", &[0, 3, 25]))
            .with_branch(branch("release/1.0", &[0, 48]));
        let Outcome::Complete(report) = FlowEfficiencyAnalyzer::new(&source)
            .analyze(&FlowEfficiencyOptions::default())
            .unwrap()
        else {
            panic!("expected report");
        };
        assert_eq!(report.analysis.total_branches_analyzed, 2);
        assert_eq!(report.analysis.bottleneck_indicators.len(), 1);
        assert_eq!(report.analysis.bottleneck_indicators[0].branch, "feature/slow");
        assert_eq!(report.analysis.best_practices[0].branch, "feature/fast");
        assert_eq!(report.analysis.efficiency_distribution.excellent, 1);
        assert_eq!(report.analysis.efficiency_distribution.very_poor, 1);
        assert!(report
            .recommendations
            .contains(&"Address 1 identified bottlenecks".to_string()));
    }

    #[test]
    fn broken_branch_is_skipped() {
        let source = MemorySource::new()
            .with_branch(BranchRecord::new("feature/ghost"))
            .with_branch(branch("feature/ok", &[0, 30]));
        let Outcome::Complete(report) = FlowEfficiencyAnalyzer::new(&source)
            .analyze(&FlowEfficiencyOptions::default())
            .unwrap()
        else {
            panic!("expected report");
        };
        assert_eq!(report.flow_metrics.len(), 1);
        assert_eq!(report.skipped[0].item, "feature/ghost");
    }

    #[test]
    fn no_matching_branches_is_no_data() {
        let source = MemorySource::new().with_branch(branch("main", &[0, 30]));
        let analyzer = FlowEfficiencyAnalyzer::new(&source);
        let result = analyzer.calculate(&MetricParams::new()).unwrap();
        assert_eq!(
            result.no_data_reason().map(|n| n.error.as_str()),
            Some("No suitable branches found for analysis")
        );
        assert_eq!(analyzer.recommendations(&result), vec![INSUFFICIENT_DATA]);
    }

    #[test]
    fn custom_patterns_from_params() {
        let params = MetricParams::new().with("branch_patterns", vec!["release/*"]);
        let options = FlowEfficiencyOptions::from_params(&params).unwrap();
        assert!(options.branch_patterns.matches("release/2.0"));
        assert!(!options.branch_patterns.matches("feature/a"));
    }

    #[test]
    fn commits_after_as_of_are_ignored() {
        let source = MemorySource::new()
            .with_branch(branch("feature/late", &[0, 24, 24 * 30]))
            .with_merge("feature/late", make_commit("merge", 24 * 40));
        let options = FlowEfficiencyOptions {
            as_of: start() + Duration::days(5),
            ..FlowEfficiencyOptions::default()
        };
        let Outcome::Complete(report) = FlowEfficiencyAnalyzer::new(&source).analyze(&options).unwrap() else {
            panic!("expected a report");
        };
        let flow = &report.flow_metrics[0];
        assert_eq!(flow.commits, 2);
        assert!(!flow.merged);
        assert_eq!(flow.flow_time_days, 1);
    }
}
