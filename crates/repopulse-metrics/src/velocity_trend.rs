//! Development velocity trends over weekly buckets.
//!
//! The window `[as_of − 7·weeks, as_of)` is read once and split into 7-day
//! buckets, oldest first. Five weekly series are fitted by least squares
//! against the week index and classified as stable, increasing or
//! decreasing.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use repopulse_core::{MetricParams, PulseError};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome};
use crate::source::{CommitQuery, CommitRecord, RepositorySource};
use crate::stats::{self, linear_regression};
use crate::window;

/// Registry name.
pub const NAME: &str = "velocity_trend";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["weeks_lookback", "as_of"];

/// Fewest weeks a trend is fitted over.
pub const MIN_WEEKS: u32 = 3;

/// Slopes smaller than this in magnitude are stable.
const STABLE_SLOPE: f64 = 0.1;

/// Trends at or below this confidence are not counted towards health.
const CONFIDENT: f64 = 0.6;

/// Weekly series that get a trend line, in report order.
pub const TREND_METRICS: [&str; 5] = [
    "commit_count",
    "unique_authors",
    "files_changed",
    "total_lines_changed",
    "avg_commit_size",
];

/// Parameters for [`VelocityTrendAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct VelocityTrendOptions {
    /// Number of weekly buckets (default: 12).
    pub weeks_lookback: u32,
    /// End of the window (exclusive).
    pub as_of: DateTime<Utc>,
}

impl Default for VelocityTrendOptions {
    fn default() -> Self {
        Self {
            weeks_lookback: 12,
            as_of: Utc::now(),
        }
    }
}

impl VelocityTrendOptions {
    /// Read options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys or
    /// mistyped values, or `weeks_lookback` above [`window::MAX_WEEKS_LOOKBACK`].
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            weeks_lookback: reader
                .u32("weeks_lookback")?
                .unwrap_or(defaults.weeks_lookback),
            as_of: reader.time("as_of")?.unwrap_or(defaults.as_of),
        };
        reader.finish()?;
        window::ensure_at_most(
            NAME,
            "weeks_lookback",
            options.weeks_lookback,
            window::MAX_WEEKS_LOOKBACK,
        )?;
        Ok(options)
    }
}

/// Activity in one 7-day bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyMetrics {
    /// 0 for the oldest week.
    pub week: usize,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub commit_count: usize,
    pub unique_authors: usize,
    /// Distinct paths touched.
    pub files_changed: usize,
    pub total_lines_changed: u64,
    pub total_insertions: u64,
    pub total_deletions: u64,
    pub avg_commit_size: f64,
    pub files_per_commit: f64,
    pub commits_per_author: f64,
}

impl WeeklyMetrics {
    /// Metrics for `commits` falling in `[week_start, week_end)`.
    pub fn from_commits(
        week: usize,
        week_start: DateTime<Utc>,
        week_end: DateTime<Utc>,
        commits: &[&CommitRecord],
    ) -> Self {
        let commit_count = commits.len();
        let authors: HashSet<&str> = commits.iter().map(|c| c.author.as_str()).collect();
        let files: HashSet<&str> = commits
            .iter()
            .flat_map(|c| c.files.iter().map(|f| f.path.as_str()))
            .collect();
        let total_insertions: u64 = commits.iter().map(|c| c.insertions()).sum();
        let total_deletions: u64 = commits.iter().map(|c| c.deletions()).sum();
        let total_lines_changed = total_insertions + total_deletions;

        let per_commit = |value: f64| {
            if commit_count > 0 {
                value / commit_count as f64
            } else {
                0.0
            }
        };

        Self {
            week,
            week_start,
            week_end,
            commit_count,
            unique_authors: authors.len(),
            files_changed: files.len(),
            total_lines_changed,
            total_insertions,
            total_deletions,
            avg_commit_size: per_commit(total_lines_changed as f64),
            files_per_commit: per_commit(files.len() as f64),
            commits_per_author: if authors.is_empty() {
                0.0
            } else {
                commit_count as f64 / authors.len() as f64
            },
        }
    }

    /// Value of one of the [`TREND_METRICS`].
    fn series_value(&self, metric: &str) -> f64 {
        match metric {
            "commit_count" => self.commit_count as f64,
            "unique_authors" => self.unique_authors as f64,
            "files_changed" => self.files_changed as f64,
            "total_lines_changed" => self.total_lines_changed as f64,
            _ => self.avg_commit_size,
        }
    }
}

/// Direction of a fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Stable,
    Increasing,
    Decreasing,
}

impl TrendDirection {
    /// Classify a slope.
    pub fn from_slope(slope: f64) -> Self {
        if slope.abs() < STABLE_SLOPE {
            Self::Stable
        } else if slope > 0.0 {
            Self::Increasing
        } else {
            Self::Decreasing
        }
    }
}

/// Least-squares trend of one weekly series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendStatistics {
    pub metric: String,
    pub slope: f64,
    pub trend: TrendDirection,
    /// `|r²|`.
    pub confidence: f64,
    /// Confidence above 0.5. A fixed cut-off, not a hypothesis test.
    pub statistical_significance: bool,
    pub weekly_change_rate: f64,
    /// Value in the newest week.
    pub current_value: f64,
    /// Extrapolation one week ahead, never negative.
    pub predicted_next_week: f64,
    pub r_squared: f64,
    /// The series, oldest week first.
    pub values: Vec<f64>,
}

impl TrendStatistics {
    /// Fit `values` against their index.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_metrics::velocity_trend::{TrendDirection, TrendStatistics};
    ///
    /// let trend = TrendStatistics::fit("commit_count", vec![2.0, 4.0, 6.0, 8.0]);
    /// assert_eq!(trend.trend, TrendDirection::Increasing);
    /// assert!((trend.predicted_next_week - 10.0).abs() < 1e-9);
    /// ```
    pub fn fit(metric: &str, values: Vec<f64>) -> Self {
        let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
        let fit = linear_regression(&xs, &values);
        let confidence = fit.r_squared.abs();
        let predicted = fit.slope * values.len() as f64 + fit.intercept;
        Self {
            metric: metric.to_string(),
            slope: fit.slope,
            trend: TrendDirection::from_slope(fit.slope),
            confidence,
            statistical_significance: confidence > 0.5,
            weekly_change_rate: fit.slope,
            current_value: values.last().copied().unwrap_or(0.0),
            predicted_next_week: predicted.max(0.0),
            r_squared: fit.r_squared,
            values,
        }
    }

    fn is_confident(&self) -> bool {
        self.confidence > CONFIDENT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Improving,
    Declining,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Excellent,
    Good,
    Average,
    Concerning,
    Poor,
}

impl HealthLevel {
    /// Level from the counts of confident positive and negative trends.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_metrics::velocity_trend::HealthLevel;
    ///
    /// assert_eq!(HealthLevel::from_counts(3, 1), HealthLevel::Excellent);
    /// assert_eq!(HealthLevel::from_counts(2, 2), HealthLevel::Good);
    /// assert_eq!(HealthLevel::from_counts(0, 3), HealthLevel::Poor);
    /// assert_eq!(HealthLevel::from_counts(1, 2), HealthLevel::Concerning);
    /// assert_eq!(HealthLevel::from_counts(0, 0), HealthLevel::Average);
    /// ```
    pub fn from_counts(positive: usize, negative: usize) -> Self {
        if positive >= 3 && negative <= 1 {
            Self::Excellent
        } else if positive >= 2 && negative <= 2 {
            Self::Good
        } else if negative >= 3 && positive <= 1 {
            Self::Poor
        } else if negative >= 2 && positive <= 2 {
            Self::Concerning
        } else {
            Self::Average
        }
    }
}

/// Overall velocity health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityHealth {
    pub overall_status: OverallStatus,
    pub health_level: HealthLevel,
    /// Mean confidence over every trend.
    pub confidence: f64,
    pub positive_trends: usize,
    pub negative_trends: usize,
    pub stable_trends: usize,
    pub key_concerns: Vec<String>,
    pub key_strengths: Vec<String>,
}

/// Velocity trend result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityTrendReport {
    /// Oldest week first.
    pub weekly_data: Vec<WeeklyMetrics>,
    /// Keyed by series name in [`TREND_METRICS`] order.
    pub trends: IndexMap<String, TrendStatistics>,
    pub overall_health: VelocityHealth,
    pub weeks_analyzed: usize,
    pub recommendations: Vec<String>,
}

/// Split `commits` into `weeks` buckets ending at `as_of`, oldest first.
///
/// # Errors
///
/// Returns [`PulseError::InvalidParameter`] when the window starts before
/// the earliest representable time.
pub fn weekly_buckets(
    commits: &[CommitRecord],
    as_of: DateTime<Utc>,
    weeks: u32,
) -> Result<Vec<WeeklyMetrics>, PulseError> {
    let start = window::weeks_start(NAME, as_of, weeks)?;
    let mut buckets: Vec<Vec<&CommitRecord>> = vec![Vec::new(); weeks as usize];
    for commit in commits {
        if commit.timestamp < start || commit.timestamp >= as_of {
            continue;
        }
        let elapsed = (commit.timestamp - start).num_seconds() / Duration::weeks(1).num_seconds();
        let Ok(index) = usize::try_from(elapsed) else {
            continue;
        };
        if let Some(bucket) = buckets.get_mut(index) {
            bucket.push(commit);
        }
    }
    Ok(buckets
        .iter()
        .enumerate()
        .map(|(week, commits)| {
            let week_start = start + Duration::weeks(week as i64);
            WeeklyMetrics::from_commits(week, week_start, week_start + Duration::weeks(1), commits)
        })
        .collect())
}

/// Fit a trend for each of the [`TREND_METRICS`].
pub fn trends(weeks: &[WeeklyMetrics]) -> IndexMap<String, TrendStatistics> {
    TREND_METRICS
        .iter()
        .map(|metric| {
            let values = weeks.iter().map(|w| w.series_value(metric)).collect();
            (metric.to_string(), TrendStatistics::fit(metric, values))
        })
        .collect()
}

fn concern(metric: &str) -> Option<&'static str> {
    match metric {
        "commit_count" => Some("Decreasing commit frequency"),
        "unique_authors" => Some("Decreasing contributor diversity"),
        "total_lines_changed" => Some("Decreasing code change volume"),
        "files_changed" => Some("Decreasing file modification breadth"),
        _ => None,
    }
}

fn strength(metric: &str) -> Option<&'static str> {
    match metric {
        "commit_count" => Some("Increasing commit frequency"),
        "unique_authors" => Some("Increasing contributor diversity"),
        "total_lines_changed" => Some("Increasing development activity"),
        "files_changed" => Some("Increasing codebase coverage"),
        _ => None,
    }
}

/// Assess health from fitted trends.
pub fn assess_health(trends: &IndexMap<String, TrendStatistics>) -> VelocityHealth {
    let (mut positive, mut negative, mut stable) = (0, 0, 0);
    let mut key_concerns = Vec::new();
    let mut key_strengths = Vec::new();
    for (metric, trend) in trends {
        if !trend.is_confident() {
            continue;
        }
        match trend.trend {
            TrendDirection::Increasing => {
                positive += 1;
                key_strengths.extend(strength(metric).map(String::from));
            }
            TrendDirection::Decreasing => {
                negative += 1;
                key_concerns.extend(concern(metric).map(String::from));
            }
            TrendDirection::Stable => stable += 1,
        }
    }

    let confidences: Vec<f64> = trends.values().map(|t| t.confidence).collect();
    let overall_status = if positive > negative {
        OverallStatus::Improving
    } else if negative > positive {
        OverallStatus::Declining
    } else {
        OverallStatus::Stable
    };

    VelocityHealth {
        overall_status,
        health_level: HealthLevel::from_counts(positive, negative),
        confidence: stats::mean(&confidences),
        positive_trends: positive,
        negative_trends: negative,
        stable_trends: stable,
        key_concerns,
        key_strengths,
    }
}

/// Advice from the number of weeks analyzed and the health assessment.
pub fn recommend(weeks_analyzed: usize, health: &VelocityHealth) -> Vec<String> {
    let mut recs: Vec<&str> = Vec::new();
    if weeks_analyzed < 4 {
        recs.push("Extend analysis period for more reliable trend detection");
    }

    match health.health_level {
        HealthLevel::Poor => recs.extend([
            "URGENT: Multiple velocity metrics are declining",
            "Investigate team capacity and process bottlenecks",
            "Consider team morale and technical debt issues",
            "Review and optimize development workflow",
        ]),
        HealthLevel::Concerning => recs.extend([
            "Monitor velocity trends closely",
            "Address identified declining metrics",
            "Consider process improvements",
        ]),
        HealthLevel::Excellent => recs.extend([
            "Excellent velocity trends - maintain current practices",
            "Document and share successful practices",
            "Monitor for sustainability",
        ]),
        HealthLevel::Good | HealthLevel::Average => {}
    }

    let has = |list: &[String], item: &str| list.iter().any(|s| s == item);
    if has(&health.key_concerns, "Decreasing commit frequency") {
        recs.push("Investigate causes of reduced commit frequency");
    }
    if has(&health.key_concerns, "Decreasing contributor diversity") {
        recs.extend([
            "Focus on team engagement and knowledge sharing",
            "Ensure equitable work distribution",
        ]);
    }
    if has(&health.key_strengths, "Increasing development activity") {
        recs.push("Monitor increased activity for sustainability");
    }
    if health.confidence < 0.4 {
        recs.push("Trends show low confidence - extend analysis period");
    }

    recs.into_iter().map(String::from).collect()
}

/// Detects whether the team is speeding up or slowing down.
pub struct VelocityTrendAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
}

impl<'a> VelocityTrendAnalyzer<'a> {
    /// Analyzer over `repo`.
    pub fn new(repo: &'a dyn RepositorySource) -> Self {
        Self { repo }
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error for the commit window.
    pub fn analyze(&self, options: &VelocityTrendOptions) -> Result<Outcome<VelocityTrendReport>, PulseError> {
        if options.weeks_lookback < MIN_WEEKS {
            return Ok(Outcome::no_data(
                "Insufficient data for trend analysis (need at least 3 weeks)",
            ));
        }

        let start = window::weeks_start(NAME, options.as_of, options.weeks_lookback)?;
        let commits = self
            .repo
            .commits(&CommitQuery::new().since(start).until(options.as_of))?;
        tracing::debug!(weeks = options.weeks_lookback, commits = commits.len(), "loaded velocity window");
        if commits.is_empty() {
            return Ok(Outcome::no_data("No commits found in the specified timeframe"));
        }

        let weekly_data = weekly_buckets(&commits, options.as_of, options.weeks_lookback)?;
        let trends = trends(&weekly_data);
        let overall_health = assess_health(&trends);
        Ok(Outcome::Complete(VelocityTrendReport {
            weeks_analyzed: weekly_data.len(),
            recommendations: recommend(weekly_data.len(), &overall_health),
            weekly_data,
            trends,
            overall_health,
        }))
    }
}

impl MetricAnalyzer for VelocityTrendAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Development Velocity Trend"
    }

    fn description(&self) -> &'static str {
        "Analyzes development velocity trends to detect if the team is speeding up, slowing down, or maintaining steady pace."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = VelocityTrendOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result.report() {
            Some(MetricReport::VelocityTrend(report)) => {
                recommend(report.weeks_analyzed, &report.overall_health)
            }
            _ => Vec::new(),
        }
    }
}
