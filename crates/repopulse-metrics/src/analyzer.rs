//! The analyzer contract and its result types.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use repopulse_core::{MetricParams, PulseError};
use serde::Serialize;

use crate::branch_lifecycle::BranchLifecycleReport;
use crate::bus_factor::BusFactorReport;
use crate::critical_files::CriticalFilesReport;
use crate::cycle_time::CycleTimeReport;
use crate::flow_efficiency::FlowEfficiencyReport;
use crate::knowledge_distribution::KnowledgeDistributionReport;
use crate::single_point_failure::SinglePointFailureReport;
use crate::velocity_trend::VelocityTrendReport;

/// A repository health metric.
///
/// `calculate` is a pure function of the repository snapshot and the
/// parameters. Missing data is reported as [`Outcome::NoData`]; `Err` is
/// reserved for bad parameters and for failures reading the repository.
pub trait MetricAnalyzer {
    /// Human-readable metric name, e.g. `"Bus Factor"`.
    fn metric_name(&self) -> &'static str;

    /// One-sentence description of what is measured.
    fn description(&self) -> &'static str;

    /// Run the analysis.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown or out-of-range
    /// parameters, or the source's error when the top-level read fails.
    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError>;

    /// Parameter keys `calculate` accepts.
    fn parameters(&self) -> &'static [&'static str] {
        &[]
    }

    /// Actionable advice derived from a result.
    fn recommendations(&self, _result: &AnalysisResult) -> Vec<String> {
        Vec::new()
    }

    /// Deterministic key identifying a `calculate` call.
    fn cache_key(&self, params: &MetricParams) -> String {
        params.cache_key(self.metric_name())
    }
}

impl<T: MetricAnalyzer + ?Sized> MetricAnalyzer for Box<T> {
    fn metric_name(&self) -> &'static str {
        (**self).metric_name()
    }

    fn description(&self) -> &'static str {
        (**self).description()
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        (**self).calculate(params)
    }

    fn parameters(&self) -> &'static [&'static str] {
        (**self).parameters()
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        (**self).recommendations(result)
    }

    fn cache_key(&self, params: &MetricParams) -> String {
        (**self).cache_key(params)
    }
}

/// An item (branch or file) that could not be scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    /// Branch name or file path.
    pub item: String,
    /// Why it was skipped.
    pub error: String,
}

impl SkippedItem {
    /// Record a skipped item and log it.
    pub fn new(item: impl Into<String>, error: &PulseError) -> Self {
        let item = item.into();
        tracing::warn!(item = %item, error = %error, "skipping item");
        Self {
            item,
            error: error.to_string(),
        }
    }
}

/// Result body when no usable data exists.
///
/// Serializes with an `"error"` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoData {
    /// What was missing.
    pub error: String,
    /// Items that failed while looking for data.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedItem>,
}

/// Either a complete report or a [`NoData`] explanation.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::analyzer::Outcome;
///
/// let outcome: Outcome<u32> = Outcome::no_data("No commits found in the specified timeframe");
/// assert!(!outcome.is_complete());
/// let json = serde_json::to_string(&outcome).unwrap();
/// assert_eq!(json, r#"{"error":"No commits found in the specified timeframe"}"#);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    /// The analysis ran over real data.
    Complete(T),
    /// Nothing to analyze.
    NoData(NoData),
}

impl<T> Outcome<T> {
    /// A `NoData` outcome without skipped items.
    pub fn no_data(error: impl Into<String>) -> Self {
        Outcome::NoData(NoData {
            error: error.into(),
            skipped: Vec::new(),
        })
    }

    /// A `NoData` outcome carrying the items that failed.
    pub fn no_data_skipping(error: impl Into<String>, skipped: Vec<SkippedItem>) -> Self {
        Outcome::NoData(NoData {
            error: error.into(),
            skipped,
        })
    }

    /// Whether this is a complete report.
    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Complete(_))
    }

    /// The report, if complete.
    pub fn report(&self) -> Option<&T> {
        match self {
            Outcome::Complete(report) => Some(report),
            Outcome::NoData(_) => None,
        }
    }

    /// The explanation, if there was no data.
    pub fn no_data_reason(&self) -> Option<&NoData> {
        match self {
            Outcome::Complete(_) => None,
            Outcome::NoData(no_data) => Some(no_data),
        }
    }

    /// Convert the report type.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Complete(report) => Outcome::Complete(f(report)),
            Outcome::NoData(no_data) => Outcome::NoData(no_data),
        }
    }
}

/// The typed report produced by each built-in analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricReport {
    /// `bus_factor`
    BusFactor(BusFactorReport),
    /// `knowledge_distribution`
    KnowledgeDistribution(KnowledgeDistributionReport),
    /// `critical_files`
    CriticalFiles(CriticalFilesReport),
    /// `single_point_failure`
    SinglePointFailure(SinglePointFailureReport),
    /// `flow_efficiency`
    FlowEfficiency(FlowEfficiencyReport),
    /// `branch_lifecycle`
    BranchLifecycle(BranchLifecycleReport),
    /// `velocity_trend`
    VelocityTrend(VelocityTrendReport),
    /// `cycle_time`
    CycleTime(CycleTimeReport),
}

impl MetricReport {
    /// The recommendations embedded in the report.
    pub fn recommendations(&self) -> &[String] {
        match self {
            MetricReport::BusFactor(r) => &r.recommendations,
            MetricReport::KnowledgeDistribution(r) => &r.recommendations,
            MetricReport::CriticalFiles(r) => &r.recommendations,
            MetricReport::SinglePointFailure(r) => &r.recommendations,
            MetricReport::FlowEfficiency(r) => &r.recommendations,
            MetricReport::BranchLifecycle(r) => &r.recommendations,
            MetricReport::VelocityTrend(r) => &r.recommendations,
            MetricReport::CycleTime(r) => &r.recommendations,
        }
    }
}

macro_rules! impl_from_report {
    ($($variant:ident => $report:ty),* $(,)?) => {
        $(
            impl From<$report> for MetricReport {
                fn from(report: $report) -> Self {
                    MetricReport::$variant(report)
                }
            }
        )*
    };
}

impl_from_report! {
    BusFactor => BusFactorReport,
    KnowledgeDistribution => KnowledgeDistributionReport,
    CriticalFiles => CriticalFilesReport,
    SinglePointFailure => SinglePointFailureReport,
    FlowEfficiency => FlowEfficiencyReport,
    BranchLifecycle => BranchLifecycleReport,
    VelocityTrend => VelocityTrendReport,
    CycleTime => CycleTimeReport,
}

/// What every `calculate` call returns.
pub type AnalysisResult = Outcome<MetricReport>;

/// Caches an analyzer's successful results by [`MetricAnalyzer::cache_key`].
///
/// The wrapped analyzer stays stateless. Call [`Memoized::clear_cache`] (or
/// drop the wrapper) once the repository has changed.
///
/// # Examples
///
/// ```
/// use repopulse_core::MetricParams;
/// use repopulse_metrics::analyzer::{Memoized, MetricAnalyzer};
/// use repopulse_metrics::bus_factor::BusFactorAnalyzer;
/// use repopulse_metrics::source::MemorySource;
///
/// let source = MemorySource::new();
/// let analyzer = Memoized::new(BusFactorAnalyzer::new(&source));
/// let params = MetricParams::new().with("lookback_months", 3u32);
/// analyzer.calculate(&params).unwrap();
/// assert_eq!(analyzer.cached_len(), 1);
/// analyzer.clear_cache();
/// assert_eq!(analyzer.cached_len(), 0);
/// ```
pub struct Memoized<A> {
    inner: A,
    cache: Mutex<HashMap<String, AnalysisResult>>,
}

impl<A: MetricAnalyzer> Memoized<A> {
    /// Wrap `inner` with an empty cache.
    pub fn new(inner: A) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of cached results.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The wrapped analyzer.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

impl<A: MetricAnalyzer> MetricAnalyzer for Memoized<A> {
    fn metric_name(&self) -> &'static str {
        self.inner.metric_name()
    }

    fn description(&self) -> &'static str {
        self.inner.description()
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let key = self.inner.cache_key(params);
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            tracing::debug!(key = %key, "cache hit");
            return Ok(hit.clone());
        }
        let result = self.inner.calculate(params)?;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, result.clone());
        Ok(result)
    }

    fn parameters(&self) -> &'static [&'static str] {
        self.inner.parameters()
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        self.inner.recommendations(result)
    }

    fn cache_key(&self, params: &MetricParams) -> String {
        self.inner.cache_key(params)
    }
}
