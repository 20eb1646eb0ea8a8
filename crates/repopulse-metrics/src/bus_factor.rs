//! Bus factor: the fewest contributors holding most of the knowledge.
//!
//! Knowledge is accumulated per contributor and file with
//! [`knowledge::accumulate`](crate::knowledge::accumulate). Contributors are
//! then taken from most to least knowledgeable until their combined share
//! reaches `knowledge_threshold`.

use chrono::{DateTime, Utc};
use repopulse_core::{MetricParams, PulseError, RiskLevel};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome};
use crate::heuristics::{FileScorer, HeuristicScorer};
use crate::knowledge::{self, KnowledgeWeights};
use crate::source::RepositorySource;
use crate::window::{self, commits_in_window, lookback_start};

/// Registry name.
pub const NAME: &str = "bus_factor";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["lookback_months", "knowledge_threshold", "decay_half_life", "as_of"];

/// Parameters for [`BusFactorAnalyzer`].
///
/// # Examples
///
/// ```
/// use repopulse_metrics::bus_factor::BusFactorOptions;
///
/// let opts = BusFactorOptions::default();
/// assert_eq!(opts.lookback_months, 6);
/// assert_eq!(opts.knowledge_threshold, 0.8);
/// assert_eq!(opts.decay_half_life, 90.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BusFactorOptions {
    /// Months of history to consider (default: 6).
    pub lookback_months: u32,
    /// Share of total knowledge the selected contributors must cover (default: 0.8).
    pub knowledge_threshold: f64,
    /// Recency decay constant in days (default: 90).
    pub decay_half_life: f64,
    /// End of the window.
    pub as_of: DateTime<Utc>,
}

impl Default for BusFactorOptions {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            knowledge_threshold: 0.8,
            decay_half_life: 90.0,
            as_of: Utc::now(),
        }
    }
}

impl BusFactorOptions {
    /// Read and validate options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys, a threshold
    /// outside `[0, 1]`, a non-positive half-life or a zero or oversized lookback.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            lookback_months: reader
                .u32("lookback_months")?
                .unwrap_or(defaults.lookback_months),
            knowledge_threshold: reader
                .f64("knowledge_threshold")?
                .unwrap_or(defaults.knowledge_threshold),
            decay_half_life: reader
                .f64("decay_half_life")?
                .unwrap_or(defaults.decay_half_life),
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
        window::ensure_fraction(NAME, "knowledge_threshold", options.knowledge_threshold)?;
        window::ensure_positive(NAME, "decay_half_life", options.decay_half_life)?;
        Ok(options)
    }
}

/// One step of the contributor selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageStep {
    /// Contributor taken at this step.
    pub contributor: String,
    /// Their total knowledge.
    pub knowledge_amount: f64,
    /// Share of total knowledge covered so far.
    pub cumulative_coverage: f64,
    /// Number of files they touched.
    pub files_count: usize,
}

/// How the bus factor was reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageAnalysis {
    /// Requested coverage.
    pub target_coverage: f64,
    /// Coverage reached by the selected contributors.
    pub actual_coverage: f64,
    /// Sum of every knowledge weight.
    pub total_knowledge: f64,
    /// Selected contributors in order.
    pub coverage_path: Vec<CoverageStep>,
}

/// Bus factor result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusFactorReport {
    /// Contributors needed to reach the threshold.
    pub bus_factor: usize,
    /// Threshold that was applied.
    pub knowledge_threshold: f64,
    /// Contributors with any knowledge in the window.
    pub total_contributors: usize,
    /// The underlying weights.
    pub knowledge_weights: KnowledgeWeights,
    /// Selection details.
    pub coverage_analysis: CoverageAnalysis,
    /// Risk band for the bus factor.
    pub risk_level: RiskLevel,
    /// Advice.
    pub recommendations: Vec<String>,
}

/// Select contributors by descending knowledge until `threshold` of the
/// total is covered.
///
/// Ties keep map order. An empty map yields a bus factor of 0.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::bus_factor::select_contributors;
/// use repopulse_metrics::knowledge::KnowledgeWeights;
///
/// let mut weights = KnowledgeWeights::new();
/// weights.entry("alice".into()).or_default().insert("f1".into(), 10.0);
/// weights.entry("alice".into()).or_default().insert("f2".into(), 5.0);
/// weights.entry("bob".into()).or_default().insert("f2".into(), 3.0);
/// weights.entry("bob".into()).or_default().insert("f3".into(), 2.0);
/// weights.entry("charlie".into()).or_default().insert("f3".into(), 1.0);
///
/// let (bus_factor, coverage) = select_contributors(&weights, 0.8);
/// assert_eq!(bus_factor, 2);
/// assert_eq!(coverage.total_knowledge, 21.0);
/// assert_eq!(coverage.coverage_path[1].contributor, "bob");
/// ```
pub fn select_contributors(weights: &KnowledgeWeights, threshold: f64) -> (usize, CoverageAnalysis) {
    let total = knowledge::total_knowledge(weights);
    let target = total * threshold;

    let mut ranked: Vec<(&String, f64, usize)> = weights
        .iter()
        .map(|(author, files)| (author, files.values().sum::<f64>(), files.len()))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let share = |amount: f64| if total > 0.0 { amount / total } else { 0.0 };
    let mut cumulative = 0.0;
    let mut path = Vec::new();
    for (author, amount, files_count) in ranked {
        cumulative += amount;
        path.push(CoverageStep {
            contributor: author.clone(),
            knowledge_amount: amount,
            cumulative_coverage: share(cumulative),
            files_count,
        });
        if cumulative >= target {
            break;
        }
    }

    let coverage = CoverageAnalysis {
        target_coverage: threshold,
        actual_coverage: share(cumulative),
        total_knowledge: total,
        coverage_path: path,
    };
    (coverage.coverage_path.len(), coverage)
}

/// Advice for a bus factor among `total_contributors`.
pub fn recommend(bus_factor: usize, total_contributors: usize) -> Vec<String> {
    let mut recs: Vec<String> = match bus_factor {
        0 | 1 => vec![
            "URGENT: Implement immediate knowledge sharing sessions",
            "Create comprehensive documentation for critical components",
            "Establish pair programming practices",
            "Cross-train team members on critical systems",
        ],
        2 => vec![
            "Increase code review participation",
            "Implement knowledge sharing workshops",
            "Document critical business logic",
            "Encourage rotation of development responsibilities",
        ],
        3 => vec![
            "Continue current knowledge sharing practices",
            "Monitor for knowledge concentration trends",
            "Ensure new team members are onboarded on critical systems",
        ],
        _ => vec![
            "Excellent knowledge distribution",
            "Maintain current practices",
            "Consider mentoring junior developers",
        ],
    }
    .into_iter()
    .map(String::from)
    .collect();

    if total_contributors > 0 && (bus_factor as f64 / total_contributors as f64) < 0.3 {
        recs.push("Consider spreading knowledge more evenly across team members".to_string());
    }
    recs
}

/// Computes the project bus factor from recency-weighted commit history.
pub struct BusFactorAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
    scorer: Box<dyn FileScorer + 'a>,
}

impl<'a> BusFactorAnalyzer<'a> {
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

    /// Knowledge weights for the window described by `options`.
    ///
    /// # Errors
    ///
    /// Propagates the source's error.
    pub fn knowledge_weights(&self, options: &BusFactorOptions) -> Result<KnowledgeWeights, PulseError> {
        let since = lookback_start(NAME, options.as_of, options.lookback_months)?;
        let commits = commits_in_window(self.repo, since, options.as_of)?;
        Ok(knowledge::accumulate(
            &commits,
            options.as_of,
            options.decay_half_life,
            self.scorer.as_ref(),
        ))
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error.
    pub fn analyze(&self, options: &BusFactorOptions) -> Result<Outcome<BusFactorReport>, PulseError> {
        let weights = self.knowledge_weights(options)?;
        if weights.is_empty() {
            return Ok(Outcome::no_data("No commits found in the specified timeframe"));
        }

        let (bus_factor, coverage_analysis) = select_contributors(&weights, options.knowledge_threshold);
        let total_contributors = weights.len();
        tracing::debug!(bus_factor, total_contributors, "bus factor computed");

        Ok(Outcome::Complete(BusFactorReport {
            bus_factor,
            knowledge_threshold: options.knowledge_threshold,
            total_contributors,
            knowledge_weights: weights,
            coverage_analysis,
            risk_level: RiskLevel::from_bus_factor(bus_factor),
            recommendations: recommend(bus_factor, total_contributors),
        }))
    }
}

impl MetricAnalyzer for BusFactorAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Bus Factor"
    }

    fn description(&self) -> &'static str {
        "Minimum number of people whose absence would severely impact project continuity based on knowledge distribution."
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = BusFactorOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result.report() {
            Some(MetricReport::BusFactor(report)) => recommend(report.bus_factor, report.total_contributors),
            _ => Vec::new(),
        }
    }
}
