//! Knowledge distribution index: the Gini coefficient of per-contributor knowledge.

use std::fmt;

use chrono::{DateTime, Utc};
use repopulse_core::{MetricParams, PulseError};
use serde::Serialize;

use crate::analyzer::{AnalysisResult, MetricAnalyzer, MetricReport, Outcome};
use crate::heuristics::{FileScorer, HeuristicScorer};
use crate::knowledge::{self, KnowledgeWeights};
use crate::source::RepositorySource;
use crate::stats;
use crate::window::{self, commits_in_window, lookback_start};

/// Registry name.
pub const NAME: &str = "knowledge_distribution";

/// Parameter keys read by the options.
pub const PARAMETERS: &[&str] = &["lookback_months", "decay_half_life", "as_of"];

/// Parameters for [`KnowledgeDistributionAnalyzer`].
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeDistributionOptions {
    /// Months of history to weigh (default: 6).
    pub lookback_months: u32,
    /// Recency decay constant in days (default: 90).
    pub decay_half_life: f64,
    /// End of the window.
    pub as_of: DateTime<Utc>,
}

impl Default for KnowledgeDistributionOptions {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            decay_half_life: 90.0,
            as_of: Utc::now(),
        }
    }
}

impl KnowledgeDistributionOptions {
    /// Read and validate options from `params`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for unknown keys, a zero or
    /// oversized lookback or a non-positive half-life.
    pub fn from_params(params: &MetricParams) -> Result<Self, PulseError> {
        let defaults = Self::default();
        let mut reader = params.reader(NAME);
        let options = Self {
            lookback_months: reader
                .u32("lookback_months")?
                .unwrap_or(defaults.lookback_months),
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
        window::ensure_positive(NAME, "decay_half_life", options.decay_half_life)?;
        Ok(options)
    }
}

/// Quality band for a Gini coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DistributionQuality {
    /// gini < 0.3
    Excellent,
    /// gini < 0.5
    Good,
    /// gini < 0.6
    Acceptable,
    /// gini < 0.8
    Poor,
    /// gini ≥ 0.8
    Critical,
}

impl DistributionQuality {
    /// Band for `gini`.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_metrics::knowledge_distribution::DistributionQuality;
    ///
    /// assert_eq!(DistributionQuality::from_gini(0.1), DistributionQuality::Excellent);
    /// assert_eq!(DistributionQuality::from_gini(0.55), DistributionQuality::Acceptable);
    /// assert_eq!(DistributionQuality::from_gini(0.8), DistributionQuality::Critical);
    /// ```
    pub fn from_gini(gini: f64) -> Self {
        if gini < 0.3 {
            DistributionQuality::Excellent
        } else if gini < 0.5 {
            DistributionQuality::Good
        } else if gini < 0.6 {
            DistributionQuality::Acceptable
        } else if gini < 0.8 {
            DistributionQuality::Poor
        } else {
            DistributionQuality::Critical
        }
    }
}

impl fmt::Display for DistributionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionQuality::Excellent => write!(f, "EXCELLENT"),
            DistributionQuality::Good => write!(f, "GOOD"),
            DistributionQuality::Acceptable => write!(f, "ACCEPTABLE"),
            DistributionQuality::Poor => write!(f, "POOR"),
            DistributionQuality::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Concentration shares.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionAnalysis {
    /// Sum of every knowledge weight.
    pub total_knowledge: f64,
    /// Contributors in the map.
    pub contributor_count: usize,
    /// Share held by the most knowledgeable contributor.
    pub top_contributor_share: f64,
    /// Share held by the top three.
    pub top_3_contributors_share: f64,
    /// Share held by the least knowledgeable half (rounded down).
    pub bottom_50_percent_share: f64,
}

/// Knowledge distribution result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeDistributionReport {
    /// Inequality of per-contributor totals, in `[0, 1]`.
    pub gini_coefficient: f64,
    /// Band for the coefficient.
    pub distribution_quality: DistributionQuality,
    /// Contributors in the map.
    pub contributor_count: usize,
    /// Shares.
    pub distribution_analysis: DistributionAnalysis,
    /// Advice.
    pub recommendations: Vec<String>,
}

/// Gini coefficient of the per-contributor totals in `weights`.
pub fn gini_coefficient(weights: &KnowledgeWeights) -> f64 {
    let totals: Vec<f64> = knowledge::contributor_totals(weights)
        .into_iter()
        .map(|(_, total)| total)
        .collect();
    stats::gini(&totals)
}

/// Top, top-three and bottom-half shares of `weights`.
pub fn analyze_distribution(weights: &KnowledgeWeights) -> DistributionAnalysis {
    let mut totals: Vec<f64> = knowledge::contributor_totals(weights)
        .into_iter()
        .map(|(_, total)| total)
        .collect();
    totals.sort_by(|a, b| b.total_cmp(a));

    let total: f64 = totals.iter().sum();
    let n = totals.len();
    let mut analysis = DistributionAnalysis {
        total_knowledge: total,
        contributor_count: n,
        top_contributor_share: 0.0,
        top_3_contributors_share: 0.0,
        bottom_50_percent_share: 0.0,
    };
    if n == 0 || total <= 0.0 {
        return analysis;
    }

    analysis.top_contributor_share = totals[0] / total;
    analysis.top_3_contributors_share = totals.iter().take(3).sum::<f64>() / total;
    let bottom = n / 2;
    if bottom > 0 {
        analysis.bottom_50_percent_share = totals[n - bottom..].iter().sum::<f64>() / total;
    }
    analysis
}

/// Advice for a Gini coefficient.
pub fn recommend(gini: f64) -> Vec<String> {
    let recs: &[&str] = if gini > 0.8 {
        &[
            "CRITICAL: Knowledge is extremely concentrated - implement immediate knowledge sharing",
            "Establish mandatory pair programming for all critical components",
            "Create comprehensive documentation for all systems",
            "Implement cross-training program immediately",
        ]
    } else if gini > 0.6 {
        &[
            "Knowledge distribution is concerning - increase collaboration",
            "Implement regular knowledge sharing sessions",
            "Encourage code reviews across different team members",
            "Document critical business logic and architectural decisions",
        ]
    } else if gini > 0.5 {
        &[
            "Consider improving knowledge sharing practices",
            "Rotate development responsibilities more frequently",
            "Ensure all team members participate in code reviews",
        ]
    } else if gini > 0.3 {
        &[
            "Good knowledge distribution - maintain current practices",
            "Continue encouraging collaborative development",
        ]
    } else {
        &["Excellent knowledge distribution across the team"]
    };
    recs.iter().map(|r| r.to_string()).collect()
}

/// Report for precomputed weights, or `NoData` when they are empty.
pub fn report_for(weights: &KnowledgeWeights) -> Outcome<KnowledgeDistributionReport> {
    if weights.is_empty() {
        return Outcome::no_data("No knowledge data available");
    }
    let gini = gini_coefficient(weights);
    Outcome::Complete(KnowledgeDistributionReport {
        gini_coefficient: gini,
        distribution_quality: DistributionQuality::from_gini(gini),
        contributor_count: weights.len(),
        distribution_analysis: analyze_distribution(weights),
        recommendations: recommend(gini),
    })
}

/// Measures how unevenly knowledge is spread across contributors.
pub struct KnowledgeDistributionAnalyzer<'a> {
    repo: &'a dyn RepositorySource,
    scorer: Box<dyn FileScorer + 'a>,
    weights: Option<KnowledgeWeights>,
}

impl<'a> KnowledgeDistributionAnalyzer<'a> {
    /// Analyzer over `repo` using [`HeuristicScorer`].
    pub fn new(repo: &'a dyn RepositorySource) -> Self {
        Self {
            repo,
            scorer: Box::new(HeuristicScorer),
            weights: None,
        }
    }

    /// Replace the file scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: impl FileScorer + 'a) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Use precomputed weights instead of reading history.
    #[must_use]
    pub fn with_weights(mut self, weights: KnowledgeWeights) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Typed entry point.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when weights have to be computed.
    pub fn analyze(
        &self,
        options: &KnowledgeDistributionOptions,
    ) -> Result<Outcome<KnowledgeDistributionReport>, PulseError> {
        if let Some(weights) = &self.weights {
            return Ok(report_for(weights));
        }
        let since = lookback_start(NAME, options.as_of, options.lookback_months)?;
        let commits = commits_in_window(self.repo, since, options.as_of)?;
        let weights = knowledge::accumulate(
            &commits,
            options.as_of,
            options.decay_half_life,
            self.scorer.as_ref(),
        );
        Ok(report_for(&weights))
    }
}

impl MetricAnalyzer for KnowledgeDistributionAnalyzer<'_> {
    fn metric_name(&self) -> &'static str {
        "Knowledge Distribution Index (Gini Coefficient)"
    }

    fn description(&self) -> &'static str {
        "Measures inequality in knowledge distribution across team members using Gini coefficient. 0 = perfect equality, 1 = maximum inequality. Target: < 0.6"
    }

    fn parameters(&self) -> &'static [&'static str] {
        PARAMETERS
    }

    fn calculate(&self, params: &MetricParams) -> Result<AnalysisResult, PulseError> {
        let options = KnowledgeDistributionOptions::from_params(params)?;
        Ok(self.analyze(&options)?.map(MetricReport::from))
    }

    fn recommendations(&self, result: &AnalysisResult) -> Vec<String> {
        match result.report() {
            Some(MetricReport::KnowledgeDistribution(report)) => recommend(report.gini_coefficient),
            _ => Vec::new(),
        }
    }
}
