//! Name → analyzer dispatch.

use indexmap::IndexMap;
use repopulse_core::PulseError;

use crate::analyzer::MetricAnalyzer;
use crate::branch_lifecycle::{self, BranchLifecycleAnalyzer};
use crate::bus_factor::{self, BusFactorAnalyzer};
use crate::critical_files::{self, CriticalFileAnalyzer};
use crate::cycle_time::{self, CycleTimeAnalyzer};
use crate::flow_efficiency::{self, FlowEfficiencyAnalyzer};
use crate::knowledge_distribution::{self, KnowledgeDistributionAnalyzer};
use crate::single_point_failure::{self, SinglePointFailureAnalyzer};
use crate::source::RepositorySource;
use crate::velocity_trend::{self, VelocityTrendAnalyzer};

/// Builds an analyzer bound to a repository.
pub type AnalyzerFactory = for<'a> fn(&'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a>;

/// Registered analyzers, in registration order.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::analyzer::MetricAnalyzer;
/// use repopulse_metrics::registry::Registry;
/// use repopulse_metrics::source::MemorySource;
///
/// let registry = Registry::default();
/// assert_eq!(registry.names().len(), 8);
///
/// let source = MemorySource::new();
/// let analyzer = registry.create("bus_factor", &source).unwrap();
/// assert_eq!(analyzer.metric_name(), "Bus Factor");
/// assert!(registry.create("nope", &source).is_err());
/// ```
#[derive(Clone)]
pub struct Registry {
    factories: IndexMap<&'static str, AnalyzerFactory>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Register `factory` under `name`, replacing any earlier entry.
    pub fn register(&mut self, name: &'static str, factory: AnalyzerFactory) -> &mut Self {
        self.factories.insert(name, factory);
        self
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the analyzer registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::UnknownMetric`] listing the registered names.
    pub fn create<'a>(
        &self,
        name: &str,
        repo: &'a dyn RepositorySource,
    ) -> Result<Box<dyn MetricAnalyzer + 'a>, PulseError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| PulseError::UnknownMetric {
                name: name.to_string(),
                available: self.names().join(", "),
            })?;
        Ok(factory(repo))
    }
}

impl Default for Registry {
    /// The eight built-in analyzers.
    fn default() -> Self {
        let mut registry = Self::new();
        registry
            .register(bus_factor::NAME, bus_factor_analyzer)
            .register(knowledge_distribution::NAME, knowledge_distribution_analyzer)
            .register(critical_files::NAME, critical_files_analyzer)
            .register(single_point_failure::NAME, single_point_failure_analyzer)
            .register(flow_efficiency::NAME, flow_efficiency_analyzer)
            .register(branch_lifecycle::NAME, branch_lifecycle_analyzer)
            .register(velocity_trend::NAME, velocity_trend_analyzer)
            .register(cycle_time::NAME, cycle_time_analyzer);
        registry
    }
}

fn bus_factor_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(BusFactorAnalyzer::new(repo))
}

fn knowledge_distribution_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(KnowledgeDistributionAnalyzer::new(repo))
}

fn critical_files_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(CriticalFileAnalyzer::new(repo))
}

fn single_point_failure_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(SinglePointFailureAnalyzer::new(repo))
}

fn flow_efficiency_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(FlowEfficiencyAnalyzer::new(repo))
}

fn branch_lifecycle_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(BranchLifecycleAnalyzer::new(repo))
}

fn velocity_trend_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(VelocityTrendAnalyzer::new(repo))
}

fn cycle_time_analyzer<'a>(repo: &'a dyn RepositorySource) -> Box<dyn MetricAnalyzer + 'a> {
    Box::new(CycleTimeAnalyzer::new(repo))
}

/// Build a built-in analyzer by name.
///
/// # Errors
///
/// Returns [`PulseError::UnknownMetric`] for names not in
/// [`get_available_metrics`].
pub fn create_metric_analyzer<'a>(
    name: &str,
    repo: &'a dyn RepositorySource,
) -> Result<Box<dyn MetricAnalyzer + 'a>, PulseError> {
    Registry::default().create(name, repo)
}

/// Names of the built-in analyzers.
pub fn get_available_metrics() -> Vec<&'static str> {
    Registry::default().names()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn default_order() {
        assert_eq!(
            get_available_metrics(),
            vec![
                "bus_factor",
                "knowledge_distribution",
                "critical_files",
                "single_point_failure",
                "flow_efficiency",
                "branch_lifecycle",
                "velocity_trend",
                "cycle_time",
            ]
        );
    }

    #[test]
    fn unknown_metric_lists_available() {
        let source = MemorySource::new();
        let err = create_metric_analyzer("not_a_real_metric", &source)
            .err()
            .expect("unknown name must fail");
        let message = err.to_string();
        assert!(message.contains("unknown metric 'not_a_real_metric'"));
        assert!(message.contains("bus_factor, knowledge_distribution"));
    }

    #[test]
    fn custom_registration_replaces() {
        let mut registry = Registry::new();
        assert!(!registry.contains("bus_factor"));
        registry.register("bus_factor", cycle_time_analyzer);
        let source = MemorySource::new();
        let analyzer = registry.create("bus_factor", &source).unwrap();
        assert_eq!(analyzer.metric_name(), "Cycle Time Distribution");
    }
}
