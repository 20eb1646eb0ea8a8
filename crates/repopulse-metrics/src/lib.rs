//! Repository health analyzers over commit and branch history.
//!
//! Every analyzer implements [`MetricAnalyzer`] and reads history through a
//! [`RepositorySource`]. The [`registry`] maps metric names to analyzers:
//!
//! - `bus_factor`: fewest contributors covering most of the knowledge
//! - `knowledge_distribution`: Gini coefficient of knowledge per contributor
//! - `critical_files`: files ranked by change frequency, complexity and impact
//! - `single_point_failure`: files dominated by one author
//! - `flow_efficiency`: active days over flow time per branch
//! - `branch_lifecycle`: setup, development and completion phases of branches
//! - `velocity_trend`: weekly activity trends
//! - `cycle_time`: feature delivery time distribution

pub mod analyzer;
pub mod branch_lifecycle;
pub mod branches;
pub mod bus_factor;
pub mod critical_files;
pub mod cycle_time;
pub mod flow_efficiency;
pub mod heuristics;
pub mod knowledge;
pub mod knowledge_distribution;
pub mod registry;
pub mod single_point_failure;
pub mod source;
pub mod stats;
pub mod velocity_trend;
pub mod window;

pub use analyzer::{AnalysisResult, Memoized, MetricAnalyzer, MetricReport, NoData, Outcome, SkippedItem};
pub use heuristics::{FileScorer, HeuristicScorer};
pub use registry::{create_metric_analyzer, get_available_metrics, Registry};
pub use source::{BranchRecord, CommitQuery, CommitRecord, FileChange, MemorySource, RepositorySource};
