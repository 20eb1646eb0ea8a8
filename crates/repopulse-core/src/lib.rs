//! Core types, configuration, and error handling for repopulse.
//!
//! This crate provides the shared foundation used by the other repopulse crates:
//! - [`PulseError`]: unified error type using `thiserror`
//! - [`PulseConfig`]: configuration loaded from `.repopulse.toml`
//! - [`MetricParams`]: the keyword parameters handed to an analyzer
//! - Shared types: [`RiskLevel`], [`OutputFormat`]

mod config;
mod error;
mod params;
mod types;

pub use config::{OutputConfig, PulseConfig, SourceConfig};
pub use error::PulseError;
pub use params::{MetricParams, ParamReader, ParamValue};
pub use types::{OutputFormat, RiskLevel};

/// A convenience `Result` type for repopulse operations.
pub type Result<T> = std::result::Result<T, PulseError>;
