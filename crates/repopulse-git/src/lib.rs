//! Repository history read from a local git repository via git2.
//!
//! [`GitSource`] implements the `RepositorySource` contract used by every
//! analyzer: commits with per-file line counts, local branches, merge
//! detection against the main branches, and file text from `HEAD`.

pub mod mining;

pub use mining::GitSource;
