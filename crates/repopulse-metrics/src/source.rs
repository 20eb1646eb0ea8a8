//! Commit and branch records, and the read-only repository contract.
//!
//! Analyzers never talk to version control directly. They receive a
//! [`RepositorySource`] and read [`CommitRecord`]s and [`BranchRecord`]s
//! through it. [`MemorySource`] holds a snapshot in memory.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use repopulse_core::PulseError;
use serde::{Deserialize, Serialize};

/// A single file touched by a commit.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::source::FileChange;
///
/// let change = FileChange::new("src/main.rs", 10, 3);
/// assert_eq!(change.lines_changed(), 13);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    /// File path relative to the repository root.
    pub path: String,
    /// Lines added.
    pub insertions: u64,
    /// Lines removed.
    pub deletions: u64,
}

impl FileChange {
    /// Create a file change.
    pub fn new(path: impl Into<String>, insertions: u64, deletions: u64) -> Self {
        Self {
            path: path.into(),
            insertions,
            deletions,
        }
    }

    /// Insertions plus deletions.
    pub fn lines_changed(&self) -> u64 {
        self.insertions + self.deletions
    }
}

/// Commit data as seen by the analyzers.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use repopulse_metrics::source::{CommitRecord, FileChange};
///
/// let commit = CommitRecord::new("a1", "alice", Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap())
///     .with_file(FileChange::new("lib.rs", 4, 1))
///     .with_file(FileChange::new("main.rs", 2, 0));
/// assert_eq!(commit.insertions(), 6);
/// assert_eq!(commit.deletions(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Commit hash (or any unique id).
    pub id: String,
    /// Author identifier.
    pub author: String,
    /// Commit time.
    pub timestamp: DateTime<Utc>,
    /// Files changed by this commit, in diff order.
    pub files: Vec<FileChange>,
    /// Number of parents; more than one means a merge.
    #[serde(default = "default_parent_count")]
    pub parent_count: usize,
}

fn default_parent_count() -> usize {
    1
}

impl CommitRecord {
    /// Create a commit with no file changes and a single parent.
    pub fn new(id: impl Into<String>, author: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            timestamp,
            files: Vec::new(),
            parent_count: default_parent_count(),
        }
    }

    /// Builder-style file change.
    #[must_use]
    pub fn with_file(mut self, change: FileChange) -> Self {
        self.files.push(change);
        self
    }

    /// Builder-style parent count.
    #[must_use]
    pub fn with_parents(mut self, parent_count: usize) -> Self {
        self.parent_count = parent_count;
        self
    }

    /// Total lines added across all files.
    pub fn insertions(&self) -> u64 {
        self.files.iter().map(|f| f.insertions).sum()
    }

    /// Total lines removed across all files.
    pub fn deletions(&self) -> u64 {
        self.files.iter().map(|f| f.deletions).sum()
    }

    /// Insertions plus deletions.
    pub fn lines_changed(&self) -> u64 {
        self.insertions() + self.deletions()
    }

    /// Whether this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parent_count > 1
    }
}

/// A branch and, optionally, its history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchRecord {
    /// Short branch name, e.g. `feature/login`.
    pub name: String,
    /// Commits reachable from the branch, when the source already has them.
    #[serde(default)]
    pub commits: Option<Vec<CommitRecord>>,
    /// Creation time, when the source knows it.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl BranchRecord {
    /// A branch whose history must be fetched through the source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            commits: None,
            created_at: None,
        }
    }

    /// Builder-style inline history.
    #[must_use]
    pub fn with_commits(mut self, commits: Vec<CommitRecord>) -> Self {
        self.commits = Some(commits);
        self
    }

    /// Builder-style creation time.
    #[must_use]
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// This branch's commits sorted oldest first.
    ///
    /// Uses the inline history when present, otherwise asks `source`.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when the history has to be fetched.
    pub fn history(&self, source: &dyn RepositorySource) -> Result<Vec<CommitRecord>, PulseError> {
        let mut commits = match &self.commits {
            Some(commits) => commits.clone(),
            None => source.all_commits(Some(&self.name))?,
        };
        commits.sort_by_key(|c| c.timestamp);
        Ok(commits)
    }
}

/// Filter for [`RepositorySource::commits`].
///
/// `since` is inclusive, `until` is exclusive.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use repopulse_metrics::source::CommitQuery;
///
/// let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
/// let query = CommitQuery::new().since(start).limit(100);
/// assert!(query.contains(start));
/// assert!(query.until.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitQuery {
    /// Earliest commit time to include.
    pub since: Option<DateTime<Utc>>,
    /// Commits at or after this time are excluded.
    pub until: Option<DateTime<Utc>>,
    /// Branch to walk; the default branch when `None`.
    pub branch: Option<String>,
    /// Return at most this many commits (newest first).
    pub limit: Option<usize>,
}

impl CommitQuery {
    /// An unrestricted query on the default branch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the inclusive lower bound.
    #[must_use]
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Set the exclusive upper bound.
    #[must_use]
    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Restrict to one branch.
    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Cap the number of commits returned.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `timestamp` falls inside the `[since, until)` window.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| timestamp >= since)
            && self.until.map_or(true, |until| timestamp < until)
    }
}

/// Read-only access to repository history.
///
/// Implementations must not be mutated by analyzers; every method takes
/// `&self`. Commit lists are returned newest first.
pub trait RepositorySource {
    /// Every commit reachable from `branch`, or from the default branch.
    ///
    /// # Errors
    ///
    /// Returns an error when the branch cannot be resolved or walked.
    fn all_commits(&self, branch: Option<&str>) -> Result<Vec<CommitRecord>, PulseError>;

    /// Commits matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error when the history cannot be read.
    fn commits(&self, query: &CommitQuery) -> Result<Vec<CommitRecord>, PulseError>;

    /// All local branches.
    ///
    /// # Errors
    ///
    /// Returns an error when branches cannot be listed.
    fn branches(&self) -> Result<Vec<BranchRecord>, PulseError>;

    /// The commit that merged `branch` into a main branch, if any.
    ///
    /// Sources without merge tracking keep the default, which reports no
    /// merge; analyzers then treat the last branch commit as completion.
    ///
    /// # Errors
    ///
    /// Returns an error when history cannot be searched.
    fn merge_commit(&self, _branch: &BranchRecord) -> Result<Option<CommitRecord>, PulseError> {
        Ok(None)
    }

    /// Current text of the file at `path`, if available.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read.
    fn file_content(&self, _path: &str) -> Result<Option<String>, PulseError> {
        Ok(None)
    }
}

/// In-memory [`RepositorySource`] over an already extracted snapshot.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use repopulse_metrics::source::{BranchRecord, CommitRecord, CommitQuery, MemorySource, RepositorySource};
///
/// let t = |d| Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap();
/// let source = MemorySource::new()
///     .with_commits(vec![
///         CommitRecord::new("a", "alice", t(1)),
///         CommitRecord::new("b", "bob", t(2)),
///     ])
///     .with_branch(BranchRecord::new("feature/x").with_commits(vec![CommitRecord::new("c", "carol", t(3))]));
///
/// let recent = source.commits(&CommitQuery::new().since(t(2))).unwrap();
/// assert_eq!(recent.len(), 1);
/// assert_eq!(source.all_commits(Some("feature/x")).unwrap()[0].author, "carol");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    commits: Vec<CommitRecord>,
    branches: Vec<BranchRecord>,
    merges: HashMap<String, CommitRecord>,
    files: HashMap<String, String>,
    unreadable: HashSet<String>,
}

impl MemorySource {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default branch history.
    #[must_use]
    pub fn with_commits(mut self, commits: Vec<CommitRecord>) -> Self {
        self.commits = commits;
        self
    }

    /// Add a branch.
    #[must_use]
    pub fn with_branch(mut self, branch: BranchRecord) -> Self {
        self.branches.push(branch);
        self
    }

    /// Record the merge commit for `branch`.
    #[must_use]
    pub fn with_merge(mut self, branch: impl Into<String>, merge: CommitRecord) -> Self {
        self.merges.insert(branch.into(), merge);
        self
    }

    /// Provide the text of a file.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Make reads of `path` fail.
    #[must_use]
    pub fn with_unreadable_file(mut self, path: impl Into<String>) -> Self {
        self.unreadable.insert(path.into());
        self
    }

    fn history(&self, branch: Option<&str>) -> Result<Vec<CommitRecord>, PulseError> {
        let mut commits = match branch {
            None => self.commits.clone(),
            Some(name) => {
                let record = self
                    .branches
                    .iter()
                    .find(|b| b.name == name)
                    .ok_or_else(|| PulseError::Source(format!("unknown branch '{name}'")))?;
                record.commits.clone().ok_or_else(|| {
                    PulseError::Source(format!("no history recorded for branch '{name}'"))
                })?
            }
        };
        commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(commits)
    }
}

impl RepositorySource for MemorySource {
    fn all_commits(&self, branch: Option<&str>) -> Result<Vec<CommitRecord>, PulseError> {
        self.history(branch)
    }

    fn commits(&self, query: &CommitQuery) -> Result<Vec<CommitRecord>, PulseError> {
        let mut commits: Vec<CommitRecord> = self
            .history(query.branch.as_deref())?
            .into_iter()
            .filter(|c| query.contains(c.timestamp))
            .collect();
        if let Some(limit) = query.limit {
            commits.truncate(limit);
        }
        Ok(commits)
    }

    fn branches(&self) -> Result<Vec<BranchRecord>, PulseError> {
        Ok(self.branches.clone())
    }

    fn merge_commit(&self, branch: &BranchRecord) -> Result<Option<CommitRecord>, PulseError> {
        Ok(self.merges.get(&branch.name).cloned())
    }

    fn file_content(&self, path: &str) -> Result<Option<String>, PulseError> {
        if self.unreadable.contains(path) {
            return Err(PulseError::Source(format!("cannot read '{path}'")));
        }
        Ok(self.files.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 4, day, 10, 0, 0).unwrap()
    }

    fn snapshot() -> MemorySource {
        MemorySource::new().with_commits(vec![
            CommitRecord::new("1", "alice", at(1)),
            CommitRecord::new("3", "carol", at(3)),
            CommitRecord::new("2", "bob", at(2)),
        ])
    }

    #[test]
    fn commits_are_newest_first() {
        let commits = snapshot().all_commits(None).unwrap();
        let ids: Vec<&str> = commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[test]
    fn query_window_is_half_open() {
        let query = CommitQuery::new().since(at(2)).until(at(3));
        let commits = snapshot().commits(&query).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].id, "2");
    }

    #[test]
    fn query_limit_keeps_newest() {
        let commits = snapshot().commits(&CommitQuery::new().limit(2)).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].id, "3");
    }

    #[test]
    fn unknown_branch_is_an_error() {
        let err = snapshot().all_commits(Some("nope")).unwrap_err();
        assert!(err.to_string().contains("unknown branch 'nope'"));
    }

    #[test]
    fn branch_history_prefers_inline_commits_and_sorts_oldest_first() {
        let branch = BranchRecord::new("feature/a").with_commits(vec![
            CommitRecord::new("late", "alice", at(5)),
            CommitRecord::new("early", "alice", at(4)),
        ]);
        let history = branch.history(&MemorySource::new()).unwrap();
        assert_eq!(history[0].id, "early");
        assert_eq!(history[1].id, "late");
    }

    #[test]
    fn branch_history_falls_back_to_source() {
        let source = MemorySource::new().with_branch(
            BranchRecord::new("feature/b").with_commits(vec![CommitRecord::new("x", "bob", at(6))]),
        );
        let history = BranchRecord::new("feature/b").history(&source).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn file_reads() {
        let source = MemorySource::new()
            .with_file("src/lib.rs", "fn main() {}")
            .with_unreadable_file("secret.bin");
        assert_eq!(source.file_content("src/lib.rs").unwrap().as_deref(), Some("fn main() {}"));
        assert_eq!(source.file_content("missing.rs").unwrap(), None);
        assert!(source.file_content("secret.bin").is_err());
    }

    #[test]
    fn commit_totals_sum_files() {
        let commit = CommitRecord::new("m", "alice", at(1))
            .with_file(FileChange::new("a.rs", 3, 1))
            .with_file(FileChange::new("b.rs", 2, 2))
            .with_parents(2);
        assert_eq!(commit.lines_changed(), 8);
        assert!(commit.is_merge());
    }

    #[test]
    fn merge_lookup_by_branch_name() {
        let merge = CommitRecord::new("m", "alice", at(9) + Duration::hours(1)).with_parents(2);
        let source = MemorySource::new().with_merge("feature/c", merge.clone());
        let found = source.merge_commit(&BranchRecord::new("feature/c")).unwrap();
        assert_eq!(found, Some(merge));
        assert_eq!(source.merge_commit(&BranchRecord::new("other")).unwrap(), None);
    }
}
