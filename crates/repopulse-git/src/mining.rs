//! Git history extraction via git2.
//!
//! Walks commit history of a local repository and turns each commit into a
//! [`CommitRecord`] with per-file line counts.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use git2::{BranchType, Commit, DiffFindOptions, DiffOptions, ErrorCode, Oid, Repository, Sort};
use repopulse_core::PulseError;
use repopulse_metrics::branches::MAIN_BRANCHES;
use repopulse_metrics::source::{BranchRecord, CommitQuery, CommitRecord, FileChange, RepositorySource};

/// A [`RepositorySource`] backed by a git repository on disk.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use repopulse_git::GitSource;
/// use repopulse_metrics::source::RepositorySource;
///
/// let source = GitSource::open(Path::new(".")).unwrap();
/// for commit in source.all_commits(None).unwrap().iter().take(5) {
///     println!("{} {}", &commit.id[..8], commit.author);
/// }
/// ```
pub struct GitSource {
    repo: Repository,
    max_files_per_commit: Option<usize>,
}

impl GitSource {
    /// Open the repository containing `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Git`] if no repository is found.
    pub fn open(path: &Path) -> Result<Self, PulseError> {
        let repo = Repository::discover(path)
            .map_err(|e| PulseError::Git(format!("failed to open repository: {e}")))?;
        Ok(Self::from_repository(repo))
    }

    /// Wrap an already opened repository.
    pub fn from_repository(repo: Repository) -> Self {
        Self {
            repo,
            max_files_per_commit: None,
        }
    }

    /// Skip commits touching more files than `limit` (large refactors,
    /// vendored imports).
    #[must_use]
    pub fn with_max_files_per_commit(mut self, limit: Option<usize>) -> Self {
        self.max_files_per_commit = limit;
        self
    }

    fn tip(&self, branch: &str) -> Result<Oid, PulseError> {
        let reference = self
            .repo
            .resolve_reference_from_short_name(branch)
            .map_err(|e| PulseError::Git(format!("failed to resolve branch '{branch}': {e}")))?;
        reference
            .peel_to_commit()
            .map(|c| c.id())
            .map_err(|e| PulseError::Git(format!("branch '{branch}' has no commit: {e}")))
    }

    /// Walk history newest first, keeping commits inside `query`.
    fn walk(&self, query: &CommitQuery) -> Result<Vec<CommitRecord>, PulseError> {
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| PulseError::Git(format!("failed to create revwalk: {e}")))?;
        revwalk.set_sorting(Sort::TIME).ok();

        match &query.branch {
            Some(branch) => revwalk
                .push(self.tip(branch)?)
                .map_err(|e| PulseError::Git(format!("failed to push oid: {e}")))?,
            None => revwalk
                .push_head()
                .map_err(|e| PulseError::Git(format!("failed to push HEAD: {e}")))?,
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid.map_err(|e| PulseError::Git(format!("revwalk error: {e}")))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| PulseError::Git(format!("failed to find commit: {e}")))?;

            let timestamp = commit_time(&commit)?;
            if query.since.is_some_and(|since| timestamp < since) {
                break;
            }
            if !query.contains(timestamp) {
                continue;
            }

            let files = extract_file_changes(&self.repo, &commit)?;
            if self.max_files_per_commit.is_some_and(|max| files.len() > max) {
                tracing::trace!(commit = %oid, files = files.len(), "skipping oversized commit");
                continue;
            }

            commits.push(to_record(&commit, timestamp, files));
            if query.limit.is_some_and(|limit| commits.len() >= limit) {
                break;
            }
        }
        tracing::debug!(branch = ?query.branch, commits = commits.len(), "history walked");
        Ok(commits)
    }

    /// Oldest commit on the first-parent line of `main` that merges `tip`.
    fn find_merge(&self, main: &str, tip: Oid) -> Result<Option<CommitRecord>, PulseError> {
        let main_tip = self.tip(main)?;
        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| PulseError::Git(format!("failed to create revwalk: {e}")))?;
        revwalk
            .push(main_tip)
            .map_err(|e| PulseError::Git(format!("failed to push oid: {e}")))?;
        revwalk
            .simplify_first_parent()
            .map_err(|e| PulseError::Git(format!("failed to simplify revwalk: {e}")))?;

        let mut found = None;
        for oid in revwalk {
            let oid = oid.map_err(|e| PulseError::Git(format!("revwalk error: {e}")))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| PulseError::Git(format!("failed to find commit: {e}")))?;
            if commit.parent_count() < 2 {
                continue;
            }
            let reaches_tip =
                |oid: Oid| oid == tip || self.repo.graph_descendant_of(oid, tip).unwrap_or(false);
            // the tip must arrive through a side parent, not be on main already
            let merges_tip = !commit.parent_id(0).is_ok_and(reaches_tip)
                && commit.parent_ids().skip(1).any(reaches_tip);
            if merges_tip {
                // walk is newest first; keep going to find the oldest
                found = Some(commit.id());
            }
        }

        let Some(oid) = found else {
            return Ok(None);
        };
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|e| PulseError::Git(format!("failed to find commit: {e}")))?;
        let timestamp = commit_time(&commit)?;
        let files = extract_file_changes(&self.repo, &commit)?;
        Ok(Some(to_record(&commit, timestamp, files)))
    }
}

impl RepositorySource for GitSource {
    fn all_commits(&self, branch: Option<&str>) -> Result<Vec<CommitRecord>, PulseError> {
        let query = match branch {
            Some(name) => CommitQuery::new().branch(name),
            None => CommitQuery::new(),
        };
        self.walk(&query)
    }

    fn commits(&self, query: &CommitQuery) -> Result<Vec<CommitRecord>, PulseError> {
        self.walk(query)
    }

    fn branches(&self) -> Result<Vec<BranchRecord>, PulseError> {
        let branches = self
            .repo
            .branches(Some(BranchType::Local))
            .map_err(|e| PulseError::Git(format!("failed to list branches: {e}")))?;

        let mut records = Vec::new();
        for branch in branches {
            let (branch, _) = branch.map_err(|e| PulseError::Git(format!("failed to read branch: {e}")))?;
            match branch.name() {
                Ok(Some(name)) => records.push(BranchRecord::new(name)),
                _ => tracing::warn!("skipping branch with a non UTF-8 name"),
            }
        }
        Ok(records)
    }

    fn merge_commit(&self, branch: &BranchRecord) -> Result<Option<CommitRecord>, PulseError> {
        let tip = self.tip(&branch.name)?;
        for main in MAIN_BRANCHES {
            if *main == branch.name {
                continue;
            }
            match self.repo.find_branch(main, BranchType::Local) {
                Ok(_) => {}
                Err(e) if e.code() == ErrorCode::NotFound => continue,
                Err(e) => return Err(PulseError::Git(format!("failed to find branch '{main}': {e}"))),
            }
            if let Some(merge) = self.find_merge(main, tip)? {
                tracing::debug!(branch = %branch.name, into = main, merge = %merge.id, "merge detected");
                return Ok(Some(merge));
            }
        }
        Ok(None)
    }

    fn file_content(&self, path: &str) -> Result<Option<String>, PulseError> {
        let tree = match self.repo.head().and_then(|head| head.peel_to_tree()) {
            Ok(tree) => tree,
            Err(e) if e.code() == ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(PulseError::Git(format!("failed to read HEAD tree: {e}"))),
        };
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(PulseError::Git(format!("failed to look up '{path}': {e}"))),
        };
        let Ok(blob) = self.repo.find_blob(entry.id()) else {
            // directories and submodules have no text
            return Ok(None);
        };
        if blob.is_binary() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(blob.content()).into_owned()))
    }
}

fn commit_time(commit: &Commit<'_>) -> Result<DateTime<Utc>, PulseError> {
    let seconds = commit.time().seconds();
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| PulseError::Git(format!("commit {} has an invalid time {seconds}", commit.id())))
}

fn to_record(commit: &Commit<'_>, timestamp: DateTime<Utc>, files: Vec<FileChange>) -> CommitRecord {
    let author = commit.author();
    let mut record = CommitRecord::new(
        commit.id().to_string(),
        author.name().unwrap_or("unknown"),
        timestamp,
    )
    .with_parents(commit.parent_count());
    record.files = files;
    record
}

/// Files changed by `commit` against its first parent, in diff order.
fn extract_file_changes(repo: &Repository, commit: &Commit<'_>) -> Result<Vec<FileChange>, PulseError> {
    let commit_tree = commit
        .tree()
        .map_err(|e| PulseError::Git(format!("failed to get commit tree: {e}")))?;

    let parent_tree = if commit.parent_count() > 0 {
        let parent = commit
            .parent(0)
            .map_err(|e| PulseError::Git(format!("failed to get parent: {e}")))?;
        Some(
            parent
                .tree()
                .map_err(|e| PulseError::Git(format!("failed to get parent tree: {e}")))?,
        )
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    let mut diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&commit_tree), Some(&mut diff_opts))
        .map_err(|e| PulseError::Git(format!("failed to compute diff: {e}")))?;

    let mut find_opts = DiffFindOptions::new();
    find_opts.renames(true);
    diff.find_similar(Some(&mut find_opts))
        .map_err(|e| PulseError::Git(format!("failed to find renames: {e}")))?;

    let paths: Vec<String> = diff
        .deltas()
        .filter_map(|delta| {
            delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned())
        })
        .filter(|p| !p.is_empty())
        .collect();

    let mut line_counts: HashMap<String, (u64, u64)> = HashMap::new();
    diff.foreach(
        &mut |_delta, _progress| true,
        None,
        None,
        Some(&mut |delta, _hunk, line| {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default();
            let entry = line_counts.entry(path).or_insert((0, 0));
            match line.origin() {
                '+' => entry.0 += 1,
                '-' => entry.1 += 1,
                _ => {}
            }
            true
        }),
    )
    .map_err(|e| PulseError::Git(format!("failed to iterate diff lines: {e}")))?;

    Ok(paths
        .into_iter()
        .map(|path| {
            let (insertions, deletions) = line_counts.get(&path).copied().unwrap_or((0, 0));
            FileChange::new(path, insertions, deletions)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use git2::{RepositoryInitOptions, Signature, Time};
    use tempfile::TempDir;

    use super::*;

    const T0: i64 = 1_714_550_400; // 2024-05-01T08:00:00Z

    struct Fixture {
        _dir: TempDir,
        repo: Repository,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let mut opts = RepositoryInitOptions::new();
            opts.initial_head("main");
            let repo = Repository::init_opts(dir.path(), &opts).unwrap();
            Self { _dir: dir, repo }
        }

        /// Commit `files` on top of `parents[0]`'s tree and move `branch`.
        fn commit(&self, branch: &str, parents: &[Oid], files: &[(&str, &str)], author: &str, at: i64) -> Oid {
            let parents: Vec<Commit<'_>> = parents.iter().map(|p| self.repo.find_commit(*p).unwrap()).collect();
            let base = parents.first().map(|c| c.tree().unwrap());
            let mut builder = self.repo.treebuilder(base.as_ref()).unwrap();
            for (path, content) in files {
                let blob = self.repo.blob(content.as_bytes()).unwrap();
                builder.insert(*path, blob, 0o100_644).unwrap();
            }
            let tree = self.repo.find_tree(builder.write().unwrap()).unwrap();
            let signature = Signature::new(author, &format!("{author}@example.com"), &Time::new(at, 0)).unwrap();
            let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
            let reference = format!("refs/heads/{branch}");
            self.repo
                .commit(
                    Some(reference.as_str()),
                    &signature,
                    &signature,
                    "change",
                    &tree,
                    &parent_refs,
                )
                .unwrap()
        }

        fn source(self) -> (GitSource, TempDir) {
            (GitSource::from_repository(self.repo), self._dir)
        }
    }

    fn hours(n: i64) -> i64 {
        T0 + n * 3600
    }

    #[test]
    fn commits_carry_line_counts_newest_first() {
        let fx = Fixture::new();
        let c1 = fx.commit("main", &[], &[("a.rs", "one\ntwo\n")], "alice", hours(0));
        fx.commit("main", &[c1], &[("a.rs", "one\nthree\n"), ("b.rs", "x\n")], "bob", hours(1));
        let (source, _dir) = fx.source();

        let commits = source.all_commits(None).unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].author, "bob");
        assert_eq!(commits[0].timestamp, Utc.timestamp_opt(hours(1), 0).unwrap());

        let a = commits[0].files.iter().find(|f| f.path == "a.rs").unwrap();
        assert_eq!((a.insertions, a.deletions), (1, 1));
        let b = commits[0].files.iter().find(|f| f.path == "b.rs").unwrap();
        assert_eq!((b.insertions, b.deletions), (1, 0));
        assert_eq!(commits[1].files[0].insertions, 2);
    }

    #[test]
    fn query_window_and_limit() {
        let fx = Fixture::new();
        let mut parent = fx.commit("main", &[], &[("a.rs", "0\n")], "alice", hours(0));
        for n in 1..5 {
            let content = format!("{n}\n");
            parent = fx.commit("main", &[parent], &[("a.rs", content.as_str())], "alice", hours(n));
        }
        let (source, _dir) = fx.source();
        let at = |n| Utc.timestamp_opt(hours(n), 0).unwrap();

        let window = source.commits(&CommitQuery::new().since(at(1)).until(at(4))).unwrap();
        let times: Vec<_> = window.iter().map(|c| c.timestamp).collect();
        assert_eq!(times, vec![at(3), at(2), at(1)]);

        let limited = source.commits(&CommitQuery::new().limit(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].timestamp, at(4));
    }

    #[test]
    fn oversized_commits_are_skipped() {
        let fx = Fixture::new();
        let c1 = fx.commit("main", &[], &[("a.rs", "a\n")], "alice", hours(0));
        fx.commit(
            "main",
            &[c1],
            &[("b.rs", "b\n"), ("c.rs", "c\n"), ("d.rs", "d\n")],
            "alice",
            hours(1),
        );
        let (source, _dir) = fx.source();
        let source = source.with_max_files_per_commit(Some(2));

        let commits = source.all_commits(None).unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].files[0].path, "a.rs");
    }

    #[test]
    fn branches_and_merge_detection() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a.rs", "a\n")], "alice", hours(0));
        let f1 = fx.commit("feature/login", &[base], &[("login.rs", "fn login() {}\n")], "bob", hours(2));
        let f2 = fx.commit("feature/login", &[f1], &[("login.rs", "fn login() { todo() }\n")], "bob", hours(5));
        let m1 = fx.commit("main", &[base], &[("a.rs", "a\nb\n")], "alice", hours(6));
        let merge = fx.commit("main", &[m1, f2], &[("login.rs", "fn login() { todo() }\n")], "alice", hours(8));
        fx.commit("feature/idle", &[base], &[("idle.rs", "\n")], "carol", hours(3));
        let (source, _dir) = fx.source();

        let mut names: Vec<String> = source.branches().unwrap().into_iter().map(|b| b.name).collect();
        names.sort();
        assert_eq!(names, vec!["feature/idle", "feature/login", "main"]);

        let login = BranchRecord::new("feature/login");
        let history = login.history(&source).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.last().unwrap().id, f2.to_string());

        let found = source.merge_commit(&login).unwrap().expect("merge should be detected");
        assert_eq!(found.id, merge.to_string());
        assert!(found.is_merge());

        assert!(source.merge_commit(&BranchRecord::new("feature/idle")).unwrap().is_none());
        assert!(source.merge_commit(&BranchRecord::new("main")).unwrap().is_none());
    }

    #[test]
    fn branches_already_on_main_are_not_merged_by_later_merges() {
        let fx = Fixture::new();
        let base = fx.commit("main", &[], &[("a.rs", "a\n")], "alice", hours(0));
        let a1 = fx.commit("feature/fast", &[base], &[("fast.rs", "fast\n")], "bob", hours(1));
        fx.repo.reference("refs/heads/main", a1, true, "fast-forward").unwrap();
        {
            let base_commit = fx.repo.find_commit(base).unwrap();
            fx.repo.branch("feature/empty", &base_commit, false).unwrap();
        }

        let b1 = fx.commit("feature/search", &[a1], &[("search.rs", "search\n")], "carol", hours(2));
        let m1 = fx.commit("main", &[a1], &[("a.rs", "a\nb\n")], "alice", hours(3));
        let merge = fx.commit("main", &[m1, b1], &[("search.rs", "search\n")], "alice", hours(4));
        let (source, _dir) = fx.source();

        assert!(source.merge_commit(&BranchRecord::new("feature/fast")).unwrap().is_none());
        assert!(source.merge_commit(&BranchRecord::new("feature/empty")).unwrap().is_none());
        let found = source
            .merge_commit(&BranchRecord::new("feature/search"))
            .unwrap()
            .expect("merge should be detected");
        assert_eq!(found.id, merge.to_string());
    }

    #[test]
    fn file_content_reads_head() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("lib.rs", "pub fn answer() -> u32 { 42 }\n")], "alice", hours(0));
        let (source, _dir) = fx.source();

        assert_eq!(
            source.file_content("lib.rs").unwrap().as_deref(),
            Some("pub fn answer() -> u32 { 42 }\n")
        );
        assert!(source.file_content("missing.rs").unwrap().is_none());
    }

    #[test]
    fn unknown_branch_is_a_git_error() {
        let fx = Fixture::new();
        fx.commit("main", &[], &[("a.rs", "a\n")], "alice", hours(0));
        let (source, _dir) = fx.source();

        let err = source.all_commits(Some("nope")).unwrap_err();
        assert!(matches!(err, PulseError::Git(_)));
        assert!(err.to_string().contains("nope"));
    }
}
