//! Recency-weighted knowledge per contributor and file.
//!
//! Shared by the bus factor and knowledge distribution analyzers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::heuristics::FileScorer;
use crate::source::CommitRecord;

/// contributor → file path → knowledge weight, in first-seen order.
pub type KnowledgeWeights = IndexMap<String, IndexMap<String, f64>>;

/// Accumulate knowledge weights over `commits`.
///
/// Each changed file adds
/// `exp(−whole_days_before(as_of) / decay_half_life) × extension_weight × name_criticality`
/// to the commit author's entry for that file.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, TimeZone, Utc};
/// use repopulse_metrics::heuristics::HeuristicScorer;
/// use repopulse_metrics::knowledge::accumulate;
/// use repopulse_metrics::source::{CommitRecord, FileChange};
///
/// let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
/// let commits = vec![
///     CommitRecord::new("a", "alice", now).with_file(FileChange::new("util.py", 1, 0)),
///     CommitRecord::new("b", "alice", now - Duration::days(90)).with_file(FileChange::new("util.py", 1, 0)),
/// ];
/// let weights = accumulate(&commits, now, 90.0, &HeuristicScorer);
/// let w = weights["alice"]["util.py"];
/// assert!((w - (1.0 + (-1.0f64).exp())).abs() < 1e-9);
/// ```
pub fn accumulate(
    commits: &[CommitRecord],
    as_of: DateTime<Utc>,
    decay_half_life: f64,
    scorer: &dyn FileScorer,
) -> KnowledgeWeights {
    let mut weights = KnowledgeWeights::new();
    for commit in commits {
        let days_ago = (as_of - commit.timestamp).num_days() as f64;
        let recency = (-days_ago / decay_half_life).exp();
        let files = weights.entry(commit.author.clone()).or_default();
        for change in &commit.files {
            let weight =
                recency * scorer.extension_weight(&change.path) * scorer.name_criticality(&change.path);
            *files.entry(change.path.clone()).or_insert(0.0) += weight;
        }
    }
    weights.retain(|_, files| !files.is_empty());
    weights
}

/// Total knowledge per contributor, in map order.
pub fn contributor_totals(weights: &KnowledgeWeights) -> Vec<(&str, f64)> {
    weights
        .iter()
        .map(|(author, files)| (author.as_str(), files.values().sum()))
        .collect()
}

/// Sum of every weight in the map.
pub fn total_knowledge(weights: &KnowledgeWeights) -> f64 {
    weights.values().flat_map(|files| files.values()).sum()
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::heuristics::HeuristicScorer;
    use crate::source::FileChange;

    fn make_commit(author: &str, days_ago: i64, files: &[&str]) -> CommitRecord {
        let as_of = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        files.iter().fold(
            CommitRecord::new("x", author, as_of - Duration::days(days_ago)),
            |commit, path| commit.with_file(FileChange::new(*path, 1, 1)),
        )
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn weights_scale_by_file_heuristics() {
        let commits = vec![make_commit("alice", 0, &["src/main.c", "notes.txt"])];
        let weights = accumulate(&commits, as_of(), 90.0, &HeuristicScorer);
        // main.c: extension 1.3, core name 1.5
        assert!((weights["alice"]["src/main.c"] - 1.95).abs() < 1e-9);
        assert!((weights["alice"]["notes.txt"] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn partial_days_are_truncated() {
        let mut commit = make_commit("bob", 0, &["lib.py"]);
        commit.timestamp = as_of() - Duration::hours(47);
        let weights = accumulate(&[commit], as_of(), 1.0, &HeuristicScorer);
        // 47 hours is one whole day
        assert!((weights["bob"]["lib.py"] - (-1.0f64).exp()).abs() < 1e-9);
    }

    #[test]
    fn contributors_keep_first_seen_order() {
        let commits = vec![
            make_commit("carol", 1, &["a.py"]),
            make_commit("alice", 2, &["b.py"]),
            make_commit("carol", 3, &["b.py"]),
        ];
        let weights = accumulate(&commits, as_of(), 90.0, &HeuristicScorer);
        let authors: Vec<&str> = weights.keys().map(String::as_str).collect();
        assert_eq!(authors, vec!["carol", "alice"]);
        assert_eq!(weights["carol"].len(), 2);
    }

    #[test]
    fn commits_without_files_add_no_contributor() {
        let commits = vec![make_commit("dave", 1, &[])];
        assert!(accumulate(&commits, as_of(), 90.0, &HeuristicScorer).is_empty());
    }

    #[test]
    fn totals() {
        let mut weights = KnowledgeWeights::new();
        weights.entry("a".into()).or_default().insert("f1".into(), 2.0);
        weights.entry("a".into()).or_default().insert("f2".into(), 1.0);
        weights.entry("b".into()).or_default().insert("f1".into(), 4.0);
        assert_eq!(contributor_totals(&weights), vec![("a", 3.0), ("b", 4.0)]);
        assert_eq!(total_knowledge(&weights), 7.0);
    }
}
