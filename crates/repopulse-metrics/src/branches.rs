//! Branch name filtering.

/// Long-lived integration branches, never treated as units of work.
pub const MAIN_BRANCHES: &[&str] = &["main", "master", "develop"];

/// Whether `name` is one of [`MAIN_BRANCHES`].
pub fn is_main_branch(name: &str) -> bool {
    MAIN_BRANCHES.contains(&name)
}

/// Branch name patterns.
///
/// A pattern ending in `*` matches by prefix; any other pattern must match
/// the whole name.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::branches::BranchPatterns;
///
/// let patterns = BranchPatterns::default();
/// assert!(patterns.matches("feature/login"));
/// assert!(patterns.matches("hotfix/"));
/// assert!(!patterns.matches("release/1.0"));
///
/// let exact = BranchPatterns::new(vec!["staging".into()]);
/// assert!(exact.matches("staging"));
/// assert!(!exact.matches("staging-2"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPatterns(Vec<String>);

impl BranchPatterns {
    /// Wrap a list of patterns.
    pub fn new(patterns: Vec<String>) -> Self {
        Self(patterns)
    }

    /// Whether any pattern matches `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.0.iter().any(|pattern| match pattern.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => name == pattern,
        })
    }

    /// The raw patterns.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl Default for BranchPatterns {
    fn default() -> Self {
        Self(vec![
            "feature/*".to_string(),
            "bugfix/*".to_string(),
            "hotfix/*".to_string(),
        ])
    }
}
