use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PulseError;

/// A single analyzer parameter value.
///
/// Deserializes untagged, so a TOML table such as
/// `lookback_months = 6` or `branch_patterns = ["feature/*"]` maps directly
/// onto the matching variant. Quoted RFC 3339 strings become [`ParamValue::Time`].
///
/// # Examples
///
/// ```
/// use repopulse_core::ParamValue;
///
/// assert_eq!(ParamValue::parse("6"), ParamValue::Int(6));
/// assert_eq!(ParamValue::parse("0.8"), ParamValue::Float(0.8));
/// assert_eq!(
///     ParamValue::parse("feature/*,bugfix/*"),
///     ParamValue::List(vec!["feature/*".into(), "bugfix/*".into()])
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// `true` / `false`.
    Bool(bool),
    /// Whole number.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Point in time, rendered as RFC 3339.
    Time(DateTime<Utc>),
    /// Free text.
    Text(String),
    /// List of strings, e.g. branch patterns.
    List(Vec<String>),
}

impl ParamValue {
    /// Infer a value from its command-line spelling.
    ///
    /// Tries, in order: boolean, integer, float, RFC 3339 time, comma list, text.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw {
            "true" => return ParamValue::Bool(true),
            "false" => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(int) = raw.parse::<i64>() {
            return ParamValue::Int(int);
        }
        if let Ok(float) = raw.parse::<f64>() {
            return ParamValue::Float(float);
        }
        if let Ok(time) = DateTime::parse_from_rfc3339(raw) {
            return ParamValue::Time(time.with_timezone(&Utc));
        }
        if raw.contains(',') {
            return ParamValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        ParamValue::Text(raw.to_string())
    }

    fn kind(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "boolean",
            ParamValue::Int(_) => "integer",
            ParamValue::Float(_) => "number",
            ParamValue::Time(_) => "time",
            ParamValue::Text(_) => "text",
            ParamValue::List(_) => "list",
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
            ParamValue::Text(s) => write!(f, "{s}"),
            ParamValue::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(value: DateTime<Utc>) -> Self {
        ParamValue::Time(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(value: Vec<String>) -> Self {
        ParamValue::List(value)
    }
}

impl From<Vec<&str>> for ParamValue {
    fn from(value: Vec<&str>) -> Self {
        ParamValue::List(value.into_iter().map(String::from).collect())
    }
}

/// Keyword parameters for one `calculate` call.
///
/// Keys are kept sorted, which makes [`MetricParams::cache_key`] deterministic.
///
/// # Examples
///
/// ```
/// use repopulse_core::MetricParams;
///
/// let params = MetricParams::new()
///     .with("lookback_months", 3u32)
///     .with("knowledge_threshold", 0.5);
/// assert_eq!(
///     params.cache_key("Bus Factor"),
///     "Bus Factor|knowledge_threshold:0.5|lookback_months:3"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricParams(BTreeMap<String, ParamValue>);

impl MetricParams {
    /// Create an empty parameter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or replace a parameter.
    pub fn insert(&mut self, key: &str, value: impl Into<ParamValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    /// Look up a parameter.
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    /// Returns `true` when a parameter is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when no parameter is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate parameters in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overlay `other` on top of `self`; keys in `other` win.
    pub fn merge(&mut self, other: &MetricParams) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// The parameters whose key is in `keys`.
    #[must_use]
    pub fn only(&self, keys: &[&str]) -> MetricParams {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Parse a `key=value` assignment as given on the command line.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::Config`] when there is no `=` or the key is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use repopulse_core::{MetricParams, ParamValue};
    ///
    /// let mut params = MetricParams::new();
    /// params.set_assignment("weeks_lookback=8").unwrap();
    /// assert_eq!(params.get("weeks_lookback"), Some(&ParamValue::Int(8)));
    /// assert!(params.set_assignment("weeks_lookback").is_err());
    /// ```
    pub fn set_assignment(&mut self, assignment: &str) -> Result<(), PulseError> {
        let (key, value) = assignment.split_once('=').ok_or_else(|| {
            PulseError::Config(format!("expected key=value, got '{assignment}'"))
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(PulseError::Config(format!(
                "missing parameter name in '{assignment}'"
            )));
        }
        self.0.insert(key.to_string(), ParamValue::parse(value));
        Ok(())
    }

    /// Deterministic cache key: the metric name followed by `key:value`
    /// pairs sorted by key, joined with `|`. Times render as RFC 3339.
    pub fn cache_key(&self, metric_name: &str) -> String {
        let mut parts = Vec::with_capacity(self.0.len() + 1);
        parts.push(metric_name.to_string());
        for (key, value) in &self.0 {
            parts.push(format!("{key}:{value}"));
        }
        parts.join("|")
    }

    /// Start reading typed values on behalf of the analyzer `metric`.
    pub fn reader<'a>(&'a self, metric: &'a str) -> ParamReader<'a> {
        ParamReader {
            params: self,
            metric,
            accepted: Vec::new(),
        }
    }
}

/// Typed, validating access to [`MetricParams`].
///
/// Every accessor registers its key as accepted; [`ParamReader::finish`]
/// then rejects any key the analyzer never asked for.
///
/// # Examples
///
/// ```
/// use repopulse_core::MetricParams;
///
/// let params = MetricParams::new().with("weeks_lookback", 8u32).with("colour", "blue");
/// let mut reader = params.reader("velocity_trend");
/// assert_eq!(reader.u32("weeks_lookback").unwrap(), Some(8));
/// assert!(reader.finish().is_err());
/// ```
pub struct ParamReader<'a> {
    params: &'a MetricParams,
    metric: &'a str,
    accepted: Vec<&'static str>,
}

impl<'a> ParamReader<'a> {
    /// Read a non-negative whole number.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for other types or negative values.
    pub fn u32(&mut self, key: &'static str) -> Result<Option<u32>, PulseError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(ParamValue::Int(i)) => u32::try_from(*i).map(Some).map_err(|_| {
                PulseError::invalid_parameter(self.metric, format!("{key} must be a non-negative integer, got {i}"))
            }),
            Some(other) => Err(self.type_error(key, "an integer", other)),
        }
    }

    /// Read a number; integers are widened.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for non-numeric values.
    pub fn f64(&mut self, key: &'static str) -> Result<Option<f64>, PulseError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(ParamValue::Float(x)) => Ok(Some(*x)),
            Some(ParamValue::Int(i)) => Ok(Some(*i as f64)),
            Some(other) => Err(self.type_error(key, "a number", other)),
        }
    }

    /// Read a boolean.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for non-boolean values.
    pub fn bool(&mut self, key: &'static str) -> Result<Option<bool>, PulseError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(ParamValue::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.type_error(key, "a boolean", other)),
        }
    }

    /// Read a list of strings; a single text value becomes a one-item list.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] for non-text values.
    pub fn list(&mut self, key: &'static str) -> Result<Option<Vec<String>>, PulseError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(ParamValue::List(items)) => Ok(Some(items.clone())),
            Some(ParamValue::Text(s)) => Ok(Some(vec![s.clone()])),
            Some(other) => Err(self.type_error(key, "a list", other)),
        }
    }

    /// Read a point in time; RFC 3339 text is parsed.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] when the value is not a time.
    pub fn time(&mut self, key: &'static str) -> Result<Option<DateTime<Utc>>, PulseError> {
        match self.lookup(key) {
            None => Ok(None),
            Some(ParamValue::Time(t)) => Ok(Some(*t)),
            Some(ParamValue::Text(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Some(t.with_timezone(&Utc)))
                .map_err(|e| {
                    PulseError::invalid_parameter(self.metric, format!("{key} is not an RFC 3339 time: {e}"))
                }),
            Some(other) => Err(self.type_error(key, "a time", other)),
        }
    }

    /// Reject every parameter the analyzer did not ask for.
    ///
    /// # Errors
    ///
    /// Returns [`PulseError::InvalidParameter`] naming the first unrecognized
    /// key and listing the accepted ones.
    pub fn finish(self) -> Result<(), PulseError> {
        if let Some((key, _)) = self
            .params
            .iter()
            .find(|(key, _)| !self.accepted.contains(key))
        {
            return Err(PulseError::invalid_parameter(
                self.metric,
                format!(
                    "unrecognized parameter '{key}' (accepted: {})",
                    self.accepted.join(", ")
                ),
            ));
        }
        Ok(())
    }

    fn lookup(&mut self, key: &'static str) -> Option<&'a ParamValue> {
        if !self.accepted.contains(&key) {
            self.accepted.push(key);
        }
        self.params.get(key)
    }

    fn type_error(&self, key: &str, expected: &str, got: &ParamValue) -> PulseError {
        PulseError::invalid_parameter(
            self.metric,
            format!("{key} must be {expected}, got {} '{got}'", got.kind()),
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn parse_infers_types() {
        assert_eq!(ParamValue::parse("true"), ParamValue::Bool(true));
        assert_eq!(ParamValue::parse("-3"), ParamValue::Int(-3));
        assert_eq!(ParamValue::parse("0.25"), ParamValue::Float(0.25));
        assert_eq!(
            ParamValue::parse("2024-03-01T00:00:00Z"),
            ParamValue::Time(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(ParamValue::parse("feature/*"), ParamValue::Text("feature/*".into()));
    }

    #[test]
    fn cache_key_sorts_and_renders_times_iso() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let params = MetricParams::new()
            .with("weeks_lookback", 4u32)
            .with("as_of", at);
        assert_eq!(
            params.cache_key("Development Velocity Trend"),
            "Development Velocity Trend|as_of:2024-01-02T03:04:05+00:00|weeks_lookback:4"
        );
    }

    #[test]
    fn only_keeps_listed_keys() {
        let params = MetricParams::new()
            .with("weeks_lookback", 4u32)
            .with("lookback_months", 3u32);
        let kept = params.only(&["lookback_months", "as_of"]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept.get("lookback_months"), Some(&ParamValue::Int(3)));
    }

    #[test]
    fn empty_params_key_is_metric_name() {
        assert_eq!(MetricParams::new().cache_key("Bus Factor"), "Bus Factor");
    }

    #[test]
    fn reader_widens_integers_to_floats() {
        let params = MetricParams::new().with("knowledge_threshold", 1i64);
        let mut reader = params.reader("bus_factor");
        assert_eq!(reader.f64("knowledge_threshold").unwrap(), Some(1.0));
        reader.finish().unwrap();
    }

    #[test]
    fn reader_rejects_wrong_type() {
        let params = MetricParams::new().with("lookback_months", "six");
        let mut reader = params.reader("bus_factor");
        let err = reader.u32("lookback_months").unwrap_err();
        assert!(err.to_string().contains("lookback_months must be an integer"));
    }

    #[test]
    fn reader_rejects_negative_counts() {
        let params = MetricParams::new().with("weeks_lookback", -2i64);
        let mut reader = params.reader("velocity_trend");
        assert!(reader.u32("weeks_lookback").is_err());
    }

    #[test]
    fn finish_lists_accepted_keys() {
        let params = MetricParams::new().with("bogus", true);
        let mut reader = params.reader("cycle_time");
        reader.list("branch_patterns").unwrap();
        reader.u32("lookback_months").unwrap();
        let err = reader.finish().unwrap_err().to_string();
        assert!(err.contains("'bogus'"));
        assert!(err.contains("branch_patterns, lookback_months"));
    }

    #[test]
    fn text_becomes_single_item_list() {
        let params = MetricParams::new().with("branch_patterns", "release/*");
        let mut reader = params.reader("flow_efficiency");
        assert_eq!(
            reader.list("branch_patterns").unwrap(),
            Some(vec!["release/*".to_string()])
        );
    }

    #[test]
    fn merge_overrides_existing_keys() {
        let mut base = MetricParams::new().with("lookback_months", 6u32).with("as_of", "x");
        base.merge(&MetricParams::new().with("lookback_months", 2u32));
        assert_eq!(base.get("lookback_months"), Some(&ParamValue::Int(2)));
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn deserializes_from_toml_table() {
        let params: MetricParams = toml::from_str(
            r#"
lookback_months = 3
knowledge_threshold = 0.75
include_active_branches = true
branch_patterns = ["feature/*", "fix/*"]
as_of = "2024-06-01T00:00:00Z"
"#,
        )
        .unwrap();
        assert_eq!(params.get("lookback_months"), Some(&ParamValue::Int(3)));
        assert_eq!(params.get("knowledge_threshold"), Some(&ParamValue::Float(0.75)));
        assert_eq!(params.get("include_active_branches"), Some(&ParamValue::Bool(true)));
        assert_eq!(
            params.get("branch_patterns"),
            Some(&ParamValue::List(vec!["feature/*".into(), "fix/*".into()]))
        );
        assert!(matches!(params.get("as_of"), Some(ParamValue::Time(_))));
    }
}
