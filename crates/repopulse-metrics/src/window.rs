//! Lookback windows anchored at an explicit `as_of` time, and option checks.

use chrono::{DateTime, TimeDelta, Utc};
use repopulse_core::PulseError;

use crate::source::{CommitQuery, CommitRecord, RepositorySource};

/// Days per lookback month.
pub const DAYS_PER_MONTH: i64 = 30;

/// Largest accepted `lookback_months` (100 years).
pub const MAX_LOOKBACK_MONTHS: u32 = 1_200;

/// Largest accepted `weeks_lookback` (about 100 years).
pub const MAX_WEEKS_LOOKBACK: u32 = 5_200;

/// Start of a `months`-long window ending at `as_of`.
///
/// # Errors
///
/// Returns [`PulseError::InvalidParameter`] for `metric` when the start
/// falls outside the representable time range.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use repopulse_metrics::window::lookback_start;
///
/// let as_of = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
/// let since = lookback_start("bus_factor", as_of, 2).unwrap();
/// assert_eq!(since, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
/// ```
pub fn lookback_start(metric: &str, as_of: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>, PulseError> {
    TimeDelta::try_days(DAYS_PER_MONTH * i64::from(months))
        .and_then(|span| as_of.checked_sub_signed(span))
        .ok_or_else(|| {
            PulseError::invalid_parameter(
                metric,
                format!("lookback_months={months} reaches before the earliest supported time"),
            )
        })
}

/// Start of a `weeks`-long window ending at `as_of`.
///
/// # Errors
///
/// Returns [`PulseError::InvalidParameter`] for `metric` when the start
/// falls outside the representable time range.
pub fn weeks_start(metric: &str, as_of: DateTime<Utc>, weeks: u32) -> Result<DateTime<Utc>, PulseError> {
    TimeDelta::try_weeks(i64::from(weeks))
        .and_then(|span| as_of.checked_sub_signed(span))
        .ok_or_else(|| {
            PulseError::invalid_parameter(
                metric,
                format!("weeks_lookback={weeks} reaches before the earliest supported time"),
            )
        })
}

/// Default-branch commits with `since <= timestamp <= as_of`, newest first.
///
/// # Errors
///
/// Propagates the source's error.
pub fn commits_in_window(
    source: &dyn RepositorySource,
    since: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> Result<Vec<CommitRecord>, PulseError> {
    let commits: Vec<CommitRecord> = source
        .commits(&CommitQuery::new().since(since))?
        .into_iter()
        .filter(|c| c.timestamp <= as_of)
        .collect();
    tracing::debug!(
        since = %since.to_rfc3339(),
        as_of = %as_of.to_rfc3339(),
        commits = commits.len(),
        "loaded commit window"
    );
    Ok(commits)
}

pub(crate) fn ensure_fraction(metric: &str, key: &str, value: f64) -> Result<(), PulseError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(PulseError::invalid_parameter(
            metric,
            format!("{key} must be between 0 and 1, got {value}"),
        ))
    }
}

pub(crate) fn ensure_positive(metric: &str, key: &str, value: f64) -> Result<(), PulseError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(PulseError::invalid_parameter(
            metric,
            format!("{key} must be greater than 0, got {value}"),
        ))
    }
}

pub(crate) fn ensure_nonzero(metric: &str, key: &str, value: u32) -> Result<(), PulseError> {
    if value > 0 {
        Ok(())
    } else {
        Err(PulseError::invalid_parameter(
            metric,
            format!("{key} must be at least 1"),
        ))
    }
}

pub(crate) fn ensure_at_most(metric: &str, key: &str, value: u32, max: u32) -> Result<(), PulseError> {
    if value <= max {
        Ok(())
    } else {
        Err(PulseError::invalid_parameter(
            metric,
            format!("{key} must be at most {max}, got {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn window_includes_both_ends() {
        let as_of = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
        let since = lookback_start("m", as_of, 1).unwrap();
        let source = MemorySource::new().with_commits(vec![
            CommitRecord::new("edge-start", "a", since),
            CommitRecord::new("edge-end", "a", as_of),
            CommitRecord::new("future", "a", as_of + Duration::seconds(1)),
            CommitRecord::new("old", "a", since - Duration::seconds(1)),
        ]);
        let ids: Vec<String> = commits_in_window(&source, since, as_of)
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["edge-end", "edge-start"]);
    }

    #[test]
    fn checks_reject_out_of_range() {
        assert!(ensure_fraction("m", "t", 1.2).is_err());
        assert!(ensure_fraction("m", "t", 0.0).is_ok());
        assert!(ensure_positive("m", "h", 0.0).is_err());
        assert!(ensure_nonzero("m", "n", 0).is_err());
        assert!(ensure_nonzero("m", "n", 6).is_ok());
        assert!(ensure_at_most("m", "n", MAX_LOOKBACK_MONTHS + 1, MAX_LOOKBACK_MONTHS).is_err());
        assert!(ensure_at_most("m", "n", MAX_LOOKBACK_MONTHS, MAX_LOOKBACK_MONTHS).is_ok());
    }

    #[test]
    fn window_before_the_time_range_is_an_error() {
        let near_min = DateTime::<Utc>::MIN_UTC + Duration::days(10);
        let err = lookback_start("bus_factor", near_min, 1).unwrap_err();
        assert!(matches!(err, PulseError::InvalidParameter { ref metric, .. } if metric == "bus_factor"));
        assert!(weeks_start("velocity_trend", near_min, 2).is_err());
        assert!(weeks_start("velocity_trend", near_min, 1).is_ok());
    }
}
