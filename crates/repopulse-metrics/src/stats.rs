//! Descriptive statistics shared by the analyzers.
//!
//! All functions accept empty input and return `0.0` rather than failing.

use serde::Serialize;

/// Arithmetic mean.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::stats::mean;
///
/// assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
/// assert_eq!(mean(&[]), 0.0);
/// ```
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median; the mean of the two middle values for even lengths.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::stats::median;
///
/// assert_eq!(median(&[5.0, 1.0, 3.0]), 3.0);
/// assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
/// ```
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    }
}

/// Population standard deviation (divides by `n`); `0.0` for fewer than two values.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Sample standard deviation (divides by `n - 1`); `0.0` for fewer than two values.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::stats::sample_std_dev;
///
/// let sd = sample_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
/// assert!((sd - 2.138).abs() < 1e-3);
/// ```
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Index percentile over an ascending slice: `sorted[min(floor(n·p/100), n−1)]`.
///
/// No interpolation is done, so the result is always an element of the input.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::stats::percentile;
///
/// let hours = [10.0, 20.0, 30.0, 40.0, 100.0];
/// assert_eq!(percentile(&hours, 50), 30.0);
/// assert_eq!(percentile(&hours, 99), 100.0);
/// ```
pub fn percentile(sorted: &[f64], p: u32) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let index = (n * p as usize / 100).min(n - 1);
    sorted[index]
}

/// Gini coefficient of nonnegative values, clamped to `[0, 1]`.
///
/// Values are sorted ascending and fed to
/// `2·Σ(i+1)·vᵢ / (n·total) − (n+1)/n`. Returns `0.0` when there is at most
/// one value or the total is zero.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::stats::gini;
///
/// assert_eq!(gini(&[5.0, 5.0, 5.0]), 0.0);
/// assert!(gini(&[100.0, 1.0, 1.0]) > 0.5);
/// assert_eq!(gini(&[42.0]), 0.0);
/// ```
pub fn gini(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 0.0;
    }
    let sorted = sorted(values);
    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, v)| (i + 1) as f64 * v)
        .sum();
    let n = n as f64;
    let g = (2.0 * weighted) / (n * total) - (n + 1.0) / n;
    g.clamp(0.0, 1.0)
}

/// Result of an ordinary least squares fit `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinearFit {
    /// Change in `y` per unit of `x`.
    pub slope: f64,
    /// `y` at `x = 0`.
    pub intercept: f64,
    /// Coefficient of determination; `0.0` when `y` is constant.
    pub r_squared: f64,
}

/// Fit `ys` against `xs` by ordinary least squares.
///
/// Fewer than two points give an all-zero fit. When every `x` is equal the
/// slope is zero and the intercept is the mean of `ys`.
///
/// # Examples
///
/// ```
/// use repopulse_metrics::stats::linear_regression;
///
/// let fit = linear_regression(&[0.0, 1.0, 2.0, 3.0, 4.0], &[2.0, 4.0, 6.0, 8.0, 10.0]);
/// assert!((fit.slope - 2.0).abs() < 1e-9);
/// assert!((fit.intercept - 2.0).abs() < 1e-9);
/// assert!((fit.r_squared - 1.0).abs() < 1e-9);
/// ```
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> LinearFit {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return LinearFit {
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
        };
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let x_mean = mean(xs);
    let y_mean = mean(ys);

    let numerator: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let denominator: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
    if denominator == 0.0 {
        return LinearFit {
            slope: 0.0,
            intercept: y_mean,
            r_squared: 0.0,
        };
    }

    let slope = numerator / denominator;
    let intercept = y_mean - slope * x_mean;
    let ss_res: f64 = xs
        .iter()
        .zip(ys)
        .map(|(x, y)| (y - (slope * x + intercept)).powi(2))
        .sum();
    let ss_tot: f64 = ys.iter().map(|y| (y - y_mean).powi(2)).sum();
    let r_squared = if ss_tot == 0.0 { 0.0 } else { 1.0 - ss_res / ss_tot };

    LinearFit {
        slope,
        intercept,
        r_squared,
    }
}

/// Copy of `values` sorted ascending (NaN-safe).
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Minimum and maximum, `(0.0, 0.0)` for empty input.
pub fn min_max(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_empty_is_zero() {
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn std_devs_are_zero_for_single_value() {
        assert_eq!(population_std_dev(&[3.0]), 0.0);
        assert_eq!(sample_std_dev(&[3.0]), 0.0);
    }

    #[test]
    fn population_std_dev_divides_by_n() {
        let sd = population_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((sd - 2.0).abs() < 1e-12);
    }

    #[test]
    fn percentile_index_rule() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        // floor(4 * 75 / 100) = 3
        assert_eq!(percentile(&sorted, 75), 4.0);
        assert_eq!(percentile(&sorted, 50), 3.0);
        assert_eq!(percentile(&[], 50), 0.0);
    }

    #[test]
    fn gini_two_contributors() {
        // sorted [1, 3]: 2*(1 + 6) / (2*4) - 3/2 = 0.25
        assert!((gini(&[3.0, 1.0]) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn gini_zero_total() {
        assert_eq!(gini(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn regression_on_constant_series() {
        let fit = linear_regression(&[0.0, 1.0, 2.0, 3.0], &[4.0, 4.0, 4.0, 4.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 4.0);
        assert_eq!(fit.r_squared, 0.0);
    }

    #[test]
    fn regression_needs_two_points() {
        let fit = linear_regression(&[0.0], &[7.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.r_squared, 0.0);
    }

    #[test]
    fn regression_with_identical_x() {
        let fit = linear_regression(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]);
        assert_eq!(fit.slope, 0.0);
        assert_eq!(fit.intercept, 2.0);
    }

    #[test]
    fn min_max_of_values() {
        assert_eq!(min_max(&[3.0, -1.0, 8.0]), (-1.0, 8.0));
        assert_eq!(min_max(&[]), (0.0, 0.0));
    }
}
