//! Fixed-window aggregation over ordered daily series.
//!
//! All functions take a chronologically ordered series where `None` marks a
//! day without data. Windows are trailing: position `i` covers the `window`
//! entries ending at `i`. A window emits a value only once `window` entries
//! have been seen; missing entries inside a window are skipped, and a window
//! with no present entries is absent.

/// Running total. Absent entries stay absent and do not advance the total;
/// the next present entry continues from it.
pub fn cumulative_sum(series: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut total = 0.0;
    series
        .iter()
        .map(|value| {
            value.map(|v| {
                total += v;
                total
            })
        })
        .collect()
}

/// Trailing sum over `window` entries, O(n).
pub fn rolling_sum(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling(series, window).map(|(sum, _count)| sum).collect()
}

/// Trailing mean over `window` entries, O(n).
pub fn rolling_mean(series: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling(series, window)
        .map(|(sum, count)| sum.map(|s| s / count as f64))
        .collect()
}

/// Trailing-window ratio: sum of `numerator` over the window divided by sum
/// of `denominator` over the same window, as a percentage. Absent when
/// either window is absent or the denominator sums to zero.
pub fn percent_of_window(
    numerator: &[Option<f64>],
    denominator: &[Option<f64>],
    window: usize,
) -> Vec<Option<f64>> {
    let num = rolling_sum(numerator, window);
    let den = rolling_sum(denominator, window);
    num.iter()
        .zip(den.iter())
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d * 100.0),
            _ => None,
        })
        .collect()
}

/// Shared trailing-window scan yielding `(sum, present_count)` per position;
/// `sum` is `None` until the window is full or when it holds no values.
fn rolling(
    series: &[Option<f64>],
    window: usize,
) -> impl Iterator<Item = (Option<f64>, usize)> + '_ {
    let mut sum = 0.0;
    let mut count = 0usize;
    series.iter().enumerate().map(move |(i, value)| {
        if let Some(v) = value {
            sum += v;
            count += 1;
        }
        if i >= window {
            if let Some(v) = series[i - window] {
                sum -= v;
                count -= 1;
            }
        }
        if i + 1 >= window && count > 0 {
            (Some(sum), count)
        } else {
            (None, count.max(1))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cumulative_sum_leaves_gaps_absent() {
        let series = [None, Some(1.0), Some(2.0), None, Some(3.0)];
        assert_eq!(
            cumulative_sum(&series),
            vec![None, Some(1.0), Some(3.0), None, Some(6.0)]
        );
    }

    #[test]
    fn test_rolling_sum_basic() {
        let series = [Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        assert_eq!(
            rolling_sum(&series, 2),
            vec![None, Some(3.0), Some(5.0), Some(7.0)]
        );
    }

    #[test]
    fn test_rolling_sum_skips_missing() {
        let series = [Some(1.0), None, Some(3.0)];
        assert_eq!(rolling_sum(&series, 2), vec![None, Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_rolling_sum_all_missing_window_is_absent() {
        let series = [Some(1.0), None, None, Some(4.0)];
        assert_eq!(
            rolling_sum(&series, 2),
            vec![None, Some(1.0), None, Some(4.0)]
        );
    }

    #[test]
    fn test_rolling_mean_uses_present_count() {
        let series = [Some(2.0), None, Some(4.0)];
        // window of 2 at index 2 holds [None, 4.0] -> mean over one value
        assert_eq!(rolling_mean(&series, 2), vec![None, Some(2.0), Some(4.0)]);
    }

    #[test]
    fn test_rolling_matches_naive_windowing() {
        let series: Vec<Option<f64>> = (0..50)
            .map(|i| if i % 7 == 3 { None } else { Some(i as f64) })
            .collect();
        let window = 14;
        let fast = rolling_sum(&series, window);
        for i in 0..series.len() {
            let expected = if i + 1 >= window {
                let values: Vec<f64> =
                    series[i + 1 - window..=i].iter().flatten().copied().collect();
                if values.is_empty() {
                    None
                } else {
                    Some(values.iter().sum())
                }
            } else {
                None
            };
            assert_eq!(fast[i], expected, "mismatch at {}", i);
        }
    }

    #[test]
    fn test_percent_of_window() {
        let deaths = [Some(1.0), Some(1.0), Some(2.0)];
        let cases = [Some(10.0), Some(10.0), Some(30.0)];
        let pct = percent_of_window(&deaths, &cases, 2);
        assert_eq!(pct[0], None);
        assert_eq!(pct[1], Some(10.0));
        assert_eq!(pct[2], Some(7.5));
    }

    #[test]
    fn test_percent_of_window_zero_denominator() {
        let num = [Some(1.0), Some(1.0)];
        let den = [Some(0.0), Some(0.0)];
        assert_eq!(percent_of_window(&num, &den, 2), vec![None, None]);
    }
}
