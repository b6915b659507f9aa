//! Empirical CDF over integer distance samples.

use crate::{Result, StatsError};

/// Empirical quantile vector of a sample.
///
/// Returns `(start, q)` where `start = min(data)` and `q[k]` is the
/// fraction of samples strictly below `start + k`, for
/// `k = 0..=max(data) - start`. Plateaus between observed values repeat
/// the previous fraction.
pub fn empirical_quantile(data: &[u32]) -> Result<(u32, Vec<f64>)> {
    if data.is_empty() {
        return Err(StatsError::Unexpected(
            "sample data set is empty during frequency computation".into(),
        ));
    }
    let mut sorted = data.to_vec();
    sorted.sort_unstable();
    let start = sorted[0];
    let end = *sorted.last().expect("non-empty");
    let total = sorted.len() as f64;

    let mut quantile = vec![0.0f64; (end - start + 1) as usize];
    let mut below = 0usize;
    let mut index = 0usize;
    let mut slot = 0usize;
    while index < sorted.len() {
        let current = sorted[index];
        quantile[slot] = below as f64 / total;
        slot += 1;
        while index < sorted.len() && sorted[index] == current {
            index += 1;
            below += 1;
        }
        if index < sorted.len() {
            // Values absent from the sample still count everything
            // consumed so far as strictly below them.
            let fraction = below as f64 / total;
            for _ in current + 1..sorted[index] {
                quantile[slot] = fraction;
                slot += 1;
            }
        }
    }
    Ok((start, quantile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_with_plateau() {
        let (start, q) = empirical_quantile(&[2, 2, 3, 5]).unwrap();
        assert_eq!(start, 2);
        assert_eq!(q, vec![0.0, 0.5, 0.75, 0.75]);
    }

    #[test]
    fn test_first_entry_is_zero() {
        let (_, q) = empirical_quantile(&[7, 9, 12]).unwrap();
        assert_eq!(q[0], 0.0);
    }

    #[test]
    fn test_last_entry_excludes_max_count() {
        let data = [1u32, 1, 2, 4, 4, 4, 9];
        let (start, q) = empirical_quantile(&data).unwrap();
        let max = 9;
        let count_max = 1;
        let expected = (data.len() - count_max) as f64 / data.len() as f64;
        assert_eq!(q[(max - start) as usize], expected);
    }

    #[test]
    fn test_single_value() {
        let (start, q) = empirical_quantile(&[4, 4, 4]).unwrap();
        assert_eq!(start, 4);
        assert_eq!(q, vec![0.0]);
    }

    #[test]
    fn test_monotone_non_decreasing() {
        let (_, q) = empirical_quantile(&[3, 1, 4, 1, 5, 9, 2, 6]).unwrap();
        let mut prev = 0.0;
        for &value in &q {
            assert!(value >= prev);
            assert!((0.0..=1.0).contains(&value));
            prev = value;
        }
    }

    #[test]
    fn test_empty_rejected() {
        assert!(empirical_quantile(&[]).is_err());
    }
}
