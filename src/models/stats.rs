use crate::errors::{EngineError, EngineResult};
use statrs::statistics::Statistics;

/// Sum of squared deviations below this fraction of the raw sum of squares
/// is treated as zero variance (floating-point noise around a constant).
const MIN_RELATIVE_DISPERSION: f64 = 1e-24;

/// Arithmetic mean. NaN for an empty buffer; callers check length first.
#[inline]
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample variance (n - 1 denominator). NaN for fewer than two values.
#[inline]
pub fn sample_variance(values: &[f64]) -> f64 {
    values.iter().variance()
}

/// Largest value. NaN for an empty buffer or when any value is NaN.
#[inline]
pub fn max(values: &[f64]) -> f64 {
    Statistics::max(values.iter())
}

/// Smallest value. NaN for an empty buffer or when any value is NaN.
#[inline]
pub fn min(values: &[f64]) -> f64 {
    Statistics::min(values.iter())
}

#[inline]
pub fn sample_std_dev(values: &[f64]) -> f64 {
    sample_variance(values).max(0.0).sqrt()
}

/// The trailing `window` elements of `values` (all of them if shorter).
#[inline]
pub fn tail(values: &[f64], window: usize) -> &[f64] {
    &values[values.len().saturating_sub(window)..]
}

/// Pearson correlation of two equally long buffers.
///
/// Fails with `DegenerateInput` when either side has zero variance instead of
/// returning NaN. The result is clamped into [-1, 1] against rounding overshoot.
pub fn pearson(a: &[f64], b: &[f64]) -> EngineResult<f64> {
    if a.len() != b.len() {
        return Err(EngineError::InvalidArgument(format!(
            "correlation needs equal lengths, got {} and {}",
            a.len(),
            b.len()
        )));
    }
    if a.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "correlation needs at least 2 observations, got {}",
            a.len()
        )));
    }

    let mean_a = mean(a);
    let mean_b = mean(b);

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    let mut raw_xx = 0.0;
    let mut raw_yy = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
        raw_xx += x * x;
        raw_yy += y * y;
    }

    if sxx <= MIN_RELATIVE_DISPERSION * raw_xx || syy <= MIN_RELATIVE_DISPERSION * raw_yy {
        return Err(EngineError::DegenerateInput(
            "correlation undefined for a zero-variance series".into(),
        ));
    }

    Ok((sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0))
}

/// Percentile of `x` within `values`, ties counted at their midpoint:
/// (count below + count equal / 2) / n * 100.
pub fn percentile_rank(values: &[f64], x: f64) -> EngineResult<f64> {
    let (below, equal) = count_below_equal(values, x)?;
    let n = values.len() as f64;
    Ok(((below as f64 + 0.5 * equal as f64) / n * 100.0).clamp(0.0, 100.0))
}

/// Weak percent rank: fraction of `values` less than or equal to `x`, times 100.
pub fn percent_rank(values: &[f64], x: f64) -> EngineResult<f64> {
    let (below, equal) = count_below_equal(values, x)?;
    let n = values.len() as f64;
    Ok(((below + equal) as f64 / n * 100.0).clamp(0.0, 100.0))
}

fn count_below_equal(values: &[f64], x: f64) -> EngineResult<(usize, usize)> {
    if values.is_empty() {
        return Err(EngineError::InsufficientData(
            "percentile rank needs a non-empty history".into(),
        ));
    }
    let mut below = 0usize;
    let mut equal = 0usize;
    for &v in values {
        if v < x {
            below += 1;
        } else if v == x {
            equal += 1;
        }
    }
    Ok((below, equal))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&v) - 2.5).abs() < 1e-12);
        // sample variance: sum((x-2.5)^2) / 3 = 5/3
        assert!((sample_variance(&v) - 5.0 / 3.0).abs() < 1e-12);
        assert_eq!(sample_std_dev(&[0.0, 0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_min_max() {
        let v = [3.0, 1.0, 2.0];
        assert_eq!(max(&v), 3.0);
        assert_eq!(min(&v), 1.0);
        assert!(max(&[]).is_nan());
    }

    #[test]
    fn test_tail() {
        let v = [1.0, 2.0, 3.0];
        assert_eq!(tail(&v, 2), &[2.0, 3.0]);
        assert_eq!(tail(&v, 10), &v);
    }

    #[test]
    fn test_pearson_perfect() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 4.0, 6.0, 8.0, 10.0];
        let c = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((pearson(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&a, &c).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_degenerate() {
        let a = [0.01; 10];
        let b = [0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.1, 0.2, 0.3, 0.4];
        assert!(matches!(pearson(&a, &b), Err(EngineError::DegenerateInput(_))));
        assert!(matches!(pearson(&b, &[0.0; 10]), Err(EngineError::DegenerateInput(_))));
    }

    #[test]
    fn test_pearson_length_mismatch() {
        assert!(matches!(pearson(&[1.0, 2.0], &[1.0]), Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn test_percentile_rank_ties_midpoint() {
        let v = [1.0, 2.0, 2.0, 3.0];
        // below = 1, equal = 2 -> (1 + 1) / 4 = 50%
        assert!((percentile_rank(&v, 2.0).unwrap() - 50.0).abs() < 1e-12);
        // weak rank counts both ties fully -> 3 / 4
        assert!((percent_rank(&v, 2.0).unwrap() - 75.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_extremes() {
        let v = [0.2, 0.3, 0.4];
        assert_eq!(percentile_rank(&v, 0.01).unwrap(), 0.0);
        assert_eq!(percentile_rank(&v, 5.0).unwrap(), 100.0);
    }

    #[test]
    fn test_percentile_empty_fails() {
        assert!(matches!(percentile_rank(&[], 1.0), Err(EngineError::InsufficientData(_))));
    }
}
