//! Numerically stable log-space arithmetic.
//!
//! Public API:
//!     pub fn log_add(a: f64, b: f64) -> f64
//!     pub fn log_sum(x: &[f64]) -> f64
//!     pub fn log_cumsum(x: &[f64]) -> Vec<f64>
//!
//! Sums are accumulated pairwise, `log(e^a + e^b) = max + log1p(e^(min - max))`, so large negative
//! log-weights never underflow to zero before they are combined.

/// `log(exp(a) + exp(b))` without leaving log space.
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// `log(sum(exp(x)))`. Returns `-inf` for an empty slice.
pub fn log_sum(x: &[f64]) -> f64 {
    x.iter().fold(f64::NEG_INFINITY, |acc, &v| log_add(acc, v))
}

/// Running `log(cumsum(exp(x)))`.
pub fn log_cumsum(x: &[f64]) -> Vec<f64> {
    let mut acc = f64::NEG_INFINITY;
    x.iter()
        .map(|&v| {
            acc = log_add(acc, v);
            acc
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_log_add_matches_direct() {
        assert_approx_eq!(log_add(1.0_f64.ln(), 2.0_f64.ln()), 3.0_f64.ln(), 1e-12);
        assert_approx_eq!(log_add(-0.5, 0.25), ((-0.5_f64).exp() + 0.25_f64.exp()).ln(), 1e-12);
    }

    #[test]
    fn test_log_add_underflow() {
        // exp(-1000) underflows, the log-space sum does not
        let s = log_add(-1000.0, -1000.0);
        assert_approx_eq!(s, -1000.0 + 2.0_f64.ln(), 1e-9);
    }

    #[test]
    fn test_negative_infinity_is_identity() {
        assert_eq!(log_add(f64::NEG_INFINITY, -3.0), -3.0);
        assert_eq!(log_add(-3.0, f64::NEG_INFINITY), -3.0);
        assert_eq!(
            log_add(f64::NEG_INFINITY, f64::NEG_INFINITY),
            f64::NEG_INFINITY
        );
    }

    #[test]
    fn test_log_sum() {
        let x: Vec<f64> = [0.1, 0.2, 0.3, 0.4].iter().map(|v: &f64| v.ln()).collect();
        assert_approx_eq!(log_sum(&x), 0.0, 1e-12);
        assert_eq!(log_sum(&[]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_log_cumsum() {
        let x: Vec<f64> = [1.0, 2.0, 3.0].iter().map(|v: &f64| v.ln()).collect();
        let c = log_cumsum(&x);
        assert_eq!(c.len(), 3);
        assert_approx_eq!(c[0], 1.0_f64.ln(), 1e-12);
        assert_approx_eq!(c[1], 3.0_f64.ln(), 1e-12);
        assert_approx_eq!(c[2], 6.0_f64.ln(), 1e-12);
    }
}
