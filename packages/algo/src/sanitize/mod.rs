//! Numerical Helpers
//!
//! Numerical stability utilities shared by the E-step, M-step and scoring.
//!
//! Functions:
//! - Digamma for variational expectations
//! - Log-sum-exp and in-place softmax
//! - Probability clipping and row repair

use crate::types::EPSILON;

/// Below this the digamma recurrence is applied before the asymptotic series
const DIGAMMA_ASYMPTOTIC_MIN: f64 = 6.0;

/// True when any element is NaN or infinite
pub fn has_invalid_values(arr: &[f64]) -> bool {
    arr.iter().any(|&x| x.is_nan() || x.is_infinite())
}

/// Digamma ψ(x) for x > 0; inputs are floored at `EPSILON`
pub fn digamma(x: f64) -> f64 {
    let mut x = if x.is_nan() { EPSILON } else { x.max(EPSILON) };
    let mut result = 0.0;

    // ψ(x) = ψ(x + 1) - 1/x
    while x < DIGAMMA_ASYMPTOTIC_MIN {
        result -= 1.0 / x;
        x += 1.0;
    }

    let inv = 1.0 / x;
    let inv2 = inv * inv;
    let series = inv2
        * (1.0 / 12.0
            - inv2 * (1.0 / 120.0 - inv2 * (1.0 / 252.0 - inv2 * (1.0 / 240.0 - inv2 / 132.0))));

    result + x.ln() - 0.5 * inv - series
}

/// ln(e^a + e^b) without overflow
pub fn log_sum_exp2(a: f64, b: f64) -> f64 {
    let max = a.max(b);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Normalize log-scores into probabilities in place.
///
/// Non-finite input collapses to the uniform distribution.
pub fn softmax_in_place(scores: &mut [f64]) {
    if scores.is_empty() {
        return;
    }

    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        fill_uniform(scores);
        return;
    }

    let mut sum = 0.0;
    for s in scores.iter_mut() {
        *s = (*s - max).exp();
        sum += *s;
    }

    if sum > 0.0 && sum.is_finite() {
        for s in scores.iter_mut() {
            *s /= sum;
        }
    } else {
        fill_uniform(scores);
    }
}

/// Replace every entry with 1/len
pub fn fill_uniform(row: &mut [f64]) {
    let n = row.len();
    if n == 0 {
        return;
    }
    let p = 1.0 / n as f64;
    row.iter_mut().for_each(|v| *v = p);
}

/// Clip a probability into `[EPSILON, 1]`
#[inline]
pub fn clip_probability(p: f64) -> f64 {
    if p.is_nan() {
        EPSILON
    } else {
        p.clamp(EPSILON, 1.0)
    }
}

/// Natural log with an `EPSILON` floor
#[inline]
pub fn safe_ln(x: f64) -> f64 {
    if x.is_nan() {
        EPSILON.ln()
    } else {
        x.max(EPSILON).ln()
    }
}

/// Ensure a probability row is finite, non-negative and sums to 1
pub fn sanitize_distribution(row: &mut [f64]) {
    if has_invalid_values(row) || row.iter().any(|&p| p < 0.0) {
        fill_uniform(row);
        return;
    }

    let sum: f64 = row.iter().sum();
    if sum <= 0.0 {
        fill_uniform(row);
    } else if (sum - 1.0).abs() > f64::EPSILON {
        row.iter_mut().for_each(|v| *v /= sum);
    }
}

/// Index of the largest entry; first wins on ties
pub fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (idx, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = idx;
        }
    }
    best
}
