// src/simulation/statistics.rs

//! Statistics for the forward-pass upper bound.
//!
//! A sampled forward pass only estimates the expected cost of the current
//! policy, so the reported bound adds a normal-quantile margin on top of the
//! probability-weighted mean.

/// Coefficients of the rational approximations in [`inverse_normal_cdf`].
const CENTRAL_NUMERATOR: [f64; 6] = [
    -3.969683028665376e1,
    2.209460984245205e2,
    -2.759285104469687e2,
    1.383577518672690e2,
    -3.066479806614716e1,
    2.506628277459239,
];
const CENTRAL_DENOMINATOR: [f64; 5] = [
    -5.447609879822406e1,
    1.615858368580409e2,
    -1.556989798598866e2,
    6.680131188771972e1,
    -1.328068155288572e1,
];
const TAIL_NUMERATOR: [f64; 6] = [
    -7.784894002430293e-3,
    -3.223964580411365e-1,
    -2.400758277161838,
    -2.549732539343734,
    4.374664141464968,
    2.938163982698783,
];
const TAIL_DENOMINATOR: [f64; 4] = [
    7.784695709041462e-3,
    3.224671290700398e-1,
    2.445134137142996,
    3.754408661907416,
];
/// Below this probability (and above its complement) the tail form is used.
const TAIL_SPLIT: f64 = 0.02425;

/// Horner evaluation, highest degree first, with an implicit trailing `1.0`
/// when `monic_tail` is set.
fn horner(coefficients: &[f64], x: f64, monic_tail: bool) -> f64 {
    let value = coefficients.iter().fold(0.0, |acc, &c| acc * x + c);
    if monic_tail {
        value * x + 1.0
    } else {
        value
    }
}

/// Quantile function of the standard normal.
///
/// Piecewise rational approximation with relative error below 1.2e-9 on
/// (0, 1). Returns `±inf` at 0 and 1 and `NaN` outside [0, 1].
pub fn inverse_normal_cdf(p: f64) -> f64 {
    if !(0.0..=1.0).contains(&p) {
        return f64::NAN;
    }
    if p == 0.0 {
        return f64::NEG_INFINITY;
    }
    if p == 1.0 {
        return f64::INFINITY;
    }

    let tail = |q: f64| {
        let t = (-2.0 * q.ln()).sqrt();
        horner(&TAIL_NUMERATOR, t, false) / horner(&TAIL_DENOMINATOR, t, true)
    };
    if p < TAIL_SPLIT {
        tail(p)
    } else if p > 1.0 - TAIL_SPLIT {
        -tail(1.0 - p)
    } else {
        let q = p - 0.5;
        let r = q * q;
        q * horner(&CENTRAL_NUMERATOR, r, false) / horner(&CENTRAL_DENOMINATOR, r, true)
    }
}

/// Quantile used for a two-sided interval at level `confidence`:
/// `z = Φ⁻¹(1 − (1 − confidence) / 2)`. About 2.326 at 98%.
pub fn confidence_z(confidence: f64) -> f64 {
    inverse_normal_cdf(1.0 - (1.0 - confidence) / 2.0)
}

/// Probability-weighted cost summary of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub mean: f64,
    /// Standard error of the mean, `0.0` for an exhaustive pass.
    pub std_error: f64,
    /// `mean + z * std_error`
    pub bound: f64,
}

impl CostEstimate {
    /// Summarises `costs[m]` weighted by `probabilities[m]`.
    ///
    /// With `exhaustive` set the weights cover the whole tree, the mean is the
    /// exact expected cost and no margin is added.
    pub fn from_paths(costs: &[f64], probabilities: &[f64], exhaustive: bool, z: f64) -> Self {
        let total: f64 = probabilities.iter().sum();
        if costs.is_empty() || total <= 0.0 {
            return Self {
                mean: 0.0,
                std_error: 0.0,
                bound: 0.0,
            };
        }
        let mean = costs.iter().zip(probabilities).map(|(c, p)| p * c).sum::<f64>() / total;
        if exhaustive {
            return Self {
                mean,
                std_error: 0.0,
                bound: mean,
            };
        }

        let spread: f64 = costs
            .iter()
            .zip(probabilities)
            .map(|(c, p)| p * (c - mean).powi(2))
            .sum();
        let std_error = (spread / (costs.len() as f64 * total)).sqrt();
        Self {
            mean,
            std_error,
            bound: mean + z * std_error,
        }
    }
}
