use serde::Serialize;

use crate::types::PlanId;

/// Two-sided coverage of the empirical interval reported by `summarize`.
pub const CONFIDENCE_LEVEL: f64 = 0.95;

/// Distribution statistics for one result series across N trials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub n: usize,
    pub mean: f64,
    /// Sample standard deviation; zero for a single trial.
    pub std_dev: f64,
    pub min: f64,
    pub p50: f64,
    pub max: f64,
    /// Lower bound of the empirical 95% interval (2.5th percentile).
    pub ci_low: f64,
    /// Upper bound of the empirical 95% interval (97.5th percentile).
    pub ci_high: f64,
}

/// Per-plan out-of-pocket summary, as reported by the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct PlanSummary {
    pub plan_id: PlanId,
    pub plan: String,
    pub premium: f64,
    pub deductible: f64,
    pub oop_max: f64,
    pub out_of_pocket: Summary,
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut values = values.to_vec();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

/// Linear interpolation between closest ranks.
fn interpolate(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    let h = p * (n - 1) as f64;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = h - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Empirical interval of a sorted series: the values at ranks
/// `round(n * a/2)` and `round(n * (1 - a/2))`, clamped to the last index.
pub fn confidence_interval(sorted: &[f64], level: f64) -> Option<(f64, f64)> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let alpha = 1.0 - level;
    let rank = |q: f64| ((n as f64 * q).round() as usize).min(n - 1);
    Some((sorted[rank(alpha / 2.0)], sorted[rank(1.0 - alpha / 2.0)]))
}

/// Summarize a result series. `None` for an empty series.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }
    let values = sorted(values);
    let n = values.len();

    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = if n > 1 {
        values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1) as f64
    } else {
        0.0
    };
    let (ci_low, ci_high) = confidence_interval(&values, CONFIDENCE_LEVEL)?;

    Some(Summary {
        n,
        mean,
        std_dev: variance.sqrt(),
        min: values[0],
        p50: interpolate(&values, 0.5),
        max: values[n - 1],
        ci_low,
        ci_high,
    })
}
