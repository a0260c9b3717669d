//! Series Statistics
//!
//! Missing-aware helpers shared by the feature engine, rule scorer and
//! reporting stages. A value is "missing" when it is `None` or non-finite;
//! missing values are skipped by aggregates and poison any window they fall in.

use statrs::statistics::Statistics;

/// Standard deviations below this are treated as zero
const MIN_STD: f64 = 1e-12;

/// Keep a value only if it is finite
pub fn finite(x: f64) -> Option<f64> {
    if x.is_finite() {
        Some(x)
    } else {
        None
    }
}

/// Decimal change from `prev` to `cur`; `None` when undefined or infinite
pub fn pct_change(prev: f64, cur: f64) -> Option<f64> {
    finite((cur - prev) / prev)
}

fn defined(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().filter_map(|v| v.and_then(finite)).collect()
}

/// Standardize a series against its own mean and population std (ddof = 0).
///
/// A degenerate series (no defined values or zero spread) yields all `None`.
pub fn zscores(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let data = defined(values);
    if data.is_empty() {
        return vec![None; values.len()];
    }
    let mean = data.iter().mean();
    let std = data.iter().population_std_dev();
    if !std.is_finite() || std < MIN_STD {
        return vec![None; values.len()];
    }
    values
        .iter()
        .map(|v| v.and_then(finite).and_then(|x| finite((x - mean) / std)))
        .collect()
}

fn rolling<F>(values: &[Option<f64>], window: usize, f: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    let mut out = vec![None; values.len()];
    if window == 0 {
        return out;
    }
    let mut buf = Vec::with_capacity(window);
    for end in (window - 1)..values.len() {
        buf.clear();
        buf.extend(values[end + 1 - window..=end].iter().filter_map(|v| v.and_then(finite)));
        if buf.len() == window {
            out[end] = finite(f(&buf));
        }
    }
    out
}

/// Trailing sample standard deviation (ddof = 1).
///
/// The first `window - 1` positions, and any window containing a missing
/// value, are `None`.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |w| w.iter().std_dev())
}

/// Trailing arithmetic mean, same missing policy as [`rolling_std`]
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling(values, window, |w| w.iter().mean())
}

/// Decline from the running maximum, as a non-positive fraction.
///
/// The running maximum skips missing values and never decreases.
pub fn drawdowns(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut peak: Option<f64> = None;
    values
        .iter()
        .map(|v| {
            let x = v.and_then(finite)?;
            let m = peak.map_or(x, |p| p.max(x));
            peak = Some(m);
            finite((x - m) / m)
        })
        .collect()
}

/// Quantile with linear interpolation between order statistics.
///
/// `q` is in [0, 1]. Non-finite inputs are ignored; `None` if nothing remains.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    finite(values.iter().mean())
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Sample standard deviation (ddof = 1); needs at least two values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    finite(values.iter().std_dev())
}

/// Round half away from zero to `decimals` places
pub fn round_to(x: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (x * factor).round() / factor
}
