//! Exponential moving average
//!
//! Seeded with the simple average of the first `period` values, then
//! smoothed with k = 2/(period+1) over the remainder.

/// EMA of the whole series, or `None` when `period` is zero or the series
/// is shorter than `period`.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    Some(
        values[period..]
            .iter()
            .fold(seed, |prev, &value| value * k + prev * (1.0 - k)),
    )
}
