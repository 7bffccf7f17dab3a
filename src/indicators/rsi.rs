//! Relative strength index with Wilder smoothing
//!
//! First averages are the simple mean of the first `period` gains and
//! losses; later deltas use avg = (prev * (period - 1) + current) / period.
//! RSI is exactly 100 when the average loss is zero.

/// RSI of the whole series, or `None` with fewer than `period + 1` values.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let (mut avg_gain, mut avg_loss) = deltas[..period]
        .iter()
        .fold((0.0, 0.0), |(g, l), &d| (g + d.max(0.0), l + (-d).max(0.0)));
    avg_gain /= n;
    avg_loss /= n;

    for &delta in &deltas[period..] {
        avg_gain = (avg_gain * (n - 1.0) + delta.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-delta).max(0.0)) / n;
    }

    if avg_loss == 0.0 {
        return Some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + avg_gain / avg_loss))
}
