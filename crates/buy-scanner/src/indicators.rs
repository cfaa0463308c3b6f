// =============================================================================
// Indicators — computed on demand from a BarRing snapshot. RSI is ported
// near-verbatim from the Gateway's indicator math (Wilder's smoothing);
// the rest are new, derived directly from the spec's §4.2 bar-aggregator
// description.
// =============================================================================

use domain::tick::MinuteBar;

/// Simple moving average of the last `period` closes. `None` if there are
/// fewer than `period` bars.
pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period || period == 0 {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder's-smoothed RSI, ported from the teacher's indicator math.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for window in closes.windows(2) {
        let change = window[1] - window[0];
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut avg_gain: f64 = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(gains.len() - period + 1);
    out.push(rsi_from_averages(avg_gain, avg_loss));

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        out.push(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

pub fn current_rsi(closes: &[f64], period: usize) -> Option<f64> {
    calculate_rsi(closes, period).last().copied()
}

/// Average True Range over `period` closed bars, using each bar's own
/// high/low/close as a proxy for true range (no separate prior-close gap
/// data is retained in the ring beyond the bars themselves).
pub fn atr(bars: &[MinuteBar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 || period == 0 {
        return None;
    }
    let ranges: Vec<f64> = bars
        .windows(2)
        .map(|w| {
            let prev_close = w[0].close;
            let cur = &w[1];
            let a = cur.high - cur.low;
            let b = (cur.high - prev_close).abs();
            let c = (cur.low - prev_close).abs();
            a.max(b).max(c)
        })
        .collect();
    if ranges.len() < period {
        return None;
    }
    let window = &ranges[ranges.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Volume-weighted average price over all bars currently in the ring
/// (intraday VWAP — the ring never spans more than one session at 120
/// one-minute bars).
pub fn vwap(bars: &[MinuteBar]) -> Option<f64> {
    if bars.is_empty() {
        return None;
    }
    let total_volume: u64 = bars.iter().map(|b| b.volume).sum();
    if total_volume == 0 {
        return None;
    }
    let typical_sum: f64 = bars
        .iter()
        .map(|b| ((b.high + b.low + b.close) / 3.0) * b.volume as f64)
        .sum();
    Some(typical_sum / total_volume as f64)
}

/// Ratio of the most recent bar's volume to the mean of the preceding
/// `lookback` bars.
pub fn volume_ratio(bars: &[MinuteBar], lookback: usize) -> Option<f64> {
    if bars.len() < lookback + 1 {
        return None;
    }
    let current = bars.last()?.volume as f64;
    let window = &bars[bars.len() - lookback - 1..bars.len() - 1];
    let mean: f64 = window.iter().map(|b| b.volume as f64).sum::<f64>() / lookback as f64;
    if mean == 0.0 {
        return None;
    }
    Some(current / mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::stock_code::StockCode;

    fn bar(ts: i64, high: f64, low: f64, close: f64, volume: u64) -> MinuteBar {
        let mut b = MinuteBar::start(StockCode::new("005930").unwrap(), ts, close, volume);
        b.high = high;
        b.low = low;
        b.close = close;
        b
    }

    #[test]
    fn sma_requires_full_period() {
        assert_eq!(sma(&[1.0, 2.0], 5), None);
        assert_eq!(sma(&[1.0, 2.0, 3.0], 3), Some(2.0));
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let rsi = current_rsi(&closes, 14).unwrap();
        assert!((rsi - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rsi_empty_input_returns_none() {
        assert_eq!(current_rsi(&[], 14), None);
    }

    #[test]
    fn vwap_weights_by_volume() {
        let bars = vec![
            bar(0, 101.0, 99.0, 100.0, 10),
            bar(1, 111.0, 109.0, 110.0, 90),
        ];
        let v = vwap(&bars).unwrap();
        assert!(v > 105.0, "vwap should skew toward the higher-volume bar, got {v}");
    }

    #[test]
    fn volume_ratio_above_one_means_spike() {
        let bars = vec![
            bar(0, 101.0, 99.0, 100.0, 100),
            bar(1, 101.0, 99.0, 100.0, 100),
            bar(2, 101.0, 99.0, 100.0, 100),
            bar(3, 101.0, 99.0, 100.0, 500),
        ];
        let ratio = volume_ratio(&bars, 3).unwrap();
        assert!((ratio - 5.0).abs() < 1e-9);
    }
}
