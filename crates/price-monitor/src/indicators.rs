// =============================================================================
// Indicators — identical math to the Buy Scanner's module (spec §4.3 names
// the same RSI/ATR/MA inputs the scanner already computes); kept as its own
// copy rather than a shared crate dependency since the two processes never
// share memory and each owns its own bar ring (spec §5).
// =============================================================================

use domain::tick::MinuteBar;

pub fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period || period == 0 {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

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

/// Average True Range over `period` closed bars.
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
    fn rsi_all_losses_is_zero() {
        let closes: Vec<f64> = (0..20).map(|i| 200.0 - i as f64).collect();
        let rsi = current_rsi(&closes, 14).unwrap();
        assert!((rsi - 0.0).abs() < 1e-9);
    }

    #[test]
    fn atr_needs_period_plus_one_bars() {
        let bars = vec![bar(0, 101.0, 99.0, 100.0, 10), bar(1, 102.0, 98.0, 100.0, 10)];
        assert_eq!(atr(&bars, 3), None);
    }

    #[test]
    fn atr_computes_mean_true_range() {
        let bars: Vec<MinuteBar> = (0..6)
            .map(|i| bar(i, 101.0, 99.0, 100.0, 10))
            .collect();
        let value = atr(&bars, 5).unwrap();
        assert!((value - 2.0).abs() < 1e-9);
    }
}
