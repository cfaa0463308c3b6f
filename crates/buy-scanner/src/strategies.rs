// =============================================================================
// Strategies — pure predicates from (bar ring, trading context, watchlist
// entry) to an optional signal hit. Each strategy is independent; the
// scanner runs all of them for a symbol on every bar close and lets the
// risk gates decide which hits actually get published (spec §4.2).
// =============================================================================

use chrono::{DateTime, NaiveTime, Utc};
use domain::regime::{MarketRegime, TradingContext};
use domain::signal::SignalType;
use domain::tick::MinuteBar;
use domain::watchlist::WatchlistEntry;

use crate::indicators;

pub struct StrategyHit {
    pub signal_type: SignalType,
    pub price: f64,
    pub rsi_value: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub vwap: Option<f64>,
}

pub struct StrategyInput<'a> {
    pub bars: &'a [MinuteBar],
    pub context: &'a TradingContext,
    pub entry: &'a WatchlistEntry,
    pub now: DateTime<Utc>,
    pub feature_conviction_enabled: bool,
    pub feature_orb_enabled: bool,
}

fn time_of_day(now: DateTime<Utc>) -> NaiveTime {
    now.time()
}

fn between(t: NaiveTime, start: &str, end: &str) -> bool {
    let start = NaiveTime::parse_from_str(start, "%H:%M").unwrap();
    let end = NaiveTime::parse_from_str(end, "%H:%M").unwrap();
    t >= start && t <= end
}

fn intraday_gain_pct(bars: &[MinuteBar]) -> Option<f64> {
    let open = bars.first()?.open;
    let last = bars.last()?.close;
    if open <= 0.0 {
        return None;
    }
    Some((last - open) / open * 100.0)
}

pub fn golden_cross(input: &StrategyInput) -> Option<StrategyHit> {
    if !matches!(
        input.context.regime,
        MarketRegime::Bull | MarketRegime::StrongBull | MarketRegime::Sideways
    ) {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    if closes.len() < 21 {
        return None;
    }
    let ma5_now = indicators::sma(&closes, 5)?;
    let ma20_now = indicators::sma(&closes, 20)?;
    let prev = &closes[..closes.len() - 1];
    let ma5_prev = indicators::sma(prev, 5)?;
    let ma20_prev = indicators::sma(prev, 20)?;

    if ma5_prev <= ma20_prev && ma5_now > ma20_now {
        Some(StrategyHit {
            signal_type: SignalType::GoldenCross,
            price: *closes.last()?,
            rsi_value: indicators::current_rsi(&closes, 14),
            volume_ratio: indicators::volume_ratio(input.bars, 20),
            vwap: indicators::vwap(input.bars),
        })
    } else {
        None
    }
}

pub fn rsi_rebound(input: &StrategyInput) -> Option<StrategyHit> {
    if !matches!(input.context.regime, MarketRegime::Sideways | MarketRegime::Bear) {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    let rsi_series = indicators::calculate_rsi(&closes, 14);
    if rsi_series.len() < 2 {
        return None;
    }
    let prev = rsi_series[rsi_series.len() - 2];
    let cur = rsi_series[rsi_series.len() - 1];
    if prev < 30.0 && cur >= 35.0 {
        Some(StrategyHit {
            signal_type: SignalType::RsiRebound,
            price: *closes.last()?,
            rsi_value: Some(cur),
            volume_ratio: indicators::volume_ratio(input.bars, 20),
            vwap: indicators::vwap(input.bars),
        })
    } else {
        None
    }
}

pub fn momentum(input: &StrategyInput, momentum_cap_pct: f64, volume_ratio_threshold: f64) -> Option<StrategyHit> {
    let gain = intraday_gain_pct(input.bars)?;
    if gain <= 0.0 || gain > momentum_cap_pct {
        return None;
    }
    let ratio = indicators::volume_ratio(input.bars, 20)?;
    if ratio < volume_ratio_threshold {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    Some(StrategyHit {
        signal_type: SignalType::Momentum,
        price: *closes.last()?,
        rsi_value: indicators::current_rsi(&closes, 14),
        volume_ratio: Some(ratio),
        vwap: indicators::vwap(input.bars),
    })
}

pub fn momentum_continuation(input: &StrategyInput) -> Option<StrategyHit> {
    if !matches!(input.context.regime, MarketRegime::Bull | MarketRegime::StrongBull) {
        return None;
    }
    if !between(time_of_day(input.now), "09:15", "10:30") {
        return None;
    }
    let gain = intraday_gain_pct(input.bars)?;
    if !(2.0..=5.0).contains(&gain) {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    let rsi = indicators::current_rsi(&closes, 14)?;
    if rsi >= 75.0 {
        return None;
    }
    Some(StrategyHit {
        signal_type: SignalType::MomentumContinuation,
        price: *closes.last()?,
        rsi_value: Some(rsi),
        volume_ratio: indicators::volume_ratio(input.bars, 20),
        vwap: indicators::vwap(input.bars),
    })
}

pub fn dip_buy(input: &StrategyInput) -> Option<StrategyHit> {
    let gain = intraday_gain_pct(input.bars)?;
    let in_range = match input.context.regime {
        MarketRegime::Bull | MarketRegime::StrongBull => (-3.0..=-0.5).contains(&gain),
        MarketRegime::Bear | MarketRegime::StrongBear => (-5.0..=-2.0).contains(&gain),
        MarketRegime::Sideways => false,
    };
    if !in_range {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    Some(StrategyHit {
        signal_type: SignalType::DipBuy,
        price: *closes.last()?,
        rsi_value: indicators::current_rsi(&closes, 14),
        volume_ratio: indicators::volume_ratio(input.bars, 20),
        vwap: indicators::vwap(input.bars),
    })
}

pub fn volume_breakout(input: &StrategyInput) -> Option<StrategyHit> {
    let ratio = indicators::volume_ratio(input.bars, 20)?;
    if ratio < 3.0 {
        return None;
    }
    let current_high = input.bars.last()?.high;
    let is_new_high = input
        .bars
        .iter()
        .rev()
        .skip(1)
        .all(|b| b.high <= current_high);
    if !is_new_high {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    Some(StrategyHit {
        signal_type: SignalType::VolumeBreakout,
        price: *closes.last()?,
        rsi_value: indicators::current_rsi(&closes, 14),
        volume_ratio: Some(ratio),
        vwap: indicators::vwap(input.bars),
    })
}

pub fn watchlist_conviction(input: &StrategyInput) -> Option<StrategyHit> {
    if !input.feature_conviction_enabled {
        return None;
    }
    if input.entry.llm_score < 80.0 {
        return None;
    }
    if !between(time_of_day(input.now), "09:00", "10:00") {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    Some(StrategyHit {
        signal_type: SignalType::WatchlistConviction,
        price: *closes.last()?,
        rsi_value: indicators::current_rsi(&closes, 14),
        volume_ratio: indicators::volume_ratio(input.bars, 20),
        vwap: indicators::vwap(input.bars),
    })
}

pub fn orb_breakout(input: &StrategyInput) -> Option<StrategyHit> {
    if !input.feature_orb_enabled {
        return None;
    }
    let t = time_of_day(input.now);
    if !between(t, "09:15", "10:30") {
        return None;
    }
    let opening_range: Vec<&MinuteBar> = input
        .bars
        .iter()
        .filter(|b| {
            let bar_time = DateTime::<Utc>::from_timestamp(b.minute_ts, 0)
                .map(|dt| dt.time())
                .unwrap_or(t);
            between(bar_time, "09:00", "09:15")
        })
        .collect();
    if opening_range.is_empty() {
        return None;
    }
    let range_high = opening_range
        .iter()
        .map(|b| b.high)
        .fold(f64::MIN, f64::max);
    let last = input.bars.last()?;
    if last.close <= range_high {
        return None;
    }
    let closes: Vec<f64> = input.bars.iter().map(|b| b.close).collect();
    Some(StrategyHit {
        signal_type: SignalType::OrbBreakout,
        price: last.close,
        rsi_value: indicators::current_rsi(&closes, 14),
        volume_ratio: indicators::volume_ratio(input.bars, 20),
        vwap: indicators::vwap(input.bars),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::regime::TradingContext;
    use domain::stock_code::StockCode;
    use domain::watchlist::{RiskTag, TradeTier, WatchlistEntry};

    fn bar(ts: i64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> MinuteBar {
        let mut b = MinuteBar::start(StockCode::new("005930").unwrap(), ts, open, volume);
        b.high = high;
        b.low = low;
        b.close = close;
        b
    }

    fn entry() -> WatchlistEntry {
        WatchlistEntry::new(
            StockCode::new("005930").unwrap(),
            "Samsung",
            75.0,
            60.0,
            true,
            TradeTier::Tier1,
            RiskTag::Neutral,
            1,
            "Tech",
            false,
        )
        .unwrap()
    }

    fn context(regime: MarketRegime) -> TradingContext {
        let mut ctx = TradingContext::fallback(chrono::Utc::now().date_naive());
        ctx.regime = regime;
        ctx
    }

    #[test]
    fn golden_cross_fires_on_crossover() {
        let mut bars = Vec::new();
        // MA5 below MA20 initially, then crosses above.
        for i in 0..25 {
            let price = if i < 20 { 100.0 } else { 100.0 + (i - 19) as f64 * 3.0 };
            bars.push(bar(i as i64, price, price + 1.0, price - 1.0, price, 100));
        }
        let input = StrategyInput {
            bars: &bars,
            context: &context(MarketRegime::Bull),
            entry: &entry(),
            now: Utc.with_ymd_and_hms(2026, 7, 28, 9, 30, 0).unwrap(),
            feature_conviction_enabled: false,
            feature_orb_enabled: false,
        };
        assert!(golden_cross(&input).is_some());
    }

    #[test]
    fn golden_cross_gated_out_in_bear() {
        let bars = vec![bar(0, 100.0, 101.0, 99.0, 100.0, 100); 25];
        let input = StrategyInput {
            bars: &bars,
            context: &context(MarketRegime::Bear),
            entry: &entry(),
            now: Utc::now(),
            feature_conviction_enabled: false,
            feature_orb_enabled: false,
        };
        assert!(golden_cross(&input).is_none());
    }

    #[test]
    fn momentum_continuation_requires_window_and_rsi_ceiling() {
        let mut bars = Vec::new();
        for i in 0..10 {
            let price = 100.0 + i as f64 * 0.35;
            bars.push(bar(i as i64, price, price + 0.5, price - 0.5, price, 100));
        }
        let input = StrategyInput {
            bars: &bars,
            context: &context(MarketRegime::StrongBull),
            entry: &entry(),
            now: Utc.with_ymd_and_hms(2026, 7, 28, 9, 45, 0).unwrap(),
            feature_conviction_enabled: false,
            feature_orb_enabled: false,
        };
        let hit = momentum_continuation(&input);
        assert!(hit.is_some());

        let input_out_of_window = StrategyInput {
            now: Utc.with_ymd_and_hms(2026, 7, 28, 13, 0, 0).unwrap(),
            ..input
        };
        assert!(momentum_continuation(&input_out_of_window).is_none());
    }

    #[test]
    fn watchlist_conviction_off_by_default() {
        let bars = vec![bar(0, 100.0, 101.0, 99.0, 100.0, 100); 5];
        let mut e = entry();
        e.llm_score = 95.0;
        let input = StrategyInput {
            bars: &bars,
            context: &context(MarketRegime::Bull),
            entry: &e,
            now: Utc.with_ymd_and_hms(2026, 7, 28, 9, 30, 0).unwrap(),
            feature_conviction_enabled: false,
            feature_orb_enabled: false,
        };
        assert!(watchlist_conviction(&input).is_none());
    }
}
