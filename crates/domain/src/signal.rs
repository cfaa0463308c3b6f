// =============================================================================
// BuySignal — published by the Buy Scanner to `stream:buy-signals`.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::regime::MarketRegime;
use crate::stock_code::StockCode;
use crate::watchlist::{RiskTag, TradeTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalType {
    #[serde(rename = "GOLDEN_CROSS")]
    GoldenCross,
    #[serde(rename = "RSI_REBOUND")]
    RsiRebound,
    #[serde(rename = "MOMENTUM")]
    Momentum,
    #[serde(rename = "MOMENTUM_CONTINUATION")]
    MomentumContinuation,
    #[serde(rename = "DIP_BUY")]
    DipBuy,
    #[serde(rename = "VOLUME_BREAKOUT")]
    VolumeBreakout,
    #[serde(rename = "WATCHLIST_CONVICTION")]
    WatchlistConviction,
    #[serde(rename = "ORB_BREAKOUT")]
    OrbBreakout,
}

impl SignalType {
    /// Strategies granted a partial bypass of the RSI guard (spec §4.2,
    /// risk gate 4).
    pub fn bypasses_rsi_guard(self) -> bool {
        matches!(
            self,
            Self::MomentumContinuation | Self::WatchlistConviction | Self::OrbBreakout
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSource {
    #[serde(rename = "scanner")]
    Scanner,
    #[serde(rename = "conviction")]
    Conviction,
    #[serde(rename = "manual")]
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuySignal {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub signal_type: SignalType,
    pub signal_price: f64,
    pub llm_score: f64,
    pub hybrid_score: f64,
    pub trade_tier: TradeTier,
    pub risk_tag: RiskTag,
    pub market_regime: MarketRegime,
    pub source: SignalSource,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub rsi_value: Option<f64>,
    #[serde(default)]
    pub volume_ratio: Option<f64>,
    #[serde(default)]
    pub vwap: Option<f64>,
    pub position_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BuySignalError {
    #[error("trade_tier is BLOCKED; signal for {0} must not be published")]
    BlockedTier(String),
    #[error("position_multiplier {0} out of [0.3, 2.0] range")]
    MultiplierOutOfRange(f64),
}

impl BuySignal {
    /// Construct a BuySignal, enforcing the construction-time invariant: a
    /// BLOCKED-tier watchlist entry must never reach the bus.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stock_code: StockCode,
        stock_name: impl Into<String>,
        signal_type: SignalType,
        signal_price: f64,
        llm_score: f64,
        hybrid_score: f64,
        trade_tier: TradeTier,
        risk_tag: RiskTag,
        market_regime: MarketRegime,
        source: SignalSource,
        timestamp: DateTime<Utc>,
        position_multiplier: f64,
    ) -> Result<Self, BuySignalError> {
        if trade_tier == TradeTier::Blocked {
            return Err(BuySignalError::BlockedTier(stock_code.to_string()));
        }
        if !(0.3..=2.0).contains(&position_multiplier) {
            return Err(BuySignalError::MultiplierOutOfRange(position_multiplier));
        }

        Ok(Self {
            stock_code,
            stock_name: stock_name.into(),
            signal_type,
            signal_price,
            llm_score,
            hybrid_score,
            trade_tier,
            risk_tag,
            market_regime,
            source,
            timestamp,
            rsi_value: None,
            volume_ratio: None,
            vwap: None,
            position_multiplier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code() -> StockCode {
        StockCode::new("005930").unwrap()
    }

    #[test]
    fn rejects_blocked_tier() {
        let err = BuySignal::new(
            code(),
            "Samsung",
            SignalType::GoldenCross,
            72_100.0,
            70.0,
            78.0,
            TradeTier::Blocked,
            RiskTag::Neutral,
            MarketRegime::Bull,
            SignalSource::Scanner,
            Utc::now(),
            1.0,
        )
        .unwrap_err();
        assert_eq!(err, BuySignalError::BlockedTier("005930".to_string()));
    }

    #[test]
    fn rejects_out_of_range_multiplier() {
        let err = BuySignal::new(
            code(),
            "Samsung",
            SignalType::GoldenCross,
            72_100.0,
            70.0,
            78.0,
            TradeTier::Tier1,
            RiskTag::Neutral,
            MarketRegime::Bull,
            SignalSource::Scanner,
            Utc::now(),
            2.5,
        )
        .unwrap_err();
        assert_eq!(err, BuySignalError::MultiplierOutOfRange(2.5));
    }

    #[test]
    fn bypass_strategies_match_spec_gate_4() {
        assert!(SignalType::MomentumContinuation.bypasses_rsi_guard());
        assert!(SignalType::WatchlistConviction.bypasses_rsi_guard());
        assert!(SignalType::OrbBreakout.bypasses_rsi_guard());
        assert!(!SignalType::GoldenCross.bypasses_rsi_guard());
    }

    #[test]
    fn serializes_signal_type_as_spec_tag() {
        let json = serde_json::to_string(&SignalType::MomentumContinuation).unwrap();
        assert_eq!(json, "\"MOMENTUM_CONTINUATION\"");
    }
}
