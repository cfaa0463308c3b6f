// =============================================================================
// MarketRegime / TradingContext — macro-regime artifacts published by the
// external Macro Council pipeline and consumed read-only by the core.
// =============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

/// Macro regime classification. Assigned externally; the core never computes
/// this value, only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketRegime {
    #[serde(rename = "STRONG_BULL")]
    StrongBull,
    #[serde(rename = "BULL")]
    Bull,
    #[serde(rename = "SIDEWAYS")]
    Sideways,
    #[serde(rename = "BEAR")]
    Bear,
    #[serde(rename = "STRONG_BEAR")]
    StrongBear,
}

impl fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StrongBull => "STRONG_BULL",
            Self::Bull => "BULL",
            Self::Sideways => "SIDEWAYS",
            Self::Bear => "BEAR",
            Self::StrongBear => "STRONG_BEAR",
        };
        write!(f, "{s}")
    }
}

impl Default for MarketRegime {
    fn default() -> Self {
        Self::Sideways
    }
}

/// VIX-derived volatility bucket, part of `TradingContext`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VixRegime {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "elevated")]
    Elevated,
    #[serde(rename = "crisis")]
    Crisis,
}

impl Default for VixRegime {
    fn default() -> Self {
        Self::Normal
    }
}

/// Macro-regime artifact cached at `macro:trading_context` with a 1 h TTL.
/// Read-only for every core component; defaults apply when the cache entry
/// is absent or expired (see `TradingContext::fallback`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingContext {
    pub date: chrono::NaiveDate,
    pub regime: MarketRegime,
    pub position_multiplier: f64,
    pub stop_loss_multiplier: f64,
    pub vix_regime: VixRegime,
    pub risk_off_level: u8,
    #[serde(default)]
    pub favor_sectors: Vec<String>,
    #[serde(default)]
    pub avoid_sectors: Vec<String>,
    pub is_high_volatility: bool,
}

impl TradingContext {
    /// The spec-mandated fallback when no context is published: SIDEWAYS,
    /// position_multiplier 0.8, stop_loss_multiplier 1.2.
    pub fn fallback(date: chrono::NaiveDate) -> Self {
        Self {
            date,
            regime: MarketRegime::Sideways,
            position_multiplier: 0.8,
            stop_loss_multiplier: 1.2,
            vix_regime: VixRegime::Normal,
            risk_off_level: 0,
            favor_sectors: Vec::new(),
            avoid_sectors: Vec::new(),
            is_high_volatility: false,
        }
    }

    /// Clamp multipliers into their documented ranges. Called after
    /// deserializing an externally-published context, since the core must
    /// not trust an upstream value blindly (spec §7 fail-fast boundaries).
    pub fn sanitized(mut self) -> Self {
        self.position_multiplier = self.position_multiplier.clamp(0.3, 2.0);
        self.stop_loss_multiplier = self.stop_loss_multiplier.clamp(0.3, 2.0);
        self.risk_off_level = self.risk_off_level.min(10);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_tags() {
        assert_eq!(MarketRegime::StrongBull.to_string(), "STRONG_BULL");
        assert_eq!(MarketRegime::StrongBear.to_string(), "STRONG_BEAR");
    }

    #[test]
    fn fallback_matches_spec_defaults() {
        let ctx = TradingContext::fallback(chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap());
        assert_eq!(ctx.regime, MarketRegime::Sideways);
        assert!((ctx.position_multiplier - 0.8).abs() < f64::EPSILON);
        assert!((ctx.stop_loss_multiplier - 1.2).abs() < f64::EPSILON);
    }

    #[test]
    fn sanitized_clamps_out_of_range_multipliers() {
        let mut ctx = TradingContext::fallback(chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap());
        ctx.position_multiplier = 5.0;
        ctx.stop_loss_multiplier = 0.0;
        ctx.risk_off_level = 200;
        let ctx = ctx.sanitized();
        assert!((ctx.position_multiplier - 2.0).abs() < f64::EPSILON);
        assert!((ctx.stop_loss_multiplier - 0.3).abs() < f64::EPSILON);
        assert_eq!(ctx.risk_off_level, 10);
    }

    #[test]
    fn roundtrips_through_json() {
        let ctx = TradingContext::fallback(chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap());
        let json = serde_json::to_string(&ctx).unwrap();
        let back: TradingContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back.regime, ctx.regime);
    }
}
