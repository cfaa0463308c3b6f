// =============================================================================
// WatchlistEntry / HotWatchlist — the Scout-published set of tradable codes.
// Read-only for every core component; only Scout may replace the active
// HotWatchlist.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::regime::MarketRegime;
use crate::stock_code::StockCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeTier {
    #[serde(rename = "TIER1")]
    Tier1,
    #[serde(rename = "TIER2")]
    Tier2,
    #[serde(rename = "BLOCKED")]
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskTag {
    #[serde(rename = "BULLISH")]
    Bullish,
    #[serde(rename = "NEUTRAL")]
    Neutral,
    #[serde(rename = "CAUTION")]
    Caution,
    #[serde(rename = "DISTRIBUTION_RISK")]
    DistributionRisk,
}

/// One watchlist slot. Construction enforces the two cross-field invariants
/// the spec names explicitly so no caller can build an inconsistent entry:
/// `trade_tier == BLOCKED ⇒ is_tradable == false`, and
/// `risk_tag == DISTRIBUTION_RISK ⇒ veto_applied == true ∧ is_tradable == false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub stock_code: StockCode,
    pub stock_name: String,
    pub hybrid_score: f64,
    pub llm_score: f64,
    pub is_tradable: bool,
    pub trade_tier: TradeTier,
    pub risk_tag: RiskTag,
    pub rank: u32,
    pub sector_group: String,
    pub veto_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchlistEntryError {
    #[error("trade_tier is BLOCKED but is_tradable is true for {0}")]
    BlockedButTradable(String),
    #[error("risk_tag is DISTRIBUTION_RISK but veto/tradable flags are inconsistent for {0}")]
    DistributionRiskNotVetoed(String),
    #[error("hybrid_score/llm_score out of [0, 100] range for {0}")]
    ScoreOutOfRange(String),
}

impl WatchlistEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stock_code: StockCode,
        stock_name: impl Into<String>,
        hybrid_score: f64,
        llm_score: f64,
        is_tradable: bool,
        trade_tier: TradeTier,
        risk_tag: RiskTag,
        rank: u32,
        sector_group: impl Into<String>,
        veto_applied: bool,
    ) -> Result<Self, WatchlistEntryError> {
        let code_str = stock_code.to_string();

        if !(0.0..=100.0).contains(&hybrid_score) || !(0.0..=100.0).contains(&llm_score) {
            return Err(WatchlistEntryError::ScoreOutOfRange(code_str));
        }
        if trade_tier == TradeTier::Blocked && is_tradable {
            return Err(WatchlistEntryError::BlockedButTradable(code_str));
        }
        if risk_tag == RiskTag::DistributionRisk && (!veto_applied || is_tradable) {
            return Err(WatchlistEntryError::DistributionRiskNotVetoed(code_str));
        }

        Ok(Self {
            stock_code,
            stock_name: stock_name.into(),
            hybrid_score,
            llm_score,
            is_tradable,
            trade_tier,
            risk_tag,
            rank,
            sector_group: sector_group.into(),
            veto_applied,
        })
    }
}

/// The active watchlist snapshot at `watchlist:active` (24 h TTL). Replacement
/// semantics: the cache holds exactly one version at a time, this struct is
/// that whole version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotWatchlist {
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub market_regime: MarketRegime,
    pub stocks: Vec<WatchlistEntry>,
    pub version: u64,
}

impl HotWatchlist {
    pub fn find(&self, code: &StockCode) -> Option<&WatchlistEntry> {
        self.stocks.iter().find(|e| &e.stock_code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> StockCode {
        StockCode::new(s).unwrap()
    }

    #[test]
    fn blocked_tier_requires_not_tradable() {
        let err = WatchlistEntry::new(
            code("000660"),
            "SK Hynix",
            50.0,
            50.0,
            true,
            TradeTier::Blocked,
            RiskTag::Neutral,
            1,
            "semiconductors",
            false,
        )
        .unwrap_err();
        assert_eq!(
            err,
            WatchlistEntryError::BlockedButTradable("000660".to_string())
        );
    }

    #[test]
    fn distribution_risk_requires_veto_and_not_tradable() {
        let err = WatchlistEntry::new(
            code("000660"),
            "SK Hynix",
            50.0,
            50.0,
            true,
            TradeTier::Tier2,
            RiskTag::DistributionRisk,
            1,
            "semiconductors",
            false,
        )
        .unwrap_err();
        assert_eq!(
            err,
            WatchlistEntryError::DistributionRiskNotVetoed("000660".to_string())
        );
    }

    #[test]
    fn valid_entry_constructs() {
        let entry = WatchlistEntry::new(
            code("005930"),
            "Samsung Electronics",
            78.0,
            72.0,
            true,
            TradeTier::Tier1,
            RiskTag::Neutral,
            1,
            "semiconductors",
            false,
        )
        .unwrap();
        assert_eq!(entry.stock_code.as_str(), "005930");
    }

    #[test]
    fn score_out_of_range_rejected() {
        let err = WatchlistEntry::new(
            code("005930"),
            "Samsung Electronics",
            150.0,
            72.0,
            true,
            TradeTier::Tier1,
            RiskTag::Neutral,
            1,
            "semiconductors",
            false,
        )
        .unwrap_err();
        assert_eq!(
            err,
            WatchlistEntryError::ScoreOutOfRange("005930".to_string())
        );
    }

    #[test]
    fn hot_watchlist_find_by_code() {
        let entry = WatchlistEntry::new(
            code("005930"),
            "Samsung Electronics",
            78.0,
            72.0,
            true,
            TradeTier::Tier1,
            RiskTag::Neutral,
            1,
            "semiconductors",
            false,
        )
        .unwrap();
        let list = HotWatchlist {
            generated_at: chrono::Utc::now(),
            market_regime: MarketRegime::Bull,
            stocks: vec![entry],
            version: 1,
        };
        assert!(list.find(&code("005930")).is_some());
        assert!(list.find(&code("000660")).is_none());
    }
}
