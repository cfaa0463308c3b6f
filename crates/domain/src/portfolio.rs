// =============================================================================
// PortfolioState — derived snapshot of the account. Never stored
// authoritatively; always reconstructed on read from the brokerage plus
// local position metadata.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::position::Position;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioState {
    pub positions: Vec<Position>,
    pub cash_balance: f64,
    pub total_asset: f64,
    pub stock_eval_amount: f64,
    pub position_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl PortfolioState {
    pub fn cash_ratio(&self) -> f64 {
        if self.total_asset <= 0.0 {
            return 0.0;
        }
        self.cash_balance / self.total_asset
    }

    /// Current exposure to a sector, as a fraction of `total_asset`, derived
    /// from each held position's `total_buy_amount` (used by the Portfolio
    /// Guard's sector-concentration check).
    pub fn sector_exposure_pct(&self, sector_group: &str) -> f64 {
        if self.total_asset <= 0.0 {
            return 0.0;
        }
        let exposure: f64 = self
            .positions
            .iter()
            .filter(|p| p.sector_group == sector_group)
            .map(|p| p.total_buy_amount)
            .sum();
        exposure / self.total_asset * 100.0
    }

    /// Largest single-stock exposure as a fraction of `total_asset`, used by
    /// the Portfolio Guard's single-stock-concentration check.
    pub fn max_single_stock_exposure_pct(&self) -> f64 {
        if self.total_asset <= 0.0 {
            return 0.0;
        }
        self.positions
            .iter()
            .map(|p| p.total_buy_amount / self.total_asset * 100.0)
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock_code::StockCode;

    fn position(sector: &str, amount: f64) -> Position {
        let mut pos = Position::open(
            StockCode::new("005930").unwrap(),
            "Samsung",
            1,
            amount,
            sector,
            amount * 0.9,
            Utc::now(),
        )
        .unwrap();
        pos.total_buy_amount = amount;
        pos
    }

    #[test]
    fn cash_ratio_computed_from_balance_and_total() {
        let state = PortfolioState {
            positions: vec![],
            cash_balance: 2_400_000.0,
            total_asset: 10_000_000.0,
            stock_eval_amount: 7_600_000.0,
            position_count: 0,
            timestamp: Utc::now(),
        };
        assert!((state.cash_ratio() - 0.24).abs() < 1e-9);
    }

    #[test]
    fn sector_exposure_sums_matching_positions_only() {
        let state = PortfolioState {
            positions: vec![position("semis", 1_000_000.0), position("autos", 500_000.0)],
            cash_balance: 0.0,
            total_asset: 10_000_000.0,
            stock_eval_amount: 1_500_000.0,
            position_count: 2,
            timestamp: Utc::now(),
        };
        assert!((state.sector_exposure_pct("semis") - 10.0).abs() < 1e-9);
        assert!((state.sector_exposure_pct("chemicals") - 0.0).abs() < 1e-9);
    }

    #[test]
    fn max_single_stock_exposure_takes_largest() {
        let state = PortfolioState {
            positions: vec![position("semis", 1_000_000.0), position("autos", 2_500_000.0)],
            cash_balance: 0.0,
            total_asset: 10_000_000.0,
            stock_eval_amount: 3_500_000.0,
            position_count: 2,
            timestamp: Utc::now(),
        };
        assert!((state.max_single_stock_exposure_pct() - 25.0).abs() < 1e-9);
    }
}
