// =============================================================================
// Position sizing — target quantity from hybrid_score-tiered base weight,
// the signal's own position_multiplier, and the macro position_multiplier,
// clamped to what cash actually allows (spec §4.4).
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizingOutcome {
    Quantity(u64),
    TooSmall,
}

/// Base weight tier, keyed by hybrid_score (spec §4.4 example values).
fn base_weight(hybrid_score: f64) -> f64 {
    if hybrid_score >= 80.0 {
        0.12
    } else if hybrid_score >= 70.0 {
        0.09
    } else if hybrid_score >= 60.0 {
        0.06
    } else {
        0.03
    }
}

/// Computes the target buy quantity for a candidate signal.
///
/// `notional_cap` is the maximum amount of cash usable for this single
/// trade (already reduced for whatever cash floor the Portfolio Guard
/// requires to remain untouched). Returns `TooSmall` when the resulting
/// quantity would be zero or the notional falls under
/// `min_viable_notional`.
pub fn size_position(
    hybrid_score: f64,
    signal_position_multiplier: f64,
    context_position_multiplier: f64,
    total_asset: f64,
    notional_cap: f64,
    price: f64,
    min_viable_notional: f64,
) -> SizingOutcome {
    if price <= 0.0 {
        return SizingOutcome::TooSmall;
    }
    let target_notional = base_weight(hybrid_score)
        * signal_position_multiplier
        * context_position_multiplier
        * total_asset;
    let notional = target_notional.min(notional_cap);
    if notional < min_viable_notional {
        return SizingOutcome::TooSmall;
    }
    let quantity = (notional / price).floor() as u64;
    if quantity == 0 {
        SizingOutcome::TooSmall
    } else {
        SizingOutcome::Quantity(quantity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_hybrid_score_gets_largest_base_weight() {
        let outcome = size_position(82.0, 1.0, 1.0, 10_000_000.0, 10_000_000.0, 72_100.0, 100_000.0);
        assert_eq!(outcome, SizingOutcome::Quantity(16));
    }

    #[test]
    fn notional_cap_clamps_below_tiered_target() {
        let outcome = size_position(82.0, 1.0, 1.0, 10_000_000.0, 500_000.0, 72_100.0, 100_000.0);
        assert_eq!(outcome, SizingOutcome::Quantity(6));
    }

    #[test]
    fn below_minimum_viable_notional_rejects() {
        let outcome = size_position(62.0, 1.0, 1.0, 1_000_000.0, 1_000_000.0, 72_100.0, 100_000.0);
        assert_eq!(outcome, SizingOutcome::TooSmall);
    }

    #[test]
    fn zero_price_is_too_small() {
        let outcome = size_position(90.0, 1.0, 1.0, 10_000_000.0, 10_000_000.0, 0.0, 100_000.0);
        assert_eq!(outcome, SizingOutcome::TooSmall);
    }
}
