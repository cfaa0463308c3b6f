// =============================================================================
// Tick alignment — KRX won-denominated price steps. The venue rejects any
// limit price that doesn't land on its tick ladder, so a MOMENTUM-family
// limit order's computed price must be rounded down to the nearest valid
// step before it's submitted (spec §4.4 "Tick alignment respects the
// venue's step rules").
// =============================================================================

/// KRX's price-to-tick-size ladder, ascending by price floor.
const TICK_LADDER: &[(f64, f64)] = &[
    (0.0, 1.0),
    (1_000.0, 5.0),
    (5_000.0, 10.0),
    (10_000.0, 50.0),
    (50_000.0, 100.0),
    (100_000.0, 500.0),
    (500_000.0, 1_000.0),
];

fn tick_size_for(price: f64) -> f64 {
    TICK_LADDER
        .iter()
        .rev()
        .find(|(floor, _)| price >= *floor)
        .map(|(_, step)| *step)
        .unwrap_or(1.0)
}

/// Rounds `price` down to the nearest valid tick for its price band.
pub fn align_to_tick(price: f64) -> f64 {
    let step = tick_size_for(price);
    (price / step).floor() * step
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_within_same_band() {
        assert_eq!(align_to_tick(72_137.0), 72_100.0);
    }

    #[test]
    fn aligns_at_band_boundary() {
        assert_eq!(align_to_tick(100_000.0), 100_000.0);
        assert_eq!(align_to_tick(99_999.0), 99_900.0);
    }

    #[test]
    fn aligns_low_price_band() {
        assert_eq!(align_to_tick(987.0), 987.0);
        assert_eq!(align_to_tick(4_321.0), 4_320.0);
    }
}
