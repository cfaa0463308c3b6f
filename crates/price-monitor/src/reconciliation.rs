// =============================================================================
// Reconciliation — merges the brokerage's authoritative balance with the
// locally-owned position metadata (spec §4.3 "Position cache"). Runs at
// startup and on every 30 s reconciliation tick. Grounded on the Buy
// Executor's persist step (same `cache:position:{code}` entry, same
// "sector_group from the watchlist, falling back to a lookup" shape) and
// the Buy Scanner's watchlist-diff reload (subscribe/unsubscribe on the
// delta rather than the full set every time).
// =============================================================================

use std::collections::HashSet;

use chrono::Utc;
use domain::position::Position;
use domain::stock_code::StockCode;
use gateway_client::GatewayClient;
use risk_fabric::cache::keys;
use risk_fabric::TypedCache;
use tracing::{info, warn};

/// Reloads the brokerage's authoritative position list and merges it
/// against the locally-cached metadata for each code. Returns the
/// reconciled set of codes to subscribe on the Gateway's tick feed
/// alongside the raw `live_codes` set, which the caller uses (together with
/// its own previously-held set) to decide what to purge via
/// `purge_departed`.
pub async fn reconcile(
    cache: &TypedCache,
    gateway: &GatewayClient,
    position_cache_ttl: std::time::Duration,
    positions_live_ttl: std::time::Duration,
) -> (Vec<StockCode>, HashSet<String>) {
    let balance = match gateway.balance().await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "reconciliation: failed to fetch brokerage balance");
            return (Vec::new(), HashSet::new());
        }
    };

    let mut live_codes = HashSet::new();
    let mut merged = Vec::with_capacity(balance.positions.len());

    for brokerage_pos in &balance.positions {
        let code = brokerage_pos.stock_code.clone();
        live_codes.insert(code.as_str().to_string());

        let key = keys::position(code.as_str());
        let merged_pos = match cache.get_json::<Position>(&key).await {
            Ok(Some(mut local)) => {
                // Brokerage is authoritative for quantity/price; local
                // metadata (sector, high-watermark, stop-loss, bought_at,
                // scale_out_level) survives the merge untouched.
                local.quantity = brokerage_pos.quantity;
                local.average_buy_price = brokerage_pos.average_buy_price;
                local.total_buy_amount = brokerage_pos.total_buy_amount;
                local.bump_high_watermark(brokerage_pos.average_buy_price);
                local
            }
            Ok(None) => {
                info!(stock_code = %code, "reconciliation: brokerage holds a code with no local metadata, seeding minimal entry");
                let mut fresh = brokerage_pos.clone();
                fresh.high_watermark = fresh.high_watermark.max(fresh.average_buy_price);
                if fresh.stop_loss_price <= 0.0 {
                    fresh.stop_loss_price = fresh.average_buy_price * 0.94;
                }
                fresh
            }
            Err(e) => {
                warn!(stock_code = %code, error = %e, "reconciliation: failed to read local position cache");
                continue;
            }
        };

        if let Err(e) = cache.set_json(&key, &merged_pos, position_cache_ttl).await {
            warn!(stock_code = %code, error = %e, "reconciliation: failed to persist merged position");
        }
        merged.push(merged_pos);
    }

    publish_aggregate(cache, &merged, positions_live_ttl).await;

    (merged.into_iter().map(|p| p.stock_code).collect(), live_codes)
}

/// Removes any previously-held code's metadata once the brokerage no
/// longer reports it (spec §4.3 "If a held code is no longer in the
/// brokerage record ... purge local metadata"). Scans only the codes the
/// caller already knows it held locally in-process, passed in via
/// `known_local_codes`, to avoid a full `SCAN` over every `cache:position:*`
/// key on every 30 s tick.
pub async fn purge_departed(cache: &TypedCache, known_local_codes: &[StockCode], live_codes: &HashSet<String>) {
    for code in known_local_codes {
        if !live_codes.contains(code.as_str()) {
            cache.delete(&keys::position(code.as_str())).await.ok();
            info!(stock_code = %code, "reconciliation: position closed outside the core, purged local metadata");
        }
    }
}

async fn publish_aggregate(cache: &TypedCache, positions: &[Position], ttl: std::time::Duration) {
    #[derive(serde::Serialize)]
    struct PositionsLive<'a> {
        positions: &'a [Position],
        updated_at: chrono::DateTime<Utc>,
    }
    let payload = PositionsLive {
        positions,
        updated_at: Utc::now(),
    };
    if let Err(e) = cache.set_json(&keys::positions_live(), &payload, ttl).await {
        warn!(error = %e, "failed to publish positions:live aggregate");
    }
}
