// =============================================================================
// price-monitor — for every held position, runs the ordered 12-rule exit
// chain against live ticks and publishes SellOrders for whatever fires
// (spec §4.3). Holds no brokerage credential; the Gateway is the only
// thing it ever calls over HTTP, for the periodic balance reconciliation
// and for aligning WebSocket subscriptions to the held set. Structured the
// way the Buy Scanner structures its own stream-reader / bounded-queue /
// worker-pool wiring in `buy-scanner/src/main.rs`, since both consume from
// `stream:ticks` under the same at-most-once, per-code-ring discipline;
// this process uses its own consumer group (`group:monitor`) so the two
// components each see every tick independently.
// =============================================================================

mod bar_ring;
mod config;
mod exit_chain;
mod indicators;
mod reconciliation;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use domain::position::Position;
use domain::regime::TradingContext;
use domain::sell_order::SellOrder;
use domain::stock_code::StockCode;
use domain::tick::PriceTick;
use gateway_client::GatewayClient;
use risk_fabric::bus::Delivered;
use risk_fabric::cache::keys;
use risk_fabric::{MessageBus, TypedCache};
use tokio::sync::{mpsc, Mutex as AsyncMutex, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bar_ring::BarRing;
use config::Config;
use exit_chain::PositionContext;

const STREAM_TICKS: &str = "stream:ticks";
const GROUP_MONITOR: &str = "group:monitor";
const STREAM_SELL_ORDERS: &str = "stream:sell-orders";

/// A code's last-computed MA5/MA20 pair, kept across ticks so the Death
/// Cross rule can detect an actual crossing rather than just a snapshot
/// comparison (spec §4.3 rule 9 "MA5 crosses below MA20").
#[derive(Clone, Copy, Default)]
struct MaHistory {
    ma5: Option<f64>,
    ma20: Option<f64>,
}

struct SharedState {
    positions: RwLock<HashMap<String, Position>>,
    context: RwLock<TradingContext>,
    ma_history: RwLock<HashMap<String, MaHistory>>,
}

/// Per-code in-process mutex, same shape as the Buy/Sell Executors'
/// `CodeLocks`: serializes the read-evaluate-write sequence for one stock
/// code while letting every other code's worker proceed concurrently. The
/// Monitor has no distributed lock counterpart since only this process
/// ever mutates `high_watermark`/`stop_loss_price`.
#[derive(Default)]
struct CodeLocks {
    inner: parking_lot::Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl CodeLocks {
    fn get(&self, code: &str) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock();
        map.entry(code.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env();
    info!(service = "price-monitor", consumer = %config.consumer_name, "starting");

    let bus = Arc::new(connect_with_retry(&config).await?);
    bus.ensure_group(STREAM_TICKS, GROUP_MONITOR)
        .await
        .context("failed to ensure consumer group")?;

    let cache = TypedCache::connect(&config.redis_url)
        .await
        .context("failed to connect typed cache")?;
    let gateway = Arc::new(GatewayClient::new(
        config.gateway_base_url.clone(),
        config.gateway_http_timeout,
    ));

    let state = Arc::new(SharedState {
        positions: RwLock::new(HashMap::new()),
        context: RwLock::new(TradingContext::fallback(Utc::now().date_naive())),
        ma_history: RwLock::new(HashMap::new()),
    });
    let bars = Arc::new(BarRing::new());
    let code_locks = Arc::new(CodeLocks::default());

    reload_context(&cache, &state).await;
    run_reconciliation(&config, &cache, &gateway, &state).await;

    spawn_reconciliation_loop(config.clone(), cache.clone(), gateway.clone(), state.clone());

    let (tx, rx) = mpsc::channel::<Delivered<PriceTick>>(config.work_queue_capacity);
    let rx = Arc::new(AsyncMutex::new(rx));

    spawn_reclaim(config.clone(), bus.clone(), tx.clone());

    for worker_id in 0..config.worker_count {
        let rx = rx.clone();
        let bars = bars.clone();
        let state = state.clone();
        let bus = bus.clone();
        let cache = cache.clone();
        let config = config.clone();
        let code_locks = code_locks.clone();
        tokio::spawn(async move {
            worker_loop(worker_id, rx, bars, state, bus, cache, code_locks, config).await;
        });
    }

    reader_loop(config, bus, tx).await;
    Ok(())
}

async fn connect_with_retry(config: &Config) -> Result<MessageBus> {
    let deadline = tokio::time::Instant::now() + config.startup_retry_deadline;
    let mut delay = Duration::from_millis(500);
    loop {
        match MessageBus::connect(&config.redis_url).await {
            Ok(bus) => return Ok(bus),
            Err(e) if tokio::time::Instant::now() < deadline => {
                warn!(error = %e, "redis not ready yet, retrying");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(Duration::from_secs(5));
            }
            Err(e) => return Err(e).context("redis connection failed past startup deadline"),
        }
    }
}

async fn reload_context(cache: &TypedCache, state: &SharedState) {
    match cache.get_json::<TradingContext>(&keys::trading_context()).await {
        Ok(Some(ctx)) => *state.context.write().await = ctx.sanitized(),
        Ok(None) => {
            *state.context.write().await = TradingContext::fallback(Utc::now().date_naive());
        }
        Err(e) => warn!(error = %e, "failed to read trading context cache"),
    }
}

/// Reloads held positions from the brokerage-reconciled source of truth,
/// aligns Gateway subscriptions to the new held set, and purges metadata
/// for anything the monitor previously tracked but the brokerage no longer
/// reports (spec §4.3 "Reconciliation").
async fn run_reconciliation(
    config: &Config,
    cache: &TypedCache,
    gateway: &GatewayClient,
    state: &SharedState,
) {
    let previously_held: HashSet<String> = state.positions.read().await.keys().cloned().collect();

    let (codes, live_codes) = reconciliation::reconcile(
        cache,
        gateway,
        config.position_cache_ttl,
        config.positions_live_ttl,
    )
    .await;

    let mut fresh = HashMap::with_capacity(codes.len());
    for code in &codes {
        if let Ok(Some(pos)) = cache.get_json::<Position>(&keys::position(code.as_str())).await {
            fresh.insert(code.as_str().to_string(), pos);
        }
    }

    let departed: Vec<StockCode> = previously_held
        .iter()
        .filter(|c| !live_codes.contains(*c))
        .filter_map(|c| StockCode::new(c.clone()).ok())
        .collect();
    reconciliation::purge_departed(cache, &departed, &live_codes).await;

    let current_codes: HashSet<String> = fresh.keys().cloned().collect();
    let to_subscribe: Vec<String> = current_codes.difference(&previously_held).cloned().collect();
    let to_unsubscribe: Vec<String> = previously_held.difference(&current_codes).cloned().collect();
    if !to_subscribe.is_empty() {
        if let Err(e) = gateway.subscribe(&to_subscribe).await {
            warn!(error = %e, count = to_subscribe.len(), "subscribe diff failed");
        }
    }
    if !to_unsubscribe.is_empty() {
        if let Err(e) = gateway.unsubscribe(&to_unsubscribe).await {
            warn!(error = %e, count = to_unsubscribe.len(), "unsubscribe diff failed");
        }
    }

    info!(held = fresh.len(), "reconciliation complete");
    *state.positions.write().await = fresh;
}

fn spawn_reconciliation_loop(
    config: Config,
    cache: TypedCache,
    gateway: Arc<GatewayClient>,
    state: Arc<SharedState>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.reconciliation_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            run_reconciliation(&config, &cache, &gateway, &state).await;
            reload_context(&cache, &state).await;
        }
    });
}

fn spawn_reclaim(config: Config, bus: Arc<MessageBus>, tx: mpsc::Sender<Delivered<PriceTick>>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.reclaim_interval);
        loop {
            ticker.tick().await;
            match bus
                .reclaim_pending::<PriceTick>(
                    STREAM_TICKS,
                    GROUP_MONITOR,
                    &config.consumer_name,
                    config.reclaim_min_idle,
                    config.batch_size,
                )
                .await
            {
                Ok(reclaimed) if !reclaimed.is_empty() => {
                    info!(count = reclaimed.len(), "reclaimed pending tick entries");
                    for d in reclaimed {
                        if tx.send(d).await.is_err() {
                            error!("worker channel closed, dropping reclaimed entries");
                            return;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reclaim pass failed"),
            }
        }
    });
}

async fn reader_loop(config: Config, bus: Arc<MessageBus>, tx: mpsc::Sender<Delivered<PriceTick>>) {
    loop {
        match bus
            .read_group::<PriceTick>(
                STREAM_TICKS,
                GROUP_MONITOR,
                &config.consumer_name,
                config.batch_size,
                Duration::from_secs(2),
            )
            .await
        {
            Ok(delivered) => {
                for d in delivered {
                    if tx.send(d).await.is_err() {
                        error!("worker channel closed, stopping reader");
                        return;
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "stream read failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<Delivered<PriceTick>>>>,
    bars: Arc<BarRing>,
    state: Arc<SharedState>,
    bus: Arc<MessageBus>,
    cache: TypedCache,
    code_locks: Arc<CodeLocks>,
    config: Config,
) {
    loop {
        let delivered = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(delivered) = delivered else { return };
        let tick = delivered.payload;
        let minute_ts = tick.timestamp.timestamp() / 60;
        bars.update(&tick.stock_code, minute_ts, tick.price, tick.volume);

        let lock = code_locks.get(tick.stock_code.as_str());
        let _guard = lock.lock().await;
        if let Err(e) = process_tick(&tick, &bars, &state, &bus, &cache, &config).await {
            error!(worker_id, stock_code = %tick.stock_code, error = %e, "failed to process tick");
        }
    }
}

/// Runs one tick's evaluation for a single code, called with that code's
/// `CodeLocks` entry held so concurrent redelivery of the same code can
/// never interleave. Only ever holds `state.positions`'s lock long enough
/// to clone the current snapshot out and, at the end, write the updated
/// one back in — the exit-chain evaluation and the cache/bus round-trips
/// in between run without blocking any other code's worker.
async fn process_tick(
    tick: &PriceTick,
    bars: &BarRing,
    state: &SharedState,
    bus: &MessageBus,
    cache: &TypedCache,
    config: &Config,
) -> Result<()> {
    let code = tick.stock_code.as_str().to_string();

    let Some(mut position) = state.positions.read().await.get(&code).cloned() else {
        return Ok(());
    };

    let bar_history = bars.bars(&tick.stock_code);
    if bar_history.len() < config.min_required_bars {
        return Ok(());
    }
    let closes = bars.closes(&tick.stock_code);

    let rsi = indicators::current_rsi(&closes, config.rsi_period);
    let atr = indicators::atr(&bar_history, config.atr_period);
    let ma5 = indicators::sma(&closes, config.ma_short_period);
    let ma20 = indicators::sma(&closes, config.ma_long_period);

    let (prev_ma5, prev_ma20) = {
        let mut history = state.ma_history.write().await;
        let entry = history.entry(code.clone()).or_default();
        let prev = (entry.ma5, entry.ma20);
        entry.ma5 = ma5;
        entry.ma20 = ma20;
        prev
    };

    let hwm_before = position.high_watermark;
    let stop_before = position.stop_loss_price;
    position.bump_high_watermark(tick.price);
    if let Some(atr) = atr {
        position.stop_loss_price = position.average_buy_price - atr * config.exit_chain.atr_stop_multiplier;
    }
    let position_changed = position.high_watermark != hwm_before || position.stop_loss_price != stop_before;

    let context = state.context.read().await.clone();
    let now = Utc::now();
    let holding_days = position.holding_days(now);

    let ctx = PositionContext {
        position: &position,
        current_price: tick.price,
        holding_days,
        rsi,
        atr,
        ma5,
        ma20,
        prev_ma5,
        prev_ma20,
        trading_context: &context,
    };

    let decision = exit_chain::evaluate(&ctx, &config.exit_chain);

    let order = decision.map(|decision| {
        let sell_quantity =
            ((position.quantity as f64 * decision.sell_fraction).floor() as u64).clamp(1, position.quantity);
        let mut order = SellOrder::new(
            tick.stock_code.clone(),
            position.stock_name.clone(),
            decision.reason,
            tick.price,
            sell_quantity,
            now,
        )
        .expect("sell_quantity is clamped to at least 1");
        order.buy_price = Some(position.average_buy_price);
        order.profit_pct = Some(position.profit_pct(tick.price));
        order.holding_days = Some(holding_days);
        order
    });

    // Write the bumped high_watermark/stop_loss_price back into the
    // in-memory map and through to the cache opportunistically — the only
    // two `Position` fields the Monitor is allowed to mutate (spec §3) —
    // regardless of whether a rule fired this tick.
    if position_changed {
        state.positions.write().await.insert(code, position.clone());
        if let Err(e) = cache
            .set_json(&keys::position(tick.stock_code.as_str()), &position, config.position_cache_ttl)
            .await
        {
            warn!(stock_code = %tick.stock_code, error = %e, "failed to persist high_watermark/stop_loss_price");
        }
    }

    let Some(order) = order else {
        return Ok(());
    };

    bus.publish(STREAM_SELL_ORDERS, &order)
        .await
        .context("failed to publish sell order")?;
    info!(
        stock_code = %tick.stock_code,
        reason = ?order.sell_reason,
        quantity = order.quantity,
        "sell order published"
    );

    Ok(())
}
