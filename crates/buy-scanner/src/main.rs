// =============================================================================
// buy-scanner — stateless-per-restart signal generator.
//
// Reads `stream:ticks` off the shared bus, keeps a 120-bar ring per code,
// runs all eight strategies on every bar close, and publishes whatever
// survives the nine risk gates to `stream:buy-signals`. Holds no brokerage
// credential and never talks to the venue directly — everything it knows
// about tradability comes from the cached watchlist and trading context
// (spec §4.2). Structured the way the Gateway structures its own
// config/bus/spawn wiring in `gateway/src/main.rs`.
// =============================================================================

mod bar_ring;
mod config;
mod indicators;
mod risk_gates;
mod strategies;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use domain::regime::TradingContext;
use domain::signal::{BuySignal, SignalSource};
use domain::tick::PriceTick;
use domain::watchlist::HotWatchlist;
use gateway_client::GatewayClient;
use risk_fabric::cache::keys;
use risk_fabric::{Cooldowns, MessageBus, TypedCache};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use bar_ring::BarRing;
use config::Config;
use risk_gates::GateState;
use strategies::{StrategyHit, StrategyInput};

const STREAM_TICKS: &str = "stream:ticks";
const GROUP_SCANNER: &str = "group:scanner";
const STREAM_BUY_SIGNALS: &str = "stream:buy-signals";

/// Shared, append-only watchlist + trading-context view, refreshed by the
/// reload task and read by every worker.
struct SharedState {
    watchlist: RwLock<HotWatchlist>,
    context: RwLock<TradingContext>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env();
    info!(service = "buy-scanner", consumer = %config.consumer_name, "starting");

    let bus = Arc::new(connect_with_retry(&config).await?);
    bus.ensure_group(STREAM_TICKS, GROUP_SCANNER)
        .await
        .context("failed to ensure consumer group")?;

    let cache = TypedCache::connect(&config.redis_url)
        .await
        .context("failed to connect typed cache")?;
    let cooldowns = Arc::new(Cooldowns::new(cache.clone()));
    let gateway = Arc::new(GatewayClient::new(
        config.gateway_base_url.clone(),
        config.gateway_http_timeout,
    ));

    let today = Utc::now().date_naive();
    let state = Arc::new(SharedState {
        watchlist: RwLock::new(HotWatchlist {
            generated_at: Utc::now(),
            market_regime: domain::regime::MarketRegime::default(),
            stocks: Vec::new(),
            version: 0,
        }),
        context: RwLock::new(TradingContext::fallback(today)),
    });

    let bars = Arc::new(BarRing::new());
    let gate_state = Arc::new(GateState::new());

    reload_watchlist(&cache, &gateway, &state).await;
    reload_context(&cache, &state).await;

    spawn_watchlist_reload(config.clone(), cache.clone(), gateway.clone(), state.clone());

    let (tx, rx) = mpsc::channel::<risk_fabric::bus::Delivered<PriceTick>>(config.work_queue_capacity);
    let rx = Arc::new(Mutex::new(rx));

    spawn_reclaim(config.clone(), bus.clone(), tx.clone());

    for worker_id in 0..config.worker_count {
        let rx = rx.clone();
        let bars = bars.clone();
        let state = state.clone();
        let gate_state = gate_state.clone();
        let cooldowns = cooldowns.clone();
        let bus = bus.clone();
        let config = config.clone();
        tokio::spawn(async move {
            worker_loop(worker_id, rx, bars, state, gate_state, cooldowns, bus, config).await;
        });
    }

    reader_loop(config, bus, tx).await;

    Ok(())
}

/// Connects to Redis, tolerating a still-loading instance (BUSY/LOADING)
/// for up to `startup_retry_deadline` before giving up (spec §7 startup
/// behavior).
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

async fn reload_watchlist(cache: &TypedCache, gateway: &GatewayClient, state: &SharedState) {
    let fetched: Option<HotWatchlist> = match cache.get_json(&keys::watchlist()).await {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to read watchlist cache");
            return;
        }
    };
    let Some(new_list) = fetched else {
        return;
    };

    let previous: HashSet<String> = {
        let guard = state.watchlist.read().await;
        guard.stocks.iter().map(|e| e.stock_code.to_string()).collect()
    };
    let current: HashSet<String> = new_list.stocks.iter().map(|e| e.stock_code.to_string()).collect();

    let to_subscribe: Vec<String> = current.difference(&previous).cloned().collect();
    let to_unsubscribe: Vec<String> = previous.difference(&current).cloned().collect();

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

    *state.watchlist.write().await = new_list;
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

fn spawn_watchlist_reload(
    config: Config,
    cache: TypedCache,
    gateway: Arc<GatewayClient>,
    state: Arc<SharedState>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.watchlist_reload_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            reload_watchlist(&cache, &gateway, &state).await;
            reload_context(&cache, &state).await;
        }
    });
}

fn spawn_reclaim(
    config: Config,
    bus: Arc<MessageBus>,
    tx: mpsc::Sender<risk_fabric::bus::Delivered<PriceTick>>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.reclaim_interval);
        loop {
            ticker.tick().await;
            match bus
                .reclaim_pending::<PriceTick>(
                    STREAM_TICKS,
                    GROUP_SCANNER,
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

async fn reader_loop(
    config: Config,
    bus: Arc<MessageBus>,
    tx: mpsc::Sender<risk_fabric::bus::Delivered<PriceTick>>,
) {
    loop {
        match bus
            .read_group::<PriceTick>(
                STREAM_TICKS,
                GROUP_SCANNER,
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

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<risk_fabric::bus::Delivered<PriceTick>>>>,
    bars: Arc<BarRing>,
    state: Arc<SharedState>,
    gate_state: Arc<GateState>,
    cooldowns: Arc<Cooldowns>,
    bus: Arc<MessageBus>,
    config: Config,
) {
    loop {
        let delivered = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(delivered) = delivered else {
            return;
        };
        let tick = delivered.payload;
        let minute_ts = tick.timestamp.timestamp() / 60;
        bars.update(&tick.stock_code, minute_ts, tick.price, tick.volume);

        if let Err(e) = process_tick(&tick, &bars, &state, &gate_state, &cooldowns, &bus, &config).await
        {
            error!(worker_id, stock_code = %tick.stock_code, error = %e, "failed to process tick");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_tick(
    tick: &PriceTick,
    bars: &BarRing,
    state: &SharedState,
    gate_state: &GateState,
    cooldowns: &Cooldowns,
    bus: &MessageBus,
    config: &Config,
) -> Result<()> {
    let watchlist = state.watchlist.read().await;
    let Some(entry) = watchlist.find(&tick.stock_code) else {
        return Ok(());
    };
    if !entry.is_tradable {
        return Ok(());
    }
    let entry = entry.clone();
    drop(watchlist);

    let bar_history = bars.bars(&tick.stock_code);
    if bar_history.len() < config.min_required_bars {
        return Ok(());
    }

    let context = state.context.read().await.clone();
    let now = Utc::now();

    let input = StrategyInput {
        bars: &bar_history,
        context: &context,
        entry: &entry,
        now,
        feature_conviction_enabled: config.feature_conviction_enabled,
        feature_orb_enabled: config.feature_orb_enabled,
    };

    let hits: Vec<StrategyHit> = [
        strategies::golden_cross(&input),
        strategies::rsi_rebound(&input),
        strategies::momentum(&input, config.momentum_cap_pct, config.momentum_volume_ratio_threshold),
        strategies::momentum_continuation(&input),
        strategies::dip_buy(&input),
        strategies::volume_breakout(&input),
        strategies::watchlist_conviction(&input),
        strategies::orb_breakout(&input),
    ]
    .into_iter()
    .flatten()
    .collect();

    for hit in hits {
        match risk_gates::evaluate(&hit, &entry, &context, now, config, gate_state, cooldowns).await {
            Ok(()) => publish_signal(&hit, &entry, &context, now, bus, gate_state).await?,
            Err(reason) => {
                info!(stock_code = %tick.stock_code, %reason, "signal rejected by risk gate");
            }
        }
    }

    Ok(())
}

async fn publish_signal(
    hit: &StrategyHit,
    entry: &domain::watchlist::WatchlistEntry,
    context: &TradingContext,
    now: chrono::DateTime<Utc>,
    bus: &MessageBus,
    gate_state: &GateState,
) -> Result<()> {
    let signal = BuySignal::new(
        entry.stock_code.clone(),
        entry.stock_name.clone(),
        hit.signal_type,
        hit.price,
        entry.llm_score,
        entry.hybrid_score,
        entry.trade_tier,
        entry.risk_tag,
        context.regime,
        SignalSource::Scanner,
        now,
        context.position_multiplier,
    );

    let signal = match signal {
        Ok(mut s) => {
            s.rsi_value = hit.rsi_value;
            s.volume_ratio = hit.volume_ratio;
            s.vwap = hit.vwap;
            s
        }
        Err(e) => {
            warn!(stock_code = %entry.stock_code, error = %e, "refusing to publish invalid signal");
            return Ok(());
        }
    };

    bus.publish(STREAM_BUY_SIGNALS, &signal)
        .await
        .context("failed to publish buy signal")?;
    gate_state.record_published(now.date_naive(), entry.stock_code.as_str(), now);
    info!(stock_code = %entry.stock_code, signal_type = ?hit.signal_type, "buy signal published");
    Ok(())
}
