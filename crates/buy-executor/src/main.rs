// =============================================================================
// buy-executor — consumes BuySignals, enforces the nine pre-order gates,
// sizes and places the order, confirms the fill, and persists the Position.
//
// Per-code mutex map serializes processing for one stock code while
// different codes run fully in parallel across the worker pool (spec §5
// "Executors": one stream-reader, per-code mutex map, bounded worker pool).
// =============================================================================

mod config;
mod confirm;
mod pre_checks;
mod sizing;
mod tick_align;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use domain::position::Position;
use domain::regime::TradingContext;
use domain::signal::BuySignal;
use domain::trade_record::TradeRecord;
use gateway_client::GatewayClient;
use risk_fabric::cache::keys;
use risk_fabric::{bus::Delivered, Cooldowns, CorrelationCache, DistributedLock, MessageBus, TradeLog, TypedCache};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use confirm::FillOutcome;

const STREAM_BUY_SIGNALS: &str = "stream:buy-signals";
const GROUP_BUY_EXECUTOR: &str = "group:buy-executor";

/// Lazily-created per-code tokio mutexes, so two signals for different
/// codes never block each other but two for the same code strictly
/// serialize.
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
    info!(service = "buy-executor", consumer = %config.consumer_name, "starting");

    let bus = Arc::new(MessageBus::connect(&config.redis_url).await.context("bus connect")?);
    bus.ensure_group(STREAM_BUY_SIGNALS, GROUP_BUY_EXECUTOR)
        .await
        .context("ensure consumer group")?;

    let cache = TypedCache::connect(&config.redis_url).await.context("cache connect")?;
    let cooldowns = Arc::new(Cooldowns::new(cache.clone()));
    let trade_log = Arc::new(TradeLog::connect(&config.redis_url).await.context("trade log connect")?);
    let correlation = Arc::new(CorrelationCache::new(cache.clone()));
    let lock_conn = redis::Client::open(config.redis_url.as_str())?
        .get_connection_manager()
        .await
        .context("lock connect")?;
    let lock = Arc::new(DistributedLock::new(lock_conn));
    let gateway = Arc::new(GatewayClient::new(config.gateway_base_url.clone(), config.gateway_http_timeout));
    let code_locks = Arc::new(CodeLocks::default());

    spawn_reclaim(config.clone(), bus.clone());

    let (tx, rx) = mpsc::channel::<Delivered<BuySignal>>(1_000);
    let rx = Arc::new(AsyncMutex::new(rx));

    for _ in 0..config.worker_count {
        let rx = rx.clone();
        let cache = cache.clone();
        let cooldowns = cooldowns.clone();
        let trade_log = trade_log.clone();
        let correlation = correlation.clone();
        let lock = lock.clone();
        let gateway = gateway.clone();
        let code_locks = code_locks.clone();
        let config = config.clone();
        tokio::spawn(async move {
            worker_loop(rx, cache, cooldowns, trade_log, correlation, lock, gateway, code_locks, config).await;
        });
    }

    reader_loop(config, bus, tx).await;
    Ok(())
}

fn spawn_reclaim(config: Config, bus: Arc<MessageBus>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.reclaim_interval);
        loop {
            ticker.tick().await;
            match bus
                .reclaim_pending::<BuySignal>(
                    STREAM_BUY_SIGNALS,
                    GROUP_BUY_EXECUTOR,
                    &config.consumer_name,
                    config.reclaim_min_idle,
                    config.batch_size,
                )
                .await
            {
                Ok(reclaimed) if !reclaimed.is_empty() => {
                    info!(count = reclaimed.len(), "reclaimed pending buy signals; re-checking preconditions");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reclaim pass failed"),
            }
        }
    });
}

async fn reader_loop(config: Config, bus: Arc<MessageBus>, tx: mpsc::Sender<Delivered<BuySignal>>) {
    loop {
        match bus
            .read_group::<BuySignal>(
                STREAM_BUY_SIGNALS,
                GROUP_BUY_EXECUTOR,
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
    rx: Arc<AsyncMutex<mpsc::Receiver<Delivered<BuySignal>>>>,
    cache: TypedCache,
    cooldowns: Arc<Cooldowns>,
    trade_log: Arc<TradeLog>,
    correlation: Arc<CorrelationCache>,
    lock: Arc<DistributedLock>,
    gateway: Arc<GatewayClient>,
    code_locks: Arc<CodeLocks>,
    config: Config,
) {
    loop {
        let delivered = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(delivered) = delivered else { return };
        let signal = delivered.payload;
        let code = signal.stock_code.as_str().to_string();
        let code_mutex = code_locks.get(&code);
        let _code_guard = code_mutex.lock().await;

        if let Err(e) = process_signal(&signal, &cache, &cooldowns, &trade_log, &correlation, &lock, &gateway, &config).await {
            error!(stock_code = %code, error = %e, "failed to process buy signal");
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_signal(
    signal: &BuySignal,
    cache: &TypedCache,
    cooldowns: &Cooldowns,
    trade_log: &TradeLog,
    correlation: &CorrelationCache,
    lock: &DistributedLock,
    gateway: &GatewayClient,
    config: &Config,
) -> Result<()> {
    let code = signal.stock_code.as_str();
    let now = Utc::now();

    // Gate 2: emergency stop flag.
    if cache.exists("emergency:trading_pause").await.unwrap_or(false) {
        info!(stock_code = code, reason = "EMERGENCY_STOP", "buy signal rejected");
        return Ok(());
    }

    let portfolio = match gateway.balance().await {
        Ok(p) => p,
        Err(e) => {
            warn!(stock_code = code, error = %e, "failed to fetch portfolio balance");
            return Ok(());
        }
    };

    let context = cache
        .get_json::<TradingContext>(&keys::trading_context())
        .await
        .ok()
        .flatten()
        .map(|c| c.sanitized())
        .unwrap_or_else(|| TradingContext::fallback(now.date_naive()));

    let date_key = now.date_naive().format("%Y-%m-%d").to_string();
    let daily_buy_count = cache.get_counter(&keys::daily_buy_count(&date_key)).await.unwrap_or(0) as u32;

    let sector_group = resolve_sector(cache, signal, &signal.stock_name).await;

    // Rough notional estimate for the guard's post-trade concentration
    // checks, refined by `sizing::size_position` once the guard passes.
    let candidate_notional = config.guard.stock_cap_pct / 100.0 * portfolio.total_asset;

    let holder = uuid::Uuid::new_v4().to_string();
    let lock_key = keys::buy_lock(code);

    let check = pre_checks::run(
        signal,
        &sector_group,
        &portfolio,
        context.regime,
        daily_buy_count,
        candidate_notional,
        false,
        now,
        config,
        lock,
        &holder,
        cooldowns,
        trade_log,
        correlation,
        gateway,
    )
    .await;

    let outcome = match check {
        Ok(()) => {
            let result = execute_buy(signal, &sector_group, &context, &portfolio, config, gateway, now).await;
            if let Ok(Some(position)) = &result {
                cache
                    .set_json(&keys::position(code), position, config.position_cache_ttl)
                    .await
                    .ok();
            }
            lock.release(&lock_key, &holder).await.ok();
            result
        }
        Err(reject) => {
            info!(stock_code = code, reason = %reject, "buy signal rejected");
            return Ok(());
        }
    };

    match outcome {
        Ok(Some(position)) => {
            cache
                .increment(&keys::daily_buy_count(&date_key), Duration::from_secs(26 * 3600))
                .await
                .ok();
            let record = TradeRecord::buy(
                position.stock_code.clone(),
                position.quantity,
                position.average_buy_price,
                now,
            );
            trade_log.append(&record).await.ok();
            info!(
                stock_code = code,
                quantity = position.quantity,
                avg_price = position.average_buy_price,
                "position opened"
            );
        }
        Ok(None) => {
            info!(stock_code = code, "buy did not fill; no position persisted");
        }
        Err(e) => {
            error!(stock_code = code, error = %e, "buy execution failed");
        }
    }
    Ok(())
}

async fn resolve_sector(cache: &TypedCache, signal: &BuySignal, fallback: &str) -> String {
    if let Ok(Some(watchlist)) = cache
        .get_json::<domain::watchlist::HotWatchlist>(&keys::watchlist())
        .await
    {
        if let Some(entry) = watchlist.find(&signal.stock_code) {
            return entry.sector_group.clone();
        }
    }
    fallback.to_string()
}

async fn execute_buy(
    signal: &BuySignal,
    sector_group: &str,
    context: &TradingContext,
    portfolio: &domain::portfolio::PortfolioState,
    config: &Config,
    gateway: &GatewayClient,
    now: chrono::DateTime<Utc>,
) -> Result<Option<Position>> {
    let notional_cap = config.guard.stock_cap_pct / 100.0 * portfolio.total_asset;
    let sizing = sizing::size_position(
        signal.hybrid_score,
        signal.position_multiplier,
        context.position_multiplier,
        portfolio.total_asset,
        notional_cap,
        signal.signal_price,
        config.min_viable_notional,
    );
    let quantity = match sizing {
        sizing::SizingOutcome::Quantity(q) => q,
        sizing::SizingOutcome::TooSmall => {
            info!(stock_code = %signal.stock_code, reason = "TOO_SMALL", "position sizing rejected");
            return Ok(None);
        }
    };

    let order = confirm::build_order(
        signal.stock_code.clone(),
        quantity,
        signal.signal_type,
        signal.signal_price,
        config,
    )?;

    let fill = confirm::place_and_confirm(gateway, &order, config).await;
    let fill = match fill {
        Ok(f) => f,
        Err(e) if e.is_transport_failure() => {
            anyhow::bail!("transport failure placing buy order: {e}");
        }
        Err(e) => {
            warn!(stock_code = %signal.stock_code, error = %e, "buy order rejected by gateway");
            return Ok(None);
        }
    };

    match fill {
        FillOutcome::Filled { quantity, avg_price } => {
            let stop_loss_price =
                confirm::round_down_stop_loss(avg_price, config.stop_loss_pct, context.stop_loss_multiplier);
            let position = Position::open(
                signal.stock_code.clone(),
                signal.stock_name.clone(),
                quantity,
                avg_price,
                sector_group,
                stop_loss_price,
                now,
            )?;
            Ok(Some(position))
        }
        FillOutcome::NoFill => Ok(None),
        FillOutcome::Uncertain => {
            anyhow::bail!("buy order could not be confirmed or cancelled");
        }
    }
}
