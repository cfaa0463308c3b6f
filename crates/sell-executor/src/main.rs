// =============================================================================
// sell-executor — consumes SellOrders, enforces the per-code sell lock and
// holdings clamp, places the exit order, confirms the fill, and applies the
// resulting state transition (partial scale-out or full exit) to the
// persisted Position.
// =============================================================================

mod config;
mod confirm;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use domain::position::Position;
use domain::sell_order::{SellOrder, SellReason};
use domain::trade_record::TradeRecord;
use gateway_client::GatewayClient;
use risk_fabric::cache::keys;
use risk_fabric::{bus::Delivered, Cooldowns, DistributedLock, MessageBus, TradeLog, TypedCache};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use confirm::FillOutcome;

const STREAM_SELL_ORDERS: &str = "stream:sell-orders";
const GROUP_SELL_EXECUTOR: &str = "group:sell-executor";

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
    info!(service = "sell-executor", consumer = %config.consumer_name, "starting");

    let bus = Arc::new(MessageBus::connect(&config.redis_url).await.context("bus connect")?);
    bus.ensure_group(STREAM_SELL_ORDERS, GROUP_SELL_EXECUTOR)
        .await
        .context("ensure consumer group")?;

    let cache = TypedCache::connect(&config.redis_url).await.context("cache connect")?;
    let cooldowns = Arc::new(Cooldowns::new(cache.clone()));
    let trade_log = Arc::new(TradeLog::connect(&config.redis_url).await.context("trade log connect")?);
    let lock_conn = redis::Client::open(config.redis_url.as_str())?
        .get_connection_manager()
        .await
        .context("lock connect")?;
    let lock = Arc::new(DistributedLock::new(lock_conn));
    let gateway = Arc::new(GatewayClient::new(config.gateway_base_url.clone(), config.gateway_http_timeout));
    let code_locks = Arc::new(CodeLocks::default());

    spawn_reclaim(config.clone(), bus.clone());

    let (tx, rx) = mpsc::channel::<Delivered<SellOrder>>(1_000);
    let rx = Arc::new(AsyncMutex::new(rx));

    for _ in 0..config.worker_count {
        let rx = rx.clone();
        let cache = cache.clone();
        let cooldowns = cooldowns.clone();
        let trade_log = trade_log.clone();
        let lock = lock.clone();
        let gateway = gateway.clone();
        let code_locks = code_locks.clone();
        let config = config.clone();
        tokio::spawn(async move {
            worker_loop(rx, cache, cooldowns, trade_log, lock, gateway, code_locks, config).await;
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
                .reclaim_pending::<SellOrder>(
                    STREAM_SELL_ORDERS,
                    GROUP_SELL_EXECUTOR,
                    &config.consumer_name,
                    config.reclaim_min_idle,
                    config.batch_size,
                )
                .await
            {
                Ok(reclaimed) if !reclaimed.is_empty() => {
                    info!(count = reclaimed.len(), "reclaimed pending sell orders; re-checking holdings");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "reclaim pass failed"),
            }
        }
    });
}

async fn reader_loop(config: Config, bus: Arc<MessageBus>, tx: mpsc::Sender<Delivered<SellOrder>>) {
    loop {
        match bus
            .read_group::<SellOrder>(
                STREAM_SELL_ORDERS,
                GROUP_SELL_EXECUTOR,
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
    rx: Arc<AsyncMutex<mpsc::Receiver<Delivered<SellOrder>>>>,
    cache: TypedCache,
    cooldowns: Arc<Cooldowns>,
    trade_log: Arc<TradeLog>,
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
        let order = delivered.payload;
        let code = order.stock_code.as_str().to_string();
        let code_mutex = code_locks.get(&code);
        let _code_guard = code_mutex.lock().await;

        if let Err(e) = process_order(&order, &cache, &cooldowns, &trade_log, &lock, &gateway, &config).await {
            error!(stock_code = %code, error = %e, "failed to process sell order");
        }
    }
}

async fn process_order(
    order: &SellOrder,
    cache: &TypedCache,
    cooldowns: &Cooldowns,
    trade_log: &TradeLog,
    lock: &DistributedLock,
    gateway: &GatewayClient,
    config: &Config,
) -> Result<()> {
    let code = order.stock_code.as_str();
    let lock_key = keys::sell_lock(code);
    let holder = uuid::Uuid::new_v4().to_string();

    if !lock.acquire(&lock_key, &holder, risk_fabric::locks::SELL_LOCK_TTL).await.unwrap_or(false) {
        info!(stock_code = code, reason = "LOCK_CONTENTION", "sell order rejected as in-flight duplicate");
        return Ok(());
    }

    let result = execute_sell(order, cache, trade_log, gateway, config).await;
    lock.release(&lock_key, &holder).await.ok();

    match result {
        Ok(Some((record, full_exit))) => {
            if full_exit {
                cooldowns.mark_sold(code).await.ok();
                if record.requires_stoploss_cooldown() {
                    cooldowns.mark_stoploss(code).await.ok();
                }
            }
            info!(
                stock_code = code,
                quantity = record.quantity,
                price = record.price,
                full_exit,
                "sell executed"
            );
        }
        Ok(None) => {
            info!(stock_code = code, "sell order did not fill; no state change");
        }
        Err(e) => {
            error!(stock_code = code, error = %e, "sell execution failed");
        }
    }
    Ok(())
}

/// Returns `Some((record, full_exit))` on a confirmed fill, `None` on no-fill,
/// and an error for an uncertain or unconfirmable outcome, which the monitor's
/// 30 s reconciliation is left to resolve.
async fn execute_sell(
    order: &SellOrder,
    cache: &TypedCache,
    trade_log: &TradeLog,
    gateway: &GatewayClient,
    config: &Config,
) -> Result<Option<(TradeRecord, bool)>> {
    let code = order.stock_code.as_str();
    let key = keys::position(code);
    let Some(mut position) = cache.get_json::<Position>(&key).await.context("read position")? else {
        warn!(stock_code = code, "sell order for a code with no open position; dropping");
        return Ok(None);
    };

    let quantity = order.quantity.min(position.quantity);
    if quantity == 0 {
        warn!(stock_code = code, "sell order clamped to zero quantity; dropping");
        return Ok(None);
    }

    let sell_order_request = confirm::build_order(order.stock_code.clone(), quantity)?;
    let fill = place_with_hard_stop_retry(gateway, &sell_order_request, order.sell_reason, config).await?;

    let (quantity, avg_price) = match fill {
        FillOutcome::Filled { quantity, avg_price } => (quantity, avg_price),
        FillOutcome::NoFill => return Ok(None),
        FillOutcome::Uncertain => {
            anyhow::bail!("sell order for {code} could not be confirmed or cancelled; marking uncertain");
        }
    };

    let now = Utc::now();
    let full_exit = quantity >= position.quantity;
    let profit_pct = position.profit_pct(avg_price);
    let holding_days = position.holding_days(now);

    if full_exit {
        cache.delete(&key).await.ok();
    } else {
        position.apply_scale_out(quantity);
        cache.set_json(&key, &position, Duration::from_secs(60)).await.ok();
    }

    let record = TradeRecord::sell(
        order.stock_code.clone(),
        quantity,
        avg_price,
        now,
        order.sell_reason,
        profit_pct,
        holding_days,
    );
    trade_log.append(&record).await.ok();

    Ok(Some((record, full_exit)))
}

/// Hard Stop (STOP_LOSS) is exempt from the "venue failures do not
/// auto-retry" rule (spec §4.5): retried up to `hard_stop_max_retries` times
/// with a fixed backoff before giving up and surfacing the failure.
async fn place_with_hard_stop_retry(
    gateway: &GatewayClient,
    order: &domain::order::OrderRequest,
    reason: SellReason,
    config: &Config,
) -> Result<FillOutcome> {
    if reason != SellReason::StopLoss {
        return confirm::place_and_confirm(gateway, order, config)
            .await
            .map_err(|e| anyhow::anyhow!("sell order failed: {e}"));
    }

    let mut attempt = 0;
    loop {
        match confirm::place_and_confirm(gateway, order, config).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_transport_failure() && attempt < config.hard_stop_max_retries => {
                attempt += 1;
                warn!(attempt, error = %e, "hard stop sell failed, retrying");
                tokio::time::sleep(config.hard_stop_retry_backoff).await;
            }
            Err(e) => return Err(anyhow::anyhow!("hard stop sell failed after {attempt} retries: {e}")),
        }
    }
}
