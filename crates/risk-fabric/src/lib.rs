// =============================================================================
// risk-fabric — shared coordination primitives for the trading core
// =============================================================================
//
// Every cross-process coordination primitive the spec names in §4.6 lives
// here: the typed message bus (Redis Streams + consumer groups), the typed
// cache (Redis JSON with key-specific TTLs), distributed locks (SETNX+TTL,
// no renewal, no fencing), cooldown markers, the pure Portfolio Guard
// function, and the correlation cache. No component calls another
// component's process-internal API — everything below is the *only*
// coordination surface between the five binaries.
// =============================================================================

pub mod bus;
pub mod cache;
pub mod cooldowns;
pub mod correlation;
pub mod locks;
pub mod portfolio_guard;
pub mod trade_log;

pub use bus::MessageBus;
pub use cache::TypedCache;
pub use cooldowns::Cooldowns;
pub use correlation::{CorrelationCache, DailyCloseSource};
pub use locks::DistributedLock;
pub use portfolio_guard::{GuardOutcome, PortfolioGuardConfig};
pub use trade_log::TradeLog;
