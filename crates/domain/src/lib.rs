// =============================================================================
// domain — cross-boundary record types for the real-time trading core
// =============================================================================
//
// Every type here is an immutable record (construction validates; there are
// no setters). Instances cross process boundaries as JSON over the message
// bus or the typed cache, so every field that appears on the wire derives
// `Serialize`/`Deserialize` and tolerates additive schema evolution via
// `#[serde(default)]` on anything added after the first release.
// =============================================================================

pub mod market_data;
pub mod order;
pub mod portfolio;
pub mod position;
pub mod regime;
pub mod signal;
pub mod stock_code;
pub mod tick;
pub mod trade_record;
pub mod watchlist;

pub use market_data::{DailyPrice, MinutePrice, StockSnapshot};
pub use order::{OrderRequest, OrderResult, OrderType};
pub use portfolio::PortfolioState;
pub use position::Position;
pub use regime::{MarketRegime, TradingContext, VixRegime};
pub use signal::{BuySignal, SignalSource, SignalType};
pub use stock_code::StockCode;
pub use tick::{MinuteBar, PriceTick};
pub use trade_record::TradeRecord;
pub use watchlist::{HotWatchlist, RiskTag, TradeTier, WatchlistEntry};

pub mod sell_order;
pub use sell_order::{SellOrder, SellReason};
