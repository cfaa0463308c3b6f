// =============================================================================
// StockSnapshot / DailyPrice / MinutePrice — Gateway HTTP response DTOs.
// These cross the Gateway's local HTTP boundary (not the bus or cache), but
// live here so every consumer crate shares one deserialization target
// instead of each redefining its own copy.
// =============================================================================

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::stock_code::StockCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSnapshot {
    pub stock_code: StockCode,
    pub current_price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub per: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyPrice {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MinutePrice {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}
