// =============================================================================
// OrderRequest / OrderResult — the Gateway's brokerage order contract.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::stock_code::StockCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    #[serde(rename = "market")]
    Market,
    #[serde(rename = "limit")]
    Limit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub stock_code: StockCode,
    pub quantity: u64,
    pub order_type: OrderType,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OrderRequestError {
    #[error("limit orders require a price")]
    MissingLimitPrice,
    #[error("quantity must be > 0, got {0}")]
    NonPositiveQuantity(u64),
}

impl OrderRequest {
    pub fn new(
        stock_code: StockCode,
        quantity: u64,
        order_type: OrderType,
        price: Option<f64>,
    ) -> Result<Self, OrderRequestError> {
        if quantity == 0 {
            return Err(OrderRequestError::NonPositiveQuantity(quantity));
        }
        if order_type == OrderType::Limit && price.is_none() {
            return Err(OrderRequestError::MissingLimitPrice);
        }
        Ok(Self {
            stock_code,
            quantity,
            order_type,
            price,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    #[serde(default)]
    pub order_no: Option<String>,
    pub filled_quantity: u64,
    pub avg_fill_price: f64,
    #[serde(default)]
    pub message: Option<String>,
}

impl OrderResult {
    pub fn filled(order_no: impl Into<String>, filled_quantity: u64, avg_fill_price: f64) -> Self {
        Self {
            success: true,
            order_no: Some(order_no.into()),
            filled_quantity,
            avg_fill_price,
            message: None,
        }
    }

    pub fn unfilled(order_no: impl Into<String>) -> Self {
        Self {
            success: false,
            order_no: Some(order_no.into()),
            filled_quantity: 0,
            avg_fill_price: 0.0,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            order_no: None,
            filled_quantity: 0,
            avg_fill_price: 0.0,
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_order_requires_price() {
        let err =
            OrderRequest::new(StockCode::new("005930").unwrap(), 10, OrderType::Limit, None)
                .unwrap_err();
        assert_eq!(err, OrderRequestError::MissingLimitPrice);
    }

    #[test]
    fn market_order_allows_no_price() {
        let req =
            OrderRequest::new(StockCode::new("005930").unwrap(), 10, OrderType::Market, None)
                .unwrap();
        assert!(req.price.is_none());
    }

    #[test]
    fn rejects_zero_quantity() {
        let err = OrderRequest::new(
            StockCode::new("005930").unwrap(),
            0,
            OrderType::Market,
            None,
        )
        .unwrap_err();
        assert_eq!(err, OrderRequestError::NonPositiveQuantity(0));
    }
}
