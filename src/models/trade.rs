use serde::{Deserialize, Serialize};

use crate::models::order::{OrderId, Price, Quantity, UserId};

/// Immutable record of a single fill between one buy and one sell order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: u64,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub buy_user_id: UserId,
    pub sell_user_id: UserId,
    pub symbol: String,
    pub price: Price,
    pub quantity: Quantity,
    /// Nanoseconds since epoch.
    pub timestamp: u64,
}

/// Top-of-book view of one symbol, produced under the book lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub last_trade_price: Price,
    pub last_trade_quantity: Quantity,
    pub bid_price: Price,
    pub bid_quantity: Quantity,
    pub ask_price: Price,
    pub ask_quantity: Quantity,
    pub total_volume: u64,
    pub timestamp: u64,
}
