//! Outbound payloads for the trade, market-data, order-update, and error
//! channels. Prices render as decimals, timestamps as milliseconds since
//! epoch, matching what the fan-out relays and browser clients expect.

use serde::Serialize;

use crate::models::messages::price_to_f64;
use crate::models::order::Order;
use crate::models::trade::{MarketSnapshot, Trade};

fn ns_to_ms(ns: u64) -> u64 {
    ns / 1_000_000
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub trade_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
    pub buy_user_id: u64,
    pub sell_user_id: u64,
    pub symbol: String,
    pub price: f64,
    pub quantity: u64,
    pub timestamp: u64,
}

impl TradeEvent {
    pub fn from_trade(trade: &Trade) -> Self {
        Self {
            event_type: "trade",
            trade_id: trade.id,
            buy_order_id: trade.buy_order_id,
            sell_order_id: trade.sell_order_id,
            buy_user_id: trade.buy_user_id,
            sell_user_id: trade.sell_user_id,
            symbol: trade.symbol.clone(),
            price: price_to_f64(trade.price),
            quantity: trade.quantity,
            timestamp: ns_to_ms(trade.timestamp),
        }
    }
}

/// Per-trade market tick: the trade itself plus the top of book right after
/// the fill was applied.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub symbol: String,
    pub last_trade_price: f64,
    pub last_trade_quantity: u64,
    pub bid_price: f64,
    pub bid_quantity: u64,
    pub ask_price: f64,
    pub ask_quantity: u64,
    pub total_volume: u64,
    pub timestamp: u64,
}

impl TickEvent {
    pub fn from_trade(trade: &Trade, snapshot: &MarketSnapshot) -> Self {
        Self {
            event_type: "tick",
            symbol: trade.symbol.clone(),
            last_trade_price: price_to_f64(trade.price),
            last_trade_quantity: trade.quantity,
            bid_price: price_to_f64(snapshot.bid_price),
            bid_quantity: snapshot.bid_quantity,
            ask_price: price_to_f64(snapshot.ask_price),
            ask_quantity: snapshot.ask_quantity,
            total_volume: snapshot.total_volume,
            timestamp: ns_to_ms(trade.timestamp),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSnapshotEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub symbol: String,
    pub last_trade_price: f64,
    pub last_trade_quantity: u64,
    pub bid_price: f64,
    pub bid_quantity: u64,
    pub ask_price: f64,
    pub ask_quantity: u64,
    pub total_volume: u64,
    pub timestamp: u64,
}

impl MarketSnapshotEvent {
    pub fn from_snapshot(snapshot: &MarketSnapshot) -> Self {
        Self {
            event_type: "snapshot",
            symbol: snapshot.symbol.clone(),
            last_trade_price: price_to_f64(snapshot.last_trade_price),
            last_trade_quantity: snapshot.last_trade_quantity,
            bid_price: price_to_f64(snapshot.bid_price),
            bid_quantity: snapshot.bid_quantity,
            ask_price: price_to_f64(snapshot.ask_price),
            ask_quantity: snapshot.ask_quantity,
            total_volume: snapshot.total_volume,
            timestamp: ns_to_ms(snapshot.timestamp),
        }
    }
}

/// Full order state as published on the order-update channel and persisted
/// under `order:{id}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub order_id: u64,
    pub user_id: u64,
    pub symbol: String,
    pub side: String,
    pub order_type: String,
    pub time_in_force: String,
    pub price: f64,
    pub quantity: u64,
    pub filled_quantity: u64,
    pub status: String,
    pub timestamp: u64,
}

impl OrderEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            event_type: "order",
            order_id: order.id,
            user_id: order.user_id,
            symbol: order.symbol.clone(),
            side: order.side.to_string(),
            order_type: order.order_type.to_string(),
            time_in_force: order.time_in_force.to_string(),
            price: price_to_f64(order.price),
            quantity: order.quantity,
            filled_quantity: order.filled_quantity,
            status: order.status.to_string(),
            timestamp: ns_to_ms(order.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub code: u32,
    pub message: String,
    pub timestamp: u64,
}

impl ErrorEvent {
    pub fn new(code: u32, message: impl Into<String>, timestamp_ms: u64) -> Self {
        Self { event_type: "error", code, message: message.into(), timestamp: timestamp_ms }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderStatus, OrderType, Side, TimeInForce};

    #[test]
    fn test_order_event_wire_shape() {
        let order = Order {
            id: 7,
            user_id: 1,
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gfd,
            price: 15029,
            quantity: 10,
            filled_quantity: 4,
            status: OrderStatus::PartiallyFilled,
            created_at: 1_700_000_000_123_456_789,
        };

        let json = serde_json::to_value(OrderEvent::from_order(&order)).unwrap();
        assert_eq!(json["type"], "order");
        assert_eq!(json["orderId"], 7);
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["price"].as_f64().unwrap(), 150.29);
        assert_eq!(json["filledQuantity"], 4);
        assert_eq!(json["status"], "PARTIALLY_FILLED");
        assert_eq!(json["timestamp"], 1_700_000_000_123u64);
    }
}
