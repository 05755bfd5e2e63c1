//! Best-effort persistence of engine state into the external store.
//!
//! Keys are ASCII, colon-separated: `order:{id}`, `balance:{user}`,
//! `orderbook:{symbol}`, `trade:{id}`, `snapshot:{snapshot_id}`. Trades are
//! additionally pushed onto the audit queue for the database writer. Store
//! failures are reported to the caller but never abort matching.

use std::sync::Arc;

use serde::Serialize;

use crate::logging::now_ms;
use crate::models::{
    MarketSnapshot, MarketSnapshotEvent, Order, OrderEvent, Trade, TradeEvent, UserBalance,
};
use crate::order_book::{OrderBook, PriceLevel};
use crate::store::{EngineStore, StoreError};

/// List consumed by the external persistence worker.
pub const DB_WRITE_QUEUE: &str = "db_write_queue";

pub fn order_key(order_id: u64) -> String {
    format!("order:{}", order_id)
}

pub fn balance_key(user_id: u64) -> String {
    format!("balance:{}", user_id)
}

pub fn orderbook_key(symbol: &str) -> String {
    format!("orderbook:{}", symbol)
}

pub fn trade_key(trade_id: u64) -> String {
    format!("trade:{}", trade_id)
}

pub fn snapshot_key(snapshot_id: &str) -> String {
    format!("snapshot:{}", snapshot_id)
}

/// One price level of a full book dump: orders in FIFO (priority) order.
#[derive(Debug, Serialize)]
pub struct LevelDump {
    pub price: i64,
    pub total_quantity: u64,
    pub orders: Vec<Order>,
}

/// Full ladder serialization of one book. Restoring from this is possible in
/// principle (levels and queue order are both preserved) but not wired up.
#[derive(Debug, Serialize)]
pub struct BookDump {
    pub symbol: String,
    pub bids: Vec<LevelDump>,
    pub asks: Vec<LevelDump>,
    pub last_trade_price: i64,
    pub total_volume: u64,
}

fn level_dump(level: &PriceLevel) -> LevelDump {
    LevelDump {
        price: level.price,
        total_quantity: level.total_quantity(),
        orders: level.orders().cloned().collect(),
    }
}

impl BookDump {
    pub fn from_book(book: &OrderBook) -> Self {
        let snapshot = book.snapshot();
        Self {
            symbol: book.symbol().to_string(),
            bids: book.bid_levels().map(level_dump).collect(),
            asks: book.ask_levels().map(level_dump).collect(),
            last_trade_price: snapshot.last_trade_price,
            total_volume: snapshot.total_volume,
        }
    }
}

/// The record stored at `snapshot:{snapshot_id}`: full ladders plus every
/// balance, self-contained for a future restore path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotRecord<'a> {
    snapshot_id: &'a str,
    timestamp: u64,
    books: &'a [BookDump],
    balances: &'a [UserBalance],
}

pub struct SnapshotService {
    store: Arc<dyn EngineStore>,
}

impl SnapshotService {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    pub fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let json = serde_json::to_string(&OrderEvent::from_order(order))
            .map_err(|e| StoreError(e.to_string()))?;
        self.store.set(&order_key(order.id), &json)
    }

    pub fn save_balance(&self, balance: &UserBalance) -> Result<(), StoreError> {
        let json = serde_json::to_string(balance).map_err(|e| StoreError(e.to_string()))?;
        self.store.set(&balance_key(balance.user_id), &json)
    }

    /// Persist a trade and enqueue it for the relational audit writer.
    pub fn save_trade(&self, trade: &Trade) -> Result<(), StoreError> {
        let json = serde_json::to_string(&TradeEvent::from_trade(trade))
            .map_err(|e| StoreError(e.to_string()))?;
        self.store.set(&trade_key(trade.id), &json)?;
        self.store.rpush(DB_WRITE_QUEUE, &json)
    }

    pub fn save_order_book(&self, snapshot: &MarketSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(&MarketSnapshotEvent::from_snapshot(snapshot))
            .map_err(|e| StoreError(e.to_string()))?;
        self.store.set(&orderbook_key(&snapshot.symbol), &json)
    }

    /// Periodic full snapshot: refresh every balance key, then write the
    /// timestamped snapshot record with the full ladders.
    pub fn create_full_snapshot(
        &self,
        snapshot_id: &str,
        books: &[BookDump],
        balances: &[UserBalance],
    ) -> Result<(), StoreError> {
        for balance in balances {
            self.save_balance(balance)?;
        }

        let record =
            SnapshotRecord { snapshot_id, timestamp: now_ms(), books, balances };
        let json = serde_json::to_string(&record).map_err(|e| StoreError(e.to_string()))?;
        self.store.set(&snapshot_key(snapshot_id), &json)
    }
}
