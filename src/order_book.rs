//! Per-symbol limit order book: two price-indexed ladders of FIFO queues.
//!
//! Bids iterate descending (`Reverse` keys), asks ascending, so the first
//! entry on either side is always the best price. Price-time priority falls
//! out of the sorted maps plus append-only insertion within a level.

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

use rustc_hash::FxHashMap;

use crate::logging::now_ns;
use crate::models::{MarketSnapshot, Order, OrderId, OrderStatus, Price, Quantity, Side};

/// One price point on one side of the book. `total_quantity` tracks the sum
/// of remaining (unfilled) quantity over the queued orders.
#[derive(Debug)]
pub struct PriceLevel {
    pub price: Price,
    orders: VecDeque<Order>,
    total_quantity: Quantity,
}

impl PriceLevel {
    fn new(price: Price) -> Self {
        Self { price, orders: VecDeque::new(), total_quantity: 0 }
    }

    fn push(&mut self, order: Order) {
        self.total_quantity += order.remaining();
        self.orders.push_back(order);
    }

    fn remove(&mut self, order_id: OrderId) -> Option<Order> {
        let pos = self.orders.iter().position(|o| o.id == order_id)?;
        let order = self.orders.remove(pos)?;
        self.total_quantity -= order.remaining();
        Some(order)
    }

    fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    /// Fill `quantity` against the front order, keeping `total_quantity`
    /// consistent. Returns the updated order, popped from the queue when
    /// fully filled.
    fn fill_front(&mut self, quantity: Quantity) -> Option<Order> {
        let front = self.orders.front_mut()?;
        debug_assert!(quantity <= front.remaining());
        front.filled_quantity += quantity;
        front.status = if front.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.total_quantity -= quantity;
        let updated = front.clone();
        if updated.is_filled() {
            self.orders.pop_front();
        }
        Some(updated)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    /// Queued orders in arrival (priority) order.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }
}

pub struct OrderBook {
    symbol: String,
    bids: BTreeMap<Reverse<Price>, PriceLevel>,
    asks: BTreeMap<Price, PriceLevel>,
    order_index: FxHashMap<OrderId, (Side, Price)>,
    last_trade_price: Price,
    last_trade_quantity: Quantity,
    total_volume: u64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_index: FxHashMap::default(),
            last_trade_price: 0,
            last_trade_quantity: 0,
            total_volume: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Append an order at the tail of its price level, creating the level if
    /// absent. Only non-terminal orders with remaining quantity may rest.
    pub fn add(&mut self, order: Order) {
        debug_assert!(!order.status.is_terminal() && order.remaining() > 0);
        self.order_index.insert(order.id, (order.side, order.price));
        match order.side {
            Side::Buy => {
                self.bids
                    .entry(Reverse(order.price))
                    .or_insert_with(|| PriceLevel::new(order.price))
                    .push(order);
            }
            Side::Sell => {
                self.asks
                    .entry(order.price)
                    .or_insert_with(|| PriceLevel::new(order.price))
                    .push(order);
            }
        }
    }

    /// Remove a resting order, dropping its level when it empties.
    pub fn remove(&mut self, order_id: OrderId, side: Side) -> Option<Order> {
        let (_, price) = self.order_index.remove(&order_id)?;
        match side {
            Side::Buy => {
                let level = self.bids.get_mut(&Reverse(price))?;
                let order = level.remove(order_id);
                if level.is_empty() {
                    self.bids.remove(&Reverse(price));
                }
                order
            }
            Side::Sell => {
                let level = self.asks.get_mut(&price)?;
                let order = level.remove(order_id);
                if level.is_empty() {
                    self.asks.remove(&price);
                }
                order
            }
        }
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.order_index.contains_key(&order_id)
    }

    /// Best bid price, 0 when the side is empty.
    pub fn best_bid(&self) -> Price {
        self.bids.keys().next().map(|Reverse(p)| *p).unwrap_or(0)
    }

    /// Best ask price, 0 when the side is empty.
    pub fn best_ask(&self) -> Price {
        self.asks.keys().next().copied().unwrap_or(0)
    }

    /// Front of the best bid level: the next sell aggressor's counterparty.
    pub fn best_bid_order(&self) -> Option<&Order> {
        self.bids.values().next().and_then(|level| level.front())
    }

    /// Front of the best ask level: the next buy aggressor's counterparty.
    pub fn best_ask_order(&self) -> Option<&Order> {
        self.asks.values().next().and_then(|level| level.front())
    }

    /// Apply a fill to the front order of the best level on `side`, removing
    /// the order (and the level) once exhausted. Returns the updated order.
    pub fn fill_best(&mut self, side: Side, quantity: Quantity) -> Option<Order> {
        match side {
            Side::Buy => {
                let (&key, level) = self.bids.iter_mut().next()?;
                let updated = level.fill_front(quantity)?;
                if updated.is_filled() {
                    self.order_index.remove(&updated.id);
                }
                if level.is_empty() {
                    self.bids.remove(&key);
                }
                Some(updated)
            }
            Side::Sell => {
                let (&key, level) = self.asks.iter_mut().next()?;
                let updated = level.fill_front(quantity)?;
                if updated.is_filled() {
                    self.order_index.remove(&updated.id);
                }
                if level.is_empty() {
                    self.asks.remove(&key);
                }
                Some(updated)
            }
        }
    }

    /// First `n` bid levels as (price, total remaining) in descending order.
    pub fn bid_depth(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.bids.values().take(n).map(|l| (l.price, l.total_quantity)).collect()
    }

    /// First `n` ask levels as (price, total remaining) in ascending order.
    pub fn ask_depth(&self, n: usize) -> Vec<(Price, Quantity)> {
        self.asks.values().take(n).map(|l| (l.price, l.total_quantity)).collect()
    }

    pub fn bid_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.bids.values()
    }

    pub fn ask_levels(&self) -> impl Iterator<Item = &PriceLevel> {
        self.asks.values()
    }

    pub fn update_last_trade(&mut self, price: Price, quantity: Quantity) {
        self.last_trade_price = price;
        self.last_trade_quantity = quantity;
        self.total_volume += quantity;
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let (bid_price, bid_quantity) = self
            .bids
            .values()
            .next()
            .map(|l| (l.price, l.total_quantity))
            .unwrap_or((0, 0));
        let (ask_price, ask_quantity) = self
            .asks
            .values()
            .next()
            .map(|l| (l.price, l.total_quantity))
            .unwrap_or((0, 0));

        MarketSnapshot {
            symbol: self.symbol.clone(),
            last_trade_price: self.last_trade_price,
            last_trade_quantity: self.last_trade_quantity,
            bid_price,
            bid_quantity,
            ask_price,
            ask_quantity,
            total_volume: self.total_volume,
            timestamp: now_ns(),
        }
    }
}
