//! Price-time priority matching over a lazily-created set of per-symbol
//! books.
//!
//! Matching runs under the owning book's mutex; every trade, tick snapshot,
//! and order update produced along the way is collected into local buffers
//! and the callbacks fire only after the lock is released. Registry and
//! ledger updates use their own leaf mutexes, never a second book.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::balance_ledger::BalanceLedger;
use crate::logging::now_ns;
use crate::models::{
    EngineError, MarketSnapshot, Order, OrderId, OrderStatus, OrderType, Price, Quantity, Side,
    TimeInForce, Trade,
};
use crate::order_book::OrderBook;
use crate::order_registry::OrderRegistry;

pub type TradeCallback = Box<dyn Fn(&Trade, &MarketSnapshot) + Send + Sync>;
pub type OrderUpdateCallback = Box<dyn Fn(&Order) + Send + Sync>;

pub struct MatchingEngine {
    books: Mutex<FxHashMap<String, Arc<Mutex<OrderBook>>>>,
    registry: Arc<OrderRegistry>,
    ledger: Arc<BalanceLedger>,
    next_trade_id: AtomicU64,
    trade_callback: Option<TradeCallback>,
    order_update_callback: Option<OrderUpdateCallback>,
}

impl MatchingEngine {
    pub fn new(registry: Arc<OrderRegistry>, ledger: Arc<BalanceLedger>) -> Self {
        Self {
            books: Mutex::new(FxHashMap::default()),
            registry,
            ledger,
            next_trade_id: AtomicU64::new(1),
            trade_callback: None,
            order_update_callback: None,
        }
    }

    /// Install the trade fan-out hook. Must be wired before the engine is
    /// shared across threads; callbacks are never invoked under a book lock.
    pub fn set_trade_callback(&mut self, callback: TradeCallback) {
        self.trade_callback = Some(callback);
    }

    pub fn set_order_update_callback(&mut self, callback: OrderUpdateCallback) {
        self.order_update_callback = Some(callback);
    }

    /// The book for `symbol`, created on first reference.
    pub fn book(&self, symbol: &str) -> Arc<Mutex<OrderBook>> {
        let mut books = self.books.lock().unwrap();
        books
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new(symbol))))
            .clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        let books = self.books.lock().unwrap();
        books.keys().cloned().collect()
    }

    pub fn market_snapshot(&self, symbol: &str) -> MarketSnapshot {
        let book = self.book(symbol);
        let book = book.lock().unwrap();
        book.snapshot()
    }

    pub fn depth(&self, symbol: &str, levels: usize) -> (Vec<(Price, Quantity)>, Vec<(Price, Quantity)>) {
        let book = self.book(symbol);
        let book = book.lock().unwrap();
        (book.bid_depth(levels), book.ask_depth(levels))
    }

    /// Remove a resting order from its book, e.g. after a registry cancel.
    pub fn remove_order(&self, symbol: &str, order_id: OrderId, side: Side) -> Option<Order> {
        let book = self.book(symbol);
        let mut book = book.lock().unwrap();
        book.remove(order_id, side)
    }

    /// Run the matching algorithm for a validated, funded, registered order.
    /// Mutates `order` in place (fills, status) and mirrors the outcome into
    /// the registry. Returns the trades executed, in match order.
    pub fn process_order(&self, order: &mut Order) -> Result<Vec<Trade>, EngineError> {
        let book_handle = self.book(&order.symbol);

        let mut trades: Vec<(Trade, MarketSnapshot)> = Vec::new();
        let mut order_updates: Vec<Order> = Vec::new();

        let result = {
            let mut book = book_handle.lock().unwrap();
            self.run_matching(order, &mut book, &mut trades, &mut order_updates)
        };
        // Book lock released: publish side effects in match order.
        if let Some(cb) = &self.order_update_callback {
            for update in &order_updates {
                cb(update);
            }
        }
        if let Some(cb) = &self.trade_callback {
            for (trade, snapshot) in &trades {
                cb(trade, snapshot);
            }
        }
        result?;

        Ok(trades.into_iter().map(|(t, _)| t).collect())
    }

    fn run_matching(
        &self,
        order: &mut Order,
        book: &mut OrderBook,
        trades: &mut Vec<(Trade, MarketSnapshot)>,
        order_updates: &mut Vec<Order>,
    ) -> Result<(), EngineError> {
        // FOK feasibility check happens before any fill: either the whole
        // quantity is reachable at acceptable prices or nothing trades.
        if order.time_in_force == TimeInForce::Fok && !Self::can_fill_completely(order, book) {
            let locked = self.ledger.required_funds(order);
            if locked > 0 {
                self.ledger.unlock(order.user_id, locked)?;
            }
            order.status = OrderStatus::Cancelled;
            self.registry.update_status(order.id, order.status);
            order_updates.push(order.clone());
            return Ok(());
        }

        while order.filled_quantity < order.quantity {
            let contra_side = order.side.opposite();
            let contra = match order.side {
                Side::Buy => book.best_ask_order(),
                Side::Sell => book.best_bid_order(),
            };
            let Some(contra) = contra else { break };

            // Price guard applies to limit orders only; market orders take
            // any liquidity.
            if order.order_type == OrderType::Limit {
                let acceptable = match order.side {
                    Side::Buy => contra.price <= order.price,
                    Side::Sell => contra.price >= order.price,
                };
                if !acceptable {
                    break;
                }
            }

            let trade_qty = order.remaining().min(contra.remaining());
            let trade_price = contra.price; // maker sets the price
            let (buy_order_id, sell_order_id, buy_user_id, sell_user_id, buyer_limit) =
                match order.side {
                    Side::Buy => (order.id, contra.id, order.user_id, contra.user_id, order.price),
                    Side::Sell => (contra.id, order.id, contra.user_id, order.user_id, contra.price),
                };

            let trade = Trade {
                id: self.next_trade_id.fetch_add(1, Ordering::Relaxed),
                buy_order_id,
                sell_order_id,
                buy_user_id,
                sell_user_id,
                symbol: order.symbol.clone(),
                price: trade_price,
                quantity: trade_qty,
                timestamp: now_ns(),
            };

            // Settle before mutating the book so a ledger invariant breach
            // aborts without leaving a half-applied fill.
            self.settle(&trade, buyer_limit)?;

            order.filled_quantity += trade_qty;
            let maker = book
                .fill_best(contra_side, trade_qty)
                .ok_or_else(|| EngineError::system("book front vanished during match"))?;
            self.registry.update_filled_quantity(maker.id, trade_qty);
            self.registry.update_filled_quantity(order.id, trade_qty);
            book.update_last_trade(trade_price, trade_qty);

            order.status = if order.is_filled() {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };

            order_updates.push(maker);
            order_updates.push(order.clone());
            trades.push((trade, book.snapshot()));
        }

        self.finish_time_in_force(order, book, order_updates)?;

        self.registry.update_status(order.id, order.status);
        Ok(())
    }

    /// Post-loop handling of the unfilled remainder, if any.
    fn finish_time_in_force(
        &self,
        order: &mut Order,
        book: &mut OrderBook,
        order_updates: &mut Vec<Order>,
    ) -> Result<(), EngineError> {
        if order.remaining() == 0 {
            return Ok(());
        }

        match (order.order_type, order.time_in_force) {
            // Market orders never rest: whatever is left is dropped, and an
            // entirely unfilled market order ends CANCELLED.
            (OrderType::Market, _) => {
                if order.filled_quantity == 0 {
                    order.status = OrderStatus::Cancelled;
                    order_updates.push(order.clone());
                }
            }
            (OrderType::Limit, TimeInForce::Ioc) => {
                if order.side == Side::Buy {
                    let remainder = order.price * order.remaining() as i64;
                    if remainder > 0 {
                        self.ledger.unlock(order.user_id, remainder)?;
                    }
                }
                order.status = if order.filled_quantity == 0 {
                    OrderStatus::Cancelled
                } else {
                    OrderStatus::PartiallyFilled
                };
                order_updates.push(order.clone());
            }
            (OrderType::Limit, TimeInForce::Gfd) => {
                if order.status != OrderStatus::Cancelled {
                    book.add(order.clone());
                    order_updates.push(order.clone());
                }
            }
            // A feasible FOK fills completely in the loop above.
            (OrderType::Limit, TimeInForce::Fok) => {}
        }
        Ok(())
    }

    /// Walk the contra depth in ladder order, summing quantity at acceptable
    /// prices, until the order's full quantity is reachable.
    fn can_fill_completely(order: &Order, book: &OrderBook) -> bool {
        let depth = match order.side {
            Side::Buy => book.ask_depth(usize::MAX),
            Side::Sell => book.bid_depth(usize::MAX),
        };

        let mut available: Quantity = 0;
        for (price, quantity) in depth {
            if order.order_type == OrderType::Limit {
                let acceptable = match order.side {
                    Side::Buy => price <= order.price,
                    Side::Sell => price >= order.price,
                };
                if !acceptable {
                    break;
                }
            }
            available += quantity;
            if available >= order.quantity {
                return true;
            }
        }
        false
    }

    /// Per-trade settlement: release the buyer's reservation for this fill,
    /// then move the trade value to the seller. A ledger failure here means
    /// the fill was admitted without the funds to back it (nothing is locked
    /// for market buys), so it surfaces as a system error, never as a
    /// client-level insufficient balance.
    fn settle(&self, trade: &Trade, buyer_limit: Price) -> Result<(), EngineError> {
        let value = trade.price * trade.quantity as i64;
        let locked = buyer_limit * trade.quantity as i64;
        self.ledger
            .complete_trade(trade.buy_user_id, locked, value)
            .and_then(|_| self.ledger.transfer(trade.buy_user_id, trade.sell_user_id, value))
            .map_err(|err| {
                EngineError::system(format!("settlement failed for trade {}: {}", trade.id, err))
            })
    }
}
