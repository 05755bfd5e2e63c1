//! Engine facade: owns the components, drains the order input queue with a
//! pool of worker threads, republishes matching events on the outbound
//! channels, and persists state through the snapshot service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::balance_ledger::BalanceLedger;
use crate::configure::AppConfig;
use crate::logging::{now_ms, now_ns};
use crate::matching_engine::MatchingEngine;
use crate::models::{
    EngineError, ErrorEvent, MarketSnapshot, Order, OrderEvent, OrderId, OrderStatus, OrderType,
    Price, Quantity, QueueMessage, Side, TickEvent, TimeInForce, TradeEvent, UserBalance, UserId,
};
use crate::order_registry::OrderRegistry;
use crate::snapshot_service::{BookDump, SnapshotService};
use crate::store::EngineStore;

/// Serialize and publish one event; store failures are logged, never fatal.
fn publish_json<T: Serialize>(store: &dyn EngineStore, channel: &str, event: &T) {
    match serde_json::to_string(event) {
        Ok(json) => {
            if let Err(err) = store.publish(channel, &json) {
                tracing::warn!(channel, %err, "event publish failed");
            }
        }
        Err(err) => tracing::error!(channel, %err, "event serialization failed"),
    }
}

pub struct TradingEngine {
    config: AppConfig,
    store: Arc<dyn EngineStore>,
    ledger: Arc<BalanceLedger>,
    registry: Arc<OrderRegistry>,
    matching: Arc<MatchingEngine>,
    snapshots: Arc<SnapshotService>,
    running: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl TradingEngine {
    pub fn new(config: AppConfig, store: Arc<dyn EngineStore>) -> Arc<Self> {
        let ledger = Arc::new(BalanceLedger::new());
        let registry = Arc::new(OrderRegistry::new(ledger.clone()));
        let snapshots = Arc::new(SnapshotService::new(store.clone()));

        let mut matching = MatchingEngine::new(registry.clone(), ledger.clone());

        let channels = config.channels.clone();
        {
            let store = store.clone();
            let snapshots = snapshots.clone();
            let channels = channels.clone();
            matching.set_trade_callback(Box::new(move |trade, snapshot| {
                publish_json(store.as_ref(), &channels.trade, &TradeEvent::from_trade(trade));
                publish_json(
                    store.as_ref(),
                    &channels.market_data,
                    &TickEvent::from_trade(trade, snapshot),
                );
                if let Err(err) = snapshots.save_trade(trade) {
                    tracing::warn!(trade_id = trade.id, %err, "trade persistence failed");
                    publish_json(
                        store.as_ref(),
                        &channels.errors,
                        &ErrorEvent::new(
                            EngineError::system("trade persistence failed").code(),
                            err.to_string(),
                            now_ms(),
                        ),
                    );
                }
            }));
        }
        {
            let store = store.clone();
            let snapshots = snapshots.clone();
            matching.set_order_update_callback(Box::new(move |order| {
                publish_json(
                    store.as_ref(),
                    &channels.order_updates,
                    &OrderEvent::from_order(order),
                );
                if let Err(err) = snapshots.save_order(order) {
                    tracing::warn!(order_id = order.id, %err, "order persistence failed");
                }
            }));
        }

        Arc::new(Self {
            config,
            store,
            ledger,
            registry,
            matching: Arc::new(matching),
            snapshots,
            running: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Verify the store connection, then spawn the worker pool and the
    /// periodic snapshot thread.
    pub fn start(self: &Arc<Self>) -> Result<(), EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::system("engine already running"));
        }
        if let Err(err) = self.store.ping() {
            self.running.store(false, Ordering::SeqCst);
            return Err(EngineError::system(format!("store unreachable: {}", err)));
        }

        let mut threads = self.threads.lock().unwrap();
        for i in 0..self.config.engine.worker_threads.max(1) {
            let engine = Arc::clone(self);
            let handle = thread::Builder::new()
                .name(format!("order-worker-{}", i))
                .spawn(move || engine.worker_loop())
                .map_err(|e| EngineError::system(format!("spawn failed: {}", e)))?;
            threads.push(handle);
        }

        if self.config.engine.enable_snapshot {
            let engine = Arc::clone(self);
            let handle = thread::Builder::new()
                .name("snapshot".to_string())
                .spawn(move || engine.snapshot_loop())
                .map_err(|e| EngineError::system(format!("spawn failed: {}", e)))?;
            threads.push(handle);
        }

        tracing::info!(
            workers = self.config.engine.worker_threads,
            snapshots = self.config.engine.enable_snapshot,
            "trading engine started"
        );
        Ok(())
    }

    /// Cooperative shutdown: drop the running flag and join every thread.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let handles: Vec<_> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        tracing::info!("trading engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn worker_loop(&self) {
        let mut consumer = match self.store.queue_consumer() {
            Ok(consumer) => consumer,
            Err(err) => {
                tracing::error!(%err, "worker failed to open queue consumer");
                return;
            }
        };

        while self.running.load(Ordering::SeqCst) {
            match consumer.pop(&self.config.queues.order_input, Duration::from_secs(1)) {
                Ok(Some(message)) => self.handle_message(&message),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(%err, "order queue pop failed");
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    fn snapshot_loop(&self) {
        let interval = Duration::from_secs(self.config.engine.snapshot_interval_secs.max(1));
        while self.running.load(Ordering::SeqCst) {
            // Sleep in one-second slices so shutdown is not held up by a
            // long snapshot interval.
            let mut slept = Duration::ZERO;
            while slept < interval && self.running.load(Ordering::SeqCst) {
                let slice = Duration::from_secs(1).min(interval - slept);
                thread::sleep(slice);
                slept += slice;
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let snapshot_id = format!("snapshot_{}", now_ms() / 1000);
            if let Err(err) = self.write_full_snapshot(&snapshot_id) {
                tracing::warn!(snapshot_id, %err, "periodic snapshot failed");
            }
        }
    }

    fn write_full_snapshot(&self, snapshot_id: &str) -> Result<(), EngineError> {
        let mut dumps = Vec::new();
        for symbol in self.matching.symbols() {
            let book = self.matching.book(&symbol);
            let (dump, top) = {
                let book = book.lock().unwrap();
                (BookDump::from_book(&book), book.snapshot())
            };
            self.snapshots
                .save_order_book(&top)
                .map_err(|e| EngineError::system(e.to_string()))?;
            dumps.push(dump);
        }
        let balances = self.ledger.all();
        self.snapshots
            .create_full_snapshot(snapshot_id, &dumps, &balances)
            .map_err(|e| EngineError::system(e.to_string()))?;
        tracing::info!(snapshot_id, books = dumps.len(), "full snapshot written");
        Ok(())
    }

    /// Process one raw input-queue message. Malformed JSON is logged and
    /// dropped; engine-level failures are published on the error channel.
    pub fn handle_message(&self, raw: &str) {
        match QueueMessage::from_json(raw) {
            Err(err) => {
                tracing::warn!(%err, "dropping malformed order message");
            }
            Ok(QueueMessage::Place(req)) => {
                let price = match crate::models::to_price_cents(req.price) {
                    Ok(price) => price,
                    Err(err) => {
                        tracing::warn!(user_id = req.user_id, %err, "rejecting order price");
                        self.publish_error(&err);
                        return;
                    }
                };
                match self.submit_order(
                    req.user_id,
                    &req.symbol,
                    req.side,
                    req.order_type,
                    req.time_in_force,
                    price,
                    req.quantity,
                ) {
                    Ok(order) => {
                        tracing::info!(
                            order_id = order.id,
                            user_id = order.user_id,
                            symbol = %order.symbol,
                            status = %order.status,
                            filled = order.filled_quantity,
                            "order processed"
                        );
                    }
                    Err(err) => {
                        tracing::warn!(user_id = req.user_id, %err, "order rejected");
                        self.publish_error(&err);
                    }
                }
            }
            Ok(QueueMessage::Cancel(req)) => match self.cancel_order(req.order_id) {
                Ok(order) => {
                    tracing::info!(order_id = order.id, "order cancelled");
                }
                Err(err) => {
                    tracing::warn!(order_id = req.order_id, %err, "cancel failed");
                    self.publish_error(&err);
                }
            },
        }
    }

    /// Validate, lock funds, register, and match one order. Rejected orders
    /// are still recorded in the registry for status queries.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_order(
        &self,
        user_id: UserId,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        time_in_force: TimeInForce,
        price: Price,
        quantity: Quantity,
    ) -> Result<Order, EngineError> {
        let mut order = Order {
            id: self.registry.next_order_id(),
            user_id,
            symbol: symbol.to_string(),
            side,
            order_type,
            time_in_force,
            price,
            quantity,
            filled_quantity: 0,
            status: OrderStatus::Pending,
            created_at: now_ns(),
        };

        if let Err(err) = Self::validate(&order) {
            order.status = OrderStatus::Rejected;
            let _ = self.registry.create(order);
            return Err(err);
        }

        let required = self.ledger.required_funds(&order);
        if required > 0 {
            if let Err(err) = self.ledger.lock(user_id, required) {
                order.status = OrderStatus::Rejected;
                let _ = self.registry.create(order);
                return Err(err);
            }
        }

        self.registry.create(order.clone())?;
        self.matching.process_order(&mut order)?;

        if let Err(err) = self.snapshots.save_order(&order) {
            tracing::warn!(order_id = order.id, %err, "order persistence failed");
        }
        Ok(order)
    }

    /// Cancel a resting or partially filled order: registry state first
    /// (which releases the buyer's remaining lock), then the book.
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let cancelled = self.registry.cancel(order_id)?;
        self.matching.remove_order(&cancelled.symbol, order_id, cancelled.side);

        publish_json(
            self.store.as_ref(),
            &self.config.channels.order_updates,
            &OrderEvent::from_order(&cancelled),
        );
        if let Err(err) = self.snapshots.save_order(&cancelled) {
            tracing::warn!(order_id, %err, "order persistence failed");
        }
        Ok(cancelled)
    }

    pub fn get_order_status(&self, order_id: OrderId) -> Option<Order> {
        self.registry.get(order_id)
    }

    pub fn get_market_snapshot(&self, symbol: &str) -> MarketSnapshot {
        self.matching.market_snapshot(symbol)
    }

    /// Aggregated depth as published to REST clients.
    pub fn get_order_book_depth(&self, symbol: &str, levels: usize) -> serde_json::Value {
        let (bids, asks) = self.matching.depth(symbol, levels);
        let to_json = |side: &[(Price, Quantity)]| -> Vec<serde_json::Value> {
            side.iter()
                .map(|(price, quantity)| {
                    serde_json::json!({
                        "price": crate::models::price_to_f64(*price),
                        "quantity": quantity,
                    })
                })
                .collect()
        };
        serde_json::json!({
            "type": "orderbook",
            "symbol": symbol,
            "bids": to_json(&bids),
            "asks": to_json(&asks),
            "timestamp": now_ms(),
        })
    }

    pub fn initialize_user_balance(&self, user_id: UserId, amount: i64) {
        self.ledger.initialize(user_id, amount);
        let balance = self.ledger.get(user_id);
        if let Err(err) = self.snapshots.save_balance(&balance) {
            tracing::warn!(user_id, %err, "balance persistence failed");
        }
    }

    pub fn get_user_balance(&self, user_id: UserId) -> UserBalance {
        self.ledger.get(user_id)
    }

    fn validate(order: &Order) -> Result<(), EngineError> {
        if order.symbol.is_empty() {
            return Err(EngineError::InvalidSymbol { symbol: order.symbol.clone() });
        }
        if order.quantity == 0 {
            return Err(EngineError::InvalidQuantity { quantity: order.quantity });
        }
        if order.order_type == OrderType::Limit && order.price <= 0 {
            return Err(EngineError::InvalidPrice {
                detail: format!("limit order requires positive price, got {}", order.price),
            });
        }
        Ok(())
    }

    fn publish_error(&self, err: &EngineError) {
        publish_json(
            self.store.as_ref(),
            &self.config.channels.errors,
            &ErrorEvent::new(err.code(), err.to_string(), now_ms()),
        );
    }
}
