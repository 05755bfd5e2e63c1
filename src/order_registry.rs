//! Authoritative store of every order ever created, terminal ones included,
//! with a per-user index. Books hold only the resting subset; status queries
//! always come here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;

use crate::balance_ledger::BalanceLedger;
use crate::models::{EngineError, Order, OrderId, OrderStatus, Side, UserId};

#[derive(Default)]
struct RegistryInner {
    orders: FxHashMap<OrderId, Order>,
    user_orders: FxHashMap<UserId, Vec<OrderId>>,
}

pub struct OrderRegistry {
    inner: Mutex<RegistryInner>,
    // Relaxed is enough: ids only need to be unique, priority keys off the
    // per-order timestamp and FIFO insertion.
    next_order_id: AtomicU64,
    ledger: Arc<BalanceLedger>,
}

impl OrderRegistry {
    pub fn new(ledger: Arc<BalanceLedger>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            next_order_id: AtomicU64::new(1),
            ledger,
        }
    }

    pub fn next_order_id(&self) -> OrderId {
        self.next_order_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn create(&self, order: Order) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.orders.contains_key(&order.id) {
            return Err(EngineError::DuplicateOrder { order_id: order.id });
        }
        inner.user_orders.entry(order.user_id).or_default().push(order.id);
        inner.orders.insert(order.id, order);
        Ok(())
    }

    pub fn get(&self, order_id: OrderId) -> Option<Order> {
        let inner = self.inner.lock().unwrap();
        inner.orders.get(&order_id).cloned()
    }

    pub fn update_status(&self, order_id: OrderId, status: OrderStatus) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.status = status;
        }
    }

    /// Add `delta` to the order's filled quantity and recompute its status:
    /// FILLED once full, PARTIALLY_FILLED while 0 < filled < total.
    pub fn update_filled_quantity(&self, order_id: OrderId, delta: u64) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(order) = inner.orders.get_mut(&order_id) {
            order.filled_quantity += delta;
            if order.filled_quantity >= order.quantity {
                order.status = OrderStatus::Filled;
            } else if order.filled_quantity > 0 {
                order.status = OrderStatus::PartiallyFilled;
            }
        }
    }

    pub fn user_orders(&self, user_id: UserId) -> Vec<Order> {
        let inner = self.inner.lock().unwrap();
        inner
            .user_orders
            .get(&user_id)
            .map(|ids| ids.iter().filter_map(|id| inner.orders.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn active_orders(&self, symbol: &str) -> Vec<Order> {
        let inner = self.inner.lock().unwrap();
        inner
            .orders
            .values()
            .filter(|o| {
                o.symbol == symbol
                    && matches!(o.status, OrderStatus::Pending | OrderStatus::PartiallyFilled)
            })
            .cloned()
            .collect()
    }

    /// Cancel a PENDING or PARTIALLY_FILLED order, unlocking the remainder of
    /// the buyer's reservation. Returns the cancelled order so the caller can
    /// remove it from its book and publish the update.
    pub fn cancel(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(EngineError::OrderNotFound { order_id })?;

        if !matches!(order.status, OrderStatus::Pending | OrderStatus::PartiallyFilled) {
            return Err(EngineError::system(format!(
                "cannot cancel order {} in status {}",
                order_id, order.status
            )));
        }

        if order.side == Side::Buy {
            let remainder = order.price * order.remaining() as i64;
            if remainder > 0 {
                self.ledger.unlock(order.user_id, remainder)?;
            }
        }

        order.status = OrderStatus::Cancelled;
        Ok(order.clone())
    }
}
