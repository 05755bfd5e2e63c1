//! Per-user cash ledger with available/locked pools.
//!
//! Order admission moves funds from available to locked; settlement releases
//! the locked portion and transfers the trade value to the seller. Every
//! operation is atomic under one ledger-wide mutex.

use std::sync::Mutex;

use rustc_hash::FxHashMap;

use crate::models::{EngineError, Order, OrderType, Side, UserBalance, UserId};

pub struct BalanceLedger {
    balances: Mutex<FxHashMap<UserId, UserBalance>>,
}

impl Default for BalanceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl BalanceLedger {
    pub fn new() -> Self {
        Self { balances: Mutex::new(FxHashMap::default()) }
    }

    /// Set a user's balance to `available = amount, locked = 0`, overwriting
    /// any existing entry.
    pub fn initialize(&self, user_id: UserId, amount: i64) {
        let mut balances = self.balances.lock().unwrap();
        balances.insert(user_id, UserBalance { user_id, available: amount, locked: 0 });
    }

    /// Snapshot of one user's balance, creating a zeroed entry if absent.
    pub fn get(&self, user_id: UserId) -> UserBalance {
        let mut balances = self.balances.lock().unwrap();
        *balances.entry(user_id).or_insert_with(|| UserBalance::new(user_id))
    }

    /// Snapshot of every balance, for periodic persistence.
    pub fn all(&self) -> Vec<UserBalance> {
        let balances = self.balances.lock().unwrap();
        balances.values().copied().collect()
    }

    /// Move `amount` from available to locked.
    pub fn lock(&self, user_id: UserId, amount: i64) -> Result<(), EngineError> {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user_id).or_insert_with(|| UserBalance::new(user_id));
        if balance.available < amount {
            return Err(EngineError::InsufficientBalance {
                user_id,
                required: amount,
                available: balance.available,
            });
        }
        balance.available -= amount;
        balance.locked += amount;
        Ok(())
    }

    /// Move `amount` from locked back to available. A shortfall here means a
    /// lock was never taken and is a bug, not a client error.
    pub fn unlock(&self, user_id: UserId, amount: i64) -> Result<(), EngineError> {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user_id).or_insert_with(|| UserBalance::new(user_id));
        if balance.locked < amount {
            return Err(EngineError::system(format!(
                "unlock of {} exceeds locked {} for user {}",
                amount, balance.locked, user_id
            )));
        }
        balance.locked -= amount;
        balance.available += amount;
        Ok(())
    }

    /// Move `amount` of available funds from one user to another.
    pub fn transfer(&self, from: UserId, to: UserId, amount: i64) -> Result<(), EngineError> {
        let mut balances = self.balances.lock().unwrap();
        let from_balance = balances.entry(from).or_insert_with(|| UserBalance::new(from));
        if from_balance.available < amount {
            return Err(EngineError::InsufficientBalance {
                user_id: from,
                required: amount,
                available: from_balance.available,
            });
        }
        if from == to {
            // Self-trade settlement: debit and credit cancel out.
            return Ok(());
        }
        from_balance.available -= amount;
        let to_balance = balances.entry(to).or_insert_with(|| UserBalance::new(to));
        to_balance.available += amount;
        Ok(())
    }

    /// Release a buyer's lock for one fill: `locked_amount` was reserved at
    /// the order's limit price, `actual_amount` is the cash actually spent.
    /// The whole reservation returns to available (keeping the user's total
    /// intact); the follow-up `transfer` to the seller then takes the spend.
    /// The trade price is never worse than the buyer's limit, so the refund
    /// `locked_amount - actual_amount` is non-negative for limit buys.
    pub fn complete_trade(
        &self,
        user_id: UserId,
        locked_amount: i64,
        actual_amount: i64,
    ) -> Result<(), EngineError> {
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(user_id).or_insert_with(|| UserBalance::new(user_id));
        if balance.locked < locked_amount {
            return Err(EngineError::system(format!(
                "trade completion of {} exceeds locked {} for user {}",
                locked_amount, balance.locked, user_id
            )));
        }
        balance.locked -= locked_amount;
        balance.available += locked_amount;
        if locked_amount > actual_amount {
            tracing::debug!(
                user_id,
                refund = locked_amount - actual_amount,
                "price improvement refund released"
            );
        }
        Ok(())
    }

    /// Funds that must be locked before the order may trade. Sellers are not
    /// required to pre-own shares in this mock, and market buys carry no
    /// price bound to reserve against.
    pub fn required_funds(&self, order: &Order) -> i64 {
        match (order.side, order.order_type) {
            (Side::Buy, OrderType::Limit) => order.price * order.quantity as i64,
            _ => 0,
        }
    }
}
