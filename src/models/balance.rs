use serde::{Deserialize, Serialize};

use crate::models::order::UserId;

/// Per-user cash position in cents.
///
/// `available + locked` is conserved by every ledger operation except
/// `initialize` and the cross-user `transfer` (which conserves the sum over
/// both users involved).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserBalance {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "availableBalance")]
    pub available: i64,
    #[serde(rename = "lockedBalance")]
    pub locked: i64,
}

impl UserBalance {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, available: 0, locked: 0 }
    }

    pub fn total(&self) -> i64 {
        self.available + self.locked
    }
}
