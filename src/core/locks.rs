//! Per-user serialization of read-modify-write sequences.

use crate::infrastructure::entities::UserId;
use di::{inject, injectable};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Hands out one async mutex per user; different users never contend.
#[derive(Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
}

#[injectable]
impl UserLocks {
    #[inject]
    pub fn new() -> UserLocks {
        UserLocks::default()
    }
}

impl UserLocks {
    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Drop entries nobody holds so the map tracks active users only.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(user_id).or_default().clone()
        };

        lock.lock_owned().await
    }
}
