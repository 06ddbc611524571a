// ABOUTME: Per-record async locks so read-modify-write cycles on one record never interleave
// ABOUTME: Different keys lock independently; guards are owned and can be held across awaits

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    pub async fn lock_document(&self, id: &str) -> OwnedMutexGuard<()> {
        self.lock(&format!("document:{}", id)).await
    }

    pub async fn lock_workspace(&self, id: &str) -> OwnedMutexGuard<()> {
        self.lock(&format!("workspace:{}", id)).await
    }

    /// Drop the entry for a deleted record. Holders of the old lock keep it.
    pub fn forget(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.remove(key);
    }

    pub fn forget_document(&self, id: &str) {
        self.forget(&format!("document:{}", id));
    }

    pub fn forget_workspace(&self, id: &str) {
        self.forget(&format!("workspace:{}", id));
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
