//! Per-agent locks and cancellation signals

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{watch, OwnedMutexGuard};

/// One async mutex per key
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Take the lock for `key` without waiting
    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(key).try_lock_owned().ok()
    }

    /// Wait for the lock for `key`
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    pub fn is_locked(&self, key: &str) -> bool {
        self.lock_for(key).try_lock().is_err()
    }
}

type Senders = Arc<Mutex<HashMap<String, (u64, watch::Sender<bool>)>>>;

/// Cancellation signals of in-flight deployments
#[derive(Default)]
pub struct CancelRegistry {
    senders: Senders,
    next_id: AtomicU64,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight operation for `key`. The entry is removed when
    /// the returned guard drops.
    pub fn register(&self, key: &str) -> CancelGuard {
        let (tx, rx) = watch::channel(false);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.insert(key.to_string(), (id, tx));
        CancelGuard {
            key: key.to_string(),
            id,
            senders: self.senders.clone(),
            rx,
        }
    }

    /// Signal the operation registered for `key`. Returns whether one was
    /// registered.
    pub fn cancel(&self, key: &str) -> bool {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        match senders.get(key) {
            Some((_, tx)) => {
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, key: &str) -> bool {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.contains_key(key)
    }
}

/// Held by an in-flight operation
pub struct CancelGuard {
    key: String,
    id: u64,
    senders: Senders,
    rx: watch::Receiver<bool>,
}

impl CancelGuard {
    /// Resolves once cancellation has been requested
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
        // Sender gone without a cancel; never resolve
        std::future::pending::<()>().await
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        // A newer registration under the same key keeps its entry
        if senders.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
            senders.remove(&self.key);
        }
    }
}
