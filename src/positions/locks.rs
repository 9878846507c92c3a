use crate::logger::{ self, LogTag };
use parking_lot::Mutex;
use std::{ collections::HashMap, sync::Arc };
use tokio::sync::{ Mutex as AsyncMutex, OwnedMutexGuard };

/// Per-ticker lock registry
///
/// Serializes writers for the same ticker inside one process while leaving
/// different tickers fully parallel. Cross-process exclusion comes from the
/// store's immediate transactions; this layer keeps in-process writers from
/// queueing on SQLite's busy handler.
#[derive(Clone, Default)]
pub struct TickerLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held while a ticker's transaction runs; releasing it prunes idle entries
#[derive(Debug)]
pub struct TickerLockGuard {
    ticker: String,
    owned_guard: Option<OwnedMutexGuard<()>>,
    registry: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl TickerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for a ticker, waiting for any current holder
    pub async fn acquire(&self, ticker: &str) -> TickerLockGuard {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(ticker.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let owned_guard = lock.lock_owned().await;

        logger::debug(LogTag::Store, &format!("🔒 Acquired ticker lock for {}", ticker));

        TickerLockGuard {
            ticker: ticker.to_string(),
            owned_guard: Some(owned_guard),
            registry: self.locks.clone(),
        }
    }

    #[cfg(test)]
    fn active_locks(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Drop for TickerLockGuard {
    fn drop(&mut self) {
        // Release first so a waiter's clone is the only other reference left
        self.owned_guard.take();

        let mut locks = self.registry.lock();
        if let Some(lock) = locks.get(&self.ticker) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(&self.ticker);
            }
        }
        drop(locks);

        logger::debug(LogTag::Store, &format!("🔓 Released ticker lock for {}", self.ticker));
    }
}
