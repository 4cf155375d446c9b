//! Read-through TTL cache.
//!
//! An explicit handle owned by the caller, never module-level state. Cold
//! or expired reads fall through to the loader; the cache only ever
//! shortcuts, it is not a source of truth.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::Result;

struct Entry<T> {
    value: T,
    stored_at: Instant,
}

pub struct Cache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T: Clone> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Cache<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value for `key` when younger than `ttl`,
    /// otherwise run `loader` and cache its result. Loader errors are not
    /// cached.
    pub async fn get_or_populate<F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(key) {
            if entry.stored_at.elapsed() < ttl {
                return Ok(entry.value.clone());
            }
        }

        let value = loader().await?;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(value)
    }

    /// Drop one cached entry.
    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    /// Drop everything.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
