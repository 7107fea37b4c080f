//! In-process store backed by a concurrent map.
//!
//! Each key lives in one `DashMap` shard; `increment` runs under that
//! shard's write lock, which makes it atomic with respect to every other
//! operation on the same key. Expiry is evaluated lazily against the
//! injected clock, with `purge_expired` for periodic cleanup.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry as MapEntry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::resilience::clock::{Clock, SystemClock};
use crate::store::{CacheStore, CounterStore, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Counter(i64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Duration>,
}

impl Entry {
    fn is_expired(&self, now: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn deadline(now: Duration, secs: u64) -> StoreResult<Duration> {
    now.checked_add(Duration::from_secs(secs))
        .ok_or_else(|| StoreError::Inconsistent(format!("expiry of {}s is out of range", secs)))
}

/// Thread-safe in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Drop every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep expired keys every `interval` until `stop` fires.
    pub fn spawn_purger(
        &self,
        interval: Duration,
        mut stop: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, "Expired keys purged");
                        }
                    }
                    _ = stop.recv() => break,
                }
            }
        })
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is present and unexpired.
    pub fn contains_key(&self, key: &str) -> bool {
        let now = self.clock.now();
        self.entries.get(key).is_some_and(|e| !e.is_expired(now))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let now = self.clock.now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if entry.is_expired(now) {
                    *entry = Entry {
                        value: Value::Counter(1),
                        expires_at: None,
                    };
                    return Ok(1);
                }
                match &mut entry.value {
                    Value::Counter(n) => {
                        *n = n.checked_add(1).ok_or_else(|| {
                            StoreError::Inconsistent(format!("counter '{}' overflowed", key))
                        })?;
                        Ok(*n)
                    }
                    Value::Text(_) => Err(StoreError::Inconsistent(format!(
                        "value at '{}' is not an integer",
                        key
                    ))),
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry {
                    value: Value::Counter(1),
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn set_expiry(&self, key: &str, seconds: u64) -> StoreResult<()> {
        let now = self.clock.now();
        let expires_at = deadline(now, seconds)?;
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(expires_at);
            }
        }
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> StoreResult<i64> {
        let now = self.clock.now();
        let ttl = match self.entries.get(key) {
            None => -2,
            Some(entry) if entry.is_expired(now) => -2,
            Some(entry) => match entry.expires_at {
                None => -1,
                // Rounded to the nearest second, as Redis does.
                Some(at) => ((at - now).as_millis() as i64 + 500) / 1000,
            },
        };
        Ok(ttl)
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = self.clock.now();
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if entry.is_expired(now) {
            return Ok(None);
        }
        match &entry.value {
            Value::Text(s) => Ok(Some(s.clone())),
            Value::Counter(n) => Ok(Some(n.to_string())),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let expires_at = deadline(self.clock.now(), ttl_secs)?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
