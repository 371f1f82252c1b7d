//! Short-TTL response cache for read-only data-source calls
//!
//! Entries are keyed by (call name, argument, network). Writes are never
//! cached; a broadcast invalidates the balance and UTXO entries of every
//! address it can be attributed to.

use crate::network::Network;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub call: &'static str,
    pub argument: String,
    pub network: Network,
}

impl CacheKey {
    pub fn new(call: &'static str, argument: impl Into<String>, network: Network) -> Self {
        Self {
            call,
            argument: argument.into(),
            network,
        }
    }
}

struct Entry {
    value: serde_json::Value,
    inserted: Instant,
}

pub(crate) struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, Entry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                serde_json::from_value(entry.value.clone()).ok()
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put<T: Serialize>(&self, key: CacheKey, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.entries.lock().unwrap().insert(
                key,
                Entry {
                    value,
                    inserted: Instant::now(),
                },
            );
        }
    }

    /// Drop the balance and UTXO entries for one address.
    pub fn invalidate_address(&self, address: &str, network: Network) {
        self.entries.lock().unwrap().retain(|key, _| {
            !(key.network == network
                && key.argument == address
                && matches!(key.call, "balance" | "utxos"))
        });
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
