//! The ConfigStore engine: versioned per-key storage, simulating the
//! backing KV's monotonic revision semantics in-memory, plus the
//! composite resolution algorithm in `resolve`.

pub mod resolve;

use aio_core::{ConfigItem, ConfigValue, Error, Result};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Historical versions retained per storage key unless storage limits
/// force truncation (default depth 10).
pub const DEFAULT_HISTORY_DEPTH: usize = 10;

struct StorageKeyState {
    /// All retained versions, oldest first. The last entry is current
    /// unless `tombstoned` is set, in which case the key resolves as
    /// absent but its history remains fetchable by revision.
    history: Vec<ConfigItem>,
    tombstoned: bool,
}

pub struct ConfigEngine {
    storage: RwLock<HashMap<String, StorageKeyState>>,
    history_depth: usize,
    clock: Arc<dyn aio_core::Clock>,
    change_tx: RwLock<HashMap<String, broadcast::Sender<()>>>,
}

impl ConfigEngine {
    pub fn new(clock: Arc<dyn aio_core::Clock>) -> Self {
        ConfigEngine {
            storage: RwLock::new(HashMap::new()),
            history_depth: DEFAULT_HISTORY_DEPTH,
            clock,
            change_tx: RwLock::new(HashMap::new()),
        }
    }

    fn now(&self) -> i64 {
        self.clock.now()
    }

    fn notify(&self, logical_key: &str) {
        let txs = self.change_tx.read();
        if let Some(tx) = txs.get(logical_key) {
            let _ = tx.send(());
        }
    }

    fn subscribe(&self, logical_key: &str) -> broadcast::Receiver<()> {
        if let Some(tx) = self.change_tx.read().get(logical_key) {
            return tx.subscribe();
        }
        let mut txs = self.change_tx.write();
        let tx = txs
            .entry(logical_key.to_string())
            .or_insert_with(|| broadcast::channel(16).0);
        tx.subscribe()
    }

    pub fn create_config(
        &self,
        key: &str,
        properties: BTreeMap<String, ConfigValue>,
        metadata: BTreeMap<String, String>,
        description: String,
        _change_note: String,
    ) -> Result<ConfigItem> {
        let (logical_key, env) = aio_core::ConfigItem::split_storage_key(key)
            .ok_or_else(|| Error::invalid_argument(format!("'{key}' is missing an environment segment")))?;

        let mut storage = self.storage.write();
        let state = storage.entry(key.to_string()).or_insert_with(|| StorageKeyState {
            history: Vec::new(),
            tombstoned: true,
        });

        if !state.tombstoned && !state.history.is_empty() {
            return Err(Error::already_exists(format!("config key '{key}'")));
        }

        let version = state.history.last().map(|i| i.version + 1).unwrap_or(1);
        let now = self.now();
        let item = ConfigItem {
            logical_key: logical_key.to_string(),
            env: env.to_string(),
            properties,
            version,
            metadata,
            description,
            created_at: now,
            updated_at: now,
        };
        push_history(state, item.clone(), self.history_depth);
        state.tombstoned = false;
        drop(storage);
        self.notify(logical_key);
        Ok(item)
    }

    pub fn update_config(
        &self,
        key: &str,
        properties: BTreeMap<String, ConfigValue>,
        metadata: BTreeMap<String, String>,
        description: String,
        _change_note: String,
    ) -> Result<ConfigItem> {
        let (logical_key, env) = aio_core::ConfigItem::split_storage_key(key)
            .ok_or_else(|| Error::invalid_argument(format!("'{key}' is missing an environment segment")))?;

        let mut storage = self.storage.write();
        let state = storage
            .get_mut(key)
            .filter(|s| !s.tombstoned && !s.history.is_empty())
            .ok_or_else(|| Error::not_found(format!("config key '{key}'")))?;

        let version = state.history.last().map(|i| i.version + 1).unwrap_or(1);
        let now = self.now();
        let created_at = state.history.first().map(|i| i.created_at).unwrap_or(now);
        let item = ConfigItem {
            logical_key: logical_key.to_string(),
            env: env.to_string(),
            properties,
            version,
            metadata,
            description,
            created_at,
            updated_at: now,
        };
        push_history(state, item.clone(), self.history_depth);
        drop(storage);
        self.notify(logical_key);
        Ok(item)
    }

    pub fn delete_config(&self, key: &str) -> Result<()> {
        let (logical_key, _env) = aio_core::ConfigItem::split_storage_key(key)
            .ok_or_else(|| Error::invalid_argument(format!("'{key}' is missing an environment segment")))?;

        let mut storage = self.storage.write();
        let state = storage
            .get_mut(key)
            .filter(|s| !s.tombstoned && !s.history.is_empty())
            .ok_or_else(|| Error::not_found(format!("config key '{key}'")))?;
        state.tombstoned = true;
        drop(storage);
        self.notify(logical_key);
        Ok(())
    }

    fn lookup_current(&self, storage_key: &str) -> Option<ConfigItem> {
        let storage = self.storage.read();
        let state = storage.get(storage_key)?;
        if state.tombstoned {
            return None;
        }
        state.history.last().cloned()
    }

    /// Resolves `logical_key` under `(env, fallback)` into the merged,
    /// ref-expanded JSON object.
    pub fn get_config_json(&self, logical_key: &str, env: &str, fallback: Option<&[String]>) -> Result<serde_json::Value> {
        let lookup = |k: &str| self.lookup_current(k);
        resolve::resolve_logical(logical_key, env, fallback, &lookup, &mut HashSet::new())
    }

    /// Missing or deleted keys are omitted from the result rather than
    /// projected as an empty object.
    pub fn batch_get_configs(&self, logical_keys: &[String], env: &str) -> Result<HashMap<String, serde_json::Value>> {
        let mut out = HashMap::new();
        for key in logical_keys {
            let lookup = |k: &str| self.lookup_current(k);
            if !resolve::logical_key_exists(key, env, None, &lookup) {
                continue;
            }
            let json = self.get_config_json(key, env, None)?;
            out.insert(key.clone(), json);
        }
        Ok(out)
    }

    /// Returns every logical key under `prefix`, each resolved for
    /// `env`. A logical key is "seen" if any of its environment-scoped
    /// storage keys has a non-tombstoned entry.
    pub fn get_configs_by_prefix(&self, prefix: &str, env: &str) -> Result<HashMap<String, serde_json::Value>> {
        let logical_keys: HashSet<String> = {
            let storage = self.storage.read();
            storage
                .iter()
                .filter(|(_, state)| !state.tombstoned && !state.history.is_empty())
                .filter_map(|(storage_key, _)| aio_core::ConfigItem::split_storage_key(storage_key))
                .map(|(logical, _)| logical.to_string())
                .filter(|logical| logical.starts_with(prefix))
                .collect()
        };

        let mut out = HashMap::new();
        for logical_key in logical_keys {
            if let Ok(json) = self.get_config_json(&logical_key, env, None) {
                out.insert(logical_key, json);
            }
        }
        Ok(out)
    }

    pub fn get_history(&self, key: &str, limit: usize) -> Vec<ConfigItem> {
        let storage = self.storage.read();
        let Some(state) = storage.get(key) else {
            return Vec::new();
        };
        let mut items: Vec<ConfigItem> = state.history.iter().rev().take(limit).cloned().collect();
        items.sort_by(|a, b| b.version.cmp(&a.version));
        items
    }

    pub fn get_by_revision(&self, key: &str, revision: u64) -> Result<ConfigItem> {
        let storage = self.storage.read();
        storage
            .get(key)
            .and_then(|state| state.history.iter().find(|i| i.version == revision).cloned())
            .ok_or_else(|| Error::not_found(format!("revision {revision} of '{key}'")))
    }

    /// A stream of resolved JSON for `(logical_key, env)`, emitting the
    /// current value immediately and again whenever a write to the key
    /// (or anything in its fallback chain) might change it. Consumers
    /// dedup against their own last-seen value.
    pub fn watch_changes(self: &Arc<Self>, logical_key: String, env: String) -> impl futures::Stream<Item = Result<serde_json::Value>> {
        let engine = Arc::clone(self);
        let mut rx = self.subscribe(&logical_key);
        async_stream::try_stream! {
            yield engine.get_config_json(&logical_key, &env, None)?;
            loop {
                match rx.recv().await {
                    Ok(()) => yield engine.get_config_json(&logical_key, &env, None)?,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

fn push_history(state: &mut StorageKeyState, item: ConfigItem, depth: usize) {
    state.history.push(item);
    while state.history.len() > depth {
        state.history.remove(0);
    }
}
