use std::sync::Arc;

use murmur_session::{ConfigKey, ConfigStore, StoreError};
use serde::{de::DeserializeOwned, Serialize};

/// Type-safe configuration store that wraps the Tauri plugin store
#[derive(Clone)]
pub struct Config {
    store: Arc<tauri_plugin_store::Store<tauri::Wry>>,
}

impl Config {
    pub fn new(store: Arc<tauri_plugin_store::Store<tauri::Wry>>) -> Self {
        Self { store }
    }
}

impl ConfigStore for Config {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.store
            .get(key.key_name())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), StoreError> {
        let val = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            key: key.key_name(),
            source,
        })?;
        self.store.set(key.key_name(), val);
        self.store
            .save()
            .map_err(|e| StoreError::Persist(e.to_string()))
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), StoreError> {
        self.store.delete(key.key_name());
        self.store
            .save()
            .map_err(|e| StoreError::Persist(e.to_string()))
    }
}
