use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Mutex, PoisonError};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::backend::{Accelerator, LoadOptions};
use crate::error::StoreError;
use crate::prompts::PromptTemplate;

/// Type-safe configuration key that associates a key name with its value type
#[derive(Debug, Clone, Copy)]
pub struct ConfigKey<T> {
    name: &'static str,
    _phantom: PhantomData<T>,
}

impl<T> ConfigKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _phantom: PhantomData,
        }
    }

    pub fn key_name(&self) -> &'static str {
        self.name
    }
}

// ===== App Configuration =====

/// App configuration (stored locally)
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Name of the selected catalog model (e.g., "Gemma-3-1B")
    #[serde(default)]
    pub selected_model: Option<String>,
    /// Preferred compute device (default: GPU)
    #[serde(default)]
    pub accelerator: Accelerator,
    /// Upper bound on generated tokens per message
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_max_output_tokens() -> u32 {
    LoadOptions::default().max_output_tokens
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            selected_model: None,
            accelerator: Accelerator::default(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

impl AppConfig {
    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            accelerator: self.accelerator,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

impl ConfigKey<AppConfig> {
    pub const APP: Self = Self::new("appConfig");
}

// ===== Speech Configuration =====

/// Speech service settings; the subscription key lives in the keychain
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    /// Azure region (e.g., "westeurope")
    #[serde(default)]
    pub region: Option<String>,
    /// Recognition language (BCP-47)
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en-US".to_string()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            region: None,
            language: default_language(),
        }
    }
}

impl ConfigKey<SpeechConfig> {
    pub const SPEECH: Self = Self::new("speechConfig");
}

// ===== Prompt Templates =====

impl ConfigKey<Vec<PromptTemplate>> {
    pub const PROMPTS: Self = Self::new("prompts");
}

// ===== Type-Safe Config Store =====

pub trait ConfigStore: Send + Sync {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T>;
    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), StoreError>;
    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), StoreError>;
}

/// In-memory store, used in tests and when no persistent store is available
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON stored under `name`
    pub fn raw(&self, name: &str) -> Option<serde_json::Value> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl ConfigStore for MemoryStore {
    fn get<T: DeserializeOwned>(&self, key: &ConfigKey<T>) -> Option<T> {
        self.raw(key.key_name())
            .and_then(|v| serde_json::from_value(v).ok())
    }

    fn set<T: Serialize>(&self, key: &ConfigKey<T>, value: T) -> Result<(), StoreError> {
        let val = serde_json::to_value(value).map_err(|source| StoreError::Serialize {
            key: key.key_name(),
            source,
        })?;
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.key_name().to_string(), val);
        Ok(())
    }

    fn delete<T>(&self, key: &ConfigKey<T>) -> Result<(), StoreError> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key.key_name());
        Ok(())
    }
}
