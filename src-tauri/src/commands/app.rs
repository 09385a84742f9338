use std::sync::Arc;

use log::{error, info};
use murmur_session::{Accelerator, AppConfig, ConfigKey, ConfigStore};
use tauri::State;

use crate::config::Config;
use crate::setup::ChatSession;

/// Get the application version with -local suffix when running in debug mode
#[tauri::command]
#[specta::specta]
pub fn get_app_version() -> String {
    let version = env!("CARGO_PKG_VERSION");

    if cfg!(debug_assertions) {
        format!("{}-local", version)
    } else {
        version.to_string()
    }
}

// ===== GENERAL APP CONFIGURATION COMMANDS =====

/// Load the app configuration with the current model selection applied
#[tauri::command]
#[specta::specta]
pub fn load_app_config(chat: State<Arc<ChatSession>>) -> AppConfig {
    chat.app_config()
}

/// Save inference settings; they apply to the next model load
#[tauri::command]
#[specta::specta]
pub fn save_app_config(
    chat: State<Arc<ChatSession>>,
    config_store: State<Config>,
    accelerator: Option<Accelerator>,
    max_output_tokens: Option<u32>,
) -> Result<(), String> {
    // Load existing config to preserve fields that aren't being updated
    let mut config = chat.app_config();

    if let Some(accelerator) = accelerator {
        config.accelerator = accelerator;
    }
    if let Some(max_tokens) = max_output_tokens {
        if max_tokens == 0 {
            return Err("Max output tokens must be at least 1".to_string());
        }
        config.max_output_tokens = max_tokens;
    }

    let options = config.load_options();
    config_store.set(&ConfigKey::APP, config).map_err(|e| {
        error!("Failed to save app config: {}", e);
        "Failed to save settings. Check disk space.".to_string()
    })?;

    chat.session().set_load_options(options);
    info!(
        "Inference settings updated: {} accelerator, {} max tokens",
        options.accelerator, options.max_output_tokens
    );
    Ok(())
}
