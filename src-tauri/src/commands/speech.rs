use std::sync::Arc;

use log::{error, warn};
use murmur_session::{ConfigKey, ConfigStore, SpeechConfig, SpeechInput};
use secrecy::SecretString;
use serde::Serialize;
use tauri::State;
use tauri_specta::Event;

use crate::config::Config;
use crate::events::SpeechCaptureStateChanged;
use crate::keychain;

// ===== SPEECH CAPTURE COMMANDS =====

/// Start dictating into the chat input
#[tauri::command]
#[specta::specta]
pub async fn start_speech_capture(
    app: tauri::AppHandle,
    speech: State<'_, Arc<SpeechInput>>,
) -> Result<(), String> {
    if let Err(e) = speech.start().await {
        error!("Failed to start speech capture: {}", e);
        let event = SpeechCaptureStateChanged::Error {
            error: e.to_string(),
            user_message: e.user_message(),
        };
        if let Err(emit_err) = event.emit(&app) {
            error!("Failed to emit SpeechCaptureStateChanged: {}", emit_err);
        }
        return Err(e.user_message());
    }
    Ok(())
}

/// Stop dictating; returns false if nothing was running
#[tauri::command]
#[specta::specta]
pub async fn stop_speech_capture(speech: State<'_, Arc<SpeechInput>>) -> Result<bool, String> {
    Ok(speech.stop().await)
}

#[tauri::command]
#[specta::specta]
pub fn is_speech_capturing(speech: State<Arc<SpeechInput>>) -> bool {
    speech.is_capturing()
}

// ===== SPEECH SETTINGS COMMANDS =====

/// Frontend-facing speech settings (never exposes the key)
#[derive(Debug, Clone, Serialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct SpeechSettings {
    pub region: Option<String>,
    pub language: String,
    pub has_key: bool,
}

#[tauri::command]
#[specta::specta]
pub fn load_speech_config(config_store: State<Config>) -> SpeechSettings {
    let config: SpeechConfig = config_store.get(&ConfigKey::SPEECH).unwrap_or_default();
    SpeechSettings {
        region: config.region,
        language: config.language,
        has_key: keychain::resolve_speech_key().is_some(),
    }
}

/// Save region/language; a key, when given, goes to the keychain
#[tauri::command]
#[specta::specta]
pub fn save_speech_config(
    config_store: State<Config>,
    region: Option<String>,
    language: Option<String>,
    key: Option<String>,
) -> Result<(), String> {
    let mut config: SpeechConfig = config_store.get(&ConfigKey::SPEECH).unwrap_or_default();

    if let Some(region) = region {
        let region = region.trim().to_string();
        config.region = (!region.is_empty()).then_some(region);
    }
    if let Some(language) = language {
        let language = language.trim();
        if language.is_empty() {
            warn!("Ignoring empty speech language");
        } else {
            config.language = language.to_string();
        }
    }

    config_store.set(&ConfigKey::SPEECH, config).map_err(|e| {
        error!("Failed to save speech config: {}", e);
        "Failed to save speech settings. Check disk space.".to_string()
    })?;

    if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
        keychain::save_speech_key(&SecretString::from(key.trim().to_string()))
            .map_err(|e| format!("Failed to save speech key: {}", e))?;
    }
    Ok(())
}

#[tauri::command]
#[specta::specta]
pub fn delete_speech_key() -> Result<(), String> {
    keychain::delete_speech_key().map_err(|e| format!("Failed to delete speech key: {}", e))
}
