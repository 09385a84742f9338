use std::sync::Arc;

use log::{error, info};
use murmur_session::{LoadOutcome, LoadReport, SessionState};
use serde::Serialize;
use tauri::State;

use crate::setup::ChatSession;

// ===== MODEL SESSION COMMANDS =====

/// Catalog entry with its selection and load status
#[derive(Debug, Clone, Serialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,
    pub is_selected: bool,
    pub is_loaded: bool,
}

/// Snapshot of the model session for the UI
#[derive(Debug, Clone, Serialize, specta::Type)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub selected_model: Option<String>,
    pub is_selected_model_ready: bool,
    pub is_generating: bool,
    pub last_load: Option<LoadReport>,
}

/// Get list of all catalog models with their current status
#[tauri::command]
#[specta::specta]
pub fn get_available_models(chat: State<Arc<ChatSession>>) -> Vec<ModelInfo> {
    let selected = chat.selected_model().map(|m| m.name);
    let loaded = chat.session().loaded_model();

    chat.catalog()
        .iter()
        .map(|model| ModelInfo {
            name: model.name.clone(),
            is_selected: selected.as_deref() == Some(model.name.as_str()),
            is_loaded: loaded.as_deref() == Some(model.name.as_str()),
        })
        .collect()
}

/// Select a model and load it (disposing whatever was loaded)
#[tauri::command]
#[specta::specta]
pub async fn select_model(
    chat: State<'_, Arc<ChatSession>>,
    model_name: String,
) -> Result<(), String> {
    match chat.select_model(&model_name).await {
        Ok(outcome) => {
            log_outcome(&model_name, &outcome);
            Ok(())
        }
        Err(e) => {
            error!("Failed to select model '{}': {}", model_name, e);
            Err(e.user_message())
        }
    }
}

/// Load the selected model (e.g. retry after a failure)
#[tauri::command]
#[specta::specta]
pub async fn load_selected_model(chat: State<'_, Arc<ChatSession>>) -> Result<(), String> {
    match chat.load_selected_model().await {
        Ok(outcome) => {
            let name = chat.selected_model().map(|m| m.name).unwrap_or_default();
            log_outcome(&name, &outcome);
            Ok(())
        }
        Err(e) => {
            error!("Failed to load selected model: {}", e);
            Err(e.user_message())
        }
    }
}

/// Unload the current model (frees memory)
#[tauri::command]
#[specta::specta]
pub async fn unload_model(chat: State<'_, Arc<ChatSession>>) -> Result<(), String> {
    chat.session().dispose().await.map_err(|e| {
        error!("Failed to unload model: {}", e);
        e.user_message()
    })
}

#[tauri::command]
#[specta::specta]
pub fn get_session_status(chat: State<Arc<ChatSession>>) -> SessionStatus {
    let session = chat.session();
    SessionStatus {
        state: session.state(),
        selected_model: chat.selected_model().map(|m| m.name),
        is_selected_model_ready: chat.is_selected_model_ready(),
        is_generating: session.is_generating(),
        last_load: session.last_report(),
    }
}

fn log_outcome(model_name: &str, outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Loaded(report) => info!(
            "Model '{}' ready (load {}ms, warmup {}ms)",
            report.model, report.load_ms, report.warmup_ms
        ),
        LoadOutcome::AlreadyLoaded => info!("Model '{}' already loaded", model_name),
        LoadOutcome::AlreadyLoading => info!("Model '{}' is already loading", model_name),
    }
}
