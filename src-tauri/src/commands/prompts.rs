use std::sync::Arc;

use log::error;
use murmur_session::PromptTemplate;
use tauri::State;

use crate::setup::ChatSession;

// ===== PROMPT TEMPLATE COMMANDS =====

#[tauri::command]
#[specta::specta]
pub fn get_prompts(chat: State<Arc<ChatSession>>) -> Vec<PromptTemplate> {
    chat.prompts()
}

/// The active template, `None` for untemplated chat
#[tauri::command]
#[specta::specta]
pub fn get_selected_prompt(chat: State<Arc<ChatSession>>) -> Option<PromptTemplate> {
    chat.selected_prompt()
}

#[tauri::command]
#[specta::specta]
pub fn select_prompt(chat: State<Arc<ChatSession>>, label: String) -> Result<(), String> {
    chat.select_prompt(&label).map_err(|e| {
        error!("Failed to select prompt: {}", e);
        e.user_message()
    })
}

/// Back to untemplated chat
#[tauri::command]
#[specta::specta]
pub fn clear_prompt(chat: State<Arc<ChatSession>>) {
    chat.clear_prompt();
}

/// Add or replace a template by label, select it, and save all templates
#[tauri::command]
#[specta::specta]
pub fn update_prompt(
    chat: State<Arc<ChatSession>>,
    template: PromptTemplate,
) -> Result<(), String> {
    if template.label.trim().is_empty() {
        return Err("Prompt label cannot be empty".to_string());
    }
    chat.update_prompt(template).map_err(|e| {
        error!("Failed to update prompt: {}", e);
        e.user_message()
    })
}

/// The exact prompt the model would receive for `text`
#[tauri::command]
#[specta::specta]
pub fn preview_prompt(chat: State<Arc<ChatSession>>, text: String) -> String {
    chat.build_prompt(&text)
}
