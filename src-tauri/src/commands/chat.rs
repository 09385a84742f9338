use std::sync::Arc;

use log::error;
use murmur_session::{InferenceRecord, SendOutcome};
use tauri::State;

use crate::setup::ChatSession;

// ===== CHAT COMMANDS =====

/// Send `text` to the selected model; skipped sends are not errors
#[tauri::command]
#[specta::specta]
pub async fn send_message(
    chat: State<'_, Arc<ChatSession>>,
    text: String,
) -> Result<SendOutcome, String> {
    chat.send_message(&text).await.map_err(|e| {
        error!("Failed to send message: {}", e);
        e.user_message()
    })
}

/// Send whatever is in the input buffer and clear it
#[tauri::command]
#[specta::specta]
pub async fn submit_input(chat: State<'_, Arc<ChatSession>>) -> Result<SendOutcome, String> {
    chat.submit_input().await.map_err(|e| {
        error!("Failed to submit input: {}", e);
        e.user_message()
    })
}

/// Replace the input buffer (typing in the text box)
#[tauri::command]
#[specta::specta]
pub fn set_chat_input(chat: State<Arc<ChatSession>>, text: String) {
    chat.input().set(text);
}

#[tauri::command]
#[specta::specta]
pub fn get_chat_input(chat: State<Arc<ChatSession>>) -> String {
    chat.input().get()
}

#[tauri::command]
#[specta::specta]
pub fn get_transcript(chat: State<Arc<ChatSession>>) -> Vec<InferenceRecord> {
    chat.transcript()
}

/// Wipe the transcript; model and prompt selection are kept
#[tauri::command]
#[specta::specta]
pub fn clear_transcript(chat: State<Arc<ChatSession>>) {
    chat.clear_transcript();
}
