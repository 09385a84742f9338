//! Typesafe events emitted to the frontend.
//!
//! Core crates publish on plain channels; the forwarders here translate
//! those into tauri-specta events so TypeScript gets discriminated unions.

use log::{debug, error, warn};
use murmur_session::{CaptureEvent, SessionEvent};
use serde::{Deserialize, Serialize};
use tauri::AppHandle;
use tauri_specta::Event;
use tokio::sync::{broadcast, watch};

/// Model loading state change event - single event stream for all loading state transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ModelLoadingStateChanged {
    /// Model loading has started
    #[serde(rename = "started")]
    Started {
        #[serde(rename = "modelName")]
        model_name: String,
    },
    /// Approximate load progress (0-90) while the artifact is read
    #[serde(rename = "progress")]
    Progress {
        #[serde(rename = "modelName")]
        model_name: String,
        progress: u8,
    },
    /// Loaded, running the warmup generation
    #[serde(rename = "warming")]
    Warming {
        #[serde(rename = "modelName")]
        model_name: String,
        #[serde(rename = "loadMs")]
        load_ms: u64,
    },
    /// Model is ready for messages
    #[serde(rename = "ready")]
    Ready {
        #[serde(rename = "modelName")]
        model_name: String,
        #[serde(rename = "loadMs")]
        load_ms: u64,
        #[serde(rename = "warmupMs")]
        warmup_ms: u64,
    },
    /// Model loading failed with an error
    #[serde(rename = "error")]
    Error {
        #[serde(rename = "modelName")]
        model_name: String,
        error: String,
    },
    /// Model was released
    #[serde(rename = "unloaded")]
    Unloaded {
        #[serde(rename = "modelName")]
        model_name: String,
    },
}

impl From<SessionEvent> for ModelLoadingStateChanged {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::LoadStarted { model } => Self::Started { model_name: model },
            SessionEvent::LoadProgress { model, progress } => Self::Progress {
                model_name: model,
                progress,
            },
            SessionEvent::Warming { model, load_ms } => Self::Warming {
                model_name: model,
                load_ms,
            },
            SessionEvent::Ready {
                model,
                load_ms,
                warmup_ms,
            } => Self::Ready {
                model_name: model,
                load_ms,
                warmup_ms,
            },
            SessionEvent::LoadFailed { model, error } => Self::Error {
                model_name: model,
                error,
            },
            SessionEvent::Unloaded { model } => Self::Unloaded { model_name: model },
        }
    }
}

/// Speech capture state change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SpeechCaptureStateChanged {
    #[serde(rename = "started")]
    Started,
    #[serde(rename = "stopped")]
    Stopped,
    /// Capture could not start
    #[serde(rename = "error")]
    Error {
        error: String,
        #[serde(rename = "userMessage")]
        user_message: String,
    },
}

impl From<CaptureEvent> for SpeechCaptureStateChanged {
    fn from(event: CaptureEvent) -> Self {
        match event {
            CaptureEvent::Started => Self::Started,
            CaptureEvent::Stopped => Self::Stopped,
        }
    }
}

/// The shared chat input changed (typed or transcribed)
#[derive(Debug, Clone, Serialize, Deserialize, specta::Type, tauri_specta::Event)]
pub struct ChatInputChanged {
    pub text: String,
}

/// Forward session lifecycle events until the manager is dropped
pub fn forward_session_events(app: AppHandle, mut events: broadcast::Receiver<SessionEvent>) {
    tauri::async_runtime::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = ModelLoadingStateChanged::from(event).emit(&app) {
                        error!("Failed to emit ModelLoadingStateChanged: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} session events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Session event forwarder stopped");
    });
}

/// Forward capture start/stop events
pub fn forward_capture_events(app: AppHandle, mut events: broadcast::Receiver<CaptureEvent>) {
    tauri::async_runtime::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = SpeechCaptureStateChanged::from(event).emit(&app) {
                        error!("Failed to emit SpeechCaptureStateChanged: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Dropped {} capture events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        debug!("Capture event forwarder stopped");
    });
}

/// Mirror the input buffer to the frontend on every change
pub fn forward_input_changes(app: AppHandle, mut input: watch::Receiver<String>) {
    tauri::async_runtime::spawn(async move {
        while input.changed().await.is_ok() {
            let text = input.borrow_and_update().clone();
            if let Err(e) = (ChatInputChanged { text }).emit(&app) {
                error!("Failed to emit ChatInputChanged: {}", e);
            }
        }
        debug!("Input forwarder stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_events_map_to_frontend_states() {
        let test_cases = vec![
            (
                SessionEvent::LoadStarted { model: "A".into() },
                serde_json::json!({ "state": "started", "modelName": "A" }),
            ),
            (
                SessionEvent::LoadProgress {
                    model: "A".into(),
                    progress: 15,
                },
                serde_json::json!({ "state": "progress", "modelName": "A", "progress": 15 }),
            ),
            (
                SessionEvent::Ready {
                    model: "A".into(),
                    load_ms: 1200,
                    warmup_ms: 300,
                },
                serde_json::json!({
                    "state": "ready",
                    "modelName": "A",
                    "loadMs": 1200,
                    "warmupMs": 300
                }),
            ),
            (
                SessionEvent::LoadFailed {
                    model: "A".into(),
                    error: "missing".into(),
                },
                serde_json::json!({ "state": "error", "modelName": "A", "error": "missing" }),
            ),
        ];

        for (event, expected) in test_cases {
            let description = format!("{:?}", event);
            let mapped = ModelLoadingStateChanged::from(event);
            assert_eq!(serde_json::to_value(&mapped).unwrap(), expected, "{}", description);
        }
    }

    #[test]
    fn test_capture_event_serialization() {
        assert_eq!(
            serde_json::to_value(SpeechCaptureStateChanged::from(CaptureEvent::Started)).unwrap(),
            serde_json::json!({ "state": "started" })
        );
    }
}
