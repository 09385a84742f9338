use std::path::PathBuf;

/// Errors reported by a [`crate::ModelBackend`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Model artifact not found: {0}")]
    ArtifactMissing(PathBuf),
    #[error("Backend initialization failed: {0}")]
    Init(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Outcomes of session operations that did not succeed.
///
/// None of these are fatal: after any of them the manager is in a state
/// that accepts new requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to load model '{model}': {reason}")]
    LoadFailure { model: String, reason: String },
    #[error("Warmup failed for model '{model}': {reason}")]
    WarmupFailure { model: String, reason: String },
    #[error("No model is ready")]
    NotReady,
    #[error("Model session is busy")]
    Busy,
    #[error("Generation failed: {0}")]
    GenerationFailure(String),
}

impl SessionError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            SessionError::LoadFailure { model, .. } => {
                format!("Could not load {}. Pick another model or try again.", model)
            }
            SessionError::WarmupFailure { model, .. } => {
                format!("{} loaded but failed its first run. Try loading it again.", model)
            }
            SessionError::NotReady => "Load a model before sending a message.".to_string(),
            SessionError::Busy => "The model is busy. Please wait and retry.".to_string(),
            SessionError::GenerationFailure(msg) => format!("Generation failed: {}", msg),
        }
    }
}

/// Errors from the key-value config store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to serialize value for '{key}': {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to persist store: {0}")]
    Persist(String),
}

/// Errors raised by the conversation orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Prompt template not found: {0}")]
    UnknownTemplate(String),
    #[error("Model not found in catalog: {0}")]
    UnknownModel(String),
    #[error("No model selected")]
    NoModelSelected,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChatError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            ChatError::Session(e) => e.user_message(),
            ChatError::UnknownTemplate(label) => format!("Prompt '{}' does not exist.", label),
            ChatError::UnknownModel(name) => format!("Model '{}' is not available.", name),
            ChatError::NoModelSelected => "Select a model first.".to_string(),
            ChatError::Store(_) => "Failed to save prompts. Check disk space.".to_string(),
        }
    }
}

/// Errors raised when starting speech capture.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Speech capture is already running")]
    AlreadyCapturing,
    #[error("Speech capture unavailable: {0}")]
    Unavailable(String),
    #[error("Failed to obtain speech credential: {0}")]
    Credential(String),
}

impl CaptureError {
    /// Returns a user-friendly error message suitable for display in the UI
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::AlreadyCapturing => "Already listening.".to_string(),
            CaptureError::Unavailable(_) => {
                "No microphone or speech credentials available.".to_string()
            }
            CaptureError::Credential(_) => {
                "Could not reach the speech service. Check your key and region.".to_string()
            }
        }
    }
}
