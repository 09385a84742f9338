//! Model session lifecycle and chat orchestration.
//!
//! [`SessionManager`] owns the single loaded model handle and enforces the
//! load, warmup, ready sequence. [`Conversation`] sits on top of it and turns
//! user text into templated prompts and transcript entries. Platform pieces
//! (the inference engine, microphone capture, speech credentials, persistent
//! config) plug in through the traits in [`backend`], [`speech`] and [`config`].

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod input;
pub mod manager;
pub mod orchestrator;
mod progress;
pub mod prompts;
pub mod speech;
pub mod state;
pub mod transcript;

pub use backend::{Accelerator, ArtifactResolver, DirectoryResolver, LoadOptions, ModelBackend};
pub use catalog::{find_model, get_model_catalog, ModelDescriptor};
pub use config::{AppConfig, ConfigKey, ConfigStore, MemoryStore, SpeechConfig};
pub use error::{BackendError, CaptureError, ChatError, SessionError, StoreError};
pub use input::InputBuffer;
pub use manager::{
    Generation, LoadOutcome, LoadReport, SessionConfig, SessionEvent, SessionManager,
};
pub use orchestrator::{Conversation, SendOutcome, SkipReason};
pub use progress::ProgressConfig;
pub use prompts::{build_prompt, default_templates, PromptLibrary, PromptTemplate, UNTEMPLATED_LABEL};
pub use speech::{
    ActiveCapture, CaptureEvent, CredentialProvider, SpeechCapture, SpeechCredential, SpeechInput,
};
pub use state::SessionState;
pub use transcript::{InferenceRecord, Transcript};
