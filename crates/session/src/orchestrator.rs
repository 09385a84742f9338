use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::backend::ModelBackend;
use crate::catalog::{find_model, ModelDescriptor};
use crate::config::{AppConfig, ConfigKey, ConfigStore};
use crate::error::{ChatError, SessionError};
use crate::input::InputBuffer;
use crate::manager::{LoadOutcome, SessionManager};
use crate::prompts::{default_templates, PromptLibrary, PromptTemplate};
use crate::transcript::{InferenceRecord, Transcript};

/// Why a message was not sent
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    /// Empty after trimming
    Blank,
    /// The selected model is not loaded
    NotReady,
    /// The model is running its warmup
    Warming,
    /// Another generation is in flight
    Busy,
}

/// Result of a send that did not fail
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "camelCase")]
pub enum SendOutcome {
    Sent(InferenceRecord),
    Skipped(SkipReason),
}

/// Chat front controller.
///
/// Owns the transcript, the input buffer, the prompt selection and the model
/// selection. Everything touching the model goes through the [`SessionManager`].
pub struct Conversation<B: ModelBackend, S: ConfigStore> {
    session: Arc<SessionManager<B>>,
    store: Arc<S>,
    catalog: Vec<ModelDescriptor>,
    selected_model: Mutex<Option<ModelDescriptor>>,
    prompts: Mutex<PromptLibrary>,
    transcript: Mutex<Transcript>,
    input: InputBuffer,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<B: ModelBackend, S: ConfigStore> Conversation<B, S> {
    /// Restore prompts and model selection from the store.
    ///
    /// Falls back to the built-in templates and the first catalog model.
    pub fn new(session: Arc<SessionManager<B>>, store: Arc<S>, catalog: Vec<ModelDescriptor>) -> Self {
        let templates = store.get(&ConfigKey::PROMPTS).unwrap_or_else(|| {
            debug!("No saved prompts, using defaults");
            default_templates()
        });

        let saved = store
            .get(&ConfigKey::APP)
            .and_then(|config| config.selected_model)
            .and_then(|name| {
                let found = find_model(&catalog, &name);
                if found.is_none() {
                    warn!("Saved model '{}' is not in the catalog", name);
                }
                found
            });
        let selected_model = saved.or_else(|| catalog.first().cloned());

        Self {
            session,
            store,
            catalog,
            selected_model: Mutex::new(selected_model),
            prompts: Mutex::new(PromptLibrary::new(templates)),
            transcript: Mutex::new(Transcript::new()),
            input: InputBuffer::new(),
        }
    }

    pub fn session(&self) -> &Arc<SessionManager<B>> {
        &self.session
    }

    pub fn catalog(&self) -> &[ModelDescriptor] {
        &self.catalog
    }

    pub fn input(&self) -> &InputBuffer {
        &self.input
    }

    // ===== Models =====

    pub fn selected_model(&self) -> Option<ModelDescriptor> {
        lock(&self.selected_model).clone()
    }

    /// True when the selected model is the one loaded and ready
    pub fn is_selected_model_ready(&self) -> bool {
        match (self.selected_model(), self.session.loaded_model()) {
            (Some(selected), Some(loaded)) => selected.name == loaded,
            _ => false,
        }
    }

    /// Select a catalog model, remember it, and load it
    pub async fn select_model(&self, name: &str) -> Result<LoadOutcome, ChatError> {
        let descriptor =
            find_model(&self.catalog, name).ok_or_else(|| ChatError::UnknownModel(name.to_string()))?;
        info!("Selected model '{}'", descriptor.name);
        *lock(&self.selected_model) = Some(descriptor.clone());

        let mut config = self.store.get(&ConfigKey::APP).unwrap_or_default();
        if config.selected_model.as_deref() != Some(descriptor.name.as_str()) {
            config.selected_model = Some(descriptor.name.clone());
            if let Err(e) = self.store.set(&ConfigKey::APP, config) {
                warn!("Failed to save model selection: {}", e);
            }
        }

        Ok(self.session.request_model(&descriptor).await?)
    }

    /// Load the currently selected model (e.g. on startup or after a failure)
    pub async fn load_selected_model(&self) -> Result<LoadOutcome, ChatError> {
        let descriptor = self
            .selected_model()
            .ok_or(ChatError::NoModelSelected)?;
        Ok(self.session.request_model(&descriptor).await?)
    }

    // ===== Prompts =====

    pub fn prompts(&self) -> Vec<PromptTemplate> {
        lock(&self.prompts).templates().to_vec()
    }

    pub fn selected_prompt(&self) -> Option<PromptTemplate> {
        lock(&self.prompts).selected().cloned()
    }

    pub fn select_prompt(&self, label: &str) -> Result<(), ChatError> {
        lock(&self.prompts).select(label)?;
        debug!("Selected prompt '{}'", label);
        Ok(())
    }

    /// Back to untemplated chat
    pub fn clear_prompt(&self) {
        lock(&self.prompts).clear_selection();
    }

    /// Upsert by label, select it, and persist the whole set
    pub fn update_prompt(&self, template: PromptTemplate) -> Result<(), ChatError> {
        let templates = {
            let mut prompts = lock(&self.prompts);
            let label = template.label.clone();
            if prompts.upsert(template) {
                debug!("Updated prompt '{}'", label);
            } else {
                debug!("Added prompt '{}'", label);
            }
            prompts.templates().to_vec()
        };
        self.store.set(&ConfigKey::PROMPTS, templates)?;
        Ok(())
    }

    pub fn build_prompt(&self, text: &str) -> String {
        lock(&self.prompts).build_prompt(text)
    }

    // ===== Chat =====

    /// Generate a reply to `text` and append it to the transcript.
    ///
    /// Returns `Skipped` without touching the model when the text is blank or
    /// the selected model can't take a message right now.
    pub async fn send_message(&self, text: &str) -> Result<SendOutcome, ChatError> {
        if let Some(reason) = self.skip_reason(text) {
            return Ok(SendOutcome::Skipped(reason));
        }

        let (prompt, task_label) = {
            let prompts = lock(&self.prompts);
            (prompts.build_prompt(text), prompts.task_label().to_string())
        };

        let generation = match self.session.generate(&prompt).await {
            Ok(generation) => generation,
            Err(SessionError::Busy) => return Ok(SendOutcome::Skipped(SkipReason::Busy)),
            Err(SessionError::NotReady) => return Ok(SendOutcome::Skipped(SkipReason::NotReady)),
            Err(e) => return Err(e.into()),
        };

        let record = InferenceRecord {
            model_name: generation.model,
            task_label,
            input_text: text.to_string(),
            output_text: generation.text,
            elapsed_ms: generation.elapsed_ms,
        };
        lock(&self.transcript).push(record.clone());
        Ok(SendOutcome::Sent(record))
    }

    /// Why a message with `text` would not be sent right now, if at all
    fn skip_reason(&self, text: &str) -> Option<SkipReason> {
        if text.trim().is_empty() {
            return Some(SkipReason::Blank);
        }

        let state = self.session.state();
        if state.is_warming() {
            return Some(SkipReason::Warming);
        }
        if self.session.is_generating() {
            return Some(SkipReason::Busy);
        }
        if !state.is_ready() || !self.is_selected_model_ready() {
            return Some(SkipReason::NotReady);
        }
        None
    }

    /// Send the input buffer, leaving it empty once the message goes out.
    ///
    /// A skipped submit leaves the buffer as it was.
    pub async fn submit_input(&self) -> Result<SendOutcome, ChatError> {
        if let Some(reason) = self.skip_reason(&self.input.get()) {
            debug!("Submit skipped ({:?}), input kept", reason);
            return Ok(SendOutcome::Skipped(reason));
        }

        let text = self.input.take();
        let outcome = self.send_message(&text).await?;
        if matches!(outcome, SendOutcome::Skipped(_)) && self.input.get().is_empty() {
            // Lost a race with another generation; hand the text back
            self.input.set(text);
        }
        Ok(outcome)
    }

    pub fn transcript(&self) -> Vec<InferenceRecord> {
        lock(&self.transcript).records().to_vec()
    }

    /// Wipe the transcript; session and prompts are untouched
    pub fn clear_transcript(&self) {
        lock(&self.transcript).clear();
        debug!("Transcript cleared");
    }

    /// Persisted app configuration with the current selection applied
    pub fn app_config(&self) -> AppConfig {
        let mut config: AppConfig = self.store.get(&ConfigKey::APP).unwrap_or_default();
        if let Some(selected) = self.selected_model() {
            config.selected_model = Some(selected.name);
        }
        config
    }
}
