use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::backend::{ArtifactResolver, LoadOptions, ModelBackend};
use crate::catalog::ModelDescriptor;
use crate::error::SessionError;
use crate::progress::{ProgressConfig, ProgressTicker};
use crate::state::{self, SessionState, SessionTrigger, TransitionResult};

/// Throwaway prompt run right after load to absorb first-use initialization
const WARMUP_PROMPT: &str = "Say OK";

const EVENT_CAPACITY: usize = 64;

/// Session lifecycle events, in the order they happen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionEvent {
    LoadStarted { model: String },
    LoadProgress { model: String, progress: u8 },
    Warming { model: String, load_ms: u64 },
    Ready { model: String, load_ms: u64, warmup_ms: u64 },
    LoadFailed { model: String, error: String },
    Unloaded { model: String },
}

/// Wall-clock timings of a completed load
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub model: String,
    pub load_ms: u64,
    pub warmup_ms: u64,
}

/// Result of [`SessionManager::request_model`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The model was loaded and warmed up by this call
    Loaded(LoadReport),
    /// The model was already ready; nothing happened
    AlreadyLoaded,
    /// A load of the same model is already in flight; nothing happened
    AlreadyLoading,
}

/// Output of a single generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    pub model: String,
    pub text: String,
    pub elapsed_ms: u64,
}

/// Tunables for the session manager
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    pub load_options: LoadOptions,
    pub progress: ProgressConfig,
}

/// Loaded model state
struct LoadedModel<H> {
    name: String,
    handle: H,
}

/// Exclusive operations that hold the handle outside of the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Generating,
    Disposing,
}

struct Inner<H> {
    state: SessionState,
    current: Option<LoadedModel<H>>,
    in_flight: Option<Operation>,
    last_report: Option<LoadReport>,
}

struct Shared<B: ModelBackend> {
    backend: Arc<B>,
    resolver: Arc<dyn ArtifactResolver>,
    load_options: Mutex<LoadOptions>,
    progress: ProgressConfig,
    inner: Mutex<Inner<B::Handle>>,
    events: broadcast::Sender<SessionEvent>,
}

/// Owns the single loaded model handle.
///
/// Only one model can be loaded at a time. Loading a new model disposes
/// the previous one before the new load starts. Operations that would race
/// an in-flight load, generation or disposal are rejected with
/// [`SessionError::Busy`] rather than queued.
///
/// Long operations run in spawned tasks, so dropping a caller's future never
/// leaves the manager stuck in a transient state.
pub struct SessionManager<B: ModelBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: ModelBackend> SessionManager<B> {
    pub fn new(backend: Arc<B>, resolver: Arc<dyn ArtifactResolver>, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                backend,
                resolver,
                load_options: Mutex::new(config.load_options),
                progress: config.progress,
                inner: Mutex::new(Inner {
                    state: SessionState::Unloaded,
                    current: None,
                    in_flight: None,
                    last_report: None,
                }),
                events,
            }),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> SessionState {
        self.shared.lock().state.clone()
    }

    /// Name of the model that is ready for generation
    pub fn loaded_model(&self) -> Option<String> {
        match &self.shared.lock().state {
            SessionState::Ready { model } => Some(model.clone()),
            _ => None,
        }
    }

    /// Timings of the current model's load, if one is ready
    pub fn last_report(&self) -> Option<LoadReport> {
        self.shared.lock().last_report.clone()
    }

    /// Check if a generation is currently running
    pub fn is_generating(&self) -> bool {
        self.shared.lock().in_flight == Some(Operation::Generating)
    }

    pub fn load_options(&self) -> LoadOptions {
        *self
            .shared
            .load_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Options used by the next load; the current model is unaffected
    pub fn set_load_options(&self, options: LoadOptions) {
        *self
            .shared
            .load_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = options;
    }

    /// Load a model, replacing the current one.
    ///
    /// This is an async operation that:
    /// 1. Rejects the request if it would race another operation
    /// 2. Disposes the current model, if any
    /// 3. Loads the new model in a blocking task while fake progress ticks
    /// 4. Runs the warmup generation
    ///
    /// On failure the manager is back in `Unloaded` before this returns.
    pub async fn request_model(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<LoadOutcome, SessionError> {
        let previous = {
            let mut inner = self.shared.lock();
            if inner.in_flight.is_some() {
                warn!(
                    "Rejecting load of '{}': {:?} in progress",
                    descriptor.name, inner.in_flight
                );
                return Err(SessionError::Busy);
            }

            match state::transition(
                &mut inner.state,
                SessionTrigger::Request(descriptor.name.clone()),
            ) {
                Ok(TransitionResult::Changed { .. }) => {}
                Ok(TransitionResult::Unchanged) => {
                    return Ok(if inner.state.is_ready() {
                        info!("Model '{}' is already loaded", descriptor.name);
                        LoadOutcome::AlreadyLoaded
                    } else {
                        info!("Model '{}' is already loading", descriptor.name);
                        LoadOutcome::AlreadyLoading
                    });
                }
                Err(rejection) => {
                    warn!("{}", rejection);
                    return Err(SessionError::Busy);
                }
            }

            inner.last_report = None;
            inner.current.take()
        };

        let shared = self.shared.clone();
        let descriptor = descriptor.clone();
        let model = descriptor.name.clone();
        match tokio::spawn(async move { shared.run_load(descriptor, previous).await }).await {
            Ok(result) => result.map(LoadOutcome::Loaded),
            Err(e) => {
                let reason = format!("Task panicked while loading model: {}", e);
                error!("{}", reason);
                Err(self.shared.fail_load(
                    &model,
                    SessionError::LoadFailure {
                        model: model.clone(),
                        reason: reason.clone(),
                    },
                    reason,
                ))
            }
        }
    }

    /// Run one generation against the ready model.
    ///
    /// Fails with `NotReady` outside of `Ready` and with `Busy` while another
    /// generation is running.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, SessionError> {
        let loaded = {
            let mut inner = self.shared.lock();
            if inner.in_flight.is_some() {
                return Err(SessionError::Busy);
            }
            if !inner.state.is_ready() {
                return Err(SessionError::NotReady);
            }
            let Some(loaded) = inner.current.take() else {
                warn!("Ready state without a loaded model");
                return Err(SessionError::NotReady);
            };
            inner.in_flight = Some(Operation::Generating);
            loaded
        };

        let shared = self.shared.clone();
        let prompt = prompt.to_string();
        match tokio::spawn(async move { shared.run_generation(loaded, prompt).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!("Generation task panicked: {}", e);
                self.shared.lose_handle();
                Err(SessionError::GenerationFailure(e.to_string()))
            }
        }
    }

    /// Release the loaded model. Idempotent; `Busy` while a load or generation runs.
    pub async fn dispose(&self) -> Result<(), SessionError> {
        let loaded = {
            let mut inner = self.shared.lock();
            if inner.in_flight.is_some() || inner.state.is_loading() {
                return Err(SessionError::Busy);
            }
            if let Err(rejection) = state::transition(&mut inner.state, SessionTrigger::Dispose) {
                warn!("{}", rejection);
                return Err(SessionError::Busy);
            }
            inner.last_report = None;
            let loaded = inner.current.take();
            if loaded.is_some() {
                inner.in_flight = Some(Operation::Disposing);
            }
            loaded
        };

        let Some(loaded) = loaded else {
            debug!("No model loaded to dispose");
            return Ok(());
        };

        let shared = self.shared.clone();
        let result = tokio::spawn(async move {
            shared.dispose_handle(loaded).await;
            shared.lock().in_flight = None;
        })
        .await;

        if let Err(e) = result {
            error!("Dispose task panicked: {}", e);
            self.shared.lock().in_flight = None;
        }
        Ok(())
    }
}

impl<B: ModelBackend> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, Inner<B::Handle>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn options(&self) -> LoadOptions {
        *self
            .load_options
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_load(
        self: Arc<Self>,
        descriptor: ModelDescriptor,
        previous: Option<LoadedModel<B::Handle>>,
    ) -> Result<LoadReport, SessionError> {
        let model = descriptor.name.clone();

        // Disposal strictly precedes the next acquisition
        if let Some(previous) = previous {
            self.dispose_handle(previous).await;
        }

        self.emit(SessionEvent::LoadStarted {
            model: model.clone(),
        });
        debug!(">>> LOAD START: Model '{}' - beginning async load", model);
        info!("Loading model '{}'", model);

        let ticker = {
            let shared = self.clone();
            let model = model.clone();
            ProgressTicker::start(self.progress, move |progress| {
                let changed = {
                    let mut inner = shared.lock();
                    match state::transition(&mut inner.state, SessionTrigger::Progress(progress)) {
                        Ok(TransitionResult::Changed { .. }) => true,
                        Ok(TransitionResult::Unchanged) => false,
                        Err(_) => return false,
                    }
                };
                if changed {
                    shared.emit(SessionEvent::LoadProgress {
                        model: model.clone(),
                        progress,
                    });
                }
                true
            })
        };

        let path = match self.resolver.resolve(&descriptor.artifact_ref) {
            Ok(path) => path,
            Err(e) => {
                ticker.stop().await;
                let reason = e.to_string();
                error!("Failed to resolve model '{}': {}", model, reason);
                return Err(self.fail_load(
                    &model,
                    SessionError::LoadFailure {
                        model: model.clone(),
                        reason: reason.clone(),
                    },
                    reason,
                ));
            }
        };
        debug!("Model path resolved: {:?}", path);

        let started = Instant::now();
        let backend = self.backend.clone();
        let options = self.options();
        let result = tokio::task::spawn_blocking(move || backend.load(&path, &options)).await;
        ticker.stop().await;

        let handle = match result {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => {
                let reason = e.to_string();
                error!("Failed to load model '{}': {}", model, reason);
                return Err(self.fail_load(
                    &model,
                    SessionError::LoadFailure {
                        model: model.clone(),
                        reason: reason.clone(),
                    },
                    reason,
                ));
            }
            Err(e) => {
                let reason = format!("Task panicked while loading model: {}", e);
                error!("{}", reason);
                return Err(self.fail_load(
                    &model,
                    SessionError::LoadFailure {
                        model: model.clone(),
                        reason: reason.clone(),
                    },
                    reason,
                ));
            }
        };
        let load_ms = started.elapsed().as_millis() as u64;

        if let Err(rejection) = state::transition(&mut self.lock().state, SessionTrigger::LoadSucceeded) {
            // Unreachable while the state machine holds Loading for us
            error!("{}", rejection);
        }
        self.emit(SessionEvent::Warming {
            model: model.clone(),
            load_ms,
        });
        debug!("Model '{}' loaded in {}ms, warming up", model, load_ms);

        let started = Instant::now();
        let backend = self.backend.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut handle = handle;
            let output = backend.generate(&mut handle, WARMUP_PROMPT);
            (handle, output)
        })
        .await;

        match result {
            Ok((handle, Ok(_))) => {
                let report = LoadReport {
                    model: model.clone(),
                    load_ms,
                    warmup_ms: started.elapsed().as_millis() as u64,
                };
                {
                    let mut inner = self.lock();
                    if let Err(rejection) =
                        state::transition(&mut inner.state, SessionTrigger::WarmupSucceeded)
                    {
                        error!("{}", rejection);
                    }
                    inner.current = Some(LoadedModel {
                        name: model.clone(),
                        handle,
                    });
                    inner.last_report = Some(report.clone());
                }

                debug!(
                    "<<< LOAD COMPLETE: Model '{}' - now in memory and ready",
                    model
                );
                info!(
                    "Model '{}' ready (load {}ms, warmup {}ms)",
                    model, report.load_ms, report.warmup_ms
                );
                self.emit(SessionEvent::Ready {
                    model,
                    load_ms: report.load_ms,
                    warmup_ms: report.warmup_ms,
                });
                Ok(report)
            }
            Ok((handle, Err(e))) => {
                let reason = e.to_string();
                error!("Warmup failed for model '{}': {}", model, reason);
                let backend = self.backend.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || backend.dispose(handle)).await {
                    error!("Task panicked while disposing partial model: {}", e);
                }
                Err(self.fail_load(
                    &model,
                    SessionError::WarmupFailure {
                        model: model.clone(),
                        reason: reason.clone(),
                    },
                    reason,
                ))
            }
            Err(e) => {
                let reason = format!("Task panicked during warmup: {}", e);
                error!("{}", reason);
                Err(self.fail_load(
                    &model,
                    SessionError::WarmupFailure {
                        model: model.clone(),
                        reason: reason.clone(),
                    },
                    reason,
                ))
            }
        }
    }

    /// Publish the failure and return to Unloaded so new requests are accepted
    fn fail_load(&self, model: &str, error: SessionError, reason: String) -> SessionError {
        {
            let mut inner = self.lock();
            if let Err(rejection) = state::transition(&mut inner.state, SessionTrigger::Failed(reason)) {
                warn!("{}", rejection);
            }
            if let Err(rejection) = state::transition(&mut inner.state, SessionTrigger::Reset) {
                warn!("{}", rejection);
            }
            inner.last_report = None;
        }
        self.emit(SessionEvent::LoadFailed {
            model: model.to_string(),
            error: error.to_string(),
        });
        error
    }

    async fn run_generation(
        self: Arc<Self>,
        loaded: LoadedModel<B::Handle>,
        prompt: String,
    ) -> Result<Generation, SessionError> {
        let LoadedModel { name, handle } = loaded;
        debug!("Generating with model '{}' ({} chars)", name, prompt.len());

        let started = Instant::now();
        let backend = self.backend.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut handle = handle;
            let output = backend.generate(&mut handle, &prompt);
            (handle, output)
        })
        .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok((handle, output)) => {
                {
                    let mut inner = self.lock();
                    inner.current = Some(LoadedModel {
                        name: name.clone(),
                        handle,
                    });
                    inner.in_flight = None;
                }
                match output {
                    Ok(text) => {
                        info!(
                            "Generation complete: {} characters in {}ms",
                            text.len(),
                            elapsed_ms
                        );
                        Ok(Generation {
                            model: name,
                            text,
                            elapsed_ms,
                        })
                    }
                    Err(e) => {
                        error!("Generation failed on '{}': {}", name, e);
                        Err(SessionError::GenerationFailure(e.to_string()))
                    }
                }
            }
            Err(e) => {
                error!("Task panicked during generation: {}", e);
                self.lose_handle();
                Err(SessionError::GenerationFailure(e.to_string()))
            }
        }
    }

    /// The handle went down with a panicked task; nothing is left to dispose.
    fn lose_handle(&self) {
        let model = {
            let mut inner = self.lock();
            inner.in_flight = None;
            inner.last_report = None;
            let model = inner.state.model().map(str::to_string);
            if let Err(rejection) = state::transition(&mut inner.state, SessionTrigger::Dispose) {
                warn!("{}", rejection);
            }
            model
        };
        if let Some(model) = model {
            warn!("Model '{}' was lost with a failed task", model);
            self.emit(SessionEvent::Unloaded { model });
        }
    }

    async fn dispose_handle(&self, loaded: LoadedModel<B::Handle>) {
        let LoadedModel { name, handle } = loaded;
        debug!(">>> UNLOAD START: Model '{}' - releasing memory", name);
        info!("Unloading model '{}'", name);

        let backend = self.backend.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || backend.dispose(handle)).await {
            error!("Task panicked while disposing model '{}': {}", name, e);
        }

        debug!("<<< UNLOAD COMPLETE: Model '{}' - memory freed", name);
        self.emit(SessionEvent::Unloaded { model: name });
    }
}

impl<B: ModelBackend> Drop for Shared<B> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(loaded) = inner.current.take() {
            debug!("Releasing model '{}' on shutdown", loaded.name);
            self.backend.dispose(loaded.handle);
        }
    }
}
