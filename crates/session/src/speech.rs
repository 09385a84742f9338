//! Speech-to-input capture.
//!
//! A capture service pushes partial transcripts into an mpsc channel; a
//! forwarder task writes each one into the shared [`InputBuffer`], replacing
//! whatever was there. Capture never submits a message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::CaptureError;
use crate::input::InputBuffer;

/// Short-lived token for the speech service
#[derive(Debug, Clone)]
pub struct SpeechCredential {
    pub token: SecretString,
    pub region: String,
}

/// Issues a fresh credential per capture start. Blocking.
pub trait CredentialProvider: Send + Sync + 'static {
    fn fetch(&self) -> Result<SpeechCredential, CaptureError>;
}

/// A running capture. Dropping it without `stop` must also end the capture.
pub trait ActiveCapture: Send {
    fn stop(self: Box<Self>);
}

/// Starts microphone recognition. Blocking.
///
/// Partial transcripts are sent on `partials`; the capture ends when the
/// sender is dropped or `stop` is called.
pub trait SpeechCapture: Send + Sync + 'static {
    fn start(
        &self,
        credential: SpeechCredential,
        partials: mpsc::UnboundedSender<String>,
    ) -> Result<Box<dyn ActiveCapture>, CaptureError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureEvent {
    Started,
    Stopped,
}

enum CaptureState {
    Idle,
    Starting { cancelled: bool },
    Capturing { id: u64, capture: Box<dyn ActiveCapture> },
}

struct Shared {
    state: Mutex<CaptureState>,
    next_id: AtomicU64,
    events: broadcast::Sender<CaptureEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: CaptureEvent) {
        let _ = self.events.send(event);
    }
}

/// Returns the state to Idle if `start` bails out or its future is dropped
struct StartGuard<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl StartGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.shared.lock() = CaptureState::Idle;
        }
    }
}

/// Owns at most one running speech capture
pub struct SpeechInput {
    capture: Arc<dyn SpeechCapture>,
    credentials: Arc<dyn CredentialProvider>,
    input: InputBuffer,
    shared: Arc<Shared>,
}

impl SpeechInput {
    pub fn new(
        capture: Arc<dyn SpeechCapture>,
        credentials: Arc<dyn CredentialProvider>,
        input: InputBuffer,
    ) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            capture,
            credentials,
            input,
            shared: Arc::new(Shared {
                state: Mutex::new(CaptureState::Idle),
                next_id: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.shared.events.subscribe()
    }

    /// Starting or capturing
    pub fn is_capturing(&self) -> bool {
        !matches!(*self.shared.lock(), CaptureState::Idle)
    }

    /// Start capturing into the input buffer with a freshly fetched credential
    pub async fn start(&self) -> Result<(), CaptureError> {
        {
            let mut state = self.shared.lock();
            if !matches!(*state, CaptureState::Idle) {
                return Err(CaptureError::AlreadyCapturing);
            }
            *state = CaptureState::Starting { cancelled: false };
        }
        let mut guard = StartGuard {
            shared: &self.shared,
            armed: true,
        };

        let credentials = self.credentials.clone();
        let credential = tokio::task::spawn_blocking(move || credentials.fetch())
            .await
            .map_err(|e| {
                CaptureError::Credential(format!("Task panicked while fetching token: {}", e))
            })??;

        if credential.token.expose_secret().is_empty() || credential.region.trim().is_empty() {
            warn!("Speech token or region missing");
            return Err(CaptureError::Unavailable(
                "Speech token or region missing".to_string(),
            ));
        }
        debug!("Speech credential obtained for region {}", credential.region);

        let (tx, rx) = mpsc::unbounded_channel();
        let capture = self.capture.clone();
        let active = tokio::task::spawn_blocking(move || capture.start(credential, tx))
            .await
            .map_err(|e| {
                CaptureError::Unavailable(format!("Task panicked while starting capture: {}", e))
            })??;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let cancelled = {
            let mut state = self.shared.lock();
            if matches!(*state, CaptureState::Starting { cancelled: true }) {
                *state = CaptureState::Idle;
                Some(active)
            } else {
                *state = CaptureState::Capturing {
                    id,
                    capture: active,
                };
                None
            }
        };
        guard.disarm();

        if let Some(active) = cancelled {
            info!("Speech capture stopped before it started");
            stop_capture(active).await;
            return Ok(());
        }

        tokio::spawn(forward_partials(
            self.shared.clone(),
            self.input.clone(),
            rx,
            id,
        ));

        info!("Speech capture started");
        self.shared.emit(CaptureEvent::Started);
        Ok(())
    }

    /// Stop capturing. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let previous = {
            let mut state = self.shared.lock();
            match &mut *state {
                CaptureState::Idle => return false,
                CaptureState::Starting { cancelled } => {
                    *cancelled = true;
                    return true;
                }
                CaptureState::Capturing { .. } => {}
            }
            std::mem::replace(&mut *state, CaptureState::Idle)
        };

        if let CaptureState::Capturing { capture, .. } = previous {
            stop_capture(capture).await;
            info!("Speech capture stopped");
            self.shared.emit(CaptureEvent::Stopped);
        }
        true
    }
}

async fn stop_capture(capture: Box<dyn ActiveCapture>) {
    if let Err(e) = tokio::task::spawn_blocking(move || capture.stop()).await {
        error!("Task panicked while stopping capture: {}", e);
    }
}

/// Copy partials into the input buffer until the capture's sender goes away.
///
/// Partials still queued once capture `id` is stopped are dropped.
async fn forward_partials(
    shared: Arc<Shared>,
    input: InputBuffer,
    mut partials: mpsc::UnboundedReceiver<String>,
    id: u64,
) {
    while let Some(text) = partials.recv().await {
        // Held across the write so a concurrent stop can't interleave
        let state = shared.lock();
        if !matches!(&*state, CaptureState::Capturing { id: current, .. } if *current == id) {
            debug!("Dropping partial transcript from stopped capture");
            return;
        }
        debug!("Partial transcript: {} chars", text.len());
        input.set(text);
    }

    // Sender dropped without a stop: the capture ended on its own
    let ended = {
        let mut state = shared.lock();
        let current = matches!(&*state, CaptureState::Capturing { id: current, .. } if *current == id);
        current.then(|| std::mem::replace(&mut *state, CaptureState::Idle))
    };

    if let Some(CaptureState::Capturing { capture, .. }) = ended {
        warn!("Speech capture ended unexpectedly");
        stop_capture(capture).await;
        shared.emit(CaptureEvent::Stopped);
    }
}
