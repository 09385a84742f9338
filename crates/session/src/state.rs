//! Session State Machine - Single source of truth for valid state transitions
//!
//! State diagram:
//! ```text
//! Unloaded ──Request──> Loading ──LoadSucceeded──> Warming ──WarmupSucceeded──> Ready
//!    ↑                     │                          │                          │
//!    │                  [Failed]                   [Failed]              [Request other]
//!    │                     ↓                          ↓                          ↓
//!    └──────Reset────── Failed <──────────────────────┘                       Loading
//!
//! Ready/Failed/Unloaded ──Dispose──> Unloaded
//! ```
//!
//! Note: Failed is transient. The manager publishes it and immediately
//! resets to Unloaded so a new request is accepted right away.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the model session
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SessionState {
    /// No model in memory
    Unloaded,
    /// Model artifact is being loaded; progress is an approximation for UI only
    Loading { model: String, progress: u8 },
    /// Model is loaded and running its warmup generation
    Warming { model: String },
    /// Model is ready for generation
    Ready { model: String },
    /// Load or warmup failed
    Failed { model: String, reason: String },
}

impl SessionState {
    /// Name of the model this state refers to, if any
    pub fn model(&self) -> Option<&str> {
        match self {
            SessionState::Unloaded => None,
            SessionState::Loading { model, .. }
            | SessionState::Warming { model }
            | SessionState::Ready { model }
            | SessionState::Failed { model, .. } => Some(model),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready { .. })
    }

    pub fn is_warming(&self) -> bool {
        matches!(self, SessionState::Warming { .. })
    }

    /// Loading or warming - a load is in flight
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            SessionState::Loading { .. } | SessionState::Warming { .. }
        )
    }

    /// Current fake progress percentage (0 outside of Loading)
    pub fn progress(&self) -> u8 {
        match self {
            SessionState::Loading { progress, .. } => *progress,
            _ => 0,
        }
    }
}

/// Events that can trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq, strum::Display)]
pub enum SessionTrigger {
    /// A model was requested
    Request(String),
    /// Fake progress tick
    Progress(u8),
    /// Backend finished loading
    LoadSucceeded,
    /// Warmup generation finished
    WarmupSucceeded,
    /// Load or warmup failed
    Failed(String),
    /// Leave the Failed state
    Reset,
    /// Release the loaded model
    Dispose,
}

/// Result of a successful state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// State changed
    Changed {
        from: SessionState,
        to: SessionState,
    },
    /// Event was valid but state didn't change
    Unchanged,
}

/// Reason a transition was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{attempted} rejected in state {current:?}")]
pub struct TransitionRejection {
    pub current: SessionState,
    pub attempted: SessionTrigger,
}

/// Apply a trigger to `state` in place.
///
/// This is the ONLY way the manager changes state - ensures all transitions are valid.
pub fn transition(
    state: &mut SessionState,
    trigger: SessionTrigger,
) -> Result<TransitionResult, TransitionRejection> {
    match compute_transition(state, &trigger) {
        Some(next) => {
            if next == *state {
                return Ok(TransitionResult::Unchanged);
            }
            let from = std::mem::replace(state, next.clone());
            Ok(TransitionResult::Changed { from, to: next })
        }
        None => Err(TransitionRejection {
            current: state.clone(),
            attempted: trigger,
        }),
    }
}

/// Pure function: compute the next state (if any).
/// Returns None if the transition is invalid.
fn compute_transition(current: &SessionState, trigger: &SessionTrigger) -> Option<SessionState> {
    use SessionState as S;
    use SessionTrigger as T;

    match (current, trigger) {
        (S::Unloaded, T::Request(model)) | (S::Failed { .. }, T::Request(model)) => {
            Some(S::Loading {
                model: model.clone(),
                progress: 0,
            })
        }
        (S::Unloaded, T::Dispose) | (S::Unloaded, T::Reset) => Some(S::Unloaded),

        (S::Loading { model, .. }, T::Request(requested)) if requested == model => {
            Some(current.clone())
        }
        (S::Loading { model, progress }, T::Progress(next)) => {
            // Monotonic and capped below completion
            let progress = if *next > *progress && *next < 100 {
                *next
            } else {
                *progress
            };
            Some(S::Loading {
                model: model.clone(),
                progress,
            })
        }
        (S::Loading { model, .. }, T::LoadSucceeded) => Some(S::Warming {
            model: model.clone(),
        }),

        (S::Warming { model }, T::Request(requested)) if requested == model => {
            Some(current.clone())
        }
        (S::Warming { model }, T::WarmupSucceeded) => Some(S::Ready {
            model: model.clone(),
        }),

        (S::Loading { model, .. }, T::Failed(reason)) | (S::Warming { model }, T::Failed(reason)) => {
            Some(S::Failed {
                model: model.clone(),
                reason: reason.clone(),
            })
        }

        (S::Ready { model }, T::Request(requested)) => {
            if requested == model {
                Some(current.clone())
            } else {
                Some(S::Loading {
                    model: requested.clone(),
                    progress: 0,
                })
            }
        }
        (S::Ready { .. }, T::Dispose) => Some(S::Unloaded),

        (S::Failed { .. }, T::Reset) | (S::Failed { .. }, T::Dispose) => Some(S::Unloaded),

        _ => None,
    }
}
