//! Inference engine abstraction.
//!
//! Backends are blocking: loading a multi-gigabyte model or running a
//! generation can take seconds. The session manager always calls them from
//! `tokio::task::spawn_blocking`, so implementations must be `Send + Sync`
//! and their handles `Send`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

/// Preferred compute device for inference
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, strum::Display)]
#[serde(rename_all = "camelCase")]
pub enum Accelerator {
    #[default]
    Gpu,
    Cpu,
}

/// Options passed to [`ModelBackend::load`].
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadOptions {
    pub accelerator: Accelerator,
    pub max_output_tokens: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            accelerator: Accelerator::Gpu,
            max_output_tokens: 4096,
        }
    }
}

/// Capability set of an inference engine.
///
/// A handle is a live, resource-owning reference to a loaded model. The
/// session manager is the only owner of handles and guarantees that every
/// handle it receives from `load` is eventually passed to `dispose`.
pub trait ModelBackend: Send + Sync + 'static {
    type Handle: Send + 'static;

    /// Load a model artifact into memory.
    fn load(&self, artifact: &Path, options: &LoadOptions) -> Result<Self::Handle, BackendError>;

    /// Run a single completion against a loaded model.
    fn generate(&self, handle: &mut Self::Handle, prompt: &str) -> Result<String, BackendError>;

    /// Release a loaded model.
    fn dispose(&self, handle: Self::Handle);
}

/// Maps a descriptor's artifact reference to a loadable location.
pub trait ArtifactResolver: Send + Sync {
    fn resolve(&self, artifact_ref: &str) -> Result<PathBuf, BackendError>;
}

/// Resolves artifacts relative to a root directory (e.g. `<resources>/models`).
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactResolver for DirectoryResolver {
    fn resolve(&self, artifact_ref: &str) -> Result<PathBuf, BackendError> {
        let relative = artifact_ref.trim_start_matches(['/', '\\']);
        if Path::new(relative)
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(BackendError::ArtifactMissing(PathBuf::from(artifact_ref)));
        }

        let path = self.root.join(relative);
        if !path.exists() {
            return Err(BackendError::ArtifactMissing(path));
        }
        Ok(path)
    }
}
