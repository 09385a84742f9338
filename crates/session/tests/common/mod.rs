#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use murmur_session::{
    ArtifactResolver, BackendError, LoadOptions, ModelBackend, ModelDescriptor, ProgressConfig,
    SessionConfig, SessionManager,
};

pub const WARMUP_PROMPT: &str = "Say OK";

/// Scripted backend that counts live handles and records every call
#[derive(Default)]
pub struct MockBackend {
    live: AtomicUsize,
    max_live: AtomicUsize,
    calls: Mutex<Vec<String>>,
    pub load_delay: Duration,
    pub generate_delay: Duration,
    pub fail_load: Mutex<HashSet<String>>,
    pub fail_warmup: Mutex<HashSet<String>>,
    pub fail_generate: AtomicBool,
}

#[derive(Debug)]
pub struct MockHandle {
    pub artifact: String,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delays(load_delay: Duration, generate_delay: Duration) -> Self {
        Self {
            load_delay,
            generate_delay,
            ..Self::default()
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn fail_load_of(&self, artifact: &str) {
        self.fail_load.lock().unwrap().insert(artifact.to_string());
    }

    pub fn fail_warmup_of(&self, artifact: &str) {
        self.fail_warmup.lock().unwrap().insert(artifact.to_string());
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ModelBackend for MockBackend {
    type Handle = MockHandle;

    fn load(&self, artifact: &Path, _options: &LoadOptions) -> Result<MockHandle, BackendError> {
        let artifact = artifact.to_string_lossy().to_string();
        self.record(format!("load {}", artifact));
        std::thread::sleep(self.load_delay);

        if self.fail_load.lock().unwrap().contains(&artifact) {
            return Err(BackendError::Init(format!("corrupt artifact {}", artifact)));
        }

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(MockHandle { artifact })
    }

    fn generate(&self, handle: &mut MockHandle, prompt: &str) -> Result<String, BackendError> {
        self.record(format!("generate {}", handle.artifact));
        std::thread::sleep(self.generate_delay);

        if prompt == WARMUP_PROMPT && self.fail_warmup.lock().unwrap().contains(&handle.artifact) {
            return Err(BackendError::Inference("out of memory".to_string()));
        }
        if prompt != WARMUP_PROMPT && self.fail_generate.load(Ordering::SeqCst) {
            return Err(BackendError::Inference("decode error".to_string()));
        }
        Ok(format!("reply to {} chars", prompt.len()))
    }

    fn dispose(&self, handle: MockHandle) {
        self.record(format!("dispose {}", handle.artifact));
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves every artifact to itself, except the ones marked missing
#[derive(Default)]
pub struct MockResolver {
    pub missing: HashSet<String>,
}

impl ArtifactResolver for MockResolver {
    fn resolve(&self, artifact_ref: &str) -> Result<PathBuf, BackendError> {
        if self.missing.contains(artifact_ref) {
            return Err(BackendError::ArtifactMissing(PathBuf::from(artifact_ref)));
        }
        Ok(PathBuf::from(artifact_ref))
    }
}

pub fn model(name: &str) -> ModelDescriptor {
    ModelDescriptor::new(name, format!("{}.gguf", name.to_lowercase()))
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        load_options: LoadOptions::default(),
        progress: ProgressConfig {
            interval: Duration::from_millis(2),
            step: 5,
            cap: 90,
        },
    }
}

pub fn manager(backend: Arc<MockBackend>) -> Arc<SessionManager<MockBackend>> {
    manager_with_resolver(backend, MockResolver::default())
}

pub fn manager_with_resolver(
    backend: Arc<MockBackend>,
    resolver: MockResolver,
) -> Arc<SessionManager<MockBackend>> {
    Arc::new(SessionManager::new(backend, Arc::new(resolver), fast_config()))
}
