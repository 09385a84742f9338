mod gguf;

pub use gguf::{GemmaHandle, GgufBackend};
