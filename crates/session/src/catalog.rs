use serde::{Deserialize, Serialize};

/// A selectable model. Immutable; the set of descriptors is static.
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    /// Unique display name (e.g., "Gemma-3-1B")
    pub name: String,
    /// Artifact location relative to the models directory
    pub artifact_ref: String,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>, artifact_ref: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            artifact_ref: artifact_ref.into(),
        }
    }
}

/// Hardcoded catalog of models bundled under `resources/models`.
/// Each entry is a directory holding the quantized weights and `tokenizer.json`.
pub fn get_model_catalog() -> Vec<ModelDescriptor> {
    vec![
        ModelDescriptor::new("Gemma-3-1B", "gemma-3-1b-it/gemma-3-1b-it-q4_0.gguf"),
        ModelDescriptor::new("Gemma-3-4B", "gemma-3-4b-it/gemma-3-4b-it-q4_0.gguf"),
        ModelDescriptor::new(
            "TranslateGemma-4B",
            "translategemma-4b-it/translategemma-4b-it-q4_0.gguf",
        ),
    ]
}

/// Look up a catalog entry by name
pub fn find_model(catalog: &[ModelDescriptor], name: &str) -> Option<ModelDescriptor> {
    catalog.iter().find(|m| m.name == name).cloned()
}
