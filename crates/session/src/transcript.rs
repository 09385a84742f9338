use serde::{Deserialize, Serialize};

/// One completed generation
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceRecord {
    pub model_name: String,
    /// Template label, or "Normal Chat" when untemplated
    pub task_label: String,
    pub input_text: String,
    pub output_text: String,
    pub elapsed_ms: u64,
}

/// Append-only list of inference records, cleared only as a whole
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    records: Vec<InferenceRecord>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: InferenceRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[InferenceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
