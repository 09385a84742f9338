//! Prompt templates and the registry that selects between them.

mod format;

pub use format::{build_prompt, UNTEMPLATED_LABEL};

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

/// A named instruction prepended to user text
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    /// Unique key
    pub label: String,
    #[serde(alias = "template")]
    pub body: String,
}

impl PromptTemplate {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
        }
    }
}

const TRANSLATE_TAMIL: &str = "You are a professional translator.

Task: Translate the given text to Tamil.

Rules:
- Output ONLY the translated Tamil text
- Do NOT explain
- Do NOT add extra text

Text:
";

const TRANSLATE_HINDI: &str = "You are a professional translator.

Task: Translate the given text to Hindi.

Rules:
- Output ONLY the translated Hindi text
- Do NOT explain
- Do NOT add extra text

Text:
";

const YODA_STYLE: &str = "Rewrite the following sentence in Yoda\u{2019}s speaking style.

Rules:
- Keep the same meaning
- Output ONLY the rewritten sentence
- No explanation

Sentence:
";

const CAESAR_STYLE: &str = "Rewrite the following sentence in the speaking style of Caesar from Planet of the Apes.

Rules:
- Keep meaning
- Output only the rewritten text
- No explanation

Sentence:
";

/// Templates shipped with the app, used until the user saves their own set
pub fn default_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new("Translate to Tamil", TRANSLATE_TAMIL),
        PromptTemplate::new("Translate to Hindi", TRANSLATE_HINDI),
        PromptTemplate::new("Yoda Style", YODA_STYLE),
        PromptTemplate::new("Caesar Style", CAESAR_STYLE),
    ]
}

/// Ordered template collection plus the active selection.
///
/// Selection is by label and independent of model state. No selection means
/// untemplated chat.
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    templates: Vec<PromptTemplate>,
    selected: Option<String>,
}

impl PromptLibrary {
    pub fn new(templates: Vec<PromptTemplate>) -> Self {
        Self {
            templates,
            selected: None,
        }
    }

    pub fn templates(&self) -> &[PromptTemplate] {
        &self.templates
    }

    pub fn get(&self, label: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.label == label)
    }

    /// Active template, if any
    pub fn selected(&self) -> Option<&PromptTemplate> {
        self.selected.as_deref().and_then(|label| self.get(label))
    }

    /// Label recorded on transcript entries
    pub fn task_label(&self) -> &str {
        self.selected()
            .map(|t| t.label.as_str())
            .unwrap_or(UNTEMPLATED_LABEL)
    }

    pub fn select(&mut self, label: &str) -> Result<&PromptTemplate, ChatError> {
        let index = self
            .templates
            .iter()
            .position(|t| t.label == label)
            .ok_or_else(|| ChatError::UnknownTemplate(label.to_string()))?;
        self.selected = Some(label.to_string());
        Ok(&self.templates[index])
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Replace the template with the same label, or append it. The upserted
    /// template becomes the selection. Returns true if an existing entry was replaced.
    pub fn upsert(&mut self, template: PromptTemplate) -> bool {
        let label = template.label.clone();
        let replaced = match self.templates.iter_mut().find(|t| t.label == label) {
            Some(existing) => {
                *existing = template;
                true
            }
            None => {
                self.templates.push(template);
                false
            }
        };
        self.selected = Some(label);
        replaced
    }

    /// Prompt for `text` under the active template
    pub fn build_prompt(&self, text: &str) -> String {
        build_prompt(self.selected(), text)
    }
}
