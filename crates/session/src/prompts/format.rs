//! Gemma chat-turn formatting.

use super::PromptTemplate;

/// Task label recorded for messages sent without a template
pub const UNTEMPLATED_LABEL: &str = "Normal Chat";

const USER_TURN: &str = "<start_of_turn>user\n";
const MODEL_TURN: &str = "<end_of_turn>\n<start_of_turn>model";

/// Wrap user text in a single Gemma user turn followed by the model turn opener.
///
/// With a template, its body is placed before the text in the same turn,
/// separated by a blank line. Template bodies are trusted and not escaped.
pub fn build_prompt(template: Option<&PromptTemplate>, text: &str) -> String {
    match template {
        Some(template) => format!("{USER_TURN}{}\n\n{text}\n{MODEL_TURN}", template.body),
        None => format!("{USER_TURN}{text}\n{MODEL_TURN}"),
    }
}
