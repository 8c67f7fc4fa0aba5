//! Prompt assembly for the downstream generator
//!
//! Pure formatting: numbered context blocks in ranked order, the literal
//! question, then the instructions.

use serde::{Deserialize, Serialize};

/// Language of the prompt scaffolding and of the default persona
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptLanguage {
    /// The installation's own wording
    #[default]
    German,
    English,
}

impl PromptLanguage {
    fn context_label(self) -> &'static str {
        match self {
            PromptLanguage::German => "Kontextblöcke:",
            PromptLanguage::English => "Context blocks:",
        }
    }

    fn question_label(self) -> &'static str {
        match self {
            PromptLanguage::German => "Frage:",
            PromptLanguage::English => "Question:",
        }
    }

    /// Instruction that pins the generator to the supplied context
    pub fn grounding_instruction(self) -> &'static str {
        match self {
            PromptLanguage::German => {
                "Nutze ausschließlich die nummerierten Kontextblöcke für deine Antwort."
            }
            PromptLanguage::English => "Use only the numbered context blocks for your answer.",
        }
    }

    /// Persona instructions used when configuration gives none
    pub fn default_instructions(self) -> Vec<String> {
        let lines: &[&str] = match self {
            PromptLanguage::German => &[
                "Antworte als Peter Ablinger (Klavier), in der Ich-Form.",
                "Keine Aussagen über KI oder fehlendes Wissen.",
                "Antworte maximal 100 Wörter.",
                "Wenn nötige Information fehlt, bitte gezielt nachfragen.",
            ],
            PromptLanguage::English => &[
                "Answer as Peter Ablinger (piano), in the first person.",
                "Make no statements about AI or about missing knowledge.",
                "Answer in at most 100 words.",
                "If necessary information is missing, ask a targeted follow-up question.",
            ],
        };
        lines.iter().map(|s| s.to_string()).collect()
    }
}

/// Build the generator prompt from ranked block texts.
///
/// ```text
/// Kontextblöcke:
/// 1. <text of rank 1>
///
/// 2. <text of rank 2>
///
/// Frage: <query>
/// <grounding instruction> <instructions...>
/// ```
pub fn build_prompt<S: AsRef<str>>(
    query: &str,
    blocks: &[S],
    language: PromptLanguage,
    instructions: &[String],
) -> String {
    let context = blocks
        .iter()
        .enumerate()
        .map(|(i, block)| format!("{}. {}", i + 1, block.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut tail = vec![language.grounding_instruction().to_string()];
    tail.extend(instructions.iter().filter(|s| !s.trim().is_empty()).cloned());

    format!(
        "{}\n{}\n\n{} {}\n{}",
        language.context_label(),
        context,
        language.question_label(),
        query,
        tail.join(" ")
    )
}
