//! Prompt assembly for the completion call.

use crate::glossary::GlossaryEntry;
use crate::session::Turn;

/// Persona instructions placed at the top of every prompt.
pub const SYSTEM_PROMPT: &str = "You are FinBot, a friendly financial advisor that explains concepts in simple language. \
Your goal is to make financial topics accessible and easy to understand. \
Use the provided financial knowledge to inform your responses, but explain everything in plain, jargon-free language. \
Use analogies and examples to help users understand complex concepts. \
Keep responses conversational and engaging. \
If you don't know something, be honest about it. \
Never make up financial information.";

/// Speaker label for user lines in the history block.
pub const USER_LABEL: &str = "User";

/// Speaker label for assistant lines in the history block.
pub const BOT_LABEL: &str = "FinBot";

/// Render turns as alternating `User:` / `FinBot:` lines. A turn without a
/// reply contributes only its user line.
pub fn render_history(history: &[Turn]) -> String {
    let mut lines = Vec::with_capacity(history.len() * 2);
    for turn in history {
        lines.push(format!("{USER_LABEL}: {}", turn.user));
        if let Some(bot) = &turn.bot {
            lines.push(format!("{BOT_LABEL}: {bot}"));
        }
    }
    lines.join("\n")
}

/// Render entries as `- term: definition` lines.
pub fn render_knowledge(entries: &[&GlossaryEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("- {}: {}", e.term, e.definition))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full completion prompt.
///
/// Sections appear in a fixed order: persona, conversation history, the
/// current query, then the relevant glossary knowledge. Empty sections keep
/// their headings.
pub fn build_prompt(history: &[Turn], query: &str, entries: &[&GlossaryEntry]) -> String {
    format!(
        "{SYSTEM_PROMPT}\n\nConversation history:\n{}\n\nQuery: {query}\n\nRelevant financial knowledge:\n{}",
        render_history(history),
        render_knowledge(entries),
    )
}
