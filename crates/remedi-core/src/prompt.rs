//! Prompt assembly: a fixed system instruction with retrieved passages
//! stuffed into its context slot, plus the rendered transcript as the
//! human turn.

use remedi_llm::{Message, Role};
use remedi_memory::ScoredPassage;

pub const SYSTEM_PROMPT: &str = "You are a medical question-answering assistant. \
Answer the user's question using only the retrieved context passages below. \
If the context does not contain the answer, say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// Build the two-part prompt: system instruction with context, then the
/// rendered conversation ending in the `Assistant:` marker.
#[must_use]
pub fn assemble(passages: &[ScoredPassage], transcript: &str) -> Vec<Message> {
    let mut system = String::from(SYSTEM_PROMPT);
    system.push_str("\n\nContext:\n");
    if passages.is_empty() {
        system.push_str("(no passages retrieved)");
    } else {
        for (i, passage) in passages.iter().enumerate() {
            if i > 0 {
                system.push_str("\n\n");
            }
            system.push_str(&passage.text);
        }
    }

    vec![
        Message::new(Role::System, system),
        Message::new(Role::User, transcript),
    ]
}
