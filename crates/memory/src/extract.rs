//! Memory extraction from a conversation turn.
//!
//! The completion model is an untrusted text producer: all parsing and
//! validation of its output lives here, behind `extract`, so format drift is
//! a localized failure. The contract with the model is deliberately simple —
//! a literal sentinel for "nothing to remember", a fixed delimiter between
//! facts — chosen for robustness over expressiveness.

use std::sync::Arc;

use {keepsake_providers::completion::CompletionProvider, tracing::warn};

/// What the model must output when the turn holds nothing worth keeping.
pub const EXTRACTION_SENTINEL: &str = "none";

/// Separator between facts when one turn yields several.
pub const FACT_DELIMITER: &str = "&&";

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract information worth remembering long-term from a single user message.

Worth remembering:
1. Concrete likes and dislikes: enjoys cilantro, hates early meetings, plays volleyball.
2. Concrete dates: starts the new job on April 22.
3. Names and places: the user's name, where they live.
4. Standing requests about how to respond: call them "captain", never use exclamation marks.

Nothing else counts. If the message contains no such information, output exactly: none
If it contains several facts, separate them with && .
State each fact as one short, precise sentence about the user.

# Example 1
User: ugh, my back is killing me.
You: none

# Example 2
User: I'm a Sagittarius, by the way.
You: the user's star sign is Sagittarius

# Example 3
User: my name is Wang Dayong, I'm from Changsha.
You: the user's name is Wang Dayong && the user is from Changsha

Begin."#;

/// Asks the completion model for zero or more atomic facts.
pub struct MemoryExtractor {
    completion: Arc<dyn CompletionProvider>,
    model: String,
}

impl MemoryExtractor {
    pub fn new(completion: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            completion,
            model: model.into(),
        }
    }

    /// Extract facts from `utterance`. Never errors: a failed or garbled
    /// completion is treated as "nothing extracted".
    pub async fn extract(&self, utterance: &str) -> Vec<String> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Vec::new();
        }

        let user_prompt = format!("User: {utterance}");
        match self
            .completion
            .complete(EXTRACTION_SYSTEM_PROMPT, &user_prompt, &self.model)
            .await
        {
            Ok(output) => parse_facts(&output),
            Err(e) => {
                warn!(error = %e, "memory extraction failed, treating as no memory");
                Vec::new()
            },
        }
    }
}

/// Split raw model output into atomic facts.
pub(crate) fn parse_facts(output: &str) -> Vec<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() || is_sentinel(trimmed) {
        return Vec::new();
    }
    trimmed
        .split(FACT_DELIMITER)
        .map(str::trim)
        .filter(|fact| !fact.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_sentinel(output: &str) -> bool {
    output
        .trim_matches(|c: char| c.is_whitespace() || c == '.' || c == '。')
        .eq_ignore_ascii_case(EXTRACTION_SENTINEL)
}
