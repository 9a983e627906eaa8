//! Prompt strings and prompt assembly for the reply call.

use keepsake_memory::retrieve::ScoredMemory;

/// Default reply persona; overridable in the config file.
pub const DEFAULT_PERSONA_PROMPT: &str =
    "You are a warm, attentive companion. Keep replies short and direct, \
     at most a couple of sentences.";

/// Prefix for the retrieved-memory block appended to the user's message.
pub const MEMORY_CONTEXT_PREFIX: &str =
    "Here is what we already know about the user, for your reference only. \
     If it has little to do with the current conversation, ignore it:";

/// What the user sees when a turn fails downstream.
pub const FALLBACK_REPLY: &str = "Sorry, I can't handle that request right now.";

/// Append the retrieved memories (in ranked order) to the user's message.
/// With nothing retrieved the message passes through untouched.
pub fn build_reply_prompt(user_text: &str, memories: &[ScoredMemory]) -> String {
    if memories.is_empty() {
        return user_text.to_string();
    }

    let mut prompt = String::from(user_text);
    prompt.push_str("\n\n");
    prompt.push_str(MEMORY_CONTEXT_PREFIX);
    for memory in memories {
        prompt.push('\n');
        prompt.push_str(&memory.entry.text);
    }
    prompt
}
