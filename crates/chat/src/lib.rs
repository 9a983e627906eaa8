//! Per-turn conversation orchestration: retrieve relevant memories, reply,
//! extract new facts, merge them back into the store.

pub mod prompts;
pub mod turn;

pub use turn::{ChatConfig, ChatOrchestrator, TurnOutcome, TurnRequest};
