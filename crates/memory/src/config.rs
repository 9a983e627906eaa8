use std::path::PathBuf;

use serde::Deserialize;

/// Configuration for the memory subsystem.
///
/// Both thresholds are precision knobs with no single right value: a low
/// merge threshold collapses distinct facts into one entry, a high one
/// accumulates near-duplicates. They are exposed in the config file and can
/// be overridden per request through the chat endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    /// Path to the line-oriented memory file (one fact per line).
    pub memory_path: PathBuf,
    /// Similarity at or above which a new fact overwrites its nearest
    /// stored neighbour instead of being appended.
    pub merge_threshold: f32,
    /// Similarity below which a stored memory is excluded from retrieval.
    pub retrieve_threshold: f32,
    /// Maximum number of memories injected into a reply prompt.
    pub top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_path: PathBuf::from("memory.txt"),
            merge_threshold: 0.85,
            retrieve_threshold: 0.6,
            top_k: 3,
        }
    }
}
