//! Long-term conversational memory: atomic facts → embedded → similarity
//! merge and threshold-ranked retrieval over a line-oriented file store.

pub mod config;
pub mod embeddings;
pub mod embeddings_openai;
pub mod extract;
pub mod merge;
pub mod retrieve;
pub mod similarity;
pub mod store;
