//! External model collaborators: chat completion and image description over
//! OpenAI-compatible HTTP APIs.

pub mod completion;
pub mod openai_compat;
pub mod transport;
pub mod vision;

pub use {
    completion::CompletionProvider,
    openai_compat::OpenAiCompletionProvider,
    vision::{OpenAiVisionProvider, VisionProvider},
};
