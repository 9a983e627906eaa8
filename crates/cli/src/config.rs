//! TOML config file for the binary.
//!
//! API keys never appear here; they come from the environment
//! (`KEEPSAKE_API_KEY`, falling back to `OPENAI_API_KEY`).

use std::path::Path;

use {
    anyhow::{Context, Result},
    serde::Deserialize,
};

use {keepsake_chat::ChatConfig, keepsake_memory::config::MemoryConfig};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub chat: ChatConfig,
    pub memory: MemoryConfig,
}

impl AppConfig {
    /// Load from a TOML file. A missing file yields the defaults so the
    /// binary runs with nothing but an API key in the environment.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Model endpoint settings, shared by the chat, vision and embedding
/// providers. Any OpenAI-compatible API works; the defaults target OpenAI.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// e.g. `https://api.moonshot.cn/v1`. `None` uses the OpenAI endpoint.
    pub base_url: Option<String>,
    pub chat_model: String,
    /// Enables the image description pre-step when set.
    pub vision_model: Option<String>,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub temperature: f32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            chat_model: "gpt-4o-mini".to_string(),
            vision_model: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            temperature: 0.95,
        }
    }
}
