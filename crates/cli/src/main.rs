//! Binary entrypoint: config, provider wiring, HTTP serve.

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, Result},
    clap::Parser,
    tracing::info,
    tracing_subscriber::EnvFilter,
};

use {
    keepsake_chat::ChatOrchestrator,
    keepsake_gateway::{AppState, router},
    keepsake_memory::{
        embeddings_openai::OpenAiEmbeddingProvider,
        extract::MemoryExtractor,
        merge::MemoryMerger,
        retrieve::MemoryRetriever,
        similarity::SimilarityEngine,
        store::FileMemoryStore,
    },
    keepsake_providers::{OpenAiCompletionProvider, OpenAiVisionProvider, VisionProvider},
};

mod config;

use config::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "keepsake", version, about = "Chat assistant with long-term memory")]
struct Cli {
    /// TOML config file; missing file falls back to defaults.
    #[arg(long, default_value = "keepsake.toml")]
    config: PathBuf,

    /// Listen address, overriding the config file.
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;
    let listen = cli.listen.unwrap_or_else(|| cfg.server.listen.clone());

    let api_key = std::env::var("KEEPSAKE_API_KEY")
        .or_else(|_| std::env::var("OPENAI_API_KEY"))
        .context("set KEEPSAKE_API_KEY (or OPENAI_API_KEY) to a provider API key")?;

    let mut completion =
        OpenAiCompletionProvider::new(api_key.clone(), cfg.provider.chat_model.clone())
            .with_temperature(cfg.provider.temperature);
    let mut embedder = OpenAiEmbeddingProvider::new(api_key.clone()).with_model(
        cfg.provider.embedding_model.clone(),
        cfg.provider.embedding_dimensions,
    );
    if let Some(base_url) = &cfg.provider.base_url {
        completion = completion.with_base_url(base_url.clone());
        embedder = embedder.with_base_url(base_url.clone());
    }
    let completion = Arc::new(completion);

    let vision: Option<Arc<dyn VisionProvider>> = match &cfg.provider.vision_model {
        Some(model) => {
            let mut inner = OpenAiCompletionProvider::new(api_key, model.clone());
            if let Some(base_url) = &cfg.provider.base_url {
                inner = inner.with_base_url(base_url.clone());
            }
            Some(Arc::new(OpenAiVisionProvider::new(inner, model.clone())))
        },
        None => None,
    };

    let store = Arc::new(
        FileMemoryStore::open(cfg.memory.memory_path.clone())
            .await
            .with_context(|| {
                format!("opening memory file {}", cfg.memory.memory_path.display())
            })?,
    );
    let similarity = SimilarityEngine::new(Arc::new(embedder));

    let orchestrator = Arc::new(ChatOrchestrator::new(
        MemoryRetriever::new(store.clone(), similarity.clone()),
        MemoryMerger::new(store.clone(), similarity),
        MemoryExtractor::new(completion.clone(), cfg.provider.chat_model.clone()),
        completion,
        vision,
        cfg.chat.clone(),
        cfg.memory.clone(),
    ));

    let state = AppState {
        orchestrator,
        store,
    };

    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!(
        %listen,
        memory_path = %cfg.memory.memory_path.display(),
        chat_model = %cfg.provider.chat_model,
        vision = cfg.provider.vision_model.is_some(),
        "keepsake listening"
    );
    axum::serve(listener, router(state)).await?;
    Ok(())
}
