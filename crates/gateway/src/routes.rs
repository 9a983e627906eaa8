//! Route handlers: `POST /chat`, `GET /memories`, `DELETE /memories`.

use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::State,
        http::StatusCode,
        routing::{get, post},
    },
    base64::Engine as _,
    serde::{Deserialize, Serialize},
    tracing::{error, info},
};

use {
    keepsake_chat::{ChatOrchestrator, TurnRequest},
    keepsake_memory::store::MemoryStore,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub store: Arc<dyn MemoryStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/memories", get(list_memories).delete(clear_memories))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub content: String,
    /// Base64-encoded image payloads.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub retrieve_threshold: Option<f32>,
    #[serde(default)]
    pub merge_threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub memory_changed: bool,
    pub extracted: Vec<String>,
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let mut images = Vec::with_capacity(body.images.len());
    for (i, encoded) in body.images.iter().enumerate() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| {
                (
                    StatusCode::BAD_REQUEST,
                    format!("image {i} is not valid base64: {e}"),
                )
            })?;
        images.push(bytes);
    }

    let req = TurnRequest {
        text: body.content,
        images,
        model: body.model,
        top_k: body.top_k,
        retrieve_threshold: body.retrieve_threshold,
        merge_threshold: body.merge_threshold,
    };

    let outcome = state.orchestrator.handle_turn(req).await;
    info!(
        memory_changed = outcome.memory_changed,
        facts = outcome.extracted_facts.len(),
        "turn completed"
    );

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        memory_changed: outcome.memory_changed,
        extracted: outcome.extracted_facts,
    }))
}

#[derive(Debug, Serialize)]
pub struct MemoriesResponse {
    pub memories: Vec<String>,
}

async fn list_memories(
    State(state): State<AppState>,
) -> Result<Json<MemoriesResponse>, (StatusCode, String)> {
    let entries = state.store.list().await.map_err(|e| {
        error!(error = %e, "failed to list memories");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    Ok(Json(MemoriesResponse {
        memories: entries.into_iter().map(|e| e.text).collect(),
    }))
}

async fn clear_memories(State(state): State<AppState>) -> Result<StatusCode, (StatusCode, String)> {
    state.store.clear().await.map_err(|e| {
        error!(error = %e, "failed to clear memories");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    })?;
    info!("cleared all memories");
    Ok(StatusCode::NO_CONTENT)
}
