//! One conversation turn, end to end.
//!
//! A turn moves through `Received → [Describing] → Retrieving → Replying →
//! Extracting → Merging → Done`. Any failure before the reply degrades the
//! whole turn to `Errored` (fixed fallback reply, no memory change). A
//! failure *of* the reply call still runs extraction and merging — losing
//! one reply is no reason to forget what the user just said.

use std::sync::Arc;

use {
    serde::Deserialize,
    tracing::{debug, info, warn},
};

use {
    keepsake_memory::{
        config::MemoryConfig,
        extract::MemoryExtractor,
        merge::MemoryMerger,
        retrieve::MemoryRetriever,
    },
    keepsake_providers::{completion::CompletionProvider, vision::VisionProvider},
};

use crate::prompts::{FALLBACK_REPLY, build_reply_prompt};

/// Reply-side configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// Chat model id; `None` uses the provider's default.
    pub model: Option<String>,
    /// System prompt for the reply call.
    pub persona_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: None,
            persona_prompt: crate::prompts::DEFAULT_PERSONA_PROMPT.to_string(),
        }
    }
}

/// One inbound turn, with optional per-request tuning from the endpoint.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub text: String,
    pub images: Vec<Vec<u8>>,
    pub model: Option<String>,
    pub top_k: Option<usize>,
    pub retrieve_threshold: Option<f32>,
    pub merge_threshold: Option<f32>,
}

impl TurnRequest {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// What a turn produced. A degraded turn still yields a well-formed outcome.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub reply: String,
    pub memory_changed: bool,
    pub extracted_facts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Received,
    Describing,
    Retrieving,
    Replying,
    Extracting,
    Merging,
    Done,
    Errored,
}

pub struct ChatOrchestrator {
    retriever: MemoryRetriever,
    merger: MemoryMerger,
    extractor: MemoryExtractor,
    completion: Arc<dyn CompletionProvider>,
    vision: Option<Arc<dyn VisionProvider>>,
    chat: ChatConfig,
    memory: MemoryConfig,
}

impl ChatOrchestrator {
    pub fn new(
        retriever: MemoryRetriever,
        merger: MemoryMerger,
        extractor: MemoryExtractor,
        completion: Arc<dyn CompletionProvider>,
        vision: Option<Arc<dyn VisionProvider>>,
        chat: ChatConfig,
        memory: MemoryConfig,
    ) -> Self {
        Self {
            retriever,
            merger,
            extractor,
            completion,
            vision,
            chat,
            memory,
        }
    }

    /// Run one turn. Never fails: every downstream failure maps to either a
    /// degraded reply or the fixed fallback.
    pub async fn handle_turn(&self, req: TurnRequest) -> TurnOutcome {
        let mut state = TurnState::Received;
        let user_text = req.text.trim().to_string();
        info!(chars = user_text.len(), images = req.images.len(), "handling turn");

        // Images become a text description that augments retrieval and the
        // reply prompt; the extractor later sees only the user's own words.
        let context_text = if req.images.is_empty() {
            user_text.clone()
        } else {
            let Some(vision) = &self.vision else {
                warn!("turn carries images but no vision provider is configured");
                return Self::errored(&mut state);
            };
            advance(&mut state, TurnState::Describing);
            match vision.describe(&req.images).await {
                Ok(description) if user_text.is_empty() => description,
                Ok(description) => format!("{description}\n{user_text}"),
                Err(e) => {
                    warn!(error = %e, "image description failed");
                    return Self::errored(&mut state);
                },
            }
        };

        advance(&mut state, TurnState::Retrieving);
        let top_k = req.top_k.unwrap_or(self.memory.top_k);
        let retrieve_threshold = req
            .retrieve_threshold
            .unwrap_or(self.memory.retrieve_threshold);
        let memories = match self
            .retriever
            .retrieve(&context_text, top_k, retrieve_threshold)
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                warn!(error = %e, "memory retrieval failed");
                return Self::errored(&mut state);
            },
        };
        debug!(retrieved = memories.len(), "retrieved memory context");

        advance(&mut state, TurnState::Replying);
        let model = req
            .model
            .as_deref()
            .or(self.chat.model.as_deref())
            .unwrap_or_else(|| self.completion.default_model())
            .to_string();
        let reply_prompt = build_reply_prompt(&context_text, &memories);
        let reply = match self
            .completion
            .complete(&self.chat.persona_prompt, &reply_prompt, &model)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                // The turn is degraded but the user's words still carry
                // facts worth keeping; extraction proceeds.
                warn!(error = %e, "reply completion failed, using fallback reply");
                FALLBACK_REPLY.to_string()
            },
        };

        advance(&mut state, TurnState::Extracting);
        let extracted_facts = self.extractor.extract(&user_text).await;

        advance(&mut state, TurnState::Merging);
        let merge_threshold = req.merge_threshold.unwrap_or(self.memory.merge_threshold);
        let mut memory_changed = false;
        // Merges are sequential on purpose: each one must observe the store
        // as left by the previous one within the same turn.
        for fact in &extracted_facts {
            match self.merger.merge_one(fact, merge_threshold).await {
                Ok(outcome) => {
                    debug!(?outcome, fact = %fact, "merged extracted fact");
                    memory_changed = true;
                },
                Err(e) => {
                    warn!(error = %e, fact = %fact, "merge failed, dropping remaining facts");
                    break;
                },
            }
        }

        advance(&mut state, TurnState::Done);
        TurnOutcome {
            reply,
            memory_changed,
            extracted_facts,
        }
    }

    fn errored(state: &mut TurnState) -> TurnOutcome {
        advance(state, TurnState::Errored);
        TurnOutcome {
            reply: FALLBACK_REPLY.to_string(),
            memory_changed: false,
            extracted_facts: Vec::new(),
        }
    }
}

fn advance(state: &mut TurnState, next: TurnState) {
    debug!(from = ?state, to = ?next, "turn state transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use {
        async_trait::async_trait,
        std::{
            collections::{HashMap, VecDeque},
            sync::Arc,
        },
        tempfile::TempDir,
        tokio::sync::Mutex,
    };

    use {
        keepsake_common::ModelError,
        keepsake_memory::{
            embeddings::EmbeddingProvider,
            similarity::SimilarityEngine,
            store::{FileMemoryStore, MemoryStore},
        },
    };

    use super::*;
    use crate::prompts::MEMORY_CONTEXT_PREFIX;

    /// Unit vectors per known text; unknown texts land on a filler axis.
    struct MapEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl MapEmbedder {
        fn new(entries: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: entries
                    .iter()
                    .map(|(t, v)| ((*t).to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MapEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    self.vectors
                        .get(t)
                        .cloned()
                        .unwrap_or(vec![0.0, 0.0, 1.0])
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "map-test-embedder"
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            anyhow::bail!("embedding backend down")
        }

        fn model_name(&self) -> &str {
            "failing-test-embedder"
        }

        fn dimensions(&self) -> usize {
            0
        }
    }

    /// Pops one scripted result per call and records every call it saw.
    /// The orchestrator calls the completion once for the reply and once
    /// (through the extractor) per turn, in that order.
    struct ScriptedCompletion {
        script: Mutex<VecDeque<Result<String, ModelError>>>,
        calls: Mutex<Vec<(String, String, String)>>,
    }

    impl ScriptedCompletion {
        fn new(script: Vec<Result<String, ModelError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        async fn recorded_calls(&self) -> Vec<(String, String, String)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedCompletion {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
            model: &str,
        ) -> Result<String, ModelError> {
            self.calls.lock().await.push((
                system_prompt.to_string(),
                user_prompt.to_string(),
                model.to_string(),
            ));
            self.script
                .lock()
                .await
                .pop_front()
                .unwrap_or(Err(ModelError::Permanent("script exhausted".into())))
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }
    }

    struct StaticVision {
        description: Result<&'static str, ()>,
    }

    #[async_trait]
    impl VisionProvider for StaticVision {
        async fn describe(&self, _images: &[Vec<u8>]) -> Result<String, ModelError> {
            self.description
                .map(str::to_string)
                .map_err(|()| ModelError::Transient("vision down".into()))
        }
    }

    struct Fixture {
        orchestrator: ChatOrchestrator,
        completion: Arc<ScriptedCompletion>,
        store: Arc<FileMemoryStore>,
        _tmp: TempDir,
    }

    async fn fixture(
        script: Vec<Result<String, ModelError>>,
        embedder: Arc<dyn EmbeddingProvider>,
        vision: Option<Arc<dyn VisionProvider>>,
    ) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(
            FileMemoryStore::open(tmp.path().join("memory.txt"))
                .await
                .unwrap(),
        );
        let completion = ScriptedCompletion::new(script);
        let engine = SimilarityEngine::new(embedder);

        let orchestrator = ChatOrchestrator::new(
            MemoryRetriever::new(store.clone(), engine.clone()),
            MemoryMerger::new(store.clone(), engine),
            MemoryExtractor::new(completion.clone(), "scripted-model"),
            completion.clone(),
            vision,
            ChatConfig::default(),
            MemoryConfig {
                memory_path: tmp.path().join("memory.txt"),
                merge_threshold: 0.85,
                retrieve_threshold: 0.6,
                top_k: 3,
            },
        );

        Fixture {
            orchestrator,
            completion,
            store,
            _tmp: tmp,
        }
    }

    fn plain_embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(MapEmbedder::new(&[]))
    }

    #[tokio::test]
    async fn turn_with_nothing_to_remember() {
        let f = fixture(
            vec![Ok("hello!".into()), Ok("none".into())],
            plain_embedder(),
            None,
        )
        .await;

        let outcome = f
            .orchestrator
            .handle_turn(TurnRequest::from_text("good morning"))
            .await;

        assert_eq!(outcome.reply, "hello!");
        assert!(!outcome.memory_changed);
        assert!(outcome.extracted_facts.is_empty());
        assert!(f.store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn extracted_facts_are_merged_into_the_store() {
        // Distinct vectors so the second fact is not mistaken for a
        // near-duplicate of the first.
        let embedder = Arc::new(MapEmbedder::new(&[
            ("the user likes cheese", vec![1.0, 0.0, 0.0]),
            ("the user plays violin", vec![0.0, 1.0, 0.0]),
        ]));
        let f = fixture(
            vec![
                Ok("nice to meet you".into()),
                Ok("the user likes cheese && the user plays violin".into()),
            ],
            embedder,
            None,
        )
        .await;

        let outcome = f
            .orchestrator
            .handle_turn(TurnRequest::from_text("I like cheese and play violin"))
            .await;

        assert!(outcome.memory_changed);
        assert_eq!(outcome.extracted_facts.len(), 2);
        let texts: Vec<_> = f
            .store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["the user likes cheese", "the user plays violin"]);
    }

    #[tokio::test]
    async fn retrieved_memories_reach_the_reply_prompt_but_not_the_extractor() {
        let embedder = Arc::new(MapEmbedder::new(&[
            ("what should I eat?", vec![1.0, 0.0, 0.0]),
            ("the user likes cheese", vec![0.9, 0.435_889_87, 0.0]),
        ]));
        let f = fixture(
            vec![Ok("how about cheese?".into()), Ok("none".into())],
            embedder,
            None,
        )
        .await;
        f.store
            .append(&["the user likes cheese".into()])
            .await
            .unwrap();

        f.orchestrator
            .handle_turn(TurnRequest::from_text("what should I eat?"))
            .await;

        let calls = f.completion.recorded_calls().await;
        assert_eq!(calls.len(), 2);

        let (_, reply_prompt, _) = &calls[0];
        assert!(reply_prompt.contains(MEMORY_CONTEXT_PREFIX));
        assert!(reply_prompt.contains("the user likes cheese"));

        let (_, extraction_prompt, _) = &calls[1];
        assert!(!extraction_prompt.contains(MEMORY_CONTEXT_PREFIX));
        assert!(extraction_prompt.contains("what should I eat?"));
    }

    #[tokio::test]
    async fn reply_failure_still_extracts_and_merges() {
        let f = fixture(
            vec![
                Err(ModelError::Transient("completion down".into())),
                Ok("the user likes cheese".into()),
            ],
            plain_embedder(),
            None,
        )
        .await;

        let outcome = f
            .orchestrator
            .handle_turn(TurnRequest::from_text("I like cheese"))
            .await;

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert!(outcome.memory_changed);
        assert_eq!(f.store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_the_whole_turn() {
        let f = fixture(vec![], Arc::new(FailingEmbedder), None).await;
        f.store.append(&["the user likes cheese".into()]).await.unwrap();

        let outcome = f
            .orchestrator
            .handle_turn(TurnRequest::from_text("hello"))
            .await;

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert!(!outcome.memory_changed);
        assert!(outcome.extracted_facts.is_empty());
        // Neither reply nor extraction reached the completion model.
        assert!(f.completion.recorded_calls().await.is_empty());
    }

    #[tokio::test]
    async fn image_description_augments_retrieval_but_not_extraction() {
        let vision: Arc<dyn VisionProvider> = Arc::new(StaticVision {
            description: Ok("a samoyed puppy in the snow"),
        });
        let f = fixture(
            vec![Ok("cute dog!".into()), Ok("the user has a samoyed".into())],
            plain_embedder(),
            Some(vision),
        )
        .await;

        let mut req = TurnRequest::from_text("look at my dog");
        req.images = vec![vec![1, 2, 3]];
        let outcome = f.orchestrator.handle_turn(req).await;

        assert_eq!(outcome.reply, "cute dog!");
        let calls = f.completion.recorded_calls().await;
        let (_, reply_prompt, _) = &calls[0];
        assert!(reply_prompt.contains("a samoyed puppy in the snow"));
        let (_, extraction_prompt, _) = &calls[1];
        assert!(!extraction_prompt.contains("a samoyed puppy"));
        assert!(extraction_prompt.contains("look at my dog"));
    }

    #[tokio::test]
    async fn vision_failure_degrades_the_turn() {
        let vision: Arc<dyn VisionProvider> = Arc::new(StaticVision {
            description: Err(()),
        });
        let f = fixture(vec![], plain_embedder(), Some(vision)).await;

        let mut req = TurnRequest::from_text("look at this");
        req.images = vec![vec![1]];
        let outcome = f.orchestrator.handle_turn(req).await;

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert!(!outcome.memory_changed);
    }

    #[tokio::test]
    async fn images_without_a_vision_provider_degrade_the_turn() {
        let f = fixture(vec![], plain_embedder(), None).await;

        let mut req = TurnRequest::from_text("look at this");
        req.images = vec![vec![1]];
        let outcome = f.orchestrator.handle_turn(req).await;

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert!(!outcome.memory_changed);
    }

    #[tokio::test]
    async fn per_request_model_override_wins() {
        let f = fixture(
            vec![Ok("ok".into()), Ok("none".into())],
            plain_embedder(),
            None,
        )
        .await;

        let mut req = TurnRequest::from_text("hello");
        req.model = Some("special-model".into());
        f.orchestrator.handle_turn(req).await;

        let calls = f.completion.recorded_calls().await;
        assert_eq!(calls[0].2, "special-model");
        // The extractor keeps its configured model.
        assert_eq!(calls[1].2, "scripted-model");
    }

    #[tokio::test]
    async fn merge_threshold_override_controls_dedup() {
        let embedder = Arc::new(MapEmbedder::new(&[
            ("the user likes cheese", vec![1.0, 0.0, 0.0]),
            ("the user loves cheese", vec![0.92, 0.391_918_36, 0.0]),
        ]));
        let f = fixture(
            vec![Ok("ok".into()), Ok("the user loves cheese".into())],
            embedder,
            None,
        )
        .await;
        f.store.append(&["the user likes cheese".into()]).await.unwrap();

        // 0.92 similarity < 0.95 threshold: appended, not merged.
        let mut req = TurnRequest::from_text("I love cheese");
        req.merge_threshold = Some(0.95);
        req.retrieve_threshold = Some(0.99);
        f.orchestrator.handle_turn(req).await;

        assert_eq!(f.store.list().await.unwrap().len(), 2);
    }
}
