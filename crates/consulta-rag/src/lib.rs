//! Consulta RAG - Retrieval-Augmented Generation pipeline
//!
//! Answers one question with a strictly sequential pipeline:
//! embed the question, search the vector store, assemble the retrieved
//! documents into a context block, ask the completion service, and
//! extract the answer.
//!
//! Every remote stage runs under its own deadline and is raced against
//! the request's cancellation token, so a disconnected caller stops the
//! pipeline at the next await point.
//!
//! Author: hephaex@gmail.com

use consulta_core::{
    AppConfig, CompletionClient, ConsultaError, MatchQuery, PipelineStage, Question, RagAnswer,
    Result, RetrievalConfig,
};
use consulta_vector::{EmbeddingClient, HuggingFaceEmbedding, SupabaseStore, VectorStore};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub mod context;
pub mod llm;

pub use context::{assemble_context, CONTEXT_SEPARATOR};
pub use llm::{build_messages, build_request, extract_answer, GroqClient, SYSTEM_PROMPT_PREFIX};

// ============================================================================
// Configuration
// ============================================================================

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Similarity search parameters
    pub retrieval: RetrievalConfig,

    /// Deadline for the embedding call
    pub embedding_timeout: Duration,

    /// Deadline for the vector search call
    pub search_timeout: Duration,

    /// Deadline for the completion call
    pub completion_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            retrieval: config.retrieval,
            embedding_timeout: Duration::from_secs(config.timeouts.embedding_timeout_secs),
            search_timeout: Duration::from_secs(config.timeouts.search_timeout_secs),
            completion_timeout: Duration::from_secs(config.timeouts.completion_timeout_secs),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Question-answering pipeline over injected clients
pub struct AskPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn CompletionClient>,
    config: PipelineConfig,
}

impl AskPipeline {
    /// Create a pipeline from explicit clients
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn CompletionClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            config,
        }
    }

    /// Build the production clients once, sharing one connection pool.
    ///
    /// Fails with a configuration error if any required credential or URL
    /// is missing, so a misconfigured process never reaches an upstream.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeouts.connect_timeout_secs))
            .build()
            .map_err(|e| ConsultaError::Config(format!("HTTP client setup failed: {e}")))?;

        let embedder = HuggingFaceEmbedding::from_config(&config.upstream, http.clone())?;
        let store = SupabaseStore::from_config(&config.upstream, http.clone())?;
        let llm = GroqClient::from_config(&config.upstream, http)?;

        Ok(Self::new(
            Arc::new(embedder),
            Arc::new(store),
            Arc::new(llm),
            PipelineConfig::from_app_config(config),
        ))
    }

    /// Answer one question.
    ///
    /// Stages run strictly in order; the first failure aborts the rest.
    pub async fn ask(&self, question: &Question, cancel: &CancellationToken) -> Result<RagAnswer> {
        let start_time = Instant::now();

        tracing::info!("RAG query started");

        // 1. Embed the question
        let embedding = run_stage(
            PipelineStage::Embedding,
            self.config.embedding_timeout,
            cancel,
            self.embedder.embed(question.as_str()),
        )
        .await?;
        tracing::debug!(
            provider = self.embedder.name(),
            dimension = embedding.dimension(),
            "Question embedded"
        );

        // 2. Similarity search
        let query = MatchQuery::new(embedding, &self.config.retrieval);
        let documents = run_stage(
            PipelineStage::Searching,
            self.config.search_timeout,
            cancel,
            self.store.match_documents(&query),
        )
        .await?;
        tracing::debug!(
            backend = self.store.name(),
            count = documents.len(),
            "Documents retrieved"
        );

        // 3. Context assembly
        ensure_active(PipelineStage::Assembling, cancel)?;
        let context = assemble_context(&documents);
        tracing::debug!("Context assembled: {} chars", context.len());

        // 4. Completion
        let request = build_request(self.llm.model(), question, &context);
        tracing::info!(
            provider = self.llm.name(),
            model = self.llm.model(),
            "Calling LLM with context length: {} chars",
            context.len()
        );
        let completion = run_stage(
            PipelineStage::Completing,
            self.config.completion_timeout,
            cancel,
            self.llm.complete(&request),
        )
        .await?;

        // 5. Answer extraction
        let answer = extract_answer(completion)?;
        tracing::info!("LLM response received: {} chars", answer.len());

        Ok(RagAnswer {
            answer,
            document_count: documents.len(),
            processing_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}

fn ensure_active(stage: PipelineStage, cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(ConsultaError::Cancelled { stage });
    }
    Ok(())
}

/// Run one remote stage under a deadline, racing the cancellation token
async fn run_stage<T, F>(
    stage: PipelineStage,
    limit: Duration,
    cancel: &CancellationToken,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConsultaError::Cancelled { stage }),
        outcome = tokio::time::timeout(limit, call) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ConsultaError::Timeout {
                stage,
                after_secs: limit.as_secs(),
            }),
        },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use consulta_core::{
        CompletionRequest, CompletionResult, Document, EmbeddingVector, Role,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    #[derive(Default)]
    struct MockEmbedder {
        calls: AtomicUsize,
        inputs: Mutex<Vec<String>>,
        fail_with: Option<String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl EmbeddingClient for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inputs.lock().unwrap().push(text.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(msg) => Err(ConsultaError::Embedding(msg.clone())),
                None => EmbeddingVector::new(vec![0.11, 0.22, 0.33]),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[derive(Default)]
    struct MockStore {
        calls: AtomicUsize,
        queries: Mutex<Vec<MatchQuery>>,
        documents: Vec<Document>,
        fail_with: Option<String>,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl VectorStore for MockStore {
        async fn match_documents(&self, query: &MatchQuery) -> Result<Vec<Document>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.queries.lock().unwrap().push(query.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.fail_with {
                Some(msg) => Err(ConsultaError::Store(msg.clone())),
                None => Ok(self.documents.clone()),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    struct MockLlm {
        calls: AtomicUsize,
        requests: Mutex<Vec<CompletionRequest>>,
        result: CompletionResult,
        delay: Option<Duration>,
    }

    impl MockLlm {
        fn answering(content: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                result: CompletionResult::with_content(content),
                delay: None,
            }
        }

        fn without_choices() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                result: CompletionResult::default(),
                delay: None,
            }
        }

        fn stalling(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::answering("too late")
            }
        }
    }

    #[async_trait]
    impl CompletionClient for MockLlm {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.result.clone())
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn pipeline(
        embedder: &Arc<MockEmbedder>,
        store: &Arc<MockStore>,
        llm: &Arc<MockLlm>,
    ) -> AskPipeline {
        AskPipeline::new(
            embedder.clone(),
            store.clone(),
            llm.clone(),
            PipelineConfig::default(),
        )
    }

    fn docs(contents: &[&str]) -> Vec<Document> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Document::new(i as i64 + 1, *c, 0.9 - i as f32 * 0.1))
            .collect()
    }

    // ------------------------------------------------------------------
    // Success paths
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_two_documents_flow_into_system_message() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore {
            documents: docs(&["doc-A", "doc-B"]),
            ..Default::default()
        });
        let llm = Arc::new(MockLlm::answering("Green computing is..."));

        let question = Question::new("¿Qué es Green Computing?").unwrap();
        let answer = pipeline(&embedder, &store, &llm)
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer.answer, "Green computing is...");
        assert_eq!(answer.document_count, 2);

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *embedder.inputs.lock().unwrap(),
            vec!["¿Qué es Green Computing?".to_string()]
        );

        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let messages = &requests[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(
            messages[0].content,
            format!("{SYSTEM_PROMPT_PREFIX}doc-A\n---\ndoc-B")
        );
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "¿Qué es Green Computing?");
        assert_eq!(requests[0].model, "mock-model");
    }

    #[tokio::test]
    async fn test_no_documents_still_answers() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::answering("No context, but here goes"));

        let question = Question::new("hola").unwrap();
        let answer = pipeline(&embedder, &store, &llm)
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(answer.document_count, 0);
        let requests = llm.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].content, SYSTEM_PROMPT_PREFIX);
    }

    #[tokio::test]
    async fn test_match_query_uses_embedding_and_defaults() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::answering("ok"));

        for text in ["short", "a much longer question about data centres"] {
            let question = Question::new(text).unwrap();
            pipeline(&embedder, &store, &llm)
                .ask(&question, &CancellationToken::new())
                .await
                .unwrap();
        }

        let queries = store.queries.lock().unwrap();
        assert_eq!(queries.len(), 2);
        for query in queries.iter() {
            assert_eq!(query.match_threshold, 0.5);
            assert_eq!(query.match_count, 3);
            assert_eq!(query.query_embedding.as_slice(), &[0.11, 0.22, 0.33]);
        }
    }

    // ------------------------------------------------------------------
    // Failure paths
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_embedding_failure_stops_pipeline() {
        let embedder = Arc::new(MockEmbedder {
            fail_with: Some("401 Unauthorized".to_string()),
            ..Default::default()
        });
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::answering("unused"));

        let question = Question::new("hola").unwrap();
        let err = pipeline(&embedder, &store, &llm)
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConsultaError::Embedding(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_skips_completion() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore {
            fail_with: Some("function match_documents does not exist".to_string()),
            ..Default::default()
        });
        let llm = Arc::new(MockLlm::answering("unused"));

        let question = Question::new("hola").unwrap();
        let err = pipeline(&embedder, &store, &llm)
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ConsultaError::Store(msg) => assert!(msg.contains("match_documents")),
            other => panic!("expected store error, got {other:?}"),
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_choices_is_completion_failure() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::without_choices());

        let question = Question::new("hola").unwrap();
        let err = pipeline(&embedder, &store, &llm)
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ConsultaError::Format(_)));
        assert_eq!(err.stage(), PipelineStage::Formatting);
    }

    #[tokio::test]
    async fn test_slow_embedding_times_out() {
        let embedder = Arc::new(MockEmbedder {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::answering("unused"));

        let config = PipelineConfig {
            embedding_timeout: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let pipeline = AskPipeline::new(embedder.clone(), store.clone(), llm.clone(), config);

        let question = Question::new("hola").unwrap();
        let err = pipeline
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConsultaError::Timeout {
                stage: PipelineStage::Embedding,
                ..
            }
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_search_times_out() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let llm = Arc::new(MockLlm::answering("unused"));

        let config = PipelineConfig {
            search_timeout: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let pipeline = AskPipeline::new(embedder.clone(), store.clone(), llm.clone(), config);

        let question = Question::new("hola").unwrap();
        let err = pipeline
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConsultaError::Timeout {
                stage: PipelineStage::Searching,
                ..
            }
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_slow_completion_times_out() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore {
            documents: docs(&["doc-A"]),
            ..Default::default()
        });
        let llm = Arc::new(MockLlm::stalling(Duration::from_secs(30)));

        let config = PipelineConfig {
            completion_timeout: Duration::from_millis(20),
            ..PipelineConfig::default()
        };
        let pipeline = AskPipeline::new(embedder.clone(), store.clone(), llm.clone(), config);

        let question = Question::new("hola").unwrap();
        let err = pipeline
            .ask(&question, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConsultaError::Timeout {
                stage: PipelineStage::Completing,
                ..
            }
        ));
        assert_eq!(err.stage(), PipelineStage::Completing);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_request_makes_no_downstream_calls() {
        let embedder = Arc::new(MockEmbedder::default());
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::answering("unused"));

        let cancel = CancellationToken::new();
        cancel.cancel();

        let question = Question::new("hola").unwrap();
        let err = pipeline(&embedder, &store, &llm)
            .ask(&question, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ConsultaError::Cancelled {
                stage: PipelineStage::Embedding
            }
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_in_flight_stage() {
        let embedder = Arc::new(MockEmbedder {
            delay: Some(Duration::from_secs(30)),
            ..Default::default()
        });
        let store = Arc::new(MockStore::default());
        let llm = Arc::new(MockLlm::answering("unused"));
        let pipeline = pipeline(&embedder, &store, &llm);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let question = Question::new("hola").unwrap();
        let err = pipeline.ask(&question, &cancel).await.unwrap_err();

        assert_eq!(err.stage(), PipelineStage::Embedding);
        assert!(matches!(err, ConsultaError::Cancelled { .. }));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_from_config_rejects_missing_credentials() {
        let result = AskPipeline::from_config(&AppConfig::default());
        assert!(matches!(result, Err(ConsultaError::Config(_))));
    }

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.retrieval, RetrievalConfig::default());
        assert_eq!(config.embedding_timeout, Duration::from_secs(30));
        assert_eq!(config.search_timeout, Duration::from_secs(10));
        assert_eq!(config.completion_timeout, Duration::from_secs(60));
    }
}
