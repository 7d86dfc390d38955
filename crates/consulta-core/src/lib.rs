//! Consulta Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout Consulta:
//! - Question, embedding and document models
//! - Chat-completion request/response models
//! - Pipeline stages and the common error type
//! - The completion client trait
//! - Configuration management

pub mod config;

pub use config::{
    AppConfig, ConfigError, LoggingConfig, RetrievalConfig, ServerConfig, TimeoutConfig,
    UpstreamConfig,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Pipeline Stages
// ============================================================================

/// Stages of the question-answering pipeline.
///
/// A request moves strictly forward through
/// `Validating → Embedding → Searching → Assembling → Completing → Formatting → Responded`;
/// `Failed` is reachable from any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Validating,
    Embedding,
    Searching,
    Assembling,
    Completing,
    Formatting,
    Responded,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validation",
            Self::Embedding => "embedding",
            Self::Searching => "document search",
            Self::Assembling => "context assembly",
            Self::Completing => "completion",
            Self::Formatting => "answer formatting",
            Self::Responded => "response",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Consulta operations
#[derive(Error, Debug)]
pub enum ConsultaError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Completion error: {0}")]
    Completion(String),

    /// The completion service answered, but not with a usable first choice
    #[error("Malformed completion: {0}")]
    Format(String),

    #[error("{stage} timed out after {after_secs}s")]
    Timeout { stage: PipelineStage, after_secs: u64 },

    #[error("Request cancelled during {stage}")]
    Cancelled { stage: PipelineStage },
}

impl ConsultaError {
    /// The pipeline stage this error aborted
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::Validation(_) | Self::Config(_) => PipelineStage::Validating,
            Self::Embedding(_) => PipelineStage::Embedding,
            Self::Store(_) => PipelineStage::Searching,
            Self::Completion(_) => PipelineStage::Completing,
            Self::Format(_) => PipelineStage::Formatting,
            Self::Timeout { stage, .. } | Self::Cancelled { stage } => *stage,
        }
    }
}

impl From<ConfigError> for ConsultaError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsultaError>;

// ============================================================================
// Request Models
// ============================================================================

/// A caller's question.
///
/// Guaranteed non-blank; the text is kept verbatim (no trimming) so the
/// embedding and completion services see exactly what the caller sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Question(String);

impl Question {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(ConsultaError::Validation(
                "Question cannot be empty".to_string(),
            ));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dense embedding of a question.
///
/// Dimensionality comes from the embedding model; construction only checks
/// that the vector is non-empty and every component is finite.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Result<Self> {
        if values.is_empty() {
            return Err(ConsultaError::Embedding(
                "Embedding vector is empty".to_string(),
            ));
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(ConsultaError::Embedding(format!(
                "Embedding component {pos} is not a finite number"
            )));
        }
        Ok(Self(values))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

// ============================================================================
// Document Models
// ============================================================================

/// Row identifier as returned by the store (integer or text/uuid)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    Text(String),
}

/// A document chunk returned by similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store identifier
    #[serde(default)]
    pub id: Option<DocumentId>,

    /// Text content
    #[serde(alias = "contenido")]
    pub content: String,

    /// Title of the source file, if the store keeps one
    #[serde(default, alias = "titulo", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Similarity to the query (higher is closer); `null` rows decode as `None`
    #[serde(default)]
    pub similarity: Option<f32>,
}

impl Document {
    pub fn new(id: i64, content: impl Into<String>, similarity: f32) -> Self {
        Self {
            id: Some(DocumentId::Int(id)),
            content: content.into(),
            title: None,
            similarity: Some(similarity),
        }
    }
}

/// Parameters of one `match_documents` call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchQuery {
    pub query_embedding: EmbeddingVector,
    pub match_threshold: f32,
    pub match_count: usize,
}

impl MatchQuery {
    pub fn new(query_embedding: EmbeddingVector, retrieval: &RetrievalConfig) -> Self {
        Self {
            query_embedding,
            match_threshold: retrieval.match_threshold,
            match_count: retrieval.match_count,
        }
    }
}

// ============================================================================
// Chat Completion Models
// ============================================================================

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Body of a chat-completions call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

/// Decoded chat-completions response.
///
/// Every level is optional so that a structurally incomplete answer decodes
/// and is rejected by answer extraction rather than by the JSON decoder.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionResult {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionChoice {
    pub message: Option<CompletionMessage>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CompletionMessage {
    pub role: Option<String>,
    pub content: Option<String>,
}

impl CompletionResult {
    /// Build a single-choice result (used by test doubles)
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            choices: vec![CompletionChoice {
                message: Some(CompletionMessage {
                    role: Some("assistant".to_string()),
                    content: Some(content.into()),
                }),
                finish_reason: Some("stop".to_string()),
            }],
        }
    }
}

/// Pipeline output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagAnswer {
    /// Generated answer
    pub answer: String,

    /// Number of documents that went into the context
    pub document_count: usize,

    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for chat-completion services
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send one completion request
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult>;

    /// Model identifier sent with every request
    fn model(&self) -> &str;

    /// Provider name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_rejects_blank() {
        assert!(matches!(
            Question::new(""),
            Err(ConsultaError::Validation(_))
        ));
        assert!(Question::new(" \n\t").is_err());
    }

    #[test]
    fn test_question_keeps_text_verbatim() {
        let q = Question::new("  ¿Qué es Green Computing? ").unwrap();
        assert_eq!(q.as_str(), "  ¿Qué es Green Computing? ");
    }

    #[test]
    fn test_embedding_vector_validation() {
        assert!(EmbeddingVector::new(vec![]).is_err());
        assert!(EmbeddingVector::new(vec![0.1, f32::NAN]).is_err());
        assert!(EmbeddingVector::new(vec![0.1, f32::INFINITY]).is_err());

        let v = EmbeddingVector::new(vec![0.1, -0.2, 0.3]).unwrap();
        assert_eq!(v.dimension(), 3);
        assert_eq!(v.as_slice(), &[0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_document_decodes_store_row() {
        let doc: Document = serde_json::from_value(json!({
            "id": 7,
            "titulo": "green.txt",
            "contenido": "Green computing reduces energy use.",
            "similarity": 0.82
        }))
        .unwrap();

        assert_eq!(doc.id, Some(DocumentId::Int(7)));
        assert_eq!(doc.title.as_deref(), Some("green.txt"));
        assert_eq!(doc.content, "Green computing reduces energy use.");
        assert!((doc.similarity.unwrap() - 0.82).abs() < 1e-6);
    }

    #[test]
    fn test_document_accepts_uuid_id_and_content_field() {
        let doc: Document = serde_json::from_value(json!({
            "id": "7f1c0c7e-0000-4000-8000-000000000000",
            "content": "text"
        }))
        .unwrap();

        assert!(matches!(doc.id, Some(DocumentId::Text(_))));
        assert_eq!(doc.similarity, None);
    }

    #[test]
    fn test_document_tolerates_null_similarity() {
        let docs: Vec<Document> = serde_json::from_value(json!([
            {"id": 1, "contenido": "a", "similarity": null}
        ]))
        .unwrap();

        assert_eq!(docs[0].content, "a");
        assert_eq!(docs[0].similarity, None);
    }

    #[test]
    fn test_match_query_wire_format() {
        let embedding = EmbeddingVector::new(vec![0.5, 0.25]).unwrap();
        let query = MatchQuery::new(embedding, &RetrievalConfig::default());

        assert_eq!(
            serde_json::to_value(&query).unwrap(),
            json!({
                "query_embedding": [0.5, 0.25],
                "match_threshold": 0.5,
                "match_count": 3
            })
        );
    }

    #[test]
    fn test_chat_message_roles_serialize_lowercase() {
        let value = serde_json::to_value(ChatMessage::system("ctx")).unwrap();
        assert_eq!(value, json!({"role": "system", "content": "ctx"}));
    }

    #[test]
    fn test_completion_result_tolerates_missing_parts() {
        let result: CompletionResult = serde_json::from_value(json!({})).unwrap();
        assert!(result.choices.is_empty());

        let result: CompletionResult =
            serde_json::from_value(json!({"choices": [{"index": 0}]})).unwrap();
        assert!(result.choices[0].message.is_none());
    }

    #[test]
    fn test_error_stage_and_classification() {
        assert_eq!(
            ConsultaError::Store("boom".into()).stage(),
            PipelineStage::Searching
        );
        assert_eq!(
            ConsultaError::Format("no choices".into()).stage(),
            PipelineStage::Formatting
        );

        let timeout = ConsultaError::Timeout {
            stage: PipelineStage::Completing,
            after_secs: 60,
        };
        assert_eq!(timeout.to_string(), "completion timed out after 60s");
    }
}
