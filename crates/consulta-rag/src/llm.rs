//! Chat-completion client
//!
//! Builds the two-message conversation (system instruction carrying the
//! retrieved context, then the user's question), sends it to an
//! OpenAI-compatible chat-completions endpoint (Groq by default), and
//! extracts the answer text from the first choice.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use consulta_core::{
    ChatMessage, CompletionClient, CompletionRequest, CompletionResult, ConsultaError, Question,
    Result, UpstreamConfig,
};
use reqwest::Client;

/// System instruction; the assembled context is appended verbatim
pub const SYSTEM_PROMPT_PREFIX: &str = "You are an expert assistant. Use this context to answer: ";

// ============================================================================
// Message Construction
// ============================================================================

/// Render the system instruction for a context block
pub fn system_prompt(context: &str) -> String {
    format!("{SYSTEM_PROMPT_PREFIX}{context}")
}

/// Exactly two messages: system (with context), then user (the question)
pub fn build_messages(question: &Question, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(context)),
        ChatMessage::user(question.as_str()),
    ]
}

/// Build the full completion request for a model
pub fn build_request(model: &str, question: &Question, context: &str) -> CompletionRequest {
    CompletionRequest {
        model: model.to_string(),
        messages: build_messages(question, context),
    }
}

// ============================================================================
// Answer Extraction
// ============================================================================

/// Take `choices[0].message.content`.
///
/// A missing choice, message or content is a format error; it is never
/// replaced by an empty answer.
pub fn extract_answer(result: CompletionResult) -> Result<String> {
    let choice = result
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ConsultaError::Format("No choices in completion response".to_string()))?;

    let message = choice
        .message
        .ok_or_else(|| ConsultaError::Format("First choice has no message".to_string()))?;

    message
        .content
        .ok_or_else(|| ConsultaError::Format("First choice message has no content".to_string()))
}

// ============================================================================
// Groq Client
// ============================================================================

/// Groq chat-completions client (OpenAI-compatible API)
pub struct GroqClient {
    client: Client,
    api_key: String,
    url: String,
    model: String,
}

impl GroqClient {
    /// Create a new client
    pub fn new(
        api_key: impl Into<String>,
        url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            url: url.into(),
            model: model.into(),
        }
    }

    /// Create from config, sharing a pooled HTTP client
    pub fn from_config(config: &UpstreamConfig, client: Client) -> Result<Self> {
        let api_key = config.groq_api_key()?;
        Ok(Self::new(
            api_key,
            config.completion_url.clone(),
            config.completion_model.clone(),
        )
        .with_client(client))
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl CompletionClient for GroqClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResult> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| ConsultaError::Completion(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ConsultaError::Completion(format!(
                "Groq returned {status}: {error_text}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ConsultaError::Completion(format!("Failed to parse response: {e}")))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "groq"
    }
}

// ============================================================================
// Tests
// ============================================================================
