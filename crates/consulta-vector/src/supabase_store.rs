//! Supabase implementation of similarity search
//!
//! Calls the `match_documents` Postgres function through the PostgREST
//! RPC endpoint. The function itself (pgvector cosine similarity over the
//! indexed chunks) lives in the database.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use consulta_core::{ConsultaError, Document, MatchQuery, Result, UpstreamConfig};
use reqwest::Client;
use serde::Deserialize;

/// Name of the remote procedure
pub const MATCH_DOCUMENTS_RPC: &str = "match_documents";

/// Supabase vector store client
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
}

/// PostgREST error body
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: Option<String>,
    code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl PostgrestError {
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(code) = &self.code {
            parts.push(format!("[{code}]"));
        }
        if let Some(message) = &self.message {
            parts.push(message.clone());
        }
        if let Some(details) = &self.details {
            parts.push(format!("details: {details}"));
        }
        if let Some(hint) = &self.hint {
            parts.push(format!("hint: {hint}"));
        }
        parts.join(" ")
    }
}

impl SupabaseStore {
    /// Create a new Supabase client
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// Create from config, sharing a pooled HTTP client
    pub fn from_config(config: &UpstreamConfig, client: Client) -> Result<Self> {
        let base_url = config.supabase_url()?;
        let api_key = config.supabase_key()?;
        Ok(Self::new(base_url, api_key).with_client(client))
    }

    /// Use a preconfigured HTTP client
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn rpc_url(&self) -> String {
        format!(
            "{}/rest/v1/rpc/{MATCH_DOCUMENTS_RPC}",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl super::VectorStore for SupabaseStore {
    async fn match_documents(&self, query: &MatchQuery) -> Result<Vec<Document>> {
        let response = self
            .client
            .post(self.rpc_url())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(query)
            .send()
            .await
            .map_err(|e| ConsultaError::Store(format!("match_documents request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<PostgrestError>(&error_text)
                .map(|e| e.describe())
                .ok()
                .filter(|d| !d.is_empty())
                .unwrap_or(error_text);
            return Err(ConsultaError::Store(format!(
                "match_documents returned {status}: {detail}"
            )));
        }

        let mut documents: Vec<Document> = response.json().await.map_err(|e| {
            ConsultaError::Store(format!("Failed to parse match_documents rows: {e}"))
        })?;

        if documents.len() > query.match_count {
            tracing::warn!(
                returned = documents.len(),
                limit = query.match_count,
                "Store returned more rows than requested; extra rows dropped"
            );
            documents.truncate(query.match_count);
        }

        Ok(documents)
    }

    fn name(&self) -> &str {
        "supabase"
    }
}
