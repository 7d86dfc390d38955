//! Application state management
//!
//! Author: hephaex@gmail.com

use consulta_core::{AppConfig, Result};
use consulta_rag::AskPipeline;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Application state shared across handlers.
///
/// Built once at startup; nothing in here is mutated per request apart
/// from the request counter.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Question-answering pipeline with its pooled upstream clients
    pub pipeline: AskPipeline,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
}

impl AppState {
    /// Create state around an already built pipeline
    pub fn new(config: AppConfig, pipeline: AskPipeline) -> Self {
        Self {
            config,
            pipeline,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
        }
    }

    /// Validate config and build the production pipeline
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let pipeline = AskPipeline::from_config(&config)?;
        Ok(Self::new(config, pipeline))
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
