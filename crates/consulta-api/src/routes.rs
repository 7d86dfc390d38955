//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{ask, health};
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    paths(ask::ask_handler, health::health_check),
    components(schemas(
        ask::AskRequest,
        ask::AskResponse,
        crate::error::ErrorBody,
        health::HealthResponse
    )),
    tags(
        (name = "ask", description = "Retrieval-augmented question answering"),
        (name = "health", description = "Liveness probe")
    )
)]
pub struct ApiDoc;

/// Create the application routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // POST is the only verb on the ask route
        .route(
            "/",
            post(ask::ask_handler).fallback(ask::method_not_allowed),
        )
        .route("/health", get(health::health_check))
        .route("/api-docs/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
