//! Question answering handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use consulta_core::Question;
use serde::{
    de::{self, IgnoredAny, MapAccess, Visitor},
    Deserialize, Deserializer, Serialize,
};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Ask request body
///
/// Decodes from a JSON object only; arrays and scalars are rejected.
#[derive(Debug, ToSchema)]
pub struct AskRequest {
    /// User's question
    #[schema(example = "¿Qué es Green Computing?")]
    pub pregunta: Option<String>,
}

impl<'de> Deserialize<'de> for AskRequest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AskRequestVisitor;

        impl<'de> Visitor<'de> for AskRequestVisitor {
            type Value = AskRequest;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object with a 'pregunta' string")
            }

            fn visit_map<A>(self, mut map: A) -> Result<AskRequest, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut pregunta: Option<Option<String>> = None;
                while let Some(key) = map.next_key::<String>()? {
                    if key == "pregunta" {
                        if pregunta.is_some() {
                            return Err(de::Error::duplicate_field("pregunta"));
                        }
                        pregunta = Some(map.next_value()?);
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(AskRequest {
                    pregunta: pregunta.flatten(),
                })
            }
        }

        deserializer.deserialize_map(AskRequestVisitor)
    }
}

/// Ask response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AskResponse {
    /// Generated answer
    #[schema(example = "Green Computing es el uso eficiente de los recursos informáticos...")]
    pub respuesta: String,
}

/// Answer a question from the indexed documents
#[utoipa::path(
    post,
    path = "/",
    tag = "ask",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer generated", body = AskResponse),
        (status = 400, description = "Invalid request", body = crate::error::ErrorBody),
        (status = 405, description = "Method not allowed"),
        (status = 500, description = "Pipeline failure", body = crate::error::ErrorBody)
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    state.increment_requests();

    let span = tracing::info_span!("ask", request_id = %Uuid::new_v4());
    answer(state, payload).instrument(span).await
}

async fn answer(
    state: Arc<AppState>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let question = validate(payload)?;

    // Dropping the handler (client gone) cancels every pending stage.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.pipeline.ask(&question, &cancel).await {
        Ok(answer) => {
            tracing::info!(
                documents = answer.document_count,
                elapsed_ms = answer.processing_time_ms,
                "Question answered"
            );
            Ok(Json(AskResponse {
                respuesta: answer.answer,
            }))
        }
        Err(err) => {
            tracing::error!(stage = %err.stage(), error = %err, "Pipeline failed");
            Err(AppError::from(err))
        }
    }
}

fn validate(payload: Result<Json<AskRequest>, JsonRejection>) -> Result<Question, AppError> {
    let Json(req) = payload.map_err(|rejection| {
        tracing::debug!("Rejected request body: {}", rejection.body_text());
        AppError::BadRequest("Request body must be a JSON object with a 'pregunta' string".to_string())
    })?;

    let text = req
        .pregunta
        .ok_or_else(|| AppError::BadRequest("Field 'pregunta' is required".to_string()))?;

    Question::new(text).map_err(AppError::from)
}

/// Any verb other than POST on the ask route
pub async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, "POST")],
        "Method not allowed",
    )
}
