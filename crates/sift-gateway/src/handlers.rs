use std::collections::HashMap;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use sift_core::Request;
use sift_index::IndexError;
use sift_index::ingest::IngestRecord;
use sift_index::types::Modality;

use super::server::AppState;

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
    retryable: bool,
}

#[derive(serde::Deserialize)]
pub(crate) struct IngestPayload {
    pub doc_id: String,
    pub modality: Modality,
    pub vectors: Vec<Vec<f32>>,
    pub metadatas: Vec<HashMap<String, serde_json::Value>>,
}

#[derive(serde::Serialize)]
struct IngestResponse {
    indexed: usize,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

pub(crate) async fn query_handler(
    State(state): State<AppState>,
    Json(request): Json<Request>,
) -> impl IntoResponse {
    match state.engine.run(request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            let status = if e.is_retryable() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(ErrorResponse {
                    retryable: e.is_retryable(),
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub(crate) async fn ingest_handler(
    State(state): State<AppState>,
    Json(payload): Json<IngestPayload>,
) -> impl IntoResponse {
    let record = IngestRecord {
        doc_id: payload.doc_id,
        modality: payload.modality,
        vectors: payload.vectors,
        metadatas: payload.metadatas,
    };
    match state.ingestor.index(record).await {
        Ok(indexed) => Json(IngestResponse { indexed }).into_response(),
        Err(e @ IndexError::Ingest(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: e.to_string(),
                retryable: false,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
                retryable: false,
            }),
        )
            .into_response(),
    }
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
