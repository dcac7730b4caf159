//! Thin JSON API handlers
//!
//! Catalog listings plus the translation endpoint clients use to localize
//! scenario instructions before opening a practice session.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use crate::scenarios::list_chapters;
use crate::types::{lookup_language, TranslateRequest, LANGUAGES};

use super::ServerState;

/// `GET /api/scenarios` - the chapter/scenario catalog
pub async fn scenarios_handler() -> impl IntoResponse {
    Json(list_chapters())
}

/// `GET /api/languages` - the closed language set
pub async fn languages_handler() -> impl IntoResponse {
    let languages: Vec<_> = LANGUAGES.values().collect();
    Json(languages)
}

/// `POST /api/translate` - structured translation of arbitrary text
pub async fn translate_handler(
    State(state): State<ServerState>,
    Json(request): Json<TranslateRequest>,
) -> impl IntoResponse {
    let Some(source) = lookup_language(&request.source_language) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unsupported language: {}", request.source_language)})),
        )
            .into_response();
    };
    let Some(target) = lookup_language(&request.target_language) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unsupported language: {}", request.target_language)})),
        )
            .into_response();
    };

    match state.enricher.translate(&request.text, source, target).await {
        Ok(annotation) => Json(annotation).into_response(),
        Err(err) => {
            error!(%err, "translation request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "translation failed"})),
            )
                .into_response()
        }
    }
}
