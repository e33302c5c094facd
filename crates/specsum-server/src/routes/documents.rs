//! PDF upload, session lookup, page text and per-section extraction.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use specsum_ingest::{locate_sections, SpecDocument};
use specsum_runtime::{DocumentSession, SessionSummary};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/pdf", post(upload_pdf))
        .route("/sessions/{id}", get(get_session).delete(delete_session))
        .route("/sessions/{id}/text", post(session_text))
        .route("/sessions/{id}/extract", post(extract_sections))
}

#[derive(Debug, Deserialize)]
pub struct PagesRequest {
    pub pages: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SectionsRequest {
    /// Indices into the session's located sections.
    pub sections: Vec<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionResult {
    pub section_title: String,
    pub materials: String,
}

fn looks_like_pdf(filename: &str, bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-") || filename.to_ascii_lowercase().ends_with(".pdf")
}

fn find_session(state: &AppState, id: &str) -> Result<Arc<DocumentSession>, ApiError> {
    state
        .sessions
        .get(id)
        .ok_or_else(|| ApiError::NotFound("Session not found".into()))
}

/// POST /api/pdf: multipart `file`, optional `keyword` and `sessionId`.
async fn upload_pdf(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SessionSummary>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut keyword: Option<String> = None;
    let mut session_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e.body_text())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload.pdf").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e.body_text())))?;
                file = Some((filename, bytes.to_vec()));
            }
            "keyword" | "sessionId" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e.body_text())))?;
                let value = value.trim().to_string();
                if !value.is_empty() {
                    if name == "keyword" {
                        keyword = Some(value);
                    } else {
                        session_id = Some(value);
                    }
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) = file.ok_or_else(|| ApiError::BadRequest("No file uploaded".into()))?;
    if bytes.is_empty() || !looks_like_pdf(&filename, &bytes) {
        return Err(ApiError::BadRequest("Only PDF files are supported".into()));
    }

    let keyword = keyword.unwrap_or_else(|| state.config.source.keyword.clone());
    let footer_fraction = state.config.source.footer_fraction;

    info!("Parsing {} ({} bytes)", filename, bytes.len());
    let document = tokio::task::spawn_blocking(move || SpecDocument::parse(&bytes))
        .await
        .map_err(|e| ApiError::Internal(format!("PDF parsing task failed: {}", e)))??;

    let located = locate_sections(&document, &keyword, footer_fraction)?;
    let session = state
        .sessions
        .insert(session_id.as_deref(), filename, keyword, document, located);

    Ok(Json(session.summary()))
}

/// GET /api/sessions/{id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    Ok(Json(find_session(&state, &id)?.summary()))
}

/// DELETE /api/sessions/{id}
async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if state.sessions.remove(&id) {
        Ok(Json(serde_json::json!({ "deleted": true })))
    } else {
        Err(ApiError::NotFound("Session not found".into()))
    }
}

/// POST /api/sessions/{id}/text: page text without re-parsing the upload.
async fn session_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<PagesRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let session = find_session(&state, &id)?;
    if req.pages.is_empty() {
        return Err(ApiError::BadRequest("At least one page is required".into()));
    }
    let text = session.document.section_text(&req.pages)?;
    Ok(Json(serde_json::json!({ "text": text })))
}

/// POST /api/sessions/{id}/extract: summarize each selected section in order.
async fn extract_sections(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<SectionsRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let session = find_session(&state, &id)?;
    if req.sections.is_empty() {
        return Err(ApiError::BadRequest("Please select at least one section".into()));
    }

    let sections = &session.located.sections;
    let selected = req
        .sections
        .iter()
        .map(|&i| {
            sections
                .get(i)
                .ok_or_else(|| ApiError::BadRequest(format!("Unknown section index {}", i)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut results = Vec::with_capacity(selected.len());
    for section in selected {
        let text = session.document.section_text(&section.pages)?;
        let summary = state.pipeline.summarize(&text).await?;
        results.push(SectionResult {
            section_title: section.display_title(),
            materials: summary.text,
        });
    }

    Ok(Json(serde_json::json!({ "results": results })))
}
