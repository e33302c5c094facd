//! Materials extraction over raw section text.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, KeepAliveStream, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use specsum_runtime::{validate_section_text, PipelineEvent, Summary};
use tokio::sync::mpsc;
use tracing::error;

use crate::error::{ApiError, UPSTREAM_FAILURE};
use crate::state::AppState;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/extract-materials", post(extract_materials))
        .route("/extract-materials/stream", post(extract_materials_stream))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub section_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub materials: String,
    pub chunks: usize,
    pub merged: bool,
    pub model: String,
    /// Milliseconds.
    pub duration: u64,
}

impl From<Summary> for ExtractResponse {
    fn from(s: Summary) -> Self {
        Self {
            materials: s.text,
            chunks: s.chunks,
            merged: s.merged,
            model: s.model,
            duration: s.duration_ms,
        }
    }
}

/// POST /api/extract-materials
async fn extract_materials(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let Json(req) = payload?;
    let text = validate_section_text(req.section_text.as_deref())?;
    let summary = state.pipeline.summarize(text).await?;
    Ok(Json(summary.into()))
}

/// POST /api/extract-materials/stream: progress as SSE, then `done` or `error`.
///
/// The pipeline runs inside the response stream, so a client disconnect
/// drops every in-flight model call.
async fn extract_materials_stream(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Sse<KeepAliveStream<SseStream>>, ApiError> {
    let Json(req) = payload?;
    let text = validate_section_text(req.section_text.as_deref())?.to_string();

    let stream: SseStream = Box::pin(async_stream::stream! {
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();
        let run = state.pipeline.summarize_with_progress(&text, Some(&tx));
        tokio::pin!(run);

        let result = loop {
            let event = tokio::select! {
                Some(event) = rx.recv() => event,
                result = &mut run => break result,
            };
            yield Ok::<_, Infallible>(sse_event(event.name(), &event));
        };
        while let Ok(event) = rx.try_recv() {
            yield Ok(sse_event(event.name(), &event));
        }

        match result {
            Ok(summary) => {
                yield Ok(sse_event("done", &ExtractResponse::from(summary)));
            }
            Err(e) => {
                error!("Streaming extraction failed: {}", e);
                let message = ApiError::from(e).public_message();
                yield Ok(sse_event("error", &serde_json::json!({ "error": message })));
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(name: &str, payload: &impl Serialize) -> Event {
    let data = serde_json::to_string(payload)
        .unwrap_or_else(|_| format!("{{\"error\":\"{}\"}}", UPSTREAM_FAILURE));
    Event::default().event(name).data(data)
}
