//! LLM provider configuration endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use specsum_chat::providers;
use specsum_chat::types::{LLMConfigResponse, LLMConfigUpdate, TestKeyRequest};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/llm/config", get(get_config).put(update_config))
        .route("/llm/config/test", post(test_key))
}

async fn get_config(State(state): State<Arc<AppState>>) -> Json<LLMConfigResponse> {
    Json(state.llm_config.read().to_response())
}

async fn update_config(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LLMConfigUpdate>, JsonRejection>,
) -> Result<Json<LLMConfigResponse>, ApiError> {
    let Json(update) = payload?;
    let mut config = state.llm_config.write();
    config.apply_update(&update);
    config
        .save()
        .map_err(|e| ApiError::Internal(format!("Failed to save config: {}", e)))?;
    Ok(Json(config.to_response()))
}

async fn test_key(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TestKeyRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(req) = payload?;
    let result = providers::test_api_key(&state.endpoints, &req.provider, &req.api_key).await;
    Ok(Json(match result {
        Ok(()) => serde_json::json!({ "success": true }),
        Err(e) => serde_json::json!({ "success": false, "error": e }),
    }))
}
