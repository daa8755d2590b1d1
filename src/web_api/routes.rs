//! API Routes

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::Error;
use crate::models::{ApiResponse, ClipListResponse, ClipResponse, StatusResponse};
use crate::state::AppState;

/// Clips returned per listing page
const PAGE_SIZE: usize = 20;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health & Status
        .route("/healthz", get(super::health_check))
        .route("/api/status", get(get_status))
        // Clips
        .route("/api/clips", get(list_clips))
        .route("/api/clips", delete(delete_all_clips))
        .route("/api/clips/:id", get(get_clip))
        .route("/api/clips/:id", delete(delete_clip))
        // Retention
        .route("/api/retention/enforce", post(enforce_retention))
        .with_state(state)
}

// ========================================
// Status Handlers
// ========================================

async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.status.read().await.clone();
    let response = StatusResponse {
        motion_detected: status.motion_detected,
        last_detected_at: status.last_detected_at.map(|t| t.to_rfc3339()),
        recording: status.recording,
        disk_usage_bytes: state.storage.disk_usage_bytes(),
        clip_count: state.storage.list_clips().len(),
    };
    Json(ApiResponse::success(response))
}

// ========================================
// Clip Handlers
// ========================================

#[derive(Debug, Deserialize)]
struct ClipListQuery {
    page: Option<usize>,
}

async fn list_clips(
    State(state): State<AppState>,
    Query(query): Query<ClipListQuery>,
) -> impl IntoResponse {
    let clips = state.storage.list_clips();
    let total_count = clips.len();
    let total_pages = total_count.div_ceil(PAGE_SIZE).max(1);
    let page = query.page.unwrap_or(1).clamp(1, total_pages);

    let clips = clips
        .into_iter()
        .skip((page - 1) * PAGE_SIZE)
        .take(PAGE_SIZE)
        .map(ClipResponse::from)
        .collect();

    Json(ApiResponse::success(ClipListResponse {
        clips,
        page,
        total_pages,
        total_count,
    }))
}

async fn get_clip(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.storage.get_clip(&id) {
        Some(clip) => Json(ApiResponse::success(ClipResponse::from(clip))).into_response(),
        None => Error::NotFound(format!("clip {}", id)).into_response(),
    }
}

async fn delete_clip(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.storage.delete_clip(&id) {
        Ok(true) => Json(json!({"ok": true})).into_response(),
        Ok(false) => Error::NotFound(format!("clip {}", id)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn delete_all_clips(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.delete_all_clips() {
        Ok(count) => Json(ApiResponse::success(json!({"deleted": count}))).into_response(),
        Err(e) => e.into_response(),
    }
}

// ========================================
// Retention Handlers
// ========================================

async fn enforce_retention(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.enforce_retention() {
        Ok(()) => Json(json!({
            "ok": true,
            "disk_usage_bytes": state.storage.disk_usage_bytes(),
        }))
        .into_response(),
        Err(e) => e.into_response(),
    }
}
