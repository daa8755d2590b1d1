//! Shared models and types
//!
//! Response shapes used by the web API, kept separate from the
//! service modules to avoid circular dependencies.

use serde::{Deserialize, Serialize};

use crate::storage::{date_dir_name, ClipMetadata};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Appliance status: latest motion verdict plus storage figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub motion_detected: bool,
    pub last_detected_at: Option<String>,
    pub recording: bool,
    pub disk_usage_bytes: u64,
    pub clip_count: usize,
}

/// One clip as served to clients, with media URLs under /media
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipResponse {
    pub timestamp_id: String,
    pub video_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    pub file_size_bytes: u64,
}

impl From<ClipMetadata> for ClipResponse {
    fn from(clip: ClipMetadata) -> Self {
        let dir = date_dir_name(&clip.timestamp_id);
        Self {
            video_url: format!("/media/{}/{}.mp4", dir, clip.timestamp_id),
            snapshot_url: clip
                .snapshot_path
                .is_some()
                .then(|| format!("/media/{}/{}_snap.jpg", dir, clip.timestamp_id)),
            thumbnail_url: clip
                .thumbnail_path
                .is_some()
                .then(|| format!("/media/{}/{}_thumb.jpg", dir, clip.timestamp_id)),
            file_size_bytes: clip.file_size_bytes,
            timestamp_id: clip.timestamp_id,
        }
    }
}

/// Paginated clip listing, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipListResponse {
    pub clips: Vec<ClipResponse>,
    pub page: usize,
    pub total_pages: usize,
    pub total_count: usize,
}
