//! Application state
//!
//! Holds all shared components and state

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::storage::StorageManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: Config,
    /// StorageManager (clip catalog and retention)
    pub storage: Arc<StorageManager>,
    /// Latest motion status published by the capture loop
    pub status: Arc<RwLock<MotionStatus>>,
}

/// Motion status snapshot, published by the capture loop per frame
#[derive(Debug, Clone, Default)]
pub struct MotionStatus {
    pub motion_detected: bool,
    pub last_detected_at: Option<chrono::DateTime<chrono::Local>>,
    pub recording: bool,
}

impl MotionStatus {
    /// Update from the latest frame verdict
    pub fn update(&mut self, motion_detected: bool, recording: bool) {
        self.motion_detected = motion_detected;
        self.recording = recording;

        if motion_detected {
            self.last_detected_at = Some(chrono::Local::now());
        }
    }
}
