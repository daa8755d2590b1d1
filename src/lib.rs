//! Motion-activated camera appliance
//!
//! Watches a single camera, records H.264 clips while motion is present
//! and serves the clip library over a REST API.
//!
//! ## Architecture (7 Components)
//!
//! 1. Camera - ffmpeg frame source (V4L2 device or RTSP stream)
//! 2. MotionDetector - adaptive background subtraction on analysis frames
//! 3. ClipRecorder - Idle/Recording session state machine
//! 4. Transcode - raw H.264 to MP4 remux and thumbnail extraction
//! 5. StorageManager - clip catalog, disk usage, retention budgets
//! 6. CaptureOrchestrator - frame loop driving detection and recording
//! 7. WebAPI - REST endpoints and media serving
//!
//! ## Design Principles
//!
//! - The filesystem is the single source of truth for clips; no index to
//!   drift or rebuild
//! - One loop owns the detector and recorder, so the recording state
//!   machine needs no locks
//! - Post-processing failures never lose captured footage

pub mod camera;
pub mod capture_orchestrator;
pub mod config;
pub mod error;
pub mod models;
pub mod motion_detector;
pub mod recorder;
pub mod state;
pub mod storage;
pub mod transcode;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
