//! ClipRecorder - Recording Session State Machine
//!
//! ## Responsibilities
//!
//! - Idle/Recording state machine with single-session exclusivity
//! - Snapshot capture and device recording start on the Idle edge
//! - Remux + thumbnail post-processing on finalize
//! - Hard max-duration cutoff independent of the cooldown logic
//!
//! Post-processing failures are logged and never block the return to Idle;
//! the raw capture stays on disk as usable evidence when the remux fails.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::FrameSource;
use crate::error::Result;
use crate::storage::date_dir_name;
use crate::transcode;

/// One in-progress clip. Created on Idle -> Recording, consumed on finalize.
struct RecordingSession {
    timestamp_id: String,
    start_instant: Instant,
    raw_path: PathBuf,
    video_path: PathBuf,
    snapshot_path: PathBuf,
    thumbnail_path: PathBuf,
}

/// Drives at most one recording session at a time against the capture device.
pub struct ClipRecorder {
    camera: Arc<dyn FrameSource>,
    data_dir: PathBuf,
    max_clip_duration: Duration,
    framerate: u32,
    session: Option<RecordingSession>,
}

impl ClipRecorder {
    pub fn new(
        camera: Arc<dyn FrameSource>,
        data_dir: PathBuf,
        max_clip_duration: Duration,
        framerate: u32,
    ) -> Self {
        Self {
            camera,
            data_dir,
            max_clip_duration,
            framerate,
            session: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a clip for the given timestamp id.
    ///
    /// No-op while a session is active: repeated triggers extend the current
    /// clip, they never restart it or touch its start instant. Device faults
    /// propagate and leave the recorder Idle.
    pub async fn start(&mut self, timestamp_id: &str) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let dir = self.data_dir.join(date_dir_name(timestamp_id));
        tokio::fs::create_dir_all(&dir).await?;

        let snapshot_path = dir.join(format!("{}_snap.jpg", timestamp_id));
        let raw_path = dir.join(format!("{}.h264", timestamp_id));
        let video_path = dir.join(format!("{}.mp4", timestamp_id));
        let thumbnail_path = dir.join(format!("{}_thumb.jpg", timestamp_id));

        self.camera.capture_snapshot(&snapshot_path).await?;
        self.camera.start_recording(&raw_path).await?;

        tracing::info!(
            timestamp_id = %timestamp_id,
            raw = %raw_path.display(),
            "Recording session started"
        );

        self.session = Some(RecordingSession {
            timestamp_id: timestamp_id.to_string(),
            start_instant: Instant::now(),
            raw_path,
            video_path,
            snapshot_path,
            thumbnail_path,
        });
        Ok(())
    }

    /// Finalize the current session: stop the device, remux the raw capture
    /// to MP4, extract a thumbnail. No-op when Idle.
    ///
    /// The session clears whatever happens; only a device stop fault is
    /// returned to the caller, after cleanup.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };

        let stop_result = self.camera.stop_recording().await;
        if let Err(ref e) = stop_result {
            tracing::error!(
                timestamp_id = %session.timestamp_id,
                error = %e,
                "Failed to stop device recording"
            );
        }

        match transcode::remux_to_mp4(&session.raw_path, &session.video_path, self.framerate).await
        {
            Ok(()) => {
                if let Err(e) = tokio::fs::remove_file(&session.raw_path).await {
                    tracing::warn!(
                        timestamp_id = %session.timestamp_id,
                        error = %e,
                        "Failed to remove raw capture after remux"
                    );
                }
                if let Err(e) =
                    transcode::extract_thumbnail(&session.video_path, &session.thumbnail_path)
                        .await
                {
                    tracing::warn!(
                        timestamp_id = %session.timestamp_id,
                        error = %e,
                        "Thumbnail extraction failed"
                    );
                }
                tracing::info!(
                    timestamp_id = %session.timestamp_id,
                    video = %session.video_path.display(),
                    snapshot = %session.snapshot_path.display(),
                    duration_sec = session.start_instant.elapsed().as_secs(),
                    "Clip finalized"
                );
            }
            Err(e) => {
                tracing::error!(
                    timestamp_id = %session.timestamp_id,
                    error = %e,
                    "Remux failed, keeping raw capture"
                );
            }
        }

        stop_result
    }

    /// Finalize when the session has run for the configured maximum,
    /// regardless of whether motion is still being detected.
    pub async fn check_max_duration(&mut self) -> Result<()> {
        let expired = self
            .session
            .as_ref()
            .is_some_and(|s| s.start_instant.elapsed() >= self.max_clip_duration);
        if expired {
            if let Some(session) = &self.session {
                tracing::info!(
                    timestamp_id = %session.timestamp_id,
                    max_sec = self.max_clip_duration.as_secs(),
                    "Max clip duration reached, finalizing"
                );
            }
            return self.stop().await;
        }
        Ok(())
    }
}
