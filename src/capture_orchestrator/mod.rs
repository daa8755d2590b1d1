//! CaptureOrchestrator - Frame Capture and Recording Loop
//!
//! ## Responsibilities
//!
//! - Poll analysis frames at the configured framerate
//! - Feed each frame through the MotionDetector and publish MotionStatus
//! - Drive the ClipRecorder: start on detection, stop after the cooldown,
//!   enforce the max clip duration every tick
//! - Run storage retention at startup and on a fixed schedule
//!
//! Device faults abort the current iteration only; the loop keeps polling.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;

use crate::camera::FrameSource;
use crate::error::Result;
use crate::motion_detector::MotionDetector;
use crate::recorder::ClipRecorder;
use crate::state::MotionStatus;
use crate::storage::{StorageManager, TIMESTAMP_FORMAT};

/// How often the retention pass runs while the loop is up
const RETENTION_INTERVAL_SECS: u64 = 600;

/// Owns the per-frame pipeline. Single consumer of the detector and
/// recorder, so neither needs locking.
pub struct CaptureOrchestrator {
    camera: Arc<dyn FrameSource>,
    detector: MotionDetector,
    recorder: ClipRecorder,
    storage: Arc<StorageManager>,
    status: Arc<RwLock<MotionStatus>>,
    framerate: u32,
    cooldown: Duration,
    last_motion_at: Option<Instant>,
}

impl CaptureOrchestrator {
    pub fn new(
        camera: Arc<dyn FrameSource>,
        detector: MotionDetector,
        recorder: ClipRecorder,
        storage: Arc<StorageManager>,
        status: Arc<RwLock<MotionStatus>>,
        framerate: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            camera,
            detector,
            recorder,
            storage,
            status,
            framerate,
            cooldown,
            last_motion_at: None,
        }
    }

    /// Run the capture loop until the shutdown signal flips to true.
    ///
    /// Startup failures (device, toolchain) are returned; per-iteration
    /// failures are logged and the loop continues. On shutdown any
    /// in-progress clip is finalized before the device is released.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        self.camera.start().await?;

        if let Err(e) = self.storage.enforce_retention() {
            tracing::error!(error = %e, "Startup retention pass failed");
        }

        let mut frame_interval =
            tokio::time::interval(Duration::from_secs_f64(1.0 / self.framerate as f64));
        frame_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut retention_interval =
            tokio::time::interval(Duration::from_secs(RETENTION_INTERVAL_SECS));
        retention_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately and the startup pass just ran.
        retention_interval.tick().await;

        tracing::info!(framerate = self.framerate, "Capture loop started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Shutdown signal received, stopping capture loop");
                        break;
                    }
                }
                _ = retention_interval.tick() => {
                    if let Err(e) = self.storage.enforce_retention() {
                        tracing::error!(error = %e, "Scheduled retention pass failed");
                    }
                }
                _ = frame_interval.tick() => {
                    if let Err(e) = self.process_tick().await {
                        tracing::error!(error = %e, "Capture iteration failed");
                    }
                }
            }
        }

        if let Err(e) = self.recorder.stop().await {
            tracing::error!(error = %e, "Failed to finalize recording during shutdown");
        }
        if let Err(e) = self.camera.stop().await {
            tracing::error!(error = %e, "Failed to release camera during shutdown");
        }
        tracing::info!("Capture loop stopped");
        Ok(())
    }

    /// One frame through the pipeline: capture, detect, drive the recorder,
    /// publish status.
    async fn process_tick(&mut self) -> Result<()> {
        let frame = self.camera.capture_analysis_frame().await?;
        let event = self.detector.process_frame(&frame);

        if event.detected {
            self.last_motion_at = Some(Instant::now());
            if !self.recorder.is_recording() {
                let timestamp_id = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
                tracing::info!(
                    timestamp_id = %timestamp_id,
                    regions = event.region_count,
                    largest_area = event.largest_region_area,
                    "Motion detected, starting clip"
                );
                self.recorder.start(&timestamp_id).await?;
            }
        } else if self.recorder.is_recording() {
            let quiet_long_enough = self
                .last_motion_at
                .map_or(true, |t| t.elapsed() >= self.cooldown);
            if quiet_long_enough {
                self.recorder.stop().await?;
            }
        }

        self.recorder.check_max_duration().await?;

        let mut status = self.status.write().await;
        status.update(event.detected, self.recorder.is_recording());
        Ok(())
    }
}
