//! Camera - Frame Source Abstraction
//!
//! ## Responsibilities
//!
//! - Capability trait the detection/recording layers depend on
//! - ffmpeg-backed capture for V4L2 devices and RTSP streams
//! - Analysis frames (low-res grayscale), snapshots, raw H.264 recordings
//! - Graceful recording stop (quit request, bounded wait, then kill)

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use image::GrayImage;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::CameraConfig;
use crate::error::{Error, Result};

/// Timeout for single-frame captures (analysis frame, snapshot)
const CAPTURE_TIMEOUT_SECS: u64 = 10;

/// How long a recording ffmpeg gets to exit after the quit request
const STOP_TIMEOUT_SECS: u64 = 5;

/// Capture device capability set.
///
/// Everything above this layer depends only on the trait, so a simulated
/// device can drive the recording state machine deterministically in tests.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Bring the device up. Called once before the capture loop starts.
    async fn start(&self) -> Result<()>;

    /// Release the device. Stops any in-progress recording first.
    async fn stop(&self) -> Result<()>;

    /// Capture one low-resolution grayscale frame for motion analysis.
    async fn capture_analysis_frame(&self) -> Result<GrayImage>;

    /// Capture one full-resolution JPEG snapshot to `path`.
    async fn capture_snapshot(&self, path: &Path) -> Result<()>;

    /// Begin writing a full-resolution recording to `path`.
    async fn start_recording(&self, path: &Path) -> Result<()>;

    /// Stop the in-progress recording, if any. No-op when not recording.
    async fn stop_recording(&self) -> Result<()>;
}

/// ffmpeg-backed capture device.
///
/// Single-frame captures spawn one short-lived ffmpeg each; a recording is
/// one long-running ffmpeg child writing a raw H.264 stream until stopped.
pub struct FfmpegCamera {
    config: CameraConfig,
    /// At most one recording child at a time
    recorder: Mutex<Option<Child>>,
}

impl FfmpegCamera {
    /// Create a new camera for the configured input
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            recorder: Mutex::new(None),
        }
    }

    /// Run a single-frame capture with timeout, returning stdout.
    ///
    /// Uses kill_on_drop(true) so a timeout cancels the future, drops the
    /// Child and SIGKILLs the ffmpeg process. Unresponsive cameras must not
    /// accumulate zombie ffmpeg processes.
    async fn run_capture(&self, operation: &'static str, args: &[String]) -> Result<Vec<u8>> {
        let child = Command::new("ffmpeg")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Camera(format!("ffmpeg spawn failed: {}", e)))?;

        match tokio::time::timeout(
            Duration::from_secs(CAPTURE_TIMEOUT_SECS),
            child.wait_with_output(),
        )
        .await
        {
            Ok(Ok(output)) => {
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(Error::Camera(format!(
                        "{} failed: {}",
                        operation,
                        stderr.trim()
                    )));
                }
                Ok(output.stdout)
            }
            Ok(Err(e)) => Err(Error::Camera(format!(
                "{} execution failed: {}",
                operation, e
            ))),
            Err(_) => {
                tracing::warn!(
                    operation = operation,
                    timeout_sec = CAPTURE_TIMEOUT_SECS,
                    input = %self.config.input,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                Err(Error::CaptureTimeout {
                    operation: operation.to_string(),
                    seconds: CAPTURE_TIMEOUT_SECS,
                })
            }
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegCamera {
    async fn start(&self) -> Result<()> {
        // The device itself is opened per capture; starting means verifying
        // the capture toolchain exists so failures surface before the loop.
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Camera(format!("ffmpeg not found: {}", e)))?;
        if !output.status.success() {
            return Err(Error::Camera("ffmpeg version check failed".to_string()));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        tracing::info!(
            input = %self.config.input,
            ffmpeg = version.lines().next().unwrap_or("unknown"),
            "Camera ready"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_recording().await?;
        tracing::info!(input = %self.config.input, "Camera released");
        Ok(())
    }

    async fn capture_analysis_frame(&self) -> Result<GrayImage> {
        let (width, height) = self.config.lores_resolution;
        let args = analysis_frame_args(
            &self.config.input,
            self.config.main_resolution,
            (width, height),
        );
        let mut data = self.run_capture("analysis frame", &args).await?;

        let expected = (width * height) as usize;
        if data.len() < expected {
            return Err(Error::Camera(format!(
                "analysis frame short read: {} of {} bytes",
                data.len(),
                expected
            )));
        }
        data.truncate(expected);
        GrayImage::from_raw(width, height, data)
            .ok_or_else(|| Error::Camera("analysis frame decode failed".to_string()))
    }

    async fn capture_snapshot(&self, path: &Path) -> Result<()> {
        let args = snapshot_args(&self.config.input, self.config.main_resolution, path);
        self.run_capture("snapshot", &args).await?;
        Ok(())
    }

    async fn start_recording(&self, path: &Path) -> Result<()> {
        let mut guard = self.recorder.lock().await;
        if guard.is_some() {
            return Err(Error::Camera("recording already in progress".to_string()));
        }

        let args = recording_args(
            &self.config.input,
            self.config.main_resolution,
            self.config.framerate,
            path,
        );
        // stdin stays open for the quit request; stderr is discarded because
        // nothing drains it while the child runs.
        let child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Camera(format!("recording spawn failed: {}", e)))?;

        tracing::info!(path = %path.display(), "Recording started");
        *guard = Some(child);
        Ok(())
    }

    async fn stop_recording(&self) -> Result<()> {
        let mut guard = self.recorder.lock().await;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        // Ask ffmpeg to finish the file cleanly before resorting to kill.
        if let Some(stdin) = child.stdin.as_mut() {
            if let Err(e) = stdin.write_all(b"q").await {
                tracing::warn!(error = %e, "Failed to send quit to recording ffmpeg");
            }
        }

        match tokio::time::timeout(Duration::from_secs(STOP_TIMEOUT_SECS), child.wait()).await {
            Ok(Ok(status)) => {
                if !status.success() {
                    tracing::warn!(status = %status, "Recording ffmpeg exited non-zero");
                }
                Ok(())
            }
            Ok(Err(e)) => Err(Error::Camera(format!("recording wait failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    timeout_sec = STOP_TIMEOUT_SECS,
                    "Recording ffmpeg did not quit, killing"
                );
                child
                    .kill()
                    .await
                    .map_err(|e| Error::Camera(format!("recording kill failed: {}", e)))?;
                Ok(())
            }
        }
    }
}

fn is_rtsp(input: &str) -> bool {
    input.starts_with("rtsp://")
}

fn input_args(input: &str, main_resolution: (u32, u32)) -> Vec<String> {
    if is_rtsp(input) {
        vec![
            "-rtsp_transport".to_string(),
            "tcp".to_string(),
            "-i".to_string(),
            input.to_string(),
        ]
    } else {
        vec![
            "-f".to_string(),
            "v4l2".to_string(),
            "-video_size".to_string(),
            format!("{}x{}", main_resolution.0, main_resolution.1),
            "-i".to_string(),
            input.to_string(),
        ]
    }
}

fn analysis_frame_args(
    input: &str,
    main_resolution: (u32, u32),
    lores_resolution: (u32, u32),
) -> Vec<String> {
    let mut args = input_args(input, main_resolution);
    args.extend([
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!(
            "scale={}:{},format=gray",
            lores_resolution.0, lores_resolution.1
        ),
        "-f".to_string(),
        "rawvideo".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-".to_string(),
    ]);
    args
}

fn snapshot_args(input: &str, main_resolution: (u32, u32), path: &Path) -> Vec<String> {
    let mut args = input_args(input, main_resolution);
    args.extend([
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", main_resolution.0, main_resolution.1),
        "-q:v".to_string(),
        "2".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        path.to_string_lossy().to_string(),
    ]);
    args
}

fn recording_args(
    input: &str,
    main_resolution: (u32, u32),
    framerate: u32,
    path: &Path,
) -> Vec<String> {
    let mut args = if is_rtsp(input) {
        let mut a = input_args(input, main_resolution);
        // RTSP sources are already H.264; copy the stream instead of burning
        // CPU on a re-encode.
        a.extend(["-c:v".to_string(), "copy".to_string()]);
        a
    } else {
        let mut a = vec![
            "-f".to_string(),
            "v4l2".to_string(),
            "-framerate".to_string(),
            framerate.to_string(),
            "-video_size".to_string(),
            format!("{}x{}", main_resolution.0, main_resolution.1),
            "-i".to_string(),
            input.to_string(),
        ];
        a.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            "ultrafast".to_string(),
            "-tune".to_string(),
            "zerolatency".to_string(),
        ]);
        a
    };
    args.extend([
        "-an".to_string(),
        "-f".to_string(),
        "h264".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        path.to_string_lossy().to_string(),
    ]);
    args
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_analysis_frame_args_rtsp() {
        let args = analysis_frame_args("rtsp://cam.local/stream1", (1280, 720), (320, 240));
        assert_eq!(
            args,
            vec![
                "-rtsp_transport",
                "tcp",
                "-i",
                "rtsp://cam.local/stream1",
                "-frames:v",
                "1",
                "-vf",
                "scale=320:240,format=gray",
                "-f",
                "rawvideo",
                "-loglevel",
                "error",
                "-",
            ]
        );
    }

    #[test]
    fn test_analysis_frame_args_v4l2() {
        let args = analysis_frame_args("/dev/video0", (1280, 720), (320, 240));
        assert_eq!(args[0], "-f");
        assert_eq!(args[1], "v4l2");
        assert!(args.contains(&"-video_size".to_string()));
        assert!(args.contains(&"1280x720".to_string()));
        assert!(args.contains(&"scale=320:240,format=gray".to_string()));
    }

    #[test]
    fn test_recording_args_rtsp_copies_stream() {
        let path = PathBuf::from("/tmp/clip.h264");
        let args = recording_args("rtsp://cam.local/stream1", (1280, 720), 15, &path);
        let copy_pos = args.iter().position(|a| a == "copy");
        assert!(copy_pos.is_some(), "rtsp recording should stream-copy");
        assert!(!args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/clip.h264");
    }

    #[test]
    fn test_recording_args_v4l2_encodes() {
        let path = PathBuf::from("/tmp/clip.h264");
        let args = recording_args("/dev/video0", (1280, 720), 15, &path);
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-framerate".to_string()));
        assert!(args.contains(&"15".to_string()));
    }

    #[test]
    fn test_snapshot_args_target_path() {
        let path = PathBuf::from("/tmp/snap.jpg");
        let args = snapshot_args("/dev/video0", (1280, 720), &path);
        assert_eq!(args.last().unwrap(), "/tmp/snap.jpg");
        assert!(args.contains(&"scale=1280:720".to_string()));
    }

    #[tokio::test]
    async fn test_mock_camera_returns_configured_frame() {
        let camera = mock::MockCamera::new(320, 240);
        let mut frame = GrayImage::new(320, 240);
        frame.put_pixel(5, 5, image::Luma([200u8]));
        camera.set_frame(frame);

        let captured = camera.capture_analysis_frame().await.unwrap();
        assert_eq!(captured.get_pixel(5, 5).0[0], 200);
        assert_eq!(camera.capture_calls.load(Ordering::SeqCst), 1);
    }
}
