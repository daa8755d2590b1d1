//! Transcode - Clip Post-Processing
//!
//! ## Responsibilities
//!
//! - Remux the raw H.264 capture into a playable MP4 (stream copy)
//! - Extract a thumbnail frame from a fixed offset into the clip
//!
//! Both run the external ffmpeg binary; argument construction is pure so it
//! can be tested without spawning anything.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Post-processing runs at most once per clip; generous but bounded.
const TRANSCODE_TIMEOUT_SECS: u64 = 30;

/// Offset into the clip for the thumbnail frame
const THUMBNAIL_OFFSET: &str = "0.5";

/// Thumbnail width; height follows the aspect ratio
const THUMBNAIL_WIDTH: u32 = 480;

/// Produce the playable MP4 from the raw capture. Stream copy, no re-encode.
pub async fn remux_to_mp4(raw: &Path, output: &Path, framerate: u32) -> Result<()> {
    let result = run_ffmpeg("remux", &remux_args(raw, output, framerate)).await;
    if result.is_err() {
        discard_partial(output).await;
    }
    result
}

/// Extract a single thumbnail frame from a finalized clip.
pub async fn extract_thumbnail(video: &Path, output: &Path) -> Result<()> {
    let result = run_ffmpeg("thumbnail", &thumbnail_args(video, output)).await;
    if result.is_err() {
        discard_partial(output).await;
    }
    result
}

/// ffmpeg opens its output before the muxer validates the stream, so a
/// failed run can leave a partial file behind. The clip catalog treats an
/// existing video file as an existing clip, so partials must not survive.
async fn discard_partial(output: &Path) {
    if let Err(e) = tokio::fs::remove_file(output).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %output.display(),
                error = %e,
                "Failed to remove partial output"
            );
        }
    }
}

fn remux_args(raw: &Path, output: &Path, framerate: u32) -> Vec<String> {
    vec![
        // Raw H.264 carries no timestamps; stamp the capture rate in.
        "-f".to_string(),
        "h264".to_string(),
        "-r".to_string(),
        framerate.to_string(),
        "-i".to_string(),
        raw.to_string_lossy().to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

fn thumbnail_args(video: &Path, output: &Path) -> Vec<String> {
    vec![
        "-ss".to_string(),
        THUMBNAIL_OFFSET.to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        format!("scale={}:-2", THUMBNAIL_WIDTH),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        output.to_string_lossy().to_string(),
    ]
}

async fn run_ffmpeg(operation: &'static str, args: &[String]) -> Result<()> {
    let child = Command::new("ffmpeg")
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Transcode(format!("{} spawn failed: {}", operation, e)))?;

    match tokio::time::timeout(
        Duration::from_secs(TRANSCODE_TIMEOUT_SECS),
        child.wait_with_output(),
    )
    .await
    {
        Ok(Ok(output)) => {
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(Error::Transcode(format!(
                    "{} failed: {}",
                    operation,
                    stderr.trim()
                )));
            }
            Ok(())
        }
        Ok(Err(e)) => Err(Error::Transcode(format!(
            "{} execution failed: {}",
            operation, e
        ))),
        Err(_) => Err(Error::Transcode(format!(
            "{} timed out after {}s",
            operation, TRANSCODE_TIMEOUT_SECS
        ))),
    }
}
