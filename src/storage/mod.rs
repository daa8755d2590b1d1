//! StorageManager - Clip Catalog and Retention
//!
//! ## Responsibilities
//!
//! - Enumerate persisted clips (newest first) from the date-partitioned tree
//! - Resolve, delete and bulk-delete clips by timestamp id
//! - Compute recursive disk usage
//! - Enforce age and disk-usage budgets (oldest-first eviction)
//!
//! The engine holds no state between calls; the filesystem is the single
//! source of truth, so there is no index to drift and nothing to replay
//! after a crash.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::Result;

/// Timestamp id format: YYYYMMDD_HHMMSS
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One persisted clip, derived from the filesystem at call time.
///
/// A clip exists iff its video file exists; snapshot and thumbnail are
/// optional companions.
#[derive(Debug, Clone)]
pub struct ClipMetadata {
    pub timestamp_id: String,
    pub video_path: PathBuf,
    pub snapshot_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub file_size_bytes: u64,
}

/// Stateless catalog over the storage root.
#[derive(Debug, Clone)]
pub struct StorageManager {
    config: StorageConfig,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Storage root, for media serving
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    /// All clips, newest first by timestamp id.
    ///
    /// Only files laid out as `<root>/YYYY-MM-DD/<id>.mp4` with a valid id
    /// whose date matches the directory count as clips; anything else in the
    /// tree is invisible to the catalog.
    pub fn list_clips(&self) -> Vec<ClipMetadata> {
        let mut clips: Vec<ClipMetadata> = WalkDir::new(&self.config.data_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "mp4" {
                    return None;
                }
                let id = path.file_stem()?.to_str()?;
                parse_timestamp_id(id)?;
                let parent = path.parent()?.file_name()?.to_str()?;
                if parent != date_dir_name(id) {
                    return None;
                }
                self.clip_at(path, id)
            })
            .collect();

        clips.sort_by(|a, b| b.timestamp_id.cmp(&a.timestamp_id));
        clips
    }

    /// Look up one clip. Absent (or malformed) ids are None, not errors.
    pub fn get_clip(&self, timestamp_id: &str) -> Option<ClipMetadata> {
        parse_timestamp_id(timestamp_id)?;
        let video = self
            .config
            .data_dir
            .join(date_dir_name(timestamp_id))
            .join(format!("{}.mp4", timestamp_id));
        self.clip_at(&video, timestamp_id)
    }

    /// Delete a clip and its companion files.
    ///
    /// Returns whether the video file had existed. A file already gone by
    /// unlink time is success, not an error; other filesystem faults
    /// propagate.
    pub fn delete_clip(&self, timestamp_id: &str) -> Result<bool> {
        if parse_timestamp_id(timestamp_id).is_none() {
            return Ok(false);
        }
        let dir = self.config.data_dir.join(date_dir_name(timestamp_id));

        let existed = remove_if_present(&dir.join(format!("{}.mp4", timestamp_id)))?;
        remove_if_present(&dir.join(format!("{}_snap.jpg", timestamp_id)))?;
        remove_if_present(&dir.join(format!("{}_thumb.jpg", timestamp_id)))?;
        // Raw capture left behind by a failed remux
        remove_if_present(&dir.join(format!("{}.h264", timestamp_id)))?;

        if existed {
            tracing::info!(timestamp_id = %timestamp_id, "Deleted clip");
        }
        Ok(existed)
    }

    /// Delete every clip in the catalog; returns how many were deleted.
    pub fn delete_all_clips(&self) -> Result<usize> {
        let mut count = 0;
        for clip in self.list_clips() {
            if self.delete_clip(&clip.timestamp_id)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Recursive sum of file sizes under the storage root; 0 if absent.
    pub fn disk_usage_bytes(&self) -> u64 {
        WalkDir::new(&self.config.data_dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|meta| meta.len())
            .sum()
    }

    /// Apply the retention budgets: age pass first, then size pass.
    ///
    /// The size pass evicts the single oldest clip, recomputes usage and
    /// repeats until under budget or the catalog is empty, so a zero budget
    /// evicts everything.
    pub fn enforce_retention(&self) -> Result<()> {
        let cutoff =
            (chrono::Local::now() - chrono::Duration::days(self.config.max_age_days as i64))
                .naive_local();
        for clip in self.list_clips() {
            let Some(moment) = parse_timestamp_id(&clip.timestamp_id) else {
                continue;
            };
            if moment < cutoff {
                tracing::info!(
                    timestamp_id = %clip.timestamp_id,
                    "Retention: clip older than budget"
                );
                self.delete_clip(&clip.timestamp_id)?;
            }
        }

        let budget = self.config.max_disk_usage_mb * 1024 * 1024;
        loop {
            let usage = self.disk_usage_bytes();
            if usage <= budget {
                break;
            }
            let clips = self.list_clips();
            let Some(oldest) = clips.last() else {
                break;
            };
            tracing::info!(
                timestamp_id = %oldest.timestamp_id,
                usage_bytes = usage,
                budget_bytes = budget,
                "Retention: evicting oldest clip to meet disk budget"
            );
            self.delete_clip(&oldest.timestamp_id)?;
        }
        Ok(())
    }

    fn clip_at(&self, video: &Path, timestamp_id: &str) -> Option<ClipMetadata> {
        let file_size_bytes = std::fs::metadata(video).ok()?.len();
        let dir = video.parent()?;
        let snapshot = dir.join(format!("{}_snap.jpg", timestamp_id));
        let thumbnail = dir.join(format!("{}_thumb.jpg", timestamp_id));
        Some(ClipMetadata {
            timestamp_id: timestamp_id.to_string(),
            video_path: video.to_path_buf(),
            snapshot_path: snapshot.exists().then_some(snapshot),
            thumbnail_path: thumbnail.exists().then_some(thumbnail),
            file_size_bytes,
        })
    }
}

/// Parse a timestamp id, rejecting anything that is not exactly
/// `YYYYMMDD_HHMMSS` naming a real calendar moment.
pub fn parse_timestamp_id(id: &str) -> Option<NaiveDateTime> {
    let bytes = id.as_bytes();
    if bytes.len() != 15 || bytes[8] != b'_' {
        return None;
    }
    if !bytes[..8].iter().all(u8::is_ascii_digit) || !bytes[9..].iter().all(u8::is_ascii_digit) {
        return None;
    }
    NaiveDateTime::parse_from_str(id, TIMESTAMP_FORMAT).ok()
}

/// Calendar date directory for a validated id: `YYYY-MM-DD`
pub fn date_dir_name(id: &str) -> String {
    format!("{}-{}-{}", &id[..4], &id[4..6], &id[6..8])
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
