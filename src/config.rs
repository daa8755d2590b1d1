//! Configuration
//!
//! Environment-variable surface with validated parsing. Absent variables take
//! defaults; present but malformed values reject at load so the process never
//! starts with a half-understood configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Capture device configuration
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// V4L2 device path or rtsp:// URL
    pub input: String,
    /// Snapshot/recording resolution
    pub main_resolution: (u32, u32),
    /// Analysis frame resolution
    pub lores_resolution: (u32, u32),
    /// Analysis samples per second
    pub framerate: u32,
}

/// Motion detection and recording configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Minimum foreground region area (pixels) to count as motion
    pub min_contour_area: u32,
    /// Gaussian blur kernel size (odd)
    pub blur_kernel_size: u32,
    /// Background model learning rate; negative means automatic
    pub learning_rate: f64,
    /// Quiet time after the last detection before a clip finalizes
    pub cooldown: Duration,
    /// Hard per-clip duration cutoff
    pub max_clip_duration: Duration,
}

/// Clip storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for date-partitioned clip files
    pub data_dir: PathBuf,
    /// Clips older than this are evicted
    pub max_age_days: u32,
    /// Disk usage budget for the size-based eviction pass
    pub max_disk_usage_mb: u64,
}

/// Web server configuration
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub storage: StorageConfig,
    pub web: WebConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let camera = CameraConfig {
            input: string_var("CAMERA_INPUT", "/dev/video0"),
            main_resolution: resolution_var("CAMERA_MAIN_RESOLUTION", (1280, 720))?,
            lores_resolution: resolution_var("CAMERA_LORES_RESOLUTION", (320, 240))?,
            framerate: parsed_var("CAMERA_FRAMERATE", 15)?,
        };
        if camera.framerate == 0 {
            return Err(Error::Config(
                "CAMERA_FRAMERATE must be at least 1".to_string(),
            ));
        }

        let detection = DetectionConfig {
            min_contour_area: parsed_var("DETECTION_MIN_CONTOUR_AREA", 500)?,
            blur_kernel_size: parsed_var("DETECTION_BLUR_KERNEL_SIZE", 21)?,
            learning_rate: parsed_var("DETECTION_LEARNING_RATE", -1.0)?,
            cooldown: Duration::from_secs(parsed_var("DETECTION_COOLDOWN", 5)?),
            max_clip_duration: Duration::from_secs(parsed_var("DETECTION_MAX_CLIP_DURATION", 60)?),
        };
        if detection.blur_kernel_size == 0 || detection.blur_kernel_size % 2 == 0 {
            return Err(Error::Config(format!(
                "DETECTION_BLUR_KERNEL_SIZE must be odd, got {}",
                detection.blur_kernel_size
            )));
        }

        let storage = StorageConfig {
            data_dir: PathBuf::from(string_var("STORAGE_DATA_DIR", "/var/lib/motioncam/clips")),
            max_age_days: parsed_var("STORAGE_MAX_AGE_DAYS", 7)?,
            max_disk_usage_mb: parsed_var("STORAGE_MAX_DISK_USAGE_MB", 4096)?,
        };

        let web = WebConfig {
            host: string_var("WEB_HOST", "0.0.0.0"),
            port: parsed_var("WEB_PORT", 8080)?,
        };

        Ok(Self {
            camera,
            detection,
            storage,
            web,
        })
    }
}

fn string_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|e| {
            Error::Config(format!("{} has invalid value {:?}: {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

fn resolution_var(key: &str, default: (u32, u32)) -> Result<(u32, u32)> {
    let raw = match std::env::var(key) {
        Ok(v) => v,
        Err(_) => return Ok(default),
    };
    let parsed = raw
        .trim()
        .split_once('x')
        .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));
    match parsed {
        Some((w, h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(Error::Config(format!(
            "{} must look like 1280x720, got {:?}",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(vars: &[(&str, &str)], f: F) {
        let _guard = ENV_LOCK.lock().unwrap();
        let keys = [
            "CAMERA_INPUT",
            "CAMERA_MAIN_RESOLUTION",
            "CAMERA_LORES_RESOLUTION",
            "CAMERA_FRAMERATE",
            "DETECTION_MIN_CONTOUR_AREA",
            "DETECTION_BLUR_KERNEL_SIZE",
            "DETECTION_LEARNING_RATE",
            "DETECTION_COOLDOWN",
            "DETECTION_MAX_CLIP_DURATION",
            "STORAGE_DATA_DIR",
            "STORAGE_MAX_AGE_DAYS",
            "STORAGE_MAX_DISK_USAGE_MB",
            "WEB_HOST",
            "WEB_PORT",
        ];
        for key in keys {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        f();
        for (key, _) in vars {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_defaults() {
        with_env(&[], || {
            let config = Config::from_env().unwrap();
            assert_eq!(config.camera.input, "/dev/video0");
            assert_eq!(config.camera.main_resolution, (1280, 720));
            assert_eq!(config.camera.lores_resolution, (320, 240));
            assert_eq!(config.camera.framerate, 15);
            assert_eq!(config.detection.min_contour_area, 500);
            assert_eq!(config.detection.blur_kernel_size, 21);
            assert_eq!(config.detection.learning_rate, -1.0);
            assert_eq!(config.detection.cooldown, Duration::from_secs(5));
            assert_eq!(config.detection.max_clip_duration, Duration::from_secs(60));
            assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/motioncam/clips"));
            assert_eq!(config.storage.max_age_days, 7);
            assert_eq!(config.storage.max_disk_usage_mb, 4096);
            assert_eq!(config.web.host, "0.0.0.0");
            assert_eq!(config.web.port, 8080);
        });
    }

    #[test]
    fn test_env_overrides() {
        with_env(
            &[
                ("CAMERA_INPUT", "rtsp://192.168.1.10/stream1"),
                ("CAMERA_MAIN_RESOLUTION", "1920x1080"),
                ("CAMERA_LORES_RESOLUTION", "640x480"),
                ("CAMERA_FRAMERATE", "30"),
                ("DETECTION_MIN_CONTOUR_AREA", "1000"),
                ("DETECTION_BLUR_KERNEL_SIZE", "15"),
                ("DETECTION_LEARNING_RATE", "0.5"),
                ("DETECTION_COOLDOWN", "10"),
                ("DETECTION_MAX_CLIP_DURATION", "120"),
                ("STORAGE_DATA_DIR", "/tmp/motioncam-test"),
                ("STORAGE_MAX_AGE_DAYS", "14"),
                ("STORAGE_MAX_DISK_USAGE_MB", "8192"),
                ("WEB_PORT", "9090"),
            ],
            || {
                let config = Config::from_env().unwrap();
                assert_eq!(config.camera.input, "rtsp://192.168.1.10/stream1");
                assert_eq!(config.camera.main_resolution, (1920, 1080));
                assert_eq!(config.camera.lores_resolution, (640, 480));
                assert_eq!(config.camera.framerate, 30);
                assert_eq!(config.detection.min_contour_area, 1000);
                assert_eq!(config.detection.blur_kernel_size, 15);
                assert_eq!(config.detection.learning_rate, 0.5);
                assert_eq!(config.detection.cooldown, Duration::from_secs(10));
                assert_eq!(config.detection.max_clip_duration, Duration::from_secs(120));
                assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/motioncam-test"));
                assert_eq!(config.storage.max_age_days, 14);
                assert_eq!(config.storage.max_disk_usage_mb, 8192);
                assert_eq!(config.web.port, 9090);
            },
        );
    }

    #[test]
    fn test_malformed_number_rejected() {
        with_env(&[("CAMERA_FRAMERATE", "fast")], || {
            let err = Config::from_env().unwrap_err();
            assert!(matches!(err, Error::Config(_)));
            assert!(err.to_string().contains("CAMERA_FRAMERATE"));
        });
    }

    #[test]
    fn test_zero_framerate_rejected() {
        with_env(&[("CAMERA_FRAMERATE", "0")], || {
            assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        });
    }

    #[test]
    fn test_even_blur_kernel_rejected() {
        with_env(&[("DETECTION_BLUR_KERNEL_SIZE", "20")], || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("DETECTION_BLUR_KERNEL_SIZE"));
        });
    }

    #[test]
    fn test_malformed_resolution_rejected() {
        with_env(&[("CAMERA_MAIN_RESOLUTION", "1280by720")], || {
            assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        });
        with_env(&[("CAMERA_LORES_RESOLUTION", "0x240")], || {
            assert!(matches!(Config::from_env(), Err(Error::Config(_))));
        });
    }

    #[test]
    fn test_negative_learning_rate_accepted() {
        with_env(&[("DETECTION_LEARNING_RATE", "-1")], || {
            let config = Config::from_env().unwrap();
            assert!(config.detection.learning_rate < 0.0);
        });
    }
}
