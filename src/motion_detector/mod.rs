//! MotionDetector - Frame Analysis Pipeline
//!
//! ## Responsibilities
//!
//! - Blur incoming analysis frames to reject sensor noise
//! - Maintain the adaptive background model and classify pixels
//! - Drop ambiguous/shadow pixels with a fixed high threshold
//! - Clean the binary mask (erode once, dilate twice)
//! - Aggregate foreground regions and gate them by minimum area

mod background;

pub use background::{AdaptiveGaussianModel, BackgroundModel};

use std::collections::VecDeque;

use image::{imageops, GrayImage, Luma};

use crate::config::DetectionConfig;

/// Mask binarization threshold; keeps confident foreground only, so the
/// ambiguous/shadow band never counts as motion.
const BINARY_THRESHOLD: u8 = 200;

/// 5x5 elliptical structuring element, as kernel offsets
const ELLIPSE_5X5: [(i32, i32); 17] = [
    (0, -2),
    (-2, -1),
    (-1, -1),
    (0, -1),
    (1, -1),
    (2, -1),
    (-2, 0),
    (-1, 0),
    (0, 0),
    (1, 0),
    (2, 0),
    (-2, 1),
    (-1, 1),
    (0, 1),
    (1, 1),
    (2, 1),
    (0, 2),
];

/// Result of analyzing one frame. Ephemeral, never persisted.
///
/// Invariant: when `detected` is false, `region_count` and
/// `largest_region_area` are both zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionEvent {
    pub detected: bool,
    pub region_count: usize,
    pub largest_region_area: u32,
}

/// Stateful per-stream motion detector.
///
/// Feed frames of constant dimensions from a single logical stream. The
/// first frames flag motion while the model is unseeded; callers wanting a
/// settled model feed a warm-up sequence first.
pub struct MotionDetector {
    config: DetectionConfig,
    model: Box<dyn BackgroundModel>,
    blur_sigma: f32,
}

impl MotionDetector {
    /// Create a detector with the default adaptive Gaussian model
    pub fn new(config: DetectionConfig) -> Self {
        Self::with_model(config, Box::new(AdaptiveGaussianModel::new()))
    }

    /// Create a detector over a caller-supplied background model
    pub fn with_model(config: DetectionConfig, model: Box<dyn BackgroundModel>) -> Self {
        let blur_sigma = blur_sigma(config.blur_kernel_size);
        Self {
            config,
            model,
            blur_sigma,
        }
    }

    /// Analyze one grayscale frame and update the background model.
    pub fn process_frame(&mut self, frame: &GrayImage) -> MotionEvent {
        let blurred = imageops::blur(frame, self.blur_sigma);
        let mask = self.model.update(&blurred, self.config.learning_rate);

        let binary = binarize(&mask, BINARY_THRESHOLD);
        let cleaned = dilate(&dilate(&erode(&binary)));

        let (region_count, largest_region_area) =
            extract_regions(&cleaned, self.config.min_contour_area);

        MotionEvent {
            detected: region_count > 0,
            region_count,
            largest_region_area,
        }
    }
}

/// Automatic sigma for a given kernel size (the getGaussianKernel rule)
fn blur_sigma(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size.saturating_sub(1)) as f32 * 0.5 - 1.0) + 0.8
}

fn binarize(mask: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel.0[0] > threshold {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

/// Erosion: a pixel survives only when every in-bounds neighbor under the
/// structuring element is foreground. Strips isolated noise pixels.
fn erode(mask: &GrayImage) -> GrayImage {
    morph(mask, true)
}

/// Dilation: a pixel turns on when any in-bounds neighbor under the
/// structuring element is foreground. Reconnects fragmented blobs.
fn dilate(mask: &GrayImage) -> GrayImage {
    morph(mask, false)
}

fn morph(mask: &GrayImage, require_all: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    let mut out = GrayImage::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let mut result = require_all;
            for (dx, dy) in ELLIPSE_5X5 {
                let nx = x + dx;
                let ny = y + dy;
                if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                    continue;
                }
                let on = mask.get_pixel(nx as u32, ny as u32).0[0] == 255;
                if require_all {
                    if !on {
                        result = false;
                        break;
                    }
                } else if on {
                    result = true;
                    break;
                }
            }
            if result {
                out.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
    }
    out
}

/// Count 8-connected foreground regions with pixel area >= `min_area`.
///
/// Returns (qualifying region count, largest qualifying area).
fn extract_regions(mask: &GrayImage, min_area: u32) -> (usize, u32) {
    let (width, height) = mask.dimensions();
    let mut visited = vec![false; (width * height) as usize];
    let mut queue = VecDeque::new();
    let mut count = 0usize;
    let mut largest = 0u32;

    for start_y in 0..height {
        for start_x in 0..width {
            let start = (start_y * width + start_x) as usize;
            if visited[start] || mask.get_pixel(start_x, start_y).0[0] != 255 {
                continue;
            }

            visited[start] = true;
            queue.push_back((start_x, start_y));
            let mut area = 0u32;

            while let Some((x, y)) = queue.pop_front() {
                area += 1;
                for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let nx = x as i32 + dx;
                        let ny = y as i32 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i32 || ny >= height as i32 {
                            continue;
                        }
                        let (nx, ny) = (nx as u32, ny as u32);
                        let idx = (ny * width + nx) as usize;
                        if !visited[idx] && mask.get_pixel(nx, ny).0[0] == 255 {
                            visited[idx] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
            }

            if area >= min_area {
                count += 1;
                largest = largest.max(area);
            }
        }
    }

    (count, largest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config(min_contour_area: u32) -> DetectionConfig {
        DetectionConfig {
            min_contour_area,
            blur_kernel_size: 21,
            learning_rate: -1.0,
            cooldown: Duration::from_secs(5),
            max_clip_duration: Duration::from_secs(60),
        }
    }

    fn uniform_frame(value: u8) -> GrayImage {
        GrayImage::from_pixel(320, 240, Luma([value]))
    }

    fn frame_with_block(background: u8, value: u8, x0: u32, y0: u32, size: u32) -> GrayImage {
        let mut frame = uniform_frame(background);
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                frame.put_pixel(x, y, Luma([value]));
            }
        }
        frame
    }

    fn warmed_up_detector(min_contour_area: u32) -> MotionDetector {
        let mut detector = MotionDetector::new(test_config(min_contour_area));
        for _ in 0..50 {
            detector.process_frame(&uniform_frame(50));
        }
        detector
    }

    #[test]
    fn test_unseeded_model_flags_first_frame() {
        let mut detector = MotionDetector::new(test_config(100));
        let event = detector.process_frame(&uniform_frame(50));
        assert!(event.detected);
    }

    #[test]
    fn test_quiescence_after_warmup() {
        let mut detector = MotionDetector::new(test_config(100));
        let frame = uniform_frame(50);
        let mut event = MotionEvent::default();
        for _ in 0..50 {
            event = detector.process_frame(&frame);
        }
        assert!(!event.detected);
        assert_eq!(event.region_count, 0);
        assert_eq!(event.largest_region_area, 0);
    }

    #[test]
    fn test_block_above_min_area_detected() {
        let mut detector = warmed_up_detector(100);
        let event = detector.process_frame(&frame_with_block(50, 200, 50, 50, 60));
        assert!(event.detected);
        assert_eq!(event.region_count, 1);
        assert!(event.largest_region_area >= 100);
    }

    #[test]
    fn test_block_below_min_area_not_detected() {
        let mut detector = warmed_up_detector(100);
        let event = detector.process_frame(&frame_with_block(50, 200, 50, 50, 5));
        assert!(!event.detected);
        assert_eq!(event.region_count, 0);
        assert_eq!(event.largest_region_area, 0);
    }

    #[test]
    fn test_positive_learning_rate_absorbs_change() {
        let mut config = test_config(100);
        config.learning_rate = 0.5;
        let mut detector = MotionDetector::new(config);
        for _ in 0..10 {
            detector.process_frame(&uniform_frame(50));
        }

        let block = frame_with_block(50, 200, 50, 50, 60);
        let first = detector.process_frame(&block);
        assert!(first.detected);

        let mut event = first;
        for _ in 0..5 {
            event = detector.process_frame(&block);
        }
        assert!(!event.detected, "model should absorb a static change");
    }

    #[test]
    fn test_binarize_drops_shadow_band() {
        let mut mask = GrayImage::new(8, 8);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(2, 2, Luma([127]));
        let binary = binarize(&mask, BINARY_THRESHOLD);
        assert_eq!(binary.get_pixel(1, 1).0[0], 255);
        assert_eq!(binary.get_pixel(2, 2).0[0], 0);
    }

    #[test]
    fn test_erode_removes_isolated_pixel() {
        let mut mask = GrayImage::new(16, 16);
        mask.put_pixel(8, 8, Luma([255]));
        let eroded = erode(&mask);
        assert!(eroded.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn test_dilate_reconnects_nearby_blobs() {
        let mut mask = GrayImage::new(32, 16);
        for y in 4..8 {
            for x in 4..8 {
                mask.put_pixel(x, y, Luma([255]));
            }
            for x in 11..15 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let (regions_before, _) = extract_regions(&mask, 1);
        assert_eq!(regions_before, 2);

        let grown = dilate(&dilate(&mask));
        let (regions_after, _) = extract_regions(&grown, 1);
        assert_eq!(regions_after, 1);
    }

    #[test]
    fn test_extract_regions_gates_by_area() {
        let mut mask = GrayImage::new(32, 32);
        for y in 2..4 {
            for x in 2..4 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        for y in 10..20 {
            for x in 10..20 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let (count, largest) = extract_regions(&mask, 50);
        assert_eq!(count, 1);
        assert_eq!(largest, 100);
    }
}
