//! Adaptive background modelling
//!
//! Per-pixel statistical model of the non-moving scene. The detector treats
//! the model as opaque so the algorithm can be swapped without touching the
//! pipeline.

use image::{GrayImage, Luma};

/// Mask value for confident foreground
pub const FOREGROUND: u8 = 255;
/// Mask value for the ambiguous band (shadows, slow illumination drift)
pub const SHADOW: u8 = 127;
/// Mask value for background
pub const BACKGROUND: u8 = 0;

/// Variance assigned to a pixel the first time it is seen
const INITIAL_VARIANCE: f32 = 25.0;
/// Variance clamp bounds; keeps thresholds sane in dead-flat scenes
const MIN_VARIANCE: f32 = 4.0;
const MAX_VARIANCE: f32 = 75.0;
/// Sigma multiple for confident foreground
const FOREGROUND_SIGMAS: f32 = 4.0;
/// Sigma multiple for the ambiguous band
const SHADOW_SIGMAS: f32 = 2.5;
/// Absolute intensity floor for confident foreground
const MIN_FOREGROUND_DELTA: f32 = 45.0;
/// Absolute intensity floor for the ambiguous band
const MIN_SHADOW_DELTA: f32 = 15.0;
/// Automatic learning rate bottoms out at 1/this many frames
const AUTO_RATE_HISTORY: u32 = 500;

/// Adaptive model of the usual scene.
///
/// `update` consumes one frame, classifies every pixel against the model
/// accumulated so far, then folds the frame in. Mask values are
/// [`FOREGROUND`], [`SHADOW`] and [`BACKGROUND`]. A negative learning rate
/// asks the model to pick its own rate.
pub trait BackgroundModel: Send {
    fn update(&mut self, frame: &GrayImage, learning_rate: f64) -> GrayImage;
}

/// Running per-pixel Gaussian (mean + variance with exponential forgetting).
///
/// A pixel is confident foreground when it sits more than four sigma from
/// its mean, ambiguous between 2.5 and four sigma. Absolute floors keep
/// near-zero-variance pixels from flagging sensor flicker.
pub struct AdaptiveGaussianModel {
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u32,
}

impl AdaptiveGaussianModel {
    pub fn new() -> Self {
        Self {
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
        }
    }
}

impl Default for AdaptiveGaussianModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundModel for AdaptiveGaussianModel {
    fn update(&mut self, frame: &GrayImage, learning_rate: f64) -> GrayImage {
        let (width, height) = frame.dimensions();
        let pixels = frame.as_raw();

        if self.mean.is_empty() {
            self.mean = pixels.iter().map(|&p| p as f32).collect();
            self.variance = vec![INITIAL_VARIANCE; pixels.len()];
            self.frames_seen = 1;
            // Nothing is known about the scene yet; everything is foreground
            // until the model has history.
            return GrayImage::from_pixel(width, height, Luma([FOREGROUND]));
        }

        self.frames_seen = self.frames_seen.saturating_add(1);
        let alpha = if learning_rate >= 0.0 {
            (learning_rate as f32).clamp(0.0, 1.0)
        } else {
            1.0 / self.frames_seen.min(AUTO_RATE_HISTORY) as f32
        };

        let mut mask = GrayImage::new(width, height);
        for (x, y, out) in mask.enumerate_pixels_mut() {
            let i = (y * width + x) as usize;
            let delta = pixels[i] as f32 - self.mean[i];
            let sigma = self.variance[i].sqrt();

            let label = if delta.abs() > (FOREGROUND_SIGMAS * sigma).max(MIN_FOREGROUND_DELTA) {
                FOREGROUND
            } else if delta.abs() > (SHADOW_SIGMAS * sigma).max(MIN_SHADOW_DELTA) {
                SHADOW
            } else {
                BACKGROUND
            };

            self.mean[i] += alpha * delta;
            self.variance[i] = (self.variance[i] + alpha * (delta * delta - self.variance[i]))
                .clamp(MIN_VARIANCE, MAX_VARIANCE);

            *out = Luma([label]);
        }
        mask
    }
}
