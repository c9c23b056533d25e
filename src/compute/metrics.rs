//! Visual quality metrics over sampled frame sequences.
//!
//! Each metric returns a unit-interval value and fails independently. The
//! engine converts a failure into that metric's randomized fallback so one bad
//! frame never aborts scoring.

use image::GrayImage;
use log::{debug, error, warn};

use super::flow::{FlowParams, dense_optical_flow};
use super::gradient::canny;
use super::noise::{Fallback, ScoreRng};
use super::raster::{mean_std, mean_std_of, normalize_minmax, region_mean};
use super::regions::{contour_area, find_contours, label_components};

/// Intensity above which a pixel counts as active.
const ACTIVE_THRESHOLD: u8 = 30;

/// Connected-component count that saturates the region term.
const REGION_CAP: f64 = 100.0;

/// Flow magnitude above which a pixel counts as moving.
const MOTION_THRESHOLD: f32 = 0.1;

/// Fallback when complexity computation fails outright.
pub const COMPLEXITY_ON_ERROR: Fallback = Fallback::new(75.0, 5.0);
/// Fallback when no frame yields a complexity value.
pub const COMPLEXITY_FALLBACK: Fallback = Fallback::new(60.0, 5.0);
pub const AESTHETIC_FALLBACK: Fallback = Fallback::new(65.0, 7.0);
pub const MOTION_FALLBACK: Fallback = Fallback::new(60.0, 8.0);
pub const COHERENCE_FALLBACK: Fallback = Fallback::new(70.0, 5.0);

/// A single metric computation failed.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("Frame has no pixels")]
    EmptyFrame,
    #[error("No usable frames")]
    NoUsableFrames,
    #[error("Frame dimensions {found:?} do not match {expected:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    #[error("{0} produced a non-finite value")]
    NonFinite(&'static str),
}

fn finite(value: f64, metric: &'static str) -> Result<f64, MetricError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricError::NonFinite(metric))
    }
}

fn non_empty(frame: &GrayImage) -> Result<(), MetricError> {
    if frame.width() == 0 || frame.height() == 0 {
        Err(MetricError::EmptyFrame)
    } else {
        Ok(())
    }
}

/// The four frame metrics on a 0-100 scale, before any context multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMetrics {
    pub complexity: f64,
    pub aesthetic: f64,
    pub motion: f64,
    pub coherence: f64,
}

/// Computes complexity, aesthetic, motion and coherence from raster sequences.
#[derive(Debug, Clone, Default)]
pub struct FrameMetricsEngine {
    flow: FlowParams,
}

impl FrameMetricsEngine {
    pub fn new(flow: FlowParams) -> Self {
        Self { flow }
    }

    /// Run every metric, replacing failures with their fallbacks.
    pub fn measure(&self, frames: &[GrayImage], rng: &mut ScoreRng) -> FrameMetrics {
        let complexity = match self.complexity(frames) {
            Ok(value) => value * 100.0,
            Err(MetricError::NoUsableFrames) => {
                warn!("No usable frames for complexity");
                COMPLEXITY_FALLBACK.draw(rng)
            }
            Err(e) => {
                error!("Complexity calculation failed: {}", e);
                COMPLEXITY_ON_ERROR.draw(rng)
            }
        };

        let aesthetic = self
            .aesthetic(frames)
            .map(|v| v * 100.0)
            .unwrap_or_else(|e| {
                error!("Aesthetic calculation failed: {}", e);
                AESTHETIC_FALLBACK.draw(rng)
            });

        let motion = self.motion(frames).map(|v| v * 100.0).unwrap_or_else(|e| {
            error!("Motion calculation failed: {}", e);
            MOTION_FALLBACK.draw(rng)
        });

        let coherence = self
            .coherence(frames)
            .map(|v| v * 100.0)
            .unwrap_or_else(|e| {
                error!("Coherence calculation failed: {}", e);
                COHERENCE_FALLBACK.draw(rng)
            });

        debug!(
            "Frame metrics: complexity {:.2}, aesthetic {:.2}, motion {:.2}, coherence {:.2}",
            complexity, aesthetic, motion, coherence
        );

        FrameMetrics {
            complexity,
            aesthetic,
            motion,
            coherence,
        }
    }

    /// Structural complexity in `[0.3, 1.0]`.
    ///
    /// Per frame: edge density (Canny 30/150) 0.4, active-pixel fraction 0.3,
    /// intensity std / 128 0.15, component count / 100 (capped) 0.15, all
    /// boosted by 1.2. Frames without pixels are skipped.
    pub fn complexity(&self, frames: &[GrayImage]) -> Result<f64, MetricError> {
        let mut scores = Vec::with_capacity(frames.len());

        for (i, frame) in frames.iter().enumerate() {
            if non_empty(frame).is_err() {
                warn!("Skipping empty frame {} in complexity", i);
                continue;
            }
            let size = frame.as_raw().len() as f64;
            let (width, height) = (frame.width() as usize, frame.height() as usize);

            let edge_density = canny(frame, 30.0, 150.0).density();

            let mask: Vec<bool> = frame.as_raw().iter().map(|&p| p > ACTIVE_THRESHOLD).collect();
            let active = mask.iter().filter(|&&m| m).count() as f64 / size;

            let (_, std) = mean_std(frame);
            let intensity = std / 128.0;

            let components = label_components(&mask, width, height).count as f64;
            let regions = (components / REGION_CAP).min(1.0);

            scores.push((edge_density * 0.4 + active * 0.3 + intensity * 0.15 + regions * 0.15) * 1.2);
        }

        if scores.is_empty() {
            return Err(MetricError::NoUsableFrames);
        }
        let (mean, _) = mean_std_of(scores);
        Ok(finite(mean, "complexity")?.clamp(0.3, 1.0))
    }

    /// Compositional quality in `[0, 1]`; 0.5 for an empty sequence.
    pub fn aesthetic(&self, frames: &[GrayImage]) -> Result<f64, MetricError> {
        if frames.is_empty() {
            return Ok(0.5);
        }

        let mut scores = Vec::with_capacity(frames.len());
        for frame in frames {
            non_empty(frame)?;
            let (w, h) = frame.dimensions();
            let size = frame.as_raw().len() as f64;

            let left = region_mean(frame, 0, w / 2, 0, h);
            let right = region_mean(frame, w / 2, w, 0, h);
            let top = region_mean(frame, 0, w, 0, h / 2);
            let bottom = region_mean(frame, 0, w, h / 2, h);
            let balance = 1.0 - ((left - right).abs() + (top - bottom).abs()) / 510.0;

            let lit = frame.as_raw().iter().filter(|&&p| p != 0).count() as f64;
            let negative_space = 1.0 - lit / size;

            let edge_density = canny(frame, 50.0, 150.0).density();
            let (_, std) = mean_std(frame);
            let contrast = std / 128.0;

            scores.push(balance * 0.3 + negative_space * 0.2 + edge_density * 0.25 + contrast * 0.25);
        }

        let (mean, _) = mean_std_of(scores);
        finite(mean, "aesthetic")
    }

    /// Motion quality over consecutive frame pairs, in `[0, 1]`.
    ///
    /// Fewer than two frames give a neutral 0.5.
    pub fn motion(&self, frames: &[GrayImage]) -> Result<f64, MetricError> {
        if frames.len() < 2 {
            return Ok(0.5);
        }

        let mut scores = Vec::with_capacity(frames.len() - 1);
        for pair in frames.windows(2) {
            let field = dense_optical_flow(&pair[0], &pair[1], &self.flow)?;
            let magnitude = field.magnitude();
            let count = magnitude.len() as f64;

            let (mean, std) = mean_std_of(magnitude.iter().map(|&m| m as f64));
            let smoothness = if mean > 0.0 {
                1.0 - (std / mean).min(1.0)
            } else {
                1.0
            };

            let coverage = magnitude.iter().filter(|&&m| m > MOTION_THRESHOLD).count() as f64 / count;

            let (_, angle_std) = mean_std_of(field.angle().iter().map(|&a| a as f64));
            let direction = 1.0 - (angle_std / std::f64::consts::PI).min(1.0);

            // Magnitude-weighted proximity to the frame centre
            let (w, h) = (field.width, field.height);
            let (cx, cy) = ((w / 2) as f64, (h / 2) as f64);
            let falloff = h as f64 / 4.0;
            let mut total = 0.0f64;
            let mut weighted = 0.0f64;
            for y in 0..h {
                for x in 0..w {
                    let m = magnitude[y * w + x] as f64;
                    let dist = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
                    total += m;
                    weighted += m * (-dist / falloff).exp();
                }
            }
            let guidance = if total > 0.0 { weighted / total } else { 0.5 };

            scores.push(smoothness * 0.3 + coverage * 0.2 + direction * 0.25 + guidance * 0.25);
        }

        let (mean, _) = mean_std_of(scores);
        finite(mean, "motion")
    }

    /// Visual coherence in `[0.3, 1]`; 0.75 for an empty sequence.
    ///
    /// Spatial uniformity of the min/max-normalized frame and consistency of
    /// contour areas on the Canny (50/150) edge map, equally weighted.
    pub fn coherence(&self, frames: &[GrayImage]) -> Result<f64, MetricError> {
        if frames.is_empty() {
            return Ok(0.75);
        }

        let mut scores = Vec::with_capacity(frames.len());
        for frame in frames {
            non_empty(frame)?;

            let normalized = normalize_minmax(frame);
            let (_, spread) = mean_std_of(normalized.iter().map(|&v| v as f64));
            let spatial = (1.0 - spread * 2.0).clamp(0.0, 1.0);

            let edges = canny(frame, 50.0, 150.0);
            let contours = find_contours(&edges.edges, edges.width, edges.height);
            let size_consistency = if contours.is_empty() {
                0.5
            } else {
                let (mean_area, std_area) = mean_std_of(contours.iter().map(|c| contour_area(c)));
                if mean_area > 0.0 {
                    (1.0 - (std_area / mean_area) * 0.5).clamp(0.3, 1.0)
                } else {
                    0.5
                }
            };

            scores.push(spatial * 0.5 + size_consistency * 0.5);
        }

        let (mean, _) = mean_std_of(scores);
        Ok(finite(mean, "coherence")?.max(0.3))
    }
}

/// Spread of per-frame intensity std across the sequence.
pub fn frame_variation(frames: &[GrayImage]) -> f64 {
    let (_, spread) = mean_std_of(frames.iter().map(|f| mean_std(f).1));
    spread
}

/// Pixel-wise mean of a frame sequence.
pub fn mean_frame(frames: &[GrayImage]) -> Result<(u32, u32, Vec<f64>), MetricError> {
    let first = frames.first().ok_or(MetricError::NoUsableFrames)?;
    let dims = first.dimensions();
    let mut sum = vec![0.0f64; first.as_raw().len()];
    for frame in frames {
        if frame.dimensions() != dims {
            return Err(MetricError::DimensionMismatch {
                expected: dims,
                found: frame.dimensions(),
            });
        }
        for (acc, &p) in sum.iter_mut().zip(frame.as_raw().iter()) {
            *acc += p as f64;
        }
    }
    let n = frames.len() as f64;
    sum.iter_mut().for_each(|v| *v /= n);
    Ok((dims.0, dims.1, sum))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use proptest::prelude::*;

    fn checkerboard(size: u32, cell: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            Luma([if (x / cell + y / cell) % 2 == 0 { 0 } else { 255 }])
        })
    }

    fn disc(size: u32, cx: f32, cy: f32, r: f32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let d = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            Luma([if d <= r { 200 } else { 0 }])
        })
    }

    #[test]
    fn test_motion_neutral_below_two_frames() {
        let engine = FrameMetricsEngine::default();
        assert_eq!(engine.motion(&[]).unwrap(), 0.5);
        assert_eq!(engine.motion(&[checkerboard(16, 4)]).unwrap(), 0.5);
    }

    #[test]
    fn test_static_sequence_motion() {
        // No flow: smoothness 1, coverage 0, direction 1, guidance 0.5
        let engine = FrameMetricsEngine::default();
        let frame = disc(32, 16.0, 16.0, 6.0);
        let motion = engine.motion(&[frame.clone(), frame]).unwrap();
        assert!((motion - 0.675).abs() < 1e-9);
    }

    #[test]
    fn test_motion_dimension_mismatch_is_error() {
        let engine = FrameMetricsEngine::default();
        let frames = [GrayImage::new(8, 8), GrayImage::new(8, 4)];
        assert!(matches!(
            engine.motion(&frames),
            Err(MetricError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_blank_frame_complexity_floor() {
        let engine = FrameMetricsEngine::default();
        let blank = GrayImage::new(16, 16);
        assert_eq!(engine.complexity(&[blank]).unwrap(), 0.3);
    }

    #[test]
    fn test_complexity_no_usable_frames() {
        let engine = FrameMetricsEngine::default();
        assert!(matches!(
            engine.complexity(&[GrayImage::new(0, 0)]),
            Err(MetricError::NoUsableFrames)
        ));
        assert!(matches!(
            engine.complexity(&[]),
            Err(MetricError::NoUsableFrames)
        ));
    }

    #[test]
    fn test_busy_frame_more_complex_than_blank() {
        let engine = FrameMetricsEngine::default();
        let busy = engine.complexity(&[checkerboard(32, 2)]).unwrap();
        let blank = engine.complexity(&[GrayImage::new(32, 32)]).unwrap();
        assert!(busy > blank);
    }

    #[test]
    fn test_black_frame_aesthetic() {
        // Balanced, all negative space, no edges, no contrast
        let engine = FrameMetricsEngine::default();
        let score = engine.aesthetic(&[GrayImage::new(10, 10)]).unwrap();
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_frame_aesthetic_is_error() {
        let engine = FrameMetricsEngine::default();
        assert!(matches!(
            engine.aesthetic(&[GrayImage::new(0, 3)]),
            Err(MetricError::EmptyFrame)
        ));
    }

    #[test]
    fn test_uniform_frame_coherence() {
        // Flat: spatial 1.0, no contours -> 0.5
        let engine = FrameMetricsEngine::default();
        let flat = GrayImage::from_pixel(12, 12, Luma([90]));
        assert!((engine.coherence(&[flat]).unwrap() - 0.75).abs() < 1e-12);
        assert_eq!(engine.coherence(&[]).unwrap(), 0.75);
    }

    #[test]
    fn test_measure_falls_back_per_metric() {
        let engine = FrameMetricsEngine::default();
        let frames = [GrayImage::new(0, 0), GrayImage::new(0, 0)];
        let mut rng = ScoreRng::new(11);
        let metrics = engine.measure(&frames, &mut rng);

        let mut expected = ScoreRng::new(11);
        assert_eq!(metrics.complexity, COMPLEXITY_FALLBACK.draw(&mut expected));
        assert_eq!(metrics.aesthetic, AESTHETIC_FALLBACK.draw(&mut expected));
        assert_eq!(metrics.motion, MOTION_FALLBACK.draw(&mut expected));
        assert_eq!(metrics.coherence, COHERENCE_FALLBACK.draw(&mut expected));
    }

    #[test]
    fn test_mean_frame() {
        let a = GrayImage::from_pixel(2, 2, Luma([10]));
        let b = GrayImage::from_pixel(2, 2, Luma([30]));
        let (w, h, mean) = mean_frame(&[a.clone(), b]).unwrap();
        assert_eq!((w, h), (2, 2));
        assert!(mean.iter().all(|&v| (v - 20.0).abs() < 1e-12));

        assert!(mean_frame(&[a, GrayImage::new(3, 3)]).is_err());
        assert!(mean_frame(&[]).is_err());
    }

    #[test]
    fn test_frame_variation() {
        let flat = GrayImage::from_pixel(4, 4, Luma([50]));
        assert_eq!(frame_variation(&[flat.clone(), flat]), 0.0);
        assert!(frame_variation(&[GrayImage::new(4, 4), checkerboard(4, 1)]) > 0.1);
    }

    fn frame_sequence() -> impl Strategy<Value = Vec<GrayImage>> {
        (1u32..7, 1u32..7, 1usize..4).prop_flat_map(|(w, h, n)| {
            prop::collection::vec(
                prop::collection::vec(any::<u8>(), (w * h) as usize),
                n,
            )
            .prop_map(move |rasters| {
                rasters
                    .into_iter()
                    .filter_map(|raw| GrayImage::from_raw(w, h, raw))
                    .collect()
            })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_metrics_stay_in_unit_range(frames in frame_sequence()) {
            let engine = FrameMetricsEngine::default();
            for value in [
                engine.complexity(&frames).unwrap(),
                engine.aesthetic(&frames).unwrap(),
                engine.motion(&frames).unwrap(),
                engine.coherence(&frames).unwrap(),
            ] {
                prop_assert!((0.0..=1.0).contains(&value), "value {}", value);
            }
        }
    }
}
