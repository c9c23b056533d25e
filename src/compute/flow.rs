//! Dense optical flow between consecutive frames.
//!
//! Coarse-to-fine windowed least squares: at each pyramid level the flow is
//! refined by solving the 2x2 structure-tensor system over a square window
//! around every pixel, warping the second frame by the current estimate.

use image::GrayImage;

use super::metrics::MetricError;
use super::raster::to_f32;

/// Smallest pyramid level side length.
const MIN_LEVEL_SIZE: usize = 8;

/// Optical flow parameters.
#[derive(Debug, Clone)]
pub struct FlowParams {
    /// Pyramid levels, including full resolution.
    pub levels: usize,
    /// Averaging window side length (odd).
    pub window: usize,
    /// Refinement iterations per level.
    pub iterations: usize,
    /// Minimum structure-tensor eigenvalue (per window pixel) to trust a solve.
    pub min_eigen: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            levels: 3,
            window: 15,
            iterations: 3,
            min_eigen: 1e-3,
        }
    }
}

/// Per-pixel displacement from the first frame to the second.
#[derive(Debug, Clone)]
pub struct FlowField {
    pub width: usize,
    pub height: usize,
    pub flow_x: Vec<f32>,
    pub flow_y: Vec<f32>,
}

impl FlowField {
    fn zeros(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            flow_x: vec![0.0; width * height],
            flow_y: vec![0.0; width * height],
        }
    }

    /// Displacement magnitude per pixel.
    pub fn magnitude(&self) -> Vec<f32> {
        self.flow_x
            .iter()
            .zip(self.flow_y.iter())
            .map(|(&fx, &fy)| (fx * fx + fy * fy).sqrt())
            .collect()
    }

    /// Displacement angle per pixel, in `(-pi, pi]`.
    pub fn angle(&self) -> Vec<f32> {
        self.flow_x
            .iter()
            .zip(self.flow_y.iter())
            .map(|(&fx, &fy)| fy.atan2(fx))
            .collect()
    }
}

/// Single-resolution grid of intensities.
struct Level {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Level {
    #[inline]
    fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Bilinear sample with clamped coordinates.
    fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);
        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let tx = x - x0 as f32;
        let ty = y - y0 as f32;

        let top = self.at(x0, y0) * (1.0 - tx) + self.at(x1, y0) * tx;
        let bottom = self.at(x0, y1) * (1.0 - tx) + self.at(x1, y1) * tx;
        top * (1.0 - ty) + bottom * ty
    }

    /// Halve resolution with 2x2 averaging.
    fn downsample(&self) -> Level {
        let width = self.width.div_ceil(2);
        let height = self.height.div_ceil(2);
        let mut data = vec![0.0f32; width * height];
        for y in 0..height {
            for x in 0..width {
                let sx0 = 2 * x;
                let sy0 = 2 * y;
                let sx1 = (sx0 + 1).min(self.width - 1);
                let sy1 = (sy0 + 1).min(self.height - 1);
                data[y * width + x] = 0.25
                    * (self.at(sx0, sy0) + self.at(sx1, sy0) + self.at(sx0, sy1) + self.at(sx1, sy1));
            }
        }
        Level {
            width,
            height,
            data,
        }
    }

    /// Central-difference gradients with replicated borders.
    fn gradients(&self) -> (Vec<f32>, Vec<f32>) {
        let mut gx = vec![0.0f32; self.data.len()];
        let mut gy = vec![0.0f32; self.data.len()];
        for y in 0..self.height {
            let yp = y.saturating_sub(1);
            let yn = (y + 1).min(self.height - 1);
            for x in 0..self.width {
                let xp = x.saturating_sub(1);
                let xn = (x + 1).min(self.width - 1);
                gx[y * self.width + x] = 0.5 * (self.at(xn, y) - self.at(xp, y));
                gy[y * self.width + x] = 0.5 * (self.at(x, yn) - self.at(x, yp));
            }
        }
        (gx, gy)
    }
}

fn build_pyramid(frame: &GrayImage, levels: usize) -> Vec<Level> {
    let mut pyramid = vec![Level {
        width: frame.width() as usize,
        height: frame.height() as usize,
        data: to_f32(frame),
    }];
    while pyramid.len() < levels.max(1) {
        let last = &pyramid[pyramid.len() - 1];
        if last.width / 2 < MIN_LEVEL_SIZE || last.height / 2 < MIN_LEVEL_SIZE {
            break;
        }
        let next = last.downsample();
        pyramid.push(next);
    }
    pyramid
}

/// Sum of `values` over a `(2r+1)^2` window around every pixel (clipped at borders).
fn box_sum(values: &[f32], width: usize, height: usize, radius: usize) -> Vec<f32> {
    let stride = width + 1;
    let mut integral = vec![0.0f64; stride * (height + 1)];
    for y in 0..height {
        let mut row = 0.0f64;
        for x in 0..width {
            row += values[y * width + x] as f64;
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row;
        }
    }

    let mut out = vec![0.0f32; width * height];
    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(width);
            let sum = integral[y1 * stride + x1] - integral[y0 * stride + x1]
                - integral[y1 * stride + x0]
                + integral[y0 * stride + x0];
            out[y * width + x] = sum as f32;
        }
    }
    out
}

/// Compute dense optical flow from `prev` to `next`.
pub fn dense_optical_flow(
    prev: &GrayImage,
    next: &GrayImage,
    params: &FlowParams,
) -> Result<FlowField, MetricError> {
    if prev.dimensions() != next.dimensions() {
        return Err(MetricError::DimensionMismatch {
            expected: prev.dimensions(),
            found: next.dimensions(),
        });
    }
    let (width, height) = (prev.width() as usize, prev.height() as usize);
    if width == 0 || height == 0 {
        return Err(MetricError::EmptyFrame);
    }

    let prev_pyramid = build_pyramid(prev, params.levels);
    let next_pyramid = build_pyramid(next, params.levels);
    let radius = params.window / 2;
    let window_area = ((2 * radius + 1) * (2 * radius + 1)) as f32;
    let max_step = (2 * radius + 1) as f32;

    let mut flow: Option<FlowField> = None;

    for (p, n) in prev_pyramid.iter().zip(next_pyramid.iter()).rev() {
        let (w, h) = (p.width, p.height);

        // Upsample the coarser estimate to this level
        let mut current = FlowField::zeros(w, h);
        if let Some(coarse) = &flow {
            for y in 0..h {
                let cy = (y / 2).min(coarse.height - 1);
                for x in 0..w {
                    let cx = (x / 2).min(coarse.width - 1);
                    current.flow_x[y * w + x] = 2.0 * coarse.flow_x[cy * coarse.width + cx];
                    current.flow_y[y * w + x] = 2.0 * coarse.flow_y[cy * coarse.width + cx];
                }
            }
        }

        let (ix, iy) = p.gradients();
        let ixx: Vec<f32> = ix.iter().map(|g| g * g).collect();
        let ixy: Vec<f32> = ix.iter().zip(iy.iter()).map(|(a, b)| a * b).collect();
        let iyy: Vec<f32> = iy.iter().map(|g| g * g).collect();
        let sxx = box_sum(&ixx, w, h, radius);
        let sxy = box_sum(&ixy, w, h, radius);
        let syy = box_sum(&iyy, w, h, radius);

        for _ in 0..params.iterations {
            let mut bx = vec![0.0f32; w * h];
            let mut by = vec![0.0f32; w * h];
            for y in 0..h {
                for x in 0..w {
                    let idx = y * w + x;
                    let warped = n.sample(
                        x as f32 + current.flow_x[idx],
                        y as f32 + current.flow_y[idx],
                    );
                    let it = warped - p.at(x, y);
                    bx[idx] = ix[idx] * it;
                    by[idx] = iy[idx] * it;
                }
            }
            let sxt = box_sum(&bx, w, h, radius);
            let syt = box_sum(&by, w, h, radius);

            for idx in 0..w * h {
                let (a, b, d) = (sxx[idx], sxy[idx], syy[idx]);
                let half_trace = 0.5 * (a + d);
                let spread = (0.25 * (a - d) * (a - d) + b * b).sqrt();
                let min_eigen = half_trace - spread;
                if min_eigen / window_area < params.min_eigen {
                    continue;
                }
                let det = a * d - b * b;
                if det.abs() < f32::EPSILON {
                    continue;
                }
                let du = (-d * sxt[idx] + b * syt[idx]) / det;
                let dv = (b * sxt[idx] - a * syt[idx]) / det;
                if du.is_finite() && dv.is_finite() {
                    current.flow_x[idx] += du.clamp(-max_step, max_step);
                    current.flow_y[idx] += dv.clamp(-max_step, max_step);
                }
            }
        }

        flow = Some(current);
    }

    flow.ok_or(MetricError::EmptyFrame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob(size: u32, cx: f32, cy: f32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let v = 220.0 * (-(dx * dx + dy * dy) / (2.0 * 6.0 * 6.0)).exp();
            Luma([v.round() as u8])
        })
    }

    #[test]
    fn test_identical_frames_have_zero_flow() {
        let frame = blob(48, 24.0, 24.0);
        let field = dense_optical_flow(&frame, &frame, &FlowParams::default()).unwrap();
        let max = field.magnitude().into_iter().fold(0.0f32, f32::max);
        assert!(max < 1e-4);
    }

    #[test]
    fn test_shifted_blob_moves_right() {
        let prev = blob(64, 30.0, 32.0);
        let next = blob(64, 31.0, 32.0);
        let field = dense_optical_flow(&prev, &next, &FlowParams::default()).unwrap();

        // Sample the flank of the blob where the gradient is strong
        let idx = 32 * 64 + 36;
        assert!(field.flow_x[idx] > 0.5, "flow_x = {}", field.flow_x[idx]);
        assert!(field.flow_y[idx].abs() < 0.3, "flow_y = {}", field.flow_y[idx]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = GrayImage::new(16, 16);
        let b = GrayImage::new(16, 8);
        assert!(matches!(
            dense_optical_flow(&a, &b, &FlowParams::default()),
            Err(MetricError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_tiny_frames_single_level() {
        let a = GrayImage::from_pixel(1, 1, Luma([10]));
        let b = GrayImage::from_pixel(1, 1, Luma([200]));
        let field = dense_optical_flow(&a, &b, &FlowParams::default()).unwrap();
        assert_eq!(field.flow_x.len(), 1);
        assert!(field.flow_x[0].is_finite());
    }

    #[test]
    fn test_box_sum_interior() {
        let values = vec![1.0f32; 25];
        let sums = box_sum(&values, 5, 5, 1);
        assert_eq!(sums[2 * 5 + 2], 9.0);
        assert_eq!(sums[0], 4.0);
    }
}
