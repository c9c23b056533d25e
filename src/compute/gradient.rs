//! Gradient computation and edge detection.
//!
//! Sobel gradients with replicated borders, and a Canny detector built on them
//! (L1 magnitude, non-maximum suppression, hysteresis thresholding).

use image::GrayImage;

/// tan(22.5 deg) and tan(67.5 deg) for direction binning.
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// Compute unnormalized 3x3 Sobel gradients. Returns (gradient_x, gradient_y).
///
/// Uses replicated borders (edge pixels extend outward).
pub fn sobel_gradient(frame: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let grid = frame.as_raw();
    let mut grad_x = vec![0.0f32; width * height];
    let mut grad_y = vec![0.0f32; width * height];

    for y in 0..height {
        let y_prev = y.saturating_sub(1);
        let y_next = (y + 1).min(height - 1);

        let row_prev = y_prev * width;
        let row_curr = y * width;
        let row_next = y_next * width;

        for x in 0..width {
            let x_prev = x.saturating_sub(1);
            let x_next = (x + 1).min(width - 1);

            let tl = grid[row_prev + x_prev] as f32;
            let tc = grid[row_prev + x] as f32;
            let tr = grid[row_prev + x_next] as f32;
            let ml = grid[row_curr + x_prev] as f32;
            let mr = grid[row_curr + x_next] as f32;
            let bl = grid[row_next + x_prev] as f32;
            let bc = grid[row_next + x] as f32;
            let br = grid[row_next + x_next] as f32;

            // Sobel X: [-1, 0, 1; -2, 0, 2; -1, 0, 1]
            grad_x[row_curr + x] = -tl + tr - 2.0 * ml + 2.0 * mr - bl + br;

            // Sobel Y: [-1, -2, -1; 0, 0, 0; 1, 2, 1]
            grad_y[row_curr + x] = -tl - 2.0 * tc - tr + bl + 2.0 * bc + br;
        }
    }

    (grad_x, grad_y)
}

/// Binary edge map.
#[derive(Debug, Clone)]
pub struct EdgeMap {
    pub width: usize,
    pub height: usize,
    pub edges: Vec<bool>,
}

impl EdgeMap {
    #[inline]
    pub fn is_edge(&self, x: usize, y: usize) -> bool {
        self.edges[y * self.width + x]
    }

    /// Number of edge pixels.
    pub fn count(&self) -> usize {
        self.edges.iter().filter(|&&e| e).count()
    }

    /// Edge pixels as a fraction of all pixels.
    pub fn density(&self) -> f64 {
        if self.edges.is_empty() {
            0.0
        } else {
            self.count() as f64 / self.edges.len() as f64
        }
    }
}

/// Canny edge detection with `low`/`high` hysteresis thresholds on the L1
/// gradient magnitude.
pub fn canny(frame: &GrayImage, low: f32, high: f32) -> EdgeMap {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if width == 0 || height == 0 {
        return EdgeMap {
            width,
            height,
            edges: Vec::new(),
        };
    }

    let (gx, gy) = sobel_gradient(frame);
    let magnitude: Vec<f32> = gx
        .iter()
        .zip(gy.iter())
        .map(|(&dx, &dy)| dx.abs() + dy.abs())
        .collect();

    let mag_at = |x: isize, y: isize| -> f32 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0.0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    // Non-maximum suppression: keep ridge pixels above the low threshold
    let mut candidate = vec![false; width * height];
    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            let m = magnitude[idx];
            if m <= low {
                continue;
            }
            let (xi, yi) = (x as isize, y as isize);
            let ax = gx[idx].abs();
            let ay = gy[idx].abs();

            let (a, b) = if ay <= ax * TAN_22_5 {
                (mag_at(xi - 1, yi), mag_at(xi + 1, yi))
            } else if ay > ax * TAN_67_5 {
                (mag_at(xi, yi - 1), mag_at(xi, yi + 1))
            } else if gx[idx] * gy[idx] > 0.0 {
                (mag_at(xi - 1, yi - 1), mag_at(xi + 1, yi + 1))
            } else {
                (mag_at(xi + 1, yi - 1), mag_at(xi - 1, yi + 1))
            };

            if m > a && m >= b {
                candidate[idx] = true;
            }
        }
    }

    // Hysteresis: grow from strong pixels through 8-connected candidates
    let mut edges = vec![false; width * height];
    let mut stack: Vec<usize> = Vec::new();
    for idx in 0..width * height {
        if candidate[idx] && magnitude[idx] > high {
            edges[idx] = true;
            stack.push(idx);
        }
    }

    while let Some(idx) = stack.pop() {
        let x = idx % width;
        let y = idx / width;
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let n = ny * width + nx;
                if candidate[n] && !edges[n] {
                    edges[n] = true;
                    stack.push(n);
                }
            }
        }
    }

    EdgeMap {
        width,
        height,
        edges,
    }
}
