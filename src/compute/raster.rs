//! Small statistics over grayscale rasters.

use image::GrayImage;

/// Mean and population standard deviation of the pixel intensities.
pub fn mean_std(frame: &GrayImage) -> (f64, f64) {
    mean_std_of(frame.as_raw().iter().map(|&p| p as f64))
}

/// Mean and population standard deviation of an arbitrary sample.
pub fn mean_std_of<I: IntoIterator<Item = f64>>(values: I) -> (f64, f64) {
    let mut n = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for v in values {
        n += 1;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let variance = (sum_sq / n as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

/// Mean intensity over a rectangular region `[x0, x1) x [y0, y1)`.
pub fn region_mean(frame: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for y in y0..y1 {
        for x in x0..x1 {
            sum += frame.get_pixel(x, y).0[0] as f64;
            count += 1;
        }
    }
    if count > 0 { sum / count as f64 } else { 0.0 }
}

/// Rescale intensities to `[0, 1]` by min/max. A flat frame maps to all zeros.
pub fn normalize_minmax(frame: &GrayImage) -> Vec<f32> {
    let raw = frame.as_raw();
    let (min, max) = raw
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    if raw.is_empty() || max == min {
        return vec![0.0; raw.len()];
    }
    let range = (max - min) as f32;
    raw.iter().map(|&p| (p - min) as f32 / range).collect()
}

/// Pixel intensities as `f32`.
pub fn to_f32(frame: &GrayImage) -> Vec<f32> {
    frame.as_raw().iter().map(|&p| p as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_mean_std_uniform() {
        let frame = GrayImage::from_pixel(8, 8, Luma([200]));
        let (mean, std) = mean_std(&frame);
        assert!((mean - 200.0).abs() < 1e-9);
        assert!(std.abs() < 1e-9);
    }

    #[test]
    fn test_mean_std_two_levels() {
        let frame = GrayImage::from_fn(4, 1, |x, _| Luma([if x < 2 { 0 } else { 100 }]));
        let (mean, std) = mean_std(&frame);
        assert!((mean - 50.0).abs() < 1e-9);
        assert!((std - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_flat_frame() {
        let frame = GrayImage::from_pixel(3, 3, Luma([17]));
        assert!(normalize_minmax(&frame).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalize_range() {
        let frame = GrayImage::from_fn(3, 1, |x, _| Luma([10 + 20 * x as u8]));
        assert_eq!(normalize_minmax(&frame), vec![0.0, 0.5, 1.0]);
    }
}
