use image::imageops::{self, FilterType};
use image::Luma;
use std::{path::Path, sync::Arc};

use crate::*;

/// An image together with the identifier used to cache its features.
#[derive(Debug, Clone)]
pub struct ImageEntry {
    pub id: ImageId,
    pub pixels: Arc<FImage>,
}

impl ImageEntry {
    pub fn new<S: Into<ImageId>>(id: S, pixels: FImage) -> Self {
        Self {
            id: id.into(),
            pixels: Arc::new(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Training unit: an image and its class name.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub image: ImageEntry,
    pub label: String,
}

impl LabeledImage {
    pub fn new<S: Into<String>>(image: ImageEntry, label: S) -> Self {
        Self {
            image,
            label: label.into(),
        }
    }
}

/// Decode an image file into a grey-level float image.
pub fn load_image<P: AsRef<Path>>(path: P) -> ClassifierResult<FImage> {
    Ok(image::open(path)?.to_luma32f())
}

/// Copy a `width x height` window whose top-left corner is at `(x, y)`.
/// Pixels falling outside the source are zero.
pub fn extract_roi(image: &FImage, x: i64, y: i64, width: u32, height: u32) -> FImage {
    let (w, h) = (image.width() as i64, image.height() as i64);
    FImage::from_fn(width, height, |dx, dy| {
        let (sx, sy) = (x + dx as i64, y + dy as i64);
        if sx >= 0 && sy >= 0 && sx < w && sy < h {
            *image.get_pixel(sx as u32, sy as u32)
        } else {
            Luma([0.])
        }
    })
}

/// Centred `side x side` crop.
pub fn extract_center(image: &FImage, side: u32) -> FImage {
    let x = (image.width() as i64 - side as i64) / 2;
    let y = (image.height() as i64 - side as i64) / 2;
    extract_roi(image, x, y, side, side)
}

pub fn resize(image: &FImage, width: u32, height: u32) -> FImage {
    imageops::resize(image, width, height, FilterType::Triangle)
}

pub fn gaussian_blur(image: &FImage, sigma: f32) -> FImage {
    if sigma <= 0. {
        return image.clone();
    }
    imageops::blur(image, sigma)
}

/// Halve the resolution by dropping every other row and column.
pub fn downsample(image: &FImage) -> FImage {
    let (w, h) = ((image.width() / 2).max(1), (image.height() / 2).max(1));
    FImage::from_fn(w, h, |x, y| {
        *image.get_pixel((2 * x).min(image.width() - 1), (2 * y).min(image.height() - 1))
    })
}

/// Row-major pixel values.
pub fn pixel_vector(image: &FImage) -> FeatureVector {
    FeatureVector::new(image.as_raw().clone())
}

/// Gradient magnitude and orientation (radians in `[0, 2pi)`) of every pixel,
/// from central differences with clamped borders.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub width: usize,
    pub height: usize,
    pub magnitude: Vec<f32>,
    pub orientation: Vec<f32>,
}

impl Gradients {
    pub fn new(image: &FImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let raw = image.as_raw();
        let at = |x: usize, y: usize| raw[y * width + x];
        let mut magnitude = vec![0.; width * height];
        let mut orientation = vec![0.; width * height];
        for y in 0..height {
            for x in 0..width {
                let dx = at((x + 1).min(width - 1), y) - at(x.saturating_sub(1), y);
                let dy = at(x, (y + 1).min(height - 1)) - at(x, y.saturating_sub(1));
                let i = y * width + x;
                magnitude[i] = (dx * dx + dy * dy).sqrt() * 0.5;
                orientation[i] = dy.atan2(dx).rem_euclid(std::f32::consts::TAU);
            }
        }
        Self {
            width,
            height,
            magnitude,
            orientation,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> (f32, f32) {
        let i = y * self.width + x;
        (self.magnitude[i], self.orientation[i])
    }
}

/// Summed-area table with a zero first row and column.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    width: usize,
    height: usize,
    sums: Vec<f64>,
}

impl IntegralImage {
    pub fn new(image: &FImage) -> Self {
        let (width, height) = (image.width() as usize, image.height() as usize);
        let stride = width + 1;
        let mut sums = vec![0.; stride * (height + 1)];
        let raw = image.as_raw();
        for y in 0..height {
            let mut row = 0.;
            for x in 0..width {
                row += raw[y * width + x] as f64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self {
            width,
            height,
            sums,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum over the `w x h` box at `(x, y)`, clipped to the image.
    pub fn box_sum(&self, x: i64, y: i64, w: i64, h: i64) -> f32 {
        let clamp = |v: i64, hi: usize| v.max(0).min(hi as i64) as usize;
        let (x0, y0) = (clamp(x, self.width), clamp(y, self.height));
        let (x1, y1) = (clamp(x + w, self.width), clamp(y + h, self.height));
        if x1 <= x0 || y1 <= y0 {
            return 0.;
        }
        let stride = self.width + 1;
        let s = |x: usize, y: usize| self.sums[y * stride + x];
        (s(x1, y1) - s(x0, y1) - s(x1, y0) + s(x0, y0)) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: u32, h: u32) -> FImage {
        FImage::from_fn(w, h, |x, y| Luma([(x + y * w) as f32]))
    }

    #[test]
    fn roi_pads_outside_with_zero() {
        let img = ramp(3, 3);
        let roi = extract_roi(&img, 1, 1, 3, 3);
        assert_eq!(roi.get_pixel(0, 0)[0], 4.);
        assert_eq!(roi.get_pixel(1, 1)[0], 8.);
        assert_eq!(roi.get_pixel(2, 2)[0], 0.);
    }

    #[test]
    fn center_crop_of_wide_image() {
        let img = ramp(6, 2);
        let c = extract_center(&img, 2);
        assert_eq!(c.get_pixel(0, 0)[0], 2.);
        assert_eq!(c.get_pixel(1, 1)[0], 9.);
    }

    #[test]
    fn integral_box_sums_match_direct_sum() {
        let img = ramp(5, 4);
        let ii = IntegralImage::new(&img);
        let direct: f32 = (1..4)
            .flat_map(|y| (2..5).map(move |x| (x + y * 5) as f32))
            .sum();
        assert_eq!(ii.box_sum(2, 1, 3, 3), direct);
        assert_eq!(ii.box_sum(-10, -10, 5, 5), 0.);
    }

    #[test]
    fn gradient_of_horizontal_ramp_points_right() {
        let img = FImage::from_fn(5, 5, |x, _| Luma([x as f32]));
        let g = Gradients::new(&img);
        let (m, o) = g.get(2, 2);
        assert!((m - 1.).abs() < 1e-6);
        assert!(o.abs() < 1e-6);
    }
}
