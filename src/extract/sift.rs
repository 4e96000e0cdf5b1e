use std::f32::consts::TAU;

use crate::extract::descriptor::sift_descriptor;
use crate::extract::{ensure_min_size, Extractor};
use crate::imaging::{downsample, gaussian_blur, Gradients};
use crate::*;

/// Blur already present in a decoded image.
const INPUT_SIGMA: f32 = 0.5;
/// Pixels closer than this to an octave border are never keypoints.
const BORDER: usize = 5;
const ORIENTATION_BINS: usize = 36;
const ORIENTATION_PEAK_RATIO: f32 = 0.8;
/// Orientation window sigma, in units of the keypoint scale.
const ORIENTATION_SIGMA: f32 = 1.5;
/// Spatial descriptor bin width, in units of the keypoint scale.
const DESCRIPTOR_BIN_SCALE: f32 = 3.;

/// Sparse SIFT: difference-of-Gaussians extrema with rotated descriptors.
///
/// Each octave holds `scales_per_octave + 3` Gaussian images; extrema of the
/// difference images are kept when their contrast exceeds
/// `contrast_threshold / scales_per_octave` and their principal curvature
/// ratio is below `edge_threshold`. One keypoint is emitted per dominant
/// gradient orientation. Locations are in input image pixels.
#[derive(Debug, Clone)]
pub struct DogSift {
    pub scales_per_octave: usize,
    pub sigma: f32,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
}

impl Default for DogSift {
    fn default() -> Self {
        Self {
            scales_per_octave: 3,
            sigma: 1.6,
            contrast_threshold: 0.04,
            edge_threshold: 10.,
        }
    }
}

struct Octave {
    width: usize,
    height: usize,
    gaussians: Vec<FImage>,
    dogs: Vec<Vec<f32>>,
}

impl Octave {
    #[inline]
    fn dog(&self, scale: usize, x: usize, y: usize) -> f32 {
        self.dogs[scale][y * self.width + x]
    }
}

impl DogSift {
    fn octave_count(&self, width: u32, height: u32) -> usize {
        let min_axis = width.min(height).max(1) as f32;
        (min_axis.log2() - 3.).floor().max(1.) as usize
    }

    fn build_octave(&self, base: FImage) -> Octave {
        let s = self.scales_per_octave as i32;
        let k = 2f32.powf(1. / s as f32);
        let mut gaussians = Vec::with_capacity(self.scales_per_octave + 3);
        gaussians.push(base);
        for i in 1..(s + 3) {
            let prev = self.sigma * k.powi(i - 1);
            let total = prev * k;
            let inc = (total * total - prev * prev).sqrt();
            let next = gaussian_blur(&gaussians[(i - 1) as usize], inc);
            gaussians.push(next);
        }
        let dogs = gaussians
            .windows(2)
            .map(|w| w[1].as_raw().iter().zip(w[0].as_raw()).map(|(a, b)| a - b).collect())
            .collect();
        Octave {
            width: gaussians[0].width() as usize,
            height: gaussians[0].height() as usize,
            gaussians,
            dogs,
        }
    }

    fn is_extremum(octave: &Octave, scale: usize, x: usize, y: usize) -> bool {
        let v = octave.dog(scale, x, y);
        let (mut is_max, mut is_min) = (true, true);
        for s in scale - 1..=scale + 1 {
            for ny in y - 1..=y + 1 {
                for nx in x - 1..=x + 1 {
                    if s == scale && nx == x && ny == y {
                        continue;
                    }
                    let n = octave.dog(s, nx, ny);
                    is_max &= v > n;
                    is_min &= v < n;
                    if !(is_max || is_min) {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Reject extrema lying on edges through the 2x2 Hessian curvature ratio.
    fn is_on_edge(&self, octave: &Octave, scale: usize, x: usize, y: usize) -> bool {
        let d = |x: usize, y: usize| octave.dog(scale, x, y);
        let v = d(x, y);
        let dxx = d(x + 1, y) + d(x - 1, y) - 2. * v;
        let dyy = d(x, y + 1) + d(x, y - 1) - 2. * v;
        let dxy = (d(x + 1, y + 1) - d(x + 1, y - 1) - d(x - 1, y + 1) + d(x - 1, y - 1)) / 4.;
        let trace = dxx + dyy;
        let det = dxx * dyy - dxy * dxy;
        let r = self.edge_threshold;
        det <= 0. || trace * trace * r >= (r + 1.) * (r + 1.) * det
    }

    /// Dominant gradient orientations around `(x, y)` in radians.
    fn orientations(gradients: &Gradients, x: usize, y: usize, scale: f32) -> Vec<f32> {
        let sigma = ORIENTATION_SIGMA * scale;
        let radius = (3. * sigma).round() as i64;
        let mut raw = [0f32; ORIENTATION_BINS];
        for dy in -radius..=radius {
            let py = y as i64 + dy;
            if py < 0 || py >= gradients.height as i64 {
                continue;
            }
            for dx in -radius..=radius {
                let px = x as i64 + dx;
                if px < 0 || px >= gradients.width as i64 {
                    continue;
                }
                let (m, o) = gradients.get(px as usize, py as usize);
                let w = (-((dx * dx + dy * dy) as f32) / (2. * sigma * sigma)).exp();
                let bin = ((o * ORIENTATION_BINS as f32 / TAU).round() as usize) % ORIENTATION_BINS;
                raw[bin] += w * m;
            }
        }

        // circular [1 4 6 4 1] / 16 smoothing
        let n = ORIENTATION_BINS;
        let hist: Vec<f32> = (0..n)
            .map(|i| {
                (raw[(i + n - 2) % n] + raw[(i + 2) % n]) / 16.
                    + (raw[(i + n - 1) % n] + raw[(i + 1) % n]) * 4. / 16.
                    + raw[i] * 6. / 16.
            })
            .collect();

        let max = hist.iter().copied().fold(0f32, f32::max);
        if max <= 0. {
            return vec![0.];
        }
        let peaks: Vec<f32> = (0..n)
            .filter_map(|k| {
                let (l, r) = (hist[(k + n - 1) % n], hist[(k + 1) % n]);
                if hist[k] > l && hist[k] > r && hist[k] >= ORIENTATION_PEAK_RATIO * max {
                    let offset = 0.5 * (l - r) / (l - 2. * hist[k] + r);
                    Some(((k as f32 + offset) * TAU / n as f32).rem_euclid(TAU))
                } else {
                    None
                }
            })
            .collect();
        if !peaks.is_empty() {
            return peaks;
        }
        // plateau: fall back to the first maximal bin
        let k = hist.iter().position(|&h| h == max).unwrap_or(0);
        vec![k as f32 * TAU / n as f32]
    }
}

impl Extractor for DogSift {
    fn name(&self) -> &str {
        "sift"
    }

    fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>> {
        ensure_min_size(image, 1, 1)?;
        let s = self.scales_per_octave.max(1);
        let k = 2f32.powf(1. / s as f32);
        let prefilter = 0.5 * self.contrast_threshold / s as f32;
        let contrast = self.contrast_threshold / s as f32;

        let initial = (self.sigma * self.sigma - INPUT_SIGMA * INPUT_SIGMA).max(0.).sqrt();
        let mut base = gaussian_blur(&image.pixels, initial);
        let mut features = Vec::new();

        for o in 0..self.octave_count(image.width(), image.height()) {
            let octave = self.build_octave(base);
            let factor = 2f32.powi(o as i32);
            if octave.width > 2 * BORDER && octave.height > 2 * BORDER {
                for scale in 1..=s {
                    let gradients = Gradients::new(&octave.gaussians[scale]);
                    let kp_scale = self.sigma * k.powi(scale as i32);
                    for y in BORDER..octave.height - BORDER {
                        for x in BORDER..octave.width - BORDER {
                            let v = octave.dog(scale, x, y);
                            if v.abs() <= prefilter || v.abs() < contrast {
                                continue;
                            }
                            if !Self::is_extremum(&octave, scale, x, y) || self.is_on_edge(&octave, scale, x, y) {
                                continue;
                            }
                            for angle in Self::orientations(&gradients, x, y, kp_scale) {
                                let (vector, _) = sift_descriptor(
                                    &gradients,
                                    x as f32,
                                    y as f32,
                                    DESCRIPTOR_BIN_SCALE * kp_scale,
                                    angle,
                                );
                                let location = Location::new(x as f32 * factor, y as f32 * factor);
                                features.push(LocalFeature::new(location, vector).with_strength(v.abs()));
                            }
                        }
                    }
                }
            }
            base = downsample(&octave.gaussians[s]);
        }
        log::trace!("{} sift keypoints in {}", features.len(), image.id);
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blob(side: u32, sigma: f32) -> ImageEntry {
        let c = side as f32 / 2.;
        ImageEntry::new(
            "blob",
            FImage::from_fn(side, side, |x, y| {
                let r2 = (x as f32 - c).powi(2) + (y as f32 - c).powi(2);
                Luma([(-r2 / (2. * sigma * sigma)).exp()])
            }),
        )
    }

    #[test]
    fn flat_image_has_no_keypoints() {
        let img = ImageEntry::new("flat", FImage::from_pixel(64, 64, Luma([0.3])));
        assert!(DogSift::default().extract(&img).unwrap().is_empty());
    }

    #[test]
    fn blob_is_detected_near_its_centre() {
        let features = DogSift::default().extract(&blob(64, 4.)).unwrap();
        assert!(!features.is_empty());
        for f in &features {
            assert_eq!(f.vector.len(), 128);
        }
        assert!(features
            .iter()
            .any(|f| (f.location.x - 32.).abs() <= 2. && (f.location.y - 32.).abs() <= 2.));
    }

    #[test]
    fn extraction_is_deterministic() {
        let img = blob(48, 3.);
        let sift = DogSift::default();
        assert_eq!(sift.extract(&img).unwrap(), sift.extract(&img).unwrap());
    }
}
