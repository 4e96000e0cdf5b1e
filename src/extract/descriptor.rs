use std::f32::consts::{SQRT_2, TAU};

use crate::feature::l2_normalise;
use crate::imaging::Gradients;
use crate::FeatureVector;

const SPATIAL_BINS: usize = 4;
const ORIENTATION_BINS: usize = 8;
const MAGNITUDE_CLAMP: f32 = 0.2;

pub const DESCRIPTOR_SIZE: usize = SPATIAL_BINS * SPATIAL_BINS * ORIENTATION_BINS;

/// Compute a 4x4x8 gradient orientation histogram centred on `(cx, cy)`.
///
/// `bin_size` is the side of one spatial bin in pixels and `angle` the
/// reference orientation the samples are rotated into. Every sample is
/// spread over neighbouring spatial and orientation bins with trilinear
/// weights and a Gaussian window of half the descriptor width.
///
/// Returns the normalised descriptor together with its energy, the mean
/// window-weighted gradient magnitude over the support. A flat region has
/// zero energy and a zero descriptor.
pub fn sift_descriptor(
    gradients: &Gradients,
    cx: f32,
    cy: f32,
    bin_size: f32,
    angle: f32,
) -> (FeatureVector, f32) {
    let mut hist = vec![0f32; DESCRIPTOR_SIZE];
    let (cos, sin) = (angle.cos(), angle.sin());
    let half_bins = SPATIAL_BINS as f32 / 2.;
    let radius = (bin_size * half_bins * SQRT_2).ceil() as i64 + 1;
    let window = 2. * half_bins * half_bins;
    let (ix, iy) = (cx.round() as i64, cy.round() as i64);

    let mut energy = 0f32;
    let mut samples = 0usize;
    for py in (iy - radius)..=(iy + radius) {
        if py < 0 || py >= gradients.height as i64 {
            continue;
        }
        for px in (ix - radius)..=(ix + radius) {
            if px < 0 || px >= gradients.width as i64 {
                continue;
            }
            let (ox, oy) = (px as f32 - cx, py as f32 - cy);
            let rx = (cos * ox + sin * oy) / bin_size;
            let ry = (-sin * ox + cos * oy) / bin_size;
            let cbin = rx + half_bins - 0.5;
            let rbin = ry + half_bins - 0.5;
            if cbin <= -1. || rbin <= -1. || cbin >= SPATIAL_BINS as f32 || rbin >= SPATIAL_BINS as f32 {
                continue;
            }

            let (magnitude, orientation) = gradients.get(px as usize, py as usize);
            let weighted = magnitude * (-(rx * rx + ry * ry) / window).exp();
            energy += weighted;
            samples += 1;
            if weighted == 0. {
                continue;
            }

            let obin = (orientation - angle).rem_euclid(TAU) * ORIENTATION_BINS as f32 / TAU;
            let (r0, c0, o0) = (rbin.floor(), cbin.floor(), obin.floor());
            let (fr, fc, fo) = (rbin - r0, cbin - c0, obin - o0);
            for (r, wr) in [(r0 as i64, 1. - fr), (r0 as i64 + 1, fr)] {
                if r < 0 || r >= SPATIAL_BINS as i64 {
                    continue;
                }
                for (c, wc) in [(c0 as i64, 1. - fc), (c0 as i64 + 1, fc)] {
                    if c < 0 || c >= SPATIAL_BINS as i64 {
                        continue;
                    }
                    for (o, wo) in [(o0 as i64, 1. - fo), (o0 as i64 + 1, fo)] {
                        let o = o.rem_euclid(ORIENTATION_BINS as i64) as usize;
                        let idx = ((r as usize * SPATIAL_BINS) + c as usize) * ORIENTATION_BINS + o;
                        hist[idx] += weighted * wr * wc * wo;
                    }
                }
            }
        }
    }

    l2_normalise(&mut hist);
    for v in hist.iter_mut() {
        *v = v.min(MAGNITUDE_CLAMP);
    }
    l2_normalise(&mut hist);

    let energy = if samples > 0 { energy / samples as f32 } else { 0. };
    (FeatureVector::new(hist), energy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FImage;
    use image::Luma;

    #[test]
    fn flat_region_has_no_energy() {
        let img = FImage::from_pixel(32, 32, Luma([0.5]));
        let g = Gradients::new(&img);
        let (d, e) = sift_descriptor(&g, 16., 16., 4., 0.);
        assert_eq!(d.len(), DESCRIPTOR_SIZE);
        assert_eq!(e, 0.);
        assert!(d.iter().all(|&v| v == 0.));
    }

    #[test]
    fn textured_region_gives_unit_descriptor() {
        let img = FImage::from_fn(32, 32, |x, y| Luma([((x * 7 + y * 3) % 5) as f32 / 4.]));
        let g = Gradients::new(&img);
        let (d, e) = sift_descriptor(&g, 16., 16., 3., 0.3);
        assert!(e > 0.);
        let norm: f32 = d.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.).abs() < 1e-4);
        assert!(d.iter().all(|&v| v >= 0.));
    }
}
