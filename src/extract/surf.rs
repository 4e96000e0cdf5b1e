use std::f32::consts::PI;

use crate::extract::{ensure_min_size, Extractor};
use crate::feature::l2_normalise;
use crate::imaging::IntegralImage;
use crate::*;

const LAYERS: usize = 4;
const DESCRIPTOR_SIZE: usize = 64;

/// Upright SURF: fast-Hessian interest points with 64-d Haar descriptors.
///
/// Box-filter Hessian determinants are evaluated on an integral image for
/// `octaves` octaves of four filter sizes each (9, 15, 21, 27 for the first
/// octave, doubling the size increment per octave). Points are kept when
/// their response exceeds `threshold` and beats all 26 neighbours in the two
/// middle layers of an octave. Descriptors are not rotated.
#[derive(Debug, Clone)]
pub struct UprightSurf {
    pub octaves: usize,
    pub init_sample: usize,
    pub threshold: f32,
}

impl Default for UprightSurf {
    fn default() -> Self {
        Self {
            octaves: 3,
            init_sample: 2,
            threshold: 0.0004,
        }
    }
}

struct ResponseLayer {
    filter: i64,
    step: usize,
    width: usize,
    height: usize,
    responses: Vec<f32>,
}

impl ResponseLayer {
    fn build(ii: &IntegralImage, filter: i64, step: usize) -> Self {
        let width = ii.width() / step;
        let height = ii.height() / step;
        let b = (filter - 1) / 2;
        let l = filter / 3;
        let inv_area = 1. / (filter * filter) as f32;
        let mut responses = vec![0.; width * height];
        for j in 0..height {
            for i in 0..width {
                let (r, c) = ((j * step) as i64, (i * step) as i64);
                let bx = |row: i64, col: i64, rows: i64, cols: i64| ii.box_sum(col, row, cols, rows);
                let dxx = bx(r - l + 1, c - b, 2 * l - 1, filter) - bx(r - l + 1, c - l / 2, 2 * l - 1, l) * 3.;
                let dyy = bx(r - b, c - l + 1, filter, 2 * l - 1) - bx(r - l / 2, c - l + 1, l, 2 * l - 1) * 3.;
                let dxy = bx(r - l, c + 1, l, l) + bx(r + 1, c - l, l, l) - bx(r - l, c - l, l, l) - bx(r + 1, c + 1, l, l);
                let (dxx, dyy, dxy) = (dxx * inv_area, dyy * inv_area, dxy * inv_area);
                responses[j * width + i] = dxx * dyy - 0.81 * dxy * dxy;
            }
        }
        Self {
            filter,
            step,
            width,
            height,
            responses,
        }
    }

    #[inline]
    fn at(&self, i: usize, j: usize) -> f32 {
        self.responses[j * self.width + i]
    }
}

fn haar_x(ii: &IntegralImage, row: i64, col: i64, s: i64) -> f32 {
    ii.box_sum(col, row - s / 2, s / 2, s) - ii.box_sum(col - s / 2, row - s / 2, s / 2, s)
}

fn haar_y(ii: &IntegralImage, row: i64, col: i64, s: i64) -> f32 {
    ii.box_sum(col - s / 2, row, s, s / 2) - ii.box_sum(col - s / 2, row - s / 2, s, s / 2)
}

fn gaussian(x: f32, y: f32, sigma: f32) -> f32 {
    (-(x * x + y * y) / (2. * sigma * sigma)).exp() / (2. * PI * sigma * sigma)
}

impl UprightSurf {
    fn detect(&self, ii: &IntegralImage) -> Vec<(f32, f32, f32, f32)> {
        let mut points = Vec::new();
        for o in 0..self.octaves {
            let step = self.init_sample.max(1) << o;
            let increment = 6i64 << o;
            let layers: Vec<ResponseLayer> = (0..LAYERS)
                .map(|l| {
                    let filter = 3 * ((2i64 << o) * (l as i64 + 1) + 1);
                    ResponseLayer::build(ii, filter, step)
                })
                .collect();
            debug_assert_eq!(layers[1].filter - layers[0].filter, increment);

            let (width, height) = (layers[0].width, layers[0].height);
            let border = ((layers[LAYERS - 1].filter / 2) as usize / step) + 1;
            if width <= 2 * border || height <= 2 * border {
                continue;
            }
            for m in 1..LAYERS - 1 {
                for j in border..height - border {
                    for i in border..width - border {
                        let v = layers[m].at(i, j);
                        if v <= self.threshold {
                            continue;
                        }
                        let is_max = (m - 1..=m + 1).all(|n| {
                            (j - 1..=j + 1).all(|y| {
                                (i - 1..=i + 1).all(|x| (n == m && x == i && y == j) || layers[n].at(x, y) < v)
                            })
                        });
                        if is_max {
                            let scale = 1.2 * layers[m].filter as f32 / 9.;
                            let (x, y) = ((i * layers[m].step) as f32, (j * layers[m].step) as f32);
                            points.push((x, y, scale, v));
                        }
                    }
                }
            }
        }
        points
    }

    fn describe(ii: &IntegralImage, x: f32, y: f32, scale: f32) -> FeatureVector {
        let mut desc = Vec::with_capacity(DESCRIPTOR_SIZE);
        let haar_size = 2 * scale.round().max(1.) as i64;
        let mut cx = -0.5f32;
        let mut i = -8i64;
        while i < 12 {
            let mut j = -8i64;
            i -= 4;
            cx += 1.;
            let mut cy = -0.5f32;
            while j < 12 {
                let (mut dx, mut dy, mut mdx, mut mdy) = (0f32, 0f32, 0f32, 0f32);
                cy += 1.;
                j -= 4;
                let xs = (x + (i + 5) as f32 * scale).round();
                let ys = (y + (j + 5) as f32 * scale).round();
                for k in i..i + 9 {
                    for l in j..j + 9 {
                        let sample_x = (x + k as f32 * scale).round();
                        let sample_y = (y + l as f32 * scale).round();
                        let g = gaussian(xs - sample_x, ys - sample_y, 2.5 * scale);
                        let rx = g * haar_x(ii, sample_y as i64, sample_x as i64, haar_size);
                        let ry = g * haar_y(ii, sample_y as i64, sample_x as i64, haar_size);
                        dx += rx;
                        dy += ry;
                        mdx += rx.abs();
                        mdy += ry.abs();
                    }
                }
                let g = gaussian(cx - 2., cy - 2., 1.5);
                desc.extend_from_slice(&[dx * g, dy * g, mdx * g, mdy * g]);
                j += 9;
            }
            i += 9;
        }
        l2_normalise(&mut desc);
        FeatureVector::new(desc)
    }
}

impl Extractor for UprightSurf {
    fn name(&self) -> &str {
        "surf"
    }

    fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>> {
        ensure_min_size(image, 1, 1)?;
        let ii = IntegralImage::new(&image.pixels);
        let features = self
            .detect(&ii)
            .into_iter()
            .map(|(x, y, scale, response)| {
                LocalFeature::new(Location::new(x, y), Self::describe(&ii, x, y, scale)).with_strength(response)
            })
            .collect::<Vec<_>>();
        log::trace!("{} surf points in {}", features.len(), image.id);
        Ok(features)
    }
}
