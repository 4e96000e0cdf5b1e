use crate::extract::descriptor::sift_descriptor;
use crate::extract::{ensure_min_size, retain_strong, Extractor};
use crate::imaging::{gaussian_blur, Gradients};
use crate::*;

/// Upright SIFT descriptors sampled on a regular grid.
///
/// Each descriptor covers `4 * bin_size` pixels per side and consecutive
/// descriptor windows are `step` pixels apart. The feature strength is the
/// descriptor energy, so low contrast regions can be dropped afterwards with
/// [`retain_strong`].
#[derive(Debug, Clone)]
pub struct DenseSift {
    pub step: u32,
    pub bin_size: u32,
}

impl DenseSift {
    pub fn new(step: u32, bin_size: u32) -> Self {
        Self {
            step: step.max(1),
            bin_size: bin_size.max(1),
        }
    }

    /// Descriptors for every grid position whose window fits the image.
    pub fn analyse(&self, gradients: &Gradients) -> Vec<LocalFeature> {
        let support = (4 * self.bin_size) as usize;
        if gradients.width < support || gradients.height < support {
            return Vec::new();
        }
        let centre = (support as f32 - 1.) / 2.;
        let mut features = Vec::new();
        for y0 in (0..=gradients.height - support).step_by(self.step as usize) {
            for x0 in (0..=gradients.width - support).step_by(self.step as usize) {
                let (cx, cy) = (x0 as f32 + centre, y0 as f32 + centre);
                let (vector, energy) = sift_descriptor(gradients, cx, cy, self.bin_size as f32, 0.);
                features.push(LocalFeature::new(Location::new(cx, cy), vector).with_strength(energy));
            }
        }
        features
    }
}

impl Extractor for DenseSift {
    fn name(&self) -> &str {
        "dsift"
    }

    fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>> {
        ensure_min_size(image, 1, 1)?;
        Ok(self.analyse(&Gradients::new(&image.pixels)))
    }
}

/// Dense SIFT repeated over several bin sizes.
///
/// For each size the image is smoothed with `sigma = size / magnification`
/// before the gradients are taken, so coarser grids see proportionally
/// smoother images.
#[derive(Debug, Clone)]
pub struct PyramidDenseSift {
    step: u32,
    magnification: f32,
    sizes: Vec<u32>,
}

impl PyramidDenseSift {
    pub fn new(step: u32, magnification: f32, sizes: Vec<u32>) -> Self {
        Self {
            step: step.max(1),
            magnification: if magnification > 0. { magnification } else { 1. },
            sizes,
        }
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    /// All pyramid features with energy at least `threshold`.
    pub fn keypoints(&self, image: &ImageEntry, threshold: f32) -> ClassifierResult<Vec<LocalFeature>> {
        Ok(retain_strong(&self.extract(image)?, threshold))
    }
}

impl Default for PyramidDenseSift {
    fn default() -> Self {
        Self::new(5, 6., vec![7])
    }
}

impl Extractor for PyramidDenseSift {
    fn name(&self) -> &str {
        "pyramid-dsift"
    }

    fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>> {
        ensure_min_size(image, 1, 1)?;
        let mut features = Vec::new();
        for &size in &self.sizes {
            let smoothed = gaussian_blur(&image.pixels, size as f32 / self.magnification);
            let dsift = DenseSift::new(self.step, size);
            features.extend(dsift.analyse(&Gradients::new(&smoothed)));
        }
        Ok(features)
    }
}
