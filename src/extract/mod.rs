use crate::*;

/// Histogram-of-gradients descriptor shared by the SIFT style extractors.
pub mod descriptor;

/// Fixed grid of normalised, zero-meaned pixel patches.
pub mod grid;
pub use grid::GridPatchExtractor;

/// Dense and pyramid dense SIFT.
pub mod dsift;
pub use dsift::{DenseSift, PyramidDenseSift};

/// Difference-of-Gaussians keypoints with SIFT descriptors.
pub mod sift;
pub use sift::DogSift;

/// Fast-Hessian interest points with upright SURF descriptors.
pub mod surf;
pub use surf::UprightSurf;

/// Turns one image into a list of local features.
///
/// Implementations are deterministic for a given image and configuration and
/// never modify the image they are given.
pub trait Extractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>>;
}

/// Reject images with no pixels before any extractor touches them.
pub(crate) fn ensure_min_size(image: &ImageEntry, min_width: u32, min_height: u32) -> ClassifierResult<()> {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || w < min_width || h < min_height {
        return Err(ClassifierErr::ExtractionFailure {
            id: image.id.clone(),
            reason: format!(
                "image is {}x{}, need at least {}x{}",
                w,
                h,
                min_width.max(1),
                min_height.max(1)
            ),
        });
    }
    Ok(())
}

/// Keep features whose strength reaches `threshold`.
pub fn retain_strong(features: &[LocalFeature], threshold: f32) -> Vec<LocalFeature> {
    features
        .iter()
        .filter(|f| f.strength >= threshold)
        .cloned()
        .collect()
}
