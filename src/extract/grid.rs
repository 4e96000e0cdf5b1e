use crate::extract::{ensure_min_size, Extractor};
use crate::imaging::{extract_roi, pixel_vector};
use crate::*;

/// Overlapping square patches on a regular grid.
///
/// The grid step is half the patch size. The image is first cropped to
/// `(stride * patches_x + 1, stride * patches_y + 1)` where
/// `patches_x = width / stride - 1`; pixels to the right and below that
/// window are discarded. One patch is read at every grid step of the
/// cropped image, so a `(stride * n + 1)` square yields `n * n` patches.
/// Parts of a patch that fall outside the cropped window read as zero.
#[derive(Debug, Clone)]
pub struct GridPatchExtractor {
    patch_size: u32,
}

impl GridPatchExtractor {
    pub fn new(patch_size: u32) -> Self {
        Self {
            patch_size: patch_size.max(1),
        }
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn stride(&self) -> u32 {
        (self.patch_size / 2).max(1)
    }
}

impl Default for GridPatchExtractor {
    fn default() -> Self {
        Self::new(8)
    }
}

impl Extractor for GridPatchExtractor {
    fn name(&self) -> &str {
        "patches"
    }

    fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>> {
        let stride = self.stride();
        ensure_min_size(image, stride, stride)?;

        let patches_x = image.width() / stride - 1;
        let patches_y = image.height() / stride - 1;
        let crop = extract_roi(&image.pixels, 0, 0, stride * patches_x + 1, stride * patches_y + 1);

        let mut patches = Vec::with_capacity(((patches_x + 1) * (patches_y + 1)) as usize);
        for y in (0..crop.height()).step_by(stride as usize) {
            for x in (0..crop.width()).step_by(stride as usize) {
                let patch = extract_roi(&crop, x as i64, y as i64, self.patch_size, self.patch_size);
                let vector = pixel_vector(&patch).normalised().zero_meaned();
                patches.push(LocalFeature::new(Location::new(x as f32, y as f32), vector));
            }
        }
        Ok(patches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::Luma;

    fn noise(w: u32, h: u32) -> ImageEntry {
        ImageEntry::new(
            "noise",
            FImage::from_fn(w, h, |x, y| Luma([((x * 31 + y * 17) % 13) as f32 / 12.])),
        )
    }

    #[test]
    fn yields_n_squared_zero_meaned_patches() {
        let extractor = GridPatchExtractor::new(8);
        for n in 1..6 {
            let side = extractor.stride() * n + 1;
            let patches = extractor.extract(&noise(side, side)).unwrap();
            assert_eq!(patches.len(), (n * n) as usize);
            for p in &patches {
                assert_eq!(p.vector.len(), 64);
                assert_abs_diff_eq!(p.vector.mean(), 0., epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn locations_are_top_left_grid_corners() {
        let patches = GridPatchExtractor::new(8).extract(&noise(13, 9)).unwrap();
        let locs: Vec<_> = patches.iter().map(|p| (p.location.x, p.location.y)).collect();
        assert_eq!(
            locs,
            vec![(0., 0.), (4., 0.), (8., 0.), (0., 4.), (4., 4.), (8., 4.)]
        );
    }

    #[test]
    fn trailing_pixels_are_discarded() {
        let extractor = GridPatchExtractor::new(8);
        let a = extractor.extract(&noise(14, 14)).unwrap();
        let b = extractor.extract(&noise(13, 13)).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn too_small_image_fails() {
        let err = GridPatchExtractor::new(8).extract(&noise(3, 20)).unwrap_err();
        assert!(err.is_per_image());
    }
}
