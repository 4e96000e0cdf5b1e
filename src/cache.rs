use parking_lot::RwLock;
use rayon::prelude::*;
use std::{collections::HashMap, fmt, sync::Arc};

use crate::*;

pub type FeatureList = Arc<Vec<LocalFeature>>;

/// Memoizes an extractor's output per image identifier.
///
/// Entries are keyed by [`ImageId`], so two pixel-identical images with
/// different ids are extracted separately and one id always maps to the
/// first list extracted for it until [`FeatureCache::reset`] is called.
///
/// Only images passed to [`FeatureCache::features`] or [`FeatureCache::fill`]
/// are stored. Query images go through [`FeatureCache::peek_or_extract`], so
/// the cache holds one training set at a time however many images are
/// classified afterwards.
pub struct FeatureCache {
    extractor: Arc<dyn Extractor>,
    entries: RwLock<HashMap<ImageId, FeatureList>>,
}

impl FeatureCache {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn extractor(&self) -> &dyn Extractor {
        self.extractor.as_ref()
    }

    /// Features of `image`, extracted on first request.
    pub fn features(&self, image: &ImageEntry) -> ClassifierResult<FeatureList> {
        if let Some(cached) = self.entries.read().get(&image.id) {
            return Ok(cached.clone());
        }
        let features = Arc::new(self.extractor.extract(image)?);
        let mut entries = self.entries.write();
        // another thread may have won the race; keep its list
        Ok(entries.entry(image.id.clone()).or_insert(features).clone())
    }

    /// Cached features of `image`, or a fresh extraction that is not stored.
    pub fn peek_or_extract(&self, image: &ImageEntry) -> ClassifierResult<FeatureList> {
        if let Some(cached) = self.entries.read().get(&image.id) {
            return Ok(cached.clone());
        }
        Ok(Arc::new(self.extractor.extract(image)?))
    }

    /// Extract every uncached image in parallel, then merge the results
    /// under a single write lock. Results come back in input order.
    pub fn fill(&self, images: &[&ImageEntry]) -> Vec<ClassifierResult<FeatureList>> {
        let extracted: Vec<(usize, ClassifierResult<FeatureList>)> = {
            let entries = self.entries.read();
            images
                .par_iter()
                .enumerate()
                .map(|(i, image)| match entries.get(&image.id) {
                    Some(cached) => (i, Ok(cached.clone())),
                    None => (i, self.extractor.extract(image).map(Arc::new)),
                })
                .collect()
        };

        let mut entries = self.entries.write();
        extracted
            .into_iter()
            .map(|(i, result)| {
                result.map(|features| {
                    entries
                        .entry(images[i].id.clone())
                        .or_insert(features)
                        .clone()
                })
            })
            .collect()
    }

    /// Forget everything extracted so far.
    pub fn reset(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for FeatureCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureCache")
            .field("extractor", &self.extractor.name())
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Extractor for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn extract(&self, image: &ImageEntry) -> ClassifierResult<Vec<LocalFeature>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let v = image.pixels.get_pixel(0, 0)[0];
            Ok(vec![LocalFeature::new(Location::default(), FeatureVector::new(vec![v]))])
        }
    }

    fn entry(id: &str, v: f32) -> ImageEntry {
        ImageEntry::new(id, FImage::from_pixel(2, 2, Luma([v])))
    }

    #[test]
    fn extracts_once_per_id() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = FeatureCache::new(counter.clone());
        let a = entry("a", 0.1);
        let first = cache.features(&a).unwrap();
        let second = cache.features(&a).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identical_pixels_with_different_ids_are_separate() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = FeatureCache::new(counter.clone());
        cache.features(&entry("a", 0.5)).unwrap();
        cache.features(&entry("b", 0.5)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn peeking_never_grows_the_cache() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = FeatureCache::new(counter.clone());
        let trained = entry("train", 0.2);
        let stored = cache.features(&trained).unwrap();
        assert!(Arc::ptr_eq(&stored, &cache.peek_or_extract(&trained).unwrap()));

        for i in 0..5 {
            cache.peek_or_extract(&entry(&format!("query{}", i), 0.7)).unwrap();
        }
        assert_eq!(cache.len(), 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn parallel_fill_then_reset() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let cache = FeatureCache::new(counter.clone());
        let images: Vec<ImageEntry> = (0..32).map(|i| entry(&format!("img{}", i), i as f32 / 32.)).collect();
        let refs: Vec<&ImageEntry> = images.iter().collect();

        let results = cache.fill(&refs);
        assert_eq!(results.len(), 32);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.as_ref().unwrap()[0].vector[0], i as f32 / 32.);
        }
        cache.fill(&refs);
        assert_eq!(counter.0.load(Ordering::SeqCst), 32);

        cache.reset();
        assert!(cache.is_empty());
        cache.features(&images[3]).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 33);
    }
}
