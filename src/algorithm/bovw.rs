use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::algorithm::{check_trainable, ClassificationAlgorithm, ClassificationResult, Snapshot};
use crate::bow::{BlockSpatialAggregator, HistogramTransform};
use crate::cache::FeatureList;
use crate::cluster::{Clusterer, KMeans};
use crate::extract::{retain_strong, DogSift, GridPatchExtractor, PyramidDenseSift, UprightSurf};
use crate::linear::{LinearModel, LinearSvm, LinearTrainer};
use crate::*;

/// How an image's features become one histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    /// One histogram over the whole image.
    Global,
    /// One histogram per spatial block, concatenated.
    Blocks(BlockSpatialAggregator),
}

struct TrainedBovw {
    bow: BagOfVisualWords,
    model: LinearModel,
}

/// Extractor, codebook and linear SVM composed into one classifier.
///
/// Training learns a codebook of `codebook_size` words with the configured
/// [`Clusterer`] from the features of (a per-class sample of) the training
/// images, encodes every training image as a transformed word histogram and
/// fits the [`LinearTrainer`] on those. Features are cached per image id for
/// the lifetime of one training session.
pub struct BagOfWordsClassifier {
    name: String,
    cache: FeatureCache,
    codebook_size: usize,
    samples_per_class: Option<usize>,
    vocabulary_threshold: Option<f32>,
    histogram_threshold: Option<f32>,
    aggregation: Aggregation,
    transform: HistogramTransform,
    best_only: bool,
    seed: u64,
    clusterer: Box<dyn Clusterer>,
    trainer: Box<dyn LinearTrainer>,
    trained: Snapshot<TrainedBovw>,
}

impl BagOfWordsClassifier {
    /// Global histogram of raw counts, k-means codebook and default SVM.
    pub fn new<S: Into<String>>(name: S, extractor: Arc<dyn Extractor>, codebook_size: usize) -> Self {
        Self {
            name: name.into(),
            cache: FeatureCache::new(extractor),
            codebook_size,
            samples_per_class: None,
            vocabulary_threshold: None,
            histogram_threshold: None,
            aggregation: Aggregation::Global,
            transform: HistogramTransform::Counts,
            best_only: true,
            seed: 0,
            clusterer: Box::new(KMeans::default()),
            trainer: Box::new(LinearSvm::default()),
            trained: Snapshot::default(),
        }
    }

    pub fn with_samples_per_class(mut self, samples: Option<usize>) -> Self {
        self.samples_per_class = samples;
        self
    }

    /// Minimum feature strengths for the codebook pass and the histogram pass.
    pub fn with_thresholds(mut self, vocabulary: Option<f32>, histogram: Option<f32>) -> Self {
        self.vocabulary_threshold = vocabulary;
        self.histogram_threshold = histogram;
        self
    }

    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }

    pub fn with_transform(mut self, transform: HistogramTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Report only the best scoring class instead of every class score.
    pub fn with_best_only(mut self, best_only: bool) -> Self {
        self.best_only = best_only;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_clusterer(mut self, clusterer: Box<dyn Clusterer>) -> Self {
        self.clusterer = clusterer;
        self
    }

    pub fn with_trainer(mut self, trainer: Box<dyn LinearTrainer>) -> Self {
        self.trainer = trainer;
        self
    }

    fn engines(self, config: &BenchConfig) -> Self {
        self.with_seed(config.seed)
            .with_clusterer(Box::new(KMeans::new(config.kmeans.max_iterations, config.seed)))
            .with_trainer(Box::new(LinearSvm {
                c: config.svm.c,
                eps: config.svm.eps,
                max_iterations: config.svm.max_iterations,
                seed: config.seed,
            }))
    }

    /// Normalised, zero-meaned pixel patches.
    pub fn patches(config: &BenchConfig) -> Self {
        let c = &config.patches;
        Self::new("BoVW", Arc::new(GridPatchExtractor::new(c.patch_size)), c.codebook_size)
            .with_samples_per_class(c.codebook_samples_per_class)
            .engines(config)
    }

    /// Difference-of-Gaussians SIFT keypoints.
    pub fn sift(config: &BenchConfig) -> Self {
        let c = &config.sift;
        let sift = DogSift {
            scales_per_octave: c.scales_per_octave,
            sigma: c.sigma,
            contrast_threshold: c.contrast_threshold,
            edge_threshold: c.edge_threshold,
        };
        Self::new("SIFTBoVW", Arc::new(sift), c.codebook_size)
            .with_samples_per_class(c.codebook_samples_per_class)
            .engines(config)
    }

    /// Upright SURF points, L2 normalised histograms through a chi-squared map.
    pub fn surf(config: &BenchConfig) -> Self {
        let c = &config.surf;
        let surf = UprightSurf {
            octaves: c.octaves,
            init_sample: c.init_sample,
            threshold: c.threshold,
        };
        Self::new("SURFBoVW", Arc::new(surf), c.codebook_size)
            .with_samples_per_class(c.codebook_samples_per_class)
            .with_transform(HistogramTransform::L2ThenChi2Map)
            .engines(config)
    }

    /// Pyramid dense SIFT with spatial blocks.
    ///
    /// The codebook is learnt from features above the looser vocabulary
    /// threshold while histograms only count features above the stricter
    /// histogram threshold.
    pub fn pyramid(config: &BenchConfig) -> Self {
        let c = &config.pyramid;
        let pdsift = PyramidDenseSift::new(c.step, c.magnification, c.sizes.clone());
        Self::new("PyramidSift", Arc::new(pdsift), c.codebook_size)
            .with_samples_per_class(c.codebook_samples_per_class)
            .with_thresholds(Some(c.vocabulary_threshold), Some(c.histogram_threshold))
            .with_aggregation(Aggregation::Blocks(c.blocks))
            .with_transform(c.transform)
            .with_best_only(false)
            .engines(config)
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Number of words in the trained codebook.
    pub fn codebook_len(&self) -> ClassifierResult<usize> {
        Ok(self.trained.current()?.bow.size())
    }

    /// The vector the linear classifier sees for `image`.
    pub fn encode_image(&self, image: &ImageEntry) -> ClassifierResult<Vec<f32>> {
        let trained = self.trained.current()?;
        let features = self.cache.peek_or_extract(image)?;
        Ok(self.encode(&trained.bow, &features, image))
    }

    /// Images whose features feed the codebook.
    fn codebook_sample<'a>(&self, data: &'a [LabeledImage]) -> Vec<&'a ImageEntry> {
        let samples = match self.samples_per_class {
            Some(n) => n,
            None => return data.iter().map(|d| &d.image).collect(),
        };
        let mut groups: BTreeMap<&str, Vec<&ImageEntry>> = BTreeMap::new();
        for d in data {
            groups.entry(d.label.as_str()).or_default().push(&d.image);
        }
        let mut rng = StdRng::seed_from_u64(self.seed);
        groups
            .values()
            .flat_map(|group| group.choose_multiple(&mut rng, samples).copied().collect::<Vec<_>>())
            .collect()
    }

    /// Cached features of `images`, skipping images the extractor rejects.
    fn gather<'a>(&self, images: &[&'a ImageEntry]) -> ClassifierResult<Vec<(&'a ImageEntry, FeatureList)>> {
        let mut out = Vec::with_capacity(images.len());
        for (image, result) in images.iter().zip(self.cache.fill(images)) {
            match result {
                Ok(features) => out.push((*image, features)),
                Err(e) if e.is_per_image() => log::warn!("{}: skipping {}: {}", self.name, image.id, e),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    fn encode(&self, bow: &BagOfVisualWords, features: &[LocalFeature], image: &ImageEntry) -> Vec<f32> {
        let kept;
        let features = match self.histogram_threshold {
            Some(t) => {
                kept = retain_strong(features, t);
                &kept[..]
            }
            None => features,
        };
        let histogram = match self.aggregation {
            Aggregation::Global => bow.aggregate(features),
            Aggregation::Blocks(blocks) => blocks.aggregate(bow, features, image.width(), image.height()),
        };
        self.transform.apply(&histogram)
    }

    fn train_quantiser(&self, data: &[LabeledImage]) -> ClassifierResult<BagOfVisualWords> {
        let sample = self.codebook_sample(data);
        let extracted = self.gather(&sample)?;
        let kept: Vec<FeatureList> = match self.vocabulary_threshold {
            Some(t) => extracted
                .into_iter()
                .map(|(_, f)| Arc::new(retain_strong(&f, t)))
                .collect(),
            None => extracted.into_iter().map(|(_, f)| f).collect(),
        };
        let pool: Vec<&[f32]> = kept
            .iter()
            .flat_map(|list| list.iter().map(|f| f.vector.values()))
            .collect();
        log::info!(
            "{}: learning {} words from {} features of {} images",
            self.name,
            self.codebook_size,
            pool.len(),
            sample.len()
        );
        let centroids = self.clusterer.cluster(&pool, self.codebook_size)?;
        Ok(BagOfVisualWords::new(centroids.hard_assigner()))
    }
}

impl ClassificationAlgorithm for BagOfWordsClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn train(&self, data: &[LabeledImage]) -> ClassifierResult<()> {
        check_trainable(data)?;
        self.cache.reset();

        let bow = self.train_quantiser(data)?;

        let images: Vec<&ImageEntry> = data.iter().map(|d| &d.image).collect();
        let extracted = self.gather(&images)?;
        let labels_by_id: BTreeMap<&str, &str> = data
            .iter()
            .map(|d| (d.image.id.as_str(), d.label.as_str()))
            .collect();
        let rows: Vec<(Vec<f32>, String)> = extracted
            .par_iter()
            .map(|(image, features)| {
                let label = labels_by_id.get(image.id.as_str()).copied().unwrap_or_default();
                (self.encode(&bow, features, image), label.to_string())
            })
            .collect();
        let (features, labels): (Vec<Vec<f32>>, Vec<String>) = rows.into_iter().unzip();

        log::info!("{}: fitting classifier on {} histograms", self.name, features.len());
        let model = self.trainer.train(&features, &labels)?;
        self.trained.publish(TrainedBovw { bow, model });
        Ok(())
    }

    fn classify(&self, image: &ImageEntry) -> ClassifierResult<ClassificationResult> {
        let trained = self.trained.current()?;
        let features = self.cache.peek_or_extract(image)?;
        let x = self.encode(&trained.bow, &features, image);
        let mut result = if self.best_only {
            ClassificationResult::best()
        } else {
            ClassificationResult::new()
        };
        for (label, confidence) in trained.model.predict(&x) {
            result.insert(label, confidence);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn stripes(id: &str, vertical: bool, phase: u32) -> LabeledImage {
        let img = FImage::from_fn(33, 33, |x, y| {
            let t = if vertical { x } else { y };
            Luma([(((t + phase) / 2) % 2) as f32])
        });
        let label = if vertical { "vertical" } else { "horizontal" };
        LabeledImage::new(ImageEntry::new(id, img), label)
    }

    fn small_patches() -> BagOfWordsClassifier {
        let mut config = BenchConfig::default();
        config.patches.codebook_size = 8;
        BagOfWordsClassifier::patches(&config)
    }

    #[test]
    fn classify_before_train_fails() {
        let bovw = small_patches();
        let err = bovw.classify(&stripes("q", true, 0).image).unwrap_err();
        assert!(matches!(err, ClassifierErr::NotTrained));
    }

    #[test]
    fn codebook_sample_takes_n_per_class() {
        let data: Vec<_> = (0..6)
            .map(|i| stripes(&format!("v{}", i), true, i))
            .chain((0..4).map(|i| stripes(&format!("h{}", i), false, i)))
            .collect();
        let bovw = small_patches().with_samples_per_class(Some(3));
        let sample = bovw.codebook_sample(&data);
        assert_eq!(sample.len(), 6);
        assert_eq!(sample.iter().filter(|i| i.id.starts_with('v')).count(), 3);
        let ids = |s: Vec<&ImageEntry>| s.into_iter().map(|i| i.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(bovw.codebook_sample(&data)), ids(bovw.codebook_sample(&data)));
    }

    #[test]
    fn too_small_training_images_are_skipped() {
        let mut data: Vec<_> = (0..4)
            .map(|i| stripes(&format!("v{}", i), true, i))
            .chain((0..4).map(|i| stripes(&format!("h{}", i), false, i)))
            .collect();
        data.push(LabeledImage::new(ImageEntry::new("tiny", FImage::new(2, 2)), "vertical"));
        let bovw = small_patches();
        bovw.train(&data).unwrap();
        assert_eq!(bovw.cache().len(), 8);
    }
}
