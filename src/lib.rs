use image::{ImageBuffer, Luma};
use thiserror::Error;

/// Local feature vectors and their spatial locations.
pub mod feature;
pub use feature::{FeatureVector, LocalFeature, Location};

/// Image records, loading and the small pixel operations shared by extractors.
pub mod imaging;
pub use imaging::{ImageEntry, LabeledImage};

/// Pluggable local feature extractors (patch grid, dense SIFT, DoG SIFT, SURF).
pub mod extract;
pub use extract::Extractor;

/// Per-image memoization of extracted features.
pub mod cache;
pub use cache::FeatureCache;

/// K-means codebook learning and nearest-centroid assignment.
pub mod cluster;

/// Bag-of-visual-words quantisation of local feature lists.
pub mod bow;
pub use bow::{BagOfVisualWords, Histogram, HistogramTrait};

/// Explicit feature map approximating the chi-squared kernel.
pub mod kernel_map;

/// One-vs-rest linear SVM used on top of the quantised histograms.
pub mod linear;

/// KD-tree nearest-neighbour search over fixed-length vectors.
pub mod neighbours;

/// The classification strategies and the contract they share.
pub mod algorithm;
pub use algorithm::{AlgorithmKind, ClassificationAlgorithm, ClassificationResult};

/// Directory-backed datasets and grouped train/test splitting.
pub mod dataset;

/// Training, classification and accuracy reporting.
pub mod harness;
pub use harness::AccuracyReport;

/// YAML configuration for every algorithm.
pub mod config;
pub use config::BenchConfig;

/// Single channel floating point image with intensities in `[0, 1]`.
pub type FImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Stable identifier of an image, usually its path or file name.
///
/// Feature caching is keyed by this value, never by pixel content.
pub type ImageId = String;

pub type ClassifierResult<T> = std::result::Result<T, ClassifierErr>;

#[derive(Error, Debug)]
pub enum ClassifierErr {
    #[error("Classifier is not trained")]
    NotTrained,
    #[error("Classifier cannot be trained: {0}")]
    NotTrainable(String),
    #[error("Could not extract features from {id}: {reason}")]
    ExtractionFailure { id: ImageId, reason: String },
    #[error("Expected a vector of {expected} values, got {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("Couldn't load dataset {path}: {reason}")]
    DatasetLoadFailure { path: String, reason: String },
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),
}

impl ClassifierErr {
    /// True for failures that only concern a single image.
    pub fn is_per_image(&self) -> bool {
        matches!(self, ClassifierErr::ExtractionFailure { .. })
    }
}
