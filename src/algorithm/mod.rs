use clap::ValueEnum;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

use crate::*;

/// Bag-of-visual-words pipelines over patches, SIFT, SURF and pyramid dense SIFT.
pub mod bovw;
pub use bovw::BagOfWordsClassifier;

/// k-nearest-neighbour voting over tiny zero-meaned images.
pub mod knn;
pub use knn::KNearestNeighbour;

/// Uniformly random baseline.
pub mod random;
pub use random::RandomGuesser;

/// The contract every classification strategy honours.
///
/// `train` replaces all previously learned state in one step: a concurrent
/// `classify` sees either the old model or the new one. `classify` before
/// any successful `train` fails with [`ClassifierErr::NotTrained`].
pub trait ClassificationAlgorithm: Send + Sync {
    /// Display name, also used for results file names.
    fn name(&self) -> &str;

    fn train(&self, data: &[LabeledImage]) -> ClassifierResult<()>;

    fn classify(&self, image: &ImageEntry) -> ClassifierResult<ClassificationResult>;
}

/// Reject training sets the classifiers cannot learn from.
pub(crate) fn check_trainable(data: &[LabeledImage]) -> ClassifierResult<()> {
    let first = match data.first() {
        Some(first) => &first.label,
        None => return Err(ClassifierErr::NotTrainable("training set is empty".to_string())),
    };
    if data.iter().all(|d| &d.label == first) {
        return Err(ClassifierErr::NotTrainable(format!(
            "training set only contains class {}",
            first
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResultMode {
    All,
    Best,
}

/// Class labels with confidence scores.
///
/// Labels are unique and kept in insertion order. A result created with
/// [`ClassificationResult::best`] holds at most one entry: an insert only
/// replaces it when its confidence is strictly greater.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    mode: ResultMode,
    entries: Vec<(String, f32)>,
}

impl Default for ClassificationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassificationResult {
    pub fn new() -> Self {
        Self {
            mode: ResultMode::All,
            entries: Vec::new(),
        }
    }

    pub fn best() -> Self {
        Self {
            mode: ResultMode::Best,
            entries: Vec::new(),
        }
    }

    pub fn insert<S: Into<String>>(&mut self, label: S, confidence: f32) {
        let label = label.into();
        match self.mode {
            ResultMode::Best => match self.entries.first() {
                Some((_, current)) if confidence <= *current => {}
                _ => self.entries = vec![(label, confidence)],
            },
            ResultMode::All => match self.entries.iter_mut().find(|(l, _)| *l == label) {
                Some(entry) => entry.1 = confidence,
                None => self.entries.push((label, confidence)),
            },
        }
    }

    pub fn confidence(&self, label: &str) -> Option<f32> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, c)| *c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(l, c)| (l.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Label with the highest confidence. The first entry is the running
    /// best and later entries only replace it when strictly greater.
    pub fn most_likely(&self) -> Option<(&str, f32)> {
        let mut best: Option<(&str, f32)> = None;
        for (label, confidence) in self.iter() {
            match best {
                Some((_, current)) if confidence <= current => {}
                _ => best = Some((label, confidence)),
            }
        }
        best
    }
}

impl FromIterator<(String, f32)> for ClassificationResult {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        let mut result = Self::new();
        for (label, confidence) in iter {
            result.insert(label, confidence);
        }
        result
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, confidence) in self.iter() {
            writeln!(f, "\t{} ({})", label, confidence)?;
        }
        Ok(())
    }
}

/// Publish-once cell for trained state.
///
/// Writers build a complete value and swap it in with [`Snapshot::publish`];
/// readers take an `Arc` to whatever was last published.
pub struct Snapshot<T> {
    current: RwLock<Option<Arc<T>>>,
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }
}

impl<T> Snapshot<T> {
    pub fn publish(&self, value: T) {
        *self.current.write() = Some(Arc::new(value));
    }

    pub fn current(&self) -> ClassifierResult<Arc<T>> {
        self.current.read().clone().ok_or(ClassifierErr::NotTrained)
    }
}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("trained", &self.current.read().is_some())
            .finish()
    }
}

/// Every strategy the benchmark can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    /// Grid patches, k-means codebook, linear SVM
    Patches,
    /// DoG SIFT keypoints, k-means codebook, linear SVM
    Sift,
    /// Upright SURF, chi-squared kernel map, linear SVM
    Surf,
    /// Pyramid dense SIFT with 2x2 spatial blocks, linear SVM
    Pyramid,
    /// k-nearest-neighbour on 16x16 images
    Knn,
    /// Random baseline
    Random,
}

impl AlgorithmKind {
    pub fn build(&self, config: &BenchConfig) -> Box<dyn ClassificationAlgorithm> {
        match self {
            AlgorithmKind::Patches => Box::new(BagOfWordsClassifier::patches(config)),
            AlgorithmKind::Sift => Box::new(BagOfWordsClassifier::sift(config)),
            AlgorithmKind::Surf => Box::new(BagOfWordsClassifier::surf(config)),
            AlgorithmKind::Pyramid => Box::new(BagOfWordsClassifier::pyramid(config)),
            AlgorithmKind::Knn => Box::new(KNearestNeighbour::from_config(&config.knn)),
            AlgorithmKind::Random => Box::new(RandomGuesser::new(config.seed)),
        }
    }
}
