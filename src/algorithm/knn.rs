use rayon::prelude::*;
use smallvec::SmallVec;

use crate::algorithm::{check_trainable, ClassificationAlgorithm, ClassificationResult, Snapshot};
use crate::config::KnnConfig;
use crate::extract::ensure_min_size;
use crate::imaging::{extract_center, pixel_vector, resize};
use crate::neighbours::{KdTreeIndex, Neighbour, NeighbourIndex};
use crate::*;

/// Side of the square every image is resized to.
pub const DIMENSION: u32 = 16;
const VECTOR_LEN: usize = (DIMENSION * DIMENSION) as usize;

struct TrainedKnn {
    index: KdTreeIndex<VECTOR_LEN>,
    labels: Vec<String>,
}

/// Per-class tally of one vote.
#[derive(Debug, Clone, PartialEq)]
struct Tally<'a> {
    label: &'a str,
    count: usize,
    distance: f32,
}

/// K-nearest-neighbour classifier over scaled-down images.
///
/// Every image is cropped to its centred square, resized to
/// [`DIMENSION`] pixels square, normalised to `[0, 1]` and zero-meaned. The
/// winning class has the most of the `k` nearest training vectors, then the
/// smaller mean distance, then was met first among the neighbours.
pub struct KNearestNeighbour {
    k: usize,
    trained: Snapshot<TrainedKnn>,
}

impl KNearestNeighbour {
    pub fn new(k: usize) -> Self {
        Self {
            k: k.max(1),
            trained: Snapshot::default(),
        }
    }

    pub fn from_config(config: &KnnConfig) -> Self {
        Self::new(config.k)
    }

    /// Flattened pixels of the resized image.
    pub fn feature_vector(&self, image: &ImageEntry) -> ClassifierResult<FeatureVector> {
        ensure_min_size(image, 1, 1)?;
        let side = image.width().min(image.height());
        let square = extract_center(&image.pixels, side);
        let small = resize(&square, DIMENSION, DIMENSION);
        Ok(pixel_vector(&small).normalised().zero_meaned())
    }
}

impl Default for KNearestNeighbour {
    fn default() -> Self {
        Self::new(5)
    }
}

/// Winning label and its blended confidence
/// `(count / neighbours + class distance / total distance) / 2`.
///
/// `labels[i]` is the class of stored vector `i`.
pub fn vote(neighbours: &[Neighbour], labels: &[String]) -> Option<(String, f32)> {
    let mut tallies: SmallVec<[Tally; 8]> = SmallVec::new();
    for n in neighbours {
        let label = labels.get(n.index)?.as_str();
        match tallies.iter_mut().find(|t| t.label == label) {
            Some(t) => {
                t.count += 1;
                t.distance += n.distance;
            }
            None => tallies.push(Tally {
                label,
                count: 1,
                distance: n.distance,
            }),
        }
    }

    let mut best: Option<&Tally> = None;
    for t in &tallies {
        best = match best {
            None => Some(t),
            Some(b) if t.count > b.count => Some(t),
            Some(b) if t.count == b.count && t.distance / (t.count as f32) < b.distance / (b.count as f32) => Some(t),
            keep => keep,
        };
    }
    let best = best?;

    let fraction = best.count as f32 / neighbours.len() as f32;
    let total: f32 = neighbours.iter().map(|n| n.distance).sum();
    let share = if total > 0. { best.distance / total } else { fraction };
    Some((best.label.to_string(), (fraction + share) / 2.))
}

impl ClassificationAlgorithm for KNearestNeighbour {
    fn name(&self) -> &str {
        "KNearestNeighbour"
    }

    fn train(&self, data: &[LabeledImage]) -> ClassifierResult<()> {
        check_trainable(data)?;
        let projected: Vec<ClassifierResult<(Vec<f32>, String)>> = data
            .par_iter()
            .map(|d| {
                self.feature_vector(&d.image)
                    .map(|v| (v.into_inner(), d.label.clone()))
            })
            .collect();

        let mut vectors = Vec::with_capacity(projected.len());
        let mut labels = Vec::with_capacity(projected.len());
        for (d, result) in data.iter().zip(projected) {
            match result {
                Ok((v, label)) => {
                    vectors.push(v);
                    labels.push(label);
                }
                Err(e) if e.is_per_image() => log::warn!("knn: skipping {}: {}", d.image.id, e),
                Err(e) => return Err(e),
            }
        }
        if vectors.is_empty() {
            return Err(ClassifierErr::NotTrainable("no usable training images".to_string()));
        }

        log::info!("knn: indexed {} vectors of {} values", vectors.len(), VECTOR_LEN);
        self.trained.publish(TrainedKnn {
            index: KdTreeIndex::build(&vectors)?,
            labels,
        });
        Ok(())
    }

    fn classify(&self, image: &ImageEntry) -> ClassifierResult<ClassificationResult> {
        let trained = self.trained.current()?;
        let query = self.feature_vector(image)?;
        let neighbours = trained.index.search(&query, self.k)?;
        let mut result = ClassificationResult::best();
        if let Some((label, confidence)) = vote(&neighbours, &trained.labels) {
            result.insert(label, confidence);
        }
        Ok(result)
    }
}
