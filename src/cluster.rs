use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fmt;

use crate::*;

/// Learns a codebook from a pool of vectors.
pub trait Clusterer: Send + Sync {
    /// Cluster `pool` into (at most) `k` centroids.
    fn cluster(&self, pool: &[&[f32]], k: usize) -> ClassifierResult<Centroids>;
}

/// Ordered set of centroid vectors.
#[derive(Clone, PartialEq)]
pub struct Centroids {
    values: Vec<Vec<f32>>,
}

impl Centroids {
    pub fn new(values: Vec<Vec<f32>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[Vec<f32>] {
        &self.values
    }

    /// Nearest-centroid assignment over these centroids.
    pub fn hard_assigner(self) -> HardAssigner {
        HardAssigner { centroids: self }
    }
}

impl fmt::Debug for Centroids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Centroids")
            .field("count", &self.values.len())
            .field("dimension", &self.values.first().map_or(0, Vec::len))
            .finish()
    }
}

/// Maps a vector to the index of its nearest centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct HardAssigner {
    centroids: Centroids,
}

impl HardAssigner {
    /// Number of centroids, i.e. histogram length.
    pub fn size(&self) -> usize {
        self.centroids.len()
    }

    pub fn centroids(&self) -> &Centroids {
        &self.centroids
    }

    /// Index of the nearest centroid by squared Euclidean distance.
    /// Ties go to the lower index.
    pub fn assign(&self, vector: &[f32]) -> usize {
        let mut best: (usize, f32) = (0, f32::INFINITY);
        for (j, c) in self.centroids.values.iter().enumerate() {
            let d = squared_distance(c, vector);
            if d < best.1 {
                best = (j, d);
            }
        }
        best.0
    }
}

#[inline]
pub(crate) fn squared_distance(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).fold(0., |a, (b, c)| a + (b - c) * (b - c))
}

/// Lloyd's k-means with random initial centroids.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            seed: 0,
        }
    }
}

impl KMeans {
    pub fn new(max_iterations: usize, seed: u64) -> Self {
        Self { max_iterations, seed }
    }

    /// Distinct vectors of the pool, in first-seen order.
    fn distinct<'a>(pool: &[&'a [f32]]) -> Vec<&'a [f32]> {
        let mut seen = HashSet::new();
        pool.iter()
            .copied()
            .filter(|v| seen.insert(v.iter().map(|x| x.to_bits()).collect::<Vec<u32>>()))
            .collect()
    }

    /// Initialize clusters for kmeans. Currently uses random initialization
    /// over distinct vectors, so no two start on the same point.
    fn initialize_clusters(&self, distinct: &[&[f32]], k: usize) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        distinct.choose_multiple(&mut rng, k).map(|v| v.to_vec()).collect()
    }
}

impl Clusterer for KMeans {
    fn cluster(&self, pool: &[&[f32]], k: usize) -> ClassifierResult<Centroids> {
        log::debug!("KMeans with {} vectors, k = {}", pool.len(), k);
        if pool.is_empty() || k == 0 {
            return Err(ClassifierErr::NotTrainable(
                "no features to build a codebook from".to_string(),
            ));
        }

        let distinct = Self::distinct(pool);
        if distinct.len() <= k {
            // Only one vector per cluster
            if distinct.len() < k {
                log::warn!(
                    "only {} distinct features for a codebook of {}; using one word per feature",
                    distinct.len(),
                    k
                );
            }
            return Ok(Centroids::new(distinct.iter().map(|v| v.to_vec()).collect()));
        }

        let dim = pool[0].len();
        let mut assigner = Centroids::new(self.initialize_clusters(&distinct, k)).hard_assigner();
        let mut groups: Vec<usize> = Vec::new();
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let new_groups: Vec<usize> = pool.par_iter().map(|v| assigner.assign(v)).collect();
            if groups == new_groups {
                break; // converged
            }

            // update clusters
            let mut sums = vec![vec![0f64; dim]; k];
            let mut counts = vec![0usize; k];
            for (v, &g) in pool.iter().zip(&new_groups) {
                counts[g] += 1;
                for (s, x) in sums[g].iter_mut().zip(v.iter()) {
                    *s += *x as f64;
                }
            }
            let previous = assigner.centroids.values;
            let centroids = sums
                .into_iter()
                .zip(counts)
                .zip(previous)
                .map(|((sum, n), old)| {
                    if n == 0 {
                        old
                    } else {
                        sum.into_iter().map(|s| (s / n as f64) as f32).collect()
                    }
                })
                .collect();
            assigner = Centroids::new(centroids).hard_assigner();
            groups = new_groups;
        }
        log::debug!("KMeans finished after {} iterations", iterations);
        Ok(assigner.centroids)
    }
}
