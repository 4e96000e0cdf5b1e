use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::cluster::HardAssigner;
use crate::feature::l2_normalise;
use crate::kernel_map::HomogeneousKernelMap;
use crate::*;

/// Bag-of-Words representation of an image's local features.
///
/// Index: word id (centroid index) in the codebook.
///
/// Value: number of features assigned to that word.
pub type Histogram = Vec<u32>;

/// Provides conversions of a count histogram into classifier input.
pub trait HistogramTrait {
    /// Sum of all bins.
    fn total(&self) -> u64;
    /// Counts as reals.
    fn to_f32(&self) -> Vec<f32>;
    /// Counts as reals scaled to unit L2 norm (all zero stays all zero).
    fn l2(&self) -> Vec<f32>;
}

impl HistogramTrait for Histogram {
    fn total(&self) -> u64 {
        self.iter().map(|&c| c as u64).sum()
    }

    fn to_f32(&self) -> Vec<f32> {
        self.iter().map(|&c| c as f32).collect()
    }

    fn l2(&self) -> Vec<f32> {
        let mut v = self.to_f32();
        l2_normalise(&mut v);
        v
    }
}

/// Hard-assignment quantiser over a trained codebook.
#[derive(Debug, Clone, PartialEq)]
pub struct BagOfVisualWords {
    assigner: HardAssigner,
}

impl BagOfVisualWords {
    pub fn new(assigner: HardAssigner) -> Self {
        Self { assigner }
    }

    /// Codebook size, i.e. histogram length.
    pub fn size(&self) -> usize {
        self.assigner.size()
    }

    /// Count how many features fall on each word. An empty feature list
    /// gives an all zero histogram.
    pub fn aggregate(&self, features: &[LocalFeature]) -> Histogram {
        let mut bow: Histogram = vec![0; self.size()];
        for f in features {
            bow[self.assigner.assign(&f.vector)] += 1;
        }
        bow
    }
}

/// Splits the image into a `blocks_x` by `blocks_y` grid and concatenates one
/// histogram per block, row by row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockSpatialAggregator {
    pub blocks_x: u32,
    pub blocks_y: u32,
}

impl BlockSpatialAggregator {
    pub fn new(blocks_x: u32, blocks_y: u32) -> Self {
        Self {
            blocks_x: blocks_x.max(1),
            blocks_y: blocks_y.max(1),
        }
    }

    pub fn aggregate(&self, bow: &BagOfVisualWords, features: &[LocalFeature], width: u32, height: u32) -> Histogram {
        let m = bow.size();
        let (bx, by) = (self.blocks_x.max(1) as usize, self.blocks_y.max(1) as usize);
        let mut out: Histogram = vec![0; bx * by * m];
        let block_w = width.max(1) as f32 / bx as f32;
        let block_h = height.max(1) as f32 / by as f32;
        for f in features {
            let col = ((f.location.x / block_w).floor().max(0.) as usize).min(bx - 1);
            let row = ((f.location.y / block_h).floor().max(0.) as usize).min(by - 1);
            let word = bow.assigner.assign(&f.vector);
            out[(row * bx + col) * m + word] += 1;
        }
        out
    }
}

/// Post-processing applied to a histogram before it reaches the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistogramTransform {
    Counts,
    L2,
    L2ThenChi2Map,
}

impl HistogramTransform {
    pub fn apply(&self, histogram: &Histogram) -> Vec<f32> {
        match self {
            HistogramTransform::Counts => histogram.to_f32(),
            HistogramTransform::L2 => histogram.l2(),
            HistogramTransform::L2ThenChi2Map => {
                static CHI2: OnceLock<HomogeneousKernelMap> = OnceLock::new();
                CHI2.get_or_init(HomogeneousKernelMap::chi2).evaluate(&histogram.l2())
            }
        }
    }
}
