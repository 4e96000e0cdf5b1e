use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bow::{BlockSpatialAggregator, HistogramTransform};
use crate::*;

/// Settings for every algorithm of a benchmark run.
///
/// Every field has a default, so a YAML file only needs the values it
/// changes:
///
/// ```yaml
/// seed: 42
/// knn:
///   k: 3
/// pyramid:
///   codebook_size: 200
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Seeds every random choice (sampling, k-means, SVM order, splits).
    pub seed: u64,
    pub kmeans: KMeansConfig,
    pub svm: SvmConfig,
    pub patches: PatchesConfig,
    pub sift: SiftConfig,
    pub surf: SurfConfig,
    pub pyramid: PyramidConfig,
    pub knn: KnnConfig,
}

impl BenchConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> ClassifierResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self { max_iterations: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    pub c: f32,
    pub eps: f32,
    pub max_iterations: usize,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            c: 1.,
            eps: 1e-5,
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatchesConfig {
    pub patch_size: u32,
    pub codebook_size: usize,
    /// Images per class used to learn the codebook; all when unset.
    pub codebook_samples_per_class: Option<usize>,
}

impl Default for PatchesConfig {
    fn default() -> Self {
        Self {
            patch_size: 8,
            codebook_size: 500,
            codebook_samples_per_class: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub codebook_size: usize,
    pub codebook_samples_per_class: Option<usize>,
    pub scales_per_octave: usize,
    pub sigma: f32,
    pub contrast_threshold: f32,
    pub edge_threshold: f32,
}

impl Default for SiftConfig {
    fn default() -> Self {
        Self {
            codebook_size: 500,
            codebook_samples_per_class: None,
            scales_per_octave: 3,
            sigma: 1.6,
            contrast_threshold: 0.04,
            edge_threshold: 10.,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfConfig {
    pub codebook_size: usize,
    pub codebook_samples_per_class: Option<usize>,
    pub octaves: usize,
    pub init_sample: usize,
    pub threshold: f32,
}

impl Default for SurfConfig {
    fn default() -> Self {
        Self {
            codebook_size: 500,
            codebook_samples_per_class: None,
            octaves: 3,
            init_sample: 2,
            threshold: 0.0004,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    pub codebook_size: usize,
    pub codebook_samples_per_class: Option<usize>,
    pub step: u32,
    pub magnification: f32,
    pub sizes: Vec<u32>,
    /// Minimum descriptor energy for features pooled into the codebook.
    pub vocabulary_threshold: f32,
    /// Minimum descriptor energy for features counted in histograms.
    pub histogram_threshold: f32,
    pub blocks: BlockSpatialAggregator,
    pub transform: HistogramTransform,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            codebook_size: 300,
            codebook_samples_per_class: None,
            step: 5,
            magnification: 6.,
            sizes: vec![7],
            vocabulary_threshold: 0.005,
            histogram_threshold: 0.015,
            blocks: BlockSpatialAggregator::new(2, 2),
            transform: HistogramTransform::L2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnConfig {
    pub k: usize,
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self { k: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_settings() {
        let config = BenchConfig::default();
        assert_eq!(config.patches.codebook_size, 500);
        assert_eq!(config.pyramid.codebook_size, 300);
        assert_eq!(config.pyramid.sizes, vec![7]);
        assert_eq!(config.knn.k, 5);
        assert_eq!(config.svm.eps, 1e-5);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "seed: 9\nknn:\n  k: 3\npyramid:\n  transform: l2_then_chi2_map").unwrap();
        let config = BenchConfig::load(file.path()).unwrap();
        assert_eq!(config.seed, 9);
        assert_eq!(config.knn.k, 3);
        assert_eq!(config.pyramid.transform, HistogramTransform::L2ThenChi2Map);
        assert_eq!(config.surf, SurfConfig::default());
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "knn: [1, 2").unwrap();
        assert!(matches!(BenchConfig::load(file.path()), Err(ClassifierErr::Config(_))));
    }
}
