use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Ordered sequence of reals describing one image region.
///
/// The dimensionality is fixed per extractor. Vectors are only changed while
/// being built (see [`FeatureVector::normalised`] and [`FeatureVector::zero_meaned`]).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct FeatureVector(Vec<f32>);

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn zeros(len: usize) -> Self {
        Self(vec![0.; len])
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    pub fn mean(&self) -> f32 {
        if self.0.is_empty() {
            return 0.;
        }
        let sum: f64 = self.0.iter().map(|&v| v as f64).sum();
        (sum / self.0.len() as f64) as f32
    }

    /// Subtract the vector's own mean from every component.
    pub fn zero_meaned(mut self) -> Self {
        let mean = self.mean();
        for v in self.0.iter_mut() {
            *v -= mean;
        }
        self
    }

    /// Rescale linearly so the smallest component is 0 and the largest is 1.
    ///
    /// A constant vector has no range and becomes all zeros.
    pub fn normalised(mut self) -> Self {
        let (min, max) = self
            .0
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;
        for v in self.0.iter_mut() {
            *v = if range > 0. { (*v - min) / range } else { 0. };
        }
        self
    }

    /// Scale to unit Euclidean length. The zero vector is left unchanged.
    pub fn l2_normalised(mut self) -> Self {
        l2_normalise(&mut self.0);
        self
    }
}

impl Deref for FeatureVector {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// In-place L2 normalisation shared by descriptors and histograms.
pub(crate) fn l2_normalise(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0. {
        let inv = 1. / norm;
        for v in values.iter_mut() {
            *v *= inv;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Location {
    pub x: f32,
    pub y: f32,
}

impl Location {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A (location, descriptor) sample taken from one image.
///
/// `strength` is the extractor's own measure of how pronounced the sample is
/// (descriptor energy, detector response). Extractors without such a measure
/// leave it at 0.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LocalFeature {
    pub location: Location,
    pub vector: FeatureVector,
    pub strength: f32,
}

impl LocalFeature {
    pub fn new(location: Location, vector: FeatureVector) -> Self {
        Self {
            location,
            vector,
            strength: 0.,
        }
    }

    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn zero_meaning_removes_mean() {
        let v = FeatureVector::new(vec![1., 2., 3., 6.]).zero_meaned();
        assert_abs_diff_eq!(v.mean(), 0., epsilon = 1e-6);
        assert_eq!(v.values(), &[-2., -1., 0., 3.]);
    }

    #[test]
    fn normalising_maps_to_unit_range() {
        let v = FeatureVector::new(vec![2., 4., 3.]).normalised();
        assert_eq!(v.values(), &[0., 1., 0.5]);

        let flat = FeatureVector::new(vec![0.7; 5]).normalised();
        assert!(flat.iter().all(|&x| x == 0.));
    }

    #[test]
    fn l2_normalising_keeps_zero_vector() {
        let v = FeatureVector::new(vec![3., 4.]).l2_normalised();
        assert_abs_diff_eq!(v[0], 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(v[1], 0.8, epsilon = 1e-6);

        let z = FeatureVector::zeros(3).l2_normalised();
        assert_eq!(z, FeatureVector::zeros(3));
    }
}
