use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::*;

/// Constant appended to every input as a bias feature.
const BIAS: f32 = 1.;

/// Trains a multiclass linear model from dense feature rows.
pub trait LinearTrainer: Send + Sync {
    fn train(&self, features: &[Vec<f32>], labels: &[String]) -> ClassifierResult<LinearModel>;
}

/// One weight vector per class, the last weight being the bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    labels: Vec<String>,
    weights: Vec<Vec<f32>>,
}

impl LinearModel {
    /// Class labels in sorted order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Raw decision value of every class.
    pub fn decision_values(&self, x: &[f32]) -> Vec<f32> {
        self.weights.iter().map(|w| decision(w, x)).collect()
    }

    /// One `(label, confidence)` pair per class, in label order. Confidences
    /// are the logistic function of the decision value.
    pub fn predict(&self, x: &[f32]) -> Vec<(String, f32)> {
        self.labels
            .iter()
            .zip(self.decision_values(x))
            .map(|(label, d)| (label.clone(), 1. / (1. + (-d).exp())))
            .collect()
    }
}

#[inline]
fn decision(w: &[f32], x: &[f32]) -> f32 {
    let n = w.len() - 1;
    w[..n].iter().zip(x).fold(w[n] * BIAS, |a, (wi, xi)| a + wi * xi)
}

/// One-vs-rest L2-regularised L2-loss support vector classifier, solved in
/// the dual by coordinate descent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    pub c: f32,
    pub eps: f32,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self {
            c: 1.,
            eps: 1e-5,
            max_iterations: 1000,
            seed: 0,
        }
    }
}

impl LinearSvm {
    /// Binary problem: `positive[i]` tells whether row `i` is in the class.
    fn solve(&self, rows: &[Vec<f32>], positive: &[bool], seed: u64) -> Vec<f32> {
        let dim = rows.iter().map(Vec::len).max().unwrap_or(0);
        let diag = 0.5 / self.c.max(f32::EPSILON);
        let y: Vec<f32> = positive.iter().map(|&p| if p { 1. } else { -1. }).collect();
        let qd: Vec<f32> = rows
            .iter()
            .map(|x| diag + BIAS * BIAS + x.iter().map(|v| v * v).sum::<f32>())
            .collect();

        let mut w = vec![0f32; dim + 1];
        let mut alpha = vec![0f32; rows.len()];
        let mut order: Vec<usize> = (0..rows.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut iter = 0;
        while iter < self.max_iterations {
            iter += 1;
            order.shuffle(&mut rng);
            let (mut pg_max, mut pg_min) = (f32::NEG_INFINITY, f32::INFINITY);
            for &i in &order {
                let g = y[i] * decision(&w, &rows[i]) - 1. + diag * alpha[i];
                let pg = if alpha[i] == 0. { g.min(0.) } else { g };
                pg_max = pg_max.max(pg);
                pg_min = pg_min.min(pg);
                if pg.abs() > 1e-12 {
                    let old = alpha[i];
                    alpha[i] = (alpha[i] - g / qd[i]).max(0.);
                    let d = (alpha[i] - old) * y[i];
                    for (wj, xj) in w.iter_mut().zip(&rows[i]) {
                        *wj += d * xj;
                    }
                    w[dim] += d * BIAS;
                }
            }
            if pg_max - pg_min <= self.eps {
                break;
            }
        }
        log::debug!("svm converged after {} iterations", iter);
        w
    }
}

impl LinearTrainer for LinearSvm {
    fn train(&self, features: &[Vec<f32>], labels: &[String]) -> ClassifierResult<LinearModel> {
        if features.is_empty() || features.len() != labels.len() {
            return Err(ClassifierErr::NotTrainable(format!(
                "{} feature rows for {} labels",
                features.len(),
                labels.len()
            )));
        }
        let classes: Vec<String> = labels.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        if classes.len() < 2 {
            return Err(ClassifierErr::NotTrainable(
                "need at least two classes".to_string(),
            ));
        }

        log::info!(
            "training {} one-vs-rest svms on {} rows",
            classes.len(),
            features.len()
        );
        let weights = classes
            .par_iter()
            .enumerate()
            .map(|(k, class)| {
                let positive: Vec<bool> = labels.iter().map(|l| l == class).collect();
                self.solve(features, &positive, self.seed.wrapping_add(k as u64))
            })
            .collect();

        Ok(LinearModel {
            labels: classes,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_corners() -> (Vec<Vec<f32>>, Vec<String>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..10 {
            let e = i as f32 * 0.02;
            x.push(vec![1. + e, 0., 0.]);
            y.push("a".to_string());
            x.push(vec![0., 1. - e, 0.]);
            y.push("b".to_string());
            x.push(vec![0., 0., 1. + e]);
            y.push("c".to_string());
        }
        (x, y)
    }

    fn best(scores: &[(String, f32)]) -> &str {
        let mut best = &scores[0];
        for s in scores {
            if s.1 > best.1 {
                best = s;
            }
        }
        &best.0
    }

    #[test]
    fn separates_three_classes() {
        let (x, y) = three_corners();
        let model = LinearSvm::default().train(&x, &y).unwrap();
        assert_eq!(model.labels(), &["a", "b", "c"]);
        for (row, label) in x.iter().zip(&y) {
            assert_eq!(best(&model.predict(row)), label);
        }
        assert!(model
            .predict(&[0., 0., 1.])
            .iter()
            .all(|(_, c)| *c > 0. && *c < 1.));
    }

    #[test]
    fn training_is_reproducible() {
        let (x, y) = three_corners();
        let svm = LinearSvm::default();
        assert_eq!(svm.train(&x, &y).unwrap(), svm.train(&x, &y).unwrap());
    }

    #[test]
    fn defaults_match_liblinear() {
        let svm = LinearSvm::default();
        assert_eq!((svm.c, svm.eps, svm.max_iterations), (1., 1e-5, 1000));
    }

    #[test]
    fn single_class_is_not_trainable() {
        let x = vec![vec![1.], vec![2.]];
        let y = vec!["a".to_string(), "a".to_string()];
        let err = LinearSvm::default().train(&x, &y).unwrap_err();
        assert!(matches!(err, ClassifierErr::NotTrainable(_)));
    }
}
