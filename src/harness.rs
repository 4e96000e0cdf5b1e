use rayon::prelude::*;
use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::*;

/// One scored test image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub id: ImageId,
    pub expected: String,
    /// Best label, or `None` when the algorithm returned no scores.
    pub returned: Option<String>,
    pub confidence: f32,
}

impl Prediction {
    pub fn is_correct(&self) -> bool {
        self.returned.as_deref() == Some(self.expected.as_str())
    }
}

/// Result of one evaluation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccuracyReport {
    pub algorithm: String,
    pub predictions: Vec<Prediction>,
    /// Test images skipped because features could not be extracted.
    pub skipped: Vec<ImageId>,
}

impl AccuracyReport {
    pub fn correct(&self) -> usize {
        self.predictions.iter().filter(|p| p.is_correct()).count()
    }

    pub fn total(&self) -> usize {
        self.predictions.len()
    }

    /// Percentage of correct predictions, `None` with no scored images.
    pub fn accuracy(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.correct() as f64 * 100. / total as f64),
        }
    }

    pub fn accuracy_line(&self) -> String {
        match self.accuracy() {
            Some(a) => format!("Accuracy: {:.6}%", a),
            None => format!("Accuracy: no data ({}/{})", self.correct(), self.total()),
        }
    }

    /// `<id> => <label> (<confidence>)` per image and the accuracy line.
    pub fn results_file_lines(&self) -> Vec<String> {
        self.predictions
            .iter()
            .map(|p| result_line(&p.id, p.returned.as_deref(), p.confidence))
            .chain(std::iter::once(self.accuracy_line()))
            .collect()
    }

    pub fn write_results<P: AsRef<Path>>(&self, path: P) -> ClassifierResult<()> {
        write_lines(path, &self.results_file_lines())
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for p in &self.predictions {
            writeln!(
                f,
                "Expected: {}, Returned: {}",
                p.expected,
                p.returned.as_deref().unwrap_or("none")
            )?;
        }
        write!(f, "{}", self.accuracy_line())
    }
}

fn result_line(id: &str, label: Option<&str>, confidence: f32) -> String {
    format!("{} => {} ({})", id, label.unwrap_or("none"), confidence)
}

fn write_lines<P: AsRef<Path>>(path: P, lines: &[String]) -> ClassifierResult<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    file.flush()?;
    Ok(())
}

/// Train `algorithm` on `training`, then score every image of `testing`.
///
/// Test images whose features cannot be extracted are logged and skipped;
/// any other failure aborts the run.
pub fn evaluate(
    algorithm: &dyn ClassificationAlgorithm,
    training: &[LabeledImage],
    testing: &[LabeledImage],
) -> ClassifierResult<AccuracyReport> {
    log::info!("{}: training on {} images", algorithm.name(), training.len());
    algorithm.train(training)?;

    log::info!("{}: classifying {} images", algorithm.name(), testing.len());
    let mut report = AccuracyReport {
        algorithm: algorithm.name().to_string(),
        ..Default::default()
    };
    for test in testing {
        let result = match algorithm.classify(&test.image) {
            Ok(result) => result,
            Err(e) if e.is_per_image() => {
                log::warn!("{}: skipping {}: {}", algorithm.name(), test.image.id, e);
                report.skipped.push(test.image.id.clone());
                continue;
            }
            Err(e) => return Err(e),
        };
        let best = result.most_likely();
        report.predictions.push(Prediction {
            id: test.image.id.clone(),
            expected: test.label.clone(),
            returned: best.map(|(label, _)| label.to_string()),
            confidence: best.map_or(0., |(_, c)| c),
        });
    }
    log::info!("{}: {}", algorithm.name(), report.accuracy_line());
    Ok(report)
}

/// Classify unlabeled images with a trained algorithm, returning one
/// `<id> => <label> (<confidence>)` line per image that could be classified.
pub fn classify_all(algorithm: &dyn ClassificationAlgorithm, images: &[ImageEntry]) -> ClassifierResult<Vec<String>> {
    let mut lines = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        log::debug!("classifying image {}", i);
        match algorithm.classify(image) {
            Ok(result) => {
                let best = result.most_likely();
                lines.push(result_line(
                    &image.id,
                    best.map(|(l, _)| l),
                    best.map_or(0., |(_, c)| c),
                ));
            }
            Err(e) if e.is_per_image() => log::warn!("{}: skipping {}: {}", algorithm.name(), image.id, e),
            Err(e) => return Err(e),
        }
    }
    Ok(lines)
}

/// Write `lines` to `path`, one per line.
pub fn write_results<P: AsRef<Path>>(path: P, lines: &[String]) -> ClassifierResult<()> {
    write_lines(path, lines)
}

/// Evaluate several algorithms on the same split side by side. Reports come
/// back in the order of `algorithms`.
pub fn benchmark(
    algorithms: &[Box<dyn ClassificationAlgorithm>],
    training: &[LabeledImage],
    testing: &[LabeledImage],
) -> Vec<ClassifierResult<AccuracyReport>> {
    algorithms
        .par_iter()
        .map(|a| evaluate(a.as_ref(), training, testing))
        .collect()
}
