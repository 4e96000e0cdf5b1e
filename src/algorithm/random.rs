use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeSet;

use crate::algorithm::{ClassificationAlgorithm, ClassificationResult, Snapshot};
use crate::*;

/// Baseline that answers a uniformly random known class.
pub struct RandomGuesser {
    rng: Mutex<StdRng>,
    classes: Snapshot<Vec<String>>,
}

impl RandomGuesser {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            classes: Snapshot::default(),
        }
    }
}

impl ClassificationAlgorithm for RandomGuesser {
    fn name(&self) -> &str {
        "Random"
    }

    fn train(&self, data: &[LabeledImage]) -> ClassifierResult<()> {
        if data.is_empty() {
            return Err(ClassifierErr::NotTrainable("training set is empty".to_string()));
        }
        let classes: BTreeSet<&str> = data.iter().map(|d| d.label.as_str()).collect();
        self.classes
            .publish(classes.into_iter().map(str::to_string).collect());
        Ok(())
    }

    fn classify(&self, _image: &ImageEntry) -> ClassifierResult<ClassificationResult> {
        let classes = self.classes.current()?;
        let pick = self.rng.lock().gen_range(0..classes.len());
        let mut result = ClassificationResult::best();
        result.insert(classes[pick].clone(), 1.);
        Ok(result)
    }
}
