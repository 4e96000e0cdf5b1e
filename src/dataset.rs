use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::imaging::load_image;
use crate::*;

fn load_failure(path: &Path, reason: impl ToString) -> ClassifierErr {
    ClassifierErr::DatasetLoadFailure {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Direct children of `dir` sorted by file name.
fn children(dir: &Path) -> ClassifierResult<Vec<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|e| e.map_err(|e| load_failure(dir, e)))
        .collect()
}

/// Decode `(id, path)` pairs in parallel. Files that are not images are
/// skipped with a warning.
fn decode_all(files: Vec<(ImageId, PathBuf)>) -> Vec<ImageEntry> {
    files
        .into_par_iter()
        .filter_map(|(id, path)| match load_image(&path) {
            Ok(pixels) => Some(ImageEntry::new(id, pixels)),
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// Images grouped by class: one subdirectory per label.
#[derive(Debug, Clone, Default)]
pub struct GroupDataset {
    groups: Vec<(String, Vec<ImageEntry>)>,
}

impl GroupDataset {
    /// Load `<dir>/<label>/<image>` files. Image ids are `<label>/<file name>`.
    pub fn load<P: AsRef<Path>>(dir: P) -> ClassifierResult<Self> {
        let dir = dir.as_ref();
        let mut groups = Vec::new();
        for entry in children(dir)? {
            if !entry.file_type().is_dir() {
                continue;
            }
            let label = entry.file_name().to_string_lossy().to_string();
            let files = children(entry.path())?
                .into_iter()
                .filter(|f| f.file_type().is_file())
                .map(|f| (format!("{}/{}", label, f.file_name().to_string_lossy()), f.into_path()))
                .collect();
            let images = decode_all(files);
            log::debug!("loaded {} images of class {}", images.len(), label);
            groups.push((label, images));
        }
        let dataset = Self { groups };
        if dataset.is_empty() {
            return Err(load_failure(dir, "no images found"));
        }
        log::info!(
            "loaded {} images in {} classes from {}",
            dataset.len(),
            dataset.groups.len(),
            dir.display()
        );
        Ok(dataset)
    }

    pub fn from_groups(groups: Vec<(String, Vec<ImageEntry>)>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[(String, Vec<ImageEntry>)] {
        &self.groups
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, g)| g.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every image with its label, group by group.
    pub fn labeled(&self) -> Vec<LabeledImage> {
        self.groups
            .iter()
            .flat_map(|(label, images)| images.iter().map(move |i| LabeledImage::new(i.clone(), label.as_str())))
            .collect()
    }
}

/// Flat directory of unlabeled images; the id is the file name.
#[derive(Debug, Clone, Default)]
pub struct ListDataset {
    images: Vec<ImageEntry>,
}

impl ListDataset {
    pub fn load<P: AsRef<Path>>(dir: P) -> ClassifierResult<Self> {
        let dir = dir.as_ref();
        let files = children(dir)?
            .into_iter()
            .filter(|f| f.file_type().is_file())
            .map(|f| (f.file_name().to_string_lossy().to_string(), f.into_path()))
            .collect();
        let images = decode_all(files);
        if images.is_empty() {
            return Err(load_failure(dir, "no images found"));
        }
        log::info!("loaded {} images from {}", images.len(), dir.display());
        Ok(Self { images })
    }

    pub fn images(&self) -> &[ImageEntry] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Training and testing halves of a split.
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub training: Vec<LabeledImage>,
    pub testing: Vec<LabeledImage>,
}

/// Per class: shuffle, then take `num_training` images for training and the
/// following `num_testing` for testing. Small classes give what they have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupedRandomSplitter {
    pub num_training: usize,
    pub num_testing: usize,
    pub seed: u64,
}

impl GroupedRandomSplitter {
    pub fn new(num_training: usize, num_testing: usize, seed: u64) -> Self {
        Self {
            num_training,
            num_testing,
            seed,
        }
    }

    pub fn split(&self, dataset: &GroupDataset) -> Split {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut split = Split::default();
        for (label, images) in dataset.groups() {
            let mut shuffled: Vec<&ImageEntry> = images.iter().collect();
            shuffled.shuffle(&mut rng);
            let mut rest = shuffled.into_iter();
            split.training.extend(
                rest.by_ref()
                    .take(self.num_training)
                    .map(|i| LabeledImage::new(i.clone(), label.as_str())),
            );
            split.testing.extend(
                rest.take(self.num_testing)
                    .map(|i| LabeledImage::new(i.clone(), label.as_str())),
            );
        }
        split
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn group(label: &str, n: usize) -> (String, Vec<ImageEntry>) {
        let images = (0..n)
            .map(|i| ImageEntry::new(format!("{}/{}", label, i), FImage::new(1, 1)))
            .collect();
        (label.to_string(), images)
    }

    #[test]
    fn split_is_per_group_and_disjoint() {
        let dataset = GroupDataset::from_groups(vec![group("a", 10), group("b", 5)]);
        let split = GroupedRandomSplitter::new(3, 2, 5).split(&dataset);
        assert_eq!(split.training.len(), 6);
        assert_eq!(split.testing.len(), 4);
        assert_eq!(split.training.iter().filter(|l| l.label == "a").count(), 3);

        let train: HashSet<_> = split.training.iter().map(|l| l.image.id.clone()).collect();
        assert!(split.testing.iter().all(|l| !train.contains(&l.image.id)));
        assert!(split.testing.iter().all(|l| l.image.id.starts_with(&l.label)));
    }

    #[test]
    fn small_group_gives_what_it_has() {
        let dataset = GroupDataset::from_groups(vec![group("a", 2), group("b", 5)]);
        let split = GroupedRandomSplitter::new(3, 3, 0).split(&dataset);
        assert_eq!(split.training.iter().filter(|l| l.label == "a").count(), 2);
        assert_eq!(split.testing.iter().filter(|l| l.label == "a").count(), 0);
        assert_eq!(split.testing.iter().filter(|l| l.label == "b").count(), 2);
    }

    #[test]
    fn missing_directory_is_a_load_failure() {
        let err = GroupDataset::load("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ClassifierErr::DatasetLoadFailure { .. }));
    }
}
