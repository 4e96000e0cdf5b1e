use classbench::algorithm::{BagOfWordsClassifier, KNearestNeighbour};
use classbench::harness::evaluate;
use classbench::*;
use clap::ValueEnum;
use image::Luma;

fn stripes(id: &str, vertical: bool, phase: u32) -> LabeledImage {
    let img = FImage::from_fn(33, 33, |x, y| {
        let t = if vertical { x } else { y };
        Luma([(((t + phase) / 2) % 2) as f32])
    });
    let label = if vertical { "vertical" } else { "horizontal" };
    LabeledImage::new(ImageEntry::new(id, img), label)
}

fn stripe_set(prefix: &str, phases: &[u32]) -> Vec<LabeledImage> {
    phases
        .iter()
        .flat_map(|&p| {
            vec![
                stripes(&format!("{}v{}", prefix, p), true, p),
                stripes(&format!("{}h{}", prefix, p), false, p),
            ]
        })
        .collect()
}

/// Bright on one side, dark on the other.
fn ramp(id: &str, left: bool, noise: u32) -> LabeledImage {
    let img = FImage::from_fn(24, 20, |x, y| {
        let v = if left { 23 - x } else { x } as f32 / 23.;
        Luma([v + ((x * 7 + y * 3 + noise) % 5) as f32 * 0.01])
    });
    LabeledImage::new(ImageEntry::new(id, img), if left { "left" } else { "right" })
}

/// Gaussian spot on a dark background, 96 px square.
fn spot(id: &str, i: u32) -> LabeledImage {
    let (cx, cy) = (40. + 4. * i as f32, 48. - 3. * i as f32);
    let img = FImage::from_fn(96, 96, |x, y| {
        let r2 = (x as f32 - cx).powi(2) + (y as f32 - cy).powi(2);
        Luma([(-r2 / 32.).exp()])
    });
    LabeledImage::new(ImageEntry::new(id, img), "spot")
}

/// Vertical bars, 96 px square.
fn bars(id: &str, i: u32) -> LabeledImage {
    let img = FImage::from_fn(96, 96, |x, _| Luma([(((x + i) / 4) % 2) as f32]));
    LabeledImage::new(ImageEntry::new(id, img), "bars")
}

fn spots_and_bars(prefix: &str, range: std::ops::Range<u32>) -> Vec<LabeledImage> {
    range
        .flat_map(|i| vec![spot(&format!("{}s{}", prefix, i), i), bars(&format!("{}b{}", prefix, i), i)])
        .collect()
}

fn small_codebooks() -> BenchConfig {
    let mut config = BenchConfig::default();
    config.sift.codebook_size = 8;
    config.surf.codebook_size = 8;
    config.pyramid.codebook_size = 8;
    config
}

#[test]
fn every_algorithm_refuses_to_classify_untrained() {
    let config = BenchConfig::default();
    let query = stripes("q", true, 0).image;
    for kind in AlgorithmKind::value_variants() {
        let algorithm = kind.build(&config);
        let err = algorithm.classify(&query).unwrap_err();
        assert!(matches!(err, ClassifierErr::NotTrained), "{:?}", kind);
    }
}

#[test]
fn single_class_training_is_rejected() {
    let config = BenchConfig::default();
    let data: Vec<_> = (0..3).map(|p| stripes(&format!("v{}", p), true, p)).collect();
    for kind in [AlgorithmKind::Patches, AlgorithmKind::Pyramid, AlgorithmKind::Knn] {
        let err = kind.build(&config).train(&data).unwrap_err();
        assert!(matches!(err, ClassifierErr::NotTrainable(_)), "{:?}", kind);
    }
}

#[test]
fn patch_bovw_learns_stripe_orientation() {
    let mut config = BenchConfig::default();
    config.patches.codebook_size = 16;
    let bovw = BagOfWordsClassifier::patches(&config);

    let training = stripe_set("train", &[0, 1, 2, 3]);
    let testing = stripe_set("test", &[0, 1, 2, 3]);
    let report = evaluate(&bovw, &training, &testing).unwrap();
    assert_eq!(report.total(), 8);
    assert!(report.accuracy().unwrap() >= 75., "{}", report);
}

#[test]
fn retraining_replaces_the_model() {
    let mut config = BenchConfig::default();
    config.patches.codebook_size = 8;
    let bovw = BagOfWordsClassifier::patches(&config);
    bovw.train(&stripe_set("a", &[0, 1])).unwrap();
    assert_eq!(bovw.cache().len(), 4);
    bovw.train(&stripe_set("b", &[2, 3])).unwrap();
    // the cache only holds the second session's images
    assert_eq!(bovw.cache().len(), 4);
    let result = bovw.classify(&stripes("q", true, 1).image).unwrap();
    assert_eq!(result.len(), 1);
    // classifying does not store the query's features
    assert_eq!(bovw.cache().len(), 4);
}

#[test]
fn knn_is_deterministic_and_correct() {
    let training: Vec<_> = (0..6)
        .map(|i| ramp(&format!("l{}", i), true, i))
        .chain((0..6).map(|i| ramp(&format!("r{}", i), false, i)))
        .collect();
    let knn = KNearestNeighbour::new(3);
    knn.train(&training).unwrap();

    let query = ramp("q", true, 11).image;
    let first = knn.classify(&query).unwrap();
    let second = knn.classify(&query).unwrap();
    assert_eq!(first, second);
    let (label, confidence) = first.most_likely().unwrap();
    assert_eq!(label, "left");
    assert!(confidence > 0.5 && confidence <= 1.);
}

#[test]
fn benchmark_runs_algorithms_side_by_side() {
    let mut config = BenchConfig::default();
    config.patches.codebook_size = 8;
    let algorithms = vec![
        AlgorithmKind::Patches.build(&config),
        AlgorithmKind::Random.build(&config),
    ];
    let training = stripe_set("train", &[0, 1, 2]);
    let testing = stripe_set("test", &[3]);
    let reports = harness::benchmark(&algorithms, &training, &testing);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].as_ref().unwrap().algorithm, "BoVW");
    assert_eq!(reports[1].as_ref().unwrap().algorithm, "Random");
    assert_eq!(reports[1].as_ref().unwrap().total(), 2);
}

#[test]
fn sift_bovw_trains_and_classifies() {
    let sift = BagOfWordsClassifier::sift(&small_codebooks());
    let report = evaluate(&sift, &spots_and_bars("train", 0..4), &spots_and_bars("test", 4..8)).unwrap();
    assert_eq!(report.algorithm, "SIFTBoVW");
    assert_eq!(report.total(), 8);
    assert!(report.skipped.is_empty());

    let words = sift.codebook_len().unwrap();
    assert!(words > 0 && words <= 8);
    assert_eq!(sift.encode_image(&spot("q", 2).image).unwrap().len(), words);
    assert!(report.accuracy().unwrap() >= 50., "{}", report);
}

#[test]
fn surf_bovw_maps_l2_histograms_through_chi2() {
    let surf = BagOfWordsClassifier::surf(&small_codebooks());
    let report = evaluate(&surf, &spots_and_bars("train", 0..4), &spots_and_bars("test", 4..8)).unwrap();
    assert_eq!(report.total(), 8);

    let words = surf.codebook_len().unwrap();
    let spot_vector = surf.encode_image(&spot("q", 5).image).unwrap();
    assert_eq!(spot_vector.len(), 3 * words);
    assert!(spot_vector.iter().any(|&v| v != 0.));
    // bars have no blob-like interest points, so their histogram stays empty
    let bar_vector = surf.encode_image(&bars("q", 1).image).unwrap();
    assert!(bar_vector.iter().all(|&v| v == 0.));
    assert_eq!(surf.classify(&spot("q", 5).image).unwrap().len(), 1);
}

#[test]
fn pyramid_scores_every_class_over_spatial_blocks() {
    let config = small_codebooks();
    let pyramid = BagOfWordsClassifier::pyramid(&config);
    let report = evaluate(&pyramid, &spots_and_bars("train", 0..4), &spots_and_bars("test", 4..8)).unwrap();
    assert_eq!(report.algorithm, "PyramidSift");
    assert_eq!(report.total(), 8);

    let words = pyramid.codebook_len().unwrap();
    let blocks = (config.pyramid.blocks.blocks_x * config.pyramid.blocks.blocks_y) as usize;
    let x = pyramid.encode_image(&bars("q", 6).image).unwrap();
    assert_eq!(x.len(), blocks * words);
    let norm: f32 = x.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.).abs() < 1e-4);

    let result = pyramid.classify(&spot("q", 3).image).unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.confidence("spot").is_some() && result.confidence("bars").is_some());
}

#[test]
fn pyramid_codebook_uses_looser_threshold_than_histograms() {
    let mut config = small_codebooks();
    // nothing reaches the histogram threshold, yet a codebook is still learnt
    config.pyramid.histogram_threshold = f32::MAX;
    let pyramid = BagOfWordsClassifier::pyramid(&config);
    pyramid.train(&spots_and_bars("train", 0..4)).unwrap();
    assert!(pyramid.codebook_len().unwrap() > 0);
    let x = pyramid.encode_image(&bars("q", 0).image).unwrap();
    assert!(x.iter().all(|&v| v == 0.));
}
