//! classbench CLI: train and evaluate image classifiers on directory datasets.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

use classbench::dataset::{GroupDataset, GroupedRandomSplitter, ListDataset};
use classbench::harness::{benchmark, classify_all, write_results};
use classbench::{AlgorithmKind, BenchConfig, ClassifierErr, ClassifierResult};

#[derive(Parser, Debug)]
#[command(name = "classbench", version, about = "Image classification benchmark")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
    /// Log verbosity level.
    #[arg(long, value_enum, global = true, default_value = "info")]
    log_level: LogLevel,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on a grouped directory and classify a flat directory of images.
    Classify {
        #[arg(long, value_enum)]
        algorithm: AlgorithmKind,
        /// Directory with one subdirectory of images per class.
        #[arg(long, value_name = "DIR")]
        training: PathBuf,
        /// Directory of unlabeled images.
        #[arg(long, value_name = "DIR")]
        testing: PathBuf,
        /// Results file to write.
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
        /// YAML configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Split a grouped directory per class and report accuracy.
    Evaluate {
        /// Directory with one subdirectory of images per class.
        #[arg(long, value_name = "DIR")]
        training: PathBuf,
        /// Training images taken from each class.
        #[arg(long)]
        num_training: usize,
        /// Testing images taken from each class.
        #[arg(long)]
        num_testing: usize,
        /// Algorithms to run side by side; all of them when omitted.
        #[arg(long, value_enum)]
        algorithm: Vec<AlgorithmKind>,
        /// Directory receiving one results file per algorithm.
        #[arg(long, value_name = "DIR")]
        results_dir: Option<PathBuf>,
        /// YAML configuration file.
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

fn init_logging(level: LogLevel) {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stderr);
    builder.filter_level(level.filter());
    builder.parse_default_env();
    let _ = builder.try_init();
}

fn load_config(path: Option<&Path>) -> ClassifierResult<BenchConfig> {
    match path {
        Some(path) => BenchConfig::load(path),
        None => Ok(BenchConfig::default()),
    }
}

fn run_classify(
    algorithm: AlgorithmKind,
    training: &Path,
    testing: &Path,
    output: Option<&Path>,
    config: &BenchConfig,
) -> ClassifierResult<()> {
    println!("Loading datasets...");
    let training = GroupDataset::load(training)?;
    let testing = ListDataset::load(testing)?;

    println!("Training the classifier...");
    let classifier = algorithm.build(config);
    classifier.train(&training.labeled())?;

    println!("Classifying testing set...");
    let lines = classify_all(classifier.as_ref(), testing.images())?;
    for line in &lines {
        println!("{}", line);
    }
    if let Some(output) = output {
        write_results(output, &lines)?;
        info!("results written to {}", output.display());
    }
    Ok(())
}

fn run_evaluate(
    algorithms: &[AlgorithmKind],
    training: &Path,
    splitter: GroupedRandomSplitter,
    results_dir: Option<&Path>,
    config: &BenchConfig,
) -> ClassifierResult<()> {
    println!("Loading dataset...");
    let dataset = GroupDataset::load(training)?;
    let split = splitter.split(&dataset);
    info!(
        "{} training and {} testing images",
        split.training.len(),
        split.testing.len()
    );

    let kinds: Vec<AlgorithmKind> = if algorithms.is_empty() {
        AlgorithmKind::value_variants().to_vec()
    } else {
        algorithms.to_vec()
    };
    let built: Vec<_> = kinds.iter().map(|k| k.build(config)).collect();

    if let Some(dir) = results_dir {
        std::fs::create_dir_all(dir)?;
    }
    for (algorithm, report) in built
        .iter()
        .zip(benchmark(&built, &split.training, &split.testing))
    {
        match report {
            Ok(report) => {
                println!("== {} ==", algorithm.name());
                println!("{}", report);
                if let Some(dir) = results_dir {
                    report.write_results(dir.join(format!("{}.txt", algorithm.name())))?;
                }
            }
            Err(e) => error!("{} failed: {}", algorithm.name(), e),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = CliArgs::parse();
    init_logging(cli.log_level);

    let result = match &cli.command {
        Command::Classify {
            algorithm,
            training,
            testing,
            output,
            config,
        } => load_config(config.as_deref())
            .and_then(|c| run_classify(*algorithm, training, testing, output.as_deref(), &c)),
        Command::Evaluate {
            training,
            num_training,
            num_testing,
            algorithm,
            results_dir,
            config,
        } => load_config(config.as_deref()).and_then(|c| {
            let splitter = GroupedRandomSplitter::new(*num_training, *num_testing, c.seed);
            run_evaluate(algorithm, training, splitter, results_dir.as_deref(), &c)
        }),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(ClassifierErr::DatasetLoadFailure { path, reason }) => {
            eprintln!("Couldn't load dataset: {}: {}", path, reason);
            ExitCode::from(1)
        }
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}
