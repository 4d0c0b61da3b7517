use std::{collections::HashMap, fs, path::PathBuf, time::Instant};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use resolution_lib::{
    error::ResolutionError,
    io::{csv_loader::load_csv, csv_writer::{write_csv, write_matches_csv}},
    models::{
        dataset::{common_columns, Dataset},
        matching::ConflictStrategy,
        stats_models::similarity_histogram,
    },
    pipeline::orchestrator::{ensure_distinct_names, resolve_all},
    standardization::{
        rules::manual_rules_from_yaml_file,
        standardizer::{standardize, PreviewSamples, StandardizationMode, StandardizationOptions},
    },
    utils::{
        abbreviations::AbbreviationMap, env::load_env, get_memory_usage,
        progress_config::ProgressConfig, resolution_config::ResolutionConfig,
    },
};

const HISTOGRAM_BINS: usize = 20;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Copy the conventions of one reference dataset
    Reference,
    /// Explicit per-column rules from a YAML file
    Manual,
    /// Reference dataset chosen per column
    PerColumn,
    /// Infer rules from each column's own values
    Majority,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input CSV files, resolved left to right
    #[arg(long = "input", required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Standardization mode
    #[arg(long, value_enum, default_value_t = ModeArg::Majority)]
    mode: ModeArg,

    /// Reference dataset (file name) for reference mode
    #[arg(long)]
    reference: Option<String>,

    /// YAML rules file for manual mode
    #[arg(long)]
    rules: Option<PathBuf>,

    /// Reference dataset per column for per-column mode, as col=dataset
    #[arg(long = "column-source", value_parser = parse_key_value)]
    column_sources: Vec<(String, String)>,

    /// YAML mapping of abbreviations to expansions
    #[arg(long)]
    abbreviations: Option<PathBuf>,

    /// Conflict strategy per column, as col=strategy
    #[arg(long = "conflict", value_parser = parse_key_value)]
    conflicts: Vec<(String, String)>,

    /// Strategy for columns without an explicit --conflict
    #[arg(long)]
    default_conflict: Option<String>,

    #[arg(long)]
    tfidf_weight: Option<f64>,

    #[arg(long)]
    mse_weight: Option<f64>,

    /// Number of leading base rows considered per fold
    #[arg(long)]
    max_candidates: Option<usize>,

    /// Match selection: greedy or optimal
    #[arg(long)]
    strategy: Option<String>,

    /// Keep only rows with Final_Similarity at or above this value
    #[arg(long)]
    min_similarity: Option<f64>,

    /// Output CSV path
    #[arg(long, default_value = "resolved_entities.csv")]
    output: PathBuf,

    /// Directory for per-fold match tables
    #[arg(long)]
    matches_dir: Option<PathBuf>,

    /// Write run statistics as JSON to this path
    #[arg(long)]
    stats_output: Option<PathBuf>,

    /// Log before/after standardization samples
    #[arg(long)]
    preview: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
            Ok((k.trim().to_lowercase(), v.trim().to_string()))
        }
        _ => Err(format!("expected col=value, got '{}'", s)),
    }
}

fn standardization_options(args: &Args) -> anyhow::Result<StandardizationOptions> {
    let mode = match args.mode {
        ModeArg::Reference => match &args.reference {
            Some(dataset) => StandardizationMode::ReferenceDataset { dataset: dataset.clone() },
            None => bail!(ResolutionError::InvalidConfig(
                "--mode reference requires --reference <dataset>".to_string()
            )),
        },
        ModeArg::Manual => match &args.rules {
            Some(path) => StandardizationMode::Manual {
                rules: manual_rules_from_yaml_file(path)?,
            },
            None => bail!(ResolutionError::InvalidConfig(
                "--mode manual requires --rules <file>".to_string()
            )),
        },
        ModeArg::PerColumn => StandardizationMode::PerColumnSource {
            sources: args.column_sources.iter().cloned().collect(),
        },
        ModeArg::Majority => StandardizationMode::MajorityVote,
    };

    let mut options = StandardizationOptions::new(mode);
    if let Some(path) = &args.abbreviations {
        let abbreviations = AbbreviationMap::from_yaml_file(path)?;
        info!("Loaded {} abbreviations from {}", abbreviations.len(), path.display());
        options = options.with_abbreviations(abbreviations);
    }
    Ok(options)
}

fn conflict_strategies(args: &Args, common: &[String]) -> HashMap<String, ConflictStrategy> {
    let default = args
        .default_conflict
        .as_deref()
        .map(ConflictStrategy::from_name_or_default)
        .unwrap_or_default();
    let explicit: HashMap<String, ConflictStrategy> = args
        .conflicts
        .iter()
        .map(|(col, name)| (col.clone(), ConflictStrategy::from_name_or_default(name)))
        .collect();

    for col in explicit.keys() {
        if !common.contains(col) {
            warn!("Conflict strategy given for '{}', which is not a common column", col);
        }
    }

    let mut strategies: HashMap<String, ConflictStrategy> =
        common.iter().map(|c| (c.clone(), default)).collect();
    strategies.extend(explicit);
    strategies
}

fn log_previews(previews: &PreviewSamples) {
    for (col, samples) in previews {
        info!("🔍 Standardization preview for '{}'", col);
        for sample in samples {
            let original: Vec<String> = sample.original.iter().map(|v| v.to_string()).collect();
            let standardized: Vec<String> = sample.standardized.iter().map(|v| v.to_string()).collect();
            info!("   [{}] {:?} -> {:?}", sample.dataset, original, standardized);
        }
    }
}

fn log_histogram(dataset: &Dataset) {
    let histogram = similarity_histogram(dataset, HISTOGRAM_BINS);
    let max = histogram.iter().map(|b| b.count).max().unwrap_or(0).max(1);
    info!("📈 Final_Similarity distribution:");
    for bin in histogram.iter().filter(|b| b.count > 0) {
        let bar = "#".repeat((bin.count * 40).div_ceil(max));
        info!("   [{:.2}, {:.2}) {:>5} {}", bin.lower, bin.upper, bin.count, bar);
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize logging and environment
    env_logger::init();
    load_env();
    let args = Args::parse();
    let start = Instant::now();
    info!("Starting multi-dataset entity resolution over {} inputs", args.inputs.len());

    let mut config = ResolutionConfig::from_env();
    if let Some(w) = args.tfidf_weight {
        config.tfidf_weight = w;
    }
    if let Some(w) = args.mse_weight {
        config.mse_weight = w;
    }
    if let Some(cap) = args.max_candidates {
        config.max_candidates = cap;
    }
    if let Some(strategy) = &args.strategy {
        config.match_strategy = strategy.parse()?;
    }
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );
    let multi_progress = progress_config.create_multi_progress();

    if args.inputs.len() < 2 {
        bail!(ResolutionError::NotEnoughDatasets(args.inputs.len()));
    }
    let datasets = args
        .inputs
        .iter()
        .map(|p| load_csv(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    ensure_distinct_names(&datasets).context("Input files must have distinct file names")?;

    let common = common_columns(&datasets);
    if common.is_empty() {
        bail!(ResolutionError::NoCommonColumns {
            left: datasets[0].name().to_string(),
            right: datasets[1..]
                .iter()
                .map(|d| d.name())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    info!("Common columns: {:?}", common);

    let options = standardization_options(&args)?;
    let (cleaned, previews) =
        standardize(&datasets, &common, &options).context("Standardization failed")?;
    if args.preview {
        log_previews(&previews);
    }

    let strategies = conflict_strategies(&args, &common);
    let outcome = resolve_all(
        &cleaned,
        &strategies,
        &config,
        &progress_config,
        multi_progress.as_ref(),
    )
    .await?;

    if let Some(dir) = &args.matches_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        for (i, fold) in outcome.fold_matches.iter().enumerate() {
            let path = dir.join(format!("fold_{}_matches.csv", i + 1));
            write_matches_csv(&fold.matches, &path).with_context(|| {
                format!("Failed to write matches of '{}' ⨝ '{}'", fold.base_name, fold.incoming_name)
            })?;
        }
    }

    let resolved = match args.min_similarity {
        Some(threshold) => {
            let filtered = outcome.resolved.filter_by_min_similarity(threshold);
            info!(
                "Filtered to {} of {} rows with Final_Similarity >= {}",
                filtered.len(),
                outcome.resolved.len(),
                threshold
            );
            filtered
        }
        None => outcome.resolved,
    };

    write_csv(&resolved, &args.output)?;
    log_histogram(&resolved);

    for fold in &outcome.stats.folds {
        fold.log_summary();
    }
    if let Some(path) = &args.stats_output {
        let json = serde_json::to_string_pretty(&outcome.stats).context("Failed to serialize run statistics")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("💾 Wrote run statistics to {}", path.display());
    }
    info!(
        "Run {} complete in {:.2}s (memory: {} MB)",
        outcome.stats.run_id,
        start.elapsed().as_secs_f64(),
        get_memory_usage().await
    );
    Ok(())
}
