use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand};
use env_logger::Builder;
use log::LevelFilter;
use rayon::prelude::*;

use pqsearch_rs::io::{read_fvecs, read_groundtruth, uniform_dim, write_ids};
use pqsearch_rs::math::normalize;
use pqsearch_rs::{
    EmptyClusterPolicy, FlatIndex, PqConfig, PqError, PqIndex, SearchParams, SearchResult,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Build and query product-quantization indexes over .fvecs datasets.
#[derive(Parser, Debug)]
#[command(name = "pq_search")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Error;
        }
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a PQ index on a base set and save it
    Build(BuildArgs),
    /// Search a saved PQ index
    Query(QueryArgs),
    /// Exact search over raw vectors; can emit ground truth
    Flat(FlatArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Base vectors (.fvecs)
    #[arg(long)]
    base: PathBuf,

    /// Where to write the index
    #[arg(long)]
    save: PathBuf,

    /// JSON build configuration; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of subspaces (M)
    #[arg(long)]
    subspaces: Option<usize>,

    /// Clusters per subspace (C)
    #[arg(long)]
    clusters: Option<usize>,

    #[arg(long)]
    max_iter: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Reseed empty clusters from the worst-fitting sample
    #[arg(long)]
    reseed_empty: bool,

    /// Unit-normalize base vectors before training
    #[arg(long)]
    normalize: bool,

    /// Only read the first N base vectors
    #[arg(long)]
    max_base: Option<usize>,
}

#[derive(Args, Debug)]
struct EvalArgs {
    /// Query vectors (.fvecs)
    #[arg(long)]
    queries: PathBuf,

    /// Ground-truth neighbour ids (.ivecs) for recall
    #[arg(long)]
    gt: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    top_k: usize,

    /// Unit-normalize query vectors
    #[arg(long)]
    normalize: bool,

    #[arg(long)]
    max_queries: Option<usize>,

    /// Write result ids to this .ivecs file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct QueryArgs {
    /// Index written by `build`
    #[arg(long)]
    load: PathBuf,

    #[command(flatten)]
    eval: EvalArgs,
}

#[derive(Args, Debug)]
struct FlatArgs {
    /// Base vectors (.fvecs)
    #[arg(long)]
    base: PathBuf,

    #[arg(long)]
    max_base: Option<usize>,

    #[command(flatten)]
    eval: EvalArgs,
}

fn main() {
    let cli = Cli::parse();

    Builder::new()
        .filter_level(cli.log_level())
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .init();

    if let Err(err) = run(cli.command) {
        eprintln!("Error: {err}");
        let mut source = err.source();
        while let Some(inner) = source {
            eprintln!("  caused by: {inner}");
            source = inner.source();
        }
        process::exit(1);
    }
}

fn run(command: Command) -> CliResult<()> {
    match command {
        Command::Build(args) => run_build(&args),
        Command::Query(args) => run_query(&args),
        Command::Flat(args) => run_flat(&args),
    }
}

fn build_config(args: &BuildArgs) -> CliResult<PqConfig> {
    let mut config = match &args.config {
        Some(path) => PqConfig::from_json_path(path)?,
        None => PqConfig::default(),
    };
    if let Some(subspaces) = args.subspaces {
        config.subspace_num = subspaces;
    }
    if let Some(clusters) = args.clusters {
        config.clusters_per_subspace = clusters;
    }
    if let Some(max_iter) = args.max_iter {
        config.max_iter = max_iter;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.reseed_empty {
        config.empty_cluster_policy = EmptyClusterPolicy::ReseedFromWorstFit;
    }
    Ok(config)
}

fn load_vectors(
    path: &Path,
    limit: Option<usize>,
    unit: bool,
    what: &str,
) -> CliResult<Vec<Vec<f32>>> {
    println!("Loading {what} vectors from {}...", path.display());
    let mut vectors = read_fvecs(path, limit)?;
    let dim = uniform_dim(&vectors)?;
    if unit {
        vectors.par_iter_mut().for_each(|v| {
            normalize(v);
        });
    }
    println!("Loaded {} {what} vectors (dim: {dim})", vectors.len());
    Ok(vectors)
}

fn run_build(args: &BuildArgs) -> CliResult<()> {
    let config = build_config(args)?;
    let base = load_vectors(&args.base, args.max_base, args.normalize, "base")?;

    println!(
        "Training PQ index (M={}, C={}, max_iter={}, seed={:#x}, empty clusters: {:?})...",
        config.subspace_num,
        config.clusters_per_subspace,
        config.max_iter,
        config.seed,
        config.empty_cluster_policy
    );
    let start = Instant::now();
    let index = PqIndex::train(&base, &config)?;
    let elapsed = start.elapsed();

    println!("\n=== Index Built ===");
    println!("Time: {:.2?}", elapsed);
    println!("Vectors: {}", index.len());
    println!(
        "Subspaces: {} x {} dims, code width: {:?}",
        index.subspace_num(),
        index.sub_dim(),
        index.codes().width()
    );

    println!("\nSaving index to {}...", args.save.display());
    index.save_to_path(&args.save)?;
    println!("Index saved successfully");
    Ok(())
}

fn run_query(args: &QueryArgs) -> CliResult<()> {
    println!("Loading PQ index from {}...", args.load.display());
    let index = PqIndex::load_from_path(&args.load)?;
    println!(
        "Index loaded ({} vectors, dim {}, {} subspaces)",
        index.len(),
        index.dim(),
        index.subspace_num()
    );
    evaluate(&args.eval, |query, params| index.search(query, params))
}

fn run_flat(args: &FlatArgs) -> CliResult<()> {
    let base = load_vectors(&args.base, args.max_base, args.eval.normalize, "base")?;
    let index = FlatIndex::new(&base)?;
    drop(base);
    evaluate(&args.eval, |query, params| index.search(query, params))
}

fn evaluate<F>(args: &EvalArgs, search: F) -> CliResult<()>
where
    F: Fn(&[f32], SearchParams) -> Result<Vec<SearchResult>, PqError> + Sync,
{
    let queries = load_vectors(&args.queries, args.max_queries, args.normalize, "query")?;
    let groundtruth = match &args.gt {
        Some(path) => {
            println!("Loading ground truth from {}...", path.display());
            let gt = read_groundtruth(path, args.max_queries)?;
            if gt.len() != queries.len() {
                return Err("Ground truth count doesn't match query count".into());
            }
            Some(gt)
        }
        None => None,
    };

    let params = SearchParams::new(args.top_k);
    println!(
        "\nEvaluating {} queries (top-k={})...",
        queries.len(),
        args.top_k
    );

    let start = Instant::now();
    let timed: Vec<(Vec<SearchResult>, Duration)> = queries
        .par_iter()
        .map(|query| {
            let query_start = Instant::now();
            let results = search(query, params)?;
            Ok((results, query_start.elapsed()))
        })
        .collect::<Result<_, PqError>>()?;
    let total_time = start.elapsed();

    let (results, latencies): (Vec<Vec<SearchResult>>, Vec<Duration>) = timed.into_iter().unzip();

    println!("\n=== Results ===");
    if let Some(groundtruth) = &groundtruth {
        println!(
            "Recall@{}: {:.4}",
            args.top_k,
            recall(&results, groundtruth, args.top_k)
        );
    }
    println!("QPS: {:.2}", queries.len() as f64 / total_time.as_secs_f64());
    print_latencies(&latencies);

    if let Some(path) = &args.output {
        let ids: Vec<Vec<usize>> = results
            .iter()
            .map(|row| row.iter().map(|r| r.id).collect())
            .collect();
        write_ids(path, &ids)?;
        println!("\nWrote result ids to {}", path.display());
    }
    Ok(())
}

fn recall(results: &[Vec<SearchResult>], groundtruth: &[Vec<usize>], top_k: usize) -> f64 {
    let mut hits = 0usize;
    let mut possible = 0usize;
    for (row, gt) in results.iter().zip(groundtruth) {
        let limit = top_k.min(gt.len());
        possible += limit;
        let gt_set: HashSet<usize> = gt[..limit].iter().copied().collect();
        hits += row
            .iter()
            .take(limit)
            .filter(|r| gt_set.contains(&r.id))
            .count();
    }
    if possible > 0 {
        hits as f64 / possible as f64
    } else {
        0.0
    }
}

fn print_latencies(latencies: &[Duration]) {
    let mut sorted = latencies.to_vec();
    sorted.sort();
    let percentile = |p: usize| {
        sorted
            .get(sorted.len() * p / 100)
            .map(|d| d.as_micros())
            .unwrap_or(0)
    };
    let avg = if sorted.is_empty() {
        0
    } else {
        sorted.iter().map(|d| d.as_micros()).sum::<u128>() / sorted.len() as u128
    };

    println!("\nLatency (us):");
    println!("  Avg: {:>8}", avg);
    println!("  P50: {:>8}", percentile(50));
    println!("  P95: {:>8}", percentile(95));
    println!("  P99: {:>8}", percentile(99));
    println!(
        "  Max: {:>8}",
        sorted.last().map(|d| d.as_micros()).unwrap_or(0)
    );
}
