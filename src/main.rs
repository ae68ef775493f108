//! CLI for building, querying and checking tree indexes

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tree_index::query::RStarTreeIndex;
use tree_index::settings::load_json;
use tree_index::tree::TreeStats;
use tree_index::{
    DistanceList, DistanceMetric, LinearScan, MTree, MTreeSettings, MemoryRelation, MkMaxSettings,
    MkMaxTree, QueryBuilder, RStarTree, RStarTreeSettings, RdKnnSettings, RdKnnTree, Relation,
    StatisticsSnapshot, Vector,
};

#[derive(Parser)]
#[command(name = "treeidx")]
#[command(about = "Build, query and verify R*-tree and M-tree indexes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TreeKind {
    Rstar,
    Mtree,
    Mkmax,
    Rdknn,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Metric {
    Euclidean,
    Manhattan,
    Maximum,
    Cosine,
}

impl From<Metric> for DistanceMetric {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Euclidean => DistanceMetric::Euclidean,
            Metric::Manhattan => DistanceMetric::Manhattan,
            Metric::Maximum => DistanceMetric::Maximum,
            Metric::Cosine => DistanceMetric::Cosine,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build a tree over random points and check every kNN result against a linear scan
    Verify {
        #[arg(long, default_value = "1000")]
        points: usize,
        #[arg(long, default_value = "2")]
        dim: usize,
        #[arg(long, default_value = "100")]
        queries: usize,
        #[arg(short, long, default_value = "10")]
        k: usize,
        #[arg(long, value_enum, default_value = "rstar")]
        tree: TreeKind,
        /// Node capacity (leaf and directory)
        #[arg(long, default_value = "20")]
        capacity: usize,
        #[arg(long, default_value = "42")]
        seed: u64,
    },
    /// Bulk-load an R*-tree from a CSV file and save it
    Build {
        /// One comma-separated vector per line
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// R*-tree settings as JSON
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// k nearest neighbors of a query vector
    Knn {
        #[arg(long)]
        index: PathBuf,
        /// The CSV file the index was built from
        #[arg(long)]
        input: PathBuf,
        /// Query vector as comma-separated values (e.g., "1.0,2.0")
        #[arg(long)]
        query: String,
        #[arg(short, long, default_value = "5")]
        k: usize,
        #[arg(long, value_enum, default_value = "euclidean")]
        distance: Metric,
    },
    /// All objects within a radius of a query vector
    Range {
        #[arg(long)]
        index: PathBuf,
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        query: String,
        #[arg(long)]
        radius: f64,
        #[arg(long, value_enum, default_value = "euclidean")]
        distance: Metric,
    },
    /// Print tree statistics as JSON
    Stats {
        #[arg(long)]
        index: PathBuf,
    },
}

#[derive(Serialize)]
struct StatsReport<'a> {
    tree: TreeStats,
    dimension: Option<usize>,
    settings: &'a RStarTreeSettings,
}

fn random_relation(n: usize, dim: usize, rng: &mut StdRng) -> MemoryRelation<Vector> {
    (0..n)
        .map(|_| Vector::new((0..dim).map(|_| rng.gen_range(0.0..1.0)).collect()))
        .collect()
}

fn read_relation(path: &Path) -> Result<MemoryRelation<Vector>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let relation = MemoryRelation::from_csv(BufReader::new(file))
        .with_context(|| format!("cannot parse {}", path.display()))?;
    info!("read {} vectors from {}", relation.len(), path.display());
    Ok(relation)
}

fn print_results(results: &DistanceList) {
    if results.is_empty() {
        println!("No results found");
        return;
    }
    for (i, n) in results.iter().enumerate() {
        println!("{}. {} (distance: {:.6})", i + 1, n.oid, n.distance);
    }
}

fn print_statistics(snapshot: StatisticsSnapshot) {
    println!(
        "distance computations: {}, page reads: {}, page writes: {}",
        snapshot.distance_calcs, snapshot.page_reads, snapshot.page_writes
    );
}

fn verify(
    points: usize,
    dim: usize,
    queries: usize,
    k: usize,
    kind: TreeKind,
    capacity: usize,
    seed: u64,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let relation = random_relation(points, dim, &mut rng);
    let query_points = random_relation(queries, dim, &mut rng);
    let distance = DistanceMetric::Euclidean;
    let scan = LinearScan::new(&relation, &distance);

    let start = Instant::now();
    let mut mismatches = 0;
    let mut check = |tree_result: DistanceList, query: &Vector| -> Result<()> {
        if tree_result != scan.knn(query, k)? {
            mismatches += 1;
        }
        Ok(())
    };

    let (height, build_time, statistics) = match kind {
        TreeKind::Rstar => {
            let tree = RStarTree::from_relation(&relation, RStarTreeSettings::new(capacity, capacity))?;
            let build_time = start.elapsed();
            tree.check_integrity()?;
            for (_, q) in query_points.iter() {
                check(tree.knn(&distance, q.as_slice(), k)?, q)?;
            }
            (tree.height(), build_time, tree.statistics().snapshot())
        }
        TreeKind::Mtree => {
            let tree = MTree::from_relation(&relation, distance, MTreeSettings::new(capacity, capacity))?;
            let build_time = start.elapsed();
            tree.check_integrity(&relation)?;
            for (_, q) in query_points.iter() {
                check(tree.knn(&relation, q, k)?, q)?;
            }
            (tree.height(), build_time, tree.statistics().snapshot())
        }
        TreeKind::Mkmax => {
            let settings = MkMaxSettings::new(MTreeSettings::new(capacity, capacity), k);
            let tree = MkMaxTree::from_relation(&relation, distance, settings)?;
            let build_time = start.elapsed();
            tree.check_integrity(&relation)?;
            for (_, q) in query_points.iter() {
                check(tree.knn(&relation, q, k)?, q)?;
            }
            for id in relation.ids().into_iter().take(queries) {
                if tree.rknn(&relation, id, k)? != scan.rknn_by_id(id, k)? {
                    bail!("reverse kNN of {} differs from the linear scan", id);
                }
            }
            (tree.height(), build_time, tree.statistics().snapshot())
        }
        TreeKind::Rdknn => {
            let settings = RdKnnSettings::new(RStarTreeSettings::new(capacity, capacity), k);
            let tree = RdKnnTree::from_relation(&relation, distance, settings)?;
            let build_time = start.elapsed();
            tree.check_integrity()?;
            for (_, q) in query_points.iter() {
                check(tree.knn(q.as_slice(), k)?, q)?;
            }
            for (id, v) in relation.iter().take(queries) {
                if tree.rknn(v, k)? != scan.rknn_by_id(id, k)? {
                    bail!("reverse kNN of {} differs from the linear scan", id);
                }
            }
            (tree.height(), build_time, tree.statistics().snapshot())
        }
    };
    let total = start.elapsed();

    println!("tree: {:?}, points: {}, dimension: {}", kind, points, dim);
    println!("height: {}", height);
    println!("build: {:?}, build + queries: {:?}", build_time, total);
    print_statistics(statistics);
    if mismatches > 0 {
        bail!("{} of {} kNN queries differ from the linear scan", mismatches, queries);
    }
    println!("all {} kNN queries match the linear scan", queries);
    Ok(())
}

fn build(input: &Path, output: &Path, config: Option<&Path>) -> Result<()> {
    let settings = match config {
        Some(path) => load_json::<RStarTreeSettings>(path)
            .with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => RStarTreeSettings::default(),
    };
    let relation = read_relation(input)?;
    let start = Instant::now();
    let tree = RStarTree::from_relation(&relation, settings)?;
    info!(
        "bulk loaded {} objects in {:?}, height {}",
        tree.len(),
        start.elapsed(),
        tree.height()
    );
    tree.save(output)?;
    println!("Saved {} objects to {}", tree.len(), output.display());
    Ok(())
}

fn open_index<'r>(
    index: &Path,
    relation: &'r MemoryRelation<Vector>,
) -> Result<RStarTreeIndex<'r, MemoryRelation<Vector>>> {
    let tree = RStarTree::open(index).with_context(|| format!("cannot open {}", index.display()))?;
    if tree.len() != relation.len() {
        bail!(
            "index holds {} objects but the input has {}",
            tree.len(),
            relation.len()
        );
    }
    Ok(RStarTreeIndex::new(tree, relation))
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            points,
            dim,
            queries,
            k,
            tree,
            capacity,
            seed,
        } => verify(points, dim, queries, k, tree, capacity, seed)?,
        Commands::Build {
            input,
            output,
            config,
        } => build(&input, &output, config.as_deref())?,
        Commands::Knn {
            index,
            input,
            query,
            k,
            distance,
        } => {
            let relation = read_relation(&input)?;
            let index = open_index(&index, &relation)?;
            let query = Vector::from_str(&query)?;
            let distance = DistanceMetric::from(distance);
            let builder = QueryBuilder::new(&relation, &distance).with_index(&index);
            print_results(&builder.knn().knn_by_object(&query, k)?);
        }
        Commands::Range {
            index,
            input,
            query,
            radius,
            distance,
        } => {
            let relation = read_relation(&input)?;
            let index = open_index(&index, &relation)?;
            let query = Vector::from_str(&query)?;
            let distance = DistanceMetric::from(distance);
            let builder = QueryBuilder::new(&relation, &distance).with_index(&index);
            print_results(&builder.range().range_by_object(&query, radius)?);
        }
        Commands::Stats { index } => {
            let tree = RStarTree::open(&index)
                .with_context(|| format!("cannot open {}", index.display()))?;
            let report = StatsReport {
                tree: tree.stats(),
                dimension: tree.dimension(),
                settings: tree.settings(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
