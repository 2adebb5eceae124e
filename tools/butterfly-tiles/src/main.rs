//! # Butterfly-tiles CLI
//!
//! Command-line interface for the butterfly-tiles converter.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context as _, Result};
use butterfly_common::config::parse_lods;
use butterfly_common::{ConvertConfig, LineSimplification, Sorting};
use butterfly_io::{lookup_path, Lookup, Meta, TileDb};
use clap::{ArgAction, Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "butterfly-tiles")]
#[command(about = "Convert OpenStreetMap PBF extracts into a multi-LOD tile database")]
#[command(long_about = "Converts an .osm.pbf file into per-LOD tile files:
  butterfly-tiles convert monaco.osm.pbf tiles/
  butterfly-tiles convert planet.osm.pbf tiles/ --lods 1-0-0-4-0-0-0-0-16-0-0-0-0-0-0-64
  butterfly-tiles inspect tiles/

LOD counts are root tile counts (a value n gives an n x n grid), coarsest
LOD first; 0 disables a LOD.")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a PBF file into a tile database
    Convert {
        /// Input .osm.pbf file
        input: PathBuf,
        /// Output directory
        output: PathBuf,
        /// Also write human-readable .txt siblings of every file
        #[arg(long)]
        debug: bool,
        /// Line simplification: dp (Douglas-Peucker) or vw (Visvalingam-Whyatt)
        #[arg(long)]
        line: Option<LineSimplification>,
        /// Tile assignment: first, most or subdivide
        #[arg(long)]
        sort: Option<Sorting>,
        /// Dash-separated root tile counts for LOD 0 to 15
        #[arg(long)]
        lods: Option<String>,
        /// More log output (repeatable)
        #[arg(short, long, action = ArgAction::Count)]
        verbose: u8,
        /// TOML file with conversion settings; flags override it
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the meta file and per-LOD summaries of a tile database
    Inspect {
        /// Database directory
        dir: PathBuf,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("❌ Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    match Cli::parse().command {
        Commands::Convert {
            input,
            output,
            debug,
            line,
            sort,
            lods,
            verbose,
            config,
        } => {
            let mut config = match config {
                Some(path) => ConvertConfig::from_toml_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => ConvertConfig::default(),
            };
            config.input = input;
            config.output = output;
            config.debug_text |= debug;
            if let Some(line) = line {
                config.simplification = line;
            }
            if let Some(sort) = sort {
                config.sorting = sort;
            }
            if let Some(lods) = lods {
                config.lods = parse_lods(&lods)?;
            }
            config.verbosity = config.verbosity.raised(verbose);

            // Initialize logging to stderr; RUST_LOG still wins
            env_logger::Builder::new()
                .filter_level(config.verbosity.level_filter())
                .parse_default_env()
                .target(env_logger::Target::Stderr)
                .init();

            convert(&config)
        }
        Commands::Inspect { dir } => inspect(&dir),
    }
}

fn convert(config: &ConvertConfig) -> Result<()> {
    config.validate()?;
    let start = Instant::now();
    println!("🦋 Butterfly-tiles v{}", env!("CARGO_PKG_VERSION"));
    println!("📂 Input:  {}", config.input.display());
    println!("📁 Output: {}", config.output.display());
    println!(
        "⚙️  {} / {} / LODs {:?}",
        config.simplification,
        config.sorting,
        config.active_lods()
    );

    let progress =
        cli::ProgressManager::new(&format!("🗺️  Converting {}", config.input.display()));
    let result = butterfly_tiles::convert(config, Some(progress.callback()));
    progress.finish();
    let report = result.with_context(|| format!("converting {}", config.input.display()))?;

    let s = &report.ingest;
    println!("\n✓ Ingestion finished in {} sub-pass(es)", s.sub_passes);
    println!("  Nodes:      {} read, {} out of range", s.nodes, s.out_of_range);
    println!("  Singles:    {}", s.singles);
    println!(
        "  Ways:       {} read, {} skipped, {} corrupt, {} pending ({} promoted, {} dropped)",
        s.ways, s.skipped_ways, s.corrupt_ways, s.pending_ways, s.promoted_ways, s.dropped_ways
    );
    println!(
        "  Relations:  {} read, {} skipped, {} corrupt, {} pending ({} promoted, {} dropped)",
        s.relations,
        s.skipped_relations,
        s.corrupt_relations,
        s.pending_relations,
        s.promoted_relations,
        s.dropped_relations
    );
    if s.skipped_blocks > 0 {
        println!("  Blocks skipped: {}", s.skipped_blocks);
    }
    if s.reconcile_passes > 0 {
        println!("  Reconciliation passes: {}", s.reconcile_passes);
    }

    println!("\n✓ Tiles written");
    for lod in &report.lods {
        println!(
            "  LOD {:02}: {:>8} tiles, {:>9} ways, {:>7} relations ({} merged, {} dropped)",
            lod.lod, lod.tiles, lod.ways, lod.relations, lod.merged, lod.dropped
        );
    }
    println!(
        "\n✓ Meta: {} ways, {} relations",
        report.meta.way_count, report.meta.relation_count
    );
    println!("⏱️  Total time: {}", cli::format_elapsed(start.elapsed()));
    Ok(())
}

fn inspect(dir: &Path) -> Result<()> {
    let meta = Meta::read(dir).with_context(|| format!("reading meta in {}", dir.display()))?;
    let (major, minor, patch) = meta.version;
    let b = meta.bbox;
    println!("📁 {}", dir.display());
    println!("  Version:        {major}.{minor}.{patch}");
    println!(
        "  Bounding box:   {:.7} {:.7} {:.7} {:.7}",
        b.min_lat, b.max_lat, b.min_lon, b.max_lon
    );
    println!("  Ways:           {}", meta.way_count);
    println!("  Relations:      {}", meta.relation_count);
    println!("  Sorting:        {}", meta.sorting);
    println!("  Simplification: {}", meta.simplification);

    for &lod in &meta.lods {
        let lod = lod as usize;
        let path = lookup_path(dir, lod);
        let lookup = Lookup::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let mut db = TileDb::open(dir, lod)?;
        let (mut ways, mut relations, mut filled) = (0usize, 0usize, 0usize);
        for i in 0..db.tile_count() {
            let tile = db.tile(i)?;
            ways += tile.ways.len();
            relations += tile.relations.len();
            if !tile.is_empty() {
                filled += 1;
            }
        }
        println!(
            "  LOD {lod:02}: {} tiles ({filled} filled), step {:.7} x {:.7}, {ways} ways, {relations} relations",
            lookup.tiles.len(),
            lookup.lat_step,
            lookup.lon_step
        );
    }
    Ok(())
}
