//! tilecascade CLI - Command-line interface
//!
//! This binary provides a command-line interface to the tilecascade
//! propagation engine: propagate expired tiles into a work queue, seed
//! tile pyramids, pre-populate the cache index, and manage the queue.

use clap::{Parser, Subcommand};
use std::error::Error;
use std::fs::File;
use std::path::PathBuf;
use std::process;
use tilecascade::config::{Config, DEFAULT_SET_KEY};
use tilecascade::coord::MAX_ZOOM;
use tilecascade::index::{make_cache_index, Progress};
use tilecascade::logging::{init_logging, DEFAULT_LOG_DIR, DEFAULT_LOG_FILE};
use tilecascade::metro::{city_bounds, parse_metro_extract};
use tilecascade::pipeline::{
    propagate, seed_into_index, seed_into_queue, PropagateConfig, SeedConfig,
};
use tilecascade::queue::{make_queue, QueueKind};

#[derive(Parser)]
#[command(name = "tilecascade")]
#[command(version = tilecascade::VERSION)]
#[command(about = "Propagate expired map tiles into render work", long_about = None)]
struct Cli {
    /// Config file path (default: ~/.tilecascade/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, clap::Args)]
struct SeedArgs {
    /// Coarsest zoom to seed (inclusive)
    #[arg(long, default_value = "0")]
    zoom_start: u8,

    /// Finest zoom to seed (inclusive)
    #[arg(long)]
    zoom_until: u8,

    /// Metro-extract JSON file narrowing deep zooms to city boxes
    #[arg(long)]
    metro_extract: Option<PathBuf>,

    /// Zoom from which the metro narrowing applies
    #[arg(long, requires = "metro_extract")]
    filter_zoom: Option<u8>,

    /// Deduplicate tiles from overlapping metro boxes (costs memory)
    #[arg(long)]
    unique: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Propagate an expired-tile file into the configured queue,
    /// skipping tiles the cache index already holds
    Intersect {
        /// Newline-delimited expired-tile file (z/x/y per line)
        expired_file: PathBuf,

        /// Coarsest zoom the explosion reaches (default: root)
        #[arg(long)]
        until: Option<u8>,
    },

    /// Explode an expired-tile file and print every coordinate to
    /// stdout without touching queue or index
    Explode {
        /// Newline-delimited expired-tile file (z/x/y per line)
        expired_file: PathBuf,

        /// Coarsest zoom the explosion reaches (default: root)
        #[arg(long)]
        until: Option<u8>,
    },

    /// Enqueue a full or metro-narrowed tile pyramid for rendering
    Seed {
        #[command(flatten)]
        seed: SeedArgs,
    },

    /// Record a tile pyramid in the cache index as already rendered
    IndexSeed {
        #[command(flatten)]
        seed: SeedArgs,

        /// Index set key to write into
        #[arg(long, default_value = DEFAULT_SET_KEY)]
        set_key: String,
    },

    /// Remove every message from the configured queue
    Drain,
}

fn main() {
    let cli = Cli::parse();

    let _guard = match init_logging(DEFAULT_LOG_DIR, DEFAULT_LOG_FILE) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Command::Intersect {
            expired_file,
            until,
        } => {
            let queue = make_queue(&config.queue_kind()?)?;
            let index = match config.index_kind()? {
                Some(kind) => Some(make_cache_index(&kind, &config.index.set_key)?),
                None => None,
            };

            let mut run = PropagateConfig::new(expired_file);
            run.explode_until = until;
            let summary = propagate(&run, index.as_deref(), &*queue)?;

            println!(
                "Propagated {} tiles ({} parsed, {} skipped, {} exploded)",
                summary.enqueued, summary.parsed, summary.skipped, summary.exploded
            );
        }

        Command::Explode {
            expired_file,
            until,
        } => {
            let queue = make_queue(&QueueKind::Stdout)?;
            let mut run = PropagateConfig::new(expired_file);
            run.explode_until = until;
            run.remove_on_success = false;
            let summary = propagate(&run, None, &*queue)?;

            eprintln!(
                "Exploded {} leaves into {} tiles",
                summary.parsed, summary.exploded
            );
        }

        Command::Seed { seed } => {
            let queue = make_queue(&config.queue_kind()?)?;
            let enqueued = seed_into_queue(&seed_config(&seed)?, &*queue)?;
            println!("Seeded {} tiles into the queue", enqueued);
        }

        Command::IndexSeed { seed, set_key } => {
            let kind = config.index_kind()?.ok_or("index is disabled in config")?;
            let index = make_cache_index(&kind, &set_key)?;
            let written = seed_into_index(&seed_config(&seed)?, &*index, &Progress::default())?;
            println!("Recorded {} tiles in index set '{}'", written, set_key);
        }

        Command::Drain => {
            let queue = make_queue(&config.queue_kind()?)?;
            let removed = queue.clear()?;
            println!("Removed {} messages from the queue", removed);
        }
    }

    Ok(())
}

fn seed_config(args: &SeedArgs) -> Result<SeedConfig, Box<dyn Error>> {
    if args.zoom_until > MAX_ZOOM {
        return Err(format!(
            "zoom until must be at most {}, got {}",
            MAX_ZOOM, args.zoom_until
        )
        .into());
    }

    let mut config = SeedConfig::new(args.zoom_start, args.zoom_until);
    if let Some(path) = &args.metro_extract {
        let filter_zoom = args
            .filter_zoom
            .ok_or("--filter-zoom is required with --metro-extract")?;
        let file = File::open(path)?;
        let cities = parse_metro_extract(file)?;
        println!(
            "Loaded {} metro cities from {}",
            cities.len(),
            path.display()
        );
        config = config.with_metro(city_bounds(&cities), filter_zoom);
    }
    if args.unique {
        config = config.unique();
    }
    Ok(config)
}
