//! cache-multi CLI
//!
//! Inspect and maintain a durable cache directory shared with running
//! application processes.
//!
//! ```text
//! cache-multi --cache-dir .cache stats
//! cache-multi put meals:week:42 '{"mon":"soup"}' --ttl 3600 --tag meals
//! cache-multi get meals:week:42
//! cache-multi invalidate --tag meals
//! cache-multi clear --levels l3
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cache_multi::{CacheConfig, CacheManager, SetOptions, TierSelection};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Multi-tier cache maintenance tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache directory (overrides the configuration file)
    #[arg(long, env = "CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show cache statistics
    Stats {
        /// Output format
        #[arg(long, value_enum, default_value_t = StatsFormat::Json)]
        format: StatsFormat,
    },
    /// Print the value stored under a key
    Get {
        key: String,
    },
    /// Store a JSON value durably
    Put {
        key: String,
        /// JSON document to store
        value: String,
        /// Time-to-live in seconds
        #[arg(long)]
        ttl: Option<u64>,
        /// Group tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Remove entries by tag and/or key substring
    Invalidate {
        /// Group tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Key substring (not applied to the file tier)
        #[arg(long)]
        pattern: Option<String>,
    },
    /// Remove every entry from the selected tiers
    Clear {
        /// Levels to clear: l1, l2, l3, l1l2 or all
        #[arg(long, default_value = "all")]
        levels: String,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatsFormat {
    Json,
    Prometheus,
}

// =============================================================================
// Main
// =============================================================================

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args);

    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => CacheConfig::default(),
    };
    if let Some(dir) = &args.cache_dir {
        config.l3_cache_dir = dir.clone();
    }
    // A CLI process has no session context
    config.l2_enabled = false;
    config.l3_enabled = true;

    let cache = CacheManager::with_config(config).context("opening cache")?;

    match args.command {
        Command::Stats { format } => {
            let stats = cache.stats();
            match format {
                StatsFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                StatsFormat::Prometheus => print!("{}", stats.to_prometheus()?),
            }
        }
        Command::Get { key } => match cache.get_with(&key, false) {
            Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            None => bail!("no live entry for key '{}'", key),
        },
        Command::Put {
            key,
            value,
            ttl,
            tags,
        } => {
            let value: serde_json::Value =
                serde_json::from_str(&value).context("value must be a JSON document")?;
            let ttl = ttl.map_or_else(|| cache.config().default_ttl(), Duration::from_secs);
            cache.set(
                &key,
                value,
                &SetOptions::new().ttl(ttl).tags(tags).persistent(true),
            );
            info!(key = %key, ttl_secs = ttl.as_secs(), "Stored entry");
        }
        Command::Invalidate { tags, pattern } => {
            if tags.is_empty() && pattern.is_none() {
                bail!("give at least one --tag or a --pattern");
            }
            let removed = cache.invalidate(pattern.as_deref(), &tags);
            println!("{}", removed);
        }
        Command::Clear { levels } => {
            let selection: TierSelection = levels.parse()?;
            cache.clear(selection);
        }
    }

    Ok(())
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
