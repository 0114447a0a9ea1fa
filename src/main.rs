//! Unified Cache CLI
//!
//! Small front end over the cache manager: fetch URLs through the HTTP tier,
//! inspect what the local tier holds, and invalidate keys by pattern.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use unified_cache::{CacheManager, CacheManagerConfig, CacheTier, KeyPattern};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Unified Cache - memory, local and HTTP-response caching with pluggable strategies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, global = true, env = "UNIFIED_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for the local tier (overrides the config file)
    #[arg(long, global = true, env = "UNIFIED_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Namespace for persisted entries (overrides the config file)
    #[arg(long, global = true, env = "UNIFIED_CACHE_NAMESPACE")]
    namespace: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a URL through the HTTP cache
    Fetch {
        url: String,

        /// Number of times to request the URL
        #[arg(long, default_value = "1")]
        repeat: u32,

        /// Skip the cache read (the response is still stored)
        #[arg(long)]
        force: bool,

        /// Print metrics in Prometheus text format
        #[arg(long)]
        prometheus: bool,
    },

    /// List persisted entries
    Inspect {
        /// Prefix, glob (`user:*`) or `/regex/`
        #[arg(long)]
        pattern: Option<String>,
    },

    /// Remove entries matching a pattern from every tier
    Invalidate {
        /// Prefix, glob (`user:*`) or `/regex/`
        pattern: String,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    let config = load_config(&args)?;
    info!(
        version = unified_cache::VERSION,
        namespace = %config.namespace,
        cache_dir = %config.local.root_path.display(),
        "Starting unified cache"
    );

    let cache = CacheManager::new(config)
        .await
        .context("failed to initialize cache manager")?;

    match args.command {
        Command::Fetch {
            url,
            repeat,
            force,
            prometheus,
        } => {
            for attempt in 1..=repeat.max(1) {
                let response = if force {
                    cache.force_get_http(&url).await
                } else {
                    cache.get_http(&url).await
                }
                .with_context(|| format!("request to {} failed", url))?;

                println!(
                    "#{} {} {} ({} bytes)",
                    attempt,
                    response.status,
                    response.url,
                    response.body.len()
                );
            }

            let metrics = cache.get_metrics();
            if prometheus {
                print!("{}", metrics.to_prometheus()?);
            } else {
                println!("{}", metrics.to_json()?);
            }
        }

        Command::Inspect { pattern } => {
            let pattern = pattern
                .as_deref()
                .map(str::parse::<KeyPattern>)
                .transpose()?;

            let entries = cache.entries(CacheTier::Local, pattern.as_ref());
            for entry in &entries {
                let ttl = entry
                    .ttl_ms
                    .map(|ms| format!("{}ms", ms))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}\t{}\t{} bytes\tttl={}\treads={}",
                    entry.key, entry.type_tag, entry.size_bytes, ttl, entry.access_count
                );
            }
            println!(
                "{} entries, {} bytes on disk",
                entries.len(),
                cache.size_bytes(CacheTier::Local)
            );
        }

        Command::Invalidate { pattern } => {
            let removed = cache.invalidate(&pattern).await?;
            println!("removed {} entries matching {}", removed, pattern);
        }
    }

    Ok(())
}

// =============================================================================
// Configuration
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<CacheManagerConfig> {
    let mut config = match &args.config {
        Some(path) => CacheManagerConfig::from_yaml_file(path)
            .with_context(|| format!("invalid config file {}", path.display()))?,
        None => CacheManagerConfig::default(),
    };

    if let Some(dir) = &args.cache_dir {
        config.local.root_path = dir.clone();
    }
    if let Some(namespace) = &args.namespace {
        config.namespace = namespace.clone();
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    // Logs go to stderr so command output stays pipeable
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
    Ok(())
}
