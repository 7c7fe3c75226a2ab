//! Beacon binary entry point.
//!
//! Usage:
//!   beacon track <EVENT> --token <TOKEN> [--prop key=value]...
//!   beacon flush --token <TOKEN>
//!   beacon config

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use beacon_config_and_utils::{init_logging, Config, LogFormat, Paths};
use beacon_dispatch::Registry;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::info;

/// Beacon command-line interface.
#[derive(Parser, Debug)]
#[command(name = "beacon")]
#[command(about = "Queue and deliver telemetry events")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for configuration and data. Defaults to ~/.beacon
    #[arg(long, env = "BEACON_HOME", global = true)]
    base_dir: Option<PathBuf>,

    /// Dispatch context; each context has its own queue.
    #[arg(long, default_value = "default", global = true)]
    context: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Track an event
    Track {
        /// Event name
        event: String,

        /// Project token
        #[arg(long, env = "BEACON_TOKEN")]
        token: String,

        /// Event property as key=value. Values that parse as JSON are kept as JSON.
        #[arg(short, long = "prop")]
        props: Vec<String>,

        /// Leave the event queued instead of flushing before exit
        #[arg(long)]
        no_flush: bool,
    },
    /// Send every queued event
    Flush {
        /// Project token
        #[arg(long, env = "BEACON_TOKEN")]
        token: String,
    },
    /// Print the effective configuration
    Config,
}

fn parse_props(raw: &[String]) -> Result<Map<String, Value>> {
    let mut props = Map::new();
    for entry in raw {
        let Some((key, value)) = entry.split_once('=') else {
            bail!("property {entry:?} is not in key=value form");
        };
        if key.is_empty() {
            bail!("property {entry:?} has an empty key");
        }
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
        props.insert(key.to_string(), value);
    }
    Ok(props)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths).context("failed to load configuration")?;

    let level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    init_logging(level, LogFormat::from_env());

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Track {
            event,
            token,
            props,
            no_flush,
        } => {
            let props = parse_props(&props)?;
            let registry = Registry::new(config, paths);
            let tracker = registry.tracker(&cli.context, &token)?;

            tracker.track(&event, Some(props));
            if !no_flush {
                tracker.flush();
            }
            registry.shutdown();
            info!(event = %event, context = %cli.context, "Event tracked");
        }
        Commands::Flush { token } => {
            let registry = Registry::new(config, paths);
            registry.tracker(&cli.context, &token)?.flush();
            registry.shutdown();
            info!(context = %cli.context, "Queue flushed");
        }
    }

    Ok(())
}
