//! rangewall - firewall policy checker
//!
//! Compiles a rule configuration and evaluates captured frames against it.
//!
//! # Usage
//!
//! ```bash
//! # Validate a configuration and list its filter groups
//! rangewall check rules.json
//!
//! # Evaluate hex-encoded frames (one per line) against a group
//! rangewall eval rules.json --group input --frames capture.hex
//! rangewall eval --group input --frames capture.hex --workers 8 --default-deny
//! ```
//!
//! Without a configuration argument, `$RANGEWALL_CONFIG` or
//! `~/.config/rangewall/rules.json` is used.

use clap::{Parser, Subcommand};
use rangewall::config::load_config;
use rangewall::core::workers::{Verdict, default_workers, evaluate_frames};
use rangewall::utils::{default_config_path, load_hex_frames};
use rangewall::{Error, Result, RuleCompiler};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{Level, info};

#[derive(Parser)]
#[command(name = "rangewall")]
#[command(about = "Interval-set firewall policy engine", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a configuration and list its filter groups
    Check {
        /// Configuration file (default: $RANGEWALL_CONFIG or the XDG config dir)
        config: Option<PathBuf>,
    },
    /// Evaluate captured frames against a filter group
    Eval {
        /// Configuration file (default: $RANGEWALL_CONFIG or the XDG config dir)
        config: Option<PathBuf>,
        /// Filter group to evaluate
        #[arg(short, long)]
        group: String,
        /// File with one hex-encoded Ethernet frame per line
        #[arg(short, long, value_name = "FILE")]
        frames: PathBuf,
        /// Worker threads (default: available parallelism)
        #[arg(short, long, value_name = "N")]
        workers: Option<NonZeroUsize>,
        /// Report unmatched frames as blocked
        #[arg(long)]
        default_deny: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(handle_cli(cli.command)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if let Error::Config(config_error) = &e
                && let Some(hint) = config_error.suggestion()
            {
                eprintln!("Hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn handle_cli(command: Commands) -> Result<()> {
    match command {
        Commands::Check { config } => {
            let path = resolve_config_path(config)?;
            let config = load_config(&path).await?;
            let filters = RuleCompiler::default().compile(&config)?;

            println!("✓ {} is valid", path.display());
            for (name, rules) in filters.iter() {
                println!("  {name}: {} rules", rules.len());
            }
        }
        Commands::Eval {
            config,
            group,
            frames,
            workers,
            default_deny,
        } => {
            let path = resolve_config_path(config)?;
            let config = load_config(&path).await?;
            let filters = RuleCompiler::default().compile(&config)?;
            let rules = filters
                .group(&group)
                .ok_or_else(|| Error::UnknownGroup(group.clone()))?;

            let frames = load_hex_frames(&frames).await?;
            let workers = workers.unwrap_or_else(default_workers);
            info!(
                "Evaluating {} frames against '{}' ({} rules) on {} workers",
                frames.len(),
                group,
                rules.len(),
                workers
            );

            let verdicts = evaluate_frames(rules, &frames, workers);
            for (i, verdict) in verdicts.iter().enumerate() {
                println!("{}\t{}", i + 1, describe(verdict, default_deny));
            }
        }
    }
    Ok(())
}

fn resolve_config_path(config: Option<PathBuf>) -> Result<PathBuf> {
    config.or_else(default_config_path).ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no configuration file given and no config directory found",
        ))
    })
}

fn describe(verdict: &Verdict<'_>, default_deny: bool) -> String {
    match verdict {
        Ok(Some(action)) => action.to_string(),
        Ok(None) if default_deny => "block (default)".to_string(),
        Ok(None) => "no match".to_string(),
        Err(e) => format!("undecodable: {e}"),
    }
}
