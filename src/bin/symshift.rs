//! CLI for the symshift refactoring engine.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use symshift::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "symshift")]
#[command(author, version, about = "Symbol-level refactoring for TypeScript projects", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a batch of operations from a JSON request file
    Batch {
        /// Path to the JSON batch request
        request: PathBuf,

        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Abort the batch after the first failed operation
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Run a single operation from a JSON file
    Run {
        /// Path to the JSON operation
        operation: PathBuf,

        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Show the diff without changing any file
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Batch {
            request,
            root,
            stop_on_error,
        } => {
            let text = fs::read_to_string(&request)
                .with_context(|| format!("reading batch request {}", request.display()))?;
            let mut batch: BatchRequest =
                serde_json::from_str(&text).context("parsing batch request")?;
            if stop_on_error {
                batch.stop_on_error = Some(true);
            }

            let mut engine = make_engine(root)?;
            let result = engine.execute_batch(&batch);
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.success {
                std::process::exit(1);
            }
        }
        Commands::Run {
            operation,
            root,
            dry_run,
        } => {
            let text = fs::read_to_string(&operation)
                .with_context(|| format!("reading operation {}", operation.display()))?;
            let operation: Operation =
                serde_json::from_str(&text).context("parsing operation")?;

            let mut engine = make_engine(root)?;
            if dry_run {
                let preview = engine.preview(&operation)?;
                println!("{}", preview.diff);
            } else {
                let result = engine.execute_operation(&operation);
                println!("{}", serde_json::to_string_pretty(&result)?);
                if !result.success {
                    std::process::exit(1);
                }
            }
        }
    }
    Ok(())
}

fn make_engine(root: PathBuf) -> Result<Engine> {
    let root = root
        .canonicalize()
        .with_context(|| format!("resolving project root {}", root.display()))?;
    Ok(Engine::new(root, EngineConfig::new(), Arc::new(TracingSink))?)
}
