//! weave CLI tool
//!
//! Command-line interface for building graphs with weave-core.
//!
//! ## Commands
//!
//! - `build <config> <inputs>...`: resolve source files into a graph and write it out
//! - `check <config>`: run static validation only and print the evaluation order
//!
//! Any failure exits with status 1 after printing the error and its kind.

use clap::{Parser, Subcommand};
use std::{fs::File, io::BufWriter, path::PathBuf, process::ExitCode};
use weave_core::{
    config::GraphConfig,
    engine,
    export::{self, Format},
    ingest::read_sources,
    providers::{ProviderKind, PROVIDERS},
    WeaveError,
};

#[derive(Parser)]
#[command(name = "weave")]
#[command(author, version, about = "Resolve structured documents into a weighted graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a graph from source files
    Build {
        /// Graph configuration (.yaml, .yml, .toml or .json)
        config: PathBuf,

        /// Source files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: json, edgelist or graphml
        #[arg(short, long, default_value = "json")]
        format: Format,
    },

    /// Validate a configuration without reading any source
    Check {
        /// Graph configuration (.yaml, .yml, .toml or .json)
        config: PathBuf,
    },
}

fn run(cli: Cli) -> Result<(), WeaveError> {
    match cli.command {
        Commands::Build {
            config,
            inputs,
            output,
            format,
        } => {
            let config = GraphConfig::from_path(&config)?;
            let records = read_sources(&inputs)?;
            let graph = engine::build(&config, &records, &PROVIDERS)?;
            match output {
                Some(path) => {
                    let file = File::create(&path)?;
                    export::write(&graph, format, BufWriter::new(file))?;
                    tracing::info!(
                        "Wrote {} nodes and {} edges to {:?}",
                        graph.nodes.len(),
                        graph.edges.len(),
                        path
                    );
                }
                None => export::write(&graph, format, std::io::stdout().lock())?,
            }
        }
        Commands::Check { config } => {
            let config = GraphConfig::from_path(&config)?;
            let (embeds, links) = engine::check(&config, &PROVIDERS)?;
            println!("Configuration OK");
            println!("Embed order: {}", embeds.join(" -> "));
            println!("Link order:  {}", links.join(" -> "));
            for kind in [
                ProviderKind::Embedding,
                ProviderKind::Metric,
                ProviderKind::Chunking,
                ProviderKind::Community,
            ] {
                println!("{kind} providers: {}", PROVIDERS.list(kind).join(", "));
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}
