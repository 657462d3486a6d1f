#![allow(clippy::doc_markdown)]
//! `lodestar` - build and query offline semantic retrieval directories.

mod commands;
mod corpus;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{BuildOptions, QueryOptions};
use lodestar_core::LodestarConfig;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Lodestar - offline semantic retrieval
#[derive(Parser, Debug)]
#[command(name = "lodestar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./lodestar.toml when present)
    #[arg(short, long, global = true, env = "LODESTAR_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, overriding the configured level (e.g. `debug`)
    #[arg(long, global = true, env = "LODESTAR_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Embed a JSONL corpus and write a retrieval directory
    Build {
        /// JSONL file with one `{"id", "text", "metadata"}` object per line
        #[arg(long)]
        docs: PathBuf,

        /// Output directory
        #[arg(long)]
        out: PathBuf,

        /// Serialized fp32 model (a random projection is used otherwise)
        #[arg(long)]
        model: Option<PathBuf>,

        /// Feature width of the random projection
        #[arg(long, default_value = "512")]
        input_dim: usize,

        /// Embedding width of the random projection
        #[arg(long, default_value = "128")]
        dim: usize,

        /// Seed of the random projection
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Query a retrieval directory
    Query {
        /// Query text
        text: String,

        /// Retrieval directory
        #[arg(short, long, default_value = "./data", env = "LODESTAR_DATA_DIR")]
        data: PathBuf,

        /// Number of results
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity score
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Deadline in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print the response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show index and engine state of a retrieval directory
    Status {
        /// Retrieval directory
        #[arg(short, long, default_value = "./data", env = "LODESTAR_DATA_DIR")]
        data: PathBuf,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LodestarConfig::from_file(path)?,
        None => LodestarConfig::load()?,
    };

    let filter = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Command::Build {
            docs,
            out,
            model,
            input_dim,
            dim,
            seed,
        } => commands::build(
            &config,
            &BuildOptions {
                docs,
                out,
                model,
                input_dim,
                dim,
                seed,
            },
        )?,
        Command::Query {
            text,
            data,
            top_k,
            threshold,
            timeout_ms,
            json,
        } => {
            let answered = commands::query(
                &config,
                QueryOptions {
                    data,
                    text,
                    top_k,
                    threshold,
                    timeout_ms,
                    json,
                },
            )?;
            if !answered {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Status { data } => commands::status(&config, &data)?,
        Command::Config => commands::show_config(&config)?,
    }
    Ok(ExitCode::SUCCESS)
}
