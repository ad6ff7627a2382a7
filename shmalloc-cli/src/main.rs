// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! shmalloc CLI
//!
//! Command-line interface for creating, attaching to and removing named
//! shared-memory segments.

use std::path::Path;

use clap::{Parser, Subcommand};
use shmalloc_core::{AllocResult, AllocatorConfig, ConfigLoader};

mod commands;

/// Configuration file picked up from the working directory when present.
const DEFAULT_CONFIG: &str = "shmalloc.yaml";

/// shmalloc - Named cross-process shared-memory segments
#[derive(Parser)]
#[command(name = "shmalloc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path (defaults to ./shmalloc.yaml if present)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a segment (or attach if it exists), write to it and hold it
    Create {
        /// Segment name
        name: String,

        /// Size in bytes, used only if this call creates the segment
        #[arg(short, long)]
        size: usize,

        /// Text written at offset 0
        #[arg(short, long)]
        data: Option<String>,

        /// Seconds to keep the mapping before releasing (default: until Ctrl-C)
        #[arg(long)]
        hold_secs: Option<u64>,
    },

    /// Attach to an existing segment and print its contents
    Read {
        /// Segment name
        name: String,

        /// Number of bytes to print (default: whole segment)
        #[arg(short, long)]
        len: Option<usize>,

        /// Print segment info as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a stale backing object left behind by a crashed creator
    Unlink {
        /// Segment name
        name: String,
    },

    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        file: String,
    },
}

fn load_config(path: Option<&str>) -> AllocResult<AllocatorConfig> {
    match path {
        Some(path) => ConfigLoader::load_file(path),
        None if Path::new(DEFAULT_CONFIG).exists() => ConfigLoader::load_file(DEFAULT_CONFIG),
        None => Ok(AllocatorConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Create {
            name,
            size,
            data,
            hold_secs,
        } => {
            let config = load_config(cli.config.as_deref())?;
            commands::create::execute(config, &name, size, data.as_deref(), hold_secs).await
        }
        Commands::Read { name, len, json } => {
            let config = load_config(cli.config.as_deref())?;
            commands::read::execute(config, &name, len, json).await
        }
        Commands::Unlink { name } => commands::unlink::execute(&name).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
