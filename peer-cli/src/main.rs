//! # peerlink
//!
//! CLI tool for exercising the PeerLink session layer.
//!
//! ## Commands
//!
//! - `init`: Create the local profile and connection code
//! - `status`: Show the local profile
//! - `code`: Print the local connection code
//! - `decode`: Inspect a connection code or signal code
//! - `demo`: Connect two in-process peers and exchange messages
//!
//! ## Example
//!
//! ```bash
//! # Create a profile
//! peerlink init --name "Alice"
//!
//! # Share this with a contact
//! peerlink code
//!
//! # Inspect a code someone sent you
//! peerlink decode eyJwZWVyX2lkIjoi...
//!
//! # Watch two peers negotiate and chat
//! peerlink demo --messages 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{code, decode, demo, init, status};

/// CLI tool for exercising the PeerLink session layer.
#[derive(Parser, Debug)]
#[command(name = "peerlink")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory for the profile, connection code and config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log at debug level (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the local profile and connection code
    Init {
        /// Display name
        #[arg(long, short)]
        name: String,
    },

    /// Show the local profile
    Status,

    /// Print the local connection code
    Code,

    /// Inspect a connection code or signal code
    Decode {
        /// The code to inspect
        code: String,
    },

    /// Connect two in-process peers and exchange messages
    Demo {
        /// Number of chat messages Alice sends
        #[arg(long, short, default_value = "3")]
        messages: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;
    config::set_dir_permissions_0700(&data_dir)?;

    let session_config = config::load_session_config(&data_dir)?;
    tracing::debug!(data_dir = %data_dir.display(), "Using data directory");

    match cli.command {
        Commands::Init { name } => {
            init::run(&data_dir, &name)?;
        }
        Commands::Status => {
            status::run(&data_dir)?;
        }
        Commands::Code => {
            code::run(&data_dir, &session_config)?;
        }
        Commands::Decode { code } => {
            decode::run(&code)?;
        }
        Commands::Demo { messages } => {
            demo::run(&session_config, messages).await?;
        }
    }

    Ok(())
}

/// Get the default data directory for peerlink.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "peerlink", "peerlink")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
