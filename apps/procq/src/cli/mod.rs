//! # procq CLI Module
//!
//! This module implements the CLI interface for procq.
//!
//! ## Available Commands
//!
//! - `serve` - Start the HTTP server with the live evaluation scheduler
//! - `compile` - Compile a graph JSON file into a combinator tree
//! - `validate` - Check a graph JSON file against the structural rules
//! - `fragments` - Manage the named fragment store

mod commands;

use clap::{Parser, Subcommand};
use procq_core::ProcqError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// procq - visual process-query graph server
///
/// Maintains a graph of predicate nodes and relation edges, compiles it
/// into nested boolean queries, and evaluates them live against an event
/// log.
#[derive(Parser, Debug)]
#[command(name = "procq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the fragment store database
    #[arg(short = 'D', long, global = true, default_value = "procq.db")]
    pub store: PathBuf,

    /// Path to the configuration file
    #[arg(short = 'c', long, global = true, default_value = "procq.toml")]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Graph JSON file to preload through the restore path
        #[arg(short, long)]
        graph: Option<PathBuf>,

        /// Event log the local engine evaluates against (overrides config)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Compile a graph JSON file into its combinator tree
    Compile {
        /// Input graph file (fragment-shaped JSON)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a graph JSON file against the structural rules
    Validate {
        /// Input graph file (fragment-shaped JSON)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Manage the named fragment store
    Fragments {
        #[command(subcommand)]
        action: FragmentAction,
    },
}

/// Fragment store operations.
#[derive(Subcommand, Debug)]
pub enum FragmentAction {
    /// List stored fragment names
    List,

    /// Save a graph JSON file under a name
    Save {
        /// Fragment name
        name: String,

        /// Input graph file (fragment-shaped JSON)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Load a stored fragment as JSON
    Load {
        /// Fragment name
        name: String,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a stored fragment
    Delete {
        /// Fragment name
        name: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), ProcqError> {
    match cli.command {
        Some(Commands::Serve {
            host,
            port,
            graph,
            dataset,
        }) => {
            cmd_serve(
                &cli.config,
                &cli.store,
                host,
                port,
                graph.as_deref(),
                dataset,
            )
            .await
        }
        Some(Commands::Compile { input, output }) => cmd_compile(&input, output.as_deref()),
        Some(Commands::Validate { input }) => cmd_validate(&input),
        Some(Commands::Fragments { action }) => cmd_fragments(&cli.store, action),
        None => {
            // No subcommand - start the server with config defaults
            cmd_serve(&cli.config, &cli.store, None, None, None, None).await
        }
    }
}
