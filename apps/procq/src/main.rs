//! # procq - Visual Process-Query Server
//!
//! The main binary for the procq query-graph system.
//!
//! This application provides:
//! - HTTP REST API server (axum-based) over the live query graph
//! - CLI interface for compiling/validating graph files and managing the
//!   fragment store
//! - The debounced live evaluation scheduler
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                    apps/procq (THE BINARY)                     │
//! │                                                                │
//! │  ┌──────────┐   ┌───────────┐   ┌───────────────────────────┐ │
//! │  │   CLI    │   │ HTTP API  │   │  Evaluation Scheduler      │ │
//! │  │  (clap)  │   │  (axum)   │   │  (tokio, debounce/discard) │ │
//! │  └────┬─────┘   └─────┬─────┘   └────────────┬──────────────┘ │
//! │       │               │                      │                │
//! │       └───────────────┼──────────────────────┘                │
//! │                       ▼                                       │
//! │               ┌───────────────┐                               │
//! │               │  procq-core   │                               │
//! │               │  (THE LOGIC)  │                               │
//! │               └───────────────┘                               │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! procq serve --host 0.0.0.0 --port 8080 --dataset events.json
//!
//! # CLI operations
//! procq compile -i graph.json
//! procq validate -i graph.json
//! procq fragments list
//! ```

use clap::Parser;
use procq::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — PROCQ_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PROCQ_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "procq=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the procq startup banner.
fn print_banner() {
    println!(
        r#"
  ██████╗ ██████╗  ██████╗  ██████╗ ██████╗
  ██╔══██╗██╔══██╗██╔═══██╗██╔════╝██╔═══██╗
  ██████╔╝██████╔╝██║   ██║██║     ██║   ██║
  ██╔═══╝ ██╔══██╗██║   ██║██║     ██║▄▄ ██║
  ██║     ██║  ██║╚██████╔╝╚██████╗╚██████╔╝
  ╚═╝     ╚═╝  ╚═╝ ╚═════╝  ╚═════╝ ╚══▀▀═╝

  Visual Process-Query Server v{}

  Deterministic • Incremental • Live
"#,
        env!("CARGO_PKG_VERSION")
    );
}
