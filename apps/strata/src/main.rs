//! # Strata
//!
//! The command-line binary for the Strata quad store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                  apps/strata (THE BINARY)                │
//! │                                                          │
//! │   ┌─────────────┐        ┌──────────────────────────┐    │
//! │   │    CLI      │        │  strata.toml + flags     │    │
//! │   │   (clap)    │        │  (toml, serde)           │    │
//! │   └──────┬──────┘        └────────────┬─────────────┘    │
//! │          └─────────────┬──────────────┘                  │
//! │                        ▼                                 │
//! │              ┌──────────────────┐                        │
//! │              │   strata-core    │                        │
//! │              │   (THE ENGINE)   │                        │
//! │              └──────────────────┘                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! strata init
//! strata add '<http://ex/a>' '<http://www.w3.org/1999/02/22-rdf-syntax-ns#type>' '<http://ex/C>' --infer
//! strata query '{ (?x rdf:type ?c) }'
//! strata export -o data.nq
//! ```

use clap::Parser;
use strata::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // STRATA_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("STRATA_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "strata=debug,strata_core=debug"
    } else {
        "strata=info,strata_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Bare `strata` shows status; greet interactive users first.
    if !cli.quiet && !cli.json_mode && cli.command.is_none() {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Strata startup banner.
fn print_banner() {
    println!(
        r#"
  ███████╗████████╗██████╗  █████╗ ████████╗ █████╗
  ██╔════╝╚══██╔══╝██╔══██╗██╔══██╗╚══██╔══╝██╔══██╗
  ███████╗   ██║   ██████╔╝███████║   ██║   ███████║
  ╚════██║   ██║   ██╔══██╗██╔══██║   ██║   ██╔══██║
  ███████║   ██║   ██║  ██║██║  ██║   ██║   ██║  ██║
  ╚══════╝   ╚═╝   ╚═╝  ╚═╝╚═╝  ╚═╝   ╚═╝   ╚═╝  ╚═╝

  Layered RDF Quad Store v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
