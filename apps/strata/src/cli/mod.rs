//! # Strata CLI Module
//!
//! This module implements the CLI interface for Strata.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show store status
//! - `add` / `remove` - Change statements
//! - `list` / `contexts` - Inspect statements and named graphs
//! - `query` - Run a pattern query
//! - `import` / `export` - N-Quads or binary dump
//! - `infer` / `clear-inference` - Rebuild or drop derived statements
//! - `rules` - Show the configured rule set

mod commands;

use crate::config::StrataConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strata_core::StrataError;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Strata - layered RDF quad store
///
/// Statements live in a backend; inference derives new statements into
/// their own named graphs and records what justified each one.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database (overrides [store].path)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend: "redb" (ACID database) or "memory" (dump file)
    #[arg(short = 'B', long, global = true)]
    pub backend: Option<String>,

    /// Configuration file (default: ./strata.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Show store status
    Status,

    /// Add one statement (terms in N-Triples syntax)
    Add {
        subject: String,
        predicate: String,
        object: String,

        /// Named graph
        #[arg(short = 'g', long)]
        context: Option<String>,

        /// Run inference on the new statement
        #[arg(short, long)]
        infer: bool,
    },

    /// Remove statements; `*` matches any term, no context matches every graph
    Remove {
        subject: String,
        predicate: String,
        object: String,

        /// Named graph
        #[arg(short = 'g', long)]
        context: Option<String>,

        /// Retract statements derived from the removed ones
        #[arg(short, long)]
        infer: bool,
    },

    /// List statements matching a pattern
    List {
        #[arg(short, long)]
        subject: Option<String>,

        #[arg(short, long)]
        predicate: Option<String>,

        #[arg(short, long)]
        object: Option<String>,

        /// Named graph
        #[arg(short = 'g', long)]
        context: Option<String>,

        /// Maximum number of statements to print
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// List named graphs
    Contexts,

    /// Execute a query
    Query {
        /// Query text, e.g. "{ (?a rdf:type ?c) }"
        query: String,

        /// Query language
        #[arg(short, long, default_value = "patterns")]
        language: String,
    },

    /// Import statements from a file
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Input format (nquads, dump)
        #[arg(short = 't', long, default_value = "nquads")]
        format: String,

        /// Run inference on the imported statements
        #[arg(long)]
        infer: bool,
    },

    /// Export all statements to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (nquads, dump)
        #[arg(short = 't', long, default_value = "nquads")]
        format: String,
    },

    /// Run full inference over the store
    Infer,

    /// Remove all derived statements and their provenance
    ClearInference,

    /// Show the configured rules
    Rules,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StrataError> {
    let settings = StrataConfig::load(cli.config.as_deref())?
        .resolve(cli.database, cli.backend.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&settings, force),
        Some(Commands::Status) | None => cmd_status(&settings, json_mode),
        Some(Commands::Add {
            subject,
            predicate,
            object,
            context,
            infer,
        }) => cmd_add(
            &settings,
            json_mode,
            [&subject, &predicate, &object],
            context.as_deref(),
            infer,
        ),
        Some(Commands::Remove {
            subject,
            predicate,
            object,
            context,
            infer,
        }) => cmd_remove(
            &settings,
            json_mode,
            [&subject, &predicate, &object],
            context.as_deref(),
            infer,
        ),
        Some(Commands::List {
            subject,
            predicate,
            object,
            context,
            limit,
        }) => cmd_list(
            &settings,
            json_mode,
            [subject.as_deref(), predicate.as_deref(), object.as_deref()],
            context.as_deref(),
            limit,
        ),
        Some(Commands::Contexts) => cmd_contexts(&settings, json_mode),
        Some(Commands::Query { query, language }) => {
            cmd_query(&settings, json_mode, &query, &language)
        }
        Some(Commands::Import {
            input,
            format,
            infer,
        }) => cmd_import(&settings, json_mode, &input, &format, infer),
        Some(Commands::Export { output, format }) => {
            cmd_export(&settings, json_mode, &output, &format)
        }
        Some(Commands::Infer) => cmd_infer(&settings, json_mode),
        Some(Commands::ClearInference) => cmd_clear_inference(&settings, json_mode),
        Some(Commands::Rules) => cmd_rules(&settings, json_mode),
    }
}
