//! # Strata
//!
//! Command-line front end for the `strata-core` quad store.
//!
//! The binary in `main.rs` only installs logging and dispatches to [`cli`];
//! everything else lives here so integration tests can drive the commands.

pub mod cli;
pub mod config;
