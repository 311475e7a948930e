//! CLI argument definitions for Lookout.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_PATH;

/// Lookout -- turns documents into calendar and issue-tracker actions.
#[derive(Parser)]
#[command(
    name = "lookout",
    version,
    about = "Lookout -- intent extraction and action dispatch for documents",
    long_about = "Reads documents (text, images, PDFs), detects the intents that the \
                  configured action providers can serve, and invokes those actions."
)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process one or more documents and print a report for each.
    Process {
        /// File paths (relative to the source root) or http(s) URLs.
        #[arg(required = true)]
        references: Vec<String>,

        /// Documents processed at once (defaults to the configured value).
        #[arg(long, short)]
        concurrency: Option<usize>,

        /// Print human-readable reports instead of JSON.
        #[arg(long)]
        text: bool,
    },

    /// Print the lookouts derived from the configured action catalog.
    Lookouts,

    /// List the catalog's actions and provider health.
    Actions,

    /// List recent runs from the run store.
    Runs {
        /// Maximum number of runs to show.
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },
}
