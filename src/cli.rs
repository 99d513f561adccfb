//! CLI surface: subcommands over the engine's core operations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (env vars and defaults still apply for
    /// anything the file omits; precedence is CLI flags, then env, then file, then default).
    #[arg(long, display_order = 1)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Consolidate legacy book keys under a prefix into canonical UUID-keyed records.
    MigrateBooks {
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        max: Option<usize>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Consolidate legacy bestseller-list keys for a provider under a prefix.
    MigrateLists {
        #[arg(long)]
        provider: String,
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        max: Option<usize>,
        #[arg(long, default_value_t = 0)]
        skip: usize,
    },

    /// Scan cover-image keys under a prefix and quarantine unreadable ones.
    CleanupCovers {
        #[arg(long)]
        prefix: String,
        #[arg(long, default_value_t = 100)]
        batch: usize,
        #[arg(long)]
        quarantine: String,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Force (or debounce) a materialised search-view refresh.
    RefreshSearchView {
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Resolve a single identifier through the tiered fetcher and print the result.
    GetBook {
        identifier: String,
    },

    /// Run a rate-limited search once, printing the cached slice then streamed updates.
    SearchBooks {
        query: String,
        #[arg(long)]
        lang: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, default_value_t = false)]
        bypass_external: bool,
    },
}

/// Process exit codes: 0 success, 1 configuration error, 2 partial
/// failure, 3 aborted by signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    ConfigError = 1,
    PartialFailure = 2,
    Aborted = 3,
}
