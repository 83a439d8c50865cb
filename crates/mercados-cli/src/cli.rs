//! CLI argument definitions for mercados.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Fetch every tracked ticker and load it incrementally |
//! | `audit` | Check the date-keyed tables for duplicate keys |
//! | `tables` | Row counts per table and instruments per market |
//!
//! Connection and run parameters come from `MERCADOS_*` environment
//! variables; flags only pick the command and the output shape.
//!
//! # Examples
//!
//! ```bash
//! # Load IBEX_35 and COLCAP from Yahoo Finance
//! mercados run --pretty
//!
//! # Exercise the whole pipeline without network access
//! MERCADOS_MARKETS=COLCAP mercados run --offline
//!
//! # Inspect the result
//! mercados tables
//! mercados audit
//! ```

use clap::{Parser, Subcommand};

/// Incremental loader for IBEX_35 and COLCAP market data.
#[derive(Debug, Parser)]
#[command(name = "mercados", author, version, about)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch, reshape and load every tracked ticker, then audit.
    Run(RunArgs),
    /// Report duplicate natural keys without changing any data.
    Audit,
    /// Show what the warehouse currently holds.
    Tables,
}

#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    /// Use deterministic in-memory data instead of Yahoo Finance.
    #[arg(long, default_value_t = false)]
    pub offline: bool,
}
