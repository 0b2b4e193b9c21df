//! Command line interface for lsif-bundler

use std::path::PathBuf;

use clap::Parser;

/// Convert an LSIF dump into a queryable bundle file.
#[derive(Parser, Debug)]
#[command(name = "lsif-bundler", version, about)]
pub struct Cli {
    /// Path to the gzip-compressed, line-delimited LSIF dump
    pub input: PathBuf,

    /// Path of the bundle file to produce
    #[arg(short, long, default_value = "data.bundle.db")]
    pub output: PathBuf,

    /// Repository checkout consulted for path existence
    #[arg(long, default_value = ".")]
    pub repo: PathBuf,

    /// Commit the dump was indexed at
    #[arg(long, default_value = "HEAD")]
    pub commit: String,

    /// Repository subdirectory the indexer ran from
    #[arg(long, default_value = "")]
    pub root: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
