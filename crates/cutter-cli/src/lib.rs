//! cutter - release packaging pipeline.
//!
//! Builds release artifacts (rpm packages, stamped and packaged helm
//! charts) from a source checkout and publishes them to an S3-compatible
//! object store. The shared helm repo index is updated through a
//! conditional-write protocol so concurrent release publishers never
//! clobber each other.

pub mod cmd;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line interface for the release pipeline.
#[derive(Debug, Parser)]
#[command(name = "cutter")]
#[command(author, version, about = "cutter - release packaging pipeline")]
pub struct Cli {
    /// Path to the release manifest
    #[arg(long, global = true, default_value = "release.toml")]
    pub manifest: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

/// Pipeline stages.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stamp charts, package charts, and build rpm packages
    Build,
    /// Publish release artifacts and the helm repo to the object store
    Publish {
        /// Bucket reference, optionally with a key prefix (bucket/folder)
        #[arg(long)]
        bucket: Option<String>,
        /// Alias objects to write alongside the release (repeatable)
        #[arg(long = "alias")]
        aliases: Vec<String>,
    },
}
