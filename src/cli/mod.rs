//! CLI argument parsing for jointfile.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// jointfile: exercise in-process path locks and joinable file streams.
///
/// Every command runs against a fresh manager inside this process, so the
/// commands are mainly useful for trying out the streaming and locking
/// behavior and for inspecting registry snapshots.
#[derive(Parser, Debug)]
#[command(name = "jointfile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). Overridden by RUST_LOG.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Manager configuration file (YAML).
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for jointfile.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print a file through an input stream.
    Cat(CatArgs),

    /// Stream one file into another through an output stream.
    ///
    /// With `--tail`, a second reader joins the in-progress write and
    /// echoes what it sees to stdout.
    Copy(CopyArgs),

    /// Print the effective manager configuration as YAML.
    Config,
}

/// Arguments for the `cat` command.
#[derive(Parser, Debug)]
pub struct CatArgs {
    /// File to print.
    pub path: PathBuf,
}

/// Arguments for the `copy` command.
#[derive(Parser, Debug)]
pub struct CopyArgs {
    /// File to read.
    pub src: PathBuf,

    /// File to create or overwrite.
    pub dst: PathBuf,

    /// Join the write from a second thread and echo it to stdout.
    #[arg(long)]
    pub tail: bool,

    /// How long to wait for the destination (negative fails fast).
    #[arg(long, value_name = "MS", allow_negative_numbers = true)]
    pub timeout_ms: Option<i64>,

    /// Where the tail reader starts: from_start or from_current.
    #[arg(long, value_name = "MODE")]
    pub join_mode: Option<String>,

    /// Print the registry snapshot as JSON while the copy is open.
    #[arg(long)]
    pub stats: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
