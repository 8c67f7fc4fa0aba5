//! Command-line argument parsing for ragstation
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// ragstation - build and query a local retrieval index over a text corpus
#[derive(Parser, Debug)]
#[command(name = "ragstation")]
#[command(version)]
#[command(about = "Index a folder of text files and answer questions from it", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress everything but results)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Ollama host (overrides config)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Ollama port (overrides config)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Generator model (overrides config)
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Number of blocks to retrieve (overrides config)
    #[arg(short = 'k', long, global = true)]
    pub top_k: Option<usize>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chunk, embed and index the corpus, replacing the current snapshot
    Build {
        /// Corpus directory (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Search the index; without a query, start an interactive loop
    Search {
        /// Query text
        #[arg(value_name = "QUERY")]
        query: Option<String>,

        /// Do not write results to disk
        #[arg(long)]
        no_save: bool,
    },

    /// Answer a question with the generator, grounded in retrieved blocks
    Ask {
        /// Question text (read from the transcript file if omitted)
        #[arg(long)]
        query: Option<String>,
    },

    /// Display current configuration
    Config,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Apply command-line overrides on top of loaded configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.generator.host = host.clone();
        }
        if let Some(port) = self.port {
            config.generator.port = port;
        }
        if let Some(model) = &self.model {
            config.generator.model = model.clone();
        }
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }
        if let Commands::Build {
            corpus: Some(corpus),
        } = &self.command
        {
            config.corpus.root = corpus.clone();
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Default tracing filter for this level (RUST_LOG wins when set)
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "ragstation=info,warn",
            Verbosity::VeryVerbose => "ragstation=debug,info",
        }
    }

    /// Check if should show progress bars
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Check if should show stage timings
    pub fn show_timings(&self) -> bool {
        matches!(self, Verbosity::Verbose | Verbosity::VeryVerbose)
    }
}
