//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "faculty-finder",
    version,
    author = "neur0map",
    about = "Recommend faculty members for a free-text research query",
    long_about = "Faculty Finder embeds cleaned faculty biographies with a local sentence-embedding \
                  model, keeps the vectors in a persisted index, and ranks faculty by cosine \
                  similarity to a query."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/faculty-finder/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the vector index from the faculty database
    Build,

    /// Search faculty by research topic
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results (defaults to search.default_limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score (defaults to search.default_threshold)
        #[arg(short, long, allow_negative_numbers = true)]
        threshold: Option<f32>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one faculty member by id
    Show {
        /// Faculty id
        id: i64,

        /// Show result in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show index and database status
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
