//! CLI command definitions and parsing
use crate::retrieval::SearchMode;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "hubseek",
    version,
    about = "Hybrid BM25 + vector search over a local knowledge index",
    long_about = "hubseek searches a chunked document index with BM25 and vector similarity, \
                  fuses the rankings, and can use an LLM for query expansion and re-ranking."
)]
pub struct Cli {
    /// Config file path (defaults to ~/.config/hubseek/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Index database path (overrides index.db_path)
    #[arg(long, global = true, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the index
    Search {
        /// Search query text
        query: String,

        /// Maximum number of results (defaults to search.default_top_k)
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Only return lexical hits from this namespace id
        #[arg(short, long)]
        namespace: Option<i64>,

        /// Search mode
        #[arg(short, long, value_enum, default_value_t = ModeArg::Hybrid)]
        mode: ModeArg,

        /// Deep mode: do not ask the LLM for query expansions
        #[arg(long)]
        skip_expansion: bool,

        /// Deep mode: do not ask the LLM to re-rank
        #[arg(long)]
        skip_reranking: bool,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one chunk with its provenance
    Show {
        /// Chunk id
        chunk_id: i64,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Hybrid,
    Bm25Only,
    VecOnly,
    Deep,
}

impl From<ModeArg> for SearchMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Hybrid => SearchMode::Hybrid,
            ModeArg::Bm25Only => SearchMode::Bm25Only,
            ModeArg::VecOnly => SearchMode::VecOnly,
            ModeArg::Deep => SearchMode::Deep,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (file + environment)
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the config file location
    Path,
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
