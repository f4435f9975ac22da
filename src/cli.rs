use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::search::DEFAULT_LIMIT;

#[derive(Debug, Clone, Parser)]
#[command(name = "class-index")]
#[command(about = "Index Java classes in the local Maven repository and search them by name, package or member")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Maven repository root (default: ~/.m2/repository, or $MAVEN_REPO_PATH)
    #[arg(long, value_name = "DIR")]
    pub repo: Option<PathBuf>,

    /// Index file (default: platform data dir, or $CACHE_DB_PATH)
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,

    /// trace, debug, info, warn or error (default: info, or $LOG_LEVEL)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Incrementally index changed jars
    Scan {
        /// Reindex every jar regardless of modification time
        #[arg(long)]
        force: bool,
    },
    /// Ranked search over class names, packages and members
    Search {
        query: String,

        #[arg(short = 'n', long, value_name = "N", default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Methods and fields of one class
    Detail {
        class_name: String,

        #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
    /// Raw class-file bytes of one class
    Content {
        class_name: String,

        #[arg(long, value_name = "JAR")]
        jar: Option<String>,

        /// Write the raw bytes to a file instead of printing them hex encoded
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    Stats,
    Clear,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}
