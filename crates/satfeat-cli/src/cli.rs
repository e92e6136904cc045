use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "satfeat", author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Match scenes and write one feature table per month
    Run {
        /// Run config (TOML, YAML or JSON)
        config: PathBuf,
        /// Override the first year
        #[arg(long)]
        start_year: Option<i32>,
        /// Override the last year
        #[arg(long)]
        end_year: Option<i32>,
        /// Override the output directory
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Override the model seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Check a run config and its points without touching the network
    Validate {
        config: PathBuf,
    },
    /// List the periods a config covers and their output file names
    Periods {
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Summarise how the points split into catalog partitions
    Partition {
        config: PathBuf,
        /// Override the partition count
        #[arg(long)]
        partitions: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}
