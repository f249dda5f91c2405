use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, time::Duration};
use syncprint_rs::{MatchOptions, match_files, print_stats, processor::MatchFilterMode};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "syncprint-rs",
    about = "Find matching positions between fingerprinted audio tracks",
    version = "0.1.0"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Match {
        #[arg(value_name = "TRACK_FILE", required = true)]
        track_files: Vec<PathBuf>,

        /// TOML matching profile
        #[arg(short, long, value_name = "FILE")]
        profile: Option<PathBuf>,

        /// Keep the collision map in a SQLite database instead of memory
        #[arg(short, long, value_name = "DB_PATH")]
        sqlite: Option<PathBuf>,

        /// Drop duplicate matches
        #[arg(short, long)]
        dedup: bool,

        /// Keep one match per track pair
        #[arg(short, long, value_enum)]
        filter: Option<MatchFilterMode>,

        /// Keep one match per window of this many seconds (requires --filter)
        #[arg(short, long, value_name = "SECONDS", requires = "filter")]
        window: Option<f64>,
    },

    Stats {
        #[arg(value_name = "TRACK_FILE", required = true)]
        track_files: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Match {
            track_files,
            profile,
            sqlite,
            dedup,
            filter,
            window,
        } => {
            let window = window
                .map(Duration::try_from_secs_f64)
                .transpose()?;
            let options = MatchOptions {
                profile,
                sqlite,
                dedup,
                filter,
                window,
            };
            match_files(&track_files, &options)
        }

        Commands::Stats { track_files } => print_stats(&track_files),
    }
}
