use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "vidsplit")]
#[command(author, version, about = "Split videos into fixed-duration segments")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the upload/download server
    Start {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Split a single file into segments
    Split {
        /// Input video
        #[arg(required = true)]
        input: PathBuf,

        /// Segment length in seconds (default from config)
        #[arg(short, long, allow_negative_numbers = true)]
        duration: Option<i64>,

        /// Directory to write segments into (default: segments_dir/<stem>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the segment ranges for a duration without encoding anything
    Plan {
        /// Total duration in seconds
        #[arg(required = true, allow_negative_numbers = true)]
        total: f64,

        /// Segment length in seconds (default from config)
        #[arg(short, long, allow_negative_numbers = true)]
        duration: Option<i64>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe a media file and display information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
