use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::ModelSize;

#[derive(Parser)]
#[command(
    name = "bulkscribe",
    about = "Bulkscribe - Bulk transcribe YouTube videos and playlists with local Whisper models",
    version,
    long_about = "A CLI tool that downloads the audio of every video in a list of links or playlists, \
transcribes each one with a locally loaded Whisper model, and can repurpose the transcripts into \
summaries, blog posts, and social media snippets."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe one or more video or playlist links
    Transcribe {
        /// YouTube video or playlist links
        #[arg(value_name = "LINK", required = true)]
        links: Vec<String>,

        /// Whisper model size to load
        #[arg(short, long, value_enum, default_value = "base")]
        model: ModelSize,

        /// Number of videos processed in parallel
        #[arg(short, long, default_value = "4")]
        workers: usize,

        /// Output directory for transcripts
        #[arg(short, long, default_value = "transcripts")]
        output: PathBuf,

        /// Generate summary, blog post, and social snippet for each transcript
        #[arg(long)]
        repurpose: bool,
    },

    /// Repurpose existing transcripts in a directory
    Repurpose {
        /// Directory containing per-video transcript folders
        #[arg(value_name = "DIR", default_value = "transcripts")]
        dir: PathBuf,
    },

    /// List available Whisper model sizes
    Models,

    /// Show or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}
