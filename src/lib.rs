//! Bulkscribe - A Rust CLI tool for bulk transcribing YouTube videos and playlists
//!
//! This library downloads the audio track of each video in a list of links
//! (expanding playlists into individual videos), transcribes it with a locally
//! loaded Whisper model, and can optionally repurpose each transcript into a
//! summary, blog post, and social media snippet.

pub mod audio;
pub mod cli;
pub mod config;
pub mod engine;
pub mod expand;
pub mod fetch;
pub mod pipeline;
pub mod repurpose;
pub mod utils;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use engine::{DecodingEngine, ModelSize, SpeechDecoder};
pub use pipeline::{BulkCoordinator, Item, Outcome, RunSummary};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to bulkscribe
#[derive(thiserror::Error, Debug)]
pub enum BulkscribeError {
    #[error("Required tool not found: {0}")]
    ToolNotFound(String),

    #[error("Failed to load decoding model: {0}")]
    ModelLoadFailed(String),

    #[error("Playlist expansion failed: {0}")]
    ExpansionFailed(String),

    #[error("Repurposing failed: {0}")]
    RepurposeFailed(String),
}
