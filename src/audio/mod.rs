use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::config::ToolsConfig;
use crate::utils::resolve_executable;
use crate::Result;

/// Sample rate the decoding engine expects
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Environment variable consulted when ffmpeg is not on PATH
pub const FFMPEG_PATH_ENV: &str = "FFMPEG_PATH";

/// Capability for converting a raw audio artifact into the canonical
/// decoder-ready encoding (mono, 16 kHz, 32-bit float PCM).
///
/// `Ok(None)` means the converter ran but produced no output file; the
/// caller reports it as a normalization failure for that item.
#[async_trait]
pub trait AudioConverter: Send + Sync {
    async fn normalize(&self, raw: &Path) -> Result<Option<PathBuf>>;
}

/// Resolve the ffmpeg executable for this run.
///
/// An explicit config path wins; otherwise PATH is scanned with the
/// FFMPEG_PATH environment variable as a fallback. Failure here is a
/// configuration error that aborts the run before any job starts.
pub fn resolve_ffmpeg(tools: &ToolsConfig) -> Result<PathBuf> {
    if let Some(path) = &tools.ffmpeg {
        if path.is_file() {
            return Ok(path.clone());
        }
        tracing::warn!(
            "Configured ffmpeg path {} does not exist, falling back to lookup",
            path.display()
        );
    }

    resolve_executable("ffmpeg", FFMPEG_PATH_ENV)
}

/// Normalizer backed by ffmpeg
pub struct FfmpegNormalizer {
    ffmpeg: PathBuf,
}

impl FfmpegNormalizer {
    pub fn new(ffmpeg: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: ffmpeg.into() }
    }

    /// Canonical output path for a raw artifact (same directory, .wav)
    pub fn canonical_path(raw: &Path) -> PathBuf {
        raw.with_extension("wav")
    }
}

#[async_trait]
impl AudioConverter for FfmpegNormalizer {
    async fn normalize(&self, raw: &Path) -> Result<Option<PathBuf>> {
        let target = Self::canonical_path(raw);

        tracing::debug!("Normalizing {} -> {}", raw.display(), target.display());

        let output = Command::new(&self.ffmpeg)
            .args([
                "-i",
                &raw.to_string_lossy(),
                "-vn",
                "-ac",
                "1",
                "-ar",
                &CANONICAL_SAMPLE_RATE.to_string(),
                "-c:a",
                "pcm_f32le",
                // Overwrite any pre-existing output file
                "-y",
                &target.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            tracing::warn!("ffmpeg failed for {}: {}", raw.display(), error.trim());
        }

        if target.exists() {
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }
}

/// Read the samples of a canonical audio artifact as mono f32.
///
/// Integer PCM inputs are rescaled and multi-channel inputs downmixed in
/// case a file slipped past normalization.
pub fn read_canonical_samples(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .map(|s| s as f32 / 32768.0)
            .collect(),
    };

    let mono: Vec<f32> = if spec.channels > 1 {
        samples
            .chunks(spec.channels as usize)
            .map(|frame| frame.iter().sum::<f32>() / spec.channels as f32)
            .collect()
    } else {
        samples
    };

    Ok(mono)
}
