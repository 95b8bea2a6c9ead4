use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::pipeline::Item;
use crate::Result;

/// Capability for retrieving the raw audio track of an item.
///
/// Returning `Ok(None)` means the source could not produce an artifact for
/// this item; that is a recoverable per-item condition, not an error.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn fetch(&self, item: &Item, workdir: &Path) -> Result<Option<PathBuf>>;
}

/// Audio fetcher backed by yt-dlp, with an ffmpeg remux fallback for the
/// occasional webm container yt-dlp leaves behind.
pub struct YtDlpFetcher {
    yt_dlp: String,
    ffmpeg: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(yt_dlp: impl Into<String>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
            ffmpeg: ffmpeg.into(),
        }
    }

    /// Remux a webm download into the expected m4a container and remove the
    /// intermediate file.
    async fn remux_webm(&self, webm: &Path, target: &Path) -> Result<()> {
        tracing::debug!("Remuxing {} -> {}", webm.display(), target.display());

        let output = Command::new(&self.ffmpeg)
            .args([
                "-i",
                &webm.to_string_lossy(),
                "-vn",
                "-c:a",
                "aac",
                "-y",
                &target.to_string_lossy(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("ffmpeg remux failed: {}", error);
        }

        fs_err::remove_file(webm)?;
        Ok(())
    }
}

#[async_trait]
impl AudioSource for YtDlpFetcher {
    async fn fetch(&self, item: &Item, workdir: &Path) -> Result<Option<PathBuf>> {
        let target = workdir.join(format!("{}.m4a", item.key));

        tracing::info!("Downloading audio for: {}", item.url);

        let result = Command::new(&self.yt_dlp)
            .args([
                "-f",
                "bestaudio",
                "--extract-audio",
                "--audio-format",
                "m4a",
                "--audio-quality",
                "0",
                "--no-playlist",
                "--ignore-errors",
                "-o",
                &target.to_string_lossy(),
                &item.url,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        match result {
            Ok(output) if !output.status.success() => {
                let error = String::from_utf8_lossy(&output.stderr);
                tracing::warn!("yt-dlp reported errors for {}: {}", item.url, error.trim());
            }
            Err(e) => {
                tracing::warn!("Failed to run yt-dlp for {}: {}", item.url, e);
                return Ok(None);
            }
            Ok(_) => {}
        }

        // yt-dlp sometimes leaves a webm behind instead of the requested m4a
        if !target.exists() {
            let webm = workdir.join(format!("{}.webm", item.key));
            if webm.exists() {
                if let Err(e) = self.remux_webm(&webm, &target).await {
                    tracing::warn!("Remux failed for {}: {}", item.url, e);
                }
            }
        }

        if target.exists() {
            Ok(Some(target))
        } else {
            tracing::warn!("No audio artifact produced for {}", item.url);
            Ok(None)
        }
    }
}
