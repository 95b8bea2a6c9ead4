use std::process::Stdio;
use tokio::process::Command;
use url::Url;

use crate::pipeline::Item;

/// Expands playlist links into individual video items.
///
/// Non-playlist links pass through unchanged; a playlist that fails to
/// expand is logged and contributes zero items.
pub struct PlaylistExpander {
    yt_dlp: String,
}

/// A link counts as a playlist when its path mentions one or it carries a
/// `list=` query parameter.
pub fn is_playlist_url(url: &str) -> bool {
    if let Ok(parsed) = Url::parse(url) {
        if parsed.path().contains("playlist") {
            return true;
        }
        return parsed.query_pairs().any(|(k, _)| k == "list");
    }
    url.contains("playlist")
}

impl PlaylistExpander {
    pub fn new(yt_dlp: impl Into<String>) -> Self {
        Self {
            yt_dlp: yt_dlp.into(),
        }
    }

    /// Flatten the input links into one item per video.
    pub async fn expand(&self, links: &[String]) -> Vec<Item> {
        let mut items = Vec::new();

        for link in links {
            if is_playlist_url(link) {
                match self.list_playlist_ids(link).await {
                    Ok(ids) => {
                        tracing::info!("Expanded playlist {} into {} videos", link, ids.len());
                        items.extend(
                            ids.into_iter()
                                .map(|id| Item::new(format!("https://youtube.com/watch?v={}", id))),
                        );
                    }
                    Err(e) => {
                        tracing::error!("Failed to expand playlist {}: {}", link, e);
                    }
                }
            } else {
                match crate::utils::validate_and_normalize_url(link) {
                    Ok(url) => items.push(Item::new(url)),
                    Err(e) => tracing::warn!("Skipping invalid link {}: {}", link, e),
                }
            }
        }

        items
    }

    /// List the video ids of a playlist without downloading anything.
    async fn list_playlist_ids(&self, url: &str) -> crate::Result<Vec<String>> {
        let output = Command::new(&self.yt_dlp)
            .args(["--flat-playlist", "--get-id", "--ignore-errors", url])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(crate::BulkscribeError::ExpansionFailed(format!(
                "yt-dlp failed: {}",
                error.trim()
            ))
            .into());
        }

        let stdout = String::from_utf8(output.stdout)?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_detection() {
        assert!(is_playlist_url(
            "https://youtube.com/playlist?list=PL123abc"
        ));
        assert!(is_playlist_url(
            "https://www.youtube.com/watch?v=abc123&list=PL456"
        ));
        assert!(!is_playlist_url("https://youtube.com/watch?v=abc123"));
        assert!(!is_playlist_url("https://youtu.be/abc123"));
    }

    #[tokio::test]
    async fn test_plain_links_pass_through() {
        let expander = PlaylistExpander::new("yt-dlp");
        let links = vec![
            "https://youtube.com/watch?v=one".to_string(),
            "https://youtube.com/watch?v=two".to_string(),
        ];

        let items = expander.expand(&links).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].key, "one");
        assert_eq!(items[1].key, "two");
    }

    #[tokio::test]
    async fn test_failed_expansion_contributes_zero_items() {
        // A nonexistent binary makes every playlist expansion fail
        let expander = PlaylistExpander::new("definitely-not-yt-dlp-xyz");
        let links = vec![
            "https://youtube.com/playlist?list=PLdead".to_string(),
            "https://youtube.com/watch?v=kept".to_string(),
        ];

        let items = expander.expand(&links).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key, "kept");
    }
}
