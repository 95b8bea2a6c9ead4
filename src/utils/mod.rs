use anyhow::Result;
use std::path::{Path, PathBuf};
use url::Url;

use crate::BulkscribeError;

/// Validate a URL and return normalized version
pub fn validate_and_normalize_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|_| anyhow::anyhow!("Invalid URL format: {}", url))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("URL must use HTTP or HTTPS protocol");
    }

    Ok(parsed.to_string())
}

/// Derive the short filesystem key for a video URL.
///
/// `watch?v=abc123` style URLs yield the video id, `youtu.be/<id>` URLs the
/// path segment. Anything else falls back to a sanitized tail of the URL so
/// the key stays deterministic for the same input.
pub fn item_key(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url) {
        if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "v") {
            let id = sanitize_filename(&id);
            if !id.is_empty() {
                return id;
            }
        }

        if parsed.host_str() == Some("youtu.be") {
            if let Some(segment) = parsed.path_segments().and_then(|mut s| s.next()) {
                let id = sanitize_filename(segment);
                if !id.is_empty() {
                    return id;
                }
            }
        }

        if let Some(segment) = parsed
            .path_segments()
            .and_then(|s| s.filter(|p| !p.is_empty()).last())
        {
            let id = sanitize_filename(segment);
            if !id.is_empty() {
                return id;
            }
        }
    }

    sanitize_filename(url)
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric characters, hyphens, underscores, and dots
                c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
                // Replace everything else with underscore
                _ => '_',
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Resolve an executable by scanning PATH, falling back to an environment
/// variable override. Neither resolving is a configuration error.
pub fn resolve_executable(name: &str, env_override: &str) -> Result<PathBuf> {
    if let Some(path) = find_in_path(name) {
        return Ok(path);
    }

    if let Some(path) = std::env::var_os(env_override) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(
            "{} points at {} which is not a file",
            env_override,
            path.display()
        );
    }

    Err(BulkscribeError::ToolNotFound(format!(
        "{} (not on PATH, {} not set)",
        name, env_override
    ))
    .into())
}

/// Scan the PATH environment variable for an executable
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;

    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }

        #[cfg(windows)]
        {
            let candidate = dir.join(format!("{}.exe", name));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Check if a file exists and is readable
pub fn check_file_accessible(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("File does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("Path is not a file: {}", path.display());
    }

    std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Cannot access file {}: {}", path.display(), e))?;

    Ok(())
}

/// Check if the current environment has required tools
pub async fn check_dependencies() -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available("yt-dlp").await {
        missing.push("yt-dlp - required for downloading audio and expanding playlists".to_string());
    }

    if !check_command_available("ffmpeg").await {
        missing.push("ffmpeg - required for audio normalization (or set FFMPEG_PATH)".to_string());
    }

    missing
}

/// Check if a command is available in PATH
async fn check_command_available(command: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg("--version")
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_key_watch_url() {
        assert_eq!(item_key("https://youtube.com/watch?v=abc123"), "abc123");
        assert_eq!(
            item_key("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn test_item_key_short_url() {
        assert_eq!(item_key("https://youtu.be/xyz789"), "xyz789");
    }

    #[test]
    fn test_item_key_fallback() {
        assert_eq!(item_key("https://example.com/media/episode-12"), "episode-12");
        // Not parseable as a URL at all: sanitize the raw input
        assert_eq!(item_key("not a url"), "not_a_url");
    }

    #[test]
    fn test_item_key_is_deterministic() {
        let url = "https://youtube.com/watch?v=abc123";
        assert_eq!(item_key(url), item_key(url));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Hello World!"), "Hello_World");
        assert_eq!(sanitize_filename("test/file?name"), "test_file_name");
        assert_eq!(sanitize_filename("__spaced__"), "spaced");
    }

    #[test]
    fn test_validate_and_normalize_url() {
        assert!(validate_and_normalize_url("https://example.com").is_ok());
        assert!(validate_and_normalize_url("http://example.com").is_ok());
        assert!(validate_and_normalize_url("ftp://example.com").is_err());
        assert!(validate_and_normalize_url("not-a-url").is_err());
    }

    #[test]
    fn test_resolve_executable_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        std::env::set_var("BULKSCRIBE_TEST_TOOL", &tool);
        let resolved =
            resolve_executable("definitely-not-on-path-xyz", "BULKSCRIBE_TEST_TOOL").unwrap();
        assert_eq!(resolved, tool);
        std::env::remove_var("BULKSCRIBE_TEST_TOOL");
    }

    #[test]
    fn test_resolve_executable_missing_is_error() {
        let err = resolve_executable("definitely-not-on-path-xyz", "BULKSCRIBE_UNSET_VAR")
            .unwrap_err();
        assert!(err.to_string().contains("definitely-not-on-path-xyz"));
    }
}
