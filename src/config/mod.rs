use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// External tool settings
    pub tools: ToolsConfig,

    /// Repurposing (text generation) settings
    pub repurpose: RepurposeConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Command used to download audio and expand playlists
    pub yt_dlp: String,

    /// Explicit ffmpeg path; when unset, PATH is scanned and the
    /// FFMPEG_PATH environment variable is consulted as a fallback
    pub ffmpeg: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepurposeConfig {
    /// Base URL of an OpenAI-compatible chat completion endpoint
    pub api_base: String,

    /// Model name passed to the endpoint
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Token budget for generated summaries
    pub summary_max_tokens: u32,

    /// Token budget for generated blog posts
    pub blog_post_max_tokens: u32,

    /// Token budget for generated social snippets
    pub snippet_max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default number of parallel workers
    pub default_workers: usize,

    /// Default output directory for transcripts
    pub default_output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tools: ToolsConfig {
                yt_dlp: "yt-dlp".to_string(),
                ffmpeg: None,
            },
            repurpose: RepurposeConfig {
                api_base: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key_env: "OPENAI_API_KEY".to_string(),
                summary_max_tokens: 200,
                blog_post_max_tokens: 800,
                snippet_max_tokens: 80,
            },
            app: AppConfig {
                default_workers: 4,
                default_output_dir: "transcripts".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .context("Failed to parse config file")?;

            config.validate()?;
            Ok(config)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("bulkscribe").join("config.yaml"))
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.tools.yt_dlp.trim().is_empty() {
            anyhow::bail!("tools.yt_dlp must not be empty");
        }

        if self.app.default_workers == 0 {
            anyhow::bail!("app.default_workers must be at least 1");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp command: {}", self.tools.yt_dlp);
        match &self.tools.ffmpeg {
            Some(path) => println!("  ffmpeg path: {}", path.display()),
            None => println!("  ffmpeg path: (PATH lookup, FFMPEG_PATH fallback)"),
        }
        println!("  Repurpose endpoint: {}", self.repurpose.api_base);
        println!("  Repurpose model: {}", self.repurpose.model);
        println!("  API key env var: {}", self.repurpose.api_key_env);
        println!("  Default workers: {}", self.app.default_workers);
        println!("  Default output dir: {}", self.app.default_output_dir);
    }

    /// Print the path of the configuration file
    pub fn display_path() -> Result<()> {
        println!("Configuration file:");
        println!("  {}", Self::config_path()?.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = Config::default();
        config.app.default_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_yaml() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.tools.yt_dlp, config.tools.yt_dlp);
        assert_eq!(parsed.app.default_workers, config.app.default_workers);
    }
}
