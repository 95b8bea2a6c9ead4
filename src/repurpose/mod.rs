use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::RepurposeConfig;
use crate::BulkscribeError;

/// Character budget for transcript text embedded in a prompt
const MAX_PROMPT_CHARS: usize = 12_000;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Turns finished transcripts into derived text artifacts: a summary, a
/// blog post, and a social media snippet, written beside each transcript.
///
/// Backed by an OpenAI-compatible chat completion endpoint; the endpoint,
/// model, and API key source come from configuration.
pub struct Repurposer {
    client: reqwest::Client,
    config: RepurposeConfig,
    api_key: String,
}

impl Repurposer {
    /// Build a repurposer, failing fast when the API key is not available.
    pub fn new(config: RepurposeConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            BulkscribeError::RepurposeFailed(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            config,
            api_key,
        })
    }

    /// Repurpose every transcript found under the output root.
    ///
    /// Per-transcript failures are logged and skipped so one bad transcript
    /// does not stop the rest.
    pub async fn repurpose_all(&self, root: &Path) -> Result<usize> {
        let transcripts = find_transcripts(root)?;
        if transcripts.is_empty() {
            tracing::warn!("No transcripts found under {}", root.display());
            return Ok(0);
        }

        let mut processed = 0;
        for transcript in transcripts {
            match self.repurpose_transcript(&transcript).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    tracing::error!("Failed to repurpose {}: {}", transcript.display(), e);
                }
            }
        }

        tracing::info!("Repurposed {} transcript(s)", processed);
        Ok(processed)
    }

    /// Generate the three derived artifacts for one transcript file.
    pub async fn repurpose_transcript(&self, transcript: &Path) -> Result<()> {
        crate::utils::check_file_accessible(transcript)?;

        let text = fs_err::read_to_string(transcript)?;
        let text = truncate_for_prompt(&text);
        let folder = transcript
            .parent()
            .context("Transcript file has no parent directory")?;

        tracing::info!("Generating summary...");
        let summary = self
            .generate(
                &format!(
                    "Summarize the following transcript in at most three sentences:\n{}",
                    text
                ),
                self.config.summary_max_tokens,
                0.0,
            )
            .await?;

        tracing::info!("Generating blog post...");
        let blog_post = self
            .generate(
                &format!(
                    "Write a detailed blog post based on the following transcript:\n{}",
                    text
                ),
                self.config.blog_post_max_tokens,
                0.7,
            )
            .await?;

        tracing::info!("Generating social snippet...");
        let snippet = self
            .generate(
                &format!(
                    "Generate a catchy social media snippet based on the following transcript:\n{}",
                    text
                ),
                self.config.snippet_max_tokens,
                0.8,
            )
            .await?;

        fs_err::write(folder.join("summary.txt"), summary)?;
        fs_err::write(folder.join("blog_post.txt"), blog_post)?;
        fs_err::write(folder.join("social_snippet.txt"), snippet)?;

        tracing::info!("Repurposed content saved in {}", folder.display());
        Ok(())
    }

    /// One chat completion round trip
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens,
            temperature,
        };

        let url = format!(
            "{}/chat/completions",
            self.config.api_base.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Chat completion request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion returned HTTP {}: {}", status, body);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .context("Chat completion response had no choices")?;

        Ok(content.trim().to_string())
    }
}

/// Does this filename follow the `<key>_transcript.txt` convention?
pub fn is_transcript_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with("_transcript.txt"))
        .unwrap_or(false)
}

/// Collect transcript files from the per-item folders under the output root.
pub fn find_transcripts(root: &Path) -> Result<Vec<PathBuf>> {
    let mut transcripts = Vec::new();

    for entry in fs_err::read_dir(root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        for file in fs_err::read_dir(&path)? {
            let file = file?.path();
            if file.is_file() && is_transcript_file(&file) {
                transcripts.push(file);
            }
        }
    }

    transcripts.sort();
    Ok(transcripts)
}

/// Cap prompt text on a character boundary
fn truncate_for_prompt(text: &str) -> &str {
    if text.len() <= MAX_PROMPT_CHARS {
        return text;
    }
    let mut end = MAX_PROMPT_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
