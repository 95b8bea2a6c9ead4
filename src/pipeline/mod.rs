use candle_core::Device;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::audio::{AudioConverter, FfmpegNormalizer};
use crate::config::Config;
use crate::engine::{DecodingEngine, ModelSize, SpeechDecoder};
use crate::fetch::{AudioSource, YtDlpFetcher};
use crate::BulkscribeError;

pub mod job;

pub use job::{run_job, JobStage};

/// One unit of work: a single video derived from expanding the input links.
#[derive(Debug, Clone)]
pub struct Item {
    /// External identifier (the video URL)
    pub url: String,

    /// Short key used for filesystem naming, derived from the URL
    pub key: String,
}

impl Item {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let key = crate::utils::item_key(&url);
        Self { url, key }
    }
}

/// Deterministic transcript location for an item key
pub fn transcript_path(output_root: &Path, key: &str) -> PathBuf {
    output_root.join(key).join(format!("{}_transcript.txt", key))
}

/// Per-item result reported back to the coordinator
#[derive(Debug, Clone)]
pub struct Outcome {
    pub key: String,
    pub url: String,
    pub succeeded: bool,

    /// Stage at which the job failed, when it did
    pub failed_at: Option<JobStage>,

    /// Error detail, when available
    pub error: Option<String>,
}

impl Outcome {
    pub fn succeeded(item: &Item) -> Self {
        Self {
            key: item.key.clone(),
            url: item.url.clone(),
            succeeded: true,
            failed_at: None,
            error: None,
        }
    }

    pub fn failed(item: &Item, stage: JobStage, detail: impl Into<String>) -> Self {
        Self {
            key: item.key.clone(),
            url: item.url.clone(),
            succeeded: false,
            failed_at: Some(stage),
            error: Some(detail.into()),
        }
    }
}

/// Aggregate result of a bulk run
#[derive(Debug)]
pub struct RunSummary {
    pub succeeded: usize,
    pub total: usize,
    pub outcomes: Vec<Outcome>,
}

/// Owns the worker pool and fans one job out per item.
///
/// The fetch, normalize, and decode capabilities are injected so the
/// pipeline is testable without yt-dlp, ffmpeg, or a loaded model.
pub struct BulkCoordinator {
    source: Arc<dyn AudioSource>,
    converter: Arc<dyn AudioConverter>,
    decoder: Arc<dyn SpeechDecoder>,
}

impl BulkCoordinator {
    pub fn new(
        source: Arc<dyn AudioSource>,
        converter: Arc<dyn AudioConverter>,
        decoder: Arc<dyn SpeechDecoder>,
    ) -> Self {
        Self {
            source,
            converter,
            decoder,
        }
    }

    /// Dispatch one job per item with at most `concurrency` in flight and
    /// collect outcomes in completion order.
    pub async fn run(
        &self,
        items: Vec<Item>,
        concurrency: usize,
        output_root: &Path,
    ) -> crate::Result<RunSummary> {
        fs_err::create_dir_all(output_root)?;

        let total = items.len();
        let concurrency = concurrency.max(1);
        let root = output_root.to_path_buf();

        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap(),
        );
        progress.set_message("Transcribing videos...");

        let mut completions = stream::iter(items.into_iter().map(|item| {
            let source = Arc::clone(&self.source);
            let converter = Arc::clone(&self.converter);
            let decoder = Arc::clone(&self.decoder);
            let root = root.clone();
            async move {
                let key = item.key.clone();
                let url = item.url.clone();
                let handle = tokio::spawn(async move {
                    job::run_job(
                        item,
                        &root,
                        source.as_ref(),
                        converter.as_ref(),
                        decoder.as_ref(),
                    )
                    .await
                });
                (handle.await, key, url)
            }
        }))
        .buffer_unordered(concurrency);

        let mut outcomes = Vec::with_capacity(total);
        let mut succeeded = 0usize;

        while let Some((joined, key, url)) = completions.next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    // A panicking job is caught here; its siblings keep running
                    tracing::error!("Processing failed for {}: {}", key, e);
                    Outcome {
                        key,
                        url,
                        succeeded: false,
                        failed_at: None,
                        error: Some(e.to_string()),
                    }
                }
            };

            if outcome.succeeded {
                succeeded += 1;
            }
            progress.inc(1);
            outcomes.push(outcome);
        }

        progress.finish_and_clear();
        tracing::info!("Successfully processed {} out of {} videos", succeeded, total);

        Ok(RunSummary {
            succeeded,
            total,
            outcomes,
        })
    }
}

/// Entry point for a bulk transcription run.
///
/// Resolves required external tools and loads the decoding model exactly
/// once before any job is dispatched; failures at either step abort the run.
pub async fn run_bulk(
    items: Vec<Item>,
    model: ModelSize,
    concurrency: usize,
    output_root: &Path,
    config: &Config,
) -> crate::Result<RunSummary> {
    fs_err::create_dir_all(output_root)?;

    let ffmpeg = crate::audio::resolve_ffmpeg(&config.tools)?;

    let engine = DecodingEngine::load(model, Device::Cpu)
        .await
        .map_err(|e| BulkscribeError::ModelLoadFailed(e.to_string()))?;
    tracing::info!("Decoding engine ready ({} model)", engine.size());

    let coordinator = BulkCoordinator::new(
        Arc::new(YtDlpFetcher::new(config.tools.yt_dlp.clone(), ffmpeg.clone())),
        Arc::new(FfmpegNormalizer::new(ffmpeg)),
        Arc::new(engine),
    );

    coordinator.run(items, concurrency, output_root).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        fail_keys: HashSet<String>,
    }

    impl FakeSource {
        fn reliable() -> Self {
            Self {
                fail_keys: HashSet::new(),
            }
        }

        fn failing_for(keys: &[&str]) -> Self {
            Self {
                fail_keys: keys.iter().map(|k| k.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl AudioSource for FakeSource {
        async fn fetch(&self, item: &Item, workdir: &Path) -> crate::Result<Option<PathBuf>> {
            if self.fail_keys.contains(&item.key) {
                return Ok(None);
            }
            let path = workdir.join(format!("{}.m4a", item.key));
            fs_err::write(&path, b"raw audio")?;
            Ok(Some(path))
        }
    }

    struct FakeConverter {
        produce: bool,
    }

    #[async_trait]
    impl AudioConverter for FakeConverter {
        async fn normalize(&self, raw: &Path) -> crate::Result<Option<PathBuf>> {
            if !self.produce {
                return Ok(None);
            }
            let target = raw.with_extension("wav");
            fs_err::write(&target, b"canonical audio")?;
            Ok(Some(target))
        }
    }

    struct FakeDecoder {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl FakeDecoder {
        fn saying(text: &'static str) -> Self {
            Self {
                text,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechDecoder for FakeDecoder {
        async fn decode(&self, _audio: &Path) -> String {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.text.to_string()
        }
    }

    fn coordinator(
        source: FakeSource,
        converter: FakeConverter,
        decoder: Arc<FakeDecoder>,
    ) -> BulkCoordinator {
        BulkCoordinator::new(Arc::new(source), Arc::new(converter), decoder)
    }

    #[tokio::test]
    async fn single_item_success_writes_transcript() {
        let root = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder::saying("hello world"));
        let coordinator = coordinator(
            FakeSource::reliable(),
            FakeConverter { produce: true },
            Arc::clone(&decoder),
        );

        let items = vec![Item::new("https://youtube.com/watch?v=abc123")];
        let summary = coordinator.run(items, 1, root.path()).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.total, 1);

        let transcript = transcript_path(root.path(), "abc123");
        assert!(transcript.exists());
        let text = fs_err::read_to_string(&transcript).unwrap();
        assert!(!text.is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_is_isolated_from_siblings() {
        let root = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder::saying("transcribed text"));
        let coordinator = coordinator(
            FakeSource::failing_for(&["vid2"]),
            FakeConverter { produce: true },
            Arc::clone(&decoder),
        );

        let items: Vec<Item> = (1..=5)
            .map(|i| Item::new(format!("https://youtube.com/watch?v=vid{}", i)))
            .collect();
        let summary = coordinator.run(items, 3, root.path()).await.unwrap();

        assert_eq!(summary.total, 5);
        assert_eq!(summary.succeeded, 4);
        assert!(!transcript_path(root.path(), "vid2").exists());
        for key in ["vid1", "vid3", "vid4", "vid5"] {
            assert!(transcript_path(root.path(), key).exists());
        }

        // The failing item never reached the decoder
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn transcript_exists_iff_outcome_succeeded() {
        let root = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder::saying("some text"));
        let coordinator = coordinator(
            FakeSource::failing_for(&["bad1", "bad2"]),
            FakeConverter { produce: true },
            decoder,
        );

        let items: Vec<Item> = ["ok1", "bad1", "ok2", "bad2"]
            .iter()
            .map(|k| Item::new(format!("https://youtube.com/watch?v={}", k)))
            .collect();
        let summary = coordinator.run(items, 2, root.path()).await.unwrap();

        for outcome in &summary.outcomes {
            let exists = transcript_path(root.path(), &outcome.key).exists();
            assert_eq!(outcome.succeeded, exists, "inconsistent for {}", outcome.key);
        }
    }

    #[tokio::test]
    async fn empty_decode_counts_as_failure() {
        let root = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder::saying(""));
        let coordinator = coordinator(
            FakeSource::reliable(),
            FakeConverter { produce: true },
            decoder,
        );

        let items = vec![Item::new("https://youtube.com/watch?v=silent")];
        let summary = coordinator.run(items, 1, root.path()).await.unwrap();

        assert_eq!(summary.succeeded, 0);
        let outcome = &summary.outcomes[0];
        assert_eq!(outcome.failed_at, Some(JobStage::Decoding));
        assert!(!transcript_path(root.path(), "silent").exists());
    }

    #[test]
    fn normalize_failure_ends_job_before_decode() {
        let root = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder::saying("unreached"));
        let coordinator = coordinator(
            FakeSource::reliable(),
            FakeConverter { produce: false },
            Arc::clone(&decoder),
        );

        let items = vec![Item::new("https://youtube.com/watch?v=noconv")];
        let summary =
            tokio_test::block_on(coordinator.run(items, 1, root.path())).unwrap();

        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.outcomes[0].failed_at, Some(JobStage::Normalizing));
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn coordinator_creates_output_root() {
        let base = tempfile::tempdir().unwrap();
        let root = base.path().join("nested").join("transcripts");
        let decoder = Arc::new(FakeDecoder::saying("text"));
        let coordinator = coordinator(
            FakeSource::reliable(),
            FakeConverter { produce: true },
            decoder,
        );

        let summary = tokio_test::block_on(coordinator.run(
            vec![Item::new("https://youtube.com/watch?v=deep")],
            1,
            &root,
        ))
        .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(root.is_dir());
    }

    #[tokio::test]
    async fn empty_run_reports_zero_of_zero() {
        let root = tempfile::tempdir().unwrap();
        let decoder = Arc::new(FakeDecoder::saying("text"));
        let coordinator = coordinator(
            FakeSource::reliable(),
            FakeConverter { produce: true },
            decoder,
        );

        let summary = coordinator.run(Vec::new(), 4, root.path()).await.unwrap();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn item_derives_key_from_url() {
        let item = Item::new("https://youtube.com/watch?v=abc123");
        assert_eq!(item.key, "abc123");
    }
}
