use std::path::Path;

use super::{transcript_path, Item, Outcome};
use crate::audio::AudioConverter;
use crate::engine::SpeechDecoder;
use crate::fetch::AudioSource;

/// Stages a per-item job moves through.
///
/// Transitions are strictly forward; the first failing stage ends the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Pending,
    Fetching,
    Normalizing,
    Decoding,
    Succeeded,
    Failed,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStage::Pending => "pending",
            JobStage::Fetching => "fetching",
            JobStage::Normalizing => "normalizing",
            JobStage::Decoding => "decoding",
            JobStage::Succeeded => "succeeded",
            JobStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

fn fail(item: &Item, stage: JobStage, detail: impl Into<String>) -> Outcome {
    let detail = detail.into();
    tracing::warn!("{} failed while {}: {}", item.key, stage, detail);
    Outcome::failed(item, stage, detail)
}

/// Process a single item: fetch, normalize, decode, persist.
///
/// Every failure path returns an `Outcome` instead of an error so one bad
/// item can never take down a sibling job. No stage is retried.
pub async fn run_job(
    item: Item,
    output_root: &Path,
    source: &dyn AudioSource,
    converter: &dyn AudioConverter,
    decoder: &dyn SpeechDecoder,
) -> Outcome {
    let workdir = output_root.join(&item.key);
    if let Err(e) = fs_err::create_dir_all(&workdir) {
        return fail(&item, JobStage::Pending, e.to_string());
    }

    let raw = match source.fetch(&item, &workdir).await {
        Ok(Some(path)) => path,
        Ok(None) => return fail(&item, JobStage::Fetching, "no audio artifact produced"),
        Err(e) => return fail(&item, JobStage::Fetching, e.to_string()),
    };

    let canonical = match converter.normalize(&raw).await {
        Ok(Some(path)) => path,
        Ok(None) => return fail(&item, JobStage::Normalizing, "no canonical audio produced"),
        Err(e) => return fail(&item, JobStage::Normalizing, e.to_string()),
    };

    let text = decoder.decode(&canonical).await;
    if text.trim().is_empty() {
        return fail(&item, JobStage::Decoding, "empty transcript");
    }

    let transcript = transcript_path(output_root, &item.key);
    if let Err(e) = fs_err::write(&transcript, text.as_bytes()) {
        return fail(&item, JobStage::Decoding, e.to_string());
    }

    tracing::info!("Successfully transcribed: {}", item.key);
    Outcome::succeeded(&item)
}
