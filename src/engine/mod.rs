use anyhow::{anyhow, Result};
use async_trait::async_trait;
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, audio, Config};
use std::path::Path;
use tokenizers::Tokenizer;
use tokio::sync::Mutex;

pub mod model;

pub use model::ModelSize;

/// Frequency bins of the spectrogram (N_FFT / 2 + 1)
const N_FREQS: usize = m::N_FFT / 2 + 1;

/// Upper bound on generated tokens per 30 second window
const MAX_DECODE_TOKENS: usize = 224;

/// Capability for turning a canonical audio artifact into text.
///
/// Implementations never fail: any internal error is logged and reported as
/// empty text, which the job pipeline treats as a decoding failure.
#[async_trait]
pub trait SpeechDecoder: Send + Sync {
    async fn decode(&self, audio: &Path) -> String;
}

/// A Whisper model loaded once per run and shared by all workers.
///
/// The handle is never reloaded or replaced after construction. The candle
/// text decoder keeps a KV cache across forward calls, so a single decode
/// run takes the internal lock; callers simply share the handle by `Arc`.
pub struct DecodingEngine {
    model: Mutex<m::model::Whisper>,
    config: Config,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
    device: Device,
    size: ModelSize,
}

impl DecodingEngine {
    /// Load a Whisper model. Called once by the coordinator before any job
    /// is dispatched; failure here is fatal for the whole run.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        tracing::info!("Loading Whisper {} model...", size);
        let start_time = std::time::Instant::now();

        let files = model::fetch_model_files(size).await?;

        let config: Config = serde_json::from_reader(fs_err::File::open(&files.config)?)?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;
        let mel_filters = mel_filter_bank(config.num_mel_bins as usize);

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[files.weights], m::DTYPE, &device)?
        };
        let whisper = m::model::Whisper::load(&vb, config.clone())?;

        tracing::info!(
            "Whisper {} model loaded in {:.2}s",
            size,
            start_time.elapsed().as_secs_f64()
        );

        Ok(Self {
            model: Mutex::new(whisper),
            config,
            tokenizer,
            mel_filters,
            device,
            size,
        })
    }

    /// Model size this engine was loaded with
    pub fn size(&self) -> ModelSize {
        self.size
    }

    /// Transcribe a canonical audio artifact.
    ///
    /// An absent or unreadable artifact short-circuits to empty text without
    /// touching the model; internal decode errors are logged and also yield
    /// empty text so a worker never crashes on a bad item.
    pub async fn decode_file(&self, audio_path: &Path) -> String {
        if !audio_path.is_file() {
            tracing::warn!("Canonical audio missing: {}", audio_path.display());
            return String::new();
        }

        let samples = match crate::audio::read_canonical_samples(audio_path) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::error!("Failed to read {}: {}", audio_path.display(), e);
                return String::new();
            }
        };

        tracing::info!("Transcribing {}", audio_path.display());

        match self.decode_samples(&samples).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!("Transcription failed for {}: {}", audio_path.display(), e);
                String::new()
            }
        }
    }

    /// Run the model over one fixed-length window with greedy decoding.
    async fn decode_samples(&self, samples: &[f32]) -> Result<String> {
        // Pad or truncate to the 30 second window the model expects
        let mut padded = vec![0.0f32; m::N_SAMPLES];
        let copy_len = samples.len().min(m::N_SAMPLES);
        padded[..copy_len].copy_from_slice(&samples[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let mel = audio::pcm_to_mel(&self.config, &padded, &self.mel_filters);
        let mel_len = mel.len();
        let mel = Tensor::from_vec(mel, (1, n_mels, mel_len / n_mels), &self.device)?;

        let sot = self.token_id(m::SOT_TOKEN)?;
        let eot = self.token_id(m::EOT_TOKEN)?;
        let transcribe = self.token_id(m::TRANSCRIBE_TOKEN)?;
        let no_timestamps = self.token_id(m::NO_TIMESTAMPS_TOKEN)?;

        let mut tokens = vec![sot];
        if let Some(lang) = self.tokenizer.token_to_id("<|en|>") {
            tokens.push(lang);
        }
        tokens.push(transcribe);
        tokens.push(no_timestamps);
        let prompt_len = tokens.len();

        let mut whisper = self.model.lock().await;
        let encoder_output = whisper.encoder.forward(&mel, true)?;

        for i in 0..MAX_DECODE_TOKENS {
            let input = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let hidden = whisper.decoder.forward(&input, &encoder_output, i == 0)?;
            let (_, seq_len, _) = hidden.dims3()?;
            let logits = whisper
                .decoder
                .final_linear(&hidden.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?;

            // Greedy argmax decode, no sampling
            let logits = logits.to_vec1::<f32>()?;
            let next = logits
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(idx, _)| idx as u32)
                .ok_or_else(|| anyhow!("Decoder produced empty logits"))?;

            if next == eot {
                break;
            }
            tokens.push(next);
        }

        let text = self
            .tokenizer
            .decode(&tokens[prompt_len..], true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        Ok(text.trim().to_string())
    }

    fn token_id(&self, token: &str) -> Result<u32> {
        self.tokenizer
            .token_to_id(token)
            .ok_or_else(|| anyhow!("Token {} missing from tokenizer", token))
    }
}

#[async_trait]
impl SpeechDecoder for DecodingEngine {
    async fn decode(&self, audio: &Path) -> String {
        self.decode_file(audio).await
    }
}

/// Build a triangular mel filter bank of shape (n_mels, N_FREQS).
fn mel_filter_bank(n_mels: usize) -> Vec<f32> {
    let f_max = m::SAMPLE_RATE as f32 / 2.0;
    let mel_max = hz_to_mel(f_max);

    // n_mels + 2 edge points evenly spaced on the mel scale
    let hz_points: Vec<f32> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect();

    let mut filters = vec![0.0f32; n_mels * N_FREQS];
    for mel in 0..n_mels {
        let (lower, center, upper) = (hz_points[mel], hz_points[mel + 1], hz_points[mel + 2]);
        for bin in 0..N_FREQS {
            let freq = bin as f32 * f_max / (N_FREQS - 1) as f32;
            let weight = if freq <= lower || freq >= upper {
                0.0
            } else if freq <= center {
                (freq - lower) / (center - lower)
            } else {
                (upper - freq) / (upper - center)
            };
            // Slaney area normalization
            filters[mel * N_FREQS + bin] = weight * 2.0 / (upper - lower);
        }
    }

    filters
}

fn hz_to_mel(f: f32) -> f32 {
    2595.0 * (1.0 + f / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10.0f32.powf(mel / 2595.0) - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trips() {
        for f in [0.0f32, 440.0, 1000.0, 8000.0] {
            assert!((mel_to_hz(hz_to_mel(f)) - f).abs() < 0.5);
        }
    }

    #[test]
    fn test_filter_bank_shape_and_coverage() {
        let n_mels = 80;
        let filters = mel_filter_bank(n_mels);
        assert_eq!(filters.len(), n_mels * N_FREQS);
        assert!(filters.iter().all(|&w| w >= 0.0));
        // Every band carries some energy
        for mel in 0..n_mels {
            let row = &filters[mel * N_FREQS..(mel + 1) * N_FREQS];
            assert!(row.iter().any(|&w| w > 0.0), "band {} is empty", mel);
        }
    }
}
