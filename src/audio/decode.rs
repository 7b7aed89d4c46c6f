use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::format::{classify, AudioFormat, ClaimedType};

/// Mono waveform at the pipeline's target rate.
///
/// Only the decode pipeline constructs these; downstream code reads them.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub(crate) fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecodeSettings {
    pub target_sample_rate: u32,
    pub max_duration_secs: f32,
    pub min_duration_secs: f32,
    pub min_input_bytes: usize,
}

impl Default for DecodeSettings {
    fn default() -> Self {
        Self {
            target_sample_rate: 48_000,
            max_duration_secs: 30.0,
            min_duration_secs: 5.0,
            min_input_bytes: 1000,
        }
    }
}

impl DecodeSettings {
    /// Frame budget for a stream at `sample_rate`.
    pub fn max_frames(&self, sample_rate: u32) -> usize {
        (self.max_duration_secs * sample_rate as f32) as usize
    }
}

/// Shared cancellation signal. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a strategy needs to make one attempt.
pub struct DecodeInput {
    pub bytes: Arc<[u8]>,
    pub format: AudioFormat,
    /// Extension claimed by the uploader, used only when the signature is unknown.
    pub claimed_extension: Option<String>,
    pub settings: DecodeSettings,
    pub cancel: CancelFlag,
}

impl DecodeInput {
    pub fn new(bytes: Arc<[u8]>, claimed: &ClaimedType, settings: DecodeSettings) -> Self {
        let format = classify(&bytes, claimed);
        Self {
            bytes,
            format,
            claimed_extension: claimed.extension(),
            settings,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Extension to hand the prober: the detected format's, else the claim.
    pub fn probe_extension(&self) -> Option<&str> {
        self.format.extension().or(self.claimed_extension.as_deref())
    }
}

/// Why a single strategy attempt failed.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("strategy does not apply to {0} input")]
    NotApplicable(AudioFormat),

    #[error("native sample rate {native} Hz differs from target {target} Hz")]
    RateMismatch { native: u32, target: u32 },

    #[error("no audio track found")]
    NoTrack,

    #[error("stream produced no samples")]
    Empty,

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("external transcoder unavailable: {0}")]
    ToolUnavailable(String),

    #[error("external transcoder failed: {0}")]
    ToolFailed(String),

    #[error("external transcoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("decode cancelled")]
    Cancelled,

    #[error(transparent)]
    Symphonia(#[from] symphonia::core::errors::Error),

    #[error(transparent)]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A single way of turning bytes into an [`AudioBuffer`].
pub trait DecodeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _format: AudioFormat) -> bool {
        true
    }

    fn attempt(&self, input: &DecodeInput) -> Result<AudioBuffer, DecodeError>;
}

#[derive(Clone, Debug, Serialize)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub error: String,
}

/// Why the pipeline produced no usable buffer.
#[derive(Clone, Debug, PartialEq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ExhaustionReason {
    #[error("input of {bytes} bytes is too small to hold audio")]
    InputTooSmall { bytes: usize },

    #[error("all decode strategies failed")]
    AllStrategiesFailed,

    #[error("decoded audio is only {duration:.2}s long")]
    TooShort { duration: f32 },

    #[error("decode cancelled")]
    Cancelled,
}

#[derive(Debug)]
pub struct DecodeOutcome {
    pub format: AudioFormat,
    pub result: Result<AudioBuffer, ExhaustionReason>,
    /// Name of the strategy that produced the buffer, if any did.
    pub strategy: Option<&'static str>,
    pub failures: Vec<StrategyFailure>,
}

impl DecodeOutcome {
    pub fn buffer(&self) -> Option<&AudioBuffer> {
        self.result.as_ref().ok()
    }
}

/// Ordered fallback chain of decode strategies.
pub struct DecodePipeline {
    strategies: Vec<Box<dyn DecodeStrategy>>,
    settings: DecodeSettings,
}

impl DecodePipeline {
    pub fn new(strategies: Vec<Box<dyn DecodeStrategy>>, settings: DecodeSettings) -> Self {
        Self { strategies, settings }
    }

    pub fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    /// Names of the strategies that would be tried for `format`, in order.
    pub fn plan(&self, format: AudioFormat) -> Vec<&'static str> {
        self.strategies
            .iter()
            .filter(|s| s.applies_to(format))
            .map(|s| s.name())
            .collect()
    }

    pub fn decode(&self, bytes: Arc<[u8]>, claimed: &ClaimedType) -> DecodeOutcome {
        self.decode_with_cancel(bytes, claimed, CancelFlag::new())
    }

    pub fn decode_with_cancel(
        &self,
        bytes: Arc<[u8]>,
        claimed: &ClaimedType,
        cancel: CancelFlag,
    ) -> DecodeOutcome {
        let input = DecodeInput::new(bytes, claimed, self.settings).with_cancel(cancel);
        self.run(&input)
    }

    pub fn run(&self, input: &DecodeInput) -> DecodeOutcome {
        let mut outcome = DecodeOutcome {
            format: input.format,
            result: Err(ExhaustionReason::AllStrategiesFailed),
            strategy: None,
            failures: Vec::new(),
        };

        if input.bytes.len() < self.settings.min_input_bytes {
            log::warn!("Input is only {} bytes, skipping decode", input.bytes.len());
            outcome.result = Err(ExhaustionReason::InputTooSmall {
                bytes: input.bytes.len(),
            });
            return outcome;
        }

        log::debug!("Decoding {} bytes detected as {}", input.bytes.len(), input.format);

        for strategy in self.strategies.iter().filter(|s| s.applies_to(input.format)) {
            if input.cancel.is_cancelled() {
                outcome.result = Err(ExhaustionReason::Cancelled);
                return outcome;
            }

            match strategy.attempt(input) {
                Ok(buffer) => {
                    log::info!(
                        "Decoded {:.1}s at {}Hz via {}",
                        buffer.duration(),
                        buffer.sample_rate(),
                        strategy.name()
                    );
                    outcome.strategy = Some(strategy.name());
                    outcome.result = self.check_length(buffer);
                    return outcome;
                }
                Err(err) => {
                    log::debug!("Decode strategy {} failed: {}", strategy.name(), err);
                    let cancelled = matches!(err, DecodeError::Cancelled);
                    outcome.failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        error: err.to_string(),
                    });
                    if cancelled {
                        outcome.result = Err(ExhaustionReason::Cancelled);
                        return outcome;
                    }
                }
            }
        }

        if input.cancel.is_cancelled() {
            outcome.result = Err(ExhaustionReason::Cancelled);
            return outcome;
        }

        log::warn!(
            "All {} decode strategies failed for {} input",
            outcome.failures.len(),
            input.format
        );
        outcome
    }

    fn check_length(&self, buffer: AudioBuffer) -> Result<AudioBuffer, ExhaustionReason> {
        let duration = buffer.duration();
        if duration < self.settings.min_duration_secs {
            log::warn!(
                "Decoded audio too short ({:.1}s < {:.1}s), using defaults",
                duration,
                self.settings.min_duration_secs
            );
            return Err(ExhaustionReason::TooShort { duration });
        }
        Ok(buffer)
    }
}

/// Average interleaved frames down to one channel.
pub(crate) fn downmix_into(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels <= 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    for frame in interleaved.chunks(channels) {
        out.push(frame.iter().sum::<f32>() / channels as f32);
    }
}
