use std::io::Cursor;

use super::decode::{downmix_into, AudioBuffer, DecodeError, DecodeInput, DecodeStrategy};
use super::resample::resample_mono;

/// Plain RIFF/WAVE reader, tried last. Handles integer and float PCM layouts
/// the probing decoders sometimes refuse (odd bit depths, extensible headers).
#[derive(Default)]
pub struct WavReaderFallback;

impl DecodeStrategy for WavReaderFallback {
    fn name(&self) -> &'static str {
        "wav-reader"
    }

    fn attempt(&self, input: &DecodeInput) -> Result<AudioBuffer, DecodeError> {
        let mut reader = hound::WavReader::new(Cursor::new(&input.bytes[..]))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;
        let max_frames = input.settings.max_frames(spec.sample_rate);
        let max_samples = max_frames.saturating_mul(channels);

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .take(max_samples)
                .collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let scale = 1.0 / (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .take(max_samples)
                    .map(|s| s.map(|v| v as f32 * scale))
                    .collect::<Result<_, _>>()?
            }
        };

        let mut mono = Vec::with_capacity(interleaved.len() / channels);
        downmix_into(&mut mono, &interleaved, channels);
        if mono.is_empty() {
            return Err(DecodeError::Empty);
        }

        let target = input.settings.target_sample_rate;
        let mut samples = resample_mono(&mono, spec.sample_rate, target)?;
        samples.truncate(input.settings.max_frames(target));
        Ok(AudioBuffer::new(samples, target))
    }
}
