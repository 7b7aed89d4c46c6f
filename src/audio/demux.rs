use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::formats::{IsoMp4Reader, MkvReader, OggReader};

use super::decode::{downmix_into, AudioBuffer, DecodeError, DecodeInput, DecodeStrategy};
use super::format::AudioFormat;
use super::resample::resample_mono;

/// Mono samples at whatever rate the stream was encoded with.
struct NativeStream {
    samples: Vec<f32>,
    sample_rate: u32,
}

fn media_stream(bytes: &Arc<[u8]>) -> MediaSourceStream {
    MediaSourceStream::new(Box::new(Cursor::new(bytes.clone())), Default::default())
}

fn probe(input: &DecodeInput) -> Result<Box<dyn FormatReader>, DecodeError> {
    let mut hint = Hint::new();
    if let Some(ext) = input.probe_extension() {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        media_stream(&input.bytes),
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    Ok(probed.format)
}

/// Declared sample rate of the first decodable track, if the container says.
fn declared_rate(format: &dyn FormatReader) -> Result<Option<u32>, DecodeError> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;
    Ok(track.codec_params.sample_rate)
}

/// Decode the first audio track to mono, stopping once `max_secs` of audio
/// has been collected.
fn decode_track(
    mut format: Box<dyn FormatReader>,
    max_secs: f32,
    input: &DecodeInput,
) -> Result<NativeStream, DecodeError> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        if input.cancel.is_cancelled() {
            return Err(DecodeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                // Truncated uploads are common; keep what decoded so far.
                if samples.is_empty() {
                    return Err(e.into());
                }
                log::debug!("Stopping at packet error after {} samples: {}", samples.len(), e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if sample_rate == 0 {
            sample_rate = spec.rate;
        }
        let channels = spec.channels.count();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        downmix_into(&mut samples, sample_buf.samples(), channels);

        if sample_rate > 0 {
            let max_frames = (max_secs * sample_rate as f32) as usize;
            if samples.len() >= max_frames {
                samples.truncate(max_frames);
                break;
            }
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(NativeStream { samples, sample_rate })
}

fn to_target(stream: NativeStream, input: &DecodeInput) -> Result<AudioBuffer, DecodeError> {
    let target = input.settings.target_sample_rate;
    let mut samples = resample_mono(&stream.samples, stream.sample_rate, target)?;
    samples.truncate(input.settings.max_frames(target));
    Ok(AudioBuffer::new(samples, target))
}

/// Probe and decode, accepting only streams already at the target rate.
#[derive(Default)]
pub struct NativeRateDecode;

impl DecodeStrategy for NativeRateDecode {
    fn name(&self) -> &'static str {
        "native-rate"
    }

    fn attempt(&self, input: &DecodeInput) -> Result<AudioBuffer, DecodeError> {
        let target = input.settings.target_sample_rate;
        let format = probe(input)?;

        if let Some(native) = declared_rate(format.as_ref())? {
            if native != target {
                return Err(DecodeError::RateMismatch { native, target });
            }
        }

        let stream = decode_track(format, input.settings.max_duration_secs, input)?;
        if stream.sample_rate != target {
            return Err(DecodeError::RateMismatch {
                native: stream.sample_rate,
                target,
            });
        }
        Ok(AudioBuffer::new(stream.samples, target))
    }
}

/// Probe, decode at the native rate, then resample.
#[derive(Default)]
pub struct ResamplingDecode;

impl DecodeStrategy for ResamplingDecode {
    fn name(&self) -> &'static str {
        "resampling"
    }

    fn attempt(&self, input: &DecodeInput) -> Result<AudioBuffer, DecodeError> {
        let format = probe(input)?;
        let stream = decode_track(format, input.settings.max_duration_secs, input)?;
        to_target(stream, input)
    }
}

/// Open the container reader named by the signature directly, bypassing the
/// prober. Helps with streams the prober misidentifies or rejects.
#[derive(Default)]
pub struct ContainerDemux;

impl ContainerDemux {
    fn open(&self, input: &DecodeInput) -> Result<Box<dyn FormatReader>, DecodeError> {
        let opts = FormatOptions::default();
        let source = media_stream(&input.bytes);
        let reader: Box<dyn FormatReader> = match input.format {
            AudioFormat::Webm => Box::new(MkvReader::try_new(source, &opts)?),
            AudioFormat::Mp4 => Box::new(IsoMp4Reader::try_new(source, &opts)?),
            AudioFormat::Ogg => Box::new(OggReader::try_new(source, &opts)?),
            other => return Err(DecodeError::NotApplicable(other)),
        };
        Ok(reader)
    }
}

impl DecodeStrategy for ContainerDemux {
    fn name(&self) -> &'static str {
        "container-demux"
    }

    fn applies_to(&self, format: AudioFormat) -> bool {
        format.is_container()
    }

    fn attempt(&self, input: &DecodeInput) -> Result<AudioBuffer, DecodeError> {
        let reader = self.open(input)?;
        let stream = decode_track(reader, input.settings.max_duration_secs, input)?;
        to_target(stream, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::DecodeSettings;
    use crate::audio::format::ClaimedType;
    use std::io::Cursor as IoCursor;

    fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Arc<[u8]> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = IoCursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = (seconds * sample_rate as f32) as usize;
            for i in 0..frames {
                let t = i as f32 / sample_rate as f32;
                let s = (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner().into()
    }

    fn input(bytes: Arc<[u8]>, target: u32) -> DecodeInput {
        let settings = DecodeSettings {
            target_sample_rate: target,
            max_duration_secs: 3.0,
            ..Default::default()
        };
        DecodeInput::new(bytes, &ClaimedType::new(Some("clip.bin"), None), settings)
    }

    #[test]
    fn native_rate_decodes_matching_stream() {
        let input = input(wav_bytes(16_000, 1, 1.0), 16_000);
        assert_eq!(input.format, AudioFormat::Wav);
        let buffer = NativeRateDecode.attempt(&input).unwrap();
        assert_eq!(buffer.sample_rate(), 16_000);
        assert_eq!(buffer.samples().len(), 16_000);
    }

    #[test]
    fn native_rate_rejects_other_rates() {
        let input = input(wav_bytes(22_050, 1, 1.0), 16_000);
        let err = NativeRateDecode.attempt(&input).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::RateMismatch { native: 22_050, target: 16_000 }
        ));
    }

    #[test]
    fn resampling_converts_stereo_to_target_mono() {
        let input = input(wav_bytes(22_050, 2, 1.0), 16_000);
        let buffer = ResamplingDecode.attempt(&input).unwrap();
        assert_eq!(buffer.sample_rate(), 16_000);
        assert!((buffer.duration() - 1.0).abs() < 0.01);
    }

    #[test]
    fn decode_truncates_to_max_duration() {
        let input = input(wav_bytes(8_000, 1, 5.0), 8_000);
        let buffer = NativeRateDecode.attempt(&input).unwrap();
        assert!(buffer.duration() <= 3.0);
        assert!(buffer.duration() > 2.9);
    }

    #[test]
    fn garbage_fails_to_probe() {
        let input = input(vec![0x42u8; 4096].into(), 16_000);
        assert!(NativeRateDecode.attempt(&input).is_err());
        assert!(ResamplingDecode.attempt(&input).is_err());
    }

    #[test]
    fn container_demux_only_applies_to_containers() {
        assert!(ContainerDemux.applies_to(AudioFormat::Webm));
        assert!(ContainerDemux.applies_to(AudioFormat::Ogg));
        assert!(!ContainerDemux.applies_to(AudioFormat::Wav));
        assert!(!ContainerDemux.applies_to(AudioFormat::Unknown));

        let input = input(wav_bytes(16_000, 1, 0.5), 16_000);
        assert!(matches!(
            ContainerDemux.attempt(&input),
            Err(DecodeError::NotApplicable(AudioFormat::Wav))
        ));
    }
}
