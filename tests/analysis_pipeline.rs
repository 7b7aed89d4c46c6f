use std::f32::consts::PI;
use std::io::Cursor;
use std::sync::Arc;

use musicmatch::audio::decode::{DecodeSettings, ExhaustionReason};
use musicmatch::audio::features::DescriptorVector;
use musicmatch::audio::format::{classify, AudioFormat, ClaimedType};
use musicmatch::audio::standard_pipeline;
use musicmatch::scoring::{similarity, CompositeScore};
use musicmatch::Analyzer;

/// A-minor-ish pad with a click every half second, written as 16-bit PCM WAV.
fn clip(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let beat = (sample_rate / 2) as usize;
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..(sample_rate as f32 * seconds) as usize {
            let t = i as f32 / sample_rate as f32;
            let pad = [220.0f32, 261.63, 329.63]
                .iter()
                .map(|f| (2.0 * PI * f * t).sin())
                .sum::<f32>()
                * 0.15;
            let since_beat = i % beat;
            let click = if since_beat < 300 {
                (1.0 - since_beat as f32 / 300.0) * if since_beat % 2 == 0 { 0.5 } else { -0.5 }
            } else {
                0.0
            };
            let sample = ((pad + click).clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

fn analyzer() -> Analyzer {
    Analyzer::new(standard_pipeline(DecodeSettings::default(), None))
}

fn wav_claim() -> ClaimedType {
    ClaimedType::new(Some("upload.bin"), Some("application/octet-stream"))
}

#[test]
fn wav_signature_overrides_claimed_extension() {
    assert_eq!(classify(&clip(48_000, 1, 0.1), &wav_claim()), AudioFormat::Wav);
}

#[test]
fn native_rate_clip_is_measured() {
    let analysis = analyzer().analyze(clip(48_000, 1, 8.0), &wav_claim());

    assert_eq!(analysis.format, AudioFormat::Wav);
    assert_eq!(analysis.strategy, Some("native-rate"));
    assert!(analysis.exhaustion.is_none());
    let d = analysis.extraction.measured().expect("measured descriptor");

    assert!((d.duration - 8.0).abs() < 0.01);
    assert!(d.tempo > 0.0 && d.tempo.is_finite());
    assert!(d.onset_count > 0);
    assert!((0.0..=1.0).contains(&d.zero_crossing_rate));
    assert!(d.chroma.iter().chain(&d.tonnetz).chain(&d.mfcc).all(|v| v.is_finite()));
    for s in [analysis.scores.danceability, analysis.scores.energy, analysis.scores.valence] {
        assert!((0.0..=1.0).contains(&s));
    }
    assert!(analysis.key.key < 12);
    assert_eq!(analysis.features.duration_ms, 8_000);
}

#[test]
fn off_rate_stereo_clip_is_resampled_to_target() {
    let pipeline = standard_pipeline(DecodeSettings::default(), None);
    let outcome = pipeline.decode(Arc::from(clip(22_050, 2, 6.0)), &wav_claim());

    assert_eq!(outcome.strategy, Some("resampling"));
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].strategy, "native-rate");
    let buffer = outcome.buffer().expect("decoded buffer");
    assert_eq!(buffer.sample_rate(), 48_000);
    assert!((buffer.duration() - 6.0).abs() < 0.01);
}

#[test]
fn long_clip_is_truncated_to_thirty_seconds() {
    let pipeline = standard_pipeline(DecodeSettings::default(), None);
    let outcome = pipeline.decode(Arc::from(clip(48_000, 1, 32.0)), &wav_claim());
    let buffer = outcome.buffer().expect("decoded buffer");
    assert!(buffer.duration() <= 30.0);
    assert!(buffer.duration() > 29.9);
}

#[test]
fn short_clip_falls_back_to_defaults() {
    let analysis = analyzer().analyze(clip(48_000, 1, 2.0), &wav_claim());

    assert!(analysis.extraction.is_fallback());
    assert_eq!(analysis.extraction.descriptor(), &DescriptorVector::fallback());
    assert!(matches!(analysis.exhaustion, Some(ExhaustionReason::TooShort { .. })));
    assert_eq!(analysis.scores, CompositeScore::NEUTRAL);
}

#[test]
fn same_clip_is_fully_similar_to_itself() {
    let analyzer = analyzer();
    let bytes = clip(48_000, 1, 6.0);
    let a = analyzer.analyze(bytes.clone(), &wav_claim());
    let b = analyzer.analyze(bytes, &wav_claim());

    assert_eq!(a.extraction, b.extraction);
    let result = similarity(&a.features.to_feature_map(), &b.features.to_feature_map());
    assert_eq!(result.score, 100.0);
}
