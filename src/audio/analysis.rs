use rayon::prelude::*;

use super::decode::{AudioBuffer, DecodeOutcome};
use super::features::{DescriptorVector, Extraction};
use super::rhythm::{detect_onsets, estimate_tempo, onset_envelope, track_beats};
use super::spectral::{
    chroma, dct_ii_ortho, frame_starts, harmonic_ratio, power_to_db, stft, tonnetz, MelFilterBank,
};

const FFT_SIZE: usize = 2048;
const HOP_SIZE: usize = 512;
const N_MELS: usize = 128;
const N_MFCC: usize = 13;
const TOP_DB: f32 = 80.0;
const ROLLOFF: f32 = 0.85;
const HPSS_KERNEL: usize = 17;
/// HPSS only looks at bins below this index (~6 kHz at 48 kHz).
const HPSS_MAX_BINS: usize = 256;

const DEFAULT_TEMPO: f32 = 120.0;
const DEFAULT_HARMONIC_RATIO: f32 = 0.5;

/// Statistics of one analysis frame.
#[derive(Clone, Debug)]
struct FrameStats {
    centroid: f32,
    rolloff: f32,
    zcr: f32,
    rms: f32,
    mel_power: Vec<f32>,
    chroma: [f32; 12],
}

/// Turns a decoded buffer into a [`DescriptorVector`].
pub struct FeatureExtractor {
    mel_bank: MelFilterBank,
    sample_rate: u32,
}

impl FeatureExtractor {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            mel_bank: MelFilterBank::new(N_MELS, FFT_SIZE, sample_rate),
            sample_rate,
        }
    }

    /// Measured descriptor for a decoded clip, or the fallback vector when
    /// the pipeline came back empty.
    pub fn extract_outcome(&self, outcome: &DecodeOutcome) -> Extraction {
        match &outcome.result {
            Ok(buffer) => Extraction::Measured(self.extract(buffer)),
            Err(reason) => {
                log::warn!("No usable audio ({}), using default descriptors", reason);
                Extraction::fallback()
            }
        }
    }

    pub fn extract(&self, buffer: &AudioBuffer) -> DescriptorVector {
        let sample_rate = buffer.sample_rate();
        let samples: Vec<f32> = buffer
            .samples()
            .iter()
            .map(|&s| if s.is_finite() { s } else { 0.0 })
            .collect();

        // A buffer at another rate gets its own filter bank.
        let rebuilt;
        let mel_bank = if sample_rate == self.sample_rate {
            &self.mel_bank
        } else {
            rebuilt = MelFilterBank::new(N_MELS, FFT_SIZE, sample_rate);
            &rebuilt
        };

        log::debug!("Pass 1: STFT ({} samples @ {}Hz)", samples.len(), sample_rate);
        let spec = stft(&samples, sample_rate, FFT_SIZE, HOP_SIZE);
        let starts = frame_starts(samples.len(), FFT_SIZE, HOP_SIZE);

        log::debug!("Pass 2: per-frame statistics ({} frames)", spec.frames.len());
        let frames: Vec<FrameStats> = spec
            .frames
            .par_iter()
            .zip(starts.par_iter())
            .map(|(mags, &start)| {
                let end = (start + FFT_SIZE).min(samples.len());
                frame_stats(mags, &samples[start..end], sample_rate, mel_bank)
            })
            .collect();

        log::debug!("Pass 3: cepstral, rhythm and harmonic statistics");
        let mut mel_db: Vec<Vec<f32>> = frames.iter().map(|f| f.mel_power.clone()).collect();
        power_to_db(&mut mel_db, TOP_DB);

        let mfcc_frames: Vec<Vec<f32>> = mel_db.par_iter().map(|m| dct_ii_ortho(m, N_MFCC)).collect();
        let tonnetz_frames: Vec<[f32; 6]> = frames.iter().map(|f| tonnetz(&f.chroma)).collect();

        let frame_rate = spec.frame_rate();
        let envelope = onset_envelope(&mel_db);
        let onsets = detect_onsets(&envelope, frame_rate);
        let tempo = estimate_tempo(&envelope, frame_rate).unwrap_or(DEFAULT_TEMPO);
        let beats = track_beats(&envelope, frame_rate, tempo);
        let harmonic = harmonic_ratio(&spec, HPSS_KERNEL, HPSS_MAX_BINS).unwrap_or(DEFAULT_HARMONIC_RATIO);

        let descriptor = DescriptorVector {
            tempo,
            beat_count: beats.len(),
            chroma: mean_array(frames.iter().map(|f| &f.chroma[..])),
            tonnetz: mean_array(tonnetz_frames.iter().map(|t| &t[..])),
            mfcc: mean_array(mfcc_frames.iter().map(Vec::as_slice)),
            spectral_centroid: mean(frames.iter().map(|f| f.centroid)),
            spectral_rolloff: mean(frames.iter().map(|f| f.rolloff)),
            zero_crossing_rate: mean(frames.iter().map(|f| f.zcr)),
            onset_count: onsets.len(),
            rms_mean: mean(frames.iter().map(|f| f.rms)),
            duration: buffer.duration(),
            onset_strength_mean: mean(envelope.iter().copied()),
            harmonic_ratio: harmonic,
        };

        log::info!(
            "Features: tempo={:.1} BPM, beats={}, onsets={}, centroid={:.0}Hz, rms={:.4}, harmonic={:.2}",
            descriptor.tempo,
            descriptor.beat_count,
            descriptor.onset_count,
            descriptor.spectral_centroid,
            descriptor.rms_mean,
            descriptor.harmonic_ratio
        );

        descriptor
    }
}

fn frame_stats(mags: &[f32], frame: &[f32], sample_rate: u32, mel_bank: &MelFilterBank) -> FrameStats {
    let bin_hz = sample_rate as f32 / FFT_SIZE as f32;

    let total: f32 = mags.iter().sum();
    let centroid = if total > 1e-10 {
        mags.iter().enumerate().map(|(i, &m)| i as f32 * bin_hz * m).sum::<f32>() / total
    } else {
        0.0
    };

    let rolloff = if total > 1e-10 {
        let target = ROLLOFF * total;
        let mut cumulative = 0.0f32;
        let bin = mags
            .iter()
            .position(|&m| {
                cumulative += m;
                cumulative >= target
            })
            .unwrap_or(mags.len().saturating_sub(1));
        bin as f32 * bin_hz
    } else {
        0.0
    };

    let zcr = if frame.len() > 1 {
        let crossings = frame
            .windows(2)
            .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
            .count();
        crossings as f32 / frame.len() as f32
    } else {
        0.0
    };

    let rms = if frame.is_empty() {
        0.0
    } else {
        (frame.iter().map(|s| s * s).sum::<f32>() / frame.len() as f32).sqrt()
    };

    let power: Vec<f32> = mags.iter().map(|m| m * m).collect();

    FrameStats {
        centroid,
        rolloff,
        zcr,
        rms,
        mel_power: mel_bank.apply(&power),
        chroma: chroma(&power, sample_rate, FFT_SIZE),
    }
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, count) = values.fold((0.0f64, 0usize), |(s, n), v| (s + v as f64, n + 1));
    if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    }
}

fn mean_array<'a, const N: usize>(rows: impl Iterator<Item = &'a [f32]>) -> [f32; N] {
    let mut sums = [0.0f64; N];
    let mut count = 0usize;
    for row in rows {
        for (s, &v) in sums.iter_mut().zip(row) {
            *s += v as f64;
        }
        count += 1;
    }
    let mut out = [0.0f32; N];
    if count > 0 {
        for (o, s) in out.iter_mut().zip(sums) {
            *o = (s / count as f64) as f32;
        }
    }
    out
}
