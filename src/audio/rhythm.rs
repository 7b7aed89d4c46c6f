//! Onset envelope, onset picking, tempo and beat positions.
//!
//! Everything here works on the frame grid of the mel spectrogram; times are
//! frame indices and `frame_rate` converts them to seconds.

const MIN_BPM: f32 = 40.0;
const MAX_BPM: f32 = 220.0;
const PRIOR_BPM: f32 = 120.0;
/// Width of the tempo prior, in octaves.
const PRIOR_OCTAVES: f32 = 1.0;

/// Mean positive change per mel band between consecutive frames (dB).
pub fn onset_envelope(mel_db: &[Vec<f32>]) -> Vec<f32> {
    let mut envelope = vec![0.0f32; mel_db.len()];
    for t in 1..mel_db.len() {
        let (cur, prev) = (&mel_db[t], &mel_db[t - 1]);
        if cur.is_empty() {
            continue;
        }
        let flux: f32 = cur
            .iter()
            .zip(prev.iter())
            .map(|(c, p)| (c - p).max(0.0))
            .sum();
        envelope[t] = flux / cur.len() as f32;
    }
    envelope
}

/// Peak-pick onsets from the envelope with a moving-average threshold.
pub fn detect_onsets(envelope: &[f32], frame_rate: f32) -> Vec<usize> {
    let peak = envelope.iter().copied().fold(0.0f32, f32::max);
    if envelope.is_empty() || peak <= 0.0 || !peak.is_finite() {
        return Vec::new();
    }
    let norm: Vec<f32> = envelope.iter().map(|v| v / peak).collect();

    let window = ((0.1 * frame_rate).round() as usize).max(1); // ~100ms each side
    let min_gap = ((0.03 * frame_rate).round() as usize).max(1);
    let mut onsets: Vec<usize> = Vec::new();

    for i in 0..norm.len() {
        let start = i.saturating_sub(window);
        let end = (i + window + 1).min(norm.len());
        let local_mean = norm[start..end].iter().sum::<f32>() / (end - start) as f32;

        if norm[i] <= local_mean + 0.07 {
            continue;
        }

        let is_peak = (i == 0 || norm[i] >= norm[i - 1])
            && (i == norm.len() - 1 || norm[i] >= norm[i + 1]);
        let far_enough = onsets.last().map_or(true, |&last| i - last >= min_gap);

        if is_peak && far_enough {
            onsets.push(i);
        }
    }

    onsets
}

fn autocorrelation(signal: &[f32], max_lag: usize) -> Vec<f32> {
    (0..=max_lag)
        .map(|lag| {
            signal[..signal.len() - lag]
                .iter()
                .zip(&signal[lag..])
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect()
}

/// Tempo from the envelope autocorrelation, weighted towards 120 BPM.
/// `None` when the envelope carries no periodicity.
pub fn estimate_tempo(envelope: &[f32], frame_rate: f32) -> Option<f32> {
    if envelope.len() < 4 || frame_rate <= 0.0 {
        return None;
    }

    let mean = envelope.iter().sum::<f32>() / envelope.len() as f32;
    let centered: Vec<f32> = envelope.iter().map(|v| v - mean).collect();

    let min_lag = ((60.0 * frame_rate / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((60.0 * frame_rate / MIN_BPM).ceil() as usize).min(envelope.len() - 1);
    if min_lag > max_lag {
        return None;
    }

    let ac = autocorrelation(&centered, max_lag);
    if ac[0] <= 0.0 || !ac[0].is_finite() {
        return None;
    }

    let mut best: Option<(usize, f32)> = None;
    for (lag, &value) in ac.iter().enumerate().take(max_lag + 1).skip(min_lag) {
        if value <= 0.0 {
            continue;
        }
        let bpm = 60.0 * frame_rate / lag as f32;
        let octaves = (bpm / PRIOR_BPM).log2() / PRIOR_OCTAVES;
        let score = value * (-0.5 * octaves * octaves).exp();
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }

    best.map(|(lag, _)| 60.0 * frame_rate / lag as f32)
}

/// Beat frames: the pulse train at `tempo` whose phase collects the most
/// envelope energy, each pulse snapped to the nearest local maximum.
pub fn track_beats(envelope: &[f32], frame_rate: f32, tempo: f32) -> Vec<usize> {
    if envelope.is_empty() || tempo <= 0.0 || !envelope.iter().any(|&v| v > 0.0) {
        return Vec::new();
    }
    let period = 60.0 * frame_rate / tempo;
    if period < 1.0 || !period.is_finite() {
        return Vec::new();
    }

    let len = envelope.len();
    let pulses = move |phase: f32| {
        (0usize..)
            .map(move |k| (phase + k as f32 * period).round() as usize)
            .take_while(move |&i| i < len)
    };

    let mut best_phase = 0.0f32;
    let mut best_score = f32::NEG_INFINITY;
    for phase in 0..period.ceil() as usize {
        let score: f32 = pulses(phase as f32).map(|i| envelope[i]).sum();
        if score > best_score {
            best_score = score;
            best_phase = phase as f32;
        }
    }

    let reach = ((period / 10.0).round() as usize).max(1);
    let mut beats: Vec<usize> = Vec::new();
    for pulse in pulses(best_phase) {
        let start = pulse.saturating_sub(reach);
        let end = (pulse + reach + 1).min(envelope.len());
        let snapped = (start..end)
            .max_by(|&a, &b| envelope[a].total_cmp(&envelope[b]).then(b.cmp(&a)))
            .unwrap_or(pulse);
        if beats.last().map_or(true, |&last| snapped > last) {
            beats.push(snapped);
        }
    }
    beats
}
