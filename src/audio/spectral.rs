use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitude spectrogram: one `fft_size / 2 + 1` bin vector per frame.
#[derive(Clone, Debug)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub fft_size: usize,
    pub hop: usize,
    pub sample_rate: u32,
}

impl Spectrogram {
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn bin_hz(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    /// Frames per second of the analysis grid.
    pub fn frame_rate(&self) -> f32 {
        self.sample_rate as f32 / self.hop as f32
    }
}

/// Start offsets of every analysis frame. A signal shorter than one window
/// still yields a single zero-padded frame.
pub fn frame_starts(len: usize, fft_size: usize, hop: usize) -> Vec<usize> {
    if len <= fft_size {
        return vec![0];
    }
    (0..=(len - fft_size) / hop).map(|i| i * hop).collect()
}

pub fn stft(samples: &[f32], sample_rate: u32, fft_size: usize, hop: usize) -> Spectrogram {
    let hann = hann_window(fft_size);
    let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_size);
    let bins = fft_size / 2 + 1;

    let frames = frame_starts(samples.len(), fft_size, hop)
        .into_par_iter()
        .map(|start| {
            let end = (start + fft_size).min(samples.len());
            let mut buffer = vec![Complex::new(0.0f32, 0.0); fft_size];
            for (i, &s) in samples[start..end].iter().enumerate() {
                buffer[i] = Complex::new(s * hann[i], 0.0);
            }
            fft.process(&mut buffer);
            buffer[..bins].iter().map(|c| c.norm()).collect()
        })
        .collect();

    Spectrogram {
        frames,
        fft_size,
        hop,
        sample_rate,
    }
}

pub fn hann_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filters with area normalization.
pub struct MelFilterBank {
    filters: Vec<Vec<(usize, f32)>>,
}

impl MelFilterBank {
    pub fn new(n_mels: usize, fft_size: usize, sample_rate: u32) -> Self {
        let nyquist = sample_rate as f32 / 2.0;
        let bins = fft_size / 2 + 1;
        let mel_max = hz_to_mel(nyquist);
        let edges: Vec<f32> = (0..n_mels + 2)
            .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
            .collect();
        let bin_hz = sample_rate as f32 / fft_size as f32;

        let filters = (0..n_mels)
            .map(|m| {
                let (lo, center, hi) = (edges[m], edges[m + 1], edges[m + 2]);
                let norm = 2.0 / (hi - lo).max(f32::EPSILON);
                (0..bins)
                    .filter_map(|k| {
                        let f = k as f32 * bin_hz;
                        let weight = if f > lo && f <= center {
                            (f - lo) / (center - lo)
                        } else if f > center && f < hi {
                            (hi - f) / (hi - center)
                        } else {
                            0.0
                        };
                        (weight > 0.0).then_some((k, weight * norm))
                    })
                    .collect()
            })
            .collect();

        Self { filters }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Mel band energies for one power spectrum.
    pub fn apply(&self, power: &[f32]) -> Vec<f32> {
        self.filters
            .iter()
            .map(|filter| {
                filter
                    .iter()
                    .map(|&(k, w)| power.get(k).copied().unwrap_or(0.0) * w)
                    .sum()
            })
            .collect()
    }
}

/// Convert power to decibels in place, flooring at `top_db` below the
/// loudest value of the whole matrix.
pub fn power_to_db(rows: &mut [Vec<f32>], top_db: f32) {
    let mut peak = f32::NEG_INFINITY;
    for v in rows.iter_mut().flat_map(|r| r.iter_mut()) {
        *v = 10.0 * v.max(1e-10).log10();
        peak = peak.max(*v);
    }
    let floor = peak - top_db;
    for v in rows.iter_mut().flat_map(|r| r.iter_mut()) {
        *v = v.max(floor);
    }
}

/// Orthonormal DCT-II, keeping the first `n_out` coefficients.
pub fn dct_ii_ortho(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; n_out];
    }
    let scale0 = (1.0 / n as f32).sqrt();
    let scale = (2.0 / n as f32).sqrt();
    (0..n_out)
        .map(|k| {
            let sum: f32 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x * (std::f32::consts::PI * k as f32 * (i as f32 + 0.5) / n as f32).cos()
                })
                .sum();
            sum * if k == 0 { scale0 } else { scale }
        })
        .collect()
}

/// Fold a power spectrum into 12 pitch classes (C = 0), normalized so the
/// strongest class is 1. Silent frames give all zeros.
pub fn chroma(power: &[f32], sample_rate: u32, fft_size: usize) -> [f32; 12] {
    let mut out = [0.0f32; 12];
    let bin_hz = sample_rate as f32 / fft_size as f32;
    for (k, &p) in power.iter().enumerate().skip(1) {
        let f = k as f32 * bin_hz;
        if f < 27.5 {
            continue;
        }
        let midi = 69.0 + 12.0 * (f / 440.0).log2();
        let class = (midi.round() as i64).rem_euclid(12) as usize;
        out[class] += p;
    }
    let peak = out.iter().copied().fold(0.0f32, f32::max);
    if peak > 0.0 && peak.is_finite() {
        for c in out.iter_mut() {
            *c /= peak;
        }
    }
    out
}

/// Project a chroma vector onto the tonal centroid space.
pub fn tonnetz(chroma: &[f32; 12]) -> [f32; 6] {
    use std::f32::consts::PI;

    let total: f32 = chroma.iter().map(|c| c.abs()).sum();
    let mut out = [0.0f32; 6];
    if total <= 0.0 || !total.is_finite() {
        return out;
    }

    for (p, &c) in chroma.iter().enumerate() {
        let w = c / total;
        let p = p as f32;
        let fifths = 7.0 * PI / 6.0 * p;
        let minor = 3.0 * PI / 2.0 * p;
        let major = 2.0 * PI / 3.0 * p;
        out[0] += w * fifths.sin();
        out[1] += w * fifths.cos();
        out[2] += w * minor.sin();
        out[3] += w * minor.cos();
        out[4] += w * 0.5 * major.sin();
        out[5] += w * 0.5 * major.cos();
    }
    out
}

fn median(window: &mut [f32]) -> f32 {
    let mid = window.len() / 2;
    let (_, m, _) = window.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    *m
}

/// Median harmonic/percussive split over the first `max_bins` bins.
///
/// Returns the harmonic share of the masked energy, or `None` for silence.
pub fn harmonic_ratio(spec: &Spectrogram, kernel: usize, max_bins: usize) -> Option<f32> {
    let frames = spec.frames.len();
    let bins = spec.num_bins().min(max_bins);
    if frames == 0 || bins == 0 {
        return None;
    }
    let half = kernel / 2;

    // Horizontal (time) median per bin.
    let harmonic: Vec<Vec<f32>> = (0..bins)
        .into_par_iter()
        .map(|k| {
            let row: Vec<f32> = spec.frames.iter().map(|f| f[k]).collect();
            let mut window = Vec::with_capacity(kernel);
            (0..frames)
                .map(|t| {
                    window.clear();
                    window.extend_from_slice(&row[t.saturating_sub(half)..(t + half + 1).min(frames)]);
                    median(&mut window)
                })
                .collect()
        })
        .collect();

    // Vertical (frequency) median per frame, then mask energies. Summed
    // sequentially so the result does not depend on thread scheduling.
    let per_frame: Vec<(f64, f64)> = spec
        .frames
        .par_iter()
        .enumerate()
        .map(|(t, frame)| {
            let column = &frame[..bins];
            let mut window = Vec::with_capacity(kernel);
            let mut h_sum = 0.0f64;
            let mut p_sum = 0.0f64;
            for k in 0..bins {
                window.clear();
                window.extend_from_slice(&column[k.saturating_sub(half)..(k + half + 1).min(bins)]);
                let p = median(&mut window);
                let h = harmonic[k][t];
                let (h2, p2) = (h * h, p * p);
                let denom = h2 + p2;
                if denom <= 0.0 {
                    continue;
                }
                let s = column[k];
                let hs = s * h2 / denom;
                let ps = s * p2 / denom;
                h_sum += (hs * hs) as f64;
                p_sum += (ps * ps) as f64;
            }
            (h_sum, p_sum)
        })
        .collect();
    let (h_energy, p_energy) = per_frame
        .iter()
        .fold((0.0f64, 0.0f64), |acc, &(h, p)| (acc.0 + h, acc.1 + p));

    let total = h_energy + p_energy;
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some((h_energy / total) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, seconds: f32) -> Vec<f32> {
        (0..(sample_rate as f32 * seconds) as usize)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn frame_grid() {
        assert_eq!(frame_starts(100, 2048, 512), vec![0]);
        assert_eq!(frame_starts(2048 + 1024, 2048, 512), vec![0, 512, 1024]);
    }

    #[test]
    fn stft_peak_lands_on_tone_bin() {
        let spec = stft(&sine(1000.0, 16_000, 1.0), 16_000, 2048, 512);
        let frame = &spec.frames[2];
        assert_eq!(frame.len(), spec.num_bins());
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert!((spec.bin_hz(peak) - 1000.0).abs() < 16.0);
    }

    #[test]
    fn dct_of_constant_is_dc_only() {
        let out = dct_ii_ortho(&[1.0; 8], 4);
        assert!((out[0] - 8f32.sqrt()).abs() < 1e-5);
        assert!(out[1..].iter().all(|c| c.abs() < 1e-5));
    }

    #[test]
    fn power_to_db_applies_floor() {
        let mut rows = vec![vec![1.0, 1e-12], vec![0.01, 0.0]];
        power_to_db(&mut rows, 80.0);
        assert_eq!(rows[0][0], 0.0);
        assert!((rows[1][0] + 20.0).abs() < 1e-4);
        assert_eq!(rows[0][1], -80.0);
        assert_eq!(rows[1][1], -80.0);
    }

    #[test]
    fn chroma_of_a440_is_class_nine() {
        let spec = stft(&sine(440.0, 22_050, 1.0), 22_050, 2048, 512);
        let power: Vec<f32> = spec.frames[3].iter().map(|m| m * m).collect();
        let c = chroma(&power, 22_050, 2048);
        assert_eq!(c[9], 1.0);
        assert!(c.iter().enumerate().all(|(i, &v)| i == 9 || v < 1.0));
    }

    #[test]
    fn tonnetz_of_silence_is_zero() {
        assert_eq!(tonnetz(&[0.0; 12]), [0.0; 6]);
        let mut c = [0.0; 12];
        c[0] = 1.0;
        let t = tonnetz(&c);
        assert!((t[1] - 1.0).abs() < 1e-6);
        assert!((t[5] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn mel_bank_covers_energy() {
        let bank = MelFilterBank::new(128, 2048, 48_000);
        assert_eq!(bank.len(), 128);
        let bands = bank.apply(&vec![1.0; 1025]);
        assert!(bands.iter().all(|b| b.is_finite() && *b >= 0.0));
        assert!(bands.iter().any(|b| *b > 0.0));
    }

    #[test]
    fn steady_tone_is_mostly_harmonic() {
        let spec = stft(&sine(440.0, 16_000, 2.0), 16_000, 2048, 512);
        let ratio = harmonic_ratio(&spec, 17, 256).unwrap();
        assert!(ratio > 0.8, "ratio {}", ratio);
    }

    #[test]
    fn silence_has_no_harmonic_ratio() {
        let spec = stft(&vec![0.0; 8000], 16_000, 2048, 512);
        assert_eq!(harmonic_ratio(&spec, 17, 256), None);
    }
}
