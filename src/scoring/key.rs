use serde::{Deserialize, Serialize};

use crate::audio::features::DescriptorVector;

/// Binary scale templates rooted on C.
const MAJOR_PROFILE: [f32; 12] = [1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
// Harmonic minor; the natural minor template is a rotation of the major one.
const MINOR_PROFILE: [f32; 12] = [1.0, 0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0];

const PITCH_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEstimate {
    /// Pitch class of the tonic, C = 0.
    pub key: u8,
    /// 1 = major, 0 = minor.
    pub mode: u8,
}

impl KeyEstimate {
    pub const C_MAJOR: KeyEstimate = KeyEstimate { key: 0, mode: 1 };

    pub fn is_major(&self) -> bool {
        self.mode == 1
    }

    /// e.g. "A minor"
    pub fn name(&self) -> String {
        let tonic = PITCH_NAMES[(self.key % 12) as usize];
        format!("{} {}", tonic, if self.is_major() { "major" } else { "minor" })
    }
}

fn rotate(profile: &[f32; 12], shift: usize) -> [f32; 12] {
    let mut out = [0.0f32; 12];
    for (j, o) in out.iter_mut().enumerate() {
        *o = profile[(j + 12 - shift) % 12];
    }
    out
}

fn cosine(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Best key for a chroma vector. Ties go to major, then to the lower tonic.
pub fn estimate_key(chroma: &[f32; 12]) -> KeyEstimate {
    if chroma.iter().any(|c| !c.is_finite()) || chroma.iter().all(|&c| c == 0.0) {
        return KeyEstimate::C_MAJOR;
    }

    let mut best = KeyEstimate::C_MAJOR;
    let mut best_score = f32::NEG_INFINITY;
    for (mode, profile) in [(1u8, &MAJOR_PROFILE), (0u8, &MINOR_PROFILE)] {
        for shift in 0..12 {
            let score = cosine(chroma, &rotate(profile, shift));
            if score > best_score {
                best_score = score;
                best = KeyEstimate { key: shift as u8, mode };
            }
        }
    }
    best
}

pub fn key_mode(descriptor: &DescriptorVector) -> KeyEstimate {
    estimate_key(&descriptor.chroma)
}
