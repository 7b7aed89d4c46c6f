use serde::{Deserialize, Serialize};

use super::key::estimate_key;
use crate::audio::features::DescriptorVector;

/// Closed-form mood scores, each in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub danceability: f32,
    pub energy: f32,
    pub valence: f32,
}

impl CompositeScore {
    pub const NEUTRAL: CompositeScore = CompositeScore {
        danceability: 0.5,
        energy: 0.5,
        valence: 0.5,
    };
}

/// Clamp to [0, 1]; anything non-finite counts as 0.
fn sat(x: f32) -> f32 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Danceability, energy and valence for a measured descriptor. `None`
/// (no decodable audio) scores neutral.
pub fn composite_scores(descriptor: Option<&DescriptorVector>) -> CompositeScore {
    let Some(d) = descriptor else {
        return CompositeScore::NEUTRAL;
    };

    let danceability = 0.4 * sat(d.tempo / 140.0)
        + 0.3 * sat(d.onset_strength_mean / 2.0)
        + 0.2 * sat(d.spectral_centroid / 4000.0)
        + 0.1 * sat(d.zero_crossing_rate * 20.0);

    let energy = 0.4 * sat(d.rms_mean * 5.0)
        + 0.3 * sat(d.spectral_centroid / 3000.0)
        + 0.2 * sat(d.spectral_rolloff / 6000.0)
        + 0.1 * sat(d.zero_crossing_rate * 15.0);

    let mode = estimate_key(&d.chroma).mode as f32;
    let valence = 0.4 * mode + 0.3 * sat(d.tempo / 120.0) + 0.3 * sat(d.harmonic_ratio);

    CompositeScore {
        danceability: sat(danceability),
        energy: sat(energy),
        valence: sat(valence),
    }
}
