use serde::{Deserialize, Serialize};

use super::key::KeyEstimate;
use super::mood::CompositeScore;
use super::similarity::FeatureMap;
use crate::audio::features::DescriptorVector;

// Attributes the signal statistics cannot estimate; reported at fixed values.
const ACOUSTICNESS: f32 = 0.5;
const INSTRUMENTALNESS: f32 = 0.5;
const SPEECHINESS: f32 = 0.1;
const LIVENESS: f32 = 0.1;
const TIME_SIGNATURE: u8 = 4;

/// Catalog-shaped feature record, comparable with provider track features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub danceability: f32,
    pub energy: f32,
    pub valence: f32,
    pub tempo: f32,
    pub key: u8,
    pub mode: u8,
    pub loudness: f32,
    pub acousticness: f32,
    pub instrumentalness: f32,
    pub speechiness: f32,
    pub liveness: f32,
    pub duration_ms: u64,
    pub time_signature: u8,
}

impl AudioFeatures {
    pub fn from_analysis(descriptor: &DescriptorVector, scores: &CompositeScore, key: &KeyEstimate) -> Self {
        Self {
            danceability: scores.danceability,
            energy: scores.energy,
            valence: scores.valence,
            tempo: descriptor.tempo,
            key: key.key,
            mode: key.mode,
            loudness: descriptor.rms_mean * 100.0,
            acousticness: ACOUSTICNESS,
            instrumentalness: INSTRUMENTALNESS,
            speechiness: SPEECHINESS,
            liveness: LIVENESS,
            duration_ms: (descriptor.duration.max(0.0) * 1000.0) as u64,
            time_signature: TIME_SIGNATURE,
        }
    }

    pub fn to_feature_map(&self) -> FeatureMap {
        FeatureMap::new()
            .with("danceability", self.danceability as f64)
            .with("energy", self.energy as f64)
            .with("valence", self.valence as f64)
            .with("tempo", self.tempo as f64)
            .with("key", self.key as f64)
            .with("mode", self.mode as f64)
            .with("loudness", self.loudness as f64)
            .with("acousticness", self.acousticness as f64)
            .with("instrumentalness", self.instrumentalness as f64)
            .with("speechiness", self.speechiness as f64)
            .with("liveness", self.liveness as f64)
            .with("duration_ms", self.duration_ms as f64)
            .with("time_signature", self.time_signature as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::similarity::similarity;

    #[test]
    fn fallback_record() {
        let features = AudioFeatures::from_analysis(
            &DescriptorVector::fallback(),
            &CompositeScore::NEUTRAL,
            &KeyEstimate::C_MAJOR,
        );
        assert_eq!(features.duration_ms, 30_000);
        assert!((features.loudness - 15.0).abs() < 1e-4);
        assert_eq!(features.time_signature, 4);
        assert_eq!(features.danceability, 0.5);
    }

    #[test]
    fn feature_map_self_similarity() {
        let map = AudioFeatures::from_analysis(
            &DescriptorVector::fallback(),
            &CompositeScore::NEUTRAL,
            &KeyEstimate::C_MAJOR,
        )
        .to_feature_map();
        assert_eq!(map.get("tempo"), Some(120.0));
        assert_eq!(similarity(&map, &map).score, 100.0);
        assert_eq!(similarity(&map, &map).contributions.len(), 8);
    }
}
