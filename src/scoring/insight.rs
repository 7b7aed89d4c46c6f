use serde::{Deserialize, Serialize};

use super::mood::CompositeScore;
use crate::audio::features::DescriptorVector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoCategory {
    Slow,
    Medium,
    Fast,
    VeryFast,
}

impl TempoCategory {
    pub fn from_bpm(bpm: f32) -> Self {
        if bpm < 80.0 {
            TempoCategory::Slow
        } else if bpm < 120.0 {
            TempoCategory::Medium
        } else if bpm < 160.0 {
            TempoCategory::Fast
        } else {
            TempoCategory::VeryFast
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low,
    Medium,
    High,
}

impl EnergyLevel {
    pub fn from_score(energy: f32) -> Self {
        if energy < 0.3 {
            EnergyLevel::Low
        } else if energy < 0.7 {
            EnergyLevel::Medium
        } else {
            EnergyLevel::High
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanceabilityLevel {
    Low,
    Moderate,
    High,
}

impl DanceabilityLevel {
    pub fn from_score(danceability: f32) -> Self {
        if danceability < 0.3 {
            DanceabilityLevel::Low
        } else if danceability < 0.7 {
            DanceabilityLevel::Moderate
        } else {
            DanceabilityLevel::High
        }
    }
}

/// Human-facing summary of one analysis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MusicInsights {
    pub tempo_category: TempoCategory,
    pub energy_level: EnergyLevel,
    pub danceability_level: DanceabilityLevel,
    /// 0 to 1.
    pub complexity: f32,
    pub mood: String,
}

fn variance(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f32;
    let mean = values.iter().sum::<f32>() / n;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n
}

/// Spread of the timbre and pitch profiles plus onset density, capped at 1.
pub fn complexity(descriptor: &DescriptorVector) -> f32 {
    let raw = (variance(&descriptor.mfcc)
        + variance(&descriptor.chroma)
        + descriptor.onset_count as f32 / 100.0)
        / 3.0;
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

pub fn mood_description(scores: &CompositeScore, tempo: f32) -> &'static str {
    let (valence, energy) = (scores.valence, scores.energy);
    if valence > 0.7 && energy > 0.6 {
        "bright and energetic"
    } else if valence > 0.7 && energy < 0.4 {
        "calm and positive"
    } else if valence < 0.3 && energy > 0.6 {
        "intense and dark"
    } else if valence < 0.3 && energy < 0.4 {
        "subdued and melancholic"
    } else if tempo > 140.0 {
        "fast and dynamic"
    } else if tempo < 80.0 {
        "slow and relaxed"
    } else {
        "balanced, mid-tempo"
    }
}

pub fn insights(descriptor: &DescriptorVector, scores: &CompositeScore) -> MusicInsights {
    MusicInsights {
        tempo_category: TempoCategory::from_bpm(descriptor.tempo),
        energy_level: EnergyLevel::from_score(scores.energy),
        danceability_level: DanceabilityLevel::from_score(scores.danceability),
        complexity: complexity(descriptor),
        mood: mood_description(scores, descriptor.tempo).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_boundaries() {
        assert_eq!(TempoCategory::from_bpm(79.9), TempoCategory::Slow);
        assert_eq!(TempoCategory::from_bpm(80.0), TempoCategory::Medium);
        assert_eq!(TempoCategory::from_bpm(120.0), TempoCategory::Fast);
        assert_eq!(TempoCategory::from_bpm(160.0), TempoCategory::VeryFast);
        assert_eq!(EnergyLevel::from_score(0.7), EnergyLevel::High);
        assert_eq!(DanceabilityLevel::from_score(0.3), DanceabilityLevel::Moderate);
    }

    #[test]
    fn mood_rules_in_order() {
        let s = |valence, energy| CompositeScore { danceability: 0.5, energy, valence };
        assert_eq!(mood_description(&s(0.8, 0.9), 100.0), "bright and energetic");
        assert_eq!(mood_description(&s(0.8, 0.2), 100.0), "calm and positive");
        assert_eq!(mood_description(&s(0.1, 0.9), 100.0), "intense and dark");
        assert_eq!(mood_description(&s(0.1, 0.1), 100.0), "subdued and melancholic");
        assert_eq!(mood_description(&s(0.5, 0.5), 150.0), "fast and dynamic");
        assert_eq!(mood_description(&s(0.5, 0.5), 60.0), "slow and relaxed");
        assert_eq!(mood_description(&s(0.5, 0.5), 120.0), "balanced, mid-tempo");
    }

    #[test]
    fn complexity_of_fallback() {
        let d = DescriptorVector::fallback();
        // onsets dominate: 24 / 100 / 3
        let c = complexity(&d);
        assert!(c > 0.08 && c < 0.09, "complexity {}", c);

        let mut busy = d.clone();
        busy.onset_count = 10_000;
        assert_eq!(complexity(&busy), 1.0);
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_value(TempoCategory::VeryFast).unwrap();
        assert_eq!(json, "very_fast");
    }
}
