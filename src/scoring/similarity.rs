use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Comparable catalog features and their weights.
pub const FEATURE_WEIGHTS: [(&str, f64); 8] = [
    ("danceability", 0.25),
    ("energy", 0.25),
    ("valence", 0.20),
    ("tempo", 0.15),
    ("acousticness", 0.05),
    ("instrumentalness", 0.05),
    ("speechiness", 0.03),
    ("liveness", 0.02),
];

/// Score when two maps share no comparable feature.
pub const NEUTRAL_SIMILARITY: f64 = 50.0;

const TEMPO_SPAN: f64 = 200.0;

/// Named numeric features of one track, as exchanged with collaborators.
/// Keys outside [`FEATURE_WEIGHTS`] are carried but ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap(pub BTreeMap<String, f64>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: f64) {
        self.0.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }
}

impl FromIterator<(String, f64)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub weight: f64,
    /// Per-feature similarity in [0, 1].
    pub similarity: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// 0 to 100.
    pub score: f64,
    pub contributions: Vec<FeatureContribution>,
}

fn feature_similarity(name: &str, target: f64, candidate: f64) -> f64 {
    let diff = (target - candidate).abs();
    let s = if name == "tempo" {
        1.0 - diff / TEMPO_SPAN
    } else {
        1.0 - diff
    };
    s.clamp(0.0, 1.0)
}

/// Weighted similarity over the features both maps carry (finite values only).
pub fn similarity(target: &FeatureMap, candidate: &FeatureMap) -> SimilarityResult {
    let mut contributions = Vec::new();
    let mut weighted = 0.0f64;
    let mut total_weight = 0.0f64;

    for (name, weight) in FEATURE_WEIGHTS {
        let (Some(t), Some(c)) = (target.get(name), candidate.get(name)) else {
            continue;
        };
        if !t.is_finite() || !c.is_finite() {
            continue;
        }
        let s = feature_similarity(name, t, c);
        weighted += weight * s;
        total_weight += weight;
        contributions.push(FeatureContribution {
            feature: name.to_string(),
            weight,
            similarity: s,
        });
    }

    let score = if total_weight > 0.0 {
        (weighted / total_weight * 100.0).clamp(0.0, 100.0)
    } else {
        NEUTRAL_SIMILARITY
    };

    SimilarityResult { score, contributions }
}

/// A catalog track offered for ranking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub features: FeatureMap,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub id: String,
    pub similarity: SimilarityResult,
}

/// Score every candidate against `target`, best first. Equal scores keep
/// their input order.
pub fn rank(target: &FeatureMap, candidates: &[Candidate]) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = candidates
        .iter()
        .map(|c| RankedCandidate {
            id: c.id.clone(),
            similarity: similarity(target, &c.features),
        })
        .collect();
    ranked.sort_by(|a, b| b.similarity.score.total_cmp(&a.similarity.score));
    ranked
}
