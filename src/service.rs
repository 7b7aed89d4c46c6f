use serde::Serialize;
use std::sync::Arc;

use crate::audio::analysis::FeatureExtractor;
use crate::audio::decode::{CancelFlag, DecodePipeline, ExhaustionReason, StrategyFailure};
use crate::audio::features::Extraction;
use crate::audio::format::{AudioFormat, ClaimedType};
use crate::audio::standard_pipeline;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::scoring::insight::{insights, MusicInsights};
use crate::scoring::{
    composite_scores, key_mode, rank, AudioFeatures, Candidate, CompositeScore, KeyEstimate, RankedCandidate,
};
use crate::session::{AnalysisSession, AnalysisType, InputType, SessionId, SessionStore};

/// Everything derived from one upload.
#[derive(Clone, Debug, Serialize)]
pub struct TrackAnalysis {
    pub format: AudioFormat,
    pub extraction: Extraction,
    pub key: KeyEstimate,
    pub scores: CompositeScore,
    pub features: AudioFeatures,
    pub insights: MusicInsights,
    /// Decode strategy that produced the audio, if any.
    pub strategy: Option<&'static str>,
    pub failures: Vec<StrategyFailure>,
    pub exhaustion: Option<ExhaustionReason>,
}

/// Decode, extract and score. Never fails: undecodable input yields the
/// fallback descriptor with neutral scores.
pub struct Analyzer {
    pipeline: DecodePipeline,
    extractor: FeatureExtractor,
}

impl Analyzer {
    pub fn new(pipeline: DecodePipeline) -> Self {
        let extractor = FeatureExtractor::new(pipeline.settings().target_sample_rate);
        Self { pipeline, extractor }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(standard_pipeline(config.decode_settings(), config.transcoder()))
    }

    pub fn pipeline(&self) -> &DecodePipeline {
        &self.pipeline
    }

    pub fn extract(&self, bytes: impl Into<Arc<[u8]>>, claimed: &ClaimedType) -> Extraction {
        let outcome = self.pipeline.decode(bytes.into(), claimed);
        self.extractor.extract_outcome(&outcome)
    }

    pub fn analyze(&self, bytes: impl Into<Arc<[u8]>>, claimed: &ClaimedType) -> TrackAnalysis {
        self.analyze_with_cancel(bytes, claimed, CancelFlag::new())
    }

    pub fn analyze_with_cancel(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        claimed: &ClaimedType,
        cancel: CancelFlag,
    ) -> TrackAnalysis {
        let outcome = self.pipeline.decode_with_cancel(bytes.into(), claimed, cancel);
        let extraction = self.extractor.extract_outcome(&outcome);

        let (key, scores) = match extraction.measured() {
            Some(d) => (key_mode(d), composite_scores(Some(d))),
            None => (KeyEstimate::C_MAJOR, composite_scores(None)),
        };
        let descriptor = extraction.descriptor();
        let features = AudioFeatures::from_analysis(descriptor, &scores, &key);
        let insights = insights(descriptor, &scores);

        TrackAnalysis {
            format: outcome.format,
            key,
            scores,
            features,
            insights,
            strategy: outcome.strategy,
            exhaustion: outcome.result.err(),
            failures: outcome.failures,
            extraction,
        }
    }
}

/// Analyzer plus a session store: what the upload and recommendation
/// handlers talk to.
pub struct AnalysisService {
    analyzer: Analyzer,
    store: Arc<dyn SessionStore>,
}

impl AnalysisService {
    pub fn new(analyzer: Analyzer, store: Arc<dyn SessionStore>) -> Self {
        Self { analyzer, store }
    }

    pub fn analyzer(&self) -> &Analyzer {
        &self.analyzer
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Analyze an upload and keep the result under a fresh session id.
    pub fn analyze_upload(
        &self,
        bytes: impl Into<Arc<[u8]>>,
        claimed: &ClaimedType,
        analysis_type: AnalysisType,
        input_type: InputType,
    ) -> (AnalysisSession, TrackAnalysis) {
        let analysis = self.analyzer.analyze(bytes, claimed);
        let session = AnalysisSession {
            id: SessionId::new(),
            analysis_type,
            input_type,
            created_at: self.store.now(),
            descriptor: analysis.extraction.descriptor().clone(),
            fallback: analysis.extraction.is_fallback(),
            key: analysis.key,
            scores: analysis.scores,
            features: analysis.features.clone(),
        };
        log::info!(
            "Stored session {} ({}{})",
            session.id,
            analysis.format,
            if session.fallback { ", fallback" } else { "" }
        );
        self.store.put(session.clone());
        (session, analysis)
    }

    pub fn session(&self, id: &SessionId) -> Result<AnalysisSession> {
        self.store.get(id).ok_or(Error::SessionNotFound(*id))
    }

    /// Rank catalog candidates against a stored session's features.
    pub fn rank_for_session(&self, id: &SessionId, candidates: &[Candidate]) -> Result<Vec<RankedCandidate>> {
        let session = self.session(id)?;
        Ok(rank(&session.features.to_feature_map(), candidates))
    }
}
