pub mod audio;
pub mod config;
pub mod error;
pub mod scoring;
pub mod service;
pub mod session;
pub mod transcode;

pub use error::{Error, Result};
pub use service::{AnalysisService, Analyzer, TrackAnalysis};
