use thiserror::Error;

use crate::session::SessionId;

/// Errors surfaced to collaborators.
///
/// The decode/extract/score path never produces one of these; it falls back
/// to defaults instead. Only lookups and plumbing can fail.
#[derive(Debug, Error)]
pub enum Error {
    #[error("analysis session {0} not found")]
    SessionNotFound(SessionId),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
