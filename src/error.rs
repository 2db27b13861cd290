//! Error types for ryt-player

use std::sync::Arc;
use thiserror::Error;

/// Main error type for player script operations
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("No known pattern matched the player script ({kind})")]
    PatternNotFound { kind: &'static str },

    #[error("Function array index {index} is invalid for `{array}` ({len} entries)")]
    IndirectionOutOfBounds {
        array: String,
        index: String,
        len: usize,
    },

    #[error("Extracted script does not compile: {0}")]
    CompileError(String),

    #[error("Script execution failed: {0}")]
    RuntimeError(String),

    #[error("Could not fetch player script: {0}")]
    SourceFetchError(String),

    #[error("Previous extraction for `{identity}` failed")]
    PreviousExtractionFailed {
        identity: String,
        #[source]
        source: Arc<PlayerError>,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),
}

// Failures are stored in the negative cache and handed out again, so the
// error has to be duplicable. `io::Error` is the only non-`Clone` payload.
impl Clone for PlayerError {
    fn clone(&self) -> Self {
        match self {
            PlayerError::PatternNotFound { kind } => PlayerError::PatternNotFound { kind: *kind },
            PlayerError::IndirectionOutOfBounds { array, index, len } => {
                PlayerError::IndirectionOutOfBounds {
                    array: array.clone(),
                    index: index.clone(),
                    len: *len,
                }
            }
            PlayerError::CompileError(msg) => PlayerError::CompileError(msg.clone()),
            PlayerError::RuntimeError(msg) => PlayerError::RuntimeError(msg.clone()),
            PlayerError::SourceFetchError(msg) => PlayerError::SourceFetchError(msg.clone()),
            PlayerError::PreviousExtractionFailed { identity, source } => {
                PlayerError::PreviousExtractionFailed {
                    identity: identity.clone(),
                    source: Arc::clone(source),
                }
            }
            PlayerError::InvalidUrl(msg) => PlayerError::InvalidUrl(msg.clone()),
            PlayerError::RegexError(err) => PlayerError::RegexError(err.clone()),
            PlayerError::IoError(err) => {
                PlayerError::IoError(std::io::Error::new(err.kind(), err.to_string()))
            }
            PlayerError::UrlError(err) => PlayerError::UrlError(*err),
        }
    }
}

impl PlayerError {
    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlayerError::SourceFetchError(_))
    }

    /// Check if error comes from locating or validating a player function
    pub fn is_extraction_error(&self) -> bool {
        match self {
            PlayerError::PatternNotFound { .. }
            | PlayerError::IndirectionOutOfBounds { .. }
            | PlayerError::CompileError(_) => true,
            PlayerError::PreviousExtractionFailed { source, .. } => source.is_extraction_error(),
            _ => false,
        }
    }

    /// Innermost cause, looking through negative-cache wrappers
    pub fn root_cause(&self) -> &PlayerError {
        match self {
            PlayerError::PreviousExtractionFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
