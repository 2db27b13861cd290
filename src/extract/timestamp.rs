//! Signature timestamp extraction

use super::patterns::{PatternLibrary, PatternMatch};
use crate::error::PlayerError;

/// Integer the player expects in playback requests, as text
pub fn extract_signature_timestamp(
    script: &str,
    patterns: &PatternLibrary,
) -> Result<String, PlayerError> {
    match patterns.timestamp.find_first(script)? {
        (_, PatternMatch::Value(timestamp)) => Ok(timestamp),
        (_, PatternMatch::Indexed { .. }) => Err(PlayerError::PatternNotFound {
            kind: patterns.timestamp.kind(),
        }),
    }
}
