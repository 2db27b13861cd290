//! URL utilities for video identities and the throttling parameter

use crate::error::PlayerError;
use url::Url;

/// Extract video ID from various video platform URL formats
pub fn extract_video_id(url: &str) -> Result<String, PlayerError> {
    let parsed = Url::parse(url)?;

    match parsed.host_str() {
        Some("youtu.be") => {
            let path = parsed.path().trim_start_matches('/');
            if path.is_empty() {
                return Err(PlayerError::InvalidUrl("Missing video ID".to_string()));
            }
            Ok(path.to_string())
        }
        Some("youtube.com") | Some("www.youtube.com") | Some("m.youtube.com") => {
            let path = parsed.path();
            if path.starts_with("/watch") {
                parsed
                    .query_pairs()
                    .find(|(key, _)| key == "v")
                    .map(|(_, value)| value.to_string())
                    .ok_or_else(|| PlayerError::InvalidUrl("Missing v parameter".to_string()))
            } else if let Some(video_id) = path
                .strip_prefix("/shorts/")
                .or_else(|| path.strip_prefix("/embed/"))
            {
                if video_id.is_empty() {
                    return Err(PlayerError::InvalidUrl(
                        "Missing video ID in path".to_string(),
                    ));
                }
                Ok(video_id.to_string())
            } else {
                Err(PlayerError::InvalidUrl(
                    "Unsupported video URL format".to_string(),
                ))
            }
        }
        _ => Err(PlayerError::InvalidUrl(
            "Not a supported video platform URL".to_string(),
        )),
    }
}

/// Check if URL is a supported video platform URL
pub fn is_video_url(url: &str) -> bool {
    if let Ok(parsed) = Url::parse(url) {
        matches!(
            parsed.host_str(),
            Some("youtube.com") | Some("www.youtube.com") | Some("m.youtube.com") | Some("youtu.be")
        )
    } else {
        false
    }
}

/// Content identity for a video URL or a bare identifier
pub fn identity_from_input(input: &str) -> Result<String, PlayerError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PlayerError::InvalidUrl("Empty video identifier".to_string()));
    }
    if is_video_url(input) {
        return extract_video_id(input);
    }
    Ok(input.to_string())
}

/// Byte range of the first non-empty `n` query value
fn n_param_span(url: &str) -> Option<(usize, usize)> {
    let bytes = url.as_bytes();
    let mut from = 0;
    while let Some(offset) = url[from..].find("n=") {
        let start = from + offset;
        let value_start = start + 2;
        if start > 0 && matches!(bytes[start - 1], b'?' | b'&') {
            let value_end = url[value_start..]
                .find('&')
                .map_or(url.len(), |end| value_start + end);
            if value_end > value_start {
                return Some((value_start, value_end));
            }
        }
        from = value_start;
    }
    None
}

/// Check if URL carries a throttling parameter
pub fn contains_n_param(url: &str) -> bool {
    n_param_span(url).is_some()
}

/// Raw value of the throttling parameter
pub fn parse_n_param(url: &str) -> Option<&str> {
    n_param_span(url).map(|(start, end)| &url[start..end])
}

/// Swap the throttling parameter value, leaving the rest of the URL untouched
pub fn replace_n_param(url: &str, value: &str) -> String {
    match n_param_span(url) {
        Some((start, end)) => format!("{}{}{}", &url[..start], value, &url[end..]),
        None => url.to_string(),
    }
}
