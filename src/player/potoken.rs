//! Proof-of-origin tokens supplied by an external provider
//!
//! Tokens are opaque. They are only appended to stream URLs when a provider
//! hands one out for the client variant in use.

use std::collections::HashMap;
use std::time::Instant;

/// Client variant a token is requested for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientVariant {
    Web,
    Android,
    Ios,
}

impl ClientVariant {
    /// Get all client variants
    pub fn all() -> [ClientVariant; 3] {
        [ClientVariant::Web, ClientVariant::Android, ClientVariant::Ios]
    }
}

/// Tokens for one player request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoTokenResult {
    /// Token sent with the player request
    pub player_request_po_token: String,
    /// Token appended to streaming URLs as `pot`
    pub streaming_data_po_token: String,
    /// Expiration time
    pub expires_at: Option<Instant>,
}

impl PoTokenResult {
    /// Create a token pair without expiration
    pub fn new(player_request_po_token: String, streaming_data_po_token: String) -> Self {
        Self {
            player_request_po_token,
            streaming_data_po_token,
            expires_at: None,
        }
    }

    /// Set expiration time
    pub fn with_expiration(mut self, expires_at: Instant) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Check if result is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map_or(false, |expires_at| expires_at <= Instant::now())
    }
}

/// Token provider trait
pub trait PoTokenProvider: Send + Sync {
    fn web_client_po_token(&self, video_id: &str) -> Option<PoTokenResult>;

    fn android_client_po_token(&self, video_id: &str) -> Option<PoTokenResult>;

    fn ios_client_po_token(&self, video_id: &str) -> Option<PoTokenResult>;

    /// Token for `variant`, skipping expired ones
    fn po_token(&self, variant: ClientVariant, video_id: &str) -> Option<PoTokenResult> {
        let result = match variant {
            ClientVariant::Web => self.web_client_po_token(video_id),
            ClientVariant::Android => self.android_client_po_token(video_id),
            ClientVariant::Ios => self.ios_client_po_token(video_id),
        };
        result.filter(|token| !token.is_expired())
    }
}

/// Fixed tokens per client variant
#[derive(Debug, Clone, Default)]
pub struct StaticPoTokenProvider {
    tokens: HashMap<ClientVariant, PoTokenResult>,
}

impl StaticPoTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out `token` for `variant`
    pub fn with_token(mut self, variant: ClientVariant, token: PoTokenResult) -> Self {
        self.tokens.insert(variant, token);
        self
    }
}

impl PoTokenProvider for StaticPoTokenProvider {
    fn web_client_po_token(&self, _video_id: &str) -> Option<PoTokenResult> {
        self.tokens.get(&ClientVariant::Web).cloned()
    }

    fn android_client_po_token(&self, _video_id: &str) -> Option<PoTokenResult> {
        self.tokens.get(&ClientVariant::Android).cloned()
    }

    fn ios_client_po_token(&self, _video_id: &str) -> Option<PoTokenResult> {
        self.tokens.get(&ClientVariant::Ios).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_static_provider_per_variant() {
        let provider = StaticPoTokenProvider::new().with_token(
            ClientVariant::Web,
            PoTokenResult::new("player".to_string(), "stream".to_string()),
        );

        let web = provider.po_token(ClientVariant::Web, "vid").unwrap();
        assert_eq!(web.streaming_data_po_token, "stream");
        assert!(provider.po_token(ClientVariant::Android, "vid").is_none());
        assert!(provider.po_token(ClientVariant::Ios, "vid").is_none());
    }

    #[test]
    fn test_expired_tokens_are_skipped() {
        let expired = PoTokenResult::new("p".to_string(), "s".to_string())
            .with_expiration(Instant::now() - Duration::from_secs(1));
        assert!(expired.is_expired());

        let provider = StaticPoTokenProvider::new().with_token(ClientVariant::Ios, expired);
        assert!(provider.po_token(ClientVariant::Ios, "vid").is_none());
    }

    #[test]
    fn test_all_variants() {
        assert_eq!(ClientVariant::all().len(), 3);
    }
}
