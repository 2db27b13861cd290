//! Player manager: cached extraction and execution of player functions
//!
//! Every operation follows the same path: positive cache, negative cache,
//! raw script (fetched once per identity), extractor, sandbox. Extraction
//! failures are remembered per identity so a broken player costs one attempt
//! until [`PlayerManager::reset_all`] is called.

use super::potoken::{ClientVariant, PoTokenProvider};
use super::source::{HttpScriptSource, ScriptSource};
use super::stream::{cipher_url, finalize_stream_url, parse_cipher, FormatUrl};
use crate::error::PlayerError;
use crate::extract::{
    extract_signature_function, extract_signature_timestamp, extract_throttling_function,
    ExtractedFunction, PatternLibrary,
};
use crate::script::{SandboxLimits, ScriptSandbox, V8Sandbox};
use crate::utils::cache::{CacheStats, PlayerCache};
use crate::utils::url::{parse_n_param, replace_n_param};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builder for [`PlayerManager`]
#[derive(Default)]
pub struct PlayerManagerBuilder {
    source: Option<Arc<dyn ScriptSource>>,
    sandbox: Option<Arc<dyn ScriptSandbox>>,
    limits: SandboxLimits,
    patterns: Option<PatternLibrary>,
    max_cached_parameters: Option<u64>,
    po_token_provider: Option<Arc<dyn PoTokenProvider>>,
}

impl PlayerManagerBuilder {
    /// Set the script source; defaults to [`HttpScriptSource`]
    pub fn with_source(mut self, source: impl ScriptSource + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Set the sandbox; defaults to [`V8Sandbox`] with the configured limits
    pub fn with_sandbox(mut self, sandbox: impl ScriptSandbox + 'static) -> Self {
        self.sandbox = Some(Arc::new(sandbox));
        self
    }

    /// Set limits for the default sandbox
    pub fn with_limits(mut self, limits: SandboxLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the built-in pattern tables
    pub fn with_patterns(mut self, patterns: PatternLibrary) -> Self {
        self.patterns = Some(patterns);
        self
    }

    /// Bound the decrypted throttling parameter cache
    pub fn with_max_cached_parameters(mut self, max_cached_parameters: u64) -> Self {
        self.max_cached_parameters = Some(max_cached_parameters);
        self
    }

    /// Supply streaming tokens for finalized stream URLs
    pub fn with_po_token_provider(mut self, provider: impl PoTokenProvider + 'static) -> Self {
        self.po_token_provider = Some(Arc::new(provider));
        self
    }

    pub fn build(self) -> Result<PlayerManager, PlayerError> {
        let source: Arc<dyn ScriptSource> = match self.source {
            Some(source) => source,
            None => Arc::new(HttpScriptSource::new()?),
        };
        let sandbox: Arc<dyn ScriptSandbox> = match self.sandbox {
            Some(sandbox) => sandbox,
            None => Arc::new(V8Sandbox::with_limits(self.limits)),
        };
        let patterns = match self.patterns {
            Some(patterns) => patterns,
            None => PatternLibrary::new()?,
        };
        let cache = match self.max_cached_parameters {
            Some(capacity) => PlayerCache::new().with_max_cached_parameters(capacity),
            None => PlayerCache::new(),
        };

        Ok(PlayerManager {
            source,
            sandbox,
            patterns,
            cache,
            po_token_provider: self.po_token_provider,
        })
    }
}

/// Coordinates fetching, extraction, caching and execution
pub struct PlayerManager {
    source: Arc<dyn ScriptSource>,
    sandbox: Arc<dyn ScriptSandbox>,
    patterns: PatternLibrary,
    cache: PlayerCache,
    po_token_provider: Option<Arc<dyn PoTokenProvider>>,
}

impl PlayerManager {
    pub fn builder() -> PlayerManagerBuilder {
        PlayerManagerBuilder::default()
    }

    /// Create a manager over `source` with default sandbox and patterns
    pub fn new(source: impl ScriptSource + 'static) -> Result<Self, PlayerError> {
        Self::builder().with_source(source).build()
    }

    /// Signature timestamp of the player used for `identity`
    pub fn signature_timestamp(&self, identity: &str) -> Result<String, PlayerError> {
        self.cached_or_extract(
            identity,
            |cache| cache.timestamp(identity),
            |cache, timestamp| cache.insert_timestamp(identity, timestamp),
            |script| extract_signature_timestamp(script, &self.patterns),
        )
    }

    /// Validated signature function of the player used for `identity`
    pub fn signature_function(&self, identity: &str) -> Result<Arc<ExtractedFunction>, PlayerError> {
        self.cached_or_extract(
            identity,
            |cache| cache.signature_function(identity),
            |cache, function| cache.insert_signature_function(identity, function),
            |script| {
                extract_signature_function(script, &self.patterns, self.sandbox.as_ref())
                    .map(Arc::new)
            },
        )
    }

    /// Validated throttling function of the player used for `identity`
    pub fn throttling_function(&self, identity: &str) -> Result<Arc<ExtractedFunction>, PlayerError> {
        self.cached_or_extract(
            identity,
            |cache| cache.throttling_function(identity),
            |cache, function| cache.insert_throttling_function(identity, function),
            |script| {
                extract_throttling_function(script, &self.patterns, self.sandbox.as_ref())
                    .map(Arc::new)
            },
        )
    }

    /// Run the signature function on `obfuscated`
    pub fn deobfuscate_signature(
        &self,
        identity: &str,
        obfuscated: &str,
    ) -> Result<String, PlayerError> {
        let function = self.signature_function(identity)?;
        function.run(self.sandbox.as_ref(), obfuscated)
    }

    /// Replace the `n` value in `url` with its decrypted form
    ///
    /// URLs without an `n` parameter are returned as they are, without
    /// fetching or caching anything.
    pub fn decrypt_throttling_parameter(
        &self,
        url: &str,
        identity: &str,
    ) -> Result<String, PlayerError> {
        let Some(encrypted) = parse_n_param(url) else {
            return Ok(url.to_string());
        };

        if let Some(decrypted) = self.cache.throttling_parameter(encrypted) {
            debug!("Throttling parameter cache hit for {}", encrypted);
            return Ok(replace_n_param(url, &decrypted));
        }

        let function = self.throttling_function(identity)?;
        let decrypted = function.run(self.sandbox.as_ref(), encrypted)?;
        debug!("Decrypted throttling parameter {} -> {}", encrypted, decrypted);

        self.cache
            .insert_throttling_parameter(encrypted, decrypted.clone());
        Ok(replace_n_param(url, &decrypted))
    }

    /// Decrypt the `n` value, keeping the original URL if that fails
    pub fn try_decrypt_url(&self, url: &str, identity: &str) -> String {
        match self.decrypt_throttling_parameter(url, identity) {
            Ok(decrypted) => decrypted,
            Err(e) => {
                warn!("Using throttled URL for {}: {}", identity, e);
                url.to_string()
            }
        }
    }

    /// Stream URL for a `signatureCipher` value
    pub fn deobfuscate_cipher_url(&self, identity: &str, cipher: &str) -> Result<String, PlayerError> {
        let cipher = parse_cipher(cipher)?;
        let signature = self.deobfuscate_signature(identity, &cipher.signature)?;
        Ok(cipher_url(&cipher, &signature))
    }

    /// Streaming token for `variant`, if a provider hands out an unexpired one
    pub fn streaming_po_token(&self, variant: ClientVariant, identity: &str) -> Option<String> {
        let provider = self.po_token_provider.as_ref()?;
        match provider.po_token(variant, identity) {
            Some(token) => Some(token.streaming_data_po_token),
            None => {
                debug!("No streaming token for {} ({:?})", identity, variant);
                None
            }
        }
    }

    /// Playable URL for a stream format requested as `variant`
    ///
    /// Ciphered URLs must be deobfuscated; a failing `n` decryption falls
    /// back to the throttled URL.
    pub fn stream_url(
        &self,
        identity: &str,
        format: &FormatUrl,
        cpn: &str,
        variant: ClientVariant,
    ) -> Result<String, PlayerError> {
        let url = match format {
            FormatUrl::Direct(url) => url.clone(),
            FormatUrl::Cipher(cipher) => self.deobfuscate_cipher_url(identity, cipher)?,
        };
        let url = self.try_decrypt_url(&url, identity);
        let po_token = self.streaming_po_token(variant, identity);
        Ok(finalize_stream_url(&url, cpn, po_token.as_deref()))
    }

    /// Forget every cached script, result and failure
    pub fn reset_all(&self) {
        info!("Clearing all player caches");
        self.cache.clear_all();
    }

    /// Get cache statistics
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn cache(&self) -> &PlayerCache {
        &self.cache
    }

    fn cached_or_extract<T: Clone>(
        &self,
        identity: &str,
        lookup: impl Fn(&PlayerCache) -> Option<T>,
        store: impl Fn(&PlayerCache, T),
        extract: impl FnOnce(&str) -> Result<T, PlayerError>,
    ) -> Result<T, PlayerError> {
        if let Some(value) = lookup(&self.cache) {
            return Ok(value);
        }

        if let Some(cause) = self.cache.failure(identity) {
            debug!("Short-circuiting {} after earlier failure", identity);
            return Err(PlayerError::PreviousExtractionFailed {
                identity: identity.to_string(),
                source: cause,
            });
        }

        match self.raw_script(identity).and_then(|script| extract(&*script)) {
            Ok(value) => {
                store(&self.cache, value.clone());
                Ok(value)
            }
            Err(e) => {
                warn!("Extraction for {} failed: {}", identity, e);
                self.cache.insert_failure(identity, Arc::new(e.clone()));
                Err(e)
            }
        }
    }

    fn raw_script(&self, identity: &str) -> Result<Arc<str>, PlayerError> {
        if let Some(script) = self.cache.script(identity) {
            return Ok(script);
        }

        let script: Arc<str> = self
            .source
            .fetch_raw_script(identity)
            .map_err(|e| match e {
                PlayerError::SourceFetchError(_) => e,
                other => PlayerError::SourceFetchError(other.to_string()),
            })?
            .into();

        info!("Fetched player script for {} ({} bytes)", identity, script.len());
        self.cache.insert_script(identity, Arc::clone(&script));
        Ok(script)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::potoken::{PoTokenResult, StaticPoTokenProvider};
    use crate::player::source::StaticScriptSource;
    use std::time::{Duration, Instant};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PLAYER: &str = r#"var cfg={signatureTimestamp:19950};
var XY={ab:function(a){a.reverse()},cd:function(a,b){a.splice(0,b)}};
xyz=function(a){a=a.split("");XY.ab(a,1);return a.join("")};
c&&d.set(b,encodeURIComponent(xyz(decodeURIComponent(c))));
var SDa=[Wma];
Wma=function(a){var b={VVF2xyZLVRZZxHXZ:"iHywZkMipkszqA"};return b[a]||a.split("").reverse().join("")};
g.D&&(b="nn"[+a.D],WL(a),c=a.j[b]||null)&&(c=SDa[0](c),a.set(b,c))"#;

    /// Counts sandbox executions
    #[derive(Default)]
    struct CountingSandbox {
        inner: V8Sandbox,
        runs: Arc<AtomicUsize>,
    }

    impl ScriptSandbox for CountingSandbox {
        fn compile_or_fail(&self, code: &str) -> Result<(), PlayerError> {
            self.inner.compile_or_fail(code)
        }

        fn run(&self, code: &str, entry_point: &str, args: &[&str]) -> Result<String, PlayerError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.inner.run(code, entry_point, args)
        }
    }

    fn manager(script: &str) -> (PlayerManager, Arc<StaticScriptSource>) {
        let source = Arc::new(StaticScriptSource::new(script));
        let manager = PlayerManager::new(Arc::clone(&source)).unwrap();
        (manager, source)
    }

    #[test]
    fn test_signature_timestamp() {
        let (manager, source) = manager(PLAYER);

        assert_eq!(manager.signature_timestamp("vid").unwrap(), "19950");
        assert_eq!(manager.signature_timestamp("vid").unwrap(), "19950");
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_deobfuscate_signature() {
        let (manager, source) = manager(PLAYER);

        assert_eq!(manager.deobfuscate_signature("vid", "ABCD").unwrap(), "DCBA");
        assert_eq!(manager.deobfuscate_signature("vid", "xyz1").unwrap(), "1zyx");

        let url = manager
            .deobfuscate_cipher_url("vid", "s=ABCD&sp=sig&url=https%3A%2F%2Fhost%2Fvideoplayback")
            .unwrap();
        assert_eq!(url, "https://host/videoplayback&sig=DCBA");

        // Timestamp reuses the fetched script
        manager.signature_timestamp("vid").unwrap();
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(manager.cache_stats().signature_function_entries, 1);
    }

    #[test]
    fn test_decrypt_throttling_parameter() {
        let (manager, _) = manager(PLAYER);

        let url = manager
            .decrypt_throttling_parameter(
                "https://host/videoplayback?n=VVF2xyZLVRZZxHXZ&other=other",
                "vid",
            )
            .unwrap();
        assert_eq!(url, "https://host/videoplayback?n=iHywZkMipkszqA&other=other");
    }

    #[test]
    fn test_throttling_fast_path() {
        let (manager, source) = manager(PLAYER);
        let url = "https://host/videoplayback?itag=18&sn=abc";

        assert_eq!(manager.decrypt_throttling_parameter(url, "vid").unwrap(), url);
        assert_eq!(source.fetch_count(), 0);
        assert_eq!(manager.cache_stats(), CacheStats::default());
    }

    #[test]
    fn test_decrypted_parameters_are_cached() {
        let source = Arc::new(StaticScriptSource::new(PLAYER));
        let sandbox = CountingSandbox::default();
        let runs = Arc::clone(&sandbox.runs);
        let manager = PlayerManager::builder()
            .with_source(Arc::clone(&source))
            .with_sandbox(sandbox)
            .build()
            .unwrap();

        let url = "https://host/videoplayback?n=abc";
        assert_eq!(
            manager.decrypt_throttling_parameter(url, "vid").unwrap(),
            "https://host/videoplayback?n=cba"
        );
        assert_eq!(
            manager.decrypt_throttling_parameter(url, "other").unwrap(),
            "https://host/videoplayback?n=cba"
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(manager.cache().throttling_cache_size(), 1);
    }

    #[test]
    fn test_failure_short_circuits() {
        let (manager, source) = manager("var nothing=1;");

        let first = manager.signature_timestamp("vid").unwrap_err();
        assert!(matches!(first, PlayerError::PatternNotFound { .. }));

        let second = manager.signature_timestamp("vid").unwrap_err();
        assert!(matches!(second, PlayerError::PreviousExtractionFailed { .. }));
        assert!(matches!(
            second.root_cause(),
            PlayerError::PatternNotFound { .. }
        ));

        // The negative cache is shared by every operation on the identity
        let third = manager.deobfuscate_signature("vid", "ABCD").unwrap_err();
        assert!(matches!(third, PlayerError::PreviousExtractionFailed { .. }));
        assert_eq!(source.fetch_count(), 1);

        // Other identities are unaffected
        assert!(matches!(
            manager.signature_timestamp("other"),
            Err(PlayerError::PatternNotFound { .. })
        ));
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_source_failure() {
        let source = Arc::new(StaticScriptSource::empty());
        let manager = PlayerManager::new(Arc::clone(&source)).unwrap();

        let first = manager.signature_timestamp("vid").unwrap_err();
        assert!(first.is_retryable());

        let second = manager.signature_timestamp("vid").unwrap_err();
        assert!(second.root_cause().is_retryable());
        assert_eq!(source.fetch_count(), 1);
    }

    #[test]
    fn test_reset_refetches() {
        let (manager, source) = manager(PLAYER);

        manager.signature_timestamp("vid").unwrap();
        manager.reset_all();
        manager.signature_timestamp("vid").unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_reset_clears_failures() {
        let source = Arc::new(StaticScriptSource::empty());
        let manager = PlayerManager::new(Arc::clone(&source)).unwrap();

        assert!(manager.signature_timestamp("vid").is_err());
        manager.reset_all();
        assert!(matches!(
            manager.signature_timestamp("vid"),
            Err(PlayerError::SourceFetchError(_))
        ));
        assert_eq!(source.fetch_count(), 2);
    }

    #[test]
    fn test_try_decrypt_url_falls_back() {
        let (manager, _) = manager("var cfg={signatureTimestamp:1};");
        let url = "https://host/videoplayback?n=VVF2xyZLVRZZxHXZ&other=other";

        assert_eq!(manager.try_decrypt_url(url, "vid"), url);
    }

    #[test]
    fn test_stream_url() {
        let provider = StaticPoTokenProvider::new().with_token(
            ClientVariant::Web,
            PoTokenResult::new("player".to_string(), "tok".to_string()),
        );
        let manager = PlayerManager::builder()
            .with_source(StaticScriptSource::new(PLAYER))
            .with_po_token_provider(provider)
            .build()
            .unwrap();

        let direct = FormatUrl::Direct(
            "https://host/videoplayback?n=VVF2xyZLVRZZxHXZ&other=other".to_string(),
        );
        assert_eq!(
            manager
                .stream_url("vid", &direct, "cpn1", ClientVariant::Web)
                .unwrap(),
            "https://host/videoplayback?n=iHywZkMipkszqA&other=other&cpn=cpn1&pot=tok"
        );

        // No token configured for this variant
        let ciphered = FormatUrl::Cipher(
            "s=ABCD&sp=sig&url=https%3A%2F%2Fhost%2Fvideoplayback%3Fitag%3D18".to_string(),
        );
        assert_eq!(
            manager
                .stream_url("vid", &ciphered, "cpn2", ClientVariant::Android)
                .unwrap(),
            "https://host/videoplayback?itag=18&sig=DCBA&cpn=cpn2"
        );
    }

    #[test]
    fn test_stream_url_skips_expired_token() {
        let expired = PoTokenResult::new("player".to_string(), "old".to_string())
            .with_expiration(Instant::now() - Duration::from_secs(1));
        let manager = PlayerManager::builder()
            .with_source(StaticScriptSource::new(PLAYER))
            .with_po_token_provider(
                StaticPoTokenProvider::new().with_token(ClientVariant::Ios, expired),
            )
            .build()
            .unwrap();

        let direct = FormatUrl::Direct("https://host/videoplayback?itag=18".to_string());
        assert_eq!(
            manager
                .stream_url("vid", &direct, "cpn", ClientVariant::Ios)
                .unwrap(),
            "https://host/videoplayback?itag=18&cpn=cpn"
        );
        assert_eq!(manager.streaming_po_token(ClientVariant::Ios, "vid"), None);
    }

    #[test]
    fn test_streaming_po_token_without_provider() {
        let (manager, _) = manager(PLAYER);
        assert_eq!(manager.streaming_po_token(ClientVariant::Web, "vid"), None);
    }

    #[test]
    fn test_concurrent_requests_agree() {
        let (manager, _) = manager(PLAYER);

        let results: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| scope.spawn(|| manager.deobfuscate_signature("vid", "ABCD").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(results.iter().all(|result| result == "DCBA"));
    }
}
