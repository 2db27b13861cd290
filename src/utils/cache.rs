//! Caching utilities for player artifacts

use crate::error::PlayerError;
use crate::extract::ExtractedFunction;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Build an unbounded cache; entries live until explicitly cleared
fn unbounded<V>() -> Cache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder().build()
}

/// Every cache tier used by the player manager
#[derive(Clone)]
pub struct PlayerCache {
    /// Raw player scripts by identity
    scripts: Cache<String, Arc<str>>,
    /// Signature timestamps by identity
    timestamps: Cache<String, String>,
    /// Validated signature functions by identity
    signature_functions: Cache<String, Arc<ExtractedFunction>>,
    /// Validated throttling functions by identity
    throttling_functions: Cache<String, Arc<ExtractedFunction>>,
    /// Decrypted throttling parameters by encrypted value
    throttling_parameters: Cache<String, String>,
    /// Last extraction failure by identity
    failures: Cache<String, Arc<PlayerError>>,
}

impl PlayerCache {
    /// Create caches with no capacity bound
    pub fn new() -> Self {
        Self {
            scripts: unbounded(),
            timestamps: unbounded(),
            signature_functions: unbounded(),
            throttling_functions: unbounded(),
            throttling_parameters: unbounded(),
            failures: unbounded(),
        }
    }

    /// Bound the decrypted parameter cache to `max_capacity` entries
    pub fn with_max_cached_parameters(mut self, max_capacity: u64) -> Self {
        self.throttling_parameters = Cache::builder().max_capacity(max_capacity).build();
        self
    }

    pub fn script(&self, identity: &str) -> Option<Arc<str>> {
        self.scripts.get(identity)
    }

    pub fn insert_script(&self, identity: &str, script: Arc<str>) {
        self.scripts.insert(identity.to_string(), script);
    }

    pub fn timestamp(&self, identity: &str) -> Option<String> {
        self.timestamps.get(identity)
    }

    pub fn insert_timestamp(&self, identity: &str, timestamp: String) {
        self.timestamps.insert(identity.to_string(), timestamp);
    }

    pub fn signature_function(&self, identity: &str) -> Option<Arc<ExtractedFunction>> {
        self.signature_functions.get(identity)
    }

    pub fn insert_signature_function(&self, identity: &str, function: Arc<ExtractedFunction>) {
        self.signature_functions
            .insert(identity.to_string(), function);
    }

    pub fn throttling_function(&self, identity: &str) -> Option<Arc<ExtractedFunction>> {
        self.throttling_functions.get(identity)
    }

    pub fn insert_throttling_function(&self, identity: &str, function: Arc<ExtractedFunction>) {
        self.throttling_functions
            .insert(identity.to_string(), function);
    }

    /// Decrypted value for an encrypted throttling parameter
    pub fn throttling_parameter(&self, encrypted: &str) -> Option<String> {
        self.throttling_parameters.get(encrypted)
    }

    pub fn insert_throttling_parameter(&self, encrypted: &str, decrypted: String) {
        self.throttling_parameters
            .insert(encrypted.to_string(), decrypted);
    }

    /// Recorded extraction failure for an identity
    pub fn failure(&self, identity: &str) -> Option<Arc<PlayerError>> {
        self.failures.get(identity)
    }

    pub fn insert_failure(&self, identity: &str, error: Arc<PlayerError>) {
        self.failures.insert(identity.to_string(), error);
    }

    /// Empty every tier, including raw scripts
    ///
    /// Tiers are invalidated one after another. A concurrent reader may see
    /// some tiers already empty while others still hold entries.
    pub fn clear_all(&self) {
        self.scripts.invalidate_all();
        self.timestamps.invalidate_all();
        self.signature_functions.invalidate_all();
        self.throttling_functions.invalidate_all();
        self.throttling_parameters.invalidate_all();
        self.failures.invalidate_all();
    }

    /// Number of decrypted throttling parameters held
    pub fn throttling_cache_size(&self) -> u64 {
        self.throttling_parameters.run_pending_tasks();
        self.throttling_parameters.entry_count()
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.scripts.run_pending_tasks();
        self.timestamps.run_pending_tasks();
        self.signature_functions.run_pending_tasks();
        self.throttling_functions.run_pending_tasks();
        self.throttling_parameters.run_pending_tasks();
        self.failures.run_pending_tasks();

        CacheStats {
            script_entries: self.scripts.entry_count(),
            timestamp_entries: self.timestamps.entry_count(),
            signature_function_entries: self.signature_functions.entry_count(),
            throttling_function_entries: self.throttling_functions.entry_count(),
            throttling_parameter_entries: self.throttling_parameters.entry_count(),
            failure_entries: self.failures.entry_count(),
        }
    }
}

impl Default for PlayerCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub script_entries: u64,
    pub timestamp_entries: u64,
    pub signature_function_entries: u64,
    pub throttling_function_entries: u64,
    pub throttling_parameter_entries: u64,
    pub failure_entries: u64,
}
