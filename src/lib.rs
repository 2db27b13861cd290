//! # ryt-player - player script deobfuscation core
//!
//! Locates the signature and throttling functions inside an obfuscated
//! player script, validates them in a sandboxed JavaScript runtime and
//! executes them to recover usable stream URLs.
//!
//! ## Features
//!
//! - Ordered pattern tables with array indirection
//! - Brace-matching lexer with a regex fallback
//! - V8 sandbox with time and heap limits
//! - Positive and negative caches keyed by content identity
//! - Fast path for URLs without a throttling parameter
//!
//! ## Example
//!
//! ```rust,no_run
//! use ryt_player::player::{HttpScriptSource, PlayerManager};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = PlayerManager::new(HttpScriptSource::new()?)?;
//!
//!     let sts = manager.signature_timestamp("dQw4w9WgXcQ")?;
//!     let url = manager.decrypt_throttling_parameter(
//!         "https://rr1---sn.googlevideo.com/videoplayback?n=VVF2xyZLVRZZxHXZ",
//!         "dQw4w9WgXcQ",
//!     )?;
//!     println!("{} {}", sts, url);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod extract;
pub mod player;
pub mod script;
pub mod utils;

// Re-export main types
pub use error::PlayerError;
pub use extract::{ExtractedFunction, PatternLibrary};
pub use player::{PlayerManager, PlayerManagerBuilder, ScriptSource};
pub use script::{SandboxLimits, ScriptSandbox, V8Sandbox};
pub use utils::cache::{CacheStats, PlayerCache};

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;
