//! Player script retrieval and the manager that drives extraction

pub mod manager;
pub mod potoken;
pub mod source;
pub mod stream;

pub use manager::{PlayerManager, PlayerManagerBuilder};
pub use potoken::{ClientVariant, PoTokenProvider, PoTokenResult, StaticPoTokenProvider};
pub use source::{
    FileScriptSource, HttpScriptSource, HttpSourceConfig, ScriptSource, StaticScriptSource,
    DEFAULT_USER_AGENT,
};
pub use stream::{
    cipher_url, finalize_stream_url, generate_content_playback_nonce, parse_cipher, FormatUrl,
    SignatureCipher,
};
