//! Script sources: where raw player scripts come from

use crate::error::PlayerError;
use regex::Regex;
use reqwest::blocking::{Client, ClientBuilder};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Desktop browser user agent used for page and script requests
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Supplies the raw player script relevant to a content identity
pub trait ScriptSource: Send + Sync {
    fn fetch_raw_script(&self, identity: &str) -> Result<String, PlayerError>;
}

impl<T: ScriptSource + ?Sized> ScriptSource for Arc<T> {
    fn fetch_raw_script(&self, identity: &str) -> Result<String, PlayerError> {
        (**self).fetch_raw_script(identity)
    }
}

/// HTTP source configuration
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: Option<String>,
    /// Site root that embed pages are resolved against
    pub base_url: String,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            base_url: "https://www.youtube.com/".to_string(),
        }
    }
}

/// Fetches the embed page for an identity, then the player script it references
pub struct HttpScriptSource {
    client: Client,
    config: HttpSourceConfig,
}

impl HttpScriptSource {
    /// Create a source with default configuration
    pub fn new() -> Result<Self, PlayerError> {
        Self::with_config(HttpSourceConfig::default())
    }

    /// Create a source with custom configuration
    pub fn with_config(config: HttpSourceConfig) -> Result<Self, PlayerError> {
        let user_agent = config.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .user_agent(user_agent)
            .build()
            .map_err(fetch_error)?;

        Ok(Self { client, config })
    }

    /// Embed page URL for an identity
    pub fn page_url(&self, identity: &str) -> Result<Url, PlayerError> {
        let mut url = Url::parse(&self.config.base_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                PlayerError::InvalidUrl(format!("{} cannot be a base URL", self.config.base_url))
            })?
            .pop_if_empty()
            .push("embed")
            .push(identity);
        Ok(url)
    }

    fn get_text(&self, url: &Url) -> Result<String, PlayerError> {
        let response = self.client.get(url.clone()).send().map_err(fetch_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(PlayerError::SourceFetchError(format!(
                "{} returned HTTP {}",
                url, status
            )));
        }
        response.text().map_err(fetch_error)
    }
}

impl ScriptSource for HttpScriptSource {
    fn fetch_raw_script(&self, identity: &str) -> Result<String, PlayerError> {
        let page_url = self.page_url(identity)?;
        let page = self.get_text(&page_url)?;

        let player_url = locate_player_url(&page, &page_url)?;
        debug!("Player script for {} is {}", identity, player_url);

        self.get_text(&player_url)
    }
}

fn fetch_error(err: reqwest::Error) -> PlayerError {
    PlayerError::SourceFetchError(err.to_string())
}

/// Find the player script URL referenced by an embed or watch page
pub fn locate_player_url(page: &str, base: &Url) -> Result<Url, PlayerError> {
    let patterns = [
        r#""jsUrl"\s*:\s*"([^"]+)""#,
        r#""PLAYER_JS_URL"\s*:\s*"([^"]+)""#,
        r#"<script[^>]+src="([^"]+/base\.js)""#,
    ];

    for pattern in patterns {
        let regex = Regex::new(pattern)?;
        if let Some(captures) = regex.captures(page) {
            let raw = captures[1].replace("\\/", "/").replace("\\u0026", "&");
            return Ok(base.join(&raw)?);
        }
    }

    Err(PlayerError::SourceFetchError(
        "Player script URL not found in page".to_string(),
    ))
}

/// Reads one local script for every identity
#[derive(Debug, Clone)]
pub struct FileScriptSource {
    path: PathBuf,
}

impl FileScriptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScriptSource for FileScriptSource {
    fn fetch_raw_script(&self, identity: &str) -> Result<String, PlayerError> {
        debug!("Reading player script for {} from {}", identity, self.path.display());
        Ok(std::fs::read_to_string(&self.path)?)
    }
}

/// In-memory scripts with a fetch counter
#[derive(Debug, Default)]
pub struct StaticScriptSource {
    fallback: Option<Arc<str>>,
    scripts: HashMap<String, Arc<str>>,
    fetches: AtomicUsize,
}

impl StaticScriptSource {
    /// Serve `script` for every identity
    pub fn new(script: impl Into<Arc<str>>) -> Self {
        Self {
            fallback: Some(script.into()),
            ..Self::default()
        }
    }

    /// Source with no scripts; every fetch fails until scripts are added
    pub fn empty() -> Self {
        Self::default()
    }

    /// Serve `script` for `identity` only
    pub fn with_script(mut self, identity: &str, script: impl Into<Arc<str>>) -> Self {
        self.scripts.insert(identity.to_string(), script.into());
        self
    }

    /// Number of fetches served or refused so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ScriptSource for StaticScriptSource {
    fn fetch_raw_script(&self, identity: &str) -> Result<String, PlayerError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.scripts
            .get(identity)
            .or(self.fallback.as_ref())
            .map(|script| script.to_string())
            .ok_or_else(|| {
                PlayerError::SourceFetchError(format!("No script available for {}", identity))
            })
    }
}
