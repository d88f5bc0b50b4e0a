//! Settings, providers and client configuration.
//!
//! [`Settings`] resolves keys from the process environment first and then
//! from a `.env` file in the working directory. The file is read once and
//! never written back into the environment. [`ClientConfig::for_provider`]
//! fails fast with [`Error::Config`] when a required key is missing, before
//! any request is attempted.

use crate::{Error, OLLAMA_BASE_URL, OPENAI_BASE_URL, OPENROUTER_BASE_URL};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Default HTTP timeout for a single completion request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Setting that overrides [`DEFAULT_TIMEOUT`] (whole seconds).
pub const TIMEOUT_VAR: &str = "PARLEY_TIMEOUT_SECS";

// ── Settings ───────────────────────────────────────────────────────

/// Key/value settings from the environment and an optional `.env` file.
#[derive(Debug, Clone)]
pub struct Settings {
    file: HashMap<String, String>,
    use_env: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            file: HashMap::new(),
            use_env: true,
        }
    }
}

impl Settings {
    /// Environment plus `./.env` when it exists. A malformed or unreadable
    /// file is logged and ignored.
    pub fn load() -> Self {
        match Self::from_dotenv(".env") {
            Ok(s) => s,
            Err(e) => {
                if Path::new(".env").exists() {
                    warn!("Ignoring .env: {e}");
                }
                Self::default()
            }
        }
    }

    /// Environment plus the given dotenv file.
    pub fn from_dotenv(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let file = parse_dotenv(&content);
        debug!("Loaded {} setting(s) from {}", file.len(), path.display());
        Ok(Self {
            file,
            use_env: true,
        })
    }

    /// Settings that only see the given pairs, ignoring the environment.
    pub fn isolated<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            file: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            use_env: false,
        }
    }

    /// Look up a key. Empty values count as unset.
    pub fn get(&self, key: &str) -> Option<String> {
        let from_env = if self.use_env {
            std::env::var(key).ok()
        } else {
            None
        };
        from_env
            .or_else(|| self.file.get(key).cloned())
            .filter(|v| !v.trim().is_empty())
    }

    /// Look up a key that must be present.
    pub fn require(&self, key: &str) -> Result<String, Error> {
        self.get(key)
            .ok_or_else(|| Error::config(key, "not set in the environment or .env"))
    }

    /// Parse a key with `FromStr`, `None` when unset.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| Error::config(key, format!("invalid value '{raw}': {e}"))),
            None => Ok(None),
        }
    }
}

/// Parse `KEY=value` lines. Blank lines and `#` comments are skipped; an
/// optional `export ` prefix and matching surrounding quotes are stripped.
fn parse_dotenv(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

// ── Provider ───────────────────────────────────────────────────────

/// An OpenAI-compatible chat completion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenRouter,
    OpenAi,
    /// A local Ollama server; needs no key.
    Ollama,
}

impl Provider {
    pub fn prefix(self) -> &'static str {
        match self {
            Provider::OpenRouter => "openrouter",
            Provider::OpenAi => "openai",
            Provider::Ollama => "ollama",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenRouter => OPENROUTER_BASE_URL,
            Provider::OpenAi => OPENAI_BASE_URL,
            Provider::Ollama => OLLAMA_BASE_URL,
        }
    }

    /// Setting that holds the API key, if the provider needs one.
    pub fn api_key_var(self) -> Option<&'static str> {
        match self {
            Provider::OpenRouter => Some("OPENROUTER_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Ollama => None,
        }
    }

    /// Setting that overrides the base URL.
    pub fn base_url_var(self) -> &'static str {
        match self {
            Provider::OpenRouter => "OPENROUTER_BASE_URL",
            Provider::OpenAi => "OPENAI_BASE_URL",
            Provider::Ollama => "OLLAMA_BASE_URL",
        }
    }

    /// OpenRouter takes `reasoning: {effort}`; the others take a top-level
    /// `reasoning_effort`.
    pub fn nests_reasoning(self) -> bool {
        self == Provider::OpenRouter
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "openrouter" => Ok(Provider::OpenRouter),
            "openai" => Ok(Provider::OpenAi),
            "ollama" => Ok(Provider::Ollama),
            other => Err(Error::config(
                "provider",
                format!("unknown provider '{other}' (expected openrouter, openai or ollama)"),
            )),
        }
    }
}

// ── ModelRef ───────────────────────────────────────────────────────

/// A model name qualified by its provider, written `provider:model`.
///
/// Names without a known provider prefix go to OpenRouter unchanged, so
/// `anthropic/claude-sonnet-4` and `openrouter:anthropic/claude-sonnet-4`
/// are the same reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub provider: Provider,
    pub name: String,
}

impl ModelRef {
    pub fn new(provider: Provider, name: impl Into<String>) -> Self {
        Self {
            provider,
            name: name.into(),
        }
    }

    pub fn parse(s: &str) -> Self {
        if let Some((prefix, name)) = s.split_once(':')
            && let Ok(provider) = prefix.parse::<Provider>()
        {
            return Self::new(provider, name);
        }
        Self::new(Provider::OpenRouter, s)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.name)
    }
}

// ── ClientConfig ───────────────────────────────────────────────────

/// Everything [`ChatClient`](crate::ChatClient) needs to reach a provider.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// `HTTP-Referer` header sent to OpenRouter.
    pub referer: String,
    /// `X-Title` header sent to OpenRouter.
    pub title: String,
}

impl ClientConfig {
    pub fn new(provider: Provider, api_key: Option<String>) -> Self {
        Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            api_key,
            timeout: DEFAULT_TIMEOUT,
            referer: "https://crates.io/crates/parley-rs".to_string(),
            title: "parley-rs".to_string(),
        }
    }

    /// Resolve a provider's key, base URL and timeout from settings.
    pub fn for_provider(provider: Provider, settings: &Settings) -> Result<Self, Error> {
        let api_key = match provider.api_key_var() {
            Some(var) => Some(settings.require(var)?),
            None => None,
        };
        let mut config = Self::new(provider, api_key);
        if let Some(url) = settings.get(provider.base_url_var()) {
            config.base_url = url;
        }
        if let Some(secs) = settings.parse::<u64>(TIMEOUT_VAR)? {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_headers(mut self, referer: impl Into<String>, title: impl Into<String>) -> Self {
        self.referer = referer.into();
        self.title = title.into();
        self
    }
}
