//! Run configuration.
//!
//! Two YAML documents of the same shape feed a run: the local `sources.yml`
//! and an optional inline document from `SOURCES_YML`.  The inline document
//! appends to the source list and replaces `keywords`, `match_mode` and
//! `delay` when it sets them.
//!
//! [`Settings`] gathers everything else the process reads from its
//! environment (file locations and chat credentials).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::notify::Credentials;

pub const DEFAULT_CONFIG_PATH: &str = "sources.yml";
pub const DEFAULT_STATE_PATH: &str = "pushed.json";

pub const ENV_SOURCES_OVERRIDE: &str = "SOURCES_YML";
pub const ENV_CONFIG_PATH: &str = "FEED_RELAY_CONFIG";
pub const ENV_STATE_PATH: &str = "FEED_RELAY_STATE";
pub const ENV_TOKEN: &str = "TELEGRAM_TOKEN";
pub const ENV_CHAT_ID: &str = "CHAT_ID";

const DEFAULT_DELAY_SECS: u64 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no configuration found in {} or $SOURCES_YML", .path.display())]
    NoConfig { path: PathBuf },
}

/// How multiple keywords combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// At least one keyword must appear.
    #[default]
    Any,
    /// Every keyword must appear.
    All,
}

/// One feed to poll.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
impl Source {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            enabled: true,
        }
    }
}

/// The effective configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub keywords: Vec<String>,
    pub match_mode: MatchMode,
    /// Pause after every outbound message.
    pub delay: Duration,
    pub sources: Vec<Source>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            match_mode: MatchMode::default(),
            delay: Duration::from_secs(DEFAULT_DELAY_SECS),
            sources: Vec::new(),
        }
    }
}

/// A YAML document as written.  Every key is optional so that two
/// documents can be layered before defaults are applied.
#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    keywords: Option<Vec<String>>,
    match_mode: Option<MatchMode>,
    delay: Option<u64>,
    sources: Option<Vec<Source>>,
}

impl ConfigDocument {
    /// `None` for an empty or `null` document.
    fn parse(text: &str) -> Result<Option<Self>, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_yaml::from_str(text)
    }

    fn layer(mut self, over: ConfigDocument) -> Self {
        if let Some(extra) = over.sources {
            self.sources.get_or_insert_with(Vec::new).extend(extra);
        }
        if over.keywords.is_some() {
            self.keywords = over.keywords;
        }
        if over.match_mode.is_some() {
            self.match_mode = over.match_mode;
        }
        if over.delay.is_some() {
            self.delay = over.delay;
        }
        self
    }

    fn into_config(self) -> Config {
        let defaults = Config::default();
        Config {
            keywords: self.keywords.unwrap_or(defaults.keywords),
            match_mode: self.match_mode.unwrap_or(defaults.match_mode),
            delay: self.delay.map(Duration::from_secs).unwrap_or(defaults.delay),
            sources: self.sources.unwrap_or(defaults.sources),
        }
    }
}

/// Build the effective [`Config`] from the file at `path` (if it exists)
/// and the inline `override_yaml` (if given).
///
/// A broken local file is fatal.  A broken override is logged and ignored.
pub fn load(path: &Path, override_yaml: Option<&str>) -> Result<Config, ConfigError> {
    let base = if path.exists() {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ConfigDocument::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        debug!(path = %path.display(), "config file not present");
        None
    };

    let over = match override_yaml.map(ConfigDocument::parse) {
        Some(Ok(doc)) => doc,
        Some(Err(e)) => {
            warn!(error = %e, "cannot parse $SOURCES_YML, ignoring it");
            None
        }
        None => None,
    };

    let merged = match (base, over) {
        (None, None) => {
            return Err(ConfigError::NoConfig {
                path: path.to_path_buf(),
            })
        }
        (Some(base), None) => base,
        (None, Some(over)) => ConfigDocument::default().layer(over),
        (Some(base), Some(over)) => base.layer(over),
    };

    Ok(merged.into_config())
}

/// Everything the process reads from its environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub state_path: PathBuf,
    pub sources_override: Option<String>,
    pub credentials: Option<Credentials>,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable lookup.  Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = match (var(ENV_TOKEN), var(ENV_CHAT_ID)) {
            (Some(token), Some(chat_id)) => Some(Credentials { token, chat_id }),
            _ => None,
        };

        Self {
            config_path: var(ENV_CONFIG_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            state_path: var(ENV_STATE_PATH)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_PATH)),
            sources_override: var(ENV_SOURCES_OVERRIDE),
            credentials,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
