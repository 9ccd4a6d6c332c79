//! Configuration for the Douban fetch layer.
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! yields a working guest configuration. [`LiveSettings`] is the shared handle
//! the fetch pipeline reads on every request, so edits made through it take
//! effect without rebuilding the client.
//!
//! Without an explicit path the file is discovered with `prefer` under the
//! name [`CONFIG_NAME`], and [`LiveSettings::watch`] re-reads it on change.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Name config files are discovered under (`metafetch.toml` etc).
pub const CONFIG_NAME: &str = "metafetch";

/// Environment variable overriding `douban.cookies`.
pub const COOKIES_ENV: &str = "METAFETCH_DOUBAN_COOKIES";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub douban: DoubanSettings,
    #[serde(default)]
    pub http: HttpSettings,
}

/// Origin-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoubanSettings {
    /// Raw cookie string, `k1=v1; k2=v2`. Empty means guest.
    #[serde(default)]
    pub cookies: String,
    /// Use the stricter anti-block request budgets.
    #[serde(default = "default_anti_block")]
    pub anti_block: bool,
    /// Movie site, used for subject and celebrity pages and as Origin/Referer.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Main site, used for keyword search.
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// Host that serves the proof-of-work challenge.
    #[serde(default = "default_challenge_url")]
    pub challenge_url: String,
    /// URL the configured cookies are applied to.
    #[serde(default = "default_cookie_url")]
    pub cookie_url: String,
    /// Domain attribute for configured cookies. Empty means host-only.
    #[serde(default = "default_cookie_domain")]
    pub cookie_domain: String,
}

impl Default for DoubanSettings {
    fn default() -> Self {
        Self {
            cookies: String::new(),
            anti_block: default_anti_block(),
            base_url: default_base_url(),
            search_url: default_search_url(),
            challenge_url: default_challenge_url(),
            cookie_url: default_cookie_url(),
            cookie_domain: default_cookie_domain(),
        }
    }
}

impl DoubanSettings {
    /// Cookie string with surrounding whitespace removed.
    pub fn trimmed_cookies(&self) -> &str {
        self.cookies.trim()
    }

    pub fn has_cookies(&self) -> bool {
        !self.trimmed_cookies().is_empty()
    }
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpSettings {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Empty for the default, `impersonate` for a random browser, else literal.
    #[serde(default)]
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: String::new(),
        }
    }
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn user_agent_config(&self) -> Option<&str> {
        let ua = self.user_agent.trim();
        if ua.is_empty() {
            None
        } else {
            Some(ua)
        }
    }
}

fn default_anti_block() -> bool {
    true
}

fn default_base_url() -> String {
    "https://movie.douban.com".to_string()
}

fn default_search_url() -> String {
    "https://www.douban.com".to_string()
}

fn default_challenge_url() -> String {
    "https://sec.douban.com".to_string()
}

fn default_cookie_url() -> String {
    "https://douban.com/".to_string()
}

fn default_cookie_domain() -> String {
    ".douban.com".to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    /// Load settings from a TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Config file to use: `explicit` if given, else one discovered in the
    /// standard locations.
    pub async fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        match prefer::load(CONFIG_NAME).await {
            Ok(found) => found.source_path().map(|path| path.to_path_buf()),
            Err(_) => {
                debug!("No {} config file discovered, using defaults", CONFIG_NAME);
                None
            }
        }
    }

    /// Load from `path` if given, else defaults; then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        settings.apply_env();
        Ok(settings)
    }

    /// Apply environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(cookies) = std::env::var(COOKIES_ENV) {
            self.douban.cookies = cookies;
        }
    }
}

/// Shared, hot-swappable settings.
///
/// Cloning is cheap and every clone observes the same updates.
#[derive(Debug, Clone, Default)]
pub struct LiveSettings {
    inner: Arc<RwLock<Settings>>,
}

impl LiveSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Snapshot of the current settings.
    pub fn current(&self) -> Settings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Snapshot of just the origin settings.
    pub fn douban(&self) -> DoubanSettings {
        match self.inner.read() {
            Ok(guard) => guard.douban.clone(),
            Err(poisoned) => poisoned.into_inner().douban.clone(),
        }
    }

    /// Mutate the settings in place.
    pub fn update(&self, f: impl FnOnce(&mut Settings)) {
        match self.inner.write() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    /// Replace the cookie string. Picked up by the next fetch.
    pub fn set_cookies(&self, cookies: impl Into<String>) {
        let cookies = cookies.into();
        self.update(|s| s.douban.cookies = cookies);
    }

    /// Re-read a settings file. On failure the previous settings stay active.
    pub fn reload_from(&self, path: &Path) -> Result<(), ConfigError> {
        match Settings::load_from_path(path) {
            Ok(mut settings) => {
                settings.apply_env();
                self.update(|s| *s = settings);
                info!("Reloaded settings from {}", path.display());
                Ok(())
            }
            Err(e) => {
                warn!("Keeping previous settings: {}", e);
                Err(e)
            }
        }
    }

    /// Re-read `path` each time the discovered config file changes, until
    /// `cancel` fires. `adjust` runs after every successful reload so
    /// command-line overrides survive it.
    pub async fn watch(
        &self,
        path: PathBuf,
        cancel: CancellationToken,
        adjust: impl Fn(&mut Settings),
    ) {
        let mut watcher = match prefer::watch(CONFIG_NAME).await {
            Ok(watcher) => watcher,
            Err(_) => {
                debug!("Not watching {}", path.display());
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = watcher.recv() => {
                    if changed.is_none() {
                        return;
                    }
                    if self.reload_from(&path).is_ok() {
                        self.update(&adjust);
                    }
                }
            }
        }
    }
}
