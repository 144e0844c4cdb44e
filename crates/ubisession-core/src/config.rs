//! Client configuration management.
//!
//! Settings are read from `~/.config/ubisession/config.json` when it exists
//! and then overlaid from the environment. The account secret is only ever
//! taken from the environment (or set programmatically), never from disk.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;

/// Application name used for config/data directory paths
const APP_NAME: &str = "ubisession";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Directory holding one credentials file per account
const CREDS_DIR: &str = "creds";

/// Application id sent as `Ubi-AppId` unless overridden.
pub const DEFAULT_APP_ID: &str = "e3d5ea9e-50bd-43b7-88bf-39794f4e3d40";

pub const DEFAULT_LOCALE: &str = "en-US";

pub const DEFAULT_USER_AGENT: &str = "UbiServices_SDK_2020.Release.58_PC64_ansi_static";

pub const DEFAULT_SESSION_URL: &str = "https://public-ubiservices.ubi.com/v3/profiles/sessions";

pub const DEFAULT_GRAPHQL_URL: &str =
    "https://public-ubiservices.ubi.com/v1/profiles/me/uplay/graphql";

const DEFAULT_MAX_CONNECT_RETRIES: u32 = 1;

/// Seconds before the HTTP handle is recycled.
const DEFAULT_REFRESH_SESSION_SECS: i64 = 180;

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// The secret used for the basic-auth session exchange.
#[derive(Clone, PartialEq, Eq)]
pub enum Account {
    Password { email: String, password: String },
    BasicToken(String),
}

impl Account {
    /// Base64 of `email:password`, or the pre-shared token as given.
    pub fn basic_token(&self) -> String {
        match self {
            Account::Password { email, password } => {
                base64::engine::general_purpose::STANDARD.encode(format!("{email}:{password}"))
            }
            Account::BasicToken(token) => token.clone(),
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Password { email, .. } => f
                .debug_struct("Password")
                .field("email", email)
                .field("password", &"<redacted>")
                .finish(),
            Account::BasicToken(_) => f.debug_tuple("BasicToken").field(&"<redacted>").finish(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip)]
    pub account: Option<Account>,
    pub app_id: String,
    pub locale: String,
    pub user_agent: String,
    pub creds_dir: Option<PathBuf>,
    pub max_connect_retries: u32,
    /// Positive: recycle the HTTP handle after this many seconds.
    /// Zero or negative: never recycle by age.
    pub refresh_session_secs: i64,
    pub request_timeout_secs: u64,
    pub item_id: Option<String>,
    pub session_url: String,
    pub graphql_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account: None,
            app_id: DEFAULT_APP_ID.to_string(),
            locale: DEFAULT_LOCALE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            creds_dir: None,
            max_connect_retries: DEFAULT_MAX_CONNECT_RETRIES,
            refresh_session_secs: DEFAULT_REFRESH_SESSION_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            item_id: None,
            session_url: DEFAULT_SESSION_URL.to_string(),
            graphql_url: DEFAULT_GRAPHQL_URL.to_string(),
        }
    }
}

impl Config {
    /// Load the config file (if any) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Ok(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Overlay settings from an environment lookup.
    ///
    /// `UBI_BASIC_TOKEN` wins over `AUTH_EMAIL`/`AUTH_PW` when both are set.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = var("UBI_BASIC_TOKEN").filter(|t| !t.is_empty()) {
            self.account = Some(Account::BasicToken(token));
        } else if let (Some(email), Some(password)) = (var("AUTH_EMAIL"), var("AUTH_PW")) {
            self.account = Some(Account::Password { email, password });
        }

        if let Some(app_id) = var("UBI_APP_ID") {
            self.app_id = app_id;
        }
        if let Some(locale) = var("UBI_LOCALE") {
            self.locale = locale;
        }
        if let Some(dir) = var("UBI_CREDS_DIR") {
            self.creds_dir = Some(PathBuf::from(dir));
        }
        if let Some(item_id) = var("UBI_ITEM_ID") {
            self.item_id = Some(item_id);
        }
        if let Some(url) = var("UBI_SESSION_URL") {
            self.session_url = url;
        }
        if let Some(url) = var("UBI_GRAPHQL_URL") {
            self.graphql_url = url;
        }
        if let Some(retries) = var("UBI_MAX_CONNECT_RETRIES") {
            self.max_connect_retries = retries
                .parse()
                .with_context(|| format!("Invalid UBI_MAX_CONNECT_RETRIES: {retries}"))?;
        }
        if let Some(secs) = var("UBI_REFRESH_SESSION_SECS") {
            self.refresh_session_secs = secs
                .parse()
                .with_context(|| format!("Invalid UBI_REFRESH_SESSION_SECS: {secs}"))?;
        }
        if let Some(secs) = var("UBI_REQUEST_TIMEOUT_SECS") {
            self.request_timeout_secs = secs
                .parse()
                .with_context(|| format!("Invalid UBI_REQUEST_TIMEOUT_SECS: {secs}"))?;
        }
        Ok(())
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.account = Some(account);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Credentials file for an account: `<creds_dir>/<basic token>.json`.
    ///
    /// Standard base64 may contain `/` and `+`, which are mapped to `_` and `-`
    /// so the token always names a single file.
    pub fn creds_path(&self, account: &Account) -> PathBuf {
        let name: String = account
            .basic_token()
            .chars()
            .map(|c| match c {
                '/' => '_',
                '+' => '-',
                c => c,
            })
            .collect();
        self.creds_dir().join(format!("{name}.json"))
    }

    pub fn creds_dir(&self) -> PathBuf {
        self.creds_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|dir| dir.join(APP_NAME).join(CREDS_DIR))
                .unwrap_or_else(|| PathBuf::from(".").join(CREDS_DIR))
        })
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
