//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (default `config.json` in the working directory) and
//! environment. The six credential fields are required; everything else has a default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const SLACK_APP_TOKEN_PREFIX: &str = "xapp-";
pub const SLACK_BOT_TOKEN_PREFIX: &str = "xoxb-";

const DEFAULT_SLACK_API_URL: &str = "https://slack.com/api";
const DEFAULT_TWITTER_API_URL: &str = "https://api.twitter.com/1.1";
const DEFAULT_TWITTER_WEB_URL: &str = "https://twitter.com";

/// Top-level application config. Field names match the keys of `config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// App-level token (xapp-...) used to open Socket Mode connections. Overridden by SLACK_APP_TOKEN.
    #[serde(default)]
    pub slack_app_token: Option<String>,
    /// Bot token (xoxb-...) used for Web API calls. Overridden by SLACK_BOT_TOKEN.
    #[serde(default)]
    pub slack_bot_token: Option<String>,
    #[serde(default)]
    pub twitter_consumer_key: Option<String>,
    #[serde(default)]
    pub twitter_consumer_secret: Option<String>,
    #[serde(default)]
    pub twitter_access_token: Option<String>,
    #[serde(default)]
    pub twitter_access_secret: Option<String>,

    /// Slack Web API base (default https://slack.com/api).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slack_api_url: Option<String>,
    /// Twitter REST API base (default https://api.twitter.com/1.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_api_url: Option<String>,
    /// Base for permalinks in replies (default https://twitter.com).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter_web_url: Option<String>,
    /// Seconds to wait before reopening a dropped Socket Mode connection (default 5).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_secs: Option<u64>,
    /// Per-request HTTP timeout in seconds (default 30).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

/// Startup configuration errors. All of them are fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{field} must have the prefix \"{prefix}\"")]
    BadPrefix {
        field: &'static str,
        prefix: &'static str,
    },
}

/// Validated credentials for both services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub slack: SlackCredentials,
    pub twitter: TwitterCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackCredentials {
    pub app_token: String,
    pub bot_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

/// Looks up an override by upper-case field name (the process environment in production).
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Env var overrides config; blank values count as unset.
fn resolve_field(env: EnvLookup, env_key: &str, configured: Option<&String>) -> Option<String> {
    env(env_key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            configured
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

fn require(
    env: EnvLookup,
    field: &'static str,
    configured: Option<&String>,
) -> Result<String, ConfigError> {
    resolve_field(env, &field.to_uppercase(), configured).ok_or(ConfigError::Missing(field))
}

fn require_prefixed(
    env: EnvLookup,
    field: &'static str,
    prefix: &'static str,
    configured: Option<&String>,
) -> Result<String, ConfigError> {
    let value = require(env, field, configured)?;
    if !value.starts_with(prefix) {
        return Err(ConfigError::BadPrefix { field, prefix });
    }
    Ok(value)
}

impl Config {
    /// Resolve and validate the six credential fields (env overrides file values).
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        self.credentials_with(&|key: &str| std::env::var(key).ok())
    }

    /// Like [`Config::credentials`], with overrides taken from `env` instead of the process
    /// environment.
    pub fn credentials_with(&self, env: EnvLookup) -> Result<Credentials, ConfigError> {
        let slack = SlackCredentials {
            app_token: require_prefixed(
                env,
                "slack_app_token",
                SLACK_APP_TOKEN_PREFIX,
                self.slack_app_token.as_ref(),
            )?,
            bot_token: require_prefixed(
                env,
                "slack_bot_token",
                SLACK_BOT_TOKEN_PREFIX,
                self.slack_bot_token.as_ref(),
            )?,
        };
        let twitter = TwitterCredentials {
            consumer_key: require(
                env,
                "twitter_consumer_key",
                self.twitter_consumer_key.as_ref(),
            )?,
            consumer_secret: require(
                env,
                "twitter_consumer_secret",
                self.twitter_consumer_secret.as_ref(),
            )?,
            access_token: require(
                env,
                "twitter_access_token",
                self.twitter_access_token.as_ref(),
            )?,
            access_secret: require(
                env,
                "twitter_access_secret",
                self.twitter_access_secret.as_ref(),
            )?,
        };
        Ok(Credentials { slack, twitter })
    }

    pub fn slack_api_url(&self) -> String {
        base_url(self.slack_api_url.as_deref(), DEFAULT_SLACK_API_URL)
    }

    pub fn twitter_api_url(&self) -> String {
        base_url(self.twitter_api_url.as_deref(), DEFAULT_TWITTER_API_URL)
    }

    pub fn twitter_web_url(&self) -> String {
        base_url(self.twitter_web_url.as_deref(), DEFAULT_TWITTER_WEB_URL)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.unwrap_or(5))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(30).max(1))
    }
}

fn base_url(configured: Option<&str>, default: &str) -> String {
    configured
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("POAST_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"))
}

/// Load config from the given path (or the default). Missing file => empty config, so credentials
/// can still come from the environment; validation happens in [`Config::credentials`].
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
