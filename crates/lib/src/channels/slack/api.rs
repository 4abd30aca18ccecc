//! Slack Web API: auth.test, apps.connections.open and chat.postMessage.

use crate::channels::ReplySender;
use crate::config::SlackCredentials;
use crate::identity::IdentitySource;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct AuthTestResponse {
    ok: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenSocketResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Result of auth.test: the bot's user id and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotUser {
    pub user_id: String,
    pub name: Option<String>,
}

/// Slack Web API client. The app token opens Socket Mode connections; the bot token does
/// everything else.
#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    app_token: String,
    bot_token: String,
}

impl SlackApiClient {
    pub fn new(api_base: String, creds: &SlackCredentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to create slack api client")?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            app_token: creds.app_token.clone(),
            bot_token: creds.bot_token.clone(),
        })
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }

    /// auth.test with the bot token.
    pub async fn auth_test(&self) -> Result<BotUser> {
        let res = self
            .http
            .post(self.url("auth.test"))
            .bearer_auth(&self.bot_token)
            .send()
            .await
            .context("slack auth.test request failed")?;
        let data: AuthTestResponse = read_json("auth.test", res).await?;
        if !data.ok {
            bail!("slack auth.test failed: {}", error_code(data.error));
        }
        let user_id = data
            .user_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("slack auth.test did not return user_id"))?;
        Ok(BotUser {
            user_id,
            name: data.user,
        })
    }

    /// apps.connections.open with the app token. Returns the WebSocket URL for one session.
    pub async fn open_socket_url(&self) -> Result<String> {
        let res = self
            .http
            .post(self.url("apps.connections.open"))
            .bearer_auth(&self.app_token)
            .send()
            .await
            .context("slack apps.connections.open request failed")?;
        let data: OpenSocketResponse = read_json("apps.connections.open", res).await?;
        if !data.ok {
            bail!(
                "slack apps.connections.open failed: {}",
                error_code(data.error)
            );
        }
        data.url
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| anyhow!("slack apps.connections.open did not return url"))
    }

    /// chat.postMessage with `text` escaped for Slack's message formatting.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let body = serde_json::json!({ "channel": channel, "text": escape_text(text) });
        let res = self
            .http
            .post(self.url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .context("slack chat.postMessage request failed")?;
        let data: PostMessageResponse = read_json("chat.postMessage", res).await?;
        if !data.ok {
            bail!("slack chat.postMessage failed: {}", error_code(data.error));
        }
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(method: &str, res: reqwest::Response) -> Result<T> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        bail!("slack {} failed: {} {}", method, status, body);
    }
    res.json()
        .await
        .with_context(|| format!("decoding slack {} response", method))
}

fn error_code(error: Option<String>) -> String {
    error.unwrap_or_else(|| "unknown error".to_string())
}

/// Escape the three characters Slack treats as control sequences in message text.
pub fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[async_trait]
impl ReplySender for SlackApiClient {
    async fn send_reply(&self, conversation_id: &str, text: &str) -> Result<(), String> {
        self.post_message(conversation_id, text)
            .await
            .map_err(|e| format!("{:#}", e))
    }
}

#[async_trait]
impl IdentitySource for SlackApiClient {
    fn service(&self) -> &str {
        "slack"
    }

    async fn whoami(&self) -> Result<String> {
        let user = self.auth_test().await?;
        if let Some(name) = &user.name {
            log::debug!("slack bot user name: {}", name);
        }
        Ok(user.user_id)
    }
}
