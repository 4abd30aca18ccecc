//! The bot's own identity on both services, resolved once at startup.

use anyhow::{Context, Result};
use async_trait::async_trait;

/// Who the bot is: its Slack user id (to recognise its own events and build the mention prefix)
/// and its Twitter handle (for permalinks).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub workspace_user_id: String,
    pub public_handle: String,
}

impl Identity {
    pub fn new(workspace_user_id: impl Into<String>, public_handle: impl Into<String>) -> Self {
        Self {
            workspace_user_id: workspace_user_id.into(),
            public_handle: public_handle.into(),
        }
    }

    /// Text a message must start with to address the bot, e.g. `<@U123> `.
    pub fn mention_prefix(&self) -> String {
        format!("<@{}> ", self.workspace_user_id)
    }
}

/// A service that can tell us which account our credentials belong to.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Service name for logs (e.g. "slack").
    fn service(&self) -> &str;

    /// Identifier of the authenticated account (Slack user id, Twitter screen name).
    async fn whoami(&self) -> Result<String>;
}

async fn ask(source: &dyn IdentitySource) -> Result<String> {
    let id = source
        .whoami()
        .await
        .with_context(|| format!("{} identity check failed", source.service()))?;
    let id = id.trim();
    if id.is_empty() {
        anyhow::bail!("{} identity check returned an empty id", source.service());
    }
    Ok(id.to_string())
}

/// Query both services. Any failure is fatal: without the bot's own user id the dispatcher
/// cannot tell its own echoes apart from operator messages.
pub async fn resolve_identity(
    workspace: &dyn IdentitySource,
    public: &dyn IdentitySource,
) -> Result<Identity> {
    let workspace_user_id = ask(workspace).await?;
    log::info!("I am {} on {}", workspace_user_id, workspace.service());
    let public_handle = ask(public).await?;
    log::info!("I am {} on {}", public_handle, public.service());
    Ok(Identity {
        workspace_user_id,
        public_handle,
    })
}
