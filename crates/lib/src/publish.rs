//! Post gateway: turns operator text into a public post and the outcome into reply text.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Appended to every post. `/c` marks the post as communal (written by the team, not one person).
pub const COMMUNAL_SUFFIX: &str = " /c";

/// A post the provider accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedStatus {
    pub id: String,
}

/// One entry of the provider's structured error list (e.g. Twitter `errors[]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Api {
        status: u16,
        errors: Vec<ApiErrorDetail>,
        body: String,
    },

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("request signing failed: {0}")]
    Signing(String),
}

impl ProviderError {
    /// Message to show the operator: the first structured sub-error when the provider sent any,
    /// otherwise the raw error text.
    pub fn user_message(&self) -> String {
        match self {
            ProviderError::Api { errors, .. } if !errors.is_empty() => errors[0].message.clone(),
            other => other.to_string(),
        }
    }
}

/// Outbound post capability (Twitter `statuses/update` in production).
#[async_trait]
pub trait PostProvider: Send + Sync {
    async fn submit_post(&self, text: &str) -> Result<PostedStatus, ProviderError>;
}

/// Outcome of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostResult {
    Posted { permalink: String },
    Failed { message: String },
}

impl PostResult {
    /// Text sent back to the conversation the request came from.
    pub fn reply_text(&self) -> String {
        match self {
            PostResult::Posted { permalink } => format!("poasted! {}", permalink),
            PostResult::Failed { message } => format!("ERROR: {}", message),
        }
    }
}

/// Wraps the provider with the suffix, error normalisation and permalink formatting.
#[derive(Clone)]
pub struct PostGateway {
    provider: Arc<dyn PostProvider>,
    public_handle: String,
    web_base: String,
}

impl PostGateway {
    pub fn new(provider: Arc<dyn PostProvider>, public_handle: String, web_base: String) -> Self {
        Self {
            provider,
            public_handle,
            web_base: web_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn permalink(&self, post_id: &str) -> String {
        format!("{}/{}/status/{}", self.web_base, self.public_handle, post_id)
    }

    /// Publish `text` with the communal suffix. Empty text is still forwarded; the provider
    /// decides whether it is valid. Never retries.
    pub async fn publish(&self, text: &str) -> PostResult {
        let status = format!("{}{}", text, COMMUNAL_SUFFIX);
        match self.provider.submit_post(&status).await {
            Ok(posted) => {
                log::info!("posted status {}", posted.id);
                PostResult::Posted {
                    permalink: self.permalink(&posted.id),
                }
            }
            Err(e) => {
                log::warn!("post failed: {}", e);
                PostResult::Failed {
                    message: e.user_message(),
                }
            }
        }
    }
}
