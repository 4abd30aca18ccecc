//! Twitter channel: identity check and status updates over the v1.1 REST API.

mod oauth;

pub use oauth::OAuthSigner;

use crate::config::TwitterCredentials;
use crate::identity::IdentitySource;
use crate::publish::{ApiErrorDetail, PostProvider, PostedStatus, ProviderError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

const VERIFY_CREDENTIALS_PATH: &str = "/account/verify_credentials.json";
const UPDATE_STATUS_PATH: &str = "/statuses/update.json";

#[derive(Debug, Deserialize)]
pub struct TwitterUser {
    pub screen_name: String,
    #[serde(default)]
    pub id_str: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id_str: String,
}

#[derive(Debug, Deserialize)]
struct ErrorsResponse {
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

/// Twitter client signing every request with the account's OAuth 1.0a credentials.
#[derive(Clone)]
pub struct TwitterClient {
    client: reqwest::Client,
    api_base: String,
    signer: OAuthSigner,
}

impl TwitterClient {
    pub fn new(
        api_base: String,
        creds: &TwitterCredentials,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            signer: OAuthSigner::new(creds),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// GET account/verify_credentials: who the access token belongs to.
    pub async fn verify_credentials(&self) -> Result<TwitterUser, ProviderError> {
        let url = self.url(VERIFY_CREDENTIALS_PATH);
        let params = [
            ("skip_status", "true"),
            ("include_email", "false"),
            ("include_entities", "false"),
        ];
        let auth = self
            .signer
            .authorization("GET", &url, &params)
            .map_err(|e| ProviderError::Signing(e.to_string()))?;
        let res = self
            .client
            .get(&url)
            .query(&params)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await?;
        decode(res).await
    }

    /// POST statuses/update with `status` as-is.
    pub async fn update_status(&self, status: &str) -> Result<PostedStatus, ProviderError> {
        let url = self.url(UPDATE_STATUS_PATH);
        let auth = self
            .signer
            .authorization("POST", &url, &[("status", status)])
            .map_err(|e| ProviderError::Signing(e.to_string()))?;
        let res = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body(format!("status={}", oauth::encode(status)))
            .send()
            .await?;
        let tweet: Tweet = decode(res).await?;
        Ok(PostedStatus { id: tweet.id_str })
    }
}

/// Decode a success body as `T`; on a non-2xx status pull out Twitter's `errors[]` when present.
async fn decode<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, ProviderError> {
    let status = res.status();
    let body = res.text().await?;
    if !status.is_success() {
        let errors = serde_json::from_str::<ErrorsResponse>(&body)
            .map(|r| r.errors)
            .unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            errors,
            body,
        });
    }
    serde_json::from_str(&body).map_err(|e| ProviderError::Decode(e.to_string()))
}

#[async_trait]
impl PostProvider for TwitterClient {
    async fn submit_post(&self, text: &str) -> Result<PostedStatus, ProviderError> {
        self.update_status(text).await
    }
}

#[async_trait]
impl IdentitySource for TwitterClient {
    fn service(&self) -> &str {
        "twitter"
    }

    async fn whoami(&self) -> anyhow::Result<String> {
        let user = self.verify_credentials().await?;
        if let Some(id) = &user.id_str {
            log::debug!("twitter user id: {}", id);
        }
        Ok(user.screen_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(base: String) -> TwitterClient {
        let creds = TwitterCredentials {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            access_token: "at".to_string(),
            access_secret: "as".to_string(),
        };
        TwitterClient::new(base, &creds, Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn verify_credentials_returns_screen_name() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/account/verify_credentials.json")
                .query_param("skip_status", "true")
                .query_param("include_email", "false");
            then.status(200)
                .json_body(json!({ "id_str": "99", "screen_name": "poastbot" }));
        });

        let user = client(server.base_url())
            .verify_credentials()
            .await
            .expect("verify");
        assert_eq!(user.screen_name, "poastbot");
        assert_eq!(user.id_str.as_deref(), Some("99"));
        mock.assert();
    }

    #[tokio::test]
    async fn update_status_sends_signed_form_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/statuses/update.json")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_includes("status=hello%20world%20%2Fc");
            then.status(200)
                .json_body(json!({ "id": 123, "id_str": "123", "text": "hello world /c" }));
        });

        let posted = client(server.base_url())
            .submit_post("hello world /c")
            .await
            .expect("post");
        assert_eq!(posted.id, "123");
        mock.assert();
    }

    #[tokio::test]
    async fn api_errors_are_structured() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/statuses/update.json");
            then.status(403).json_body(json!({
                "errors": [{ "code": 187, "message": "Status is a duplicate." }]
            }));
        });

        let err = client(server.base_url())
            .update_status("again /c")
            .await
            .unwrap_err();
        match &err {
            ProviderError::Api { status, errors, .. } => {
                assert_eq!(*status, 403);
                assert_eq!(errors[0].code, Some(187));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.user_message(), "Status is a duplicate.");
    }

    #[tokio::test]
    async fn non_json_error_keeps_raw_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/statuses/update.json");
            then.status(503).body("over capacity");
        });

        let err = client(server.base_url())
            .update_status("x /c")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "provider returned 503: over capacity");
    }

    #[tokio::test]
    async fn missing_id_is_a_decode_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/statuses/update.json");
            then.status(200).json_body(json!({ "text": "no id" }));
        });

        let err = client(server.base_url())
            .update_status("x /c")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
