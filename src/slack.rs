use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, trace, warn};

use crate::network::Network;

pub mod types;

pub use self::types::{Attachment, AuthIdentity, OutgoingMessage, SlackUser, UserProfile};
use self::types::{ApiStatus, PostMessageRequest, PostMessageResponse, UsersPage};

const SLACK_API_URL: &str = "https://slack.com/api";
const USERS_PAGE_LIMIT: u32 = 200;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request to {method} failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} returned error: {code}")]
    Api { method: &'static str, code: String },

    #[error("{method} failed with status {status}")]
    Status {
        method: &'static str,
        status: StatusCode,
    },

    #[error("{method} returned a malformed response: {source}")]
    Malformed {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(&'static str),
}

/// The three messaging platform calls the plugin relies on.
#[async_trait]
pub trait MessagingPlatform: Send + Sync {
    async fn auth_test(&self) -> Result<AuthIdentity, PlatformError>;

    /// Full roster in the order the platform returns it.
    async fn list_users(&self) -> Result<Vec<SlackUser>, PlatformError>;

    async fn post_message(
        &self,
        target: &str,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError>;
}

pub struct SlackClient {
    network: Network,
    token: SecretString,
    base_url: String,
    max_attempts: usize,
}

impl SlackClient {
    pub fn new(network: Network, token: SecretString, max_attempts: usize) -> Self {
        Self {
            network,
            token,
            base_url: SLACK_API_URL.to_string(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    fn retry_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(10)
            .factor(25)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.max_attempts - 1)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(query)
            .finish();
        let url = format!("{}?{}", self.url(method), query);

        self.call(method, || {
            self.network
                .client
                .get(&url)
                .bearer_auth(self.token.expose_secret())
        })
        .await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        method: &'static str,
        body: &B,
    ) -> Result<T, PlatformError> {
        let url = self.url(method);

        self.call(method, || {
            self.network
                .client
                .post(&url)
                .bearer_auth(self.token.expose_secret())
                .json(body)
        })
        .await
    }

    /// Sends the request, retrying connection failures, timeouts, 429 and 5xx
    /// up to the configured attempt count, all within the run deadline. Other
    /// statuses and API-level errors are reported on the first occurrence.
    async fn call<T, F>(&self, method: &'static str, request: F) -> Result<T, PlatformError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let attempt = || {
            let pending = request().send();
            async move { pending.await?.error_for_status() }
        };
        let condition = |e: &reqwest::Error| {
            let retry = is_retryable(e);
            warn!(method, error = %e, retry, "slack request failed");
            retry
        };

        let exchange = async {
            let response = RetryIf::spawn(self.retry_strategy(), attempt, condition).await?;
            response.text().await
        };

        let body = match self.network.within(exchange).await {
            Ok(Ok(body)) => body,
            Ok(Err(source)) => {
                return Err(match source.status() {
                    Some(status) => PlatformError::Status { method, status },
                    None => PlatformError::Transport { method, source },
                });
            }
            Err(_) => return Err(PlatformError::DeadlineExceeded(method)),
        };

        decode(method, &body)
    }
}

fn is_retryable(e: &reqwest::Error) -> bool {
    match e.status() {
        Some(status) => status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        None => e.is_connect() || e.is_timeout() || e.is_request(),
    }
}

/// Checks the `ok` flag, then decodes the method-specific body.
fn decode<T: DeserializeOwned>(method: &'static str, body: &str) -> Result<T, PlatformError> {
    let malformed = |source| PlatformError::Malformed { method, source };

    let value: serde_json::Value = serde_json::from_str(body).map_err(malformed)?;
    let status = ApiStatus::deserialize(&value).map_err(malformed)?;
    if !status.ok {
        return Err(PlatformError::Api {
            method,
            code: status.error.unwrap_or_else(|| "unknown_error".to_string()),
        });
    }

    serde_json::from_value(value).map_err(malformed)
}

#[async_trait]
impl MessagingPlatform for SlackClient {
    async fn auth_test(&self) -> Result<AuthIdentity, PlatformError> {
        self.post("auth.test", &serde_json::json!({})).await
    }

    async fn list_users(&self) -> Result<Vec<SlackUser>, PlatformError> {
        let mut users = Vec::new();
        let mut cursor = String::new();

        loop {
            let mut query = vec![("limit", USERS_PAGE_LIMIT.to_string())];
            if !cursor.is_empty() {
                query.push(("cursor", cursor.clone()));
            }

            let page: UsersPage = self.get("users.list", &query).await?;
            trace!(count = page.members.len(), "fetched page of users");
            users.extend(page.members);

            cursor = page
                .response_metadata
                .map(|m| m.next_cursor)
                .unwrap_or_default();
            if cursor.is_empty() {
                break;
            }
        }

        debug!(count = users.len(), "fetched slack users");
        Ok(users)
    }

    async fn post_message(
        &self,
        target: &str,
        message: &OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let request = PostMessageRequest {
            channel: target,
            message,
        };
        let response: PostMessageResponse = self.post("chat.postMessage", &request).await?;
        debug!(channel = %response.channel, ts = %response.ts, "message posted");
        Ok(())
    }
}
