use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tokio::time::{Instant, error::Elapsed};

use crate::config::NetworkConfig;

/// HTTP client bound to the run deadline.
///
/// Every outbound call made by the plugin goes through the same client so
/// timeouts and TLS settings are shared, and is raced against the deadline so
/// a hung request cannot keep the step alive.
#[derive(Clone)]
pub struct Network {
    pub client: Client,
    deadline: Instant,
}

impl Network {
    pub fn new(config: &NetworkConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.skip_verify)
            .user_agent(concat!("drone-slack-blame/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self::with_client(
            client,
            Duration::from_secs(config.deadline_secs),
        ))
    }

    pub fn with_client(client: Client, budget: Duration) -> Self {
        Self {
            client,
            deadline: Instant::now() + budget,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Runs `fut` until it completes or the run deadline passes.
    pub async fn within<F, T>(&self, fut: F) -> Result<T, Elapsed>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.deadline, fut).await
    }
}
