use std::sync::Arc;

use rand::Rng;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::blame::{ResolveError, resolve_user};
use crate::config::{ConfigError, ValidatedSettings};
use crate::message::{RenderedMessage, compose};
use crate::network::Network;
use crate::pipeline::Pipeline;
use crate::slack::{MessagingPlatform, OutgoingMessage, PlatformError, SlackUser};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("validation failed: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to test auth: {0}")]
    Auth(#[source] PlatformError),
}

/// What happened to one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Failed(String),
    /// The run deadline passed before the platform answered.
    Abandoned,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub user: Option<String>,
    pub direct: Delivery,
    pub channel: Delivery,
    pub message: RenderedMessage,
}

pub struct Plugin {
    settings: ValidatedSettings,
    pipeline: Pipeline,
    platform: Arc<dyn MessagingPlatform>,
    network: Network,
}

impl Plugin {
    pub fn new(
        settings: ValidatedSettings,
        pipeline: Pipeline,
        platform: Arc<dyn MessagingPlatform>,
        network: Network,
    ) -> Self {
        Self {
            settings,
            pipeline,
            platform,
            network,
        }
    }

    /// Authenticates, finds the author, and posts the build notification.
    ///
    /// Only an authentication failure aborts the run. Lookup and delivery
    /// problems are logged and reflected in the returned report.
    pub async fn execute<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<DeliveryReport, PluginError> {
        let auth = match self.network.within(self.platform.auth_test()).await {
            Ok(result) => result.map_err(PluginError::Auth)?,
            Err(_) => return Err(PluginError::Auth(PlatformError::DeadlineExceeded("auth.test"))),
        };
        info!(team = %auth.team, user = %auth.user, "successfully authenticated with slack api");

        let user = self.find_user().await;
        let message = compose(&self.pipeline, &self.settings, user.as_ref(), rng);
        let outgoing = message.to_outgoing();

        let direct = async {
            match &message.mention {
                Some(mention) => self.deliver(mention, &outgoing).await,
                None => {
                    error!(author = %self.pipeline.commit.author, "could not find author");
                    Delivery::Skipped
                }
            }
        };

        let channel = async {
            match &self.settings.channel {
                Some(channel) => self.deliver(channel, &outgoing).await,
                None => Delivery::Skipped,
            }
        };

        let (direct, channel) = tokio::join!(direct, channel);

        Ok(DeliveryReport {
            user: user.map(|u| u.name),
            direct,
            channel,
            message,
        })
    }

    async fn find_user(&self) -> Option<SlackUser> {
        let lookup = resolve_user(
            self.platform.as_ref(),
            &self.pipeline.commit,
            &self.settings.mapping,
            self.settings.resolution_order,
        );

        match self.network.within(lookup).await {
            Ok(Ok(user)) => user,
            Ok(Err(ResolveError::NoIdentity)) => {
                warn!(
                    author = %self.pipeline.commit.author,
                    "commit has no author email or mapped name to search for"
                );
                None
            }
            Ok(Err(e)) => {
                warn!(error = %e, "user lookup failed");
                None
            }
            Err(_) => {
                warn!("user lookup did not finish before the deadline");
                None
            }
        }
    }

    async fn deliver(&self, target: &str, message: &OutgoingMessage) -> Delivery {
        match self
            .network
            .within(self.platform.post_message(target, message))
            .await
        {
            Ok(Ok(())) => {
                info!(destination = %target, "notified");
                Delivery::Sent
            }
            Ok(Err(e)) => {
                error!(destination = %target, error = %e, "could not notify");
                Delivery::Failed(e.to_string())
            }
            Err(_) => {
                warn!(destination = %target, "notification not delivered before the deadline");
                Delivery::Abandoned
            }
        }
    }
}
