use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, error, warn};

use super::parser::{MessageOptions, Settings};
use crate::blame::ResolutionOrder;
use crate::content::ContentResolver;
use crate::mapping::DirectoryMapping;
use crate::message::{IconSpec, MessageTemplate, Outcome};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("slack token not found")]
    MissingToken,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Message options with the template loaded and compiled.
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    pub username: String,
    pub icon: IconSpec,
    /// `None` when the template failed to compile.
    pub template: Option<MessageTemplate>,
    pub images: Vec<String>,
}

impl PreparedMessage {
    /// Loads the template through `resolver`, falling back to the built-in
    /// template when the source is empty or cannot be loaded.
    pub async fn prepare(
        options: &MessageOptions,
        resolver: &ContentResolver,
        outcome: Outcome,
    ) -> Self {
        let source = match resolver.resolve(&options.template).await {
            Ok(source) => source,
            Err(e) => {
                warn!(
                    outcome = outcome.as_str(),
                    template = %options.template,
                    error = %e,
                    "template could not be loaded, using the default"
                );
                String::new()
            }
        };

        Self::from_source(options, &source, outcome)
    }

    pub fn from_source(options: &MessageOptions, source: &str, outcome: Outcome) -> Self {
        let source = if source.is_empty() {
            outcome.default_template()
        } else {
            source
        };
        debug!(outcome = outcome.as_str(), template = %source, "template contents");

        let template = match MessageTemplate::compile(source) {
            Ok(template) => Some(template),
            Err(e) => {
                error!(outcome = outcome.as_str(), error = %e, "could not parse template");
                None
            }
        };

        Self {
            username: options.username.clone(),
            icon: IconSpec::parse(&options.icon),
            template,
            images: options
                .image_attachments
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Settings after validation; passed explicitly to everything downstream.
#[derive(Debug)]
pub struct ValidatedSettings {
    pub token: SecretString,
    /// Always `#`-prefixed when set.
    pub channel: Option<String>,
    pub mapping: DirectoryMapping,
    pub resolution_order: ResolutionOrder,
    pub success: PreparedMessage,
    pub failure: PreparedMessage,
}

impl ValidatedSettings {
    /// Checks the token and loads everything the run needs. Only a missing
    /// token is fatal; unreachable mappings and templates degrade to defaults.
    pub async fn validate(
        settings: Settings,
        resolver: &ContentResolver,
    ) -> Result<Self, ConfigError> {
        if settings.token.expose_secret().trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }

        if settings.network.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "max attempts must be at least 1".to_string(),
            ));
        }

        let mapping = load_mapping(&settings.mapping, resolver).await;

        let (success, failure) = tokio::join!(
            PreparedMessage::prepare(&settings.success, resolver, Outcome::Success),
            PreparedMessage::prepare(&settings.failure, resolver, Outcome::Failure),
        );

        Ok(Self {
            token: settings.token,
            channel: normalize_channel(&settings.channel),
            mapping,
            resolution_order: settings.resolution_order,
            success,
            failure,
        })
    }

    pub fn message(&self, outcome: Outcome) -> &PreparedMessage {
        match outcome {
            Outcome::Success => &self.success,
            Outcome::Failure => &self.failure,
        }
    }
}

async fn load_mapping(source: &str, resolver: &ContentResolver) -> DirectoryMapping {
    match resolver.resolve(source).await {
        Ok(content) => {
            debug!(user_mapping = %content, "user mapping contents");
            DirectoryMapping::parse(&content)
        }
        Err(e) => {
            warn!(mapping = %source, error = %e, "mapping could not be loaded, continuing without it");
            DirectoryMapping::default()
        }
    }
}

pub(crate) fn normalize_channel(channel: &str) -> Option<String> {
    let channel = channel.trim();
    if channel.is_empty() {
        None
    } else if channel.starts_with('#') {
        Some(channel.to_string())
    } else {
        Some(format!("#{channel}"))
    }
}
