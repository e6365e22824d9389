use clap::Parser;
use secrecy::SecretString;

use crate::blame::ResolutionOrder;
use crate::config::{LogFormat, LoggingConfig, MessageOptions, NetworkConfig, Settings};

/// Command line and environment bindings for the plugin settings.
#[derive(Debug, Parser)]
#[command(
    name = "drone-slack-blame",
    version,
    about = "Targeted build notifications for slack"
)]
pub struct Cli {
    #[arg(long, env = "PLUGIN_TOKEN", hide_env_values = true, default_value = "")]
    pub token: String,

    #[arg(long = "slack-token", env = "SLACK_TOKEN", hide = true, hide_env_values = true)]
    pub slack_token: Option<String>,

    #[arg(long, env = "PLUGIN_CHANNEL", default_value = "")]
    pub channel: String,

    /// Directory mapping as inline JSON or YAML, a file path, or a URL.
    #[arg(long, env = "PLUGIN_MAPPING", default_value = "")]
    pub mapping: String,

    #[arg(long, env = "PLUGIN_SUCCESS_USERNAME", default_value = "drone")]
    pub success_username: String,

    #[arg(long, env = "PLUGIN_SUCCESS_ICON", default_value = ":drone:")]
    pub success_icon: String,

    #[arg(long, env = "PLUGIN_SUCCESS_TEMPLATE", default_value = "")]
    pub success_template: String,

    #[arg(long, env = "PLUGIN_SUCCESS_IMAGE_ATTACHMENTS", value_delimiter = ',')]
    pub success_image_attachments: Vec<String>,

    #[arg(long, env = "PLUGIN_FAILURE_USERNAME", default_value = "drone")]
    pub failure_username: String,

    #[arg(long, env = "PLUGIN_FAILURE_ICON", default_value = ":drone:")]
    pub failure_icon: String,

    #[arg(long, env = "PLUGIN_FAILURE_TEMPLATE", default_value = "")]
    pub failure_template: String,

    #[arg(long, env = "PLUGIN_FAILURE_IMAGE_ATTACHMENTS", value_delimiter = ',')]
    pub failure_image_attachments: Vec<String>,

    #[arg(long, env = "PLUGIN_RESOLUTION_ORDER", default_value = "mapping-first")]
    pub resolution_order: ResolutionOrder,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PLUGIN_TIMEOUT", default_value_t = 30)]
    pub timeout: u64,

    /// Overall budget for the run in seconds.
    #[arg(long, env = "PLUGIN_DEADLINE", default_value_t = 120)]
    pub deadline: u64,

    #[arg(long, env = "PLUGIN_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: usize,

    #[arg(long, env = "PLUGIN_SKIP_VERIFY")]
    pub skip_verify: bool,

    #[arg(long, env = "PLUGIN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "PLUGIN_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Cli {
    pub fn into_settings(self) -> Settings {
        let token = if self.token.trim().is_empty() {
            self.slack_token.unwrap_or_default()
        } else {
            self.token
        };

        Settings {
            token: SecretString::from(token),
            channel: self.channel,
            mapping: self.mapping,
            success: MessageOptions {
                username: self.success_username,
                icon: self.success_icon,
                template: self.success_template,
                image_attachments: self.success_image_attachments,
            },
            failure: MessageOptions {
                username: self.failure_username,
                icon: self.failure_icon,
                template: self.failure_template,
                image_attachments: self.failure_image_attachments,
            },
            resolution_order: self.resolution_order,
            network: NetworkConfig {
                timeout_secs: self.timeout,
                deadline_secs: self.deadline,
                max_attempts: self.max_attempts,
                skip_verify: self.skip_verify,
            },
            logging: LoggingConfig {
                level: self.log_level,
                format: self.log_format,
            },
        }
    }
}
