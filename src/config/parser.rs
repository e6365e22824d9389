use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::blame::ResolutionOrder;

/// Plugin settings as supplied by the pipeline, before validation.
#[derive(Debug)]
pub struct Settings {
    pub token: SecretString,
    pub channel: String,
    /// Literal JSON, a path, or a URL.
    pub mapping: String,
    pub success: MessageOptions,
    pub failure: MessageOptions,
    pub resolution_order: ResolutionOrder,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MessageOptions {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    /// Literal template, a path, or a URL. Empty selects the built-in one.
    #[serde(default)]
    pub template: String,
    #[serde(default)]
    pub image_attachments: Vec<String>,
}

impl Default for MessageOptions {
    fn default() -> Self {
        Self {
            username: default_username(),
            icon: default_icon(),
            template: String::new(),
            image_attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default)]
    pub skip_verify: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            deadline_secs: default_deadline_secs(),
            max_attempts: default_max_attempts(),
            skip_verify: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}', expected pretty or json")),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

pub(crate) fn default_username() -> String {
    "drone".to_string()
}

pub(crate) fn default_icon() -> String {
    ":drone:".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_deadline_secs() -> u64 {
    120
}

fn default_max_attempts() -> usize {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}
