use std::collections::HashMap;

use serde_yaml::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("mapping is not a JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("mapping is not a YAML mapping of strings: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("mapping entry {0} is not a string pair")]
    NotAString(String),
}

/// Commit author identity (email or SCM login) to Slack username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryMapping {
    entries: HashMap<String, String>,
}

impl DirectoryMapping {
    /// Parses mapping content, treating anything malformed as an empty mapping.
    pub fn parse(content: &str) -> Self {
        match Self::try_parse(content) {
            Ok(mapping) => {
                debug!(entries = mapping.len(), "loaded user mapping");
                mapping
            }
            Err(e) => {
                warn!(error = %e, "could not parse user mapping, continuing without it");
                Self::default()
            }
        }
    }

    /// JSON is the documented format; YAML is accepted for hand-written files.
    /// Either way every key and value must be a string.
    pub fn try_parse(content: &str) -> Result<Self, MappingError> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(Self::default());
        }

        if content.starts_with('{') {
            let entries = serde_json::from_str::<HashMap<String, String>>(content)?;
            return Ok(Self { entries });
        }

        let mapping: serde_yaml::Mapping = serde_yaml::from_str(content)?;
        let mut entries = HashMap::with_capacity(mapping.len());
        for (key, value) in mapping {
            match (key, value) {
                (Value::String(key), Value::String(value)) => {
                    entries.insert(key, value);
                }
                (key, _) => return Err(MappingError::NotAString(format!("{key:?}"))),
            }
        }

        Ok(Self { entries })
    }

    pub fn get(&self, identity: &str) -> Option<&str> {
        if identity.is_empty() {
            return None;
        }
        self.entries.get(identity).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for DirectoryMapping {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
