use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::network::Network;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to fetch {url}: status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("could not load file {}: {source}", path.display())]
    MissingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not read file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("deadline exceeded while fetching {0}")]
    DeadlineExceeded(String),
}

/// What a configuration string refers to, before anything is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Empty,
    Remote(Url),
    /// A `file:` URL. The target must exist.
    FileUrl(PathBuf),
    /// A plain string that may or may not name a local file.
    Inline(String),
}

impl ContentRef {
    pub fn classify(value: &str) -> Self {
        if value.is_empty() {
            return Self::Empty;
        }

        if let Ok(url) = Url::parse(value) {
            match url.scheme() {
                "http" | "https" => return Self::Remote(url),
                "file" => {
                    let path = url
                        .to_file_path()
                        .unwrap_or_else(|_| PathBuf::from(url.path()));
                    return Self::FileUrl(path);
                }
                _ => {}
            }
        }

        Self::Inline(value.to_string())
    }
}

/// Turns a configuration value into text, whether it was given inline, as a
/// path on disk or as a URL.
#[derive(Clone)]
pub struct ContentResolver {
    network: Network,
}

impl ContentResolver {
    pub fn new(network: Network) -> Self {
        Self { network }
    }

    pub async fn resolve(&self, value: &str) -> Result<String, ContentError> {
        match ContentRef::classify(value) {
            ContentRef::Empty => Ok(String::new()),
            ContentRef::Remote(url) => self.fetch(url).await,
            ContentRef::FileUrl(path) => match tokio::fs::metadata(&path).await {
                Ok(_) => read_file(path).await,
                Err(source) => Err(ContentError::MissingFile { path, source }),
            },
            ContentRef::Inline(value) => {
                let path = PathBuf::from(&value);
                if tokio::fs::metadata(&path).await.is_ok() {
                    read_file(path).await
                } else {
                    Ok(value)
                }
            }
        }
    }

    async fn fetch(&self, url: Url) -> Result<String, ContentError> {
        debug!(url = %url, "fetching remote content");
        let display = url.to_string();

        let request = async {
            let response = self.network.client.get(url).send().await?;
            let response = response.error_for_status()?;
            response.text().await
        };

        match self.network.within(request).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(source)) => match source.status() {
                Some(status) => Err(ContentError::Status {
                    url: display,
                    status,
                }),
                None => Err(ContentError::Http {
                    url: display,
                    source,
                }),
            },
            Err(_) => Err(ContentError::DeadlineExceeded(display)),
        }
    }
}

async fn read_file(path: PathBuf) -> Result<String, ContentError> {
    debug!(path = %path.display(), "reading content from file");
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(source) => Err(ContentError::Read { path, source }),
    }
}
