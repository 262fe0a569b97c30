//! JSON fetching for init sources and application config.
//!
//! The orchestrator only ever needs "give me the JSON at this URL", so the
//! network boundary is the small [`JsonFetcher`] trait. [`HttpJsonFetcher`]
//! serves `http(s)://` through reqwest and `file://` URLs or bare paths
//! through `tokio::fs`. Tests plug in [`StaticFetcher`].
//!
//! Bodies are read as JSON5, so init files and configs may carry comments,
//! trailing commas and unquoted keys.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::loader::BoxFuture;

/// Default request timeout in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur while fetching JSON.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be built or sent.
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Reading a local file failed.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The body was not valid JSON5.
    #[error("Invalid JSON from {url}: {message}")]
    Parse { url: String, message: String },

    /// No response is registered for the URL.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Source of JSON documents.
pub trait JsonFetcher: Send + Sync {
    /// Fetches and parses the JSON document at `url`.
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>>;
}

/// Fetcher backed by reqwest and the local filesystem.
pub struct HttpJsonFetcher {
    client: reqwest::Client,
}

impl HttpJsonFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT_SECS)
    }

    /// Creates a fetcher with a custom timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }
}

enum Location {
    Remote(String),
    Local(PathBuf),
}

fn locate(url: &str) -> Location {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
            Location::Remote(url.to_string())
        }
        Ok(parsed) if parsed.scheme() == "file" => match parsed.to_file_path() {
            Ok(path) => Location::Local(path),
            Err(()) => Location::Local(PathBuf::from(parsed.path())),
        },
        _ => Location::Local(PathBuf::from(url)),
    }
}

/// Parses a JSON5 body. Strict JSON takes the serde_json path first.
fn parse_body(url: &str, bytes: &[u8]) -> Result<Value, FetchError> {
    if let Ok(value) = serde_json::from_slice(bytes) {
        return Ok(value);
    }
    let parse_error = |message: String| FetchError::Parse {
        url: url.to_string(),
        message,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| parse_error(e.to_string()))?;
    json5::from_str(text).map_err(|e| parse_error(e.to_string()))
}

impl JsonFetcher for HttpJsonFetcher {
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
        let client = self.client.clone();
        let url = url.to_string();
        Box::pin(async move {
            match locate(&url) {
                Location::Remote(remote) => {
                    debug!(url = %remote, "Fetching JSON");
                    let response =
                        client
                            .get(&remote)
                            .send()
                            .await
                            .map_err(|e| FetchError::Request {
                                url: remote.clone(),
                                message: e.to_string(),
                            })?;
                    if !response.status().is_success() {
                        return Err(FetchError::Status {
                            url: remote,
                            status: response.status().as_u16(),
                        });
                    }
                    let bytes = response.bytes().await.map_err(|e| FetchError::Request {
                        url: remote.clone(),
                        message: format!("Failed to read response: {}", e),
                    })?;
                    parse_body(&remote, &bytes)
                }
                Location::Local(path) => {
                    debug!(path = %path.display(), "Reading JSON file");
                    let bytes = tokio::fs::read(&path).await.map_err(|source| FetchError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                    parse_body(&url, &bytes)
                }
            }
        })
    }
}

/// In-memory fetcher answering from a fixed URL → JSON table.
#[derive(Default)]
pub struct StaticFetcher {
    responses: RwLock<HashMap<String, Value>>,
}

impl StaticFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the document returned for `url`.
    pub fn insert(&self, url: impl Into<String>, value: Value) {
        self.responses.write().insert(url.into(), value);
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(self, url: impl Into<String>, value: Value) -> Self {
        self.insert(url, value);
        self
    }
}

impl JsonFetcher for StaticFetcher {
    fn fetch_json(&self, url: &str) -> BoxFuture<'static, Result<Value, FetchError>> {
        let result = self
            .responses
            .read()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()));
        Box::pin(async move { result })
    }
}
