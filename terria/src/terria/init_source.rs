//! Where init data comes from.

use std::fmt;

use futures::future::{FutureExt, Shared};
use serde_json::{Map, Value};
use url::Url;

use crate::error::{ErrorOverrides, ErrorText, TerriaError};
use crate::fetch::JsonFetcher;
use crate::loader::BoxFuture;

/// Init data supplied later by some other task.
pub type DeferredInitData = Shared<BoxFuture<'static, Result<Value, TerriaError>>>;

/// One way of obtaining an init-data document.
#[derive(Clone)]
pub enum InitSourceKind {
    /// A JSON document to fetch.
    Url(String),
    /// Inline JSON.
    Data(Value),
    /// JSON produced by a future.
    Deferred(DeferredInitData),
    /// Alternatives tried in order until one yields a document.
    Options(Vec<InitSourceKind>),
}

impl fmt::Debug for InitSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => f.debug_tuple("Url").field(url).finish(),
            Self::Data(_) => f.write_str("Data(..)"),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
            Self::Options(options) => f.debug_tuple("Options").field(options).finish(),
        }
    }
}

/// A named source of init data.
#[derive(Debug, Clone)]
pub struct InitSource {
    pub name: Option<String>,
    pub kind: InitSourceKind,
}

impl InitSource {
    pub fn url(name: impl Into<Option<String>>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: InitSourceKind::Url(url.into()),
        }
    }

    pub fn data(name: impl Into<Option<String>>, data: Value) -> Self {
        Self {
            name: name.into(),
            kind: InitSourceKind::Data(data),
        }
    }

    /// A source resolved from `future` the first time it is loaded.
    pub fn deferred<F>(name: impl Into<Option<String>>, future: F) -> Self
    where
        F: std::future::Future<Output = Result<Value, TerriaError>> + Send + 'static,
    {
        let future: BoxFuture<'static, Result<Value, TerriaError>> = Box::pin(future);
        Self {
            name: name.into(),
            kind: InitSourceKind::Deferred(future.shared()),
        }
    }

    pub fn options(name: impl Into<Option<String>>, options: Vec<InitSourceKind>) -> Self {
        Self {
            name: name.into(),
            kind: InitSourceKind::Options(options),
        }
    }

    /// Name used in error messages.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown source")
    }
}

/// Resolves a source to its JSON object.
///
/// Non-object documents resolve to `None`. For options, the first
/// alternative yielding a document wins; an error is returned only if none
/// did and at least one failed.
pub(crate) fn load_init_source<'a>(
    kind: &'a InitSourceKind,
    fetcher: &'a dyn JsonFetcher,
) -> BoxFuture<'a, Result<Option<Map<String, Value>>, TerriaError>> {
    Box::pin(async move {
        let json = match kind {
            InitSourceKind::Url(url) => fetcher.fetch_json(url).await.map_err(|e| {
                TerriaError::from_error(
                    e,
                    ErrorOverrides::new().message(ErrorText::key_with(
                        "models.terria.loadingInitJsonMessage",
                        [("url", url.as_str())],
                    )),
                )
            })?,
            InitSourceKind::Options(options) => {
                let mut error = None;
                for option in options {
                    match load_init_source(option, fetcher).await {
                        Ok(Some(json)) => return Ok(Some(json)),
                        Ok(None) => {}
                        Err(e) => error = Some(e),
                    }
                }
                return match error {
                    Some(error) => Err(error),
                    None => Ok(None),
                };
            }
            InitSourceKind::Data(data) => data.clone(),
            InitSourceKind::Deferred(future) => future.clone().await?,
        };

        Ok(match json {
            Value::Object(object) => Some(object),
            _ => None,
        })
    })
}

/// Builds the source for an init URL from config or the URL hash.
///
/// Names ending in `.json` resolve against `base`. Anything else is looked
/// up as `<name>.json` in each init fragment path, in order.
pub fn generate_initialization_url(
    base: &Url,
    init_fragment_paths: &[String],
    url: &str,
) -> InitSourceKind {
    if url.to_lowercase().ends_with(".json") {
        let resolved = base
            .join(url)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string());
        return InitSourceKind::Url(resolved);
    }

    InitSourceKind::Options(
        init_fragment_paths
            .iter()
            .map(|fragment_path| {
                let mut path = fragment_path.clone();
                if !path.is_empty() && !path.ends_with('/') {
                    path.push('/');
                }
                let relative = format!("{}{}.json", path, url);
                let resolved = base
                    .join(&relative)
                    .map(|u| u.to_string())
                    .unwrap_or(relative);
                InitSourceKind::Url(resolved)
            })
            .collect(),
    )
}
