//! Lazily resolved error text.
//!
//! Error messages and titles can be created before any translation catalogue
//! is available. They are stored as an [`ErrorText`] and only turned into a
//! `String` when somebody reads them.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Translation lookup used when resolving [`ErrorText::Key`] values.
pub trait Translator: Send + Sync {
    /// Returns the template for `key`, or `None` if the key is unknown.
    ///
    /// Templates use `{{name}}` placeholders which are filled from the
    /// parameters stored alongside the key.
    fn template(&self, key: &str) -> Option<String>;
}

/// The English catalogue for every key emitted by this crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTranslations;

impl Translator for DefaultTranslations {
    fn template(&self, key: &str) -> Option<String> {
        let text = match key {
            "core.terriaError.defaultTitle" => "An error occurred",
            "core.terriaError.defaultCombineTitle" => "Multiple errors occurred",
            "core.terriaError.defaultCombineMessage" => {
                "Multiple errors occurred. See the details below."
            }
            "models.catalog.idForMatchingErrorTitle" => "Missing property",
            "models.catalog.idForMatchingErrorMessage" => {
                "Model objects must have an `id`, `localId`, or `name` property."
            }
            "models.catalog.unsupportedTypeTitle" => "Unknown type",
            "models.catalog.unsupportedTypeMessage" => {
                "Could not create unknown model type `{{type}}`."
            }
            "models.terria.loadConfigErrorTitle" => "Failed to load Terria config",
            "models.terria.loadingInitJsonMessage" => {
                "An error occurred while loading initialisation data from {{url}}."
            }
            "models.terria.loadingInitSourceError2Message" => {
                "Failed to load initialisation source: {{loadSource}}"
            }
            "models.terria.loadingInitSourceErrorTitle" => {
                "An error occurred while applying initialisation data"
            }
            "models.terria.loadingInitSourcesErrorTitle" => {
                "Error loading initialisation sources"
            }
            "models.terria.loadingInitSourcesErrorMessage" => {
                "An error occurred while loading {{appName}}. If the problem persists, please contact {{email}}."
            }
            "models.terria.loadModelErrorMessage" => "Failed to load model `{{model}}`",
            "models.terria.loadingWorkbenchItemErrorTitle" => {
                "Error loading workbench item `{{name}}`"
            }
            "models.terria.parsingStartDataErrorMessage" => {
                "An error occurred while parsing start data from the URL."
            }
            "models.terria.processBaseMapsErrorMessage" => "Failed to process base maps",
            _ => return None,
        };
        Some(text.to_string())
    }
}

/// Deferred formatter producing an error text on demand.
pub type TextFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Text of an error message or title.
#[derive(Clone)]
pub enum ErrorText {
    /// Literal text.
    Plain(String),
    /// A translation key with template parameters.
    Key {
        key: String,
        parameters: BTreeMap<String, String>,
    },
    /// Text computed when it is first read.
    Deferred(TextFn),
}

impl ErrorText {
    /// Creates a translation key without parameters.
    pub fn key(key: impl Into<String>) -> Self {
        Self::Key {
            key: key.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Creates a translation key with parameters.
    pub fn key_with<K, V, I>(key: impl Into<String>, parameters: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Key {
            key: key.into(),
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Creates text from a closure evaluated on every read.
    pub fn deferred(f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        Self::Deferred(Arc::new(f))
    }

    /// Resolves the text using the built-in English catalogue.
    pub fn resolve(&self) -> String {
        self.resolve_with(&DefaultTranslations)
    }

    /// Resolves the text using `translator`, falling back to the built-in
    /// catalogue and finally to the raw key.
    pub fn resolve_with(&self, translator: &dyn Translator) -> String {
        match self {
            Self::Plain(text) => text.clone(),
            Self::Deferred(f) => f(),
            Self::Key { key, parameters } => {
                let template = translator
                    .template(key)
                    .or_else(|| DefaultTranslations.template(key))
                    .unwrap_or_else(|| key.clone());
                interpolate(&template, parameters)
            }
        }
    }
}

fn interpolate(template: &str, parameters: &BTreeMap<String, String>) -> String {
    let mut out = template.to_string();
    for (name, value) in parameters {
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}

impl fmt::Debug for ErrorText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(text) => f.debug_tuple("Plain").field(text).finish(),
            Self::Key { key, parameters } => f
                .debug_struct("Key")
                .field("key", key)
                .field("parameters", parameters)
                .finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for ErrorText {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

impl From<String> for ErrorText {
    fn from(text: String) -> Self {
        Self::Plain(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shouty;

    impl Translator for Shouty {
        fn template(&self, key: &str) -> Option<String> {
            (key == "models.terria.loadingInitSourcesErrorTitle").then(|| "LOAD FAILED".to_string())
        }
    }

    #[test]
    fn test_plain_text_resolves_verbatim() {
        assert_eq!(ErrorText::from("boom").resolve(), "boom");
    }

    #[test]
    fn test_key_interpolates_parameters() {
        let text = ErrorText::key_with(
            "models.terria.loadModelErrorMessage",
            [("model", "catalog/item")],
        );
        assert_eq!(text.resolve(), "Failed to load model `catalog/item`");
    }

    #[test]
    fn test_unknown_key_falls_back_to_key() {
        assert_eq!(ErrorText::key("no.such.key").resolve(), "no.such.key");
    }

    #[test]
    fn test_custom_translator_takes_precedence() {
        let text = ErrorText::key("models.terria.loadingInitSourcesErrorTitle");
        assert_eq!(text.resolve_with(&Shouty), "LOAD FAILED");
        assert_eq!(text.resolve(), "Error loading initialisation sources");
    }

    #[test]
    fn test_deferred_text_is_evaluated_on_read() {
        let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = Arc::clone(&counter);
        let text = ErrorText::deferred(move || {
            let n = c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            format!("read {}", n)
        });
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(text.resolve(), "read 0");
        assert_eq!(text.resolve(), "read 1");
    }
}
