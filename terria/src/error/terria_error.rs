//! The `TerriaError` tree.
//!
//! A `TerriaError` is a cheap, clonable handle to an immutable error node.
//! Nodes form a tree through their `original_error` causes, which lets a
//! failure be wrapped with more context at every layer it passes through
//! while still keeping the leaf errors for diagnostics.
//!
//! ```text
//!  combine([...], "Error loading initialisation sources")
//!   ├── "Failed to load initialisation source: init.json"
//!   │    └── "An error occurred while loading initialisation data from ..."
//!   │         └── reqwest::Error (not a TerriaError, skipped by flatten)
//!   └── "Failed to load model `a`"
//! ```
//!
//! The only mutable part of a node is `raised_to_user`. Setting it writes
//! through to every `TerriaError` below the node so that a failure reported
//! once is never reported again through another wrapping layer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::text::{ErrorText, Translator};
use super::DeveloperError;
use crate::fetch::FetchError;

const DEFAULT_TITLE_KEY: &str = "core.terriaError.defaultTitle";
const DEFAULT_COMBINE_TITLE_KEY: &str = "core.terriaError.defaultCombineTitle";
const DEFAULT_COMBINE_MESSAGE_KEY: &str = "core.terriaError.defaultCombineMessage";

/// A child of a `TerriaError` node.
#[derive(Clone, Debug)]
pub enum ErrorCause {
    /// A nested `TerriaError`, part of the tree proper.
    Terria(TerriaError),
    /// Any other error kept for diagnostics.
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl From<TerriaError> for ErrorCause {
    fn from(error: TerriaError) -> Self {
        ErrorCause::Terria(error)
    }
}

/// Values that can be normalised into a `TerriaError` by [`TerriaError::from_error`].
#[derive(Clone, Debug)]
pub enum ErrorSource {
    /// Already a `TerriaError`.
    Terria(TerriaError),
    /// Some other error type.
    Error(Arc<dyn std::error::Error + Send + Sync>),
    /// A bare message.
    Message(String),
    /// Nothing useful could be extracted.
    Unknown,
}

impl ErrorSource {
    /// Wraps an arbitrary error value.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ErrorSource::Error(Arc::new(error))
    }
}

impl From<TerriaError> for ErrorSource {
    fn from(error: TerriaError) -> Self {
        ErrorSource::Terria(error)
    }
}

impl From<String> for ErrorSource {
    fn from(message: String) -> Self {
        ErrorSource::Message(message)
    }
}

impl From<&str> for ErrorSource {
    fn from(message: &str) -> Self {
        ErrorSource::Message(message.to_string())
    }
}

impl From<DeveloperError> for ErrorSource {
    fn from(error: DeveloperError) -> Self {
        ErrorSource::error(error)
    }
}

impl From<FetchError> for ErrorSource {
    fn from(error: FetchError) -> Self {
        ErrorSource::error(error)
    }
}

impl From<serde_json::Error> for ErrorSource {
    fn from(error: serde_json::Error) -> Self {
        ErrorSource::error(error)
    }
}

impl From<std::io::Error> for ErrorSource {
    fn from(error: std::io::Error) -> Self {
        ErrorSource::error(error)
    }
}

/// Options applied on top of a new or cloned error.
///
/// A plain string converts into overrides that only set the message.
#[derive(Clone, Debug, Default)]
pub struct ErrorOverrides {
    pub message: Option<ErrorText>,
    pub title: Option<ErrorText>,
    pub sender: Option<String>,
    pub raised_to_user: Option<bool>,
    pub original_error: Option<Vec<ErrorCause>>,
}

impl ErrorOverrides {
    /// Creates empty overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the message.
    pub fn message(mut self, message: impl Into<ErrorText>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the title.
    pub fn title(mut self, title: impl Into<ErrorText>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the sender description.
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Sets the `raised_to_user` flag.
    pub fn raised_to_user(mut self, raised: bool) -> Self {
        self.raised_to_user = Some(raised);
        self
    }
}

impl From<&str> for ErrorOverrides {
    fn from(message: &str) -> Self {
        ErrorOverrides::new().message(message)
    }
}

impl From<String> for ErrorOverrides {
    fn from(message: String) -> Self {
        ErrorOverrides::new().message(message)
    }
}

impl From<ErrorText> for ErrorOverrides {
    fn from(message: ErrorText) -> Self {
        ErrorOverrides::new().message(message)
    }
}

/// Options for constructing a new `TerriaError`.
#[derive(Clone, Debug)]
pub struct TerriaErrorOptions {
    pub message: ErrorText,
    pub title: Option<ErrorText>,
    pub sender: Option<String>,
    pub raised_to_user: bool,
    pub original_error: Vec<ErrorCause>,
}

impl TerriaErrorOptions {
    /// Creates options with only a message set.
    pub fn new(message: impl Into<ErrorText>) -> Self {
        Self {
            message: message.into(),
            title: None,
            sender: None,
            raised_to_user: false,
            original_error: Vec::new(),
        }
    }

    fn apply(mut self, overrides: ErrorOverrides) -> Self {
        if let Some(message) = overrides.message {
            self.message = message;
        }
        if let Some(title) = overrides.title {
            self.title = Some(title);
        }
        if overrides.sender.is_some() {
            self.sender = overrides.sender;
        }
        if let Some(raised) = overrides.raised_to_user {
            self.raised_to_user = raised;
        }
        if let Some(original) = overrides.original_error {
            self.original_error = original;
        }
        self
    }
}

struct ErrorNode {
    message: ErrorText,
    title: ErrorText,
    sender: Option<String>,
    raised_to_user: AtomicBool,
    original_error: Vec<ErrorCause>,
}

/// A user-facing error, possibly wrapping a tree of underlying causes.
#[derive(Clone)]
pub struct TerriaError {
    node: Arc<ErrorNode>,
}

impl TerriaError {
    /// Creates a new error node.
    pub fn new(options: TerriaErrorOptions) -> Self {
        Self {
            node: Arc::new(ErrorNode {
                message: options.message,
                title: options
                    .title
                    .unwrap_or_else(|| ErrorText::key(DEFAULT_TITLE_KEY)),
                sender: options.sender,
                raised_to_user: AtomicBool::new(options.raised_to_user),
                original_error: options.original_error,
            }),
        }
    }

    /// Creates an error with a literal title and message.
    pub fn with_title(title: impl Into<ErrorText>, message: impl Into<ErrorText>) -> Self {
        let mut options = TerriaErrorOptions::new(message);
        options.title = Some(title.into());
        Self::new(options)
    }

    /// Normalises any error value into a `TerriaError`.
    ///
    /// An existing `TerriaError` is returned unchanged when no overrides are
    /// given, otherwise it becomes the single child of a new parent carrying
    /// the overrides. Anything else becomes a fresh node with the default
    /// title; a string override is used as the message in preference to the
    /// message extracted from the error.
    pub fn from_error(
        error: impl Into<ErrorSource>,
        overrides: impl Into<Option<ErrorOverrides>>,
    ) -> Self {
        let overrides = overrides.into();
        let (message, original_error) = match error.into() {
            ErrorSource::Terria(error) => {
                return match overrides {
                    Some(overrides) => error.create_parent_error(overrides),
                    None => error,
                };
            }
            ErrorSource::Error(error) => {
                let message = error.to_string();
                (message, vec![ErrorCause::Other(error)])
            }
            ErrorSource::Message(message) => (message, Vec::new()),
            ErrorSource::Unknown => ("Unknown error".to_string(), Vec::new()),
        };

        let mut options = TerriaErrorOptions::new(message);
        options.title = Some(ErrorText::key(DEFAULT_TITLE_KEY));
        options.original_error = original_error;
        Self::new(match overrides {
            Some(overrides) => options.apply(overrides),
            None => options,
        })
    }

    /// Combines sibling errors under a new parent.
    ///
    /// Returns `None` for an empty list.
    pub fn combine(errors: Vec<TerriaError>, overrides: impl Into<ErrorOverrides>) -> Option<Self> {
        if errors.is_empty() {
            return None;
        }
        let mut options = TerriaErrorOptions::new(ErrorText::key(DEFAULT_COMBINE_MESSAGE_KEY));
        options.title = Some(ErrorText::key(DEFAULT_COMBINE_TITLE_KEY));
        options.original_error = errors.into_iter().map(ErrorCause::Terria).collect();
        Some(Self::new(options.apply(overrides.into())))
    }

    /// Creates a parent error whose only child is `self`.
    ///
    /// The parent starts as a copy of this node's message, title, sender and
    /// `raised_to_user` flag, then `overrides` are applied.
    pub fn create_parent_error(&self, overrides: impl Into<ErrorOverrides>) -> Self {
        let options = TerriaErrorOptions {
            message: self.node.message.clone(),
            title: Some(self.node.title.clone()),
            sender: self.node.sender.clone(),
            raised_to_user: self.raised_to_user(),
            original_error: vec![ErrorCause::Terria(self.clone())],
        };
        Self::new(options.apply(overrides.into()))
    }

    /// The resolved message.
    pub fn message(&self) -> String {
        self.node.message.resolve()
    }

    /// The resolved title.
    pub fn title(&self) -> String {
        self.node.title.resolve()
    }

    /// The message resolved through `translator`.
    pub fn message_with(&self, translator: &dyn Translator) -> String {
        self.node.message.resolve_with(translator)
    }

    /// The title resolved through `translator`.
    pub fn title_with(&self, translator: &dyn Translator) -> String {
        self.node.title.resolve_with(translator)
    }

    /// Description of whatever raised the error.
    pub fn sender(&self) -> Option<&str> {
        self.node.sender.as_deref()
    }

    /// Direct causes of this error.
    pub fn original_error(&self) -> &[ErrorCause] {
        &self.node.original_error
    }

    /// True once the error has been shown to the user.
    pub fn raised_to_user(&self) -> bool {
        self.node.raised_to_user.load(Ordering::SeqCst)
    }

    /// Sets `raised_to_user` on this node and every `TerriaError` below it.
    pub fn set_raised_to_user(&self, raised: bool) {
        self.node.raised_to_user.store(raised, Ordering::SeqCst);
        for cause in &self.node.original_error {
            if let ErrorCause::Terria(child) = cause {
                child.set_raised_to_user(raised);
            }
        }
    }

    /// Pre-order list of this node and every nested `TerriaError`.
    pub fn flatten(&self) -> Vec<TerriaError> {
        let mut out = vec![self.clone()];
        for cause in &self.node.original_error {
            if let ErrorCause::Terria(child) = cause {
                out.extend(child.flatten());
            }
        }
        out
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &TerriaError) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }

    /// Renders the error tree as indented text.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        self.write_summary(&mut out, 0);
        out
    }

    fn write_summary(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        out.push_str(&format!("{}- {}: {}\n", indent, self.title(), self.message()));
        for cause in &self.node.original_error {
            match cause {
                ErrorCause::Terria(child) => child.write_summary(out, depth + 1),
                ErrorCause::Other(error) => {
                    out.push_str(&format!("{}  - {}\n", indent, error));
                }
            }
        }
    }

    /// Converts the error into a notification for display.
    pub fn to_notification(&self) -> Notification {
        Notification {
            title: self.title(),
            message: self.summary(),
        }
    }
}

/// A message ready to be shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}

impl fmt::Debug for TerriaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerriaError")
            .field("title", &self.node.title)
            .field("message", &self.node.message)
            .field("sender", &self.node.sender)
            .field("raised_to_user", &self.raised_to_user())
            .field("original_error", &self.node.original_error)
            .finish()
    }
}

impl fmt::Display for TerriaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

impl std::error::Error for TerriaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.node.original_error.first()? {
            ErrorCause::Terria(child) => Some(child),
            ErrorCause::Other(error) => Some(error.as_ref()),
        }
    }
}

impl From<DeveloperError> for TerriaError {
    fn from(error: DeveloperError) -> Self {
        TerriaError::from_error(error, None)
    }
}

impl From<FetchError> for TerriaError {
    fn from(error: FetchError) -> Self {
        TerriaError::from_error(error, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(message: &str) -> TerriaError {
        TerriaError::new(TerriaErrorOptions::new(message))
    }

    #[test]
    fn test_combine_empty_is_none() {
        assert!(TerriaError::combine(Vec::new(), "anything").is_none());
        assert!(TerriaError::combine(Vec::new(), ErrorOverrides::new()).is_none());
    }

    #[test]
    fn test_combine_wraps_all_errors() {
        let a = leaf("a");
        let b = leaf("b");
        let combined = TerriaError::combine(vec![a.clone(), b.clone()], "two things failed").unwrap();

        assert_eq!(combined.message(), "two things failed");
        assert_eq!(combined.title(), "Multiple errors occurred");
        assert_eq!(combined.original_error().len(), 2);

        let flat = combined.flatten();
        assert_eq!(flat.len(), 3);
        assert!(flat[1].ptr_eq(&a));
        assert!(flat[2].ptr_eq(&b));
    }

    #[test]
    fn test_raised_to_user_propagates_to_children() {
        let child = leaf("child");
        let grandchild = leaf("grandchild");
        let middle = TerriaError::combine(vec![grandchild.clone()], "middle").unwrap();
        let parent = TerriaError::combine(vec![child.clone(), middle.clone()], "parent").unwrap();

        parent.set_raised_to_user(true);

        assert!(parent.raised_to_user());
        assert!(child.raised_to_user());
        assert!(middle.raised_to_user());
        assert!(grandchild.raised_to_user());
    }

    #[test]
    fn test_raised_to_user_does_not_propagate_upwards() {
        let child = leaf("child");
        let parent = child.create_parent_error("parent");
        child.set_raised_to_user(true);
        assert!(!parent.raised_to_user());
    }

    #[test]
    fn test_from_terria_error_without_overrides_is_identity() {
        let original = leaf("original");
        let same = TerriaError::from_error(original.clone(), None);
        assert!(same.ptr_eq(&original));
    }

    #[test]
    fn test_from_terria_error_with_overrides_wraps() {
        let original = leaf("original");
        original.set_raised_to_user(true);
        let wrapped = TerriaError::from_error(original.clone(), ErrorOverrides::from("context"));

        assert!(!wrapped.ptr_eq(&original));
        assert_eq!(wrapped.message(), "context");
        assert!(wrapped.raised_to_user());
        match &wrapped.original_error()[0] {
            ErrorCause::Terria(child) => assert!(child.ptr_eq(&original)),
            other => panic!("unexpected cause {:?}", other),
        }
    }

    #[test]
    fn test_from_message() {
        let error = TerriaError::from_error("plain failure", None);
        assert_eq!(error.message(), "plain failure");
        assert_eq!(error.title(), "An error occurred");
        assert!(error.original_error().is_empty());
    }

    #[test]
    fn test_from_unknown() {
        let error = TerriaError::from_error(ErrorSource::Unknown, None);
        assert_eq!(error.message(), "Unknown error");
    }

    #[test]
    fn test_from_std_error_keeps_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let error = TerriaError::from_error(io, None);
        assert_eq!(error.message(), "missing file");
        assert!(matches!(error.original_error()[0], ErrorCause::Other(_)));
        // Non-TerriaError causes are not part of the flattened tree.
        assert_eq!(error.flatten().len(), 1);
    }

    #[test]
    fn test_from_std_error_string_override_replaces_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "low level");
        let error = TerriaError::from_error(io, ErrorOverrides::from("high level"));
        assert_eq!(error.message(), "high level");
        assert_eq!(error.original_error().len(), 1);
    }

    #[test]
    fn test_create_parent_error_copies_defaults() {
        let child = TerriaError::new(TerriaErrorOptions {
            message: "child message".into(),
            title: Some("child title".into()),
            sender: Some("model-a".to_string()),
            raised_to_user: false,
            original_error: Vec::new(),
        });
        let parent = child.create_parent_error(ErrorOverrides::new());
        assert_eq!(parent.message(), "child message");
        assert_eq!(parent.title(), "child title");
        assert_eq!(parent.sender(), Some("model-a"));

        let parent = child.create_parent_error("Failed to load container g");
        assert_eq!(parent.message(), "Failed to load container g");
        assert_eq!(parent.title(), "child title");
    }

    #[test]
    fn test_flatten_is_pre_order() {
        let a = leaf("a");
        let b = leaf("b");
        let c = leaf("c");
        let ab = TerriaError::combine(vec![a.clone(), b.clone()], "ab").unwrap();
        let root = TerriaError::combine(vec![ab.clone(), c.clone()], "root").unwrap();

        let messages: Vec<String> = root.flatten().iter().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["root", "ab", "a", "b", "c"]);
    }

    #[test]
    fn test_summary_lists_tree() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "socket closed");
        let leaf = TerriaError::from_error(io, ErrorOverrides::from("fetch failed"));
        let root = TerriaError::combine(vec![leaf], "load failed").unwrap();
        let summary = root.summary();
        assert!(summary.contains("load failed"));
        assert!(summary.contains("  - An error occurred: fetch failed"));
        assert!(summary.contains("socket closed"));
    }

    #[test]
    fn test_display() {
        let error = TerriaError::with_title("Title", "Message");
        assert_eq!(error.to_string(), "Title: Message");
    }
}
