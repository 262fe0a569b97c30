//! Error types.
//!
//! - [`TerriaError`]: the user-facing error tree with lazily resolved text.
//! - [`DeveloperError`]: contract violations returned synchronously.
//! - [`Outcome`]: a value paired with an optional `TerriaError`.

mod developer;
mod outcome;
mod terria_error;
mod text;

pub use developer::DeveloperError;
pub use outcome::Outcome;
pub use terria_error::{
    ErrorCause, ErrorOverrides, ErrorSource, Notification, TerriaError, TerriaErrorOptions,
};
pub use text::{DefaultTranslations, ErrorText, TextFn, Translator};
