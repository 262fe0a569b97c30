//! Values that may carry a non-fatal error.

use super::TerriaError;

/// A value together with an optional error.
///
/// Used where an operation can partially succeed: the value is always
/// available and the error describes whatever went wrong along the way.
#[must_use]
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    value: T,
    error: Option<TerriaError>,
}

impl<T> Outcome<T> {
    /// A value without an error.
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    /// A value with an optional error.
    pub fn new(value: T, error: Option<TerriaError>) -> Self {
        Self { value, error }
    }

    /// The error, if any.
    pub fn error(&self) -> Option<&TerriaError> {
        self.error.as_ref()
    }

    /// The value, regardless of the error.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Passes the error (if any) to `f` and returns the value.
    pub fn catch_error(self, f: impl FnOnce(TerriaError)) -> T {
        if let Some(error) = self.error {
            f(error);
        }
        self.value
    }

    /// Discards the error and returns the value.
    pub fn ignore_error(self) -> T {
        self.value
    }

    /// Returns the value, or the error if there is one.
    pub fn throw_if_error(self) -> Result<T, TerriaError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.value),
        }
    }

    /// Splits into value and error.
    pub fn into_parts(self) -> (T, Option<TerriaError>) {
        (self.value, self.error)
    }
}

impl<T: Default> Outcome<T> {
    /// A default value with an error.
    pub fn from_error(error: TerriaError) -> Self {
        Self {
            value: T::default(),
            error: Some(error),
        }
    }
}

impl Outcome<()> {
    /// No value and no error.
    pub fn none() -> Self {
        Self::ok(())
    }
}
