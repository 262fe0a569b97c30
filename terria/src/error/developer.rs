//! Programming-contract violations.

use thiserror::Error;

/// Errors caused by incorrect use of the model API.
///
/// These are never expected in correct calling code and are not meant to be
/// shown to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeveloperError {
    /// The operation requires a model with a `uniqueId`.
    #[error("A model without a `uniqueId` cannot be {operation}")]
    MissingUniqueId { operation: &'static str },

    /// A model with the same id is already registered.
    #[error("A model with the ID `{0}` already exists")]
    DuplicateModel(String),

    /// An index outside the valid range was supplied.
    #[error("Invalid 'newIndex' target: {index} (length {len})")]
    InvalidIndex { index: usize, len: usize },

    /// The member is not part of the group.
    #[error("A model couldn't be found in the group {group} for member uniqueId {member}")]
    MemberNotFound { group: String, member: String },
}
