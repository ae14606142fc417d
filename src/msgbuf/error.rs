//! Error types for message struct construction.

use thiserror::Error;

use super::kind::StructKind;

/// Errors raised while building or reusing a message struct.
///
/// Construction is all-or-nothing: when one of these is returned no struct
/// was recorded for the request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error(
        "Operation '{operation}': parameter '{parameter}' is bounded by '{target}', which is not a parameter of the operation"
    )]
    UnresolvedSizeTarget {
        operation: String,
        parameter: String,
        target: String,
    },

    #[error(
        "Operation '{operation}': parameter '{parameter}' has no maximum bound and the platform provides no default"
    )]
    UnboundedVariableMember { operation: String, parameter: String },

    #[error("Operation '{operation}': {kind} struct is already laid out and {reason}")]
    LayoutFrozenConflict {
        operation: String,
        kind: StructKind,
        reason: String,
    },

    #[error("Operation '{operation}': {reason}")]
    UnsupportedAttributeCombination {
        operation: String,
        parameter: Option<String>,
        reason: String,
    },

    #[error("Operation '{operation}': the {kind} sentinel is not a struct kind")]
    InvalidStructKind { operation: String, kind: StructKind },
}

impl LayoutError {
    /// The operation the error was raised for.
    pub fn operation(&self) -> &str {
        match self {
            LayoutError::UnresolvedSizeTarget { operation, .. }
            | LayoutError::UnboundedVariableMember { operation, .. }
            | LayoutError::LayoutFrozenConflict { operation, .. }
            | LayoutError::UnsupportedAttributeCombination { operation, .. }
            | LayoutError::InvalidStructKind { operation, .. } => operation,
        }
    }
}
