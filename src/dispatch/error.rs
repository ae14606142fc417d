//! Error types for dispatch table construction.

use thiserror::Error;

use crate::model::{DispatchKey, ModelError};
use crate::role::RoleError;

/// Errors raised while building a dispatch table.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(
        "Opcode {key} of '{interface}::{operation}' collides with '{existing_interface}::{existing_operation}'"
    )]
    DuplicateOpcode {
        interface: String,
        operation: String,
        existing_interface: String,
        existing_operation: String,
        key: DispatchKey,
    },

    #[error("Cannot dispatch '{interface}::{operation}': {source}")]
    Candidate {
        interface: String,
        operation: String,
        #[source]
        source: RoleError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),

    /// Interface-level assembly failed (class buffer or dispatch stub).
    #[error(transparent)]
    Assembly(#[from] RoleError),
}

impl DispatchError {
    /// Returns `true` for an opcode collision.
    pub fn is_duplicate_opcode(&self) -> bool {
        matches!(self, Self::DuplicateOpcode { .. })
    }

    /// The operation the error is about, if it concerns a single candidate.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::DuplicateOpcode { operation, .. } | Self::Candidate { operation, .. } => {
                Some(operation)
            }
            Self::Model(_) | Self::Assembly(_) => None,
        }
    }
}
