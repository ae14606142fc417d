//! Error types for stub assembly.

use thiserror::Error;

use super::RoleKind;
use crate::msgbuf::LayoutError;

/// Errors raised while assembling a stub plan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("Role '{role}' is bound to an interface, not to operation '{operation}'")]
    InterfaceBound { role: RoleKind, operation: String },

    #[error("Role '{role}' is bound to an operation, not to interface '{interface}'")]
    OperationBound { role: RoleKind, interface: String },

    #[error(transparent)]
    Layout(#[from] LayoutError),
}
