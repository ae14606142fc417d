//! Unified error type for the ipc-stubgen library.
//!
//! Each module reports its own error enum; [`Error`] wraps all of them so
//! application code can use a single type.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::model::ModelError;
use crate::msgbuf::LayoutError;
use crate::role::RoleError;

/// Unified error type for all ipc-stubgen operations.
///
/// # Example
///
/// ```ignore
/// use ipc_stubgen::prelude::*;
///
/// fn load(path: &str) -> Result<Module> {
///     let module = Module::from_file(path)?;
///     Ok(module)
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// Interface model loading or validation failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// A message struct could not be laid out.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// A stub plan could not be assembled.
    #[error(transparent)]
    Role(#[from] RoleError),

    /// A dispatch table could not be built.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Configuration loading failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// A [`Result`] type alias using the unified [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns `true` if this is a model error.
    pub fn is_model(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Returns `true` if this is a layout error, directly or inside a stub
    /// assembly failure.
    pub fn is_layout(&self) -> bool {
        matches!(self, Self::Layout(_) | Self::Role(RoleError::Layout(_)))
    }

    /// Returns `true` if this is a dispatch table error.
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }

    /// Returns `true` if this is a configuration error.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
