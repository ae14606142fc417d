//! Error types for interface model loading and validation.

use thiserror::Error;

/// Errors raised while loading or validating an interface model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read model file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse model: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Interface '{0}' is not defined")]
    UnknownInterface(String),

    #[error("Interface '{interface}' has no operation '{operation}'")]
    UnknownOperation { interface: String, operation: String },

    #[error("Interface '{interface}' derives from undefined interface '{base}'")]
    UnknownBase { interface: String, base: String },

    #[error("Interface '{0}' is part of an inheritance cycle")]
    InheritanceCycle(String),

    #[error("Interface '{0}' is defined more than once")]
    DuplicateInterface(String),

    #[error("Interface '{interface}' declares operation '{operation}' more than once")]
    DuplicateOperation { interface: String, operation: String },

    #[error("Operation '{operation}' declares parameter '{parameter}' more than once")]
    DuplicateParameter { operation: String, parameter: String },

    #[error("Interface number {number} of '{interface}' does not fit when shifted by {bits} bits")]
    OpcodeOverflow {
        interface: String,
        number: u64,
        bits: u32,
    },

    #[error("Function id {function_id} of '{interface}::{operation}' does not fit below {bits} interface-number bits")]
    FunctionIdOverflow {
        interface: String,
        operation: String,
        function_id: u64,
        bits: u32,
    },

    #[error("Interface '{0}' ran out of interface numbers or function ids")]
    IdSpaceExhausted(String),

    #[error("Operation '{operation}' has an empty uuid range {lo}..={hi}")]
    EmptyUuidRange { operation: String, lo: u64, hi: u64 },
}
