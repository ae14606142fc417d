//! Leveled logging for the layout engine.
//!
//! Every macro funnels into `stub_event!`, which becomes a `tracing` event
//! under the `logging` feature and expands to nothing without it. Fields
//! only referenced by log calls are therefore unused in the default build;
//! functions that log such fields carry
//! `#[cfg_attr(not(feature = "logging"), allow(unused_variables))]`.
//!
//! ```rust,ignore
//! use crate::logging::{debug, trace};
//!
//! debug!(operation = %op.name, kind = %kind, "built message struct");
//! trace!(operation = %op.name, "reusing frozen struct");
//! ```

#[cfg(feature = "logging")]
macro_rules! stub_event {
    ($level:ident, $($arg:tt)*) => {
        tracing::event!(tracing::Level::$level, $($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! stub_event {
    ($level:ident, $($arg:tt)*) => {};
}

/// Struct reuse and other per-request detail.
macro_rules! stub_trace {
    ($($arg:tt)*) => { $crate::logging::stub_event!(TRACE, $($arg)*) };
}

/// One line per built struct, assembled stub or dispatch entry.
macro_rules! stub_debug {
    ($($arg:tt)*) => { $crate::logging::stub_event!(DEBUG, $($arg)*) };
}

/// Recoverable problems, such as an ignored opcode collision.
macro_rules! stub_warn {
    ($($arg:tt)*) => { $crate::logging::stub_event!(WARN, $($arg)*) };
}

/// Failures about to be returned to the caller.
macro_rules! stub_error {
    ($($arg:tt)*) => { $crate::logging::stub_event!(ERROR, $($arg)*) };
}

pub(crate) use stub_debug as debug;
pub(crate) use stub_error as error;
pub(crate) use stub_event;
pub(crate) use stub_trace as trace;
pub(crate) use stub_warn as warn;
