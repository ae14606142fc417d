//! Message-layout and marshalling-direction engine for an IDL-to-stub
//! compiler targeting microkernel IPC.
//!
//! Given a parsed interface description, this library decides for every
//! operation and every stub role (a) the byte layout of the message
//! structs carrying its parameters and (b) which members each role writes
//! before sending and reads after receiving. It also builds the
//! server-side dispatch table of an interface and its bases.
//!
//! # Quick Start
//!
//! ```ignore
//! use ipc_stubgen::prelude::*;
//!
//! let module = Module::from_file("calc.toml")?;
//! let config = CompilationConfig::default();
//! let sizes = config.sizes();
//! let builder = StructLayoutBuilder::new(&sizes, &config);
//!
//! let (iface, op) = module.operation("calc", "add")?;
//! let input = builder.build(op, StructKind::In, Side::Client, false)?;
//! for member in input.members() {
//!     println!("{} @ {:?}", member.kind, member.offset);
//! }
//! ```
//!
//! # Modules
//!
//! - [`model`] - Interfaces, operations, parameters and opcode assignment
//! - [`sizing`] - Platform primitive sizes
//! - [`config`] - Compilation configuration and platform hooks
//! - [`msgbuf`] - Struct layout and the per-operation buffer model
//! - [`role`] - Stub roles, the direction policy and the stub assembler
//! - [`dispatch`] - Server dispatch tables
//!
//! # Feature Flags
//!
//! - `logging` - Enable library-level tracing (consumers provide their own subscriber)
//! - `cli` - Enable the command-line interface binary
//! - `full` - Enable all features

pub mod config;
pub mod dispatch;
mod logging;
pub mod model;
pub mod msgbuf;
pub mod prelude;
pub mod role;
pub mod sizing;

mod error;

// Re-export the unified error type
pub use error::{Error, Result};

pub use config::{CompilationConfig, ConfigError, PlatformHooks};
pub use dispatch::{DispatchError, DispatchTable, DispatchTableBuilder};
pub use model::{Interface, Module, ModelError, Operation, Parameter};
pub use msgbuf::{LayoutError, MessageBufferModel, MessageStruct, StructKind, StructLayoutBuilder};
pub use role::{MarshalDirectionPolicy, RoleError, RoleKind, Side, StubAssembler, StubPlan};
pub use sizing::{PlatformSizes, SizingProvider};
