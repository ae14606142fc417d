//! Convenient re-exports for common usage patterns.
//!
//! This module provides a single import to bring all commonly used types
//! into scope.
//!
//! # Example
//!
//! ```ignore
//! use ipc_stubgen::prelude::*;
//!
//! let module = Module::from_file("calc.toml")?;
//! let config = CompilationConfig::from_file("stubgen.toml")?;
//! let sizes = config.sizes();
//! let names = DefaultNameProvider;
//! let assembler = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
//! let table = DispatchTableBuilder::new(&module, &assembler)
//!     .build("calc", &mut BufferRegistry::new())?;
//! ```

// Unified error handling
pub use crate::error::{Error, Result};

// Configuration and platform
pub use crate::config::{CompilationConfig, ConfigError, PlatformHooks};
pub use crate::sizing::{Arch, Platform, PlatformSizes, SizingProvider};

// Interface model
pub use crate::model::{
    ArrayBound, DefaultNameProvider, DispatchKey, ElementType, Interface, ModelError, Module,
    NameProvider, Opcode, OpcodeAssigner, Operation, Parameter,
};

// Message structs
pub use crate::msgbuf::{
    BufferRegistry, ClassBuffer, LayoutError, MemberKind, MessageBufferModel, MessageStruct,
    MsgSizeSummary, StructKind, StructLayoutBuilder, StructMember, StructRequest,
};

// Roles and dispatch
pub use crate::dispatch::{DispatchError, DispatchTable, DispatchTableBuilder};
pub use crate::role::{
    Decision, MarshalDirectionPolicy, Phase, RoleError, RoleKind, Side, StubAssembler, StubPlan,
};
