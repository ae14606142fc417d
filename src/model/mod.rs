//! Read-only interface model consumed by the layout engine.
//!
//! The IDL front end is external; this module holds what it produces
//! (interfaces, operations, parameters and their attributes) together with
//! validation, serialized loading and opcode assignment.
//!
//! # Module Organization
//!
//! - [`types`]: Parameter-level types
//! - [`interface`]: Operations, interfaces and the owning [`Module`]
//! - [`opcode`]: Interface numbers, function ids and dispatch keys
//! - [`names`]: Symbolic opcode constant names

mod error;
pub mod interface;
pub mod names;
pub mod opcode;
pub mod types;

pub use error::ModelError;
pub use interface::{
    Interface, InterfaceAttributes, Module, Operation, OperationAttributes, UuidRange,
};
pub use names::{DefaultNameProvider, NameProvider};
pub use opcode::{DispatchKey, Opcode, OpcodeAssigner};
pub use types::{ArrayBound, ElementType, ImplicitParam, ParamAttributes, Parameter};
