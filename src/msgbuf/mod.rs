//! Message struct layout.
//!
//! Turns an operation's parameter list into ordered, offset-assigned wire
//! structs and keeps them frozen once a role has used them.
//!
//! # Module Organization
//!
//! - [`kind`]: The struct kinds of an operation
//! - [`member`]: Struct members, sizes and direction tags
//! - [`layout`]: [`StructLayoutBuilder`] and the resulting [`MessageStruct`]
//! - [`buffer`]: [`MessageBufferModel`], the frozen per-operation structs
//! - [`class`]: Interface-wide superset buffer
//! - [`summary`]: `MsgSize` counts per operation

pub mod buffer;
pub mod class;
mod error;
pub mod kind;
pub mod layout;
pub mod member;
pub mod summary;

pub use buffer::{BufferRegistry, MessageBufferModel, Representation, StructRequest};
pub use class::ClassBuffer;
pub use error::LayoutError;
pub use kind::StructKind;
pub use layout::{align_to, MemberClass, MessageStruct, SizeBound, StructLayoutBuilder};
pub use member::{BoundSource, Directions, MemberKind, MemberSize, StructMember};
pub use summary::MsgSizeSummary;
