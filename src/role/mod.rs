//! Stub roles.
//!
//! Every stub function the back end generates plays one [`RoleKind`] for
//! one [`Side`]. Roles share the operation's message structs and differ in
//! which struct they send, which they receive, and which pipeline phases
//! they run.
//!
//! # Module Organization
//!
//! - [`direction`]: The marshalling-direction policy
//! - [`assembler`]: The stub pipeline producing a [`StubPlan`]

pub mod assembler;
pub mod direction;
mod error;

pub use assembler::{BufferRef, InitMode, ResultKind, Step, StubAssembler, StubPhase, StubPlan};
pub use direction::{Decision, MarshalDirectionPolicy, Phase, Subject};
pub use error::RoleError;

use serde::{Deserialize, Serialize};

/// Which end of an operation a stub is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Client,
    Component,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Client, Side::Component];
}

/// The fixed set of stub-function kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum RoleKind {
    Call,
    Send,
    Receive,
    Wait,
    WaitAny,
    ReplyAndWait,
    ReplyAndWaitAny,
    Reply,
    Marshal,
    Unmarshal,
    MarshalException,
    Dispatch,
    ComponentTemplate,
}

impl RoleKind {
    pub const ALL: [RoleKind; 13] = [
        RoleKind::Call,
        RoleKind::Send,
        RoleKind::Receive,
        RoleKind::Wait,
        RoleKind::WaitAny,
        RoleKind::ReplyAndWait,
        RoleKind::ReplyAndWaitAny,
        RoleKind::Reply,
        RoleKind::Marshal,
        RoleKind::Unmarshal,
        RoleKind::MarshalException,
        RoleKind::Dispatch,
        RoleKind::ComponentTemplate,
    ];

    /// Roles bound to a whole interface rather than one operation.
    pub fn binds_interface(self) -> bool {
        matches!(
            self,
            RoleKind::WaitAny | RoleKind::ReplyAndWaitAny | RoleKind::Dispatch
        )
    }

    /// Roles that perform an IPC transfer.
    pub fn transfers(self) -> bool {
        match self {
            RoleKind::Call
            | RoleKind::Send
            | RoleKind::Receive
            | RoleKind::Wait
            | RoleKind::WaitAny
            | RoleKind::ReplyAndWait
            | RoleKind::ReplyAndWaitAny
            | RoleKind::Reply => true,
            RoleKind::Marshal
            | RoleKind::Unmarshal
            | RoleKind::MarshalException
            | RoleKind::Dispatch
            | RoleKind::ComponentTemplate => false,
        }
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RoleKind::Call => "call",
            RoleKind::Send => "send",
            RoleKind::Receive => "receive",
            RoleKind::Wait => "wait",
            RoleKind::WaitAny => "wait-any",
            RoleKind::ReplyAndWait => "reply-and-wait",
            RoleKind::ReplyAndWaitAny => "reply-and-wait-any",
            RoleKind::Reply => "reply",
            RoleKind::Marshal => "marshal",
            RoleKind::Unmarshal => "unmarshal",
            RoleKind::MarshalException => "marshal-exception",
            RoleKind::Dispatch => "dispatch",
            RoleKind::ComponentTemplate => "component-template",
        };
        f.write_str(name)
    }
}
