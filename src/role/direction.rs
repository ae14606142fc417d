//! Marshalling-direction policy.
//!
//! A pure decision table: given a role, the side it is generated for, the
//! transfer phase and what is being moved, say whether the stub writes it
//! before sending, reads it after receiving, or leaves it alone.
//!
//! | Role | Sends | Receives |
//! |---|---|---|
//! | Call | In | Out |
//! | Send | In (client) / Out (component) | |
//! | Receive, Wait | | In (component) / Out (client) |
//! | WaitAny | | Generic, opcode only |
//! | ReplyAndWait | Out | In |
//! | ReplyAndWaitAny | Out | Generic, opcode only |
//! | Reply | Out | |
//! | Marshal | In (client) / Out (component) | |
//! | Unmarshal | | In (component) / Out (client), no opcode |
//! | MarshalException | Exception word only | |
//! | Dispatch, ComponentTemplate | | |

use serde::Serialize;

use super::{RoleKind, Side};
use crate::model::Parameter;
use crate::msgbuf::StructKind;

/// Which half of a transfer is being decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Send,
    Receive,
}

/// What is being moved.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    Parameter(&'a Parameter),
    Opcode,
    Exception,
    ReturnValue,
}

/// The outcome of the policy; exactly one per question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Decision {
    MarshalOnSend,
    UnmarshalOnReceive,
    Skip,
}

/// The decision table. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarshalDirectionPolicy;

impl MarshalDirectionPolicy {
    /// The struct a role writes and sends, if any.
    pub fn send_struct(role: RoleKind, side: Side) -> Option<StructKind> {
        match role {
            RoleKind::Call => Some(StructKind::In),
            RoleKind::Send | RoleKind::Marshal => Some(match side {
                Side::Client => StructKind::In,
                Side::Component => StructKind::Out,
            }),
            RoleKind::ReplyAndWait | RoleKind::ReplyAndWaitAny | RoleKind::Reply => {
                Some(StructKind::Out)
            }
            RoleKind::MarshalException => Some(StructKind::Exception),
            RoleKind::Receive
            | RoleKind::Wait
            | RoleKind::WaitAny
            | RoleKind::Unmarshal
            | RoleKind::Dispatch
            | RoleKind::ComponentTemplate => None,
        }
    }

    /// The struct a role receives and reads, if any.
    pub fn receive_struct(role: RoleKind, side: Side) -> Option<StructKind> {
        match role {
            RoleKind::Call => Some(StructKind::Out),
            RoleKind::Receive | RoleKind::Wait | RoleKind::Unmarshal => Some(match side {
                Side::Client => StructKind::Out,
                Side::Component => StructKind::In,
            }),
            RoleKind::ReplyAndWait => Some(StructKind::In),
            RoleKind::WaitAny | RoleKind::ReplyAndWaitAny => Some(StructKind::Generic),
            RoleKind::Send
            | RoleKind::Reply
            | RoleKind::Marshal
            | RoleKind::MarshalException
            | RoleKind::Dispatch
            | RoleKind::ComponentTemplate => None,
        }
    }

    /// Whether structs requested by this role carry the return value.
    ///
    /// Every role touching an Out or Exception struct must agree, so only
    /// roles that never read or write one return it through the host
    /// channel alone.
    pub fn returns_in_buffer(role: RoleKind) -> bool {
        !matches!(
            role,
            RoleKind::Dispatch | RoleKind::ComponentTemplate | RoleKind::WaitAny
        )
    }

    /// Decide what `role` does with `subject` in `phase`.
    pub fn decide(role: RoleKind, side: Side, phase: Phase, subject: Subject<'_>) -> Decision {
        match phase {
            Phase::Send => Self::decide_send(role, side, subject),
            Phase::Receive => Self::decide_receive(role, side, subject),
        }
    }

    fn decide_send(role: RoleKind, side: Side, subject: Subject<'_>) -> Decision {
        let Some(kind) = Self::send_struct(role, side) else {
            return Decision::Skip;
        };
        let marshal = match subject {
            Subject::Parameter(param) => {
                role != RoleKind::MarshalException && Self::param_in_struct(param, kind)
            }
            Subject::Opcode => kind.carries_in(),
            Subject::Exception => matches!(kind, StructKind::Out | StructKind::Exception),
            Subject::ReturnValue => {
                role != RoleKind::MarshalException
                    && matches!(kind, StructKind::Out | StructKind::Exception)
            }
        };
        if marshal {
            Decision::MarshalOnSend
        } else {
            Decision::Skip
        }
    }

    fn decide_receive(role: RoleKind, side: Side, subject: Subject<'_>) -> Decision {
        let Some(kind) = Self::receive_struct(role, side) else {
            return Decision::Skip;
        };
        let opcode_only = matches!(role, RoleKind::WaitAny | RoleKind::ReplyAndWaitAny);
        let unmarshal = match subject {
            Subject::Parameter(param) => !opcode_only && Self::param_in_struct(param, kind),
            Subject::Opcode => role != RoleKind::Unmarshal && kind.carries_in(),
            Subject::Exception | Subject::ReturnValue => {
                !opcode_only && matches!(kind, StructKind::Out | StructKind::Exception)
            }
        };
        if unmarshal {
            Decision::UnmarshalOnReceive
        } else {
            Decision::Skip
        }
    }

    fn param_in_struct(param: &Parameter, kind: StructKind) -> bool {
        if param.implicit.is_some() || param.attributes.ignore {
            return false;
        }
        (kind.carries_in() && param.has_in()) || (kind.carries_out() && param.has_out())
    }
}
