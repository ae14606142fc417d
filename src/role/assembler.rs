//! Stub assembly.
//!
//! A stub body is built by walking a fixed sequence of phases:
//!
//! ```text
//! DeclareLocals -> InitLocals -> Marshal -> Invoke -> Unmarshal -> Cleanup -> Return
//! ```
//!
//! Each role runs a subset of them (see [`StubAssembler::runs`]). The
//! result is a [`StubPlan`]: the ordered steps a code emitter turns into
//! text. Marshal and Unmarshal steps follow member order of the struct,
//! never parameter order.

use serde::Serialize;

use super::direction::{Decision, MarshalDirectionPolicy, Phase, Subject};
use super::error::RoleError;
use super::{RoleKind, Side};
use crate::config::CompilationConfig;
use crate::logging::debug;
use crate::model::{Interface, NameProvider, Operation};
use crate::msgbuf::{
    BoundSource, ClassBuffer, MemberKind, MemberSize, MessageBufferModel, MessageStruct,
    Representation, StructKind, StructLayoutBuilder, StructRequest,
};

/// Pipeline phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StubPhase {
    DeclareLocals,
    InitLocals,
    Marshal,
    Invoke,
    Unmarshal,
    Cleanup,
    Return,
}

impl StubPhase {
    pub const ALL: [StubPhase; 7] = [
        StubPhase::DeclareLocals,
        StubPhase::InitLocals,
        StubPhase::Marshal,
        StubPhase::Invoke,
        StubPhase::Unmarshal,
        StubPhase::Cleanup,
        StubPhase::Return,
    ];
}

/// The buffer a step touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferRef {
    Struct(StructKind),
    /// The interface's superset buffer.
    Class,
}

/// How local buffers start out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitMode {
    /// Cleared; the format is only known after receipt.
    Zeroed,
    /// Filled from the stub's parameters.
    Parameters,
}

/// What a stub hands back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    TransferStatus,
    ReturnValue,
    Nothing,
}

/// One step of a stub body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "step")]
pub enum Step {
    /// One local buffer overlaying the listed structs.
    DeclareBuffer {
        kinds: Vec<StructKind>,
        representation: Representation,
        size: u64,
    },
    DeclareClassBuffer { words: u64, strings: u64, size: u64 },
    InitBuffer { buffer: BufferRef, mode: InitMode },
    /// Temporary storage for a variable member bounded only by the
    /// platform default.
    AllocateReceiveBuffer { param: String, max: u64 },
    /// `offset` is `None` when the member follows another variable member.
    Write {
        buffer: BufferRef,
        member: MemberKind,
        offset: Option<u64>,
    },
    Read {
        buffer: BufferRef,
        member: MemberKind,
        offset: Option<u64>,
    },
    Transfer {
        send: Option<BufferRef>,
        receive: Option<BufferRef>,
        no_retry_on_cancel: bool,
    },
    /// Compare the received opcode to `expected`; on mismatch store the
    /// wrong-opcode exception in the environment and return at once.
    CheckOpcode { expected: String },
    /// Stop unmarshalling when the received exception word is set.
    CheckException,
    Release { param: String },
    Return { result: ResultKind },
}

/// The assembled body of one stub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StubPlan {
    pub role: RoleKind,
    pub side: Side,
    pub interface: String,
    /// `None` for interface-bound roles.
    pub operation: Option<String>,
    pub steps: Vec<(StubPhase, Step)>,
}

impl StubPlan {
    /// Steps of one phase, in order.
    pub fn phase(&self, phase: StubPhase) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(move |(p, _)| *p == phase)
            .map(|(_, s)| s)
    }

    /// Members written, in order.
    pub fn writes(&self) -> Vec<&MemberKind> {
        self.steps
            .iter()
            .filter_map(|(_, s)| match s {
                Step::Write { member, .. } => Some(member),
                _ => None,
            })
            .collect()
    }

    /// Members read, in order.
    pub fn reads(&self) -> Vec<&MemberKind> {
        self.steps
            .iter()
            .filter_map(|(_, s)| match s {
                Step::Read { member, .. } => Some(member),
                _ => None,
            })
            .collect()
    }

    /// Members written with the offsets they are written at.
    pub fn write_offsets(&self) -> Vec<(&MemberKind, Option<u64>)> {
        self.steps
            .iter()
            .filter_map(|(_, s)| match s {
                Step::Write { member, offset, .. } => Some((member, *offset)),
                _ => None,
            })
            .collect()
    }

    /// Members read with the offsets they are read from.
    pub fn read_offsets(&self) -> Vec<(&MemberKind, Option<u64>)> {
        self.steps
            .iter()
            .filter_map(|(_, s)| match s {
                Step::Read { member, offset, .. } => Some((member, *offset)),
                _ => None,
            })
            .collect()
    }

    pub fn result(&self) -> Option<ResultKind> {
        self.steps.iter().rev().find_map(|(_, s)| match s {
            Step::Return { result } => Some(*result),
            _ => None,
        })
    }
}

impl std::fmt::Display for StubPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.operation {
            Some(op) => writeln!(f, "{} {:?} {}::{}", self.role, self.side, self.interface, op)?,
            None => writeln!(f, "{} {:?} {}", self.role, self.side, self.interface)?,
        }
        for (phase, step) in &self.steps {
            writeln!(f, "  {phase:?}: {}", StepDisplay(step))?;
        }
        Ok(())
    }
}

struct StepDisplay<'a>(&'a Step);

impl std::fmt::Display for StepDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Step::DeclareBuffer {
                kinds,
                representation,
                size,
            } => {
                let kinds: Vec<String> = kinds.iter().map(ToString::to_string).collect();
                write!(f, "declare {} buffer [{}] ({size} bytes)", format!("{representation:?}").to_lowercase(), kinds.join(" | "))
            }
            Step::DeclareClassBuffer { words, strings, size } => {
                write!(f, "declare class buffer ({words} words, {strings} strings, {size} bytes)")
            }
            Step::InitBuffer { buffer, mode } => write!(f, "init {buffer:?} {mode:?}"),
            Step::AllocateReceiveBuffer { param, max } => write!(f, "allocate {param} ({max} bytes)"),
            Step::Write { buffer, member, offset } => {
                write!(f, "write {member} -> {buffer:?}@{}", OffsetDisplay(*offset))
            }
            Step::Read { buffer, member, offset } => {
                write!(f, "read {member} <- {buffer:?}@{}", OffsetDisplay(*offset))
            }
            Step::Transfer {
                send,
                receive,
                no_retry_on_cancel,
            } => write!(f, "transfer send={send:?} receive={receive:?} no_retry_on_cancel={no_retry_on_cancel}"),
            Step::CheckOpcode { expected } => write!(f, "check opcode == {expected}"),
            Step::CheckException => f.write_str("check exception"),
            Step::Release { param } => write!(f, "release {param}"),
            Step::Return { result } => write!(f, "return {result:?}"),
        }
    }
}

struct OffsetDisplay(Option<u64>);

impl std::fmt::Display for OffsetDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(offset) => write!(f, "{offset}"),
            None => f.write_str("runtime"),
        }
    }
}

/// Drives the phase pipeline for roles.
pub struct StubAssembler<'a> {
    builder: StructLayoutBuilder<'a>,
    config: &'a CompilationConfig,
    names: &'a dyn NameProvider,
}

impl<'a> StubAssembler<'a> {
    pub fn new(builder: StructLayoutBuilder<'a>, config: &'a CompilationConfig, names: &'a dyn NameProvider) -> Self {
        Self {
            builder,
            config,
            names,
        }
    }

    pub fn builder(&self) -> &StructLayoutBuilder<'a> {
        &self.builder
    }

    pub fn config(&self) -> &'a CompilationConfig {
        self.config
    }

    pub fn names(&self) -> &'a dyn NameProvider {
        self.names
    }

    /// The per-role skip table.
    pub fn runs(role: RoleKind, phase: StubPhase) -> bool {
        use StubPhase::*;
        match role {
            RoleKind::Call | RoleKind::ReplyAndWait => true,
            RoleKind::Send | RoleKind::Reply => phase != Unmarshal,
            RoleKind::Receive | RoleKind::Wait | RoleKind::WaitAny | RoleKind::ReplyAndWaitAny => {
                phase != Marshal
            }
            RoleKind::Marshal | RoleKind::MarshalException => matches!(phase, Marshal | Return),
            RoleKind::Unmarshal | RoleKind::Dispatch => matches!(phase, Unmarshal | Return),
            RoleKind::ComponentTemplate => phase == Return,
        }
    }

    fn representation(&self) -> Representation {
        if self.builder.hooks().utcb_buffers {
            Representation::Utcb
        } else {
            Representation::Stack
        }
    }

    /// Assemble an operation-bound role.
    pub fn assemble(
        &self,
        model: &mut MessageBufferModel,
        iface: &Interface,
        op: &Operation,
        role: RoleKind,
        side: Side,
    ) -> Result<StubPlan, RoleError> {
        if role.binds_interface() {
            return Err(RoleError::InterfaceBound {
                role,
                operation: op.name.clone(),
            });
        }

        let send_kind = MarshalDirectionPolicy::send_struct(role, side);
        let recv_kind = MarshalDirectionPolicy::receive_struct(role, side);
        let with_return = MarshalDirectionPolicy::returns_in_buffer(role);
        let representation = self.representation();

        let mut request = |kind: StructKind| -> Result<MessageStruct, RoleError> {
            let req = StructRequest::new(kind, side)
                .with_return(with_return)
                .representation(representation);
            Ok(model.request(&self.builder, op, req)?.clone())
        };
        let send = send_kind.map(&mut request).transpose()?;
        let recv = match (recv_kind, &send) {
            (Some(kind), Some(s)) if s.kind() == kind => Some(s.clone()),
            (Some(kind), _) => Some(request(kind)?),
            (None, _) => None,
        };

        let mut steps = Vec::new();
        let mut push = |phase: StubPhase, step: Step| {
            if Self::runs(role, phase) {
                steps.push((phase, step));
            }
        };

        // DeclareLocals
        let declared: Vec<&MessageStruct> = send.iter().chain(recv.iter()).collect();
        if !declared.is_empty() {
            let mut kinds: Vec<StructKind> = declared.iter().map(|s| s.kind()).collect();
            kinds.dedup();
            let size = declared.iter().map(|s| s.max_size()).max().unwrap_or(0);
            push(
                StubPhase::DeclareLocals,
                Step::DeclareBuffer {
                    kinds,
                    representation,
                    size,
                },
            );
        }

        // InitLocals
        let first = send.as_ref().or(recv.as_ref());
        if let Some(s) = first {
            let mode = if send.is_some() {
                InitMode::Parameters
            } else {
                InitMode::Zeroed
            };
            push(
                StubPhase::InitLocals,
                Step::InitBuffer {
                    buffer: BufferRef::Struct(s.kind()),
                    mode,
                },
            );
        }
        let mut allocated = Vec::new();
        if let Some(r) = &recv
            && Self::runs(role, StubPhase::Unmarshal)
        {
            for member in r.members() {
                let MemberSize::Variable {
                    max,
                    source: BoundSource::PlatformDefault,
                    ..
                } = member.size
                else {
                    continue;
                };
                let Some(param) = member.param_name().and_then(|n| op.parameter(n)) else {
                    continue;
                };
                if param.attributes.prealloc {
                    continue;
                }
                if MarshalDirectionPolicy::decide(role, side, Phase::Receive, Subject::Parameter(param))
                    != Decision::UnmarshalOnReceive
                {
                    continue;
                }
                push(
                    StubPhase::InitLocals,
                    Step::AllocateReceiveBuffer {
                        param: param.name.clone(),
                        max,
                    },
                );
                allocated.push(param.name.clone());
            }
        }

        // Marshal
        if let Some(s) = &send {
            for (member, offset) in self.moved_members(role, side, Phase::Send, op, s) {
                push(
                    StubPhase::Marshal,
                    Step::Write {
                        buffer: BufferRef::Struct(s.kind()),
                        member,
                        offset,
                    },
                );
            }
        }

        // Invoke
        if role.transfers() {
            push(
                StubPhase::Invoke,
                Step::Transfer {
                    send: send.as_ref().map(|s| BufferRef::Struct(s.kind())),
                    receive: recv.as_ref().map(|s| BufferRef::Struct(s.kind())),
                    no_retry_on_cancel: send.is_some() && self.config.no_send_retry_on_cancel,
                },
            );
        }

        // Unmarshal
        if let Some(r) = &recv {
            for (member, offset) in self.moved_members(role, side, Phase::Receive, op, r) {
                let check = match member {
                    MemberKind::OpcodeWord => Some(Step::CheckOpcode {
                        expected: self.names.opcode_constant_name(iface, op),
                    }),
                    MemberKind::ExceptionWord => Some(Step::CheckException),
                    _ => None,
                };
                push(
                    StubPhase::Unmarshal,
                    Step::Read {
                        buffer: BufferRef::Struct(r.kind()),
                        member,
                        offset,
                    },
                );
                if let Some(check) = check {
                    push(StubPhase::Unmarshal, check);
                }
            }
        }

        // Cleanup
        for param in allocated {
            push(StubPhase::Cleanup, Step::Release { param });
        }

        // Return
        push(
            StubPhase::Return,
            Step::Return {
                result: Self::result_kind(role, op),
            },
        );

        debug!(
            operation = %op.name,
            role = %role,
            side = ?side,
            steps = steps.len(),
            "assembled stub"
        );
        Ok(StubPlan {
            role,
            side,
            interface: iface.name.clone(),
            operation: Some(op.name.clone()),
            steps,
        })
    }

    /// Assemble an interface-bound role over the class superset buffer.
    pub fn assemble_interface(&self, class: &ClassBuffer, iface: &Interface, role: RoleKind, side: Side) -> Result<StubPlan, RoleError> {
        if !role.binds_interface() {
            return Err(RoleError::OperationBound {
                role,
                interface: iface.name.clone(),
            });
        }
        let sizing = self.builder.sizing();
        let replies = MarshalDirectionPolicy::send_struct(role, side).is_some();
        let mut steps = Vec::new();
        let mut push = |phase: StubPhase, step: Step| {
            if Self::runs(role, phase) {
                steps.push((phase, step));
            }
        };

        push(
            StubPhase::DeclareLocals,
            Step::DeclareClassBuffer {
                words: class.words,
                strings: class.strings,
                size: class.size_bytes(sizing),
            },
        );
        if !replies {
            push(
                StubPhase::InitLocals,
                Step::InitBuffer {
                    buffer: BufferRef::Class,
                    mode: InitMode::Zeroed,
                },
            );
        }
        push(
            StubPhase::Invoke,
            Step::Transfer {
                send: replies.then_some(BufferRef::Class),
                receive: Some(BufferRef::Class),
                no_retry_on_cancel: replies && self.config.no_send_retry_on_cancel,
            },
        );
        push(
            StubPhase::Unmarshal,
            Step::Read {
                buffer: BufferRef::Class,
                member: MemberKind::OpcodeWord,
                offset: Some(0),
            },
        );
        push(
            StubPhase::Return,
            Step::Return {
                result: ResultKind::TransferStatus,
            },
        );

        debug!(interface = %iface.name, role = %role, side = ?side, "assembled interface stub");
        Ok(StubPlan {
            role,
            side,
            interface: iface.name.clone(),
            operation: None,
            steps,
        })
    }

    /// Members of `s` the policy moves in `phase`, in member order.
    fn moved_members(&self, role: RoleKind, side: Side, phase: Phase, op: &Operation, s: &MessageStruct) -> Vec<(MemberKind, Option<u64>)> {
        let wanted = match phase {
            Phase::Send => Decision::MarshalOnSend,
            Phase::Receive => Decision::UnmarshalOnReceive,
        };
        let mut moved = Vec::new();
        let mut flexpage_moved = false;
        for member in s.members() {
            let subject = match &member.kind {
                MemberKind::OpcodeWord => Some(Subject::Opcode),
                MemberKind::ExceptionWord => Some(Subject::Exception),
                MemberKind::ReturnValue => Some(Subject::ReturnValue),
                MemberKind::ZeroFlexpageDelimiter => None,
                other => other
                    .param_name()
                    .and_then(|n| op.parameter(n))
                    .map(Subject::Parameter),
            };
            let moves = match subject {
                Some(subject) => MarshalDirectionPolicy::decide(role, side, phase, subject) == wanted,
                // the delimiter travels with the flexpages before it
                None => flexpage_moved,
            };
            if moves {
                if member.kind.is_flexpage() {
                    flexpage_moved = true;
                }
                moved.push((member.kind.clone(), member.offset));
            }
        }
        moved
    }

    fn result_kind(role: RoleKind, op: &Operation) -> ResultKind {
        match role {
            RoleKind::Call | RoleKind::ComponentTemplate => {
                if op.has_return() {
                    ResultKind::ReturnValue
                } else {
                    ResultKind::Nothing
                }
            }
            RoleKind::Receive
            | RoleKind::Wait
            | RoleKind::WaitAny
            | RoleKind::ReplyAndWait
            | RoleKind::ReplyAndWaitAny
            | RoleKind::Dispatch => ResultKind::TransferStatus,
            RoleKind::Send
            | RoleKind::Reply
            | RoleKind::Marshal
            | RoleKind::Unmarshal
            | RoleKind::MarshalException => ResultKind::Nothing,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{DefaultNameProvider, ElementType, Parameter};
    use crate::sizing::{Arch, Platform, PlatformSizes};

    fn f() -> Operation {
        Operation::new("f")
            .param(Parameter::new("a", ElementType::Int).input())
            .param(Parameter::new("b", ElementType::Int).output())
    }

    fn member(name: &str) -> MemberKind {
        MemberKind::Parameter { name: name.into() }
    }

    #[test]
    fn test_call_plan() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let names = DefaultNameProvider;
        let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
        let iface = Interface::new("demo");
        let op = f();
        let mut model = MessageBufferModel::new(&op);

        let plan = asm.assemble(&mut model, &iface, &op, RoleKind::Call, Side::Client).unwrap();
        assert_eq!(plan.writes(), vec![&MemberKind::OpcodeWord, &member("a")]);
        assert_eq!(plan.reads(), vec![&member("b"), &MemberKind::ExceptionWord]);
        assert!(plan.phase(StubPhase::Unmarshal).any(|s| *s == Step::CheckException));
        assert_eq!(plan.result(), Some(ResultKind::Nothing));

        // phases appear in pipeline order
        let phases: Vec<_> = plan.steps.iter().map(|(p, _)| *p).collect();
        let mut sorted = phases.clone();
        sorted.sort();
        assert_eq!(phases, sorted);
    }

    #[test]
    fn test_wait_checks_opcode_first() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let names = DefaultNameProvider;
        let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
        let iface = Interface::new("demo");
        let op = f();
        let mut model = MessageBufferModel::new(&op);

        let plan = asm.assemble(&mut model, &iface, &op, RoleKind::Wait, Side::Component).unwrap();
        let unmarshal: Vec<_> = plan.phase(StubPhase::Unmarshal).cloned().collect();
        assert_eq!(
            unmarshal.get(1),
            Some(&Step::CheckOpcode {
                expected: "DEMO_F_OPCODE".into()
            })
        );
        assert!(plan.writes().is_empty());
        assert!(plan.phase(StubPhase::InitLocals).any(|s| matches!(
            s,
            Step::InitBuffer {
                mode: InitMode::Zeroed,
                ..
            }
        )));
        assert_eq!(plan.result(), Some(ResultKind::TransferStatus));
    }

    #[test]
    fn test_marshal_helper_skips_invoke() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let names = DefaultNameProvider;
        let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
        let iface = Interface::new("demo");
        let op = f().returns(ElementType::Int);
        let mut model = MessageBufferModel::new(&op);

        let plan = asm.assemble(&mut model, &iface, &op, RoleKind::Marshal, Side::Component).unwrap();
        assert_eq!(plan.phase(StubPhase::Invoke).count(), 0);
        assert_eq!(
            plan.writes(),
            vec![&member("b"), &MemberKind::ReturnValue, &MemberKind::ExceptionWord]
        );
    }

    #[test]
    fn test_receive_buffer_allocated_and_released() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let names = DefaultNameProvider;
        let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
        let iface = Interface::new("demo");
        let op = Operation::new("put")
            .param(Parameter::new("data", ElementType::Byte).input().size_is("len"))
            .param(Parameter::new("keep", ElementType::Byte).input().size_is("len").prealloc())
            .param(Parameter::new("len", ElementType::Int).input());
        let mut model = MessageBufferModel::new(&op);

        let plan = asm.assemble(&mut model, &iface, &op, RoleKind::Receive, Side::Component).unwrap();
        let allocs: Vec<_> = plan
            .phase(StubPhase::InitLocals)
            .filter_map(|s| match s {
                Step::AllocateReceiveBuffer { param, .. } => Some(param.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(allocs, vec!["data"]);
        assert_eq!(
            plan.phase(StubPhase::Cleanup).cloned().collect::<Vec<_>>(),
            vec![Step::Release { param: "data".into() }]
        );
    }

    #[test]
    fn test_binding_checked() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let names = DefaultNameProvider;
        let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
        let iface = Interface::new("demo");
        let op = f();
        let mut model = MessageBufferModel::new(&op);
        assert!(matches!(
            asm.assemble(&mut model, &iface, &op, RoleKind::WaitAny, Side::Component),
            Err(RoleError::InterfaceBound { .. })
        ));
        let class = ClassBuffer::for_operations("demo", [&op], asm.builder()).unwrap();
        assert!(matches!(
            asm.assemble_interface(&class, &iface, RoleKind::Call, Side::Client),
            Err(RoleError::OperationBound { .. })
        ));
        let plan = asm
            .assemble_interface(&class, &iface, RoleKind::WaitAny, Side::Component)
            .unwrap();
        assert_eq!(plan.reads(), vec![&MemberKind::OpcodeWord]);
    }
}
