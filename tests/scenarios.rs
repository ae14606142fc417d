//! End-to-end layout and stub scenarios on the default L4 ia32 target.

use ipc_stubgen::model::{ElementType, Interface, Module, Operation, Parameter};
use ipc_stubgen::msgbuf::{
    BoundSource, LayoutError, MemberKind, MemberSize, MessageBufferModel, StructKind, StructRequest,
};
use ipc_stubgen::prelude::*;
use std::result::Result;
use ipc_stubgen::role::{ResultKind, StubPhase};

fn param(name: &str) -> MemberKind {
    MemberKind::Parameter { name: name.into() }
}

fn member_kinds(s: &MessageStruct) -> Vec<MemberKind> {
    s.members().iter().map(|m| m.kind.clone()).collect()
}

fn offsets(s: &MessageStruct) -> Vec<Option<u64>> {
    s.members().iter().map(|m| m.offset).collect()
}

#[test]
fn plain_in_out_operation() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("f")
        .param(Parameter::new("a", ElementType::Int).input())
        .param(Parameter::new("b", ElementType::Int).output());

    let input = builder.build(&op, StructKind::In, Side::Client, true)?;
    assert_eq!(member_kinds(&input), vec![MemberKind::OpcodeWord, param("a")]);
    assert_eq!(offsets(&input), vec![Some(0), Some(4)]);
    assert_eq!(input.fixed_size(), 8);
    assert!(!input.has_variable_tail());

    let output = builder.build(&op, StructKind::Out, Side::Client, true)?;
    assert_eq!(member_kinds(&output), vec![param("b"), MemberKind::ExceptionWord]);
    assert_eq!(output.fixed_size(), 8);
    assert!(!output.has_variable_tail());
    Ok(())
}

#[test]
fn string_parameter_travels_as_refstring() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("g").param(Parameter::new("s", ElementType::Char).input().string());

    let input = builder.build(&op, StructKind::In, Side::Client, false)?;
    assert_eq!(
        member_kinds(&input),
        vec![
            MemberKind::OpcodeWord,
            MemberKind::RefstringDescriptor { param: "s".into() }
        ]
    );
    assert_eq!(input.fixed_size(), sizes.word_size() + sizes.refstring_size());
    assert!(!input.has_variable_tail());
    assert_eq!(input.refstring_count(), 1);
    Ok(())
}

#[test]
fn sized_array_bounded_by_max_is() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("h")
        .param(Parameter::new("arr", ElementType::Int).input().size_is("n"))
        .param(Parameter::new("n", ElementType::Int).input().max_is(10));

    let input = builder.build(&op, StructKind::In, Side::Client, false)?;
    // fixed members first, the variable array last
    assert_eq!(
        member_kinds(&input),
        vec![MemberKind::OpcodeWord, param("n"), param("arr")]
    );
    assert!(input.has_variable_tail());
    assert_eq!(input.fixed_size(), 8);
    assert_eq!(input.max_size(), 8 + 10 * 4);

    let arr = input.member_for_param("arr").ok_or_else(|| anyhow::anyhow!("arr missing"))?;
    assert_eq!(arr.offset, Some(8));
    assert_eq!(
        arr.size,
        MemberSize::Variable {
            element: 4,
            max: 40,
            source: BoundSource::MaxIs
        }
    );
    Ok(())
}

#[test]
fn sized_array_falls_back_to_platform_default() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("h")
        .param(Parameter::new("arr", ElementType::Int).input().size_is("n"))
        .param(Parameter::new("n", ElementType::Int).input());

    let input = builder.build(&op, StructKind::In, Side::Client, false)?;
    let default = sizes
        .max_size_for(&ElementType::Int)
        .ok_or_else(|| anyhow::anyhow!("no platform default"))?;
    assert_eq!(input.max_size(), input.fixed_size() + default);
    Ok(())
}

#[test]
fn unbounded_array_rejected_without_platform_default() {
    let sizes = PlatformSizes::new(Platform::Sock, Arch::Ia32);
    let config = CompilationConfig {
        platform: Platform::Sock,
        ..Default::default()
    };
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("h")
        .param(Parameter::new("arr", ElementType::Int).input().size_is("n"))
        .param(Parameter::new("n", ElementType::Int).input());

    let err = builder.build(&op, StructKind::In, Side::Client, false).unwrap_err();
    assert_eq!(
        err,
        LayoutError::UnboundedVariableMember {
            operation: "h".into(),
            parameter: "arr".into()
        }
    );
}

#[test]
fn unresolved_size_target_rejected() {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("h").param(Parameter::new("arr", ElementType::Int).input().size_is("count"));

    let err = builder.build(&op, StructKind::In, Side::Client, false).unwrap_err();
    assert!(matches!(
        err,
        LayoutError::UnresolvedSizeTarget { ref target, .. } if target == "count"
    ));
    assert_eq!(err.operation(), "h");
}

#[test]
fn max_kind_is_not_buildable() {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("f");

    let err = builder.build(&op, StructKind::Max, Side::Client, false).unwrap_err();
    assert!(matches!(err, LayoutError::InvalidStructKind { kind: StructKind::Max, .. }));
}

#[test]
fn noexceptions_operation_has_no_exception_word() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("quiet")
        .param(Parameter::new("b", ElementType::Int).output())
        .with_attributes(|a| a.noexceptions = true);

    let output = builder.build(&op, StructKind::Out, Side::Component, true)?;
    assert!(!output.has_exception());
    assert!(builder.build(&op, StructKind::Exception, Side::Component, false).is_err());
    Ok(())
}

#[test]
fn noopcode_operation_has_no_opcode_word() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("raw")
        .param(Parameter::new("a", ElementType::Int).input())
        .with_attributes(|a| a.noopcode = true);

    let input = builder.build(&op, StructKind::In, Side::Client, false)?;
    assert!(!input.has_opcode());
    assert_eq!(member_kinds(&input), vec![param("a")]);
    Ok(())
}

#[test]
fn frozen_struct_shared_across_roles() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let names = DefaultNameProvider;
    let asm = StubAssembler::new(builder, &config, &names);
    let iface = Interface::new("demo");
    let op = Operation::new("f")
        .param(Parameter::new("a", ElementType::Int).input())
        .param(Parameter::new("b", ElementType::Int).output())
        .returns(ElementType::Int);
    let mut model = MessageBufferModel::new(&op);

    let call = asm.assemble(&mut model, &iface, &op, RoleKind::Call, Side::Client)?;
    let reply = asm.assemble(&mut model, &iface, &op, RoleKind::Reply, Side::Component)?;

    // both ends touch the same Out member at the same offsets
    let out = model.get(StructKind::Out).ok_or_else(|| anyhow::anyhow!("out not built"))?;
    assert!(out.has_return_value());
    assert_eq!(call.reads(), reply.writes());
    assert_eq!(call.result(), Some(ResultKind::ReturnValue));
    assert_eq!(reply.result(), Some(ResultKind::Nothing));
    assert_eq!(reply.phase(StubPhase::Unmarshal).count(), 0);
    Ok(())
}

#[test]
fn frozen_struct_rejects_conflicting_request() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let op = Operation::new("f").returns(ElementType::Int);
    let mut model = MessageBufferModel::new(&op);

    model.request(&builder, &op, StructRequest::new(StructKind::Out, Side::Component))?;
    let err = model
        .request(
            &builder,
            &op,
            StructRequest::new(StructKind::Out, Side::Client).with_return(true),
        )
        .unwrap_err();
    assert!(matches!(err, LayoutError::LayoutFrozenConflict { .. }));
    Ok(())
}

#[test]
fn interface_roles_refuse_operations() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let names = DefaultNameProvider;
    let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
    let module = Module::new(vec![
        Interface::new("demo").operation(Operation::new("f").param(Parameter::new("a", ElementType::Int))),
    ])?;
    let (iface, op) = module.operation("demo", "f")?;
    let mut model = MessageBufferModel::new(op);

    let err = asm
        .assemble(&mut model, iface, op, RoleKind::WaitAny, Side::Component)
        .unwrap_err();
    assert!(matches!(err, RoleError::InterfaceBound { .. }));

    let err: ipc_stubgen::Error = LayoutError::InvalidStructKind {
        operation: "f".into(),
        kind: StructKind::Max,
    }
    .into();
    assert!(err.is_layout());
    Ok(())
}

#[test]
fn unknown_interface_is_a_model_error() -> Result<(), anyhow::Error> {
    let module = Module::new(vec![Interface::new("demo")])?;
    let err: ipc_stubgen::Error = module.interface("missing").unwrap_err().into();
    assert!(err.is_model());
    assert!(err.to_string().contains("missing"));
    Ok(())
}

fn offset_of<'a>(accesses: &[(&'a MemberKind, Option<u64>)], kind: &MemberKind) -> Option<u64> {
    accesses.iter().find(|(m, _)| *m == kind).and_then(|(_, o)| *o)
}

#[test]
fn marshalled_exception_lands_where_the_caller_reads_it() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let names = DefaultNameProvider;
    let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
    let iface = Interface::new("demo");
    let op = Operation::new("f")
        .param(Parameter::new("b", ElementType::Int).output())
        .returns(ElementType::Int);

    let client_first = [(RoleKind::Call, Side::Client), (RoleKind::MarshalException, Side::Component)];
    let component_first = [(RoleKind::MarshalException, Side::Component), (RoleKind::Call, Side::Client)];
    for order in [client_first, component_first] {
        let mut model = MessageBufferModel::new(&op);
        let mut plans = Vec::new();
        for (role, side) in order {
            plans.push(asm.assemble(&mut model, &iface, &op, role, side)?);
        }
        let call = plans
            .iter()
            .find(|p| p.role == RoleKind::Call)
            .ok_or_else(|| anyhow::anyhow!("no call plan"))?;
        let raise = plans
            .iter()
            .find(|p| p.role == RoleKind::MarshalException)
            .ok_or_else(|| anyhow::anyhow!("no exception plan"))?;

        // b @0, return value @4, exception word @8
        let read = offset_of(&call.read_offsets(), &MemberKind::ExceptionWord);
        let written = offset_of(&raise.write_offsets(), &MemberKind::ExceptionWord);
        assert_eq!(read, Some(8));
        assert_eq!(written, read);
        assert_eq!(raise.writes(), vec![&MemberKind::ExceptionWord]);
    }
    Ok(())
}

#[test]
fn stub_plan_serializes_tagged_steps() -> Result<(), anyhow::Error> {
    let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
    let config = CompilationConfig::default();
    let names = DefaultNameProvider;
    let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
    let iface = Interface::new("demo");
    let op = Operation::new("f")
        .param(Parameter::new("a", ElementType::Int).input())
        .param(Parameter::new("b", ElementType::Int).output());
    let mut model = MessageBufferModel::new(&op);

    let plan = asm.assemble(&mut model, &iface, &op, RoleKind::Call, Side::Client)?;
    let json = serde_json::to_value(&plan)?;
    assert_eq!(json["role"], serde_json::json!(plan.role));
    assert_eq!(json["operation"], "f");

    let steps = json["steps"]
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("steps is not an array"))?;
    assert_eq!(steps.len(), plan.steps.len());
    // each entry is a (phase, step) pair with the step tagged by name
    let first = steps.first().ok_or_else(|| anyhow::anyhow!("no steps"))?;
    assert_eq!(first[0], "declare-locals");
    assert_eq!(first[1]["step"], "declare-buffer");
    let first_write = steps
        .iter()
        .find(|s| s[1]["step"] == "write")
        .ok_or_else(|| anyhow::anyhow!("no write step"))?;
    assert_eq!(first_write[1]["offset"], 0);
    Ok(())
}
