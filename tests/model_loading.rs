//! Loading interface models and configuration from disk.

use std::io::Write;

use ipc_stubgen::model::OpcodeAssigner;
use ipc_stubgen::msgbuf::StructKind;
use ipc_stubgen::prelude::*;
use std::result::Result;

const CALC: &str = r#"
[[interface]]
name = "calc"
attributes = { uuid = 4 }

[[interface.operations]]
name = "add"
return_type = "int"

[[interface.operations.parameters]]
name = "a"
type = "int"
attributes = { in = true }

[[interface.operations.parameters]]
name = "b"
type = "int"
attributes = { in = true }

[[interface.operations]]
name = "name"

[[interface.operations.parameters]]
name = "label"
type = "char"
pointers = 1
attributes = { out = true, string = true }
"#;

fn write_temp(content: &str) -> Result<tempfile::NamedTempFile, anyhow::Error> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(content.as_bytes())?;
    Ok(file)
}

#[test]
fn load_model_and_config_from_files() -> Result<(), anyhow::Error> {
    let model_file = write_temp(CALC)?;
    let config_file = write_temp("platform = \"l4v4\"\narch = \"amd64\"\n")?;

    let module = Module::from_file(model_file.path())?;
    let config = CompilationConfig::from_file(config_file.path())?;
    assert_eq!(config.platform, Platform::L4v4);

    let sizes = config.sizes();
    let builder = StructLayoutBuilder::new(&sizes, &config);
    let (iface, add) = module.operation("calc", "add")?;
    let input = builder.build(add, StructKind::In, Side::Client, true)?;
    // word-aligned members on a 64-bit target: opcode @0, a @8, b @16
    assert_eq!(input.fixed_size(), 20);

    let (_, name) = module.operation("calc", "name")?;
    let output = builder.build(name, StructKind::Out, Side::Client, true)?;
    assert_eq!(output.refstring_count(), 1);

    let mut assigner = OpcodeAssigner::new(&module, config.interface_number_bits);
    let opcode = assigner.opcode(iface, add)?;
    assert_eq!(opcode.value, (4 << 20) | 1);
    Ok(())
}

#[test]
fn unified_error_classifies_failures() -> Result<(), anyhow::Error> {
    let broken = write_temp("[[interface]]\nbases = 3\n")?;

    let err: Error = Module::from_file(broken.path()).unwrap_err().into();
    assert!(err.is_model());

    let bad_config = write_temp("interface_number_bits = 64\n")?;
    let err: Error = CompilationConfig::from_file(bad_config.path()).unwrap_err().into();
    assert!(err.is_config());

    let err: Error = CompilationConfig::from_file("/nonexistent/stubgen.toml")
        .unwrap_err()
        .into();
    assert!(err.is_config());
    Ok(())
}

const WIDE_RANGE: &str = r#"
[[interface]]
name = "wide"

[[interface.operations]]
name = "any"
attributes = { uuid_range = { lo = 0, hi = 9223372036854775807 } }

[[interface.operations]]
name = "next"
"#;

#[test]
fn wide_uuid_range_rejected_without_enumerating_it() -> Result<(), anyhow::Error> {
    let model_file = write_temp(WIDE_RANGE)?;
    let module = Module::from_file(model_file.path())?;
    let mut assigner = OpcodeAssigner::new(&module, 20);

    let (iface, next) = module.operation("wide", "next")?;
    assert_eq!(assigner.function_id(iface, next)?, (1 << 63) + 1);

    let (iface, any) = module.operation("wide", "any")?;
    let err = assigner.opcode(iface, any).unwrap_err();
    assert!(matches!(err, ModelError::FunctionIdOverflow { bits: 20, .. }));
    let err: Error = err.into();
    assert!(err.is_model());
    Ok(())
}
