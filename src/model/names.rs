//! Symbolic names for generated identifiers.

use super::interface::{Interface, Operation};

/// Supplies symbolic labels for values the layout engine references.
///
/// Everything else about symbol naming belongs to the code emitter.
pub trait NameProvider {
    fn opcode_constant_name(&self, iface: &Interface, op: &Operation) -> String;

    /// The server-side function implementing `op`.
    fn component_function_name(&self, iface: &Interface, op: &Operation) -> String {
        format!("{}_{}_component", iface.name, op.name).replace("::", "_")
    }
}

/// `<INTERFACE>_<OPERATION>_OPCODE`, upper-cased.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNameProvider;

impl NameProvider for DefaultNameProvider {
    fn opcode_constant_name(&self, iface: &Interface, op: &Operation) -> String {
        format!("{}_{}_opcode", iface.name, op.name)
            .replace("::", "_")
            .to_uppercase()
    }
}
