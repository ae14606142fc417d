//! Server-side dispatch tables.
//!
//! A [`DispatchTable`] maps the opcodes an interface's server loop can
//! receive to the sequence that serves them, covering the interface's own
//! operations first and then, recursively, those of its base interfaces.

mod error;

pub use error::DispatchError;

use serde::Serialize;

use crate::logging::{debug, error, warn};
use crate::model::{DispatchKey, Interface, Module, Opcode, OpcodeAssigner, Operation};
use crate::msgbuf::{BufferRegistry, ClassBuffer};
use crate::role::{RoleError, RoleKind, Side, StubAssembler, StubPlan};

/// One stage of serving a received message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "stage")]
pub enum DispatchStep {
    Unmarshal { plan: StubPlan },
    /// Call the component's implementation of the operation.
    Invoke { function: String },
    Marshal { plan: StubPlan },
    Reply,
}

/// A dispatchable operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchEntry {
    pub interface: String,
    pub operation: String,
    pub opcode: Opcode,
    pub opcode_name: String,
    pub reply_only_allowed: bool,
    pub sequence: Vec<DispatchStep>,
}

impl DispatchEntry {
    pub fn key(&self) -> DispatchKey {
        self.opcode.key
    }
}

/// What the server loop does with an opcode no entry matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum DefaultCase {
    /// Call `function(object, buffer, environment)`; its result code is
    /// the dispatch result.
    External { function: String },
    /// Store the wrong-opcode exception and reply.
    WrongOpcode,
}

impl DefaultCase {
    /// Whether the fallback itself replies to the sender.
    pub fn requests_reply(&self) -> bool {
        matches!(self, DefaultCase::WrongOpcode)
    }
}

/// The opcode switch of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchTable {
    interface: String,
    entries: Vec<DispatchEntry>,
    default_case: DefaultCase,
    class_buffer: ClassBuffer,
    dispatch_plan: StubPlan,
}

impl DispatchTable {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Entries in candidate order.
    pub fn entries(&self) -> &[DispatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry serving `opcode`.
    pub fn lookup(&self, opcode: u64) -> Option<&DispatchEntry> {
        self.entries.iter().find(|e| e.key().contains(opcode))
    }

    pub fn default_case(&self) -> &DefaultCase {
        &self.default_case
    }

    pub fn has_default_function(&self) -> bool {
        matches!(self.default_case, DefaultCase::External { .. })
    }

    /// Buffer the server loop receives into.
    pub fn class_buffer(&self) -> &ClassBuffer {
        &self.class_buffer
    }

    /// The dispatch stub reading the opcode before the switch.
    pub fn dispatch_plan(&self) -> &StubPlan {
        &self.dispatch_plan
    }
}

impl std::fmt::Display for DispatchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "dispatch {} (class buffer: {} words, {} strings)",
            self.interface, self.class_buffer.words, self.class_buffer.strings
        )?;
        for entry in &self.entries {
            write!(
                f,
                "  {} {} -> {}::{}",
                entry.key(),
                entry.opcode_name,
                entry.interface,
                entry.operation
            )?;
            if entry.reply_only_allowed {
                f.write_str(" [reply-only]")?;
            }
            writeln!(f)?;
        }
        match &self.default_case {
            DefaultCase::External { function } => writeln!(f, "  default -> {function}"),
            DefaultCase::WrongOpcode => writeln!(f, "  default -> wrong-opcode exception, reply"),
        }
    }
}

/// Builds [`DispatchTable`]s for the interfaces of a [`Module`].
pub struct DispatchTableBuilder<'a> {
    module: &'a Module,
    assembler: &'a StubAssembler<'a>,
}

impl<'a> DispatchTableBuilder<'a> {
    pub fn new(module: &'a Module, assembler: &'a StubAssembler<'a>) -> Self {
        Self { module, assembler }
    }

    /// Build the table for `interface`, failing on the first bad candidate.
    pub fn build(&self, interface: &str, registry: &mut BufferRegistry) -> Result<DispatchTable, DispatchError> {
        let (table, _) = self.build_inner(interface, registry, true)?;
        Ok(table)
    }

    /// Build the table for `interface`, dropping candidates that fail.
    ///
    /// The dropped candidates' errors are returned next to the table.
    /// Model errors still abort the whole build.
    pub fn build_recovering(
        &self,
        interface: &str,
        registry: &mut BufferRegistry,
    ) -> Result<(DispatchTable, Vec<DispatchError>), DispatchError> {
        self.build_inner(interface, registry, false)
    }

    /// Superset buffer over every operation of `interface` and its bases.
    pub fn class_buffer(&self, interface: &str) -> Result<ClassBuffer, DispatchError> {
        let iface = self.module.interface(interface)?;
        let ancestry = self.module.ancestry(iface)?;
        let ops = ancestry.iter().flat_map(|i| i.operations.iter());
        ClassBuffer::for_operations(&iface.name, ops, self.assembler.builder())
            .map_err(|e| DispatchError::Assembly(e.into()))
    }

    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    fn build_inner(
        &self,
        interface: &str,
        registry: &mut BufferRegistry,
        strict: bool,
    ) -> Result<(DispatchTable, Vec<DispatchError>), DispatchError> {
        let config = self.assembler.config();
        let iface = self.module.interface(interface)?;
        let mut assigner = OpcodeAssigner::new(self.module, config.interface_number_bits);

        let mut entries: Vec<DispatchEntry> = Vec::new();
        let mut served: Vec<&Operation> = Vec::new();
        let mut dropped = Vec::new();

        for owner in self.module.ancestry(iface)? {
            for op in owner.operations.iter().filter(|o| !o.attributes.out_only) {
                let opcode = assigner.opcode(owner, op)?;
                let entry = match self.entry(owner, op, opcode, registry) {
                    Ok(entry) => entry,
                    Err(e) => {
                        error!(interface = %owner.name, operation = %op.name, error = %e, "dropping dispatch candidate");
                        if strict {
                            return Err(e);
                        }
                        dropped.push(e);
                        continue;
                    }
                };

                if let Some(existing) = entries.iter().find(|e| e.key().overlaps(&entry.key())) {
                    let collision = DispatchError::DuplicateOpcode {
                        interface: entry.interface.clone(),
                        operation: entry.operation.clone(),
                        existing_interface: existing.interface.clone(),
                        existing_operation: existing.operation.clone(),
                        key: entry.key(),
                    };
                    if config.ignore_duplicate_opcodes {
                        warn!(error = %collision, "ignoring duplicate opcode, keeping the earlier entry");
                        continue;
                    }
                    if strict {
                        return Err(collision);
                    }
                    dropped.push(collision);
                    continue;
                }

                served.push(op);
                entries.push(entry);
            }
        }

        let class_buffer = ClassBuffer::for_operations(&iface.name, served, self.assembler.builder())
            .map_err(RoleError::from)?;
        let dispatch_plan =
            self.assembler
                .assemble_interface(&class_buffer, iface, RoleKind::Dispatch, Side::Component)?;
        let default_case = match &iface.attributes.default_function {
            Some(function) => DefaultCase::External {
                function: function.clone(),
            },
            None => DefaultCase::WrongOpcode,
        };

        debug!(
            interface = %iface.name,
            entries = entries.len(),
            dropped = dropped.len(),
            "built dispatch table"
        );
        Ok((
            DispatchTable {
                interface: iface.name.clone(),
                entries,
                default_case,
                class_buffer,
                dispatch_plan,
            },
            dropped,
        ))
    }

    /// Unmarshal, invoke, marshal, reply. Either all four stages assemble
    /// or the candidate fails.
    fn entry(
        &self,
        owner: &Interface,
        op: &Operation,
        opcode: Opcode,
        registry: &mut BufferRegistry,
    ) -> Result<DispatchEntry, DispatchError> {
        let names = self.assembler.names();
        let model = registry.model_for(&owner.name, op);
        let candidate = |source: RoleError| DispatchError::Candidate {
            interface: owner.name.clone(),
            operation: op.name.clone(),
            source,
        };

        let unmarshal = self
            .assembler
            .assemble(model, owner, op, RoleKind::Unmarshal, Side::Component)
            .map_err(candidate)?;
        let marshal = self
            .assembler
            .assemble(model, owner, op, RoleKind::Marshal, Side::Component)
            .map_err(candidate)?;

        Ok(DispatchEntry {
            interface: owner.name.clone(),
            operation: op.name.clone(),
            opcode,
            opcode_name: names.opcode_constant_name(owner, op),
            reply_only_allowed: op.attributes.allow_reply_only,
            sequence: vec![
                DispatchStep::Unmarshal { plan: unmarshal },
                DispatchStep::Invoke {
                    function: names.component_function_name(owner, op),
                },
                DispatchStep::Marshal { plan: marshal },
                DispatchStep::Reply,
            ],
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::config::CompilationConfig;
    use crate::model::{DefaultNameProvider, ElementType, Parameter};
    use crate::msgbuf::StructLayoutBuilder;
    use crate::sizing::{Arch, Platform, PlatformSizes};

    #[test]
    fn test_out_only_operations_not_dispatched() {
        let module = Module::new(vec![
            Interface::new("events")
                .operation(Operation::new("subscribe").param(Parameter::new("id", ElementType::Int)))
                .operation(Operation::new("notify").with_attributes(|a| a.out_only = true)),
        ])
        .unwrap();
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let names = DefaultNameProvider;
        let asm = StubAssembler::new(StructLayoutBuilder::new(&sizes, &config), &config, &names);
        let builder = DispatchTableBuilder::new(&module, &asm);
        let mut registry = BufferRegistry::new();

        let table = builder.build("events", &mut registry).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.entries()[0].operation, "subscribe");
        assert_eq!(table.entries()[0].sequence.len(), 4);
        assert!(!table.has_default_function());
        assert!(table.default_case().requests_reply());
        assert_eq!(table.dispatch_plan().reads().len(), 1);
        // the superset buffer still covers the out-only operation
        assert!(builder.class_buffer("events").is_ok());
    }
}
