//! Per-operation message buffer model.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::class::ClassBuffer;
use super::error::LayoutError;
use super::kind::StructKind;
use super::layout::{MessageStruct, StructLayoutBuilder};
use super::member::StructMember;
use crate::logging::trace;
use crate::model::Operation;
use crate::role::Side;

/// How a stub holds a message struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Local variable of the stub.
    Stack,
    /// Resident in the user thread control block.
    Utcb,
}

/// One role's request for a struct of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructRequest {
    pub kind: StructKind,
    pub side: Side,
    /// The return value travels in the buffer.
    pub with_return: bool,
    pub representation: Representation,
}

impl StructRequest {
    pub fn new(kind: StructKind, side: Side) -> Self {
        Self {
            kind,
            side,
            with_return: false,
            representation: Representation::Stack,
        }
    }

    pub fn with_return(mut self, with_return: bool) -> Self {
        self.with_return = with_return;
        self
    }

    pub fn representation(mut self, representation: Representation) -> Self {
        self.representation = representation;
        self
    }
}

/// The structs of one operation, shared by every role generated for it.
///
/// The first request for a kind builds and freezes that struct. Later
/// requests get the frozen instance back and may only add representation
/// metadata, so every role agrees on member order and offsets.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageBufferModel {
    operation: String,
    structs: BTreeMap<StructKind, MessageStruct>,
    representations: BTreeMap<StructKind, BTreeSet<Representation>>,
    class_buffer: Option<ClassBuffer>,
}

impl MessageBufferModel {
    pub fn new(op: &Operation) -> Self {
        Self {
            operation: op.name.clone(),
            ..Default::default()
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Return the struct for `request`, building it on first use.
    pub fn request(
        &mut self,
        builder: &StructLayoutBuilder<'_>,
        op: &Operation,
        request: StructRequest,
    ) -> Result<&MessageStruct, LayoutError> {
        let kind = request.kind;
        if request.representation == Representation::Utcb && !builder.hooks().utcb_buffers {
            return Err(LayoutError::UnsupportedAttributeCombination {
                operation: op.name.clone(),
                parameter: None,
                reason: "a UTCB-resident buffer was requested on a platform without UTCB buffers".into(),
            });
        }

        let built = Self::freeze(&mut self.structs, builder, op, kind, request.side, request.with_return)?;
        self.representations
            .entry(kind)
            .or_default()
            .insert(request.representation);
        Ok(built)
    }

    /// Build `kind` once and check later requests against the frozen copy.
    ///
    /// The Exception struct is the Out struct carrying an exception, so it
    /// is always a copy of the frozen Out layout.
    fn freeze<'s>(
        structs: &'s mut BTreeMap<StructKind, MessageStruct>,
        builder: &StructLayoutBuilder<'_>,
        op: &Operation,
        kind: StructKind,
        side: Side,
        with_return: bool,
    ) -> Result<&'s MessageStruct, LayoutError> {
        // noexceptions operations fall through to the builder, which rejects them
        if kind == StructKind::Exception && !op.attributes.noexceptions && !structs.contains_key(&kind) {
            let mirrored = Self::freeze(structs, builder, op, StructKind::Out, side, with_return)?
                .with_kind(StructKind::Exception);
            trace!(operation = %op.name, side = ?side, "exception struct mirrors the out struct");
            structs.insert(kind, mirrored);
        }

        match structs.entry(kind) {
            Entry::Occupied(entry) => {
                let frozen = entry.into_mut();
                let wants_return = with_return && op.has_return() && kind.carries_out();
                if wants_return && !frozen.has_return_value() {
                    return Err(LayoutError::LayoutFrozenConflict {
                        operation: op.name.clone(),
                        kind,
                        reason: "has no return value member".into(),
                    });
                }
                trace!(operation = %op.name, kind = %kind, side = ?side, "reusing frozen struct");
                Ok(frozen)
            }
            Entry::Vacant(entry) => Ok(entry.insert(builder.build(op, kind, side, with_return)?)),
        }
    }

    /// The frozen struct of `kind`, if some role built it.
    pub fn get(&self, kind: StructKind) -> Option<&MessageStruct> {
        self.structs.get(&kind)
    }

    /// Size to reserve for receiving `kind` before any message is known.
    ///
    /// Layouts do not depend on the side, so neither does the size.
    pub fn max_size(&self, kind: StructKind, _side: Side) -> Option<u64> {
        self.get(kind).map(MessageStruct::max_size)
    }

    /// Members of `kind` in wire order with their offsets.
    pub fn member_layout(&self, kind: StructKind) -> Option<&[StructMember]> {
        self.get(kind).map(MessageStruct::members)
    }

    pub fn representations(&self, kind: StructKind) -> impl Iterator<Item = Representation> + '_ {
        self.representations
            .get(&kind)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    pub fn built_kinds(&self) -> impl Iterator<Item = StructKind> + '_ {
        self.structs.keys().copied()
    }

    /// Attach the owning interface's superset buffer.
    pub fn set_class_buffer(&mut self, class_buffer: ClassBuffer) {
        self.class_buffer = Some(class_buffer);
    }

    pub fn class_buffer(&self) -> Option<&ClassBuffer> {
        self.class_buffer.as_ref()
    }
}

/// The message buffer models of a compilation run, one per operation.
///
/// Every role and the dispatch table go through the same registry so that
/// the first build of a struct is the one everybody sees.
#[derive(Debug, Clone, Default)]
pub struct BufferRegistry {
    models: HashMap<(String, String), MessageBufferModel>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The model of `op` declared in interface `interface`, created on first
    /// use.
    pub fn model_for(&mut self, interface: &str, op: &Operation) -> &mut MessageBufferModel {
        self.models
            .entry((interface.to_string(), op.name.clone()))
            .or_insert_with(|| MessageBufferModel::new(op))
    }

    pub fn get(&self, interface: &str, operation: &str) -> Option<&MessageBufferModel> {
        self.models
            .get(&(interface.to_string(), operation.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
