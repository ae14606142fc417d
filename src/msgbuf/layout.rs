//! Struct selection, ordering and offset assignment.

use std::cmp::Reverse;

use serde::Serialize;

use super::error::LayoutError;
use super::kind::StructKind;
use super::member::{BoundSource, Directions, MemberKind, MemberSize, StructMember};
use crate::config::{CompilationConfig, PlatformHooks};
use crate::logging::{debug, error};
use crate::model::{Operation, Parameter};
use crate::role::Side;
use crate::sizing::SizingProvider;

/// Round `val` up to the next multiple of `align` (any non-zero alignment).
#[inline]
pub fn align_to(val: u64, align: u64) -> u64 {
    if align <= 1 {
        return val;
    }
    val.div_ceil(align).saturating_mul(align)
}

/// Member classes counted separately by the transfer path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberClass {
    /// Everything carried in message words.
    Word,
    /// Refstring descriptors.
    Refstring,
}

/// Which size of a member to count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeBound {
    Fixed,
    Max,
}

/// A laid-out wire struct of one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageStruct {
    kind: StructKind,
    operation: String,
    members: Vec<StructMember>,
    fixed_size: u64,
    has_variable_tail: bool,
}

impl MessageStruct {
    pub fn kind(&self) -> StructKind {
        self.kind
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The same members and offsets under another kind.
    pub(crate) fn with_kind(&self, kind: StructKind) -> MessageStruct {
        MessageStruct {
            kind,
            ..self.clone()
        }
    }

    /// Members in wire order, offsets assigned.
    pub fn members(&self) -> &[StructMember] {
        &self.members
    }

    /// Offset reached at the start of the variable partition.
    pub fn fixed_size(&self) -> u64 {
        self.fixed_size
    }

    pub fn has_variable_tail(&self) -> bool {
        self.has_variable_tail
    }

    /// Worst-case size: the fixed part plus every variable member at its
    /// maximum, aligned in member order.
    pub fn max_size(&self) -> u64 {
        self.members
            .iter()
            .filter(|m| m.is_variable())
            .fold(self.fixed_size, |offset, m| {
                align_to(offset, m.alignment).saturating_add(m.size.max_bytes())
            })
    }

    pub fn member(&self, kind: &MemberKind) -> Option<&StructMember> {
        self.members.iter().find(|m| &m.kind == kind)
    }

    /// The member carrying parameter `name`.
    pub fn member_for_param(&self, name: &str) -> Option<&StructMember> {
        self.members.iter().find(|m| m.carries(name))
    }

    pub fn has_opcode(&self) -> bool {
        self.member(&MemberKind::OpcodeWord).is_some()
    }

    pub fn has_exception(&self) -> bool {
        self.member(&MemberKind::ExceptionWord).is_some()
    }

    pub fn has_return_value(&self) -> bool {
        self.member(&MemberKind::ReturnValue).is_some()
    }

    pub fn refstring_count(&self) -> u64 {
        self.members.iter().filter(|m| m.kind.is_refstring()).count() as u64
    }

    /// Payload bytes of one member class.
    pub fn member_size(&self, class: MemberClass, bound: SizeBound) -> u64 {
        self.members
            .iter()
            .filter(|m| match class {
                MemberClass::Word => !m.kind.is_refstring(),
                MemberClass::Refstring => m.kind.is_refstring(),
            })
            .map(|m| match bound {
                SizeBound::Fixed => m.size.fixed_bytes(),
                SizeBound::Max => m.size.max_bytes(),
            })
            .sum()
    }

    /// Word-class payload rounded up to whole words.
    pub fn word_count(&self, bound: SizeBound, sizing: &dyn SizingProvider) -> u64 {
        self.member_size(MemberClass::Word, bound)
            .div_ceil(sizing.word_size().max(1))
    }

    /// Whether the struct can travel in registers only.
    pub fn fits_short_transfer(&self, sizing: &dyn SizingProvider) -> bool {
        if self.refstring_count() > 0 || self.has_variable_tail {
            return false;
        }
        let word = sizing.word_size().max(1);
        let words = self.fixed_size.div_ceil(word);
        words > 0 && words <= sizing.max_short_transfer_bytes() / word
    }
}

/// Builds [`MessageStruct`]s for operations.
///
/// Layout is a pure function of (operation, kind, platform options);
/// the side a stub is generated for never changes it.
#[derive(Clone, Copy)]
pub struct StructLayoutBuilder<'a> {
    sizing: &'a dyn SizingProvider,
    hooks: PlatformHooks,
    convert_oversized: bool,
}

impl std::fmt::Debug for StructLayoutBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructLayoutBuilder")
            .field("word_size", &self.sizing.word_size())
            .field("hooks", &self.hooks)
            .field("convert_oversized", &self.convert_oversized)
            .finish()
    }
}

impl<'a> StructLayoutBuilder<'a> {
    pub fn new(sizing: &'a dyn SizingProvider, config: &CompilationConfig) -> Self {
        Self {
            sizing,
            hooks: config.hooks(),
            convert_oversized: config.convert_oversized_members,
        }
    }

    /// Builder with explicit hooks, for callers providing their own
    /// platform strategy.
    pub fn with_hooks(sizing: &'a dyn SizingProvider, hooks: PlatformHooks, convert_oversized: bool) -> Self {
        Self {
            sizing,
            hooks,
            convert_oversized,
        }
    }

    pub fn sizing(&self) -> &'a dyn SizingProvider {
        self.sizing
    }

    pub fn hooks(&self) -> PlatformHooks {
        self.hooks
    }

    /// Build the `kind` struct of `op`.
    ///
    /// `with_return` asks for the return value to travel in the buffer; it
    /// only has an effect on Out-carrying kinds of non-void operations.
    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    pub fn build(&self, op: &Operation, kind: StructKind, side: Side, with_return: bool) -> Result<MessageStruct, LayoutError> {
        match self.build_members(op, kind, with_return) {
            Ok(members) => {
                let built = Self::arrange(op, kind, members);
                debug!(
                    operation = %op.name,
                    kind = %kind,
                    side = ?side,
                    members = built.members.len(),
                    fixed_size = built.fixed_size,
                    variable_tail = built.has_variable_tail,
                    "built message struct"
                );
                Ok(built)
            }
            Err(e) => {
                error!(operation = %op.name, kind = %kind, error = %e, "struct layout failed");
                Err(e)
            }
        }
    }

    fn build_members(&self, op: &Operation, kind: StructKind, with_return: bool) -> Result<Vec<StructMember>, LayoutError> {
        if !kind.is_buildable() {
            return Err(LayoutError::InvalidStructKind {
                operation: op.name.clone(),
                kind,
            });
        }
        if kind == StructKind::Exception && op.attributes.noexceptions {
            return Err(LayoutError::UnsupportedAttributeCombination {
                operation: op.name.clone(),
                parameter: None,
                reason: "an exception struct was requested for an operation declared noexceptions".into(),
            });
        }

        let word = self.sizing.word_size();
        let mut members = Vec::new();

        if kind.carries_in() && !op.attributes.noopcode {
            members.push(StructMember::fixed(MemberKind::OpcodeWord, word, word, Directions::IN));
        }

        for param in &op.parameters {
            if param.implicit.is_some() || param.attributes.ignore {
                continue;
            }
            let directions = Directions {
                input: kind.carries_in() && param.has_in(),
                output: kind.carries_out() && param.has_out(),
            };
            if !directions.input && !directions.output {
                continue;
            }
            self.check_bound_targets(op, param)?;
            members.push(self.param_member(op, param, directions)?);
        }

        if kind.carries_out() && with_return && op.has_return() {
            let ty = &op.return_type;
            members.push(StructMember::fixed(
                MemberKind::ReturnValue,
                self.sizing.size_of(ty),
                self.alignment_for(ty),
                Directions::OUT,
            ));
        }

        if kind.carries_out() && !op.attributes.noexceptions {
            members.push(StructMember::fixed(MemberKind::ExceptionWord, word, word, Directions::OUT));
        }

        if self.hooks.zero_flexpage_delimiter
            && let Some(last) = members.iter().rposition(|m| m.kind.is_flexpage())
        {
            let size = self.sizing.flexpage_size();
            let directions = members.get(last).map(|m| m.directions).unwrap_or_default();
            members.insert(
                last + 1,
                StructMember::fixed(MemberKind::ZeroFlexpageDelimiter, size, word, directions),
            );
        }

        if self.convert_oversized {
            self.convert_oversized_members(op, kind, &mut members);
        }

        Ok(members)
    }

    fn alignment_for(&self, ty: &crate::model::ElementType) -> u64 {
        if self.hooks.align_to_type {
            self.sizing.align_of(ty)
        } else {
            self.sizing.word_size()
        }
    }

    fn check_bound_targets(&self, op: &Operation, param: &Parameter) -> Result<(), LayoutError> {
        let targets = [&param.attributes.size_is, &param.attributes.length_is];
        for target in targets.into_iter().flatten() {
            let resolves = target != &param.name && op.parameter(target).is_some();
            if !resolves {
                return Err(LayoutError::UnresolvedSizeTarget {
                    operation: op.name.clone(),
                    parameter: param.name.clone(),
                    target: target.clone(),
                });
            }
        }
        Ok(())
    }

    fn param_member(&self, op: &Operation, param: &Parameter, directions: Directions) -> Result<StructMember, LayoutError> {
        let word = self.sizing.word_size();

        if param.is_flexpage() {
            if !self.hooks.page_grants {
                return Err(LayoutError::UnsupportedAttributeCombination {
                    operation: op.name.clone(),
                    parameter: Some(param.name.clone()),
                    reason: format!(
                        "flexpage parameter '{}' needs page-grant descriptors, which the platform lacks",
                        param.name
                    ),
                });
            }
            let bytes = self
                .sizing
                .flexpage_size()
                .saturating_mul(param.static_element_count());
            return Ok(StructMember::fixed(
                MemberKind::FlexpageDescriptor {
                    param: param.name.clone(),
                },
                bytes,
                word,
                directions,
            ));
        }

        if param.is_indirect() {
            return Ok(StructMember::fixed(
                MemberKind::RefstringDescriptor {
                    param: param.name.clone(),
                },
                self.sizing.refstring_size(),
                word,
                directions,
            ));
        }

        let element = self
            .sizing
            .size_of(&param.ty)
            .saturating_mul(param.static_element_count());
        let kind = MemberKind::Parameter {
            name: param.name.clone(),
        };
        let alignment = self.alignment_for(&param.ty);
        if !param.is_variable_sized() {
            return Ok(StructMember::fixed(kind, element, alignment, directions));
        }
        let (max, source) = self.resolve_max(op, param, element)?;
        Ok(StructMember::new(
            kind,
            MemberSize::Variable {
                element,
                max,
                source,
            },
            alignment,
            directions,
        ))
    }

    /// Maximum bytes of a variable member: its own `max_is`, then the
    /// `max_is` of its size parameter, then a static first dimension, then
    /// the platform default.
    fn resolve_max(&self, op: &Operation, param: &Parameter, element: u64) -> Result<(u64, BoundSource), LayoutError> {
        let target_max = param
            .dynamic_bound()
            .and_then(|t| op.parameter(t))
            .and_then(|t| t.attributes.max_is);
        if let Some(count) = param.attributes.max_is.or(target_max) {
            return Ok((count.saturating_mul(element), BoundSource::MaxIs));
        }
        if let Some(count) = param.first_fixed_dimension() {
            return Ok((count.saturating_mul(element), BoundSource::Static));
        }
        self.sizing
            .max_size_for(&param.ty)
            .map(|bytes| (bytes, BoundSource::PlatformDefault))
            .ok_or_else(|| LayoutError::UnboundedVariableMember {
                operation: op.name.clone(),
                parameter: param.name.clone(),
            })
    }

    /// Turn parameter members into refstrings until the struct fits the
    /// maximum message size.
    #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
    fn convert_oversized_members(&self, op: &Operation, kind: StructKind, members: &mut [StructMember]) {
        let limit = self.sizing.max_message_bytes();
        let descriptor = self.sizing.refstring_size();
        let word = self.sizing.word_size();

        loop {
            let extent = Self::arrange(op, kind, members.to_vec()).max_size();
            if extent <= limit {
                return;
            }
            let is_param = |m: &StructMember| matches!(m.kind, MemberKind::Parameter { .. });
            let pick = members
                .iter()
                .position(|m| is_param(m) && m.size.max_bytes() > limit)
                .or_else(|| members.iter().position(|m| is_param(m) && m.is_variable()))
                .or_else(|| {
                    members
                        .iter()
                        .enumerate()
                        .filter(|(_, m)| is_param(m) && m.size.fixed_bytes() > descriptor)
                        .max_by_key(|(i, m)| (m.size.fixed_bytes(), Reverse(*i)))
                        .map(|(i, _)| i)
                });
            let Some(member) = pick.and_then(|i| members.get_mut(i)) else {
                return;
            };
            let Some(name) = member.param_name().map(str::to_owned) else {
                return;
            };
            debug!(operation = %op.name, kind = %kind, member = %name, extent, "converting oversized member to refstring");
            *member = StructMember::fixed(
                MemberKind::RefstringDescriptor { param: name },
                descriptor,
                word,
                member.directions,
            );
        }
    }

    /// Stable-partition fixed before variable members and assign offsets.
    ///
    /// Variable members after the first keep `offset: None`: where they
    /// start depends on the runtime lengths before them.
    fn arrange(op: &Operation, kind: StructKind, members: Vec<StructMember>) -> MessageStruct {
        let (mut fixed, mut variable): (Vec<_>, Vec<_>) =
            members.into_iter().partition(|m| !m.is_variable());

        let mut offset = 0;
        for member in &mut fixed {
            offset = align_to(offset, member.alignment);
            member.offset = Some(offset);
            offset = offset.saturating_add(member.size.fixed_bytes());
        }
        let fixed_size = offset;
        // only the first variable member has a static start
        if let Some(first) = variable.first_mut() {
            first.offset = Some(align_to(offset, first.alignment));
        }

        let has_variable_tail = !variable.is_empty();
        fixed.append(&mut variable);
        MessageStruct {
            kind,
            operation: op.name.clone(),
            members: fixed,
            fixed_size,
            has_variable_tail,
        }
    }
}
