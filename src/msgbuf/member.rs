//! Struct members and their sizes.

use serde::Serialize;

/// What a struct member stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum MemberKind {
    /// A parameter laid out inline.
    Parameter { name: String },
    OpcodeWord,
    ExceptionWord,
    ReturnValue,
    /// Pointer and length of a parameter transferred out of band.
    RefstringDescriptor { param: String },
    FlexpageDescriptor { param: String },
    /// All-zero flexpage closing the flexpage list.
    ZeroFlexpageDelimiter,
}

impl MemberKind {
    /// Name of the parameter this member carries, if any.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            MemberKind::Parameter { name } => Some(name),
            MemberKind::RefstringDescriptor { param } | MemberKind::FlexpageDescriptor { param } => {
                Some(param)
            }
            _ => None,
        }
    }

    pub fn is_refstring(&self) -> bool {
        matches!(self, MemberKind::RefstringDescriptor { .. })
    }

    pub fn is_flexpage(&self) -> bool {
        matches!(
            self,
            MemberKind::FlexpageDescriptor { .. } | MemberKind::ZeroFlexpageDelimiter
        )
    }
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKind::Parameter { name } => write!(f, "{name}"),
            MemberKind::OpcodeWord => f.write_str("<opcode>"),
            MemberKind::ExceptionWord => f.write_str("<exception>"),
            MemberKind::ReturnValue => f.write_str("<return>"),
            MemberKind::RefstringDescriptor { param } => write!(f, "refstring({param})"),
            MemberKind::FlexpageDescriptor { param } => write!(f, "fpage({param})"),
            MemberKind::ZeroFlexpageDelimiter => f.write_str("<zero-fpage>"),
        }
    }
}

/// Where the maximum of a variable member came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundSource {
    /// A fixed first array dimension.
    Static,
    /// A `max_is` on the member or on its size parameter.
    MaxIs,
    /// The sizing provider's unbounded-array default.
    PlatformDefault,
}

/// Wire footprint of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case", tag = "type")]
pub enum MemberSize {
    Fixed { bytes: u64 },
    /// Runtime-sized; `element` bytes per counted element, at most `max`
    /// bytes in total.
    Variable {
        element: u64,
        max: u64,
        source: BoundSource,
    },
}

impl MemberSize {
    pub fn is_variable(&self) -> bool {
        matches!(self, MemberSize::Variable { .. })
    }

    /// Bytes the member always occupies.
    pub fn fixed_bytes(&self) -> u64 {
        match self {
            MemberSize::Fixed { bytes } => *bytes,
            MemberSize::Variable { .. } => 0,
        }
    }

    /// Bytes the member can occupy at most.
    pub fn max_bytes(&self) -> u64 {
        match self {
            MemberSize::Fixed { bytes } => *bytes,
            MemberSize::Variable { max, .. } => *max,
        }
    }
}

/// The transfer directions a member serves.
///
/// Only Generic structs carry members tagged with both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Directions {
    pub input: bool,
    pub output: bool,
}

impl Directions {
    pub const IN: Directions = Directions {
        input: true,
        output: false,
    };
    pub const OUT: Directions = Directions {
        input: false,
        output: true,
    };
    pub const BOTH: Directions = Directions {
        input: true,
        output: true,
    };
}

/// One member of a [`MessageStruct`](super::MessageStruct).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StructMember {
    pub kind: MemberKind,
    pub size: MemberSize,
    pub alignment: u64,
    /// Byte offset, `None` until the struct is laid out.
    ///
    /// Stays `None` for every variable member but the first, whose start
    /// is only known once the lengths before it are.
    pub offset: Option<u64>,
    pub directions: Directions,
}

impl StructMember {
    pub(crate) fn new(kind: MemberKind, size: MemberSize, alignment: u64, directions: Directions) -> Self {
        Self {
            kind,
            size,
            alignment: alignment.max(1),
            offset: None,
            directions,
        }
    }

    pub(crate) fn fixed(kind: MemberKind, bytes: u64, alignment: u64, directions: Directions) -> Self {
        Self::new(kind, MemberSize::Fixed { bytes }, alignment, directions)
    }

    pub fn is_variable(&self) -> bool {
        self.size.is_variable()
    }

    /// The member starts at a position known when the struct is laid out.
    pub fn has_static_offset(&self) -> bool {
        self.offset.is_some()
    }

    pub fn param_name(&self) -> Option<&str> {
        self.kind.param_name()
    }

    /// The member carries parameter `name`, inline or through a descriptor.
    pub fn carries(&self, name: &str) -> bool {
        self.param_name() == Some(name)
    }
}
