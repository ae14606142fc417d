//! Parameter-level types of the interface model.
//!
//! These mirror what the IDL front end hands over after parsing: element
//! types, indirection, array bounds and the attribute set of every
//! parameter. They are immutable once built.

use serde::{Deserialize, Serialize};

/// Element type of a parameter, return value or struct member.
///
/// Sizes are not stored here; they come from the platform's
/// [`SizingProvider`](crate::sizing::SizingProvider).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementType {
    #[default]
    Void,
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    LongLong,
    Float,
    Double,
    /// Machine word (`mword`).
    Word,
    /// Page-grant descriptor source.
    Flexpage,
    /// A user-defined constructed type with a size known to the front end.
    Struct { name: String, size: u64, align: u64 },
}

impl ElementType {
    /// Returns `true` for the `void` type.
    pub fn is_void(&self) -> bool {
        matches!(self, ElementType::Void)
    }

    /// Returns `true` for constructed (user struct) types.
    pub fn is_constructed(&self) -> bool {
        matches!(self, ElementType::Struct { .. })
    }

    /// Short human-readable name, used in diagnostics.
    pub fn display_name(&self) -> &str {
        match self {
            ElementType::Void => "void",
            ElementType::Boolean => "boolean",
            ElementType::Char => "char",
            ElementType::Byte => "byte",
            ElementType::Short => "short",
            ElementType::Int => "int",
            ElementType::Long => "long",
            ElementType::LongLong => "long long",
            ElementType::Float => "float",
            ElementType::Double => "double",
            ElementType::Word => "mword",
            ElementType::Flexpage => "fpage",
            ElementType::Struct { name, .. } => name,
        }
    }
}

/// One array dimension of a parameter declarator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArrayBound {
    /// `name[4]`
    Fixed(u64),
    /// `name[]`
    Open,
}

/// Implicit parameters added by the back end rather than declared in IDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImplicitParam {
    /// The object reference (`CORBA_Object`).
    Object,
    /// The environment / exception carrier (`CORBA_Environment`).
    Environment,
}

/// Attribute set attached to a parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamAttributes {
    #[serde(rename = "in")]
    pub in_dir: bool,
    #[serde(rename = "out")]
    pub out_dir: bool,
    pub string: bool,
    #[serde(rename = "ref")]
    pub reference: bool,
    /// Name of the sibling parameter holding the element count.
    pub size_is: Option<String>,
    /// Name of the sibling parameter holding the transmitted length.
    pub length_is: Option<String>,
    /// Static maximum element count (or maximum value when set on a
    /// size parameter).
    pub max_is: Option<u64>,
    pub ignore: bool,
    pub prealloc: bool,
}

/// One parameter of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ElementType,
    /// Indirection depth (number of `*` in the declarator).
    #[serde(default)]
    pub pointers: u32,
    #[serde(default)]
    pub bounds: Vec<ArrayBound>,
    #[serde(default)]
    pub attributes: ParamAttributes,
    #[serde(default)]
    pub implicit: Option<ImplicitParam>,
}

impl Parameter {
    /// Create a plain parameter without attributes.
    pub fn new(name: impl Into<String>, ty: ElementType) -> Self {
        Self {
            name: name.into(),
            ty,
            pointers: 0,
            bounds: Vec::new(),
            attributes: ParamAttributes::default(),
            implicit: None,
        }
    }

    /// Builder-style helper: mark as `[in]`.
    pub fn input(mut self) -> Self {
        self.attributes.in_dir = true;
        self
    }

    /// Builder-style helper: mark as `[out]`, adding a level of indirection.
    pub fn output(mut self) -> Self {
        self.attributes.out_dir = true;
        if self.pointers == 0 {
            self.pointers = 1;
        }
        self
    }

    /// Builder-style helper: mark as `[string]`.
    pub fn string(mut self) -> Self {
        self.attributes.string = true;
        if self.pointers == 0 {
            self.pointers = 1;
        }
        self
    }

    /// Builder-style helper: mark as `[ref]`.
    pub fn reference(mut self) -> Self {
        self.attributes.reference = true;
        self
    }

    /// Builder-style helper: `[size_is(target)]` with an open first dimension.
    pub fn size_is(mut self, target: impl Into<String>) -> Self {
        self.attributes.size_is = Some(target.into());
        if self.bounds.is_empty() {
            self.bounds.push(ArrayBound::Open);
        }
        self
    }

    /// Builder-style helper: `[length_is(target)]`.
    pub fn length_is(mut self, target: impl Into<String>) -> Self {
        self.attributes.length_is = Some(target.into());
        self
    }

    /// Builder-style helper: `[max_is(n)]`.
    pub fn max_is(mut self, max: u64) -> Self {
        self.attributes.max_is = Some(max);
        self
    }

    /// Builder-style helper: append an array dimension.
    pub fn bound(mut self, bound: ArrayBound) -> Self {
        self.bounds.push(bound);
        self
    }

    /// Builder-style helper: mark as `[ignore]`.
    pub fn ignored(mut self) -> Self {
        self.attributes.ignore = true;
        self
    }

    /// Builder-style helper: mark as `[prealloc]`.
    pub fn prealloc(mut self) -> Self {
        self.attributes.prealloc = true;
        self
    }

    /// `[in]`, which is also the direction of a parameter declaring none.
    pub fn has_in(&self) -> bool {
        self.attributes.in_dir || !self.attributes.out_dir
    }

    pub fn has_out(&self) -> bool {
        self.attributes.out_dir
    }

    /// Transmitted out of band through a refstring descriptor.
    pub fn is_indirect(&self) -> bool {
        self.attributes.string || self.attributes.reference
    }

    pub fn is_flexpage(&self) -> bool {
        self.ty == ElementType::Flexpage
    }

    /// The dynamic bound target, `size_is` taking precedence over `length_is`.
    pub fn dynamic_bound(&self) -> Option<&str> {
        self.attributes
            .size_is
            .as_deref()
            .or(self.attributes.length_is.as_deref())
    }

    /// Whether the inline wire footprint of this parameter depends on a
    /// runtime value.
    ///
    /// A dynamic bound attribute wins over a coincidental static first
    /// dimension. Indirect and flexpage parameters are always fixed because
    /// only their descriptor travels inline.
    pub fn is_variable_sized(&self) -> bool {
        if self.is_indirect() || self.is_flexpage() {
            return false;
        }
        self.dynamic_bound().is_some() || self.bounds.contains(&ArrayBound::Open)
    }

    /// Product of the fixed dimensions that stay static.
    ///
    /// For variable-sized parameters the first dimension is the dynamic one
    /// and is left out.
    pub fn static_element_count(&self) -> u64 {
        let skip = usize::from(self.is_variable_sized());
        self.bounds
            .iter()
            .skip(skip)
            .map(|b| match b {
                ArrayBound::Fixed(n) => *n,
                ArrayBound::Open => 1,
            })
            .product()
    }

    /// The static first dimension when it is fixed.
    pub fn first_fixed_dimension(&self) -> Option<u64> {
        match self.bounds.first() {
            Some(ArrayBound::Fixed(n)) => Some(*n),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_sized_rules() {
        let n = Parameter::new("n", ElementType::Int).input();
        assert!(!n.is_variable_sized());

        let arr = Parameter::new("arr", ElementType::Int).input().size_is("n");
        assert!(arr.is_variable_sized());

        // dynamic bound wins over a static dimension
        let mixed = Parameter::new("buf", ElementType::Byte)
            .input()
            .bound(ArrayBound::Fixed(16))
            .length_is("len");
        assert!(mixed.is_variable_sized());
        assert_eq!(mixed.first_fixed_dimension(), Some(16));

        let s = Parameter::new("s", ElementType::Char).input().string();
        assert!(!s.is_variable_sized());
        assert!(s.is_indirect());

        let plain = Parameter::new("p", ElementType::Int);
        assert!(plain.has_in());
        assert!(!Parameter::new("o", ElementType::Int).output().has_in());
    }

    #[test]
    fn test_static_element_count() {
        let grid = Parameter::new("grid", ElementType::Int)
            .bound(ArrayBound::Fixed(3))
            .bound(ArrayBound::Fixed(4));
        assert_eq!(grid.static_element_count(), 12);

        let rows = Parameter::new("rows", ElementType::Int)
            .size_is("n")
            .bound(ArrayBound::Fixed(4));
        assert_eq!(rows.static_element_count(), 4);
    }

    #[test]
    fn test_parse_parameter_toml() {
        let src = r#"
name = "buf"
type = "byte"
bounds = ["open"]
attributes = { in = true, size_is = "len", max_is = 64 }
"#;
        let p: Parameter = toml::from_str(src).unwrap();
        assert!(p.has_in());
        assert_eq!(p.dynamic_bound(), Some("len"));
        assert_eq!(p.attributes.max_is, Some(64));
    }
}
