//! Interface-wide superset buffer.

use serde::Serialize;

use super::error::LayoutError;
use super::kind::StructKind;
use super::layout::{SizeBound, StructLayoutBuilder};
use crate::model::Operation;
use crate::role::Side;
use crate::sizing::SizingProvider;

/// A buffer large enough for any message of an interface and its bases.
///
/// Receive paths that learn the opcode only after the message arrived
/// (wait-any, dispatch) receive into this buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassBuffer {
    pub interface: String,
    /// Message words, always at least one for the opcode.
    pub words: u64,
    pub strings: u64,
}

impl ClassBuffer {
    /// Cover the In, Out and Generic structs of every operation.
    pub fn for_operations<'o>(
        interface: &str,
        operations: impl IntoIterator<Item = &'o Operation>,
        builder: &StructLayoutBuilder<'_>,
    ) -> Result<Self, LayoutError> {
        let sizing = builder.sizing();
        let mut words = 1;
        let mut strings = 0;
        for op in operations {
            for kind in [StructKind::Generic, StructKind::In, StructKind::Out] {
                let built = builder.build(op, kind, Side::Component, true)?;
                words = words.max(built.word_count(SizeBound::Max, sizing));
                strings = strings.max(built.refstring_count());
            }
        }
        Ok(Self {
            interface: interface.to_string(),
            words,
            strings,
        })
    }

    /// Bytes the buffer occupies on the target.
    pub fn size_bytes(&self, sizing: &dyn SizingProvider) -> u64 {
        self.words
            .saturating_mul(sizing.word_size())
            .saturating_add(self.strings.saturating_mul(sizing.refstring_size()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::CompilationConfig;
    use crate::model::{ElementType, Parameter};
    use crate::sizing::{Arch, Platform, PlatformSizes};

    #[test]
    fn test_superset_covers_largest() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let builder = StructLayoutBuilder::new(&sizes, &config);
        let ops = [
            Operation::new("small").param(Parameter::new("a", ElementType::Int).input()),
            Operation::new("wide")
                .param(Parameter::new("a", ElementType::LongLong).input())
                .param(Parameter::new("b", ElementType::LongLong).input()),
            Operation::new("named").param(Parameter::new("s", ElementType::Char).input().string()),
        ];
        let class = ClassBuffer::for_operations("demo", &ops, &builder).unwrap();
        // generic struct of wide: opcode, 2 * 8 bytes, exception = 6 words
        assert_eq!(class.words, 6);
        assert_eq!(class.strings, 1);
        assert_eq!(class.size_bytes(&sizes), 6 * 4 + 16);
    }

    #[test]
    fn test_empty_interface_has_opcode_room() {
        let sizes = PlatformSizes::new(Platform::L4v2, Arch::Ia32);
        let config = CompilationConfig::default();
        let builder = StructLayoutBuilder::new(&sizes, &config);
        let class = ClassBuffer::for_operations("empty", std::iter::empty(), &builder).unwrap();
        assert_eq!(class.words, 1);
        assert_eq!(class.strings, 0);
    }
}
