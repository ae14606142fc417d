//! Per-operation message size summary.

use serde::Serialize;

use super::layout::{MessageStruct, SizeBound};
use crate::sizing::SizingProvider;

/// Word and refstring counts of an operation's In and Out structs.
///
/// Displays as the `/* MsgSize ... */` annotation placed before call
/// sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MsgSizeSummary {
    pub opcode: u64,
    pub in_words: u64,
    pub in_strings: u64,
    pub out_words: u64,
    pub out_strings: u64,
}

impl MsgSizeSummary {
    pub fn new(opcode: u64, input: &MessageStruct, output: &MessageStruct, sizing: &dyn SizingProvider) -> Self {
        Self {
            opcode,
            in_words: input.word_count(SizeBound::Max, sizing),
            in_strings: input.refstring_count(),
            out_words: output.word_count(SizeBound::Max, sizing),
            out_strings: output.refstring_count(),
        }
    }
}

impl std::fmt::Display for MsgSizeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "/* MsgSize {} {} {} {} {} */",
            self.opcode, self.in_words, self.in_strings, self.out_words, self.out_strings
        )
    }
}
