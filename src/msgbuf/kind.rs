//! Wire-struct kinds.

use serde::{Deserialize, Serialize};

/// Which of an operation's message structs is meant.
///
/// The order is total; [`StructKind::succ`] walks it and stops at the
/// [`StructKind::Max`] sentinel, which is never a buildable kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StructKind {
    /// One buffer serving both phases of a call.
    Generic,
    In,
    Out,
    /// The Out struct with the exception word guaranteed present.
    Exception,
    Max,
}

impl StructKind {
    /// The next kind in order; `Max` is its own successor.
    pub fn succ(self) -> StructKind {
        match self {
            StructKind::Generic => StructKind::In,
            StructKind::In => StructKind::Out,
            StructKind::Out => StructKind::Exception,
            StructKind::Exception | StructKind::Max => StructKind::Max,
        }
    }

    /// All buildable kinds, in order.
    pub fn all() -> impl Iterator<Item = StructKind> {
        std::iter::successors(Some(StructKind::Generic), |k| Some(k.succ()))
            .take_while(|k| *k != StructKind::Max)
    }

    pub fn is_buildable(self) -> bool {
        self != StructKind::Max
    }

    /// Whether parameters flowing into the component belong to this kind.
    pub fn carries_in(self) -> bool {
        matches!(self, StructKind::Generic | StructKind::In)
    }

    /// Whether parameters flowing back to the client belong to this kind.
    pub fn carries_out(self) -> bool {
        matches!(
            self,
            StructKind::Generic | StructKind::Out | StructKind::Exception
        )
    }
}

impl std::fmt::Display for StructKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StructKind::Generic => "generic",
            StructKind::In => "in",
            StructKind::Out => "out",
            StructKind::Exception => "exception",
            StructKind::Max => "max",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_order() {
        let kinds: Vec<_> = StructKind::all().collect();
        assert_eq!(
            kinds,
            vec![
                StructKind::Generic,
                StructKind::In,
                StructKind::Out,
                StructKind::Exception
            ]
        );
        assert_eq!(StructKind::Max.succ(), StructKind::Max);
        assert!(StructKind::In < StructKind::Out);
    }
}
