//! Platform primitive sizes.
//!
//! The layout engine never hard-codes a byte count; every size goes through
//! a [`SizingProvider`]. [`PlatformSizes`] is the table-driven provider used
//! for the supported (platform, architecture) pairs.

use serde::{Deserialize, Serialize};

use crate::model::ElementType;

/// Target IPC platform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    L4v2,
    L4x0,
    L4v4,
    Fiasco,
    /// Plain socket transport used for testing generated stubs.
    Sock,
}

impl Platform {
    /// Microkernel platforms with page grants and refstrings.
    pub fn is_l4(&self) -> bool {
        !matches!(self, Platform::Sock)
    }
}

/// Target architecture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    #[default]
    Ia32,
    Amd64,
    Arm,
}

/// Primitive sizes of one target.
pub trait SizingProvider {
    /// Bytes in a machine word.
    fn word_size(&self) -> u64;

    /// Largest payload that fits the register-only transfer path.
    fn max_short_transfer_bytes(&self) -> u64;

    /// Bytes reserved for an unbounded array of `ty` when nothing else bounds
    /// it, or `None` when the platform has no default.
    fn max_size_for(&self, ty: &ElementType) -> Option<u64>;

    /// Bytes of one element of `ty`.
    fn size_of(&self, ty: &ElementType) -> u64;

    fn refstring_size(&self) -> u64;

    fn flexpage_size(&self) -> u64;

    /// Upper bound of a whole message buffer.
    fn max_message_bytes(&self) -> u64;

    /// Natural alignment of `ty`, never zero.
    fn align_of(&self, ty: &ElementType) -> u64 {
        match ty {
            ElementType::Struct { align, .. } => (*align).max(1),
            ElementType::Flexpage => self.word_size(),
            other => self.size_of(other).clamp(1, self.word_size().max(1)),
        }
    }
}

/// Table-driven [`SizingProvider`] for a (platform, arch) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformSizes {
    platform: Platform,
    arch: Arch,
}

const MAX_MESSAGE_BYTES: u64 = 4096;

impl PlatformSizes {
    pub fn new(platform: Platform, arch: Arch) -> Self {
        Self { platform, arch }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn arch(&self) -> Arch {
        self.arch
    }

    fn short_transfer_words(&self) -> u64 {
        match self.platform {
            Platform::L4v2 | Platform::Fiasco => 2,
            Platform::L4x0 => 3,
            Platform::L4v4 => 64,
            Platform::Sock => 0,
        }
    }
}

impl SizingProvider for PlatformSizes {
    fn word_size(&self) -> u64 {
        match self.arch {
            Arch::Ia32 | Arch::Arm => 4,
            Arch::Amd64 => 8,
        }
    }

    fn max_short_transfer_bytes(&self) -> u64 {
        self.short_transfer_words() * self.word_size()
    }

    fn max_size_for(&self, ty: &ElementType) -> Option<u64> {
        if ty.is_constructed() || !self.platform.is_l4() {
            return None;
        }
        Some(MAX_MESSAGE_BYTES)
    }

    fn size_of(&self, ty: &ElementType) -> u64 {
        match ty {
            ElementType::Void => 0,
            ElementType::Boolean | ElementType::Char | ElementType::Byte => 1,
            ElementType::Short => 2,
            ElementType::Int | ElementType::Float => 4,
            ElementType::LongLong | ElementType::Double => 8,
            ElementType::Long | ElementType::Word => self.word_size(),
            ElementType::Flexpage => self.flexpage_size(),
            ElementType::Struct { size, .. } => *size,
        }
    }

    fn refstring_size(&self) -> u64 {
        let words = match self.platform {
            Platform::L4v2 | Platform::L4x0 | Platform::Fiasco => 4,
            Platform::L4v4 | Platform::Sock => 2,
        };
        words * self.word_size()
    }

    fn flexpage_size(&self) -> u64 {
        2 * self.word_size()
    }

    fn max_message_bytes(&self) -> u64 {
        MAX_MESSAGE_BYTES
    }
}
