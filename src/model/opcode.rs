//! Opcode assignment.
//!
//! Every operation gets a numeric opcode composed of its interface number
//! and a function id unique among interfaces sharing that number:
//!
//! ```text
//! opcode = (interface_number << interface_number_bits) | function_id
//! ```
//!
//! Interface numbers come from the interface `uuid` attribute or are one
//! above the highest base interface number. Function ids come from the
//! operation `uuid` attribute or are counted in declaration order after the
//! ranges already claimed by same-numbered base interfaces.

use std::collections::HashMap;

use serde::Serialize;

use super::error::ModelError;
use super::interface::{Interface, Module, Operation};

/// The key a dispatch table matches an incoming opcode against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchKey {
    Single(u64),
    /// Inclusive range of opcodes served by one operation.
    Range { lo: u64, hi: u64 },
}

impl DispatchKey {
    fn bounds(&self) -> (u64, u64) {
        match *self {
            DispatchKey::Single(v) => (v, v),
            DispatchKey::Range { lo, hi } => (lo, hi),
        }
    }

    /// Whether the two keys would match a common opcode.
    pub fn overlaps(&self, other: &DispatchKey) -> bool {
        let (a_lo, a_hi) = self.bounds();
        let (b_lo, b_hi) = other.bounds();
        a_lo <= b_hi && b_lo <= a_hi
    }

    pub fn contains(&self, opcode: u64) -> bool {
        let (lo, hi) = self.bounds();
        (lo..=hi).contains(&opcode)
    }
}

impl std::fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchKey::Single(v) => write!(f, "{v:#x}"),
            DispatchKey::Range { lo, hi } => write!(f, "{lo:#x}..={hi:#x}"),
        }
    }
}

/// The numeric identity of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Opcode {
    pub interface_number: u64,
    pub function_id: u64,
    /// The value carried in the OpcodeWord.
    pub value: u64,
    pub key: DispatchKey,
}

/// Computes interface numbers and opcodes for a [`Module`].
///
/// Results are memoized per interface so repeated lookups over deep
/// hierarchies stay linear.
#[derive(Debug)]
pub struct OpcodeAssigner<'m> {
    module: &'m Module,
    interface_bits: u32,
    numbers: HashMap<String, u64>,
}

impl<'m> OpcodeAssigner<'m> {
    pub fn new(module: &'m Module, interface_bits: u32) -> Self {
        Self {
            module,
            interface_bits,
            numbers: HashMap::new(),
        }
    }

    /// The interface number: `uuid` if declared, else max(bases) + 1.
    pub fn interface_number(&mut self, iface: &Interface) -> Result<u64, ModelError> {
        if let Some(n) = self.numbers.get(&iface.name) {
            return Ok(*n);
        }
        let number = match iface.attributes.uuid {
            Some(uuid) => uuid,
            None => {
                let mut highest: u64 = 0;
                for base in self.module.bases_of(iface)? {
                    highest = highest.max(self.interface_number(base)?);
                }
                highest
                    .checked_add(1)
                    .ok_or_else(|| ModelError::IdSpaceExhausted(iface.name.clone()))?
            }
        };
        self.numbers.insert(iface.name.clone(), number);
        Ok(number)
    }

    /// Base interfaces (transitively) that share `number`, deduplicated in
    /// discovery order.
    fn same_numbered_bases(&mut self, iface: &'m Interface, number: u64, out: &mut Vec<&'m Interface>) -> Result<(), ModelError> {
        for base in self.module.bases_of(iface)? {
            if self.interface_number(base)? == number && !out.iter().any(|i| i.name == base.name) {
                out.push(base);
            }
            self.same_numbered_bases(base, number, out)?;
        }
        Ok(())
    }

    /// Highest function id an interface can claim: its operation count or
    /// its largest predefined id, whichever is bigger.
    fn max_function_id(iface: &Interface) -> u64 {
        iface
            .operations
            .iter()
            .filter_map(|op| {
                op.attributes
                    .uuid
                    .or(op.attributes.uuid_range.map(|r| r.hi))
            })
            .fold(iface.operations.len() as u64, u64::max)
    }

    /// Inclusive id intervals claimed by `uuid` and `uuid_range`, sorted by
    /// their lower bound.
    fn predefined(ifaces: &[&Interface]) -> Vec<(u64, u64)> {
        let mut claimed: Vec<(u64, u64)> = ifaces
            .iter()
            .flat_map(|i| i.operations.iter())
            .flat_map(|op| {
                let uuid = op.attributes.uuid.map(|id| (id, id));
                let range = op.attributes.uuid_range.map(|r| (r.lo, r.hi));
                uuid.into_iter().chain(range)
            })
            .collect();
        claimed.sort_unstable();
        claimed
    }

    /// The first id at or above `candidate` outside every claimed interval.
    fn next_unclaimed(claimed: &[(u64, u64)], candidate: u64) -> Option<u64> {
        let mut id = candidate;
        for &(lo, hi) in claimed {
            if (lo..=hi).contains(&id) {
                id = hi.checked_add(1)?;
            }
        }
        Some(id)
    }

    /// Whether `id` stays below the interface-number field.
    fn fits_function_field(&self, id: u64) -> bool {
        id.checked_shr(self.interface_bits).is_none_or(|high| high == 0)
    }

    /// The function id of `op` within `iface`.
    pub fn function_id(&mut self, iface: &'m Interface, op: &Operation) -> Result<u64, ModelError> {
        if let Some(uuid) = op.attributes.uuid {
            return Ok(uuid);
        }
        if let Some(range) = op.attributes.uuid_range {
            return Ok(range.lo);
        }
        let number = self.interface_number(iface)?;
        let mut group = Vec::new();
        self.same_numbered_bases(iface, number, &mut group)?;
        let exhausted = || ModelError::IdSpaceExhausted(iface.name.clone());
        let mut start = group
            .iter()
            .try_fold(0u64, |acc, i| acc.checked_add(Self::max_function_id(i)))
            .ok_or_else(exhausted)?;
        group.push(iface);
        let claimed = Self::predefined(&group);

        for current in &iface.operations {
            start = start
                .checked_add(1)
                .and_then(|id| Self::next_unclaimed(&claimed, id))
                .ok_or_else(exhausted)?;
            if current.name == op.name {
                return Ok(start);
            }
        }
        Err(ModelError::UnknownOperation {
            interface: iface.name.clone(),
            operation: op.name.clone(),
        })
    }

    /// The complete opcode of `op` declared in `iface`.
    pub fn opcode(&mut self, iface: &'m Interface, op: &Operation) -> Result<Opcode, ModelError> {
        let interface_number = self.interface_number(iface)?;
        let function_id = self.function_id(iface, op)?;
        let highest_id = op.attributes.uuid_range.map_or(function_id, |r| r.hi);
        if !self.fits_function_field(highest_id) {
            return Err(ModelError::FunctionIdOverflow {
                interface: iface.name.clone(),
                operation: op.name.clone(),
                function_id: highest_id,
                bits: self.interface_bits,
            });
        }
        let base = interface_number
            .checked_shl(self.interface_bits)
            .filter(|b| b >> self.interface_bits == interface_number)
            .ok_or_else(|| ModelError::OpcodeOverflow {
                interface: iface.name.clone(),
                number: interface_number,
                bits: self.interface_bits,
            })?;
        let key = match op.attributes.uuid_range {
            Some(range) => DispatchKey::Range {
                lo: base | range.lo,
                hi: base | range.hi,
            },
            None => DispatchKey::Single(base | function_id),
        };
        Ok(Opcode {
            interface_number,
            function_id,
            value: base | function_id,
            key,
        })
    }
}
