// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use std::ops::{Deref, DerefMut};

use rustc_hash::FxHashMap;

use super::{
    BooleanEncodedValue, DecimalEncodedValue, EncodingError, EnumEncodedValue, IntEncodedValue,
};
use crate::storage::CRC64;

/// Any kind of encoded value, as registered in an [EncodingManager].
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Int(IntEncodedValue),
    Decimal(DecimalEncodedValue),
    Boolean(BooleanEncodedValue),
    Enum(EnumEncodedValue),
}

impl EncodedValue {
    pub fn name(&self) -> &str {
        self.as_int().name()
    }

    /// The underlying integer field, which carries the bit layout of every kind.
    pub fn as_int(&self) -> &IntEncodedValue {
        match self {
            Self::Int(v) => v,
            Self::Decimal(v) => v.int(),
            Self::Boolean(v) => v.int(),
            Self::Enum(v) => v.int(),
        }
    }

    fn as_int_mut(&mut self) -> &mut IntEncodedValue {
        match self {
            Self::Int(v) => v,
            Self::Decimal(v) => v.int_mut(),
            Self::Boolean(v) => v.int_mut(),
            Self::Enum(v) => v.int_mut(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "integer",
            Self::Decimal(_) => "decimal",
            Self::Boolean(_) => "boolean",
            Self::Enum(_) => "categorical",
        }
    }

    pub fn define_bits(&mut self, start_bit: u32) -> Result<u32, EncodingError> {
        self.as_int_mut().define_bits(start_bit)
    }

    fn hash_into(&self, digest: &mut crc::Digest<'_, u64>) {
        let int = self.as_int();
        digest.update(self.kind().as_bytes());
        digest.update(int.name().as_bytes());
        digest.update(&[0]);
        digest.update(&int.bits().to_le_bytes());
        digest.update(&int.min().to_le_bytes());
        digest.update(&int.max().to_le_bytes());
        digest.update(&[int.is_two_directions() as u8, int.is_negated_in_reverse() as u8]);

        let (fwd, bwd) = int.ranges();
        for r in [fwd, bwd] {
            digest.update(&r.word.to_le_bytes());
            digest.update(&r.shift.to_le_bytes());
            digest.update(&r.mask.to_le_bytes());
        }

        match self {
            Self::Decimal(v) => {
                digest.update(&v.factor().to_bits().to_le_bytes());
                digest.update(&[v.max_is_infinity() as u8]);
            }
            Self::Enum(v) => {
                for c in v.categories() {
                    digest.update(c.as_bytes());
                    digest.update(&[0]);
                }
            }
            Self::Int(_) | Self::Boolean(_) => {}
        }
    }
}

impl From<IntEncodedValue> for EncodedValue {
    fn from(v: IntEncodedValue) -> Self {
        Self::Int(v)
    }
}

impl From<DecimalEncodedValue> for EncodedValue {
    fn from(v: DecimalEncodedValue) -> Self {
        Self::Decimal(v)
    }
}

impl From<BooleanEncodedValue> for EncodedValue {
    fn from(v: BooleanEncodedValue) -> Self {
        Self::Boolean(v)
    }
}

impl From<EnumEncodedValue> for EncodedValue {
    fn from(v: EnumEncodedValue) -> Self {
        Self::Enum(v)
    }
}

/// A fixed-width block of `u32` words holding the encoded values of one edge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EdgeFlags(pub Vec<u32>);

impl Deref for EdgeFlags {
    type Target = [u32];

    fn deref(&self) -> &[u32] {
        &self.0
    }
}

impl DerefMut for EdgeFlags {
    fn deref_mut(&mut self) -> &mut [u32] {
        &mut self.0
    }
}

/// Collects encoded values and assigns them their bits.
#[derive(Debug, Default)]
pub struct EncodingManagerBuilder {
    values: Vec<EncodedValue>,
    next_bit: u32,
}

impl EncodingManagerBuilder {
    /// Registers a value. Values without a layout are placed right after the previous one,
    /// values with an already defined layout keep it.
    pub fn add<V: Into<EncodedValue>>(mut self, value: V) -> Result<Self, EncodingError> {
        let mut value = value.into();
        if self.values.iter().any(|v| v.name() == value.name()) {
            return Err(EncodingError::Duplicate(value.name().to_string()));
        }

        if value.as_int().is_defined() {
            let (_, bwd) = value.as_int().ranges();
            self.next_bit = self.next_bit.max(bwd.end_bit());
        } else {
            self.next_bit = value.define_bits(self.next_bit)?;
        }

        self.values.push(value);
        Ok(self)
    }

    /// Freezes the layout. Fails if any two values share a bit.
    pub fn build(self) -> Result<EncodingManager, EncodingError> {
        let mut ends = 0;
        for v in &self.values {
            let (fwd, bwd) = v.as_int().ranges();
            ends = ends.max(fwd.end_bit()).max(bwd.end_bit());
        }
        let ints_per_edge = ends.div_ceil(32).max(1);

        let mut occupied = vec![0u32; ints_per_edge as usize];
        let mut owners: Vec<Vec<(u32, usize)>> = vec![Vec::new(); ints_per_edge as usize];
        for (idx, v) in self.values.iter().enumerate() {
            let (fwd, bwd) = v.as_int().ranges();
            let ranges = if v.as_int().is_two_directions() {
                vec![fwd, bwd]
            } else {
                vec![fwd]
            };

            for r in ranges {
                let word = r.word as usize;
                if occupied[word] & r.mask != 0 {
                    let other = owners[word]
                        .iter()
                        .find(|(mask, _)| mask & r.mask != 0)
                        .map(|&(_, other)| self.values[other].name().to_string())
                        .unwrap_or_default();
                    return Err(EncodingError::Overlap {
                        first: other,
                        second: v.name().to_string(),
                        word: r.word,
                    });
                }
                occupied[word] |= r.mask;
                owners[word].push((r.mask, idx));
            }
        }

        let mut digest = CRC64.digest();
        digest.update(&ints_per_edge.to_le_bytes());
        for v in &self.values {
            v.hash_into(&mut digest);
        }
        let layout_hash = digest.finalize();

        let by_name = self
            .values
            .iter()
            .enumerate()
            .map(|(idx, v)| (v.name().to_string(), idx))
            .collect();

        log::debug!(
            "encoding layout: {} values in {} words (hash {:016x})",
            self.values.len(),
            ints_per_edge,
            layout_hash,
        );

        Ok(EncodingManager {
            values: self.values,
            by_name,
            ints_per_edge,
            layout_hash,
        })
    }
}

/// Frozen registry of every [EncodedValue] stored on the edges of a graph.
#[derive(Debug, Clone)]
pub struct EncodingManager {
    values: Vec<EncodedValue>,
    by_name: FxHashMap<String, usize>,
    ints_per_edge: u32,
    layout_hash: u64,
}

impl EncodingManager {
    pub fn builder() -> EncodingManagerBuilder {
        EncodingManagerBuilder::default()
    }

    pub fn ints_per_edge(&self) -> u32 {
        self.ints_per_edge
    }

    /// CRC-64 over all descriptors and their bit positions.
    /// Two managers with the same hash lay out edge flags identically.
    pub fn layout_hash(&self) -> u64 {
        self.layout_hash
    }

    pub fn values(&self) -> &[EncodedValue] {
        &self.values
    }

    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<&EncodedValue, EncodingError> {
        self.by_name
            .get(name)
            .map(|&idx| &self.values[idx])
            .ok_or_else(|| EncodingError::Unknown(name.to_string()))
    }

    pub fn int(&self, name: &str) -> Result<&IntEncodedValue, EncodingError> {
        match self.get(name)? {
            EncodedValue::Int(v) => Ok(v),
            _ => Err(wrong_kind(name, "integer")),
        }
    }

    pub fn decimal(&self, name: &str) -> Result<&DecimalEncodedValue, EncodingError> {
        match self.get(name)? {
            EncodedValue::Decimal(v) => Ok(v),
            _ => Err(wrong_kind(name, "decimal")),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<&BooleanEncodedValue, EncodingError> {
        match self.get(name)? {
            EncodedValue::Boolean(v) => Ok(v),
            _ => Err(wrong_kind(name, "boolean")),
        }
    }

    pub fn enumeration(&self, name: &str) -> Result<&EnumEncodedValue, EncodingError> {
        match self.get(name)? {
            EncodedValue::Enum(v) => Ok(v),
            _ => Err(wrong_kind(name, "categorical")),
        }
    }

    /// Returns flags of the right width with every value at its default: zero, except for
    /// decimals whose top stands for infinity, which start out unrestricted.
    pub fn create_flags(&self) -> EdgeFlags {
        let mut flags = EdgeFlags(vec![0; self.ints_per_edge as usize]);
        for v in &self.values {
            if let EncodedValue::Decimal(d) = v {
                if d.max_is_infinity() {
                    d.int().fill_max(&mut flags);
                }
            }
        }
        flags
    }

    /// Swaps every two-direction value between its forward and backward range,
    /// and negates every value negated in reverse. Applying it twice is a no-op.
    pub fn reverse_flags(&self, flags: &mut [u32]) {
        debug_assert_eq!(flags.len(), self.ints_per_edge as usize);
        for v in &self.values {
            v.as_int().reverse_in_place(flags);
        }
    }
}

fn wrong_kind(name: &str, expected: &'static str) -> EncodingError {
    EncodingError::WrongKind {
        name: name.to_string(),
        expected,
    }
}
