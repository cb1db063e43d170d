// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::EncodingError;

/// Location of a value inside a flags block: one 32-bit word, a shift and a mask.
///
/// Ranges never straddle two words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BitRange {
    pub word: u32,
    pub shift: u32,
    pub mask: u32,
}

impl BitRange {
    /// Places a `bits`-wide range at `start_bit`, moving to the beginning of the next
    /// word if the range would not fit into the current one.
    fn allocate(start_bit: u32, bits: u32) -> Self {
        debug_assert!((1..=32).contains(&bits));
        let mut word = start_bit / 32;
        let mut shift = start_bit % 32;
        if shift + bits > 32 {
            word += 1;
            shift = 0;
        }

        let mask = if bits == 32 {
            u32::MAX
        } else {
            ((1u32 << bits) - 1) << shift
        };

        Self { word, shift, mask }
    }

    /// Index of the first bit after this range.
    pub fn end_bit(&self) -> u32 {
        self.word * 32 + 32 - self.mask.leading_zeros()
    }

    #[inline]
    pub fn read(&self, flags: &[u32]) -> u32 {
        (flags[self.word as usize] & self.mask) >> self.shift
    }

    #[inline]
    pub fn write(&self, flags: &mut [u32], raw: u32) {
        let w = &mut flags[self.word as usize];
        *w = (*w & !self.mask) | ((raw << self.shift) & self.mask);
    }
}

/// An integer sub-field of the edge flags, with a declared domain `[min, max]`.
///
/// The value is stored as `value - min` in `bits` bits. A value stored in two
/// directions gets two independent ranges; a negated value uses a single range
/// and reads back as `-value` when accessed in reverse.
#[derive(Debug, Clone, PartialEq)]
pub struct IntEncodedValue {
    name: String,
    bits: u32,
    min: i32,
    max: i32,
    two_directions: bool,
    negate_reverse: bool,
    defined: bool,
    fwd: BitRange,
    bwd: BitRange,
}

impl IntEncodedValue {
    /// Creates a value with the full unsigned domain `[0, 2^bits - 1]`.
    pub fn new(name: &str, bits: u32, two_directions: bool) -> Result<Self, EncodingError> {
        check_width(name, bits)?;
        let max = if bits >= 31 {
            i32::MAX
        } else {
            (1i32 << bits) - 1
        };
        Self::with_domain(name, bits, 0, max, two_directions)
    }

    /// Creates a value restricted to the provided domain, which must fit into `bits` bits.
    pub fn with_domain(
        name: &str,
        bits: u32,
        min: i32,
        max: i32,
        two_directions: bool,
    ) -> Result<Self, EncodingError> {
        check_width(name, bits)?;
        let span = max as i64 - min as i64;
        if span < 0 || span > (1i64 << bits) - 1 {
            return Err(EncodingError::DomainTooWide {
                name: name.to_string(),
                bits,
                min: min as i64,
                max: max as i64,
            });
        }

        Ok(Self {
            name: name.to_string(),
            bits,
            min,
            max,
            two_directions,
            negate_reverse: false,
            defined: false,
            fwd: BitRange::default(),
            bwd: BitRange::default(),
        })
    }

    /// Creates a single-direction value with domain `[-max, max]`,
    /// which reads back negated when accessed in reverse (e.g. a signed slope).
    pub fn negated(name: &str, bits: u32, max: i32) -> Result<Self, EncodingError> {
        if max < 0 {
            return Err(EncodingError::InvalidNegation(name.to_string()));
        }
        let mut value = Self::with_domain(name, bits, -max, max, false)?;
        value.negate_reverse = true;
        Ok(value)
    }

    /// Allocates the bits of this value starting at `start_bit`,
    /// returning the first bit free for the next value.
    pub fn define_bits(&mut self, start_bit: u32) -> Result<u32, EncodingError> {
        if self.defined {
            return Err(EncodingError::AlreadyDefined(self.name.clone()));
        }

        self.fwd = BitRange::allocate(start_bit, self.bits);
        self.bwd = if self.two_directions {
            BitRange::allocate(self.fwd.end_bit(), self.bits)
        } else {
            self.fwd
        };
        self.defined = true;
        Ok(self.bwd.end_bit())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn is_two_directions(&self) -> bool {
        self.two_directions
    }

    pub fn is_negated_in_reverse(&self) -> bool {
        self.negate_reverse
    }

    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Bit ranges used for the forward and the backward direction.
    /// Both are equal for single-direction values.
    pub fn ranges(&self) -> (BitRange, BitRange) {
        (self.fwd, self.bwd)
    }

    pub fn set_int(&self, flags: &mut [u32], reverse: bool, value: i32) -> Result<(), EncodingError> {
        if !self.defined {
            return Err(EncodingError::Undefined(self.name.clone()));
        }

        let value = if reverse && self.negate_reverse {
            value.checked_neg().ok_or_else(|| self.out_of_range(value as f64))?
        } else {
            value
        };

        if value < self.min || value > self.max {
            return Err(self.out_of_range(value as f64));
        }

        let raw = (value as i64 - self.min as i64) as u32;
        self.range(reverse).write(flags, raw);
        Ok(())
    }

    #[inline]
    pub fn get_int(&self, flags: &[u32], reverse: bool) -> i32 {
        debug_assert!(self.defined, "{}: reading undefined bits", self.name);
        let value = (self.range(reverse).read(flags) as i64 + self.min as i64) as i32;
        if reverse && self.negate_reverse {
            -value
        } else {
            value
        }
    }

    /// Stores the top of the domain in every direction.
    pub(crate) fn fill_max(&self, flags: &mut [u32]) {
        let raw = (self.max as i64 - self.min as i64) as u32;
        self.fwd.write(flags, raw);
        if self.two_directions && !self.negate_reverse {
            self.bwd.write(flags, raw);
        }
    }

    /// Rewrites the flags so that what was readable forward becomes readable backward.
    pub(crate) fn reverse_in_place(&self, flags: &mut [u32]) {
        if self.two_directions {
            let fwd = self.fwd.read(flags);
            let bwd = self.bwd.read(flags);
            self.fwd.write(flags, bwd);
            self.bwd.write(flags, fwd);
        } else if self.negate_reverse {
            let value = self.get_int(flags, false);
            let raw = (-(value as i64) - self.min as i64) as u32;
            self.fwd.write(flags, raw);
        }
    }

    pub(crate) fn out_of_range(&self, value: f64) -> EncodingError {
        EncodingError::ValueOutOfRange {
            name: self.name.clone(),
            value,
            min: self.min as f64,
            max: self.max as f64,
        }
    }

    #[inline]
    fn range(&self, reverse: bool) -> &BitRange {
        if reverse {
            &self.bwd
        } else {
            &self.fwd
        }
    }
}

fn check_width(name: &str, bits: u32) -> Result<(), EncodingError> {
    if (1..=32).contains(&bits) {
        Ok(())
    } else {
        Err(EncodingError::InvalidWidth {
            name: name.to_string(),
            bits,
        })
    }
}
