// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use super::{EncodingError, IntEncodedValue};

/// A decimal sub-field, stored as an integer multiple of `factor`.
///
/// When `max_is_infinity` is set, the largest storable integer represents
/// [f64::INFINITY] (e.g. an unrestricted max_height).
#[derive(Debug, Clone, PartialEq)]
pub struct DecimalEncodedValue {
    int: IntEncodedValue,
    factor: f64,
    max_is_infinity: bool,
}

impl DecimalEncodedValue {
    pub fn new(
        name: &str,
        bits: u32,
        factor: f64,
        two_directions: bool,
    ) -> Result<Self, EncodingError> {
        Self::from_int(IntEncodedValue::new(name, bits, two_directions)?, factor, false)
    }

    /// Same as [DecimalEncodedValue::new], but the top of the domain decodes to infinity.
    pub fn with_infinity(
        name: &str,
        bits: u32,
        factor: f64,
        two_directions: bool,
    ) -> Result<Self, EncodingError> {
        Self::from_int(IntEncodedValue::new(name, bits, two_directions)?, factor, true)
    }

    /// Wraps an arbitrary integer value, e.g. one created with [IntEncodedValue::negated].
    pub fn from_int(
        int: IntEncodedValue,
        factor: f64,
        max_is_infinity: bool,
    ) -> Result<Self, EncodingError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EncodingError::InvalidFactor {
                name: int.name().to_string(),
                factor,
            });
        }
        Ok(Self {
            int,
            factor,
            max_is_infinity,
        })
    }

    pub fn name(&self) -> &str {
        self.int.name()
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn max_is_infinity(&self) -> bool {
        self.max_is_infinity
    }

    pub fn int(&self) -> &IntEncodedValue {
        &self.int
    }

    pub(crate) fn int_mut(&mut self) -> &mut IntEncodedValue {
        &mut self.int
    }

    /// Largest finite value representable by this field.
    pub fn max_decimal(&self) -> f64 {
        let top = if self.max_is_infinity {
            self.int.max() - 1
        } else {
            self.int.max()
        };
        top as f64 * self.factor
    }

    pub fn set_decimal(
        &self,
        flags: &mut [u32],
        reverse: bool,
        value: f64,
    ) -> Result<(), EncodingError> {
        if value.is_nan() {
            return Err(self.int.out_of_range(value));
        }

        if value.is_infinite() {
            return if self.max_is_infinity && value > 0.0 {
                self.int.set_int(flags, reverse, self.int.max())
            } else {
                Err(self.int.out_of_range(value))
            };
        }

        let scaled = (value / self.factor).round();
        let top = if self.max_is_infinity {
            self.int.max() - 1
        } else {
            self.int.max()
        };
        let signed = if reverse && self.int.is_negated_in_reverse() {
            -scaled
        } else {
            scaled
        };
        if signed < self.int.min() as f64 || signed > top as f64 {
            return Err(EncodingError::ValueOutOfRange {
                name: self.name().to_string(),
                value,
                min: self.int.min() as f64 * self.factor,
                max: top as f64 * self.factor,
            });
        }

        self.int.set_int(flags, reverse, scaled as i32)
    }

    #[inline]
    pub fn get_decimal(&self, flags: &[u32], reverse: bool) -> f64 {
        let raw = self.int.get_int(flags, reverse);
        if self.max_is_infinity && raw == self.int.max() {
            f64::INFINITY
        } else {
            raw as f64 * self.factor
        }
    }
}

/// A single-bit (per direction) flag.
#[derive(Debug, Clone, PartialEq)]
pub struct BooleanEncodedValue {
    int: IntEncodedValue,
}

impl BooleanEncodedValue {
    pub fn new(name: &str, two_directions: bool) -> Result<Self, EncodingError> {
        Ok(Self {
            int: IntEncodedValue::new(name, 1, two_directions)?,
        })
    }

    pub fn name(&self) -> &str {
        self.int.name()
    }

    pub fn int(&self) -> &IntEncodedValue {
        &self.int
    }

    pub(crate) fn int_mut(&mut self) -> &mut IntEncodedValue {
        &mut self.int
    }

    pub fn set_bool(&self, flags: &mut [u32], reverse: bool, value: bool) -> Result<(), EncodingError> {
        self.int.set_int(flags, reverse, value as i32)
    }

    #[inline]
    pub fn get_bool(&self, flags: &[u32], reverse: bool) -> bool {
        self.int.get_int(flags, reverse) != 0
    }
}

/// A categorical sub-field: one of a fixed list of names, stored as its index.
///
/// Index 0 is the default category of freshly created flags,
/// so by convention it should be something like `"missing"` or `"other"`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumEncodedValue {
    int: IntEncodedValue,
    names: Vec<String>,
}

impl EnumEncodedValue {
    pub fn new<S: AsRef<str>>(name: &str, categories: &[S]) -> Result<Self, EncodingError> {
        if categories.is_empty() {
            return Err(EncodingError::NoCategories(name.to_string()));
        }

        let bits = bits_for(categories.len() as u32);
        let max = categories.len() as i32 - 1;
        Ok(Self {
            int: IntEncodedValue::with_domain(name, bits, 0, max, false)?,
            names: categories.iter().map(|c| c.as_ref().to_string()).collect(),
        })
    }

    pub fn name(&self) -> &str {
        self.int.name()
    }

    pub fn int(&self) -> &IntEncodedValue {
        &self.int
    }

    pub(crate) fn int_mut(&mut self) -> &mut IntEncodedValue {
        &mut self.int
    }

    pub fn categories(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, category: &str) -> Option<usize> {
        self.names.iter().position(|n| n == category)
    }

    pub fn set_enum(&self, flags: &mut [u32], reverse: bool, category: &str) -> Result<(), EncodingError> {
        let idx = self
            .index_of(category)
            .ok_or_else(|| EncodingError::UnknownCategory {
                name: self.name().to_string(),
                category: category.to_string(),
            })?;
        self.set_index(flags, reverse, idx)
    }

    pub fn set_index(&self, flags: &mut [u32], reverse: bool, idx: usize) -> Result<(), EncodingError> {
        if idx >= self.names.len() {
            return Err(self.int.out_of_range(idx as f64));
        }
        self.int.set_int(flags, reverse, idx as i32)
    }

    #[inline]
    pub fn get_index(&self, flags: &[u32], reverse: bool) -> usize {
        self.int.get_int(flags, reverse) as usize
    }

    pub fn get_name(&self, flags: &[u32], reverse: bool) -> &str {
        &self.names[self.get_index(flags, reverse)]
    }
}

/// Number of bits needed to store indices `0..n`.
fn bits_for(n: u32) -> u32 {
    if n <= 1 {
        1
    } else {
        32 - (n - 1).leading_zeros()
    }
}
