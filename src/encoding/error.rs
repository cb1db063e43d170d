// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

/// Problems detected while laying out, encoding or looking up [encoded values](super::EncodedValue).
///
/// All of these are build-time errors: they are raised while the graph is being
/// imported (or while a stored graph is being loaded) and are fatal to that build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodingError {
    #[error("{name}: value {value} outside of its domain [{min}, {max}]")]
    ValueOutOfRange {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{name}: {bits} is not a valid bit width (expected 1..=32)")]
    InvalidWidth { name: String, bits: u32 },

    #[error("{name}: domain [{min}, {max}] does not fit in {bits} bits")]
    DomainTooWide {
        name: String,
        bits: u32,
        min: i64,
        max: i64,
    },

    #[error("{name}: invalid decimal factor {factor}")]
    InvalidFactor { name: String, factor: f64 },

    #[error("{0}: a negated value must use a single direction and a symmetric domain")]
    InvalidNegation(String),

    #[error("{0}: bits are already defined")]
    AlreadyDefined(String),

    #[error("{0}: bits were never defined")]
    Undefined(String),

    #[error("{first} and {second} overlap in word {word}")]
    Overlap {
        first: String,
        second: String,
        word: u32,
    },

    #[error("duplicate encoded value: {0}")]
    Duplicate(String),

    #[error("unknown encoded value: {0}")]
    Unknown(String),

    #[error("{name}: expected a {expected} encoded value")]
    WrongKind { name: String, expected: &'static str },

    #[error("{name}: unknown category {category:?}")]
    UnknownCategory { name: String, category: String },

    #[error("{0}: a categorical value needs at least one category")]
    NoCategories(String),
}
