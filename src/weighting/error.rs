// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::encoding::EncodingError;

/// Problems with a [CustomModel](super::CustomModel): invalid merges,
/// malformed expressions and references to unknown encoded values.
///
/// These are caller errors; a request carrying such a model is rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("{field}: overlay value {overlay} is looser than base value {base}")]
    LooserLimit {
        field: &'static str,
        base: f64,
        overlay: f64,
    },

    #[error("{path}: cannot merge {base} with {overlay}")]
    TypeMismatch {
        path: String,
        base: &'static str,
        overlay: &'static str,
    },

    #[error("base vehicle mismatch: {base:?} vs {overlay:?}")]
    BaseMismatch { base: String, overlay: String },

    #[error("line {line}, column {column}: {message}: {text:?}")]
    Parse {
        line: usize,
        column: usize,
        text: String,
        message: String,
    },

    #[error("{target}: expected a {expected} value")]
    TypeCheck {
        target: String,
        expected: &'static str,
    },

    #[error("unknown assignment target: {0}")]
    UnknownTarget(String),

    #[error("{name}: invalid factor {value}")]
    InvalidFactor { name: String, value: f64 },

    #[error("{name}: {message}")]
    InvalidCondition { name: String, message: String },

    #[error("custom model without a base vehicle")]
    MissingBase,

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("invalid custom model document: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}
