use std::io;

use thiserror::Error;

/// Errors raised while reading, converting or writing a splat table.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// A required column is missing, the table is empty, or an optional group is incomplete.
    #[error("schema error: {0}")]
    Schema(String),

    /// The optional `f_rest_*` group is not (fully) present. Callers usually treat this
    /// as "no higher order spherical harmonics".
    #[error("attribute group `{group}` missing: {reason}")]
    AttributeGroupMissing { group: &'static str, reason: String },

    #[error("empty input: {0}")]
    EmptyInput(String),

    #[error("layout error: {0}")]
    Layout(String),

    #[error("point filter error: {0}")]
    Filter(String),

    #[error("malformed container: {0}")]
    Container(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;
