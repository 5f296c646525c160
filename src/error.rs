//! Error taxonomy shared by every pipeline stage.
//!
//! Nothing here is retried: the pipeline is deterministic, so a failed asset
//! fails identically until its bytes change.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    /// Malformed header, truncated payload or unsupported type/version.
    #[error("format error: {0}")]
    Format(String),

    /// Dangling chunk id, or a bone/material/vertex index outside its table.
    #[error("reference error: {0}")]
    Reference(String),

    /// Structurally invalid data: parent cycles, degenerate bone directions.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid import options: {0}")]
    Options(#[from] serde_json::Error),
}

impl ImportError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn reference(msg: impl Into<String>) -> Self {
        Self::Reference(msg.into())
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
