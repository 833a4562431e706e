use thiserror::Error;

/// Errors produced while parsing or validating Archiiv names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid record id {value:?}: {reason}")]
    InvalidRecordId { value: String, reason: String },

    #[error("invalid section name {value:?}: {reason}")]
    InvalidSectionName { value: String, reason: String },

    #[error("unexpected file name in storage directory: {0:?}")]
    InvalidFileName(String),

    #[error("unknown capability: {0:?}")]
    UnknownCapability(String),
}
