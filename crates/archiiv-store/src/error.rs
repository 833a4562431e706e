use std::io;

use archiiv_types::{RecordId, SectionName, TypeError};

/// Coarse classification of a [`StoreError`], used by callers that translate
/// errors into protocol status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidName,
    Conflict,
    CorruptStore,
    Io,
    InvariantViolation,
}

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record does not exist (or is being collected).
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// The record exists but has no such section.
    #[error("section not found: {id}.{section}")]
    SectionNotFound { id: RecordId, section: SectionName },

    /// `child` is not listed among the children of `parent`.
    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: RecordId, child: RecordId },

    /// A malformed identifier or section name.
    #[error("invalid name: {0}")]
    InvalidName(#[from] TypeError),

    /// `child` is already listed among the children of `parent`.
    #[error("{child} is already a child of {parent}")]
    DuplicateChild { parent: RecordId, child: RecordId },

    /// Mounting `child` under `parent` would close a cycle.
    #[error("mounting {child} under {parent} would create a cycle")]
    WouldCycle { parent: RecordId, child: RecordId },

    /// A freshly allocated identifier is already in use.
    #[error("record id already in use: {0}")]
    DuplicateId(RecordId),

    /// The storage directory contains something the loader cannot accept.
    #[error("corrupt store: {0}")]
    CorruptStore(String),

    /// Descriptor or metadata encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying filesystem.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// An internal bookkeeping rule was broken. Never expected at runtime.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Garbage collection finished but some steps failed.
    #[error("garbage collection incomplete ({} failure(s)): {}", .0.len(), join_failures(.0))]
    Cleanup(Vec<StoreError>),

    /// A thread panicked while holding a store lock.
    #[error("store lock poisoned")]
    LockPoisoned,
}

fn join_failures(failures: &[StoreError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StoreError {
    /// Wrap an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::SectionNotFound { .. } | Self::NotAChild { .. } => {
                ErrorKind::NotFound
            }
            Self::InvalidName(_) => ErrorKind::InvalidName,
            Self::DuplicateChild { .. } | Self::WouldCycle { .. } | Self::DuplicateId(_) => {
                ErrorKind::Conflict
            }
            Self::CorruptStore(_) => ErrorKind::CorruptStore,
            Self::Io { .. } | Self::Serialization(_) | Self::LockPoisoned => ErrorKind::Io,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Cleanup(failures) => failures
                .iter()
                .map(StoreError::kind)
                .find(|kind| *kind == ErrorKind::InvariantViolation)
                .unwrap_or(ErrorKind::Io),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
