//! Foundation types for Archiiv.
//!
//! Every other Archiiv crate depends on `archiiv-types`. The types here are
//! the only way a caller-supplied string becomes a filesystem name, so the
//! validation rules in [`names`] double as the path-escape defense of the
//! whole store.
//!
//! # Key Types
//!
//! - [`RecordId`]: canonical lowercase UUID naming a record
//! - [`SectionName`]: validated name of a byte stream attached to a record
//! - [`FileName`]: classification of an entry in the flat storage directory
//! - [`Capability`]: permission checked before an operation reaches the store

pub mod capability;
pub mod error;
pub mod id;
pub mod names;

pub use capability::{Capability, CapabilitySet};
pub use error::TypeError;
pub use id::RecordId;
pub use names::{FileName, SectionName};
