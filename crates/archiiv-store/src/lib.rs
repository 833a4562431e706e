//! # archiiv-store
//!
//! Persistent, reference-counted record graph for Archiiv.
//!
//! Records (files and directories) live in one flat directory: a JSON
//! descriptor per record plus any number of named section files. A record
//! may be mounted under several parents and is garbage-collected, together
//! with everything only it references, when its last parent lets go.
//!
//! - [`RecordStore`] holds the graph and enforces the reference-count rules.
//! - [`SectionStore`] reads and writes the raw files.
//! - [`RecoveryLoader`] rebuilds and validates the graph at startup.
//! - [`FileMeta`] is the per-record metadata stored in the `meta` section.

pub mod descriptor;
pub mod error;
pub mod graph;
pub mod layout;
pub mod meta;
pub mod record;
pub mod recovery;
pub mod section;

pub use descriptor::RecordDescriptor;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use graph::RecordStore;
pub use layout::{init_store_dir, StoreLayout};
pub use meta::FileMeta;
pub use record::RecordInfo;
pub use recovery::{LoadPhase, LoadedGraph, LoadedRecord, RecoveryLoader};
pub use section::SectionStore;
