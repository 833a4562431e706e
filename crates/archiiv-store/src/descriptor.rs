use archiiv_types::RecordId;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The persisted form of a record: everything except its reference count,
/// which is derived from the children lists of all records at load time.
///
/// On-disk format (JSON, children omitted when empty):
/// ```text
/// {"children":["<id>",...],"is_dir":true,"name":"photos"}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDescriptor {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RecordId>,
    #[serde(default)]
    pub is_dir: bool,
    #[serde(default)]
    pub name: String,
}

impl RecordDescriptor {
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            children: Vec::new(),
            is_dir,
            name: name.into(),
        }
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode the descriptor of record `id`. Undecodable bytes mean the store
    /// is corrupt, not that the caller passed bad input.
    pub fn decode(id: RecordId, bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StoreError::CorruptStore(format!("descriptor {id}: {e}")))
    }
}
