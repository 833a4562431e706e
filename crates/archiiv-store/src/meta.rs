//! Per-record metadata kept in the `meta` section.

use std::collections::BTreeMap;

use archiiv_types::{Capability, CapabilitySet, RecordId, SectionName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::graph::RecordStore;

/// Metadata of a record: content type, owner and per-user capabilities.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub id: RecordId,
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default)]
    pub perms: BTreeMap<String, CapabilitySet>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl FileMeta {
    /// Metadata for a record just created by `user`, who becomes its owner.
    pub fn owned_by(id: RecordId, user: &str, content_type: impl Into<String>) -> Self {
        let mut perms = BTreeMap::new();
        perms.insert(user.to_string(), CapabilitySet::owner());
        Self {
            id,
            content_type: content_type.into(),
            perms,
            created_by: user.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Whether `user` holds `capability` on this record.
    pub fn allows(&self, user: &str, capability: Capability) -> bool {
        self.perms
            .get(user)
            .is_some_and(|set| set.allows(capability))
    }

    pub fn grant(&mut self, user: &str, capability: Capability) {
        self.perms
            .entry(user.to_string())
            .or_default()
            .insert(capability);
    }

    pub fn encode(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> StoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read the metadata of `id`. `Ok(None)` if the record has no `meta`
    /// section.
    pub fn load(store: &RecordStore, id: RecordId) -> StoreResult<Option<Self>> {
        match store.read_section(id, SectionName::META) {
            Ok(bytes) => Self::decode(&bytes).map(Some),
            Err(StoreError::SectionNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, store: &RecordStore) -> StoreResult<()> {
        store.write_section(self.id, SectionName::META, &self.encode()?)
    }
}
