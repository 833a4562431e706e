use std::sync::{Mutex, MutexGuard};

use archiiv_types::RecordId;
use serde::Serialize;

use crate::descriptor::RecordDescriptor;
use crate::error::{StoreError, StoreResult};

/// Mutable part of a record, guarded by the record's own lock.
#[derive(Debug)]
pub(crate) struct RecordState {
    pub name: String,
    pub children: Vec<RecordId>,
    pub ref_count: u64,
}

impl RecordState {
    /// A record whose count reached zero is being collected and must look
    /// absent to everyone else.
    pub fn ensure_live(&self, id: RecordId) -> StoreResult<()> {
        if self.ref_count == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Take one reference away, returning the remaining count.
    pub fn release(&mut self, id: RecordId) -> StoreResult<u64> {
        self.ref_count = self.ref_count.checked_sub(1).ok_or_else(|| {
            tracing::error!(%id, "reference count underflow");
            StoreError::InvariantViolation(format!("reference count of {id} underflowed"))
        })?;
        Ok(self.ref_count)
    }
}

/// A node of the record graph.
#[derive(Debug)]
pub(crate) struct Record {
    id: RecordId,
    is_dir: bool,
    state: Mutex<RecordState>,
}

impl Record {
    pub fn new(id: RecordId, descriptor: RecordDescriptor, ref_count: u64) -> Self {
        Self {
            id,
            is_dir: descriptor.is_dir,
            state: Mutex::new(RecordState {
                name: descriptor.name,
                children: descriptor.children,
                ref_count,
            }),
        }
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn lock(&self) -> StoreResult<MutexGuard<'_, RecordState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Snapshot the persisted form from a locked state.
    pub fn descriptor(&self, state: &RecordState) -> RecordDescriptor {
        RecordDescriptor {
            children: state.children.clone(),
            is_dir: self.is_dir,
            name: state.name.clone(),
        }
    }
}

/// A point-in-time view of one record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordInfo {
    pub id: RecordId,
    pub name: String,
    pub is_dir: bool,
    pub children: Vec<RecordId>,
    pub ref_count: u64,
}
