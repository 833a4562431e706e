//! The reference-counted record graph.
//!
//! # Locking
//!
//! - `records` (a `RwLock`) guards map membership only. Lookups take the
//!   read side; creation and collection take the write side just for the
//!   insert or remove.
//! - Each record's `children` and `ref_count` sit behind that record's own
//!   mutex.
//! - No code path holds two record locks at once. Mount bumps the child's
//!   count first and only then links it under the parent, so a concurrent
//!   unmount elsewhere can never collect a child that is about to be linked.
//!
//! # Collection
//!
//! When a count reaches zero the record is collected with an explicit work
//! queue. Its descriptor is first rewritten with no children; only then are
//! the children released one lock at a time, children that drop to zero
//! join the queue, and the record's files and map entry are removed. A
//! descriptor on disk therefore never lists a child whose files are gone.
//! If the rewrite fails the record is left in place, unreferenced, for the
//! next open to collect. Failures are gathered and reported together at the
//! end.
//!
//! Section writes hold the record lock across the file creation, so no
//! section can appear once the count has dropped to zero.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use archiiv_types::{RecordId, SectionName};
use tracing::{debug, info, warn};

use crate::descriptor::RecordDescriptor;
use crate::error::{StoreError, StoreResult};
use crate::record::{Record, RecordInfo, RecordState};
use crate::recovery::{LoadedGraph, RecoveryLoader};
use crate::section::SectionStore;

/// The record store: an identifier→record map over a flat storage directory.
pub struct RecordStore {
    records: RwLock<HashMap<RecordId, Arc<Record>>>,
    root: RecordId,
    disk: SectionStore,
}

impl RecordStore {
    /// Open the store rooted at `root` in the directory `base`.
    ///
    /// Runs the recovery loader, then collects whatever an interrupted
    /// collection left behind. Fails if the directory cannot be fully
    /// validated.
    pub fn open(base: impl Into<std::path::PathBuf>, root: RecordId) -> StoreResult<Self> {
        let mut loader = RecoveryLoader::new(base, root);
        let graph = loader.run()?;
        let store = Self::from_loaded(loader.base().to_path_buf(), graph)?;
        info!(root = %store.root, records = store.len(), "record store open");
        Ok(store)
    }

    fn from_loaded(base: std::path::PathBuf, graph: LoadedGraph) -> StoreResult<Self> {
        let LoadedGraph {
            root,
            records,
            leftovers,
            stray_sections,
        } = graph;

        let map = records
            .into_iter()
            .map(|(id, loaded)| (id, Arc::new(Record::new(id, loaded.descriptor, loaded.ref_count))))
            .collect();
        let store = Self {
            records: RwLock::new(map),
            root,
            disk: SectionStore::new(base),
        };

        for file in &stray_sections {
            warn!(%file, "removing section without descriptor");
            store.disk.remove_file(file)?;
        }
        for id in leftovers {
            warn!(%id, "collecting unreferenced record");
            store.collect(id)?;
        }
        Ok(store)
    }

    /// The root directory. Never collected.
    pub fn root(&self) -> RecordId {
        self.root
    }

    /// The storage layer this store writes through.
    pub fn disk(&self) -> &SectionStore {
        &self.disk
    }

    /// Number of records currently in the map.
    pub fn len(&self) -> usize {
        self.read_map().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` names a live record.
    pub fn contains(&self, id: RecordId) -> bool {
        self.live(id).is_ok()
    }

    /// All record ids, sorted.
    pub fn ids(&self) -> StoreResult<Vec<RecordId>> {
        let mut ids: Vec<RecordId> = self.read_map()?.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    // -----------------------------------------------------------------------
    // Map access
    // -----------------------------------------------------------------------

    fn read_map(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<RecordId, Arc<Record>>>> {
        self.records.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write_map(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<RecordId, Arc<Record>>>> {
        self.records.write().map_err(|_| StoreError::LockPoisoned)
    }

    fn lookup(&self, id: RecordId) -> StoreResult<Arc<Record>> {
        self.read_map()?
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Look up a record and make sure it is not being collected.
    fn live(&self, id: RecordId) -> StoreResult<Arc<Record>> {
        let record = self.lookup(id)?;
        record.lock()?.ensure_live(id)?;
        Ok(record)
    }

    fn persist(&self, record: &Record, state: &RecordState) -> StoreResult<()> {
        self.disk
            .write_descriptor(record.id(), &record.descriptor(state))
    }

    // -----------------------------------------------------------------------
    // Graph reads
    // -----------------------------------------------------------------------

    /// Children of `id`, in mount order.
    pub fn get_children(&self, id: RecordId) -> StoreResult<Vec<RecordId>> {
        let record = self.lookup(id)?;
        let state = record.lock()?;
        state.ensure_live(id)?;
        Ok(state.children.clone())
    }

    pub fn record_info(&self, id: RecordId) -> StoreResult<RecordInfo> {
        let record = self.lookup(id)?;
        let state = record.lock()?;
        state.ensure_live(id)?;
        Ok(RecordInfo {
            id,
            name: state.name.clone(),
            is_dir: record.is_dir(),
            children: state.children.clone(),
            ref_count: state.ref_count,
        })
    }

    pub fn ref_count(&self, id: RecordId) -> StoreResult<u64> {
        Ok(self.record_info(id)?.ref_count)
    }

    /// Whether `target` can be reached from `from` by following children
    /// (a record reaches itself).
    fn reaches(&self, from: RecordId, target: RecordId) -> StoreResult<bool> {
        let mut queue = VecDeque::from([from]);
        let mut seen = HashSet::from([from]);
        while let Some(id) = queue.pop_front() {
            if id == target {
                return Ok(true);
            }
            // Records collected meanwhile have no children worth following.
            let Ok(record) = self.lookup(id) else {
                continue;
            };
            let children = record.lock()?.children.clone();
            for child in children {
                if seen.insert(child) {
                    queue.push_back(child);
                }
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------------
    // Graph mutations
    // -----------------------------------------------------------------------

    /// Create a record under `parent` and return its id.
    pub fn make_record(
        &self,
        parent_id: RecordId,
        name: &str,
        is_dir: bool,
    ) -> StoreResult<RecordId> {
        let parent = self.live(parent_id)?;

        let id = RecordId::new();
        let record = Arc::new(Record::new(id, RecordDescriptor::new(name, is_dir), 1));
        {
            let mut map = self.write_map()?;
            if map.contains_key(&id) {
                return Err(StoreError::DuplicateId(id));
            }
            map.insert(id, Arc::clone(&record));
        }

        if let Err(e) = self.link_new(&parent, &record) {
            self.unwind_new(id);
            return Err(e);
        }

        debug!(%parent_id, %id, name, is_dir, "record created");
        Ok(id)
    }

    fn link_new(&self, parent: &Record, record: &Record) -> StoreResult<()> {
        {
            let state = record.lock()?;
            self.persist(record, &state)?;
        }

        let mut state = parent.lock()?;
        state.ensure_live(parent.id())?;
        if state.children.contains(&record.id()) {
            return Err(StoreError::DuplicateId(record.id()));
        }
        state.children.push(record.id());
        if let Err(e) = self.persist(parent, &state) {
            state.children.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Forget a record whose creation failed half-way.
    fn unwind_new(&self, id: RecordId) {
        if let Ok(mut map) = self.write_map() {
            map.remove(&id);
        }
        for failure in self.disk.remove_record_files(id) {
            warn!(%id, error = %failure, "could not clean up after failed create");
        }
    }

    /// Make `child_id` a child of `parent_id` as well.
    pub fn mount(&self, parent_id: RecordId, child_id: RecordId) -> StoreResult<()> {
        let parent = self.live(parent_id)?;
        let child = self.live(child_id)?;

        if parent.lock()?.children.contains(&child_id) {
            return Err(StoreError::DuplicateChild {
                parent: parent_id,
                child: child_id,
            });
        }
        if self.reaches(child_id, parent_id)? {
            return Err(StoreError::WouldCycle {
                parent: parent_id,
                child: child_id,
            });
        }

        {
            let mut state = child.lock()?;
            state.ensure_live(child_id)?;
            state.ref_count += 1;
        }

        let linked = self.link_existing(&parent, child_id);
        if let Err(e) = linked {
            // Give back the reference taken above; this may collect the child
            // if its other parents let go of it in the meantime.
            if let Err(undo) = self.release(&child) {
                warn!(%child_id, error = %undo, "could not undo reference after failed mount");
            }
            return Err(e);
        }

        debug!(%parent_id, %child_id, "mounted");
        Ok(())
    }

    fn link_existing(&self, parent: &Record, child_id: RecordId) -> StoreResult<()> {
        let mut state = parent.lock()?;
        state.ensure_live(parent.id())?;
        if state.children.contains(&child_id) {
            return Err(StoreError::DuplicateChild {
                parent: parent.id(),
                child: child_id,
            });
        }
        state.children.push(child_id);
        if let Err(e) = self.persist(parent, &state) {
            state.children.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove `child_id` from the children of `parent_id`, collecting the
    /// child if that was its last reference.
    pub fn unmount(&self, parent_id: RecordId, child_id: RecordId) -> StoreResult<()> {
        let parent = self.live(parent_id)?;
        let child = self.lookup(child_id)?;

        {
            let mut state = parent.lock()?;
            state.ensure_live(parent_id)?;
            let pos = state
                .children
                .iter()
                .position(|c| *c == child_id)
                .ok_or(StoreError::NotAChild {
                    parent: parent_id,
                    child: child_id,
                })?;
            state.children.remove(pos);
            if let Err(e) = self.persist(&parent, &state) {
                state.children.insert(pos, child_id);
                return Err(e);
            }
        }

        debug!(%parent_id, %child_id, "unmounted");
        self.release(&child)
    }

    /// Drop one reference to `record`, collecting it at zero.
    fn release(&self, record: &Record) -> StoreResult<()> {
        let remaining = record.lock()?.release(record.id())?;
        if remaining == 0 {
            self.collect(record.id())?;
        }
        Ok(())
    }

    /// Delete a record whose count reached zero, and everything that becomes
    /// unreferenced because of it.
    fn collect(&self, id: RecordId) -> StoreResult<()> {
        let mut queue = VecDeque::from([id]);
        let mut failures = Vec::new();

        while let Some(id) = queue.pop_front() {
            let record = match self.lookup(id) {
                Ok(record) => record,
                Err(e) => {
                    failures.push(e);
                    continue;
                }
            };

            let children = match self.unlink_children(&record) {
                Ok(children) => children,
                Err(e) => {
                    warn!(%id, error = %e, "record left for the next open");
                    failures.push(e);
                    continue;
                }
            };

            for child_id in children {
                let released = self.lookup(child_id).and_then(|child| {
                    let mut state = child.lock()?;
                    state.release(child_id)
                });
                match released {
                    Ok(0) => queue.push_back(child_id),
                    Ok(_) => {}
                    Err(e) => failures.push(e),
                }
            }

            failures.extend(self.disk.remove_record_files(id));
            match self.write_map() {
                Ok(mut map) => {
                    map.remove(&id);
                }
                Err(e) => failures.push(e),
            }
            debug!(%id, "record collected");
        }

        if failures.is_empty() {
            Ok(())
        } else {
            warn!(%id, failures = failures.len(), "collection finished with failures");
            Err(StoreError::Cleanup(failures))
        }
    }

    /// Take the children of an unreferenced record and persist it without
    /// them. On failure the children stay in place.
    fn unlink_children(&self, record: &Record) -> StoreResult<Vec<RecordId>> {
        let mut state = record.lock()?;
        if state.children.is_empty() {
            return Ok(Vec::new());
        }
        let children = std::mem::take(&mut state.children);
        if let Err(e) = self.persist(record, &state) {
            state.children = children;
            return Err(e);
        }
        Ok(children)
    }

    /// Change a record's display name.
    pub fn rename(&self, id: RecordId, name: &str) -> StoreResult<()> {
        let record = self.lookup(id)?;
        let mut state = record.lock()?;
        state.ensure_live(id)?;
        let previous = std::mem::replace(&mut state.name, name.to_string());
        if let Err(e) = self.persist(&record, &state) {
            state.name = previous;
            return Err(e);
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------------

    /// Open a section of a live record for reading.
    pub fn open_section(&self, id: RecordId, section: &str) -> StoreResult<File> {
        let section = SectionName::new(section)?;
        self.live(id)?;
        self.disk.open(id, &section)
    }

    /// Create (or truncate) a section of a live record for writing.
    pub fn create_section(&self, id: RecordId, section: &str) -> StoreResult<File> {
        let section = SectionName::new(section)?;
        let record = self.lookup(id)?;
        let state = record.lock()?;
        state.ensure_live(id)?;
        self.disk.create(id, &section)
    }

    pub fn delete_section(&self, id: RecordId, section: &str) -> StoreResult<()> {
        let section = SectionName::new(section)?;
        let record = self.lookup(id)?;
        let state = record.lock()?;
        state.ensure_live(id)?;
        self.disk.delete(id, &section)
    }

    pub fn read_section(&self, id: RecordId, section: &str) -> StoreResult<Vec<u8>> {
        let section = SectionName::new(section)?;
        self.live(id)?;
        self.disk.read(id, &section)
    }

    pub fn write_section(&self, id: RecordId, section: &str, data: &[u8]) -> StoreResult<()> {
        let section = SectionName::new(section)?;
        let record = self.lookup(id)?;
        let state = record.lock()?;
        state.ensure_live(id)?;
        self.disk.write(id, &section, data)
    }

    pub fn section_names(&self, id: RecordId) -> StoreResult<Vec<SectionName>> {
        self.live(id)?;
        self.disk.list(id)
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("root", &self.root)
            .field("base", &self.disk.base())
            .field("record_count", &self.len())
            .finish()
    }
}
