//! Startup recovery: rebuild the record graph from the storage directory.
//!
//! The loader moves through `Unopened → Scanning → Validating → Loaded`, or
//! stops in `Failed` at the first structural problem. Nothing of a failed
//! load is handed out; the store refuses to open instead.
//!
//! Reference counts are never stored on disk. They are recomputed here from
//! the children lists of all descriptors, plus one for the root.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use archiiv_types::{FileName, RecordId};
use tracing::{debug, info};

use crate::descriptor::RecordDescriptor;
use crate::error::{StoreError, StoreResult};
use crate::record::RecordInfo;
use crate::section::SectionStore;

/// Where the loader is in its run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadPhase {
    Unopened,
    Scanning,
    Validating,
    Loaded,
    Failed,
}

/// One record as recovered from disk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadedRecord {
    pub descriptor: RecordDescriptor,
    pub ref_count: u64,
}

/// The outcome of a successful load.
#[derive(Debug)]
pub struct LoadedGraph {
    pub root: RecordId,
    pub records: HashMap<RecordId, LoadedRecord>,
    /// Non-root records nobody references, left behind by an interrupted
    /// collection. Sorted.
    pub leftovers: Vec<RecordId>,
    /// Section files whose record has no descriptor. Sorted by file name.
    pub stray_sections: Vec<FileName>,
}

impl LoadedGraph {
    /// Whether the load found nothing to clean up.
    pub fn is_clean(&self) -> bool {
        self.leftovers.is_empty() && self.stray_sections.is_empty()
    }

    /// A view of one loaded record, as [`RecordStore::record_info`] would
    /// report it once the store is open.
    ///
    /// [`RecordStore::record_info`]: crate::RecordStore::record_info
    pub fn record_info(&self, id: RecordId) -> Option<RecordInfo> {
        self.records.get(&id).map(|loaded| RecordInfo {
            id,
            name: loaded.descriptor.name.clone(),
            is_dir: loaded.descriptor.is_dir,
            children: loaded.descriptor.children.clone(),
            ref_count: loaded.ref_count,
        })
    }
}

/// Rebuilds the in-memory graph from a storage directory.
#[derive(Debug)]
pub struct RecoveryLoader {
    base: PathBuf,
    root: RecordId,
    phase: LoadPhase,
}

impl RecoveryLoader {
    pub fn new(base: impl Into<PathBuf>, root: RecordId) -> Self {
        Self {
            base: base.into(),
            root,
            phase: LoadPhase::Unopened,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        self.phase
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Scan and validate the storage directory.
    pub fn run(&mut self) -> StoreResult<LoadedGraph> {
        match self.load() {
            Ok(graph) => {
                self.phase = LoadPhase::Loaded;
                info!(
                    base = %self.base.display(),
                    records = graph.records.len(),
                    leftovers = graph.leftovers.len(),
                    stray_sections = graph.stray_sections.len(),
                    "record graph loaded"
                );
                Ok(graph)
            }
            Err(e) => {
                self.phase = LoadPhase::Failed;
                Err(e)
            }
        }
    }

    fn load(&mut self) -> StoreResult<LoadedGraph> {
        self.phase = LoadPhase::Scanning;
        let entries = self.scan()?;
        self.phase = LoadPhase::Validating;
        self.validate(entries)
    }

    /// List the directory, accepting only regular files whose names follow
    /// the descriptor or section grammar.
    fn scan(&self) -> StoreResult<Vec<FileName>> {
        let listing = fs::read_dir(&self.base).map_err(|e| {
            StoreError::io(format!("open storage directory {}", self.base.display()), e)
        })?;

        let mut entries = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|e| StoreError::io("scan storage directory", e))?;
            let raw_name = entry.file_name();
            let name = raw_name.to_str().ok_or_else(|| {
                StoreError::CorruptStore(format!("non UTF-8 file name {raw_name:?}"))
            })?;
            let file_type = entry
                .file_type()
                .map_err(|e| StoreError::io(format!("stat {name}"), e))?;
            if file_type.is_dir() {
                return Err(StoreError::CorruptStore(format!(
                    "unexpected directory {name:?} in storage directory"
                )));
            }
            if !file_type.is_file() {
                return Err(StoreError::CorruptStore(format!(
                    "{name:?} is not a regular file"
                )));
            }
            let file = FileName::parse(name)
                .map_err(|_| StoreError::CorruptStore(format!("garbage file {name:?}")))?;
            entries.push(file);
        }
        debug!(entries = entries.len(), "storage directory scanned");
        Ok(entries)
    }

    fn validate(&self, entries: Vec<FileName>) -> StoreResult<LoadedGraph> {
        let disk = SectionStore::new(&self.base);

        let mut descriptors = HashMap::new();
        let mut sections = Vec::new();
        for file in entries {
            match file {
                FileName::Descriptor(id) => {
                    descriptors.insert(id, disk.read_descriptor(id)?);
                }
                section @ FileName::Section(..) => sections.push(section),
            }
        }

        if !descriptors.contains_key(&self.root) {
            return Err(StoreError::CorruptStore(format!(
                "root record {} not found",
                self.root
            )));
        }

        let mut ref_counts: HashMap<RecordId, u64> =
            descriptors.keys().map(|id| (*id, 0)).collect();
        *ref_counts.entry(self.root).or_default() += 1;

        for (id, descriptor) in &descriptors {
            let mut seen = HashSet::new();
            for child in &descriptor.children {
                if !seen.insert(*child) {
                    return Err(StoreError::CorruptStore(format!(
                        "record {id} lists child {child} twice"
                    )));
                }
                let count = ref_counts.get_mut(child).ok_or_else(|| {
                    StoreError::CorruptStore(format!("record {id} lists unknown child {child}"))
                })?;
                *count += 1;
            }
        }

        check_acyclic(&descriptors)?;

        let mut leftovers: Vec<RecordId> = ref_counts
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();
        leftovers.sort();

        let mut stray_sections: Vec<FileName> = sections
            .into_iter()
            .filter(|file| !descriptors.contains_key(&file.record_id()))
            .collect();
        stray_sections.sort_by_key(FileName::render);

        let records = descriptors
            .into_iter()
            .map(|(id, descriptor)| {
                let ref_count = ref_counts.get(&id).copied().unwrap_or_default();
                (
                    id,
                    LoadedRecord {
                        descriptor,
                        ref_count,
                    },
                )
            })
            .collect();

        Ok(LoadedGraph {
            root: self.root,
            records,
            leftovers,
            stray_sections,
        })
    }
}

/// Reject any cycle among the loaded descriptors (iterative three-colour DFS).
fn check_acyclic(descriptors: &HashMap<RecordId, RecordDescriptor>) -> StoreResult<()> {
    let mut done: HashSet<RecordId> = HashSet::new();
    let starts: BTreeSet<RecordId> = descriptors.keys().copied().collect();

    for start in starts {
        if done.contains(&start) {
            continue;
        }
        // Stack of (node, index of next child to visit); `on_path` mirrors it.
        let mut stack: Vec<(RecordId, usize)> = vec![(start, 0)];
        let mut on_path: HashSet<RecordId> = HashSet::from([start]);

        while let Some((node, next)) = stack.last_mut() {
            let children = descriptors
                .get(&*node)
                .map(|d| d.children.as_slice())
                .unwrap_or_default();
            if let Some(child) = children.get(*next).copied() {
                *next += 1;
                if on_path.contains(&child) {
                    return Err(StoreError::CorruptStore(format!(
                        "cycle through record {child}"
                    )));
                }
                if !done.contains(&child) {
                    on_path.insert(child);
                    stack.push((child, 0));
                }
            } else {
                let node = *node;
                on_path.remove(&node);
                done.insert(node);
                stack.pop();
            }
        }
    }
    Ok(())
}
