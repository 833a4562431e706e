//! Flat-file storage for descriptors and sections.
//!
//! Every call goes straight to the filesystem; nothing is cached. The
//! directory is flat: `<id>` holds a record descriptor, `<id>.<section>`
//! holds a section. Names are built only from validated [`RecordId`] and
//! [`SectionName`] values, so no path produced here can leave the base
//! directory.

#[cfg(test)]
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::{Arc, Mutex};

use archiiv_types::{FileName, RecordId, SectionName};
use tracing::debug;

use crate::descriptor::RecordDescriptor;
use crate::error::{StoreError, StoreResult};

/// Raw byte-stream storage keyed by (record id, section name).
#[derive(Clone, Debug)]
pub struct SectionStore {
    base: PathBuf,
    #[cfg(test)]
    faults: Arc<Mutex<HashSet<Fault>>>,
}

/// A file operation that tests can make fail with `PermissionDenied`.
#[cfg_attr(not(test), allow(dead_code))]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Fault {
    Write(FileName),
    Remove(FileName),
}

impl SectionStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self {
            base: base.into(),
            #[cfg(test)]
            faults: Arc::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn fail_on(&self, fault: Fault) {
        self.faults.lock().unwrap().insert(fault);
    }

    #[cfg(test)]
    pub(crate) fn clear_faults(&self) {
        self.faults.lock().unwrap().clear();
    }

    #[cfg(test)]
    fn check_fault(&self, fault: Fault) -> io::Result<()> {
        if self.faults.lock().unwrap().contains(&fault) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected fault"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_fault(&self, _fault: Fault) -> io::Result<()> {
        Ok(())
    }

    /// The storage directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn path(&self, file: &FileName) -> PathBuf {
        self.base.join(file.render())
    }

    fn section_path(&self, id: RecordId, section: &SectionName) -> PathBuf {
        self.path(&FileName::Section(id, section.clone()))
    }

    // -----------------------------------------------------------------------
    // Descriptors
    // -----------------------------------------------------------------------

    pub fn read_descriptor(&self, id: RecordId) -> StoreResult<RecordDescriptor> {
        let path = self.path(&FileName::Descriptor(id));
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(id),
            _ => StoreError::io(format!("read descriptor {id}"), e),
        })?;
        RecordDescriptor::decode(id, &bytes)
    }

    /// Replace the descriptor of `id`.
    pub fn write_descriptor(&self, id: RecordId, descriptor: &RecordDescriptor) -> StoreResult<()> {
        let bytes = descriptor.encode()?;
        let file = FileName::Descriptor(id);
        self.check_fault(Fault::Write(file.clone()))
            .and_then(|()| fs::write(self.path(&file), bytes))
            .map_err(|e| StoreError::io(format!("write descriptor {id}"), e))?;
        debug!(%id, children = descriptor.children.len(), "descriptor written");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------------

    /// Open a section for reading.
    pub fn open(&self, id: RecordId, section: &SectionName) -> StoreResult<File> {
        File::open(self.section_path(id, section)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::SectionNotFound {
                id,
                section: section.clone(),
            },
            _ => StoreError::io(format!("open section {id}.{section}"), e),
        })
    }

    /// Create a section for writing, truncating any previous content.
    pub fn create(&self, id: RecordId, section: &SectionName) -> StoreResult<File> {
        File::create(self.section_path(id, section))
            .map_err(|e| StoreError::io(format!("create section {id}.{section}"), e))
    }

    pub fn delete(&self, id: RecordId, section: &SectionName) -> StoreResult<()> {
        fs::remove_file(self.section_path(id, section)).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StoreError::SectionNotFound {
                id,
                section: section.clone(),
            },
            _ => StoreError::io(format!("delete section {id}.{section}"), e),
        })
    }

    /// Read a whole section into memory.
    pub fn read(&self, id: RecordId, section: &SectionName) -> StoreResult<Vec<u8>> {
        let mut file = self.open(id, section)?;
        let mut buf = Vec::new();
        io::Read::read_to_end(&mut file, &mut buf)
            .map_err(|e| StoreError::io(format!("read section {id}.{section}"), e))?;
        Ok(buf)
    }

    /// Replace a whole section.
    pub fn write(&self, id: RecordId, section: &SectionName, data: &[u8]) -> StoreResult<()> {
        let mut file = self.create(id, section)?;
        file.write_all(data)
            .map_err(|e| StoreError::io(format!("write section {id}.{section}"), e))
    }

    /// Names of the sections currently stored for `id`, sorted.
    pub fn list(&self, id: RecordId) -> StoreResult<Vec<SectionName>> {
        let mut sections: Vec<SectionName> = self
            .record_files(id)?
            .into_iter()
            .filter_map(|file| match file {
                FileName::Section(_, section) => Some(section),
                FileName::Descriptor(_) => None,
            })
            .collect();
        sections.sort();
        Ok(sections)
    }

    /// Every file in the base directory that belongs to `id`.
    fn record_files(&self, id: RecordId) -> StoreResult<Vec<FileName>> {
        let entries =
            fs::read_dir(&self.base).map_err(|e| StoreError::io("list storage directory", e))?;
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io("list storage directory", e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if let Ok(file) = FileName::parse(&name) {
                if file.record_id() == id {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }

    /// Remove the descriptor and every section of `id`.
    ///
    /// Best-effort: every file is attempted and every failure is returned.
    /// An empty vector means the record is gone from disk.
    pub fn remove_record_files(&self, id: RecordId) -> Vec<StoreError> {
        let files = match self.record_files(id) {
            Ok(files) => files,
            Err(e) => return vec![e],
        };
        let mut failures = Vec::new();
        for file in files {
            match self
                .check_fault(Fault::Remove(file.clone()))
                .and_then(|()| fs::remove_file(self.path(&file)))
            {
                Ok(()) => debug!(%file, "removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => failures.push(StoreError::io(format!("remove {file}"), e)),
            }
        }
        failures
    }

    /// Remove one stray file by name.
    pub(crate) fn remove_file(&self, file: &FileName) -> StoreResult<()> {
        match self
            .check_fault(Fault::Remove(file.clone()))
            .and_then(|()| fs::remove_file(self.path(file)))
        {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(format!("remove {file}"), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str) -> SectionName {
        SectionName::new(name).unwrap()
    }

    #[test]
    fn write_then_read_section() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        store.write(id, &section("data"), b"hello").unwrap();
        assert_eq!(store.read(id, &section("data")).unwrap(), b"hello");
        assert!(dir.path().join(format!("{id}.data")).exists());
    }

    #[test]
    fn overwrite_leaves_no_residue() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        store.write(id, &section("data"), b"a much longer first version").unwrap();
        store.write(id, &section("data"), b"short").unwrap();
        assert_eq!(store.read(id, &section("data")).unwrap(), b"short");
    }

    #[test]
    fn open_missing_section_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let err = store.open(RecordId::new(), &section("data")).unwrap_err();
        assert!(matches!(err, StoreError::SectionNotFound { .. }));
    }

    #[test]
    fn delete_section() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        store.write(id, &section("thumb"), b"png").unwrap();
        store.delete(id, &section("thumb")).unwrap();
        assert!(matches!(
            store.delete(id, &section("thumb")),
            Err(StoreError::SectionNotFound { .. })
        ));
    }

    #[test]
    fn descriptor_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        let mut desc = RecordDescriptor::new("notes", false);
        desc.children.push(RecordId::new());
        store.write_descriptor(id, &desc).unwrap();
        assert_eq!(store.read_descriptor(id).unwrap(), desc);
        assert!(matches!(
            store.read_descriptor(RecordId::new()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_sections_is_sorted_and_scoped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        let other = RecordId::new();
        store.write_descriptor(id, &RecordDescriptor::new("x", false)).unwrap();
        store.write(id, &section("meta"), b"{}").unwrap();
        store.write(id, &section("data"), b"1").unwrap();
        store.write(other, &section("data"), b"2").unwrap();
        assert_eq!(store.list(id).unwrap(), vec![section("data"), section("meta")]);
    }

    #[test]
    fn remove_record_files_keeps_other_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        let other = RecordId::new();
        store.write_descriptor(id, &RecordDescriptor::new("x", false)).unwrap();
        store.write(id, &section("data"), b"1").unwrap();
        store.write_descriptor(other, &RecordDescriptor::new("y", false)).unwrap();

        assert!(store.remove_record_files(id).is_empty());
        assert!(!dir.path().join(id.to_string()).exists());
        assert!(!dir.path().join(format!("{id}.data")).exists());
        assert!(dir.path().join(other.to_string()).exists());
    }

    #[test]
    fn remove_record_files_reports_each_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = SectionStore::new(dir.path());
        let id = RecordId::new();
        store.write_descriptor(id, &RecordDescriptor::new("x", false)).unwrap();
        store.write(id, &section("data"), b"1").unwrap();
        store.write(id, &section("meta"), b"{}").unwrap();
        store.fail_on(Fault::Remove(FileName::Section(id, section("data"))));

        let failures = store.remove_record_files(id);
        assert_eq!(failures.len(), 1);
        assert!(dir.path().join(format!("{id}.data")).exists());
        assert!(!dir.path().join(format!("{id}.meta")).exists());
        assert!(!dir.path().join(id.to_string()).exists());
    }
}
