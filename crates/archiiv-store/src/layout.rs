//! On-disk layout of an Archiiv data directory.
//!
//! ```text
//! <dir>/
//!   fs/          flat record storage
//!   users.json   username → password digest
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use archiiv_types::RecordId;
use tracing::info;

use crate::descriptor::RecordDescriptor;
use crate::error::{StoreError, StoreResult};
use crate::section::SectionStore;

pub const FS_DIR: &str = "fs";
pub const USERS_FILE: &str = "users.json";

/// Paths and root id of an initialized data directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreLayout {
    pub fs_root: PathBuf,
    pub users_path: PathBuf,
    pub root: RecordId,
}

impl StoreLayout {
    pub fn new(dir: &Path, root: RecordId) -> Self {
        Self {
            fs_root: dir.join(FS_DIR),
            users_path: dir.join(USERS_FILE),
            root,
        }
    }
}

/// Create a fresh data directory under `dir` with an empty root directory
/// and an empty user map.
///
/// Refuses to touch a `dir/fs` that already exists.
pub fn init_store_dir(dir: impl AsRef<Path>) -> StoreResult<StoreLayout> {
    let dir = dir.as_ref();
    let layout = StoreLayout::new(dir, RecordId::new());

    if layout.fs_root.exists() {
        return Err(StoreError::CorruptStore(format!(
            "{} already exists",
            layout.fs_root.display()
        )));
    }
    fs::create_dir_all(&layout.fs_root)
        .map_err(|e| StoreError::io(format!("create {}", layout.fs_root.display()), e))?;

    SectionStore::new(&layout.fs_root)
        .write_descriptor(layout.root, &RecordDescriptor::new("", true))?;

    if !layout.users_path.exists() {
        fs::write(&layout.users_path, b"{}")
            .map_err(|e| StoreError::io(format!("create {}", layout.users_path.display()), e))?;
    }

    info!(dir = %dir.display(), root = %layout.root, "data directory initialized");
    Ok(layout)
}
