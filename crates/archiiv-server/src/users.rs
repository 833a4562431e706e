//! Username → password digest map persisted as one JSON file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use archiiv_crypto::PasswordDigest;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};

type UserMap = BTreeMap<String, PasswordDigest>;

/// The user database.
///
/// Every change rewrites the whole file: the map is written to a temporary
/// file beside it and renamed into place. If that fails the in-memory map
/// is put back the way it was.
#[derive(Debug)]
pub struct UserStore {
    path: PathBuf,
    users: Mutex<UserMap>,
}

impl UserStore {
    /// Load the user file. A missing file is an error; `init` creates it.
    pub fn load(path: impl Into<PathBuf>) -> ServerResult<Self> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)
            .map_err(|e| ServerError::Users(format!("read {}: {e}", path.display())))?;
        let users: UserMap = serde_json::from_str(&text)
            .map_err(|e| ServerError::Users(format!("decode {}: {e}", path.display())))?;
        info!(path = %path.display(), users = users.len(), "user store loaded");
        Ok(Self {
            path,
            users: Mutex::new(users),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> ServerResult<MutexGuard<'_, UserMap>> {
        self.users
            .lock()
            .map_err(|_| ServerError::Internal("user store lock poisoned".into()))
    }

    pub fn check_password(&self, username: &str, password: &str) -> bool {
        self.lock()
            .ok()
            .and_then(|users| users.get(username).map(|d| d.matches(username, password)))
            .unwrap_or(false)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.lock().is_ok_and(|users| users.contains_key(username))
    }

    pub fn usernames(&self) -> ServerResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    pub fn create_user(&self, username: &str, password: &str) -> ServerResult<()> {
        if username.is_empty() {
            return Err(ServerError::BadRequest("username must not be empty".into()));
        }
        let mut users = self.lock()?;
        if users.contains_key(username) {
            return Err(ServerError::UserExists(username.to_string()));
        }
        users.insert(
            username.to_string(),
            PasswordDigest::derive(username, password),
        );
        if let Err(e) = self.sync(&users) {
            users.remove(username);
            return Err(e);
        }
        debug!(username, "user created");
        Ok(())
    }

    pub fn delete_user(&self, username: &str) -> ServerResult<()> {
        let mut users = self.lock()?;
        let digest = users
            .remove(username)
            .ok_or_else(|| ServerError::UnknownUser(username.to_string()))?;
        if let Err(e) = self.sync(&users) {
            users.insert(username.to_string(), digest);
            return Err(e);
        }
        debug!(username, "user deleted");
        Ok(())
    }

    fn sync(&self, users: &UserMap) -> ServerResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let bytes = serde_json::to_vec_pretty(users)
            .map_err(|e| ServerError::Users(format!("encode users: {e}")))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)
            .map_err(|e| ServerError::Users(format!("replace {}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}
