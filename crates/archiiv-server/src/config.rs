use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use archiiv_crypto::DEFAULT_TOKEN_MAX_AGE;
use archiiv_store::StoreLayout;
use archiiv_types::RecordId;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Environment variable holding the hex-encoded token signing seed.
pub const SECRET_ENV: &str = "ARCHIIV_SECRET";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub fs_root: PathBuf,
    pub users_path: PathBuf,
    pub root_id: Option<RecordId>,
    pub token_max_age_secs: u64,
    pub max_upload_bytes: usize,
    pub permissive_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8275)),
            fs_root: PathBuf::from("fs"),
            users_path: PathBuf::from("users.json"),
            root_id: None,
            token_max_age_secs: DEFAULT_TOKEN_MAX_AGE.as_secs(),
            max_upload_bytes: 256 * 1024 * 1024,
            permissive_cors: false,
        }
    }
}

impl ServerConfig {
    /// Read a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Point the config at a data directory created by `init`.
    pub fn with_layout(mut self, layout: &StoreLayout) -> Self {
        self.fs_root = layout.fs_root.clone();
        self.users_path = layout.users_path.clone();
        self.root_id = Some(layout.root);
        self
    }

    pub fn token_max_age(&self) -> Duration {
        Duration::from_secs(self.token_max_age_secs)
    }

    pub fn root(&self) -> ServerResult<RecordId> {
        self.root_id
            .ok_or_else(|| ServerError::Config("root_id is not set".into()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        self.root()?;
        if self.token_max_age_secs == 0 {
            return Err(ServerError::Config("token_max_age_secs must be positive".into()));
        }
        if !self.fs_root.is_dir() {
            return Err(ServerError::Config(format!(
                "fs_root {} is not a directory",
                self.fs_root.display()
            )));
        }
        Ok(())
    }
}
