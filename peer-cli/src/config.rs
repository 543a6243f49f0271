//! Local state for the peerlink CLI.
//!
//! Everything lives in one data directory:
//! - `store.json`: the key-value store (profile, connection code)
//! - `peerlink.toml`: optional session configuration

use anyhow::{Context, Result};
use peer_session::{keys, FileStore, KeyValueStoreExt, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store file name inside the data directory.
pub const STORE_FILE: &str = "store.json";

/// Optional configuration file name inside the data directory.
pub const CONFIG_FILE: &str = "peerlink.toml";

/// The local user, stored under the `user` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Endpoint identity (same as the connection code's peer id).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Presence status.
    pub status: String,
    /// When the profile was created.
    pub created_at: u64,
}

impl UserProfile {
    /// Create a new profile.
    pub fn new(id: &str, name: &str, created_at: u64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            status: "online".to_string(),
            created_at,
        }
    }

    /// Load the profile, if one was saved.
    pub fn load(store: &FileStore) -> Result<Option<Self>> {
        store
            .get_json(keys::USER)
            .context("Invalid user profile")
    }

    /// Save the profile.
    pub fn save(&self, store: &FileStore) -> Result<()> {
        store
            .set_json(keys::USER, self)
            .context("Failed to save user profile")
    }
}

/// Open the key-value store in a data directory.
pub fn open_store(data_dir: &Path) -> FileStore {
    FileStore::open(data_dir.join(STORE_FILE))
}

/// Load `peerlink.toml` from the data directory, or defaults if absent.
pub fn load_session_config(data_dir: &Path) -> Result<SessionConfig> {
    let path = data_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(SessionConfig::default());
    }
    SessionConfig::from_file(&path).context("Invalid session configuration")
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
