//! Initialize the local profile and connection code.

use anyhow::{Context, Result};
use peer_session::{keys, load_or_create_connection_code, KeyValueStore};
use std::path::Path;

use crate::config::{open_store, UserProfile};

/// Run the init command.
pub fn run(data_dir: &Path, name: &str) -> Result<()> {
    let store = open_store(data_dir);

    // Check if already initialized
    if UserProfile::load(&store)?.is_some() {
        anyhow::bail!(
            "Profile already initialized. Delete {} to reinitialize.",
            store.path().display()
        );
    }

    // A fresh profile gets a fresh identity
    store
        .remove(keys::CONNECTION_CODE)
        .context("Failed to reset connection code")?;
    let code = load_or_create_connection_code(&store, name)
        .context("Failed to create connection code")?;

    let profile = UserProfile::new(&code.peer_id.to_string(), name, code.created_at);
    profile.save(&store)?;

    println!("Profile initialized successfully!");
    println!();
    println!("  Name:       {}", profile.name);
    println!("  Short code: {}", code.short_code);
    println!("  Data dir:   {}", data_dir.display());
    println!();
    println!("Next steps:");
    println!("  1. Share your connection code: peerlink code");
    println!("  2. Try a local session:        peerlink demo");

    Ok(())
}
