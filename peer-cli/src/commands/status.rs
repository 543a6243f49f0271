//! Show the stored profile and connection code.

use anyhow::Result;
use peer_core::ConnectionCode;
use peer_session::{keys, KeyValueStore};
use std::path::Path;

use crate::config::{open_store, UserProfile};

/// Run the status command.
pub fn run(data_dir: &Path) -> Result<()> {
    let store = open_store(data_dir);

    println!("=== peerlink status ===");
    println!();

    // Check profile
    match UserProfile::load(&store)? {
        Some(profile) => {
            println!("Profile:");
            println!("  ID:     {}", short(&profile.id));
            println!("  Name:   {}", profile.name);
            println!("  Status: {}", profile.status);
            println!("  Init:   {}", format_timestamp(profile.created_at));
        }
        None => {
            println!("Profile: NOT INITIALIZED");
            println!();
            println!("Run 'peerlink init --name <name>' to initialize.");
            return Ok(());
        }
    }

    println!();

    // Check connection code (without creating one)
    match store.get(keys::CONNECTION_CODE)? {
        Some(token) => match ConnectionCode::from_token(&token) {
            Ok(code) => {
                println!("Connection code:");
                println!("  Short code: {}", code.short_code);
                println!("  Created:    {}", format_timestamp(code.created_at));
            }
            Err(e) => {
                println!("Connection code: INVALID ({})", e);
                println!();
                println!("Run 'peerlink code' to replace it.");
            }
        },
        None => {
            println!("Connection code: NONE");
            println!();
            println!("Run 'peerlink code' to create one.");
        }
    }

    Ok(())
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Format a Unix timestamp as a human-readable string.
fn format_timestamp(ts: u64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let diff = now.saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn status_without_init() {
        let dir = tempdir().unwrap();

        // Should succeed but show "not initialized"
        let result = run(dir.path());
        assert!(result.is_ok());
    }

    #[test]
    fn status_after_init() {
        let dir = tempdir().unwrap();
        crate::commands::init::run(dir.path(), "Alice").unwrap();

        assert!(run(dir.path()).is_ok());
    }

    #[test]
    fn status_with_corrupt_code() {
        let dir = tempdir().unwrap();
        crate::commands::init::run(dir.path(), "Alice").unwrap();
        open_store(dir.path())
            .set(keys::CONNECTION_CODE, "garbage!")
            .unwrap();

        assert!(run(dir.path()).is_ok());
    }

    #[test]
    fn short_id_handles_short_input() {
        assert_eq!(short("abcdefghijkl"), "abcdefgh");
        assert_eq!(short("abc"), "abc");
    }

    #[test]
    fn format_timestamp_works() {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();

        assert_eq!(format_timestamp(now), "just now");
        assert!(format_timestamp(now - 120).contains("minutes"));
        assert!(format_timestamp(now - 7200).contains("hours"));
        assert!(format_timestamp(now - 172800).contains("days"));
    }
}
