//! Print the shareable connection code.

use anyhow::{Context, Result};
use peer_session::{load_or_create_connection_code, SessionConfig};
use std::path::Path;

use crate::config::{open_store, UserProfile};

/// Run the code command.
///
/// The code is created on first use, named after the profile (or the
/// configured display name when no profile exists).
pub fn run(data_dir: &Path, config: &SessionConfig) -> Result<()> {
    let store = open_store(data_dir);
    let name = match UserProfile::load(&store)? {
        Some(profile) => profile.name,
        None => config.session.display_name.clone(),
    };

    let code = load_or_create_connection_code(&store, &name)
        .context("Failed to load connection code")?;
    let token = code.to_token().context("Failed to encode connection code")?;

    println!("Connection code for {}:", code.display_name);
    println!();
    println!("  Short code: {}", code.short_code);
    println!("  Token:      {}", token);

    Ok(())
}
