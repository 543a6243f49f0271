//! Decode a connection code or a signal code.

use anyhow::Result;
use peer_core::{decode_signal, ConnectionCode};
use peer_types::SignalMessage;

/// Run the decode command.
pub fn run(code: &str) -> Result<()> {
    println!("{}", describe(code)?);
    Ok(())
}

/// Human-readable description of a pasted code.
///
/// Connection codes are tried first, then signal codes. If neither
/// decodes, both errors are reported.
pub fn describe(code: &str) -> Result<String> {
    let as_connection = match ConnectionCode::from_token(code) {
        Ok(connection) => {
            return Ok(format!(
                "Connection code\n  Name:       {}\n  Peer:       {}\n  Short code: {}\n  Version:    {}",
                connection.display_name,
                connection.peer_id,
                connection.short_code,
                connection.version
            ))
        }
        Err(e) => e,
    };

    match decode_signal(code) {
        Ok(SignalMessage::Descriptor(descriptor)) => Ok(format!(
            "Handshake {} ({} bytes)",
            descriptor.role,
            descriptor.blob.len()
        )),
        Ok(SignalMessage::Fragment(fragment)) => {
            Ok(format!("Handshake fragment ({} bytes)", fragment.blob.len()))
        }
        Err(as_signal) => anyhow::bail!(
            "Not a connection code ({}) or signal code ({})",
            as_connection,
            as_signal
        ),
    }
}
