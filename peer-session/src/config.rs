//! Configuration loading for peer sessions.
//!
//! Configuration is loaded from a TOML file (the CLI looks for
//! `peerlink.toml` in its data directory). Every field has a default, so
//! an empty file, or no file at all, is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for a peer session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Session behavior.
    #[serde(default)]
    pub session: SessionSettings,
}

/// Transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// STUN/TURN servers used for connectivity discovery. Each entry must
    /// be a `stun:`, `stuns:`, `turn:` or `turns:` URL.
    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,
    /// Label of the message channel (default: "messaging").
    #[serde(default = "default_channel_label")]
    pub channel_label: String,
    /// Whether the message channel is ordered (default: true).
    #[serde(default = "default_ordered")]
    pub ordered: bool,
}

/// Session behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Name placed in newly created connection codes.
    #[serde(default = "default_display_name")]
    pub display_name: String,
    /// Upper bound on transport events handled per `process_pending` call
    /// (default: 256).
    #[serde(default = "default_max_events_per_drain")]
    pub max_events_per_drain: usize,
}

// Default value functions
fn default_stun_servers() -> Vec<String> {
    vec![
        "stun:stun.l.google.com:19302".to_string(),
        "stun:stun1.l.google.com:19302".to_string(),
    ]
}

fn default_channel_label() -> String {
    "messaging".to_string()
}

fn default_ordered() -> bool {
    true
}

fn default_display_name() -> String {
    "PeerLink user".to_string()
}

fn default_max_events_per_drain() -> usize {
    256
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stun_servers: default_stun_servers(),
            channel_label: default_channel_label(),
            ordered: default_ordered(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            display_name: default_display_name(),
            max_events_per_drain: default_max_events_per_drain(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.transport.validate()?;
        Ok(config)
    }
}

impl TransportConfig {
    /// Check the settings a transport relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_label.trim().is_empty() {
            return Err(ConfigError::Invalid("channel_label must not be empty".into()));
        }
        for server in &self.stun_servers {
            let known = ["stun:", "stuns:", "turn:", "turns:"]
                .iter()
                .any(|scheme| server.starts_with(scheme));
            if !known {
                return Err(ConfigError::Invalid(format!(
                    "unsupported ICE server URL {:?}",
                    server
                )));
            }
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A setting has an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = SessionConfig::default();
        assert_eq!(config.transport.channel_label, "messaging");
        assert!(config.transport.ordered);
        assert_eq!(config.transport.stun_servers.len(), 2);
        assert_eq!(config.session.max_events_per_drain, 256);
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[transport]
stun_servers = ["stun:stun.example.org:3478"]
channel_label = "chat"

[session]
display_name = "Alice"
max_events_per_drain = 16
"#;

        let config: SessionConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            config.transport.stun_servers,
            vec!["stun:stun.example.org:3478".to_string()]
        );
        assert_eq!(config.transport.channel_label, "chat");
        assert!(config.transport.ordered);
        assert_eq!(config.session.display_name, "Alice");
        assert_eq!(config.session.max_events_per_drain, 16);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config: SessionConfig = toml::from_str("").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let toml = r#"
[transport]
ordered = false
[session]
"#;

        let config: SessionConfig = toml::from_str(toml).unwrap();
        assert!(!config.transport.ordered);
        assert_eq!(config.transport.channel_label, "messaging");
        assert_eq!(config.session.display_name, "PeerLink user");
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[session]\ndisplay_name = \"Bob\"").unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.session.display_name, "Bob");
    }

    #[test]
    fn from_file_missing_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SessionConfig::from_file(&dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }

    #[test]
    fn from_file_garbage_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport\nordered = maybe").unwrap();

        let result = SessionConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn validate_accepts_defaults_and_turn_servers() {
        let mut transport = TransportConfig::default();
        assert!(transport.validate().is_ok());

        transport.stun_servers = vec!["turns:turn.example.org:5349".into()];
        assert!(transport.validate().is_ok());

        transport.stun_servers.clear();
        assert!(transport.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let transport = TransportConfig {
            stun_servers: vec!["http://stun.example.org".into()],
            ..TransportConfig::default()
        };
        assert!(matches!(transport.validate(), Err(ConfigError::Invalid(_))));

        let transport = TransportConfig {
            channel_label: "  ".into(),
            ..TransportConfig::default()
        };
        assert!(matches!(transport.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_rejects_bad_stun_url() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transport]\nstun_servers = [\"stun.example.org\"]").unwrap();

        let result = SessionConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
