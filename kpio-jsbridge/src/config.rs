//! Isolate configuration.
//!
//! Loaded from TOML; every field has a default so an empty file (or no
//! file at all) yields a working isolate:
//!
//! ```toml
//! max_call_depth = 256
//! max_buffer_bytes = 67108864
//! stack_size = 67108864
//! snapshot = "startup.js"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use kpio_jsvm::agent::{AgentConfig, DEFAULT_MAX_BUFFER_BYTES, DEFAULT_MAX_CALL_DEPTH};

use crate::error::{BridgeError, Result};

/// Default engine thread stack (64 MiB). The interpreter recurses on the
/// native stack once per script call.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Limits and startup options of one isolate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IsolateConfig {
    /// Maximum nesting of script function calls.
    pub max_call_depth: usize,
    /// Largest single `ArrayBuffer` allocation, in bytes.
    pub max_buffer_bytes: usize,
    /// Native stack size of the engine thread, in bytes.
    pub stack_size: usize,
    /// Startup source run in every new context.
    pub snapshot: Option<PathBuf>,
}

impl Default for IsolateConfig {
    fn default() -> Self {
        IsolateConfig {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            stack_size: DEFAULT_STACK_SIZE,
            snapshot: None,
        }
    }
}

impl IsolateConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load a configuration file. A relative `snapshot` path is resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(snapshot), Some(dir)) = (&config.snapshot, path.parent()) {
            if snapshot.is_relative() {
                config.snapshot = Some(dir.join(snapshot));
            }
        }
        log::debug!("[KPIO JSBridge] Loaded isolate config from {}", path.display());
        Ok(config)
    }

    pub(crate) fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_call_depth: self.max_call_depth,
            max_buffer_bytes: self.max_buffer_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = IsolateConfig::from_toml_str("").unwrap();
        assert_eq!(config, IsolateConfig::default());
        assert_eq!(config.max_call_depth, 256);
        assert_eq!(config.max_buffer_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn partial_config_keeps_other_defaults() {
        let config = IsolateConfig::from_toml_str("max_call_depth = 32").unwrap();
        assert_eq!(config.max_call_depth, 32);
        assert_eq!(config.stack_size, DEFAULT_STACK_SIZE);
        assert!(config.snapshot.is_none());
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = IsolateConfig::from_toml_str("max_call_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn load_resolves_snapshot_relative_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("isolate.toml");
        std::fs::write(&path, "snapshot = \"startup.js\"\nmax_buffer_bytes = 1024\n").unwrap();

        let config = IsolateConfig::load(&path).unwrap();
        assert_eq!(config.snapshot, Some(dir.path().join("startup.js")));
        assert_eq!(config.max_buffer_bytes, 1024);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = IsolateConfig::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigNotFound { .. }));
    }
}
