//! Startup snapshots.
//!
//! A snapshot is startup source that every context of an isolate runs
//! before it is handed out. It is parsed once when the snapshot is created
//! so that syntax errors surface there, and parsed again on the engine
//! thread because syntax trees stay on the thread that runs them.

use std::path::Path;
use std::sync::Arc;

use crate::error::{BridgeError, Result};

/// Pre-validated startup source.
#[derive(Debug, Clone)]
pub struct Snapshot {
    name: Arc<str>,
    source: Arc<str>,
}

impl Snapshot {
    /// Create a snapshot from source text. `name` is used as the script
    /// name in stack traces.
    pub fn from_source(name: &str, source: &str) -> Result<Self> {
        if let Err(err) = kpio_jsvm::parse(source) {
            return Err(BridgeError::Snapshot(format!(
                "SyntaxError: {} ({}:{}:{})",
                err.message,
                name,
                err.span.line,
                err.span.column.saturating_sub(1)
            )));
        }
        Ok(Snapshot {
            name: Arc::from(name),
            source: Arc::from(source),
        })
    }

    /// Read startup source from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_source(&name, &source)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_errors_are_reported_at_creation() {
        let err = Snapshot::from_source("boot.js", "var a = ;").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Unexpected token ;"), "{}", text);
        assert!(text.contains("boot.js:1:8"), "{}", text);
    }

    #[test]
    fn load_names_the_snapshot_after_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("startup.js");
        std::fs::write(&path, "function twice(x) { return 2 * x; }").unwrap();

        let snapshot = Snapshot::load(&path).unwrap();
        assert_eq!(snapshot.name(), "startup.js");
        assert!(snapshot.source().contains("twice"));
    }
}
