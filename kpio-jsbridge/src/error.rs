use std::path::PathBuf;

/// All errors produced by the embedding layer.
///
/// Variants fall into four groups:
/// - **Script failures**: a compile error, an uncaught exception or a
///   termination, carried as the rendered exception report
/// - **Handle misuse**: stateless type or lifetime errors reported at the
///   call site without touching the context's last error
/// - **Call bridge**: resolver lookups that script observes as errors
/// - **Infrastructure**: configuration, snapshot, I/O and a disposed isolate
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    // ── Script failures ──────────────────────────────────────────────

    /// Rendered exception report, identical to what `Context::error`
    /// returns afterwards.
    #[error("{0}")]
    Script(String),

    // ── Handle misuse ────────────────────────────────────────────────

    #[error("The supplied receiver is not an object.")]
    NotAnObject,

    #[error("Cannot set value")]
    CannotSetValue,

    #[error("Value has been already released.")]
    Released,

    #[error("Handle of context {handle} used with context {context}")]
    ForeignHandle { handle: u32, context: u32 },

    #[error("field '{0}' is undefined.")]
    UndefinedField(String),

    #[error("TypeError: value is not an object:{0}")]
    NotBurstable(String),

    #[error("Value is not a string: {0}")]
    NotAString(String),

    // ── Call bridge ──────────────────────────────────────────────────

    #[error("No such registered raw function: {0}")]
    UnknownRawFunction(String),

    #[error("Context {0} has been dropped")]
    ContextDropped(u32),

    /// Failure reported by a host function; thrown into script as
    /// `Error(message)`.
    #[error("{0}")]
    Host(String),

    // ── Infrastructure ───────────────────────────────────────────────

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Isolate has been disposed")]
    Disposed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the error came out of script execution (and was therefore
    /// also recorded as the context's last error).
    pub fn is_script(&self) -> bool {
        matches!(self, Self::Script(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
