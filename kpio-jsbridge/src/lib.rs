//! KPIO JavaScript bridge
//!
//! Host embedding layer for `kpio-jsvm`: engine instances that can be driven
//! from any thread, execution contexts, explicitly released handles to
//! engine values and a call bridge that lets script invoke host functions.
//!
//! # Architecture
//!
//! - `isolate`: One engine thread per [`Isolate`]; foreign threads queue
//!   jobs, the engine thread runs nested operations inline
//! - `context`: [`Context`], one realm with its last error and handle table
//! - `handle`: Generation-tagged [`Handle`] arena
//! - `bridge`: `_host_call` / `_host_call_raw`, [`Resolver`] and the default
//!   [`FunctionRegistry`]
//! - `report`: Exception report rendering
//! - `snapshot`: Pre-parsed startup code
//! - `config`: TOML isolate configuration
//!
//! # Usage
//!
//! ```ignore
//! use kpio_jsbridge::{Context, Isolate};
//!
//! let isolate = Isolate::new()?;
//! let ctx = Context::new(&isolate)?;
//! ctx.add_func("double", |args| args[0].as_f64().map(|n| (n * 2.0).into()))?;
//! assert_eq!(ctx.execute("double(21)", "main.js")?, "42");
//! ```

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod isolate;
pub mod report;
pub mod snapshot;

mod runtime;

pub use bridge::{BridgeCall, BridgeReply, CallerInfo, FunctionRegistry, Resolver};
pub use config::IsolateConfig;
pub use context::Context;
pub use error::{BridgeError, Result};
pub use handle::Handle;
pub use isolate::Isolate;
pub use snapshot::Snapshot;

/// Script name for code that has no file.
pub const NO_FILE: &str = "";
