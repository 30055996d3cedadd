//! KPIO JavaScript VM
//!
//! An embeddable JavaScript engine core: lexer, parser and a tree-walking
//! interpreter over an ECMAScript 2015 subset, with realms that share one
//! execution agent.
//!
//! # Architecture
//!
//! The engine is organized into:
//!
//! - `lexer`: Tokenization of JavaScript source code
//! - `parser`: Parsing tokens into an Abstract Syntax Tree (AST)
//! - `ast`: AST node definitions
//! - `agent`: Call stack, interrupt flag and buffer allocation shared by realms
//! - `interpreter`: One realm and the tree-walking evaluator
//! - `value`: JavaScript value representation
//! - `object`: Object, property and environment handling
//! - `builtin`: Built-in objects and functions
//! - `json`: `JSON.parse` / `JSON.stringify` on top of `serde_json`
//! - `buffer`: `ArrayBuffer` backing storage
//!
//! # Usage
//!
//! ```ignore
//! use kpio_jsvm::{Agent, Interpreter, Script};
//!
//! let realm = Interpreter::new(Rc::new(Agent::default()));
//! let result = realm.eval_script(Script::new("main.js", "1 + 2 * 3"))?;
//! assert_eq!(result.to_number(), 7.0);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod agent;
pub mod ast;
pub mod buffer;
pub mod builtin;
pub mod error;
pub mod interpreter;
pub mod json;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod token;
pub mod value;

pub use agent::{Agent, AgentConfig, FrameInfo, Location, Script};
pub use buffer::BufferAllocator;
pub use error::{JsError, JsResult, ParseError, Thrown};
pub use interpreter::{Interpreter, ObjectRef};
pub use object::{Callable, HostFn, JsObject, PropertyKey};
pub use parser::parse;
pub use value::Value;

/// JavaScript engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
