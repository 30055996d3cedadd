//! Engine agent: the execution state shared by every realm of one engine
//! instance.
//!
//! An agent owns the call stack, the call-depth limit, the interrupt flag an
//! embedder can raise from another thread and the allocator that backs
//! `ArrayBuffer` storage. Realms ([`crate::Interpreter`]) borrow it through an
//! `Rc`, so any number of realms can run on one agent, one at a time.

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::buffer::{BufferAllocator, ZeroedAllocator};
use crate::error::{JsError, JsResult};
use crate::token::Span;

/// Default maximum nesting of function calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Default cap on a single `ArrayBuffer` allocation (64 MiB).
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 64 * 1024 * 1024;

/// A named piece of source code.
#[derive(Debug)]
pub struct Script {
    /// Script name as shown in stack traces (usually a file name).
    pub name: String,
    /// Full source text.
    pub source: String,
}

impl Script {
    pub fn new<N: Into<String>, S: Into<String>>(name: N, source: S) -> Rc<Self> {
        Rc::new(Script {
            name: name.into(),
            source: source.into(),
        })
    }

    /// Text of a 1-based line, without its terminator.
    pub fn line(&self, line: usize) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.source
            .split('\n')
            .nth(line - 1)
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
    }
}

/// A position inside a script.
#[derive(Debug, Clone)]
pub struct Location {
    pub script: Rc<Script>,
    pub span: Span,
}

impl Location {
    /// 1-based line number.
    pub fn line(&self) -> usize {
        self.span.line
    }

    /// 0-based start column.
    pub fn column(&self) -> usize {
        self.span.column.saturating_sub(1)
    }

    /// The source line containing the position.
    pub fn source_line(&self) -> &str {
        self.script.line(self.span.line).unwrap_or("")
    }
}

/// One active function invocation (or top-level script run).
#[derive(Debug)]
struct Frame {
    function: String,
    script: Rc<Script>,
    position: Cell<Span>,
}

/// Snapshot of an active frame, innermost frames last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Function name; empty for top-level code and anonymous functions.
    pub function: String,
    /// Script name.
    pub script: String,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

/// Agent limits.
#[derive(Debug, Clone, Copy)]
pub struct AgentConfig {
    pub max_call_depth: usize,
    pub max_buffer_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Execution state shared by the realms of one engine instance.
pub struct Agent {
    interrupt: Arc<AtomicBool>,
    frames: RefCell<Vec<Frame>>,
    /// Nesting of builtin and host calls, which push no frame.
    native_depth: Cell<usize>,
    max_call_depth: usize,
    allocator: Box<dyn BufferAllocator>,
}

impl Agent {
    /// Create an agent with the zero-filling buffer allocator.
    pub fn new(config: AgentConfig) -> Self {
        Self::with_allocator(config, Box::new(ZeroedAllocator::new(config.max_buffer_bytes)))
    }

    /// Create an agent with a custom buffer allocator.
    pub fn with_allocator(config: AgentConfig, allocator: Box<dyn BufferAllocator>) -> Self {
        Agent {
            interrupt: Arc::new(AtomicBool::new(false)),
            frames: RefCell::new(Vec::new()),
            native_depth: Cell::new(0),
            max_call_depth: config.max_call_depth,
            allocator,
        }
    }

    /// The interrupt flag. Setting it from any thread makes the running
    /// script unwind with [`JsError::Terminated`].
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Fail with `Terminated` if an interrupt was requested.
    pub fn check_interrupt(&self) -> JsResult<()> {
        if self.interrupt.load(Ordering::Relaxed) {
            Err(JsError::Terminated)
        } else {
            Ok(())
        }
    }

    /// Raise the interrupt flag.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn clear_interrupt(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }

    /// Enter a function or script.
    pub fn push_frame(&self, function: &str, script: &Rc<Script>, position: Span) -> JsResult<()> {
        self.check_interrupt()?;
        let mut frames = self.frames.borrow_mut();
        if frames.len() >= self.max_call_depth {
            return Err(JsError::range("Maximum call stack size exceeded"));
        }
        frames.push(Frame {
            function: String::from(function),
            script: Rc::clone(script),
            position: Cell::new(position),
        });
        Ok(())
    }

    pub fn pop_frame(&self) {
        self.frames.borrow_mut().pop();
    }

    /// Enter a builtin or host function.
    pub fn enter_native(&self) -> JsResult<()> {
        self.check_interrupt()?;
        let depth = self.native_depth.get();
        if depth >= self.max_call_depth {
            return Err(JsError::range("Maximum call stack size exceeded"));
        }
        self.native_depth.set(depth + 1);
        Ok(())
    }

    pub fn leave_native(&self) {
        self.native_depth.set(self.native_depth.get().saturating_sub(1));
    }

    /// Record the position being executed in the innermost frame.
    pub fn set_position(&self, span: Span) {
        if let Some(frame) = self.frames.borrow().last() {
            frame.position.set(span);
        }
    }

    /// Position being executed in the innermost frame.
    pub fn current_location(&self) -> Option<Location> {
        self.frames.borrow().last().map(|frame| Location {
            script: Rc::clone(&frame.script),
            span: frame.position.get(),
        })
    }

    /// Script of the innermost frame.
    pub fn current_script(&self) -> Option<Rc<Script>> {
        self.frames.borrow().last().map(|frame| Rc::clone(&frame.script))
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.frames.borrow().len()
    }

    /// Active frames, outermost first.
    pub fn frames(&self) -> Vec<FrameInfo> {
        self.frames
            .borrow()
            .iter()
            .map(|frame| {
                let span = frame.position.get();
                FrameInfo {
                    function: frame.function.clone(),
                    script: frame.script.name.clone(),
                    line: span.line,
                    column: span.column,
                }
            })
            .collect()
    }

    /// V8-style trace lines, innermost frame first.
    pub fn stack_trace(&self) -> String {
        let mut trace = String::new();
        for frame in self.frames().iter().rev() {
            if frame.function.is_empty() {
                trace.push_str(&format!(
                    "\n    at {}:{}:{}",
                    frame.script, frame.line, frame.column
                ));
            } else {
                trace.push_str(&format!(
                    "\n    at {} ({}:{}:{})",
                    frame.function, frame.script, frame.line, frame.column
                ));
            }
        }
        trace
    }

    /// Allocate zero-filled backing storage for an `ArrayBuffer`.
    pub fn allocate_buffer(&self, len: usize) -> JsResult<Vec<u8>> {
        self.allocator.allocate(len)
    }
}

impl Default for Agent {
    fn default() -> Self {
        Agent::new(AgentConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_depth_limit() {
        let agent = Agent::new(AgentConfig {
            max_call_depth: 2,
            ..AgentConfig::default()
        });
        let script = Script::new("a.js", "");
        agent.push_frame("", &script, Span::default()).unwrap();
        agent.push_frame("f", &script, Span::default()).unwrap();
        let err = agent.push_frame("g", &script, Span::default()).unwrap_err();
        assert_eq!(err.message(), "Maximum call stack size exceeded");
        agent.pop_frame();
        assert_eq!(agent.depth(), 1);
    }

    #[test]
    fn native_depth_limit() {
        let agent = Agent::new(AgentConfig {
            max_call_depth: 2,
            ..AgentConfig::default()
        });
        agent.enter_native().unwrap();
        agent.enter_native().unwrap();
        let err = agent.enter_native().unwrap_err();
        assert_eq!(err.message(), "Maximum call stack size exceeded");
        agent.leave_native();
        assert!(agent.enter_native().is_ok());
    }

    #[test]
    fn interrupt_is_observed_on_entry() {
        let agent = Agent::default();
        let script = Script::new("a.js", "");
        agent.interrupt_handle().store(true, Ordering::SeqCst);
        assert!(matches!(
            agent.push_frame("", &script, Span::default()),
            Err(JsError::Terminated)
        ));
        agent.clear_interrupt();
        assert!(agent.check_interrupt().is_ok());
    }

    #[test]
    fn stack_trace_lists_innermost_first() {
        let agent = Agent::default();
        let script = Script::new("inner.js", "x\ny\nz");
        agent.push_frame("", &script, Span::new(0, 1, 1, 1)).unwrap();
        agent.push_frame("outer", &script, Span::new(2, 3, 2, 5)).unwrap();
        assert_eq!(
            agent.stack_trace(),
            "\n    at outer (inner.js:2:5)\n    at inner.js:1:1"
        );
        let location = agent.current_location().unwrap();
        assert_eq!(location.column(), 4);
        assert_eq!(location.source_line(), "y");
    }
}
