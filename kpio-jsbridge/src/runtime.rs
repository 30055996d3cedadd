//! Engine thread of an isolate.
//!
//! Everything that touches the engine (the agent, every realm, every held
//! value) lives here, on one thread, behind `Rc`. Other threads reach it only
//! by posting [`Message`]s; the interrupt flag is the single piece of state
//! shared outside the thread.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Weak};

use kpio_jsvm::ast::Program;
use kpio_jsvm::{parse, Agent, AgentConfig, Interpreter, JsError, JsResult, Script, Value};

use crate::bridge;
use crate::context::{Context, ContextInner};
use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleTable};
use crate::report;
use crate::snapshot::Snapshot;

/// Work posted to an engine thread.
pub(crate) type Job = Box<dyn FnOnce(&Runtime) + Send>;

pub(crate) enum Message {
    Job(Job),
    /// Nudge a thread that is serving its queue while it waits on something
    /// else.
    Wake,
    Shutdown,
}

thread_local! {
    static ENGINE: RefCell<Option<Rc<Runtime>>> = const { RefCell::new(None) };
}

/// Per-thread engine state.
pub(crate) struct Runtime {
    isolate_id: u32,
    agent: Rc<Agent>,
    inbox: Receiver<Message>,
    waker: Sender<Message>,
    contexts: RefCell<HashMap<u32, Rc<ContextState>>>,
    /// Nesting of running operations.
    active: Cell<usize>,
    /// The isolate's count of `terminate` calls.
    terminations: Arc<AtomicUsize>,
    shutdown: Cell<bool>,
    startup: Option<(Rc<Script>, Program)>,
}

impl Runtime {
    /// The runtime of the calling thread, if it is an engine thread.
    pub fn current() -> Option<Rc<Runtime>> {
        ENGINE
            .try_with(|engine| engine.borrow().clone())
            .ok()
            .flatten()
    }

    /// The runtime of the calling thread if it serves isolate `isolate_id`.
    pub fn current_for(isolate_id: u32) -> Option<Rc<Runtime>> {
        Self::current().filter(|rt| rt.isolate_id == isolate_id)
    }

    pub fn isolate_id(&self) -> u32 {
        self.isolate_id
    }

    /// Sender that wakes this thread out of [`Runtime::serve_one`].
    pub fn waker(&self) -> Sender<Message> {
        self.waker.clone()
    }

    /// Termination requests seen so far.
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Run one top-level or nested operation. `issued` is the termination
    /// count when the operation was requested.
    ///
    /// The interrupt flag is reset when the outermost operation starts and
    /// again when it ends. An operation still starts interrupted if
    /// `terminate` was called after it was requested, which covers a request
    /// that landed while the operation sat in the queue.
    pub fn operation<R>(&self, issued: usize, f: impl FnOnce() -> R) -> R {
        if self.active.get() == 0 {
            self.agent.clear_interrupt();
            if self.terminations() != issued {
                self.agent.interrupt();
            }
        }
        self.active.set(self.active.get() + 1);
        let _active = ActiveGuard(self);
        f()
    }

    /// Block for the next message and handle it.
    pub fn serve_one(&self) -> Result<()> {
        match self.inbox.recv() {
            Ok(Message::Job(job)) => {
                job(self);
                Ok(())
            }
            Ok(Message::Wake) => Ok(()),
            Ok(Message::Shutdown) => {
                self.shutdown.set(true);
                Ok(())
            }
            Err(_) => Err(BridgeError::Disposed),
        }
    }

    pub fn context(&self, id: u32) -> Result<Rc<ContextState>> {
        self.contexts
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(BridgeError::Disposed)
    }

    /// Create the realm of context `id`, install the bridge entry points and
    /// run the startup program.
    pub fn create_context(&self, id: u32, host: Weak<ContextInner>) -> Result<()> {
        let realm = Interpreter::new(Rc::clone(&self.agent));
        realm.define_global(
            "_host_call",
            realm.create_native_function("_host_call", 3, bridge::host_call),
        );
        realm.define_global(
            "_host_call_raw",
            realm.create_native_function("_host_call_raw", 3, bridge::host_call_raw),
        );

        let state = Rc::new(ContextState::new(id, realm, host));
        self.contexts.borrow_mut().insert(id, Rc::clone(&state));

        if let Some((script, program)) = &self.startup {
            if let Err(err) = state.realm.run_program(script, program) {
                let report = report::render(&state.realm, err);
                self.remove_context(id);
                return Err(BridgeError::Snapshot(report));
            }
        }

        log::debug!(
            "[KPIO JSBridge] Created context {} on isolate {}",
            id,
            self.isolate_id
        );
        Ok(())
    }

    pub fn remove_context(&self, id: u32) {
        let state = self.contexts.borrow_mut().remove(&id);
        if state.is_some() {
            log::debug!(
                "[KPIO JSBridge] Dropped context {} on isolate {}",
                id,
                self.isolate_id
            );
        }
    }
}

struct ActiveGuard<'a>(&'a Runtime);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        let depth = self.0.active.get() - 1;
        self.0.active.set(depth);
        if depth == 0 {
            self.0.agent.clear_interrupt();
        }
    }
}

/// Body of an isolate's engine thread.
///
/// Reports the agent's interrupt flag through `ready`, then serves the inbox
/// until a shutdown message arrives.
pub(crate) fn engine_main(
    isolate_id: u32,
    config: AgentConfig,
    snapshot: Option<Snapshot>,
    inbox: Receiver<Message>,
    waker: Sender<Message>,
    terminations: Arc<AtomicUsize>,
    ready: Sender<Arc<AtomicBool>>,
) {
    let agent = Rc::new(Agent::new(config));
    if ready.send(agent.interrupt_handle()).is_err() {
        return;
    }

    // Snapshots are validated when they are built.
    let startup = snapshot.and_then(|snapshot| {
        parse(snapshot.source())
            .ok()
            .map(|program| (Script::new(snapshot.name(), snapshot.source()), program))
    });

    let rt = Rc::new(Runtime {
        isolate_id,
        agent,
        inbox,
        waker,
        contexts: RefCell::new(HashMap::new()),
        active: Cell::new(0),
        terminations,
        shutdown: Cell::new(false),
        startup,
    });
    ENGINE.with(|engine| *engine.borrow_mut() = Some(Rc::clone(&rt)));
    log::debug!("[KPIO JSBridge] Isolate {} engine thread started", isolate_id);

    while !rt.shutdown.get() {
        if rt.serve_one().is_err() {
            break;
        }
    }

    let contexts = std::mem::take(&mut *rt.contexts.borrow_mut());
    drop(contexts);
    ENGINE.with(|engine| engine.borrow_mut().take());
    log::debug!("[KPIO JSBridge] Isolate {} engine thread stopped", isolate_id);
}

/// Engine-side state of one context.
pub(crate) struct ContextState {
    pub id: u32,
    pub realm: Interpreter,
    pub handles: RefCell<HandleTable>,
    last_error: RefCell<String>,
    /// Message queued by `Context::throw` for the running bridge call.
    pending_throw: RefCell<Option<String>>,
    resolver_depth: Cell<usize>,
    host: Weak<ContextInner>,
}

impl ContextState {
    fn new(id: u32, realm: Interpreter, host: Weak<ContextInner>) -> Self {
        ContextState {
            id,
            realm,
            handles: RefCell::new(HandleTable::new(id)),
            last_error: RefCell::new(String::new()),
            pending_throw: RefCell::new(None),
            resolver_depth: Cell::new(0),
            host,
        }
    }

    /// Start a top-level operation.
    pub fn begin(&self) {
        self.last_error.borrow_mut().clear();
    }

    /// Record a failed operation and turn it into the host error.
    pub fn fail(&self, err: JsError) -> BridgeError {
        let report = report::render(&self.realm, err);
        self.last_error.borrow_mut().clone_from(&report);
        BridgeError::Script(report)
    }

    pub fn last_error(&self) -> String {
        self.last_error.borrow().clone()
    }

    pub fn wrap(&self, value: Value) -> Handle {
        self.handles.borrow_mut().insert(value)
    }

    pub fn value(&self, handle: Handle) -> Result<Value> {
        self.handles.borrow().get(handle)
    }

    /// The host-side context, while the host still holds one.
    pub fn host_context(&self) -> Option<Context> {
        self.host.upgrade().map(Context::from_inner)
    }

    /// Run a resolver call. A message passed to `Context::throw` meanwhile
    /// is raised once the resolver returns.
    pub fn resolve<T>(&self, f: impl FnOnce() -> Result<T>) -> JsResult<T> {
        self.resolver_depth.set(self.resolver_depth.get() + 1);
        let result = f();
        self.resolver_depth.set(self.resolver_depth.get() - 1);

        if let Some(message) = self.pending_throw.borrow_mut().take() {
            return Err(JsError::Error(message));
        }
        result.map_err(|err| JsError::Error(err.to_string()))
    }

    /// Queue `message` for the running bridge call. Returns `false` when no
    /// resolver is running.
    pub fn request_throw(&self, message: String) -> bool {
        if self.resolver_depth.get() == 0 {
            return false;
        }
        *self.pending_throw.borrow_mut() = Some(message);
        true
    }
}
