//! Call bridge: script calling into host functions.
//!
//! Every context exposes two globals. `_host_call(id, name, json)` forwards
//! a JSON-encoded argument array and decodes the JSON reply.
//! `_host_call_raw(id, name, args)` hands the arguments over as handles,
//! together with the location of the script code that made the call, and
//! takes a handle back. Both end up in one [`Resolver`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kpio_jsvm::{Agent, Interpreter, JsError, JsResult, Value};

use crate::context::Context;
use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::runtime::{ContextState, Runtime};

/// Script location of the code that invoked a raw function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerInfo {
    /// Enclosing function name; empty at top level.
    pub function: String,
    /// Script name.
    pub file: String,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

/// One bridge request.
#[derive(Debug, Clone)]
pub enum BridgeCall {
    /// Name+JSON protocol: `args` is the JSON text of the argument array.
    Json {
        context: u32,
        name: String,
        args: String,
    },
    /// Name+Handle protocol.
    Handle {
        context: u32,
        name: String,
        caller: CallerInfo,
        args: Vec<Handle>,
    },
}

/// Resolver answer to a [`BridgeCall`].
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeReply {
    /// JSON text of the result; `None` is `undefined`.
    Json(Option<String>),
    /// Result handle; `None` is `undefined`.
    Handle(Option<Handle>),
}

impl BridgeCall {
    pub fn name(&self) -> &str {
        match self {
            BridgeCall::Json { name, .. } | BridgeCall::Handle { name, .. } => name,
        }
    }

    pub fn context_id(&self) -> u32 {
        match self {
            BridgeCall::Json { context, .. } | BridgeCall::Handle { context, .. } => *context,
        }
    }

    /// Route the request to the resolver method of its protocol.
    pub fn dispatch(&self, resolver: &dyn Resolver, ctx: &Context) -> Result<BridgeReply> {
        log::trace!(
            "[KPIO JSBridge] Dispatching {} on context {}",
            self.name(),
            self.context_id()
        );
        match self {
            BridgeCall::Json { name, args, .. } => {
                resolver.resolve_json(ctx, name, args).map(BridgeReply::Json)
            }
            BridgeCall::Handle {
                name, caller, args, ..
            } => resolver
                .resolve_handle(ctx, name, caller, args)
                .map(BridgeReply::Handle),
        }
    }
}

/// Host-side function lookup and dispatch.
///
/// Resolvers run on the engine thread with the isolate held. Slow work
/// belongs inside [`crate::Isolate::unlocked`]. An `Err` (or a
/// [`Context::throw`]) surfaces in script as a thrown `Error`.
pub trait Resolver: Send + Sync {
    /// Name+JSON protocol. `Ok(None)` yields `undefined`.
    fn resolve_json(&self, ctx: &Context, name: &str, args: &str) -> Result<Option<String>>;

    /// Name+Handle protocol. The argument handles belong to `ctx`.
    fn resolve_handle(
        &self,
        ctx: &Context,
        name: &str,
        caller: &CallerInfo,
        args: &[Handle],
    ) -> Result<Option<Handle>>;
}

/// Host function taking and returning JSON values.
pub type JsonFn = Arc<dyn Fn(&[serde_json::Value]) -> Option<serde_json::Value> + Send + Sync>;

/// Host function working on handles.
pub type RawFn =
    Arc<dyn Fn(&Context, &CallerInfo, &[Handle]) -> Result<Option<Handle>> + Send + Sync>;

/// Name-keyed [`Resolver`] behind `Context::add_func` and friends.
#[derive(Default)]
pub struct FunctionRegistry {
    json: Mutex<HashMap<String, JsonFn>>,
    raw: Mutex<HashMap<String, RawFn>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a Name+JSON function, replacing any function of that name.
    pub fn add_func<F>(&self, name: &str, f: F)
    where
        F: Fn(&[serde_json::Value]) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        if let Ok(mut json) = self.json.lock() {
            json.insert(name.to_string(), Arc::new(f));
        }
    }

    /// Register a Name+Handle function, replacing any function of that name.
    pub fn add_raw_func<F>(&self, name: &str, f: F)
    where
        F: Fn(&Context, &CallerInfo, &[Handle]) -> Result<Option<Handle>> + Send + Sync + 'static,
    {
        if let Ok(mut raw) = self.raw.lock() {
            raw.insert(name.to_string(), Arc::new(f));
        }
    }

    pub fn has_func(&self, name: &str) -> bool {
        self.json.lock().map(|json| json.contains_key(name)).unwrap_or(false)
    }

    // Entries are cloned out so the lock is free while the function runs;
    // functions may register more functions.
    fn json_fn(&self, name: &str) -> Option<JsonFn> {
        self.json.lock().ok()?.get(name).cloned()
    }

    fn raw_fn(&self, name: &str) -> Option<RawFn> {
        self.raw.lock().ok()?.get(name).cloned()
    }
}

impl Resolver for FunctionRegistry {
    fn resolve_json(&self, _ctx: &Context, name: &str, args: &str) -> Result<Option<String>> {
        let Some(f) = self.json_fn(name) else {
            return Ok(None);
        };
        let args: Vec<serde_json::Value> = serde_json::from_str(args)?;
        match f(&args) {
            Some(result) => Ok(Some(serde_json::to_string(&result)?)),
            None => Ok(None),
        }
    }

    fn resolve_handle(
        &self,
        ctx: &Context,
        name: &str,
        caller: &CallerInfo,
        args: &[Handle],
    ) -> Result<Option<Handle>> {
        let f = self
            .raw_fn(name)
            .ok_or_else(|| BridgeError::UnknownRawFunction(name.to_string()))?;
        f(ctx, caller, args)
    }
}

// ---- engine-side entry points ----

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Context state and host context named by the first argument.
fn target(args: &[Value]) -> JsResult<(std::rc::Rc<ContextState>, Context)> {
    let id = arg(args, 0).to_u32();
    let state = Runtime::current()
        .and_then(|rt| rt.context(id).ok())
        .ok_or_else(|| JsError::Error(format!("Unknown context {}", id)))?;
    let ctx = state
        .host_context()
        .ok_or_else(|| JsError::Error(BridgeError::ContextDropped(id).to_string()))?;
    Ok((state, ctx))
}

/// `_host_call(contextId, name, jsonArgs)`.
pub(crate) fn host_call(realm: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let (state, ctx) = target(args)?;
    let call = BridgeCall::Json {
        context: state.id,
        name: realm.to_string(&arg(args, 1))?,
        args: realm.to_string(&arg(args, 2))?,
    };
    let resolver = ctx.resolver();
    match state.resolve(|| call.dispatch(resolver.as_ref(), &ctx))? {
        BridgeReply::Json(Some(json)) => realm.json_parse(&json),
        _ => Ok(Value::Undefined),
    }
}

/// `_host_call_raw(contextId, name, argsArray)`.
pub(crate) fn host_call_raw(realm: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let (state, ctx) = target(args)?;
    let name = realm.to_string(&arg(args, 1))?;

    let values: Vec<Value> = match arg(args, 2) {
        Value::Object(array) if array.borrow().is_array() => array
            .borrow()
            .elements()
            .iter()
            .map(|element| element.clone().unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    };
    let handles = values.into_iter().map(|value| state.wrap(value)).collect();

    let call = BridgeCall::Handle {
        context: state.id,
        name: name.clone(),
        caller: caller_info(realm.agent()),
        args: handles,
    };
    let resolver = ctx.resolver();
    let result = match state.resolve(|| call.dispatch(resolver.as_ref(), &ctx))? {
        BridgeReply::Handle(Some(handle)) => handle,
        _ => return Ok(Value::Undefined),
    };

    if result.context_id() != state.id {
        return Err(JsError::Error(format!(
            "Error processing return value of raw function callback {}: \
             Return value was generated from another context.",
            name
        )));
    }
    state.value(result).map_err(|err| {
        JsError::Error(format!(
            "Error processing return value of raw function callback {}: {}",
            name, err
        ))
    })
}

/// The frame that called the JS wrapper which invoked `_host_call_raw`.
/// Empty when the wrapper was applied straight from the host.
fn caller_info(agent: &Agent) -> CallerInfo {
    let frames = agent.frames();
    match frames.len().checked_sub(2).and_then(|i| frames.get(i)) {
        Some(frame) => CallerInfo {
            function: frame.function.clone(),
            file: frame.script.clone(),
            line: frame.line,
            column: frame.column,
        },
        None => CallerInfo::default(),
    }
}
