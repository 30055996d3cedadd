//! Execution contexts.
//!
//! A [`Context`] is one global scope on an [`Isolate`]. It is a cheap,
//! `Send + Sync` handle; the realm itself lives on the isolate's engine
//! thread and every method here is a job run there.
//!
//! `execute`, `eval`, `apply` and `from_json` are top-level operations: they
//! clear the last error on entry and, on failure, store the exception report
//! as the last error and return it as [`BridgeError::Script`]. The handle
//! operations (`to_json`, `set_field`, `burst`, `get`, `release`) never touch
//! the last error.

use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use kpio_jsvm::{PropertyKey, Script, Value};
use serde::Serialize;

use crate::bridge::{CallerInfo, FunctionRegistry, Resolver};
use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::isolate::Isolate;
use crate::report;
use crate::runtime::ContextState;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// One global execution scope on an isolate.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

pub(crate) struct ContextInner {
    id: u32,
    isolate: Isolate,
    resolver: Arc<dyn Resolver>,
    registry: Arc<FunctionRegistry>,
    raw_counter: AtomicU32,
}

impl Context {
    /// Create a context whose bridge calls go to its own
    /// [`FunctionRegistry`].
    pub fn new(isolate: &Isolate) -> Result<Self> {
        let registry = Arc::new(FunctionRegistry::new());
        Self::build(isolate, registry.clone(), registry)
    }

    /// Create a context whose bridge calls go to `resolver`.
    ///
    /// `add_func` and friends still register into the context's own
    /// registry; only `resolver` is consulted by script.
    pub fn with_resolver(isolate: &Isolate, resolver: Arc<dyn Resolver>) -> Result<Self> {
        Self::build(isolate, resolver, Arc::new(FunctionRegistry::new()))
    }

    fn build(
        isolate: &Isolate,
        resolver: Arc<dyn Resolver>,
        registry: Arc<FunctionRegistry>,
    ) -> Result<Self> {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(ContextInner {
            id,
            isolate: isolate.clone(),
            resolver,
            registry,
            raw_counter: AtomicU32::new(0),
        });
        let host = Arc::downgrade(&inner);
        isolate.run(move |rt| rt.create_context(id, host))??;
        Ok(Context { inner })
    }

    pub(crate) fn from_inner(inner: Arc<ContextInner>) -> Self {
        Context { inner }
    }

    pub(crate) fn resolver(&self) -> Arc<dyn Resolver> {
        Arc::clone(&self.inner.resolver)
    }

    /// Process-unique id of this context; the first context gets 1.
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn isolate(&self) -> &Isolate {
        &self.inner.isolate
    }

    /// The registry behind `add_func` / `add_raw_func`.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.inner.registry
    }

    /// Abort whatever is running on this context's isolate.
    pub fn terminate(&self) {
        self.inner.isolate.terminate();
    }

    /// Run `f` against this context's engine-side state.
    fn with_state<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ContextState) -> Result<R> + Send + 'static,
    {
        let id = self.inner.id;
        self.inner.isolate.run(move |rt| {
            let state = rt.context(id)?;
            f(&*state)
        })?
    }

    // ---- top-level operations ----

    /// Run `source` and return the JSON encoding of its completion value.
    ///
    /// Functions and `undefined` yield an empty string.
    pub fn execute(&self, source: &str, filename: &str) -> Result<String> {
        let script = (filename.to_string(), source.to_string());
        self.with_state(move |state| {
            state.begin();
            let value = state
                .realm
                .eval_script(Script::new(script.0, script.1))
                .map_err(|err| state.fail(err))?;
            if value.is_undefined() || value.is_function() {
                return Ok(String::new());
            }
            match state.realm.json_stringify(&value) {
                Ok(json) => Ok(json.unwrap_or_default()),
                Err(err) => Err(state.fail(err)),
            }
        })
    }

    /// Run `source` and hold on to its completion value.
    pub fn eval(&self, source: &str, filename: &str) -> Result<Handle> {
        let script = (filename.to_string(), source.to_string());
        self.with_state(move |state| {
            state.begin();
            let value = state
                .realm
                .eval_script(Script::new(script.0, script.1))
                .map_err(|err| state.fail(err))?;
            Ok(state.wrap(value))
        })
    }

    /// Call the function behind `func` with `this` (the global object when
    /// `None`) and `args`.
    pub fn apply(&self, func: Handle, this: Option<Handle>, args: &[Handle]) -> Result<Handle> {
        let args = args.to_vec();
        self.with_state(move |state| {
            state.begin();
            let func = state.value(func)?;
            let this = match this {
                Some(this) => state.value(this)?,
                None => Value::Object(Rc::clone(state.realm.global_object())),
            };
            let args = args
                .iter()
                .map(|arg| state.value(*arg))
                .collect::<Result<Vec<_>>>()?;

            let result = state
                .realm
                .call(&func, &this, &args)
                .map_err(|err| state.fail(err))?;
            Ok(state.wrap(result))
        })
    }

    /// Report of the last failed top-level operation; empty after a success.
    pub fn error(&self) -> Result<String> {
        self.with_state(|state| Ok(state.last_error()))
    }

    /// Raise `Error(message)` in script once the running resolver returns.
    ///
    /// Only meaningful from inside a resolver of this context.
    pub fn throw(&self, message: &str) -> Result<()> {
        let message = message.to_string();
        self.with_state(move |state| {
            if !state.request_throw(message.clone()) {
                log::warn!(
                    "[KPIO JSBridge] throw({:?}) on context {} outside a bridge call ignored",
                    message,
                    state.id
                );
            }
            Ok(())
        })
    }

    /// Parse `text` as JSON into a new value.
    pub fn from_json(&self, text: &str) -> Result<Handle> {
        let text = text.to_string();
        self.with_state(move |state| {
            state.begin();
            let value = state
                .realm
                .json_parse(&text)
                .map_err(|err| state.fail(err))?;
            Ok(state.wrap(value))
        })
    }

    /// Convert any serializable value into a script value.
    pub fn to_value<T: Serialize + ?Sized>(&self, value: &T) -> Result<Handle> {
        let json = serde_json::to_string(value)?;
        self.from_json(&json)
    }

    /// Evaluate the expression `expr`.
    pub fn create_js(&self, expr: &str, filename: &str) -> Result<Handle> {
        self.eval(&format!("(function() {{ return {}; }})()", expr), filename)
    }

    /// Call the global function `funcname` with JSON arguments and decode
    /// the result. An empty result is `Null`.
    pub fn run(&self, funcname: &str, args: &[serde_json::Value]) -> Result<serde_json::Value> {
        let args = args
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let source = format!("{}({})", funcname, args.join(","));
        let json = self.execute(&source, &format!("[RUN:{}]", funcname))?;
        if json.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&json)?)
    }

    // ---- handles ----

    /// JSON encoding of the current state of the value; `undefined` for
    /// values without one.
    pub fn to_json(&self, handle: Handle) -> Result<String> {
        self.with_state(move |state| {
            let value = state.value(handle)?;
            match state.realm.json_stringify(&value) {
                Ok(json) => Ok(json.unwrap_or_else(|| String::from("undefined"))),
                Err(err) => Err(BridgeError::Script(report::render(&state.realm, err))),
            }
        })
    }

    /// `target[name] = value`.
    pub fn set_field(&self, target: Handle, name: &str, value: Handle) -> Result<()> {
        let name = name.to_string();
        self.with_state(move |state| {
            let object = state.value(target)?;
            if !object.is_object() {
                return Err(BridgeError::NotAnObject);
            }
            let value = state.value(value)?;
            match state.realm.set_property(&object, PropertyKey::from(name), value) {
                Ok(true) => state.handles.borrow_mut().rebind(target, object),
                _ => Err(BridgeError::CannotSetValue),
            }
        })
    }

    /// Split an object into `(name, handle)` pairs, one per own enumerable
    /// property, in enumeration order.
    pub fn burst(&self, handle: Handle) -> Result<Vec<(String, Handle)>> {
        self.with_state(move |state| {
            let value = state.value(handle)?;
            let Value::Object(object) = &value else {
                return Err(BridgeError::NotBurstable(describe(state, &value)));
            };
            let entries = state.realm.own_enumerable_entries(object);
            let mut handles = state.handles.borrow_mut();
            Ok(entries
                .into_iter()
                .map(|(key, value)| (key.to_string(), handles.insert(value)))
                .collect())
        })
    }

    /// Own property `field` of an object.
    pub fn get(&self, handle: Handle, field: &str) -> Result<Handle> {
        let field = field.to_string();
        self.with_state(move |state| {
            let value = state.value(handle)?;
            let Value::Object(object) = &value else {
                return Err(BridgeError::NotAnObject);
            };
            let found = object.borrow().get_own(&PropertyKey::from(field.as_str()));
            match found {
                Some(found) => Ok(state.wrap(found)),
                None => Err(BridgeError::UndefinedField(field)),
            }
        })
    }

    /// The string behind `handle`; fails for any other type.
    pub fn to_string_value(&self, handle: Handle) -> Result<String> {
        self.with_state(move |state| match state.value(handle)? {
            Value::String(s) => Ok(s),
            other => Err(BridgeError::NotAString(describe(state, &other))),
        })
    }

    /// Drop the value behind `handle`. The handle must not be used again.
    pub fn release(&self, handle: Handle) -> Result<()> {
        self.with_state(move |state| {
            let released = state.handles.borrow_mut().remove(handle);
            match released {
                Ok(_) => Ok(()),
                Err(err) => {
                    log::warn!(
                        "[KPIO JSBridge] Release of stale handle on context {}: {}",
                        state.id,
                        err
                    );
                    Err(err)
                }
            }
        })
    }

    /// Release every handle this context owns.
    pub fn clear_values(&self) -> Result<()> {
        self.with_state(|state| {
            state.handles.borrow_mut().clear();
            Ok(())
        })
    }

    /// Number of handles this context currently owns.
    pub fn live_values(&self) -> Result<usize> {
        self.with_state(|state| Ok(state.handles.borrow().len()))
    }

    // ---- host functions ----

    /// Register `f` and define the global function `name` that calls it
    /// with its arguments converted to JSON.
    pub fn add_func<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&[serde_json::Value]) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        self.inner.registry.add_func(name, f);
        let source = format!(
            "function {}(...args) {{ return _host_call({}, {}, JSON.stringify(args)); }}",
            name,
            self.inner.id,
            quote(name)?
        );
        self.execute(&source, &format!("native callback to {}", name))
            .map(drop)
    }

    /// Register `f` and define the global function `name` that calls it
    /// with handles to its arguments.
    pub fn add_raw_func<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: Fn(&Context, &CallerInfo, &[Handle]) -> Result<Option<Handle>> + Send + Sync + 'static,
    {
        self.inner.registry.add_raw_func(name, f);
        let source = format!(
            "function {}(...args) {{ return _host_call_raw({}, {}, args); }}",
            name,
            self.inner.id,
            quote(name)?
        );
        self.execute(&source, &format!("native callback to {}", name))
            .map(drop)
    }

    /// Register `f` under a generated name and return a handle to a function
    /// calling it. No global is defined.
    pub fn create_raw_func<F>(&self, f: F) -> Result<Handle>
    where
        F: Fn(&Context, &CallerInfo, &[Handle]) -> Result<Option<Handle>> + Send + Sync + 'static,
    {
        let n = self.inner.raw_counter.fetch_add(1, Ordering::Relaxed);
        let name = format!("RawFunc:{}", n);
        self.inner.registry.add_raw_func(&name, f);
        let source = format!(
            "(function(...args) {{ return _host_call_raw({}, {}, args); }})",
            self.inner.id,
            quote(&name)?
        );
        self.eval(&source, crate::NO_FILE)
    }
}

/// JSON view of a value for diagnostics, falling back to its string form.
fn describe(state: &ContextState, value: &Value) -> String {
    match state.realm.json_stringify(value) {
        Ok(Some(json)) => json,
        _ => value.to_display_string(),
    }
}

fn quote(name: &str) -> Result<String> {
    Ok(serde_json::to_string(name)?)
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("isolate", &self.inner.isolate.id())
            .finish()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let id = self.id;
        // Fails only when the isolate is already gone, and its realms with it.
        let _ = self.isolate.run(move |rt| rt.remove_context(id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> Context {
        Context::new(&Isolate::new().unwrap()).unwrap()
    }

    #[test]
    fn execute_returns_json() {
        let ctx = context();
        assert_eq!(ctx.execute("var a = 10; var b = 20; a + b;", "").unwrap(), "30");
        assert_eq!(ctx.execute("({x: [1, 'two']})", "").unwrap(), r#"{"x":[1,"two"]}"#);
        assert_eq!(ctx.execute("(function() {})", "").unwrap(), "");
        assert_eq!(ctx.execute("undefined", "").unwrap(), "");
    }

    #[test]
    fn failures_set_and_success_clears_the_last_error() {
        let ctx = context();
        let err = ctx.execute("throw 'nope'", "a.js").unwrap_err();
        assert!(err.is_script());
        assert_eq!(ctx.error().unwrap(), err.to_string());
        ctx.execute("1", "a.js").unwrap();
        assert_eq!(ctx.error().unwrap(), "");
    }

    #[test]
    fn handle_errors_leave_the_last_error_alone() {
        let ctx = context();
        ctx.execute("throw 'kept'", "a.js").unwrap_err();
        let n = ctx.eval("3", "").unwrap();
        let v = ctx.eval("4", "").unwrap();
        ctx.execute("throw 'kept'", "a.js").unwrap_err();
        assert!(matches!(ctx.set_field(n, "x", v), Err(BridgeError::NotAnObject)));
        assert!(ctx.error().unwrap().contains("kept"));
    }

    #[test]
    fn apply_with_a_stale_handle_starts_a_new_operation() {
        let ctx = context();
        let f = ctx.eval("(function(x) { return x; })", "").unwrap();
        let arg = ctx.eval("1", "").unwrap();
        ctx.release(arg).unwrap();
        ctx.execute("throw 'old'", "a.js").unwrap_err();

        assert!(matches!(ctx.apply(f, None, &[arg]), Err(BridgeError::Released)));
        assert_eq!(ctx.error().unwrap(), "");

        ctx.execute("throw 'old'", "a.js").unwrap_err();
        ctx.release(f).unwrap();
        assert!(matches!(ctx.apply(f, None, &[]), Err(BridgeError::Released)));
        assert_eq!(ctx.error().unwrap(), "");
    }

    #[test]
    fn ids_are_unique() {
        let isolate = Isolate::new().unwrap();
        let a = Context::new(&isolate).unwrap();
        let b = Context::new(&isolate).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id() >= 1);
    }

    #[test]
    fn handles_of_other_contexts_are_rejected() {
        let isolate = Isolate::new().unwrap();
        let a = Context::new(&isolate).unwrap();
        let b = Context::new(&isolate).unwrap();
        let h = a.eval("({})", "").unwrap();
        assert!(matches!(b.to_json(h), Err(BridgeError::ForeignHandle { .. })));
    }

    #[test]
    fn clear_values_releases_everything() {
        let ctx = context();
        let h = ctx.eval("[1, 2]", "").unwrap();
        ctx.burst(h).unwrap();
        assert_eq!(ctx.live_values().unwrap(), 3);
        ctx.clear_values().unwrap();
        assert_eq!(ctx.live_values().unwrap(), 0);
        assert!(matches!(ctx.to_json(h), Err(BridgeError::Released)));
    }

    #[test]
    fn frozen_objects_reject_writes() {
        let ctx = context();
        let obj = ctx.eval("Object.freeze({a: 1})", "").unwrap();
        let v = ctx.eval("2", "").unwrap();
        assert!(matches!(ctx.set_field(obj, "a", v), Err(BridgeError::CannotSetValue)));
        assert_eq!(ctx.to_json(obj).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn to_json_of_cycles_is_a_report() {
        let ctx = context();
        let h = ctx.eval("var o = {}; o.o = o; o", "").unwrap();
        let err = ctx.to_json(h).unwrap_err();
        assert!(err.to_string().contains("Converting circular structure to JSON"));
        assert_eq!(ctx.error().unwrap(), "");
    }

    #[test]
    fn contexts_drop_with_their_realm() {
        let isolate = Isolate::new().unwrap();
        let ctx = Context::new(&isolate).unwrap();
        let id = ctx.id();
        drop(ctx);
        let gone = isolate.run(move |rt| rt.context(id).is_err()).unwrap();
        assert!(gone);
    }
}
