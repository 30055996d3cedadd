//! JavaScript object system.
//!
//! Implements JavaScript objects, their internal slots and the environment
//! records closures capture.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use crate::agent::Script;
use crate::ast::Function;
use crate::error::{JsError, JsResult};
use crate::interpreter::Interpreter;
use crate::value::Value;

/// Property key.
///
/// Canonical array-index strings (`"0"`, `"17"`) are always stored as
/// `Index`, so `o[1]` and `o["1"]` name the same property.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String key.
    String(String),
    /// Index key.
    Index(u32),
}

impl PropertyKey {
    /// Create a string key.
    pub fn string<S: Into<String>>(s: S) -> Self {
        PropertyKey::from(s.into())
    }

    /// Create an index key.
    pub fn index(i: u32) -> Self {
        PropertyKey::Index(i)
    }

    /// The index, if this is an index key.
    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            PropertyKey::String(_) => None,
        }
    }

    /// Whether the key names `s` (a non-index string).
    pub fn is(&self, s: &str) -> bool {
        matches!(self, PropertyKey::String(k) if k == s)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => f.write_str(s),
            PropertyKey::Index(i) => write!(f, "{}", i),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        match canonical_index(s) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(s.into()),
        }
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        match canonical_index(&s) {
            Some(i) => PropertyKey::Index(i),
            None => PropertyKey::String(s),
        }
    }
}

impl From<u32> for PropertyKey {
    fn from(i: u32) -> Self {
        PropertyKey::Index(i)
    }
}

/// `"0"`..`"4294967294"` without leading zeros.
fn canonical_index(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 10 || (s.len() > 1 && s.starts_with('0')) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match s.parse::<u64>() {
        Ok(n) if n < u32::MAX as u64 => Some(n as u32),
        _ => None,
    }
}

/// Data property attributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Attributes {
    /// Attributes of a property created by assignment.
    pub const DEFAULT: Attributes = Attributes {
        writable: true,
        enumerable: true,
        configurable: true,
    };

    /// Attributes of builtin methods and internal bookkeeping properties.
    pub const HIDDEN: Attributes = Attributes {
        writable: true,
        enumerable: false,
        configurable: true,
    };

    /// Attributes of `name`/`length` on functions.
    pub const READ_ONLY: Attributes = Attributes {
        writable: false,
        enumerable: false,
        configurable: true,
    };
}

/// Property storage.
#[derive(Clone, Debug)]
pub struct Property {
    /// The key.
    pub key: PropertyKey,
    /// The value.
    pub value: Value,
    /// The attributes.
    pub attributes: Attributes,
}

/// Object type classification.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectKind {
    /// Ordinary object.
    Ordinary,
    /// Array object.
    Array,
    /// Function object.
    Function,
    /// Error object.
    Error,
    /// ArrayBuffer object.
    ArrayBuffer(Vec<u8>),
}

/// A JavaScript object.
#[derive(Clone)]
pub struct JsObject {
    /// Object kind.
    kind: ObjectKind,
    /// Properties in insertion order.
    properties: Vec<Property>,
    /// Prototype.
    prototype: Option<Rc<RefCell<JsObject>>>,
    /// Extensible flag.
    extensible: bool,
    /// Frozen arrays also reject element writes.
    frozen: bool,
    /// Call internal method (for functions).
    callable: Option<Callable>,
    /// Construct internal method (for constructors).
    constructable: bool,
    /// Array elements; `None` marks a hole.
    elements: Vec<Option<Value>>,
}

impl JsObject {
    /// Create a new ordinary object.
    pub fn new() -> Self {
        JsObject {
            kind: ObjectKind::Ordinary,
            properties: Vec::new(),
            prototype: None,
            extensible: true,
            frozen: false,
            callable: None,
            constructable: false,
            elements: Vec::new(),
        }
    }

    /// Create an ordinary object with the given prototype.
    pub fn with_prototype(prototype: Option<Rc<RefCell<JsObject>>>) -> Self {
        let mut obj = JsObject::new();
        obj.prototype = prototype;
        obj
    }

    /// Create an array object.
    pub fn array(elements: Vec<Option<Value>>) -> Self {
        let mut obj = JsObject::new();
        obj.kind = ObjectKind::Array;
        obj.elements = elements;
        obj
    }

    /// Create a function object with `name` and `length` properties.
    pub fn function(callable: Callable, constructable: bool) -> Self {
        let name = callable.name();
        let length = callable.length();

        let mut obj = JsObject::new();
        obj.kind = ObjectKind::Function;
        obj.callable = Some(callable);
        obj.constructable = constructable;

        obj.define_property(PropertyKey::string("length"), Value::number(length as f64), Attributes::READ_ONLY);
        obj.define_property(PropertyKey::string("name"), Value::string(name), Attributes::READ_ONLY);

        obj
    }

    /// Create an error object; `message` and `stack` are attached by the
    /// realm.
    pub fn error() -> Self {
        let mut obj = JsObject::new();
        obj.kind = ObjectKind::Error;
        obj
    }

    /// Create an `ArrayBuffer` over already-zeroed storage.
    pub fn array_buffer(data: Vec<u8>) -> Self {
        let mut obj = JsObject::new();
        obj.kind = ObjectKind::ArrayBuffer(data);
        obj
    }

    /// Get the object kind.
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Turn an ordinary object into an error object (used by `new Error`
    /// subclass constructors).
    pub fn set_kind(&mut self, kind: ObjectKind) {
        self.kind = kind;
    }

    /// Check if object is callable.
    pub fn is_callable(&self) -> bool {
        self.callable.is_some()
    }

    /// Check if object is constructable.
    pub fn is_constructable(&self) -> bool {
        self.constructable
    }

    /// Check if object is an array.
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ObjectKind::Array)
    }

    /// Get the callable.
    pub fn callable(&self) -> Option<&Callable> {
        self.callable.as_ref()
    }

    /// Set the prototype.
    pub fn set_prototype(&mut self, proto: Option<Rc<RefCell<JsObject>>>) {
        self.prototype = proto;
    }

    /// Get the prototype.
    pub fn prototype(&self) -> Option<&Rc<RefCell<JsObject>>> {
        self.prototype.as_ref()
    }

    /// Own property value, if present.
    pub fn get_own(&self, key: &PropertyKey) -> Option<Value> {
        if self.is_array() {
            match key {
                PropertyKey::Index(i) => {
                    return self.elements.get(*i as usize).cloned().flatten();
                }
                PropertyKey::String(s) if s == "length" => {
                    return Some(Value::number(self.elements.len() as f64));
                }
                _ => {}
            }
        }
        if let ObjectKind::ArrayBuffer(data) = &self.kind {
            if key.is("byteLength") {
                return Some(Value::number(data.len() as f64));
            }
        }

        self.properties
            .iter()
            .find(|p| &p.key == key)
            .map(|p| p.value.clone())
    }

    /// Get a property, walking the prototype chain.
    pub fn get(&self, key: &PropertyKey) -> Value {
        if let Some(value) = self.get_own(key) {
            return value;
        }

        let mut next = self.prototype.clone();
        while let Some(proto) = next {
            let proto = proto.borrow();
            if let Some(value) = proto.get_own(key) {
                return value;
            }
            next = proto.prototype.clone();
        }

        Value::undefined()
    }

    /// Set a property. Returns `false` when the write is rejected (read-only
    /// property, non-extensible object, invalid array length).
    pub fn set(&mut self, key: PropertyKey, value: Value) -> bool {
        if self.is_array() {
            match key {
                PropertyKey::Index(i) => {
                    let i = i as usize;
                    if self.frozen {
                        return false;
                    }
                    if i >= self.elements.len() {
                        if !self.extensible {
                            return false;
                        }
                        self.elements.resize(i + 1, None);
                    }
                    self.elements[i] = Some(value);
                    return true;
                }
                PropertyKey::String(ref s) if s == "length" => {
                    return self.set_array_length(&value);
                }
                _ => {}
            }
        }
        if matches!(self.kind, ObjectKind::ArrayBuffer(_)) && key.is("byteLength") {
            return false;
        }

        if let Some(prop) = self.properties.iter_mut().find(|p| p.key == key) {
            if !prop.attributes.writable {
                return false;
            }
            prop.value = value;
            return true;
        }

        if !self.extensible {
            return false;
        }

        self.properties.push(Property {
            key,
            value,
            attributes: Attributes::DEFAULT,
        });
        true
    }

    fn set_array_length(&mut self, value: &Value) -> bool {
        let n = value.to_number();
        if self.frozen {
            return false;
        }
        if !(n >= 0.0 && n <= u32::MAX as f64 && n == libm::trunc(n)) {
            return false;
        }
        self.elements.resize(n as usize, None);
        true
    }

    /// Define or overwrite an own data property.
    pub fn define_property(&mut self, key: PropertyKey, value: Value, attributes: Attributes) {
        if self.is_array() && key.as_index().is_some() {
            self.set(key, value);
            return;
        }

        match self.properties.iter_mut().find(|p| p.key == key) {
            Some(prop) => {
                prop.value = value;
                prop.attributes = attributes;
            }
            None => self.properties.push(Property {
                key,
                value,
                attributes,
            }),
        }
    }

    /// Check if object has own property.
    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.get_own(key).is_some() || self.properties.iter().any(|p| &p.key == key)
    }

    /// Check if property exists (including prototype chain).
    pub fn has(&self, key: &PropertyKey) -> bool {
        if self.has_own_property(key) {
            return true;
        }

        let mut next = self.prototype.clone();
        while let Some(proto) = next {
            let proto = proto.borrow();
            if proto.has_own_property(key) {
                return true;
            }
            next = proto.prototype.clone();
        }

        false
    }

    /// Delete a property.
    pub fn delete(&mut self, key: &PropertyKey) -> bool {
        if self.is_array() {
            if let PropertyKey::Index(i) = key {
                if let Some(slot) = self.elements.get_mut(*i as usize) {
                    *slot = None;
                }
                return true;
            }
            if key.is("length") {
                return false;
            }
        }

        if let Some(pos) = self.properties.iter().position(|p| &p.key == key) {
            if !self.properties[pos].attributes.configurable {
                return false;
            }
            self.properties.remove(pos);
        }

        true
    }

    /// Get own property keys: integer indices ascending, then string keys in
    /// insertion order.
    pub fn own_keys(&self) -> Vec<PropertyKey> {
        self.collect_keys(false)
    }

    /// Get own enumerable property keys in the same order as [`own_keys`].
    ///
    /// [`own_keys`]: JsObject::own_keys
    pub fn own_enumerable_keys(&self) -> Vec<PropertyKey> {
        self.collect_keys(true)
    }

    fn collect_keys(&self, enumerable_only: bool) -> Vec<PropertyKey> {
        let mut keys = Vec::new();

        for (i, element) in self.elements.iter().enumerate() {
            if element.is_some() {
                keys.push(PropertyKey::Index(i as u32));
            }
        }

        let visible = |p: &&Property| !enumerable_only || p.attributes.enumerable;

        let mut indices: Vec<u32> = self
            .properties
            .iter()
            .filter(visible)
            .filter_map(|p| p.key.as_index())
            .collect();
        indices.sort_unstable();
        keys.extend(indices.into_iter().map(PropertyKey::Index));

        keys.extend(
            self.properties
                .iter()
                .filter(visible)
                .filter(|p| p.key.as_index().is_none())
                .map(|p| p.key.clone()),
        );

        keys
    }

    /// Drop every property and element. Used to break reference cycles
    /// when a realm is torn down.
    pub fn clear(&mut self) {
        self.properties.clear();
        self.elements.clear();
        self.prototype = None;
        self.callable = None;
    }

    /// Prevent extensions.
    pub fn prevent_extensions(&mut self) {
        self.extensible = false;
    }

    /// Make every own property read-only and stop extensions.
    pub fn freeze(&mut self) {
        self.extensible = false;
        self.frozen = true;
        for prop in &mut self.properties {
            prop.attributes.writable = false;
            prop.attributes.configurable = false;
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Check if extensible.
    pub fn is_extensible(&self) -> bool {
        self.extensible
    }

    /// Array elements; empty for non-arrays.
    pub fn elements(&self) -> &[Option<Value>] {
        &self.elements
    }

    /// Get array length.
    pub fn array_length(&self) -> usize {
        if self.is_array() {
            self.elements.len()
        } else {
            0
        }
    }

    /// Push to array.
    pub fn array_push(&mut self, value: Value) -> bool {
        if !self.is_array() || !self.extensible {
            return false;
        }
        self.elements.push(Some(value));
        true
    }

    /// Pop from array.
    pub fn array_pop(&mut self) -> Option<Value> {
        if self.is_array() && !self.frozen {
            self.elements.pop().flatten()
        } else {
            None
        }
    }
}

impl JsObject {
    /// Move every object this one holds directly into `out`.
    fn take_children(&mut self, out: &mut Vec<Rc<RefCell<JsObject>>>) {
        let values = self
            .properties
            .drain(..)
            .map(|property| property.value)
            .chain(self.elements.drain(..).flatten());
        for value in values {
            if let Value::Object(obj) = value {
                out.push(obj);
            }
        }
        out.extend(self.prototype.take());
    }
}

// Object graphs built by script can be arbitrarily deep (`o = {a: o}` in a
// loop); release them with an explicit worklist instead of recursive drops.
impl Drop for JsObject {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_children(&mut pending);
        while let Some(obj) = pending.pop() {
            if let Ok(cell) = Rc::try_unwrap(obj) {
                cell.into_inner().take_children(&mut pending);
            }
        }
    }
}

impl Default for JsObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Prototypes and property values can be cyclic; list keys only.
        f.debug_struct("JsObject")
            .field("kind", &self.kind)
            .field("keys", &self.own_keys())
            .finish()
    }
}

/// Signature of builtins implemented in Rust.
pub type NativeFn = fn(&Interpreter, &Value, &[Value]) -> JsResult<Value>;

/// Signature of embedder-supplied functions.
pub type HostFn = Rc<dyn Fn(&Interpreter, &Value, &[Value]) -> JsResult<Value>>;

/// Callable function type.
#[derive(Clone)]
pub enum Callable {
    /// Builtin function.
    Native(NativeFunction),
    /// Function supplied by the embedder.
    Host(HostFunction),
    /// User-defined function.
    UserDefined(UserFunction),
    /// Bound function.
    Bound(BoundFunction),
}

impl Callable {
    /// Get function name.
    pub fn name(&self) -> String {
        match self {
            Callable::Native(f) => f.name.clone(),
            Callable::Host(f) => f.name.clone(),
            Callable::UserDefined(f) => f.name.clone(),
            Callable::Bound(f) => format!("bound {}", f.target_name),
        }
    }

    /// Get function length (parameter count).
    pub fn length(&self) -> usize {
        match self {
            Callable::Native(f) => f.length,
            Callable::Host(f) => f.length,
            Callable::UserDefined(f) => f.func.length(),
            Callable::Bound(f) => f.target_length.saturating_sub(f.bound_args.len()),
        }
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Callable::Native(_) => "Native",
            Callable::Host(_) => "Host",
            Callable::UserDefined(_) => "UserDefined",
            Callable::Bound(_) => "Bound",
        };
        write!(f, "{}({})", kind, self.name())
    }
}

/// Native function.
#[derive(Clone)]
pub struct NativeFunction {
    /// Function name.
    pub name: String,
    /// Function length.
    pub length: usize,
    /// Function pointer.
    pub func: NativeFn,
}

/// Embedder function.
#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub length: usize,
    pub func: HostFn,
}

/// User-defined function.
#[derive(Clone)]
pub struct UserFunction {
    /// Declared or inferred name (`var f = function() {}` is named `f`).
    pub name: String,
    /// Parsed function.
    pub func: Rc<Function>,
    /// Captured environment.
    pub environment: Rc<RefCell<Environment>>,
    /// Script the function was defined in.
    pub script: Rc<Script>,
}

/// Bound function.
#[derive(Clone)]
pub struct BoundFunction {
    /// Target function object.
    pub target: Value,
    /// Bound this value.
    pub bound_this: Value,
    /// Bound arguments.
    pub bound_args: Vec<Value>,
    target_name: String,
    target_length: usize,
}

impl BoundFunction {
    pub fn new(target: Value, bound_this: Value, bound_args: Vec<Value>) -> Self {
        let (target_name, target_length) = match &target {
            Value::Object(obj) => match obj.borrow().callable() {
                Some(callable) => (callable.name(), callable.length()),
                None => (String::new(), 0),
            },
            _ => (String::new(), 0),
        };
        BoundFunction {
            target,
            bound_this,
            bound_args,
            target_name,
            target_length,
        }
    }
}

/// Environment record.
///
/// The global environment is backed by the global object: `var` and
/// function declarations live there as properties, lexical bindings in
/// `bindings`.
pub struct Environment {
    /// Variable bindings.
    bindings: Vec<(String, Binding)>,
    /// Outer environment.
    outer: Option<Rc<RefCell<Environment>>>,
    /// This binding.
    this_binding: Option<Value>,
    /// Global object, for the global environment.
    object: Option<Rc<RefCell<JsObject>>>,
}

/// Variable binding.
#[derive(Clone, Debug)]
pub struct Binding {
    /// Value.
    pub value: Value,
    /// Is mutable.
    pub mutable: bool,
    /// Is initialized.
    pub initialized: bool,
}

impl Environment {
    /// Create a new global environment.
    pub fn global(global_object: Rc<RefCell<JsObject>>) -> Self {
        Environment {
            bindings: Vec::new(),
            outer: None,
            this_binding: Some(Value::Object(Rc::clone(&global_object))),
            object: Some(global_object),
        }
    }

    /// Create a child (block) environment.
    pub fn child(outer: Rc<RefCell<Environment>>) -> Self {
        Environment {
            bindings: Vec::new(),
            outer: Some(outer),
            this_binding: None,
            object: None,
        }
    }

    /// Create a function environment. Arrow functions pass `None` and see
    /// the `this` of their defining scope.
    pub fn function(outer: Rc<RefCell<Environment>>, this_value: Option<Value>) -> Self {
        Environment {
            bindings: Vec::new(),
            outer: Some(outer),
            this_binding: this_value,
            object: None,
        }
    }

    /// Declare a lexical binding (`let`, `const`, catch parameters).
    pub fn declare(&mut self, name: &str, mutable: bool) -> JsResult<()> {
        if self.bindings.iter().any(|(n, _)| n == name) {
            return Err(JsError::syntax(format!(
                "Identifier '{}' has already been declared",
                name
            )));
        }

        self.bindings.push((
            String::from(name),
            Binding {
                value: Value::undefined(),
                mutable,
                initialized: false,
            },
        ));

        Ok(())
    }

    /// Declare a `var` or function binding. Redeclaration keeps the current
    /// value.
    pub fn declare_var(&mut self, name: &str) {
        if let Some(object) = &self.object {
            let key = PropertyKey::string(name);
            let mut object = object.borrow_mut();
            if !object.has_own_property(&key) {
                object.define_property(key, Value::undefined(), Attributes::DEFAULT);
            }
            return;
        }

        if !self.bindings.iter().any(|(n, _)| n == name) {
            self.bindings.push((
                String::from(name),
                Binding {
                    value: Value::undefined(),
                    mutable: true,
                    initialized: true,
                },
            ));
        }
    }

    /// Initialize a binding of this environment.
    pub fn initialize(&mut self, name: &str, value: Value) {
        if let Some((_, binding)) = self.bindings.iter_mut().find(|(n, _)| n == name) {
            binding.value = value;
            binding.initialized = true;
            return;
        }

        if let Some(object) = &self.object {
            object.borrow_mut().set(PropertyKey::string(name), value);
            return;
        }

        self.bindings.push((
            String::from(name),
            Binding {
                value,
                mutable: true,
                initialized: true,
            },
        ));
    }

    /// Look a name up; `None` if it is not bound anywhere.
    pub fn lookup(&self, name: &str) -> JsResult<Option<Value>> {
        if let Some((_, binding)) = self.bindings.iter().find(|(n, _)| n == name) {
            if !binding.initialized {
                return Err(JsError::reference(format!(
                    "Cannot access '{}' before initialization",
                    name
                )));
            }
            return Ok(Some(binding.value.clone()));
        }

        if let Some(object) = &self.object {
            let key = PropertyKey::string(name);
            let object = object.borrow();
            if object.has(&key) {
                return Ok(Some(object.get(&key)));
            }
        }

        match &self.outer {
            Some(outer) => outer.borrow().lookup(name),
            None => Ok(None),
        }
    }

    /// Get a variable.
    pub fn get(&self, name: &str) -> JsResult<Value> {
        self.lookup(name)?
            .ok_or_else(|| JsError::reference(format!("{} is not defined", name)))
    }

    /// Assign to a variable. Unresolvable names become properties of the
    /// global object.
    pub fn set(&mut self, name: &str, value: Value) -> JsResult<()> {
        if let Some((_, binding)) = self.bindings.iter_mut().find(|(n, _)| n == name) {
            if !binding.initialized {
                return Err(JsError::reference(format!(
                    "Cannot access '{}' before initialization",
                    name
                )));
            }
            if !binding.mutable {
                return Err(JsError::type_error("Assignment to constant variable."));
            }
            binding.value = value;
            return Ok(());
        }

        if let Some(object) = &self.object {
            object.borrow_mut().set(PropertyKey::string(name), value);
            return Ok(());
        }

        match &self.outer {
            Some(outer) => outer.borrow_mut().set(name, value),
            None => Ok(()),
        }
    }

    /// Get this value.
    pub fn get_this(&self) -> Value {
        if let Some(this) = &self.this_binding {
            return this.clone();
        }

        match &self.outer {
            Some(outer) => outer.borrow().get_this(),
            None => Value::undefined(),
        }
    }

    /// Check if variable exists.
    pub fn has(&self, name: &str) -> bool {
        if self.bindings.iter().any(|(n, _)| n == name) {
            return true;
        }
        if let Some(object) = &self.object {
            if object.borrow().has(&PropertyKey::string(name)) {
                return true;
            }
        }

        match &self.outer {
            Some(outer) => outer.borrow().has(name),
            None => false,
        }
    }

    /// Drop every binding. Used to break reference cycles when a realm is
    /// torn down.
    pub fn clear(&mut self) {
        self.bindings.clear();
        self.this_binding = None;
        self.object = None;
        self.outer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_normalize_to_indices() {
        assert_eq!(PropertyKey::from("7"), PropertyKey::Index(7));
        assert_eq!(PropertyKey::from("07"), PropertyKey::string("07"));
        assert_eq!(PropertyKey::from("-1"), PropertyKey::String("-1".into()));
        assert_eq!(PropertyKey::from("4294967295"), PropertyKey::String("4294967295".into()));
    }

    #[test]
    fn enumeration_order_puts_indices_first() {
        let mut obj = JsObject::new();
        obj.set(PropertyKey::from("b"), Value::number(1.0));
        obj.set(PropertyKey::from("2"), Value::number(2.0));
        obj.set(PropertyKey::from("a"), Value::number(3.0));
        obj.set(PropertyKey::from("0"), Value::number(4.0));
        obj.define_property(PropertyKey::from("hidden"), Value::Null, Attributes::HIDDEN);

        let keys: Vec<String> = obj
            .own_enumerable_keys()
            .iter()
            .map(|k| alloc::format!("{}", k))
            .collect();
        assert_eq!(keys, ["0", "2", "b", "a"]);
    }

    #[test]
    fn array_length_tracks_elements() {
        let mut arr = JsObject::array(Vec::new());
        arr.set(PropertyKey::Index(3), Value::number(1.0));
        assert_eq!(arr.get(&PropertyKey::from("length")).to_number(), 4.0);
        assert!(arr.set(PropertyKey::from("length"), Value::number(1.0)));
        assert_eq!(arr.array_length(), 1);
        assert!(!arr.set(PropertyKey::from("length"), Value::number(-1.0)));
    }

    #[test]
    fn deep_object_chains_drop_without_recursion() {
        let mut head = Rc::new(RefCell::new(JsObject::new()));
        for i in 0..1_000_000 {
            let mut next = if i % 2 == 0 {
                JsObject::new()
            } else {
                JsObject::array(Vec::new())
            };
            next.set(PropertyKey::from("a"), Value::Object(head));
            head = Rc::new(RefCell::new(next));
        }
        let shared = Rc::clone(&head);
        drop(head);
        assert_eq!(shared.borrow().own_keys().len(), 1);
        drop(shared);
    }

    #[test]
    fn frozen_object_rejects_writes() {
        let mut obj = JsObject::new();
        obj.set(PropertyKey::from("a"), Value::number(1.0));
        obj.freeze();
        assert!(!obj.set(PropertyKey::from("a"), Value::number(2.0)));
        assert!(!obj.set(PropertyKey::from("b"), Value::number(2.0)));
        assert_eq!(obj.get(&PropertyKey::from("a")).to_number(), 1.0);
    }

    #[test]
    fn global_environment_uses_global_object() {
        let global = Rc::new(RefCell::new(JsObject::new()));
        let env = Rc::new(RefCell::new(Environment::global(Rc::clone(&global))));
        env.borrow_mut().declare_var("x");
        env.borrow_mut().set("x", Value::number(5.0)).unwrap();
        assert_eq!(global.borrow().get(&PropertyKey::from("x")).to_number(), 5.0);

        env.borrow_mut().set("implicit", Value::Boolean(true)).unwrap();
        assert!(global.borrow().has_own_property(&PropertyKey::from("implicit")));

        env.borrow_mut().declare("y", false).unwrap();
        env.borrow_mut().initialize("y", Value::Null);
        assert!(env.borrow_mut().set("y", Value::Undefined).is_err());
        assert!(env.borrow_mut().declare("y", true).is_err());

        let inner = Environment::child(Rc::clone(&env));
        assert!(inner.get("nope").is_err());
        assert!(inner.get("x").is_ok());
    }
}
