//! JavaScript built-in objects and functions.
//!
//! Implements the standard library subset available to embedded scripts.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicU64, Ordering};

use libm::{floor, trunc};

use crate::interpreter::{describe_value, Interpreter, ObjectRef};
use crate::error::{JsError, JsResult};
use crate::object::{Attributes, BoundFunction, Callable, JsObject, NativeFn, ObjectKind, PropertyKey};
use crate::value::{number_to_string, parse_radix, Value};

/// Initialize built-in objects.
pub fn init(interp: &Interpreter) {
    let global = Rc::clone(interp.global_object());

    // Global values
    {
        let mut g = global.borrow_mut();
        g.define_property(PropertyKey::string("undefined"), Value::undefined(), Attributes::READ_ONLY);
        g.define_property(PropertyKey::string("NaN"), Value::number(f64::NAN), Attributes::READ_ONLY);
        g.define_property(PropertyKey::string("Infinity"), Value::number(f64::INFINITY), Attributes::READ_ONLY);
    }
    interp.define_global("globalThis", Value::Object(Rc::clone(&global)));

    // Global functions
    interp.define_native_function(&global, "isNaN", 1, is_nan);
    interp.define_native_function(&global, "isFinite", 1, is_finite);
    interp.define_native_function(&global, "parseInt", 2, parse_int);
    interp.define_native_function(&global, "parseFloat", 1, parse_float);

    init_object(interp);
    init_function(interp);
    init_array(interp);
    init_string(interp);
    init_number(interp);
    init_boolean(interp);
    init_math(interp);
    init_json(interp);
    init_error(interp);
    init_array_buffer(interp);
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// Argument that must be callable, as for `Array.prototype.map`.
fn callback(args: &[Value], index: usize) -> JsResult<Value> {
    let f = arg(args, index);
    if f.is_function() {
        Ok(f)
    } else {
        Err(JsError::type_error(format!("{} is not a function", describe_value(&f))))
    }
}

/// ToIntegerOrInfinity.
fn to_integer(interp: &Interpreter, value: &Value) -> JsResult<f64> {
    let n = interp.to_number(value)?;
    Ok(if n.is_nan() { 0.0 } else { trunc(n) })
}

/// Resolve a relative index (negative counts from the end) into `0..=len`.
fn relative_index(interp: &Interpreter, value: &Value, len: usize, default: usize) -> JsResult<usize> {
    if value.is_undefined() {
        return Ok(default);
    }
    let n = to_integer(interp, value)?;
    let len_f = len as f64;
    let resolved = if n < 0.0 { (len_f + n).max(0.0) } else { n.min(len_f) };
    Ok(resolved as usize)
}

// Global functions

fn is_nan(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(interp.to_number(&arg(args, 0))?.is_nan()))
}

fn is_finite(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(interp.to_number(&arg(args, 0))?.is_finite()))
}

fn parse_int(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let string = interp.to_string(&arg(args, 0))?;
    let mut s = string.trim();

    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    let mut radix = interp.to_number(&arg(args, 1))? as i64;
    if radix == 0 {
        radix = 10;
        if s.starts_with("0x") || s.starts_with("0X") {
            radix = 16;
            s = &s[2..];
        }
    } else if radix == 16 && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::number(f64::NAN));
    }

    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_digit(radix as u32))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let result = match parse_radix(&s[..end], radix as u32) {
        Some(n) if end > 0 => n,
        _ => f64::NAN,
    };

    Ok(Value::number(if negative { -result } else { result }))
}

fn parse_float(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let string = interp.to_string(&arg(args, 0))?;
    let s = string.trim_start();

    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if unsigned.starts_with("Infinity") {
        let inf = if s.starts_with('-') { f64::NEG_INFINITY } else { f64::INFINITY };
        return Ok(Value::number(inf));
    }

    // Longest prefix that is a decimal literal.
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || (end == digits_start + 1 && bytes[digits_start] == b'.') {
        return Ok(Value::number(f64::NAN));
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }

    Ok(Value::number(s[..end].parse::<f64>().unwrap_or(f64::NAN)))
}

// Object constructor

fn init_object(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().object_prototype);
    let ctor = interp.create_constructor("Object", 1, object_constructor, &proto);

    interp.define_native_function(&ctor, "keys", 1, object_keys);
    interp.define_native_function(&ctor, "values", 1, object_values);
    interp.define_native_function(&ctor, "entries", 1, object_entries);
    interp.define_native_function(&ctor, "assign", 2, object_assign);
    interp.define_native_function(&ctor, "freeze", 1, object_freeze);
    interp.define_native_function(&ctor, "isFrozen", 1, object_is_frozen);
    interp.define_native_function(&ctor, "create", 2, object_create);
    interp.define_native_function(&ctor, "getPrototypeOf", 1, object_get_prototype_of);

    interp.define_native_function(&proto, "toString", 0, object_to_string);
    interp.define_native_function(&proto, "valueOf", 0, object_value_of);
    interp.define_native_function(&proto, "hasOwnProperty", 1, object_has_own_property);

    interp.define_global("Object", Value::Object(ctor));
}

/// ToObject for the `Object.*` helpers; primitives other than strings have
/// no own enumerable properties.
fn object_arg(interp: &Interpreter, value: &Value) -> JsResult<Option<ObjectRef>> {
    match value {
        Value::Object(obj) => Ok(Some(Rc::clone(obj))),
        Value::Undefined | Value::Null => Err(JsError::type_error(
            "Cannot convert undefined or null to object",
        )),
        Value::String(s) => {
            let chars = s.chars().map(|c| Value::String(c.to_string())).collect();
            Ok(Some(interp.new_array(chars)))
        }
        _ => Ok(None),
    }
}

fn object_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    match arg(args, 0) {
        value @ Value::Object(_) => Ok(value),
        _ => Ok(Value::Object(interp.new_object())),
    }
}

fn object_keys(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let keys = match object_arg(interp, &arg(args, 0))? {
        Some(obj) => obj
            .borrow()
            .own_enumerable_keys()
            .into_iter()
            .map(|k| Value::string(k.to_string()))
            .collect(),
        None => Vec::new(),
    };
    Ok(Value::Object(interp.new_array(keys)))
}

fn object_values(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let values = match object_arg(interp, &arg(args, 0))? {
        Some(obj) => interp
            .own_enumerable_entries(&obj)
            .into_iter()
            .map(|(_, v)| v)
            .collect(),
        None => Vec::new(),
    };
    Ok(Value::Object(interp.new_array(values)))
}

fn object_entries(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let entries = match object_arg(interp, &arg(args, 0))? {
        Some(obj) => interp
            .own_enumerable_entries(&obj)
            .into_iter()
            .map(|(k, v)| Value::Object(interp.new_array(alloc::vec![Value::string(k.to_string()), v])))
            .collect(),
        None => Vec::new(),
    };
    Ok(Value::Object(interp.new_array(entries)))
}

fn object_assign(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = match object_arg(interp, &arg(args, 0))? {
        Some(obj) => obj,
        None => interp.new_object(),
    };

    for source in args.iter().skip(1) {
        if source.is_nullish() {
            continue;
        }
        if let Some(src) = object_arg(interp, source)? {
            for (key, value) in interp.own_enumerable_entries(&src) {
                if !target.borrow_mut().set(key.clone(), value) {
                    return Err(JsError::type_error(format!(
                        "Cannot assign to read only property '{}' of object",
                        key
                    )));
                }
            }
        }
    }

    Ok(Value::Object(target))
}

fn object_freeze(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let value = arg(args, 0);
    if let Value::Object(obj) = &value {
        obj.borrow_mut().freeze();
    }
    Ok(value)
}

fn object_is_frozen(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(match arg(args, 0) {
        Value::Object(obj) => obj.borrow().is_frozen(),
        _ => true,
    }))
}

fn object_create(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let prototype = match arg(args, 0) {
        Value::Object(proto) => Some(proto),
        Value::Null => None,
        other => {
            return Err(JsError::type_error(format!(
                "Object prototype may only be an Object or null: {}",
                other
            )))
        }
    };
    Ok(Value::object(JsObject::with_prototype(prototype)))
}

fn object_get_prototype_of(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = arg(args, 0);
    let proto = match &target {
        Value::Object(obj) => obj.borrow().prototype().cloned(),
        Value::Undefined | Value::Null => {
            return Err(JsError::type_error("Cannot convert undefined or null to object"))
        }
        Value::String(_) => Some(Rc::clone(&interp.intrinsics().string_prototype)),
        Value::Number(_) => Some(Rc::clone(&interp.intrinsics().number_prototype)),
        Value::Boolean(_) => Some(Rc::clone(&interp.intrinsics().boolean_prototype)),
    };
    Ok(proto.map(Value::Object).unwrap_or(Value::Null))
}

fn object_to_string(_interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let tag = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Boolean(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Object(obj) => {
            let obj = obj.borrow();
            if obj.is_array() {
                "Array"
            } else if obj.is_callable() {
                "Function"
            } else {
                match obj.kind() {
                    ObjectKind::Error => "Error",
                    ObjectKind::ArrayBuffer(_) => "ArrayBuffer",
                    _ => "Object",
                }
            }
        }
    };
    Ok(Value::string(format!("[object {}]", tag)))
}

fn object_value_of(_interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(this.clone())
}

fn object_has_own_property(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let key = interp.to_property_key(&arg(args, 0))?;
    Ok(Value::boolean(match this {
        Value::Object(obj) => obj.borrow().has_own_property(&key),
        Value::String(s) => {
            key.is("length") || key.as_index().map_or(false, |i| (i as usize) < s.chars().count())
        }
        _ => false,
    }))
}

// Function prototype

fn init_function(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().function_prototype);
    let ctor = interp.create_constructor("Function", 1, function_constructor, &proto);

    interp.define_native_function(&proto, "call", 1, function_call);
    interp.define_native_function(&proto, "apply", 2, function_apply);
    interp.define_native_function(&proto, "bind", 1, function_bind);
    interp.define_native_function(&proto, "toString", 0, function_to_string);

    interp.define_global("Function", Value::Object(ctor));
}

fn function_constructor(_interp: &Interpreter, _this: &Value, _args: &[Value]) -> JsResult<Value> {
    Err(JsError::EvalError(String::from(
        "Code generation from strings disallowed for this context",
    )))
}

fn function_call(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let rest = args.get(1..).unwrap_or(&[]);
    interp.call(this, &arg(args, 0), rest)
}

fn function_apply(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let list = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        array_like @ Value::Object(_) => list_from_array_like(interp, &array_like)?,
        _ => {
            return Err(JsError::type_error(
                "CreateListFromArrayLike called on non-object",
            ))
        }
    };
    interp.call(this, &arg(args, 0), &list)
}

fn function_bind(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let constructable = match this {
        Value::Object(obj) if obj.borrow().is_callable() => obj.borrow().is_constructable(),
        _ => return Err(JsError::type_error("Bind must be called on a function")),
    };
    let bound = BoundFunction::new(
        this.clone(),
        arg(args, 0),
        args.get(1..).map(<[Value]>::to_vec).unwrap_or_default(),
    );
    Ok(Value::Object(interp.make_function(Callable::Bound(bound), constructable)))
}

fn function_to_string(_interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let obj = match this {
        Value::Object(obj) if obj.borrow().is_callable() => Rc::clone(obj),
        _ => {
            return Err(JsError::type_error(
                "Function.prototype.toString requires that 'this' be a Function",
            ))
        }
    };
    let obj = obj.borrow();
    let text = match obj.callable() {
        Some(Callable::UserDefined(user)) => {
            let span = user.func.span;
            user.script
                .source
                .chars()
                .skip(span.start)
                .take(span.end.saturating_sub(span.start))
                .collect()
        }
        Some(callable) => format!("function {}() {{ [native code] }}", callable.name()),
        None => String::new(),
    };
    Ok(Value::String(text))
}

// Array constructor

fn init_array(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().array_prototype);
    let ctor = interp.create_constructor("Array", 1, array_constructor, &proto);

    interp.define_native_function(&ctor, "isArray", 1, array_is_array);

    interp.define_native_function(&proto, "push", 1, array_push);
    interp.define_native_function(&proto, "pop", 0, array_pop);
    interp.define_native_function(&proto, "shift", 0, array_shift);
    interp.define_native_function(&proto, "unshift", 1, array_unshift);
    interp.define_native_function(&proto, "slice", 2, array_slice);
    interp.define_native_function(&proto, "concat", 1, array_concat);
    interp.define_native_function(&proto, "join", 1, array_join);
    interp.define_native_function(&proto, "reverse", 0, array_reverse);
    interp.define_native_function(&proto, "indexOf", 1, array_index_of);
    interp.define_native_function(&proto, "includes", 1, array_includes);
    interp.define_native_function(&proto, "forEach", 1, array_for_each);
    interp.define_native_function(&proto, "map", 1, array_map);
    interp.define_native_function(&proto, "filter", 1, array_filter);
    interp.define_native_function(&proto, "some", 1, array_some);
    interp.define_native_function(&proto, "every", 1, array_every);
    interp.define_native_function(&proto, "reduce", 1, array_reduce);
    interp.define_native_function(&proto, "toString", 0, array_to_string);

    interp.define_global("Array", Value::Object(ctor));
}

/// `this` of an `Array.prototype` method.
fn this_array_like(this: &Value, method: &str) -> JsResult<Value> {
    if this.is_nullish() {
        return Err(JsError::type_error(format!(
            "Array.prototype.{} called on null or undefined",
            method
        )));
    }
    Ok(this.clone())
}

fn length_of(interp: &Interpreter, target: &Value) -> JsResult<usize> {
    if let Value::Object(obj) = target {
        let obj = obj.borrow();
        if obj.is_array() {
            return Ok(obj.array_length());
        }
    }
    let len = interp.get_property(target, &PropertyKey::string("length"))?;
    let n = to_integer(interp, &len)?;
    Ok(if n <= 0.0 { 0 } else { n.min(u32::MAX as f64) as usize })
}

fn element(interp: &Interpreter, target: &Value, index: usize) -> JsResult<Value> {
    interp.get_property(target, &PropertyKey::Index(index as u32))
}

fn list_from_array_like(interp: &Interpreter, target: &Value) -> JsResult<Vec<Value>> {
    let len = length_of(interp, target)?;
    (0..len).map(|i| element(interp, target, i)).collect()
}

fn array_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    if let [Value::Number(n)] = args {
        if *n < 0.0 || *n > u32::MAX as f64 || trunc(*n) != *n {
            return Err(JsError::range("Invalid array length"));
        }
        let mut array = JsObject::array(alloc::vec![None; *n as usize]);
        array.set_prototype(Some(Rc::clone(&interp.intrinsics().array_prototype)));
        return Ok(Value::object(array));
    }
    Ok(Value::Object(interp.new_array(args.to_vec())))
}

fn array_is_array(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(arg(args, 0).is_array()))
}

fn array_push(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "push")?;
    if let Value::Object(obj) = &target {
        let mut array = obj.borrow_mut();
        if array.is_array() {
            for value in args {
                if !array.array_push(value.clone()) {
                    return Err(JsError::type_error(format!(
                        "Cannot add property {}, object is not extensible",
                        array.array_length()
                    )));
                }
            }
            return Ok(Value::number(array.array_length() as f64));
        }
    }

    let mut len = length_of(interp, &target)?;
    for value in args {
        interp.set_property(&target, PropertyKey::Index(len as u32), value.clone())?;
        len += 1;
    }
    interp.set_property(&target, PropertyKey::string("length"), Value::number(len as f64))?;
    Ok(Value::number(len as f64))
}

fn array_pop(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "pop")?;
    if let Value::Object(obj) = &target {
        let mut array = obj.borrow_mut();
        if array.is_array() {
            return Ok(array.array_pop().unwrap_or_default());
        }
    }

    let len = length_of(interp, &target)?;
    if len == 0 {
        interp.set_property(&target, PropertyKey::string("length"), Value::number(0.0))?;
        return Ok(Value::undefined());
    }
    let last = element(interp, &target, len - 1)?;
    if let Value::Object(obj) = &target {
        obj.borrow_mut().delete(&PropertyKey::Index((len - 1) as u32));
    }
    interp.set_property(&target, PropertyKey::string("length"), Value::number((len - 1) as f64))?;
    Ok(last)
}

/// Replace the contents of an array-like with `values`.
fn store_list(interp: &Interpreter, target: &Value, values: Vec<Value>) -> JsResult<()> {
    let len = values.len();
    for (i, value) in values.into_iter().enumerate() {
        if !interp.set_property(target, PropertyKey::Index(i as u32), value)? {
            return Err(JsError::type_error(format!(
                "Cannot assign to read only property '{}' of object",
                i
            )));
        }
    }
    interp.set_property(target, PropertyKey::string("length"), Value::number(len as f64))?;
    Ok(())
}

fn array_shift(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "shift")?;
    let mut list = list_from_array_like(interp, &target)?;
    if list.is_empty() {
        return Ok(Value::undefined());
    }
    let first = list.remove(0);
    store_list(interp, &target, list)?;
    Ok(first)
}

fn array_unshift(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "unshift")?;
    let mut list = args.to_vec();
    list.extend(list_from_array_like(interp, &target)?);
    let len = list.len();
    store_list(interp, &target, list)?;
    Ok(Value::number(len as f64))
}

fn array_slice(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "slice")?;
    let len = length_of(interp, &target)?;
    let start = relative_index(interp, &arg(args, 0), len, 0)?;
    let end = relative_index(interp, &arg(args, 1), len, len)?;
    let mut values = Vec::new();
    for i in start..end.max(start) {
        values.push(element(interp, &target, i)?);
    }
    Ok(Value::Object(interp.new_array(values)))
}

fn array_concat(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "concat")?;
    let mut values = list_from_array_like(interp, &target)?;
    for item in args {
        if item.is_array() {
            values.extend(list_from_array_like(interp, item)?);
        } else {
            values.push(item.clone());
        }
    }
    Ok(Value::Object(interp.new_array(values)))
}

fn array_join(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "join")?;
    let separator = match arg(args, 0) {
        Value::Undefined => String::from(","),
        sep => interp.to_string(&sep)?,
    };
    let mut out = String::new();
    for i in 0..length_of(interp, &target)? {
        if i > 0 {
            out.push_str(&separator);
        }
        let item = element(interp, &target, i)?;
        if !item.is_nullish() {
            out.push_str(&interp.to_string(&item)?);
        }
    }
    Ok(Value::String(out))
}

fn array_reverse(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "reverse")?;
    let mut list = list_from_array_like(interp, &target)?;
    list.reverse();
    store_list(interp, &target, list)?;
    Ok(target)
}

fn array_index_of(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "indexOf")?;
    let needle = arg(args, 0);
    let len = length_of(interp, &target)?;
    let start = relative_index(interp, &arg(args, 1), len, 0)?;
    for i in start..len {
        if element(interp, &target, i)?.strict_equals(&needle) {
            return Ok(Value::number(i as f64));
        }
    }
    Ok(Value::number(-1.0))
}

fn array_includes(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "includes")?;
    let needle = arg(args, 0);
    let len = length_of(interp, &target)?;
    let start = relative_index(interp, &arg(args, 1), len, 0)?;
    for i in start..len {
        if element(interp, &target, i)?.same_value_zero(&needle) {
            return Ok(Value::boolean(true));
        }
    }
    Ok(Value::boolean(false))
}

/// Call `f(element, index, array)` for each element until `visit` says stop.
fn each_element<F>(interp: &Interpreter, this: &Value, args: &[Value], method: &str, mut visit: F) -> JsResult<()>
where
    F: FnMut(Value, Value) -> JsResult<bool>,
{
    let target = this_array_like(this, method)?;
    let f = callback(args, 0)?;
    let this_arg = arg(args, 1);
    let len = length_of(interp, &target)?;
    for i in 0..len {
        interp.agent().check_interrupt()?;
        let item = element(interp, &target, i)?;
        let result = interp.call(&f, &this_arg, &[item.clone(), Value::number(i as f64), target.clone()])?;
        if !visit(item, result)? {
            break;
        }
    }
    Ok(())
}

fn array_for_each(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    each_element(interp, this, args, "forEach", |_, _| Ok(true))?;
    Ok(Value::undefined())
}

fn array_map(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut mapped = Vec::new();
    each_element(interp, this, args, "map", |_, result| {
        mapped.push(result);
        Ok(true)
    })?;
    Ok(Value::Object(interp.new_array(mapped)))
}

fn array_filter(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut kept = Vec::new();
    each_element(interp, this, args, "filter", |item, result| {
        if result.to_boolean() {
            kept.push(item);
        }
        Ok(true)
    })?;
    Ok(Value::Object(interp.new_array(kept)))
}

fn array_some(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut found = false;
    each_element(interp, this, args, "some", |_, result| {
        found = result.to_boolean();
        Ok(!found)
    })?;
    Ok(Value::boolean(found))
}

fn array_every(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut all = true;
    each_element(interp, this, args, "every", |_, result| {
        all = result.to_boolean();
        Ok(all)
    })?;
    Ok(Value::boolean(all))
}

fn array_reduce(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let target = this_array_like(this, "reduce")?;
    let f = callback(args, 0)?;
    let len = length_of(interp, &target)?;

    let mut index = 0;
    let mut acc = if args.len() > 1 {
        args[1].clone()
    } else {
        if len == 0 {
            return Err(JsError::type_error("Reduce of empty array with no initial value"));
        }
        index = 1;
        element(interp, &target, 0)?
    };

    while index < len {
        interp.agent().check_interrupt()?;
        let item = element(interp, &target, index)?;
        acc = interp.call(
            &f,
            &Value::undefined(),
            &[acc, item, Value::number(index as f64), target.clone()],
        )?;
        index += 1;
    }
    Ok(acc)
}

fn array_to_string(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    array_join(interp, this, &[])
}

// String constructor

fn init_string(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().string_prototype);
    let ctor = interp.create_constructor("String", 1, string_constructor, &proto);

    interp.define_native_function(&ctor, "fromCharCode", 1, string_from_char_code);

    interp.define_native_function(&proto, "toString", 0, string_to_string);
    interp.define_native_function(&proto, "valueOf", 0, string_to_string);
    interp.define_native_function(&proto, "charAt", 1, string_char_at);
    interp.define_native_function(&proto, "charCodeAt", 1, string_char_code_at);
    interp.define_native_function(&proto, "indexOf", 1, string_index_of);
    interp.define_native_function(&proto, "includes", 1, string_includes);
    interp.define_native_function(&proto, "startsWith", 1, string_starts_with);
    interp.define_native_function(&proto, "endsWith", 1, string_ends_with);
    interp.define_native_function(&proto, "slice", 2, string_slice);
    interp.define_native_function(&proto, "substring", 2, string_substring);
    interp.define_native_function(&proto, "toUpperCase", 0, string_to_upper_case);
    interp.define_native_function(&proto, "toLowerCase", 0, string_to_lower_case);
    interp.define_native_function(&proto, "trim", 0, string_trim);
    interp.define_native_function(&proto, "split", 2, string_split);
    interp.define_native_function(&proto, "replace", 2, string_replace);
    interp.define_native_function(&proto, "repeat", 1, string_repeat);
    interp.define_native_function(&proto, "padStart", 2, string_pad_start);

    interp.define_global("String", Value::Object(ctor));
}

fn this_string(interp: &Interpreter, this: &Value, method: &str) -> JsResult<String> {
    if this.is_nullish() {
        return Err(JsError::type_error(format!(
            "String.prototype.{} called on null or undefined",
            method
        )));
    }
    interp.to_string(this)
}

fn chars_of(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn string_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    match args.first() {
        Some(value) => Ok(Value::String(interp.to_string(value)?)),
        None => Ok(Value::string("")),
    }
}

fn string_from_char_code(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut out = String::new();
    for code in args {
        let code = interp.to_number(code)? as u32 & 0xFFFF;
        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    Ok(Value::String(out))
}

fn string_to_string(_interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    match this {
        Value::String(_) => Ok(this.clone()),
        _ => Err(JsError::type_error(
            "String.prototype.toString requires that 'this' be a String",
        )),
    }
}

fn string_char_at(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "charAt")?;
    let index = to_integer(interp, &arg(args, 0))?;
    let ch = if index < 0.0 { None } else { s.chars().nth(index as usize) };
    Ok(Value::String(ch.map(String::from).unwrap_or_default()))
}

fn string_char_code_at(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "charCodeAt")?;
    let index = to_integer(interp, &arg(args, 0))?;
    let ch = if index < 0.0 { None } else { s.chars().nth(index as usize) };
    Ok(Value::number(ch.map_or(f64::NAN, |c| c as u32 as f64)))
}

/// Char index of `needle` in `haystack` at or after char `from`.
fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    (from..haystack.len())
        .find(|&i| haystack[i..].starts_with(needle))
}

fn string_index_of(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = chars_of(&this_string(interp, this, "indexOf")?);
    let needle = chars_of(&interp.to_string(&arg(args, 0))?);
    let from = relative_index(interp, &arg(args, 1), s.len(), 0)?;
    Ok(Value::number(
        find_chars(&s, &needle, from).map_or(-1.0, |i| i as f64),
    ))
}

fn string_includes(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "includes")?;
    let needle = interp.to_string(&arg(args, 0))?;
    Ok(Value::boolean(s.contains(needle.as_str())))
}

fn string_starts_with(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "startsWith")?;
    let needle = interp.to_string(&arg(args, 0))?;
    Ok(Value::boolean(s.starts_with(needle.as_str())))
}

fn string_ends_with(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "endsWith")?;
    let needle = interp.to_string(&arg(args, 0))?;
    Ok(Value::boolean(s.ends_with(needle.as_str())))
}

fn string_slice(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = chars_of(&this_string(interp, this, "slice")?);
    let start = relative_index(interp, &arg(args, 0), s.len(), 0)?;
    let end = relative_index(interp, &arg(args, 1), s.len(), s.len())?;
    let out: String = if start < end { s[start..end].iter().collect() } else { String::new() };
    Ok(Value::String(out))
}

fn string_substring(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = chars_of(&this_string(interp, this, "substring")?);
    let clamp = |v: &Value, default: usize| -> JsResult<usize> {
        if v.is_undefined() {
            return Ok(default);
        }
        Ok(to_integer(interp, v)?.max(0.0).min(s.len() as f64) as usize)
    };
    let a = clamp(&arg(args, 0), 0)?;
    let b = clamp(&arg(args, 1), s.len())?;
    let (start, end) = if a <= b { (a, b) } else { (b, a) };
    Ok(Value::String(s[start..end].iter().collect()))
}

fn string_to_upper_case(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::String(this_string(interp, this, "toUpperCase")?.to_uppercase()))
}

fn string_to_lower_case(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::String(this_string(interp, this, "toLowerCase")?.to_lowercase()))
}

fn string_trim(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::string(this_string(interp, this, "trim")?.trim()))
}

fn string_split(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "split")?;
    let limit = match arg(args, 1) {
        Value::Undefined => usize::MAX,
        v => interp.to_number(&v)? as u32 as usize,
    };
    let parts: Vec<Value> = match arg(args, 0) {
        Value::Undefined => alloc::vec![Value::String(s)],
        sep => {
            let sep = interp.to_string(&sep)?;
            if sep.is_empty() {
                s.chars().map(|c| Value::String(c.to_string())).collect()
            } else {
                s.split(sep.as_str()).map(Value::string).collect()
            }
        }
    };
    Ok(Value::Object(interp.new_array(parts.into_iter().take(limit).collect())))
}

fn string_replace(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "replace")?;
    let pattern = interp.to_string(&arg(args, 0))?;
    let Some(pos) = s.find(pattern.as_str()) else {
        return Ok(Value::String(s));
    };

    let replacement = match arg(args, 1) {
        f if f.is_function() => {
            let offset = s[..pos].chars().count();
            let result = interp.call(
                &f,
                &Value::undefined(),
                &[Value::string(pattern.as_str()), Value::number(offset as f64), Value::string(s.as_str())],
            )?;
            interp.to_string(&result)?
        }
        v => interp.to_string(&v)?.replace("$&", &pattern),
    };

    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..pos]);
    out.push_str(&replacement);
    out.push_str(&s[pos + pattern.len()..]);
    Ok(Value::String(out))
}

fn string_repeat(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "repeat")?;
    let count = to_integer(interp, &arg(args, 0))?;
    if count < 0.0 || count.is_infinite() {
        return Err(JsError::range(format!("Invalid count value: {}", number_to_string(count))));
    }
    if (s.len() as f64) * count > (1u64 << 29) as f64 {
        return Err(JsError::range("Invalid string length"));
    }
    Ok(Value::String(s.repeat(count as usize)))
}

fn string_pad_start(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let s = this_string(interp, this, "padStart")?;
    let target = to_integer(interp, &arg(args, 0))?.max(0.0) as usize;
    let fill = match arg(args, 1) {
        Value::Undefined => String::from(" "),
        v => interp.to_string(&v)?,
    };
    let len = s.chars().count();
    if target <= len || fill.is_empty() {
        return Ok(Value::String(s));
    }
    let mut out: String = fill.chars().cycle().take(target - len).collect();
    out.push_str(&s);
    Ok(Value::String(out))
}

// Number constructor

fn init_number(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().number_prototype);
    let ctor = interp.create_constructor("Number", 1, number_constructor, &proto);

    {
        let mut c = ctor.borrow_mut();
        c.define_property(PropertyKey::string("MAX_SAFE_INTEGER"), Value::number(9007199254740991.0), Attributes::READ_ONLY);
        c.define_property(PropertyKey::string("MIN_SAFE_INTEGER"), Value::number(-9007199254740991.0), Attributes::READ_ONLY);
        c.define_property(PropertyKey::string("EPSILON"), Value::number(f64::EPSILON), Attributes::READ_ONLY);
    }
    interp.define_native_function(&ctor, "isInteger", 1, number_is_integer);
    interp.define_native_function(&ctor, "isFinite", 1, number_is_finite);
    interp.define_native_function(&ctor, "isNaN", 1, number_is_nan);

    interp.define_native_function(&proto, "toString", 1, number_to_string_method);
    interp.define_native_function(&proto, "toFixed", 1, number_to_fixed);
    interp.define_native_function(&proto, "valueOf", 0, number_value_of);

    interp.define_global("Number", Value::Object(ctor));
}

fn this_number(this: &Value, method: &str) -> JsResult<f64> {
    match this {
        Value::Number(n) => Ok(*n),
        _ => Err(JsError::type_error(format!(
            "Number.prototype.{} requires that 'this' be a Number",
            method
        ))),
    }
}

fn number_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    match args.first() {
        Some(value) => Ok(Value::number(interp.to_number(value)?)),
        None => Ok(Value::number(0.0)),
    }
}

fn number_is_integer(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && trunc(n) == n)))
}

fn number_is_finite(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(matches!(arg(args, 0), Value::Number(n) if n.is_finite())))
}

fn number_is_nan(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(matches!(arg(args, 0), Value::Number(n) if n.is_nan())))
}

fn number_to_string_method(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = this_number(this, "toString")?;
    let radix = match arg(args, 0) {
        Value::Undefined => 10,
        r => to_integer(interp, &r)? as i64,
    };
    if !(2..=36).contains(&radix) {
        return Err(JsError::range("toString() radix must be between 2 and 36"));
    }
    if radix == 10 || !n.is_finite() || trunc(n) != n {
        return Ok(Value::String(number_to_string(n)));
    }

    let mut digits = Vec::new();
    let mut m = libm::fabs(n);
    while m >= 1.0 {
        let d = libm::fmod(m, radix as f64) as u32;
        digits.push(core::char::from_digit(d, radix as u32).unwrap_or('0'));
        m = floor(m / radix as f64);
    }
    if digits.is_empty() {
        digits.push('0');
    }
    if n < 0.0 {
        digits.push('-');
    }
    Ok(Value::String(digits.into_iter().rev().collect()))
}

fn number_to_fixed(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = this_number(this, "toFixed")?;
    let digits = to_integer(interp, &arg(args, 0))?;
    if !(0.0..=100.0).contains(&digits) {
        return Err(JsError::range("toFixed() digits argument must be between 0 and 100"));
    }
    if !n.is_finite() || libm::fabs(n) >= 1e21 {
        return Ok(Value::String(number_to_string(n)));
    }
    Ok(Value::String(format!("{:.*}", digits as usize, n)))
}

fn number_value_of(_interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(this_number(this, "valueOf")?))
}

// Boolean constructor

fn init_boolean(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().boolean_prototype);
    let ctor = interp.create_constructor("Boolean", 1, boolean_constructor, &proto);

    interp.define_native_function(&proto, "toString", 0, boolean_to_string);
    interp.define_native_function(&proto, "valueOf", 0, boolean_value_of);

    interp.define_global("Boolean", Value::Object(ctor));
}

fn boolean_constructor(_interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::boolean(arg(args, 0).to_boolean()))
}

fn boolean_value_of(_interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    match this {
        Value::Boolean(_) => Ok(this.clone()),
        _ => Err(JsError::type_error(
            "Boolean.prototype.valueOf requires that 'this' be a Boolean",
        )),
    }
}

fn boolean_to_string(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let b = boolean_value_of(interp, this, args)?;
    Ok(Value::String(b.to_display_string()))
}

// Math object

fn init_math(interp: &Interpreter) {
    let math = interp.new_object();
    {
        let mut m = math.borrow_mut();
        m.define_property(PropertyKey::string("PI"), Value::number(core::f64::consts::PI), Attributes::READ_ONLY);
        m.define_property(PropertyKey::string("E"), Value::number(core::f64::consts::E), Attributes::READ_ONLY);
        m.define_property(PropertyKey::string("LN2"), Value::number(core::f64::consts::LN_2), Attributes::READ_ONLY);
        m.define_property(PropertyKey::string("SQRT2"), Value::number(core::f64::consts::SQRT_2), Attributes::READ_ONLY);
    }

    interp.define_native_function(&math, "abs", 1, math_abs);
    interp.define_native_function(&math, "floor", 1, math_floor);
    interp.define_native_function(&math, "ceil", 1, math_ceil);
    interp.define_native_function(&math, "round", 1, math_round);
    interp.define_native_function(&math, "trunc", 1, math_trunc);
    interp.define_native_function(&math, "sign", 1, math_sign);
    interp.define_native_function(&math, "sqrt", 1, math_sqrt);
    interp.define_native_function(&math, "pow", 2, math_pow);
    interp.define_native_function(&math, "min", 2, math_min);
    interp.define_native_function(&math, "max", 2, math_max);
    interp.define_native_function(&math, "sin", 1, math_sin);
    interp.define_native_function(&math, "cos", 1, math_cos);
    interp.define_native_function(&math, "tan", 1, math_tan);
    interp.define_native_function(&math, "log", 1, math_log);
    interp.define_native_function(&math, "exp", 1, math_exp);
    interp.define_native_function(&math, "random", 0, math_random);

    interp.define_global("Math", Value::Object(math));
}

fn num_arg(interp: &Interpreter, args: &[Value], index: usize) -> JsResult<f64> {
    interp.to_number(&arg(args, index))
}

fn math_abs(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::fabs(num_arg(interp, args, 0)?)))
}

fn math_floor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(floor(num_arg(interp, args, 0)?)))
}

fn math_ceil(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::ceil(num_arg(interp, args, 0)?)))
}

fn math_round(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = num_arg(interp, args, 0)?;
    Ok(Value::number(if n.is_finite() { floor(n + 0.5) } else { n }))
}

fn math_trunc(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(trunc(num_arg(interp, args, 0)?)))
}

fn math_sign(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let n = num_arg(interp, args, 0)?;
    Ok(Value::number(if n > 0.0 {
        1.0
    } else if n < 0.0 {
        -1.0
    } else {
        n
    }))
}

fn math_sqrt(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::sqrt(num_arg(interp, args, 0)?)))
}

fn math_pow(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::pow(num_arg(interp, args, 0)?, num_arg(interp, args, 1)?)))
}

fn math_min(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut result = f64::INFINITY;
    for value in args {
        let n = interp.to_number(value)?;
        if n.is_nan() {
            return Ok(Value::number(f64::NAN));
        }
        result = result.min(n);
    }
    Ok(Value::number(result))
}

fn math_max(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let mut result = f64::NEG_INFINITY;
    for value in args {
        let n = interp.to_number(value)?;
        if n.is_nan() {
            return Ok(Value::number(f64::NAN));
        }
        result = result.max(n);
    }
    Ok(Value::number(result))
}

fn math_sin(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::sin(num_arg(interp, args, 0)?)))
}

fn math_cos(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::cos(num_arg(interp, args, 0)?)))
}

fn math_tan(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::tan(num_arg(interp, args, 0)?)))
}

fn math_log(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::log(num_arg(interp, args, 0)?)))
}

fn math_exp(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    Ok(Value::number(libm::exp(num_arg(interp, args, 0)?)))
}

static RANDOM_STATE: AtomicU64 = AtomicU64::new(0x2545_F491_4F6C_DD1D);

fn math_random(_interp: &Interpreter, _this: &Value, _args: &[Value]) -> JsResult<Value> {
    // xorshift64*
    let mut x = RANDOM_STATE.load(Ordering::Relaxed);
    x ^= x >> 12;
    x ^= x << 25;
    x ^= x >> 27;
    RANDOM_STATE.store(x, Ordering::Relaxed);
    let bits = x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
    Ok(Value::number(bits as f64 / (1u64 << 53) as f64))
}

// JSON object

fn init_json(interp: &Interpreter) {
    let json = interp.new_object();
    interp.define_native_function(&json, "parse", 2, json_parse);
    interp.define_native_function(&json, "stringify", 3, json_stringify);
    interp.define_global("JSON", Value::Object(json));
}

fn json_parse(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let text = interp.to_string(&arg(args, 0))?;
    interp.json_parse(&text)
}

/// `JSON.stringify(value, replacer, space)`. Replacers are not supported and
/// are ignored.
fn json_stringify(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let indent = match arg(args, 2) {
        Value::Number(n) => " ".repeat(n.clamp(0.0, 10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        interp.json_stringify(&arg(args, 0))?
    } else {
        crate::json::stringify_pretty(interp, &arg(args, 0), &indent)?
    };
    Ok(text.map(Value::String).unwrap_or_default())
}

// Error constructors

fn init_error(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().error_prototype);
    let ctor = interp.create_constructor("Error", 1, error_constructor, &proto);
    interp.define_native_function(&proto, "toString", 0, error_to_string);
    interp.define_global("Error", Value::Object(Rc::clone(&ctor)));

    let subclasses: [(&str, NativeFn); 6] = [
        ("TypeError", type_error_constructor),
        ("ReferenceError", reference_error_constructor),
        ("SyntaxError", syntax_error_constructor),
        ("RangeError", range_error_constructor),
        ("EvalError", eval_error_constructor),
        ("URIError", uri_error_constructor),
    ];
    for (name, func) in subclasses {
        let Some(sub_proto) = interp.intrinsics().error_prototype_for(name).cloned() else {
            continue;
        };
        let sub = interp.create_constructor(name, 1, func, &sub_proto);
        sub.borrow_mut().set_prototype(Some(Rc::clone(&ctor)));
        interp.define_global(name, Value::Object(sub));
    }
}

fn construct_error(interp: &Interpreter, name: &str, args: &[Value]) -> JsResult<Value> {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        m => interp.to_string(&m)?,
    };
    Ok(interp.create_error(name, &message))
}

fn error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "Error", args)
}

fn type_error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "TypeError", args)
}

fn reference_error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "ReferenceError", args)
}

fn syntax_error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "SyntaxError", args)
}

fn range_error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "RangeError", args)
}

fn eval_error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "EvalError", args)
}

fn uri_error_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    construct_error(interp, "URIError", args)
}

fn error_to_string(interp: &Interpreter, this: &Value, _args: &[Value]) -> JsResult<Value> {
    if !this.is_object() {
        return Err(JsError::type_error(
            "Error.prototype.toString requires that 'this' be an Object",
        ));
    }
    let name = match interp.get_property(this, &PropertyKey::string("name"))? {
        Value::Undefined => String::from("Error"),
        v => interp.to_string(&v)?,
    };
    let message = match interp.get_property(this, &PropertyKey::string("message"))? {
        Value::Undefined => String::new(),
        v => interp.to_string(&v)?,
    };
    Ok(Value::String(if name.is_empty() {
        message
    } else if message.is_empty() {
        name
    } else {
        format!("{}: {}", name, message)
    }))
}

// ArrayBuffer constructor

fn init_array_buffer(interp: &Interpreter) {
    let proto = Rc::clone(&interp.intrinsics().array_buffer_prototype);
    let ctor = interp.create_constructor("ArrayBuffer", 1, array_buffer_constructor, &proto);
    interp.define_native_function(&proto, "slice", 2, array_buffer_slice);
    interp.define_global("ArrayBuffer", Value::Object(ctor));
}

fn new_array_buffer(interp: &Interpreter, data: Vec<u8>) -> Value {
    let mut buffer = JsObject::array_buffer(data);
    buffer.set_prototype(Some(Rc::clone(&interp.intrinsics().array_buffer_prototype)));
    Value::Object(Rc::new(RefCell::new(buffer)))
}

fn array_buffer_constructor(interp: &Interpreter, _this: &Value, args: &[Value]) -> JsResult<Value> {
    let len = to_integer(interp, &arg(args, 0))?;
    if !(0.0..=9007199254740991.0).contains(&len) {
        return Err(JsError::range("Invalid array buffer length"));
    }
    let data = interp.agent().allocate_buffer(len as usize)?;
    Ok(new_array_buffer(interp, data))
}

fn array_buffer_slice(interp: &Interpreter, this: &Value, args: &[Value]) -> JsResult<Value> {
    let source = match this {
        Value::Object(obj) => match obj.borrow().kind() {
            ObjectKind::ArrayBuffer(data) => Some(data.clone()),
            _ => None,
        },
        _ => None,
    };
    let Some(source) = source else {
        return Err(JsError::type_error(
            "Method ArrayBuffer.prototype.slice called on incompatible receiver",
        ));
    };
    let start = relative_index(interp, &arg(args, 0), source.len(), 0)?;
    let end = relative_index(interp, &arg(args, 1), source.len(), source.len())?;
    let mut data = interp.agent().allocate_buffer(end.saturating_sub(start))?;
    if start < end {
        data.copy_from_slice(&source[start..end]);
    }
    Ok(new_array_buffer(interp, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, Script};

    fn eval_str(source: &str) -> String {
        let interp = Interpreter::new(Rc::new(Agent::default()));
        let value = interp.eval_script(Script::new("test.js", source)).unwrap();
        interp.to_string(&value).unwrap()
    }

    fn eval_err(source: &str) -> String {
        let interp = Interpreter::new(Rc::new(Agent::default()));
        match interp.eval_script(Script::new("test.js", source)) {
            Err(JsError::Thrown(thrown)) => interp.to_string(&thrown.value).unwrap(),
            other => panic!("expected an exception, got {:?}", other),
        }
    }

    #[test]
    fn array_methods() {
        assert_eq!(eval_str("[1, 2, 3].map(x => x * 2).join('-')"), "2-4-6");
        assert_eq!(eval_str("[1, 2, 3, 4].filter(x => x % 2).length"), "2");
        assert_eq!(eval_str("[1, 2, 3].reduce((a, b) => a + b)"), "6");
        assert_eq!(eval_str("[3, 4].concat([5], 6).slice(-2)"), "5,6");
        assert_eq!(eval_str("var a = [1]; a.push(2, 3); a.pop(); a"), "1,2");
        assert_eq!(eval_str("[NaN].includes(NaN) && [NaN].indexOf(NaN)"), "-1");
    }

    #[test]
    fn map_requires_a_callable() {
        assert_eq!(eval_err("[].map(undefined)"), "TypeError: undefined is not a function");
        assert_eq!(
            eval_err("[].reduce((a, b) => a)"),
            "TypeError: Reduce of empty array with no initial value"
        );
    }

    #[test]
    fn object_helpers() {
        assert_eq!(eval_str("Object.keys({b: 1, a: 2, 1: 3}).join()"), "1,b,a");
        assert_eq!(eval_str("var o = Object.freeze({x: 1}); o.x = 2; o.x"), "1");
        assert_eq!(eval_str("({}).toString()"), "[object Object]");
        assert_eq!(eval_str("Object.assign({a: 1}, {b: 2}).b"), "2");
    }

    #[test]
    fn function_prototype() {
        assert_eq!(eval_str("function f(a, b) { return this.k + a + b; } f.call({k: 1}, 2, 3)"), "6");
        assert_eq!(eval_str("function f(a, b) { return a + b; } f.apply(null, [2, 5])"), "7");
        assert_eq!(eval_str("function f(a, b) { return a * b; } f.bind(null, 4)(5)"), "20");
        assert_eq!(eval_str("function add(a, b) { return a + b; } add.toString()"), "function add(a, b) { return a + b; }");
    }

    #[test]
    fn string_methods() {
        assert_eq!(eval_str("'a,b,,c'.split(',').length"), "4");
        assert_eq!(eval_str("'Hello'.slice(1, -1).toUpperCase()"), "ELL");
        assert_eq!(eval_str("'abc'.replace('b', x => x + x)"), "abbc");
        assert_eq!(eval_str("'7'.padStart(3, '0')"), "007");
        assert_eq!(eval_str("'xyz'.indexOf('z')"), "2");
    }

    #[test]
    fn number_conversions() {
        assert_eq!(eval_str("parseInt('0x1F')"), "31");
        assert_eq!(eval_str("parseInt('12px')"), "12");
        assert_eq!(eval_str("parseFloat('3.5e2abc')"), "350");
        assert_eq!(eval_str("(255).toString(16)"), "ff");
        assert_eq!(eval_str("(1.005).toFixed(1)"), "1.0");
        assert_eq!(eval_str("Number('') + Number('  12  ')"), "12");
    }

    #[test]
    fn errors_render_name_and_message() {
        assert_eq!(eval_str("new RangeError('bad').toString()"), "RangeError: bad");
        assert_eq!(eval_str("String(new Error())"), "Error");
        assert_eq!(eval_str("new TypeError('x') instanceof Error"), "true");
        assert_eq!(eval_str("new Error('m').stack.split('\\n')[0]"), "Error: m");
    }

    #[test]
    fn array_buffers_are_zeroed() {
        assert_eq!(eval_str("new ArrayBuffer(16).byteLength"), "16");
        assert_eq!(eval_str("new ArrayBuffer(8).slice(2).byteLength"), "6");
        assert_eq!(eval_err("new ArrayBuffer(-1)"), "RangeError: Invalid array buffer length");
    }

    #[test]
    fn json_round_trip_through_script() {
        assert_eq!(
            eval_str("JSON.stringify(JSON.parse('{\"a\":[1,2,{\"b\":null}]}'))"),
            "{\"a\":[1,2,{\"b\":null}]}"
        );
        assert_eq!(eval_str("JSON.stringify({a: 1}, null, 2)"), "{\n  \"a\": 1\n}");
        assert_eq!(eval_str("typeof JSON.stringify(undefined)"), "undefined");
    }
}
