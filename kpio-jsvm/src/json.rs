//! JSON serialization of script values.
//!
//! `stringify` walks a value through a [`serde::Serialize`] view and lets
//! `serde_json` do the escaping and formatting. `parse` drives a
//! `serde_json` deserializer with a seed that builds script objects
//! directly, so key order follows the source text.

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};
use std::io;

use crate::error::{JsError, JsResult};
use crate::interpreter::{Interpreter, ObjectRef};
use crate::object::{Attributes, PropertyKey};
use crate::value::{number_to_string, Value};

/// Deepest object/array nesting `stringify` walks before giving up.
pub const MAX_NESTING_DEPTH: usize = 1024;

/// `JSON.stringify(value)` without indentation.
///
/// Returns `None` when the value has no JSON form (undefined, functions).
pub fn stringify(interp: &Interpreter, value: &Value) -> JsResult<Option<String>> {
    write_json(interp, value, |view| serialize(view, CompactFormatter))
}

/// `JSON.stringify(value, null, indent)`.
pub fn stringify_pretty(interp: &Interpreter, value: &Value, indent: &str) -> JsResult<Option<String>> {
    write_json(interp, value, |view| {
        serialize(view, PrettyFormatter::with_indent(indent.as_bytes()))
    })
}

fn serialize<F: Formatter>(view: &JsonView<'_>, formatter: F) -> Result<Vec<u8>, serde_json::Error> {
    let mut ser = serde_json::Serializer::with_formatter(Vec::new(), ScriptNumbers(formatter));
    view.serialize(&mut ser)?;
    Ok(ser.into_inner())
}

/// Formatter that writes numbers as `Number.prototype.toString` does and
/// leaves layout to `F`.
struct ScriptNumbers<F>(F);

impl<F: Formatter> Formatter for ScriptNumbers<F> {
    fn write_f64<W: ?Sized + io::Write>(&mut self, writer: &mut W, value: f64) -> io::Result<()> {
        writer.write_all(number_to_string(value).as_bytes())
    }

    fn begin_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_array(writer)
    }

    fn end_array<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array(writer)
    }

    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_array_value(writer, first)
    }

    fn end_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_array_value(writer)
    }

    fn begin_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object(writer)
    }

    fn end_object<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object(writer)
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        self.0.begin_object_key(writer, first)
    }

    fn end_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_key(writer)
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.begin_object_value(writer)
    }

    fn end_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        self.0.end_object_value(writer)
    }
}

fn write_json<F>(interp: &Interpreter, value: &Value, write: F) -> JsResult<Option<String>>
where
    F: FnOnce(&JsonView<'_>) -> Result<Vec<u8>, serde_json::Error>,
{
    if skipped(value) {
        return Ok(None);
    }

    let state = WalkState {
        interp,
        stack: RefCell::new(Vec::new()),
        failure: RefCell::new(None),
    };
    let view = JsonView {
        state: &state,
        value: value.clone(),
    };

    match write(&view) {
        Ok(bytes) => String::from_utf8(bytes)
            .map(Some)
            .map_err(|_| JsError::internal("JSON output is not valid UTF-8")),
        Err(err) => Err(state
            .failure
            .borrow_mut()
            .take()
            .unwrap_or_else(|| JsError::internal(format!("{}", err)))),
    }
}

/// Values with no JSON form.
fn skipped(value: &Value) -> bool {
    value.is_undefined() || value.is_function()
}

struct WalkState<'a> {
    interp: &'a Interpreter,
    /// Objects currently being serialized.
    stack: RefCell<Vec<*const RefCell<crate::object::JsObject>>>,
    /// The script error that aborted serialization.
    failure: RefCell<Option<JsError>>,
}

impl WalkState<'_> {
    fn fail<E: ser::Error>(&self, err: JsError) -> E {
        let message = format!("{}", err);
        *self.failure.borrow_mut() = Some(err);
        E::custom(message)
    }

    fn enter<E: ser::Error>(&self, obj: &ObjectRef) -> Result<(), E> {
        let ptr = Rc::as_ptr(obj);
        if self.stack.borrow().contains(&ptr) {
            return Err(self.fail(JsError::type_error(
                "Converting circular structure to JSON",
            )));
        }
        if self.stack.borrow().len() >= MAX_NESTING_DEPTH {
            return Err(self.fail(JsError::range("Maximum call stack size exceeded")));
        }
        self.stack.borrow_mut().push(ptr);
        Ok(())
    }

    fn leave(&self) {
        self.stack.borrow_mut().pop();
    }
}

struct JsonView<'a> {
    state: &'a WalkState<'a>,
    value: Value,
}

impl JsonView<'_> {
    fn child(&self, value: Value) -> JsonView<'_> {
        JsonView {
            state: self.state,
            value,
        }
    }
}

impl Serialize for JsonView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let state = self.state;
        match &self.value {
            Value::Null | Value::Undefined => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(_) => serializer.serialize_unit(),
            Value::String(s) => serializer.serialize_str(s),
            Value::Object(obj) => {
                if obj.borrow().is_callable() {
                    return serializer.serialize_unit();
                }
                state.enter::<S::Error>(obj)?;
                let result = if obj.borrow().is_array() {
                    self.serialize_array(obj, serializer)
                } else {
                    self.serialize_object(obj, serializer)
                };
                state.leave();
                result
            }
        }
    }
}

impl JsonView<'_> {
    fn serialize_array<S: Serializer>(&self, obj: &ObjectRef, serializer: S) -> Result<S::Ok, S::Error> {
        let len = obj.borrow().array_length();
        let mut seq = serializer.serialize_seq(Some(len))?;
        for i in 0..len {
            let item = obj.borrow().get(&PropertyKey::Index(i as u32));
            let item = if skipped(&item) { Value::Null } else { item };
            seq.serialize_element(&self.child(item))?;
        }
        seq.end()
    }

    fn serialize_object<S: Serializer>(&self, obj: &ObjectRef, serializer: S) -> Result<S::Ok, S::Error> {
        let entries: Vec<(PropertyKey, Value)> = self
            .state
            .interp
            .own_enumerable_entries(obj)
            .into_iter()
            .filter(|(_, value)| !skipped(value))
            .collect();

        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(&format!("{}", key), &self.child(value))?;
        }
        map.end()
    }
}

/// `JSON.parse(text)`.
pub fn parse(interp: &Interpreter, text: &str) -> JsResult<Value> {
    let mut deserializer = serde_json::Deserializer::from_str(text);
    let value = ValueSeed { interp }
        .deserialize(&mut deserializer)
        .and_then(|value| deserializer.end().map(|()| value))
        .map_err(|err| {
            JsError::syntax(format!(
                "Unexpected token in JSON at line {} column {}",
                err.line(),
                err.column()
            ))
        })?;
    Ok(value)
}

#[derive(Clone, Copy)]
struct ValueSeed<'a> {
    interp: &'a Interpreter,
}

impl<'de> DeserializeSeed<'de> for ValueSeed<'_> {
    type Value = Value;

    fn deserialize<D: de::Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        deserializer.deserialize_any(self)
    }
}

impl<'de> Visitor<'de> for ValueSeed<'_> {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Boolean(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Number(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        Ok(Value::Number(v as f64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Number(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::string(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(self)? {
            items.push(item);
        }
        Ok(Value::Object(self.interp.new_array(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let obj = self.interp.new_object();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(self)?;
            // Duplicate keys keep the last value in first-seen position.
            obj.borrow_mut()
                .define_property(PropertyKey::from(key), value, Attributes::DEFAULT);
        }
        Ok(Value::Object(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, Script};

    fn realm() -> Interpreter {
        Interpreter::new(Rc::new(Agent::default()))
    }

    fn eval(interp: &Interpreter, source: &str) -> Value {
        interp.eval_script(Script::new("json.js", source)).unwrap()
    }

    #[test]
    fn stringify_skips_functions_and_undefined() {
        let interp = realm();
        let value = eval(&interp, "({a: 1, b: undefined, c: function() {}, d: [undefined, 2]})");
        assert_eq!(
            stringify(&interp, &value).unwrap().as_deref(),
            Some(r#"{"a":1,"d":[null,2]}"#)
        );
        assert_eq!(stringify(&interp, &Value::undefined()).unwrap(), None);
    }

    #[test]
    fn numbers_render_like_script() {
        let interp = realm();
        let value = eval(&interp, "[1, -0, 2.5, NaN, 1/0, 1e3]");
        assert_eq!(
            stringify(&interp, &value).unwrap().as_deref(),
            Some("[1,0,2.5,null,null,1000]")
        );
    }

    #[test]
    fn numbers_outside_the_integer_range_render_like_script() {
        let interp = realm();
        let cases = [
            ("Math.pow(2, 53)", "9007199254740992"),
            ("Math.pow(2, 60)", "1152921504606846976"),
            ("1e16", "10000000000000000"),
            ("1e20", "100000000000000000000"),
            ("1e21", "1e+21"),
            ("1e-6", "0.000001"),
            ("0.000001", "0.000001"),
            ("1e-7", "1e-7"),
            ("-2.5e-8", "-2.5e-8"),
            ("0.1 + 0.2", "0.30000000000000004"),
        ];
        for (source, expected) in cases {
            let value = eval(&interp, source);
            assert_eq!(stringify(&interp, &value).unwrap().as_deref(), Some(expected), "{}", source);
            assert_eq!(interp.to_string(&value).unwrap(), expected, "{}", source);
        }
        let value = eval(&interp, "({n: 1e20, m: [1e-7]})");
        assert_eq!(
            stringify_pretty(&interp, &value, " ").unwrap().as_deref(),
            Some("{\n \"n\": 100000000000000000000,\n \"m\": [\n  1e-7\n ]\n}")
        );
    }

    #[test]
    fn deep_nesting_is_a_range_error() {
        // Nesting up to the limit needs more than a test thread's stack.
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let interp = realm();
                let source = format!(
                    "var o = 1; for (var i = 0; i < {}; i++) {{ o = [o]; }} o",
                    MAX_NESTING_DEPTH
                );
                let at_limit = eval(&interp, &source);
                let json = stringify(&interp, &at_limit).unwrap().unwrap();
                assert_eq!(json.len(), 2 * MAX_NESTING_DEPTH + 1);

                let deep = eval(&interp, "var o = {}; for (var i = 0; i < 200000; i++) { o = {a: o}; } o");
                let err = stringify(&interp, &deep).unwrap_err();
                assert!(matches!(err, JsError::RangeError(_)));
                assert_eq!(err.message(), "Maximum call stack size exceeded");
            })
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn escapes_quotes_and_control_characters() {
        let interp = realm();
        let value = Value::string("a'x<\\>\"\n");
        assert_eq!(
            stringify(&interp, &value).unwrap().as_deref(),
            Some(r#""a'x<\\>\"\n""#)
        );
    }

    #[test]
    fn circular_structures_are_rejected() {
        let interp = realm();
        let value = eval(&interp, "var o = {}; o.self = o; o");
        let err = stringify(&interp, &value).unwrap_err();
        assert_eq!(err.message(), "Converting circular structure to JSON");
    }

    #[test]
    fn shared_references_are_not_cycles() {
        let interp = realm();
        let value = eval(&interp, "var x = {n: 1}; [x, x]");
        assert_eq!(
            stringify(&interp, &value).unwrap().as_deref(),
            Some(r#"[{"n":1},{"n":1}]"#)
        );
    }

    #[test]
    fn parse_keeps_key_order() {
        let interp = realm();
        let value = parse(&interp, r#"{"z": 1, "a": [true, null, "s"], "m": {"k": 2.5}}"#).unwrap();
        assert_eq!(
            stringify(&interp, &value).unwrap().as_deref(),
            Some(r#"{"z":1,"a":[true,null,"s"],"m":{"k":2.5}}"#)
        );
    }

    #[test]
    fn parse_errors_are_syntax_errors() {
        let interp = realm();
        let err = parse(&interp, "{\"a\": }").unwrap_err();
        assert!(matches!(err, JsError::SyntaxError(_)));
        assert!(err.message().starts_with("Unexpected token in JSON"));
        assert!(parse(&interp, "[1] 2").is_err());
    }

    #[test]
    fn pretty_output_uses_the_indent() {
        let interp = realm();
        let value = eval(&interp, "({a: [1]})");
        assert_eq!(
            stringify_pretty(&interp, &value, "\t").unwrap().as_deref(),
            Some("{\n\t\"a\": [\n\t\t1\n\t]\n}")
        );
    }
}
