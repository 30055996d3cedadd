//! JavaScript value types.
//!
//! Implements JavaScript runtime values and the primitive conversions that
//! need no realm. Conversions of objects (ToPrimitive) call into script and
//! live on [`crate::Interpreter`].

use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use core::cell::RefCell;
use core::fmt;
use libm::{fabs, fmod, trunc};

use crate::object::{JsObject, ObjectKind};

/// A JavaScript value.
#[derive(Clone, Default)]
pub enum Value {
    /// The undefined value.
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean value.
    Boolean(bool),
    /// A numeric value.
    Number(f64),
    /// A string value.
    String(String),
    /// An object value.
    Object(Rc<RefCell<JsObject>>),
}

impl Value {
    /// Create undefined.
    pub fn undefined() -> Self {
        Value::Undefined
    }

    /// Create null.
    pub fn null() -> Self {
        Value::Null
    }

    /// Create a boolean.
    pub fn boolean(b: bool) -> Self {
        Value::Boolean(b)
    }

    /// Create a number.
    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    /// Create a string.
    pub fn string<S: Into<String>>(s: S) -> Self {
        Value::String(s.into())
    }

    /// Create an object.
    pub fn object(obj: JsObject) -> Self {
        Value::Object(Rc::new(RefCell::new(obj)))
    }

    /// Check if value is undefined.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if value is nullish (undefined or null).
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Check if value is a string.
    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Check if value is an object (or function).
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Check if value is a function.
    pub fn is_function(&self) -> bool {
        match self {
            Value::Object(obj) => obj.borrow().is_callable(),
            _ => false,
        }
    }

    /// Check if value is an array.
    pub fn is_array(&self) -> bool {
        match self {
            Value::Object(obj) => obj.borrow().is_array(),
            _ => false,
        }
    }

    /// Check if value is an error object.
    pub fn is_error(&self) -> bool {
        match self {
            Value::Object(obj) => matches!(obj.borrow().kind(), ObjectKind::Error),
            _ => false,
        }
    }

    /// The object behind this value, if any.
    pub fn as_object(&self) -> Option<&Rc<RefCell<JsObject>>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Get the type of value as a string.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Boolean(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(obj) => {
                if obj.borrow().is_callable() {
                    "function"
                } else {
                    "object"
                }
            }
        }
    }

    /// Convert to boolean (ToBoolean).
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// ToNumber for primitives. Objects yield `NaN`; callers that need the
    /// full conversion go through the interpreter.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Object(_) => f64::NAN,
        }
    }

    /// ToInt32.
    pub fn to_i32(&self) -> i32 {
        number_to_i32(self.to_number())
    }

    /// ToUint32.
    pub fn to_u32(&self) -> u32 {
        number_to_u32(self.to_number())
    }

    /// ToString for primitives; objects render as `[object Object]`, or
    /// `[object Array]`/`[object Function]` for those kinds.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => String::from("undefined"),
            Value::Null => String::from("null"),
            Value::Boolean(b) => String::from(if *b { "true" } else { "false" }),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Object(obj) => match obj.borrow().kind() {
                ObjectKind::Array => String::from("[object Array]"),
                ObjectKind::Function => String::from("[object Function]"),
                _ => String::from("[object Object]"),
            },
        }
    }

    /// Strict equality (===).
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// SameValueZero, used by `indexOf`-style searches that must not match
    /// objects structurally.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Object(obj) => match obj.try_borrow() {
                Ok(obj) => write!(f, "{:?}", obj),
                Err(_) => write!(f, "[object <borrowed>]"),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// StringToNumber: surrounding whitespace is ignored, the empty string is
/// `0`, anything that is not a complete numeric literal is `NaN`.
pub fn string_to_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }

    let (sign, unsigned) = match s.as_bytes()[0] {
        b'-' => (-1.0, &s[1..]),
        b'+' => (1.0, &s[1..]),
        _ => (1.0, s),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }

    let radix = match unsigned.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        // Signed radix literals are not numeric strings.
        if unsigned.len() != s.len() {
            return f64::NAN;
        }
        return parse_radix(&unsigned[2..], radix).unwrap_or(f64::NAN);
    }

    // `str::parse` also accepts `inf`/`nan` spellings JavaScript rejects.
    if !unsigned
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    match unsigned.parse::<f64>() {
        Ok(n) => sign * n,
        Err(_) => f64::NAN,
    }
}

/// Parse digits in the given radix into a float; `None` if empty or invalid.
pub fn parse_radix(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    let mut value = 0.0;
    for ch in digits.chars() {
        let digit = ch.to_digit(radix)?;
        value = value * radix as f64 + digit as f64;
    }
    Some(value)
}

/// Number::toString with radix 10.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return String::from("NaN");
    }
    if n.is_infinite() {
        return String::from(if n > 0.0 { "Infinity" } else { "-Infinity" });
    }
    if n == 0.0 {
        return String::from("0");
    }

    let magnitude = fabs(n);
    if (1e-6..1e21).contains(&magnitude) {
        // Shortest round-trip digits, never in exponent form.
        return format!("{}", n);
    }

    let exp = format!("{:e}", n);
    match exp.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{}e+{}", mantissa, exponent)
        }
        _ => exp,
    }
}

/// ToUint32 on a number.
pub fn number_to_u32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let mut m = fmod(trunc(n), 4294967296.0);
    if m < 0.0 {
        m += 4294967296.0;
    }
    m as u32
}

/// ToInt32 on a number.
pub fn number_to_i32(n: f64) -> i32 {
    number_to_u32(n) as i32
}

/// Completion value for statements.
#[derive(Clone, Debug)]
pub enum Completion {
    /// Normal completion.
    Normal(Value),
    /// Return completion.
    Return(Value),
    /// Break completion.
    Break,
    /// Continue completion.
    Continue,
}

impl Completion {
    /// Create an empty normal completion.
    pub fn empty() -> Self {
        Completion::Normal(Value::undefined())
    }

    /// Check if this is a normal completion.
    pub fn is_normal(&self) -> bool {
        matches!(self, Completion::Normal(_))
    }

    /// Get the value from a normal or return completion.
    pub fn value(self) -> Value {
        match self {
            Completion::Normal(v) | Completion::Return(v) => v,
            _ => Value::undefined(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(30.0), "30");
        assert_eq!(number_to_string(-2.5), "-2.5");
        assert_eq!(number_to_string(0.1), "0.1");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1.5e-7), "1.5e-7");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_to_number_conversion() {
        assert_eq!(string_to_number("  42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x1F"), 31.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(string_to_number(".5"), 0.5);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("-0x10").is_nan());
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(number_to_i32(4294967297.0), 1);
        assert_eq!(number_to_i32(2147483648.0), -2147483648);
        assert_eq!(number_to_u32(-1.0), 4294967295);
        assert_eq!(number_to_i32(f64::NAN), 0);
    }

    #[test]
    fn equality() {
        assert!(!Value::number(f64::NAN).strict_equals(&Value::number(f64::NAN)));
        assert!(Value::number(f64::NAN).same_value_zero(&Value::number(f64::NAN)));
        assert!(Value::from("a").strict_equals(&Value::from("a")));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
    }
}
