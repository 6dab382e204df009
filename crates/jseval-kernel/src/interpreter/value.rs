//! Runtime values.
//!
//! Primitives are held inline; arrays, objects, functions and promises are
//! shared references so that aliasing and cycles behave like the language
//! expects. Every lock is short-lived and never held across an await.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use crate::ast::{self, Expr};

use super::native::HostFunction;
use super::inspect::{inspect, InspectOptions};
use super::scope::Env;

pub type ArrayRef = Arc<Mutex<Vec<Value>>>;
pub type ObjectRef = Arc<Mutex<Object>>;
pub type FunctionRef = Arc<FunctionObject>;
pub type PromiseRef = Arc<Promise>;

/// Lock a value cell, recovering the data from a poisoned lock.
pub(crate) fn lock<T>(cell: &Mutex<T>) -> MutexGuard<'_, T> {
    cell.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A runtime value.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Function(FunctionRef),
    Promise(PromiseRef),
}

/// What kind of object a plain object cell is.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectClass {
    Plain,
    /// Error objects keep name and message out of the enumerable properties.
    Error { name: String, message: String },
}

/// Object storage: a class tag plus insertion-ordered properties.
#[derive(Debug, Clone)]
pub struct Object {
    pub class: ObjectClass,
    pub properties: IndexMap<String, Value>,
}

impl Object {
    pub fn plain(properties: IndexMap<String, Value>) -> Self {
        Self {
            class: ObjectClass::Plain,
            properties,
        }
    }
}

/// A callable value.
pub struct FunctionObject {
    pub name: String,
    pub kind: FunctionKind,
    /// Static members, e.g. `Promise.resolve`.
    pub properties: Mutex<IndexMap<String, Value>>,
}

/// How a function is executed.
pub enum FunctionKind {
    /// Script-defined function closing over its environment.
    Closure {
        function: Arc<ast::Function>,
        env: Env,
    },
    /// Function supplied by the host or the intrinsic library.
    Host(Arc<dyn HostFunction>),
    /// Intrinsic method bound to its receiver, e.g. `[1, 2].map`.
    Method { receiver: Value, name: String },
    /// Intrinsic that needs the interpreter to run, e.g. the Promise constructor.
    Intrinsic(&'static str),
}

impl FunctionObject {
    pub fn new(name: impl Into<String>, kind: FunctionKind) -> Self {
        Self {
            name: name.into(),
            kind,
            properties: Mutex::new(IndexMap::new()),
        }
    }

    /// Attach a static member.
    pub fn with_property(self, key: impl Into<String>, value: Value) -> Self {
        lock(&self.properties).insert(key.into(), value);
        self
    }

    pub fn is_async(&self) -> bool {
        match &self.kind {
            FunctionKind::Closure { function, .. } => function.is_async,
            FunctionKind::Host(host) => host.is_async(),
            FunctionKind::Method { .. } | FunctionKind::Intrinsic(_) => false,
        }
    }

    /// Declared parameter count.
    pub fn arity(&self) -> usize {
        match &self.kind {
            FunctionKind::Closure { function, .. } => function
                .params
                .iter()
                .take_while(|p| p.default.is_none())
                .count(),
            _ => 0,
        }
    }
}

/// Settlement state of a promise.
#[derive(Clone)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

/// A promise cell.
pub struct Promise {
    state: Mutex<PromiseState>,
}

impl Promise {
    pub fn pending() -> PromiseRef {
        Arc::new(Self {
            state: Mutex::new(PromiseState::Pending),
        })
    }

    /// A promise fulfilled with `value`; an existing promise is adopted as is.
    pub fn resolved(value: Value) -> Value {
        match value {
            Value::Promise(p) => Value::Promise(p),
            other => Value::Promise(Arc::new(Self {
                state: Mutex::new(PromiseState::Fulfilled(other)),
            })),
        }
    }

    pub fn rejected(reason: Value) -> Value {
        Value::Promise(Arc::new(Self {
            state: Mutex::new(PromiseState::Rejected(reason)),
        }))
    }

    pub fn state(&self) -> PromiseState {
        lock(&self.state).clone()
    }

    /// Settle a pending promise; later settlements are ignored.
    pub fn settle(&self, outcome: Result<Value, Value>) {
        let mut state = lock(&self.state);
        if !matches!(*state, PromiseState::Pending) {
            return;
        }
        *state = match outcome {
            Ok(Value::Promise(inner)) => inner.state(),
            Ok(value) => PromiseState::Fulfilled(value),
            Err(reason) => PromiseState::Rejected(reason),
        };
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Constructors and conversions
// ═══════════════════════════════════════════════════════════════════════════

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    pub fn object(properties: IndexMap<String, Value>) -> Self {
        Value::Object(Arc::new(Mutex::new(Object::plain(properties))))
    }

    /// Build a plain object from key/value pairs.
    pub fn object_from<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// An error object, e.g. `Value::error("TypeError", "x is not a function")`.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Value::Object(Arc::new(Mutex::new(Object {
            class: ObjectClass::Error {
                name: name.into(),
                message: message.into(),
            },
            properties: IndexMap::new(),
        })))
    }

    pub fn function(function: FunctionObject) -> Self {
        Value::Function(Arc::new(function))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// `(name, message)` when this is an error object.
    pub fn error_parts(&self) -> Option<(String, String)> {
        match self {
            Value::Object(obj) => match &lock(obj).class {
                ObjectClass::Error { name, message } => Some((name.clone(), message.clone())),
                ObjectClass::Plain => None,
            },
            _ => None,
        }
    }

    /// Result of the `typeof` operator.
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::Array(_) | Value::Object(_) | Value::Promise(_) => "object",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => *n,
            Value::String(s) => string_to_number(s),
            Value::Array(_) => string_to_number(&self.to_js_string()),
            _ => f64::NAN,
        }
    }

    /// String conversion as performed by `String(value)` and `+` concatenation.
    pub fn to_js_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => {
                // Snapshot so cyclic arrays do not deadlock.
                let items = lock(items).clone();
                items
                    .iter()
                    .map(|v| {
                        if v.is_nullish() || v.ptr_eq(self) {
                            String::new()
                        } else {
                            v.to_js_string()
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(",")
            }
            Value::Object(_) => match self.error_parts() {
                Some((name, message)) if message.is_empty() => name,
                Some((name, message)) => format!("{name}: {message}"),
                None => "[object Object]".to_string(),
            },
            Value::Function(f) => match &f.kind {
                FunctionKind::Closure { function, .. } => {
                    crate::emit::emit_expr(&Expr::Function(function.clone()))
                }
                _ => format!("function {}() {{ [native code] }}", f.name),
            },
            Value::Promise(_) => "[object Promise]".to_string(),
        }
    }

    /// Same reference (for objects) or same primitive.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Promise(a), Value::Promise(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => self.ptr_eq(other),
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Value::Bool(_), _) => Value::Number(self.to_number()).loose_equals(other),
            (_, Value::Bool(_)) => self.loose_equals(&Value::Number(other.to_number())),
            (Value::Array(_) | Value::Object(_), Value::Number(_) | Value::String(_)) => {
                Value::String(self.to_js_string()).loose_equals(other)
            }
            (Value::Number(_) | Value::String(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_equals(&Value::String(other.to_js_string()))
            }
            _ => self.strict_equals(other),
        }
    }

    /// SameValueZero, used by `includes`.
    pub fn same_value_zero(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_equals(other),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", inspect(self, &InspectOptions::default()))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::array(items)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Numbers
// ═══════════════════════════════════════════════════════════════════════════

/// Numeric value of a string, `NaN` when it is not a number literal.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }
    let (sign, unsigned) = match t.as_bytes()[0] {
        b'-' => (-1.0, &t[1..]),
        b'+' => (1.0, &t[1..]),
        _ => (1.0, t),
    };
    if unsigned == "Infinity" {
        return sign * f64::INFINITY;
    }
    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = t.strip_prefix(prefix) {
            return u64::from_str_radix(digits, radix)
                .map(|n| n as f64)
                .unwrap_or(f64::NAN);
        }
    }
    let valid = unsigned
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !valid || !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return f64::NAN;
    }
    unsigned.parse::<f64>().map(|n| sign * n).unwrap_or(f64::NAN)
}

/// Format a number the way `Number.prototype.toString()` does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    // Shortest round-trip digits, e.g. "1.2345e3".
    let sci = format!("{:e}", n.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let k = digits.len() as i32;
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let exp = point - 1;
        let exp_sign = if exp < 0 { '-' } else { '+' };
        let (first, rest) = digits.split_at(1);
        if rest.is_empty() {
            format!("{first}e{exp_sign}{}", exp.abs())
        } else {
            format!("{first}.{rest}e{exp_sign}{}", exp.abs())
        }
    };
    format!("{sign}{body}")
}

/// ToInt32
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ToUint32
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

/// Property key form of a value (`obj[1]` and `obj["1"]` are the same slot).
pub fn to_property_key(value: &Value) -> String {
    value.to_js_string()
}

/// Own properties in enumeration order: index-like keys ascending, then
/// the remaining keys in insertion order.
pub fn ordered_entries(properties: &IndexMap<String, Value>) -> Vec<(String, Value)> {
    let mut indexed: Vec<(usize, &String, &Value)> = properties
        .iter()
        .filter_map(|(k, v)| array_index(k).map(|i| (i, k, v)))
        .collect();
    indexed.sort_by_key(|(i, _, _)| *i);
    indexed
        .into_iter()
        .map(|(_, k, v)| (k.clone(), v.clone()))
        .chain(
            properties
                .iter()
                .filter(|(k, _)| array_index(k).is_none())
                .map(|(k, v)| (k.clone(), v.clone())),
        )
        .collect()
}

/// Canonical array index of a property key.
pub fn array_index(key: &str) -> Option<usize> {
    let idx: usize = key.parse().ok()?;
    (idx.to_string() == key).then_some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(2.0), "2");
        assert_eq!(number_to_string(-1.5), "-1.5");
        assert_eq!(number_to_string(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(123456789012345680000.0), "123456789012345680000");
        assert_eq!(number_to_string(0.000001), "0.000001");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(1.5e-10), "1.5e-10");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn string_to_number_rules() {
        assert_eq!(string_to_number(" 42 "), 42.0);
        assert_eq!(string_to_number(""), 0.0);
        assert_eq!(string_to_number("0x10"), 16.0);
        assert_eq!(string_to_number("-Infinity"), f64::NEG_INFINITY);
        assert!(string_to_number("12px").is_nan());
        assert!(string_to_number("inf").is_nan());
        assert!(string_to_number("nan").is_nan());
    }

    #[test]
    fn int32_wraps() {
        assert_eq!(to_int32(4_294_967_297.0), 1);
        assert_eq!(to_int32(2_147_483_648.0), -2_147_483_648);
        assert_eq!(to_int32(-1.0), -1);
        assert_eq!(to_uint32(-1.0), 4_294_967_295);
        assert_eq!(to_int32(f64::NAN), 0);
    }

    #[test]
    fn equality() {
        assert!(Value::Null.loose_equals(&Value::Undefined));
        assert!(!Value::Null.strict_equals(&Value::Undefined));
        assert!(Value::from("1").loose_equals(&Value::from(1.0)));
        assert!(Value::Bool(true).loose_equals(&Value::from(1.0)));
        assert!(!Value::from(f64::NAN).strict_equals(&Value::from(f64::NAN)));
        assert!(Value::from(f64::NAN).same_value_zero(&Value::from(f64::NAN)));

        let a = Value::array(vec![]);
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&Value::array(vec![])));
    }

    #[test]
    fn string_conversion() {
        let arr = Value::array(vec![1.0.into(), Value::Null, "x".into()]);
        assert_eq!(arr.to_js_string(), "1,,x");
        assert_eq!(Value::error("TypeError", "bad").to_js_string(), "TypeError: bad");
        assert_eq!(Value::object(IndexMap::new()).to_js_string(), "[object Object]");
    }

    #[test]
    fn typeof_values() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::from("s").type_of(), "string");
    }

    #[test]
    fn index_keys_enumerate_first() {
        let mut props = IndexMap::new();
        props.insert("b".to_string(), Value::Null);
        props.insert("2".to_string(), Value::Null);
        props.insert("a".to_string(), Value::Null);
        props.insert("1".to_string(), Value::Null);
        let keys: Vec<String> = ordered_entries(&props).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["1", "2", "b", "a"]);
    }

    #[test]
    fn array_index_is_canonical() {
        assert_eq!(array_index("3"), Some(3));
        assert_eq!(array_index("03"), None);
        assert_eq!(array_index("-1"), None);
        assert_eq!(array_index("length"), None);
    }
}
