//! Property access and the intrinsic methods of arrays, strings, numbers,
//! promises, functions and objects.
//!
//! String positions count Unicode scalar values, not UTF-16 code units.

use super::control_flow::Exception;
use super::eval::{settle, Interpreter};
use super::inspect::{inspect, InspectOptions};
use super::native::{arg, native};
use super::value::{
    array_index, lock, number_to_string, ArrayRef, FunctionKind, FunctionObject, ObjectClass,
    ObjectRef, Promise, PromiseRef, PromiseState, Value,
};

const ARRAY_METHODS: &[&str] = &[
    "push", "pop", "shift", "unshift", "slice", "splice", "concat", "join", "reverse", "indexOf",
    "lastIndexOf", "includes", "map", "filter", "forEach", "reduce", "reduceRight", "find",
    "findIndex", "findLast", "findLastIndex", "some", "every", "sort", "flat", "flatMap", "fill",
    "at", "keys", "values", "entries", "toString",
];

const STRING_METHODS: &[&str] = &[
    "charAt", "charCodeAt", "codePointAt", "at", "indexOf", "lastIndexOf", "includes",
    "startsWith", "endsWith", "slice", "substring", "substr", "toUpperCase", "toLowerCase",
    "trim", "trimStart", "trimEnd", "split", "replace", "replaceAll", "repeat", "padStart",
    "padEnd", "concat", "localeCompare", "toString", "valueOf",
];

const NUMBER_METHODS: &[&str] = &["toFixed", "toPrecision", "toString", "valueOf"];
const BOOL_METHODS: &[&str] = &["toString", "valueOf"];
const OBJECT_METHODS: &[&str] = &["hasOwnProperty", "toString"];
const FUNCTION_METHODS: &[&str] = &["call", "apply", "toString"];
const PROMISE_METHODS: &[&str] = &["then", "catch", "finally"];

/// Upper bound on array growth through index or length assignment.
const MAX_ARRAY_GROWTH: usize = 1 << 24;
/// Longest string `repeat` and the padding methods will build.
const MAX_STRING_LENGTH: usize = (1 << 29) - 24;

fn method(receiver: &Value, name: &str, table: &[&str]) -> Value {
    if table.contains(&name) {
        Value::function(FunctionObject::new(
            name,
            FunctionKind::Method {
                receiver: receiver.clone(),
                name: name.to_string(),
            },
        ))
    } else {
        Value::Undefined
    }
}

fn show(value: &Value) -> String {
    inspect(value, &InspectOptions::default())
}

/// Read `object[key]`.
pub fn get_property(object: &Value, key: &str) -> Result<Value, Exception> {
    Ok(match object {
        Value::Undefined | Value::Null => {
            return Err(Exception::type_error(format!(
                "Cannot read properties of {} (reading '{key}')",
                object.to_js_string()
            )));
        }
        Value::String(s) => match (key, array_index(key)) {
            ("length", _) => Value::Number(s.chars().count() as f64),
            (_, Some(i)) => s
                .chars()
                .nth(i)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or(Value::Undefined),
            _ => method(object, key, STRING_METHODS),
        },
        Value::Array(items) => match (key, array_index(key)) {
            ("length", _) => Value::Number(lock(items).len() as f64),
            (_, Some(i)) => lock(items).get(i).cloned().unwrap_or(Value::Undefined),
            _ => method(object, key, ARRAY_METHODS),
        },
        Value::Object(obj) => {
            let guard = lock(obj);
            if let Some(value) = guard.properties.get(key) {
                return Ok(value.clone());
            }
            if let ObjectClass::Error { name, message } = &guard.class {
                match key {
                    "name" => return Ok(Value::String(name.clone())),
                    "message" => return Ok(Value::String(message.clone())),
                    "stack" => return Ok(Value::String(format!("{name}: {message}\n    at <anonymous>"))),
                    _ => {}
                }
            }
            drop(guard);
            method(object, key, OBJECT_METHODS)
        }
        Value::Function(f) => {
            if let Some(value) = lock(&f.properties).get(key).cloned() {
                return Ok(value);
            }
            match key {
                "name" => Value::String(f.name.clone()),
                "length" => Value::Number(f.arity() as f64),
                _ => method(object, key, FUNCTION_METHODS),
            }
        }
        Value::Promise(_) => method(object, key, PROMISE_METHODS),
        Value::Number(_) => method(object, key, NUMBER_METHODS),
        Value::Bool(_) => method(object, key, BOOL_METHODS),
    })
}

/// Write `object[key] = value`.
pub fn set_property(object: &Value, key: &str, value: Value) -> Result<(), Exception> {
    match object {
        Value::Undefined | Value::Null => Err(Exception::type_error(format!(
            "Cannot set properties of {} (setting '{key}')",
            object.to_js_string()
        ))),
        Value::Array(items) => {
            let mut items = lock(items);
            if key == "length" {
                let n = value.to_number();
                if n < 0.0 || n.fract() != 0.0 || n > MAX_ARRAY_GROWTH as f64 {
                    return Err(Exception::range_error("Invalid array length"));
                }
                items.resize(n as usize, Value::Undefined);
            } else if let Some(i) = array_index(key) {
                if i >= items.len() {
                    if i - items.len() > MAX_ARRAY_GROWTH {
                        return Err(Exception::range_error("Invalid array length"));
                    }
                    items.resize(i + 1, Value::Undefined);
                }
                items[i] = value;
            }
            Ok(())
        }
        Value::Object(obj) => {
            let mut guard = lock(obj);
            let obj = &mut *guard;
            match (&mut obj.class, key) {
                (ObjectClass::Error { message, .. }, "message") => *message = value.to_js_string(),
                (ObjectClass::Error { name, .. }, "name") => *name = value.to_js_string(),
                _ => {
                    obj.properties.insert(key.to_string(), value);
                }
            }
            Ok(())
        }
        Value::Function(f) => {
            lock(&f.properties).insert(key.to_string(), value);
            Ok(())
        }
        Value::Promise(_) => Ok(()),
        primitive => Err(Exception::type_error(format!(
            "Cannot create property '{key}' on {} '{}'",
            primitive.type_of(),
            primitive.to_js_string()
        ))),
    }
}

/// `delete object[key]`.
pub fn delete_property(object: &Value, key: &str) -> Result<bool, Exception> {
    match object {
        Value::Undefined | Value::Null => Err(Exception::type_error(
            "Cannot convert undefined or null to object",
        )),
        Value::Object(obj) => {
            lock(obj).properties.shift_remove(key);
            Ok(true)
        }
        Value::Array(items) => {
            if let Some(i) = array_index(key) {
                if let Some(slot) = lock(items).get_mut(i) {
                    *slot = Value::Undefined;
                }
            }
            Ok(true)
        }
        Value::Function(f) => {
            lock(&f.properties).shift_remove(key);
            Ok(true)
        }
        _ => Ok(true),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Argument helpers
// ═══════════════════════════════════════════════════════════════════════════

/// ToIntegerOrInfinity
fn to_integer(value: &Value) -> f64 {
    let n = value.to_number();
    if n.is_nan() { 0.0 } else { n.trunc() }
}

/// Resolve a possibly negative position against `len`, `default` when undefined.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = to_integer(value);
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn callback(args: &[Value]) -> Result<Value, Exception> {
    match args.first() {
        Some(f @ Value::Function(_)) => Ok(f.clone()),
        Some(other) => Err(Exception::type_error(format!("{} is not a function", show(other)))),
        None => Err(Exception::type_error("undefined is not a function")),
    }
}

fn join(items: &[Value], separator: &str) -> String {
    items
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
        .collect::<Vec<_>>()
        .join(separator)
}

fn flatten(items: Vec<Value>, depth: f64, out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Array(inner) if depth >= 1.0 => {
                let inner = lock(&inner).clone();
                flatten(inner, depth - 1.0, out);
            }
            other => out.push(other),
        }
    }
}

fn find_chars(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(hay.len()));
    }
    (from..=hay.len().checked_sub(needle.len())?).find(|&i| hay[i..i + needle.len()] == *needle)
}

fn rfind_chars(hay: &[char], needle: &[char], from: usize) -> Option<usize> {
    let last = hay.len().checked_sub(needle.len())?;
    (0..=last.min(from)).rev().find(|&i| hay[i..i + needle.len()] == *needle)
}

fn chars_to_string(chars: &[char]) -> String {
    chars.iter().collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Number formatting
// ═══════════════════════════════════════════════════════════════════════════

/// `Number.prototype.toFixed`
pub fn to_fixed(x: f64, digits: usize) -> String {
    if !x.is_finite() || x.abs() >= 1e21 {
        return number_to_string(x);
    }
    let scale = 10f64.powi(digits as i32);
    let scaled = x.abs() * scale;
    // Exact ties round away from zero.
    let magnitude = if scaled < 4_503_599_627_370_496.0 && scaled - scaled.trunc() == 0.5 {
        format!("{:.*}", digits, (scaled.trunc() + 1.0) / scale)
    } else {
        format!("{:.*}", digits, x.abs())
    };
    let zero = magnitude.chars().all(|c| c == '0' || c == '.');
    if x < 0.0 && !zero {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}

/// `Number.prototype.toPrecision`
pub fn to_precision(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return number_to_string(x);
    }
    if x == 0.0 {
        return to_fixed(0.0, precision - 1);
    }
    let sci = format!("{:.*e}", precision - 1, x);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    if exponent < -6 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{}", exponent.abs())
    } else {
        format!("{:.*}", (precision as i32 - 1 - exponent) as usize, x)
    }
}

/// `Number.prototype.toString(radix)`
pub fn to_radix_string(x: f64, radix: u32) -> String {
    if radix == 10 || !x.is_finite() {
        return number_to_string(x);
    }
    let digit = |d: u32| std::char::from_digit(d, radix).unwrap_or('0');
    let negative = x < 0.0;
    let abs = x.abs();
    let mut int = abs.trunc();
    let mut frac = abs - int;

    let mut int_digits = Vec::new();
    loop {
        int_digits.push(digit((int % f64::from(radix)) as u32));
        int = (int / f64::from(radix)).trunc();
        if int < 1.0 {
            break;
        }
    }
    int_digits.reverse();
    let mut out: String = int_digits.into_iter().collect();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..20 {
            frac *= f64::from(radix);
            let d = frac.trunc();
            out.push(digit(d as u32));
            frac -= d;
            if frac <= 0.0 {
                break;
            }
        }
    }
    if negative {
        format!("-{out}")
    } else {
        out
    }
}

fn number_method(x: f64, name: &str, args: &[Value]) -> Result<Value, Exception> {
    let text = match name {
        "toFixed" => {
            let digits = to_integer(&arg(args, 0));
            if !(0.0..=100.0).contains(&digits) {
                return Err(Exception::range_error(
                    "toFixed() digits argument must be between 0 and 100",
                ));
            }
            to_fixed(x, digits as usize)
        }
        "toPrecision" => {
            let precision = arg(args, 0);
            if precision.is_undefined() {
                number_to_string(x)
            } else {
                let p = to_integer(&precision);
                if !(1.0..=100.0).contains(&p) {
                    return Err(Exception::range_error(
                        "toPrecision() argument must be between 1 and 100",
                    ));
                }
                to_precision(x, p as usize)
            }
        }
        "toString" => {
            let radix = arg(args, 0);
            let radix = if radix.is_undefined() { 10.0 } else { to_integer(&radix) };
            if !(2.0..=36.0).contains(&radix) {
                return Err(Exception::range_error("toString() radix must be between 2 and 36"));
            }
            to_radix_string(x, radix as u32)
        }
        _ => return Ok(Value::Number(x)),
    };
    Ok(Value::String(text))
}

fn object_method(receiver: &Value, obj: &ObjectRef, name: &str, args: &[Value]) -> Value {
    match name {
        "hasOwnProperty" => {
            let key = arg(args, 0).to_js_string();
            Value::Bool(lock(obj).properties.contains_key(&key))
        }
        _ => Value::String(receiver.to_js_string()),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Methods that may call back into scripts
// ═══════════════════════════════════════════════════════════════════════════

impl Interpreter {
    /// Call an intrinsic method on its receiver.
    pub(crate) async fn call_method(
        &self,
        receiver: Value,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        match &receiver {
            Value::Array(items) => self.array_method(&receiver, items, name, args).await,
            Value::String(s) => self.string_method(s, name, args).await,
            Value::Number(n) => number_method(*n, name, &args),
            Value::Bool(_) if name == "valueOf" => Ok(receiver.clone()),
            Value::Bool(_) => Ok(Value::String(receiver.to_js_string())),
            Value::Promise(promise) => self.promise_method(&receiver, promise, name, args).await,
            Value::Function(_) => self.function_method(&receiver, name, args).await,
            Value::Object(obj) => Ok(object_method(&receiver, obj, name, &args)),
            Value::Undefined | Value::Null => {
                Err(Exception::type_error(format!("{name} is not a function")))
            }
        }
    }

    /// Call an intrinsic that needs the interpreter, e.g. the Promise constructor.
    pub(crate) async fn call_intrinsic(
        &self,
        name: &str,
        args: Vec<Value>,
        constructing: bool,
    ) -> Result<Value, Exception> {
        match name {
            "Promise" => {
                if !constructing {
                    return Err(Exception::type_error(
                        "Promise constructor cannot be invoked without 'new'",
                    ));
                }
                let executor = arg(&args, 0);
                if !matches!(executor, Value::Function(_)) {
                    return Err(Exception::type_error(format!(
                        "Promise resolver {} is not a function",
                        show(&executor)
                    )));
                }
                let promise = Promise::pending();
                let on_resolve = promise.clone();
                let on_reject = promise.clone();
                let resolve = native("resolve", move |args| {
                    on_resolve.settle(Ok(arg(args, 0)));
                    Ok(Value::Undefined)
                });
                let reject = native("reject", move |args| {
                    on_reject.settle(Err(arg(args, 0)));
                    Ok(Value::Undefined)
                });
                if let Err(exc) = self.call(executor, vec![resolve, reject]).await {
                    promise.settle(Err(exc.value));
                }
                Ok(Value::Promise(promise))
            }
            "Array.from" => {
                let source = arg(&args, 0);
                let items: Vec<Value> = match &source {
                    Value::Array(items) => lock(items).clone(),
                    Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                    Value::Object(_) => {
                        let len = to_integer(&get_property(&source, "length")?).max(0.0) as usize;
                        let mut items = Vec::with_capacity(len.min(MAX_ARRAY_GROWTH));
                        for i in 0..len.min(MAX_ARRAY_GROWTH) {
                            items.push(get_property(&source, &i.to_string())?);
                        }
                        items
                    }
                    Value::Undefined | Value::Null => {
                        return Err(Exception::type_error(format!(
                            "{} is not iterable",
                            source.to_js_string()
                        )));
                    }
                    _ => Vec::new(),
                };
                let map = arg(&args, 1);
                if !matches!(map, Value::Function(_)) {
                    return Ok(Value::array(items));
                }
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.into_iter().enumerate() {
                    out.push(self.call(map.clone(), vec![item, Value::Number(i as f64)]).await?);
                }
                Ok(Value::array(out))
            }
            other => Err(Exception::type_error(format!("{other} is not a function"))),
        }
    }

    async fn function_method(&self, this: &Value, name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        match name {
            "call" => self.call(this.clone(), args.into_iter().skip(1).collect()).await,
            "apply" => {
                let list = match arg(&args, 1) {
                    Value::Array(items) => lock(&items).clone(),
                    Value::Undefined | Value::Null => Vec::new(),
                    _ => {
                        return Err(Exception::type_error(
                            "CreateListFromArrayLike called on non-object",
                        ));
                    }
                };
                self.call(this.clone(), list).await
            }
            _ => Ok(Value::String(this.to_js_string())),
        }
    }

    async fn promise_method(
        &self,
        this: &Value,
        promise: &PromiseRef,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        let handler = |i: usize| {
            args.get(i)
                .filter(|v| matches!(v, Value::Function(_)))
                .cloned()
        };
        let state = promise.state();
        if matches!(state, PromiseState::Pending) {
            return Ok(Value::Promise(Promise::pending()));
        }
        match (name, state) {
            ("then", PromiseState::Fulfilled(value)) => match handler(0) {
                Some(f) => Ok(settle(self.call(f, vec![value]).await)),
                None => Ok(this.clone()),
            },
            ("then", PromiseState::Rejected(reason)) => match handler(1) {
                Some(f) => Ok(settle(self.call(f, vec![reason]).await)),
                None => Ok(this.clone()),
            },
            ("catch", PromiseState::Rejected(reason)) => match handler(0) {
                Some(f) => Ok(settle(self.call(f, vec![reason]).await)),
                None => Ok(this.clone()),
            },
            ("finally", _) => {
                if let Some(f) = handler(0) {
                    if let Err(exc) = self.call(f, Vec::new()).await {
                        return Ok(Promise::rejected(exc.value));
                    }
                }
                Ok(this.clone())
            }
            _ => Ok(this.clone()),
        }
    }

    async fn array_method(
        &self,
        this: &Value,
        items: &ArrayRef,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        let snapshot = || lock(items).clone();
        match name {
            "push" => {
                let mut items = lock(items);
                items.extend(args);
                Ok(Value::Number(items.len() as f64))
            }
            "pop" => Ok(lock(items).pop().unwrap_or(Value::Undefined)),
            "shift" => {
                let mut items = lock(items);
                Ok(if items.is_empty() {
                    Value::Undefined
                } else {
                    items.remove(0)
                })
            }
            "unshift" => {
                let mut items = lock(items);
                items.splice(0..0, args);
                Ok(Value::Number(items.len() as f64))
            }
            "slice" => {
                let values = snapshot();
                let len = values.len();
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len).max(start);
                Ok(Value::array(values[start..end].to_vec()))
            }
            "splice" => {
                let mut items = lock(items);
                let len = items.len();
                let start = relative_index(&arg(&args, 0), len, 0);
                let delete = match args.len() {
                    0 => 0,
                    1 => len - start,
                    _ => to_integer(&args[1]).clamp(0.0, (len - start) as f64) as usize,
                };
                let removed: Vec<Value> = items
                    .splice(start..start + delete, args.into_iter().skip(2))
                    .collect();
                Ok(Value::array(removed))
            }
            "concat" => {
                let mut out = snapshot();
                for value in args {
                    match value {
                        Value::Array(other) => out.extend(lock(&other).clone()),
                        other => out.push(other),
                    }
                }
                Ok(Value::array(out))
            }
            "join" => {
                let separator = match arg(&args, 0) {
                    Value::Undefined => ",".to_string(),
                    other => other.to_js_string(),
                };
                Ok(Value::String(join(&snapshot(), &separator)))
            }
            "toString" => Ok(Value::String(join(&snapshot(), ","))),
            "reverse" => {
                lock(items).reverse();
                Ok(this.clone())
            }
            "indexOf" | "lastIndexOf" | "includes" => {
                let values = snapshot();
                let needle = arg(&args, 0);
                let found = match name {
                    "includes" => return Ok(Value::Bool(values.iter().any(|v| v.same_value_zero(&needle)))),
                    "indexOf" => {
                        let from = relative_index(&arg(&args, 1), values.len(), 0);
                        values.iter().skip(from).position(|v| v.strict_equals(&needle)).map(|i| i + from)
                    }
                    _ => values.iter().rposition(|v| v.strict_equals(&needle)),
                };
                Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
            }
            "at" => {
                let values = snapshot();
                let i = to_integer(&arg(&args, 0));
                let index = if i < 0.0 { values.len() as f64 + i } else { i };
                Ok(if index < 0.0 {
                    Value::Undefined
                } else {
                    values.get(index as usize).cloned().unwrap_or(Value::Undefined)
                })
            }
            "fill" => {
                let mut items = lock(items);
                let len = items.len();
                let start = relative_index(&arg(&args, 1), len, 0);
                let end = relative_index(&arg(&args, 2), len, len);
                let value = arg(&args, 0);
                for slot in items.iter_mut().take(end).skip(start) {
                    *slot = value.clone();
                }
                Ok(this.clone())
            }
            "keys" => Ok(Value::array(
                (0..lock(items).len()).map(|i| Value::Number(i as f64)).collect(),
            )),
            "values" => Ok(Value::array(snapshot())),
            "entries" => Ok(Value::array(
                snapshot()
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| Value::array(vec![Value::Number(i as f64), v]))
                    .collect(),
            )),
            "flat" => {
                let depth = match arg(&args, 0) {
                    Value::Undefined => 1.0,
                    other => to_integer(&other),
                };
                let mut out = Vec::new();
                flatten(snapshot(), depth, &mut out);
                Ok(Value::array(out))
            }
            "sort" => {
                let comparator = args.first().filter(|v| matches!(v, Value::Function(_))).cloned();
                let sorted = self.sort_values(snapshot(), comparator).await?;
                *lock(items) = sorted;
                Ok(this.clone())
            }
            "reduce" | "reduceRight" => {
                let f = callback(&args)?;
                let mut values: Vec<(usize, Value)> = snapshot().into_iter().enumerate().collect();
                if name == "reduceRight" {
                    values.reverse();
                }
                let mut values = values.into_iter();
                let mut acc = match args.get(1) {
                    Some(init) => init.clone(),
                    None => match values.next() {
                        Some((_, first)) => first,
                        None => {
                            return Err(Exception::type_error(
                                "Reduce of empty array with no initial value",
                            ));
                        }
                    },
                };
                for (i, value) in values {
                    acc = self
                        .call(f.clone(), vec![acc, value, Value::Number(i as f64), this.clone()])
                        .await?;
                }
                Ok(acc)
            }
            "forEach" | "map" | "filter" | "find" | "findIndex" | "findLast" | "findLastIndex"
            | "some" | "every" | "flatMap" => {
                let f = callback(&args)?;
                let mut indexed: Vec<(usize, Value)> = snapshot().into_iter().enumerate().collect();
                if name.starts_with("findLast") {
                    indexed.reverse();
                }
                let mut out = Vec::new();
                for (i, value) in indexed {
                    let result = self
                        .call(f.clone(), vec![value.clone(), Value::Number(i as f64), this.clone()])
                        .await?;
                    match name {
                        "map" => out.push(result),
                        "flatMap" => flatten(vec![result], 1.0, &mut out),
                        "filter" if result.truthy() => out.push(value),
                        "find" | "findLast" if result.truthy() => return Ok(value),
                        "findIndex" | "findLastIndex" if result.truthy() => {
                            return Ok(Value::Number(i as f64));
                        }
                        "some" if result.truthy() => return Ok(Value::Bool(true)),
                        "every" if !result.truthy() => return Ok(Value::Bool(false)),
                        _ => {}
                    }
                }
                Ok(match name {
                    "map" | "filter" | "flatMap" => Value::array(out),
                    "find" | "findLast" | "forEach" => Value::Undefined,
                    "findIndex" | "findLastIndex" => Value::Number(-1.0),
                    "some" => Value::Bool(false),
                    _ => Value::Bool(true),
                })
            }
            _ => Err(Exception::type_error(format!("{name} is not a function"))),
        }
    }

    /// Stable merge sort with an optional script comparator; `undefined` sorts last.
    async fn sort_values(&self, items: Vec<Value>, comparator: Option<Value>) -> Result<Vec<Value>, Exception> {
        let (mut items, undefined): (Vec<Value>, Vec<Value>) =
            items.into_iter().partition(|v| !v.is_undefined());
        let n = items.len();
        let mut width = 1;
        while width < n {
            let mut merged = Vec::with_capacity(n);
            let mut start = 0;
            while start < n {
                let mid = (start + width).min(n);
                let end = (start + 2 * width).min(n);
                let (mut a, mut b) = (start, mid);
                while a < mid && b < end {
                    if self.compare(&items[b], &items[a], comparator.as_ref()).await? < 0.0 {
                        merged.push(items[b].clone());
                        b += 1;
                    } else {
                        merged.push(items[a].clone());
                        a += 1;
                    }
                }
                merged.extend_from_slice(&items[a..mid]);
                merged.extend_from_slice(&items[b..end]);
                start = end;
            }
            items = merged;
            width *= 2;
        }
        items.extend(undefined);
        Ok(items)
    }

    async fn compare(&self, a: &Value, b: &Value, comparator: Option<&Value>) -> Result<f64, Exception> {
        match comparator {
            Some(f) => {
                let result = self.call(f.clone(), vec![a.clone(), b.clone()]).await?.to_number();
                Ok(if result.is_nan() { 0.0 } else { result })
            }
            None => Ok(match a.to_js_string().cmp(&b.to_js_string()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            }),
        }
    }

    async fn string_method(&self, s: &str, name: &str, args: Vec<Value>) -> Result<Value, Exception> {
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len();
        let text = |i: usize| arg(&args, i).to_js_string();
        let value = match name {
            "charAt" => {
                let i = to_integer(&arg(&args, 0));
                Value::String(if i >= 0.0 {
                    chars.get(i as usize).map(|c| c.to_string()).unwrap_or_default()
                } else {
                    String::new()
                })
            }
            "charCodeAt" | "codePointAt" => {
                let i = to_integer(&arg(&args, 0));
                match (i >= 0.0).then(|| chars.get(i as usize)).flatten() {
                    Some(c) => Value::Number(f64::from(u32::from(*c))),
                    None if name == "charCodeAt" => Value::Number(f64::NAN),
                    None => Value::Undefined,
                }
            }
            "at" => {
                let i = to_integer(&arg(&args, 0));
                let index = if i < 0.0 { len as f64 + i } else { i };
                if index < 0.0 {
                    Value::Undefined
                } else {
                    chars
                        .get(index as usize)
                        .map(|c| Value::String(c.to_string()))
                        .unwrap_or(Value::Undefined)
                }
            }
            "indexOf" | "includes" => {
                let needle: Vec<char> = text(0).chars().collect();
                let from = relative_index(&arg(&args, 1), len, 0);
                let found = find_chars(&chars, &needle, from);
                if name == "includes" {
                    Value::Bool(found.is_some())
                } else {
                    Value::Number(found.map(|i| i as f64).unwrap_or(-1.0))
                }
            }
            "lastIndexOf" => {
                let needle: Vec<char> = text(0).chars().collect();
                let from = relative_index(&arg(&args, 1), len, len);
                Value::Number(rfind_chars(&chars, &needle, from).map(|i| i as f64).unwrap_or(-1.0))
            }
            "startsWith" => {
                let needle: Vec<char> = text(0).chars().collect();
                let pos = relative_index(&arg(&args, 1), len, 0);
                Value::Bool(chars[pos..].starts_with(&needle))
            }
            "endsWith" => {
                let needle: Vec<char> = text(0).chars().collect();
                let end = relative_index(&arg(&args, 1), len, len);
                Value::Bool(chars[..end].ends_with(&needle))
            }
            "slice" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let end = relative_index(&arg(&args, 1), len, len).max(start);
                Value::String(chars_to_string(&chars[start..end]))
            }
            "substring" => {
                let clamp = |v: Value, default: usize| {
                    if v.is_undefined() {
                        default
                    } else {
                        to_integer(&v).clamp(0.0, len as f64) as usize
                    }
                };
                let a = clamp(arg(&args, 0), 0);
                let b = clamp(arg(&args, 1), len);
                Value::String(chars_to_string(&chars[a.min(b)..a.max(b)]))
            }
            "substr" => {
                let start = relative_index(&arg(&args, 0), len, 0);
                let count = match arg(&args, 1) {
                    Value::Undefined => len - start,
                    v => to_integer(&v).clamp(0.0, (len - start) as f64) as usize,
                };
                Value::String(chars_to_string(&chars[start..start + count]))
            }
            "toUpperCase" => Value::String(s.to_uppercase()),
            "toLowerCase" => Value::String(s.to_lowercase()),
            "trim" => Value::String(s.trim().to_string()),
            "trimStart" => Value::String(s.trim_start().to_string()),
            "trimEnd" => Value::String(s.trim_end().to_string()),
            "split" => {
                let limit = match arg(&args, 1) {
                    Value::Undefined => usize::MAX,
                    v => to_integer(&v).max(0.0) as usize,
                };
                let parts: Vec<Value> = match arg(&args, 0) {
                    Value::Undefined => vec![Value::String(s.to_string())],
                    sep => {
                        let sep = sep.to_js_string();
                        if sep.is_empty() {
                            chars.iter().map(|c| Value::String(c.to_string())).collect()
                        } else {
                            s.split(sep.as_str()).map(Value::string).collect()
                        }
                    }
                };
                Value::array(parts.into_iter().take(limit).collect())
            }
            "replace" | "replaceAll" => {
                let pattern = text(0);
                let replacement = arg(&args, 1);
                let mut out = String::new();
                let mut rest = 0;
                let mut search_from = 0;
                while let Some(found) = s.get(search_from..).and_then(|tail| tail.find(&pattern)) {
                    let at = search_from + found;
                    let matched = &s[at..at + pattern.len()];
                    out.push_str(&s[rest..at]);
                    let inserted = match &replacement {
                        Value::Function(_) => {
                            let offset = s[..at].chars().count() as f64;
                            let args = vec![Value::string(matched), Value::Number(offset), Value::string(s)];
                            self.call(replacement.clone(), args).await?.to_js_string()
                        }
                        other => other
                            .to_js_string()
                            .replace("$&", matched)
                            .replace("$$", "$"),
                    };
                    out.push_str(&inserted);
                    rest = at + pattern.len();
                    if name == "replace" {
                        break;
                    }
                    search_from = if pattern.is_empty() {
                        match s[rest..].chars().next() {
                            Some(c) => {
                                out.push(c);
                                rest += c.len_utf8();
                                rest
                            }
                            None => break,
                        }
                    } else {
                        rest
                    };
                }
                out.push_str(&s[rest..]);
                Value::String(out)
            }
            "repeat" => {
                let count = to_integer(&arg(&args, 0));
                if count < 0.0 || count.is_infinite() {
                    return Err(Exception::range_error(format!(
                        "Invalid count value: {}",
                        number_to_string(count)
                    )));
                }
                if len as f64 * count > MAX_STRING_LENGTH as f64 {
                    return Err(Exception::range_error("Invalid string length"));
                }
                Value::String(s.repeat(count as usize))
            }
            "padStart" | "padEnd" => {
                let target = to_integer(&arg(&args, 0)).max(0.0);
                if target > MAX_STRING_LENGTH as f64 {
                    return Err(Exception::range_error("Invalid string length"));
                }
                let target = target as usize;
                let filler = match arg(&args, 1) {
                    Value::Undefined => " ".to_string(),
                    v => v.to_js_string(),
                };
                if target <= len || filler.is_empty() {
                    Value::String(s.to_string())
                } else {
                    let pad: String = filler.chars().cycle().take(target - len).collect();
                    Value::String(if name == "padStart" {
                        format!("{pad}{s}")
                    } else {
                        format!("{s}{pad}")
                    })
                }
            }
            "concat" => {
                let mut out = s.to_string();
                for value in &args {
                    out.push_str(&value.to_js_string());
                }
                Value::String(out)
            }
            "localeCompare" => Value::Number(match s.cmp(text(0).as_str()) {
                std::cmp::Ordering::Less => -1.0,
                std::cmp::Ordering::Equal => 0.0,
                std::cmp::Ordering::Greater => 1.0,
            }),
            "toString" | "valueOf" => Value::String(s.to_string()),
            _ => return Err(Exception::type_error(format!("{name} is not a function"))),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_from_undefined_names_the_key() {
        let err = get_property(&Value::Undefined, "y").expect_err("undefined");
        assert_eq!(err.message(), "Cannot read properties of undefined (reading 'y')");
        let err = get_property(&Value::Null, "0").expect_err("null");
        assert_eq!(err.message(), "Cannot read properties of null (reading '0')");
    }

    #[test]
    fn array_length_and_index() {
        let arr = Value::array(vec![Value::from(1.0), Value::from(2.0)]);
        assert_eq!(get_property(&arr, "length").expect("len"), Value::from(2.0));
        assert_eq!(get_property(&arr, "1").expect("idx"), Value::from(2.0));
        assert!(get_property(&arr, "5").expect("oob").is_undefined());

        set_property(&arr, "3", Value::from(4.0)).expect("grow");
        assert_eq!(get_property(&arr, "length").expect("len"), Value::from(4.0));
        set_property(&arr, "length", Value::from(1.0)).expect("truncate");
        assert_eq!(arr.to_js_string(), "1");
    }

    #[test]
    fn error_objects_expose_name_and_message() {
        let err = Value::error("RangeError", "too far");
        assert_eq!(get_property(&err, "name").expect("name"), Value::from("RangeError"));
        assert_eq!(get_property(&err, "message").expect("msg"), Value::from("too far"));
        set_property(&err, "message", Value::from("changed")).expect("set");
        assert_eq!(err.to_js_string(), "RangeError: changed");
    }

    #[test]
    fn primitives_reject_property_writes() {
        let err = set_property(&Value::from("abc"), "x", Value::Null).expect_err("string");
        assert_eq!(err.message(), "Cannot create property 'x' on string 'abc'");
    }

    #[test]
    fn methods_are_bound_functions() {
        let method = get_property(&Value::from("abc"), "toUpperCase").expect("method");
        assert!(matches!(method, Value::Function(_)));
        assert!(get_property(&Value::from("abc"), "nope").expect("missing").is_undefined());
    }

    #[test]
    fn number_formatting_methods() {
        assert_eq!(to_fixed(2.5, 0), "3");
        assert_eq!(to_fixed(1.005, 2), "1.00");
        assert_eq!(to_fixed(-1.5, 1), "-1.5");
        assert_eq!(to_fixed(3.14159, 2), "3.14");
        assert_eq!(to_precision(123.456, 4), "123.5");
        assert_eq!(to_precision(0.000123, 2), "0.00012");
        assert_eq!(to_precision(123456.0, 2), "1.2e+5");
        assert_eq!(to_radix_string(255.0, 16), "ff");
        assert_eq!(to_radix_string(-5.0, 2), "-101");
        assert_eq!(to_radix_string(0.5, 2), "0.1");
    }

    #[test]
    fn delete_removes_object_keys() {
        let obj = Value::object_from([("a", Value::from(1.0)), ("b", Value::from(2.0))]);
        assert!(delete_property(&obj, "a").expect("delete"));
        assert!(get_property(&obj, "a").expect("read").is_undefined());
        assert!(delete_property(&Value::Undefined, "a").is_err());
    }

    #[tokio::test]
    async fn array_callbacks() {
        let interp = Interpreter::new(Default::default());
        let arr = Value::array(vec![Value::from(3.0), Value::from(1.0), Value::from(2.0)]);
        let double = native("double", |args| Ok(Value::Number(arg(args, 0).to_number() * 2.0)));
        let mapped = interp
            .call_method(arr.clone(), "map", vec![double])
            .await
            .expect("map");
        assert_eq!(mapped.to_js_string(), "6,2,4");

        let sorted = interp.call_method(arr.clone(), "sort", Vec::new()).await.expect("sort");
        assert_eq!(sorted.to_js_string(), "1,2,3");
        assert!(sorted.strict_equals(&arr));
    }

    #[tokio::test]
    async fn string_methods() {
        let interp = Interpreter::new(Default::default());
        let call = |name: &'static str, args: Vec<Value>| {
            let interp = &interp;
            async move {
                interp
                    .call_method(Value::from("a-b-c"), name, args)
                    .await
                    .expect("string method")
            }
        };
        assert_eq!(call("split", vec![Value::from("-")]).await.to_js_string(), "a,b,c");
        assert_eq!(call("replace", vec![Value::from("-"), Value::from("+")]).await, Value::from("a+b-c"));
        assert_eq!(call("replaceAll", vec![Value::from("-"), Value::from("")]).await, Value::from("abc"));
        assert_eq!(call("padStart", vec![Value::from(7.0), Value::from("*")]).await, Value::from("**a-b-c"));
        assert_eq!(call("slice", vec![Value::from(-3.0)]).await, Value::from("b-c"));
        assert_eq!(call("indexOf", vec![Value::from("c")]).await, Value::from(4.0));
        assert_eq!(call("at", vec![Value::from(-1.0)]).await, Value::from("c"));
    }

    #[tokio::test]
    async fn oversized_strings_are_range_errors() {
        let interp = Interpreter::new(Default::default());
        for (name, args) in [
            ("repeat", vec![Value::from(1e19)]),
            ("padStart", vec![Value::from(1e19)]),
            ("padEnd", vec![Value::from(1e19), Value::from("xy")]),
        ] {
            let err = interp
                .call_method(Value::from("ab"), name, args)
                .await
                .expect_err(name);
            assert_eq!(err.detail(), "RangeError: Invalid string length", "{name}");
        }
        let empty = interp
            .call_method(Value::from(""), "repeat", vec![Value::from(1e19)])
            .await
            .expect("empty repeat");
        assert_eq!(empty, Value::from(""));
    }
}
