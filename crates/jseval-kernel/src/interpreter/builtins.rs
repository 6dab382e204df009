//! Global intrinsics installed into every interpreter.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;

use super::control_flow::Exception;
use super::inspect::{format_log_args, InspectOptions};
use super::json;
use super::methods::{get_property, set_property};
use super::native::{arg, native, NativeFunction};
use super::operators::pow;
use super::scope::Env;
use super::value::{
    lock, ordered_entries, string_to_number, FunctionKind, FunctionObject, Promise, PromiseState,
    Value,
};

/// Populate `env` with the intrinsics.
pub fn install(env: &Env, inspect: InspectOptions) {
    env.declare("undefined", Value::Undefined);
    env.declare("NaN", Value::Number(f64::NAN));
    env.declare("Infinity", Value::Number(f64::INFINITY));

    env.declare("Math", math());
    env.declare("JSON", json_object());
    env.declare("Object", object_constructor());
    env.declare("Array", array_constructor());
    env.declare("Promise", promise_constructor());
    env.declare("String", string_constructor());
    env.declare("Number", number_constructor());
    env.declare(
        "Boolean",
        native("Boolean", |args| Ok(Value::Bool(arg(args, 0).truthy()))),
    );

    env.declare("parseInt", native("parseInt", parse_int));
    env.declare("parseFloat", native("parseFloat", parse_float));
    env.declare(
        "isNaN",
        native("isNaN", |args| Ok(Value::Bool(arg(args, 0).to_number().is_nan()))),
    );
    env.declare(
        "isFinite",
        native("isFinite", |args| Ok(Value::Bool(arg(args, 0).to_number().is_finite()))),
    );

    for name in ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError"] {
        env.declare(name, error_constructor(name));
    }

    env.declare("console", console(inspect));
}

fn constructor(
    name: &str,
    f: impl Fn(&[Value]) -> Result<Value, Exception> + Send + Sync + 'static,
    statics: Vec<(&str, Value)>,
) -> Value {
    let function = FunctionObject::new(name, FunctionKind::Host(Arc::new(NativeFunction::new(f))));
    Value::function(
        statics
            .into_iter()
            .fold(function, |function, (key, value)| function.with_property(key, value)),
    )
}

fn number_fn(name: &'static str, f: fn(f64) -> f64) -> (&'static str, Value) {
    (name, native(name, move |args| Ok(Value::Number(f(arg(args, 0).to_number())))))
}

fn random() -> f64 {
    let mut hasher = RandomState::new().build_hasher();
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
        .hash(&mut hasher);
    (hasher.finish() >> 11) as f64 / (1u64 << 53) as f64
}

fn math() -> Value {
    let mut entries: Vec<(&str, Value)> = vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("LN2", Value::Number(std::f64::consts::LN_2)),
        ("LN10", Value::Number(std::f64::consts::LN_10)),
        ("LOG2E", Value::Number(std::f64::consts::LOG2_E)),
        ("LOG10E", Value::Number(std::f64::consts::LOG10_E)),
        ("SQRT2", Value::Number(std::f64::consts::SQRT_2)),
        number_fn("abs", f64::abs),
        number_fn("floor", f64::floor),
        number_fn("ceil", f64::ceil),
        // Halves round toward +Infinity.
        number_fn("round", |x| {
            if x.is_finite() { (x + 0.5).floor() } else { x }
        }),
        number_fn("trunc", f64::trunc),
        number_fn("sign", |x| if x == 0.0 || x.is_nan() { x } else { x.signum() }),
        number_fn("sqrt", f64::sqrt),
        number_fn("cbrt", f64::cbrt),
        number_fn("exp", f64::exp),
        number_fn("log", f64::ln),
        number_fn("log2", f64::log2),
        number_fn("log10", f64::log10),
        number_fn("sin", f64::sin),
        number_fn("cos", f64::cos),
        number_fn("tan", f64::tan),
        number_fn("atan", f64::atan),
        ("atan2", native("atan2", |args| {
            Ok(Value::Number(arg(args, 0).to_number().atan2(arg(args, 1).to_number())))
        })),
        ("pow", native("pow", |args| {
            Ok(Value::Number(pow(arg(args, 0).to_number(), arg(args, 1).to_number())))
        })),
        ("hypot", native("hypot", |args| {
            Ok(Value::Number(args.iter().map(|v| v.to_number().powi(2)).sum::<f64>().sqrt()))
        })),
        ("random", native("random", |_| Ok(Value::Number(random())))),
    ];
    entries.push(("max", native("max", |args| Ok(Value::Number(extremum(args, f64::NEG_INFINITY, f64::max))))));
    entries.push(("min", native("min", |args| Ok(Value::Number(extremum(args, f64::INFINITY, f64::min))))));
    Value::object_from(entries)
}

fn extremum(args: &[Value], start: f64, pick: fn(f64, f64) -> f64) -> f64 {
    let mut acc = start;
    for value in args {
        let n = value.to_number();
        if n.is_nan() {
            return f64::NAN;
        }
        acc = pick(acc, n);
    }
    acc
}

fn json_object() -> Value {
    Value::object_from([
        ("stringify", native("stringify", |args| json::stringify(&arg(args, 0), &arg(args, 2)))),
        ("parse", native("parse", |args| json::parse(&arg(args, 0).to_js_string()))),
    ])
}

// ═══════════════════════════════════════════════════════════════════════════
// Object / Array
// ═══════════════════════════════════════════════════════════════════════════

/// Own enumerable entries in property order.
fn entries_of(value: &Value) -> Result<Vec<(String, Value)>, Exception> {
    Ok(match value {
        Value::Undefined | Value::Null => {
            return Err(Exception::type_error(
                "Cannot convert undefined or null to object",
            ));
        }
        Value::Object(obj) => ordered_entries(&lock(obj).properties),
        Value::Array(items) => lock(items)
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        Value::String(s) => s
            .chars()
            .enumerate()
            .map(|(i, c)| (i.to_string(), Value::String(c.to_string())))
            .collect(),
        Value::Function(f) => ordered_entries(&lock(&f.properties)),
        _ => Vec::new(),
    })
}

fn object_constructor() -> Value {
    constructor(
        "Object",
        |args| {
            Ok(match arg(args, 0) {
                value @ (Value::Object(_) | Value::Array(_) | Value::Function(_) | Value::Promise(_)) => value,
                _ => Value::object(IndexMap::new()),
            })
        },
        vec![
            ("keys", native("keys", |args| {
                let keys = entries_of(&arg(args, 0))?.into_iter().map(|(k, _)| Value::String(k));
                Ok(Value::array(keys.collect()))
            })),
            ("values", native("values", |args| {
                let values = entries_of(&arg(args, 0))?.into_iter().map(|(_, v)| v);
                Ok(Value::array(values.collect()))
            })),
            ("entries", native("entries", |args| {
                let pairs = entries_of(&arg(args, 0))?
                    .into_iter()
                    .map(|(k, v)| Value::array(vec![Value::String(k), v]));
                Ok(Value::array(pairs.collect()))
            })),
            ("assign", native("assign", |args| {
                let target = arg(args, 0);
                for source in args.iter().skip(1).filter(|v| !v.is_nullish()) {
                    for (key, value) in entries_of(source)? {
                        set_property(&target, &key, value)?;
                    }
                }
                Ok(target)
            })),
            ("fromEntries", native("fromEntries", |args| {
                let Value::Array(pairs) = arg(args, 0) else {
                    return Err(Exception::type_error("object is not iterable"));
                };
                let pairs = lock(&pairs).clone();
                let mut props = IndexMap::new();
                for pair in &pairs {
                    let key = get_property(pair, "0")?.to_js_string();
                    props.insert(key, get_property(pair, "1")?);
                }
                Ok(Value::object(props))
            })),
        ],
    )
}

fn array_constructor() -> Value {
    constructor(
        "Array",
        |args| match args {
            [Value::Number(n)] => {
                if *n < 0.0 || n.fract() != 0.0 || *n > f64::from(u32::MAX) {
                    return Err(Exception::range_error("Invalid array length"));
                }
                Ok(Value::array(vec![Value::Undefined; *n as usize]))
            }
            _ => Ok(Value::array(args.to_vec())),
        },
        vec![
            ("isArray", native("isArray", |args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Array(_))))
            })),
            ("of", native("of", |args| Ok(Value::array(args.to_vec())))),
            ("from", Value::function(FunctionObject::new("from", FunctionKind::Intrinsic("Array.from")))),
        ],
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Promise
// ═══════════════════════════════════════════════════════════════════════════

fn promise_items(args: &[Value]) -> Result<Vec<Value>, Exception> {
    match arg(args, 0) {
        Value::Array(items) => Ok(lock(&items).clone()),
        other => Err(Exception::type_error(format!(
            "{} is not iterable",
            other.type_of()
        ))),
    }
}

fn promise_all(args: &[Value]) -> Result<Value, Exception> {
    let mut values = Vec::new();
    for item in promise_items(args)? {
        match item {
            Value::Promise(p) => match p.state() {
                PromiseState::Fulfilled(value) => values.push(value),
                PromiseState::Rejected(reason) => return Ok(Promise::rejected(reason)),
                PromiseState::Pending => return Ok(Value::Promise(Promise::pending())),
            },
            value => values.push(value),
        }
    }
    Ok(Promise::resolved(Value::array(values)))
}

fn promise_all_settled(args: &[Value]) -> Result<Value, Exception> {
    let mut results = Vec::new();
    for item in promise_items(args)? {
        let state = match item {
            Value::Promise(p) => p.state(),
            value => PromiseState::Fulfilled(value),
        };
        results.push(match state {
            PromiseState::Fulfilled(value) => {
                Value::object_from([("status", Value::from("fulfilled")), ("value", value)])
            }
            PromiseState::Rejected(reason) => {
                Value::object_from([("status", Value::from("rejected")), ("reason", reason)])
            }
            PromiseState::Pending => return Ok(Value::Promise(Promise::pending())),
        });
    }
    Ok(Promise::resolved(Value::array(results)))
}

fn promise_constructor() -> Value {
    let statics = [
        ("resolve", native("resolve", |args| Ok(Promise::resolved(arg(args, 0))))),
        ("reject", native("reject", |args| Ok(Promise::rejected(arg(args, 0))))),
        ("all", native("all", promise_all)),
        ("allSettled", native("allSettled", promise_all_settled)),
        ("race", native("race", |args| {
            Ok(match promise_items(args)?.into_iter().next() {
                Some(first) => Promise::resolved(first),
                None => Value::Promise(Promise::pending()),
            })
        })),
    ];
    Value::function(
        statics.into_iter().fold(
            FunctionObject::new("Promise", FunctionKind::Intrinsic("Promise")),
            |function, (key, value)| function.with_property(key, value),
        ),
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// String / Number
// ═══════════════════════════════════════════════════════════════════════════

fn string_constructor() -> Value {
    constructor(
        "String",
        |args| {
            Ok(Value::String(match args.first() {
                Some(value) => value.to_js_string(),
                None => String::new(),
            }))
        },
        vec![("fromCharCode", native("fromCharCode", |args| {
            Ok(Value::String(
                args.iter()
                    .filter_map(|v| char::from_u32(u32::from(v.to_number() as u16)))
                    .collect(),
            ))
        }))],
    )
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

fn number_constructor() -> Value {
    let is_integer = |x: f64| x.is_finite() && x.trunc() == x;
    constructor(
        "Number",
        |args| Ok(Value::Number(args.first().map(Value::to_number).unwrap_or(0.0))),
        vec![
            ("MAX_SAFE_INTEGER", Value::Number(MAX_SAFE_INTEGER)),
            ("MIN_SAFE_INTEGER", Value::Number(-MAX_SAFE_INTEGER)),
            ("EPSILON", Value::Number(f64::EPSILON)),
            ("MAX_VALUE", Value::Number(f64::MAX)),
            ("MIN_VALUE", Value::Number(5e-324)),
            ("POSITIVE_INFINITY", Value::Number(f64::INFINITY)),
            ("NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY)),
            ("NaN", Value::Number(f64::NAN)),
            ("isInteger", native("isInteger", move |args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Number(x) if is_integer(x))))
            })),
            ("isSafeInteger", native("isSafeInteger", move |args| {
                Ok(Value::Bool(
                    matches!(arg(args, 0), Value::Number(x) if is_integer(x) && x.abs() <= MAX_SAFE_INTEGER),
                ))
            })),
            ("isFinite", native("isFinite", |args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Number(x) if x.is_finite())))
            })),
            ("isNaN", native("isNaN", |args| {
                Ok(Value::Bool(matches!(arg(args, 0), Value::Number(x) if x.is_nan())))
            })),
            ("parseInt", native("parseInt", parse_int)),
            ("parseFloat", native("parseFloat", parse_float)),
        ],
    )
}

/// `parseInt(string, radix)`
fn parse_int(args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string();
    let text = text.trim_start();
    let (negative, mut digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let mut radix = match arg(args, 1) {
        Value::Undefined => 0,
        value => value.to_number() as u32,
    };
    if radix == 0 || radix == 16 {
        if let Some(rest) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            digits = rest;
            radix = 16;
        }
    }
    if radix == 0 {
        radix = 10;
    }
    if !(2..=36).contains(&radix) {
        return Ok(Value::Number(f64::NAN));
    }
    let mut value: Option<f64> = None;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        value = Some(value.unwrap_or(0.0) * f64::from(radix) + f64::from(d));
    }
    Ok(Value::Number(match value {
        Some(n) if negative => -n,
        Some(n) => n,
        None => f64::NAN,
    }))
}

/// `parseFloat(string)`: the longest decimal prefix.
fn parse_float(args: &[Value]) -> Result<Value, Exception> {
    let text = arg(args, 0).to_js_string();
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    if text[end..].starts_with("Infinity") {
        return Ok(Value::Number(string_to_number(&text[..end + "Infinity".len()])));
    }
    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();
    let int_digits = digits(end);
    end += int_digits;
    let mut frac_digits = 0;
    if bytes.get(end) == Some(&b'.') {
        frac_digits = digits(end + 1);
        if int_digits + frac_digits > 0 {
            end += 1 + frac_digits;
        }
    }
    if int_digits + frac_digits == 0 {
        return Ok(Value::Number(f64::NAN));
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = digits(exp_end);
        if exp_digits > 0 {
            end = exp_end + exp_digits;
        }
    }
    Ok(Value::Number(text[..end].parse().unwrap_or(f64::NAN)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Errors and console
// ═══════════════════════════════════════════════════════════════════════════

fn error_constructor(name: &'static str) -> Value {
    native(name, move |args| {
        let message = match arg(args, 0) {
            Value::Undefined => String::new(),
            other => other.to_js_string(),
        };
        Ok(Value::error(name, message))
    })
}

fn console(inspect: InspectOptions) -> Value {
    let method = |level: &'static str| {
        native(level, move |args| {
            let line = format_log_args(args, &inspect);
            match level {
                "error" => tracing::error!(target: "jseval::console", "{line}"),
                "warn" => tracing::warn!(target: "jseval::console", "{line}"),
                "debug" => tracing::debug!(target: "jseval::console", "{line}"),
                _ => tracing::info!(target: "jseval::console", "{line}"),
            }
            Ok(Value::Undefined)
        })
    };
    Value::object_from(["log", "info", "warn", "error", "debug"].map(|level| (level, method(level))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::scope::Environment;

    fn global(name: &str) -> Value {
        let env = Environment::root();
        install(&env, InspectOptions::default());
        env.lookup(name).expect("installed")
    }

    async fn call(function: Value, args: Vec<Value>) -> Value {
        let Value::Function(f) = function else {
            panic!("not a function");
        };
        match &f.kind {
            FunctionKind::Host(host) => host.call(args).await.expect("call"),
            _ => panic!("not a host function"),
        }
    }

    async fn call_static(object: &str, name: &str, args: Vec<Value>) -> Value {
        let member = get_property(&global(object), name).expect("member");
        call(member, args).await
    }

    #[tokio::test]
    async fn parse_int_and_float() {
        assert_eq!(call(global("parseInt"), vec![Value::from("  42px")]).await, Value::from(42.0));
        assert_eq!(call(global("parseInt"), vec![Value::from("0x1f")]).await, Value::from(31.0));
        assert_eq!(
            call(global("parseInt"), vec![Value::from("101"), Value::from(2.0)]).await,
            Value::from(5.0)
        );
        assert!(call(global("parseInt"), vec![Value::from("px")]).await.to_number().is_nan());
        assert_eq!(call(global("parseFloat"), vec![Value::from("3.5e2x")]).await, Value::from(350.0));
        assert_eq!(call(global("parseFloat"), vec![Value::from(".5")]).await, Value::from(0.5));
        assert!(call(global("parseFloat"), vec![Value::from(".")]).await.to_number().is_nan());
    }

    #[tokio::test]
    async fn math_helpers() {
        assert_eq!(call_static("Math", "round", vec![Value::from(-2.5)]).await, Value::from(-2.0));
        assert_eq!(call_static("Math", "max", vec![]).await, Value::from(f64::NEG_INFINITY));
        assert_eq!(
            call_static("Math", "min", vec![Value::from(3.0), Value::from(1.0)]).await,
            Value::from(1.0)
        );
        let r = call_static("Math", "random", vec![]).await.to_number();
        assert!((0.0..1.0).contains(&r));
    }

    #[tokio::test]
    async fn object_statics() {
        let obj = Value::object_from([("a", Value::from(1.0)), ("b", Value::from(2.0))]);
        let keys = call_static("Object", "keys", vec![obj.clone()]).await;
        assert_eq!(keys.to_js_string(), "a,b");
        let target = Value::object(IndexMap::new());
        call_static("Object", "assign", vec![target.clone(), obj]).await;
        assert_eq!(get_property(&target, "b").expect("b"), Value::from(2.0));
    }

    #[tokio::test]
    async fn promise_all_collects_settled_values() {
        let items = Value::array(vec![Promise::resolved(Value::from(1.0)), Value::from(2.0)]);
        let Value::Promise(p) = call_static("Promise", "all", vec![items]).await else {
            panic!("expected a promise");
        };
        let PromiseState::Fulfilled(values) = p.state() else {
            panic!("expected fulfilment");
        };
        assert_eq!(values.to_js_string(), "1,2");

        let items = Value::array(vec![Promise::rejected(Value::from("no"))]);
        let Value::Promise(p) = call_static("Promise", "all", vec![items]).await else {
            panic!("expected a promise");
        };
        assert!(matches!(p.state(), PromiseState::Rejected(_)));
    }

    #[tokio::test]
    async fn error_constructors() {
        let err = call(global("TypeError"), vec![Value::from("boom")]).await;
        assert_eq!(err.to_js_string(), "TypeError: boom");
        let bare = call(global("Error"), vec![]).await;
        assert_eq!(bare.to_js_string(), "Error");
    }
}
