//! `JSON.stringify` / `JSON.parse` on top of serde_json.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};

use super::control_flow::Exception;
use super::value::{lock, ordered_entries, Value};

/// Convert a value to JSON. `None` for values JSON skips (undefined, functions).
pub fn to_json(value: &Value) -> Result<Option<serde_json::Value>, Exception> {
    Converter::default().convert(value)
}

/// `JSON.stringify(value, null, indent)`; `undefined` when there is nothing to write.
pub fn stringify(value: &Value, indent: &Value) -> Result<Value, Exception> {
    let Some(json) = to_json(value)? else {
        return Ok(Value::Undefined);
    };
    let indent = match indent {
        Value::Number(n) if *n >= 1.0 => " ".repeat(n.min(10.0) as usize),
        Value::String(s) => s.chars().take(10).collect(),
        _ => String::new(),
    };
    let text = if indent.is_empty() {
        serde_json::to_string(&json)
    } else {
        let mut buf = Vec::new();
        let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
        json.serialize(&mut ser)
            .map(|_| String::from_utf8_lossy(&buf).into_owned())
    };
    text.map(Value::String)
        .map_err(|e| Exception::type_error(e.to_string()))
}

/// `JSON.parse(text)`.
pub fn parse(text: &str) -> Result<Value, Exception> {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|json| from_json(&json))
        .map_err(|e| Exception::syntax_error(format!("Unexpected token in JSON: {e}")))
}

/// Convert parsed JSON into a runtime value.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => Value::array(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let props: IndexMap<String, Value> = map.iter().map(|(k, v)| (k.clone(), from_json(v))).collect();
            Value::object(props)
        }
    }
}

#[derive(Default)]
struct Converter {
    stack: Vec<usize>,
}

impl Converter {
    fn enter(&mut self, id: usize) -> Result<(), Exception> {
        if self.stack.contains(&id) {
            return Err(Exception::type_error("Converting circular structure to JSON"));
        }
        self.stack.push(id);
        Ok(())
    }

    fn convert(&mut self, value: &Value) -> Result<Option<serde_json::Value>, Exception> {
        let json = match value {
            Value::Undefined | Value::Function(_) => return Ok(None),
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => {
                self.enter(Arc::as_ptr(items) as *const () as usize)?;
                let items = lock(items).clone();
                let mut out = Vec::with_capacity(items.len());
                for item in &items {
                    out.push(self.convert(item)?.unwrap_or(serde_json::Value::Null));
                }
                self.stack.pop();
                serde_json::Value::Array(out)
            }
            Value::Object(obj) => {
                self.enter(Arc::as_ptr(obj) as *const () as usize)?;
                let entries = ordered_entries(&lock(obj).properties);
                let mut out = serde_json::Map::new();
                for (key, item) in &entries {
                    if let Some(json) = self.convert(item)? {
                        out.insert(key.clone(), json);
                    }
                }
                self.stack.pop();
                serde_json::Value::Object(out)
            }
            Value::Promise(_) => serde_json::Value::Object(serde_json::Map::new()),
        };
        Ok(Some(json))
    }
}

fn number(n: f64) -> serde_json::Value {
    if !n.is_finite() {
        return serde_json::Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(value: &Value, indent: Value) -> String {
        stringify(value, &indent)
            .expect("stringify")
            .as_str()
            .map(str::to_string)
            .unwrap_or_default()
    }

    #[test]
    fn stringify_keeps_property_order() {
        let obj = Value::object_from([
            ("b", Value::from(1.0)),
            ("a", Value::array(vec![Value::from(1.5), Value::Undefined])),
            ("skip", Value::Undefined),
        ]);
        assert_eq!(text(&obj, Value::Undefined), r#"{"b":1,"a":[1.5,null]}"#);
    }

    #[test]
    fn stringify_with_indent() {
        let obj = Value::object_from([("a", Value::from(1.0))]);
        assert_eq!(text(&obj, Value::from(2.0)), "{\n  \"a\": 1\n}");
    }

    #[test]
    fn stringify_undefined_is_undefined() {
        assert!(stringify(&Value::Undefined, &Value::Undefined).expect("ok").is_undefined());
    }

    #[test]
    fn circular_structure_is_a_type_error() {
        let obj = Value::object_from([("a", Value::from(1.0))]);
        if let Value::Object(cell) = &obj {
            lock(cell).properties.insert("me".to_string(), obj.clone());
        }
        let err = stringify(&obj, &Value::Undefined).expect_err("cycle");
        assert_eq!(err.detail(), "TypeError: Converting circular structure to JSON");
    }

    #[test]
    fn parse_round_trips_structure() {
        let value = parse(r#"{"x": [1, "two", null], "y": true}"#).expect("parse");
        assert_eq!(text(&value, Value::Undefined), r#"{"x":[1,"two",null],"y":true}"#);
    }

    #[test]
    fn parse_failure_is_syntax_error() {
        let err = parse("{nope").expect_err("bad json");
        assert!(err.detail().starts_with("SyntaxError: "));
    }
}
