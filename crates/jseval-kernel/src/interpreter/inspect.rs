//! Human-readable rendering of values.
//!
//! Follows the conventions of Node's `util.inspect` with default options:
//! single-quoted strings, `[Object]` / `[Array]` past the depth limit,
//! short containers on one line, long arrays grouped into columns, and
//! `<ref *1>` / `[Circular *1]` markers for cycles. Rendering never fails.

use std::sync::Arc;

use super::value::{lock, number_to_string, ordered_entries, ObjectClass, PromiseState, Value};

/// Options for [`inspect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InspectOptions {
    /// Containers nested deeper than this are summarized.
    pub depth: usize,
    /// Width limit for putting a container on a single line.
    pub break_length: usize,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            depth: 2,
            break_length: 80,
        }
    }
}

const MAX_ARRAY_LENGTH: usize = 100;
const MIN_LINE_WIDTH: usize = 16;
/// Nesting levels that may still share one line.
const COMPACT: usize = 3;

/// Render a value.
pub fn inspect(value: &Value, options: &InspectOptions) -> String {
    Inspector::new(*options).format_value(value, 0)
}

/// Render `console.log` arguments: strings verbatim, everything else inspected.
pub fn format_log_args(args: &[Value], options: &InspectOptions) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(s) => s.clone(),
            other => inspect(other, options),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Extras {
    Object,
    Array,
}

struct Inspector {
    options: InspectOptions,
    seen: Vec<usize>,
    circular: Vec<usize>,
    indentation: usize,
    current_depth: usize,
}

fn identity(value: &Value) -> Option<usize> {
    match value {
        Value::Array(a) => Some(Arc::as_ptr(a) as *const () as usize),
        Value::Object(o) => Some(Arc::as_ptr(o) as *const () as usize),
        Value::Promise(p) => Some(Arc::as_ptr(p) as *const () as usize),
        _ => None,
    }
}

impl Inspector {
    fn new(options: InspectOptions) -> Self {
        Self {
            options,
            seen: Vec::new(),
            circular: Vec::new(),
            indentation: 0,
            current_depth: 0,
        }
    }

    fn format_value(&mut self, value: &Value, depth: usize) -> String {
        match value {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) if *n == 0.0 && n.is_sign_negative() => "-0".to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => self.format_string(s),
            Value::Function(f) => {
                let prefix = if f.is_async() { "AsyncFunction" } else { "Function" };
                if f.name.is_empty() {
                    format!("[{prefix} (anonymous)]")
                } else {
                    format!("[{prefix}: {}]", f.name)
                }
            }
            _ => {
                let Some(id) = identity(value) else {
                    return String::new();
                };
                if self.seen.contains(&id) {
                    let index = match self.circular.iter().position(|c| *c == id) {
                        Some(pos) => pos + 1,
                        None => {
                            self.circular.push(id);
                            self.circular.len()
                        }
                    };
                    return format!("[Circular *{index}]");
                }
                self.format_raw(value, id, depth)
            }
        }
    }

    fn format_raw(&mut self, value: &Value, id: usize, depth: usize) -> String {
        let mut base = String::new();
        let (open, close, extras, summary) = match value {
            Value::Array(items) => {
                if lock(items).is_empty() {
                    return "[]".to_string();
                }
                ("[", "]", Extras::Array, "[Array]")
            }
            Value::Object(obj) => {
                let obj = lock(obj);
                match &obj.class {
                    ObjectClass::Error { name, message } => {
                        base = if message.is_empty() {
                            format!("[{name}]")
                        } else {
                            format!("[{name}: {message}]")
                        };
                        if obj.properties.is_empty() {
                            return base;
                        }
                    }
                    ObjectClass::Plain if obj.properties.is_empty() => return "{}".to_string(),
                    ObjectClass::Plain => {}
                }
                ("{", "}", Extras::Object, "[Object]")
            }
            Value::Promise(_) => ("Promise {", "}", Extras::Object, "[Promise]"),
            _ => return String::new(),
        };

        if depth > self.options.depth {
            self.current_depth = depth + 1;
            return if base.is_empty() { summary.to_string() } else { base };
        }

        let depth = depth + 1;
        self.seen.push(id);
        self.current_depth = depth;

        let mut output = Vec::new();
        let mut numeric = true;
        let mut has_more = false;
        match value {
            Value::Array(items) => {
                let items = lock(items).clone();
                for item in items.iter().take(MAX_ARRAY_LENGTH) {
                    numeric &= matches!(item, Value::Number(_));
                    self.indentation += 2;
                    output.push(self.format_value(item, depth));
                    self.indentation -= 2;
                }
                if items.len() > MAX_ARRAY_LENGTH {
                    has_more = true;
                    let remaining = items.len() - MAX_ARRAY_LENGTH;
                    let plural = if remaining > 1 { "s" } else { "" };
                    output.push(format!("... {remaining} more item{plural}"));
                }
            }
            Value::Object(obj) => {
                let entries = ordered_entries(&lock(obj).properties);
                for (key, item) in &entries {
                    self.indentation += 2;
                    let rendered = self.format_value(item, depth);
                    self.indentation -= 2;
                    output.push(format!("{}: {rendered}", format_key(key)));
                }
            }
            Value::Promise(promise) => match promise.state() {
                PromiseState::Pending => output.push("<pending>".to_string()),
                PromiseState::Fulfilled(v) => {
                    self.indentation += 2;
                    output.push(self.format_value(&v, depth));
                    self.indentation -= 2;
                }
                PromiseState::Rejected(v) => {
                    self.indentation += 2;
                    let rendered = self.format_value(&v, depth);
                    self.indentation -= 2;
                    output.push(format!("<rejected> {rendered}"));
                }
            },
            _ => {}
        }

        if let Some(pos) = self.circular.iter().position(|c| *c == id) {
            let reference = format!("<ref *{}>", pos + 1);
            base = if base.is_empty() {
                reference
            } else {
                format!("{reference} {base}")
            };
        }
        self.seen.pop();

        if extras == Extras::Array && output.len() > 6 {
            let grouped = self.group_array_elements(&output, numeric, has_more);
            let unchanged = grouped.len() == output.len();
            return self.reduce_to_single_string(grouped, &base, open, close, depth, unchanged);
        }
        self.reduce_to_single_string(output, &base, open, close, depth, true)
    }

    fn reduce_to_single_string(
        &self,
        output: Vec<String>,
        base: &str,
        open: &str,
        close: &str,
        depth: usize,
        may_join: bool,
    ) -> String {
        let prefix = if base.is_empty() {
            String::new()
        } else {
            format!("{base} ")
        };
        if may_join && self.current_depth.saturating_sub(depth) < COMPACT {
            let start = output.len() + self.indentation + open.len() + base.len() + 10;
            if self.is_below_break_length(&output, start, base) {
                let joined = output.join(", ");
                if !joined.contains('\n') {
                    return format!("{prefix}{open} {joined} {close}");
                }
            }
        }
        let indentation = format!("\n{}", " ".repeat(self.indentation));
        let separator = format!(",{indentation}  ");
        format!(
            "{prefix}{open}{indentation}  {}{indentation}{close}",
            output.join(&separator)
        )
    }

    fn is_below_break_length(&self, output: &[String], start: usize, base: &str) -> bool {
        let limit = self.options.break_length;
        let mut total = output.len() + start;
        if total + output.len() > limit {
            return false;
        }
        for entry in output {
            total += entry.chars().count();
            if total > limit {
                return false;
            }
        }
        !base.contains('\n')
    }

    /// Lay out many short array entries in aligned columns.
    fn group_array_elements(&self, output: &[String], numeric: bool, has_more: bool) -> Vec<String> {
        let output_len = if has_more { output.len() - 1 } else { output.len() };

        const SEPARATOR_SPACE: usize = 2;
        let data_len: Vec<usize> = output[..output_len].iter().map(|s| s.chars().count()).collect();
        let total_length: usize = data_len.iter().map(|len| len + SEPARATOR_SPACE).sum();
        let max_length = data_len.iter().copied().max().unwrap_or(0);
        let actual_max = max_length + SEPARATOR_SPACE;

        let fits_three = actual_max * 3 + self.indentation < self.options.break_length;
        let even_enough = (total_length as f64 / actual_max as f64) > 5.0 || max_length <= 6;
        if !(fits_three && even_enough) {
            return output.to_vec();
        }

        let average_bias = (actual_max as f64 - total_length as f64 / output.len() as f64).sqrt();
        let biased_max = (actual_max as f64 - 3.0 - average_bias).max(1.0);
        let columns = [
            ((2.5 * biased_max * output_len as f64).sqrt() / biased_max).round() as usize,
            (self.options.break_length.saturating_sub(self.indentation)) / actual_max,
            COMPACT * 4,
            15,
        ]
        .into_iter()
        .min()
        .unwrap_or(1);
        if columns <= 1 {
            return output.to_vec();
        }

        let max_line_length: Vec<usize> = (0..columns)
            .map(|col| {
                let widest = (col..output_len).step_by(columns).map(|j| data_len[j]).max().unwrap_or(0);
                widest + SEPARATOR_SPACE
            })
            .collect();

        let mut grouped = Vec::new();
        let mut row = 0;
        while row < output_len {
            let end = (row + columns).min(output_len);
            let mut line = String::new();
            for j in row..end - 1 {
                let cell = format!("{}, ", output[j]);
                line.push_str(&pad(&cell, max_line_length[j - row], numeric));
            }
            let last = end - 1;
            if numeric {
                let width = max_line_length[last - row] - SEPARATOR_SPACE;
                line.push_str(&pad(&output[last], width, true));
            } else {
                line.push_str(&output[last]);
            }
            grouped.push(line);
            row += columns;
        }
        if has_more {
            grouped.push(output[output_len].clone());
        }
        grouped
    }

    fn format_string(&self, s: &str) -> String {
        let len = s.chars().count();
        let limit = self.options.break_length.saturating_sub(self.indentation + 4);
        if len > MIN_LINE_WIDTH && len > limit && s.contains('\n') {
            let mut lines = Vec::new();
            let mut rest = s;
            while let Some(pos) = rest.find('\n') {
                lines.push(quote(&rest[..=pos]));
                rest = &rest[pos + 1..];
            }
            if !rest.is_empty() {
                lines.push(quote(rest));
            }
            let joiner = format!(" +\n{}", " ".repeat(self.indentation + 2));
            return lines.join(&joiner);
        }
        quote(s)
    }
}

fn pad(s: &str, width: usize, start: bool) -> String {
    let len = s.chars().count();
    if len >= width {
        return s.to_string();
    }
    let fill = " ".repeat(width - len);
    if start {
        format!("{fill}{s}")
    } else {
        format!("{s}{fill}")
    }
}

fn format_key(key: &str) -> String {
    let mut chars = key.chars();
    let plain = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        key.to_string()
    } else {
        quote(key)
    }
}

/// Quote a string, preferring single quotes.
pub fn quote(s: &str) -> String {
    let q = if !s.contains('\'') {
        '\''
    } else if !s.contains('"') {
        '"'
    } else if !s.contains('`') && !s.contains("${") {
        '`'
    } else {
        '\''
    };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(q);
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\\' => out.push_str("\\\\"),
            c if c == q => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(q);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::value::Promise;

    fn show(value: &Value) -> String {
        inspect(value, &InspectOptions::default())
    }

    fn nums(range: std::ops::RangeInclusive<i32>) -> Value {
        Value::array(range.map(|n| Value::from(f64::from(n))).collect())
    }

    #[test]
    fn primitives() {
        assert_eq!(show(&Value::Undefined), "undefined");
        assert_eq!(show(&Value::from(2.0)), "2");
        assert_eq!(show(&Value::from(-0.0)), "-0");
        assert_eq!(show(&Value::from("abc")), "'abc'");
        assert_eq!(show(&Value::from("it's")), "\"it's\"");
        assert_eq!(show(&Value::from("a\nb")), "'a\\nb'");
    }

    #[test]
    fn short_containers_on_one_line() {
        assert_eq!(show(&nums(1..=3)), "[ 1, 2, 3 ]");
        assert_eq!(show(&Value::array(vec![])), "[]");
        let obj = Value::object_from([("a", Value::from(1.0)), ("b-c", Value::from("x"))]);
        assert_eq!(show(&obj), "{ a: 1, 'b-c': 'x' }");
    }

    #[test]
    fn nesting_beyond_depth_is_summarized() {
        let deep = Value::object_from([(
            "a",
            Value::object_from([(
                "b",
                Value::object_from([("c", Value::object_from([("d", Value::from(1.0))]))]),
            )]),
        )]);
        assert_eq!(show(&deep), "{\n  a: { b: { c: [Object] } }\n}");
    }

    #[test]
    fn long_arrays_are_grouped() {
        assert_eq!(show(&nums(1..=7)), "[\n  1, 2, 3, 4,\n  5, 6, 7\n]");
    }

    #[test]
    fn long_objects_break_lines() {
        let obj = Value::object_from([
            ("alpha", Value::from("a fairly long string value")),
            ("beta", Value::from("another fairly long string value")),
        ]);
        assert_eq!(
            show(&obj),
            "{\n  alpha: 'a fairly long string value',\n  beta: 'another fairly long string value'\n}"
        );
    }

    #[test]
    fn cycles_are_marked() {
        let obj = Value::object_from([("name", Value::from("loop"))]);
        if let Value::Object(cell) = &obj {
            lock(cell).properties.insert("self".to_string(), obj.clone());
        }
        assert_eq!(show(&obj), "<ref *1> { name: 'loop', self: [Circular *1] }");
    }

    #[test]
    fn errors_and_promises() {
        assert_eq!(show(&Value::error("TypeError", "bad")), "[TypeError: bad]");
        assert_eq!(show(&Promise::resolved(Value::from(2.0))), "Promise { 2 }");
        assert_eq!(
            show(&Promise::rejected(Value::error("Error", "no"))),
            "Promise { <rejected> [Error: no] }"
        );
    }

    #[test]
    fn log_args_keep_strings_raw() {
        let args = [Value::from("total:"), Value::from(3.0), Value::from("x")];
        assert_eq!(format_log_args(&args, &InspectOptions::default()), "total: 3 x");
    }
}
