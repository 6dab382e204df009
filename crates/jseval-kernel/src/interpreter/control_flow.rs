//! Control flow signals and thrown values.

use std::fmt;

use super::value::Value;

/// How a statement finished.
///
/// Thrown values travel separately as `Err(Exception)` so that `?` unwinds
/// through nested evaluation until a `try` catches them.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFlow {
    /// Normal completion, continue with the next statement.
    Normal,
    /// `break` out of the innermost loop.
    Break,
    /// `continue` with the next iteration of the innermost loop.
    Continue,
    /// `return` from the enclosing function.
    Return(Value),
}

impl ControlFlow {
    pub fn is_normal(&self) -> bool {
        matches!(self, ControlFlow::Normal)
    }
}

/// A thrown value.
#[derive(Clone)]
pub struct Exception {
    pub value: Value,
}

impl Exception {
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Throw a fresh error object of the given constructor name.
    pub fn error(name: &str, message: impl Into<String>) -> Self {
        Self::new(Value::error(name, message))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::error("TypeError", message)
    }

    pub fn reference_error(message: impl Into<String>) -> Self {
        Self::error("ReferenceError", message)
    }

    pub fn range_error(message: impl Into<String>) -> Self {
        Self::error("RangeError", message)
    }

    pub fn syntax_error(message: impl Into<String>) -> Self {
        Self::error("SyntaxError", message)
    }

    /// Message of an error object, or the string form of any other value.
    pub fn message(&self) -> String {
        match self.value.error_parts() {
            Some((_, message)) => message,
            None => self.value.to_js_string(),
        }
    }

    /// `String(value)`: `Name: message` for errors.
    pub fn detail(&self) -> String {
        self.value.to_js_string()
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Exception({:?})", self.value)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.detail())
    }
}

impl From<Value> for Exception {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_and_detail() {
        let exc = Exception::type_error("f is not a function");
        assert_eq!(exc.message(), "f is not a function");
        assert_eq!(exc.detail(), "TypeError: f is not a function");
    }

    #[test]
    fn non_error_values() {
        let exc = Exception::new(Value::from(1.0));
        assert_eq!(exc.message(), "1");
        assert_eq!(exc.detail(), "1");
    }
}
