//! Stage reporting and the outcome taxonomy.
//!
//! Every evaluation moves forward through [`Stage::Parsing`],
//! [`Stage::Compiling`] and [`Stage::Running`] and ends in exactly one
//! [`Stage::Completed`] outcome. Failures stop the sequence at the stage
//! that produced them.

use serde::Serialize;

use crate::compiler::CompileError;
use crate::interpreter::{inspect, Exception, InspectOptions, Value};
use crate::parser::SyntaxError;

/// Message shown when a script finishes without producing a value.
pub const NO_RETURN_VALUE_MESSAGE: &str = "No return value given. Did you forget to `return`?";

/// An uncaught throw or rejection during execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{detail}")]
pub struct RuntimeError {
    /// The thrown error's message, or the thrown value as a string.
    pub message: String,
    /// `Name: message` for error objects, the string form otherwise.
    pub detail: String,
}

impl From<Exception> for RuntimeError {
    fn from(exc: Exception) -> Self {
        Self {
            message: exc.message(),
            detail: exc.detail(),
        }
    }
}

/// Any terminal failure of an evaluation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// How an evaluation ended.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The script produced `undefined`.
    NoReturnValue,
    Success(Value),
    SyntaxError(SyntaxError),
    CompileError(CompileError),
    RuntimeError(RuntimeError),
}

impl Outcome {
    pub fn status(&self) -> Status {
        match self {
            Outcome::NoReturnValue => Status::NoReturnValue,
            Outcome::Success(_) => Status::Success,
            Outcome::SyntaxError(_) => Status::SyntaxError,
            Outcome::CompileError(_) => Status::CompileError,
            Outcome::RuntimeError(_) => Status::RuntimeError,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status().is_error()
    }

    /// The produced value (if any) or the failure.
    pub fn into_result(self) -> Result<Option<Value>, EvalError> {
        match self {
            Outcome::NoReturnValue => Ok(None),
            Outcome::Success(value) => Ok(Some(value)),
            Outcome::SyntaxError(e) => Err(e.into()),
            Outcome::CompileError(e) => Err(e.into()),
            Outcome::RuntimeError(e) => Err(e.into()),
        }
    }
}

impl From<Result<Value, Exception>> for Outcome {
    fn from(result: Result<Value, Exception>) -> Self {
        match result {
            Ok(Value::Undefined) => Outcome::NoReturnValue,
            Ok(value) => Outcome::Success(value),
            Err(exc) => Outcome::RuntimeError(exc.into()),
        }
    }
}

/// Where an evaluation currently is.
#[derive(Debug, Clone)]
pub enum Stage {
    Parsing,
    Compiling,
    Running,
    Completed(Outcome),
}

impl Stage {
    pub fn status(&self) -> Status {
        match self {
            Stage::Parsing => Status::Parsing,
            Stage::Compiling => Status::Compiling,
            Stage::Running => Status::Running,
            Stage::Completed(outcome) => outcome.status(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed(_))
    }
}

/// Status tag carried by a [`StageRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Parsing,
    Compiling,
    Running,
    NoReturnValue,
    Success,
    SyntaxError,
    CompileError,
    RuntimeError,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Parsing | Status::Compiling | Status::Running)
    }

    pub fn is_error(self) -> bool {
        matches!(
            self,
            Status::SyntaxError | Status::CompileError | Status::RuntimeError
        )
    }

    /// Short heading for renderers.
    pub fn label(self) -> &'static str {
        match self {
            Status::Parsing => "Parsing",
            Status::Compiling => "Compiling",
            Status::Running => "Running",
            Status::NoReturnValue => "Result",
            Status::Success => "Result",
            Status::SyntaxError => "Syntax error",
            Status::CompileError => "Compilation failure",
            Status::RuntimeError => "Execution failure",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One observable step of an evaluation, as handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageRecord {
    /// The source as submitted.
    pub code: String,
    /// The rewritten source, once rewriting succeeded.
    pub rewritten: Option<String>,
    pub status: Status,
    pub message: String,
    /// Inspected result value, on success only.
    pub result: Option<String>,
}

impl StageRecord {
    /// Describe `stage` for a request on `code`.
    pub fn new(code: &str, rewritten: Option<&str>, stage: &Stage, inspect_options: &InspectOptions) -> Self {
        let (message, result) = match stage {
            Stage::Parsing => ("Parsing...".to_string(), None),
            Stage::Compiling => ("Compiling...".to_string(), None),
            Stage::Running => ("Running...".to_string(), None),
            Stage::Completed(Outcome::NoReturnValue) => (NO_RETURN_VALUE_MESSAGE.to_string(), None),
            Stage::Completed(Outcome::Success(value)) => {
                ("Evaluated".to_string(), Some(inspect(value, inspect_options)))
            }
            Stage::Completed(Outcome::SyntaxError(e)) => (e.to_string(), None),
            Stage::Completed(Outcome::CompileError(e)) => (e.to_string(), None),
            Stage::Completed(Outcome::RuntimeError(e)) => (e.to_string(), None),
        };
        Self {
            code: code.to_string(),
            rewritten: rewritten.map(str::to_string),
            status: stage.status(),
            message,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn undefined_is_no_return_value() {
        let outcome = Outcome::from(Ok(Value::Undefined));
        assert!(matches!(outcome, Outcome::NoReturnValue));
        assert_eq!(outcome.into_result(), Ok(None));
    }

    #[test]
    fn null_is_a_value() {
        let outcome = Outcome::from(Ok(Value::Null));
        assert_eq!(outcome.status(), Status::Success);
    }

    #[test]
    fn runtime_error_carries_message_and_detail() {
        let outcome = Outcome::from(Err(Exception::type_error("x is not a function")));
        let Err(EvalError::Runtime(err)) = outcome.into_result() else {
            panic!("expected a runtime error");
        };
        assert_eq!(err.message, "x is not a function");
        assert_eq!(err.detail, "TypeError: x is not a function");
        assert_eq!(err.to_string(), "TypeError: x is not a function");
    }

    #[test]
    fn thrown_strings_are_reported_verbatim() {
        let err = RuntimeError::from(Exception::new(Value::from("oops")));
        assert_eq!(err.message, "oops");
        assert_eq!(err.detail, "oops");
    }

    #[test]
    fn record_inspects_success_values() {
        let stage = Stage::Completed(Outcome::Success(Value::from("hi")));
        let record = StageRecord::new("'hi'", Some("return 'hi';"), &stage, &InspectOptions::default());
        assert_eq!(record.status, Status::Success);
        assert_eq!(record.result.as_deref(), Some("'hi'"));
        assert_eq!(record.rewritten.as_deref(), Some("return 'hi';"));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&Status::NoReturnValue).expect("serialize");
        assert_eq!(json, "\"no_return_value\"");
        assert!(Status::RuntimeError.is_terminal());
        assert!(!Status::Running.is_terminal());
    }
}
