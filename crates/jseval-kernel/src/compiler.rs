//! Sandbox compiler: rewritten source text to an invokable unit.
//!
//! A unit is an async function whose parameters are exactly the binding
//! names and whose body is the rewritten source, checked under strict-mode
//! rules. "Sandbox" means convenience scoping only: the unit sees its
//! parameters and the language intrinsics, plus anything reachable from the
//! values passed in. It is not an isolation boundary.

mod checker;
mod issue;

use std::sync::Arc;

use crate::ast::{Function, FunctionBody, Param, Program};
use crate::lexer;
use crate::parser;

pub use checker::{check_binding_name, Checker};
pub use issue::{CompileIssue, IssueCode};

/// Failure to build a unit from source text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("SyntaxError: {message}")]
pub struct CompileError {
    pub code: IssueCode,
    pub message: String,
}

impl From<CompileIssue> for CompileError {
    fn from(issue: CompileIssue) -> Self {
        Self {
            code: issue.code,
            message: issue.message,
        }
    }
}

/// A compiled, invokable unit.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    function: Arc<Function>,
    source: String,
}

impl CompiledUnit {
    /// Parameter names, in binding order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.function.params.iter().map(|p| p.name.as_str())
    }

    /// The unit as an async function value.
    pub fn function(&self) -> &Arc<Function> {
        &self.function
    }

    /// The source text the unit was built from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Builds units from source text. Holds no state between compilations.
#[derive(Debug, Clone, Copy, Default)]
pub struct Compiler;

impl Compiler {
    pub fn new() -> Self {
        Self
    }

    /// Compile `source` into a unit taking `params` in order.
    ///
    /// The source is parsed again from scratch; a parse failure at this
    /// point is a compile error, not a syntax error.
    #[tracing::instrument(level = "debug", skip(self, source), fields(len = source.len()))]
    pub fn compile(&self, source: &str, params: &[String]) -> Result<CompiledUnit, CompileError> {
        for name in params {
            if !lexer::is_identifier(name) {
                return Err(CompileError {
                    code: IssueCode::InvalidBindingName,
                    message: format!("Invalid parameter name '{name}'"),
                });
            }
            if let Some(issue) = check_binding_name(name) {
                return Err(issue.into());
            }
        }

        let program = parser::parse(source).map_err(|errs| {
            let err = errs.first().map(|e| parser::SyntaxError::from_parse_error(source, e));
            CompileError {
                code: IssueCode::Unparseable,
                message: match err {
                    Some(err) => format!("{} ({}:{})", err.message, err.line, err.column),
                    None => "Unexpected token".to_string(),
                },
            }
        })?;

        let issues = Checker::new(params).check(&program);
        if let Some(first) = issues.into_iter().next() {
            tracing::debug!(code = %first.code, message = %first.message, "compile rejected");
            return Err(first.into());
        }

        Ok(CompiledUnit {
            function: Arc::new(unit_function(program, params)),
            source: source.to_string(),
        })
    }
}

fn unit_function(program: Program, params: &[String]) -> Function {
    Function {
        name: None,
        params: params.iter().map(Param::named).collect(),
        body: FunctionBody::Block(program.body),
        is_async: true,
        is_arrow: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn compiles_with_parameters_in_order() {
        let unit = Compiler::new()
            .compile("return a + b", &names(&["a", "b"]))
            .expect("compile");
        assert_eq!(unit.params().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(unit.function().is_async);
    }

    #[test]
    fn duplicate_parameters_are_accepted() {
        assert!(Compiler::new().compile("return a", &names(&["a", "a"])).is_ok());
    }

    #[test]
    fn with_statement_is_a_compile_error() {
        let err = Compiler::new()
            .compile("with (o) { x }", &[])
            .expect_err("should fail");
        assert_eq!(err.code, IssueCode::WithStatement);
        assert_eq!(
            err.to_string(),
            "SyntaxError: Strict mode code may not include a with statement"
        );
    }

    #[test]
    fn invalid_binding_names() {
        let err = Compiler::new().compile("1", &names(&["not valid"])).expect_err("fail");
        assert_eq!(err.code, IssueCode::InvalidBindingName);
        let err = Compiler::new().compile("1", &names(&["class"])).expect_err("fail");
        assert_eq!(err.code, IssueCode::ReservedWord);
    }

    #[test]
    fn unparseable_source() {
        let err = Compiler::new().compile("(", &[]).expect_err("fail");
        assert_eq!(err.code, IssueCode::Unparseable);
        assert_eq!(err.message, "Unexpected token (1:1)");
    }
}
