//! jseval-kernel: evaluate operator-typed script snippets.
//!
//! This crate provides:
//!
//! - **Lexer**: Tokenizes script source using logos
//! - **Parser**: Builds the AST from tokens using chumsky
//! - **AST**: Type definitions for the syntax tree
//! - **Rewrite**: Captures the value of the tail statement in `__ret`
//! - **Emit**: Prints a tree back to source text
//! - **Compiler**: Checks rewritten source and builds an invokable unit
//! - **Interpreter**: Async tree-walking execution and value inspection
//! - **Stage**: The outcome taxonomy and stage records
//! - **Pipeline**: The [`Evaluator`] that ties the stages together
//! - **Host**: Bindings such as `getUser` and `add100`
//!
//! # Example
//!
//! ```
//! use jseval_kernel::{BindingTable, EvalConfig, Evaluator, Outcome};
//!
//! let evaluator = Evaluator::new(EvalConfig::default(), BindingTable::new());
//! let outcome = futures::executor::block_on(evaluator.evaluate("let x = 1; x + 1"));
//! let Outcome::Success(value) = outcome else { panic!("expected a value") };
//! assert_eq!(value.to_js_string(), "2");
//! ```

pub mod ast;
pub mod compiler;
pub mod config;
pub mod emit;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod rewrite;
pub mod stage;

pub use compiler::{CompileError, CompiledUnit, Compiler};
pub use config::EvalConfig;
pub use host::{
    substitute_mentions, BindingResolver, BindingTable, StaticDirectory, User, UserDirectory,
};
pub use interpreter::{Exception, InspectOptions, Value};
pub use parser::SyntaxError;
pub use pipeline::{EvalTask, Evaluator, Prepared};
pub use stage::{EvalError, Outcome, RuntimeError, Stage, StageRecord, Status};
