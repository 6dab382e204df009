//! Interpreter for compiled units.
//!
//! # Architecture
//!
//! The interpreter is built in layers:
//!
//! - **Value**: Runtime values with shared, lockable containers
//! - **Environment**: Lexical bindings with dead-zone tracking
//! - **Interpreter**: Async tree-walking evaluation of statements and expressions
//! - **Intrinsics**: `Math`, `JSON`, `Promise`, `console` and friends
//!
//! Host code extends the language through [`HostFunction`], which may be
//! async; scripts see async host functions as promise-returning functions.
//!
//! # Example
//!
//! ```
//! use jseval_kernel::compiler::Compiler;
//! use jseval_kernel::interpreter::{Interpreter, InterpreterOptions, Value};
//!
//! let unit = Compiler::new()
//!     .compile("return x * 2;", &["x".to_string()])
//!     .unwrap();
//! let interp = Interpreter::new(InterpreterOptions::default());
//! let result = futures::executor::block_on(interp.invoke(&unit, vec![Value::from(21.0)]));
//! assert_eq!(result.unwrap(), Value::from(42.0));
//! ```

mod builtins;
mod control_flow;
mod eval;
mod inspect;
mod json;
mod methods;
mod native;
mod operators;
mod scope;
mod value;

pub use control_flow::{ControlFlow, Exception};
pub use eval::{EvalFuture, Interpreter, InterpreterOptions};
pub use inspect::{format_log_args, inspect, quote, InspectOptions};
pub use methods::{delete_property, get_property, set_property};
pub use native::{arg, host_value, native, AsyncNativeFunction, HostFunction, NativeFunction};
pub use operators::{binary, pow};
pub use scope::{Env, Environment};
pub use value::{
    number_to_string, string_to_number, ArrayRef, FunctionKind, FunctionObject, FunctionRef,
    Object, ObjectClass, ObjectRef, Promise, PromiseRef, PromiseState, Value,
};
