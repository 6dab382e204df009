//! Functions implemented in Rust and callable from scripts.

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::control_flow::Exception;
use super::value::{FunctionKind, FunctionObject, Value};

/// A host-provided function.
///
/// Async host functions produce promises on the script side: a returned
/// value fulfils the promise, a returned [`Exception`] rejects it.
#[async_trait]
pub trait HostFunction: Send + Sync {
    /// Whether a call yields a promise.
    fn is_async(&self) -> bool {
        false
    }

    async fn call(&self, args: Vec<Value>) -> Result<Value, Exception>;
}

type SyncFn = dyn Fn(&[Value]) -> Result<Value, Exception> + Send + Sync;
type AsyncFn = dyn Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Exception>> + Send + Sync;

/// A synchronous function backed by a closure.
pub struct NativeFunction {
    f: Box<SyncFn>,
}

impl NativeFunction {
    pub fn new(f: impl Fn(&[Value]) -> Result<Value, Exception> + Send + Sync + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl HostFunction for NativeFunction {
    async fn call(&self, args: Vec<Value>) -> Result<Value, Exception> {
        (self.f)(&args)
    }
}

/// An async function backed by a closure returning a boxed future.
pub struct AsyncNativeFunction {
    f: Box<AsyncFn>,
}

impl AsyncNativeFunction {
    pub fn new(
        f: impl Fn(Vec<Value>) -> BoxFuture<'static, Result<Value, Exception>> + Send + Sync + 'static,
    ) -> Self {
        Self { f: Box::new(f) }
    }
}

#[async_trait]
impl HostFunction for AsyncNativeFunction {
    fn is_async(&self) -> bool {
        true
    }

    async fn call(&self, args: Vec<Value>) -> Result<Value, Exception> {
        (self.f)(args).await
    }
}

/// Wrap a host function as a script value.
pub fn host_value(name: &str, function: impl HostFunction + 'static) -> Value {
    Value::function(FunctionObject::new(name, FunctionKind::Host(std::sync::Arc::new(function))))
}

/// Shorthand for a synchronous native function value.
pub fn native(
    name: &str,
    f: impl Fn(&[Value]) -> Result<Value, Exception> + Send + Sync + 'static,
) -> Value {
    host_value(name, NativeFunction::new(f))
}

/// Positional argument, `undefined` when missing.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Undefined)
}
