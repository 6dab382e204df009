//! Async tree-walking evaluation.
//!
//! Statements and expressions recurse through boxed futures so that
//! evaluation can suspend at `await` on host calls. All futures are `Send`.
//!
//! Async functions run eagerly: the body executes to completion when called
//! and the caller receives an already-settled promise.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use indexmap::IndexMap;
use tracing::Instrument;

use crate::ast::{
    AssignOp, Expr, ForEach, ForHead, ForInit, ForLoop, Function, FunctionBody, LogicalOp, PropKey,
    Stmt, TryStmt, UnaryOp, UpdateOp, VarDecl, VarKind,
};
use crate::compiler::CompiledUnit;
use crate::emit::emit_expr;

use super::builtins;
use super::control_flow::{ControlFlow, Exception};
use super::inspect::InspectOptions;
use super::methods::{delete_property, get_property, set_property};
use super::operators;
use super::scope::{Env, Environment};
use super::value::{
    lock, number_to_string, ordered_entries, to_int32, to_property_key, FunctionKind,
    FunctionObject, Promise, PromiseState, Value,
};

/// Boxed evaluation future.
pub type EvalFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, Exception>> + Send + 'a>>;

/// Remaining stack below which a poll moves to a fresh segment.
const STACK_RED_ZONE: usize = 256 * 1024;
/// Size of each fresh segment.
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

/// Polls nested evaluation on a new stack segment when the current one runs
/// low, so the call depth limit is reached before the thread's stack is.
struct GrowStack<'a, T> {
    inner: EvalFuture<'a, T>,
}

impl<T> Future for GrowStack<'_, T> {
    type Output = Result<T, Exception>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let inner = &mut self.inner;
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || inner.as_mut().poll(cx))
    }
}

fn grow_stack<'a, T: 'a>(inner: EvalFuture<'a, T>) -> EvalFuture<'a, T> {
    Box::pin(GrowStack { inner })
}

/// Limits and rendering options for one interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterOptions {
    /// Nested calls beyond this throw a RangeError.
    pub max_call_depth: usize,
    /// Rendering used by `console.*`.
    pub inspect: InspectOptions,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            inspect: InspectOptions::default(),
        }
    }
}

/// Executes compiled units against a fresh set of intrinsics.
///
/// Create one interpreter per evaluation; scripts may modify the intrinsics.
pub struct Interpreter {
    globals: Env,
    options: InterpreterOptions,
    depth: AtomicUsize,
}

struct DepthGuard<'a>(&'a AtomicUsize);

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// An assignable location.
enum Reference {
    Binding(String),
    Property(Value, String),
}

/// Settle a promise from the outcome of an async body.
pub(crate) fn settle(result: Result<Value, Exception>) -> Value {
    match result {
        Ok(value) => Promise::resolved(value),
        Err(exc) => Promise::rejected(exc.value),
    }
}

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Nullish => !left.is_nullish(),
    }
}

/// Collect `var` names declared anywhere in a function body, excluding nested functions.
fn collect_var_names(stmts: &[Stmt], out: &mut Vec<String>) {
    for stmt in stmts {
        collect_stmt_vars(stmt, out);
    }
}

fn collect_stmt_vars(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::VarDecl(decl) if decl.kind == VarKind::Var => {
            out.extend(decl.declarations.iter().map(|d| d.name.clone()));
        }
        Stmt::Block(body) => collect_var_names(body, out),
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_stmt_vars(consequent, out);
            if let Some(alt) = alternate {
                collect_stmt_vars(alt, out);
            }
        }
        Stmt::For(l) => {
            if let Some(ForInit::VarDecl(decl)) = &l.init {
                if decl.kind == VarKind::Var {
                    out.extend(decl.declarations.iter().map(|d| d.name.clone()));
                }
            }
            collect_stmt_vars(&l.body, out);
        }
        Stmt::ForIn(each) | Stmt::ForOf(each) => {
            if let ForHead::Decl(VarKind::Var, name) = &each.left {
                out.push(name.clone());
            }
            collect_stmt_vars(&each.body, out);
        }
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } | Stmt::With { body, .. } => {
            collect_stmt_vars(body, out)
        }
        Stmt::Try(t) => {
            collect_var_names(&t.block, out);
            if let Some(handler) = &t.handler {
                collect_var_names(&handler.body, out);
            }
            if let Some(finalizer) = &t.finalizer {
                collect_var_names(finalizer, out);
            }
        }
        _ => {}
    }
}

/// Keys visited by `for (k in value)`.
fn enumerable_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(obj) => ordered_entries(&lock(obj).properties)
            .into_iter()
            .map(|(k, _)| k)
            .collect(),
        Value::Array(items) => (0..lock(items).len()).map(|i| i.to_string()).collect(),
        Value::String(s) => (0..s.chars().count()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn copy_bindings(parent: &Env, from: &Env, names: &[(String, bool)]) -> Result<Env, Exception> {
    let next = Environment::child(parent);
    for (name, mutable) in names {
        next.initialize(name, from.lookup(name)?, *mutable);
    }
    Ok(next)
}

impl Interpreter {
    pub fn new(options: InterpreterOptions) -> Self {
        let globals = Environment::root();
        builtins::install(&globals, options.inspect);
        Self {
            globals,
            options,
            depth: AtomicUsize::new(0),
        }
    }

    /// The environment holding the intrinsics.
    pub fn globals(&self) -> &Env {
        &self.globals
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Run a compiled unit with `args` bound to its parameters in order.
    ///
    /// Resolves to the unit's return value, or the thrown value.
    #[tracing::instrument(level = "debug", skip_all, fields(args = args.len()))]
    pub async fn invoke(&self, unit: &CompiledUnit, args: Vec<Value>) -> Result<Value, Exception> {
        let function = self.make_closure(unit.function(), &self.globals, "");
        let promise = self.call(function, args).await?;
        self.await_value(promise).await
    }

    /// Unwrap a promise; other values pass through.
    ///
    /// A promise that never settles suspends the caller forever.
    pub async fn await_value(&self, value: Value) -> Result<Value, Exception> {
        let Value::Promise(promise) = value else {
            return Ok(value);
        };
        match promise.state() {
            PromiseState::Fulfilled(value) => Ok(value),
            PromiseState::Rejected(reason) => Err(Exception::new(reason)),
            PromiseState::Pending => {
                tracing::warn!("awaiting a promise that has no pending settlement");
                futures::future::pending().await
            }
        }
    }

    fn enter_call(&self) -> Result<DepthGuard<'_>, Exception> {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        let guard = DepthGuard(&self.depth);
        if depth > self.options.max_call_depth {
            return Err(Exception::range_error("Maximum call stack size exceeded"));
        }
        Ok(guard)
    }

    pub(crate) fn make_closure(&self, function: &Arc<Function>, env: &Env, name: &str) -> Value {
        Value::function(FunctionObject::new(
            name,
            FunctionKind::Closure {
                function: function.clone(),
                env: env.clone(),
            },
        ))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Calls
    // ═══════════════════════════════════════════════════════════════════════

    /// Call a function value.
    pub fn call<'a>(&'a self, callee: Value, args: Vec<Value>) -> EvalFuture<'a, Value> {
        grow_stack(Box::pin(async move {
            let Value::Function(function) = &callee else {
                return Err(Exception::type_error(format!(
                    "{} is not a function",
                    callee.to_js_string()
                )));
            };
            match &function.kind {
                FunctionKind::Closure { function, env } => {
                    let result = self.run_closure(function, env, args).await;
                    if function.is_async {
                        Ok(settle(result))
                    } else {
                        result
                    }
                }
                FunctionKind::Host(host) => {
                    let result = host.call(args).await;
                    if host.is_async() {
                        Ok(settle(result))
                    } else {
                        result
                    }
                }
                FunctionKind::Method { receiver, name } => {
                    self.call_method(receiver.clone(), name, args).await
                }
                FunctionKind::Intrinsic(name) => self.call_intrinsic(name, args, false).await,
            }
        }))
    }

    async fn run_closure(
        &self,
        function: &Arc<Function>,
        captured: &Env,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        let _guard = self.enter_call()?;
        tracing::trace!(name = ?function.name, args = args.len(), "call");

        let env = Environment::child(captured);
        let mut args = args.into_iter();
        for param in &function.params {
            let mut value = args.next().unwrap_or(Value::Undefined);
            if value.is_undefined() {
                if let Some(default) = &param.default {
                    value = self.eval_named(default, &env, &param.name).await?;
                }
            }
            env.declare(param.name.clone(), value);
        }

        match &function.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, &env).await,
            FunctionBody::Block(stmts) => {
                let mut vars = Vec::new();
                collect_var_names(stmts, &mut vars);
                for name in &vars {
                    env.declare_var(name);
                }
                match self.exec_block(stmts, &env).await? {
                    ControlFlow::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    async fn construct(&self, ctor: Value, args: Vec<Value>, callee: &Expr) -> Result<Value, Exception> {
        let not_constructor =
            || Exception::type_error(format!("{} is not a constructor", emit_expr(callee)));
        let Value::Function(function) = &ctor else {
            return Err(not_constructor());
        };
        match &function.kind {
            FunctionKind::Host(_) => self.call(ctor.clone(), args).await,
            FunctionKind::Intrinsic(name) => self.call_intrinsic(name, args, true).await,
            FunctionKind::Closure { .. } | FunctionKind::Method { .. } => Err(not_constructor()),
        }
    }

    async fn eval_args(&self, args: &[Expr], env: &Env) -> Result<Vec<Value>, Exception> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, env).await?);
        }
        Ok(values)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════════

    /// Declare the block's lexical names (in their dead zone) and its functions.
    fn hoist_declarations(&self, stmts: &[Stmt], env: &Env) {
        for stmt in stmts {
            match stmt {
                Stmt::VarDecl(decl) if decl.kind.is_lexical() => {
                    for d in &decl.declarations {
                        env.declare_uninitialized(d.name.clone(), decl.kind == VarKind::Let);
                    }
                }
                Stmt::FunctionDecl(function) => {
                    if let Some(name) = &function.name {
                        env.declare(name.clone(), self.make_closure(function, env, name));
                    }
                }
                _ => {}
            }
        }
    }

    async fn exec_block(&self, stmts: &[Stmt], env: &Env) -> Result<ControlFlow, Exception> {
        self.hoist_declarations(stmts, env);
        for stmt in stmts {
            let flow = self.exec_stmt(stmt, env).await?;
            if !flow.is_normal() {
                return Ok(flow);
            }
        }
        Ok(ControlFlow::Normal)
    }

    /// Execute one statement.
    pub(crate) fn exec_stmt<'a>(&'a self, stmt: &'a Stmt, env: &'a Env) -> EvalFuture<'a, ControlFlow> {
        let span = tracing::trace_span!("exec_stmt", kind = stmt.kind_name());
        grow_stack(Box::pin(
            async move {
                match stmt {
                    Stmt::Expr(expr) => {
                        self.eval_expr(expr, env).await?;
                        Ok(ControlFlow::Normal)
                    }
                    Stmt::Block(stmts) => {
                        let block_env = Environment::child(env);
                        self.exec_block(stmts, &block_env).await
                    }
                    Stmt::Empty | Stmt::FunctionDecl(_) => Ok(ControlFlow::Normal),
                    Stmt::VarDecl(decl) => {
                        self.exec_var_decl(decl, env).await?;
                        Ok(ControlFlow::Normal)
                    }
                    Stmt::If {
                        test,
                        consequent,
                        alternate,
                    } => {
                        if self.eval_expr(test, env).await?.truthy() {
                            self.exec_stmt(consequent, env).await
                        } else if let Some(alternate) = alternate {
                            self.exec_stmt(alternate, env).await
                        } else {
                            Ok(ControlFlow::Normal)
                        }
                    }
                    Stmt::For(l) => self.exec_for(l, env).await,
                    Stmt::ForIn(each) => self.exec_for_each(each, env, false).await,
                    Stmt::ForOf(each) => self.exec_for_each(each, env, true).await,
                    Stmt::While { test, body } => {
                        while self.eval_expr(test, env).await?.truthy() {
                            match self.exec_stmt(body, env).await? {
                                ControlFlow::Break => break,
                                ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                                ControlFlow::Normal | ControlFlow::Continue => {}
                            }
                        }
                        Ok(ControlFlow::Normal)
                    }
                    Stmt::DoWhile { body, test } => {
                        loop {
                            match self.exec_stmt(body, env).await? {
                                ControlFlow::Break => break,
                                ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                                ControlFlow::Normal | ControlFlow::Continue => {}
                            }
                            if !self.eval_expr(test, env).await?.truthy() {
                                break;
                            }
                        }
                        Ok(ControlFlow::Normal)
                    }
                    Stmt::With { .. } => Err(Exception::syntax_error(
                        "Strict mode code may not include a with statement",
                    )),
                    Stmt::Return(arg) => {
                        let value = match arg {
                            Some(expr) => self.eval_expr(expr, env).await?,
                            None => Value::Undefined,
                        };
                        Ok(ControlFlow::Return(value))
                    }
                    Stmt::Throw(expr) => Err(Exception::new(self.eval_expr(expr, env).await?)),
                    Stmt::Try(t) => self.exec_try(t, env).await,
                    Stmt::Break => Ok(ControlFlow::Break),
                    Stmt::Continue => Ok(ControlFlow::Continue),
                }
            }
            .instrument(span),
        ))
    }

    async fn exec_var_decl(&self, decl: &VarDecl, env: &Env) -> Result<(), Exception> {
        for d in &decl.declarations {
            match decl.kind {
                VarKind::Var => {
                    if let Some(init) = &d.init {
                        let value = self.eval_named(init, env, &d.name).await?;
                        env.assign(&d.name, value)?;
                    }
                }
                kind => {
                    let value = match &d.init {
                        Some(init) => self.eval_named(init, env, &d.name).await?,
                        None => Value::Undefined,
                    };
                    env.initialize(&d.name, value, kind == VarKind::Let);
                }
            }
        }
        Ok(())
    }

    async fn exec_for(&self, l: &ForLoop, env: &Env) -> Result<ControlFlow, Exception> {
        let loop_env = Environment::child(env);
        // Lexical loop variables get a fresh copy per iteration.
        let mut per_iteration = Vec::new();
        match &l.init {
            Some(ForInit::VarDecl(decl)) => {
                if decl.kind.is_lexical() {
                    for d in &decl.declarations {
                        let mutable = decl.kind == VarKind::Let;
                        loop_env.declare_uninitialized(d.name.clone(), mutable);
                        per_iteration.push((d.name.clone(), mutable));
                    }
                }
                self.exec_var_decl(decl, &loop_env).await?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval_expr(expr, &loop_env).await?;
            }
            None => {}
        }

        let mut iter_env = if per_iteration.is_empty() {
            loop_env
        } else {
            copy_bindings(env, &loop_env, &per_iteration)?
        };
        loop {
            if let Some(test) = &l.test {
                if !self.eval_expr(test, &iter_env).await?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(&l.body, &iter_env).await? {
                ControlFlow::Break => break,
                ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
            if !per_iteration.is_empty() {
                iter_env = copy_bindings(env, &iter_env, &per_iteration)?;
            }
            if let Some(update) = &l.update {
                self.eval_expr(update, &iter_env).await?;
            }
        }
        Ok(ControlFlow::Normal)
    }

    async fn exec_for_each(&self, each: &ForEach, env: &Env, of: bool) -> Result<ControlFlow, Exception> {
        let subject = self.eval_expr(&each.right, env).await?;
        let items: Vec<Value> = if of {
            match &subject {
                Value::Array(items) => lock(items).clone(),
                Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
                _ => {
                    return Err(Exception::type_error(format!(
                        "{} is not iterable",
                        emit_expr(&each.right)
                    )));
                }
            }
        } else {
            enumerable_keys(&subject).into_iter().map(Value::String).collect()
        };

        for item in items {
            let iter_env = Environment::child(env);
            match &each.left {
                ForHead::Decl(VarKind::Var, name) => env.assign(name, item)?,
                ForHead::Decl(kind, name) => iter_env.initialize(name, item, *kind == VarKind::Let),
                ForHead::Target(target) => {
                    let reference = self.reference(target, &iter_env).await?;
                    self.put_reference(&reference, item, &iter_env)?;
                }
            }
            match self.exec_stmt(&each.body, &iter_env).await? {
                ControlFlow::Break => break,
                ControlFlow::Return(v) => return Ok(ControlFlow::Return(v)),
                ControlFlow::Normal | ControlFlow::Continue => {}
            }
        }
        Ok(ControlFlow::Normal)
    }

    async fn exec_try(&self, t: &TryStmt, env: &Env) -> Result<ControlFlow, Exception> {
        let block_env = Environment::child(env);
        let result = match self.exec_block(&t.block, &block_env).await {
            Err(exc) => match &t.handler {
                Some(handler) => {
                    let catch_env = Environment::child(env);
                    if let Some(param) = &handler.param {
                        catch_env.declare(param.clone(), exc.value);
                    }
                    self.exec_block(&handler.body, &catch_env).await
                }
                None => Err(exc),
            },
            completed => completed,
        };

        if let Some(finalizer) = &t.finalizer {
            let finally_env = Environment::child(env);
            match self.exec_block(finalizer, &finally_env).await {
                Ok(ControlFlow::Normal) => {}
                abrupt => return abrupt,
            }
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════════

    /// Evaluate an expression.
    pub(crate) fn eval_expr<'a>(&'a self, expr: &'a Expr, env: &'a Env) -> EvalFuture<'a, Value> {
        Box::pin(async move {
            match expr {
                Expr::Number(n) => Ok(Value::Number(*n)),
                Expr::String(s) => Ok(Value::String(s.clone())),
                Expr::Bool(b) => Ok(Value::Bool(*b)),
                Expr::Null => Ok(Value::Null),
                Expr::Template { quasis, exprs } => {
                    let mut out = String::new();
                    for (i, quasi) in quasis.iter().enumerate() {
                        out.push_str(quasi);
                        if let Some(expr) = exprs.get(i) {
                            out.push_str(&self.eval_expr(expr, env).await?.to_js_string());
                        }
                    }
                    Ok(Value::String(out))
                }
                Expr::Ident(name) => match env.lookup(name) {
                    Err(_) if name == "this" => Ok(Value::Undefined),
                    other => other,
                },
                Expr::Array(items) => Ok(Value::array(self.eval_args(items, env).await?)),
                Expr::Object(props) => {
                    let mut map = IndexMap::new();
                    for prop in props {
                        let key = match &prop.key {
                            PropKey::Ident(s) | PropKey::String(s) => s.clone(),
                            PropKey::Number(n) => number_to_string(*n),
                            PropKey::Computed(expr) => to_property_key(&self.eval_expr(expr, env).await?),
                        };
                        let value = self.eval_named(&prop.value, env, &key).await?;
                        map.insert(key, value);
                    }
                    Ok(Value::object(map))
                }
                Expr::Function(function) => match &function.name {
                    Some(name) if !function.is_arrow => {
                        // Named function expressions see their own name.
                        let scope = Environment::child(env);
                        let closure = self.make_closure(function, &scope, name);
                        scope.declare_const(name.clone(), closure.clone());
                        Ok(closure)
                    }
                    _ => Ok(self.make_closure(function, env, "")),
                },
                Expr::Unary { op, arg } => self.eval_unary(*op, arg, env).await,
                Expr::Update { op, prefix, target } => {
                    let reference = self.reference(target, env).await?;
                    let old = self.get_reference(&reference, env)?.to_number();
                    let new = match op {
                        UpdateOp::Inc => old + 1.0,
                        UpdateOp::Dec => old - 1.0,
                    };
                    self.put_reference(&reference, Value::Number(new), env)?;
                    Ok(Value::Number(if *prefix { new } else { old }))
                }
                Expr::Binary { op, left, right } => {
                    let l = self.eval_expr(left, env).await?;
                    let r = self.eval_expr(right, env).await?;
                    operators::binary(*op, &l, &r)
                }
                Expr::Logical { op, left, right } => {
                    let l = self.eval_expr(left, env).await?;
                    if short_circuits(*op, &l) {
                        Ok(l)
                    } else {
                        self.eval_expr(right, env).await
                    }
                }
                Expr::Conditional {
                    test,
                    consequent,
                    alternate,
                } => {
                    if self.eval_expr(test, env).await?.truthy() {
                        self.eval_expr(consequent, env).await
                    } else {
                        self.eval_expr(alternate, env).await
                    }
                }
                Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, env).await,
                Expr::Call { callee, args } => self.eval_call(callee, args, env).await,
                Expr::New { callee, args } => {
                    let ctor = self.eval_expr(callee, env).await?;
                    let args = self.eval_args(args, env).await?;
                    self.construct(ctor, args, callee).await
                }
                Expr::Member { object, property } => {
                    let object = self.eval_expr(object, env).await?;
                    get_property(&object, property)
                }
                Expr::Index { object, index } => {
                    let object = self.eval_expr(object, env).await?;
                    let key = to_property_key(&self.eval_expr(index, env).await?);
                    get_property(&object, &key)
                }
                Expr::Sequence(items) => {
                    let mut last = Value::Undefined;
                    for item in items {
                        last = self.eval_expr(item, env).await?;
                    }
                    Ok(last)
                }
                Expr::Await(arg) => {
                    let value = self.eval_expr(arg, env).await?;
                    self.await_value(value).await
                }
            }
        })
    }

    /// Evaluate with name inference for anonymous functions.
    async fn eval_named(&self, expr: &Expr, env: &Env, name: &str) -> Result<Value, Exception> {
        match expr {
            Expr::Function(function) if function.name.is_none() => {
                Ok(self.make_closure(function, env, name))
            }
            other => self.eval_expr(other, env).await,
        }
    }

    async fn eval_unary(&self, op: UnaryOp, arg: &Expr, env: &Env) -> Result<Value, Exception> {
        match (op, arg) {
            (UnaryOp::Typeof, Expr::Ident(name)) if !env.contains(name) => {
                return Ok(Value::string("undefined"));
            }
            (UnaryOp::Delete, Expr::Member { object, property }) => {
                let object = self.eval_expr(object, env).await?;
                return delete_property(&object, property).map(Value::Bool);
            }
            (UnaryOp::Delete, Expr::Index { object, index }) => {
                let object = self.eval_expr(object, env).await?;
                let key = to_property_key(&self.eval_expr(index, env).await?);
                return delete_property(&object, &key).map(Value::Bool);
            }
            _ => {}
        }
        let value = self.eval_expr(arg, env).await?;
        Ok(match op {
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::BitNot => Value::Number(f64::from(!to_int32(value.to_number()))),
            UnaryOp::Typeof => Value::string(value.type_of()),
            UnaryOp::Void => Value::Undefined,
            UnaryOp::Delete => Value::Bool(true),
        })
    }

    async fn eval_assign(&self, op: AssignOp, target: &Expr, value: &Expr, env: &Env) -> Result<Value, Exception> {
        let reference = self.reference(target, env).await?;
        let name = match &reference {
            Reference::Binding(name) => name.as_str(),
            Reference::Property(..) => "",
        };
        let result = match op {
            AssignOp::Assign => self.eval_named(value, env, name).await?,
            AssignOp::Compound(bin) => {
                let current = self.get_reference(&reference, env)?;
                let rhs = self.eval_expr(value, env).await?;
                operators::binary(bin, &current, &rhs)?
            }
            AssignOp::Logical(logical) => {
                let current = self.get_reference(&reference, env)?;
                if short_circuits(logical, &current) {
                    return Ok(current);
                }
                self.eval_named(value, env, name).await?
            }
        };
        self.put_reference(&reference, result.clone(), env)?;
        Ok(result)
    }

    async fn eval_call(&self, callee: &Expr, args: &[Expr], env: &Env) -> Result<Value, Exception> {
        let function = match callee {
            Expr::Member { object, property } => {
                let object = self.eval_expr(object, env).await?;
                get_property(&object, property)?
            }
            Expr::Index { object, index } => {
                let object = self.eval_expr(object, env).await?;
                let key = to_property_key(&self.eval_expr(index, env).await?);
                get_property(&object, &key)?
            }
            other => self.eval_expr(other, env).await?,
        };
        let args = self.eval_args(args, env).await?;
        if !matches!(function, Value::Function(_)) {
            return Err(Exception::type_error(format!(
                "{} is not a function",
                emit_expr(callee)
            )));
        }
        self.call(function, args).await
    }

    async fn reference(&self, target: &Expr, env: &Env) -> Result<Reference, Exception> {
        match target {
            Expr::Ident(name) => Ok(Reference::Binding(name.clone())),
            Expr::Member { object, property } => Ok(Reference::Property(
                self.eval_expr(object, env).await?,
                property.clone(),
            )),
            Expr::Index { object, index } => {
                let object = self.eval_expr(object, env).await?;
                let key = to_property_key(&self.eval_expr(index, env).await?);
                Ok(Reference::Property(object, key))
            }
            _ => Err(Exception::syntax_error("Invalid left-hand side in assignment")),
        }
    }

    fn get_reference(&self, reference: &Reference, env: &Env) -> Result<Value, Exception> {
        match reference {
            Reference::Binding(name) => env.lookup(name),
            Reference::Property(object, key) => get_property(object, key),
        }
    }

    fn put_reference(&self, reference: &Reference, value: Value, env: &Env) -> Result<(), Exception> {
        match reference {
            Reference::Binding(name) => env.assign(name, value),
            Reference::Property(object, key) => set_property(object, key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    /// Run a program body as an async function and return its value.
    async fn run(source: &str) -> Result<Value, Exception> {
        run_with(source, InterpreterOptions::default()).await
    }

    async fn run_with(source: &str, options: InterpreterOptions) -> Result<Value, Exception> {
        let program = parse_program(source).expect("parse");
        let unit = Arc::new(Function {
            name: None,
            params: Vec::new(),
            body: FunctionBody::Block(program.body),
            is_async: true,
            is_arrow: true,
        });
        let interp = Interpreter::new(options);
        let closure = interp.make_closure(&unit, interp.globals(), "");
        let promise = interp.call(closure, Vec::new()).await?;
        interp.await_value(promise).await
    }

    async fn value(source: &str) -> Value {
        run(source).await.expect("evaluation")
    }

    async fn thrown(source: &str) -> String {
        run(source).await.expect_err("should throw").detail()
    }

    #[tokio::test]
    async fn arithmetic_and_variables() {
        assert_eq!(value("let a = 2; const b = 3; return a * b + 1").await, Value::from(7.0));
        assert_eq!(value("var x = 1; x += 4; return x").await, Value::from(5.0));
        assert_eq!(value("let i = 0; i++; ++i; return i").await, Value::from(2.0));
    }

    #[tokio::test]
    async fn closures_capture_environment() {
        let src = "function counter() { let n = 0; return () => ++n } \
                   const c = counter(); c(); c(); return c()";
        assert_eq!(value(src).await, Value::from(3.0));
    }

    #[tokio::test]
    async fn per_iteration_bindings() {
        let src = "const fs = []; for (let i = 0; i < 3; i++) { fs.push(() => i) } \
                   return fs.map(f => f()).join(',')";
        assert_eq!(value(src).await, Value::from("0,1,2"));
    }

    #[tokio::test]
    async fn var_is_function_scoped() {
        assert_eq!(value("if (true) { var v = 9 } return v").await, Value::from(9.0));
        assert_eq!(value("return typeof hoisted; var hoisted = 1").await, Value::from("undefined"));
    }

    #[tokio::test]
    async fn function_declarations_are_hoisted() {
        assert_eq!(value("return twice(4); function twice(n) { return n * 2 }").await, Value::from(8.0));
    }

    #[tokio::test]
    async fn temporal_dead_zone() {
        assert_eq!(
            thrown("x; let x = 1").await,
            "ReferenceError: Cannot access 'x' before initialization"
        );
    }

    #[tokio::test]
    async fn runtime_error_messages() {
        assert_eq!(thrown("return nope").await, "ReferenceError: nope is not defined");
        assert_eq!(
            thrown("let o; return o.y").await,
            "TypeError: Cannot read properties of undefined (reading 'y')"
        );
        assert_eq!(thrown("const f = 1; f()").await, "TypeError: f is not a function");
        assert_eq!(thrown("const o = {}; o.go()").await, "TypeError: o.go is not a function");
        assert_eq!(thrown("const k = 1; k = 2").await, "TypeError: Assignment to constant variable.");
        assert_eq!(thrown("undeclared = 1").await, "ReferenceError: undeclared is not defined");
    }

    #[tokio::test]
    async fn recursion_depth_is_bounded() {
        let options = InterpreterOptions {
            max_call_depth: 16,
            ..InterpreterOptions::default()
        };
        let err = run_with("function f() { return f() } f()", options)
            .await
            .expect_err("unbounded recursion");
        assert_eq!(err.detail(), "RangeError: Maximum call stack size exceeded");
        assert_eq!(
            value("function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2) } return fib(15)").await,
            Value::from(610.0)
        );
    }

    #[tokio::test]
    async fn try_catch_finally() {
        let src = "let log = []; \
                   try { throw new Error('boom') } catch (e) { log.push(e.message) } finally { log.push('done') } \
                   return log.join(' ')";
        assert_eq!(value(src).await, Value::from("boom done"));
        assert_eq!(value("try { return 1 } finally { }").await, Value::from(1.0));
        assert_eq!(value("try { return 1 } finally { return 2 }").await, Value::from(2.0));
        assert_eq!(thrown("try { throw 1 } finally { }").await, "1");
    }

    #[tokio::test]
    async fn loops_and_control_flow() {
        let src = "let s = 0; for (const n of [1, 2, 3, 4, 5]) { if (n === 2) continue; if (n === 5) break; s += n } return s";
        assert_eq!(value(src).await, Value::from(8.0));
        let src = "let keys = ''; for (const k in { a: 1, b: 2 }) keys += k; return keys";
        assert_eq!(value(src).await, Value::from("ab"));
        assert_eq!(value("let n = 0; do { n++ } while (n < 3); return n").await, Value::from(3.0));
        assert_eq!(value("let n = 10; while (n > 3) n -= 2; return n").await, Value::from(2.0));
    }

    #[tokio::test]
    async fn async_functions_and_await() {
        let src = "async function double(x) { return x * 2 } return await double(21)";
        assert_eq!(value(src).await, Value::from(42.0));
        let src = "const f = async () => { throw new TypeError('no') }; \
                   try { await f() } catch (e) { return e.name }";
        assert_eq!(value(src).await, Value::from("TypeError"));
        assert_eq!(value("return await 5").await, Value::from(5.0));
    }

    #[tokio::test]
    async fn logical_and_nullish() {
        assert_eq!(value("return null ?? 'd'").await, Value::from("d"));
        assert_eq!(value("return 0 || 'x'").await, Value::from("x"));
        assert_eq!(value("let a = 1; a &&= 5; return a").await, Value::from(5.0));
        assert_eq!(value("let b = null; b ??= 3; return b").await, Value::from(3.0));
    }

    #[tokio::test]
    async fn deep_recursion_fits_on_a_default_thread_stack() {
        // The unit is one frame, so r(61) nests max_call_depth - 1 calls.
        let depth = InterpreterOptions::default().max_call_depth;
        let src = format!(
            "function r(n) {{ if (n === 0) {{ return 0 }} for (const x of [n]) {{ return 1 + r(x - 1) }} }} return r({})",
            depth - 3
        );
        assert_eq!(value(&src).await, Value::from((depth - 3) as f64));

        let err = run(&format!("function r(n) {{ return n === 0 ? 0 : 1 + r(n - 1) }} return r({depth})"))
            .await
            .expect_err("past the limit");
        assert_eq!(err.detail(), "RangeError: Maximum call stack size exceeded");
    }

    #[tokio::test]
    async fn templates_and_typeof() {
        assert_eq!(value("const n = 3; return `n=${n + 1}!`").await, Value::from("n=4!"));
        assert_eq!(value("return typeof missing").await, Value::from("undefined"));
        assert_eq!(value("return typeof (() => 1)").await, Value::from("function"));
    }

    #[tokio::test]
    async fn function_names_are_inferred() {
        assert_eq!(value("const f = () => 1; return f.name").await, Value::from("f"));
        assert_eq!(
            value("const g = function fact(n) { return n ? n * fact(n - 1) : 1 }; return g(5)").await,
            Value::from(120.0)
        );
    }

    #[tokio::test]
    async fn default_parameters() {
        assert_eq!(value("function f(a, b = a + 1) { return b } return f(1)").await, Value::from(2.0));
    }

    #[tokio::test]
    async fn objects_and_delete() {
        let src = "const o = { a: 1, ['b' + 1]: 2 }; delete o.a; return Object.keys(o).join()";
        assert_eq!(value(src).await, Value::from("b1"));
        assert_eq!(value("const o = {x: 1}; return 'x' in o").await, Value::Bool(true));
    }
}
