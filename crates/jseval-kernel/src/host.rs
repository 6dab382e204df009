//! Host capabilities handed to scripts as bindings.
//!
//! A binding is a named value the unit receives as a parameter. Values are
//! either immediate or deferred; deferred values are resolved, in order,
//! right before the unit is invoked.
//!
//! Nothing here is a security boundary: a script can reach everything
//! reachable from the values it is given.

use std::borrow::Cow;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;

use crate::ast::BinaryOp;
use crate::interpreter::{
    arg, binary, host_value, native, AsyncNativeFunction, Exception, Value,
};

// ═══════════════════════════════════════════════════════════════════════════
// Mentions
// ═══════════════════════════════════════════════════════════════════════════

static MENTION: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<@!?([0-9]+)>").ok());

/// Rewrite every `<@123>` / `<@!123>` placeholder into `(await getUser("123"))`.
pub fn substitute_mentions(text: &str) -> Cow<'_, str> {
    match MENTION.as_ref() {
        Some(re) => re.replace_all(text, r#"(await getUser("${1}"))"#),
        None => Cow::Borrowed(text),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Users
// ═══════════════════════════════════════════════════════════════════════════

/// A user as seen by scripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub bot: bool,
}

impl User {
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            display_name: None,
            bot: false,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_bot(mut self, bot: bool) -> Self {
        self.bot = bot;
        self
    }

    /// Script-side representation.
    pub fn to_value(&self) -> Value {
        Value::object_from([
            ("id", Value::string(&self.id)),
            ("username", Value::string(&self.username)),
            (
                "displayName",
                self.display_name.as_ref().map(Value::string).unwrap_or(Value::Null),
            ),
            ("bot", Value::Bool(self.bot)),
        ])
    }
}

/// Looks users up by id for `getUser`.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// The user with `id`, `None` when there is no such user.
    async fn fetch(&self, id: &str) -> Option<User>;
}

/// A fixed, in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    users: HashMap<String, User>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id.clone(), user);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticDirectory {
    async fn fetch(&self, id: &str) -> Option<User> {
        self.users.get(id).cloned()
    }
}

/// `getUser(id)`: a promise for the user, rejected with `Error: Unknown User`.
pub fn get_user(directory: Arc<dyn UserDirectory>) -> Value {
    host_value(
        "getUser",
        AsyncNativeFunction::new(move |args| {
            let directory = directory.clone();
            Box::pin(async move {
                let id = arg(&args, 0).to_js_string();
                tracing::debug!(%id, "getUser");
                match directory.fetch(&id).await {
                    Some(user) => Ok(user.to_value()),
                    None => Err(Exception::error("Error", "Unknown User")),
                }
            })
        }),
    )
}

/// `add100(x)`: `x + 100`, with the usual `+` semantics.
pub fn add100() -> Value {
    native("add100", |args| {
        binary(BinaryOp::Add, &arg(args, 0), &Value::Number(100.0))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Bindings
// ═══════════════════════════════════════════════════════════════════════════

/// Produces a binding's value asynchronously, right before invocation.
#[async_trait]
pub trait BindingResolver: Send + Sync {
    async fn resolve(&self) -> Result<Value, Exception>;
}

#[async_trait]
impl<F, Fut> BindingResolver for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, Exception>> + Send,
{
    async fn resolve(&self) -> Result<Value, Exception> {
        (self)().await
    }
}

#[derive(Clone)]
enum BindingValue {
    Immediate(Value),
    Deferred(Arc<dyn BindingResolver>),
}

#[derive(Clone)]
struct Binding {
    name: String,
    value: BindingValue,
}

/// Ordered bindings. Order defines both parameter order and argument order.
///
/// Duplicate names are kept; the later binding shadows the earlier one
/// inside the script.
#[derive(Clone, Default)]
pub struct BindingTable {
    bindings: Vec<Binding>,
}

impl std::fmt::Debug for BindingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.bindings.iter().map(|b| &b.name)).finish()
    }
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// `add100` plus `getUser` backed by `directory`.
    pub fn standard(directory: Arc<dyn UserDirectory>) -> Self {
        Self::new()
            .with("add100", add100())
            .with("getUser", get_user(directory))
    }

    /// Append an immediate binding.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    /// Append a binding resolved right before invocation.
    pub fn with_deferred(mut self, name: impl Into<String>, resolver: impl BindingResolver + 'static) -> Self {
        self.insert_deferred(name, resolver);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.push(Binding {
            name: name.into(),
            value: BindingValue::Immediate(value),
        });
    }

    pub fn insert_deferred(&mut self, name: impl Into<String>, resolver: impl BindingResolver + 'static) {
        self.bindings.push(Binding {
            name: name.into(),
            value: BindingValue::Deferred(Arc::new(resolver)),
        });
    }

    /// Binding names in order, duplicates included.
    pub fn names(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Whether the binding at each position is deferred, in order.
    pub fn describe(&self) -> Vec<(String, bool)> {
        self.bindings
            .iter()
            .map(|b| (b.name.clone(), matches!(b.value, BindingValue::Deferred(_))))
            .collect()
    }

    /// Produce argument values in binding order, resolving deferred ones.
    pub async fn resolve(&self) -> Result<Vec<Value>, Exception> {
        let mut values = Vec::with_capacity(self.bindings.len());
        for binding in &self.bindings {
            values.push(match &binding.value {
                BindingValue::Immediate(value) => value.clone(),
                BindingValue::Deferred(resolver) => {
                    tracing::debug!(name = %binding.name, "resolving deferred binding");
                    resolver.resolve().await?
                }
            });
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{get_property, FunctionKind};

    #[test]
    fn mentions_become_get_user_calls() {
        assert_eq!(
            substitute_mentions("<@123> and <@!456>"),
            r#"(await getUser("123")) and (await getUser("456"))"#
        );
        assert!(matches!(substitute_mentions("1 + 1"), Cow::Borrowed(_)));
        assert_eq!(substitute_mentions("<@abc>"), "<@abc>");
    }

    async fn call(function: &Value, args: Vec<Value>) -> Result<Value, Exception> {
        let Value::Function(f) = function else {
            panic!("not a function");
        };
        let FunctionKind::Host(host) = &f.kind else {
            panic!("not a host function");
        };
        host.call(args).await
    }

    #[tokio::test]
    async fn add100_uses_plus_semantics() {
        let sum = call(&add100(), vec![Value::from(1.0)]).await.expect("number");
        assert_eq!(sum, Value::from(101.0));
        let joined = call(&add100(), vec![Value::from("1")]).await.expect("string");
        assert_eq!(joined, Value::from("1100"));
    }

    #[tokio::test]
    async fn get_user_resolves_known_ids() {
        let directory = Arc::new(StaticDirectory::new().with_user(User::new("42", "ada")));
        let get_user = get_user(directory);
        let user = call(&get_user, vec![Value::from("42")]).await.expect("known user");
        assert_eq!(get_property(&user, "username").expect("username"), Value::from("ada"));

        let err = call(&get_user, vec![Value::from("7")]).await.expect_err("unknown user");
        assert_eq!(err.detail(), "Error: Unknown User");
    }

    #[tokio::test]
    async fn deferred_bindings_resolve_in_order() {
        let table = BindingTable::new()
            .with("a", Value::from(1.0))
            .with_deferred("b", || async { Ok(Value::from(2.0)) })
            .with("a", Value::from(3.0));
        assert_eq!(table.names(), vec!["a", "b", "a"]);
        let values = table.resolve().await.expect("resolve");
        assert_eq!(values, vec![Value::from(1.0), Value::from(2.0), Value::from(3.0)]);
    }

    #[tokio::test]
    async fn failing_resolver_stops_resolution() {
        let table = BindingTable::new()
            .with_deferred("x", || async { Err(Exception::error("Error", "lookup failed")) });
        let err = table.resolve().await.expect_err("resolver fails");
        assert_eq!(err.detail(), "Error: lookup failed");
    }

    #[test]
    fn standard_table() {
        let table = BindingTable::standard(Arc::new(StaticDirectory::new()));
        assert_eq!(table.names(), vec!["add100", "getUser"]);
        let BindingValue::Immediate(Value::Function(f)) = &table.bindings[1].value else {
            panic!("getUser is an immediate function");
        };
        assert!(f.is_async());
    }
}
