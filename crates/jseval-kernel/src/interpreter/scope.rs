//! Variable environments.
//!
//! Environments provide bindings with:
//! - Lexical nesting through parent links (blocks, loop iterations, calls)
//! - Temporal dead zone tracking for `let`/`const`
//! - Constant bindings that reject assignment
//!
//! Closures keep their defining environment alive through the shared
//! [`Env`] handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::control_flow::Exception;
use super::value::{lock, Value};

/// Shared handle to an environment.
pub type Env = Arc<Environment>;

#[derive(Debug, Clone)]
struct Slot {
    value: Value,
    mutable: bool,
    initialized: bool,
}

/// One frame of bindings plus a link to the enclosing frame.
#[derive(Debug)]
pub struct Environment {
    slots: Mutex<HashMap<String, Slot>>,
    parent: Option<Env>,
}

impl Environment {
    /// Create a root environment with no parent.
    pub fn root() -> Env {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            parent: None,
        })
    }

    /// Create an empty environment nested in `parent`.
    pub fn child(parent: &Env) -> Env {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
            parent: Some(parent.clone()),
        })
    }

    /// Declare an initialized, mutable binding in this frame.
    ///
    /// Redeclaring replaces the previous binding.
    pub fn declare(&self, name: impl Into<String>, value: Value) {
        self.insert(name.into(), value, true, true);
    }

    /// Declare an initialized binding that rejects assignment.
    pub fn declare_const(&self, name: impl Into<String>, value: Value) {
        self.insert(name.into(), value, false, true);
    }

    /// Declare a lexical binding that is not yet initialized.
    ///
    /// Reads before [`initialize`](Self::initialize) throw a ReferenceError.
    pub fn declare_uninitialized(&self, name: impl Into<String>, mutable: bool) {
        self.insert(name.into(), Value::Undefined, mutable, false);
    }

    /// Declare a `var` binding unless this frame already holds one.
    pub fn declare_var(&self, name: &str) {
        let mut slots = lock(&self.slots);
        slots.entry(name.to_string()).or_insert(Slot {
            value: Value::Undefined,
            mutable: true,
            initialized: true,
        });
    }

    /// Initialize a binding declared in this frame, ending its dead zone.
    ///
    /// A name missing from this frame is declared with the given mutability.
    pub fn initialize(&self, name: &str, value: Value, mutable: bool) {
        let mut slots = lock(&self.slots);
        match slots.get_mut(name) {
            Some(slot) => {
                slot.value = value;
                slot.initialized = true;
            }
            None => {
                slots.insert(
                    name.to_string(),
                    Slot {
                        value,
                        mutable,
                        initialized: true,
                    },
                );
            }
        }
    }

    fn insert(&self, name: String, value: Value, mutable: bool, initialized: bool) {
        lock(&self.slots).insert(
            name,
            Slot {
                value,
                mutable,
                initialized,
            },
        );
    }

    /// Look a name up from this frame outward.
    pub fn lookup(&self, name: &str) -> Result<Value, Exception> {
        match self.find(name, |slot| slot.clone()) {
            Some(slot) if slot.initialized => Ok(slot.value),
            Some(_) => Err(Exception::reference_error(format!(
                "Cannot access '{name}' before initialization"
            ))),
            None => Err(Exception::reference_error(format!("{name} is not defined"))),
        }
    }

    /// Whether `name` resolves anywhere in the chain.
    pub fn contains(&self, name: &str) -> bool {
        self.find(name, |_| ()).is_some()
    }

    /// Assign to the nearest binding named `name`.
    pub fn assign(&self, name: &str, value: Value) -> Result<(), Exception> {
        {
            let mut slots = lock(&self.slots);
            if let Some(slot) = slots.get_mut(name) {
                if !slot.initialized {
                    return Err(Exception::reference_error(format!(
                        "Cannot access '{name}' before initialization"
                    )));
                }
                if !slot.mutable {
                    return Err(Exception::type_error("Assignment to constant variable."));
                }
                slot.value = value;
                return Ok(());
            }
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(Exception::reference_error(format!("{name} is not defined"))),
        }
    }

    /// Names bound directly in this frame, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.slots).keys().cloned().collect();
        names.sort();
        names
    }

    fn find<T>(&self, name: &str, f: impl Fn(&Slot) -> T) -> Option<T> {
        if let Some(slot) = lock(&self.slots).get(name) {
            return Some(f(slot));
        }
        self.parent.as_ref().and_then(|p| p.find(name, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: Exception) -> String {
        err.value.error_parts().map(|(_, m)| m).unwrap_or_default()
    }

    #[test]
    fn declare_and_lookup() {
        let env = Environment::root();
        env.declare("x", Value::from(1.0));
        assert_eq!(env.lookup("x").expect("bound"), Value::from(1.0));
    }

    #[test]
    fn missing_name_is_reference_error() {
        let env = Environment::root();
        let err = env.lookup("nope").expect_err("unbound");
        assert_eq!(message(err), "nope is not defined");
    }

    #[test]
    fn child_sees_and_shadows_parent() {
        let root = Environment::root();
        root.declare("x", Value::from(1.0));
        root.declare("y", Value::from(2.0));
        let inner = Environment::child(&root);
        inner.declare("x", Value::from(10.0));

        assert_eq!(inner.lookup("x").expect("x"), Value::from(10.0));
        assert_eq!(inner.lookup("y").expect("y"), Value::from(2.0));
        assert_eq!(root.lookup("x").expect("x"), Value::from(1.0));
    }

    #[test]
    fn assignment_walks_outward() {
        let root = Environment::root();
        root.declare("x", Value::from(1.0));
        let inner = Environment::child(&root);
        inner.assign("x", Value::from(5.0)).expect("assign");
        assert_eq!(root.lookup("x").expect("x"), Value::from(5.0));
    }

    #[test]
    fn const_rejects_assignment() {
        let env = Environment::root();
        env.declare_const("k", Value::from(1.0));
        let err = env.assign("k", Value::from(2.0)).expect_err("const");
        assert_eq!(message(err), "Assignment to constant variable.");
    }

    #[test]
    fn dead_zone_until_initialized() {
        let env = Environment::root();
        env.declare_uninitialized("x", true);
        let err = env.lookup("x").expect_err("tdz");
        assert_eq!(message(err), "Cannot access 'x' before initialization");

        env.initialize("x", Value::from(3.0), true);
        assert_eq!(env.lookup("x").expect("x"), Value::from(3.0));
        env.assign("x", Value::from(4.0)).expect("still mutable");
    }

    #[test]
    fn var_declaration_keeps_existing_value() {
        let env = Environment::root();
        env.declare("v", Value::from(1.0));
        env.declare_var("v");
        assert_eq!(env.lookup("v").expect("v"), Value::from(1.0));
    }

    #[test]
    fn names_lists_frame_only() {
        let root = Environment::root();
        root.declare("a", Value::Null);
        let inner = Environment::child(&root);
        inner.declare("c", Value::Null);
        inner.declare("b", Value::Null);
        assert_eq!(inner.names(), vec!["b", "c"]);
        assert!(inner.contains("a"));
    }
}
