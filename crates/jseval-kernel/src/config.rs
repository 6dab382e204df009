//! Evaluator configuration.

use crate::interpreter::{InspectOptions, InterpreterOptions};

/// Configuration for an [`Evaluator`](crate::Evaluator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    /// Name of this evaluator (for identification in logs).
    pub name: String,

    /// Whether `<@123>` mention placeholders are rewritten into
    /// `getUser` calls before parsing.
    pub substitute_mentions: bool,

    /// Nesting depth shown when inspecting results.
    pub inspect_depth: usize,

    /// Width under which inspected containers stay on one line.
    pub break_length: usize,

    /// Nested calls beyond this throw `RangeError: Maximum call stack size exceeded`.
    pub max_call_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            substitute_mentions: true,
            inspect_depth: 2,
            break_length: 80,
            max_call_depth: 64,
        }
    }
}

impl EvalConfig {
    /// Create a config with the given name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Create a config for interactive use.
    ///
    /// Mentions are left alone since a terminal has no chat users, and
    /// results are inspected one level deeper.
    pub fn repl() -> Self {
        Self {
            name: "repl".to_string(),
            substitute_mentions: false,
            inspect_depth: 3,
            ..Self::default()
        }
    }

    /// Enable or disable mention substitution.
    pub fn with_substitute_mentions(mut self, enabled: bool) -> Self {
        self.substitute_mentions = enabled;
        self
    }

    /// Set the inspection depth for results.
    pub fn with_inspect_depth(mut self, depth: usize) -> Self {
        self.inspect_depth = depth;
        self
    }

    /// Set the single-line width limit for results.
    pub fn with_break_length(mut self, width: usize) -> Self {
        self.break_length = width;
        self
    }

    /// Set the recursion limit.
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn inspect_options(&self) -> InspectOptions {
        InspectOptions {
            depth: self.inspect_depth,
            break_length: self.break_length,
        }
    }

    pub fn interpreter_options(&self) -> InterpreterOptions {
        InterpreterOptions {
            max_call_depth: self.max_call_depth,
            inspect: self.inspect_options(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EvalConfig::default();
        assert_eq!(config.name, "default");
        assert!(config.substitute_mentions);
        assert_eq!(config.inspect_options(), InspectOptions::default());
        assert_eq!(config.interpreter_options(), InterpreterOptions::default());
    }

    #[test]
    fn builders_compose() {
        let config = EvalConfig::named("bot")
            .with_substitute_mentions(false)
            .with_max_call_depth(8)
            .with_break_length(40);
        assert_eq!(config.name, "bot");
        assert!(!config.substitute_mentions);
        assert_eq!(config.interpreter_options().max_call_depth, 8);
        assert_eq!(config.inspect_options().break_length, 40);
    }

    #[test]
    fn repl_config() {
        let config = EvalConfig::repl();
        assert_eq!(config.name, "repl");
        assert!(!config.substitute_mentions);
    }
}
