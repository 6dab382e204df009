//! Compile issues and their codes.

use std::fmt;

/// Categorizes compile issues for filtering and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueCode {
    /// The rewritten source failed to parse again.
    Unparseable,
    /// A binding name is not a usable parameter name.
    InvalidBindingName,
    /// `with` is not allowed in strict code.
    WithStatement,
    /// A lexical name declared twice, or clashing with a var or parameter.
    DuplicateDeclaration,
    /// `const` without an initializer.
    MissingConstInitializer,
    /// break/continue outside of a loop.
    BreakOutsideLoop,
    /// `await` in a function that is not async.
    AwaitOutsideAsync,
    /// `delete` applied to a plain identifier.
    DeleteIdentifier,
    /// Binding or assigning `eval` / `arguments`.
    EvalOrArguments,
    /// Reserved word used as a name.
    ReservedWord,
    /// `++`/`--` applied to something that cannot be assigned.
    InvalidUpdateTarget,
    /// A nested function names the same parameter twice.
    DuplicateParameter,
}

impl IssueCode {
    /// Returns a short code string for the issue.
    pub fn code(&self) -> &'static str {
        match self {
            IssueCode::Unparseable => "C001",
            IssueCode::InvalidBindingName => "C002",
            IssueCode::WithStatement => "C003",
            IssueCode::DuplicateDeclaration => "C004",
            IssueCode::MissingConstInitializer => "C005",
            IssueCode::BreakOutsideLoop => "C006",
            IssueCode::AwaitOutsideAsync => "C007",
            IssueCode::DeleteIdentifier => "C008",
            IssueCode::EvalOrArguments => "C009",
            IssueCode::ReservedWord => "C010",
            IssueCode::InvalidUpdateTarget => "C011",
            IssueCode::DuplicateParameter => "C012",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A problem that stops the unit from being built.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileIssue {
    pub code: IssueCode,
    pub message: String,
}

impl CompileIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_display_includes_code() {
        let issue = CompileIssue::new(IssueCode::WithStatement, "no with");
        assert_eq!(issue.to_string(), "[C003] no with");
    }
}
