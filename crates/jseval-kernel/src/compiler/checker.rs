//! Strict-mode checks over a parsed unit body.
//!
//! The parser accepts anything grammatical. These checks reject what a
//! strict-mode async function body may not contain, mirroring the errors
//! a JavaScript engine raises when building such a function.

use std::collections::HashSet;

use crate::ast::{
    CatchClause, Expr, ForHead, ForInit, Function, FunctionBody, Program, PropKey, Stmt,
    UnaryOp, VarDecl, VarKind,
};

use super::issue::{CompileIssue, IssueCode};

/// Words that can never name a binding.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "debugger", "default", "delete", "do",
    "else", "enum", "export", "extends", "false", "finally", "for", "function", "if", "import",
    "in", "instanceof", "new", "null", "return", "super", "switch", "this", "throw", "true",
    "try", "typeof", "var", "void", "while", "with",
];

/// Words reserved only in strict code.
const STRICT_RESERVED: &[&str] = &[
    "implements", "interface", "let", "package", "private", "protected", "public", "static",
    "yield",
];

/// Check a name that is about to be bound, returning the issue if it is unusable.
pub fn check_binding_name(name: &str) -> Option<CompileIssue> {
    if RESERVED.contains(&name) || name == "await" {
        return Some(CompileIssue::new(
            IssueCode::ReservedWord,
            format!("Unexpected token '{name}'"),
        ));
    }
    if STRICT_RESERVED.contains(&name) {
        return Some(CompileIssue::new(
            IssueCode::ReservedWord,
            "Unexpected strict mode reserved word",
        ));
    }
    if name == "eval" || name == "arguments" {
        return Some(CompileIssue::new(
            IssueCode::EvalOrArguments,
            "Unexpected eval or arguments in strict mode",
        ));
    }
    None
}

/// One declaration scope.
#[derive(Default)]
struct Frame {
    /// let / const / class-like names, plus block-level functions
    lexical: HashSet<String>,
    /// var names hoisted through (or into) this scope
    vars: HashSet<String>,
    /// parameter names; only set on function frames
    params: HashSet<String>,
    /// function scope boundary for var hoisting
    function: bool,
}

/// Tracks nested scopes for duplicate-declaration detection.
#[derive(Default)]
struct ScopeTracker {
    frames: Vec<Frame>,
}

impl ScopeTracker {
    fn push_block(&mut self) {
        self.frames.push(Frame::default());
    }

    fn push_function(&mut self, params: impl IntoIterator<Item = String>) {
        self.frames.push(Frame {
            params: params.into_iter().collect(),
            function: true,
            ..Frame::default()
        });
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    /// Declare a block-scoped name; false if it clashes.
    fn declare_lexical(&mut self, name: &str) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return true;
        };
        if frame.lexical.contains(name) || frame.vars.contains(name) || frame.params.contains(name)
        {
            return false;
        }
        frame.lexical.insert(name.to_string());
        true
    }

    /// Declare a var-scoped name in every frame up to the function; false if it clashes.
    fn declare_var(&mut self, name: &str) -> bool {
        for frame in self.frames.iter_mut().rev() {
            if frame.lexical.contains(name) {
                return false;
            }
            frame.vars.insert(name.to_string());
            if frame.function {
                break;
            }
        }
        true
    }

    /// Whether the innermost frame is a function frame.
    fn at_function_level(&self) -> bool {
        self.frames.last().is_some_and(|f| f.function)
    }
}

/// Walks a unit body collecting compile issues.
pub struct Checker {
    scope: ScopeTracker,
    /// Loop nesting depth within the current function.
    loop_depth: usize,
    /// Whether the innermost function is async.
    in_async: bool,
    issues: Vec<CompileIssue>,
}

impl Checker {
    /// Create a checker for a unit whose parameters are `params`.
    pub fn new(params: &[String]) -> Self {
        let mut scope = ScopeTracker::default();
        scope.push_function(params.iter().cloned());
        Self {
            scope,
            loop_depth: 0,
            in_async: true,
            issues: Vec::new(),
        }
    }

    /// Check a program as an async function body and return all issues found.
    pub fn check(mut self, program: &Program) -> Vec<CompileIssue> {
        self.check_body(&program.body);
        self.issues
    }

    fn issue(&mut self, code: IssueCode, message: impl Into<String>) {
        self.issues.push(CompileIssue::new(code, message));
    }

    fn already_declared(&mut self, name: &str) {
        self.issue(
            IssueCode::DuplicateDeclaration,
            format!("Identifier '{name}' has already been declared"),
        );
    }

    fn check_name(&mut self, name: &str) {
        if let Some(issue) = check_binding_name(name) {
            self.issues.push(issue);
        }
    }

    /// Statements of a scope whose frame the caller already pushed.
    fn check_body(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.check_stmt(stmt);
        }
    }

    fn check_block(&mut self, stmts: &[Stmt]) {
        self.scope.push_block();
        self.check_body(stmts);
        self.scope.pop();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => self.check_expr(expr),
            Stmt::Block(stmts) => self.check_block(stmts),
            Stmt::Empty | Stmt::Return(None) => {}
            Stmt::VarDecl(decl) => self.check_var_decl(decl),
            Stmt::FunctionDecl(f) => {
                if let Some(name) = &f.name {
                    self.check_name(name);
                    let ok = if self.scope.at_function_level() {
                        self.scope.declare_var(name)
                    } else {
                        self.scope.declare_lexical(name)
                    };
                    if !ok {
                        self.already_declared(name);
                    }
                }
                self.check_function(f);
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.check_expr(test);
                self.check_stmt(consequent);
                if let Some(alt) = alternate {
                    self.check_stmt(alt);
                }
            }
            Stmt::For(l) => {
                self.scope.push_block();
                match &l.init {
                    Some(ForInit::VarDecl(decl)) => self.check_var_decl(decl),
                    Some(ForInit::Expr(expr)) => self.check_expr(expr),
                    None => {}
                }
                if let Some(test) = &l.test {
                    self.check_expr(test);
                }
                if let Some(update) = &l.update {
                    self.check_expr(update);
                }
                self.check_loop_body(&l.body);
                self.scope.pop();
            }
            Stmt::ForIn(each) | Stmt::ForOf(each) => {
                self.check_expr(&each.right);
                self.scope.push_block();
                match &each.left {
                    ForHead::Decl(kind, name) => self.declare(*kind, name),
                    ForHead::Target(target) => self.check_assign_target(target),
                }
                self.check_loop_body(&each.body);
                self.scope.pop();
            }
            Stmt::While { test, body } | Stmt::DoWhile { body, test } => {
                self.check_expr(test);
                self.check_loop_body(body);
            }
            Stmt::With { object, body } => {
                self.issue(
                    IssueCode::WithStatement,
                    "Strict mode code may not include a with statement",
                );
                self.check_expr(object);
                self.check_stmt(body);
            }
            Stmt::Return(Some(expr)) | Stmt::Throw(expr) => self.check_expr(expr),
            Stmt::Try(t) => {
                self.check_block(&t.block);
                if let Some(CatchClause { param, body }) = &t.handler {
                    self.scope.push_block();
                    if let Some(param) = param {
                        self.check_name(param);
                        self.scope.declare_lexical(param);
                    }
                    self.check_block(body);
                    self.scope.pop();
                }
                if let Some(finalizer) = &t.finalizer {
                    self.check_block(finalizer);
                }
            }
            Stmt::Break => {
                if self.loop_depth == 0 {
                    self.issue(IssueCode::BreakOutsideLoop, "Illegal break statement");
                }
            }
            Stmt::Continue => {
                if self.loop_depth == 0 {
                    self.issue(
                        IssueCode::BreakOutsideLoop,
                        "Illegal continue statement: no surrounding iteration statement",
                    );
                }
            }
        }
    }

    fn check_loop_body(&mut self, body: &Stmt) {
        self.loop_depth += 1;
        self.check_stmt(body);
        self.loop_depth -= 1;
    }

    fn check_var_decl(&mut self, decl: &VarDecl) {
        for d in &decl.declarations {
            if let Some(init) = &d.init {
                self.check_expr(init);
            } else if decl.kind == VarKind::Const {
                self.issue(
                    IssueCode::MissingConstInitializer,
                    "Missing initializer in const declaration",
                );
            }
            self.declare(decl.kind, &d.name);
        }
    }

    fn declare(&mut self, kind: VarKind, name: &str) {
        self.check_name(name);
        let ok = if kind.is_lexical() {
            self.scope.declare_lexical(name)
        } else {
            self.scope.declare_var(name)
        };
        if !ok {
            self.already_declared(name);
        }
    }

    fn check_function(&mut self, f: &Function) {
        let mut seen = HashSet::new();
        for p in &f.params {
            self.check_name(&p.name);
            if !seen.insert(p.name.as_str()) {
                self.issue(
                    IssueCode::DuplicateParameter,
                    "Duplicate parameter name not allowed in this context",
                );
            }
        }

        let saved_loop = std::mem::replace(&mut self.loop_depth, 0);
        let saved_async = std::mem::replace(&mut self.in_async, f.is_async);

        self.scope.push_function(f.params.iter().map(|p| p.name.clone()));
        for p in &f.params {
            if let Some(default) = &p.default {
                self.check_expr(default);
            }
        }
        match &f.body {
            FunctionBody::Block(stmts) => self.check_body(stmts),
            FunctionBody::Expr(expr) => self.check_expr(expr),
        }
        self.scope.pop();

        self.loop_depth = saved_loop;
        self.in_async = saved_async;
    }

    fn check_assign_target(&mut self, target: &Expr) {
        match target {
            Expr::Ident(name) if name == "eval" || name == "arguments" => self.issue(
                IssueCode::EvalOrArguments,
                "Unexpected eval or arguments in strict mode",
            ),
            other => self.check_expr(other),
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(_) | Expr::String(_) | Expr::Bool(_) | Expr::Null | Expr::Ident(_) => {}
            Expr::Template { exprs, .. } | Expr::Array(exprs) | Expr::Sequence(exprs) => {
                for e in exprs {
                    self.check_expr(e);
                }
            }
            Expr::Object(props) => {
                for prop in props {
                    if let PropKey::Computed(key) = &prop.key {
                        self.check_expr(key);
                    }
                    self.check_expr(&prop.value);
                }
            }
            Expr::Function(f) => self.check_function(f),
            Expr::Unary { op, arg } => {
                if *op == UnaryOp::Delete && matches!(**arg, Expr::Ident(_)) {
                    self.issue(
                        IssueCode::DeleteIdentifier,
                        "Delete of an unqualified identifier in strict mode.",
                    );
                }
                self.check_expr(arg);
            }
            Expr::Update { prefix, target, .. } => {
                if !target.is_assignment_target() {
                    let kind = if *prefix { "prefix" } else { "postfix" };
                    self.issue(
                        IssueCode::InvalidUpdateTarget,
                        format!("Invalid left-hand side expression in {kind} operation"),
                    );
                }
                self.check_assign_target(target);
            }
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.check_expr(test);
                self.check_expr(consequent);
                self.check_expr(alternate);
            }
            Expr::Assign { target, value, .. } => {
                self.check_assign_target(target);
                self.check_expr(value);
            }
            Expr::Call { callee, args } | Expr::New { callee, args } => {
                self.check_expr(callee);
                for a in args {
                    self.check_expr(a);
                }
            }
            Expr::Member { object, .. } => self.check_expr(object),
            Expr::Index { object, index } => {
                self.check_expr(object);
                self.check_expr(index);
            }
            Expr::Await(arg) => {
                if !self.in_async {
                    self.issue(
                        IssueCode::AwaitOutsideAsync,
                        "await is only valid in async functions and the top level bodies of modules",
                    );
                }
                self.check_expr(arg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn issues(source: &str, params: &[&str]) -> Vec<CompileIssue> {
        let program = parse(source).expect("parse");
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        Checker::new(&params).check(&program)
    }

    fn codes(source: &str) -> Vec<IssueCode> {
        issues(source, &[]).into_iter().map(|i| i.code).collect()
    }

    #[test]
    fn clean_program_has_no_issues() {
        assert!(codes("let x = 1; const y = 2; var z; function f() { return x }").is_empty());
        assert!(codes("for (let i = 0; i < 3; i++) { let i = 1 }").is_empty());
        assert!(codes("{ let a } { let a }").is_empty());
        assert!(codes("var a; var a").is_empty());
    }

    #[test]
    fn duplicate_lexical_declarations() {
        assert_eq!(codes("let x; let x"), vec![IssueCode::DuplicateDeclaration]);
        assert_eq!(codes("let x; var x"), vec![IssueCode::DuplicateDeclaration]);
        assert_eq!(codes("var x; const x = 1"), vec![IssueCode::DuplicateDeclaration]);
        assert_eq!(codes("let x; { var x }"), vec![IssueCode::DuplicateDeclaration]);
        let found = issues("let x; let x", &[]);
        assert_eq!(found[0].message, "Identifier 'x' has already been declared");
    }

    #[test]
    fn lexical_clashes_with_parameters() {
        let found = issues("let client = 1", &["client"]);
        assert_eq!(found[0].code, IssueCode::DuplicateDeclaration);
        assert!(issues("var client = 1", &["client"]).is_empty());
    }

    #[test]
    fn with_is_rejected() {
        assert_eq!(codes("with (o) x"), vec![IssueCode::WithStatement]);
    }

    #[test]
    fn const_requires_initializer() {
        assert_eq!(codes("const x"), vec![IssueCode::MissingConstInitializer]);
        assert!(codes("for (const x of xs) x").is_empty());
    }

    #[test]
    fn break_and_continue_need_a_loop() {
        assert_eq!(codes("break"), vec![IssueCode::BreakOutsideLoop]);
        assert_eq!(codes("while (1) { if (x) break; continue }"), vec![]);
        assert_eq!(
            codes("while (1) { (() => { break })() }"),
            vec![IssueCode::BreakOutsideLoop]
        );
    }

    #[test]
    fn await_needs_async_function() {
        assert!(codes("await f(); (async () => await g())()").is_empty());
        assert_eq!(codes("function f() { await g() }"), vec![IssueCode::AwaitOutsideAsync]);
    }

    #[test]
    fn strict_mode_name_rules() {
        assert_eq!(codes("delete x"), vec![IssueCode::DeleteIdentifier]);
        assert!(codes("delete o.x").is_empty());
        assert_eq!(codes("eval = 1"), vec![IssueCode::EvalOrArguments]);
        assert_eq!(codes("let static = 1"), vec![IssueCode::ReservedWord]);
        assert_eq!(codes("let yield = 1"), vec![IssueCode::ReservedWord]);
    }

    #[test]
    fn nested_functions_reject_duplicate_parameters() {
        assert_eq!(codes("function f(a, a) {}"), vec![IssueCode::DuplicateParameter]);
        assert_eq!(codes("const g = (x, y, x) => x"), vec![IssueCode::DuplicateParameter]);
        let found = issues("(async function (a, a) {})", &[]);
        assert_eq!(found[0].message, "Duplicate parameter name not allowed in this context");
        assert!(codes("function f(a, b) {}").is_empty());
    }

    #[test]
    fn update_target_must_be_assignable() {
        assert_eq!(codes("++f()"), vec![IssueCode::InvalidUpdateTarget]);
        assert!(codes("x++; o.y--").is_empty());
    }
}
