//! Tail rewriting: capture the value of the last reachable statement.
//!
//! A script like `let x = 1; x + 1` has no explicit `return`, yet its
//! result should be `2`. The rewriter turns the statement in tail position
//! into an assignment to a reserved capture variable and makes the program
//! return that variable:
//!
//! ```text
//! let x = 1;            var __ret;
//! x + 1          ==>    let x = 1;
//!                       __ret = x + 1;
//!                       return __ret;
//! ```
//!
//! Tail position is decided structurally, never by running anything. Loop
//! and `with` bodies count as tail position, so the captured value is the
//! one from the last iteration that ran.
//!
//! The capture variable is declared with `var` so that rewriting an already
//! rewritten program still compiles and yields the same value.

use crate::ast::{Expr, ForEach, ForLoop, Program, Stmt, VarDecl, VarKind};

/// Name of the synthetic capture variable.
pub const CAPTURE_VAR: &str = "__ret";

/// Rewrite a whole program: declare the capture variable, rewrite the last
/// statement, and return the capture variable.
pub fn rewrite_program(program: &Program) -> Program {
    let mut body = Vec::with_capacity(program.body.len() + 2);
    body.push(Stmt::VarDecl(VarDecl::single(VarKind::Var, CAPTURE_VAR, None)));
    body.extend(rewrite_last(&program.body));
    body.push(Stmt::Return(Some(Expr::ident(CAPTURE_VAR))));
    Program { body }
}

/// Rewrite a single statement in tail position.
pub fn rewrite_statement(stmt: &Stmt) -> Stmt {
    match stmt {
        Stmt::Expr(expr) => Stmt::Expr(Expr::assign(Expr::ident(CAPTURE_VAR), expr.clone())),
        Stmt::Block(stmts) => Stmt::Block(rewrite_last(stmts)),
        Stmt::For(l) => Stmt::For(ForLoop {
            body: Box::new(rewrite_statement(&l.body)),
            ..l.clone()
        }),
        Stmt::ForIn(each) => Stmt::ForIn(rewrite_each(each)),
        Stmt::ForOf(each) => Stmt::ForOf(rewrite_each(each)),
        Stmt::While { test, body } => Stmt::While {
            test: test.clone(),
            body: Box::new(rewrite_statement(body)),
        },
        Stmt::DoWhile { body, test } => Stmt::DoWhile {
            body: Box::new(rewrite_statement(body)),
            test: test.clone(),
        },
        Stmt::With { object, body } => Stmt::With {
            object: object.clone(),
            body: Box::new(rewrite_statement(body)),
        },
        Stmt::If {
            test,
            consequent,
            alternate,
        } => Stmt::If {
            test: test.clone(),
            consequent: Box::new(rewrite_statement(consequent)),
            alternate: alternate.as_ref().map(|alt| Box::new(rewrite_statement(alt))),
        },
        other => other.clone(),
    }
}

/// Copy a statement list, rewriting only its last entry.
fn rewrite_last(stmts: &[Stmt]) -> Vec<Stmt> {
    match stmts.split_last() {
        Some((last, init)) => {
            let mut out = init.to_vec();
            out.push(rewrite_statement(last));
            out
        }
        None => Vec::new(),
    }
}

fn rewrite_each(each: &ForEach) -> ForEach {
    ForEach {
        left: each.left.clone(),
        right: each.right.clone(),
        body: Box::new(rewrite_statement(&each.body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn capture(expr: Expr) -> Stmt {
        Stmt::Expr(Expr::assign(Expr::ident(CAPTURE_VAR), expr))
    }

    #[test]
    fn expression_statement_is_captured() {
        let program = parse("x").expect("parse");
        let rewritten = rewrite_program(&program);
        assert_eq!(
            rewritten.body,
            vec![
                Stmt::VarDecl(VarDecl::single(VarKind::Var, CAPTURE_VAR, None)),
                capture(Expr::ident("x")),
                Stmt::Return(Some(Expr::ident(CAPTURE_VAR))),
            ]
        );
    }

    #[test]
    fn only_last_statement_changes() {
        let program = parse("a; b").expect("parse");
        let rewritten = rewrite_program(&program);
        assert_eq!(rewritten.body[1], Stmt::Expr(Expr::ident("a")));
        assert_eq!(rewritten.body[2], capture(Expr::ident("b")));
    }

    #[test]
    fn empty_program_still_returns() {
        let rewritten = rewrite_program(&Program::default());
        assert_eq!(rewritten.body.len(), 2);
    }

    #[test]
    fn empty_block_is_unchanged() {
        assert_eq!(rewrite_statement(&Stmt::Block(vec![])), Stmt::Block(vec![]));
    }

    #[test]
    fn if_without_else_only_rewrites_consequent() {
        let program = parse("if (c) a").expect("parse");
        let Stmt::If { consequent, alternate, .. } = rewrite_statement(&program.body[0]) else {
            panic!("expected if");
        };
        assert_eq!(*consequent, capture(Expr::ident("a")));
        assert!(alternate.is_none());
    }

    #[test]
    fn loop_bodies_are_rewritten() {
        for source in [
            "for (;;) { a }",
            "for (x of xs) { a }",
            "for (k in o) { a }",
            "while (c) { a }",
            "do { a } while (c)",
            "with (o) { a }",
        ] {
            let program = parse(source).expect("parse");
            let rewritten = rewrite_statement(&program.body[0]);
            let body = match &rewritten {
                Stmt::For(l) => &l.body,
                Stmt::ForOf(e) | Stmt::ForIn(e) => &e.body,
                Stmt::While { body, .. }
                | Stmt::DoWhile { body, .. }
                | Stmt::With { body, .. } => body,
                other => panic!("unexpected {other:?}"),
            };
            assert_eq!(**body, Stmt::Block(vec![capture(Expr::ident("a"))]), "{source}");
        }
    }

    #[test]
    fn declarations_and_returns_pass_through() {
        for source in ["let a = 1", "return 1", "throw e", "function f() {}", "try {} catch {}"] {
            let program = parse(source).expect("parse");
            assert_eq!(rewrite_statement(&program.body[0]), program.body[0], "{source}");
        }
    }

    #[test]
    fn rewriting_twice_nests_the_capture() {
        let once = rewrite_program(&parse("1").expect("parse"));
        let twice = rewrite_program(&once);
        // The trailing `return __ret` of the first pass is left alone.
        assert_eq!(twice.body.len(), once.body.len() + 2);
        assert_eq!(twice.body[twice.body.len() - 2], Stmt::Return(Some(Expr::ident(CAPTURE_VAR))));
    }
}
