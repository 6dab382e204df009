//! Parser tests: accepted syntax and positioned syntax errors.

use jseval_kernel::ast::{Expr, Stmt, VarKind};
use jseval_kernel::parser::{parse_expression, parse_program};
use rstest::rstest;

#[rstest]
#[case("1 + 1")]
#[case("let a = 1, b; const c = a")]
#[case("function f(a, b = 2) { return a + b }")]
#[case("async function f() { await g() }")]
#[case("const f = async x => ({ x })")]
#[case("for (;;) { break }")]
#[case("for (const x of xs) x")]
#[case("for (k in o) {}")]
#[case("do x++; while (x < 3)")]
#[case("kind = typeof x === 'string'")]
#[case("try {} catch {} finally {}")]
#[case("`a ${b} c`")]
#[case("await getUser(1); return")]
#[case("xs\n  .map(x => x * 2)\n  .length")]
#[case("try {\n  a()\n}\ncatch (e) {\n  e\n}\nfinally {\n}")]
#[case("do {\n  x++\n}\nwhile (x < 3)\nx")]
#[case("const o = {\n  a: 1,\n  b\n}\no.a")]
fn accepted(#[case] source: &str) {
    if let Err(err) = parse_program(source) {
        panic!("{source}: {err}");
    }
}

#[test]
fn statements_without_semicolons() {
    let program = parse_program("let x = 1\nx + 1\n").expect("parse");
    assert_eq!(program.body.len(), 2);
    assert!(matches!(&program.body[0], Stmt::VarDecl(d) if d.kind == VarKind::Let));
    assert!(matches!(&program.body[1], Stmt::Expr(Expr::Binary { .. })));
}

#[test]
fn parenthesized_object_is_an_expression() {
    let program = parse_program("({ a: 1 })").expect("parse");
    assert!(matches!(&program.body[0], Stmt::Expr(Expr::Object(_))));
}

#[test]
fn expression_entry_point() {
    let expr = parse_expression("a, b").expect("parse");
    assert!(matches!(expr, Expr::Sequence(items) if items.len() == 2));
    assert!(parse_expression("let a = 1").is_err());
}

#[rstest]
#[case::unclosed_paren("(", 1)]
#[case::second_line("let x = 1;\nx +* 2", 2)]
#[case::third_line("1\n2\n)", 3)]
fn syntax_error_lines(#[case] source: &str, #[case] line: usize) {
    let err = parse_program(source).expect_err("should fail");
    assert_eq!(err.line, line, "{err}");
    assert_eq!(
        err.to_string(),
        format!("SyntaxError: {} ({}:{})", err.message, err.line, err.column)
    );
}

#[test]
fn syntax_error_column_counts_characters() {
    let err = parse_program("'é' +").expect_err("should fail");
    assert_eq!(err.line, 1);
    assert_eq!(err.column, 5);
    assert_eq!(err.offset, 6);
}
