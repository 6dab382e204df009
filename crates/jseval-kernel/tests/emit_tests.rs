//! Snapshot tests for the rewritten source the compiler receives.

use jseval_kernel::emit::emit_program;
use jseval_kernel::parser::parse_program;
use jseval_kernel::rewrite::rewrite_program;

fn rewritten(source: &str) -> String {
    let program = parse_program(source).expect("parse");
    emit_program(&rewrite_program(&program))
}

#[test]
fn tail_expression() {
    insta::assert_snapshot!(rewritten("let x = 1; x + 1"), @r"
    var __ret;
    let x = 1;
    __ret = x + 1;
    return __ret;
    ");
}

#[test]
fn loop_body_captures() {
    insta::assert_snapshot!(rewritten("for (let i = 0; i < 3; i++) { i }"), @r"
    var __ret;
    for (let i = 0; i < 3; i++) {
      __ret = i;
    }
    return __ret;
    ");
}

#[test]
fn both_branches_capture() {
    insta::assert_snapshot!(rewritten("if (a) { 1 } else { 2 }"), @r"
    var __ret;
    if (a) {
      __ret = 1;
    } else {
      __ret = 2;
    }
    return __ret;
    ");
}

#[test]
fn declaration_tail_is_left_alone() {
    insta::assert_snapshot!(rewritten("const f = async (id) => await getUser(id)"), @r"
    var __ret;
    const f = async (id) => await getUser(id);
    return __ret;
    ");
}

#[test]
fn explicit_return_is_kept() {
    insta::assert_snapshot!(rewritten("return [1, 2]"), @r"
    var __ret;
    return [1, 2];
    return __ret;
    ");
}

#[test]
fn object_literal_tail() {
    insta::assert_snapshot!(rewritten("({ a: 1, 'b c': [x, y] })"), @r#"
    var __ret;
    __ret = {
      a: 1,
      "b c": [x, y]
    };
    return __ret;
    "#);
}

#[test]
fn precedence_survives_printing() {
    insta::assert_snapshot!(rewritten("(a + b) * c - -d"), @r"
    var __ret;
    __ret = (a + b) * c - -d;
    return __ret;
    ");
}

#[test]
fn empty_program() {
    insta::assert_snapshot!(rewritten(""), @r"
    var __ret;
    return __ret;
    ");
}

#[test]
fn printed_source_parses_back_to_the_same_tree() {
    for source in [
        "let x = 1; x + 1",
        "for (const k in o) { if (k === 'a') continue; k }",
        "try { risky() } catch (e) { e.message } finally { done = true }",
        "const s = `a${b}c`; s.length",
        "new (f())(1)",
        "a ? b : c ? d : e",
        "(2 ** 3) ** 2",
        "async function go() { return await x }",
    ] {
        let program = rewrite_program(&parse_program(source).expect("parse"));
        let printed = emit_program(&program);
        let reparsed = parse_program(&printed).expect("reparse");
        assert_eq!(reparsed, program, "{source}\n{printed}");
    }
}
