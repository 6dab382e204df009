//! Integration tests for the jseval REPL.
//!
//! These tests feed lines through [`Repl::process_line`] and check the
//! rendered output.

use std::sync::Arc;

use jseval_kernel::{BindingTable, EvalConfig, StaticDirectory, User};
use jseval_repl::format::OutputContext;
use jseval_repl::Repl;
use rstest::rstest;

fn repl() -> Repl {
    Repl::new()
        .expect("Failed to create REPL")
        .with_output_context(OutputContext::Piped)
}

/// Run each line through one REPL and collect outputs.
fn run_lines(repl: &mut Repl, lines: &[&str]) -> Vec<String> {
    let mut outputs = Vec::new();
    for line in lines {
        match repl.process_line(line) {
            Ok(Some(output)) => outputs.push(output),
            Ok(None) => {}
            Err(e) => outputs.push(format!("ERROR: {}", e)),
        }
    }
    outputs
}

fn eval(line: &str) -> String {
    repl()
        .process_line(line)
        .expect("process_line failed")
        .expect("expected output")
}

// ═══════════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════════

#[rstest]
#[case::arithmetic("1 + 1", "2")]
#[case::declaration_then_read("let x = 1 + 1; x", "2")]
#[case::explicit_return("return 'done'", "'done'")]
#[case::loop_tail("for (let i = 0; i < 3; i++) { i }", "2")]
#[case::array("[1, 2, 3].map(x => x * 2)", "[ 2, 4, 6 ]")]
#[case::object("({ a: 1, b: 'two' })", "{ a: 1, b: 'two' }")]
#[case::top_level_await("await Promise.resolve(add100(1))", "101")]
fn test_results(#[case] line: &str, #[case] expected: &str) {
    assert_eq!(eval(line), expected);
}

#[test]
fn test_no_return_value() {
    assert_eq!(
        eval("if (false) { 1 }"),
        "No return value given. Did you forget to `return`?"
    );
}

#[test]
fn test_syntax_error_heading() {
    let output = eval("(");
    assert!(output.starts_with("✗ Syntax error\nSyntaxError: "), "got: {output}");
}

#[test]
fn test_runtime_error_heading() {
    assert_eq!(
        eval("missing + 1"),
        "✗ Execution failure\nReferenceError: missing is not defined"
    );
}

#[test]
fn test_unknown_user_rejects() {
    assert_eq!(
        eval("await getUser('42')"),
        "✗ Execution failure\nError: Unknown User"
    );
}

#[test]
fn test_lines_are_independent() {
    let mut repl = repl();
    let outputs = run_lines(&mut repl, &["let x = 5; x", "typeof x"]);
    assert_eq!(outputs, vec!["5", "'undefined'"]);
}

#[test]
fn test_custom_bindings() {
    let directory = StaticDirectory::new().with_user(User::new("7", "ada"));
    let bindings = BindingTable::standard(Arc::new(directory));
    let mut repl = Repl::with_config(EvalConfig::repl(), bindings)
        .expect("Failed to create REPL")
        .with_output_context(OutputContext::Piped);
    let output = repl
        .process_line("(await getUser('7')).username")
        .expect("process_line failed");
    assert_eq!(output.as_deref(), Some("'ada'"));
}

// ═══════════════════════════════════════════════════════════════════════════
// Meta commands
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_empty_line() {
    assert!(repl().process_line("   ").expect("process_line failed").is_none());
}

#[rstest]
#[case("/quit")]
#[case("/q")]
#[case("/exit")]
#[case("quit")]
#[case("exit")]
fn test_quit_signals_exit(#[case] line: &str) {
    let err = repl().process_line(line).expect_err("expected exit signal");
    assert_eq!(err.to_string(), "__REPL_EXIT__");
}

#[test]
fn test_help() {
    let output = eval("help");
    assert!(output.contains("/bindings"));
    assert_eq!(output, eval("/help"));
}

#[test]
fn test_bindings_listing() {
    assert_eq!(eval("/bindings"), "Bindings:\n  add100\n  getUser");
}

#[test]
fn test_unknown_meta_command() {
    assert!(eval("/frobnicate").starts_with("Unknown command: /frobnicate"));
}

#[test]
fn test_rewrite_toggle() {
    let mut repl = repl();
    let outputs = run_lines(&mut repl, &["/rewrite", "1 + 1", "/rewrite", "1 + 1"]);
    assert_eq!(
        outputs,
        vec![
            "Formatted code display: ON",
            "── formatted code ──\nvar __ret;\n__ret = 1 + 1;\nreturn __ret;\n2",
            "Formatted code display: OFF",
            "2",
        ]
    );
}

#[test]
fn test_ast_mode() {
    let mut repl = repl();
    let outputs = run_lines(&mut repl, &["/ast", "1 + 1", "/ast"]);
    assert_eq!(outputs[0], "AST mode: ON");
    assert!(outputs[1].contains("Return"), "got: {}", outputs[1]);
    assert_eq!(outputs[2], "AST mode: OFF");
}
