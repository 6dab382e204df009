//! Source emitter: AST back to script text.
//!
//! The compiler consumes text, so a rewritten tree has to be printed before
//! it can run. Layout follows the familiar astring conventions: one statement
//! per line, two-space indentation, object literals one property per line.
//! Parentheses are inserted from operator precedence alone, since the tree
//! does not remember the ones the user wrote.
//!
//! Printing then parsing gives back an equal tree for everything the parser
//! produces.

use crate::ast::{
    BinaryOp, CatchClause, Expr, ForHead, ForInit, Function, FunctionBody, LogicalOp, Param,
    Program, PropKey, Stmt, UnaryOp, VarDecl,
};
use crate::interpreter::number_to_string;

const INDENT: &str = "  ";

/// Print a whole program, one top-level statement per line.
pub fn emit_program(program: &Program) -> String {
    let mut emitter = Emitter::default();
    for stmt in &program.body {
        emitter.stmt(stmt);
        emitter.out.push('\n');
    }
    emitter.out
}

/// Print a single statement at indentation level zero.
pub fn emit_stmt(stmt: &Stmt) -> String {
    let mut emitter = Emitter::default();
    emitter.stmt(stmt);
    emitter.out
}

/// Print a single expression.
pub fn emit_expr(expr: &Expr) -> String {
    let mut emitter = Emitter::default();
    emitter.expr(expr, 0);
    emitter.out
}

// Precedence levels, loosest first.
const SEQUENCE: u8 = 1;
const ASSIGN: u8 = 2;
const CONDITIONAL: u8 = 3;
const LOGICAL_OR: u8 = 4;
const LOGICAL_AND: u8 = 5;
const EXPONENT: u8 = 14;
const UNARY: u8 = 15;
const POSTFIX: u8 = 16;
const MEMBER: u8 = 17;
const PRIMARY: u8 = 18;

fn binary_precedence(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::BitOr => 6,
        BinaryOp::BitXor => 7,
        BinaryOp::BitAnd => 8,
        BinaryOp::Eq | BinaryOp::NotEq | BinaryOp::StrictEq | BinaryOp::StrictNotEq => 9,
        BinaryOp::Lt
        | BinaryOp::LtEq
        | BinaryOp::Gt
        | BinaryOp::GtEq
        | BinaryOp::In
        | BinaryOp::Instanceof => 10,
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => 11,
        BinaryOp::Add | BinaryOp::Sub => 12,
        BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 13,
        BinaryOp::Exp => EXPONENT,
    }
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Sequence(_) => SEQUENCE,
        Expr::Assign { .. } => ASSIGN,
        Expr::Function(f) if f.is_arrow => ASSIGN,
        Expr::Conditional { .. } => CONDITIONAL,
        Expr::Logical {
            op: LogicalOp::And, ..
        } => LOGICAL_AND,
        Expr::Logical { .. } => LOGICAL_OR,
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::Unary { .. } | Expr::Await(_) => UNARY,
        Expr::Update { prefix: true, .. } => UNARY,
        Expr::Update { prefix: false, .. } => POSTFIX,
        Expr::Call { .. } | Expr::New { .. } | Expr::Member { .. } | Expr::Index { .. } => MEMBER,
        _ => PRIMARY,
    }
}

/// The expression printed first when `expr` is printed without parentheses.
fn leftmost(expr: &Expr) -> &Expr {
    match expr {
        Expr::Binary { left, .. } | Expr::Logical { left, .. } => leftmost(left),
        Expr::Assign { target, .. } => leftmost(target),
        Expr::Conditional { test, .. } => leftmost(test),
        Expr::Call { callee, .. } => leftmost(callee),
        Expr::Member { object, .. } | Expr::Index { object, .. } => leftmost(object),
        Expr::Update {
            prefix: false,
            target,
            ..
        } => leftmost(target),
        Expr::Sequence(exprs) => exprs.first().map(leftmost).unwrap_or(expr),
        _ => expr,
    }
}

/// Whether `new` needs parentheses around this callee to keep its calls inside.
fn contains_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } | Expr::New { .. } => true,
        Expr::Member { object, .. } | Expr::Index { object, .. } => contains_call(object),
        _ => false,
    }
}

/// Double-quoted string literal.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\u{:04x}", ch as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_quasi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '\r' => out.push_str("\\r"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out
}

fn number_literal(n: f64) -> String {
    if n.is_infinite() {
        // Overflows back to Infinity when parsed.
        "1e+400".to_string()
    } else {
        number_to_string(n)
    }
}

#[derive(Default)]
struct Emitter {
    out: String,
    indent: usize,
}

impl Emitter {
    fn push(&mut self, s: &str) {
        self.out.push_str(s);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => {
                let head = leftmost(expr);
                let needs_parens = matches!(head, Expr::Object(_))
                    || matches!(head, Expr::Function(f) if !f.is_arrow);
                if needs_parens {
                    self.push("(");
                    self.expr(expr, 0);
                    self.push(")");
                } else {
                    self.expr(expr, 0);
                }
                self.push(";");
            }
            Stmt::Block(stmts) => self.block(stmts),
            Stmt::Empty => self.push(";"),
            Stmt::VarDecl(decl) => {
                self.var_decl(decl);
                self.push(";");
            }
            Stmt::FunctionDecl(f) => self.function(f),
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                self.push("if (");
                self.expr(test, 0);
                self.push(")");
                // An else-less inner `if` would otherwise capture our `else`.
                let dangling =
                    alternate.is_some() && matches!(**consequent, Stmt::If { alternate: None, .. });
                if dangling {
                    self.push(" ");
                    self.block(std::slice::from_ref(&**consequent));
                } else {
                    self.body(consequent);
                }
                if let Some(alt) = alternate {
                    self.push(" else ");
                    self.stmt(alt);
                }
            }
            Stmt::For(l) => {
                self.push("for (");
                match &l.init {
                    Some(ForInit::VarDecl(decl)) => self.var_decl(decl),
                    Some(ForInit::Expr(expr)) => self.expr(expr, 0),
                    None => {}
                }
                self.push(";");
                if let Some(test) = &l.test {
                    self.push(" ");
                    self.expr(test, 0);
                }
                self.push(";");
                if let Some(update) = &l.update {
                    self.push(" ");
                    self.expr(update, 0);
                }
                self.push(")");
                self.body(&l.body);
            }
            Stmt::ForIn(each) | Stmt::ForOf(each) => {
                self.push("for (");
                match &each.left {
                    ForHead::Decl(kind, name) => self.push(&format!("{kind} {name}")),
                    ForHead::Target(target) => self.expr(target, MEMBER),
                }
                self.push(if matches!(stmt, Stmt::ForIn(_)) { " in " } else { " of " });
                self.expr(&each.right, 0);
                self.push(")");
                self.body(&each.body);
            }
            Stmt::While { test, body } => {
                self.push("while (");
                self.expr(test, 0);
                self.push(")");
                self.body(body);
            }
            Stmt::DoWhile { body, test } => {
                self.push("do");
                self.body(body);
                self.push(" while (");
                self.expr(test, 0);
                self.push(");");
            }
            Stmt::With { object, body } => {
                self.push("with (");
                self.expr(object, 0);
                self.push(")");
                self.body(body);
            }
            Stmt::Return(arg) => {
                self.push("return");
                if let Some(arg) = arg {
                    self.push(" ");
                    self.expr(arg, 0);
                }
                self.push(";");
            }
            Stmt::Throw(arg) => {
                self.push("throw ");
                self.expr(arg, 0);
                self.push(";");
            }
            Stmt::Try(t) => {
                self.push("try ");
                self.block(&t.block);
                if let Some(CatchClause { param, body }) = &t.handler {
                    self.push(" catch ");
                    if let Some(param) = param {
                        self.push(&format!("({param}) "));
                    }
                    self.block(body);
                }
                if let Some(finalizer) = &t.finalizer {
                    self.push(" finally ");
                    self.block(finalizer);
                }
            }
            Stmt::Break => self.push("break;"),
            Stmt::Continue => self.push("continue;"),
        }
    }

    /// Body of a compound statement: blocks open on the same line.
    fn body(&mut self, body: &Stmt) {
        self.push(" ");
        self.stmt(body);
    }

    fn block(&mut self, stmts: &[Stmt]) {
        if stmts.is_empty() {
            self.push("{}");
            return;
        }
        self.push("{");
        self.indent += 1;
        for stmt in stmts {
            self.newline();
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.newline();
        self.push("}");
    }

    fn var_decl(&mut self, decl: &VarDecl) {
        self.push(&format!("{} ", decl.kind));
        for (i, d) in decl.declarations.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&d.name);
            if let Some(init) = &d.init {
                self.push(" = ");
                self.expr(init, ASSIGN);
            }
        }
    }

    fn params(&mut self, params: &[Param]) {
        self.push("(");
        for (i, p) in params.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push(&p.name);
            if let Some(default) = &p.default {
                self.push(" = ");
                self.expr(default, ASSIGN);
            }
        }
        self.push(")");
    }

    fn function(&mut self, f: &Function) {
        if f.is_async {
            self.push("async ");
        }
        if f.is_arrow {
            self.params(&f.params);
            self.push(" => ");
            match &f.body {
                FunctionBody::Block(stmts) => self.block(stmts),
                FunctionBody::Expr(expr) => {
                    if matches!(leftmost(expr), Expr::Object(_)) {
                        self.push("(");
                        self.expr(expr, 0);
                        self.push(")");
                    } else {
                        self.expr(expr, ASSIGN);
                    }
                }
            }
            return;
        }
        self.push("function ");
        if let Some(name) = &f.name {
            self.push(name);
        }
        self.params(&f.params);
        self.push(" ");
        match &f.body {
            FunctionBody::Block(stmts) => self.block(stmts),
            FunctionBody::Expr(expr) => {
                // Only arrows have concise bodies; print the equivalent block.
                self.block(&[Stmt::Return(Some((**expr).clone()))]);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Expressions
    // ═══════════════════════════════════════════════════════════════════

    /// Print `expr`, parenthesized when it binds looser than `min`.
    fn expr(&mut self, expr: &Expr, min: u8) {
        if precedence(expr) < min {
            self.push("(");
            self.expr_inner(expr);
            self.push(")");
        } else {
            self.expr_inner(expr);
        }
    }

    fn list(&mut self, items: &[Expr]) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(item, ASSIGN);
        }
    }

    fn expr_inner(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(n) => self.push(&number_literal(*n)),
            Expr::String(s) => self.push(&quote_string(s)),
            Expr::Bool(b) => self.push(if *b { "true" } else { "false" }),
            Expr::Null => self.push("null"),
            Expr::Template { quasis, exprs } => {
                self.push("`");
                for (i, quasi) in quasis.iter().enumerate() {
                    self.push(&escape_quasi(quasi));
                    if let Some(e) = exprs.get(i) {
                        self.push("${");
                        self.expr(e, 0);
                        self.push("}");
                    }
                }
                self.push("`");
            }
            Expr::Ident(name) => self.push(name),
            Expr::Array(items) => {
                self.push("[");
                self.list(items);
                self.push("]");
            }
            Expr::Object(props) => {
                if props.is_empty() {
                    self.push("{}");
                    return;
                }
                self.push("{");
                self.indent += 1;
                for (i, prop) in props.iter().enumerate() {
                    self.newline();
                    match &prop.key {
                        PropKey::Ident(name) if prop.shorthand => {
                            self.push(name);
                        }
                        key => {
                            match key {
                                PropKey::Ident(name) => self.push(name),
                                PropKey::String(s) => self.push(&quote_string(s)),
                                PropKey::Number(n) => self.push(&number_literal(*n)),
                                PropKey::Computed(e) => {
                                    self.push("[");
                                    self.expr(e, ASSIGN);
                                    self.push("]");
                                }
                            }
                            self.push(": ");
                            self.expr(&prop.value, ASSIGN);
                        }
                    }
                    if i + 1 < props.len() {
                        self.push(",");
                    }
                }
                self.indent -= 1;
                self.newline();
                self.push("}");
            }
            Expr::Function(f) => self.function(f),
            Expr::Unary { op, arg } => {
                let op_text = op.to_string();
                self.push(&op_text);
                let mut inner = Emitter {
                    out: String::new(),
                    indent: self.indent,
                };
                inner.expr(arg, UNARY);
                let word = matches!(op, UnaryOp::Typeof | UnaryOp::Void | UnaryOp::Delete);
                // `- -x` must not collapse into `--x`.
                let collides = inner
                    .out
                    .chars()
                    .next()
                    .is_some_and(|c| op_text.ends_with(c) && matches!(c, '+' | '-'));
                if word || collides {
                    self.push(" ");
                }
                self.push(&inner.out);
            }
            Expr::Update { op, prefix, target } => {
                if *prefix {
                    self.push(&op.to_string());
                    self.expr(target, UNARY);
                } else {
                    self.expr(target, MEMBER);
                    self.push(&op.to_string());
                }
            }
            Expr::Binary { op, left, right } => {
                let prec = binary_precedence(*op);
                if *op == BinaryOp::Exp {
                    // Right-associative; unary operands on the left need parentheses.
                    self.expr(left, POSTFIX);
                    self.push(" ** ");
                    self.expr(right, prec);
                } else {
                    self.expr(left, prec);
                    self.push(&format!(" {op} "));
                    self.expr(right, prec + 1);
                }
            }
            Expr::Logical { op, left, right } => {
                let prec = precedence(expr);
                self.expr(left, prec);
                self.push(&format!(" {op} "));
                self.expr(right, prec + 1);
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                self.expr(test, LOGICAL_OR);
                self.push(" ? ");
                self.expr(consequent, ASSIGN);
                self.push(" : ");
                self.expr(alternate, ASSIGN);
            }
            Expr::Assign { op, target, value } => {
                self.expr(target, MEMBER);
                self.push(&format!(" {op} "));
                self.expr(value, ASSIGN);
            }
            Expr::Call { callee, args } => {
                self.expr(callee, MEMBER);
                self.push("(");
                self.list(args);
                self.push(")");
            }
            Expr::New { callee, args } => {
                self.push("new ");
                if contains_call(callee) || precedence(callee) < MEMBER {
                    self.push("(");
                    self.expr(callee, 0);
                    self.push(")");
                } else {
                    self.expr(callee, MEMBER);
                }
                self.push("(");
                self.list(args);
                self.push(")");
            }
            Expr::Member { object, property } => {
                self.member_object(object);
                self.push(".");
                self.push(property);
            }
            Expr::Index { object, index } => {
                self.member_object(object);
                self.push("[");
                self.expr(index, 0);
                self.push("]");
            }
            Expr::Sequence(exprs) => {
                for (i, e) in exprs.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(e, ASSIGN);
                }
            }
            Expr::Await(arg) => {
                self.push("await ");
                self.expr(arg, UNARY);
            }
        }
    }

    fn member_object(&mut self, object: &Expr) {
        // `1.toString` would lex as a number followed by an identifier.
        if matches!(object, Expr::Number(_)) {
            self.push("(");
            self.expr_inner(object);
            self.push(")");
        } else {
            self.expr(object, MEMBER);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, parse_expression};

    fn roundtrip_expr(source: &str) -> String {
        emit_expr(&parse_expression(source).expect("parse"))
    }

    #[test]
    fn parenthesizes_by_precedence() {
        assert_eq!(roundtrip_expr("(1 + 2) * 3"), "(1 + 2) * 3");
        assert_eq!(roundtrip_expr("1 + 2 * 3"), "1 + 2 * 3");
        assert_eq!(roundtrip_expr("a - (b - c)"), "a - (b - c)");
        assert_eq!(roundtrip_expr("(a - b) - c"), "a - b - c");
        assert_eq!(roundtrip_expr("(-a) ** 2"), "(-a) ** 2");
        assert_eq!(roundtrip_expr("(a, b)"), "a, b");
        assert_eq!(roundtrip_expr("f((a, b))"), "f((a, b))");
    }

    #[test]
    fn unary_operators_do_not_merge() {
        assert_eq!(roundtrip_expr("-(-x)"), "- -x");
        assert_eq!(roundtrip_expr("typeof x"), "typeof x");
        assert_eq!(roundtrip_expr("!(a && b)"), "!(a && b)");
    }

    #[test]
    fn member_access_on_numbers() {
        assert_eq!(roundtrip_expr("(1).toFixed(2)"), "(1).toFixed(2)");
    }

    #[test]
    fn new_keeps_calls_out_of_callee() {
        assert_eq!(roundtrip_expr("new (f())()"), "new (f())()");
        assert_eq!(roundtrip_expr("new a.B(1)"), "new a.B(1)");
    }

    #[test]
    fn strings_are_double_quoted() {
        assert_eq!(roundtrip_expr(r#"'it\'s "x"\n'"#), r#""it's \"x\"\n""#);
    }

    #[test]
    fn template_escapes() {
        assert_eq!(roundtrip_expr(r"`a\`b\${c}${d}`"), r"`a\`b\${c}${d}`");
    }

    #[test]
    fn expression_statement_guards_leading_brace() {
        let program = parse("({ a: 1 }).a").expect("parse");
        assert_eq!(emit_program(&program), "({\n  a: 1\n}.a);\n");
    }

    #[test]
    fn dangling_else_is_braced() {
        let program = parse("if (a) { if (b) x } else y").expect("parse");
        let Stmt::If { consequent, .. } = &program.body[0] else {
            panic!("expected if");
        };
        let inner = match &**consequent {
            Stmt::Block(stmts) => stmts[0].clone(),
            other => other.clone(),
        };
        let flattened = Stmt::If {
            test: Expr::ident("a"),
            consequent: Box::new(inner),
            alternate: Some(Box::new(Stmt::Expr(Expr::ident("y")))),
        };
        assert_eq!(emit_stmt(&flattened), "if (a) {\n  if (b) x;\n} else y;");
    }
}
