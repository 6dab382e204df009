//! Parser for script source text.
//!
//! Transforms the token stream from the lexer into an AST using chumsky
//! combinators. The grammar is permissive in the places an implicit async
//! function wrapper makes legal: `await` and `return` are accepted at the top
//! level.
//!
//! Statements end at `;`, before `}`, at end of input, or at a line break
//! the lexer recorded. Before parsing, a virtual [`Token::LineBreak`] is
//! inserted between two tokens on different lines when the first can end a
//! statement and the second cannot continue it. A line break always ends
//! `return`, `throw`, `break` and `continue`, and always comes before a
//! `++`/`--` that starts a new line.
//!
//! Reserved words with no production here (`class`, `switch`, ...)
//! are rejected with an `Unsupported syntax: <word>` message, as are a few
//! newer constructs the parser recognises by their first tokens.

use std::sync::Arc;

use crate::ast::{
    AssignOp, BinaryOp, CatchClause, Declarator, Expr, ForEach, ForHead, ForInit, ForLoop,
    Function, FunctionBody, LogicalOp, Param, Program, PropKey, Property, Stmt, TryStmt, UnaryOp,
    UpdateOp, VarDecl, VarKind,
};
use crate::lexer::{self, is_reserved_word, is_unsupported_word, LexerError, Token};
use chumsky::{error::RichReason, input::ValueInput, prelude::*};

/// Span type used throughout the parser.
pub type Span = SimpleSpan;

type Extra<'tokens> = extra::Err<Rich<'tokens, Token, Span>>;

/// Parse error with location and context.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {:?}", self.message, self.span)
    }
}

impl std::error::Error for ParseError {}

/// A syntax failure resolved to a source position.
///
/// `line` is 1-based and `column` is 0-based, counted in characters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("SyntaxError: {message} ({line}:{column})")]
pub struct SyntaxError {
    pub message: String,
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl SyntaxError {
    /// Resolve a parse error's span start against the source it came from.
    pub fn from_parse_error(source: &str, err: &ParseError) -> Self {
        let offset = err.span.start.min(source.len());
        let (line, column) = line_column(source, offset);
        Self {
            message: err.message.clone(),
            offset,
            line,
            column,
        }
    }
}

fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count())
        .unwrap_or(0);
    (line, column)
}

/// Parse source text into a Program AST.
pub fn parse(source: &str) -> Result<Program, Vec<ParseError>> {
    let tokens = lex_for_parser(source)?;
    let end_span: Span = (source.len()..source.len()).into();

    let parser = program_parser();
    let result = parser.parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)));
    result
        .into_result()
        .map_err(|errs| describe_errors(&tokens, convert_errors(errs)))
}

/// Parse source text, reporting the first failure as a positioned SyntaxError.
pub fn parse_program(source: &str) -> Result<Program, SyntaxError> {
    parse(source).map_err(|errs| match errs.first() {
        Some(err) => SyntaxError::from_parse_error(source, err),
        None => SyntaxError {
            message: "Unexpected token".to_string(),
            offset: 0,
            line: 1,
            column: 0,
        },
    })
}

/// Parse a single expression (comma sequences allowed).
pub fn parse_expression(source: &str) -> Result<Expr, Vec<ParseError>> {
    let tokens = lex_for_parser(source)?;
    let end_span: Span = (source.len()..source.len()).into();

    let parser = expr_parser(statement_parser())
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .map(into_sequence)
        .then_ignore(end());
    let result = parser.parse(tokens.as_slice().map(end_span, |(t, s)| (t, s)));
    result
        .into_result()
        .map_err(|errs| describe_errors(&tokens, convert_errors(errs)))
}

fn lex_for_parser(source: &str) -> Result<Vec<(Token, Span)>, Vec<ParseError>> {
    let tokens = lexer::tokenize(source).map_err(|errs| {
        errs.into_iter()
            .map(|e| ParseError {
                span: (e.span.start..e.span.end).into(),
                message: match e.token {
                    LexerError::UnexpectedCharacter => format!(
                        "Unexpected character '{}'",
                        source.get(e.span.clone()).unwrap_or_default()
                    ),
                    other => other.to_string(),
                },
            })
            .collect::<Vec<_>>()
    })?;

    Ok(insert_line_breaks(tokens))
}

/// Convert lexer tokens to parser input, adding a [`Token::LineBreak`]
/// wherever a line break ends a statement.
fn insert_line_breaks(tokens: Vec<lexer::Spanned<Token>>) -> Vec<(Token, Span)> {
    let mut out: Vec<(Token, Span)> = Vec::with_capacity(tokens.len());
    let mut after_dot = false;

    for spanned in tokens {
        if spanned.newline_before {
            if let Some((prev, prev_span)) = out.last() {
                if ends_statement_at_newline(prev, after_dot, &spanned.token) {
                    let at = prev_span.end;
                    out.push((Token::LineBreak, (at..at).into()));
                }
            }
        }
        after_dot = matches!(out.last(), Some((Token::Dot, _)));
        out.push((spanned.token, (spanned.span.start..spanned.span.end).into()));
    }
    out
}

/// Whether a newline between `prev` and `next` terminates a statement.
/// `after_dot` is set when `prev` is a property name, not a keyword.
fn ends_statement_at_newline(prev: &Token, after_dot: bool, next: &Token) -> bool {
    if !after_dot && matches!(prev, Token::Return | Token::Throw | Token::Break | Token::Continue) {
        return true;
    }
    let can_end = after_dot
        || matches!(
            prev,
            Token::Ident(_)
                | Token::Number(_)
                | Token::String(_)
                | Token::Template(_)
                | Token::True
                | Token::False
                | Token::Null
                | Token::RParen
                | Token::RBracket
                | Token::RBrace
                | Token::PlusPlus
                | Token::MinusMinus
        );
    if !can_end {
        return false;
    }
    if matches!(next, Token::PlusPlus | Token::MinusMinus) {
        return true;
    }
    !continues_statement(next)
}

/// Tokens that can only continue the expression on the previous line.
fn continues_statement(token: &Token) -> bool {
    matches!(
        token,
        Token::LParen
            | Token::RParen
            | Token::LBracket
            | Token::RBracket
            | Token::RBrace
            | Token::Dot
            | Token::Comma
            | Token::Semi
            | Token::Question
            | Token::Colon
            | Token::Arrow
            | Token::Eq
            | Token::PlusEq
            | Token::MinusEq
            | Token::StarEq
            | Token::SlashEq
            | Token::PercentEq
            | Token::StarStarEq
            | Token::AndEq
            | Token::OrEq
            | Token::NullishEq
            | Token::EqEq
            | Token::NotEq
            | Token::EqEqEq
            | Token::NotEqEq
            | Token::Lt
            | Token::LtEq
            | Token::Gt
            | Token::GtEq
            | Token::Plus
            | Token::Minus
            | Token::Star
            | Token::Slash
            | Token::Percent
            | Token::StarStar
            | Token::Shl
            | Token::Shr
            | Token::UShr
            | Token::Amp
            | Token::Pipe
            | Token::Caret
            | Token::AndAnd
            | Token::OrOr
            | Token::Nullish
            | Token::In
            | Token::Instanceof
            | Token::Of
    )
}

fn convert_errors(errs: Vec<Rich<'_, Token, Span>>) -> Vec<ParseError> {
    errs.into_iter()
        .map(|e| ParseError {
            span: *e.span(),
            message: match e.reason() {
                RichReason::Custom(msg) => msg.to_string(),
                _ => "Unexpected token".to_string(),
            },
        })
        .collect()
}

/// Replace generic "Unexpected token" messages with a name for the construct
/// when the failing token starts syntax this parser does not support.
fn describe_errors(tokens: &[(Token, Span)], mut errs: Vec<ParseError>) -> Vec<ParseError> {
    for err in &mut errs {
        if err.message != "Unexpected token" {
            continue;
        }
        let Some(idx) = tokens
            .iter()
            .position(|(t, s)| s.start == err.span.start && *t != Token::LineBreak)
        else {
            continue;
        };
        if let Some(construct) = unsupported_construct(tokens, idx) {
            err.message = format!("Unsupported syntax: {construct}");
        }
    }
    errs
}

fn unsupported_construct(tokens: &[(Token, Span)], idx: usize) -> Option<String> {
    let at = |i: usize| tokens.get(i).map(|(t, _)| t);
    let prev = idx.checked_sub(1).and_then(at);
    let next = at(idx + 1);

    match (prev, &tokens[idx].0, next) {
        (_, Token::Ident(word), _) if is_unsupported_word(word) => Some(word.clone()),
        (Some(Token::Question), Token::Dot, _) | (_, Token::Question, Some(Token::Dot)) => {
            Some("optional chaining".to_string())
        }
        (Some(Token::Dot), Token::Dot, _) | (_, Token::Dot, Some(Token::Dot)) => {
            Some("spread".to_string())
        }
        (Some(Token::Let | Token::Const | Token::Var), Token::LBrace | Token::LBracket, _) => {
            Some("destructuring".to_string())
        }
        (Some(Token::Ident(_)), Token::Colon, _) => {
            let boundary = idx < 2
                || matches!(
                    at(idx - 2),
                    Some(Token::Semi | Token::LBrace | Token::RBrace | Token::LineBreak)
                );
            boundary.then(|| "label".to_string())
        }
        _ => None,
    }
}

fn into_sequence(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::Sequence(exprs)
    }
}

/// Split a raw template body into cooked quasis and parsed substitutions.
fn parse_template(raw: &str) -> Result<Expr, String> {
    let mut quasis = Vec::new();
    let mut exprs = Vec::new();
    let mut current = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '\\' => {
                current.push(ch);
                if let Some((_, escaped)) = chars.next() {
                    current.push(escaped);
                }
            }
            '$' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                let start = idx + 2;
                let end = substitution_end(raw, start)
                    .ok_or_else(|| "Unterminated template".to_string())?;
                let inner = &raw[start..end];
                let expr = parse_expression(inner).map_err(|errs| {
                    errs.into_iter()
                        .next()
                        .map(|e| e.message)
                        .unwrap_or_else(|| "Unexpected token".to_string())
                })?;
                quasis.push(cook_quasi(&std::mem::take(&mut current))?);
                exprs.push(expr);
                while chars.peek().is_some_and(|(i, _)| *i <= end) {
                    chars.next();
                }
            }
            _ => current.push(ch),
        }
    }
    quasis.push(cook_quasi(&current)?);

    Ok(Expr::Template { quasis, exprs })
}

fn cook_quasi(raw: &str) -> Result<String, String> {
    lexer::cook_escapes(raw).map_err(|_| "Bad escape sequence in template".to_string())
}

/// Byte index of the `}` closing a `${` substitution that starts at `start`.
fn substitution_end(raw: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' | '`' => quote = Some(ch),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(start + offset),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
// Parser Combinators - generic over input type
// ═══════════════════════════════════════════════════════════════════════════

/// Top-level program parser.
fn program_parser<'tokens, I>() -> impl Parser<'tokens, I, Program, Extra<'tokens>>
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    statement_parser()
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
        .map(|body| Program { body })
}

/// Statement parser - dispatches on the leading token.
fn statement_parser<'tokens, I>() -> impl Parser<'tokens, I, Stmt, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    recursive(|stmt| {
        let assign = expr_parser(stmt.clone());
        let expr = assign
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(into_sequence)
            .boxed();
        let newlines = just(Token::LineBreak).repeated();
        let semi = choice((
            just(Token::Semi).ignored(),
            just(Token::LineBreak).ignored(),
            just(Token::RBrace).rewind().ignored(),
            end(),
        ))
        .labelled("end of statement")
        .boxed();
        let block = block_parser(stmt.clone());
        let paren_expr = expr.clone().delimited_by(just(Token::LParen), just(Token::RParen));

        let var_kind = select! {
            Token::Var => VarKind::Var,
            Token::Let => VarKind::Let,
            Token::Const => VarKind::Const,
        };
        let declarator = ident_parser()
            .then(just(Token::Eq).ignore_then(assign.clone()).or_not())
            .map(|(name, init)| Declarator { name, init });
        let var_decl = var_kind
            .then(
                declarator
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map(|(kind, declarations)| VarDecl { kind, declarations })
            .labelled("variable declaration")
            .boxed();

        let function_decl = just(Token::Async)
            .or_not()
            .then_ignore(just(Token::Function))
            .then(ident_parser())
            .then(param_list_parser(assign.clone()))
            .then(block.clone())
            .map(|(((is_async, name), params), body)| {
                Stmt::FunctionDecl(Arc::new(Function {
                    name: Some(name),
                    params,
                    body: FunctionBody::Block(body),
                    is_async: is_async.is_some(),
                    is_arrow: false,
                }))
            })
            .labelled("function declaration")
            .boxed();

        let if_stmt = just(Token::If)
            .ignore_then(paren_expr.clone())
            .then(stmt.clone())
            .then(
                newlines
                    .clone()
                    .ignore_then(just(Token::Else))
                    .ignore_then(stmt.clone())
                    .or_not(),
            )
            .map(|((test, consequent), alternate)| Stmt::If {
                test,
                consequent: Box::new(consequent),
                alternate: alternate.map(Box::new),
            })
            .labelled("if statement")
            .boxed();

        // for (const x of items) / for (key in obj)
        let for_head = choice((
            var_kind.then(ident_parser()).map(|(kind, name)| ForHead::Decl(kind, name)),
            ident_parser().map(|name| ForHead::Target(Expr::Ident(name))),
        ));
        let for_each = just(Token::For)
            .ignore_then(just(Token::LParen))
            .ignore_then(for_head)
            .then(choice((just(Token::In).to(true), just(Token::Of).to(false))))
            .then(expr.clone())
            .then_ignore(just(Token::RParen))
            .then(stmt.clone())
            .map(|(((left, is_in), right), body)| {
                let each = ForEach {
                    left,
                    right,
                    body: Box::new(body),
                };
                if is_in {
                    Stmt::ForIn(each)
                } else {
                    Stmt::ForOf(each)
                }
            })
            .boxed();

        // for (init; test; update)
        let for_init = choice((
            var_decl.clone().map(ForInit::VarDecl),
            expr.clone().map(ForInit::Expr),
        ));
        let for_loop = just(Token::For)
            .ignore_then(
                for_init
                    .or_not()
                    .then_ignore(just(Token::Semi))
                    .then(expr.clone().or_not())
                    .then_ignore(just(Token::Semi))
                    .then(expr.clone().or_not())
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .then(stmt.clone())
            .map(|(((init, test), update), body)| {
                Stmt::For(ForLoop {
                    init,
                    test,
                    update,
                    body: Box::new(body),
                })
            })
            .labelled("for loop")
            .boxed();

        let while_stmt = just(Token::While)
            .ignore_then(paren_expr.clone())
            .then(stmt.clone())
            .map(|(test, body)| Stmt::While {
                test,
                body: Box::new(body),
            });

        let do_while = just(Token::Do)
            .ignore_then(stmt.clone())
            .then_ignore(newlines.clone())
            .then_ignore(just(Token::While))
            .then(paren_expr.clone())
            .map(|(body, test)| Stmt::DoWhile {
                body: Box::new(body),
                test,
            });

        let with_stmt = just(Token::With)
            .ignore_then(paren_expr.clone())
            .then(stmt.clone())
            .map(|(object, body)| Stmt::With {
                object,
                body: Box::new(body),
            });

        let return_stmt = just(Token::Return)
            .ignore_then(expr.clone().or_not())
            .map(Stmt::Return);

        let throw_stmt = just(Token::Throw).ignore_then(expr.clone()).map(Stmt::Throw);

        let catch_clause = just(Token::Catch)
            .ignore_then(
                ident_parser()
                    .delimited_by(just(Token::LParen), just(Token::RParen))
                    .or_not(),
            )
            .then(block.clone())
            .map(|(param, body)| CatchClause { param, body });
        let try_stmt = just(Token::Try)
            .ignore_then(block.clone())
            .then(newlines.clone().ignore_then(catch_clause).or_not())
            .then(
                newlines
                    .clone()
                    .ignore_then(just(Token::Finally))
                    .ignore_then(block.clone())
                    .or_not(),
            )
            .validate(|((block, handler), finalizer), e, emitter| {
                if handler.is_none() && finalizer.is_none() {
                    emitter.emit(Rich::custom(e.span(), "Missing catch or finally after try"));
                }
                Stmt::Try(TryStmt {
                    block,
                    handler,
                    finalizer,
                })
            })
            .labelled("try statement")
            .boxed();

        // A leading `{` is always a block and a leading `function` a declaration.
        let expr_stmt = any()
            .filter(|t: &Token| !matches!(t, Token::LBrace | Token::Function))
            .rewind()
            .ignore_then(expr.clone())
            .map(Stmt::Expr);

        let statement = choice((
            block.map(Stmt::Block),
            just(Token::Semi).to(Stmt::Empty),
            var_decl.map(Stmt::VarDecl).then_ignore(semi.clone()),
            function_decl,
            if_stmt,
            for_each,
            for_loop,
            while_stmt,
            do_while.then_ignore(semi.clone().or_not()),
            with_stmt,
            return_stmt.then_ignore(semi.clone()),
            throw_stmt.then_ignore(semi.clone()),
            try_stmt,
            just(Token::Break).to(Stmt::Break).then_ignore(semi.clone()),
            just(Token::Continue).to(Stmt::Continue).then_ignore(semi.clone()),
            expr_stmt.then_ignore(semi),
        ));

        newlines.ignore_then(statement).boxed()
    })
}

/// `{ stmt* }`
fn block_parser<'tokens, I, S>(
    stmt: S,
) -> impl Parser<'tokens, I, Vec<Stmt>, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Stmt, Extra<'tokens>> + Clone + 'tokens,
{
    just(Token::LineBreak)
        .repeated()
        .ignore_then(
            stmt.repeated()
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LBrace), just(Token::RBrace)),
        )
        .boxed()
}

/// `(a, b = 1)`
fn param_list_parser<'tokens, I, A>(
    assign: A,
) -> impl Parser<'tokens, I, Vec<Param>, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    A: Parser<'tokens, I, Expr, Extra<'tokens>> + Clone + 'tokens,
{
    ident_parser()
        .then(just(Token::Eq).ignore_then(assign).or_not())
        .map(|(name, default)| Param { name, default })
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .labelled("parameter list")
        .boxed()
}

/// Suffix applied to a primary expression in a call/member chain.
#[derive(Clone)]
enum Suffix {
    Member(String),
    Index(Expr),
    Call(Vec<Expr>),
}

fn apply_suffix(object: Expr, suffix: Suffix) -> Expr {
    match suffix {
        Suffix::Member(property) => Expr::Member {
            object: Box::new(object),
            property,
        },
        Suffix::Index(index) => Expr::Index {
            object: Box::new(object),
            index: Box::new(index),
        },
        Suffix::Call(args) => Expr::Call {
            callee: Box::new(object),
            args,
        },
    }
}

/// Prefix operator in a unary chain.
#[derive(Clone)]
enum Prefix {
    Unary(UnaryOp),
    Update(UpdateOp),
    Await,
}

/// Assignment-level expression parser (no top-level comma).
fn expr_parser<'tokens, I, S>(stmt: S) -> impl Parser<'tokens, I, Expr, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    S: Parser<'tokens, I, Stmt, Extra<'tokens>> + Clone + 'tokens,
{
    recursive(|assign| {
        let expr = assign
            .clone()
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .map(into_sequence)
            .boxed();
        let block = block_parser(stmt.clone());
        let params = param_list_parser(assign.clone());
        let args = assign
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .boxed();

        // ═══════════════════════════════════════════════════════════════════
        // Primary expressions
        // ═══════════════════════════════════════════════════════════════════

        let literal = select! {
            Token::Number(n) => Expr::Number(n),
            Token::String(s) => Expr::String(s),
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Null => Expr::Null,
            Token::Ident(name) if !is_unsupported_word(&name) => Expr::Ident(name),
        };

        let template = select! { Token::Template(raw) => raw }
            .try_map(|raw, span| parse_template(&raw).map_err(|msg| Rich::custom(span, msg)));

        let array = assign
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(Expr::Array)
            .labelled("array literal");

        let prop_key = choice((
            property_name_parser().map(PropKey::Ident),
            select! {
                Token::String(s) => PropKey::String(s),
                Token::Number(n) => PropKey::Number(n),
            },
            assign
                .clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(|e| PropKey::Computed(Box::new(e))),
        ));
        let property = choice((
            prop_key
                .then_ignore(just(Token::Colon))
                .then(assign.clone())
                .map(|(key, value)| Property {
                    key,
                    value,
                    shorthand: false,
                }),
            ident_parser().map(|name| Property {
                key: PropKey::Ident(name.clone()),
                value: Expr::Ident(name),
                shorthand: true,
            }),
        ));
        let object = property
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBrace), just(Token::RBrace))
            .map(Expr::Object)
            .labelled("object literal");

        let function_expr = just(Token::Async)
            .or_not()
            .then_ignore(just(Token::Function))
            .then(ident_parser().or_not())
            .then(params.clone())
            .then(block.clone())
            .map(|(((is_async, name), params), body)| {
                Expr::Function(Arc::new(Function {
                    name,
                    params,
                    body: FunctionBody::Block(body),
                    is_async: is_async.is_some(),
                    is_arrow: false,
                }))
            })
            .labelled("function expression");

        let paren = expr.clone().delimited_by(just(Token::LParen), just(Token::RParen));

        let simple_primary = choice((literal, template, array, object, function_expr, paren)).boxed();

        let member_suffix = choice((
            just(Token::Dot)
                .ignore_then(property_name_parser())
                .map(Suffix::Member),
            expr.clone()
                .delimited_by(just(Token::LBracket), just(Token::RBracket))
                .map(Suffix::Index),
        ))
        .boxed();

        // new Callee(args) - the callee is a member chain without calls
        let new_expr = just(Token::New)
            .ignore_then(
                simple_primary
                    .clone()
                    .foldl(member_suffix.clone().repeated(), apply_suffix),
            )
            .then(args.clone().or_not())
            .map(|(callee, args)| Expr::New {
                callee: Box::new(callee),
                args: args.unwrap_or_default(),
            });

        let primary = choice((new_expr, simple_primary)).boxed();

        let call_member = primary
            .foldl(
                choice((member_suffix, args.map(Suffix::Call))).repeated(),
                apply_suffix,
            )
            .boxed();

        // ═══════════════════════════════════════════════════════════════════
        // Unary and binary operators, tightest first
        // ═══════════════════════════════════════════════════════════════════

        let postfix = call_member
            .then(
                select! {
                    Token::PlusPlus => UpdateOp::Inc,
                    Token::MinusMinus => UpdateOp::Dec,
                }
                .or_not(),
            )
            .map(|(target, op)| match op {
                Some(op) => Expr::Update {
                    op,
                    prefix: false,
                    target: Box::new(target),
                },
                None => target,
            });

        let prefix = select! {
            Token::Bang => Prefix::Unary(UnaryOp::Not),
            Token::Tilde => Prefix::Unary(UnaryOp::BitNot),
            Token::Minus => Prefix::Unary(UnaryOp::Neg),
            Token::Plus => Prefix::Unary(UnaryOp::Plus),
            Token::Typeof => Prefix::Unary(UnaryOp::Typeof),
            Token::Void => Prefix::Unary(UnaryOp::Void),
            Token::Delete => Prefix::Unary(UnaryOp::Delete),
            Token::PlusPlus => Prefix::Update(UpdateOp::Inc),
            Token::MinusMinus => Prefix::Update(UpdateOp::Dec),
            Token::Await => Prefix::Await,
        };
        let unary = prefix
            .repeated()
            .foldr(postfix, |prefix, arg| match prefix {
                Prefix::Unary(op) => Expr::Unary {
                    op,
                    arg: Box::new(arg),
                },
                Prefix::Update(op) => Expr::Update {
                    op,
                    prefix: true,
                    target: Box::new(arg),
                },
                Prefix::Await => Expr::Await(Box::new(arg)),
            })
            .boxed();

        // `**` is right-associative
        let exponent = recursive(|exponent| {
            unary
                .clone()
                .then(just(Token::StarStar).ignore_then(exponent).or_not())
                .map(|(left, right)| match right {
                    Some(right) => binary(BinaryOp::Exp, left, right),
                    None => left,
                })
        })
        .boxed();

        let multiplicative = binary_level(
            exponent,
            select! {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
            },
        );
        let additive = binary_level(
            multiplicative,
            select! {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
            },
        );
        let shift = binary_level(
            additive,
            select! {
                Token::Shl => BinaryOp::Shl,
                Token::Shr => BinaryOp::Shr,
                Token::UShr => BinaryOp::UShr,
            },
        );
        let relational = binary_level(
            shift,
            select! {
                Token::Lt => BinaryOp::Lt,
                Token::LtEq => BinaryOp::LtEq,
                Token::Gt => BinaryOp::Gt,
                Token::GtEq => BinaryOp::GtEq,
                Token::In => BinaryOp::In,
                Token::Instanceof => BinaryOp::Instanceof,
            },
        );
        let equality = binary_level(
            relational,
            select! {
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::NotEq,
                Token::EqEqEq => BinaryOp::StrictEq,
                Token::NotEqEq => BinaryOp::StrictNotEq,
            },
        );
        let bit_and = binary_level(equality, just(Token::Amp).to(BinaryOp::BitAnd));
        let bit_xor = binary_level(bit_and, just(Token::Caret).to(BinaryOp::BitXor));
        let bit_or = binary_level(bit_xor, just(Token::Pipe).to(BinaryOp::BitOr));

        let logical_and = bit_or
            .clone()
            .foldl(
                just(Token::AndAnd).ignore_then(bit_or).repeated(),
                |left, right| logical(LogicalOp::And, left, right),
            )
            .boxed();
        let logical_or = logical_and
            .clone()
            .foldl(
                select! {
                    Token::OrOr => LogicalOp::Or,
                    Token::Nullish => LogicalOp::Nullish,
                }
                .then(logical_and)
                .repeated(),
                |left, (op, right)| logical(op, left, right),
            )
            .boxed();

        let conditional = logical_or
            .then(
                just(Token::Question)
                    .ignore_then(assign.clone())
                    .then_ignore(just(Token::Colon))
                    .then(assign.clone())
                    .or_not(),
            )
            .map(|(test, branches)| match branches {
                Some((consequent, alternate)) => Expr::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(consequent),
                    alternate: Box::new(alternate),
                },
                None => test,
            })
            .boxed();

        // ═══════════════════════════════════════════════════════════════════
        // Arrow functions and assignment
        // ═══════════════════════════════════════════════════════════════════

        let arrow_params = choice((
            ident_parser().map(|name| vec![Param::named(name)]),
            params,
        ));
        let arrow_body = choice((
            block.map(FunctionBody::Block),
            assign.clone().map(|e| FunctionBody::Expr(Box::new(e))),
        ));
        let arrow = just(Token::Async)
            .or_not()
            .then(arrow_params)
            .then_ignore(just(Token::Arrow))
            .then(arrow_body)
            .map(|((is_async, params), body)| {
                Expr::Function(Arc::new(Function {
                    name: None,
                    params,
                    body,
                    is_async: is_async.is_some(),
                    is_arrow: true,
                }))
            })
            .labelled("arrow function")
            .boxed();

        let assign_op = select! {
            Token::Eq => AssignOp::Assign,
            Token::PlusEq => AssignOp::Compound(BinaryOp::Add),
            Token::MinusEq => AssignOp::Compound(BinaryOp::Sub),
            Token::StarEq => AssignOp::Compound(BinaryOp::Mul),
            Token::SlashEq => AssignOp::Compound(BinaryOp::Div),
            Token::PercentEq => AssignOp::Compound(BinaryOp::Rem),
            Token::StarStarEq => AssignOp::Compound(BinaryOp::Exp),
            Token::AndEq => AssignOp::Logical(LogicalOp::And),
            Token::OrEq => AssignOp::Logical(LogicalOp::Or),
            Token::NullishEq => AssignOp::Logical(LogicalOp::Nullish),
        };
        let assignment = conditional
            .then(assign_op.then(assign).or_not())
            .try_map(|(target, rest), span| match rest {
                None => Ok(target),
                Some((op, value)) if target.is_assignment_target() => Ok(Expr::Assign {
                    op,
                    target: Box::new(target),
                    value: Box::new(value),
                }),
                Some(_) => Err(Rich::custom(span, "Assigning to rvalue")),
            });

        choice((arrow, assignment)).boxed()
    })
}

/// One left-associative binary precedence level.
fn binary_level<'tokens, I, P, O>(
    operand: P,
    op: O,
) -> impl Parser<'tokens, I, Expr, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
    P: Parser<'tokens, I, Expr, Extra<'tokens>> + Clone + 'tokens,
    O: Parser<'tokens, I, BinaryOp, Extra<'tokens>> + Clone + 'tokens,
{
    operand
        .clone()
        .foldl(op.then(operand).repeated(), |left, (op, right)| {
            binary(op, left, right)
        })
        .boxed()
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
    Expr::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Identifier parser.
fn ident_parser<'tokens, I>() -> impl Parser<'tokens, I, String, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    select! {
        Token::Ident(name) if !is_reserved_word(&name) => name,
    }
    .labelled("identifier")
}

/// Property name after `.` or as an object key: identifiers and keywords.
fn property_name_parser<'tokens, I>() -> impl Parser<'tokens, I, String, Extra<'tokens>> + Clone
where
    I: ValueInput<'tokens, Token = Token, Span = Span>,
{
    select! {
        Token::Ident(name) => name,
        t if t.keyword_text().is_some() => t.keyword_text().unwrap_or_default().to_string(),
    }
    .labelled("property name")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        parse(source).expect("parse should succeed")
    }

    fn single_expr(source: &str) -> Expr {
        match parse_ok(source).body.as_slice() {
            [Stmt::Expr(e)] => e.clone(),
            other => panic!("expected one expression statement, got {other:?}"),
        }
    }

    #[test]
    fn empty_program() {
        assert_eq!(parse_ok("").body, vec![]);
        assert_eq!(parse_ok("  // nothing\n").body, vec![]);
    }

    #[test]
    fn precedence_mul_over_add() {
        assert_eq!(
            single_expr("1 + 2 * 3"),
            binary(
                BinaryOp::Add,
                Expr::Number(1.0),
                binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0)),
            )
        );
    }

    #[test]
    fn exponent_is_right_associative() {
        assert_eq!(
            single_expr("2 ** 3 ** 2"),
            binary(
                BinaryOp::Exp,
                Expr::Number(2.0),
                binary(BinaryOp::Exp, Expr::Number(3.0), Expr::Number(2.0)),
            )
        );
    }

    #[test]
    fn newline_separates_statements() {
        let program = parse_ok("let x = 1\nx + 1");
        assert_eq!(program.body.len(), 2);
        assert!(matches!(program.body[0], Stmt::VarDecl(_)));
    }

    #[test]
    fn line_breaks_end_statements() {
        assert_eq!(parse_ok("a\nb").body.len(), 2);
        assert_eq!(parse_ok("a\n+ b").body.len(), 1);
        assert_eq!(parse_ok("x\n++y").body.len(), 2);
        assert!(matches!(parse_ok("return\n1").body[0], Stmt::Return(None)));
        assert!(matches!(
            parse_ok("if (a)\n  b\nelse\n  c").body[0],
            Stmt::If { alternate: Some(_), .. }
        ));
        assert_eq!(parse_ok("function f()\n{\n  return 1\n}\nf()").body.len(), 2);
        assert_eq!(parse_ok("o.return\nx").body.len(), 2);
    }

    #[test]
    fn same_line_statements_need_a_semicolon() {
        assert!(parse("1 2").is_err());
        assert!(parse("let x = 1 x").is_err());
        assert_eq!(parse_ok("1; 2").body.len(), 2);
        assert_eq!(parse_ok("{ 1 } 2").body.len(), 2);
    }

    #[test]
    fn unsupported_reserved_words() {
        let err = parse_program("let class = 1").expect_err("should fail");
        assert_eq!(err.message, "Unsupported syntax: class");
        assert_eq!((err.line, err.column), (1, 4));
        assert!(matches!(single_expr("o.class"), Expr::Member { .. }));
        assert!(matches!(single_expr("({ default: 1 })"), Expr::Object(_)));
        assert_eq!(single_expr("this"), Expr::ident("this"));
        assert!(parse("let this = 1").is_err());
    }

    #[test]
    fn top_level_await_and_return() {
        let program = parse_ok("const u = await getUser(1); return u");
        assert!(matches!(program.body[1], Stmt::Return(Some(Expr::Ident(_)))));
    }

    #[test]
    fn leading_brace_is_a_block() {
        assert!(matches!(parse_ok("{ 1 }").body[0], Stmt::Block(_)));
        assert!(matches!(single_expr("({ a: 1 })"), Expr::Object(_)));
    }

    #[test]
    fn arrow_functions() {
        let Expr::Function(f) = single_expr("(a, b = 2) => a + b") else {
            panic!("expected function");
        };
        assert!(f.is_arrow);
        assert_eq!(f.params.len(), 2);
        assert!(matches!(f.body, FunctionBody::Expr(_)));

        let Expr::Function(f) = single_expr("async x => { await x }") else {
            panic!("expected function");
        };
        assert!(f.is_async);
        assert_eq!(f.params, vec![Param::named("x")]);
    }

    #[test]
    fn keyword_property_names() {
        assert_eq!(
            single_expr("p.catch"),
            Expr::Member {
                object: Box::new(Expr::ident("p")),
                property: "catch".to_string(),
            }
        );
    }

    #[test]
    fn template_substitutions() {
        assert_eq!(
            single_expr("`a${1 + 1}b${x}`"),
            Expr::Template {
                quasis: vec!["a".to_string(), "b".to_string(), String::new()],
                exprs: vec![
                    binary(BinaryOp::Add, Expr::Number(1.0), Expr::Number(1.0)),
                    Expr::ident("x"),
                ],
            }
        );
    }

    #[test]
    fn new_with_member_chain() {
        assert_eq!(
            single_expr("new Error('x').message"),
            Expr::Member {
                object: Box::new(Expr::New {
                    callee: Box::new(Expr::ident("Error")),
                    args: vec![Expr::String("x".to_string())],
                }),
                property: "message".to_string(),
            }
        );
    }

    #[test]
    fn for_of_and_for_loop() {
        assert!(matches!(parse_ok("for (const x of xs) x").body[0], Stmt::ForOf(_)));
        assert!(matches!(parse_ok("for (k in o) k").body[0], Stmt::ForIn(_)));
        assert!(matches!(parse_ok("for (let i = 0; i < 3; i++) {}").body[0], Stmt::For(_)));
        assert!(matches!(parse_ok("for (;;) break").body[0], Stmt::For(_)));
    }

    #[test]
    fn dangling_else_binds_to_nearest_if() {
        let program = parse_ok("if (a) if (b) 1; else 2");
        let Stmt::If { consequent, alternate, .. } = &program.body[0] else {
            panic!("expected if");
        };
        assert!(alternate.is_none());
        assert!(matches!(**consequent, Stmt::If { alternate: Some(_), .. }));
    }

    #[test]
    fn try_requires_catch_or_finally() {
        let errs = parse("try { 1 }").expect_err("should fail");
        assert_eq!(errs[0].message, "Missing catch or finally after try");
    }

    #[test]
    fn invalid_assignment_target() {
        let errs = parse("1 = 2").expect_err("should fail");
        assert_eq!(errs[0].message, "Assigning to rvalue");
    }

    #[test]
    fn lone_paren_reports_position() {
        let err = parse_program("(").expect_err("should fail");
        assert_eq!(err.message, "Unexpected token");
        assert_eq!((err.offset, err.line, err.column), (1, 1, 1));
        assert_eq!(err.to_string(), "SyntaxError: Unexpected token (1:1)");
    }

    #[test]
    fn lexer_errors_become_syntax_errors() {
        let err = parse_program("let s = 'abc").expect_err("should fail");
        assert_eq!(err.message, "Unterminated string constant");
        assert_eq!((err.line, err.column), (1, 8));

        let err = parse_program("1\n  #").expect_err("should fail");
        assert_eq!(err.message, "Unexpected character '#'");
        assert_eq!((err.line, err.column), (2, 2));
    }
}
