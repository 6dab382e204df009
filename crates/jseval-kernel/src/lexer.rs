//! Lexer for script source text.
//!
//! Converts source text into a stream of tokens using the logos lexer
//! generator. Whitespace and comments never reach the parser; instead each
//! token records whether a line terminator preceded it, which the parser
//! uses for automatic semicolon insertion.
//!
//! # Token Categories
//!
//! - **Keywords**: `let`, `const`, `var`, `if`, `else`, `for`, `while`, `do`,
//!   `function`, `return`, `await`, `async`, ...
//! - **Literals**: numbers, strings, template literals, `true`/`false`/`null`
//! - **Punctuators**: every operator the grammar understands, longest first
//! - **Identifiers**: `[A-Za-z_$][A-Za-z0-9_$]*`

use logos::{Logos, Span};
use std::fmt;

/// A token with its span in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub token: T,
    pub span: Span,
    /// A line terminator sits between this token and the previous one.
    pub newline_before: bool,
}

impl<T> Spanned<T> {
    pub fn new(token: T, span: Span) -> Self {
        Self {
            token,
            span,
            newline_before: false,
        }
    }
}

/// Lexer error types.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexerError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
    UnterminatedTemplate,
    UnterminatedComment,
    InvalidEscape,
    InvalidNumber,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerError::UnexpectedCharacter => write!(f, "Unexpected character"),
            LexerError::UnterminatedString => write!(f, "Unterminated string constant"),
            LexerError::UnterminatedTemplate => write!(f, "Unterminated template"),
            LexerError::UnterminatedComment => write!(f, "Unterminated comment"),
            LexerError::InvalidEscape => write!(f, "Bad character escape sequence"),
            LexerError::InvalidNumber => write!(f, "Invalid number"),
        }
    }
}

/// Tokens produced by the lexer.
///
/// Keywords are listed before `Ident` so that logos prefers them on equal
/// match length. Literal tokens carry their decoded value.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexerError)]
#[logos(skip r"[ \t\r\n\f\u{feff}\u{a0}]+")]
pub enum Token {
    // ═══════════════════════════════════════════════════════════════════
    // Keywords
    // ═══════════════════════════════════════════════════════════════════
    #[token("let")]
    Let,
    #[token("const")]
    Const,
    #[token("var")]
    Var,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("in")]
    In,
    #[token("instanceof")]
    Instanceof,
    #[token("of")]
    Of,
    #[token("with")]
    With,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("throw")]
    Throw,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("new")]
    New,
    #[token("typeof")]
    Typeof,
    #[token("void")]
    Void,
    #[token("delete")]
    Delete,
    #[token("await")]
    Await,
    #[token("async")]
    Async,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ═══════════════════════════════════════════════════════════════════
    // Punctuators (logos picks the longest match)
    // ═══════════════════════════════════════════════════════════════════
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("=>")]
    Arrow,

    #[token("=")]
    Eq,
    #[token("+=")]
    PlusEq,
    #[token("-=")]
    MinusEq,
    #[token("*=")]
    StarEq,
    #[token("/=")]
    SlashEq,
    #[token("%=")]
    PercentEq,
    #[token("**=")]
    StarStarEq,
    #[token("&&=")]
    AndEq,
    #[token("||=")]
    OrEq,
    #[token("??=")]
    NullishEq,

    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("===")]
    EqEqEq,
    #[token("!==")]
    NotEqEq,
    #[token("<")]
    Lt,
    #[token("<=")]
    LtEq,
    #[token(">")]
    Gt,
    #[token(">=")]
    GtEq,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("**")]
    StarStar,
    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,

    #[token("<<")]
    Shl,
    #[token(">>")]
    Shr,
    #[token(">>>")]
    UShr,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("~")]
    Tilde,
    #[token("!")]
    Bang,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("??")]
    Nullish,

    // ═══════════════════════════════════════════════════════════════════
    // Literals (with values)
    // ═══════════════════════════════════════════════════════════════════
    /// Decimal, hex, octal or binary number - value is the parsed f64
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", lex_decimal)]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", lex_decimal)]
    #[regex(r"0[xX][0-9a-fA-F]+", |lex| lex_radix(lex, 16))]
    #[regex(r"0[oO][0-7]+", |lex| lex_radix(lex, 8))]
    #[regex(r"0[bB][01]+", |lex| lex_radix(lex, 2))]
    Number(f64),

    /// Quoted string - value is the cooked content (quotes removed, escapes processed)
    #[regex(r#""([^"\\\n]|\\(.|\n))*""#, lex_string)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*'"#, lex_string)]
    String(String),

    /// Template literal - value is the raw content between the backticks
    #[regex(r"`([^`\\]|\\(.|\n))*`", lex_template)]
    Template(String),

    /// Identifier - value is the identifier string
    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice().to_string())]
    Ident(String),

    // ═══════════════════════════════════════════════════════════════════
    // Trivia (dropped by `tokenize`)
    // ═══════════════════════════════════════════════════════════════════
    #[regex(r"//[^\n]*", allow_greedy = true)]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", allow_greedy = true)]
    BlockComment,

    // ═══════════════════════════════════════════════════════════════════
    // Invalid patterns (caught for better errors)
    // ═══════════════════════════════════════════════════════════════════
    #[regex(r#""([^"\\\n]|\\(.|\n))*"#, callback = |_| { Err::<(), _>(LexerError::UnterminatedString) }, priority = 1)]
    #[regex(r#"'([^'\\\n]|\\(.|\n))*"#, callback = |_| { Err::<(), _>(LexerError::UnterminatedString) }, priority = 1)]
    UnterminatedString,

    #[regex(r"`([^`\\]|\\(.|\n))*", callback = |_| { Err::<(), _>(LexerError::UnterminatedTemplate) }, priority = 1)]
    UnterminatedTemplate,

    #[regex(r"/\*([^*]|\*+[^*/])*\**", callback = |_| { Err::<(), _>(LexerError::UnterminatedComment) }, priority = 1, allow_greedy = true)]
    UnterminatedComment,

    /// Virtual statement terminator the parser inserts at line breaks.
    /// Never produced by the lexer.
    LineBreak,
}

impl Token {
    /// Source text of a keyword token, used where keywords are valid
    /// property names (`promise.catch`, `{ default: 1 }`).
    pub fn keyword_text(&self) -> Option<&'static str> {
        let text = match self {
            Token::Let => "let",
            Token::Const => "const",
            Token::Var => "var",
            Token::If => "if",
            Token::Else => "else",
            Token::For => "for",
            Token::While => "while",
            Token::Do => "do",
            Token::In => "in",
            Token::Instanceof => "instanceof",
            Token::Of => "of",
            Token::With => "with",
            Token::Function => "function",
            Token::Return => "return",
            Token::Throw => "throw",
            Token::Try => "try",
            Token::Catch => "catch",
            Token::Finally => "finally",
            Token::Break => "break",
            Token::Continue => "continue",
            Token::New => "new",
            Token::Typeof => "typeof",
            Token::Void => "void",
            Token::Delete => "delete",
            Token::Await => "await",
            Token::Async => "async",
            Token::True => "true",
            Token::False => "false",
            Token::Null => "null",
            _ => return None,
        };
        Some(text)
    }
}

/// Reserved words the grammar has no production for. They lex as identifiers
/// so they stay usable as property names.
pub const UNSUPPORTED_WORDS: &[&str] = &[
    "case", "class", "debugger", "default", "enum", "export", "extends", "import", "super",
    "switch",
];

/// Returns true for a reserved word the grammar has no production for.
pub fn is_unsupported_word(name: &str) -> bool {
    UNSUPPORTED_WORDS.contains(&name)
}

/// Returns true for a word that lexes as an identifier but cannot be bound.
pub fn is_reserved_word(name: &str) -> bool {
    name == "this" || is_unsupported_word(name)
}

/// Returns true if `name` lexes as a single identifier token (not a keyword).
pub fn is_identifier(name: &str) -> bool {
    let mut lexer = Token::lexer(name);
    matches!(lexer.next(), Some(Ok(Token::Ident(ref s))) if s == name) && lexer.next().is_none()
}

/// Lex a decimal number literal.
fn lex_decimal(lex: &mut logos::Lexer<Token>) -> Result<f64, LexerError> {
    lex.slice().parse().map_err(|_| LexerError::InvalidNumber)
}

/// Lex a prefixed integer literal (`0x`, `0o`, `0b`).
fn lex_radix(lex: &mut logos::Lexer<Token>, radix: u32) -> Result<f64, LexerError> {
    let digits = &lex.slice()[2..];
    digits.chars().try_fold(0f64, |acc, ch| {
        ch.to_digit(radix)
            .map(|d| acc * radix as f64 + d as f64)
            .ok_or(LexerError::InvalidNumber)
    })
}

/// Lex a quoted string, stripping the quotes and cooking escapes.
fn lex_string(lex: &mut logos::Lexer<Token>) -> Result<String, LexerError> {
    let s = lex.slice();
    cook_escapes(&s[1..s.len() - 1])
}

/// Lex a template literal, keeping the raw content for the parser to split.
fn lex_template(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].to_string()
}

/// Process backslash escapes in string or template text.
pub fn cook_escapes(raw: &str) -> Result<String, LexerError> {
    let mut result = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('r') => result.push('\r'),
            Some('b') => result.push('\u{8}'),
            Some('f') => result.push('\u{c}'),
            Some('v') => result.push('\u{b}'),
            Some('0') => result.push('\0'),
            // Line continuation
            Some('\n') => {}
            Some('\r') => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                result.push(decode_codepoint(&hex, 2)?);
            }
            Some('u') => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    let mut hex = String::new();
                    for c in chars.by_ref() {
                        if c == '}' {
                            break;
                        }
                        hex.push(c);
                    }
                    if hex.is_empty() || hex.len() > 6 {
                        return Err(LexerError::InvalidEscape);
                    }
                    let len = hex.len();
                    result.push(decode_codepoint(&hex, len)?);
                } else {
                    let hex: String = chars.by_ref().take(4).collect();
                    result.push(decode_codepoint(&hex, 4)?);
                }
            }
            // Any other escaped character stands for itself (\\, \', \", \`, \$)
            Some(other) => result.push(other),
            None => return Err(LexerError::InvalidEscape),
        }
    }

    Ok(result)
}

fn decode_codepoint(hex: &str, expected_len: usize) -> Result<char, LexerError> {
    if hex.len() != expected_len || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(LexerError::InvalidEscape);
    }
    let codepoint = u32::from_str_radix(hex, 16).map_err(|_| LexerError::InvalidEscape)?;
    char::from_u32(codepoint).ok_or(LexerError::InvalidEscape)
}

/// Tokenize source text, dropping comments.
///
/// Each token's `newline_before` is set when the source between it and the
/// previous kept token contains a line terminator, comments included.
/// Returns every lexer error found, each with its byte span.
pub fn tokenize(source: &str) -> Result<Vec<Spanned<Token>>, Vec<Spanned<LexerError>>> {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut prev_end = 0;

    for (result, span) in lexer.spanned() {
        match result {
            Ok(Token::LineComment | Token::BlockComment) => {}
            Ok(token) => {
                let gap = source.get(prev_end..span.start).unwrap_or_default();
                let newline_before = !tokens.is_empty() && gap.contains(is_line_terminator);
                prev_end = span.end;
                tokens.push(Spanned {
                    newline_before,
                    ..Spanned::new(token, span)
                });
            }
            Err(err) => errors.push(Spanned::new(err, span)),
        }
    }

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

fn is_line_terminator(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = self.keyword_text() {
            return write!(f, "{text}");
        }
        let text = match self {
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBracket => "[",
            Token::RBracket => "]",
            Token::Semi => ";",
            Token::Comma => ",",
            Token::Dot => ".",
            Token::Question => "?",
            Token::Colon => ":",
            Token::Arrow => "=>",
            Token::Eq => "=",
            Token::PlusEq => "+=",
            Token::MinusEq => "-=",
            Token::StarEq => "*=",
            Token::SlashEq => "/=",
            Token::PercentEq => "%=",
            Token::StarStarEq => "**=",
            Token::AndEq => "&&=",
            Token::OrEq => "||=",
            Token::NullishEq => "??=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::EqEqEq => "===",
            Token::NotEqEq => "!==",
            Token::Lt => "<",
            Token::LtEq => "<=",
            Token::Gt => ">",
            Token::GtEq => ">=",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Percent => "%",
            Token::StarStar => "**",
            Token::PlusPlus => "++",
            Token::MinusMinus => "--",
            Token::Shl => "<<",
            Token::Shr => ">>",
            Token::UShr => ">>>",
            Token::Amp => "&",
            Token::Pipe => "|",
            Token::Caret => "^",
            Token::Tilde => "~",
            Token::Bang => "!",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Nullish => "??",
            Token::Number(n) => return write!(f, "{n}"),
            Token::String(s) => return write!(f, "{s:?}"),
            Token::Template(raw) => return write!(f, "`{raw}`"),
            Token::Ident(name) => return write!(f, "{name}"),
            Token::LineComment | Token::BlockComment => "comment",
            Token::UnterminatedString => "unterminated string",
            Token::UnterminatedTemplate => "unterminated template",
            Token::UnterminatedComment => "unterminated comment",
            Token::LineBreak => "line break",
            _ => "token",
        };
        write!(f, "{text}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        tokenize(source)
            .expect("lexer should succeed")
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn keywords_beat_identifiers() {
        assert_eq!(lex("let"), vec![Token::Let]);
        assert_eq!(lex("await"), vec![Token::Await]);
        assert_eq!(lex("letter"), vec![Token::Ident("letter".to_string())]);
        assert_eq!(lex("$el _x"), vec![
            Token::Ident("$el".to_string()),
            Token::Ident("_x".to_string()),
        ]);
    }

    #[test]
    fn longest_punctuator_wins() {
        assert_eq!(lex("==="), vec![Token::EqEqEq]);
        assert_eq!(lex(">>>="), vec![Token::UShr, Token::Eq]);
        assert_eq!(lex("a??=b"), vec![
            Token::Ident("a".to_string()),
            Token::NullishEq,
            Token::Ident("b".to_string()),
        ]);
        assert_eq!(lex("=>"), vec![Token::Arrow]);
    }

    #[test]
    fn numbers() {
        assert_eq!(lex("42"), vec![Token::Number(42.0)]);
        assert_eq!(lex("3.5"), vec![Token::Number(3.5)]);
        assert_eq!(lex(".5"), vec![Token::Number(0.5)]);
        assert_eq!(lex("1e3"), vec![Token::Number(1000.0)]);
        assert_eq!(lex("0xff"), vec![Token::Number(255.0)]);
        assert_eq!(lex("0b101"), vec![Token::Number(5.0)]);
        assert_eq!(lex("0o17"), vec![Token::Number(15.0)]);
    }

    #[test]
    fn member_dot_is_not_a_number() {
        assert_eq!(lex("a.b"), vec![
            Token::Ident("a".to_string()),
            Token::Dot,
            Token::Ident("b".to_string()),
        ]);
    }

    #[test]
    fn strings_are_cooked() {
        assert_eq!(lex(r#""a\nb""#), vec![Token::String("a\nb".to_string())]);
        assert_eq!(lex(r"'it\'s'"), vec![Token::String("it's".to_string())]);
        assert_eq!(lex(r#""A\x42\u{43}""#), vec![Token::String("ABC".to_string())]);
    }

    #[test]
    fn template_keeps_raw_content() {
        assert_eq!(lex("`a ${b} c`"), vec![Token::Template("a ${b} c".to_string())]);
    }

    #[test]
    fn comments_are_dropped() {
        assert_eq!(lex("1 // one\n/* two */ 2"), vec![Token::Number(1.0), Token::Number(2.0)]);
    }

    #[test]
    fn line_terminators_are_recorded() {
        let flags: Vec<bool> = tokenize("a b\nc /* x\n */ d // e\n\r\nf")
            .expect("lexer should succeed")
            .into_iter()
            .map(|s| s.newline_before)
            .collect();
        assert_eq!(flags, vec![false, false, true, true, true]);
        assert!(!tokenize("\n\nx").expect("lexer should succeed")[0].newline_before);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let errors = tokenize("x = \"abc").expect_err("should fail");
        assert_eq!(errors[0].token, LexerError::UnterminatedString);
        assert_eq!(errors[0].span.start, 4);
    }

    #[test]
    fn unexpected_character_is_an_error() {
        let errors = tokenize("a # b").expect_err("should fail");
        assert_eq!(errors[0].token, LexerError::UnexpectedCharacter);
        assert_eq!(errors[0].span, 2..3);
    }

    #[test]
    fn identifier_check() {
        assert!(is_identifier("getUser"));
        assert!(is_identifier("$"));
        assert!(!is_identifier("let"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a b"));
        assert!(!is_identifier(""));
    }
}
