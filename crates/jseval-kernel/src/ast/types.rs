//! AST type definitions.

use std::fmt;
use std::sync::Arc;

/// A complete script is a sequence of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// A single statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Expression statement: `f(x);`
    Expr(Expr),
    /// Block: `{ a; b }`
    Block(Vec<Stmt>),
    /// Lone semicolon
    Empty,
    /// `let x = 1, y;` / `const` / `var`
    VarDecl(VarDecl),
    /// `function f(a) { ... }` / `async function f() { ... }`
    FunctionDecl(Arc<Function>),
    /// `if (test) consequent else alternate`
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    /// `for (init; test; update) body`
    For(ForLoop),
    /// `for (x in obj) body`
    ForIn(ForEach),
    /// `for (x of items) body`
    ForOf(ForEach),
    /// `while (test) body`
    While { test: Expr, body: Box<Stmt> },
    /// `do body while (test)`
    DoWhile { body: Box<Stmt>, test: Expr },
    /// `with (object) body`
    With { object: Expr, body: Box<Stmt> },
    /// `return` or `return expr`
    Return(Option<Expr>),
    /// `throw expr`
    Throw(Expr),
    /// `try { } catch (e) { } finally { }`
    Try(TryStmt),
    Break,
    Continue,
}

/// Declaration keyword.
impl Stmt {
    /// Short name of the statement kind, for tracing.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Stmt::Expr(_) => "expr",
            Stmt::Block(_) => "block",
            Stmt::Empty => "empty",
            Stmt::VarDecl(_) => "var_decl",
            Stmt::FunctionDecl(_) => "function_decl",
            Stmt::If { .. } => "if",
            Stmt::For(_) => "for",
            Stmt::ForIn(_) => "for_in",
            Stmt::ForOf(_) => "for_of",
            Stmt::While { .. } => "while",
            Stmt::DoWhile { .. } => "do_while",
            Stmt::With { .. } => "with",
            Stmt::Return(_) => "return",
            Stmt::Throw(_) => "throw",
            Stmt::Try(_) => "try",
            Stmt::Break => "break",
            Stmt::Continue => "continue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Var,
    Let,
    Const,
}

impl VarKind {
    /// Lexical declarations are block scoped and subject to the TDZ.
    pub fn is_lexical(self) -> bool {
        !matches!(self, VarKind::Var)
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Var => write!(f, "var"),
            VarKind::Let => write!(f, "let"),
            VarKind::Const => write!(f, "const"),
        }
    }
}

/// Variable declaration with one or more declarators.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub kind: VarKind,
    pub declarations: Vec<Declarator>,
}

/// One `name = init` entry of a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: String,
    pub init: Option<Expr>,
}

impl VarDecl {
    /// Convenience for a single-name declaration.
    pub fn single(kind: VarKind, name: impl Into<String>, init: Option<Expr>) -> Self {
        Self {
            kind,
            declarations: vec![Declarator {
                name: name.into(),
                init,
            }],
        }
    }
}

/// C-style for loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub init: Option<ForInit>,
    pub test: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
}

/// Initializer clause of a C-style for loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    VarDecl(VarDecl),
    Expr(Expr),
}

/// `for (left in/of right) body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForEach {
    pub left: ForHead,
    pub right: Expr,
    pub body: Box<Stmt>,
}

/// Left-hand side of a for-in / for-of loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    /// `for (const x of ...)`
    Decl(VarKind, String),
    /// `for (x of ...)` or `for (obj.prop of ...)`
    Target(Expr),
}

/// Try statement. At least one of `handler` / `finalizer` is present.
#[derive(Debug, Clone, PartialEq)]
pub struct TryStmt {
    pub block: Vec<Stmt>,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<Vec<Stmt>>,
}

/// `catch (param) { body }`; the parameter is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<String>,
    pub body: Vec<Stmt>,
}

/// Function, arrow function or async variant of either.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: FunctionBody,
    pub is_async: bool,
    pub is_arrow: bool,
}

/// Formal parameter with an optional default.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

impl Param {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }
}

/// Function body: a statement list, or a concise arrow expression.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Block(Vec<Stmt>),
    Expr(Box<Expr>),
}

/// An expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Bool(bool),
    Null,
    /// Template literal; `quasis.len() == exprs.len() + 1`, quasis are cooked.
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Ident(String),
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Function(Arc<Function>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    /// `++x`, `x--`
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `test ? consequent : alternate`
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    New {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `object.property`
    Member {
        object: Box<Expr>,
        property: String,
    },
    /// `object[index]`
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// `a, b, c`
    Sequence(Vec<Expr>),
    Await(Box<Expr>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident(name.into())
    }

    /// Plain `target = value` assignment.
    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            op: AssignOp::Assign,
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    /// Whether this expression may appear on the left of an assignment.
    pub fn is_assignment_target(&self) -> bool {
        matches!(self, Expr::Ident(_) | Expr::Member { .. } | Expr::Index { .. })
    }
}

/// Object literal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropKey,
    pub value: Expr,
    /// `{ x }` rather than `{ x: x }`
    pub shorthand: bool,
}

/// Object literal key.
#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    Ident(String),
    String(String),
    Number(f64),
    Computed(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Plus,
    Not,
    BitNot,
    Typeof,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    In,
    Instanceof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Assignment operator; compound forms carry the underlying operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Compound(BinaryOp),
    Logical(LogicalOp),
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Plus => write!(f, "+"),
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::BitNot => write!(f, "~"),
            UnaryOp::Typeof => write!(f, "typeof"),
            UnaryOp::Void => write!(f, "void"),
            UnaryOp::Delete => write!(f, "delete"),
        }
    }
}

impl fmt::Display for UpdateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOp::Inc => write!(f, "++"),
            UpdateOp::Dec => write!(f, "--"),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Exp => "**",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::StrictEq => "===",
            BinaryOp::StrictNotEq => "!==",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::UShr => ">>>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::In => "in",
            BinaryOp::Instanceof => "instanceof",
        };
        write!(f, "{op}")
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalOp::And => write!(f, "&&"),
            LogicalOp::Or => write!(f, "||"),
            LogicalOp::Nullish => write!(f, "??"),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::Compound(op) => write!(f, "{op}="),
            AssignOp::Logical(op) => write!(f, "{op}="),
        }
    }
}
