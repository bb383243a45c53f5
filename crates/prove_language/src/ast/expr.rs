//! Expressions, statements, patterns, and function bodies.

use prove_base::{Span, Symbol};

use crate::ast::types::TypeExpr;
use crate::ast::NodeId;
use crate::token::StrKind;

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

/// One segment of a string literal after parsing: interpolations are full
/// expressions by now.
#[derive(Debug, Clone, PartialEq)]
pub enum StrLitPiece {
    Text(String),
    Interp(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Str { kind: StrKind, pieces: Vec<StrLitPiece> },
    Regex(String),
    /// A `snake_case` reference: parameter, local, constant, or function.
    Ident(Symbol),
    /// A `CamelCase` reference: variant constructor or type name.
    TypeIdent(Symbol),
    /// Constructor reference with explicit type arguments: `Empty<Integer>`.
    /// `TypeIdent<...>` is always type arguments; a list that does not close
    /// as a well-formed type-arg list reverts to comparison.
    TypeApply { head: Symbol, args: Vec<TypeExpr> },
    Call { callee: Box<Expr>, args: Vec<Expr> },
    Field { recv: Box<Expr>, name: Symbol },
    /// `value |> target`; desugared to a call on the typed AST before
    /// emission.
    Pipe { value: Box<Expr>, target: Box<Expr> },
    /// Postfix `!`: unwrap or early-return the error arm.
    FailProp(Box<Expr>),
    /// Captureless lambda; only legal as a call argument.
    Lambda { params: Vec<(Symbol, Option<TypeExpr>)>, body: Box<Expr> },
    /// `valid f` binds the validates-variant of `f`; `valid f(x)` calls it.
    Valid { name: Symbol, args: Option<Vec<Expr>> },
    Match { subject: Box<Expr>, arms: Vec<MatchArm> },
    /// Parsed everywhere, rejected by the checker outside `comptime`.
    If { cond: Box<Expr>, then_block: Vec<Stmt>, else_block: Option<Vec<Stmt>> },
    /// `comptime` block: evaluated at compile time; the one place `if` is
    /// allowed.
    Comptime(Vec<Stmt>),
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Paren(Box<Expr>),
    List(Vec<Expr>),
    Range { lo: Box<Expr>, hi: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// True for `== != < > <= >=` and the logical connectives: operators
    /// whose result is Boolean.
    pub fn is_boolean(self) -> bool {
        matches!(
            self,
            BinaryOp::Or
                | BinaryOp::And
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::Le
                | BinaryOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// `Circle(r)`, `Err(reason)`, `Red`.
    Variant { name: Symbol, args: Vec<Pattern> },
    /// `_`
    Wildcard,
    Literal(PatLiteral),
    /// A fresh binding for the matched value.
    Binding(Symbol),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatLiteral {
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `name as Type = expr`; the type is optional.
    VarDecl { name: Symbol, name_span: Span, ty: Option<TypeExpr>, value: Expr },
    /// `name = expr`; only legal when `name` is typed `Mutable`.
    Assign { name: Symbol, name_span: Span, value: Expr },
    /// Side effect, or the terminal value of a body.
    Expr(Expr),
}

/// A function body after `from`.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Statements(Vec<Stmt>),
    /// Implicit match over the first parameter (`matches` functions, and
    /// `inputs` with an algebraic first parameter).
    MatchArms(Vec<MatchArm>),
}

impl Body {
    /// Top-level statement count, the unit the strict explain mode counts:
    /// a var-decl, an assignment, a match arm, or the terminal expression
    /// each count once.
    pub fn top_level_count(&self) -> usize {
        match self {
            Body::Statements(stmts) => stmts.len(),
            Body::MatchArms(arms) => arms.len(),
        }
    }
}
