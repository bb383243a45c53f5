//! Surface type expressions.
//!
//! These are the types as written in source, before canonicalization. The
//! checker lowers them into `prove_compile`'s canonical type values; the
//! parser only records shape and spans.

use prove_base::{Span, Symbol};

use crate::ast::expr::Expr;

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// `Integer`, `Email`, or a generic parameter `T`.
    Simple(Symbol),
    /// `List<String>`, `Result<Config, String>`.
    Generic { head: Symbol, args: Vec<TypeExpr> },
    /// `String:[Mutable]`, `Buffer:[Arena]`. The axis list is ordered as
    /// written; equality of canonical types ignores the order.
    Modified { base: Box<TypeExpr>, modifiers: Vec<Symbol> },
    /// `Integer where 1..65535`, `String where len(value) > 0`.
    Refined { base: Box<TypeExpr>, constraint: Box<Expr> },
}

impl TypeExpr {
    /// The head name of the type, looking through modifiers and refinements.
    pub fn head(&self) -> Option<Symbol> {
        match &self.kind {
            TypeExprKind::Simple(name) => Some(*name),
            TypeExprKind::Generic { head, .. } => Some(*head),
            TypeExprKind::Modified { base, .. } => base.head(),
            TypeExprKind::Refined { base, .. } => base.head(),
        }
    }
}
