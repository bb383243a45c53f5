//! Top-level declarations and annotations.

use prove_base::{Span, Symbol};

use crate::ast::expr::{Body, Expr, Stmt};
use crate::ast::types::TypeExpr;

/// The effect class a function declares with its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    Transforms,
    Validates,
    Reads,
    Creates,
    Matches,
    Inputs,
    Outputs,
}

impl Verb {
    /// Pure verbs cannot perform IO, call `inputs`/`outputs` functions, or
    /// declare the fail marker.
    pub fn is_pure(self) -> bool {
        !matches!(self, Verb::Inputs | Verb::Outputs)
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Verb::Transforms => "transforms",
            Verb::Validates => "validates",
            Verb::Reads => "reads",
            Verb::Creates => "creates",
            Verb::Matches => "matches",
            Verb::Inputs => "inputs",
            Verb::Outputs => "outputs",
        }
    }

    /// Tie-break order for context-aware call resolution (rule 4).
    pub fn preference_rank(self) -> u8 {
        match self {
            Verb::Transforms => 0,
            Verb::Validates => 1,
            Verb::Reads => 2,
            Verb::Creates => 3,
            Verb::Matches => 4,
            Verb::Inputs => 5,
            Verb::Outputs => 6,
        }
    }
}

/// One parsed module: the unit of compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: Symbol,
    pub doc: Option<String>,
    pub narrative: Option<String>,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDecl>,
    pub constants: Vec<ConstantDecl>,
    pub functions: Vec<FunctionDef>,
    pub mains: Vec<MainDef>,
    pub foreigns: Vec<ForeignBlock>,
    pub networks: Vec<InvariantNetwork>,
    pub span: Span,
}

/// `use Net inputs fetch, types Request Response`
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: Symbol,
    pub groups: Vec<ImportGroup>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportGroup {
    pub selector: Option<ImportSelector>,
    pub names: Vec<Symbol>,
    pub span: Span,
}

/// What a group of imported names is qualified by: a verb keyword, or the
/// literal `types`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportSelector {
    Verb(Verb),
    Types,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Symbol,
    pub ty: TypeExpr,
    /// Per-parameter refinement: `(n Integer where n > 0)`.
    pub where_clause: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub verb: Verb,
    pub name: Symbol,
    pub name_span: Span,
    pub params: Vec<Param>,
    /// `None` means implicit `Boolean` for `validates`, `Unit` otherwise.
    pub ret: Option<TypeExpr>,
    pub fallible: bool,
    /// Recorded in source order; the canonical order is a formatter concern.
    pub annotations: Vec<Annotation>,
    pub body: Body,
    pub doc: Option<String>,
    pub span: Span,
}

/// The `main` entry point. Always effectful; the fail marker is allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct MainDef {
    pub fallible: bool,
    pub annotations: Vec<Annotation>,
    pub body: Vec<Stmt>,
    pub doc: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationKind {
    Requires(Expr),
    Ensures(Expr),
    Terminates(Expr),
    Trusted(String),
    Know(Expr),
    Assume(Expr),
    Believe(Expr),
    WhyNot(String),
    Chosen(String),
    Intent(String),
    NearMiss { input: Expr, expected: Expr },
    Satisfies(Symbol),
    Explain(Vec<CnlRow>),
    Proof(Vec<ProofRow>),
}

/// One verbatim controlled-natural-language row of an `explain` block.
#[derive(Debug, Clone, PartialEq)]
pub struct CnlRow {
    pub text: String,
    pub span: Span,
}

/// One named obligation of a legacy `proof` block: `name: text`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProofRow {
    pub name: String,
    pub text: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: Symbol,
    pub name_span: Span,
    pub generics: Vec<Symbol>,
    pub body: TypeBody,
    pub doc: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeBody {
    /// `type Port is Integer where 1..65535`
    Alias(TypeExpr),
    /// `type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)`
    Algebraic(Vec<VariantDecl>),
    /// `type Point is with x Decimal, y Decimal`
    Record(Vec<FieldDecl>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariantDecl {
    pub name: Symbol,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Symbol,
    pub ty: TypeExpr,
    pub span: Span,
}

/// `MAX_RETRIES as Integer = 3`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDecl {
    pub name: Symbol,
    pub name_span: Span,
    pub ty: Option<TypeExpr>,
    pub value: Expr,
    pub doc: Option<String>,
    pub span: Span,
}

/// `foreign "m" with` followed by C signatures to link from that library.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignBlock {
    pub library: String,
    pub decls: Vec<ForeignDecl>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignDecl {
    pub name: Symbol,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub span: Span,
}

/// `invariant_network Name` followed by one boolean expression per line.
/// Solving the network is future work; the declaration resolves and
/// `satisfies N` references it.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantNetwork {
    pub name: Symbol,
    pub rows: Vec<Expr>,
    pub span: Span,
}
