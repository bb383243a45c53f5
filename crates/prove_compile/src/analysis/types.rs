//! Canonical type values and the type registry.
//!
//! Surface [`TypeExpr`]s are lowered into [`Type`] values once, during
//! resolution; every later pass compares and prints these canonical forms.
//!
//! Canonicalization rules:
//!
//! - modifier bags are unordered sets; each axis holds at most one modifier
//! - a refined type is always `(base, constraint)` with the base itself
//!   canonical; alias chains are expanded during lowering
//! - `Option`, `Result`, `List`, `Unit`, `Never` are built in, not registry
//!   entries

use std::collections::HashMap;

use prove_base::{Diagnostic, Interner, Span, Symbol};
use prove_language::ast::{Expr, ExprKind, StrLitPiece, Verb};

/// The primitive scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prim {
    Integer,
    Decimal,
    Float,
    Boolean,
    String,
    Byte,
    Character,
}

impl Prim {
    pub fn name(self) -> &'static str {
        match self {
            Prim::Integer => "Integer",
            Prim::Decimal => "Decimal",
            Prim::Float => "Float",
            Prim::Boolean => "Boolean",
            Prim::String => "String",
            Prim::Byte => "Byte",
            Prim::Character => "Character",
        }
    }

    pub fn from_name(name: &str) -> Option<Prim> {
        Some(match name {
            "Integer" => Prim::Integer,
            "Decimal" => Prim::Decimal,
            "Float" => Prim::Float,
            "Boolean" => Prim::Boolean,
            "String" => Prim::String,
            "Byte" => Prim::Byte,
            "Character" => Prim::Character,
            _ => return None,
        })
    }
}

/// A normalized modifier bag. One modifier per axis; order of writing is
/// irrelevant to equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Modifiers {
    /// Mutability axis: `:[Mutable]`. Assignment targets require it.
    pub mutable: bool,
    /// Allocation axis: `:[Arena]`. Arena values are not refcounted.
    pub arena: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { mutable: false, arena: false };

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }

    /// Folds a written modifier list into a bag, diagnosing unknown names
    /// and doubly-set axes.
    pub fn from_names(
        names: &[Symbol],
        span: Span,
        interner: &Interner,
        diags: &mut Vec<Diagnostic>,
    ) -> Modifiers {
        let mut bag = Modifiers::NONE;
        for name in names {
            match interner.resolve(*name) {
                "Mutable" => {
                    if bag.mutable {
                        diags.push(Diagnostic::error(
                            "E306",
                            "the mutability axis is already set",
                            span,
                        ));
                    }
                    bag.mutable = true;
                }
                "Arena" => {
                    if bag.arena {
                        diags.push(Diagnostic::error(
                            "E306",
                            "the allocation axis is already set",
                            span,
                        ));
                    }
                    bag.arena = true;
                }
                other => diags.push(Diagnostic::error(
                    "E306",
                    format!("unknown type modifier '{other}'"),
                    span,
                )),
            }
        }
        bag
    }
}

/// A canonical type value.
///
/// Equality is structural; refinement constraints compare by structural
/// fingerprint, ignoring spans and node ids.
#[derive(Debug, Clone)]
pub enum Type {
    Prim(Prim, Modifiers),
    Refined { base: Box<Type>, constraint: Box<Expr> },
    /// Nominal algebraic type; variants live in the [`TypeRegistry`].
    Algebraic(Symbol),
    /// Nominal record type; fields live in the [`TypeRegistry`].
    Record(Symbol),
    Function { verb: Verb, params: Vec<Type>, ret: Box<Type>, fallible: bool },
    /// A rigid generic parameter (`T`).
    Param(Symbol),
    /// A generic user type instantiated with arguments: `Pair<Integer, T>`.
    Applied { head: Symbol, args: Vec<Type> },
    Option(Box<Type>),
    Result(Box<Type>, Box<Type>),
    List(Box<Type>),
    Unit,
    Never,
    /// Placeholder before checking completes; never survives a clean run.
    Unknown,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Prim(a, am), Type::Prim(b, bm)) => a == b && am == bm,
            (
                Type::Refined { base: ab, constraint: ac },
                Type::Refined { base: bb, constraint: bc },
            ) => ab == bb && expr_fingerprint(ac) == expr_fingerprint(bc),
            (Type::Algebraic(a), Type::Algebraic(b)) => a == b,
            (Type::Record(a), Type::Record(b)) => a == b,
            (
                Type::Function { verb: av, params: ap, ret: ar, fallible: af },
                Type::Function { verb: bv, params: bp, ret: br, fallible: bf },
            ) => av == bv && ap == bp && ar == br && af == bf,
            (Type::Param(a), Type::Param(b)) => a == b,
            (Type::Applied { head: ah, args: aa }, Type::Applied { head: bh, args: ba }) => {
                ah == bh && aa == ba
            }
            (Type::Option(a), Type::Option(b)) => a == b,
            (Type::Result(ao, ae), Type::Result(bo, be)) => ao == bo && ae == be,
            (Type::List(a), Type::List(b)) => a == b,
            (Type::Unit, Type::Unit) => true,
            (Type::Never, Type::Never) => true,
            (Type::Unknown, Type::Unknown) => true,
            _ => false,
        }
    }
}

impl Type {
    pub const BOOLEAN: Type = Type::Prim(Prim::Boolean, Modifiers::NONE);
    pub const INTEGER: Type = Type::Prim(Prim::Integer, Modifiers::NONE);
    pub const DECIMAL: Type = Type::Prim(Prim::Decimal, Modifiers::NONE);
    pub const STRING: Type = Type::Prim(Prim::String, Modifiers::NONE);

    /// Strips refinements, for positions where only the representation
    /// matters (unification, C emission).
    pub fn erased(&self) -> &Type {
        match self {
            Type::Refined { base, .. } => base.erased(),
            other => other,
        }
    }

    /// The modifier bag, if this type carries one.
    pub fn modifiers(&self) -> Modifiers {
        match self {
            Type::Prim(_, mods) => *mods,
            Type::Refined { base, .. } => base.modifiers(),
            _ => Modifiers::NONE,
        }
    }

    /// Heap-allocated types carry the runtime refcount header.
    pub fn is_heap(&self) -> bool {
        match self.erased() {
            Type::Prim(Prim::String, _) => true,
            Type::List(_) => true,
            _ => false,
        }
    }

    /// Renders the type for diagnostics: `List<String>`, `Integer:[Mutable]`.
    pub fn display(&self, interner: &Interner) -> String {
        match self {
            Type::Prim(prim, mods) => {
                let mut out = prim.name().to_string();
                if !mods.is_empty() {
                    out.push_str(":[");
                    let mut parts = Vec::new();
                    if mods.mutable {
                        parts.push("Mutable");
                    }
                    if mods.arena {
                        parts.push("Arena");
                    }
                    out.push_str(&parts.join(" "));
                    out.push(']');
                }
                out
            }
            Type::Refined { base, .. } => format!("{} where ...", base.display(interner)),
            Type::Algebraic(name) | Type::Record(name) => interner.resolve(*name).to_string(),
            Type::Function { verb, params, ret, fallible } => {
                let params = params
                    .iter()
                    .map(|p| p.display(interner))
                    .collect::<Vec<_>>()
                    .join(", ");
                let bang = if *fallible { "!" } else { "" };
                format!("{} ({}) {}{}", verb.keyword(), params, ret.display(interner), bang)
            }
            Type::Param(name) => interner.resolve(*name).to_string(),
            Type::Applied { head, args } => {
                let args = args
                    .iter()
                    .map(|a| a.display(interner))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{}<{}>", interner.resolve(*head), args)
            }
            Type::Option(inner) => format!("Option<{}>", inner.display(interner)),
            Type::Result(ok, err) => {
                format!("Result<{}, {}>", ok.display(interner), err.display(interner))
            }
            Type::List(elem) => format!("List<{}>", elem.display(interner)),
            Type::Unit => "Unit".to_string(),
            Type::Never => "Never".to_string(),
            Type::Unknown => "?".to_string(),
        }
    }

    /// The normalized key of one parameter type, as used in function
    /// identities. Refinements erase; modifiers print in axis order.
    pub fn key(&self, interner: &Interner) -> String {
        match self.erased() {
            Type::Prim(prim, mods) => {
                let mut out = prim.name().to_string();
                if mods.mutable {
                    out.push_str("Mutable");
                }
                if mods.arena {
                    out.push_str("Arena");
                }
                out
            }
            Type::Algebraic(name) | Type::Record(name) | Type::Param(name) => {
                interner.resolve(*name).to_string()
            }
            Type::Function { params, ret, .. } => {
                let mut out = String::from("Fn");
                for p in params {
                    out.push('_');
                    out.push_str(&p.key(interner));
                }
                out.push_str("_to_");
                out.push_str(&ret.key(interner));
                out
            }
            Type::Applied { head, args } => {
                let mut out = interner.resolve(*head).to_string();
                for a in args {
                    out.push('_');
                    out.push_str(&a.key(interner));
                }
                out
            }
            Type::Option(inner) => format!("Option_{}", inner.key(interner)),
            Type::Result(ok, err) => format!("Result_{}_{}", ok.key(interner), err.key(interner)),
            Type::List(elem) => format!("List_{}", elem.key(interner)),
            Type::Unit => "Unit".to_string(),
            Type::Never => "Never".to_string(),
            Type::Unknown => "Unknown".to_string(),
            Type::Refined { .. } => unreachable!("erased() removes refinements"),
        }
    }
}

/// The key of a whole parameter list: `Integer_Integer`, `List_String`.
pub fn param_type_key(params: &[Type], interner: &Interner) -> String {
    if params.is_empty() {
        return "void".to_string();
    }
    params
        .iter()
        .map(|p| p.key(interner))
        .collect::<Vec<_>>()
        .join("_")
}

// ============================================================================
// Structural fingerprints
// ============================================================================

/// Renders an expression as a compact structural string, ignoring spans and
/// node ids. Used for refinement equality, duplicate explain rows, and
/// redundant near_miss inputs.
pub fn expr_fingerprint(expr: &Expr) -> String {
    let mut out = String::new();
    write_fingerprint(expr, &mut out);
    out
}

fn write_fingerprint(expr: &Expr, out: &mut String) {
    use std::fmt::Write as _;
    match &expr.kind {
        ExprKind::Integer(v) => {
            let _ = write!(out, "i{v}");
        }
        ExprKind::Decimal(v) => {
            let _ = write!(out, "d{v}");
        }
        ExprKind::Boolean(v) => {
            let _ = write!(out, "b{v}");
        }
        ExprKind::Str { pieces, .. } => {
            out.push_str("s(");
            for piece in pieces {
                match piece {
                    StrLitPiece::Text(text) => {
                        let _ = write!(out, "t{:?}", text);
                    }
                    StrLitPiece::Interp(inner) => {
                        out.push('{');
                        write_fingerprint(inner, out);
                        out.push('}');
                    }
                }
            }
            out.push(')');
        }
        ExprKind::Regex(text) => {
            let _ = write!(out, "re{:?}", text);
        }
        ExprKind::Ident(name) => {
            let _ = write!(out, "v{}", name.index());
        }
        ExprKind::TypeIdent(name) => {
            let _ = write!(out, "T{}", name.index());
        }
        ExprKind::TypeApply { head, .. } => {
            let _ = write!(out, "TA{}", head.index());
        }
        ExprKind::Call { callee, args } => {
            out.push_str("call(");
            write_fingerprint(callee, out);
            for arg in args {
                out.push(',');
                write_fingerprint(arg, out);
            }
            out.push(')');
        }
        ExprKind::Field { recv, name } => {
            out.push_str("fld(");
            write_fingerprint(recv, out);
            let _ = write!(out, ".{})", name.index());
        }
        ExprKind::Pipe { value, target } => {
            out.push_str("pipe(");
            write_fingerprint(value, out);
            out.push(',');
            write_fingerprint(target, out);
            out.push(')');
        }
        ExprKind::FailProp(inner) => {
            out.push_str("try(");
            write_fingerprint(inner, out);
            out.push(')');
        }
        ExprKind::Lambda { params, body } => {
            out.push_str("lam(");
            for (name, _) in params {
                let _ = write!(out, "{},", name.index());
            }
            write_fingerprint(body, out);
            out.push(')');
        }
        ExprKind::Valid { name, args } => {
            let _ = write!(out, "valid{}", name.index());
            if let Some(args) = args {
                out.push('(');
                for arg in args {
                    write_fingerprint(arg, out);
                    out.push(',');
                }
                out.push(')');
            }
        }
        ExprKind::Match { subject, arms } => {
            out.push_str("match(");
            write_fingerprint(subject, out);
            let _ = write!(out, ";{})", arms.len());
        }
        ExprKind::If { cond, .. } => {
            out.push_str("if(");
            write_fingerprint(cond, out);
            out.push(')');
        }
        ExprKind::Comptime(_) => out.push_str("comptime"),
        ExprKind::Binary { op, lhs, rhs } => {
            let _ = write!(out, "op{:?}(", op);
            write_fingerprint(lhs, out);
            out.push(',');
            write_fingerprint(rhs, out);
            out.push(')');
        }
        ExprKind::Unary { op, operand } => {
            let _ = write!(out, "un{:?}(", op);
            write_fingerprint(operand, out);
            out.push(')');
        }
        ExprKind::Paren(inner) => write_fingerprint(inner, out),
        ExprKind::List(items) => {
            out.push_str("list(");
            for item in items {
                write_fingerprint(item, out);
                out.push(',');
            }
            out.push(')');
        }
        ExprKind::Range { lo, hi } => {
            out.push_str("range(");
            write_fingerprint(lo, out);
            out.push(',');
            write_fingerprint(hi, out);
            out.push(')');
        }
    }
}

// ============================================================================
// Type registry
// ============================================================================

#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: Symbol,
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub name: Symbol,
    pub fields: Vec<FieldInfo>,
    /// Discriminant, in declaration order; becomes the C tag value.
    pub tag: usize,
}

#[derive(Debug, Clone)]
pub enum TypeDefKind {
    Alias(Type),
    Algebraic(Vec<VariantInfo>),
    Record(Vec<FieldInfo>),
}

#[derive(Debug, Clone)]
pub struct TypeDefInfo {
    pub name: Symbol,
    pub generics: Vec<Symbol>,
    pub kind: TypeDefKind,
    pub span: Span,
}

/// Every nominal type declared in the compilation, keyed by name.
#[derive(Default)]
pub struct TypeRegistry {
    types: HashMap<Symbol, TypeDefInfo>,
    /// Variant name → owning algebraic type, for constructor and pattern
    /// resolution.
    variant_owners: HashMap<Symbol, Symbol>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, info: TypeDefInfo) -> Result<(), Span> {
        if let Some(existing) = self.types.get(&info.name) {
            return Err(existing.span);
        }
        if let TypeDefKind::Algebraic(variants) = &info.kind {
            for variant in variants {
                self.variant_owners.insert(variant.name, info.name);
            }
        }
        self.types.insert(info.name, info);
        Ok(())
    }

    /// Replaces a definition in place, re-keying variant owners. Used by the
    /// resolver's two-stage collection so mutually recursive types resolve.
    pub fn replace(&mut self, info: TypeDefInfo) {
        if let TypeDefKind::Algebraic(variants) = &info.kind {
            for variant in variants {
                self.variant_owners.insert(variant.name, info.name);
            }
        }
        self.types.insert(info.name, info);
    }

    pub fn get(&self, name: Symbol) -> Option<&TypeDefInfo> {
        self.types.get(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDefInfo> {
        self.types.values()
    }

    /// The algebraic type owning a variant constructor name.
    pub fn variant_owner(&self, variant: Symbol) -> Option<Symbol> {
        self.variant_owners.get(&variant).copied()
    }

    pub fn variant(&self, owner: Symbol, name: Symbol) -> Option<&VariantInfo> {
        match self.get(owner).map(|info| &info.kind) {
            Some(TypeDefKind::Algebraic(variants)) => {
                variants.iter().find(|v| v.name == name)
            }
            _ => None,
        }
    }

    /// The canonical instance type of a nominal name: aliases expand (so
    /// `Port` is `Integer where 1..65535`), algebraics and records stay
    /// nominal.
    pub fn instance(&self, name: Symbol) -> Option<Type> {
        match &self.get(name)?.kind {
            TypeDefKind::Alias(ty) => Some(ty.clone()),
            TypeDefKind::Algebraic(_) => Some(Type::Algebraic(name)),
            TypeDefKind::Record(_) => Some(Type::Record(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_bags_compare_as_sets() {
        let a = Modifiers { mutable: true, arena: true };
        let b = Modifiers { arena: true, mutable: true };
        assert_eq!(a, b);
    }

    #[test]
    fn prim_round_trips_names() {
        for prim in [Prim::Integer, Prim::Decimal, Prim::Boolean, Prim::String] {
            assert_eq!(Prim::from_name(prim.name()), Some(prim));
        }
        assert_eq!(Prim::from_name("Email"), None);
    }

    #[test]
    fn erased_strips_nested_refinements() {
        let ty = Type::Refined {
            base: Box::new(Type::INTEGER),
            constraint: Box::new(dummy_expr()),
        };
        assert_eq!(ty.erased(), &Type::INTEGER);
    }

    #[test]
    fn param_key_joins_types() {
        let mut interner = Interner::new();
        let key = param_type_key(
            &[Type::INTEGER, Type::List(Box::new(Type::STRING))],
            &interner,
        );
        assert_eq!(key, "Integer_List_String");
        let empty = param_type_key(&[], &mut interner);
        assert_eq!(empty, "void");
    }

    #[test]
    fn heap_types_are_string_and_list() {
        assert!(Type::STRING.is_heap());
        assert!(Type::List(Box::new(Type::INTEGER)).is_heap());
        assert!(!Type::INTEGER.is_heap());
        assert!(!Type::Unit.is_heap());
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut interner = Interner::new();
        let name = interner.intern("Shape");
        let mut registry = TypeRegistry::new();
        let info = TypeDefInfo {
            name,
            generics: Vec::new(),
            kind: TypeDefKind::Alias(Type::INTEGER),
            span: Span::default(),
        };
        assert!(registry.insert(info.clone()).is_ok());
        assert!(registry.insert(info).is_err());
    }

    #[test]
    fn variant_owner_lookup() {
        let mut interner = Interner::new();
        let shape = interner.intern("Shape");
        let circle = interner.intern("Circle");
        let mut registry = TypeRegistry::new();
        registry
            .insert(TypeDefInfo {
                name: shape,
                generics: Vec::new(),
                kind: TypeDefKind::Algebraic(vec![VariantInfo {
                    name: circle,
                    fields: Vec::new(),
                    tag: 0,
                }]),
                span: Span::default(),
            })
            .unwrap();
        assert_eq!(registry.variant_owner(circle), Some(shape));
        assert!(registry.variant(shape, circle).is_some());
    }

    fn dummy_expr() -> Expr {
        use prove_language::ast::NodeId;
        Expr {
            id: NodeId(0),
            kind: prove_language::ast::ExprKind::Integer(1),
            span: Span::default(),
        }
    }
}
