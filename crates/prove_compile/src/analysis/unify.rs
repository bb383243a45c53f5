//! Robinson unification for the bidirectional type checker.
//!
//! [`InferType`] extends the canonical [`Type`] with type variables for the
//! inference pass. Refinements erase on entry ([`InferType::from_type`]
//! works on the erased form), so inference sees only representations; the
//! checker re-attaches refinement obligations afterwards. After inference,
//! [`UnificationTable::to_type`] converts back; unsolved variables become
//! [`Type::Unknown`].
//!
//! ```text
//! Type ──erase──▶ InferType ──unify──▶ InferType ──zonk──▶ Type
//! ```

use std::collections::HashMap;

use prove_base::Symbol;
use prove_language::ast::Verb;

use crate::analysis::types::{Modifiers, Prim, Type};

/// A type variable allocated during inference.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TyVar(pub u32);

/// Inference-time type representation.
#[derive(Clone, PartialEq, Debug)]
pub enum InferType {
    Prim(Prim),
    Algebraic(Symbol),
    Record(Symbol),
    /// Verb and fallibility are call-resolution concerns, not inference
    /// concerns; only the shape unifies.
    Function { params: Vec<InferType>, ret: Box<InferType> },
    /// A rigid generic parameter of the enclosing signature.
    Rigid(Symbol),
    Applied { head: Symbol, args: Vec<InferType> },
    Option(Box<InferType>),
    Result(Box<InferType>, Box<InferType>),
    List(Box<InferType>),
    Unit,
    Never,
    Unknown,
    Var(TyVar),
}

impl InferType {
    /// Erases and embeds a canonical type. `subst` maps generic parameters
    /// to their instantiation (fresh variables at call sites, [`Rigid`]
    /// inside the defining body).
    pub fn from_type(ty: &Type, subst: &HashMap<Symbol, InferType>) -> InferType {
        match ty.erased() {
            Type::Prim(prim, _) => InferType::Prim(*prim),
            Type::Algebraic(name) => InferType::Algebraic(*name),
            Type::Record(name) => InferType::Record(*name),
            Type::Function { params, ret, .. } => InferType::Function {
                params: params.iter().map(|p| InferType::from_type(p, subst)).collect(),
                ret: Box::new(InferType::from_type(ret, subst)),
            },
            Type::Param(name) => subst
                .get(name)
                .cloned()
                .unwrap_or(InferType::Rigid(*name)),
            Type::Applied { head, args } => InferType::Applied {
                head: *head,
                args: args.iter().map(|a| InferType::from_type(a, subst)).collect(),
            },
            Type::Option(inner) => InferType::Option(Box::new(InferType::from_type(inner, subst))),
            Type::Result(ok, err) => InferType::Result(
                Box::new(InferType::from_type(ok, subst)),
                Box::new(InferType::from_type(err, subst)),
            ),
            Type::List(elem) => InferType::List(Box::new(InferType::from_type(elem, subst))),
            Type::Unit => InferType::Unit,
            Type::Never => InferType::Never,
            Type::Unknown => InferType::Unknown,
            Type::Refined { .. } => unreachable!("erased() removes refinements"),
        }
    }
}

/// An inference failure, reported by the checker as a type diagnostic.
#[derive(Debug, Clone)]
pub enum TypeError {
    Mismatch { expected: InferType, found: InferType },
    InfiniteType { var: TyVar },
    ArityMismatch { expected: usize, found: usize },
}

/// Union-find table with occurs check.
///
/// `Clone` is cheap enough for speculative trials: candidate filtering in
/// call resolution unifies against a scratch copy and discards it.
#[derive(Default, Clone)]
pub struct UnificationTable {
    bindings: HashMap<TyVar, InferType>,
    next: u32,
}

impl UnificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> InferType {
        let var = TyVar(self.next);
        self.next += 1;
        InferType::Var(var)
    }

    /// Follows variable bindings one level at the root.
    pub fn resolve(&self, ty: &InferType) -> InferType {
        let mut current = ty.clone();
        while let InferType::Var(var) = current {
            match self.bindings.get(&var) {
                Some(bound) => current = bound.clone(),
                None => return InferType::Var(var),
            }
        }
        current
    }

    fn occurs(&self, var: TyVar, ty: &InferType) -> bool {
        match self.resolve(ty) {
            InferType::Var(other) => other == var,
            InferType::Function { params, ret } => {
                params.iter().any(|p| self.occurs(var, p)) || self.occurs(var, &ret)
            }
            InferType::Applied { args, .. } => args.iter().any(|a| self.occurs(var, a)),
            InferType::Option(inner) | InferType::List(inner) => self.occurs(var, &inner),
            InferType::Result(ok, err) => self.occurs(var, &ok) || self.occurs(var, &err),
            _ => false,
        }
    }

    /// Unifies two types, binding variables as needed.
    ///
    /// `Unknown` unifies with anything (propagated uncertainty); `Never`
    /// unifies with anything (a diverging arm takes any type).
    pub fn unify(&mut self, a: &InferType, b: &InferType) -> Result<(), TypeError> {
        let a = self.resolve(a);
        let b = self.resolve(b);
        match (&a, &b) {
            (InferType::Var(va), InferType::Var(vb)) if va == vb => Ok(()),
            (InferType::Var(var), other) | (other, InferType::Var(var)) => {
                if self.occurs(*var, other) {
                    return Err(TypeError::InfiniteType { var: *var });
                }
                self.bindings.insert(*var, other.clone());
                Ok(())
            }
            (InferType::Unknown, _) | (_, InferType::Unknown) => Ok(()),
            (InferType::Never, _) | (_, InferType::Never) => Ok(()),
            (InferType::Prim(pa), InferType::Prim(pb)) if pa == pb => Ok(()),
            (InferType::Algebraic(na), InferType::Algebraic(nb)) if na == nb => Ok(()),
            (InferType::Record(na), InferType::Record(nb)) if na == nb => Ok(()),
            (InferType::Rigid(na), InferType::Rigid(nb)) if na == nb => Ok(()),
            (InferType::Unit, InferType::Unit) => Ok(()),
            (
                InferType::Function { params: pa, ret: ra },
                InferType::Function { params: pb, ret: rb },
            ) => {
                if pa.len() != pb.len() {
                    return Err(TypeError::ArityMismatch { expected: pa.len(), found: pb.len() });
                }
                for (x, y) in pa.iter().zip(pb) {
                    self.unify(x, y)?;
                }
                self.unify(ra, rb)
            }
            (
                InferType::Applied { head: ha, args: aa },
                InferType::Applied { head: hb, args: ab },
            ) if ha == hb && aa.len() == ab.len() => {
                for (x, y) in aa.iter().zip(ab) {
                    self.unify(x, y)?;
                }
                Ok(())
            }
            (InferType::Option(ia), InferType::Option(ib)) => self.unify(ia, ib),
            (InferType::List(ia), InferType::List(ib)) => self.unify(ia, ib),
            (InferType::Result(oa, ea), InferType::Result(ob, eb)) => {
                self.unify(oa, ob)?;
                self.unify(ea, eb)
            }
            _ => Err(TypeError::Mismatch { expected: a.clone(), found: b.clone() }),
        }
    }

    /// Deep-resolves a type; unbound variables become `Unknown`.
    pub fn zonk(&self, ty: &InferType) -> InferType {
        match self.resolve(ty) {
            InferType::Var(_) => InferType::Unknown,
            InferType::Function { params, ret } => InferType::Function {
                params: params.iter().map(|p| self.zonk(p)).collect(),
                ret: Box::new(self.zonk(&ret)),
            },
            InferType::Applied { head, args } => InferType::Applied {
                head,
                args: args.iter().map(|a| self.zonk(a)).collect(),
            },
            InferType::Option(inner) => InferType::Option(Box::new(self.zonk(&inner))),
            InferType::List(inner) => InferType::List(Box::new(self.zonk(&inner))),
            InferType::Result(ok, err) => {
                InferType::Result(Box::new(self.zonk(&ok)), Box::new(self.zonk(&err)))
            }
            other => other,
        }
    }

    /// Converts back to a canonical type for the typed-AST table.
    pub fn to_type(&self, ty: &InferType) -> Type {
        match self.zonk(ty) {
            InferType::Prim(prim) => Type::Prim(prim, Modifiers::NONE),
            InferType::Algebraic(name) => Type::Algebraic(name),
            InferType::Record(name) => Type::Record(name),
            InferType::Function { params, ret } => Type::Function {
                verb: Verb::Transforms,
                params: params.iter().map(|p| self.to_type(p)).collect(),
                ret: Box::new(self.to_type(&ret)),
                fallible: false,
            },
            InferType::Rigid(name) => Type::Param(name),
            InferType::Applied { head, args } => Type::Applied {
                head,
                args: args.iter().map(|a| self.to_type(a)).collect(),
            },
            InferType::Option(inner) => Type::Option(Box::new(self.to_type(&inner))),
            InferType::Result(ok, err) => {
                Type::Result(Box::new(self.to_type(&ok)), Box::new(self.to_type(&err)))
            }
            InferType::List(elem) => Type::List(Box::new(self.to_type(&elem))),
            InferType::Unit => Type::Unit,
            InferType::Never => Type::Never,
            InferType::Unknown | InferType::Var(_) => Type::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_vars_are_distinct() {
        let mut table = UnificationTable::new();
        assert_ne!(table.fresh(), table.fresh());
    }

    #[test]
    fn var_binds_to_ground_type() {
        let mut table = UnificationTable::new();
        let var = table.fresh();
        table.unify(&var, &InferType::Prim(Prim::Integer)).unwrap();
        assert_eq!(table.resolve(&var), InferType::Prim(Prim::Integer));
    }

    #[test]
    fn mismatched_prims_fail() {
        let mut table = UnificationTable::new();
        let err = table
            .unify(&InferType::Prim(Prim::Integer), &InferType::Prim(Prim::String))
            .unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn occurs_check_rejects_infinite_type() {
        let mut table = UnificationTable::new();
        let var = table.fresh();
        let list_of_var = InferType::List(Box::new(var.clone()));
        let err = table.unify(&var, &list_of_var).unwrap_err();
        assert!(matches!(err, TypeError::InfiniteType { .. }));
    }

    #[test]
    fn list_elements_unify_through() {
        let mut table = UnificationTable::new();
        let var = table.fresh();
        table
            .unify(
                &InferType::List(Box::new(var.clone())),
                &InferType::List(Box::new(InferType::Prim(Prim::String))),
            )
            .unwrap();
        assert_eq!(table.resolve(&var), InferType::Prim(Prim::String));
    }

    #[test]
    fn never_unifies_with_anything() {
        let mut table = UnificationTable::new();
        table.unify(&InferType::Never, &InferType::Prim(Prim::Integer)).unwrap();
        table.unify(&InferType::Unit, &InferType::Never).unwrap();
    }

    #[test]
    fn zonk_turns_unbound_vars_into_unknown() {
        let mut table = UnificationTable::new();
        let var = table.fresh();
        assert_eq!(table.zonk(&var), InferType::Unknown);
        assert_eq!(table.to_type(&var), Type::Unknown);
    }

    #[test]
    fn refinements_erase_on_entry() {
        use prove_base::Span;
        use prove_language::ast::{Expr, ExprKind, NodeId};
        let refined = Type::Refined {
            base: Box::new(Type::INTEGER),
            constraint: Box::new(Expr {
                id: NodeId(0),
                kind: ExprKind::Boolean(true),
                span: Span::default(),
            }),
        };
        let infer = InferType::from_type(&refined, &HashMap::new());
        assert_eq!(infer, InferType::Prim(Prim::Integer));
    }

    #[test]
    fn function_arity_mismatch_is_reported() {
        let mut table = UnificationTable::new();
        let one = InferType::Function {
            params: vec![InferType::Prim(Prim::Integer)],
            ret: Box::new(InferType::Unit),
        };
        let two = InferType::Function {
            params: vec![InferType::Prim(Prim::Integer), InferType::Prim(Prim::Integer)],
            ret: Box::new(InferType::Unit),
        };
        assert!(matches!(
            table.unify(&one, &two),
            Err(TypeError::ArityMismatch { .. })
        ));
    }
}
