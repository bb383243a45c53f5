//! Type-expression parsing.
//!
//! Grammar:
//!
//! ```text
//! type      := base modifiers? refinement?
//! base      := TypeIdent generic-args?
//! generic-args := '<' type (',' type)* '>'
//! modifiers := ':' '[' TypeIdent+ ']'
//! refinement := 'where' expr
//! ```
//!
//! Generic argument lists and comparison share `<`; in a type position `<`
//! is always an argument list. The expression parser owns the backtracking
//! case (`parser::expr`).

use crate::ast::types::{TypeExpr, TypeExprKind};
use crate::token::TokenKind;

use super::Parser;

impl<'t, 'i> Parser<'t, 'i> {
    /// Parses a full type expression, including `where` refinements.
    pub(crate) fn parse_type(&mut self) -> Option<TypeExpr> {
        let base = self.parse_type_no_where()?;
        if self.eat(TokenKind::Where) {
            let constraint = self.parse_expr();
            let span = base.span.merge(constraint.span);
            return Some(TypeExpr {
                kind: TypeExprKind::Refined {
                    base: Box::new(base),
                    constraint: Box::new(constraint),
                },
                span,
            });
        }
        Some(base)
    }

    /// Parses a type without consuming a trailing `where`; parameter lists
    /// use this so the where-clause stays attached to the parameter.
    pub(crate) fn parse_type_no_where(&mut self) -> Option<TypeExpr> {
        let (head, head_span) = match self.eat_type_ident() {
            Some(pair) => pair,
            None => {
                let span = self.peek_span();
                self.error_here("E200", "expected a type name");
                return Some(TypeExpr {
                    kind: TypeExprKind::Simple(prove_base::Symbol::EMPTY),
                    span,
                });
            }
        };

        let mut ty = if self.at(&TokenKind::Lt) {
            self.advance();
            let mut args = Vec::new();
            loop {
                match self.parse_type() {
                    Some(arg) => args.push(arg),
                    None => break,
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            let end_span = self.peek_span();
            self.expect(TokenKind::Gt, "'>' to close type arguments");
            TypeExpr {
                kind: TypeExprKind::Generic { head, args },
                span: head_span.merge(end_span),
            }
        } else {
            TypeExpr {
                kind: TypeExprKind::Simple(head),
                span: head_span,
            }
        };

        // `Type:[Mod1 Mod2]` modifier axes.
        if self.at(&TokenKind::Colon) && matches!(self.peek2(), TokenKind::LBracket) {
            self.advance();
            self.advance();
            let mut modifiers = Vec::new();
            while let Some((name, _)) = self.eat_type_ident() {
                modifiers.push(name);
            }
            let end_span = self.peek_span();
            self.expect(TokenKind::RBracket, "']' to close modifier list");
            let span = ty.span.merge(end_span);
            ty = TypeExpr {
                kind: TypeExprKind::Modified {
                    base: Box::new(ty),
                    modifiers,
                },
                span,
            };
        }

        Some(ty)
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::types::TypeExprKind;
    use crate::parser::test_support::parse_type_str;

    #[test]
    fn simple_type() {
        let ty = parse_type_str("Integer");
        assert!(matches!(ty.kind, TypeExprKind::Simple(_)));
    }

    #[test]
    fn generic_type_with_args() {
        let ty = parse_type_str("Result<Config, String>");
        match ty.kind {
            TypeExprKind::Generic { args, .. } => assert_eq!(args.len(), 2),
            other => panic!("expected generic, got {:?}", other),
        }
    }

    #[test]
    fn nested_generic_type() {
        let ty = parse_type_str("List<Result<Integer, String>>");
        match ty.kind {
            TypeExprKind::Generic { args, .. } => {
                assert!(matches!(args[0].kind, TypeExprKind::Generic { .. }));
            }
            other => panic!("expected generic, got {:?}", other),
        }
    }

    #[test]
    fn modified_type_keeps_axis_order() {
        let ty = parse_type_str("Buffer:[Arena Mutable]");
        match ty.kind {
            TypeExprKind::Modified { modifiers, .. } => assert_eq!(modifiers.len(), 2),
            other => panic!("expected modified, got {:?}", other),
        }
    }

    #[test]
    fn refined_type_carries_constraint() {
        let ty = parse_type_str("Integer where 1..65535");
        assert!(matches!(ty.kind, TypeExprKind::Refined { .. }));
    }
}
