//! C type mapping and name mangling.
//!
//! | Prove type | C type |
//! |------------|--------|
//! | `Integer` | `int64_t` |
//! | `Decimal` | `double` |
//! | `Float` | `float` |
//! | `Boolean` | `bool` |
//! | `Byte` | `uint8_t` |
//! | `Character` | `uint32_t` (a scalar value) |
//! | `String` | `Prove_String *` |
//! | `List<T>` | `Prove_List *` |
//! | `Option<T>` / `Result<T,E>` | `Prove_Result` |
//! | algebraic / record | `Type_<Name>` tagged struct |
//! | `Unit` | `void` (or `int64_t 0` in value positions) |
//!
//! Refinements erase to the base C type. Generic types and functions are
//! monomorphized: each instantiation gets its own mangled name with the
//! type-argument key appended.

use std::collections::HashMap;

use prove_base::{Interner, Symbol};
use prove_language::ast::Verb;

use crate::analysis::types::{param_type_key, Prim, Type};
use crate::resolve::{FuncInfo, SymbolData};

/// Replaces everything outside `[A-Za-z0-9_]` so keys survive as C
/// identifiers.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// The broad payload class a value travels in: selects `Prove_Result`
/// accessors and per-class list routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadClass {
    Int,
    Double,
    Pointer,
    Unit,
}

pub fn payload_class(ty: &Type) -> PayloadClass {
    match ty.erased() {
        Type::Prim(Prim::Decimal, _) | Type::Prim(Prim::Float, _) => PayloadClass::Double,
        Type::Prim(Prim::String, _) => PayloadClass::Pointer,
        Type::Prim(_, _) => PayloadClass::Int,
        Type::Unit | Type::Never => PayloadClass::Unit,
        Type::List(_) => PayloadClass::Pointer,
        Type::Option(_) | Type::Result(_, _) => PayloadClass::Pointer,
        Type::Algebraic(_) | Type::Record(_) | Type::Applied { .. } => PayloadClass::Pointer,
        _ => PayloadClass::Int,
    }
}

/// The accessor field of the `Prove_Result` payload union for a type.
pub fn payload_field(ty: &Type) -> &'static str {
    match payload_class(ty) {
        PayloadClass::Int | PayloadClass::Unit => "i",
        PayloadClass::Double => "d",
        PayloadClass::Pointer => "ptr",
    }
}

/// Renders a canonical type as C source. `subst` resolves generic
/// parameters for the instantiation being emitted.
pub fn c_type(ty: &Type, subst: &HashMap<Symbol, Type>, interner: &Interner) -> String {
    match ty.erased() {
        Type::Prim(Prim::Integer, _) => "int64_t".to_string(),
        Type::Prim(Prim::Decimal, _) => "double".to_string(),
        Type::Prim(Prim::Float, _) => "float".to_string(),
        Type::Prim(Prim::Boolean, _) => "bool".to_string(),
        Type::Prim(Prim::Byte, _) => "uint8_t".to_string(),
        Type::Prim(Prim::Character, _) => "uint32_t".to_string(),
        Type::Prim(Prim::String, _) => "Prove_String *".to_string(),
        Type::List(_) => "Prove_List *".to_string(),
        Type::Option(_) | Type::Result(_, _) => "Prove_Result".to_string(),
        Type::Algebraic(name) | Type::Record(name) => {
            format!("Type_{}", sanitize(interner.resolve(*name)))
        }
        Type::Applied { head, args } => {
            let resolved: Vec<Type> = args.iter().map(|a| subst_type(a, subst)).collect();
            format!(
                "Type_{}__{}",
                sanitize(interner.resolve(*head)),
                sanitize(&param_type_key(&resolved, interner))
            )
        }
        Type::Param(name) => match subst.get(name) {
            Some(concrete) => c_type(concrete, subst, interner),
            None => "int64_t".to_string(),
        },
        Type::Function { params, ret, .. } => {
            // Captureless lambdas travel as plain function pointers.
            let param_list = if params.is_empty() {
                "void".to_string()
            } else {
                params
                    .iter()
                    .map(|p| c_type(p, subst, interner))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            format!("{} (*)({})", c_type(ret, subst, interner), param_list)
        }
        Type::Unit | Type::Never => "void".to_string(),
        Type::Unknown => "int64_t".to_string(),
        Type::Refined { .. } => unreachable!("erased() removes refinements"),
    }
}

/// Substitutes generic parameters through a type.
pub fn subst_type(ty: &Type, subst: &HashMap<Symbol, Type>) -> Type {
    match ty {
        Type::Param(name) => subst.get(name).cloned().unwrap_or_else(|| ty.clone()),
        Type::Refined { base, constraint } => Type::Refined {
            base: Box::new(subst_type(base, subst)),
            constraint: constraint.clone(),
        },
        Type::Function { verb, params, ret, fallible } => Type::Function {
            verb: *verb,
            params: params.iter().map(|p| subst_type(p, subst)).collect(),
            ret: Box::new(subst_type(ret, subst)),
            fallible: *fallible,
        },
        Type::Applied { head, args } => Type::Applied {
            head: *head,
            args: args.iter().map(|a| subst_type(a, subst)).collect(),
        },
        Type::Option(inner) => Type::Option(Box::new(subst_type(inner, subst))),
        Type::Result(ok, err) => Type::Result(
            Box::new(subst_type(ok, subst)),
            Box::new(subst_type(err, subst)),
        ),
        Type::List(elem) => Type::List(Box::new(subst_type(elem, subst))),
        other => other.clone(),
    }
}

/// The mangled C name of a function: `prove_<verb>_<name>_<paramtypekey>`,
/// with the instantiation key appended for generic functions.
pub fn mangle_function(
    verb: Verb,
    name: Symbol,
    params: &[Type],
    type_args: &[Type],
    interner: &Interner,
) -> String {
    let mut out = format!(
        "prove_{}_{}_{}",
        verb.keyword(),
        sanitize(interner.resolve(name)),
        sanitize(&param_type_key(params, interner))
    );
    if !type_args.is_empty() {
        out.push_str("__");
        out.push_str(&sanitize(&param_type_key(type_args, interner)));
    }
    out
}

/// Mangles a resolved symbol, for call sites.
pub fn mangle_symbol(data: &SymbolData, info: &FuncInfo, type_args: &[Type], interner: &Interner) -> String {
    let verb = match &data.ty {
        Type::Function { verb, .. } => *verb,
        _ => Verb::Transforms,
    };
    mangle_function(verb, data.name, &info.params, type_args, interner)
}

/// Escapes a Rust string into a C string literal body, returning the byte
/// length as C sees it.
pub fn c_string_literal(text: &str) -> (String, usize) {
    let mut out = String::with_capacity(text.len() + 2);
    let mut len = 0usize;
    for byte in text.bytes() {
        len += 1;
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(byte as char),
            other => out.push_str(&format!("\\x{:02x}", other)),
        }
    }
    (out, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_map_directly() {
        let interner = Interner::new();
        let subst = HashMap::new();
        assert_eq!(c_type(&Type::INTEGER, &subst, &interner), "int64_t");
        assert_eq!(c_type(&Type::DECIMAL, &subst, &interner), "double");
        assert_eq!(c_type(&Type::BOOLEAN, &subst, &interner), "bool");
        assert_eq!(c_type(&Type::STRING, &subst, &interner), "Prove_String *");
    }

    #[test]
    fn refinements_erase_in_c() {
        use prove_base::Span;
        use prove_language::ast::{Expr, ExprKind, NodeId};
        let interner = Interner::new();
        let port = Type::Refined {
            base: Box::new(Type::INTEGER),
            constraint: Box::new(Expr {
                id: NodeId(0),
                kind: ExprKind::Boolean(true),
                span: Span::default(),
            }),
        };
        assert_eq!(c_type(&port, &HashMap::new(), &interner), "int64_t");
    }

    #[test]
    fn option_and_result_share_prove_result() {
        let interner = Interner::new();
        let subst = HashMap::new();
        let option = Type::Option(Box::new(Type::INTEGER));
        let result = Type::Result(Box::new(Type::STRING), Box::new(Type::STRING));
        assert_eq!(c_type(&option, &subst, &interner), "Prove_Result");
        assert_eq!(c_type(&result, &subst, &interner), "Prove_Result");
    }

    #[test]
    fn mangling_includes_verb_name_and_params() {
        let mut interner = Interner::new();
        let email = interner.intern("email");
        let validates = mangle_function(Verb::Validates, email, &[Type::STRING], &[], &interner);
        let transforms = mangle_function(Verb::Transforms, email, &[Type::STRING], &[], &interner);
        assert_eq!(validates, "prove_validates_email_String");
        assert_eq!(transforms, "prove_transforms_email_String");
        assert_ne!(validates, transforms);
    }

    #[test]
    fn generic_instantiations_get_distinct_names() {
        let mut interner = Interner::new();
        let first = interner.intern("first");
        let t = interner.intern("T");
        let params = [Type::List(Box::new(Type::Param(t)))];
        let int_inst = mangle_function(Verb::Transforms, first, &params, &[Type::INTEGER], &interner);
        let str_inst = mangle_function(Verb::Transforms, first, &params, &[Type::STRING], &interner);
        assert_ne!(int_inst, str_inst);
        assert!(int_inst.ends_with("__Integer"));
    }

    #[test]
    fn c_string_literal_escapes_and_counts_bytes() {
        let (escaped, len) = c_string_literal("a\"b\n");
        assert_eq!(escaped, "a\\\"b\\n");
        assert_eq!(len, 4);
    }

    #[test]
    fn payload_classes_cover_the_union() {
        assert_eq!(payload_class(&Type::INTEGER), PayloadClass::Int);
        assert_eq!(payload_class(&Type::DECIMAL), PayloadClass::Double);
        assert_eq!(payload_class(&Type::STRING), PayloadClass::Pointer);
        assert_eq!(payload_class(&Type::Unit), PayloadClass::Unit);
        assert_eq!(payload_field(&Type::DECIMAL), "d");
    }
}
