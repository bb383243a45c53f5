//! The built-in function surface the runtime ABI provides.
//!
//! Builtins register in the same verb-dispatched table as user functions,
//! so overloads (`len` over `String` and `List<T>`, `max` over `Integer`
//! and `Decimal`) are ordinary identity entries. The IO set here is the
//! authority for purity enforcement: calling any of these from a pure verb
//! is E362.

use prove_base::{Interner, Span, Symbol};
use prove_language::ast::Verb;

use crate::analysis::types::{param_type_key, Type};

use super::{FuncInfo, FuncKey, SymbolData, SymbolExtra, SymbolKind, SymbolTable};

/// Runtime routines with observable effects. Pure verbs may not call them.
pub const IO_BUILTINS: &[&str] = &[
    "println",
    "print",
    "readln",
    "read_file",
    "write_file",
    "open",
    "close",
    "flush",
    "sleep",
];

pub fn is_io_builtin(name: &str) -> bool {
    IO_BUILTINS.contains(&name)
}

pub(crate) fn register(table: &mut SymbolTable, interner: &mut Interner) {
    let t = interner.intern("T");
    let u = interner.intern("U");
    let list_t = Type::List(Box::new(Type::Param(t)));

    let entries: Vec<(&str, Verb, Vec<Type>, Type, bool, Vec<Symbol>)> = vec![
        // IO surface.
        ("println", Verb::Outputs, vec![Type::STRING], Type::Unit, false, vec![]),
        ("print", Verb::Outputs, vec![Type::STRING], Type::Unit, false, vec![]),
        ("readln", Verb::Inputs, vec![], Type::STRING, true, vec![]),
        ("read_file", Verb::Inputs, vec![Type::STRING], Type::STRING, true, vec![]),
        (
            "write_file",
            Verb::Outputs,
            vec![Type::STRING, Type::STRING],
            Type::Unit,
            true,
            vec![],
        ),
        ("open", Verb::Inputs, vec![Type::STRING], Type::INTEGER, true, vec![]),
        ("close", Verb::Outputs, vec![Type::INTEGER], Type::Unit, true, vec![]),
        ("flush", Verb::Outputs, vec![], Type::Unit, false, vec![]),
        ("sleep", Verb::Outputs, vec![Type::INTEGER], Type::Unit, false, vec![]),
        // Strings.
        ("len", Verb::Reads, vec![Type::STRING], Type::INTEGER, false, vec![]),
        ("trim", Verb::Transforms, vec![Type::STRING], Type::STRING, false, vec![]),
        ("lowercase", Verb::Transforms, vec![Type::STRING], Type::STRING, false, vec![]),
        ("uppercase", Verb::Transforms, vec![Type::STRING], Type::STRING, false, vec![]),
        (
            "concat",
            Verb::Transforms,
            vec![Type::STRING, Type::STRING],
            Type::STRING,
            false,
            vec![],
        ),
        (
            "contains",
            Verb::Validates,
            vec![Type::STRING, Type::STRING],
            Type::BOOLEAN,
            false,
            vec![],
        ),
        (
            "split",
            Verb::Transforms,
            vec![Type::STRING, Type::STRING],
            Type::List(Box::new(Type::STRING)),
            false,
            vec![],
        ),
        (
            "join",
            Verb::Transforms,
            vec![Type::List(Box::new(Type::STRING)), Type::STRING],
            Type::STRING,
            false,
            vec![],
        ),
        (
            "parse_int",
            Verb::Transforms,
            vec![Type::STRING],
            Type::Option(Box::new(Type::INTEGER)),
            false,
            vec![],
        ),
        // Numerics.
        (
            "max",
            Verb::Transforms,
            vec![Type::INTEGER, Type::INTEGER],
            Type::INTEGER,
            false,
            vec![],
        ),
        (
            "min",
            Verb::Transforms,
            vec![Type::INTEGER, Type::INTEGER],
            Type::INTEGER,
            false,
            vec![],
        ),
        (
            "max",
            Verb::Transforms,
            vec![Type::DECIMAL, Type::DECIMAL],
            Type::DECIMAL,
            false,
            vec![],
        ),
        (
            "min",
            Verb::Transforms,
            vec![Type::DECIMAL, Type::DECIMAL],
            Type::DECIMAL,
            false,
            vec![],
        ),
        ("abs", Verb::Transforms, vec![Type::INTEGER], Type::INTEGER, false, vec![]),
        ("abs", Verb::Transforms, vec![Type::DECIMAL], Type::DECIMAL, false, vec![]),
        // Lists.
        ("len", Verb::Reads, vec![list_t.clone()], Type::INTEGER, false, vec![t]),
        (
            "append",
            Verb::Transforms,
            vec![list_t.clone(), Type::Param(t)],
            list_t.clone(),
            false,
            vec![t],
        ),
        (
            "head",
            Verb::Reads,
            vec![list_t.clone()],
            Type::Option(Box::new(Type::Param(t))),
            false,
            vec![t],
        ),
        ("tail", Verb::Transforms, vec![list_t.clone()], list_t.clone(), false, vec![t]),
        (
            "map",
            Verb::Transforms,
            vec![
                list_t.clone(),
                Type::Function {
                    verb: Verb::Transforms,
                    params: vec![Type::Param(t)],
                    ret: Box::new(Type::Param(u)),
                    fallible: false,
                },
            ],
            Type::List(Box::new(Type::Param(u))),
            false,
            vec![t, u],
        ),
        (
            "filter",
            Verb::Transforms,
            vec![
                list_t.clone(),
                Type::Function {
                    verb: Verb::Validates,
                    params: vec![Type::Param(t)],
                    ret: Box::new(Type::BOOLEAN),
                    fallible: false,
                },
            ],
            list_t.clone(),
            false,
            vec![t],
        ),
        (
            "reduce",
            Verb::Transforms,
            vec![
                list_t.clone(),
                Type::Param(u),
                Type::Function {
                    verb: Verb::Transforms,
                    params: vec![Type::Param(u), Type::Param(t)],
                    ret: Box::new(Type::Param(u)),
                    fallible: false,
                },
            ],
            Type::Param(u),
            false,
            vec![t, u],
        ),
        (
            "sum",
            Verb::Transforms,
            vec![Type::List(Box::new(Type::INTEGER))],
            Type::INTEGER,
            false,
            vec![],
        ),
    ];

    for (name, verb, params, ret, fallible, generics) in entries {
        let is_io = is_io_builtin(name);
        let name_sym = interner.intern(name);
        let key = FuncKey {
            verb,
            name: name_sym,
            param_key: param_type_key(&params, interner),
        };
        let info = FuncInfo {
            params: params.clone(),
            param_names: Vec::new(),
            ret: ret.clone(),
            fallible,
            is_io,
            generics,
            def_index: None,
        };
        let id = table.push(SymbolData {
            kind: SymbolKind::BuiltinFunction,
            name: name_sym,
            span: Span::default(),
            ty: Type::Function { verb, params, ret: Box::new(ret), fallible },
            extra: SymbolExtra::Function(info),
        });
        let _ = table.register_function(key, id);
    }

    // Built-in constructors: Option and Result variants participate in
    // expressions, patterns, and exhaustiveness like user variants.
    let e = interner.intern("E");
    let option = interner.intern("Option");
    let result_ty = interner.intern("Result");
    let some = interner.intern("Some");
    let none = interner.intern("None");
    let ok = interner.intern("Ok");
    let err = interner.intern("Err");
    table.push_constructor(
        none,
        Span::default(),
        Type::Function {
            verb: Verb::Creates,
            params: vec![],
            ret: Box::new(Type::Option(Box::new(Type::Param(t)))),
            fallible: false,
        },
        option,
        0,
    );
    table.push_constructor(
        some,
        Span::default(),
        Type::Function {
            verb: Verb::Creates,
            params: vec![Type::Param(t)],
            ret: Box::new(Type::Option(Box::new(Type::Param(t)))),
            fallible: false,
        },
        option,
        1,
    );
    table.push_constructor(
        ok,
        Span::default(),
        Type::Function {
            verb: Verb::Creates,
            params: vec![Type::Param(t)],
            ret: Box::new(Type::Result(
                Box::new(Type::Param(t)),
                Box::new(Type::Param(e)),
            )),
            fallible: false,
        },
        result_ty,
        0,
    );
    table.push_constructor(
        err,
        Span::default(),
        Type::Function {
            verb: Verb::Creates,
            params: vec![Type::Param(e)],
            ret: Box::new(Type::Result(
                Box::new(Type::Param(t)),
                Box::new(Type::Param(e)),
            )),
            fallible: false,
        },
        result_ty,
        1,
    );

    // Built-in constants.
    let pi = interner.intern("pi");
    let id = table.push(SymbolData {
        kind: SymbolKind::Constant,
        name: pi,
        span: Span::default(),
        ty: Type::DECIMAL,
        extra: SymbolExtra::None,
    });
    table.register_value(pi, id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_set_matches_spec_list() {
        for name in ["println", "print", "readln", "read_file", "write_file", "open", "close", "flush", "sleep"] {
            assert!(is_io_builtin(name), "{name} should be IO");
        }
        assert!(!is_io_builtin("len"));
        assert!(!is_io_builtin("trim"));
    }

    #[test]
    fn overloads_register_distinct_identities() {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new();
        register(&mut table, &mut interner);
        let len = interner.intern("len");
        assert_eq!(table.function_candidates(len).len(), 2);
        let max = interner.intern("max");
        assert_eq!(table.function_candidates(max).len(), 2);
    }

    #[test]
    fn pi_is_a_value_binding() {
        let mut interner = Interner::new();
        let mut table = SymbolTable::new();
        register(&mut table, &mut interner);
        let pi = interner.intern("pi");
        assert!(table.value(pi).is_some());
    }
}
