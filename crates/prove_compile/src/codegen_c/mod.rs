//! C translation-unit assembly.
//!
//! One module emits one `.c` unit:
//!
//! 1. the runtime ABI prelude and result helpers
//! 2. type definitions (structs topologically ordered by field
//!    dependencies, tagged unions for algebraics, one instance per
//!    monomorphized generic type) with inline constructor helpers
//! 3. foreign `extern` declarations, with the library names recorded for
//!    the linker-flag phase
//! 4. module constants and the module init function
//! 5. forward declarations for every function, then hoisted lambdas, then
//!    the function definitions (one per monomorphized instantiation for
//!    generics)
//! 6. for the entry module, the `main` wrapper: runtime init, argv handoff,
//!    user body, error-arm handling, runtime cleanup

mod emit;
mod runtime;
mod types;

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use prove_base::{Interner, Symbol};
use prove_language::ast::{Body, Module, Verb};

use crate::analysis::check::{const_eval, CheckOutput, ConstValue};
use crate::analysis::types::{param_type_key, Type, TypeDefInfo, TypeDefKind};
use crate::resolve::{Resolved, SymbolId, SymbolKind};

use emit::{codegen_expr, codegen_match_on, codegen_stmt, local_name, EmitCtx};
use runtime::{RESULT_HELPERS, RUNTIME_PRELUDE};
use types::{c_type, mangle_function, sanitize, subst_type};

/// One generated translation unit.
#[derive(Debug)]
pub struct CompiledUnit {
    /// Module name; the driver writes `<name>.c`.
    pub name: String,
    pub source: String,
    /// Libraries named by foreign blocks, for the link line (`-l<name>`).
    pub libraries: Vec<String>,
}

/// Emits one checked module. Deterministic: the same typed AST produces
/// byte-identical C.
pub fn emit_module(
    module: &Module,
    module_name: &str,
    all_modules: &[String],
    resolved: &Resolved,
    check: &CheckOutput,
    interner: &Interner,
) -> CompiledUnit {
    let mut emitter = ModuleEmitter {
        resolved,
        check,
        interner,
        lambdas: Vec::new(),
        lambda_count: 0,
        init_lines: Vec::new(),
    };

    let mut out = String::with_capacity(16 * 1024);
    out.push_str(RUNTIME_PRELUDE);
    out.push_str(RESULT_HELPERS);
    out.push('\n');

    emitter.emit_type_definitions(&mut out);
    let libraries = emitter.emit_foreign_externs(module, &mut out);
    emitter.emit_constants(module, &mut out);
    emitter.emit_forward_declarations(&mut out);

    // Bodies go to a buffer first so hoisted lambdas can print before them.
    let mut bodies = String::new();
    for (index, func) in module.functions.iter().enumerate() {
        emitter.emit_function(func, index, &mut bodies);
    }
    if let Some(main) = module.mains.first() {
        emitter.emit_user_main(main, &mut bodies);
    }

    for lambda in &emitter.lambdas {
        out.push_str(lambda);
        out.push('\n');
    }
    emitter.emit_init_function(module_name, &mut out);
    out.push_str(&bodies);

    if !module.mains.is_empty() {
        emit_c_main(module_name, all_modules, &mut out);
    }

    CompiledUnit { name: module_name.to_string(), source: out, libraries }
}

struct ModuleEmitter<'a> {
    resolved: &'a Resolved,
    check: &'a CheckOutput,
    interner: &'a Interner,
    lambdas: Vec<String>,
    lambda_count: u32,
    init_lines: Vec<String>,
}

impl<'a> ModuleEmitter<'a> {
    fn ctx(&mut self, subst: HashMap<Symbol, Type>, ret_type: Type, fallible: bool) -> EmitCtx<'a> {
        let ret_is_option = matches!(ret_type.erased(), Type::Option(_));
        EmitCtx {
            resolved: self.resolved,
            check: self.check,
            interner: self.interner,
            subst,
            tmp: 0,
            lambdas: Vec::new(),
            lambda_count: self.lambda_count,
            scopes: Vec::new(),
            ret_type,
            fallible,
            ret_is_option,
        }
    }

    fn absorb(&mut self, ctx: EmitCtx) {
        self.lambda_count = ctx.lambda_count;
        self.lambdas.extend(ctx.lambdas);
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn emit_type_definitions(&mut self, out: &mut String) {
        let empty = HashMap::new();
        let ordered = self.ordered_type_defs();
        for info in &ordered {
            if !info.generics.is_empty() {
                continue;
            }
            match &info.kind {
                TypeDefKind::Alias(_) => {}
                TypeDefKind::Record(fields) => {
                    let name = format!("Type_{}", sanitize(self.interner.resolve(info.name)));
                    let _ = writeln!(out, "typedef struct {{");
                    for field in fields {
                        let _ = writeln!(
                            out,
                            "    {} {};",
                            c_type(&field.ty, &empty, self.interner),
                            sanitize(self.interner.resolve(field.name))
                        );
                    }
                    let _ = writeln!(out, "}} {name};\n");
                    self.emit_record_ctor(&name, fields, &empty, out);
                }
                TypeDefKind::Algebraic(variants) => {
                    let name = format!("Type_{}", sanitize(self.interner.resolve(info.name)));
                    self.emit_algebraic(&name, variants, &empty, out);
                }
            }
        }

        // Monomorphized instances of generic types.
        for (head, args) in self.used_applied_types() {
            let Some(info) = self.resolved.registry.get(head) else {
                continue;
            };
            let mut subst = HashMap::new();
            for (generic, arg) in info.generics.iter().zip(&args) {
                subst.insert(*generic, arg.clone());
            }
            let name = format!(
                "Type_{}__{}",
                sanitize(self.interner.resolve(head)),
                sanitize(&param_type_key(&args, self.interner))
            );
            match &info.kind {
                TypeDefKind::Record(fields) => {
                    let _ = writeln!(out, "typedef struct {{");
                    for field in fields {
                        let ty = subst_type(&field.ty, &subst);
                        let _ = writeln!(
                            out,
                            "    {} {};",
                            c_type(&ty, &subst, self.interner),
                            sanitize(self.interner.resolve(field.name))
                        );
                    }
                    let _ = writeln!(out, "}} {name};\n");
                    let substituted: Vec<crate::analysis::types::FieldInfo> = fields
                        .iter()
                        .map(|f| crate::analysis::types::FieldInfo {
                            name: f.name,
                            ty: subst_type(&f.ty, &subst),
                        })
                        .collect();
                    self.emit_record_ctor(&name, &substituted, &subst, out);
                }
                TypeDefKind::Algebraic(variants) => {
                    let substituted: Vec<crate::analysis::types::VariantInfo> = variants
                        .iter()
                        .map(|v| crate::analysis::types::VariantInfo {
                            name: v.name,
                            tag: v.tag,
                            fields: v
                                .fields
                                .iter()
                                .map(|f| crate::analysis::types::FieldInfo {
                                    name: f.name,
                                    ty: subst_type(&f.ty, &subst),
                                })
                                .collect(),
                        })
                        .collect();
                    self.emit_algebraic(&name, &substituted, &subst, out);
                }
                TypeDefKind::Alias(_) => {}
            }
        }
    }

    fn emit_algebraic(
        &self,
        name: &str,
        variants: &[crate::analysis::types::VariantInfo],
        subst: &HashMap<Symbol, Type>,
        out: &mut String,
    ) {
        // Tag constants in declaration order.
        let _ = write!(out, "enum {{ ");
        for (i, variant) in variants.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, ", ");
            }
            let _ = write!(
                out,
                "{name}_tag_{} = {}",
                sanitize(self.interner.resolve(variant.name)),
                variant.tag
            );
        }
        let _ = writeln!(out, " }};");

        let has_payload = variants.iter().any(|v| !v.fields.is_empty());
        let _ = writeln!(out, "typedef struct {{");
        let _ = writeln!(out, "    uint8_t tag;");
        if has_payload {
            let _ = writeln!(out, "    union {{");
            for variant in variants {
                if variant.fields.is_empty() {
                    continue;
                }
                let _ = writeln!(out, "        struct {{");
                for field in &variant.fields {
                    let _ = writeln!(
                        out,
                        "            {} {};",
                        c_type(&field.ty, subst, self.interner),
                        sanitize(self.interner.resolve(field.name))
                    );
                }
                let _ = writeln!(
                    out,
                    "        }} {};",
                    sanitize(self.interner.resolve(variant.name))
                );
            }
            let _ = writeln!(out, "    }} payload;");
        }
        let _ = writeln!(out, "}} {name};\n");

        // Constructor helpers, one per variant. Heap fields are retained on
        // store: the value now lives in a longer-lived location.
        for variant in variants {
            let vname = sanitize(self.interner.resolve(variant.name));
            let params = variant
                .fields
                .iter()
                .map(|f| {
                    format!(
                        "{} {}",
                        c_type(&f.ty, subst, self.interner),
                        sanitize(self.interner.resolve(f.name))
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let params = if params.is_empty() { "void".to_string() } else { params };
            let _ = writeln!(out, "static inline {name} {name}_{vname}({params}) {{");
            let _ = writeln!(out, "    {name} v;");
            let _ = writeln!(out, "    v.tag = {name}_tag_{vname};");
            for field in &variant.fields {
                let fname = sanitize(self.interner.resolve(field.name));
                if field.ty.is_heap() && !field.ty.modifiers().arena {
                    let _ = writeln!(out, "    prove_retain({fname});");
                }
                let _ = writeln!(out, "    v.payload.{vname}.{fname} = {fname};");
            }
            let _ = writeln!(out, "    return v;");
            let _ = writeln!(out, "}}\n");
        }
    }

    fn emit_record_ctor(
        &self,
        name: &str,
        fields: &[crate::analysis::types::FieldInfo],
        subst: &HashMap<Symbol, Type>,
        out: &mut String,
    ) {
        let params = fields
            .iter()
            .map(|f| {
                format!(
                    "{} {}",
                    c_type(&f.ty, subst, self.interner),
                    sanitize(self.interner.resolve(f.name))
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let params = if params.is_empty() { "void".to_string() } else { params };
        let _ = writeln!(out, "static inline {name} {name}_make({params}) {{");
        let _ = writeln!(out, "    {name} v;");
        for field in fields {
            let fname = sanitize(self.interner.resolve(field.name));
            if field.ty.is_heap() && !field.ty.modifiers().arena {
                let _ = writeln!(out, "    prove_retain({fname});");
            }
            let _ = writeln!(out, "    v.{fname} = {fname};");
        }
        let _ = writeln!(out, "    return v;");
        let _ = writeln!(out, "}}\n");
    }

    /// Structs whose fields reference other structs come after them. Cycles
    /// (through indirection the language cannot express today) fall back to
    /// declaration order.
    fn ordered_type_defs(&self) -> Vec<TypeDefInfo> {
        let mut remaining: Vec<TypeDefInfo> = self.resolved.registry.iter().cloned().collect();
        remaining.sort_by_key(|info| info.span.start);
        let mut ordered = Vec::new();
        let mut emitted: HashSet<Symbol> = HashSet::new();
        while !remaining.is_empty() {
            let before = remaining.len();
            remaining.retain(|info| {
                let deps = type_def_deps(info);
                if deps.iter().all(|d| emitted.contains(d) || *d == info.name) {
                    emitted.insert(info.name);
                    ordered.push(info.clone());
                    false
                } else {
                    true
                }
            });
            if remaining.len() == before {
                ordered.extend(remaining.drain(..));
            }
        }
        ordered
    }

    /// All concrete `Applied` instantiations observed by the checker.
    fn used_applied_types(&self) -> Vec<(Symbol, Vec<Type>)> {
        let mut seen: Vec<(Symbol, Vec<Type>)> = Vec::new();
        let mut visit = |ty: &Type| collect_applied(ty, &mut seen);
        for ty in self.check.types.values() {
            visit(ty);
        }
        for (_, id) in self.resolved.table.functions() {
            if let Some(info) = self.resolved.table.get(id).func() {
                for p in &info.params {
                    visit(p);
                }
                visit(&info.ret);
            }
        }
        seen.sort_by_key(|(head, args)| {
            (head.index(), param_type_key(args, self.interner))
        });
        seen
    }

    // ------------------------------------------------------------------
    // Foreign blocks & constants
    // ------------------------------------------------------------------

    fn emit_foreign_externs(&self, module: &Module, out: &mut String) -> Vec<String> {
        let empty = HashMap::new();
        let mut libraries = Vec::new();
        for block in &module.foreigns {
            if !block.library.is_empty() && !libraries.contains(&block.library) {
                libraries.push(block.library.clone());
            }
            let _ = writeln!(out, "/* foreign \"{}\" */", block.library);
            for decl in &block.decls {
                let params = decl
                    .params
                    .iter()
                    .map(|p| {
                        let ty = crate::resolve::lower_type_expr(
                            &p.ty,
                            &self.resolved.registry,
                            &[],
                            self.interner,
                            &mut Vec::new(),
                        );
                        c_type(&ty, &empty, self.interner)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let params = if params.is_empty() { "void".to_string() } else { params };
                let ret = match &decl.ret {
                    Some(ty) => {
                        let lowered = crate::resolve::lower_type_expr(
                            ty,
                            &self.resolved.registry,
                            &[],
                            self.interner,
                            &mut Vec::new(),
                        );
                        c_type(&lowered, &empty, self.interner)
                    }
                    None => "void".to_string(),
                };
                let _ = writeln!(
                    out,
                    "extern {ret} {}({params});",
                    sanitize(self.interner.resolve(decl.name))
                );
            }
            out.push('\n');
        }
        libraries
    }

    fn emit_constants(&mut self, module: &Module, out: &mut String) {
        for constant in &module.constants {
            let cname = format!("g_{}", sanitize(self.interner.resolve(constant.name)));
            let ty = self
                .check
                .types
                .get(&constant.value.id)
                .cloned()
                .unwrap_or(Type::INTEGER);
            match const_eval(&constant.value) {
                Some(ConstValue::Int(v)) => {
                    let _ = writeln!(out, "static const int64_t {cname} = INT64_C({v});");
                }
                Some(ConstValue::Dec(v)) => {
                    let _ = writeln!(out, "static const double {cname} = {v};");
                }
                Some(ConstValue::Bool(v)) => {
                    let _ = writeln!(out, "static const bool {cname} = {v};");
                }
                _ => {
                    // Needs runtime construction; initialized by the module
                    // init function.
                    let empty = HashMap::new();
                    let _ = writeln!(out, "static {} {cname};", c_type(&ty, &empty, self.interner));
                    let mut ctx = self.ctx(HashMap::new(), Type::Unit, false);
                    let mut pre = Vec::new();
                    let value = codegen_expr(&constant.value, &mut pre, &mut ctx);
                    self.absorb(ctx);
                    for line in pre {
                        self.init_lines.push(format!("    {line}"));
                    }
                    self.init_lines.push(format!("    {cname} = {value};"));
                }
            }
        }
        out.push('\n');
    }

    fn emit_init_function(&self, module_name: &str, out: &mut String) {
        let _ = writeln!(out, "void prove_init_{}(void) {{", sanitize(module_name));
        for line in &self.init_lines {
            out.push_str(line);
            out.push('\n');
        }
        let _ = writeln!(out, "}}\n");
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn local_function_symbols(&self) -> HashMap<usize, SymbolId> {
        let mut map = HashMap::new();
        for (_, id) in self.resolved.table.functions() {
            if let Some(info) = self.resolved.table.get(id).func() {
                if let Some(index) = info.def_index {
                    map.insert(index, id);
                }
            }
        }
        map
    }

    /// Declarations are sorted by mangled name so the unit is byte-stable
    /// across runs.
    fn emit_forward_declarations(&self, out: &mut String) {
        let empty = HashMap::new();
        let mut lines: Vec<String> = Vec::new();
        for (_, id) in self.resolved.table.functions() {
            let data = self.resolved.table.get(id);
            if !matches!(data.kind, SymbolKind::Function) {
                continue;
            }
            let Some(info) = data.func() else { continue };
            let verb = match &data.ty {
                Type::Function { verb, .. } => *verb,
                _ => Verb::Transforms,
            };
            let instantiations: Vec<Vec<Type>> = if info.generics.is_empty() {
                vec![Vec::new()]
            } else {
                self.check.mono.get(&id).cloned().unwrap_or_default()
            };
            for type_args in instantiations {
                let mut subst = HashMap::new();
                for (generic, arg) in info.generics.iter().zip(&type_args) {
                    subst.insert(*generic, arg.clone());
                }
                let name =
                    mangle_function(verb, data.name, &info.params, &type_args, self.interner);
                let ret = if info.fallible {
                    "Prove_Result".to_string()
                } else {
                    let ret_ty = subst_type(&info.ret, &subst);
                    c_type(&ret_ty, &empty, self.interner)
                };
                let params = info
                    .params
                    .iter()
                    .zip(info.param_names.iter().chain(std::iter::repeat(&Symbol::EMPTY)))
                    .map(|(ty, pname)| {
                        let concrete = subst_type(ty, &subst);
                        format!(
                            "{} {}",
                            c_type(&concrete, &empty, self.interner),
                            local_name(*pname, self.interner)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                let params = if params.is_empty() { "void".to_string() } else { params };
                lines.push(format!("{ret} {name}({params});"));
            }
        }
        lines.sort();
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
    }

    fn emit_function(
        &mut self,
        func: &prove_language::ast::FunctionDef,
        index: usize,
        out: &mut String,
    ) {
        let Some(symbol) = self.local_function_symbols().get(&index).copied() else {
            return;
        };
        let data = self.resolved.table.get(symbol).clone();
        let Some(info) = data.func().cloned() else { return };

        let instantiations: Vec<Vec<Type>> = if info.generics.is_empty() {
            vec![Vec::new()]
        } else {
            // Uninstantiated generics have no callers and are not emitted.
            self.check.mono.get(&symbol).cloned().unwrap_or_default()
        };

        for type_args in instantiations {
            let mut subst = HashMap::new();
            for (generic, arg) in info.generics.iter().zip(&type_args) {
                subst.insert(*generic, arg.clone());
            }
            let name = mangle_function(func.verb, func.name, &info.params, &type_args, self.interner);
            let ret_ty = subst_type(&info.ret, &subst);
            let ret_c = if info.fallible {
                "Prove_Result".to_string()
            } else {
                c_type(&ret_ty, &subst, self.interner)
            };
            let params = func
                .params
                .iter()
                .zip(&info.params)
                .map(|(p, ty)| {
                    let concrete = subst_type(ty, &subst);
                    format!(
                        "{} {}",
                        c_type(&concrete, &subst, self.interner),
                        local_name(p.name, self.interner)
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            let params = if params.is_empty() { "void".to_string() } else { params };

            let _ = writeln!(out, "{ret_c} {name}({params}) {{");
            let mut ctx = self.ctx(subst.clone(), ret_ty.clone(), info.fallible);
            ctx.scopes.push(Vec::new());

            // `requires` and `assume` predicates that the checker could not
            // discharge statically become boundary validators at entry.
            for annotation in &func.annotations {
                let (predicate, label) = match &annotation.kind {
                    prove_language::ast::AnnotationKind::Requires(p) => (p, "requires"),
                    prove_language::ast::AnnotationKind::Assume(p) => (p, "assume"),
                    _ => continue,
                };
                let mut pre = Vec::new();
                let cond = codegen_expr(predicate, &mut pre, &mut ctx);
                for line in pre {
                    let _ = writeln!(out, "    {line}");
                }
                let fn_name = sanitize(self.interner.resolve(func.name));
                let _ = writeln!(
                    out,
                    "    if (!({cond})) {{ prove_refinement_fail(\"{label}\", \"{fn_name}\"); }}"
                );
            }

            match &func.body {
                Body::Statements(stmts) => {
                    let terminal = stmts
                        .iter()
                        .rposition(|s| matches!(s.kind, prove_language::ast::StmtKind::Expr(_)));
                    for (i, stmt) in stmts.iter().enumerate() {
                        codegen_stmt(stmt, Some(i) == terminal, out, 1, &mut ctx);
                    }
                    if terminal.is_none() {
                        ctx.emit_releases(out, 1, None);
                        if info.fallible {
                            let _ = writeln!(out, "    return prove_ok_unit();");
                        }
                    }
                }
                Body::MatchArms(arms) => {
                    let subject_var = func
                        .params
                        .first()
                        .map(|p| local_name(p.name, self.interner))
                        .unwrap_or_else(|| "0".to_string());
                    let subject_ty = info
                        .params
                        .first()
                        .map(|t| subst_type(t, &subst))
                        .unwrap_or(Type::Unknown);
                    let mut pre = Vec::new();
                    codegen_match_on(
                        &subject_var,
                        &subject_ty,
                        arms,
                        None,
                        true,
                        &mut pre,
                        &mut ctx,
                    );
                    for line in pre {
                        let _ = writeln!(out, "    {line}");
                    }
                    // Non-exhaustive fallthrough is unreachable after the
                    // checker, but C needs a return on every path.
                    if info.fallible {
                        let _ = writeln!(out, "    return prove_ok_unit();");
                    } else if !matches!(ret_ty.erased(), Type::Unit | Type::Never) {
                        let _ = writeln!(out, "    return ({}){{0}};", c_type(&ret_ty, &subst, self.interner));
                    }
                }
            }
            let _ = writeln!(out, "}}\n");
            self.absorb(ctx);
        }
    }

    fn emit_user_main(&mut self, main: &prove_language::ast::MainDef, out: &mut String) {
        let _ = writeln!(out, "static Prove_Result prove_user_main(void) {{");
        let mut ctx = self.ctx(HashMap::new(), Type::Unit, true);
        ctx.scopes.push(Vec::new());
        // Main's value is its exit status; every statement runs for effect.
        for stmt in &main.body {
            codegen_stmt(stmt, false, out, 1, &mut ctx);
        }
        ctx.emit_releases(out, 1, None);
        let _ = writeln!(out, "    return prove_ok_unit();");
        let _ = writeln!(out, "}}\n");
        self.absorb(ctx);
    }
}

/// The C entry point per the runtime contract.
fn emit_c_main(module_name: &str, all_modules: &[String], out: &mut String) {
    let _ = writeln!(out, "int main(int argc, char **argv) {{");
    let _ = writeln!(out, "    prove_runtime_init();");
    let _ = writeln!(out, "    prove_args_init(argc, argv);");
    let mut inits: Vec<&String> = all_modules.iter().collect();
    inits.sort();
    for name in inits {
        if name != module_name {
            let _ = writeln!(out, "    extern void prove_init_{}(void);", sanitize(name));
        }
        let _ = writeln!(out, "    prove_init_{}();", sanitize(name));
    }
    let _ = writeln!(out, "    Prove_Result __r = prove_user_main();");
    let _ = writeln!(out, "    if (__r.tag == PROVE_ERR) {{");
    let _ = writeln!(out, "        if (__r.err) {{ prove_eprintln(__r.err); }}");
    let _ = writeln!(out, "        prove_runtime_cleanup();");
    let _ = writeln!(out, "        return 1;");
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "    prove_runtime_cleanup();");
    let _ = writeln!(out, "    return 0;");
    let _ = writeln!(out, "}}");
}

fn type_def_deps(info: &TypeDefInfo) -> Vec<Symbol> {
    let mut deps = Vec::new();
    let mut visit = |ty: &Type| {
        if let Type::Algebraic(name) | Type::Record(name) = ty.erased() {
            deps.push(*name);
        }
    };
    match &info.kind {
        TypeDefKind::Alias(ty) => visit(ty),
        TypeDefKind::Algebraic(variants) => {
            for variant in variants {
                for field in &variant.fields {
                    visit(&field.ty);
                }
            }
        }
        TypeDefKind::Record(fields) => {
            for field in fields {
                visit(&field.ty);
            }
        }
    }
    deps
}

fn collect_applied(ty: &Type, seen: &mut Vec<(Symbol, Vec<Type>)>) {
    match ty {
        Type::Applied { head, args } => {
            let concrete = args.iter().all(|a| !matches!(a, Type::Param(_) | Type::Unknown));
            if concrete {
                let entry = (*head, args.clone());
                if !seen.contains(&entry) {
                    seen.push(entry);
                }
            }
            for arg in args {
                collect_applied(arg, seen);
            }
        }
        Type::Refined { base, .. } => collect_applied(base, seen),
        Type::Function { params, ret, .. } => {
            for p in params {
                collect_applied(p, seen);
            }
            collect_applied(ret, seen);
        }
        Type::Option(inner) | Type::List(inner) => collect_applied(inner, seen),
        Type::Result(ok, err) => {
            collect_applied(ok, seen);
            collect_applied(err, seen);
        }
        _ => {}
    }
}
