//! Expression and statement emission.
//!
//! Expressions render to C expression strings; constructs that need
//! statement context (fail propagation, match, list literals) push setup
//! lines into a prelude buffer that the enclosing statement flushes first.
//!
//! Scope bookkeeping inserts the reference-counting calls inline: a local
//! that owns a heap value is released at scope end unless it is the value
//! being returned; reassignment of a Mutable heap local releases the old
//! value first. Arena-modified types skip refcounting entirely.

use std::collections::HashMap;
use std::fmt::Write as _;

use prove_base::{Interner, Symbol};
use prove_language::ast::{
    Expr, ExprKind, MatchArm, PatLiteral, Pattern, PatternKind, Stmt, StmtKind, StrLitPiece,
};

use crate::analysis::check::CheckOutput;
use crate::analysis::types::{Prim, Type, TypeDefKind};
use crate::resolve::{Resolution, Resolved, SymbolExtra, SymbolKind};

use super::types::{
    c_string_literal, c_type, mangle_symbol, payload_class, payload_field, sanitize, subst_type,
    PayloadClass,
};

pub(super) struct EmitCtx<'a> {
    pub resolved: &'a Resolved,
    pub check: &'a CheckOutput,
    pub interner: &'a Interner,
    /// Generic substitution for the instantiation being emitted.
    pub subst: HashMap<Symbol, Type>,
    pub tmp: u32,
    pub lambdas: Vec<String>,
    pub lambda_count: u32,
    /// Stack of scopes; each holds `(c_name, type, returned)` for owned
    /// heap locals.
    pub scopes: Vec<Vec<(String, Type)>>,
    pub ret_type: Type,
    pub fallible: bool,
    /// Option-typed `!` inside an Option-returning function synthesizes a
    /// bare none; everything else forwards the error string.
    pub ret_is_option: bool,
}

impl<'a> EmitCtx<'a> {
    pub fn fresh(&mut self) -> String {
        let name = format!("__t{}", self.tmp);
        self.tmp += 1;
        name
    }

    pub fn ty_of(&self, expr: &Expr) -> Type {
        let ty = self.check.types.get(&expr.id).cloned().unwrap_or(Type::Unknown);
        subst_type(&ty, &self.subst)
    }

    pub fn ctype(&self, ty: &Type) -> String {
        c_type(ty, &self.subst, self.interner)
    }

    fn own_local(&mut self, name: &str, ty: &Type) {
        if ty.is_heap() && !ty.modifiers().arena {
            if let Some(scope) = self.scopes.last_mut() {
                scope.push((name.to_string(), ty.clone()));
            }
        }
    }

    /// Emits release calls for every owned local in every open scope,
    /// skipping `keep` (the value being returned).
    pub fn emit_releases(&self, out: &mut String, indent: usize, keep: Option<&str>) {
        let pad = "    ".repeat(indent);
        for scope in self.scopes.iter().rev() {
            for (name, _) in scope.iter().rev() {
                if Some(name.as_str()) == keep {
                    continue;
                }
                let _ = writeln!(out, "{pad}prove_release({name});");
            }
        }
    }
}

pub(super) fn local_name(name: Symbol, interner: &Interner) -> String {
    format!("v_{}", sanitize(interner.resolve(name)))
}

// ============================================================================
// Expressions
// ============================================================================

/// Renders an expression, staging a runtime refinement check through a
/// temporary when the checker marked this node.
pub(super) fn codegen_expr(expr: &Expr, pre: &mut Vec<String>, ctx: &mut EmitCtx) -> String {
    let value = codegen_expr_inner(expr, pre, ctx);
    let Some(target) = ctx.check.runtime_checks.get(&expr.id).cloned() else {
        return value;
    };
    let Type::Refined { base, constraint } = &target else {
        return value;
    };
    let tmp = ctx.fresh();
    let value_ty = ctx.ty_of(expr);
    pre.push(format!("{} {tmp} = {value};", ctx.ctype(&value_ty)));
    if let Some(condition) = render_constraint(constraint, &tmp, ctx) {
        let type_name = sanitize(&base.display(ctx.interner));
        pre.push(format!(
            "if (!({condition})) {{ prove_refinement_fail(\"{type_name}\", \"{tmp}\"); }}"
        ));
    }
    tmp
}

fn codegen_expr_inner(expr: &Expr, pre: &mut Vec<String>, ctx: &mut EmitCtx) -> String {
    match &expr.kind {
        ExprKind::Integer(v) => format!("INT64_C({v})"),
        ExprKind::Decimal(v) => {
            if v.fract() == 0.0 && v.is_finite() {
                format!("{v:.1}")
            } else {
                format!("{v}")
            }
        }
        ExprKind::Boolean(v) => if *v { "true" } else { "false" }.to_string(),
        ExprKind::Str { pieces, .. } => codegen_string(pieces, pre, ctx),
        ExprKind::Regex(text) => {
            // Regex literals reach the runtime's parse module as source text.
            let (escaped, len) = c_string_literal(text);
            format!("prove_string_from(\"{escaped}\", {len})")
        }
        ExprKind::Ident(name) => match ctx.resolved.resolution(expr.id) {
            Some(Resolution::Value(id)) => {
                let data = ctx.resolved.table.get(*id);
                match data.kind {
                    SymbolKind::Constant => codegen_constant_ref(data.name, ctx),
                    _ => local_name(*name, ctx.interner),
                }
            }
            Some(Resolution::Functions(_)) => match ctx.check.call_targets.get(&expr.id) {
                Some(symbol) => mangled_target(*symbol, expr, ctx),
                None => local_name(*name, ctx.interner),
            },
            _ => local_name(*name, ctx.interner),
        },
        ExprKind::TypeIdent(_) | ExprKind::TypeApply { .. } => {
            // Bare constructor reference: the helper is the function value.
            match ctx.check.call_targets.get(&expr.id) {
                Some(symbol) => constructor_name(*symbol, expr, ctx),
                None => "0".to_string(),
            }
        }
        ExprKind::Call { callee, args } => codegen_call(expr, callee, args, pre, ctx),
        ExprKind::Field { recv, name } => {
            let recv_c = codegen_expr(recv, pre, ctx);
            format!("{recv_c}.{}", sanitize(ctx.interner.resolve(*name)))
        }
        ExprKind::Pipe { value, target } => codegen_pipe(expr, value, target, pre, ctx),
        ExprKind::FailProp(inner) => codegen_fail_prop(expr, inner, pre, ctx),
        ExprKind::Lambda { params, body } => codegen_lambda(expr, params, body, ctx),
        ExprKind::Valid { args, .. } => {
            let Some(symbol) = ctx.check.call_targets.get(&expr.id).copied() else {
                return "0".to_string();
            };
            let name = mangled_target_symbol(symbol, &[], ctx);
            match args {
                Some(args) => {
                    let rendered: Vec<String> =
                        args.iter().map(|a| codegen_expr(a, pre, ctx)).collect();
                    format!("{name}({})", rendered.join(", "))
                }
                None => name,
            }
        }
        ExprKind::Match { subject, arms } => {
            let result_ty = ctx.ty_of(expr);
            codegen_match_expr(subject, arms, &result_ty, pre, ctx)
        }
        ExprKind::If { .. } | ExprKind::Comptime(_) => {
            // Comptime blocks (and the if-expressions inside them) are
            // evaluated by the checker; only a known value survives to
            // emission.
            "0".to_string()
        }
        ExprKind::Binary { op, lhs, rhs } => {
            use prove_language::ast::BinaryOp;
            let lhs_ty = ctx.ty_of(lhs);
            let l = codegen_expr(lhs, pre, ctx);
            let r = codegen_expr(rhs, pre, ctx);
            let is_string = matches!(lhs_ty.erased(), Type::Prim(Prim::String, _));
            if is_string {
                return match op {
                    BinaryOp::Eq => format!("prove_string_eq({l}, {r})"),
                    BinaryOp::Ne => format!("(!prove_string_eq({l}, {r}))"),
                    BinaryOp::Add => format!("prove_string_concat({l}, {r})"),
                    _ => format!("({l} /* unsupported string op */ , {r})"),
                };
            }
            let op_str = match op {
                BinaryOp::Or => "||",
                BinaryOp::And => "&&",
                BinaryOp::Eq => "==",
                BinaryOp::Ne => "!=",
                BinaryOp::Lt => "<",
                BinaryOp::Gt => ">",
                BinaryOp::Le => "<=",
                BinaryOp::Ge => ">=",
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
                BinaryOp::Mod => "%",
            };
            format!("({l} {op_str} {r})")
        }
        ExprKind::Unary { op, operand } => {
            let inner = codegen_expr(operand, pre, ctx);
            match op {
                prove_language::ast::UnaryOp::Not => format!("(!{inner})"),
                prove_language::ast::UnaryOp::Neg => format!("(-{inner})"),
            }
        }
        ExprKind::Paren(inner) => {
            let inner_c = codegen_expr(inner, pre, ctx);
            format!("({inner_c})")
        }
        ExprKind::List(items) => {
            let elem_ty = match ctx.ty_of(expr).erased() {
                Type::List(elem) => (**elem).clone(),
                _ => Type::INTEGER,
            };
            let tmp = ctx.fresh();
            pre.push(format!("Prove_List *{tmp} = prove_list_new();"));
            for item in items {
                let value = codegen_expr(item, pre, ctx);
                let append = list_fn("prove_list_append", &elem_ty);
                pre.push(format!("{tmp} = {append}({tmp}, {value});"));
            }
            tmp
        }
        ExprKind::Range { lo, hi } => {
            let lo_c = codegen_expr(lo, pre, ctx);
            let hi_c = codegen_expr(hi, pre, ctx);
            format!("prove_range({lo_c}, {hi_c})")
        }
    }
}

fn list_fn(base: &str, elem: &Type) -> String {
    match payload_class(elem) {
        PayloadClass::Double => format!("{base}_f64"),
        PayloadClass::Pointer => format!("{base}_ptr"),
        _ => format!("{base}_i64"),
    }
}

fn codegen_constant_ref(name: Symbol, ctx: &EmitCtx) -> String {
    if ctx.interner.resolve(name) == "pi" {
        return "3.141592653589793".to_string();
    }
    format!("g_{}", sanitize(ctx.interner.resolve(name)))
}

/// Converts a value to `Prove_String *` for interpolation and printing.
pub(super) fn stringify(value: &str, ty: &Type) -> String {
    match ty.erased() {
        Type::Prim(Prim::String, _) => value.to_string(),
        Type::Prim(Prim::Decimal, _) | Type::Prim(Prim::Float, _) => {
            format!("prove_dec_to_string({value})")
        }
        Type::Prim(Prim::Boolean, _) => format!("prove_bool_to_string({value})"),
        _ => format!("prove_int_to_string({value})"),
    }
}

fn codegen_string(pieces: &[StrLitPiece], pre: &mut Vec<String>, ctx: &mut EmitCtx) -> String {
    let mut parts: Vec<String> = Vec::new();
    for piece in pieces {
        match piece {
            StrLitPiece::Text(text) => {
                let (escaped, len) = c_string_literal(text);
                parts.push(format!("prove_string_from(\"{escaped}\", {len})"));
            }
            StrLitPiece::Interp(inner) => {
                let ty = ctx.ty_of(inner);
                let value = codegen_expr(inner, pre, ctx);
                parts.push(stringify(&value, &ty));
            }
        }
    }
    match parts.len() {
        0 => "prove_string_from(\"\", 0)".to_string(),
        1 => parts.pop().unwrap(),
        _ => {
            let mut acc = parts[0].clone();
            for part in &parts[1..] {
                acc = format!("prove_string_concat({acc}, {part})");
            }
            acc
        }
    }
}

// ============================================================================
// Calls
// ============================================================================

fn mangled_target(symbol: crate::resolve::SymbolId, expr: &Expr, ctx: &EmitCtx) -> String {
    let type_args: Vec<Type> = ctx
        .check
        .instantiations
        .get(&expr.id)
        .map(|args| args.iter().map(|a| subst_type(a, &ctx.subst)).collect())
        .unwrap_or_default();
    mangled_target_symbol(symbol, &type_args, ctx)
}

fn mangled_target_symbol(
    symbol: crate::resolve::SymbolId,
    type_args: &[Type],
    ctx: &EmitCtx,
) -> String {
    let data = ctx.resolved.table.get(symbol);
    match data.kind {
        // Foreign functions bind the declared C names directly.
        SymbolKind::Foreign => sanitize(ctx.interner.resolve(data.name)),
        _ => match data.func() {
            Some(info) => mangle_symbol(data, info, type_args, ctx.interner),
            None => sanitize(ctx.interner.resolve(data.name)),
        },
    }
}

fn constructor_name(symbol: crate::resolve::SymbolId, _expr: &Expr, ctx: &EmitCtx) -> String {
    let data = ctx.resolved.table.get(symbol);
    let SymbolExtra::Variant { owner, .. } = &data.extra else {
        return sanitize(ctx.interner.resolve(data.name));
    };
    let owner_name = ctx.interner.resolve(*owner);
    if owner_name == "Option" || owner_name == "Result" {
        return sanitize(ctx.interner.resolve(data.name)).to_lowercase();
    }
    if *owner == data.name {
        format!("Type_{}_make", sanitize(owner_name))
    } else {
        format!(
            "Type_{}_{}",
            sanitize(owner_name),
            sanitize(ctx.interner.resolve(data.name))
        )
    }
}

fn codegen_call(
    expr: &Expr,
    callee: &Expr,
    args: &[Expr],
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) -> String {
    let Some(symbol) = ctx.check.call_targets.get(&expr.id).copied() else {
        // A function value held in a local: plain pointer call.
        let callee_c = codegen_expr(callee, pre, ctx);
        let rendered: Vec<String> = args.iter().map(|a| codegen_expr(a, pre, ctx)).collect();
        return format!("{callee_c}({})", rendered.join(", "));
    };
    codegen_resolved_call(expr, symbol, args, pre, ctx)
}

pub(super) fn codegen_resolved_call(
    expr: &Expr,
    symbol: crate::resolve::SymbolId,
    args: &[Expr],
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) -> String {
    let data = ctx.resolved.table.get(symbol).clone();
    let rendered: Vec<String> = args.iter().map(|a| codegen_expr(a, pre, ctx)).collect();

    match data.kind {
        SymbolKind::BuiltinFunction => {
            codegen_builtin(&data, args, &rendered, ctx)
        }
        SymbolKind::VariantConstructor => {
            let SymbolExtra::Variant { owner, .. } = &data.extra else {
                return "0".to_string();
            };
            let owner_name = ctx.interner.resolve(*owner).to_string();
            match (owner_name.as_str(), ctx.interner.resolve(data.name)) {
                ("Option", "Some") | ("Result", "Ok") => {
                    let inner_ty = args.first().map(|a| ctx.ty_of(a)).unwrap_or(Type::Unit);
                    let value = rendered.first().cloned().unwrap_or_else(|| "0".to_string());
                    // Struct payloads are boxed; the box needs an lvalue.
                    let value = if matches!(
                        inner_ty.erased(),
                        Type::Algebraic(_)
                            | Type::Record(_)
                            | Type::Applied { .. }
                            | Type::Option(_)
                            | Type::Result(_, _)
                    ) {
                        let staged = ctx.fresh();
                        pre.push(format!("{} {staged} = {value};", ctx.ctype(&inner_ty)));
                        staged
                    } else {
                        value
                    };
                    codegen_ok_wrap(&value, &inner_ty, ctx)
                }
                ("Option", "None") => "prove_none()".to_string(),
                ("Result", "Err") => {
                    let message = rendered
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "prove_string_from(\"\", 0)".to_string());
                    format!("prove_err({message})")
                }
                _ => {
                    let name = constructor_name(symbol, expr, ctx);
                    format!("{name}({})", rendered.join(", "))
                }
            }
        }
        _ => {
            let name = mangled_target(symbol, expr, ctx);
            format!("{name}({})", rendered.join(", "))
        }
    }
}

/// Wraps a success value into a `Prove_Result` by payload class, boxing
/// by-value structs.
pub(super) fn codegen_ok_wrap(value: &str, ty: &Type, ctx: &EmitCtx) -> String {
    match ty.erased() {
        // By-value payloads travel boxed. `value` must be an lvalue here;
        // callers stage rvalues through a temporary first.
        Type::Algebraic(_)
        | Type::Record(_)
        | Type::Applied { .. }
        | Type::Option(_)
        | Type::Result(_, _) => {
            let cty = ctx.ctype(ty);
            format!("prove_ok_p(prove_box(&{value}, sizeof({cty})))")
        }
        Type::Unit => "prove_ok_unit()".to_string(),
        _ => match payload_class(ty) {
            PayloadClass::Double => format!("prove_ok_d({value})"),
            PayloadClass::Pointer => format!("prove_ok_p({value})"),
            _ => format!("prove_ok_i({value})"),
        },
    }
}

fn codegen_builtin(
    data: &crate::resolve::SymbolData,
    args: &[Expr],
    rendered: &[String],
    ctx: &mut EmitCtx,
) -> String {
    let name = ctx.interner.resolve(data.name);
    let arg0_ty = args.first().map(|a| ctx.ty_of(a)).unwrap_or(Type::Unknown);
    let a = |i: usize| rendered.get(i).cloned().unwrap_or_else(|| "0".to_string());
    match name {
        "println" => format!("prove_println({})", a(0)),
        "print" => format!("prove_print({})", a(0)),
        "readln" => "prove_readln()".to_string(),
        "read_file" => format!("prove_read_file({})", a(0)),
        "write_file" => format!("prove_write_file({}, {})", a(0), a(1)),
        "open" => format!("prove_open({})", a(0)),
        "close" => format!("prove_close({})", a(0)),
        "flush" => "prove_flush()".to_string(),
        "sleep" => format!("prove_sleep({})", a(0)),
        "len" => match arg0_ty.erased() {
            Type::Prim(Prim::String, _) => format!("prove_string_len({})", a(0)),
            _ => format!("prove_list_len({})", a(0)),
        },
        "trim" => format!("prove_string_trim({})", a(0)),
        "lowercase" => format!("prove_string_lower({})", a(0)),
        "uppercase" => format!("prove_string_upper({})", a(0)),
        "concat" => format!("prove_string_concat({}, {})", a(0), a(1)),
        "contains" => format!("prove_string_contains({}, {})", a(0), a(1)),
        "split" => format!("prove_string_split({}, {})", a(0), a(1)),
        "join" => format!("prove_string_join({}, {})", a(0), a(1)),
        "parse_int" => format!("prove_string_parse_int({})", a(0)),
        "max" => format!("(({0}) > ({1}) ? ({0}) : ({1}))", a(0), a(1)),
        "min" => format!("(({0}) < ({1}) ? ({0}) : ({1}))", a(0), a(1)),
        "abs" => format!("(({0}) < 0 ? -({0}) : ({0}))", a(0)),
        "append" => {
            let elem_ty = args.get(1).map(|e| ctx.ty_of(e)).unwrap_or(Type::INTEGER);
            format!("{}({}, {})", list_fn("prove_list_append", &elem_ty), a(0), a(1))
        }
        "head" => {
            let elem_ty = elem_of(&arg0_ty);
            format!("{}({})", list_fn("prove_list_head", &elem_ty), a(0))
        }
        "tail" => format!("prove_list_tail({})", a(0)),
        "sum" => format!("prove_list_sum_i64({})", a(0)),
        "map" => {
            let elem_ty = elem_of(&arg0_ty);
            format!("{}({}, {})", list_fn("prove_list_map", &elem_ty), a(0), a(1))
        }
        "filter" => {
            let elem_ty = elem_of(&arg0_ty);
            format!("{}({}, {})", list_fn("prove_list_filter", &elem_ty), a(0), a(1))
        }
        "reduce" => {
            let acc_ty = args.get(1).map(|e| ctx.ty_of(e)).unwrap_or(Type::INTEGER);
            format!(
                "{}({}, {}, {})",
                list_fn("prove_list_reduce", &acc_ty),
                a(0),
                a(1),
                a(2)
            )
        }
        other => format!("prove_{}({})", sanitize(other), rendered.join(", ")),
    }
}

fn elem_of(ty: &Type) -> Type {
    match ty.erased() {
        Type::List(elem) => (**elem).clone(),
        _ => Type::INTEGER,
    }
}

// ============================================================================
// Pipes, fail propagation, lambdas
// ============================================================================

fn codegen_pipe(
    _expr: &Expr,
    value: &Expr,
    target: &Expr,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) -> String {
    // `a |> f` lowered to `f(a)`; `a |> f(b)` appends: `f(b, a)`.
    match &target.kind {
        ExprKind::Call { callee, args } => {
            let mut full_args: Vec<Expr> = args.clone();
            full_args.push(value.clone());
            match ctx.check.call_targets.get(&target.id).copied() {
                Some(symbol) => codegen_resolved_call(target, symbol, &full_args, pre, ctx),
                None => {
                    let callee_c = codegen_expr(callee, pre, ctx);
                    let rendered: Vec<String> =
                        full_args.iter().map(|a| codegen_expr(a, pre, ctx)).collect();
                    format!("{callee_c}({})", rendered.join(", "))
                }
            }
        }
        _ => match ctx.check.call_targets.get(&target.id).copied() {
            Some(symbol) => {
                codegen_resolved_call(target, symbol, std::slice::from_ref(value), pre, ctx)
            }
            None => {
                let target_c = codegen_expr(target, pre, ctx);
                let value_c = codegen_expr(value, pre, ctx);
                format!("{target_c}({value_c})")
            }
        },
    }
}

fn codegen_fail_prop(
    expr: &Expr,
    inner: &Expr,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) -> String {
    let inner_is_option = matches!(ctx.ty_of(inner).erased(), Type::Option(_));
    let inner_c = codegen_expr(inner, pre, ctx);
    let tmp = ctx.fresh();
    pre.push(format!("Prove_Result {tmp} = {inner_c};"));
    let error_return = if inner_is_option && ctx.ret_is_option {
        "return prove_none();".to_string()
    } else if inner_is_option {
        "return prove_err(prove_string_from(\"none\", 4));".to_string()
    } else {
        format!("return prove_err({tmp}.err);")
    };
    pre.push(format!("if ({tmp}.tag == PROVE_ERR) {{ {error_return} }}"));

    let value_ty = ctx.ty_of(expr);
    unwrap_payload(&tmp, &value_ty, ctx)
}

/// Reads the success payload of a `Prove_Result` held in `tmp`.
pub(super) fn unwrap_payload(tmp: &str, ty: &Type, ctx: &EmitCtx) -> String {
    match ty.erased() {
        Type::Algebraic(_) | Type::Record(_) | Type::Applied { .. } => {
            let cty = ctx.ctype(ty);
            format!("(*({cty} *){tmp}.ok.ptr)")
        }
        Type::Prim(Prim::String, _) => format!("(Prove_String *){tmp}.ok.ptr"),
        Type::List(_) => format!("(Prove_List *){tmp}.ok.ptr"),
        Type::Option(_) | Type::Result(_, _) => format!("(*(Prove_Result *){tmp}.ok.ptr)"),
        Type::Unit => "0".to_string(),
        other => format!("{tmp}.ok.{}", payload_field(other)),
    }
}

fn codegen_lambda(
    expr: &Expr,
    params: &[(Symbol, Option<prove_language::ast::TypeExpr>)],
    body: &Expr,
    ctx: &mut EmitCtx,
) -> String {
    let fn_ty = ctx.ty_of(expr);
    let (param_tys, ret_ty) = match fn_ty.erased() {
        Type::Function { params, ret, .. } => (params.clone(), (**ret).clone()),
        _ => (vec![Type::INTEGER; params.len()], Type::INTEGER),
    };
    let name = format!("prove_lambda_{}", ctx.lambda_count);
    ctx.lambda_count += 1;

    let param_list = params
        .iter()
        .zip(&param_tys)
        .map(|((p, _), ty)| format!("{} {}", ctx.ctype(ty), local_name(*p, ctx.interner)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut body_pre = Vec::new();
    let body_c = codegen_expr(body, &mut body_pre, ctx);
    let mut def = format!("static {} {}({}) {{\n", ctx.ctype(&ret_ty), name, param_list);
    for line in body_pre {
        let _ = writeln!(def, "    {line}");
    }
    let _ = writeln!(def, "    return {body_c};");
    def.push_str("}\n");
    ctx.lambdas.push(def);
    name
}

// ============================================================================
// Match
// ============================================================================

/// Emits a match as a statement sequence yielding `result_var` when given,
/// or `return`ing per arm when `returning` is set (implicit-match bodies).
pub(super) fn codegen_match(
    subject: &Expr,
    arms: &[MatchArm],
    result: Option<(&str, &Type)>,
    returning: bool,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) {
    let subject_ty = ctx.ty_of(subject);
    let subject_c = codegen_expr(subject, pre, ctx);
    codegen_match_on(&subject_c, &subject_ty, arms, result, returning, pre, ctx);
}

/// Match lowering over an already-rendered subject; implicit-match bodies
/// hand the first parameter in directly.
pub(super) fn codegen_match_on(
    subject_c: &str,
    subject_ty: &Type,
    arms: &[MatchArm],
    result: Option<(&str, &Type)>,
    returning: bool,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) {
    let subject_ty = subject_ty.clone();
    let s = ctx.fresh();
    pre.push(format!("{} {s} = {subject_c};", ctx.ctype(&subject_ty)));

    let flat = arms.iter().all(|arm| is_flat_pattern(&arm.pattern));
    let switchable = flat
        && matches!(
            subject_ty.erased(),
            Type::Algebraic(_) | Type::Applied { .. } | Type::Option(_) | Type::Result(_, _)
        );

    if switchable {
        // A match on an algebraic type becomes a switch on the tag.
        let tag_expr = format!("{s}.tag");
        pre.push(format!("switch ({tag_expr}) {{"));
        let mut has_default = false;
        for arm in arms {
            let label = match &arm.pattern.kind {
                PatternKind::Variant { name, .. } => {
                    Some(tag_constant(&subject_ty, *name, ctx))
                }
                _ => None,
            };
            match label {
                Some(label) => pre.push(format!("case {label}: {{")),
                None => {
                    has_default = true;
                    pre.push("default: {".to_string());
                }
            }
            emit_arm_bindings(&arm.pattern, &s, &subject_ty, pre, ctx);
            emit_arm_body(&arm.body, result, returning, pre, ctx);
            pre.push("break; }".to_string());
        }
        if !has_default {
            pre.push("default: break;".to_string());
        }
        pre.push("}".to_string());
        return;
    }

    // General form: a guarded chain inside do/while(0).
    pre.push("do {".to_string());
    for arm in arms {
        let cond = pattern_condition(&arm.pattern, &s, &subject_ty, ctx);
        pre.push(format!("if ({cond}) {{"));
        emit_arm_bindings(&arm.pattern, &s, &subject_ty, pre, ctx);
        emit_arm_body(&arm.body, result, returning, pre, ctx);
        pre.push("break; }".to_string());
    }
    pre.push("} while (0);".to_string());
}

fn emit_arm_body(
    body: &Expr,
    result: Option<(&str, &Type)>,
    returning: bool,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) {
    let mut body_pre = Vec::new();
    let body_c = codegen_expr(body, &mut body_pre, ctx);
    pre.append(&mut body_pre);
    if returning {
        let value_ty = ctx.ty_of(body);
        if ctx.fallible {
            let staged = ctx.fresh();
            pre.push(format!("{} {staged} = {body_c};", ctx.ctype(&value_ty)));
            let wrapped = codegen_ok_wrap(&staged, &value_ty, ctx);
            pre.push(format!("return {wrapped};"));
        } else if matches!(ctx.ret_type.erased(), Type::Unit) {
            pre.push(format!("{body_c};"));
            pre.push("return;".to_string());
        } else {
            pre.push(format!("return {body_c};"));
        }
    } else if let Some((var, _)) = result {
        pre.push(format!("{var} = {body_c};"));
    } else {
        pre.push(format!("(void)({body_c});"));
    }
}

fn is_flat_pattern(pattern: &Pattern) -> bool {
    match &pattern.kind {
        PatternKind::Variant { args, .. } => args
            .iter()
            .all(|a| matches!(a.kind, PatternKind::Binding(_) | PatternKind::Wildcard)),
        PatternKind::Wildcard | PatternKind::Binding(_) => true,
        PatternKind::Literal(_) => false,
    }
}

fn tag_constant(subject_ty: &Type, variant: Symbol, ctx: &EmitCtx) -> String {
    match subject_ty.erased() {
        Type::Option(_) | Type::Result(_, _) => {
            match ctx.interner.resolve(variant) {
                "Some" | "Ok" => "PROVE_OK".to_string(),
                _ => "PROVE_ERR".to_string(),
            }
        }
        Type::Algebraic(name) | Type::Applied { head: name, .. } => format!(
            "Type_{}_tag_{}",
            sanitize(ctx.interner.resolve(*name)),
            sanitize(ctx.interner.resolve(variant))
        ),
        _ => "0".to_string(),
    }
}

fn pattern_condition(pattern: &Pattern, s: &str, subject_ty: &Type, ctx: &EmitCtx) -> String {
    match &pattern.kind {
        PatternKind::Wildcard | PatternKind::Binding(_) => "true".to_string(),
        PatternKind::Literal(lit) => match lit {
            PatLiteral::Integer(v) => format!("({s} == {v})"),
            PatLiteral::Decimal(v) => format!("({s} == {v})"),
            PatLiteral::Boolean(v) => format!("({s} == {})", if *v { "true" } else { "false" }),
            PatLiteral::Str(text) => {
                let (escaped, len) = c_string_literal(text);
                format!("prove_string_eq({s}, prove_string_from(\"{escaped}\", {len}))")
            }
        },
        PatternKind::Variant { name, args } => {
            let mut cond = format!("({s}.tag == {})", tag_constant(subject_ty, *name, ctx));
            let fields = variant_fields(subject_ty, *name, ctx);
            for (arg, (field_access, field_ty)) in args.iter().zip(fields) {
                if matches!(arg.kind, PatternKind::Binding(_) | PatternKind::Wildcard) {
                    continue;
                }
                let nested = pattern_condition(
                    arg,
                    &format!("{s}{field_access}"),
                    &field_ty,
                    ctx,
                );
                cond = format!("({cond} && {nested})");
            }
            cond
        }
    }
}

/// `(accessor-suffix, type)` per field of a variant, relative to the
/// subject value.
fn variant_fields(subject_ty: &Type, variant: Symbol, ctx: &EmitCtx) -> Vec<(String, Type)> {
    match subject_ty.erased() {
        Type::Option(inner) => match ctx.interner.resolve(variant) {
            "Some" => vec![(format!(".ok.{}", payload_field(inner)), (**inner).clone())],
            _ => vec![],
        },
        Type::Result(ok, err) => match ctx.interner.resolve(variant) {
            "Ok" => vec![(format!(".ok.{}", payload_field(ok)), (**ok).clone())],
            _ => {
                let _ = err;
                vec![(".err".to_string(), Type::STRING)]
            }
        },
        Type::Algebraic(name) | Type::Applied { head: name, .. } => {
            let subst = applied_subst(subject_ty, ctx);
            match ctx.resolved.registry.get(*name).map(|info| &info.kind) {
                Some(TypeDefKind::Algebraic(variants)) => variants
                    .iter()
                    .find(|v| v.name == variant)
                    .map(|v| {
                        let vname = sanitize(ctx.interner.resolve(variant));
                        v.fields
                            .iter()
                            .map(|f| {
                                (
                                    format!(
                                        ".payload.{vname}.{}",
                                        sanitize(ctx.interner.resolve(f.name))
                                    ),
                                    subst_type(&f.ty, &subst),
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default(),
                _ => vec![],
            }
        }
        _ => vec![],
    }
}

/// Maps a generic type's parameters to the subject's concrete arguments.
fn applied_subst(subject_ty: &Type, ctx: &EmitCtx) -> HashMap<Symbol, Type> {
    let mut subst = HashMap::new();
    if let Type::Applied { head, args } = subject_ty.erased() {
        if let Some(info) = ctx.resolved.registry.get(*head) {
            for (generic, arg) in info.generics.iter().zip(args) {
                subst.insert(*generic, subst_type(arg, &ctx.subst));
            }
        }
    }
    subst
}

fn emit_arm_bindings(
    pattern: &Pattern,
    s: &str,
    subject_ty: &Type,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) {
    match &pattern.kind {
        PatternKind::Binding(name) => {
            pre.push(format!(
                "{} {} = {s};",
                ctx.ctype(subject_ty),
                local_name(*name, ctx.interner)
            ));
        }
        PatternKind::Variant { name, args } => {
            let fields = variant_fields(subject_ty, *name, ctx);
            for (arg, (access, field_ty)) in args.iter().zip(fields) {
                match &arg.kind {
                    PatternKind::Binding(bound) => {
                        // Pointer payloads come back out of the union with
                        // their concrete type; boxed structs deref.
                        let value = if access == ".ok.ptr" {
                            match field_ty.erased() {
                                Type::Algebraic(_) | Type::Record(_) | Type::Applied { .. } => {
                                    format!("(*({} *){s}.ok.ptr)", ctx.ctype(&field_ty))
                                }
                                _ => format!("({}){s}.ok.ptr", ctx.ctype(&field_ty)),
                            }
                        } else {
                            format!("{s}{access}")
                        };
                        pre.push(format!(
                            "{} {} = {value};",
                            ctx.ctype(&field_ty),
                            local_name(*bound, ctx.interner)
                        ));
                    }
                    PatternKind::Variant { .. } => {
                        emit_arm_bindings(arg, &format!("{s}{access}"), &field_ty, pre, ctx);
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn codegen_match_expr(
    subject: &Expr,
    arms: &[MatchArm],
    result_ty: &Type,
    pre: &mut Vec<String>,
    ctx: &mut EmitCtx,
) -> String {
    let is_void = matches!(result_ty.erased(), Type::Unit | Type::Never);
    if is_void {
        codegen_match(subject, arms, None, false, pre, ctx);
        return "0".to_string();
    }
    let r = ctx.fresh();
    pre.push(format!("{} {r};", ctx.ctype(result_ty)));
    codegen_match(subject, arms, Some((&r, result_ty)), false, pre, ctx);
    r
}

// ============================================================================
// Statements
// ============================================================================

/// Emits one statement, flushing expression preludes first.
pub(super) fn codegen_stmt(
    stmt: &Stmt,
    is_terminal: bool,
    out: &mut String,
    indent: usize,
    ctx: &mut EmitCtx,
) {
    let pad = "    ".repeat(indent);
    let mut pre = Vec::new();
    match &stmt.kind {
        StmtKind::VarDecl { name, value, .. } => {
            let var = local_name(*name, ctx.interner);
            let value_ty = ctx.ty_of(value);
            let value_c = codegen_expr(value, &mut pre, ctx);
            for line in pre {
                let _ = writeln!(out, "{pad}{line}");
            }
            let _ = writeln!(out, "{pad}{} {var} = {value_c};", ctx.ctype(&value_ty));
            ctx.own_local(&var, &value_ty);
        }
        StmtKind::Assign { name, value, .. } => {
            let var = local_name(*name, ctx.interner);
            let value_ty = ctx.ty_of(value);
            let value_c = codegen_expr(value, &mut pre, ctx);
            for line in pre {
                let _ = writeln!(out, "{pad}{line}");
            }
            if value_ty.is_heap() && !value_ty.modifiers().arena {
                let _ = writeln!(out, "{pad}prove_release({var});");
            }
            let _ = writeln!(out, "{pad}{var} = {value_c};");
        }
        StmtKind::Expr(expr) => {
            if is_terminal {
                emit_terminal(expr, out, indent, ctx);
                return;
            }
            if let ExprKind::Match { subject, arms } = &expr.kind {
                // Statement-position match: no result needed.
                codegen_match(subject, arms, None, false, &mut pre, ctx);
                for line in pre {
                    let _ = writeln!(out, "{pad}{line}");
                }
                return;
            }
            let expr_c = codegen_expr(expr, &mut pre, ctx);
            for line in pre {
                let _ = writeln!(out, "{pad}{line}");
            }
            let is_void = matches!(ctx.ty_of(expr).erased(), Type::Unit | Type::Never);
            if is_void {
                let _ = writeln!(out, "{pad}{expr_c};");
            } else {
                let _ = writeln!(out, "{pad}(void)({expr_c});");
            }
        }
    }
}

/// The terminal expression: computed, refinement-checked, released-around,
/// wrapped for fallible functions, returned.
fn emit_terminal(expr: &Expr, out: &mut String, indent: usize, ctx: &mut EmitCtx) {
    let pad = "    ".repeat(indent);
    let mut pre = Vec::new();
    let value_ty = ctx.ty_of(expr);
    let is_void = matches!(value_ty.erased(), Type::Unit | Type::Never)
        && matches!(ctx.ret_type.erased(), Type::Unit | Type::Never);

    let value_c = codegen_expr(expr, &mut pre, ctx);
    for line in pre {
        let _ = writeln!(out, "{pad}{line}");
    }

    if is_void {
        let _ = writeln!(out, "{pad}{value_c};");
        ctx.emit_releases(out, indent, None);
        if ctx.fallible {
            let _ = writeln!(out, "{pad}return prove_ok_unit();");
        } else {
            let _ = writeln!(out, "{pad}return;");
        }
        return;
    }

    let ret_var = "__ret";
    let _ = writeln!(out, "{pad}{} {ret_var} = {value_c};", ctx.ctype(&value_ty));
    // Releasing the returned local would free the value we hand back.
    let keep = match &expr.kind {
        ExprKind::Ident(name) => Some(local_name(*name, ctx.interner)),
        _ => None,
    };
    ctx.emit_releases(out, indent, keep.as_deref());
    if ctx.fallible {
        let wrapped = codegen_ok_wrap(ret_var, &value_ty, ctx);
        let _ = writeln!(out, "{pad}return {wrapped};");
    } else {
        let _ = writeln!(out, "{pad}return {ret_var};");
    }
}

// ============================================================================
// Runtime refinement checks
// ============================================================================

/// Renders a refinement constraint as a C condition over `var`. Bare
/// identifiers stand for the constrained value itself.
fn render_constraint(constraint: &Expr, var: &str, ctx: &EmitCtx) -> Option<String> {
    match &constraint.kind {
        ExprKind::Range { lo, hi } => {
            let lo = render_constraint(lo, var, ctx)?;
            let hi = render_constraint(hi, var, ctx)?;
            Some(format!("({var} >= {lo} && {var} <= {hi})"))
        }
        ExprKind::Integer(v) => Some(format!("{v}")),
        ExprKind::Decimal(v) => Some(format!("{v}")),
        ExprKind::Boolean(v) => Some(if *v { "true" } else { "false" }.to_string()),
        ExprKind::Ident(_) => Some(var.to_string()),
        ExprKind::Paren(inner) => {
            let inner = render_constraint(inner, var, ctx)?;
            Some(format!("({inner})"))
        }
        ExprKind::Unary { op, operand } => {
            let inner = render_constraint(operand, var, ctx)?;
            match op {
                prove_language::ast::UnaryOp::Not => Some(format!("(!{inner})")),
                prove_language::ast::UnaryOp::Neg => Some(format!("(-{inner})")),
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            use prove_language::ast::BinaryOp;
            let l = render_constraint(lhs, var, ctx)?;
            let r = render_constraint(rhs, var, ctx)?;
            let op_str = match op {
                BinaryOp::Or => "||",
                BinaryOp::And => "&&",
                BinaryOp::Eq => "==",
                BinaryOp::Ne => "!=",
                BinaryOp::Lt => "<",
                BinaryOp::Gt => ">",
                BinaryOp::Le => "<=",
                BinaryOp::Ge => ">=",
                BinaryOp::Add => "+",
                BinaryOp::Sub => "-",
                BinaryOp::Mul => "*",
                BinaryOp::Div => "/",
                BinaryOp::Mod => "%",
            };
            Some(format!("({l} {op_str} {r})"))
        }
        ExprKind::Call { callee, args } => {
            // `len(value)` against a string-typed subject.
            if let ExprKind::Ident(name) = &callee.kind {
                if ctx.interner.resolve(*name) == "len" && args.len() == 1 {
                    let inner = render_constraint(&args[0], var, ctx)?;
                    return Some(format!("prove_string_len({inner})"));
                }
            }
            None
        }
        _ => None,
    }
}
