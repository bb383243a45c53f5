//! Contract and proof verification over the typed AST.
//!
//! Annotations produce obligations:
//!
//! | Annotation | Obligation | Rejects |
//! |------------|------------|---------|
//! | `requires` | call-site precondition | non-Boolean (checker, E311) |
//! | `ensures` | postcondition; property-test seed | non-Boolean (E311) |
//! | `near_miss` | rejection test | redundant input (W322) |
//! | `believe` | adversarial test seed | missing `ensures` (E393) |
//! | `proof` | named obligations | duplicate names (E391), too few (E392), empty text (W321) |
//! | `explain` | CNL row analysis | E390/E391/E392/E394, W324 |
//!
//! The verification chain walks callees of every `ensures`-carrying
//! function; a callee with no `ensures` of its own and no `trusted` marker
//! is a chain gap, surfaced in the coverage summary the driver prints for
//! `prove check`.

pub mod explain;

use std::collections::{HashMap, HashSet};

use prove_base::{Diagnostic, Interner, Span, Symbol};
use prove_language::ast::{
    AnnotationKind, Body, Expr, ExprKind, FunctionDef, Module, NodeId, Stmt, StmtKind,
    StrLitPiece,
};

use crate::analysis::check::CheckOutput;
use crate::analysis::types::expr_fingerprint;
use crate::contracts::explain::{expected_shape, parse_row, ContractShape, ExplainConfig};
use crate::resolve::{Resolved, SymbolId, SymbolKind};

/// One unverified link in a contract chain.
#[derive(Debug, Clone)]
pub struct ChainGap {
    pub caller: String,
    pub callee: String,
    pub span: Span,
}

/// What `prove check` reports after verification.
#[derive(Debug, Clone, Default)]
pub struct CoverageSummary {
    pub functions: usize,
    pub with_ensures: usize,
    pub chain_gaps: Vec<ChainGap>,
}

impl CoverageSummary {
    pub fn render(&self) -> String {
        let mut out = format!(
            "contract coverage: {}/{} functions carry ensures\n",
            self.with_ensures, self.functions
        );
        for gap in &self.chain_gaps {
            out.push_str(&format!(
                "  chain gap: '{}' (called from '{}') has no ensures and is not trusted\n",
                gap.callee, gap.caller
            ));
        }
        out
    }
}

/// Verifies every function's annotations; returns the coverage summary.
pub fn verify_module(
    module: &Module,
    resolved: &Resolved,
    check: &CheckOutput,
    config: &ExplainConfig,
    interner: &Interner,
    diags: &mut Vec<Diagnostic>,
) -> CoverageSummary {
    let mut summary = CoverageSummary::default();
    summary.functions = module.functions.len();

    for func in &module.functions {
        let ensures: Vec<&Expr> = func
            .annotations
            .iter()
            .filter_map(|a| match &a.kind {
                AnnotationKind::Ensures(expr) => Some(expr),
                _ => None,
            })
            .collect();
        if !ensures.is_empty() {
            summary.with_ensures += 1;
        }

        verify_believe(func, &ensures, diags);
        verify_know(func, interner, diags);
        verify_near_misses(func, diags);
        verify_proof_rows(func, &ensures, interner, diags);
        verify_explain(func, module, &ensures, check, resolved, config, interner, diags);

        if !ensures.is_empty() {
            collect_chain_gaps(func, module, resolved, check, interner, &mut summary);
        }
    }

    summary
}

fn verify_believe(func: &FunctionDef, ensures: &[&Expr], diags: &mut Vec<Diagnostic>) {
    for annotation in &func.annotations {
        if matches!(annotation.kind, AnnotationKind::Believe(_)) && ensures.is_empty() {
            diags.push(
                Diagnostic::error(
                    "E393",
                    "'believe' needs at least one 'ensures' to test against",
                    annotation.span,
                )
                .with_note("a belief without a contract cannot be falsified"),
            );
        }
    }
}

/// `know` claims a statically provable predicate: a closed predicate that
/// evaluates false is an error, and one the compiler cannot decide is
/// flagged rather than silently trusted.
fn verify_know(func: &FunctionDef, interner: &Interner, diags: &mut Vec<Diagnostic>) {
    for annotation in &func.annotations {
        let AnnotationKind::Know(expr) = &annotation.kind else {
            continue;
        };
        match crate::analysis::check::const_eval(expr) {
            Some(crate::analysis::check::ConstValue::Bool(true)) => {}
            Some(crate::analysis::check::ConstValue::Bool(false)) => {
                diags.push(Diagnostic::error(
                    "E311",
                    "'know' states a predicate that is provably false",
                    expr.span,
                ));
            }
            _ => {
                diags.push(
                    Diagnostic::warning(
                        "W325",
                        format!(
                            "cannot statically establish this 'know' predicate for '{}'",
                            interner.resolve(func.name)
                        ),
                        expr.span,
                    )
                    .with_suggestion("use 'assume' for predicates checked at the boundary"),
                );
            }
        }
    }
}

fn verify_near_misses(func: &FunctionDef, diags: &mut Vec<Diagnostic>) {
    let mut seen: HashMap<String, Span> = HashMap::new();
    for annotation in &func.annotations {
        if let AnnotationKind::NearMiss { input, .. } = &annotation.kind {
            let print = expr_fingerprint(input);
            if let Some(previous) = seen.insert(print, annotation.span) {
                diags.push(
                    Diagnostic::warning(
                        "W322",
                        "redundant near_miss: this input is already covered",
                        annotation.span,
                    )
                    .with_label(previous, "first stated here"),
                );
            }
        }
    }
}

fn verify_proof_rows(
    func: &FunctionDef,
    ensures: &[&Expr],
    interner: &Interner,
    diags: &mut Vec<Diagnostic>,
) {
    for annotation in &func.annotations {
        let AnnotationKind::Proof(rows) = &annotation.kind else {
            continue;
        };
        let mut names: HashMap<&str, Span> = HashMap::new();
        for row in rows {
            if let Some(previous) = names.insert(row.name.as_str(), row.span) {
                diags.push(
                    Diagnostic::error(
                        "E391",
                        format!("proof obligation '{}' is named twice", row.name),
                        row.span,
                    )
                    .with_label(previous, "first named here"),
                );
            }
        }
        if rows.len() < ensures.len() {
            diags.push(Diagnostic::error(
                "E392",
                format!(
                    "{} proof obligations cannot discharge {} ensures clauses",
                    rows.len(),
                    ensures.len()
                ),
                annotation.span,
            ));
        }
        let concepts = concept_names(func, interner);
        for row in rows {
            let mentions_concept = row
                .text
                .split_whitespace()
                .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
                .any(|w| w == "result" || concepts.contains(w));
            if !mentions_concept {
                diags.push(
                    Diagnostic::warning(
                        "W321",
                        format!("obligation '{}' names no parameter, variable, or result", row.name),
                        row.span,
                    )
                    .with_suggestion("state what the obligation holds of"),
                );
            }
        }
    }
}

/// The names an obligation row may meaningfully reference.
fn concept_names(func: &FunctionDef, interner: &Interner) -> HashSet<String> {
    let mut names: HashSet<String> = func
        .params
        .iter()
        .map(|p| interner.resolve(p.name).to_string())
        .collect();
    names.insert(interner.resolve(func.name).to_string());
    for name in body_locals(func) {
        names.insert(interner.resolve(name).to_string());
    }
    names
}

fn body_locals(func: &FunctionDef) -> Vec<Symbol> {
    let mut out = Vec::new();
    if let Body::Statements(stmts) = &func.body {
        for stmt in stmts {
            if let StmtKind::VarDecl { name, .. } = &stmt.kind {
                out.push(*name);
            }
        }
    }
    out
}

#[allow(clippy::too_many_arguments)]
fn verify_explain(
    func: &FunctionDef,
    module: &Module,
    ensures: &[&Expr],
    check: &CheckOutput,
    resolved: &Resolved,
    config: &ExplainConfig,
    interner: &Interner,
    diags: &mut Vec<Diagnostic>,
) {
    for annotation in &func.annotations {
        let AnnotationKind::Explain(rows) = &annotation.kind else {
            continue;
        };
        let strict = !ensures.is_empty();

        if strict {
            let statements = func.body.top_level_count();
            if rows.len() != statements {
                diags.push(
                    Diagnostic::error(
                        "E390",
                        format!(
                            "explain has {} rows but the body has {} statements",
                            rows.len(),
                            statements
                        ),
                        annotation.span,
                    )
                    .with_note("in strict mode every body statement gets exactly one row"),
                );
            }
            let mut seen: HashMap<String, Span> = HashMap::new();
            for row in rows {
                let normalized = row.text.split_whitespace().collect::<Vec<_>>().join(" ");
                if let Some(previous) = seen.insert(normalized, row.span) {
                    diags.push(
                        Diagnostic::error("E391", "duplicate explain row", row.span)
                            .with_label(previous, "first stated here"),
                    );
                }
            }
        }

        let known_refs = concept_names(func, interner);
        let callees = function_callees(func, check);
        for row in rows {
            let parsed = parse_row(&row.text, config, &known_refs);
            if strict && parsed.operation.is_none() {
                diags.push(
                    Diagnostic::error("E394", "row has no recognized operation", row.span)
                        .with_note("add the verb to [explain].operations if it is domain-specific"),
                );
            }
            for unknown in &parsed.unknown_references {
                diags.push(Diagnostic::error(
                    "E392",
                    format!("unknown reference '{unknown}' in explain row"),
                    row.span,
                ));
            }
            if !strict {
                continue;
            }
            // A claimed operation naming a called function must be
            // compatible with that function's own contract.
            if let Some(operation) = &parsed.operation {
                if let Some(shape) = expected_shape(operation) {
                    for &callee in &callees {
                        let data = resolved.table.get(callee);
                        if interner.resolve(data.name) != operation {
                            continue;
                        }
                        // Builtins carry their contracts in the runtime.
                        let Some(def_index) = data.func().and_then(|i| i.def_index) else {
                            continue;
                        };
                        let Some(callee_def) = module.functions.get(def_index) else {
                            continue;
                        };
                        let callee_ensures: Vec<&Expr> = callee_def
                            .annotations
                            .iter()
                            .filter_map(|a| match &a.kind {
                                AnnotationKind::Ensures(expr) => Some(expr),
                                _ => None,
                            })
                            .collect();
                        if !ensures_satisfy_shape(&callee_ensures, shape) {
                            diags.push(
                                Diagnostic::warning(
                                    "W324",
                                    format!(
                                        "claim '{operation}' does not match the contract of '{}'",
                                        interner.resolve(data.name)
                                    ),
                                    row.span,
                                )
                                .with_note(shape_note(shape)),
                            );
                        }
                    }
                }
            }
        }
    }
}

fn shape_note(shape: ContractShape) -> &'static str {
    match shape {
        ContractShape::MonotoneNonDecreasing => {
            "a 'sum' claim expects an ensures stating monotone non-decreasing output"
        }
        ContractShape::OutputShape => "a 'reduce' claim expects an ensures describing 'result'",
        ContractShape::Commutative => "an 'add' claim expects a commutativity ensures",
    }
}

/// Structural shape test over a definition's ensures clauses. No semantic
/// reasoning, just the lookup table's expected syntactic shape.
pub fn ensures_satisfy_shape(ensures: &[&Expr], shape: ContractShape) -> bool {
    match shape {
        ContractShape::MonotoneNonDecreasing => ensures.iter().any(|e| contains_ge(e)),
        ContractShape::OutputShape => ensures.iter().any(|e| mentions_result_like(e)),
        ContractShape::Commutative => ensures.iter().any(|e| contains_eq(e)),
    }
}

fn contains_ge(expr: &Expr) -> bool {
    use prove_language::ast::BinaryOp;
    match &expr.kind {
        ExprKind::Binary { op: BinaryOp::Ge, .. } => true,
        ExprKind::Binary { lhs, rhs, .. } => contains_ge(lhs) || contains_ge(rhs),
        ExprKind::Paren(inner) | ExprKind::FailProp(inner) => contains_ge(inner),
        _ => false,
    }
}

fn contains_eq(expr: &Expr) -> bool {
    use prove_language::ast::BinaryOp;
    match &expr.kind {
        ExprKind::Binary { op: BinaryOp::Eq, .. } => true,
        ExprKind::Binary { lhs, rhs, .. } => contains_eq(lhs) || contains_eq(rhs),
        ExprKind::Paren(inner) => contains_eq(inner),
        _ => false,
    }
}

fn mentions_result_like(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident(_) => true,
        ExprKind::Binary { lhs, rhs, .. } => mentions_result_like(lhs) || mentions_result_like(rhs),
        ExprKind::Paren(inner) | ExprKind::Unary { operand: inner, .. } => {
            mentions_result_like(inner)
        }
        _ => false,
    }
}

// ============================================================================
// Verification chain
// ============================================================================

fn collect_chain_gaps(
    func: &FunctionDef,
    module: &Module,
    resolved: &Resolved,
    check: &CheckOutput,
    interner: &Interner,
    summary: &mut CoverageSummary,
) {
    for callee in function_callees(func, check) {
        let data = resolved.table.get(callee);
        if !matches!(data.kind, SymbolKind::Function) {
            continue;
        }
        let Some(info) = data.func() else { continue };
        let Some(def_index) = info.def_index else { continue };
        let Some(callee_def) = module.functions.get(def_index) else {
            continue;
        };
        let has_ensures = callee_def
            .annotations
            .iter()
            .any(|a| matches!(a.kind, AnnotationKind::Ensures(_)));
        let is_trusted = callee_def
            .annotations
            .iter()
            .any(|a| matches!(a.kind, AnnotationKind::Trusted(_)));
        if !has_ensures && !is_trusted {
            summary.chain_gaps.push(ChainGap {
                caller: interner.resolve(func.name).to_string(),
                callee: interner.resolve(callee_def.name).to_string(),
                span: callee_def.name_span,
            });
        }
    }
}

/// Every function symbol this definition calls, via the checker's resolved
/// call targets.
fn function_callees(func: &FunctionDef, check: &CheckOutput) -> Vec<SymbolId> {
    let mut ids = Vec::new();
    let mut visit = |id: NodeId| {
        if let Some(symbol) = check.call_targets.get(&id) {
            if !ids.contains(symbol) {
                ids.push(*symbol);
            }
        }
    };
    for_each_expr_in_function(func, &mut |expr| visit(expr.id));
    ids
}

fn for_each_expr_in_function(func: &FunctionDef, f: &mut impl FnMut(&Expr)) {
    match &func.body {
        Body::Statements(stmts) => {
            for stmt in stmts {
                for_each_expr_in_stmt(stmt, f);
            }
        }
        Body::MatchArms(arms) => {
            for arm in arms {
                for_each_expr(&arm.body, f);
            }
        }
    }
}

fn for_each_expr_in_stmt(stmt: &Stmt, f: &mut impl FnMut(&Expr)) {
    match &stmt.kind {
        StmtKind::VarDecl { value, .. } | StmtKind::Assign { value, .. } => for_each_expr(value, f),
        StmtKind::Expr(expr) => for_each_expr(expr, f),
    }
}

fn for_each_expr(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            for_each_expr(callee, f);
            for arg in args {
                for_each_expr(arg, f);
            }
        }
        ExprKind::Field { recv, .. } => for_each_expr(recv, f),
        ExprKind::Pipe { value, target } => {
            for_each_expr(value, f);
            for_each_expr(target, f);
        }
        ExprKind::FailProp(inner) | ExprKind::Paren(inner) => for_each_expr(inner, f),
        ExprKind::Lambda { body, .. } => for_each_expr(body, f),
        ExprKind::Valid { args: Some(args), .. } => {
            for arg in args {
                for_each_expr(arg, f);
            }
        }
        ExprKind::Match { subject, arms } => {
            for_each_expr(subject, f);
            for arm in arms {
                for_each_expr(&arm.body, f);
            }
        }
        ExprKind::If { cond, then_block, else_block } => {
            for_each_expr(cond, f);
            for stmt in then_block {
                for_each_expr_in_stmt(stmt, f);
            }
            if let Some(else_block) = else_block {
                for stmt in else_block {
                    for_each_expr_in_stmt(stmt, f);
                }
            }
        }
        ExprKind::Comptime(stmts) => {
            for stmt in stmts {
                for_each_expr_in_stmt(stmt, f);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            for_each_expr(lhs, f);
            for_each_expr(rhs, f);
        }
        ExprKind::Unary { operand, .. } => for_each_expr(operand, f),
        ExprKind::List(items) => {
            for item in items {
                for_each_expr(item, f);
            }
        }
        ExprKind::Range { lo, hi } => {
            for_each_expr(lo, f);
            for_each_expr(hi, f);
        }
        ExprKind::Str { pieces, .. } => {
            for piece in pieces {
                if let StrLitPiece::Interp(inner) = piece {
                    for_each_expr(inner, f);
                }
            }
        }
        _ => {}
    }
}
