//! Bidirectional type and verb checker.
//!
//! Walks each function body with a scope stack over a
//! [`UnificationTable`], annotating every expression with a type and
//! resolving verb-dispatched call sites with call-site context:
//!
//! 1. an expected `Boolean` selects the `validates` variant
//! 2. an expected type matching exactly one variant's return selects it
//! 3. otherwise candidates are filtered by trial unification of their
//!    parameters against the arguments
//! 4. survivors are ranked `transforms > validates > reads > creates >
//!    matches > inputs > outputs`
//! 5. anything still ambiguous is reported with the full candidate list
//!
//! The checker also enforces verb purity (E361–E363), the comptime-only
//! `if` rule, exhaustiveness of matches, refinement obligations (static
//! rejection for known values, runtime check insertion otherwise, with
//! structural subsumption over ranges, equality, and conjunction), the
//! Mutable-only assignment rule, and the `terminates` requirement for
//! recursive functions. Generic instantiations are recorded in the
//! per-module monomorphization table for the emitter.

use std::collections::{HashMap, HashSet};

use prove_base::{Diagnostic, Interner, Span, Symbol};
use prove_language::ast::{
    AnnotationKind, Body, Expr, ExprKind, FunctionDef, MatchArm, Module, NodeId, PatLiteral,
    Pattern, PatternKind, Stmt, StmtKind, StrLitPiece, TypeExpr, UnaryOp, Verb,
};

use crate::analysis::types::{expr_fingerprint, Prim, Type, TypeDefKind};
use crate::analysis::unify::{InferType, TypeError, UnificationTable};
use crate::resolve::{lower_type_expr, Resolution, Resolved, SymbolId, SymbolKind};

/// The typed-AST side tables: the checker's product.
pub struct CheckOutput {
    /// Type of every expression node. Complete after an error-free run.
    pub types: HashMap<NodeId, Type>,
    /// Resolved function or constructor symbol per call site (and per
    /// pipe/valid form).
    pub call_targets: HashMap<NodeId, SymbolId>,
    /// Generic arguments chosen at each instantiating call site, ordered by
    /// the callee's generic parameters.
    pub instantiations: HashMap<NodeId, Vec<Type>>,
    /// Expressions that need a runtime refinement check at their assignment
    /// or argument position, with the refined target type.
    pub runtime_checks: HashMap<NodeId, Type>,
    /// Monomorphization table: distinct generic-argument vectors per
    /// generic function.
    pub mono: HashMap<SymbolId, Vec<Vec<Type>>>,
}

/// Checks one resolved module.
pub fn check_module(
    module: &Module,
    resolved: &Resolved,
    interner: &Interner,
    diags: &mut Vec<Diagnostic>,
) -> CheckOutput {
    let mut def_symbols = HashMap::new();
    for (_, id) in resolved.table.functions() {
        if let Some(info) = resolved.table.get(id).func() {
            if let Some(index) = info.def_index {
                def_symbols.insert(index, id);
            }
        }
    }

    let mut checker = Checker {
        resolved,
        interner,
        diags,
        table: UnificationTable::new(),
        types: HashMap::new(),
        call_targets: HashMap::new(),
        instantiations: HashMap::new(),
        runtime_checks: HashMap::new(),
        call_sites: Vec::new(),
        scopes: Vec::new(),
        current_fn: None,
        current_verb: None,
        current_fallible: false,
        comptime_depth: 0,
        def_symbols,
    };

    for constant in &module.constants {
        checker.push_scope();
        let declared = constant
            .ty
            .as_ref()
            .map(|ty| checker.lower(ty))
            .unwrap_or(Type::Unknown);
        let expected = InferType::from_type(&declared, &HashMap::new());
        let found = checker.infer_expr(&constant.value, Some(&expected));
        checker.unify_or_report(&expected, &found, constant.value.span);
        checker.check_refinement_obligation(&declared, &constant.value);
        checker.pop_scope();
    }

    for (index, func) in module.functions.iter().enumerate() {
        checker.check_function(func, index);
    }
    for main in &module.mains {
        checker.check_main(&main.body, main.fallible);
    }

    checker.check_termination(module);
    checker.finish()
}

struct LocalInfo {
    infer: InferType,
    declared: Type,
    /// Set when the binding came from destructuring this parameter in a
    /// variant pattern; used by the termination measure check.
    smaller_than: Option<Symbol>,
}

struct CallSite {
    caller: Option<SymbolId>,
    callee: SymbolId,
    expr: NodeId,
    arg_ids: Vec<NodeId>,
}

struct Checker<'a> {
    resolved: &'a Resolved,
    interner: &'a Interner,
    diags: &'a mut Vec<Diagnostic>,
    table: UnificationTable,
    types: HashMap<NodeId, InferType>,
    call_targets: HashMap<NodeId, SymbolId>,
    instantiations: HashMap<NodeId, Vec<InferType>>,
    runtime_checks: HashMap<NodeId, Type>,
    call_sites: Vec<CallSite>,
    scopes: Vec<HashMap<Symbol, LocalInfo>>,
    current_fn: Option<SymbolId>,
    current_verb: Option<Verb>,
    current_fallible: bool,
    comptime_depth: usize,
    def_symbols: HashMap<usize, SymbolId>,
}

impl<'a> Checker<'a> {
    // ------------------------------------------------------------------
    // Scopes & helpers
    // ------------------------------------------------------------------

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn bind(&mut self, name: Symbol, info: LocalInfo) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, info);
        }
    }

    fn lookup(&self, name: Symbol) -> Option<&LocalInfo> {
        for scope in self.scopes.iter().rev() {
            if let Some(info) = scope.get(&name) {
                return Some(info);
            }
        }
        None
    }

    fn lower(&mut self, ty: &TypeExpr) -> Type {
        lower_type_expr(ty, &self.resolved.registry, &[], self.interner, self.diags)
    }

    fn record(&mut self, id: NodeId, ty: InferType) -> InferType {
        self.types.insert(id, ty.clone());
        ty
    }

    fn unify_or_report(&mut self, expected: &InferType, found: &InferType, span: Span) {
        if let Err(err) = self.table.unify(expected, found) {
            self.report_type_error(err, span);
        }
    }

    fn report_type_error(&mut self, err: TypeError, span: Span) {
        let message = match err {
            TypeError::Mismatch { expected, found } => format!(
                "expected {}, found {}",
                self.describe_infer(&expected),
                self.describe_infer(&found)
            ),
            TypeError::InfiniteType { .. } => "cannot construct an infinite type".to_string(),
            TypeError::ArityMismatch { expected, found } => {
                format!("expected {expected} arguments, found {found}")
            }
        };
        self.diags.push(Diagnostic::error("E309", message, span));
    }

    fn describe_infer(&self, ty: &InferType) -> String {
        self.table.to_type(ty).display(self.interner)
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn check_function(&mut self, func: &FunctionDef, index: usize) {
        let Some(symbol) = self.def_symbols.get(&index).copied() else {
            return;
        };
        let info = match self.resolved.table.get(symbol).func() {
            Some(info) => info.clone(),
            None => return,
        };

        self.current_fn = Some(symbol);
        self.current_verb = Some(func.verb);
        self.current_fallible = func.fallible;
        self.push_scope();

        for (param, ty) in func.params.iter().zip(&info.params) {
            let infer = InferType::from_type(ty, &HashMap::new());
            self.bind(param.name, LocalInfo { infer, declared: ty.clone(), smaller_than: None });
        }

        let ret_infer = InferType::from_type(&info.ret, &HashMap::new());
        self.check_annotations(func, &info.ret);

        match &func.body {
            Body::Statements(stmts) => {
                self.check_statement_body(stmts, &ret_infer, &info.ret, func.name_span);
            }
            Body::MatchArms(arms) => {
                let subject_ty = func
                    .params
                    .first()
                    .map(|p| self.lookup(p.name).map(|l| l.infer.clone()))
                    .flatten()
                    .unwrap_or(InferType::Unknown);
                let subject_param = func.params.first().map(|p| p.name);
                let arm_span = func.name_span;
                self.check_arms(arms, &subject_ty, subject_param, Some(&ret_infer), arm_span);
            }
        }

        self.pop_scope();
        self.current_fn = None;
        self.current_verb = None;
        self.current_fallible = false;
    }

    fn check_main(&mut self, body: &[Stmt], fallible: bool) {
        self.current_fn = None;
        self.current_verb = None;
        self.current_fallible = fallible;
        self.push_scope();
        let unit = InferType::Unit;
        self.check_statement_body(body, &unit, &Type::Unit, Span::default());
        self.pop_scope();
        self.current_fallible = false;
    }

    /// The final non-declaration expression is the return value; everything
    /// before it runs for effect.
    fn check_statement_body(
        &mut self,
        stmts: &[Stmt],
        ret: &InferType,
        ret_declared: &Type,
        fallback_span: Span,
    ) {
        let terminal = stmts
            .iter()
            .rposition(|s| matches!(s.kind, StmtKind::Expr(_)));
        for (i, stmt) in stmts.iter().enumerate() {
            let is_terminal = Some(i) == terminal;
            match &stmt.kind {
                StmtKind::VarDecl { name, ty, value, .. } => {
                    let declared = match ty {
                        Some(ty) => self.lower(ty),
                        None => Type::Unknown,
                    };
                    let expected = InferType::from_type(&declared, &HashMap::new());
                    let found = self.infer_expr(value, Some(&expected));
                    self.unify_or_report(&expected, &found, value.span);
                    self.check_refinement_obligation(&declared, value);
                    let infer = if matches!(declared, Type::Unknown) {
                        found
                    } else {
                        expected
                    };
                    self.bind(*name, LocalInfo { infer, declared, smaller_than: None });
                }
                StmtKind::Assign { name, name_span, value } => {
                    let (expected, mutable) = match self.lookup(*name) {
                        Some(info) => (info.infer.clone(), info.declared.modifiers().mutable),
                        None => (InferType::Unknown, false),
                    };
                    if !mutable {
                        self.diags.push(
                            Diagnostic::error(
                                "E305",
                                format!(
                                    "cannot assign to '{}': it is not Mutable",
                                    self.interner.resolve(*name)
                                ),
                                *name_span,
                            )
                            .with_suggestion("declare it with a ':[Mutable]' type"),
                        );
                    }
                    let found = self.infer_expr(value, Some(&expected));
                    self.unify_or_report(&expected, &found, value.span);
                }
                StmtKind::Expr(expr) => {
                    if is_terminal {
                        let found = self.infer_expr(expr, Some(ret));
                        self.unify_or_report(ret, &found, expr.span);
                        self.check_refinement_obligation(ret_declared, expr);
                    } else {
                        self.infer_expr(expr, None);
                    }
                }
            }
        }
        if terminal.is_none() && !matches!(ret_declared.erased(), Type::Unit | Type::Unknown) {
            self.diags.push(Diagnostic::error(
                "E313",
                "function body has no terminal expression",
                stmts.last().map(|s| s.span).unwrap_or(fallback_span),
            ));
        }
    }

    fn check_annotations(&mut self, func: &FunctionDef, ret: &Type) {
        self.push_scope();
        let result = self.interner.lookup("result");
        if let Some(result) = result {
            let infer = InferType::from_type(ret, &HashMap::new());
            self.bind(result, LocalInfo { infer, declared: ret.clone(), smaller_than: None });
        }
        for annotation in &func.annotations {
            match &annotation.kind {
                AnnotationKind::Requires(expr)
                | AnnotationKind::Ensures(expr)
                | AnnotationKind::Know(expr)
                | AnnotationKind::Assume(expr)
                | AnnotationKind::Believe(expr) => {
                    let boolean = InferType::Prim(Prim::Boolean);
                    let found = self.infer_expr(expr, Some(&boolean));
                    if self.table.unify(&boolean, &found).is_err() {
                        self.diags.push(Diagnostic::error(
                            "E311",
                            "contract predicates must be Boolean",
                            expr.span,
                        ));
                    }
                }
                AnnotationKind::Terminates(expr) => {
                    let found = self.infer_expr(expr, None);
                    let zonked = self.table.zonk(&found);
                    let numeric = matches!(
                        zonked,
                        InferType::Prim(Prim::Integer)
                            | InferType::Prim(Prim::Decimal)
                            | InferType::Unknown
                    );
                    if !numeric {
                        self.diags.push(Diagnostic::error(
                            "E312",
                            "termination measures must be numeric",
                            expr.span,
                        ));
                    }
                }
                AnnotationKind::NearMiss { input, expected } => {
                    if func.params.len() == 1 {
                        let param_ty = self
                            .lookup(func.params[0].name)
                            .map(|l| l.infer.clone())
                            .unwrap_or(InferType::Unknown);
                        let found = self.infer_expr(input, Some(&param_ty));
                        self.unify_or_report(&param_ty, &found, input.span);
                    } else {
                        self.infer_expr(input, None);
                    }
                    let ret_infer = InferType::from_type(ret, &HashMap::new());
                    let found = self.infer_expr(expected, Some(&ret_infer));
                    self.unify_or_report(&ret_infer, &found, expected.span);
                }
                _ => {}
            }
        }
        self.pop_scope();
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn infer_expr(&mut self, expr: &Expr, expected: Option<&InferType>) -> InferType {
        let ty = match &expr.kind {
            ExprKind::Integer(_) => InferType::Prim(Prim::Integer),
            ExprKind::Decimal(_) => InferType::Prim(Prim::Decimal),
            ExprKind::Boolean(_) => InferType::Prim(Prim::Boolean),
            ExprKind::Regex(_) => InferType::Prim(Prim::String),
            ExprKind::Str { pieces, .. } => {
                for piece in pieces {
                    if let StrLitPiece::Interp(inner) = piece {
                        self.infer_expr(inner, None);
                    }
                }
                InferType::Prim(Prim::String)
            }
            ExprKind::Ident(name) => self.infer_ident(expr, *name, expected),
            ExprKind::TypeIdent(_) | ExprKind::TypeApply { .. } => {
                self.infer_constructor(expr, &[], expected)
            }
            ExprKind::Call { callee, args } => self.infer_call(expr, callee, args, expected),
            ExprKind::Field { recv, name } => {
                let recv_ty = self.infer_expr(recv, None);
                self.field_type(&recv_ty, *name, expr.span)
            }
            ExprKind::Pipe { value, target } => self.infer_pipe(expr, value, target, expected),
            ExprKind::FailProp(inner) => self.infer_fail_prop(expr, inner),
            ExprKind::Lambda { params, body } => self.infer_lambda(params, body, expected),
            ExprKind::Valid { args, .. } => self.infer_valid(expr, args.as_deref()),
            ExprKind::Match { subject, arms } => {
                let subject_ty = self.infer_expr(subject, None);
                let subject_param = match &subject.kind {
                    ExprKind::Ident(name) if self.is_param(*name) => Some(*name),
                    _ => None,
                };
                let result = self.table.fresh();
                self.check_arms(arms, &subject_ty, subject_param, Some(&result), subject.span);
                result
            }
            ExprKind::If { cond, then_block, else_block } => {
                if self.comptime_depth == 0 {
                    self.diags.push(
                        Diagnostic::error(
                            "E368",
                            "'if' is only allowed inside 'comptime' blocks",
                            expr.span,
                        )
                        .with_suggestion("use 'match' for run-time branching"),
                    );
                }
                let boolean = InferType::Prim(Prim::Boolean);
                let found = self.infer_expr(cond, Some(&boolean));
                self.unify_or_report(&boolean, &found, cond.span);
                let then_ty = self.check_block_value(then_block);
                if let Some(else_block) = else_block {
                    let else_ty = self.check_block_value(else_block);
                    self.unify_or_report(&then_ty, &else_ty, expr.span);
                }
                then_ty
            }
            ExprKind::Comptime(stmts) => {
                self.comptime_depth += 1;
                let ty = self.check_block_value(stmts);
                self.comptime_depth -= 1;
                ty
            }
            ExprKind::Binary { op, lhs, rhs } => {
                use prove_language::ast::BinaryOp;
                match op {
                    BinaryOp::And | BinaryOp::Or => {
                        let boolean = InferType::Prim(Prim::Boolean);
                        let l = self.infer_expr(lhs, Some(&boolean));
                        self.unify_or_report(&boolean, &l, lhs.span);
                        let r = self.infer_expr(rhs, Some(&boolean));
                        self.unify_or_report(&boolean, &r, rhs.span);
                        boolean
                    }
                    BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le
                    | BinaryOp::Ge => {
                        let l = self.infer_expr(lhs, None);
                        let r = self.infer_expr(rhs, Some(&l));
                        self.unify_or_report(&l, &r, rhs.span);
                        InferType::Prim(Prim::Boolean)
                    }
                    BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
                    | BinaryOp::Mod => {
                        let l = self.infer_expr(lhs, expected.filter(|e| is_numeric(e)));
                        let r = self.infer_expr(rhs, Some(&l));
                        self.unify_or_report(&l, &r, rhs.span);
                        l
                    }
                }
            }
            ExprKind::Unary { op, operand } => match op {
                UnaryOp::Not => {
                    let boolean = InferType::Prim(Prim::Boolean);
                    let found = self.infer_expr(operand, Some(&boolean));
                    self.unify_or_report(&boolean, &found, operand.span);
                    boolean
                }
                UnaryOp::Neg => self.infer_expr(operand, expected),
            },
            ExprKind::Paren(inner) => self.infer_expr(inner, expected),
            ExprKind::List(items) => {
                let elem = self.table.fresh();
                for item in items {
                    let found = self.infer_expr(item, Some(&elem));
                    self.unify_or_report(&elem, &found, item.span);
                }
                InferType::List(Box::new(elem))
            }
            ExprKind::Range { lo, hi } => {
                let integer = InferType::Prim(Prim::Integer);
                let l = self.infer_expr(lo, Some(&integer));
                self.unify_or_report(&integer, &l, lo.span);
                let h = self.infer_expr(hi, Some(&integer));
                self.unify_or_report(&integer, &h, hi.span);
                InferType::List(Box::new(integer))
            }
        };
        self.record(expr.id, ty)
    }

    fn is_param(&self, name: Symbol) -> bool {
        self.lookup(name).is_some()
    }

    fn check_block_value(&mut self, stmts: &[Stmt]) -> InferType {
        self.push_scope();
        let fresh = self.table.fresh();
        let declared = self.table.to_type(&fresh);
        self.check_statement_body(stmts, &fresh, &declared, Span::default());
        self.pop_scope();
        fresh
    }

    fn infer_ident(
        &mut self,
        expr: &Expr,
        name: Symbol,
        expected: Option<&InferType>,
    ) -> InferType {
        if let Some(local) = self.lookup(name) {
            return local.infer.clone();
        }
        match self.resolved.resolution(expr.id) {
            Some(Resolution::Value(id)) => {
                let data = self.resolved.table.get(*id);
                InferType::from_type(&data.ty, &HashMap::new())
            }
            Some(Resolution::Functions(candidates)) => {
                // A bare function name used as a value: resolve by expected
                // function type, or take a sole candidate.
                let chosen = self.select_candidates(candidates, None, expected, expr.span);
                match chosen {
                    Some(id) => {
                        self.call_targets.insert(expr.id, id);
                        self.function_value_type(id)
                    }
                    None => InferType::Unknown,
                }
            }
            Some(Resolution::Constructor(_)) | None => InferType::Unknown,
        }
    }

    fn function_value_type(&mut self, id: SymbolId) -> InferType {
        let data = self.resolved.table.get(id);
        InferType::from_type(&data.ty, &HashMap::new())
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn infer_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        expected: Option<&InferType>,
    ) -> InferType {
        match &callee.kind {
            ExprKind::Ident(name) => {
                if self.lookup(*name).is_some() {
                    // A local holding a function value (lambda parameter).
                    let callee_ty = self.infer_expr(callee, None);
                    return self.apply_function_value(callee_ty, args, expr.span);
                }
                match self.resolved.resolution(callee.id).cloned() {
                    Some(Resolution::Functions(candidates)) => {
                        self.dispatch_call(expr.id, &candidates, args, expected, expr.span)
                    }
                    Some(Resolution::Value(id)) => {
                        let data = self.resolved.table.get(id);
                        let callee_ty = InferType::from_type(&data.ty, &HashMap::new());
                        self.types.insert(callee.id, callee_ty.clone());
                        self.apply_function_value(callee_ty, args, expr.span)
                    }
                    _ => {
                        for arg in args {
                            self.infer_expr(arg, None);
                        }
                        InferType::Unknown
                    }
                }
            }
            ExprKind::TypeIdent(_) | ExprKind::TypeApply { .. } => {
                let ty = self.infer_constructor_call(expr.id, callee, args);
                self.types.insert(callee.id, ty.clone());
                ty
            }
            _ => {
                let callee_ty = self.infer_expr(callee, None);
                self.apply_function_value(callee_ty, args, expr.span)
            }
        }
    }

    fn apply_function_value(
        &mut self,
        callee_ty: InferType,
        args: &[Expr],
        span: Span,
    ) -> InferType {
        let arg_tys: Vec<InferType> = args.iter().map(|a| self.infer_expr(a, None)).collect();
        let ret = self.table.fresh();
        let expected = InferType::Function { params: arg_tys, ret: Box::new(ret.clone()) };
        self.unify_or_report(&expected, &callee_ty, span);
        ret
    }

    /// Context-aware call resolution over a candidate set.
    fn dispatch_call(
        &mut self,
        call_id: NodeId,
        candidates: &[SymbolId],
        args: &[Expr],
        expected: Option<&InferType>,
        span: Span,
    ) -> InferType {
        let arity_matched: Vec<SymbolId> = candidates
            .iter()
            .copied()
            .filter(|id| {
                self.resolved
                    .table
                    .get(*id)
                    .func()
                    .map_or(false, |info| info.params.len() == args.len())
            })
            .collect();
        if arity_matched.is_empty() {
            self.diags.push(Diagnostic::error(
                "E309",
                format!("no variant takes {} arguments", args.len()),
                span,
            ));
            for arg in args {
                self.infer_expr(arg, None);
            }
            return InferType::Unknown;
        }

        let chosen = self.select_candidates(&arity_matched, Some(args), expected, span);
        let Some(symbol) = chosen else {
            for arg in args {
                self.infer_expr(arg, None);
            }
            return InferType::Unknown;
        };
        self.commit_call(call_id, symbol, args, span)
    }

    /// Applies resolution rules 1–5 and returns the surviving candidate.
    fn select_candidates(
        &mut self,
        candidates: &[SymbolId],
        args: Option<&[Expr]>,
        expected: Option<&InferType>,
        span: Span,
    ) -> Option<SymbolId> {
        if candidates.len() == 1 {
            return Some(candidates[0]);
        }
        let expected = expected.map(|e| self.table.zonk(e));

        // Rule 1: Boolean context selects the validates variant.
        if matches!(expected, Some(InferType::Prim(Prim::Boolean))) {
            let validates: Vec<SymbolId> = candidates
                .iter()
                .copied()
                .filter(|id| self.verb_of(*id) == Some(Verb::Validates))
                .collect();
            if validates.len() == 1 {
                return Some(validates[0]);
            }
            if !validates.is_empty() {
                return self.rank_or_ambiguous(&validates, span);
            }
        }

        // Rule 2: the expected type matches exactly one return type.
        if let Some(expected) = &expected {
            if !matches!(expected, InferType::Var(_) | InferType::Unknown) {
                let matching: Vec<SymbolId> = candidates
                    .iter()
                    .copied()
                    .filter(|id| {
                        self.resolved.table.get(*id).func().map_or(false, |info| {
                            InferType::from_type(&info.ret, &HashMap::new()) == *expected
                        })
                    })
                    .collect();
                if matching.len() == 1 {
                    return Some(matching[0]);
                }
            }
        }

        // Rule 3: keep candidates whose parameters unify with the
        // arguments. Trials run on a scratch table so failed candidates
        // leave no bindings behind.
        let survivors: Vec<SymbolId> = match args {
            Some(args) => candidates
                .iter()
                .copied()
                .filter(|id| self.trial_unifies(*id, args))
                .collect(),
            None => candidates.to_vec(),
        };
        let pool = if survivors.is_empty() { candidates } else { &survivors };

        // Rules 4 & 5.
        self.rank_or_ambiguous(pool, span)
    }

    fn rank_or_ambiguous(&mut self, pool: &[SymbolId], span: Span) -> Option<SymbolId> {
        let best_rank = pool
            .iter()
            .filter_map(|id| self.verb_of(*id))
            .map(|v| v.preference_rank())
            .min()?;
        let best: Vec<SymbolId> = pool
            .iter()
            .copied()
            .filter(|id| {
                self.verb_of(*id).map_or(false, |v| v.preference_rank() == best_rank)
            })
            .collect();
        if best.len() == 1 {
            return Some(best[0]);
        }
        let listing = best
            .iter()
            .map(|id| {
                let data = self.resolved.table.get(*id);
                data.ty.display(self.interner)
            })
            .collect::<Vec<_>>()
            .join("\n        ");
        self.diags.push(
            Diagnostic::error("E315", "ambiguous call", span)
                .with_note(format!("candidates:\n        {listing}")),
        );
        best.first().copied()
    }

    fn verb_of(&self, id: SymbolId) -> Option<Verb> {
        match &self.resolved.table.get(id).ty {
            Type::Function { verb, .. } => Some(*verb),
            _ => None,
        }
    }

    fn trial_unifies(&mut self, id: SymbolId, args: &[Expr]) -> bool {
        let Some(info) = self.resolved.table.get(id).func().cloned() else {
            return false;
        };
        if info.params.len() != args.len() {
            return false;
        }
        let mut scratch = self.table.clone();
        let mut subst = HashMap::new();
        for generic in &info.generics {
            subst.insert(*generic, scratch.fresh());
        }
        for (param, arg) in info.params.iter().zip(args) {
            let declared = InferType::from_type(param, &subst);
            let found = match self.types.get(&arg.id) {
                Some(ty) => ty.clone(),
                None => match self.shallow_type(arg) {
                    Some(ty) => ty,
                    None => continue,
                },
            };
            if scratch.unify(&declared, &found).is_err() {
                return false;
            }
        }
        true
    }

    /// A cheap type guess for trial unification, without committing any
    /// inference state: literals and already-typed bindings only.
    fn shallow_type(&self, expr: &Expr) -> Option<InferType> {
        match &expr.kind {
            ExprKind::Integer(_) => Some(InferType::Prim(Prim::Integer)),
            ExprKind::Decimal(_) => Some(InferType::Prim(Prim::Decimal)),
            ExprKind::Boolean(_) => Some(InferType::Prim(Prim::Boolean)),
            ExprKind::Str { .. } => Some(InferType::Prim(Prim::String)),
            ExprKind::Ident(name) => self.lookup(*name).map(|l| self.table.resolve(&l.infer)),
            ExprKind::Paren(inner) => self.shallow_type(inner),
            _ => None,
        }
    }

    fn commit_call(
        &mut self,
        call_id: NodeId,
        symbol: SymbolId,
        args: &[Expr],
        span: Span,
    ) -> InferType {
        let info = match self.resolved.table.get(symbol).func() {
            Some(info) => info.clone(),
            None => return InferType::Unknown,
        };

        self.enforce_purity(symbol, span);

        let mut subst = HashMap::new();
        let mut generic_vars = Vec::new();
        for generic in &info.generics {
            let var = self.table.fresh();
            subst.insert(*generic, var.clone());
            generic_vars.push(var);
        }

        if info.params.len() != args.len() {
            self.diags.push(Diagnostic::error(
                "E309",
                format!("expected {} arguments, found {}", info.params.len(), args.len()),
                span,
            ));
        }

        let mut arg_ids = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            arg_ids.push(arg.id);
            match info.params.get(i) {
                Some(param_ty) => {
                    let declared = InferType::from_type(param_ty, &subst);
                    let found = self.infer_expr(arg, Some(&declared));
                    self.unify_or_report(&declared, &found, arg.span);
                    self.check_refinement_obligation(param_ty, arg);
                }
                None => {
                    self.infer_expr(arg, None);
                }
            }
        }

        self.call_targets.insert(call_id, symbol);
        if !generic_vars.is_empty() {
            self.instantiations.insert(call_id, generic_vars);
        }
        self.call_sites.push(CallSite {
            caller: self.current_fn,
            callee: symbol,
            expr: call_id,
            arg_ids,
        });

        let ret = InferType::from_type(&info.ret, &subst);
        if info.fallible {
            InferType::Result(Box::new(ret), Box::new(InferType::Prim(Prim::String)))
        } else {
            ret
        }
    }

    fn enforce_purity(&mut self, callee: SymbolId, span: Span) {
        let Some(verb) = self.current_verb else {
            return;
        };
        if !verb.is_pure() {
            return;
        }
        let data = self.resolved.table.get(callee);
        match data.kind {
            SymbolKind::BuiltinFunction => {
                let is_io = data.func().map_or(false, |info| info.is_io);
                if is_io {
                    self.diags.push(
                        Diagnostic::error(
                            "E362",
                            format!(
                                "'{}' functions cannot call the IO builtin '{}'",
                                verb.keyword(),
                                self.interner.resolve(data.name)
                            ),
                            span,
                        )
                        .with_note("pure verbs are transforms, validates, reads, creates, matches"),
                    );
                }
            }
            SymbolKind::Function => {
                if let Type::Function { verb: callee_verb, .. } = &data.ty {
                    if !callee_verb.is_pure() {
                        self.diags.push(
                            Diagnostic::error(
                                "E363",
                                format!(
                                    "'{}' functions cannot call '{} {}'",
                                    verb.keyword(),
                                    callee_verb.keyword(),
                                    self.interner.resolve(data.name)
                                ),
                                span,
                            )
                            .with_note("pure verbs are transforms, validates, reads, creates, matches"),
                        );
                    }
                }
            }
            _ => {}
        }
    }

    fn infer_constructor(
        &mut self,
        expr: &Expr,
        args: &[Expr],
        _expected: Option<&InferType>,
    ) -> InferType {
        self.infer_constructor_parts(expr.id, expr, args)
    }

    fn infer_constructor_call(&mut self, call_id: NodeId, callee: &Expr, args: &[Expr]) -> InferType {
        self.infer_constructor_parts(call_id, callee, args)
    }

    fn infer_constructor_parts(
        &mut self,
        record_id: NodeId,
        head: &Expr,
        args: &[Expr],
    ) -> InferType {
        let Some(Resolution::Constructor(symbol)) = self.resolved.resolution(head.id).cloned()
        else {
            for arg in args {
                self.infer_expr(arg, None);
            }
            return InferType::Unknown;
        };
        let data = self.resolved.table.get(symbol);
        let Type::Function { params, ret, .. } = data.ty.clone() else {
            return InferType::Unknown;
        };

        // Instantiate the owning type's generics.
        let mut generics = Vec::new();
        collect_params(&ret, &mut generics);
        let mut subst = HashMap::new();
        for generic in &generics {
            subst.insert(*generic, self.table.fresh());
        }
        if let ExprKind::TypeApply { args: type_args, .. } = &head.kind {
            for (generic, ty) in generics.iter().zip(type_args) {
                let lowered = self.lower(ty);
                let explicit = InferType::from_type(&lowered, &HashMap::new());
                if let Some(var) = subst.get(generic) {
                    let var = var.clone();
                    self.unify_or_report(&var, &explicit, head.span);
                }
            }
        }

        if params.len() != args.len() && !args.is_empty() {
            self.diags.push(Diagnostic::error(
                "E309",
                format!("'{}' takes {} fields, found {}", self.interner.resolve(data.name), params.len(), args.len()),
                head.span,
            ));
        }
        for (param, arg) in params.iter().zip(args) {
            let declared = InferType::from_type(param, &subst);
            let found = self.infer_expr(arg, Some(&declared));
            self.unify_or_report(&declared, &found, arg.span);
        }

        self.call_targets.insert(record_id, symbol);
        if args.is_empty() && !params.is_empty() {
            // Bare constructor reference: a creates-function value.
            return InferType::Function {
                params: params.iter().map(|p| InferType::from_type(p, &subst)).collect(),
                ret: Box::new(InferType::from_type(&ret, &subst)),
            };
        }
        InferType::from_type(&ret, &subst)
    }

    fn infer_pipe(
        &mut self,
        expr: &Expr,
        value: &Expr,
        target: &Expr,
        expected: Option<&InferType>,
    ) -> InferType {
        // `a |> f` is `f(a)`; `a |> f(b)` appends: `f(b, a)`.
        match &target.kind {
            ExprKind::Call { callee, args } => {
                let mut full_args: Vec<Expr> = args.clone();
                full_args.push(value.clone());
                let ty = match &callee.kind {
                    ExprKind::Ident(_) => match self.resolved.resolution(callee.id).cloned() {
                        Some(Resolution::Functions(candidates)) => self.dispatch_call(
                            target.id,
                            &candidates,
                            &full_args,
                            expected,
                            expr.span,
                        ),
                        _ => {
                            let callee_ty = self.infer_expr(callee, None);
                            self.apply_function_value(callee_ty, &full_args, expr.span)
                        }
                    },
                    _ => {
                        let callee_ty = self.infer_expr(callee, None);
                        self.apply_function_value(callee_ty, &full_args, expr.span)
                    }
                };
                self.types.insert(target.id, ty.clone());
                ty
            }
            ExprKind::Ident(_) => match self.resolved.resolution(target.id).cloned() {
                Some(Resolution::Functions(candidates)) => {
                    let single = [value.clone()];
                    let ty =
                        self.dispatch_call(target.id, &candidates, &single, expected, expr.span);
                    self.types.insert(target.id, ty.clone());
                    ty
                }
                _ => {
                    let callee_ty = self.infer_expr(target, None);
                    self.apply_function_value(callee_ty, std::slice::from_ref(value), expr.span)
                }
            },
            _ => {
                let callee_ty = self.infer_expr(target, None);
                self.apply_function_value(callee_ty, std::slice::from_ref(value), expr.span)
            }
        }
    }

    fn infer_fail_prop(&mut self, expr: &Expr, inner: &Expr) -> InferType {
        let in_fallible_context = self.current_fallible
            || matches!(self.current_verb, Some(Verb::Inputs) | Some(Verb::Outputs));
        let placement_ok = self.current_verb.map_or(true, |v| !v.is_pure());
        if !placement_ok {
            self.diags.push(
                Diagnostic::error(
                    "E361",
                    format!(
                        "'!' cannot be used inside a '{}' function",
                        self.current_verb.unwrap().keyword()
                    ),
                    expr.span,
                )
                .with_note("fail propagation is only allowed in 'inputs', 'outputs', and 'main'"),
            );
        } else if !in_fallible_context {
            self.diags.push(
                Diagnostic::error(
                    "E361",
                    "'!' requires the enclosing function to be declared fallible",
                    expr.span,
                )
                .with_suggestion("add '!' to the enclosing signature"),
            );
        }

        let inner_ty = self.infer_expr(inner, None);
        match self.table.zonk(&inner_ty) {
            InferType::Result(ok, _) => *ok,
            InferType::Option(inner) => *inner,
            InferType::Unknown => InferType::Unknown,
            other => {
                self.diags.push(Diagnostic::error(
                    "E314",
                    format!(
                        "'!' needs a Result or Option value, found {}",
                        self.describe_infer(&other)
                    ),
                    inner.span,
                ));
                InferType::Unknown
            }
        }
    }

    fn infer_lambda(
        &mut self,
        params: &[(Symbol, Option<TypeExpr>)],
        body: &Expr,
        expected: Option<&InferType>,
    ) -> InferType {
        let expected_fn = expected.map(|e| self.table.zonk(e));
        let expected_parts = match &expected_fn {
            Some(InferType::Function { params: ps, ret }) if ps.len() == params.len() => {
                Some((ps.clone(), (**ret).clone()))
            }
            _ => None,
        };

        self.push_scope();
        let mut param_tys = Vec::new();
        for (i, (name, ty)) in params.iter().enumerate() {
            let infer = match ty {
                Some(ty) => {
                    let lowered = self.lower(ty);
                    InferType::from_type(&lowered, &HashMap::new())
                }
                None => match &expected_parts {
                    Some((ps, _)) => ps[i].clone(),
                    None => self.table.fresh(),
                },
            };
            param_tys.push(infer.clone());
            self.bind(*name, LocalInfo { infer, declared: Type::Unknown, smaller_than: None });
        }
        let expected_ret = expected_parts.as_ref().map(|(_, r)| r.clone());
        let body_ty = self.infer_expr(body, expected_ret.as_ref());
        if let Some(expected_ret) = expected_ret {
            self.unify_or_report(&expected_ret, &body_ty, body.span);
        }
        self.pop_scope();

        InferType::Function { params: param_tys, ret: Box::new(body_ty) }
    }

    fn infer_valid(&mut self, expr: &Expr, args: Option<&[Expr]>) -> InferType {
        let Some(Resolution::Functions(candidates)) = self.resolved.resolution(expr.id).cloned()
        else {
            if let Some(args) = args {
                for arg in args {
                    self.infer_expr(arg, None);
                }
            }
            return InferType::Unknown;
        };
        match args {
            Some(args) => self.dispatch_call(expr.id, &candidates, args, None, expr.span),
            None => {
                if candidates.len() > 1 {
                    self.rank_or_ambiguous(&candidates, expr.span);
                }
                let symbol = candidates[0];
                self.call_targets.insert(expr.id, symbol);
                self.function_value_type(symbol)
            }
        }
    }

    fn field_type(&mut self, recv: &InferType, field: Symbol, span: Span) -> InferType {
        let recv = self.table.zonk(recv);
        let owner = match recv {
            InferType::Record(name) | InferType::Algebraic(name) => name,
            InferType::Applied { head, .. } => head,
            InferType::Unknown => return InferType::Unknown,
            other => {
                self.diags.push(Diagnostic::error(
                    "E318",
                    format!("{} has no fields", self.describe_infer(&other)),
                    span,
                ));
                return InferType::Unknown;
            }
        };
        let fields = match self.resolved.registry.get(owner).map(|info| &info.kind) {
            Some(TypeDefKind::Record(fields)) => fields.clone(),
            _ => {
                self.diags.push(Diagnostic::error(
                    "E318",
                    format!("'{}' is not a record", self.interner.resolve(owner)),
                    span,
                ));
                return InferType::Unknown;
            }
        };
        match fields.iter().find(|f| f.name == field) {
            Some(info) => InferType::from_type(&info.ty, &HashMap::new()),
            None => {
                self.diags.push(Diagnostic::error(
                    "E318",
                    format!(
                        "'{}' has no field '{}'",
                        self.interner.resolve(owner),
                        self.interner.resolve(field)
                    ),
                    span,
                ));
                InferType::Unknown
            }
        }
    }

    // ------------------------------------------------------------------
    // Match arms & exhaustiveness
    // ------------------------------------------------------------------

    fn check_arms(
        &mut self,
        arms: &[MatchArm],
        subject: &InferType,
        subject_param: Option<Symbol>,
        result: Option<&InferType>,
        subject_span: Span,
    ) {
        let mut covered: HashSet<Symbol> = HashSet::new();
        let mut saw_wildcard = false;
        let mut bool_covered = [false, false];

        for arm in arms {
            if saw_wildcard {
                self.diags.push(Diagnostic::warning(
                    "W304",
                    "arm is unreachable: a wildcard arm precedes it",
                    arm.span,
                ));
            }
            self.push_scope();
            self.check_pattern(&arm.pattern, subject, subject_param, &mut covered, &mut saw_wildcard, &mut bool_covered);
            let body_ty = self.infer_expr(&arm.body, result);
            if let Some(result) = result {
                self.unify_or_report(result, &body_ty, arm.body.span);
            }
            self.pop_scope();
        }

        if saw_wildcard {
            return;
        }
        match self.table.zonk(subject) {
            InferType::Algebraic(name) | InferType::Applied { head: name, .. } => {
                let missing: Vec<String> = match self.resolved.registry.get(name).map(|i| &i.kind) {
                    Some(TypeDefKind::Algebraic(variants)) => variants
                        .iter()
                        .filter(|v| !covered.contains(&v.name))
                        .map(|v| self.interner.resolve(v.name).to_string())
                        .collect(),
                    _ => Vec::new(),
                };
                if !missing.is_empty() {
                    self.diags.push(
                        Diagnostic::error(
                            "E303",
                            format!("match does not cover {}", missing.join(", ")),
                            subject_span,
                        )
                        .with_suggestion("add the missing arms or a '_' arm"),
                    );
                }
            }
            InferType::Option(_) => {
                let needed = ["Some", "None"];
                let missing: Vec<&str> = needed
                    .iter()
                    .filter(|n| {
                        self.interner.lookup(n).map_or(true, |sym| !covered.contains(&sym))
                    })
                    .copied()
                    .collect();
                if !missing.is_empty() {
                    self.diags.push(Diagnostic::error(
                        "E303",
                        format!("match does not cover {}", missing.join(", ")),
                        subject_span,
                    ));
                }
            }
            InferType::Result(_, _) => {
                let needed = ["Ok", "Err"];
                let missing: Vec<&str> = needed
                    .iter()
                    .filter(|n| {
                        self.interner.lookup(n).map_or(true, |sym| !covered.contains(&sym))
                    })
                    .copied()
                    .collect();
                if !missing.is_empty() {
                    self.diags.push(Diagnostic::error(
                        "E303",
                        format!("match does not cover {}", missing.join(", ")),
                        subject_span,
                    ));
                }
            }
            InferType::Prim(Prim::Boolean) => {
                if !(bool_covered[0] && bool_covered[1]) {
                    self.diags.push(Diagnostic::error(
                        "E303",
                        "boolean match must cover true and false or end with '_'",
                        subject_span,
                    ));
                }
            }
            InferType::Unknown => {}
            _ => {
                self.diags.push(Diagnostic::error(
                    "E303",
                    "match over this type needs a final '_' arm",
                    subject_span,
                ));
            }
        }
    }

    fn check_pattern(
        &mut self,
        pattern: &Pattern,
        subject: &InferType,
        subject_param: Option<Symbol>,
        covered: &mut HashSet<Symbol>,
        saw_wildcard: &mut bool,
        bool_covered: &mut [bool; 2],
    ) {
        match &pattern.kind {
            PatternKind::Wildcard => *saw_wildcard = true,
            PatternKind::Binding(name) => {
                *saw_wildcard = true;
                self.bind(
                    *name,
                    LocalInfo {
                        infer: subject.clone(),
                        declared: Type::Unknown,
                        smaller_than: None,
                    },
                );
            }
            PatternKind::Literal(lit) => {
                let lit_ty = match lit {
                    PatLiteral::Integer(_) => InferType::Prim(Prim::Integer),
                    PatLiteral::Decimal(_) => InferType::Prim(Prim::Decimal),
                    PatLiteral::Boolean(value) => {
                        bool_covered[if *value { 0 } else { 1 }] = true;
                        InferType::Prim(Prim::Boolean)
                    }
                    PatLiteral::Str(_) => InferType::Prim(Prim::String),
                };
                self.unify_or_report(subject, &lit_ty, pattern.span);
            }
            PatternKind::Variant { name, args } => {
                covered.insert(*name);
                let Some(ctor) = self.resolved.table.constructor(*name) else {
                    return;
                };
                let data = self.resolved.table.get(ctor);
                let Type::Function { params, ret, .. } = data.ty.clone() else {
                    return;
                };
                let mut generics = Vec::new();
                collect_params(&ret, &mut generics);
                let mut subst = HashMap::new();
                for generic in &generics {
                    subst.insert(*generic, self.table.fresh());
                }
                let instance = InferType::from_type(&ret, &subst);
                self.unify_or_report(subject, &instance, pattern.span);
                for (field_ty, arg) in params.iter().zip(args) {
                    let field_infer = InferType::from_type(field_ty, &subst);
                    match &arg.kind {
                        PatternKind::Binding(bound) => {
                            self.bind(
                                *bound,
                                LocalInfo {
                                    infer: field_infer,
                                    declared: Type::Unknown,
                                    smaller_than: subject_param,
                                },
                            );
                        }
                        _ => {
                            // Nested coverage is tracked separately so inner
                            // variant names never count toward the subject's
                            // coverage.
                            let mut nested_covered = HashSet::new();
                            let mut nested_wild = false;
                            let mut nested_bool = [false, false];
                            self.check_pattern(
                                arg,
                                &field_infer,
                                None,
                                &mut nested_covered,
                                &mut nested_wild,
                                &mut nested_bool,
                            );
                        }
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Refinements
    // ------------------------------------------------------------------

    /// Enforces a refined target at an assignment or argument position.
    ///
    /// A known value is evaluated against the constraint at compile time;
    /// an unknown value gets a runtime check unless its own declared
    /// refinement structurally implies the target (ranges, equality, and
    /// conjunctions only).
    fn check_refinement_obligation(&mut self, declared: &Type, value: &Expr) {
        let Type::Refined { base, constraint } = declared else {
            return;
        };
        if let Some(known) = const_eval(value) {
            match eval_constraint(constraint, &known, self.interner) {
                Some(true) => {}
                Some(false) => {
                    let rendered = known.render();
                    let suggestion = match (range_bounds(constraint), &known) {
                        (Some((lo, hi)), ConstValue::Int(_)) => {
                            format!("clamp({rendered}, {lo}, {hi})")
                        }
                        _ => format!("check({rendered})!"),
                    };
                    self.diags.push(
                        Diagnostic::error(
                            "E310",
                            format!(
                                "value {} does not satisfy the refinement on {}",
                                rendered,
                                base.display(self.interner)
                            ),
                            value.span,
                        )
                        .with_suggestion(suggestion),
                    );
                }
                None => {
                    self.runtime_checks.insert(value.id, declared.clone());
                }
            }
            return;
        }

        // Unknown value: look for a narrower source refinement.
        if let Some(source) = self.source_refinement(value) {
            if implies(&source, constraint) {
                return;
            }
        }
        self.runtime_checks.insert(value.id, declared.clone());
    }

    /// The declared refinement of the value's source, when it has one.
    fn source_refinement(&self, value: &Expr) -> Option<Expr> {
        match &value.kind {
            ExprKind::Ident(name) => {
                let declared = match self.lookup(*name) {
                    Some(local) => local.declared.clone(),
                    None => match self.resolved.resolution(value.id) {
                        Some(Resolution::Value(id)) => self.resolved.table.get(*id).ty.clone(),
                        _ => return None,
                    },
                };
                match declared {
                    Type::Refined { constraint, .. } => Some((*constraint).clone()),
                    _ => None,
                }
            }
            ExprKind::Paren(inner) => self.source_refinement(inner),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Termination
    // ------------------------------------------------------------------

    /// Recursive functions (directly or through a same-module cycle) must
    /// declare a syntactically decreasing `terminates` measure.
    fn check_termination(&mut self, module: &Module) {
        let mut edges: HashMap<SymbolId, HashSet<SymbolId>> = HashMap::new();
        for site in &self.call_sites {
            if let Some(caller) = site.caller {
                if matches!(self.resolved.table.get(site.callee).kind, SymbolKind::Function) {
                    edges.entry(caller).or_default().insert(site.callee);
                }
            }
        }

        let mut cyclic: HashSet<SymbolId> = HashSet::new();
        for &start in edges.keys() {
            if reaches(&edges, start, start) {
                cyclic.insert(start);
            }
        }
        if cyclic.is_empty() {
            return;
        }

        let expr_index = build_expr_index(module);
        for (index, func) in module.functions.iter().enumerate() {
            let Some(symbol) = self.def_symbols.get(&index).copied() else {
                continue;
            };
            if !cyclic.contains(&symbol) {
                continue;
            }
            let measure = func.annotations.iter().find_map(|a| match &a.kind {
                AnnotationKind::Terminates(expr) => Some(expr),
                _ => None,
            });
            let Some(measure) = measure else {
                self.diags.push(
                    Diagnostic::error(
                        "E366",
                        format!(
                            "recursive function '{}' must declare 'terminates'",
                            self.interner.resolve(func.name)
                        ),
                        func.name_span,
                    )
                    .with_suggestion("add 'terminates: <measure>' naming a shrinking quantity"),
                );
                continue;
            };
            self.verify_measure(func, symbol, measure, &expr_index);
        }
    }

    /// A measure passes when every recursive call site shrinks it by one of
    /// the three syntactic rules: `len(x)` over a shrinking-list builtin,
    /// an integer decrement, or a structural (pattern-bound) shrink.
    fn verify_measure(
        &mut self,
        func: &FunctionDef,
        symbol: SymbolId,
        measure: &Expr,
        expr_index: &HashMap<NodeId, &Expr>,
    ) {
        let Some(measured_param) = measure_param(measure, func) else {
            self.diags.push(Diagnostic::error(
                "E366",
                "the termination measure must reference a parameter",
                measure.span,
            ));
            return;
        };
        let param_pos = func
            .params
            .iter()
            .position(|p| p.name == measured_param)
            .unwrap_or(0);

        let sites: Vec<(NodeId, Vec<NodeId>)> = self
            .call_sites
            .iter()
            .filter(|site| site.caller == Some(symbol) && site.callee == symbol)
            .map(|site| (site.expr, site.arg_ids.clone()))
            .collect();
        for (site_id, arg_ids) in sites {
            let Some(arg_id) = arg_ids.get(param_pos) else {
                continue;
            };
            let Some(arg) = expr_index.get(arg_id) else {
                continue;
            };
            if !self.argument_shrinks(arg, measured_param) {
                let span = expr_index.get(&site_id).map(|e| e.span).unwrap_or(arg.span);
                self.diags.push(
                    Diagnostic::error(
                        "E366",
                        format!(
                            "cannot show '{}' shrinks at this recursive call",
                            self.interner.resolve(measured_param)
                        ),
                        span,
                    )
                    .with_note(
                        "accepted shapes: tail(x), x - k with positive k, or a variant-pattern binding",
                    ),
                );
            }
        }
    }

    fn argument_shrinks(&self, arg: &Expr, param: Symbol) -> bool {
        match &arg.kind {
            // len-shrinking via a list-shortening builtin.
            ExprKind::Call { callee, args } => match &callee.kind {
                ExprKind::Ident(name) => {
                    let shrinking = matches!(self.interner.resolve(*name), "tail");
                    shrinking
                        && args.first().map_or(false, |a| {
                            matches!(&a.kind, ExprKind::Ident(n) if *n == param)
                        })
                }
                _ => false,
            },
            // Integer decrement on the measured parameter.
            ExprKind::Binary { op: prove_language::ast::BinaryOp::Sub, lhs, rhs } => {
                matches!(&lhs.kind, ExprKind::Ident(n) if *n == param)
                    && matches!(&rhs.kind, ExprKind::Integer(k) if *k > 0)
            }
            // Structural shrink: a binding from destructuring the parameter.
            ExprKind::Ident(name) => self
                .lookup(*name)
                .map_or(false, |local| local.smaller_than == Some(param)),
            ExprKind::Paren(inner) => self.argument_shrinks(inner, param),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Finalize
    // ------------------------------------------------------------------

    fn finish(self) -> CheckOutput {
        let mut types = HashMap::new();
        for (id, ty) in &self.types {
            types.insert(*id, self.table.to_type(ty));
        }
        // Node order keeps the monomorphization table deterministic, which
        // keeps the emitted C byte-stable.
        let mut ordered: Vec<(&NodeId, &Vec<InferType>)> = self.instantiations.iter().collect();
        ordered.sort_by_key(|(id, _)| id.0);
        let mut instantiations = HashMap::new();
        let mut mono: HashMap<SymbolId, Vec<Vec<Type>>> = HashMap::new();
        for (id, vars) in ordered {
            let concrete: Vec<Type> = vars.iter().map(|v| self.table.to_type(v)).collect();
            if let Some(symbol) = self.call_targets.get(id) {
                let entry = mono.entry(*symbol).or_default();
                if !entry.contains(&concrete) {
                    entry.push(concrete.clone());
                }
            }
            instantiations.insert(*id, concrete);
        }
        CheckOutput {
            types,
            call_targets: self.call_targets,
            instantiations,
            runtime_checks: self.runtime_checks,
            mono,
        }
    }
}

fn is_numeric(ty: &InferType) -> bool {
    matches!(
        ty,
        InferType::Prim(Prim::Integer)
            | InferType::Prim(Prim::Decimal)
            | InferType::Prim(Prim::Float)
            | InferType::Prim(Prim::Byte)
    )
}

fn collect_params(ty: &Type, out: &mut Vec<Symbol>) {
    match ty {
        Type::Param(name) => {
            if !out.contains(name) {
                out.push(*name);
            }
        }
        Type::Refined { base, .. } => collect_params(base, out),
        Type::Function { params, ret, .. } => {
            for p in params {
                collect_params(p, out);
            }
            collect_params(ret, out);
        }
        Type::Applied { args, .. } => {
            for a in args {
                collect_params(a, out);
            }
        }
        Type::Option(inner) | Type::List(inner) => collect_params(inner, out),
        Type::Result(ok, err) => {
            collect_params(ok, out);
            collect_params(err, out);
        }
        _ => {}
    }
}

fn reaches(
    edges: &HashMap<SymbolId, HashSet<SymbolId>>,
    from: SymbolId,
    target: SymbolId,
) -> bool {
    let mut stack: Vec<SymbolId> = edges.get(&from).into_iter().flatten().copied().collect();
    let mut seen = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == target {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(next) = edges.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

fn build_expr_index(module: &Module) -> HashMap<NodeId, &Expr> {
    let mut index = HashMap::new();
    fn walk<'m>(expr: &'m Expr, index: &mut HashMap<NodeId, &'m Expr>) {
        index.insert(expr.id, expr);
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                walk(callee, index);
                for arg in args {
                    walk(arg, index);
                }
            }
            ExprKind::Field { recv, .. } => walk(recv, index),
            ExprKind::Pipe { value, target } => {
                walk(value, index);
                walk(target, index);
            }
            ExprKind::FailProp(inner) | ExprKind::Paren(inner) => walk(inner, index),
            ExprKind::Lambda { body, .. } => walk(body, index),
            ExprKind::Valid { args: Some(args), .. } => {
                for arg in args {
                    walk(arg, index);
                }
            }
            ExprKind::Match { subject, arms } => {
                walk(subject, index);
                for arm in arms {
                    walk(&arm.body, index);
                }
            }
            ExprKind::If { cond, then_block, else_block } => {
                walk(cond, index);
                for stmt in then_block {
                    walk_stmt(stmt, index);
                }
                if let Some(else_block) = else_block {
                    for stmt in else_block {
                        walk_stmt(stmt, index);
                    }
                }
            }
            ExprKind::Comptime(stmts) => {
                for stmt in stmts {
                    walk_stmt(stmt, index);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                walk(lhs, index);
                walk(rhs, index);
            }
            ExprKind::Unary { operand, .. } => walk(operand, index),
            ExprKind::List(items) => {
                for item in items {
                    walk(item, index);
                }
            }
            ExprKind::Range { lo, hi } => {
                walk(lo, index);
                walk(hi, index);
            }
            ExprKind::Str { pieces, .. } => {
                for piece in pieces {
                    if let StrLitPiece::Interp(inner) = piece {
                        walk(inner, index);
                    }
                }
            }
            _ => {}
        }
    }
    fn walk_stmt<'m>(stmt: &'m Stmt, index: &mut HashMap<NodeId, &'m Expr>) {
        match &stmt.kind {
            StmtKind::VarDecl { value, .. } | StmtKind::Assign { value, .. } => walk(value, index),
            StmtKind::Expr(expr) => walk(expr, index),
        }
    }
    for func in &module.functions {
        for annotation in &func.annotations {
            match &annotation.kind {
                AnnotationKind::Requires(e)
                | AnnotationKind::Ensures(e)
                | AnnotationKind::Know(e)
                | AnnotationKind::Assume(e)
                | AnnotationKind::Believe(e)
                | AnnotationKind::Terminates(e) => walk(e, &mut index),
                AnnotationKind::NearMiss { input, expected } => {
                    walk(input, &mut index);
                    walk(expected, &mut index);
                }
                _ => {}
            }
        }
        match &func.body {
            Body::Statements(stmts) => {
                for stmt in stmts {
                    walk_stmt(stmt, &mut index);
                }
            }
            Body::MatchArms(arms) => {
                for arm in arms {
                    walk(&arm.body, &mut index);
                }
            }
        }
    }
    for main in &module.mains {
        for stmt in &main.body {
            walk_stmt(stmt, &mut index);
        }
    }
    for constant in &module.constants {
        walk(&constant.value, &mut index);
    }
    index
}

// ============================================================================
// Constant evaluation for refinement checking
// ============================================================================

/// A compile-time-known value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Dec(f64),
    Bool(bool),
    Str(String),
}

impl ConstValue {
    pub fn render(&self) -> String {
        match self {
            ConstValue::Int(v) => v.to_string(),
            ConstValue::Dec(v) => v.to_string(),
            ConstValue::Bool(v) => v.to_string(),
            ConstValue::Str(v) => format!("{v:?}"),
        }
    }
}

/// Evaluates literal-only expressions; anything touching a name is `None`.
pub fn const_eval(expr: &Expr) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::Integer(v) => Some(ConstValue::Int(*v)),
        ExprKind::Decimal(v) => Some(ConstValue::Dec(*v)),
        ExprKind::Boolean(v) => Some(ConstValue::Bool(*v)),
        ExprKind::Str { pieces, .. } => {
            let mut text = String::new();
            for piece in pieces {
                match piece {
                    StrLitPiece::Text(t) => text.push_str(t),
                    StrLitPiece::Interp(_) => return None,
                }
            }
            Some(ConstValue::Str(text))
        }
        ExprKind::Paren(inner) => const_eval(inner),
        ExprKind::Unary { op: UnaryOp::Neg, operand } => match const_eval(operand)? {
            ConstValue::Int(v) => Some(ConstValue::Int(-v)),
            ConstValue::Dec(v) => Some(ConstValue::Dec(-v)),
            _ => None,
        },
        ExprKind::Unary { op: UnaryOp::Not, operand } => match const_eval(operand)? {
            ConstValue::Bool(v) => Some(ConstValue::Bool(!v)),
            _ => None,
        },
        ExprKind::Binary { op, lhs, rhs } => {
            use prove_language::ast::BinaryOp;
            let l = const_eval(lhs)?;
            let r = const_eval(rhs)?;
            match (l, r) {
                (ConstValue::Int(a), ConstValue::Int(b)) => Some(match op {
                    BinaryOp::Add => ConstValue::Int(a.checked_add(b)?),
                    BinaryOp::Sub => ConstValue::Int(a.checked_sub(b)?),
                    BinaryOp::Mul => ConstValue::Int(a.checked_mul(b)?),
                    BinaryOp::Div => ConstValue::Int(a.checked_div(b)?),
                    BinaryOp::Mod => ConstValue::Int(a.checked_rem(b)?),
                    BinaryOp::Eq => ConstValue::Bool(a == b),
                    BinaryOp::Ne => ConstValue::Bool(a != b),
                    BinaryOp::Lt => ConstValue::Bool(a < b),
                    BinaryOp::Gt => ConstValue::Bool(a > b),
                    BinaryOp::Le => ConstValue::Bool(a <= b),
                    BinaryOp::Ge => ConstValue::Bool(a >= b),
                    _ => return None,
                }),
                (ConstValue::Bool(a), ConstValue::Bool(b)) => Some(match op {
                    BinaryOp::And => ConstValue::Bool(a && b),
                    BinaryOp::Or => ConstValue::Bool(a || b),
                    BinaryOp::Eq => ConstValue::Bool(a == b),
                    BinaryOp::Ne => ConstValue::Bool(a != b),
                    _ => return None,
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Evaluates a refinement constraint against a known subject value.
///
/// Range constraints test inclusively; comparison and logical constraints
/// treat any unresolvable identifier as the subject. `None` means the
/// constraint cannot be decided statically.
pub fn eval_constraint(constraint: &Expr, subject: &ConstValue, interner: &Interner) -> Option<bool> {
    match &constraint.kind {
        ExprKind::Range { lo, hi } => {
            let lo = eval_with_subject(lo, subject, interner)?;
            let hi = eval_with_subject(hi, subject, interner)?;
            match (subject, lo, hi) {
                (ConstValue::Int(v), ConstValue::Int(lo), ConstValue::Int(hi)) => {
                    Some(*v >= lo && *v <= hi)
                }
                _ => None,
            }
        }
        _ => match eval_with_subject(constraint, subject, interner)? {
            ConstValue::Bool(result) => Some(result),
            _ => None,
        },
    }
}

fn eval_with_subject(expr: &Expr, subject: &ConstValue, interner: &Interner) -> Option<ConstValue> {
    match &expr.kind {
        ExprKind::Ident(_) => Some(subject.clone()),
        ExprKind::Paren(inner) => eval_with_subject(inner, subject, interner),
        ExprKind::Call { callee, args } => {
            // `len(value)` over a known string; other calls stay opaque.
            if let ExprKind::Ident(name) = &callee.kind {
                if interner.resolve(*name) == "len" && args.len() == 1 {
                    if let Some(ConstValue::Str(text)) =
                        eval_with_subject(&args[0], subject, interner)
                    {
                        return Some(ConstValue::Int(text.len() as i64));
                    }
                }
            }
            None
        }
        ExprKind::Unary { op, operand } => {
            let value = eval_with_subject(operand, subject, interner)?;
            match (op, value) {
                (UnaryOp::Neg, ConstValue::Int(v)) => Some(ConstValue::Int(-v)),
                (UnaryOp::Not, ConstValue::Bool(v)) => Some(ConstValue::Bool(!v)),
                _ => None,
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            use prove_language::ast::BinaryOp;
            let l = eval_with_subject(lhs, subject, interner)?;
            let r = eval_with_subject(rhs, subject, interner)?;
            match (l, r) {
                (ConstValue::Int(a), ConstValue::Int(b)) => Some(match op {
                    BinaryOp::Add => ConstValue::Int(a.checked_add(b)?),
                    BinaryOp::Sub => ConstValue::Int(a.checked_sub(b)?),
                    BinaryOp::Mul => ConstValue::Int(a.checked_mul(b)?),
                    BinaryOp::Div => ConstValue::Int(a.checked_div(b)?),
                    BinaryOp::Mod => ConstValue::Int(a.checked_rem(b)?),
                    BinaryOp::Eq => ConstValue::Bool(a == b),
                    BinaryOp::Ne => ConstValue::Bool(a != b),
                    BinaryOp::Lt => ConstValue::Bool(a < b),
                    BinaryOp::Gt => ConstValue::Bool(a > b),
                    BinaryOp::Le => ConstValue::Bool(a <= b),
                    BinaryOp::Ge => ConstValue::Bool(a >= b),
                    _ => return None,
                }),
                (ConstValue::Bool(a), ConstValue::Bool(b)) => Some(match op {
                    BinaryOp::And => ConstValue::Bool(a && b),
                    BinaryOp::Or => ConstValue::Bool(a || b),
                    _ => return None,
                }),
                (ConstValue::Str(a), ConstValue::Str(b)) => Some(match op {
                    BinaryOp::Eq => ConstValue::Bool(a == b),
                    BinaryOp::Ne => ConstValue::Bool(a != b),
                    _ => return None,
                }),
                _ => None,
            }
        }
        _ => const_eval(expr),
    }
}

/// Extracts `(lo, hi)` from a literal range constraint, for the clamp
/// suggestion.
fn range_bounds(constraint: &Expr) -> Option<(i64, i64)> {
    match &constraint.kind {
        ExprKind::Range { lo, hi } => match (const_eval(lo)?, const_eval(hi)?) {
            (ConstValue::Int(lo), ConstValue::Int(hi)) => Some((lo, hi)),
            _ => None,
        },
        _ => None,
    }
}

/// Structural subsumption: does refinement `a` imply refinement `b`?
///
/// Only ranges, equality (identical fingerprints), and conjunctions are
/// subsumed; anything else conservatively fails and falls back to a
/// runtime check.
pub fn implies(a: &Expr, b: &Expr) -> bool {
    if expr_fingerprint(a) == expr_fingerprint(b) {
        return true;
    }
    if let ExprKind::Binary { op: prove_language::ast::BinaryOp::And, lhs, rhs } = &b.kind {
        return implies(a, lhs) && implies(a, rhs);
    }
    if let ExprKind::Binary { op: prove_language::ast::BinaryOp::And, lhs, rhs } = &a.kind {
        return implies(lhs, b) || implies(rhs, b);
    }
    match (&a.kind, &b.kind) {
        (ExprKind::Range { lo: alo, hi: ahi }, ExprKind::Range { lo: blo, hi: bhi }) => {
            match (const_eval(alo), const_eval(ahi), const_eval(blo), const_eval(bhi)) {
                (
                    Some(ConstValue::Int(alo)),
                    Some(ConstValue::Int(ahi)),
                    Some(ConstValue::Int(blo)),
                    Some(ConstValue::Int(bhi)),
                ) => alo >= blo && ahi <= bhi,
                _ => false,
            }
        }
        _ => false,
    }
}

fn measure_param(measure: &Expr, func: &FunctionDef) -> Option<Symbol> {
    let param_names: Vec<Symbol> = func.params.iter().map(|p| p.name).collect();
    fn find(expr: &Expr, params: &[Symbol]) -> Option<Symbol> {
        match &expr.kind {
            ExprKind::Ident(name) if params.contains(name) => Some(*name),
            ExprKind::Call { args, .. } => args.iter().find_map(|a| find(a, params)),
            ExprKind::Binary { lhs, rhs, .. } => {
                find(lhs, params).or_else(|| find(rhs, params))
            }
            ExprKind::Unary { operand, .. } => find(operand, params),
            ExprKind::Paren(inner) => find(inner, params),
            ExprKind::Field { recv, .. } => find(recv, params),
            _ => None,
        }
    }
    find(measure, &param_names)
}
