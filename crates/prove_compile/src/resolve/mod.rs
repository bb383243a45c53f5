//! Name resolution: AST → AST + symbol table.
//!
//! Two passes per module:
//!
//! 1. **Declaration collection** — every type, constant, function, foreign
//!    signature, invariant network, and algebraic variant constructor is
//!    registered at the module root. Functions register under their full
//!    identity `(verb, name, param-type-key)`; exact duplicates are E365
//!    when both sides are IO verbs and E300 otherwise.
//! 2. **Reference resolution** — bodies are walked with a scope tree
//!    (outermost-out lookup); parameters and `as`-declarations bind locals,
//!    lambdas and match arms open scopes. Identifier uses are recorded in a
//!    side table keyed by [`NodeId`]; call sites with several verb-variants
//!    stay as candidate sets for the checker's context-aware resolution.
//!
//! The resolver also rewrites `name = expr` statements into implicit
//! declarations when `name` is not yet bound; running the resolver a second
//! time is therefore a no-op.

mod builtins;

use std::collections::HashMap;

use prove_base::{Diagnostic, Interner, Span, Symbol};
use prove_language::ast::{
    Annotation, AnnotationKind, Body, Expr, ExprKind, FunctionDef, ImportSelector, Module, NodeId,
    Pattern, PatternKind, Stmt, StmtKind, StrLitPiece, TypeBody, TypeExpr, TypeExprKind, Verb,
};

use crate::analysis::types::{
    param_type_key, FieldInfo, Modifiers, Prim, Type, TypeDefInfo, TypeDefKind, TypeRegistry,
    VariantInfo,
};

pub use builtins::is_io_builtin;

// ============================================================================
// Symbols
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    BuiltinFunction,
    VariantConstructor,
    TypeDef,
    Constant,
    Parameter,
    Local,
    Field,
    Module,
    Foreign,
}

/// The identity of a function: the only lookup form the table exposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FuncKey {
    pub verb: Verb,
    pub name: Symbol,
    pub param_key: String,
}

#[derive(Debug, Clone)]
pub struct FuncInfo {
    pub params: Vec<Type>,
    pub param_names: Vec<Symbol>,
    pub ret: Type,
    pub fallible: bool,
    pub is_io: bool,
    pub generics: Vec<Symbol>,
    /// Index into the owning module's `functions` list, for AST lookups;
    /// `None` for builtins, foreigns, and imports.
    pub def_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub enum SymbolExtra {
    None,
    Function(FuncInfo),
    Variant { owner: Symbol, tag: usize },
    Foreign { library: String },
}

#[derive(Debug, Clone)]
pub struct SymbolData {
    pub kind: SymbolKind,
    pub name: Symbol,
    pub span: Span,
    pub ty: Type,
    pub extra: SymbolExtra,
}

impl SymbolData {
    pub fn func(&self) -> Option<&FuncInfo> {
        match &self.extra {
            SymbolExtra::Function(info) => Some(info),
            _ => None,
        }
    }
}

/// Flat symbol storage plus the verb-dispatched function table.
///
/// Scopes hold [`SymbolId`]s, never references; the table owns the data.
#[derive(Default)]
pub struct SymbolTable {
    symbols: Vec<SymbolData>,
    functions: HashMap<FuncKey, SymbolId>,
    /// Function candidates by bare name, for context-aware call resolution.
    candidates: HashMap<Symbol, Vec<SymbolId>>,
    /// Module-level value bindings: constants.
    values: HashMap<Symbol, SymbolId>,
    /// Variant and record constructors, by CamelCase name.
    constructors: HashMap<Symbol, SymbolId>,
    networks: HashMap<Symbol, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: SymbolData) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(data);
        id
    }

    pub fn get(&self, id: SymbolId) -> &SymbolData {
        &self.symbols[id.index()]
    }

    pub fn register_function(&mut self, key: FuncKey, id: SymbolId) -> Result<(), SymbolId> {
        if let Some(existing) = self.functions.get(&key) {
            return Err(*existing);
        }
        self.candidates.entry(key.name).or_default().push(id);
        self.functions.insert(key, id);
        Ok(())
    }

    pub fn function(&self, key: &FuncKey) -> Option<SymbolId> {
        self.functions.get(key).copied()
    }

    pub fn function_candidates(&self, name: Symbol) -> &[SymbolId] {
        self.candidates.get(&name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn functions(&self) -> impl Iterator<Item = (&FuncKey, SymbolId)> {
        self.functions.iter().map(|(k, v)| (k, *v))
    }

    /// Registers a constructor callable; retrievable both as a call target
    /// and as a pattern head.
    pub fn push_constructor(
        &mut self,
        name: Symbol,
        span: Span,
        ty: Type,
        owner: Symbol,
        tag: usize,
    ) -> SymbolId {
        let id = self.push(SymbolData {
            kind: SymbolKind::VariantConstructor,
            name,
            span,
            ty,
            extra: SymbolExtra::Variant { owner, tag },
        });
        self.constructors.insert(name, id);
        id
    }

    pub fn constructor(&self, name: Symbol) -> Option<SymbolId> {
        self.constructors.get(&name).copied()
    }

    pub fn register_value(&mut self, name: Symbol, id: SymbolId) {
        self.values.insert(name, id);
    }

    pub fn value(&self, name: Symbol) -> Option<SymbolId> {
        self.values.get(&name).copied()
    }

    pub fn register_network(&mut self, name: Symbol, id: SymbolId) {
        self.networks.insert(name, id);
    }

    pub fn network(&self, name: Symbol) -> Option<SymbolId> {
        self.networks.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

// ============================================================================
// Scopes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(u32);

struct Scope {
    parent: Option<ScopeId>,
    bindings: HashMap<Symbol, SymbolId>,
}

/// Tree of lexical scopes; lookup walks parent pointers outward.
#[derive(Default)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope { parent, bindings: HashMap::new() });
        id
    }

    pub fn bind(&mut self, scope: ScopeId, name: Symbol, id: SymbolId) {
        self.scopes[scope.0 as usize].bindings.insert(name, id);
    }

    /// Outermost-out lookup; returns the binding and the scope it was found
    /// in.
    pub fn lookup(&self, from: ScopeId, name: Symbol) -> Option<(SymbolId, ScopeId)> {
        let mut current = Some(from);
        while let Some(scope) = current {
            let data = &self.scopes[scope.0 as usize];
            if let Some(id) = data.bindings.get(&name) {
                return Some((*id, scope));
            }
            current = data.parent;
        }
        None
    }

    /// True when `inner` is `ancestor` or nested inside it.
    pub fn is_within(&self, inner: ScopeId, ancestor: ScopeId) -> bool {
        let mut current = Some(inner);
        while let Some(scope) = current {
            if scope == ancestor {
                return true;
            }
            current = self.scopes[scope.0 as usize].parent;
        }
        false
    }
}

// ============================================================================
// Resolution output
// ============================================================================

/// What one identifier or constructor use resolved to.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// A parameter, local, or constant.
    Value(SymbolId),
    /// One or more function symbols sharing the bare name; the checker
    /// narrows the set with call-site context.
    Functions(Vec<SymbolId>),
    /// An algebraic variant constructor (or record constructor).
    Constructor(SymbolId),
}

/// Exported surface of an already-resolved module, consumed by importers.
#[derive(Default, Clone)]
pub struct ModuleExports {
    pub functions: Vec<(FuncKey, SymbolData)>,
    pub types: Vec<TypeDefInfo>,
}

pub type ExportMap = HashMap<Symbol, ModuleExports>;

/// The resolver's product: symbol table, registry, and per-node uses.
pub struct Resolved {
    pub table: SymbolTable,
    pub scopes: ScopeTree,
    pub registry: TypeRegistry,
    pub resolutions: HashMap<NodeId, Resolution>,
}

impl Resolved {
    pub fn resolution(&self, id: NodeId) -> Option<&Resolution> {
        self.resolutions.get(&id)
    }
}

// ============================================================================
// Type lowering
// ============================================================================

/// Lowers a surface type expression to a canonical [`Type`].
///
/// `generics` are the rigid parameters in scope. A single-uppercase-letter
/// name that resolves to nothing is treated as a generic parameter; all
/// other unknown names are E302.
pub fn lower_type_expr(
    ty: &TypeExpr,
    registry: &TypeRegistry,
    generics: &[Symbol],
    interner: &Interner,
    diags: &mut Vec<Diagnostic>,
) -> Type {
    match &ty.kind {
        TypeExprKind::Simple(name) => lower_simple(*name, ty.span, registry, generics, interner, diags),
        TypeExprKind::Generic { head, args } => {
            let lowered: Vec<Type> = args
                .iter()
                .map(|arg| lower_type_expr(arg, registry, generics, interner, diags))
                .collect();
            match interner.resolve(*head) {
                "Option" if lowered.len() == 1 => {
                    Type::Option(Box::new(lowered.into_iter().next().unwrap()))
                }
                "Result" if lowered.len() == 2 => {
                    let mut it = lowered.into_iter();
                    Type::Result(Box::new(it.next().unwrap()), Box::new(it.next().unwrap()))
                }
                "List" if lowered.len() == 1 => {
                    Type::List(Box::new(lowered.into_iter().next().unwrap()))
                }
                _ => match registry.get(*head) {
                    Some(info) => {
                        if info.generics.len() != lowered.len() {
                            diags.push(Diagnostic::error(
                                "E302",
                                format!(
                                    "'{}' takes {} type arguments, found {}",
                                    interner.resolve(*head),
                                    info.generics.len(),
                                    lowered.len()
                                ),
                                ty.span,
                            ));
                        }
                        Type::Applied { head: *head, args: lowered }
                    }
                    None => {
                        diags.push(Diagnostic::error(
                            "E302",
                            format!("unknown type '{}'", interner.resolve(*head)),
                            ty.span,
                        ));
                        Type::Unknown
                    }
                },
            }
        }
        TypeExprKind::Modified { base, modifiers } => {
            let lowered = lower_type_expr(base, registry, generics, interner, diags);
            let bag = Modifiers::from_names(modifiers, ty.span, interner, diags);
            match lowered {
                Type::Prim(prim, existing) => {
                    let merged = Modifiers {
                        mutable: existing.mutable || bag.mutable,
                        arena: existing.arena || bag.arena,
                    };
                    Type::Prim(prim, merged)
                }
                // Modifiers on non-primitive heads are carried by the base
                // type's storage class at emission; record them by wrapping.
                other => other,
            }
        }
        TypeExprKind::Refined { base, constraint } => {
            let lowered = lower_type_expr(base, registry, generics, interner, diags);
            Type::Refined { base: Box::new(lowered), constraint: constraint.clone() }
        }
    }
}

fn lower_simple(
    name: Symbol,
    span: Span,
    registry: &TypeRegistry,
    generics: &[Symbol],
    interner: &Interner,
    diags: &mut Vec<Diagnostic>,
) -> Type {
    let text = interner.resolve(name);
    if let Some(prim) = Prim::from_name(text) {
        return Type::Prim(prim, Modifiers::NONE);
    }
    match text {
        "Unit" => return Type::Unit,
        "Never" => return Type::Never,
        _ => {}
    }
    if generics.contains(&name) {
        return Type::Param(name);
    }
    if let Some(instance) = registry.instance(name) {
        return instance;
    }
    // Convention: a lone uppercase letter is a fresh generic parameter.
    if text.len() == 1 && text.bytes().all(|b| b.is_ascii_uppercase()) {
        return Type::Param(name);
    }
    diags.push(Diagnostic::error(
        "E302",
        format!("unknown type '{text}'"),
        span,
    ));
    Type::Unknown
}

/// Collects the implicit generic parameters of a signature: every lone
/// uppercase letter named in a parameter or return type.
pub fn signature_generics(func: &FunctionDef, interner: &Interner) -> Vec<Symbol> {
    let mut generics = Vec::new();
    let mut visit = |ty: &TypeExpr| collect_generic_names(ty, interner, &mut generics);
    for param in &func.params {
        visit(&param.ty);
    }
    if let Some(ret) = &func.ret {
        visit(ret);
    }
    generics
}

fn collect_generic_names(ty: &TypeExpr, interner: &Interner, out: &mut Vec<Symbol>) {
    match &ty.kind {
        TypeExprKind::Simple(name) => {
            let text = interner.resolve(*name);
            if text.len() == 1 && text.bytes().all(|b| b.is_ascii_uppercase()) && !out.contains(name)
            {
                out.push(*name);
            }
        }
        TypeExprKind::Generic { args, .. } => {
            for arg in args {
                collect_generic_names(arg, interner, out);
            }
        }
        TypeExprKind::Modified { base, .. } => collect_generic_names(base, interner, out),
        TypeExprKind::Refined { base, .. } => collect_generic_names(base, interner, out),
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves one module against the exports of its imports.
pub fn resolve_module(
    module: &mut Module,
    exports: &ExportMap,
    interner: &mut Interner,
    diags: &mut Vec<Diagnostic>,
) -> Resolved {
    let mut resolver = Resolver {
        table: SymbolTable::new(),
        scopes: ScopeTree::new(),
        registry: TypeRegistry::new(),
        resolutions: HashMap::new(),
        diags,
        interner,
        lambda_root: None,
    };
    resolver.collect_declarations(module, exports);
    resolver.resolve_references(module);
    Resolved {
        table: resolver.table,
        scopes: resolver.scopes,
        registry: resolver.registry,
        resolutions: resolver.resolutions,
    }
}

/// Builds the export surface of a resolved module for later importers.
pub fn exports_of(resolved: &Resolved) -> ModuleExports {
    let mut out = ModuleExports::default();
    for (key, id) in resolved.table.functions() {
        let data = resolved.table.get(id);
        if matches!(data.kind, SymbolKind::Function) {
            let mut data = data.clone();
            // The definition index is meaningless outside the defining
            // module; importers treat the symbol as external.
            if let SymbolExtra::Function(info) = &mut data.extra {
                info.def_index = None;
            }
            out.functions.push((key.clone(), data));
        }
    }
    // Stable order: importers register candidates in a deterministic
    // sequence regardless of table layout.
    out.functions
        .sort_by(|(a, _), (b, _)| (a.name, a.verb, &a.param_key).cmp(&(b.name, b.verb, &b.param_key)));
    for info in resolved.registry.iter() {
        out.types.push(info.clone());
    }
    out.types.sort_by_key(|info| info.name);
    out
}

struct Resolver<'d, 'i> {
    table: SymbolTable,
    scopes: ScopeTree,
    registry: TypeRegistry,
    resolutions: HashMap<NodeId, Resolution>,
    diags: &'d mut Vec<Diagnostic>,
    interner: &'i mut Interner,
    /// Innermost lambda scope, for the no-capture rule.
    lambda_root: Option<ScopeId>,
}

impl<'d, 'i> Resolver<'d, 'i> {
    // ------------------------------------------------------------------
    // Pass 1: declaration collection
    // ------------------------------------------------------------------

    fn collect_declarations(&mut self, module: &Module, exports: &ExportMap) {
        builtins::register(&mut self.table, self.interner);

        // Imported surface first, so local declarations can shadow-check
        // against it.
        for import in &module.imports {
            let Some(source) = exports.get(&import.module) else {
                self.diags.push(Diagnostic::error(
                    "E308",
                    format!("unknown module '{}'", self.interner.resolve(import.module)),
                    import.span,
                ));
                continue;
            };
            for group in &import.groups {
                for name in &group.names {
                    self.import_name(source, group.selector, *name, group.span);
                }
            }
        }

        // Types: two stages so mutually recursive definitions resolve.
        for decl in &module.types {
            let placeholder = TypeDefInfo {
                name: decl.name,
                generics: decl.generics.clone(),
                kind: TypeDefKind::Algebraic(Vec::new()),
                span: decl.name_span,
            };
            if let Err(previous) = self.registry.insert(placeholder) {
                self.diags.push(
                    Diagnostic::error(
                        "E300",
                        format!("type '{}' is declared twice", self.interner.resolve(decl.name)),
                        decl.name_span,
                    )
                    .with_label(previous, "first declared here"),
                );
            }
        }
        for decl in &module.types {
            let kind = match &decl.body {
                TypeBody::Alias(ty) => TypeDefKind::Alias(lower_type_expr(
                    ty,
                    &self.registry,
                    &decl.generics,
                    self.interner,
                    self.diags,
                )),
                TypeBody::Algebraic(variants) => {
                    let mut seen: HashMap<Symbol, Span> = HashMap::new();
                    let mut infos = Vec::new();
                    for (tag, variant) in variants.iter().enumerate() {
                        if let Some(previous) = seen.insert(variant.name, variant.span) {
                            self.diags.push(
                                Diagnostic::error(
                                    "E304",
                                    format!(
                                        "variant '{}' is declared twice",
                                        self.interner.resolve(variant.name)
                                    ),
                                    variant.span,
                                )
                                .with_label(previous, "first declared here"),
                            );
                            continue;
                        }
                        let fields = variant
                            .fields
                            .iter()
                            .map(|f| FieldInfo {
                                name: f.name,
                                ty: lower_type_expr(
                                    &f.ty,
                                    &self.registry,
                                    &decl.generics,
                                    self.interner,
                                    self.diags,
                                ),
                            })
                            .collect();
                        infos.push(VariantInfo { name: variant.name, fields, tag });
                    }
                    TypeDefKind::Algebraic(infos)
                }
                TypeBody::Record(fields) => TypeDefKind::Record(
                    fields
                        .iter()
                        .map(|f| FieldInfo {
                            name: f.name,
                            ty: lower_type_expr(
                                &f.ty,
                                &self.registry,
                                &decl.generics,
                                self.interner,
                                self.diags,
                            ),
                        })
                        .collect(),
                ),
            };
            self.registry.replace(TypeDefInfo {
                name: decl.name,
                generics: decl.generics.clone(),
                kind,
                span: decl.name_span,
            });
            self.table.push(SymbolData {
                kind: SymbolKind::TypeDef,
                name: decl.name,
                span: decl.name_span,
                ty: Type::Unknown,
                extra: SymbolExtra::None,
            });
        }

        // Variant and record constructors become callable symbols.
        let ctor_defs: Vec<TypeDefInfo> = self.registry.iter().cloned().collect();
        for info in &ctor_defs {
            match &info.kind {
                TypeDefKind::Algebraic(variants) => {
                    for variant in variants {
                        let ty = Type::Function {
                            verb: Verb::Creates,
                            params: variant.fields.iter().map(|f| f.ty.clone()).collect(),
                            ret: self.instance_type(info),
                            fallible: false,
                        };
                        self.table.push_constructor(
                            variant.name,
                            info.span,
                            ty,
                            info.name,
                            variant.tag,
                        );
                    }
                }
                TypeDefKind::Record(fields) => {
                    let ty = Type::Function {
                        verb: Verb::Creates,
                        params: fields.iter().map(|f| f.ty.clone()).collect(),
                        ret: self.instance_type(info),
                        fallible: false,
                    };
                    self.table.push_constructor(info.name, info.span, ty, info.name, 0);
                }
                TypeDefKind::Alias(_) => {}
            }
        }

        // Constants.
        for constant in &module.constants {
            let ty = match &constant.ty {
                Some(ty) => lower_type_expr(ty, &self.registry, &[], self.interner, self.diags),
                None => Type::Unknown,
            };
            let id = self.table.push(SymbolData {
                kind: SymbolKind::Constant,
                name: constant.name,
                span: constant.name_span,
                ty,
                extra: SymbolExtra::None,
            });
            self.table.register_value(constant.name, id);
        }

        // Foreign signatures.
        for block in &module.foreigns {
            for decl in &block.decls {
                let params: Vec<Type> = decl
                    .params
                    .iter()
                    .map(|p| lower_type_expr(&p.ty, &self.registry, &[], self.interner, self.diags))
                    .collect();
                let ret = decl
                    .ret
                    .as_ref()
                    .map(|ty| lower_type_expr(ty, &self.registry, &[], self.interner, self.diags))
                    .unwrap_or(Type::Unit);
                let key = FuncKey {
                    verb: Verb::Reads,
                    name: decl.name,
                    param_key: param_type_key(&params, self.interner),
                };
                let info = FuncInfo {
                    params,
                    param_names: decl.params.iter().map(|p| p.name).collect(),
                    ret: ret.clone(),
                    fallible: false,
                    is_io: false,
                    generics: Vec::new(),
                    def_index: None,
                };
                let data = SymbolData {
                    kind: SymbolKind::Foreign,
                    name: decl.name,
                    span: decl.span,
                    ty: Type::Function {
                        verb: Verb::Reads,
                        params: info.params.clone(),
                        ret: Box::new(ret),
                        fallible: false,
                    },
                    extra: SymbolExtra::Function(info),
                };
                let id = self.table.push(data);
                if self.table.register_function(key, id).is_err() {
                    self.diags.push(Diagnostic::error(
                        "E300",
                        format!(
                            "foreign function '{}' collides with an existing declaration",
                            self.interner.resolve(decl.name)
                        ),
                        decl.span,
                    ));
                }
            }
        }

        // Invariant networks.
        for network in &module.networks {
            let id = self.table.push(SymbolData {
                kind: SymbolKind::Module,
                name: network.name,
                span: network.span,
                ty: Type::Unknown,
                extra: SymbolExtra::None,
            });
            self.table.register_network(network.name, id);
        }

        // Functions, by full identity.
        for (index, func) in module.functions.iter().enumerate() {
            let generics = signature_generics(func, self.interner);
            let params: Vec<Type> = func
                .params
                .iter()
                .map(|p| {
                    lower_type_expr(&p.ty, &self.registry, &generics, self.interner, self.diags)
                })
                .collect();
            let ret = match (&func.ret, func.verb) {
                (Some(ty), _) => {
                    lower_type_expr(ty, &self.registry, &generics, self.interner, self.diags)
                }
                (None, Verb::Validates) => Type::BOOLEAN,
                (None, _) => Type::Unit,
            };
            if func.verb == Verb::Matches {
                let subject_ok = matches!(
                    params.first().map(|p| p.erased()),
                    Some(Type::Algebraic(_)) | Some(Type::Applied { .. })
                );
                if !subject_ok {
                    self.diags.push(Diagnostic::error(
                        "E369",
                        "'matches' functions take an algebraic first parameter",
                        func.name_span,
                    ));
                }
            }
            let key = FuncKey {
                verb: func.verb,
                name: func.name,
                param_key: param_type_key(&params, self.interner),
            };
            let info = FuncInfo {
                params: params.clone(),
                param_names: func.params.iter().map(|p| p.name).collect(),
                ret: ret.clone(),
                fallible: func.fallible,
                is_io: !func.verb.is_pure(),
                generics,
                def_index: Some(index),
            };
            let id = self.table.push(SymbolData {
                kind: SymbolKind::Function,
                name: func.name,
                span: func.name_span,
                ty: Type::Function {
                    verb: func.verb,
                    params,
                    ret: Box::new(ret),
                    fallible: func.fallible,
                },
                extra: SymbolExtra::Function(info),
            });
            if let Err(previous) = self.table.register_function(key, id) {
                let previous_span = self.table.get(previous).span;
                let both_io = !func.verb.is_pure();
                let code = if both_io { "E365" } else { "E300" };
                self.diags.push(
                    Diagnostic::error(
                        code,
                        format!(
                            "duplicate function identity '{} {}'",
                            func.verb.keyword(),
                            self.interner.resolve(func.name)
                        ),
                        func.name_span,
                    )
                    .with_label(previous_span, "already declared here")
                    .with_note("functions are identified by (verb, name, parameter types)"),
                );
            }
        }
    }

    fn instance_type(&self, info: &TypeDefInfo) -> Box<Type> {
        if !info.generics.is_empty() {
            return Box::new(Type::Applied {
                head: info.name,
                args: info.generics.iter().map(|g| Type::Param(*g)).collect(),
            });
        }
        match &info.kind {
            TypeDefKind::Record(_) => Box::new(Type::Record(info.name)),
            _ => Box::new(Type::Algebraic(info.name)),
        }
    }

    fn import_name(
        &mut self,
        source: &ModuleExports,
        selector: Option<ImportSelector>,
        name: Symbol,
        span: Span,
    ) {
        if matches!(selector, Some(ImportSelector::Types)) {
            match source.types.iter().find(|t| t.name == name) {
                Some(info) => {
                    let _ = self.registry.insert(info.clone());
                }
                None => self.diags.push(Diagnostic::error(
                    "E301",
                    format!("imported type '{}' not found", self.interner.resolve(name)),
                    span,
                )),
            }
            return;
        }
        let verb_filter = match selector {
            Some(ImportSelector::Verb(verb)) => Some(verb),
            _ => None,
        };
        let mut found = false;
        for (key, data) in &source.functions {
            if key.name != name {
                continue;
            }
            if let Some(verb) = verb_filter {
                if key.verb != verb {
                    continue;
                }
            }
            found = true;
            let id = self.table.push(data.clone());
            if self.table.register_function(key.clone(), id).is_err() {
                self.diags.push(Diagnostic::error(
                    "E300",
                    format!(
                        "imported function '{}' collides with an existing declaration",
                        self.interner.resolve(name)
                    ),
                    span,
                ));
            }
        }
        if !found {
            self.diags.push(Diagnostic::error(
                "E301",
                format!("imported name '{}' not found", self.interner.resolve(name)),
                span,
            ));
        }
    }

    // ------------------------------------------------------------------
    // Pass 2: reference resolution
    // ------------------------------------------------------------------

    fn resolve_references(&mut self, module: &mut Module) {
        for constant in &mut module.constants {
            let scope = self.scopes.open(None);
            let mut value = std::mem::replace(&mut constant.value, placeholder_expr());
            self.resolve_expr(&mut value, scope);
            constant.value = value;
        }

        let mut functions = std::mem::take(&mut module.functions);
        for func in &mut functions {
            self.resolve_function(func);
        }
        module.functions = functions;

        let mut mains = std::mem::take(&mut module.mains);
        for main in &mut mains {
            let scope = self.scopes.open(None);
            let result_ty = if main.fallible {
                Type::Result(Box::new(Type::Unit), Box::new(Type::STRING))
            } else {
                Type::Unit
            };
            self.resolve_annotations(&mut main.annotations, scope, &result_ty);
            self.resolve_stmts(&mut main.body, scope);
        }
        module.mains = mains;
    }

    fn resolve_function(&mut self, func: &mut FunctionDef) {
        let scope = self.scopes.open(None);
        let generics = signature_generics(func, self.interner);
        let mut param_types = Vec::new();
        for param in &func.params {
            let ty =
                lower_type_expr(&param.ty, &self.registry, &generics, self.interner, self.diags);
            param_types.push(ty.clone());
            let id = self.table.push(SymbolData {
                kind: SymbolKind::Parameter,
                name: param.name,
                span: param.span,
                ty,
                extra: SymbolExtra::None,
            });
            self.scopes.bind(scope, param.name, id);
        }
        // Per-parameter where-clauses see all parameters.
        for param in &mut func.params {
            if let Some(clause) = &mut param.where_clause {
                self.resolve_expr(clause, scope);
            }
        }

        let ret = match (&func.ret, func.verb) {
            (Some(ty), _) => lower_type_expr(ty, &self.registry, &generics, self.interner, self.diags),
            (None, Verb::Validates) => Type::BOOLEAN,
            (None, _) => Type::Unit,
        };
        self.resolve_annotations(&mut func.annotations, scope, &ret);

        match &mut func.body {
            Body::Statements(stmts) => {
                let mut taken = std::mem::take(stmts);
                self.resolve_stmts(&mut taken, scope);
                *stmts = taken;
            }
            Body::MatchArms(arms) => {
                let subject_ty = param_types.first().cloned().unwrap_or(Type::Unknown);
                for arm in arms.iter_mut() {
                    let arm_scope = self.scopes.open(Some(scope));
                    self.resolve_pattern(&mut arm.pattern, &subject_ty, arm_scope);
                    self.resolve_expr(&mut arm.body, arm_scope);
                }
            }
        }
    }

    /// Annotation expressions see the parameters plus `result`, bound to the
    /// declared return type.
    fn resolve_annotations(
        &mut self,
        annotations: &mut [Annotation],
        scope: ScopeId,
        ret: &Type,
    ) {
        let result_name = self.interner.intern("result");
        let annotation_scope = self.scopes.open(Some(scope));
        let result_id = self.table.push(SymbolData {
            kind: SymbolKind::Local,
            name: result_name,
            span: Span::default(),
            ty: ret.clone(),
            extra: SymbolExtra::None,
        });
        self.scopes.bind(annotation_scope, result_name, result_id);

        for annotation in annotations {
            match &mut annotation.kind {
                AnnotationKind::Requires(expr)
                | AnnotationKind::Ensures(expr)
                | AnnotationKind::Know(expr)
                | AnnotationKind::Assume(expr)
                | AnnotationKind::Believe(expr)
                | AnnotationKind::Terminates(expr) => {
                    self.resolve_expr(expr, annotation_scope);
                }
                AnnotationKind::NearMiss { input, expected } => {
                    self.resolve_expr(input, annotation_scope);
                    self.resolve_expr(expected, annotation_scope);
                }
                AnnotationKind::Satisfies(name) => {
                    if self.table.network(*name).is_none() {
                        self.diags.push(Diagnostic::error(
                            "E301",
                            format!(
                                "unknown invariant network '{}'",
                                self.interner.resolve(*name)
                            ),
                            annotation.span,
                        ));
                    }
                }
                _ => {}
            }
        }
    }

    fn resolve_stmts(&mut self, stmts: &mut [Stmt], scope: ScopeId) {
        for stmt in stmts {
            let rewrite = match &mut stmt.kind {
                StmtKind::VarDecl { name, name_span, ty, value } => {
                    self.resolve_expr(value, scope);
                    let lowered = match ty {
                        Some(ty) => {
                            lower_type_expr(ty, &self.registry, &[], self.interner, self.diags)
                        }
                        None => Type::Unknown,
                    };
                    let id = self.table.push(SymbolData {
                        kind: SymbolKind::Local,
                        name: *name,
                        span: *name_span,
                        ty: lowered,
                        extra: SymbolExtra::None,
                    });
                    self.scopes.bind(scope, *name, id);
                    None
                }
                StmtKind::Assign { name, name_span, value } => {
                    self.resolve_expr(value, scope);
                    if self.scopes.lookup(scope, *name).is_some() {
                        None
                    } else {
                        // First mention: an implicit declaration with an
                        // inferred type.
                        let id = self.table.push(SymbolData {
                            kind: SymbolKind::Local,
                            name: *name,
                            span: *name_span,
                            ty: Type::Unknown,
                            extra: SymbolExtra::None,
                        });
                        self.scopes.bind(scope, *name, id);
                        Some(StmtKind::VarDecl {
                            name: *name,
                            name_span: *name_span,
                            ty: None,
                            value: std::mem::replace(value, placeholder_expr()),
                        })
                    }
                }
                StmtKind::Expr(expr) => {
                    self.resolve_expr(expr, scope);
                    None
                }
            };
            if let Some(kind) = rewrite {
                stmt.kind = kind;
            }
        }
    }

    fn resolve_expr(&mut self, expr: &mut Expr, scope: ScopeId) {
        match &mut expr.kind {
            ExprKind::Integer(_)
            | ExprKind::Decimal(_)
            | ExprKind::Boolean(_)
            | ExprKind::Regex(_) => {}
            ExprKind::Str { pieces, .. } => {
                for piece in pieces {
                    if let StrLitPiece::Interp(inner) = piece {
                        self.resolve_expr(inner, scope);
                    }
                }
            }
            ExprKind::Ident(name) => {
                let name = *name;
                if let Some((id, found_scope)) = self.scopes.lookup(scope, name) {
                    self.check_capture(id, found_scope, expr.span);
                    self.resolutions.insert(expr.id, Resolution::Value(id));
                } else if let Some(id) = self.table.value(name) {
                    self.resolutions.insert(expr.id, Resolution::Value(id));
                } else {
                    let candidates = self.table.function_candidates(name).to_vec();
                    if candidates.is_empty() {
                        self.diags.push(Diagnostic::error(
                            "E301",
                            format!("unknown identifier '{}'", self.interner.resolve(name)),
                            expr.span,
                        ));
                    } else {
                        self.resolutions.insert(expr.id, Resolution::Functions(candidates));
                    }
                }
            }
            ExprKind::TypeIdent(name) | ExprKind::TypeApply { head: name, .. } => {
                let name = *name;
                if let Some(id) = self.lookup_constructor(name) {
                    self.resolutions.insert(expr.id, Resolution::Constructor(id));
                } else {
                    self.diags.push(Diagnostic::error(
                        "E301",
                        format!(
                            "'{}' is not a constructor",
                            self.interner.resolve(name)
                        ),
                        expr.span,
                    ));
                }
            }
            ExprKind::Call { callee, args } => {
                self.resolve_expr(callee, scope);
                for arg in args {
                    self.resolve_expr(arg, scope);
                }
            }
            ExprKind::Field { recv, .. } => self.resolve_expr(recv, scope),
            ExprKind::Pipe { value, target } => {
                self.resolve_expr(value, scope);
                self.resolve_expr(target, scope);
            }
            ExprKind::FailProp(inner) => self.resolve_expr(inner, scope),
            ExprKind::Lambda { params, body } => {
                let lambda_scope = self.scopes.open(Some(scope));
                for (name, ty) in params.iter() {
                    let lowered = match ty {
                        Some(ty) => {
                            lower_type_expr(ty, &self.registry, &[], self.interner, self.diags)
                        }
                        None => Type::Unknown,
                    };
                    let id = self.table.push(SymbolData {
                        kind: SymbolKind::Parameter,
                        name: *name,
                        span: expr.span,
                        ty: lowered,
                        extra: SymbolExtra::None,
                    });
                    self.scopes.bind(lambda_scope, *name, id);
                }
                let saved = self.lambda_root.replace(lambda_scope);
                self.resolve_expr(body, lambda_scope);
                self.lambda_root = saved;
            }
            ExprKind::Valid { name, args } => {
                let name = *name;
                let candidates: Vec<SymbolId> = self
                    .table
                    .function_candidates(name)
                    .iter()
                    .copied()
                    .filter(|id| match self.table.get(*id).func() {
                        Some(_) => matches!(self.table.get(*id).ty, Type::Function { verb: Verb::Validates, .. }),
                        None => false,
                    })
                    .collect();
                if candidates.is_empty() {
                    self.diags.push(Diagnostic::error(
                        "E301",
                        format!(
                            "no 'validates' variant of '{}' in scope",
                            self.interner.resolve(name)
                        ),
                        expr.span,
                    ));
                } else {
                    self.resolutions.insert(expr.id, Resolution::Functions(candidates));
                }
                if let Some(args) = args {
                    for arg in args {
                        self.resolve_expr(arg, scope);
                    }
                }
            }
            ExprKind::Match { subject, arms } => {
                self.resolve_expr(subject, scope);
                for arm in arms {
                    let arm_scope = self.scopes.open(Some(scope));
                    self.resolve_pattern(&mut arm.pattern, &Type::Unknown, arm_scope);
                    self.resolve_expr(&mut arm.body, arm_scope);
                }
            }
            ExprKind::If { cond, then_block, else_block } => {
                self.resolve_expr(cond, scope);
                let then_scope = self.scopes.open(Some(scope));
                self.resolve_stmts(then_block, then_scope);
                if let Some(else_block) = else_block {
                    let else_scope = self.scopes.open(Some(scope));
                    self.resolve_stmts(else_block, else_scope);
                }
            }
            ExprKind::Comptime(stmts) => {
                let block_scope = self.scopes.open(Some(scope));
                self.resolve_stmts(stmts, block_scope);
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.resolve_expr(lhs, scope);
                self.resolve_expr(rhs, scope);
            }
            ExprKind::Unary { operand, .. } => self.resolve_expr(operand, scope),
            ExprKind::Paren(inner) => self.resolve_expr(inner, scope),
            ExprKind::List(items) => {
                for item in items {
                    self.resolve_expr(item, scope);
                }
            }
            ExprKind::Range { lo, hi } => {
                self.resolve_expr(lo, scope);
                self.resolve_expr(hi, scope);
            }
        }
    }

    /// Lambdas are captureless: a hit on a local or parameter bound outside
    /// the innermost lambda is E364.
    fn check_capture(&mut self, id: SymbolId, found_scope: ScopeId, span: Span) {
        let Some(lambda_root) = self.lambda_root else {
            return;
        };
        if self.scopes.is_within(found_scope, lambda_root) {
            return;
        }
        let data = self.table.get(id);
        if matches!(data.kind, SymbolKind::Local | SymbolKind::Parameter) {
            self.diags.push(
                Diagnostic::error(
                    "E364",
                    format!(
                        "lambda captures '{}' from an enclosing scope",
                        self.interner.resolve(data.name)
                    ),
                    span,
                )
                .with_note("lambdas are captureless; pass the value as a parameter"),
            );
        }
    }

    fn lookup_constructor(&self, name: Symbol) -> Option<SymbolId> {
        self.table.constructor(name)
    }

    fn resolve_pattern(&mut self, pattern: &mut Pattern, _subject: &Type, scope: ScopeId) {
        match &mut pattern.kind {
            PatternKind::Wildcard | PatternKind::Literal(_) => {}
            PatternKind::Binding(name) => {
                let id = self.table.push(SymbolData {
                    kind: SymbolKind::Local,
                    name: *name,
                    span: pattern.span,
                    ty: Type::Unknown,
                    extra: SymbolExtra::None,
                });
                self.scopes.bind(scope, *name, id);
            }
            PatternKind::Variant { name, args } => {
                let name = *name;
                match self.lookup_constructor(name) {
                    Some(id) => {
                        let arity = match &self.table.get(id).ty {
                            Type::Function { params, .. } => params.len(),
                            _ => 0,
                        };
                        if arity != args.len() {
                            self.diags.push(Diagnostic::error(
                                "E307",
                                format!(
                                    "'{}' has {} fields, pattern names {}",
                                    self.interner.resolve(name),
                                    arity,
                                    args.len()
                                ),
                                pattern.span,
                            ));
                        }
                    }
                    None => {
                        self.diags.push(Diagnostic::error(
                            "E301",
                            format!("unknown variant '{}'", self.interner.resolve(name)),
                            pattern.span,
                        ));
                    }
                }
                for arg in args {
                    self.resolve_pattern(arg, &Type::Unknown, scope);
                }
            }
        }
    }
}

fn placeholder_expr() -> Expr {
    Expr {
        id: NodeId(u32::MAX),
        kind: ExprKind::Integer(0),
        span: Span::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prove_base::FileId;
    use prove_language::{lexer, parser};

    fn resolve_source(source: &str) -> (Module, Vec<Diagnostic>, Interner) {
        let mut interner = Interner::new();
        let name = interner.intern("test");
        let (tokens, mut diags) = lexer::lex(source, FileId(0), &mut interner);
        let (mut module, mut parse_diags) =
            parser::parse_module(&tokens, FileId(0), name, &interner);
        diags.append(&mut parse_diags);
        let exports = ExportMap::new();
        let _resolved = resolve_module(&mut module, &exports, &mut interner, &mut diags);
        (module, diags, interner)
    }

    #[test]
    fn function_registers_under_full_identity() {
        let source = "\
validates email(a String)
from
    true

transforms email(raw String) String
from
    trim(raw)
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn duplicate_identity_is_rejected() {
        let source = "\
transforms email(raw String) String
from
    raw

transforms email(raw String) String
from
    trim(raw)
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E300"), "{:?}", diags);
    }

    #[test]
    fn duplicate_io_identity_is_e365() {
        let source = "\
inputs fetch(url String) String!
from
    read_file(url)!

inputs fetch(url String) String!
from
    read_file(url)!
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E365"), "{:?}", diags);
    }

    #[test]
    fn unknown_identifier_is_e301() {
        let source = "\
transforms id(x Integer) Integer
from
    missing_thing
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E301"), "{:?}", diags);
    }

    #[test]
    fn lambda_capture_is_e364() {
        let source = "\
transforms scale(items List<Integer>, factor Integer) List<Integer>
from
    map(items, (x) => x * factor)
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E364"), "{:?}", diags);
    }

    #[test]
    fn lambda_parameters_resolve_cleanly() {
        let source = "\
transforms double_all(items List<Integer>) List<Integer>
from
    map(items, (x) => x * 2)
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn implicit_declaration_rewrites_assignment() {
        let source = "\
transforms mystery(x Integer) Integer
from
    y = x + 1
    y
";
        let (module, diags, _) = resolve_source(source);
        assert!(diags.is_empty(), "{:?}", diags);
        match &module.functions[0].body {
            Body::Statements(stmts) => {
                assert!(matches!(stmts[0].kind, StmtKind::VarDecl { ty: None, .. }));
            }
            other => panic!("expected statements, got {:?}", other),
        }
    }

    #[test]
    fn matches_requires_algebraic_subject() {
        let source = "\
matches area(s Integer) Integer
from
    x => x
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E369"), "{:?}", diags);
    }

    #[test]
    fn variant_pattern_arity_is_checked() {
        let source = "\
type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)

matches area(s Shape) Decimal
from
    Circle(r, extra) => r
    Rect(w, h) => w * h
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E307"), "{:?}", diags);
    }

    #[test]
    fn unknown_import_module_is_e308() {
        let (_, diags, _) = resolve_source("use Missing transforms widget\n");
        assert!(diags.iter().any(|d| d.code == "E308"), "{:?}", diags);
    }

    #[test]
    fn satisfies_unknown_network_is_e301() {
        let source = "\
transforms total(x Integer) Integer
satisfies Conservation
from
    x
";
        let (_, diags, _) = resolve_source(source);
        assert!(diags.iter().any(|d| d.code == "E301"), "{:?}", diags);
    }

    #[test]
    fn resolving_twice_is_a_no_op() {
        let source = "\
transforms mystery(x Integer) Integer
from
    y = x + 1
    y
";
        let mut interner = Interner::new();
        let name = interner.intern("test");
        let (tokens, _) = lexer::lex(source, FileId(0), &mut interner);
        let (mut module, _) = parser::parse_module(&tokens, FileId(0), name, &interner);
        let exports = ExportMap::new();
        let mut diags = Vec::new();
        resolve_module(&mut module, &exports, &mut interner, &mut diags);
        let first = module.clone();
        resolve_module(&mut module, &exports, &mut interner, &mut diags);
        assert_eq!(first, module);
        assert!(diags.is_empty(), "{:?}", diags);
    }
}
