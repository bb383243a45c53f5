//! Recursive-descent parser for Prove declarations.
//!
//! Declarations are parsed by hand-rolled descent; expressions use the Pratt
//! parser in [`expr`]. The parser is tolerant: every error appends a
//! diagnostic and recovery skips to the next plausible point, so one broken
//! declaration does not hide the rest of the module.
//!
//! # Layout
//!
//! The lexer has already made indentation explicit, so the grammar here only
//! deals in `Newline` / `Indent` / `Dedent` tokens. Function annotations may
//! sit flush with the signature or one level deeper; both layouts are
//! accepted and the body block is relative to the `from` line either way.

mod expr;
mod types;

use prove_base::{Diagnostic, FileId, Interner, Span, Symbol};

use crate::ast::decl::{
    Annotation, AnnotationKind, CnlRow, ConstantDecl, FieldDecl, ForeignBlock, ForeignDecl,
    FunctionDef, Import, ImportGroup, ImportSelector, InvariantNetwork, MainDef, Module, Param,
    ProofRow, TypeBody, TypeDecl, VariantDecl, Verb,
};
use crate::ast::expr::{Body, Expr, ExprKind};
use crate::ast::NodeId;
use crate::lexer::{camel_case, snake_case};
use crate::token::{StrPiece, Token, TokenKind};

pub(crate) use expr::describe;

/// Parses one module. `default_name` names the module when no `module`
/// declaration is present (typically the file stem).
pub fn parse_module(
    tokens: &[Token],
    file: FileId,
    default_name: Symbol,
    interner: &Interner,
) -> (Module, Vec<Diagnostic>) {
    let mut parser = Parser {
        tokens,
        pos: 0,
        file,
        interner,
        diags: Vec::new(),
        next_node: 0,
    };
    let module = parser.parse_module_body(default_name);
    (module, parser.diags)
}

pub(crate) struct Parser<'t, 'i> {
    tokens: &'t [Token],
    pos: usize,
    file: FileId,
    interner: &'i Interner,
    diags: Vec<Diagnostic>,
    next_node: u32,
}

impl<'t, 'i> Parser<'t, 'i> {
    // ------------------------------------------------------------------
    // Cursor
    // ------------------------------------------------------------------

    fn clamp(&self, pos: usize) -> usize {
        pos.min(self.tokens.len().saturating_sub(1))
    }

    pub(crate) fn peek(&self) -> &TokenKind {
        &self.tokens[self.clamp(self.pos)].kind
    }

    pub(crate) fn peek2(&self) -> &TokenKind {
        &self.tokens[self.clamp(self.pos + 1)].kind
    }

    pub(crate) fn peek_span(&self) -> Span {
        self.tokens[self.clamp(self.pos)].span
    }

    pub(crate) fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.clamp(self.pos)];
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    /// Advances unless at `Eof`; recovery paths use this so they can never
    /// spin on the sentinel.
    pub(crate) fn advance_guarded(&mut self) {
        if !matches!(self.peek(), TokenKind::Eof) {
            self.pos += 1;
        }
    }

    pub(crate) fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek() == &kind {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> bool {
        if self.eat(kind) {
            true
        } else {
            let found = describe(self.peek());
            self.error_here("E200", format!("expected {what}, found {found}"));
            false
        }
    }

    pub(crate) fn eat_ident(&mut self) -> Option<(Symbol, Span)> {
        if let TokenKind::Ident(name) = self.peek() {
            let name = *name;
            let span = self.peek_span();
            self.advance();
            Some((name, span))
        } else {
            None
        }
    }

    pub(crate) fn eat_type_ident(&mut self) -> Option<(Symbol, Span)> {
        if let TokenKind::TypeIdent(name) = self.peek() {
            let name = *name;
            let span = self.peek_span();
            self.advance();
            Some((name, span))
        } else {
            None
        }
    }

    pub(crate) fn eat_indent(&mut self) -> bool {
        if matches!(self.peek(), TokenKind::Indent(_)) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_dedent(&mut self) -> bool {
        if matches!(self.peek(), TokenKind::Dedent(_)) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.advance();
        }
    }

    pub(crate) fn sync_to_newline(&mut self) {
        loop {
            match self.peek() {
                TokenKind::Eof | TokenKind::Dedent(_) => break,
                TokenKind::Newline => {
                    self.advance();
                    break;
                }
                _ => self.advance_guarded(),
            }
        }
    }

    /// Skips to the next top-level line, stepping over any indented block.
    fn sync_top_level(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Indent(_) => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::Dedent(_) => {
                    depth = depth.saturating_sub(1);
                    self.advance();
                }
                TokenKind::Newline => {
                    self.advance();
                    if depth == 0 {
                        break;
                    }
                }
                _ => self.advance_guarded(),
            }
        }
    }

    pub(crate) fn error_here(&mut self, code: &'static str, message: impl Into<String>) {
        let span = self.peek_span();
        self.diags.push(Diagnostic::error(code, message, span));
    }

    pub(crate) fn diag_count(&self) -> usize {
        self.diags.len()
    }

    pub(crate) fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub(crate) fn mk(&mut self, kind: ExprKind, span: Span) -> Expr {
        Expr { id: self.next_id(), kind, span }
    }

    pub(crate) fn is_underscore(&self, name: Symbol) -> bool {
        self.interner.resolve(name) == "_"
    }

    // ------------------------------------------------------------------
    // Module
    // ------------------------------------------------------------------

    fn parse_module_body(&mut self, default_name: Symbol) -> Module {
        let start = self.peek_span();
        let mut module = Module {
            name: default_name,
            doc: None,
            narrative: None,
            imports: Vec::new(),
            types: Vec::new(),
            constants: Vec::new(),
            functions: Vec::new(),
            mains: Vec::new(),
            foreigns: Vec::new(),
            networks: Vec::new(),
            span: start,
        };
        let mut pending_doc: Option<String> = None;

        loop {
            self.skip_newlines();
            match self.peek().clone() {
                TokenKind::Eof => break,
                TokenKind::DocComment(text) => {
                    self.advance();
                    match &mut pending_doc {
                        Some(doc) => {
                            doc.push('\n');
                            doc.push_str(&text);
                        }
                        None => pending_doc = Some(text),
                    }
                }
                TokenKind::Module => {
                    self.advance();
                    if let Some((name, _)) = self.eat_type_ident() {
                        module.name = name;
                    } else {
                        self.error_here("E200", "expected a module name");
                    }
                    module.doc = pending_doc.take().or(module.doc.take());
                    self.sync_to_newline();
                }
                TokenKind::Narrative => {
                    self.advance();
                    let rows = self.collect_raw_rows();
                    let text = rows
                        .iter()
                        .map(|r| r.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    module.narrative = Some(text);
                    self.eat(TokenKind::Newline);
                }
                TokenKind::Use => {
                    self.advance();
                    if let Some(import) = self.parse_import() {
                        module.imports.push(import);
                    }
                }
                TokenKind::TypeIdent(_) => {
                    if let Some(import) = self.parse_import() {
                        module.imports.push(import);
                    }
                }
                TokenKind::Type => {
                    if let Some(decl) = self.parse_type_decl(pending_doc.take()) {
                        module.types.push(decl);
                    }
                }
                TokenKind::ConstIdent(_) => {
                    if let Some(decl) = self.parse_constant(pending_doc.take()) {
                        module.constants.push(decl);
                    }
                }
                TokenKind::Foreign => {
                    if let Some(block) = self.parse_foreign_block() {
                        module.foreigns.push(block);
                    }
                }
                TokenKind::InvariantNetwork => {
                    if let Some(network) = self.parse_invariant_network() {
                        module.networks.push(network);
                    }
                }
                TokenKind::Main => {
                    if let Some(main) = self.parse_main(pending_doc.take()) {
                        module.mains.push(main);
                    }
                }
                kind if verb_of(&kind).is_some() => {
                    let verb = verb_of(&kind).unwrap();
                    if let Some(func) = self.parse_function(verb, pending_doc.take()) {
                        module.functions.push(func);
                    }
                }
                other => {
                    self.error_here(
                        "E200",
                        format!("expected a declaration, found {}", describe(&other)),
                    );
                    self.sync_top_level();
                }
            }
        }

        module.span = start.merge(self.peek_span());
        module
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    /// `use Net inputs fetch, types Request Response`
    ///
    /// The leading `use` is optional: any top-level line starting with a
    /// type identifier is an import.
    fn parse_import(&mut self) -> Option<Import> {
        let start = self.peek_span();
        let (module, _) = match self.eat_type_ident() {
            Some(pair) => pair,
            None => {
                self.error_here("E204", "expected a module name in import");
                self.sync_to_newline();
                return None;
            }
        };
        let mut groups = Vec::new();
        loop {
            let group_start = self.peek_span();
            let selector = match self.peek().clone() {
                kind if verb_of(&kind).is_some() => {
                    self.advance();
                    Some(ImportSelector::Verb(verb_of(&kind).unwrap()))
                }
                TokenKind::Ident(name) if self.interner.resolve(name) == "types" => {
                    self.advance();
                    Some(ImportSelector::Types)
                }
                _ => None,
            };
            let mut names = Vec::new();
            loop {
                match self.peek() {
                    TokenKind::Ident(name) | TokenKind::TypeIdent(name) => {
                        names.push(*name);
                        self.advance();
                    }
                    _ => break,
                }
            }
            if names.is_empty() && selector.is_none() {
                break;
            }
            if names.is_empty() {
                self.error_here("E204", "import group names nothing");
            }
            groups.push(ImportGroup {
                selector,
                names,
                span: group_start.merge(self.peek_span()),
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if groups.is_empty() {
            self.error_here("E204", "import names nothing");
        }
        let span = start.merge(self.peek_span());
        if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Eof) {
            self.error_here("E204", "unexpected token in import");
            self.sync_to_newline();
        }
        Some(Import { module, groups, span })
    }

    // ------------------------------------------------------------------
    // Type declarations
    // ------------------------------------------------------------------

    fn parse_type_decl(&mut self, doc: Option<String>) -> Option<TypeDecl> {
        let start = self.peek_span();
        self.advance(); // `type`

        let (name, name_span) = match self.peek().clone() {
            TokenKind::TypeIdent(name) => {
                let span = self.peek_span();
                self.advance();
                (name, span)
            }
            TokenKind::Ident(name) => {
                let span = self.peek_span();
                let text = self.interner.resolve(name).to_string();
                self.diags.push(
                    Diagnostic::error("E110", format!("type names are CamelCase: '{text}'"), span)
                        .with_suggestion(format!("rename to '{}'", camel_case(&text))),
                );
                self.advance();
                (name, span)
            }
            _ => {
                self.error_here("E200", "expected a type name after 'type'");
                self.sync_top_level();
                return None;
            }
        };

        let mut generics = Vec::new();
        if self.eat(TokenKind::Lt) {
            loop {
                match self.eat_type_ident() {
                    Some((param, _)) => generics.push(param),
                    None => {
                        self.error_here("E200", "expected a type parameter");
                        break;
                    }
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::Gt, "'>' to close type parameters");
        }

        self.expect(TokenKind::Is, "'is' in type declaration");

        let body = if self.eat(TokenKind::With) {
            TypeBody::Record(self.parse_field_list())
        } else if self.algebraic_ahead() {
            TypeBody::Algebraic(self.parse_variants())
        } else {
            match self.parse_type() {
                Some(ty) => TypeBody::Alias(ty),
                None => return None,
            }
        };

        let span = start.merge(self.peek_span());
        if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Eof) {
            self.error_here("E200", "expected end of type declaration");
            self.sync_to_newline();
        }
        Some(TypeDecl { name, name_span, generics, body, doc, span })
    }

    /// After `is`: a variant list is signalled by `TypeIdent(` or by a `|`
    /// before the end of the logical line. A lone fieldless name is an
    /// alias.
    fn algebraic_ahead(&self) -> bool {
        if !matches!(self.peek(), TokenKind::TypeIdent(_)) {
            return false;
        }
        if matches!(self.peek2(), TokenKind::LParen) {
            return true;
        }
        let mut probe = self.pos;
        let mut depth = 0usize;
        while let Some(token) = self.tokens.get(probe) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
                TokenKind::Bar if depth == 0 => return true,
                TokenKind::Newline | TokenKind::Eof => break,
                _ => {}
            }
            probe += 1;
        }
        false
    }

    fn parse_variants(&mut self) -> Vec<VariantDecl> {
        let mut variants = Vec::new();
        loop {
            let start = self.peek_span();
            let (name, _) = match self.eat_type_ident() {
                Some(pair) => pair,
                None => {
                    self.error_here("E200", "expected a variant name");
                    break;
                }
            };
            let mut fields = Vec::new();
            if self.eat(TokenKind::LParen) {
                if !self.at(&TokenKind::RParen) {
                    loop {
                        if let Some(field) = self.parse_field() {
                            fields.push(field);
                        }
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RParen, "')' to close variant fields");
            }
            variants.push(VariantDecl { name, fields, span: start.merge(self.peek_span()) });
            if !self.eat(TokenKind::Bar) {
                break;
            }
        }
        variants
    }

    /// `x Decimal, y Decimal` inline, or an indented block of one field per
    /// line.
    fn parse_field_list(&mut self) -> Vec<FieldDecl> {
        let mut fields = Vec::new();
        if self.at(&TokenKind::Newline) {
            self.advance();
            if !self.eat_indent() {
                self.error_here("E200", "expected an indented field block");
                return fields;
            }
            loop {
                self.skip_newlines();
                if self.eat_dedent() || matches!(self.peek(), TokenKind::Eof) {
                    break;
                }
                if let Some(field) = self.parse_field() {
                    fields.push(field);
                }
                if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Dedent(_)) {
                    self.sync_to_newline();
                }
            }
        } else {
            loop {
                if let Some(field) = self.parse_field() {
                    fields.push(field);
                }
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        fields
    }

    fn parse_field(&mut self) -> Option<FieldDecl> {
        let start = self.peek_span();
        let (name, _) = match self.eat_ident() {
            Some(pair) => pair,
            None => {
                self.error_here("E200", "expected a field name");
                self.advance_guarded();
                return None;
            }
        };
        let ty = self.parse_type_no_where()?;
        Some(FieldDecl { name, ty, span: start.merge(self.peek_span()) })
    }

    // ------------------------------------------------------------------
    // Constants
    // ------------------------------------------------------------------

    fn parse_constant(&mut self, doc: Option<String>) -> Option<ConstantDecl> {
        let start = self.peek_span();
        let TokenKind::ConstIdent(name) = self.peek().clone() else {
            return None;
        };
        let name_span = self.peek_span();
        self.advance();
        let ty = if self.eat(TokenKind::As) {
            self.parse_type()
        } else {
            None
        };
        self.expect(TokenKind::Assign, "'=' in constant declaration");
        let value = self.parse_expr();
        let span = start.merge(value.span);
        if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Eof) {
            self.error_here("E200", "expected end of constant declaration");
            self.sync_to_newline();
        }
        Some(ConstantDecl { name, name_span, ty, value, doc, span })
    }

    // ------------------------------------------------------------------
    // Foreign blocks & invariant networks
    // ------------------------------------------------------------------

    fn parse_foreign_block(&mut self) -> Option<ForeignBlock> {
        let start = self.peek_span();
        self.advance(); // `foreign`
        let library = match self.peek().clone() {
            TokenKind::Str { pieces, .. } => {
                self.advance();
                pieces
                    .iter()
                    .map(|p| match p {
                        StrPiece::Text(t) => t.as_str(),
                        StrPiece::Interp(_) => "",
                    })
                    .collect::<String>()
            }
            _ => {
                self.error_here("E200", "expected a library name string after 'foreign'");
                String::new()
            }
        };
        self.eat(TokenKind::With);
        self.expect(TokenKind::Newline, "end of foreign header");
        if !self.eat_indent() {
            self.error_here("E200", "expected an indented block of foreign signatures");
            return None;
        }
        let mut decls = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_dedent() || matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            let decl_start = self.peek_span();
            let Some((name, _)) = self.eat_ident() else {
                self.error_here("E200", "expected a foreign function name");
                self.sync_to_newline();
                continue;
            };
            self.expect(TokenKind::LParen, "'(' in foreign signature");
            let params = self.parse_params();
            let ret = if matches!(self.peek(), TokenKind::TypeIdent(_)) {
                self.parse_type()
            } else {
                None
            };
            decls.push(ForeignDecl { name, params, ret, span: decl_start.merge(self.peek_span()) });
            if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Dedent(_)) {
                self.sync_to_newline();
            }
        }
        Some(ForeignBlock { library, decls, span: start.merge(self.peek_span()) })
    }

    fn parse_invariant_network(&mut self) -> Option<InvariantNetwork> {
        let start = self.peek_span();
        self.advance(); // `invariant_network`
        let (name, _) = match self.eat_type_ident() {
            Some(pair) => pair,
            None => {
                self.error_here("E200", "expected an invariant network name");
                self.sync_top_level();
                return None;
            }
        };
        self.expect(TokenKind::Newline, "end of invariant network header");
        if !self.eat_indent() {
            self.error_here("E200", "expected an indented block of invariants");
            return None;
        }
        let mut rows = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_dedent() || matches!(self.peek(), TokenKind::Eof) {
                break;
            }
            rows.push(self.parse_expr());
            if !self.eat(TokenKind::Newline) && !matches!(self.peek(), TokenKind::Dedent(_)) {
                self.sync_to_newline();
            }
        }
        Some(InvariantNetwork { name, rows, span: start.merge(self.peek_span()) })
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn parse_function(&mut self, verb: Verb, doc: Option<String>) -> Option<FunctionDef> {
        let start = self.peek_span();
        self.advance(); // verb keyword

        let (name, name_span) = match self.peek().clone() {
            TokenKind::Ident(name) => {
                let span = self.peek_span();
                self.advance();
                (name, span)
            }
            TokenKind::TypeIdent(name) | TokenKind::ConstIdent(name) => {
                let span = self.peek_span();
                let text = self.interner.resolve(name).to_string();
                self.diags.push(
                    Diagnostic::error(
                        "E110",
                        format!("function names are snake_case: '{text}'"),
                        span,
                    )
                    .with_suggestion(format!("rename to '{}'", snake_case(&text))),
                );
                self.advance();
                (name, span)
            }
            _ => {
                self.error_here("E200", "expected a function name");
                self.sync_top_level();
                return None;
            }
        };

        self.expect(TokenKind::LParen, "'(' to open the parameter list");
        let params = self.parse_params();

        let ret = if matches!(self.peek(), TokenKind::TypeIdent(_)) {
            let ret = self.parse_type();
            if verb == Verb::Validates {
                if let Some(ty) = &ret {
                    self.diags.push(
                        Diagnostic::error(
                            "E360",
                            "'validates' functions return Boolean implicitly",
                            ty.span,
                        )
                        .with_suggestion("remove the return type"),
                    );
                }
            }
            ret
        } else {
            None
        };

        let mut fallible = false;
        if matches!(self.peek(), TokenKind::FailBang | TokenKind::Not) {
            let bang_span = self.peek_span();
            self.advance();
            fallible = true;
            if verb.is_pure() {
                self.diags.push(
                    Diagnostic::error(
                        "E361",
                        format!("'{}' functions cannot declare the fail marker", verb.keyword()),
                        bang_span,
                    )
                    .with_note("only 'inputs', 'outputs', and 'main' may fail"),
                );
            }
        }

        let (annotations, body) = self.parse_annotations_and_body(verb);

        Some(FunctionDef {
            verb,
            name,
            name_span,
            params,
            ret,
            fallible,
            annotations,
            body,
            doc,
            span: start.merge(self.peek_span()),
        })
    }

    fn parse_main(&mut self, doc: Option<String>) -> Option<MainDef> {
        let start = self.peek_span();
        self.advance(); // `main`
        if self.eat(TokenKind::LParen) {
            self.expect(TokenKind::RParen, "')' after 'main('");
        }
        let mut fallible = false;
        if matches!(self.peek(), TokenKind::FailBang | TokenKind::Not) {
            self.advance();
            fallible = true;
        }
        let (annotations, body) = self.parse_annotations_and_body(Verb::Outputs);
        let body = match body {
            Body::Statements(stmts) => stmts,
            Body::MatchArms(_) => {
                self.error_here("E200", "'main' takes statements, not match arms");
                Vec::new()
            }
        };
        Some(MainDef { fallible, annotations, body, doc, span: start.merge(self.peek_span()) })
    }

    fn parse_params(&mut self) -> Vec<Param> {
        let mut params = Vec::new();
        if self.eat(TokenKind::RParen) {
            return params;
        }
        loop {
            let start = self.peek_span();
            let Some((name, _)) = self.eat_ident() else {
                self.error_here("E200", "expected a parameter name");
                break;
            };
            let Some(ty) = self.parse_type_no_where() else {
                break;
            };
            let where_clause = if self.eat(TokenKind::Where) {
                Some(self.parse_expr())
            } else {
                None
            };
            params.push(Param { name, ty, where_clause, span: start.merge(self.peek_span()) });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')' to close the parameter list");
        params
    }

    // ------------------------------------------------------------------
    // Annotations & body
    // ------------------------------------------------------------------

    fn parse_annotations_and_body(&mut self, verb: Verb) -> (Vec<Annotation>, Body) {
        let mut annotations = Vec::new();

        // `from` may follow the signature inline.
        let mut indented = false;
        if !self.at(&TokenKind::From) {
            self.eat(TokenKind::Newline);
            if self.eat_indent() {
                indented = true;
            }
        }

        loop {
            self.skip_newlines();
            if self.at(&TokenKind::From) {
                break;
            }
            match self.parse_annotation() {
                Some(annotation) => annotations.push(annotation),
                None => {
                    let found = describe(self.peek());
                    self.error_here("E201", format!("expected an annotation or 'from', found {found}"));
                    if matches!(self.peek(), TokenKind::Eof | TokenKind::Dedent(_)) {
                        let body = Body::Statements(Vec::new());
                        if indented {
                            self.eat_dedent();
                        }
                        return (annotations, body);
                    }
                    self.sync_to_newline();
                }
            }
        }

        self.advance(); // `from`
        let body = self.parse_function_body(verb);
        if indented {
            self.eat_dedent();
        }
        (annotations, body)
    }

    fn parse_annotation(&mut self) -> Option<Annotation> {
        let start = self.peek_span();
        let kind = match self.peek().clone() {
            TokenKind::Requires => {
                self.advance();
                AnnotationKind::Requires(self.parse_expr())
            }
            TokenKind::Ensures => {
                self.advance();
                AnnotationKind::Ensures(self.parse_expr())
            }
            TokenKind::Know => {
                self.advance();
                AnnotationKind::Know(self.parse_expr())
            }
            TokenKind::Assume => {
                self.advance();
                AnnotationKind::Assume(self.parse_expr())
            }
            TokenKind::Believe => {
                self.advance();
                AnnotationKind::Believe(self.parse_expr())
            }
            TokenKind::Terminates => {
                self.advance();
                self.eat(TokenKind::Colon);
                AnnotationKind::Terminates(self.parse_expr())
            }
            TokenKind::Trusted => {
                self.advance();
                match self.peek().clone() {
                    TokenKind::Str { pieces, .. } => {
                        self.advance();
                        let reason = pieces
                            .iter()
                            .map(|p| match p {
                                StrPiece::Text(t) => t.as_str(),
                                StrPiece::Interp(_) => "",
                            })
                            .collect::<String>();
                        AnnotationKind::Trusted(reason)
                    }
                    _ => {
                        self.error_here("E202", "'trusted' takes a quoted reason");
                        AnnotationKind::Trusted(String::new())
                    }
                }
            }
            TokenKind::Satisfies => {
                self.advance();
                match self.eat_type_ident() {
                    Some((name, _)) => AnnotationKind::Satisfies(name),
                    None => {
                        self.error_here("E202", "'satisfies' names an invariant network");
                        return None;
                    }
                }
            }
            TokenKind::NearMiss => {
                self.advance();
                let input = self.parse_expr();
                self.expect(TokenKind::FatArrow, "'=>' between near_miss input and expectation");
                let expected = self.parse_expr();
                AnnotationKind::NearMiss { input, expected }
            }
            TokenKind::Explain => {
                self.advance();
                AnnotationKind::Explain(self.collect_raw_rows())
            }
            TokenKind::Proof => {
                self.advance();
                let rows = self.collect_raw_rows();
                let mut obligations = Vec::new();
                for row in rows {
                    match row.text.split_once(':') {
                        Some((name, text)) => obligations.push(ProofRow {
                            name: name.trim().to_string(),
                            text: text.trim().to_string(),
                            span: row.span,
                        }),
                        None => {
                            self.diags.push(Diagnostic::error(
                                "E203",
                                "proof rows have the form 'name: text'",
                                row.span,
                            ));
                        }
                    }
                }
                AnnotationKind::Proof(obligations)
            }
            TokenKind::Intent => {
                self.advance();
                AnnotationKind::Intent(self.single_raw_row())
            }
            TokenKind::WhyNot => {
                self.advance();
                AnnotationKind::WhyNot(self.single_raw_row())
            }
            TokenKind::Chosen => {
                self.advance();
                AnnotationKind::Chosen(self.single_raw_row())
            }
            _ => return None,
        };

        let span = start.merge(self.peek_span());
        if !self.eat(TokenKind::Newline)
            && !matches!(self.peek(), TokenKind::Eof | TokenKind::Dedent(_) | TokenKind::From)
        {
            self.error_here("E202", "expected end of annotation");
            self.sync_to_newline();
        }
        Some(Annotation { kind, span })
    }

    fn collect_raw_rows(&mut self) -> Vec<CnlRow> {
        let mut rows = Vec::new();
        while let TokenKind::RawRow(text) = self.peek().clone() {
            let span = self.peek_span();
            self.advance();
            rows.push(CnlRow { text, span });
        }
        rows
    }

    fn single_raw_row(&mut self) -> String {
        let rows = self.collect_raw_rows();
        rows.into_iter()
            .map(|r| r.text)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn parse_function_body(&mut self, verb: Verb) -> Body {
        let arms_expected = verb == Verb::Matches
            || (verb == Verb::Inputs && self.body_looks_like_arms());
        if arms_expected {
            Body::MatchArms(self.parse_arm_block())
        } else {
            Body::Statements(self.parse_stmt_block())
        }
    }

    /// For `inputs` bodies: an implicit match is signalled by a `=>` on the
    /// first body line, outside any brackets.
    fn body_looks_like_arms(&self) -> bool {
        let mut probe = self.pos;
        // Step over `Newline Indent` to the first body line.
        match self.tokens.get(probe).map(|t| &t.kind) {
            Some(TokenKind::Newline) => probe += 1,
            _ => return false,
        }
        match self.tokens.get(probe).map(|t| &t.kind) {
            Some(TokenKind::Indent(_)) => probe += 1,
            _ => return false,
        }
        let mut depth = 0usize;
        while let Some(token) = self.tokens.get(probe) {
            match token.kind {
                TokenKind::LParen | TokenKind::LBracket => depth += 1,
                TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
                TokenKind::FatArrow if depth == 0 => return true,
                TokenKind::Newline | TokenKind::Eof => break,
                _ => {}
            }
            probe += 1;
        }
        false
    }
}

fn verb_of(kind: &TokenKind) -> Option<Verb> {
    match kind {
        TokenKind::Transforms => Some(Verb::Transforms),
        TokenKind::Validates => Some(Verb::Validates),
        TokenKind::Reads => Some(Verb::Reads),
        TokenKind::Creates => Some(Verb::Creates),
        TokenKind::Matches => Some(Verb::Matches),
        TokenKind::Inputs => Some(Verb::Inputs),
        TokenKind::Outputs => Some(Verb::Outputs),
        _ => None,
    }
}

// ============================================================================
// Test support
// ============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::lexer::lex;

    pub(crate) fn parse_module_str(source: &str) -> (Module, Vec<Diagnostic>, Interner) {
        let mut interner = Interner::new();
        let default_name = interner.intern("test");
        let (tokens, lex_diags) = lex(source, FileId(0), &mut interner);
        let (module, mut diags) = parse_module(&tokens, FileId(0), default_name, &interner);
        let mut all = lex_diags;
        all.append(&mut diags);
        (module, all, interner)
    }

    pub(crate) fn parse_expr_str(source: &str) -> Expr {
        let mut interner = Interner::new();
        let (tokens, _) = lex(source, FileId(0), &mut interner);
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            file: FileId(0),
            interner: &interner,
            diags: Vec::new(),
            next_node: 0,
        };
        parser.parse_expr()
    }

    pub(crate) fn parse_type_str(source: &str) -> crate::ast::types::TypeExpr {
        let mut interner = Interner::new();
        let (tokens, _) = lex(source, FileId(0), &mut interner);
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            file: FileId(0),
            interner: &interner,
            diags: Vec::new(),
            next_node: 0,
        };
        parser.parse_type().expect("type parse")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{parse_expr_str, parse_module_str};
    use super::*;
    use crate::ast::expr::{BinaryOp, ExprKind};

    #[test]
    fn hello_world_parses() {
        let (module, diags, _) = parse_module_str("main()!\nfrom\n    println(\"Hello from Prove!\")\n");
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.mains.len(), 1);
        assert!(module.mains[0].fallible);
        assert_eq!(module.mains[0].body.len(), 1);
    }

    #[test]
    fn function_with_annotations_parses() {
        let source = "\
transforms clamp(x Integer, lo Integer, hi Integer) Integer
ensures result >= lo
explain
    bound value from below using lo
    bound value from above using hi
    return result
from
    a as Integer = max(lo, x)
    b as Integer = min(a, hi)
    b
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        let func = &module.functions[0];
        assert_eq!(func.verb, Verb::Transforms);
        assert_eq!(func.params.len(), 3);
        assert_eq!(func.annotations.len(), 2);
        match &func.annotations[1].kind {
            AnnotationKind::Explain(rows) => assert_eq!(rows.len(), 3),
            other => panic!("expected explain, got {:?}", other),
        }
        assert_eq!(func.body.top_level_count(), 3);
    }

    #[test]
    fn indented_annotations_also_parse() {
        let source = "\
transforms double(x Integer) Integer
    ensures result == x * 2
    from
        x * 2
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.functions[0].annotations.len(), 1);
    }

    #[test]
    fn validates_with_return_type_is_e360() {
        let (_, diags, _) = parse_module_str("validates email(a String) Boolean\nfrom\n    true\n");
        assert!(diags.iter().any(|d| d.code == "E360"));
    }

    #[test]
    fn pure_verb_fail_marker_is_e361() {
        let (_, diags, _) = parse_module_str("transforms id(x Integer) Integer!\nfrom\n    x\n");
        assert!(diags.iter().any(|d| d.code == "E361"));
    }

    #[test]
    fn matches_body_is_arm_list() {
        let source = "\
matches area(s Shape) Decimal
from
    Circle(r) => 3.14 * r * r
    Rect(w, h) => w * h
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        match &module.functions[0].body {
            Body::MatchArms(arms) => assert_eq!(arms.len(), 2),
            other => panic!("expected arms, got {:?}", other),
        }
    }

    #[test]
    fn algebraic_type_parses() {
        let source = "type Shape is Circle(r Decimal) | Rect(w Decimal, h Decimal)\n";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        match &module.types[0].body {
            TypeBody::Algebraic(variants) => {
                assert_eq!(variants.len(), 2);
                assert_eq!(variants[0].fields.len(), 1);
                assert_eq!(variants[1].fields.len(), 2);
            }
            other => panic!("expected algebraic, got {:?}", other),
        }
    }

    #[test]
    fn refined_alias_parses() {
        let (module, diags, _) = parse_module_str("type Port is Integer where 1..65535\n");
        assert!(diags.is_empty(), "{:?}", diags);
        assert!(matches!(module.types[0].body, TypeBody::Alias(_)));
    }

    #[test]
    fn record_type_parses() {
        let (module, diags, _) = parse_module_str("type Point is with x Decimal, y Decimal\n");
        assert!(diags.is_empty(), "{:?}", diags);
        match &module.types[0].body {
            TypeBody::Record(fields) => assert_eq!(fields.len(), 2),
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn constant_parses() {
        let (module, diags, _) = parse_module_str("MAX_RETRIES as Integer = 3\n");
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.constants.len(), 1);
    }

    #[test]
    fn import_groups_parse() {
        let (module, diags, interner) =
            parse_module_str("use Net inputs fetch, types Request Response\n");
        assert!(diags.is_empty(), "{:?}", diags);
        let import = &module.imports[0];
        assert_eq!(interner.resolve(import.module), "Net");
        assert_eq!(import.groups.len(), 2);
        assert_eq!(import.groups[0].selector, Some(ImportSelector::Verb(Verb::Inputs)));
        assert_eq!(import.groups[1].selector, Some(ImportSelector::Types));
        assert_eq!(import.groups[1].names.len(), 2);
    }

    #[test]
    fn foreign_block_parses() {
        let source = "\
foreign \"m\" with
    sqrt(x Decimal) Decimal
    pow(x Decimal, y Decimal) Decimal
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.foreigns[0].library, "m");
        assert_eq!(module.foreigns[0].decls.len(), 2);
    }

    #[test]
    fn invariant_network_parses() {
        let source = "\
invariant_network Conservation
    total == incoming + outgoing
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.networks[0].rows.len(), 1);
    }

    #[test]
    fn missing_from_is_e201() {
        let (_, diags, _) = parse_module_str("transforms id(x Integer) Integer\nensures result == x\n");
        assert!(diags.iter().any(|d| d.code == "E201"));
    }

    #[test]
    fn pipe_precedence_is_lowest() {
        let expr = parse_expr_str("a + b |> f");
        match expr.kind {
            ExprKind::Pipe { value, .. } => {
                assert!(matches!(value.kind, ExprKind::Binary { op: BinaryOp::Add, .. }));
            }
            other => panic!("expected pipe at root, got {:?}", other),
        }
    }

    #[test]
    fn comparison_binds_tighter_than_and() {
        let expr = parse_expr_str("a < b && c > d");
        match expr.kind {
            ExprKind::Binary { op: BinaryOp::And, lhs, rhs } => {
                assert!(matches!(lhs.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
                assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Gt, .. }));
            }
            other => panic!("expected and at root, got {:?}", other),
        }
    }

    #[test]
    fn fail_prop_binds_to_call() {
        let expr = parse_expr_str("read_file(path)!");
        assert!(matches!(expr.kind, ExprKind::FailProp(_)));
    }

    #[test]
    fn type_apply_vs_comparison() {
        let apply = parse_expr_str("Empty<Integer>");
        assert!(matches!(apply.kind, ExprKind::TypeApply { .. }));
        let cmp = parse_expr_str("Foo < bar");
        assert!(matches!(cmp.kind, ExprKind::Binary { op: BinaryOp::Lt, .. }));
    }

    #[test]
    fn lambda_parses_as_argument() {
        let expr = parse_expr_str("map(items, (x) => x + 1)");
        match expr.kind {
            ExprKind::Call { args, .. } => {
                assert!(matches!(args[1].kind, ExprKind::Lambda { .. }));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn valid_reference_and_call() {
        let reference = parse_expr_str("valid email");
        assert!(matches!(reference.kind, ExprKind::Valid { args: None, .. }));
        let call = parse_expr_str("valid email(x)");
        assert!(matches!(call.kind, ExprKind::Valid { args: Some(_), .. }));
    }

    #[test]
    fn doc_comment_attaches_to_function() {
        let source = "/// Doubles a number.\ntransforms double(x Integer) Integer\nfrom\n    x * 2\n";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert_eq!(module.functions[0].doc.as_deref(), Some("Doubles a number."));
    }

    #[test]
    fn near_miss_parses_input_and_expectation() {
        let source = "\
validates port(p Integer)
near_miss 0 => false
from
    p >= 1 && p <= 65535
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        assert!(matches!(
            module.functions[0].annotations[0].kind,
            AnnotationKind::NearMiss { .. }
        ));
    }

    #[test]
    fn proof_rows_split_name_and_text() {
        let source = "\
transforms inc(x Integer) Integer
ensures result > x
proof
    monotone: result always exceeds x by one
from
    x + 1
";
        let (module, diags, _) = parse_module_str(source);
        assert!(diags.is_empty(), "{:?}", diags);
        match &module.functions[0].annotations[1].kind {
            AnnotationKind::Proof(rows) => {
                assert_eq!(rows[0].name, "monotone");
                assert!(rows[0].text.contains("exceeds"));
            }
            other => panic!("expected proof, got {:?}", other),
        }
    }
}
