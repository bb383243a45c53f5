//! Indentation-sensitive lexer for `.prv` source.
//!
//! The lexer walks a UTF-8 byte buffer and produces a flat token stream with
//! explicit structure:
//!
//! - **Indentation**: a stack of indent widths starting at `0`. A logical
//!   line that is deeper than the stack top pushes and emits
//!   [`TokenKind::Indent`]; a shallower line pops and emits one
//!   [`TokenKind::Dedent`] per level. Tabs count as the configured tab width
//!   (default 4).
//! - **Newline suppression**: a newline directly after a binary operator,
//!   comma, opening bracket, `=>`, `|>`, `->`, `:` or `|` is not logical;
//!   the next physical line continues the current logical line and its
//!   leading whitespace is ignored.
//! - **Case classes**: identifiers are classified at lex time into
//!   `Ident` / `TypeIdent` / `ConstIdent`; violations are diagnosed here
//!   with a rewritten-name hint.
//! - **Strings**: plain, triple, format, and raw forms. Format strings lex
//!   `{expr}` segments through a bounded sub-lexer so interpolation reaches
//!   the parser as token streams.
//! - **Regex vs. division**: `/` opens a regex literal unless the previous
//!   token can end an expression.
//! - **Fail marker**: `!` with no whitespace after an expression-ending
//!   token is postfix [`TokenKind::FailBang`]; any other `!` is prefix not.
//! - **Raw rows**: `explain` / `proof` / `narrative` / `intent` / `why_not`
//!   / `chosen` capture their controlled-natural-language rows verbatim as
//!   [`TokenKind::RawRow`] tokens; the indent stack is untouched inside a
//!   row block.

use prove_base::{Diagnostic, FileId, Interner, Span};

use crate::token::{keyword, StrKind, StrPiece, Token, TokenKind};

const DEFAULT_TAB_WIDTH: usize = 4;

/// Lexes a whole file. Returns the token stream (always ending in `Eof`)
/// and any lexical diagnostics; lexing continues past errors.
pub fn lex(
    source: &str,
    file: FileId,
    interner: &mut Interner,
) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source, file, 0, interner, true);
    lexer.run();
    (lexer.tokens, lexer.diags)
}

/// Bounded expression lexer for f-string segments: no layout tokens, spans
/// are absolute into the enclosing file.
fn lex_fragment(
    source: &str,
    file: FileId,
    base: usize,
    interner: &mut Interner,
) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source, file, base, interner, false);
    lexer.run();
    (lexer.tokens, lexer.diags)
}

struct Lexer<'src, 'i> {
    src: &'src str,
    bytes: &'src [u8],
    file: FileId,
    base: usize,
    pos: usize,
    interner: &'i mut Interner,
    tokens: Vec<Token>,
    diags: Vec<Diagnostic>,
    indent_stack: Vec<usize>,
    /// Indent width of the current logical line.
    current_indent: usize,
    tab_width: usize,
    /// False for the bounded f-string sub-lexer.
    layout: bool,
    finished: bool,
}

impl<'src, 'i> Lexer<'src, 'i> {
    fn new(
        src: &'src str,
        file: FileId,
        base: usize,
        interner: &'i mut Interner,
        layout: bool,
    ) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            file,
            base,
            pos: 0,
            interner,
            tokens: Vec::new(),
            diags: Vec::new(),
            indent_stack: vec![0],
            current_indent: 0,
            tab_width: DEFAULT_TAB_WIDTH,
            layout,
            finished: false,
        }
    }

    fn run(&mut self) {
        if self.layout {
            self.handle_line_start();
        }
        while !self.finished {
            self.next_token();
        }
    }

    // ------------------------------------------------------------------
    // Position helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn span_from(&self, start: usize) -> Span {
        Span::new(self.file, self.base + start, self.base + self.pos)
    }

    fn emit(&mut self, kind: TokenKind, start: usize) {
        let span = self.span_from(start);
        self.tokens.push(Token::new(kind, span));
    }

    fn error(&mut self, code: &'static str, message: impl Into<String>, start: usize) {
        self.diags
            .push(Diagnostic::error(code, message, self.span_from(start)));
    }

    fn last_kind(&self) -> Option<&TokenKind> {
        self.tokens.last().map(|t| &t.kind)
    }

    /// `/` is division only after a token that can end an expression.
    fn regex_allowed(&self) -> bool {
        !self.last_kind().map_or(false, |k| k.ends_expression())
    }

    // ------------------------------------------------------------------
    // Layout
    // ------------------------------------------------------------------

    /// Measures indentation from `at`, returning `(width, content_pos)`.
    fn measure_indent(&self, at: usize) -> (usize, usize) {
        let mut width = 0;
        let mut pos = at;
        while let Some(b) = self.bytes.get(pos) {
            match b {
                b' ' => width += 1,
                b'\t' => width += self.tab_width,
                _ => break,
            }
            pos += 1;
        }
        (width, pos)
    }

    /// True when the line starting at `at` has no tokens: empty, or only a
    /// non-doc `//` comment.
    fn line_is_blank(&self, content_pos: usize) -> bool {
        match self.bytes.get(content_pos) {
            None | Some(b'\n') | Some(b'\r') => true,
            Some(b'/') => {
                self.bytes.get(content_pos + 1) == Some(&b'/')
                    && self.bytes.get(content_pos + 2) != Some(&b'/')
            }
            _ => false,
        }
    }

    fn skip_to_next_line(&mut self) {
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'\n' {
                break;
            }
        }
    }

    /// Processes indentation at the start of a logical line: skips blank
    /// lines, then emits `Indent`/`Dedent` tokens against the width stack.
    fn handle_line_start(&mut self) {
        loop {
            if self.pos >= self.bytes.len() {
                self.finish();
                return;
            }
            let (width, content_pos) = self.measure_indent(self.pos);
            if self.line_is_blank(content_pos) {
                self.pos = content_pos;
                self.skip_to_next_line();
                continue;
            }

            self.pos = content_pos;
            self.current_indent = width;
            let top = *self.indent_stack.last().unwrap();
            if width > top {
                self.indent_stack.push(width);
                self.emit(TokenKind::Indent(width), content_pos);
            } else if width < top {
                while self.indent_stack.len() > 1 && *self.indent_stack.last().unwrap() > width {
                    self.indent_stack.pop();
                    let level = *self.indent_stack.last().unwrap();
                    self.emit(TokenKind::Dedent(level), content_pos);
                }
                if *self.indent_stack.last().unwrap() != width {
                    self.error(
                        "E102",
                        format!("unindent to width {width} matches no enclosing indentation level"),
                        content_pos,
                    );
                    // Realign so Indent/Dedent stay balanced for the parser.
                    self.indent_stack.push(width);
                    self.emit(TokenKind::Indent(width), content_pos);
                }
            }
            return;
        }
    }

    fn finish(&mut self) {
        if self.layout {
            let ends_with_newline = matches!(
                self.last_kind(),
                None | Some(TokenKind::Newline) | Some(TokenKind::Dedent(_))
            );
            if !ends_with_newline {
                self.emit(TokenKind::Newline, self.pos);
            }
            while self.indent_stack.len() > 1 {
                self.indent_stack.pop();
                let level = *self.indent_stack.last().unwrap();
                self.emit(TokenKind::Dedent(level), self.pos);
            }
        }
        self.emit(TokenKind::Eof, self.pos);
        self.finished = true;
    }

    // ------------------------------------------------------------------
    // Main dispatch
    // ------------------------------------------------------------------

    fn next_token(&mut self) {
        // Inter-token whitespace; newlines are significant and handled below.
        while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r')) {
            self.pos += 1;
        }

        let start = self.pos;
        let Some(byte) = self.peek() else {
            self.finish();
            return;
        };

        match byte {
            b'\n' => {
                self.pos += 1;
                if !self.layout {
                    return;
                }
                if self.last_kind().map_or(true, |k| k.suppresses_newline()) {
                    // Continuation: the next line's indentation is not layout.
                    while matches!(self.peek(), Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n')) {
                        self.pos += 1;
                    }
                    return;
                }
                self.emit(TokenKind::Newline, start);
                self.handle_line_start();
            }
            b'/' => {
                if self.peek_at(1) == Some(b'/') {
                    if self.peek_at(2) == Some(b'/') {
                        self.lex_doc_comment();
                    } else {
                        // Line comment: discard to end of line.
                        while !matches!(self.peek(), None | Some(b'\n')) {
                            self.pos += 1;
                        }
                    }
                } else if self.regex_allowed() {
                    self.lex_regex();
                } else {
                    self.pos += 1;
                    self.emit(TokenKind::Slash, start);
                }
            }
            b'"' => self.lex_string(StrKind::Plain),
            b'f' if self.peek_at(1) == Some(b'"') => {
                self.pos += 1;
                self.lex_string(StrKind::Format);
            }
            b'r' if self.peek_at(1) == Some(b'"') => {
                self.pos += 1;
                self.lex_string(StrKind::Raw);
            }
            b'0'..=b'9' => self.lex_number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.lex_word(),
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b',' => self.single(TokenKind::Comma),
            b':' => self.single(TokenKind::Colon),
            b'.' => {
                if self.peek_at(1) == Some(b'.') {
                    self.pos += 2;
                    self.emit(TokenKind::DotDot, start);
                } else {
                    self.single(TokenKind::Dot);
                }
            }
            b'+' => self.single(TokenKind::Plus),
            b'*' => self.single(TokenKind::Star),
            b'%' => self.single(TokenKind::Percent),
            b'-' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    self.emit(TokenKind::Arrow, start);
                } else {
                    self.single(TokenKind::Minus);
                }
            }
            b'=' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    self.emit(TokenKind::EqEq, start);
                } else if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    self.emit(TokenKind::FatArrow, start);
                } else {
                    self.single(TokenKind::Assign);
                }
            }
            b'<' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    self.emit(TokenKind::LtEq, start);
                } else {
                    self.single(TokenKind::Lt);
                }
            }
            b'>' => {
                if self.peek_at(1) == Some(b'=') {
                    self.pos += 2;
                    self.emit(TokenKind::GtEq, start);
                } else {
                    self.single(TokenKind::Gt);
                }
            }
            b'|' => {
                if self.peek_at(1) == Some(b'>') {
                    self.pos += 2;
                    self.emit(TokenKind::PipeArrow, start);
                } else if self.peek_at(1) == Some(b'|') {
                    self.pos += 2;
                    self.emit(TokenKind::OrOr, start);
                } else {
                    self.single(TokenKind::Bar);
                }
            }
            b'&' => {
                if self.peek_at(1) == Some(b'&') {
                    self.pos += 2;
                    self.emit(TokenKind::AndAnd, start);
                } else {
                    self.error("E101", "stray '&'; did you mean '&&'?", start);
                    self.pos += 1;
                }
            }
            b'!' => {
                if self.peek_at(1) == Some(b'=') {
                    // `!=` wins over postfix fail; write `x! == y` spaced.
                    self.pos += 2;
                    self.emit(TokenKind::NotEq, start);
                } else {
                    let immediate = self
                        .tokens
                        .last()
                        .map_or(false, |t| {
                            t.span.end == self.base + self.pos && t.kind.ends_expression()
                        });
                    self.pos += 1;
                    if immediate {
                        self.emit(TokenKind::FailBang, start);
                    } else {
                        self.emit(TokenKind::Not, start);
                    }
                }
            }
            _ => {
                let ch_len = utf8_len(byte);
                let text = &self.src[self.pos..(self.pos + ch_len).min(self.src.len())];
                self.pos += ch_len;
                self.error("E101", format!("invalid character '{}'", text), start);
            }
        }
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 1;
        self.emit(kind, start);
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    fn lex_doc_comment(&mut self) {
        let start = self.pos;
        self.pos += 3;
        let text_start = self.pos;
        while !matches!(self.peek(), None | Some(b'\n')) {
            self.pos += 1;
        }
        let text = self.src[text_start..self.pos].trim().to_string();
        self.emit(TokenKind::DocComment(text), start);
    }

    // ------------------------------------------------------------------
    // Words
    // ------------------------------------------------------------------

    fn lex_word(&mut self) {
        let start = self.pos;
        while matches!(
            self.peek(),
            Some(b'a'..=b'z') | Some(b'A'..=b'Z') | Some(b'0'..=b'9') | Some(b'_')
        ) {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];

        if let Some(kind) = keyword(text) {
            match kind {
                TokenKind::Explain | TokenKind::Proof | TokenKind::Narrative => {
                    self.emit(kind, start);
                    self.capture_raw_rows(true);
                }
                TokenKind::Intent | TokenKind::WhyNot | TokenKind::Chosen => {
                    self.emit(kind, start);
                    self.capture_raw_rows(false);
                }
                _ => self.emit(kind, start),
            }
            return;
        }

        let first = text.as_bytes()[0];
        let is_const = text.len() >= 2
            && text
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
            && first.is_ascii_uppercase();
        let kind = if is_const {
            TokenKind::ConstIdent(self.interner.intern(text))
        } else if first.is_ascii_uppercase() {
            if text.bytes().any(|b| b == b'_') {
                let hint = camel_case(text);
                self.diags.push(
                    Diagnostic::error(
                        "E110",
                        format!("type names are CamelCase: '{text}'"),
                        self.span_from(start),
                    )
                    .with_suggestion(format!("rename to '{hint}'")),
                );
            }
            TokenKind::TypeIdent(self.interner.intern(text))
        } else {
            if text.bytes().any(|b| b.is_ascii_uppercase()) {
                let hint = snake_case(text);
                self.diags.push(
                    Diagnostic::error(
                        "E110",
                        format!("value names are snake_case: '{text}'"),
                        self.span_from(start),
                    )
                    .with_suggestion(format!("rename to '{hint}'")),
                );
            }
            TokenKind::Ident(self.interner.intern(text))
        };
        self.emit(kind, start);
    }

    // ------------------------------------------------------------------
    // Numbers
    // ------------------------------------------------------------------

    fn lex_number(&mut self) {
        let start = self.pos;
        if self.peek() == Some(b'0') {
            let radix = match self.peek_at(1) {
                Some(b'x') | Some(b'X') => Some(16),
                Some(b'b') | Some(b'B') => Some(2),
                Some(b'o') | Some(b'O') => Some(8),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits_start = self.pos;
                while matches!(
                    self.peek(),
                    Some(b'0'..=b'9') | Some(b'a'..=b'f') | Some(b'A'..=b'F') | Some(b'_')
                ) {
                    self.pos += 1;
                }
                let digits: String = self.src[digits_start..self.pos]
                    .chars()
                    .filter(|c| *c != '_')
                    .collect();
                match i64::from_str_radix(&digits, radix) {
                    Ok(value) => self.emit(TokenKind::Integer(value), start),
                    Err(_) => {
                        self.error("E107", "bad numeric literal", start);
                        self.emit(TokenKind::Integer(0), start);
                    }
                }
                return;
            }
        }

        while matches!(self.peek(), Some(b'0'..=b'9') | Some(b'_')) {
            self.pos += 1;
        }

        // A decimal requires digits after the dot; `1..5` stays a range.
        let is_decimal = self.peek() == Some(b'.')
            && matches!(self.peek_at(1), Some(b'0'..=b'9'));
        if is_decimal {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9') | Some(b'_')) {
                self.pos += 1;
            }
            let text: String = self.src[start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            match text.parse::<f64>() {
                Ok(value) => self.emit(TokenKind::Decimal(value), start),
                Err(_) => {
                    self.error("E107", "bad numeric literal", start);
                    self.emit(TokenKind::Decimal(0.0), start);
                }
            }
        } else {
            let text: String = self.src[start..self.pos]
                .chars()
                .filter(|c| *c != '_')
                .collect();
            match text.parse::<i64>() {
                Ok(value) => self.emit(TokenKind::Integer(value), start),
                Err(_) => {
                    self.error("E107", "integer literal out of range", start);
                    self.emit(TokenKind::Integer(0), start);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Strings & regex
    // ------------------------------------------------------------------

    fn lex_string(&mut self, mut kind: StrKind) {
        let start = if kind == StrKind::Plain { self.pos } else { self.pos - 1 };
        // Triple form: three quotes in a row.
        if kind == StrKind::Plain
            && self.peek_at(1) == Some(b'"')
            && self.peek_at(2) == Some(b'"')
        {
            kind = StrKind::Triple;
            self.pos += 3;
        } else {
            self.pos += 1;
        }

        let mut pieces: Vec<StrPiece> = Vec::new();
        let mut text = String::new();
        let mut terminated = false;

        while let Some(b) = self.peek() {
            match kind {
                StrKind::Raw => {
                    if b == b'"' {
                        self.pos += 1;
                        terminated = true;
                        break;
                    }
                    if b == b'\n' {
                        break;
                    }
                    text.push(b as char);
                    self.pos += 1;
                    continue;
                }
                StrKind::Triple => {
                    if b == b'"'
                        && self.peek_at(1) == Some(b'"')
                        && self.peek_at(2) == Some(b'"')
                    {
                        self.pos += 3;
                        terminated = true;
                        break;
                    }
                }
                StrKind::Plain | StrKind::Format => {
                    if b == b'"' {
                        self.pos += 1;
                        terminated = true;
                        break;
                    }
                    if b == b'\n' {
                        break;
                    }
                }
            }

            if b == b'\\' {
                let escaped = self.peek_at(1);
                self.pos += 2;
                match escaped {
                    Some(b'n') => text.push('\n'),
                    Some(b'r') => text.push('\r'),
                    Some(b't') => text.push('\t'),
                    Some(b'\\') => text.push('\\'),
                    Some(b'"') => text.push('"'),
                    Some(b'0') => text.push('\0'),
                    Some(b'{') => text.push('{'),
                    Some(b'}') => text.push('}'),
                    other => {
                        self.error(
                            "E104",
                            format!(
                                "unknown escape '\\{}'",
                                other.map(|c| c as char).unwrap_or(' ')
                            ),
                            self.pos.saturating_sub(2),
                        );
                    }
                }
                continue;
            }

            if kind == StrKind::Format && b == b'{' {
                let expr_start = self.pos + 1;
                match self.find_interp_end(expr_start) {
                    Some(expr_end) => {
                        if !text.is_empty() {
                            pieces.push(StrPiece::Text(std::mem::take(&mut text)));
                        }
                        let fragment = &self.src[expr_start..expr_end];
                        let (tokens, diags) = lex_fragment(
                            fragment,
                            self.file,
                            self.base + expr_start,
                            self.interner,
                        );
                        self.diags.extend(diags);
                        pieces.push(StrPiece::Interp(tokens));
                        self.pos = expr_end + 1;
                    }
                    None => {
                        self.error("E105", "unterminated '{' interpolation", self.pos);
                        self.pos += 1;
                    }
                }
                continue;
            }

            // Copy one UTF-8 character through.
            let ch_len = utf8_len(b);
            text.push_str(&self.src[self.pos..(self.pos + ch_len).min(self.src.len())]);
            self.pos += ch_len;
        }

        if !terminated {
            self.error("E103", "unterminated string literal", start);
        }
        if !text.is_empty() || pieces.is_empty() {
            pieces.push(StrPiece::Text(text));
        }
        self.emit(TokenKind::Str { kind, pieces }, start);
    }

    /// Finds the `}` closing an f-string segment, respecting nested braces
    /// and nested string literals.
    fn find_interp_end(&self, from: usize) -> Option<usize> {
        let mut depth = 1usize;
        let mut pos = from;
        let mut in_string = false;
        while let Some(&b) = self.bytes.get(pos) {
            if in_string {
                match b {
                    b'\\' => pos += 1,
                    b'"' => in_string = false,
                    b'\n' => return None,
                    _ => {}
                }
            } else {
                match b {
                    b'"' => in_string = true,
                    b'{' => depth += 1,
                    b'}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(pos);
                        }
                    }
                    b'\n' => return None,
                    _ => {}
                }
            }
            pos += 1;
        }
        None
    }

    fn lex_regex(&mut self) {
        let start = self.pos;
        self.pos += 1;
        let mut text = String::new();
        let mut terminated = false;
        while let Some(b) = self.peek() {
            match b {
                b'/' => {
                    self.pos += 1;
                    terminated = true;
                    break;
                }
                b'\n' => break,
                b'\\' => {
                    // Keep the backslash; the regex engine sees it, not us.
                    text.push('\\');
                    if let Some(next) = self.peek_at(1) {
                        text.push(next as char);
                    }
                    self.pos += 2;
                }
                _ => {
                    let ch_len = utf8_len(b);
                    text.push_str(&self.src[self.pos..(self.pos + ch_len).min(self.src.len())]);
                    self.pos += ch_len;
                }
            }
        }
        if !terminated {
            self.error("E106", "unterminated regex literal", start);
        }
        self.emit(TokenKind::Regex(text), start);
    }

    // ------------------------------------------------------------------
    // Raw row capture (explain / proof / narrative / intent / ...)
    // ------------------------------------------------------------------

    /// Captures controlled-natural-language rows verbatim.
    ///
    /// The remainder of the keyword's line, if any, is the first row. With
    /// `block` set, every following line indented deeper than the keyword's
    /// line joins the block: the first such line fixes the row indent, lines
    /// deeper than that continue the previous row, lines at the row indent
    /// start new rows. The block ends at the first line at or left of the
    /// keyword's indent, which is then processed normally.
    fn capture_raw_rows(&mut self, block: bool) {
        let kw_indent = self.current_indent;
        let mut rows: Vec<(String, usize, usize)> = Vec::new();

        // Remainder of the keyword line.
        while matches!(self.peek(), Some(b' ') | Some(b'\t')) {
            self.pos += 1;
        }
        let rest_start = self.pos;
        while !matches!(self.peek(), None | Some(b'\n')) {
            self.pos += 1;
        }
        let rest = self.src[rest_start..self.pos].trim_end();
        if !rest.is_empty() {
            rows.push((rest.to_string(), rest_start, self.pos));
        }
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }

        if block {
            let mut row_indent: Option<usize> = None;
            loop {
                if self.pos >= self.bytes.len() {
                    break;
                }
                let line_start = self.pos;
                let (width, content_pos) = self.measure_indent(line_start);
                if self.line_is_blank(content_pos) {
                    self.pos = content_pos;
                    self.skip_to_next_line();
                    continue;
                }
                if width <= kw_indent {
                    // Not ours; leave pos at the line start for layout.
                    self.pos = line_start;
                    break;
                }
                let mut end = content_pos;
                while !matches!(self.bytes.get(end), None | Some(b'\n')) {
                    end += 1;
                }
                let line_text = self.src[content_pos..end].trim_end();
                match row_indent {
                    Some(ri) if width > ri => {
                        // Continuation of the previous row.
                        if let Some(last) = rows.last_mut() {
                            last.0.push(' ');
                            last.0.push_str(line_text);
                            last.2 = end;
                        } else {
                            rows.push((line_text.to_string(), content_pos, end));
                        }
                    }
                    _ => {
                        if row_indent.is_none() {
                            row_indent = Some(width);
                        }
                        rows.push((line_text.to_string(), content_pos, end));
                    }
                }
                self.pos = end;
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
        }

        for (text, start, end) in rows {
            self.tokens.push(Token::new(
                TokenKind::RawRow(text),
                Span::new(self.file, self.base + start, self.base + end),
            ));
        }
        self.emit(TokenKind::Newline, self.pos);
        self.handle_line_start();
    }
}

fn utf8_len(first_byte: u8) -> usize {
    match first_byte {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

pub(crate) fn snake_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    for (i, c) in text.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub(crate) fn camel_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut upper_next = true;
    for c in text.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use prove_base::Interner;

    fn lex_kinds(source: &str) -> Vec<TokenKind> {
        let mut interner = Interner::new();
        let (tokens, diags) = lex(source, FileId(0), &mut interner);
        assert!(diags.is_empty(), "unexpected diagnostics: {:?}", diags);
        tokens.into_iter().map(|t| t.kind).collect()
    }

    fn lex_with_diags(source: &str) -> (Vec<TokenKind>, Vec<Diagnostic>) {
        let mut interner = Interner::new();
        let (tokens, diags) = lex(source, FileId(0), &mut interner);
        (tokens.into_iter().map(|t| t.kind).collect(), diags)
    }

    #[test]
    fn indent_dedent_balance() {
        let kinds = lex_kinds("main()!\nfrom\n    println(\"hi\")\n");
        let indents = kinds.iter().filter(|k| matches!(k, TokenKind::Indent(_))).count();
        let dedents = kinds.iter().filter(|k| matches!(k, TokenKind::Dedent(_))).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
        assert_eq!(kinds.last(), Some(&TokenKind::Eof));
    }

    #[test]
    fn nested_blocks_dedent_to_each_level() {
        let kinds = lex_kinds("a\n    b\n        c\nd\n");
        let dedents: Vec<_> = kinds
            .iter()
            .filter_map(|k| match k {
                TokenKind::Dedent(level) => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(dedents, vec![4, 0]);
    }

    #[test]
    fn bad_unindent_is_diagnosed() {
        let (_, diags) = lex_with_diags("a\n    b\n  c\n");
        assert!(diags.iter().any(|d| d.code == "E102"));
    }

    #[test]
    fn newline_suppressed_after_operator() {
        let kinds = lex_kinds("x = 1 +\n    2\n");
        // One logical line: exactly one Newline, no Indent.
        let newlines = kinds.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newlines, 1);
        assert!(!kinds.iter().any(|k| matches!(k, TokenKind::Indent(_))));
    }

    #[test]
    fn newline_suppressed_after_comma_and_pipe() {
        let kinds = lex_kinds("f(a,\n  b) |>\n  g\n");
        let newlines = kinds.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn tabs_count_as_four() {
        let kinds = lex_kinds("a\n\tb\n");
        assert!(kinds.contains(&TokenKind::Indent(4)));
    }

    #[test]
    fn case_classes() {
        let mut interner = Interner::new();
        let (tokens, _) = lex("port Email MAX_RETRIES T", FileId(0), &mut interner);
        assert!(matches!(tokens[0].kind, TokenKind::Ident(_)));
        assert!(matches!(tokens[1].kind, TokenKind::TypeIdent(_)));
        assert!(matches!(tokens[2].kind, TokenKind::ConstIdent(_)));
        assert!(matches!(tokens[3].kind, TokenKind::TypeIdent(_)));
    }

    #[test]
    fn camel_value_name_is_diagnosed_with_hint() {
        let (_, diags) = lex_with_diags("fooBar = 1\n");
        let diag = diags.iter().find(|d| d.code == "E110").expect("casing error");
        assert!(diag.suggestions[0].contains("foo_bar"));
    }

    #[test]
    fn underscored_type_name_is_diagnosed_with_hint() {
        let (_, diags) = lex_with_diags("type Http_client is Integer\n");
        let diag = diags.iter().find(|d| d.code == "E110").expect("casing error");
        assert!(diag.suggestions[0].contains("HttpClient"));
    }

    #[test]
    fn numeric_literals() {
        let kinds = lex_kinds("42 1_000 1.5 0xff 0b1010 0o17\n");
        assert!(kinds.contains(&TokenKind::Integer(42)));
        assert!(kinds.contains(&TokenKind::Integer(1000)));
        assert!(kinds.contains(&TokenKind::Decimal(1.5)));
        assert!(kinds.contains(&TokenKind::Integer(255)));
        assert!(kinds.contains(&TokenKind::Integer(10)));
        assert!(kinds.contains(&TokenKind::Integer(15)));
    }

    #[test]
    fn range_does_not_eat_dot() {
        let kinds = lex_kinds("1..65535\n");
        assert_eq!(
            &kinds[..3],
            &[TokenKind::Integer(1), TokenKind::DotDot, TokenKind::Integer(65535)]
        );
    }

    #[test]
    fn plain_string_escapes() {
        let kinds = lex_kinds(r#""a\n\t\"\{b\}""#);
        match &kinds[0] {
            TokenKind::Str { kind: StrKind::Plain, pieces } => {
                assert_eq!(pieces, &[StrPiece::Text("a\n\t\"{b}".to_string())]);
            }
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn format_string_keeps_interpolation_tokens() {
        let kinds = lex_kinds("f\"port {p + 1} ok\"\n");
        match &kinds[0] {
            TokenKind::Str { kind: StrKind::Format, pieces } => {
                assert_eq!(pieces.len(), 3);
                assert_eq!(pieces[0], StrPiece::Text("port ".to_string()));
                match &pieces[1] {
                    StrPiece::Interp(tokens) => {
                        assert!(matches!(tokens[0].kind, TokenKind::Ident(_)));
                        assert_eq!(tokens[1].kind, TokenKind::Plus);
                        assert_eq!(tokens[2].kind, TokenKind::Integer(1));
                    }
                    other => panic!("expected interp, got {:?}", other),
                }
                assert_eq!(pieces[2], StrPiece::Text(" ok".to_string()));
            }
            other => panic!("expected format string, got {:?}", other),
        }
    }

    #[test]
    fn triple_string_spans_lines() {
        let kinds = lex_kinds("\"\"\"a \"quoted\"\nb\"\"\"\n");
        match &kinds[0] {
            TokenKind::Str { kind: StrKind::Triple, pieces } => {
                assert_eq!(pieces, &[StrPiece::Text("a \"quoted\"\nb".to_string())]);
            }
            other => panic!("expected triple string, got {:?}", other),
        }
    }

    #[test]
    fn raw_string_passes_bytes_through() {
        let kinds = lex_kinds(r#"r"a\nb""#);
        match &kinds[0] {
            TokenKind::Str { kind: StrKind::Raw, pieces } => {
                assert_eq!(pieces, &[StrPiece::Text("a\\nb".to_string())]);
            }
            other => panic!("expected raw string, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_is_diagnosed() {
        let (_, diags) = lex_with_diags("\"abc\n");
        assert!(diags.iter().any(|d| d.code == "E103"));
    }

    #[test]
    fn regex_after_operator_division_after_value() {
        let kinds = lex_kinds("x = /ab+c/\ny = a / b\n");
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Regex(r) if r == "ab+c")));
        assert!(kinds.contains(&TokenKind::Slash));
    }

    #[test]
    fn fail_bang_requires_adjacency() {
        let kinds = lex_kinds("read_file(path)! && !done\n");
        assert!(kinds.contains(&TokenKind::FailBang));
        assert!(kinds.contains(&TokenKind::Not));
    }

    #[test]
    fn bang_equals_is_not_equal() {
        let kinds = lex_kinds("a != b\n");
        assert!(kinds.contains(&TokenKind::NotEq));
    }

    #[test]
    fn doc_comment_attaches_text() {
        let kinds = lex_kinds("/// Checks an email.\nvalidates email(a String)\n");
        assert!(kinds
            .iter()
            .any(|k| matches!(k, TokenKind::DocComment(t) if t == "Checks an email.")));
    }

    #[test]
    fn line_comments_are_discarded() {
        let kinds = lex_kinds("x = 1 // trailing\n// whole line\ny = 2\n");
        assert!(!kinds.iter().any(|k| matches!(k, TokenKind::DocComment(_))));
        let newlines = kinds.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newlines, 2);
    }

    #[test]
    fn explain_rows_are_captured_verbatim() {
        let source = "explain\n    bound value from below using lo\n    return result\nfrom\n";
        let kinds = lex_kinds(source);
        let rows: Vec<_> = kinds
            .iter()
            .filter_map(|k| match k {
                TokenKind::RawRow(text) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(rows, vec!["bound value from below using lo", "return result"]);
        assert!(kinds.contains(&TokenKind::From));
    }

    #[test]
    fn explain_continuation_lines_join_rows() {
        let source = "explain\n    bound value from below\n        using lo\n    return result\nfrom\n";
        let kinds = lex_kinds(source);
        let rows: Vec<_> = kinds
            .iter()
            .filter_map(|k| match k {
                TokenKind::RawRow(text) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(rows, vec!["bound value from below using lo", "return result"]);
    }

    #[test]
    fn proof_rows_keep_identifier_prefix() {
        let source = "proof\n    bounded: result never exceeds hi\nfrom\n";
        let kinds = lex_kinds(source);
        assert!(kinds
            .iter()
            .any(|k| matches!(k, TokenKind::RawRow(t) if t == "bounded: result never exceeds hi")));
    }

    #[test]
    fn tokens_spans_stay_inside_source() {
        let source = "transforms clamp(x Integer) Integer\nfrom\n    x\n";
        let mut interner = Interner::new();
        let (tokens, _) = lex(source, FileId(0), &mut interner);
        for token in &tokens {
            assert!(token.span.start <= source.len());
            assert!(token.span.end <= source.len());
        }
    }
}
