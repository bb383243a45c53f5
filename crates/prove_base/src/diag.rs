//! Coded diagnostics with source spans and Rust-style rendering.
//!
//! Every pipeline stage appends [`Diagnostic`]s to a shared [`DiagnosticBag`]
//! and keeps going; the driver renders the whole bag at the end of the run.
//! Codes follow the `Exyz` / `Wxyz` convention from the language reference
//! (`E361`, `W322`, ...).
//!
//! # Render format
//!
//! ```text
//! error[E365]: duplicate function identity
//!  --> net.prv:12:1
//!    |
//! 12 | inputs fetch(url String) Response!
//!    | ^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^^ already declared at line 4
//!    = note: functions are identified by (verb, name, parameter types)
//!    try: rename one of the declarations
//! ```
//!
//! `render_json` emits one JSON object per diagnostic for editor tooling.

use std::fmt::Write as _;

use serde::Serialize;

use crate::source::SourceMap;
use crate::span::Span;
use crate::style::Style;

/// How bad a diagnostic is. Errors gate later pipeline stages; warnings and
/// notes never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// A secondary span with its own message, rendered under the primary excerpt.
#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
}

/// One diagnostic: code, severity, message, primary span, extras.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    pub span: Span,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Error, message, span)
    }

    pub fn warning(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Warning, message, span)
    }

    pub fn note(code: &'static str, message: impl Into<String>, span: Span) -> Self {
        Self::new(code, Severity::Note, message, span)
    }

    fn new(code: &'static str, severity: Severity, message: impl Into<String>, span: Span) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            span,
            labels: Vec::new(),
            notes: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: message.into() });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// Append-only diagnostic accumulator for one compilation run.
#[derive(Default, Debug)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        if diag.severity == Severity::Error {
            self.error_count += 1;
        }
        self.diagnostics.push(diag);
    }

    pub fn extend(&mut self, diags: impl IntoIterator<Item = Diagnostic>) {
        for d in diags {
            self.push(d);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

// ============================================================================
// Text rendering
// ============================================================================

fn severity_header(severity: Severity, style: &Style) -> String {
    match severity {
        Severity::Error => style.bold_red("error"),
        Severity::Warning => style.bold_yellow("warning"),
        Severity::Note => style.bold("note"),
    }
}

/// Renders one diagnostic in the Rust compiler's arrow-and-caret format.
pub fn render(diag: &Diagnostic, sources: &SourceMap, style: &Style) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}[{}]: {}",
        severity_header(diag.severity, style),
        diag.code,
        style.bold(&diag.message)
    );

    let loc = sources.locate(diag.span);
    let file = sources.file(diag.span.file);
    let _ = writeln!(
        out,
        " {} {}:{}:{}",
        style.blue("-->"),
        file.name(),
        loc.line,
        loc.column
    );

    let gutter = loc.line.to_string().len().max(2);
    let _ = writeln!(out, "{:gutter$} {}", "", style.blue("|"), gutter = gutter);

    let line_text = file.line_text(loc.line);
    let _ = writeln!(
        out,
        "{:>gutter$} {} {}",
        style.blue(&loc.line.to_string()),
        style.blue("|"),
        line_text,
        gutter = gutter
    );

    // Caret underline, clamped to the primary line.
    let caret_start = (loc.column as usize).saturating_sub(1);
    let caret_len = diag.span.len().max(1).min(line_text.len().saturating_sub(caret_start).max(1));
    let mut underline = " ".repeat(caret_start);
    underline.push_str(&"^".repeat(caret_len));
    let styled_underline = match diag.severity {
        Severity::Error => style.bold_red(&underline),
        Severity::Warning => style.bold_yellow(&underline),
        Severity::Note => style.bold(&underline),
    };
    let _ = writeln!(out, "{:gutter$} {} {}", "", style.blue("|"), styled_underline, gutter = gutter);

    for label in &diag.labels {
        let lloc = sources.locate(label.span);
        let lfile = sources.file(label.span.file);
        let _ = writeln!(
            out,
            "{:gutter$} {} {} ({}:{}:{})",
            "",
            style.blue("|"),
            label.message,
            lfile.name(),
            lloc.line,
            lloc.column,
            gutter = gutter
        );
    }
    for note in &diag.notes {
        let _ = writeln!(out, "{:gutter$} = note: {}", "", note, gutter = gutter);
    }
    for suggestion in &diag.suggestions {
        let _ = writeln!(out, "{:gutter$} {}: {}", "", style.cyan("try"), suggestion, gutter = gutter);
    }

    out
}

/// Renders every diagnostic in the bag, separated by blank lines.
pub fn render_all(bag: &DiagnosticBag, sources: &SourceMap, style: &Style) -> String {
    let mut out = String::new();
    for diag in bag.iter() {
        out.push_str(&render(diag, sources, style));
        out.push('\n');
    }
    out
}

// ============================================================================
// JSON rendering
// ============================================================================

#[derive(Serialize)]
struct JsonSpan {
    file: String,
    line: u32,
    column: u32,
    start: usize,
    end: usize,
}

#[derive(Serialize)]
struct JsonLabel {
    message: String,
    span: JsonSpan,
}

#[derive(Serialize)]
struct JsonDiagnostic<'a> {
    code: &'a str,
    severity: Severity,
    message: &'a str,
    span: JsonSpan,
    labels: Vec<JsonLabel>,
    notes: &'a [String],
    suggestions: &'a [String],
}

fn json_span(span: Span, sources: &SourceMap) -> JsonSpan {
    let loc = sources.locate(span);
    JsonSpan {
        file: sources.file(span.file).name().to_string(),
        line: loc.line,
        column: loc.column,
        start: span.start,
        end: span.end,
    }
}

/// Renders one diagnostic as a single-line JSON object.
pub fn render_json(diag: &Diagnostic, sources: &SourceMap) -> String {
    let payload = JsonDiagnostic {
        code: diag.code,
        severity: diag.severity,
        message: &diag.message,
        span: json_span(diag.span, sources),
        labels: diag
            .labels
            .iter()
            .map(|l| JsonLabel {
                message: l.message.clone(),
                span: json_span(l.span, sources),
            })
            .collect(),
        notes: &diag.notes,
        suggestions: &diag.suggestions,
    };
    serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    fn setup() -> (SourceMap, FileId) {
        let mut map = SourceMap::new();
        let id = map.add_file("test.prv", "port as Port = 70000\n".to_string());
        (map, id)
    }

    #[test]
    fn bag_counts_errors_only() {
        let mut bag = DiagnosticBag::new();
        bag.push(Diagnostic::warning("W322", "redundant near_miss", Span::default()));
        assert!(!bag.has_errors());
        bag.push(Diagnostic::error("E361", "fail marker on pure verb", Span::default()));
        assert!(bag.has_errors());
        assert_eq!(bag.error_count(), 1);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn render_includes_code_location_and_carets() {
        let (map, id) = setup();
        let diag = Diagnostic::error("E310", "refinement violated", Span::new(id, 15, 20))
            .with_note("Port is Integer where 1..65535")
            .with_suggestion("clamp(70000, 1, 65535)");
        let out = render(&diag, &map, &Style::plain());
        assert!(out.contains("error[E310]: refinement violated"));
        assert!(out.contains("--> test.prv:1:16"));
        assert!(out.contains("^^^^^"));
        assert!(out.contains("= note: Port is Integer where 1..65535"));
        assert!(out.contains("try: clamp(70000, 1, 65535)"));
    }

    #[test]
    fn render_json_is_valid_json() {
        let (map, id) = setup();
        let diag = Diagnostic::error("E310", "refinement violated", Span::new(id, 15, 20));
        let out = render_json(&diag, &map);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["code"], "E310");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["span"]["line"], 1);
        assert_eq!(value["span"]["column"], 16);
    }

    #[test]
    fn warning_renders_with_warning_header() {
        let (map, id) = setup();
        let diag = Diagnostic::warning("W321", "obligation names no concept", Span::new(id, 0, 4));
        let out = render(&diag, &map, &Style::plain());
        assert!(out.starts_with("warning[W321]"));
    }
}
