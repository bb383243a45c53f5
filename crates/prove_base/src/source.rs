//! Source file registry with lazy line/column computation.
//!
//! The first pipeline stage: raw byte buffers plus the bookkeeping needed to
//! turn a byte offset back into `file:line:col` for diagnostics. Line starts
//! are computed once per file, on first use, and cached.
//!
//! ```
//! use prove_base::{SourceMap, Span};
//!
//! let mut map = SourceMap::new();
//! let file = map.add_file("main.prv", "main()!\nfrom\n".to_string());
//! let loc = map.locate(Span::new(file, 8, 12));
//! assert_eq!((loc.line, loc.column), (2, 1));
//! ```

use std::cell::OnceCell;

use crate::span::{FileId, Span};

/// A resolved source position, 1-based, for human-facing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// One registered source file: name, contents, cached line-start table.
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    text: String,
    line_starts: OnceCell<Vec<usize>>,
}

impl SourceFile {
    fn new(name: impl Into<String>, text: String) -> Self {
        Self {
            name: name.into(),
            text,
            line_starts: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn line_starts(&self) -> &[usize] {
        self.line_starts.get_or_init(|| {
            let mut starts = vec![0];
            for (i, b) in self.text.bytes().enumerate() {
                if b == b'\n' {
                    starts.push(i + 1);
                }
            }
            starts
        })
    }

    /// Resolves a byte offset to a 1-based line/column pair.
    ///
    /// Columns count bytes from the line start; multi-byte characters are
    /// not widened. Offsets past the end of the file land on the last line.
    pub fn locate(&self, offset: usize) -> Location {
        let starts = self.line_starts();
        let line = match starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Location {
            line: (line + 1) as u32,
            column: (offset - starts[line] + 1) as u32,
        }
    }

    /// Returns the full text of a 1-based line, without its newline.
    pub fn line_text(&self, line: u32) -> &str {
        let starts = self.line_starts();
        let idx = (line as usize).saturating_sub(1);
        if idx >= starts.len() {
            return "";
        }
        let start = starts[idx];
        let end = starts
            .get(idx + 1)
            .map(|s| s - 1)
            .unwrap_or(self.text.len());
        self.text[start..end.max(start)].trim_end_matches('\r')
    }
}

/// Registry of every source file in a compilation run.
///
/// Files are append-only; [`FileId`]s index into the registry and stay valid
/// for the whole run.
#[derive(Default, Debug)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file and returns its id.
    pub fn add_file(&mut self, name: impl Into<String>, text: String) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(name, text));
        id
    }

    /// # Panics
    ///
    /// Panics if `id` was not produced by this map.
    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.index()]
    }

    /// Resolves the start of a span to `line:col` in its file.
    pub fn locate(&self, span: Span) -> Location {
        self.file(span.file).locate(span.start)
    }

    /// Extracts the spanned source text.
    pub fn snippet(&self, span: Span) -> &str {
        let text = self.file(span.file).text();
        let end = span.end.min(text.len());
        let start = span.start.min(end);
        &text[start..end]
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with(text: &str) -> (SourceMap, FileId) {
        let mut map = SourceMap::new();
        let id = map.add_file("test.prv", text.to_string());
        (map, id)
    }

    #[test]
    fn locate_first_line() {
        let (map, id) = map_with("abc\ndef\n");
        let loc = map.locate(Span::new(id, 1, 2));
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 2);
    }

    #[test]
    fn locate_second_line() {
        let (map, id) = map_with("abc\ndef\n");
        let loc = map.locate(Span::new(id, 4, 5));
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 1);
    }

    #[test]
    fn locate_at_newline_boundary() {
        let (map, id) = map_with("abc\ndef\n");
        // Offset 3 is the newline itself: still line 1.
        assert_eq!(map.locate(Span::new(id, 3, 4)).line, 1);
        // Offset 4 is the first byte of line 2.
        assert_eq!(map.locate(Span::new(id, 4, 4)).line, 2);
    }

    #[test]
    fn line_text_strips_newline() {
        let (map, id) = map_with("abc\ndef");
        assert_eq!(map.file(id).line_text(1), "abc");
        assert_eq!(map.file(id).line_text(2), "def");
        assert_eq!(map.file(id).line_text(9), "");
    }

    #[test]
    fn snippet_extracts_spanned_bytes() {
        let (map, id) = map_with("port as Port = 70000");
        assert_eq!(map.snippet(Span::new(id, 15, 20)), "70000");
    }

    #[test]
    fn snippet_clamps_out_of_range() {
        let (map, id) = map_with("ab");
        assert_eq!(map.snippet(Span::new(id, 1, 99)), "b");
    }
}
