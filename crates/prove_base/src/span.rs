//! Source location tracking for error reporting.
//!
//! A [`Span`] is a contiguous byte range inside one source file, identified
//! by a [`FileId`]. Every token, AST node, symbol, and diagnostic in the
//! Prove compiler carries a span, so errors can always point at the exact
//! bytes that caused them.
//!
//! # Byte Offsets
//!
//! Spans use byte offsets, not character indices. This matches Rust's string
//! slicing semantics: `&source[span.start..span.end]` extracts the spanned
//! text. Line and column numbers are computed lazily by the source map, never
//! stored here.

/// Identifies one registered source file inside a [`crate::source::SourceMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FileId(pub u32);

impl FileId {
    /// Returns the internal index, for dense per-file storage.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A byte-offset range in one source file.
///
/// Spans are `Copy` and cheap to pass around. Use [`Span::merge`] to combine
/// spans when building compound expressions; merging spans from different
/// files keeps the left file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub file: FileId,
    /// Byte offset of the first byte (inclusive).
    pub start: usize,
    /// Byte offset past the last byte (exclusive).
    pub end: usize,
}

impl Span {
    /// Creates a span from byte offsets. No validation is performed.
    pub fn new(file: FileId, start: usize, end: usize) -> Self {
        Self { file, start, end }
    }

    /// A zero-length span at a byte position, used for end-of-file tokens
    /// and synthesized nodes.
    pub fn point(file: FileId, at: usize) -> Self {
        Self { file, start: at, end: at }
    }

    /// Covers from the start of `self` to the end of `other`.
    ///
    /// The span of `a + b` is `a.span.merge(b.span)`.
    pub fn merge(self, other: Span) -> Span {
        Span {
            file: self.file,
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Length of the span in bytes.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns `true` if this span covers no bytes.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_new_stores_positions() {
        let span = Span::new(FileId(2), 5, 10);
        assert_eq!(span.file, FileId(2));
        assert_eq!(span.start, 5);
        assert_eq!(span.end, 10);
    }

    #[test]
    fn span_merge_combines_ranges() {
        let a = Span::new(FileId(0), 5, 10);
        let b = Span::new(FileId(0), 8, 15);
        let merged = a.merge(b);
        assert_eq!(merged.start, 5);
        assert_eq!(merged.end, 15);
    }

    #[test]
    fn span_point_is_empty() {
        let span = Span::point(FileId(0), 7);
        assert!(span.is_empty());
        assert_eq!(span.len(), 0);
    }

    #[test]
    fn span_len_saturates() {
        let span = Span::new(FileId(0), 10, 5);
        assert_eq!(span.len(), 0);
    }
}
