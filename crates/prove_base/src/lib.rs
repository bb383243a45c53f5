//! # prove-base
//!
//! Structural atoms for the Prove compiler.
//!
//! This crate provides the foundational types every pipeline stage uses:
//!
//! - [`Span`]/[`FileId`] — source location tracking
//! - [`Interner`]/[`Symbol`] — string interning for O(1) identifier equality
//! - [`SourceMap`]/[`SourceFile`] — file registry with lazy line tables
//! - [`Diagnostic`]/[`DiagnosticBag`] — coded diagnostics with Rust-style
//!   and JSON rendering
//! - [`Style`] — ANSI styling with a plain mode for tests
//! - [`FatalError`] — the abort path for unrecoverable conditions
//!
//! # Design
//!
//! This crate knows nothing about Prove syntax or semantics. Higher crates
//! (`prove-language`, `prove-compile`) build on these atoms; keeping them
//! here means the lexer, checker, and emitter all speak the same span and
//! diagnostic vocabulary.

pub mod diag;
pub mod error;
pub mod intern;
pub mod source;
pub mod span;
pub mod style;

pub use diag::{Diagnostic, DiagnosticBag, Label, Severity};
pub use error::{FatalError, Result};
pub use intern::{Interner, Symbol};
pub use source::{Location, SourceFile, SourceMap};
pub use span::{FileId, Span};
pub use style::Style;
