//! # prove-language
//!
//! Surface syntax for the Prove language: the token vocabulary, the
//! indentation-sensitive lexer, the abstract syntax tree, and the parser.
//!
//! ## Pipeline position
//!
//! ```text
//! .prv bytes
//!     │
//!     ▼
//! ┌─────────┐     ┌──────────┐     ┌─────────┐
//! │  Lexer  │ ──▶ │  Tokens  │ ──▶ │ Parser  │ ──▶ AST
//! └─────────┘     └──────────┘     └─────────┘
//! ```
//!
//! Semantic analysis (resolution, type and verb checking, contracts) and C
//! emission live in `prove-compile`; this crate stops at a spanned AST plus
//! lexical/syntactic diagnostics.
//!
//! ## Example
//!
//! ```
//! use prove_base::{FileId, Interner};
//! use prove_language::{lexer, parser};
//!
//! let source = "main()!\nfrom\n    println(\"Hello from Prove!\")\n";
//! let mut interner = Interner::new();
//! let name = interner.intern("hello");
//! let (tokens, lex_diags) = lexer::lex(source, FileId(0), &mut interner);
//! let (module, parse_diags) = parser::parse_module(&tokens, FileId(0), name, &interner);
//!
//! assert!(lex_diags.is_empty() && parse_diags.is_empty());
//! assert_eq!(module.mains.len(), 1);
//! ```

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Module, Verb};
pub use lexer::lex;
pub use parser::parse_module;
pub use token::{StrKind, StrPiece, Token, TokenKind};
