//! # prove-compile
//!
//! The semantic pipeline of the Prove compiler: name resolution, type and
//! verb checking, contract and proof verification, and C emission against
//! the fixed runtime ABI.
//!
//! ## Architecture
//!
//! ```text
//! AST (prove-language)
//!   │
//!   ├── resolve      symbol table keyed by (verb, name, param-type-key)
//!   │
//!   ├── analysis     bidirectional checking, refinement obligations,
//!   │                purity and fallibility, monomorphization table
//!   │
//!   ├── contracts    requires/ensures/explain/proof obligations,
//!   │                CNL row analysis, verification-chain coverage
//!   │
//!   └── codegen_c    tagged unions, retain/release insertion,
//!                    fail-propagation lowering, main wrapper
//! ```
//!
//! The [`compile`] module drives the stages per module and accumulates
//! diagnostics; `prove-cli` is a thin dispatcher over it.
//!
//! ## Example
//!
//! ```no_run
//! use prove_compile::compile::compile;
//! use prove_compile::manifest::Manifest;
//!
//! let manifest = Manifest::default();
//! let compilation = compile(&["app.prv"], &manifest).unwrap();
//! if compilation.success() {
//!     for unit in &compilation.units {
//!         println!("emitted {}.c", unit.name);
//!     }
//! }
//! ```

pub mod analysis;
pub mod codegen_c;
pub mod compile;
pub mod contracts;
pub mod manifest;
pub mod resolve;

pub use compile::{compile as compile_files, invoke_cc, write_units, Compilation};
pub use manifest::Manifest;
