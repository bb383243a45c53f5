//! Static analysis: canonical types, unification, and the type/verb
//! checker.
//!
//! - [`types`]: canonical [`types::Type`] values, modifier bags, the
//!   [`types::TypeRegistry`], and structural fingerprints
//! - [`unify`]: Robinson unification over [`unify::InferType`]
//! - [`check`]: the bidirectional checker producing the typed-AST side
//!   tables ([`check::CheckOutput`])

pub mod check;
pub mod types;
pub mod unify;

pub use check::{check_module, CheckOutput};
pub use types::{Type, TypeRegistry};
pub use unify::{InferType, UnificationTable};
