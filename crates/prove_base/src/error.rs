//! Fatal errors that abort the pipeline.
//!
//! User mistakes become [`crate::diag::Diagnostic`]s and never stop a stage.
//! A [`FatalError`] is reserved for conditions the compiler cannot work
//! around: an unreadable source file, a poisoned internal invariant. It
//! carries a context trail so the driver can report where the abort came
//! from.

use std::fmt;
use std::io;

/// An unrecoverable compiler error with a context trail.
#[derive(Debug)]
pub struct FatalError {
    pub message: String,
    /// Outermost-last context frames, e.g. `["loading module net", "check"]`.
    pub context: Vec<String>,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Adds a context frame; used at each layer the error passes through.
    pub fn in_context(mut self, frame: impl Into<String>) -> Self {
        self.context.push(frame.into());
        self
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {}", self.message)?;
        for frame in &self.context {
            write!(f, "\n  while {}", frame)?;
        }
        Ok(())
    }
}

impl std::error::Error for FatalError {}

impl From<io::Error> for FatalError {
    fn from(err: io::Error) -> Self {
        FatalError::new(err.to_string())
    }
}

/// Alias for `std::result::Result<T, FatalError>`.
pub type Result<T> = std::result::Result<T, FatalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context_trail() {
        let err = FatalError::new("cannot read main.prv")
            .in_context("loading module main")
            .in_context("check");
        let text = err.to_string();
        assert!(text.contains("fatal: cannot read main.prv"));
        assert!(text.contains("while loading module main"));
        assert!(text.contains("while check"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: FatalError = io_err.into();
        assert!(err.message.contains("missing"));
    }
}
