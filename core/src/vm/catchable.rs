//! Catchable signals and the error types that carry them across Rust frames.
//!
//! A raised catchable is stored on the VM and every Rust frame between the raise
//! site and the handler sees only the [`Unwinding`] marker, propagated with `?`.
//! `listen` and the top-level entry points take the payload back out of the VM.

use std::fmt;
use std::rc::Rc;

use crate::val::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchableKind {
    Error,
    Send,
}

/// A pending catchable: what was raised and where.
#[derive(Debug, Clone)]
pub struct Catchable {
    pub kind: CatchableKind,
    pub payload: Value,
    pub file: Rc<str>,
    pub line: u32,
}

impl Catchable {
    #[inline]
    pub fn is_error(&self) -> bool {
        self.kind == CatchableKind::Error
    }
}

/// Marker error: a catchable is pending on the VM.
#[derive(Debug, Clone, Copy)]
pub struct Unwinding;

impl fmt::Display for Unwinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("catchable pending")
    }
}

impl std::error::Error for Unwinding {}

/// Unrecoverable failure. Never converted into a catchable.
#[derive(Debug, Clone)]
pub struct FatalError(pub String);

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal: {}", self.0)
    }
}

impl std::error::Error for FatalError {}

/// An error catchable that reached an empty call stack. The error object
/// itself stays on the VM, see [`Vm::last_unhandled`](super::Vm::last_unhandled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledError {
    pub file: String,
    pub line: u32,
    pub summary: String,
}

impl fmt::Display for UnhandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled error ({}:{}): {}", self.file, self.line, self.summary)
    }
}

impl std::error::Error for UnhandledError {}
