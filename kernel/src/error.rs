/*
 * Process Management Errors
 *
 * Recoverable failures reported by the life-cycle manager and the priority
 * and ticket accounting. Broken scheduler invariants are not errors: they
 * panic, since no caller can continue past them.
 */

use core::fmt;

/// Errors returned by process operations
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProcError {
    /// No free process slot, or a trap frame / address space / ticket
    /// allocation failed
    ResourceExhausted,
    /// Argument out of range (priority outside [0,100], negative ticks)
    InvalidArgument,
    /// No live process has the requested pid
    NotFound,
    /// `wait` with no children, or the caller was killed
    NoChildren,
    /// Copying a result into the caller's address space failed
    BadAddress,
    /// The caller was killed while sleeping
    Killed,
}

impl fmt::Display for ProcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcError::ResourceExhausted => write!(f, "Out of process resources"),
            ProcError::InvalidArgument => write!(f, "Invalid argument"),
            ProcError::NotFound => write!(f, "No such process"),
            ProcError::NoChildren => write!(f, "No child processes"),
            ProcError::BadAddress => write!(f, "Bad address"),
            ProcError::Killed => write!(f, "Process killed"),
        }
    }
}
