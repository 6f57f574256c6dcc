//! Runtime error taxonomy for the Railway interpreter core.
//!
//! Every fallible operation in this crate returns [`RunResult<T>`]. Errors
//! carry an [`ErrorKind`] plus a message, and accumulate a call-stack trace
//! of `(frame name, thread number)` pairs as they unwind through nested
//! [`crate::scope::Scope`]s, mirroring `RailwayException.stack` in the
//! reference Railway interpreter.

use std::fmt;

use strum::{Display, EnumString, IntoStaticStr};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// The taxonomy of runtime errors a Railway program can raise.
///
/// Matches spec §7 exactly; the string form of each variant (via `strum`) is
/// what gets printed after the stack dump on an uncaught error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ErrorKind {
    /// Live non-output state remained in scope at function/uncall return.
    LeakedInformation,
    /// A name did not resolve to any variable visible from the current scope.
    UndefinedVariable,
    /// A name did not resolve to any function known to the current scope.
    UndefinedFunction,
    /// A non-mono name collided with an existing binding.
    NameClash,
    /// Out-of-bounds access, scalar-as-array indexing, bad shape, or an empty pop.
    IndexError,
    /// Array/scalar mismatch, array used as an index, or array used in a scalar op.
    TypeError,
    /// Bad argument shape/count, mismatched unlet value, for-loop divergence, bad tensor dims.
    ValueError,
    /// An if/fi or loop/pool boundary assertion did not hold.
    FailedAssertion,
    /// Time direction flipped while a mono variable was live.
    DirectionChange,
    /// An illegal operation (unlet, push, return, promote) on a borrowed or owned reference.
    ReferenceOwnership,
    /// Division or modulo by zero.
    ZeroError,
    /// Call arity or borrowed-argument-list mismatch.
    CallError,
    /// A mono argument was bound to a non-mono parameter.
    IllegalMono,
    /// A non-mono argument was bound to a mono parameter.
    ExpectedMono,
    /// A `try` iterator was exhausted without an uncaught attempt.
    ExhaustedTry,
    /// A backward `try` replay diverged from the exit value it was given.
    TryReverseError,
    /// A module import failed to load.
    ImportError,
    /// A thread entered a direction-aware mutex against the locked direction.
    MutexError,
    /// A worker unwound quietly after a sibling worker panicked.
    SympatheticError,
}

/// One frame of the call stack captured at raise time.
///
/// `thread_num` is `-1` outside any parallel call, matching the `TID()`
/// expression's behavior in non-parallel scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub name: String,
    pub thread_num: i64,
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.thread_num == -1 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} (TID:{})", self.name, self.thread_num)
        }
    }
}

/// A runtime error, carrying its kind, a human-readable message, and the
/// stack of frames it has unwound through so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub kind: ErrorKind,
    pub message: String,
    pub stack: Vec<StackFrame>,
}

impl RunError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stack: Vec::new(),
        }
    }

    /// Pushes one more frame onto the error's stack as it propagates outward.
    ///
    /// Called by [`crate::scope::Scope::wrap_error`] so every scope along the
    /// unwind path contributes its own `(name, thread_num)` pair, without the
    /// raising site needing to know how deep it sits in the call tree.
    #[must_use]
    pub fn with_frame(mut self, name: impl Into<String>, thread_num: i64) -> Self {
        self.stack.push(StackFrame {
            name: name.into(),
            thread_num,
        });
        self
    }

    /// Renders the `-> frame (TID:t)` stack dump followed by `Kind: message`,
    /// the format spec §6 requires on uncaught-error exit.
    #[must_use]
    pub fn render_stack(&self) -> String {
        let mut out = String::from("\nError Call Stack:\n");
        for frame in &self.stack {
            out.push_str("-> ");
            out.push_str(&frame.to_string());
            out.push('\n');
        }
        out.push_str(&format!("{}: {}", self.kind, self.message));
        out
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_kind_and_message() {
        let err = RunError::new(ErrorKind::ZeroError, "Dividing variable \"x\" by 0");
        assert_eq!(err.to_string(), "ZeroError: Dividing variable \"x\" by 0");
    }

    #[test]
    fn stack_frame_shows_tid_only_when_parallel() {
        let main = StackFrame {
            name: "main".into(),
            thread_num: -1,
        };
        assert_eq!(main.to_string(), "main");
        let worker = StackFrame {
            name: "worker".into(),
            thread_num: 2,
        };
        assert_eq!(worker.to_string(), "worker (TID:2)");
    }

    #[test]
    fn render_stack_lists_frames_outermost_last() {
        let err = RunError::new(ErrorKind::UndefinedVariable, "Variable \"x\" is undefined")
            .with_frame("inner", -1)
            .with_frame("main", -1);
        let rendered = err.render_stack();
        assert!(rendered.contains("-> inner\n-> main\n"));
        assert!(rendered.ends_with("UndefinedVariable: Variable \"x\" is undefined"));
    }
}
