//! Resource limits guarding runaway recursion and runaway step counts.
//!
//! Grounded on the teacher's `resource::ResourceTracker` trait: callers pick a
//! tracker at construction time, with a no-limit default for free-running
//! programs and a limited tracker for sandboxed ones. Unlike the teacher's
//! version this carries no allocation/time/memory budget — this interpreter's
//! values are plain `Cell` trees with no garbage-collected heap behind them,
//! so only call depth and total statement-eval count need bounding.

use std::fmt;

use crate::error::{ErrorKind, RunError};

/// Caps on recursive call depth and total statement evaluations for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub max_call_depth: usize,
    pub max_steps: usize,
}

impl ResourceLimits {
    #[must_use]
    pub fn new(max_call_depth: usize, max_steps: usize) -> Self {
        Self { max_call_depth, max_steps }
    }
}

/// Raised by a [`ResourceTracker`] when a run exceeds one of its limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    Recursion { limit: usize, depth: usize },
    Steps { limit: usize, count: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recursion { limit, depth } => write!(f, "call depth {depth} exceeded limit {limit}"),
            Self::Steps { limit, count } => write!(f, "step count {count} exceeded limit {limit}"),
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for RunError {
    fn from(err: ResourceError) -> Self {
        RunError::new(ErrorKind::ValueError, err.to_string())
    }
}

/// Tracks resource usage across a run and decides when to stop it.
///
/// `on_call` is checked after each call-chain link pushes a new frame,
/// `on_step` after each statement evaluated, so depth and step limits are
/// enforced at the same points the teacher's `ResourceTracker` checks
/// allocation and operation budgets.
pub trait ResourceTracker: fmt::Debug {
    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError>;
    fn on_step(&mut self, count: usize) -> Result<(), ResourceError>;
}

/// Default tracker: never stops a run.
#[derive(Debug, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    fn on_call(&mut self, _depth: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    fn on_step(&mut self, _count: usize) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Enforces a fixed [`ResourceLimits`] budget.
#[derive(Debug)]
pub struct LimitedTracker(pub ResourceLimits);

impl ResourceTracker for LimitedTracker {
    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError> {
        if depth > self.0.max_call_depth {
            return Err(ResourceError::Recursion { limit: self.0.max_call_depth, depth });
        }
        Ok(())
    }

    fn on_step(&mut self, count: usize) -> Result<(), ResourceError> {
        if count > self.0.max_steps {
            return Err(ResourceError::Steps { limit: self.0.max_steps, count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_tracker_never_stops() {
        let mut t = NoLimitTracker;
        assert!(t.on_call(1_000_000).is_ok());
        assert!(t.on_step(1_000_000).is_ok());
    }

    #[test]
    fn limited_tracker_rejects_past_the_cap() {
        let mut t = LimitedTracker(ResourceLimits::new(2, 10));
        assert!(t.on_call(2).is_ok());
        let err = t.on_call(3).unwrap_err();
        assert_eq!(err, ResourceError::Recursion { limit: 2, depth: 3 });
    }

    #[test]
    fn resource_error_converts_to_value_error() {
        let err: RunError = ResourceError::Steps { limit: 5, count: 6 }.into();
        assert_eq!(err.kind, ErrorKind::ValueError);
    }
}
