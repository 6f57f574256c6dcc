//! Execution tracing hooks.
//!
//! Grounded on the teacher's `tracer::VmTracer` trait, scaled down to this
//! interpreter's statement-tree model: a tracer is invoked at statement-eval
//! and call-chain boundaries rather than at bytecode dispatch. [`NoopTracer`]
//! is the production default and costs one dynamic dispatch per hook;
//! [`RecordingTracer`] and [`StderrTracer`] exist for tests and interactive
//! debugging.

use std::fmt;

/// One traced execution event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Stmt { label: &'static str, direction_forward: bool },
    Call { function_name: String, depth: usize },
    Return { function_name: String, depth: usize },
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stmt { label, direction_forward } => {
                write!(f, "stmt {label} ({})", if *direction_forward { "fwd" } else { "bwd" })
            }
            Self::Call { function_name, depth } => write!(f, "call {function_name} @{depth}"),
            Self::Return { function_name, depth } => write!(f, "return {function_name} @{depth}"),
        }
    }
}

/// Hooked at statement-eval and call-chain boundaries. All methods default to
/// no-ops so implementations only override the events they care about.
pub trait VmTracer {
    fn on_stmt(&mut self, _label: &'static str, _direction_forward: bool) {}
    fn on_call(&mut self, _function_name: &str, _depth: usize) {}
    fn on_return(&mut self, _function_name: &str, _depth: usize) {}
}

/// Zero-behavior tracer for production runs.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Writes each event to stderr as it happens.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl VmTracer for StderrTracer {
    fn on_stmt(&mut self, label: &'static str, direction_forward: bool) {
        eprintln!("{}", TraceEvent::Stmt { label, direction_forward });
    }

    fn on_call(&mut self, function_name: &str, depth: usize) {
        eprintln!("{}", TraceEvent::Call { function_name: function_name.to_string(), depth });
    }

    fn on_return(&mut self, function_name: &str, depth: usize) {
        eprintln!("{}", TraceEvent::Return { function_name: function_name.to_string(), depth });
    }
}

/// Records every event for later inspection — used by tests asserting on
/// call/return shape and by post-mortem debugging.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VmTracer for RecordingTracer {
    fn on_stmt(&mut self, label: &'static str, direction_forward: bool) {
        self.events.push(TraceEvent::Stmt { label, direction_forward });
    }

    fn on_call(&mut self, function_name: &str, depth: usize) {
        self.events.push(TraceEvent::Call { function_name: function_name.to_string(), depth });
    }

    fn on_return(&mut self, function_name: &str, depth: usize) {
        self.events.push(TraceEvent::Return { function_name: function_name.to_string(), depth });
    }
}
