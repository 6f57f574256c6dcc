//! Lexical scope for one running call frame.
//!
//! A [`Scope`] holds the local variables and mono bindings of a single
//! function activation (or the top-level module body), plus shared handles
//! to the program's globals, function table, and — inside a parallel call —
//! its [`ThreadManager`]. Grounded on the reference interpreter's `Scope`
//! class: locals are per-frame, globals and functions are shared by every
//! frame in the run, and `thread_num` threads through to give `TID()` its
//! answer.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::{
    ast::Function,
    error::{ErrorKind, RunError, RunResult},
    thread_manager::ThreadManager,
    value::Variable,
};

/// Variables promoted to module scope via `global`, shared by every frame.
pub type Globals = Arc<Mutex<IndexMap<String, Variable>>>;

/// The function table assembled at load time, shared read-only by every
/// frame for the rest of the run.
pub type FunctionTable = Arc<IndexMap<String, Arc<Function>>>;

/// One call frame's local variables, plus the shared context it was spawned
/// into.
#[derive(Debug)]
pub struct Scope {
    locals: IndexMap<String, Variable>,
    functions: FunctionTable,
    globals: Globals,
    /// `-1` outside any parallel call; the 0-based index of this thread
    /// among its siblings otherwise.
    thread_num: i64,
    thread_manager: Option<Arc<ThreadManager>>,
}

impl Scope {
    #[must_use]
    pub fn root(functions: FunctionTable) -> Self {
        Self {
            locals: IndexMap::new(),
            functions,
            globals: Arc::new(Mutex::new(IndexMap::new())),
            thread_num: -1,
            thread_manager: None,
        }
    }

    /// Builds the scope a fresh call frame runs in: no locals of its own yet
    /// (the caller populates parameters after this), but sharing this
    /// scope's globals and function table.
    #[must_use]
    pub fn child_frame(&self) -> Self {
        Self {
            locals: IndexMap::new(),
            functions: Arc::clone(&self.functions),
            globals: Arc::clone(&self.globals),
            thread_num: self.thread_num,
            thread_manager: self.thread_manager.clone(),
        }
    }

    /// Builds a scope sharing an already-assembled `functions`/`globals`
    /// pair rather than starting both empty. Used by the module driver: once
    /// for the top-level run (after import merging has produced the final
    /// function table and `argv` is about to be bound) and once per loaded
    /// file to evaluate its own global lines in isolation.
    #[must_use]
    pub fn for_globals(functions: FunctionTable, globals: Globals) -> Self {
        Self {
            locals: IndexMap::new(),
            functions,
            globals,
            thread_num: -1,
            thread_manager: None,
        }
    }

    /// Builds the scope one worker of a parallel call runs in: same as
    /// [`Scope::child_frame`], but pinned to `thread_num` and the parallel
    /// call's [`ThreadManager`].
    #[must_use]
    pub fn child_worker(&self, thread_num: i64, thread_manager: Arc<ThreadManager>) -> Self {
        Self {
            locals: IndexMap::new(),
            functions: Arc::clone(&self.functions),
            globals: Arc::clone(&self.globals),
            thread_num,
            thread_manager: Some(thread_manager),
        }
    }

    #[must_use]
    pub fn thread_num(&self) -> i64 {
        self.thread_num
    }

    #[must_use]
    pub fn thread_manager(&self) -> Option<&Arc<ThreadManager>> {
        self.thread_manager.as_ref()
    }

    #[must_use]
    pub fn lookup_func(&self, name: &str) -> Option<Arc<Function>> {
        self.functions.get(name).cloned()
    }

    #[must_use]
    pub fn has_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    pub fn local(&self, name: &str) -> RunResult<&Variable> {
        self.locals
            .get(name)
            .ok_or_else(|| RunError::new(ErrorKind::UndefinedVariable, format!("Variable \"{name}\" is undefined")))
    }

    pub fn local_mut(&mut self, name: &str) -> RunResult<&mut Variable> {
        self.locals
            .get_mut(name)
            .ok_or_else(|| RunError::new(ErrorKind::UndefinedVariable, format!("Variable \"{name}\" is undefined")))
    }

    /// Binds `name` to `var`, failing with [`ErrorKind::NameClash`] if the
    /// name is already bound locally. Used by `let`, `for`, and parameter
    /// binding, which must never silently shadow.
    pub fn bind(&mut self, name: &str, var: Variable) -> RunResult<()> {
        if self.locals.contains_key(name) {
            return Err(RunError::new(ErrorKind::NameClash, format!("Variable \"{name}\" already exists")));
        }
        self.locals.insert(name.to_string(), var);
        Ok(())
    }

    /// Removes and returns `name`'s binding, failing with
    /// [`ErrorKind::UndefinedVariable`] if it is not bound locally. Used by
    /// `unlet` and by the call machinery reclaiming a stolen return value.
    pub fn take(&mut self, name: &str) -> RunResult<Variable> {
        self.locals
            .shift_remove(name)
            .ok_or_else(|| RunError::new(ErrorKind::UndefinedVariable, format!("Variable \"{name}\" is undefined")))
    }

    /// All names currently bound, in insertion order — the "live non-output
    /// state" that a function or reversed call must be empty of on return,
    /// per the `LeakedInformation` check.
    pub fn local_names(&self) -> impl Iterator<Item = &str> {
        self.locals.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    /// Whether any currently bound local is mono — the condition that makes
    /// a direction change illegal at this point in the program.
    #[must_use]
    pub fn has_live_mono(&self) -> bool {
        self.locals.values().any(Variable::is_mono)
    }

    pub fn global(&self, name: &str) -> RunResult<Variable> {
        let globals = self.globals.lock().expect("globals mutex poisoned");
        globals
            .get(name)
            .cloned()
            .ok_or_else(|| RunError::new(ErrorKind::UndefinedVariable, format!("Global variable \"{name}\" is undefined")))
    }

    pub fn bind_global(&self, name: &str, var: Variable) -> RunResult<()> {
        let mut globals = self.globals.lock().expect("globals mutex poisoned");
        if globals.contains_key(name) {
            return Err(RunError::new(ErrorKind::NameClash, format!("Global variable \"{name}\" already exists")));
        }
        globals.insert(name.to_string(), var);
        Ok(())
    }

    pub fn take_global(&self, name: &str) -> RunResult<Variable> {
        let mut globals = self.globals.lock().expect("globals mutex poisoned");
        globals
            .shift_remove(name)
            .ok_or_else(|| RunError::new(ErrorKind::UndefinedVariable, format!("Global variable \"{name}\" is undefined")))
    }

    /// Wraps a propagating error with this frame's name and thread number,
    /// the call-stack bookkeeping every nested `eval`/`exec` performs on the
    /// way out, per spec §6's stack-dump format.
    #[must_use]
    pub fn wrap_error(&self, err: RunError, frame_name: &str) -> RunError {
        err.with_frame(frame_name, self.thread_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{rational::Rational, value::Cell};

    fn table() -> FunctionTable {
        Arc::new(IndexMap::new())
    }

    fn int(n: i64) -> Variable {
        Variable::owned(Cell::scalar(Rational::from_i64(n)))
    }

    #[test]
    fn bind_then_lookup_round_trips() {
        let mut scope = Scope::root(table());
        scope.bind("x", int(1)).unwrap();
        assert_eq!(scope.local("x").unwrap().snapshot(), Cell::scalar(Rational::from_i64(1)));
    }

    #[test]
    fn double_bind_is_name_clash() {
        let mut scope = Scope::root(table());
        scope.bind("x", int(1)).unwrap();
        let err = scope.bind("x", int(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameClash);
    }

    #[test]
    fn take_undefined_is_undefined_variable() {
        let mut scope = Scope::root(table());
        let err = scope.take("missing").unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedVariable);
    }

    #[test]
    fn child_frame_shares_globals_not_locals() {
        let mut scope = Scope::root(table());
        scope.bind("x", int(1)).unwrap();
        scope.bind_global("g", int(9)).unwrap();
        let child = scope.child_frame();
        assert!(!child.has_local("x"));
        assert_eq!(child.global("g").unwrap(), int(9));
    }

    #[test]
    fn wrap_error_pushes_frame_with_thread_num() {
        let scope = Scope::root(table());
        let err = RunError::new(ErrorKind::ZeroError, "boom");
        let wrapped = scope.wrap_error(err, "main");
        assert_eq!(wrapped.stack.last().unwrap().name, "main");
        assert_eq!(wrapped.stack.last().unwrap().thread_num, -1);
    }
}
