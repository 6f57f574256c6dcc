//! Statement execution: the reversible core of the interpreter.
//!
//! Every statement runs under a [`Direction`] and hands back the direction
//! the rest of its enclosing block should continue in — almost always
//! unchanged, except for `do`/`yield`/`undo`, `try`, loop/pool, and call
//! chains, which may flip it. [`run_block`] is the shared driver every
//! construct with a nested body (function bodies, `if`/`fi` branches,
//! `loop`/`pool`, `for`, `try`, `do`/`undo`, `mutex`) calls into, and is
//! where the direction-change guard lives: a block may never flip direction
//! while a mono variable is alive in its scope, per the ownership discipline
//! mono variables exist to enforce.

use std::borrow::Cow;

use crate::{
    ast::{ModOp, Path, Stmt},
    error::{ErrorKind, RunError, RunResult},
    expr::{eval, eval_index, eval_scalar, navigate, navigate_mut},
    io::PrintWriter,
    rational::Rational,
    resource::{NoLimitTracker, ResourceTracker},
    scope::Scope,
    tracer::{NoopTracer, VmTracer},
    value::{Cell, Variable},
};

/// Which way a block of statements is currently running: forward (the
/// program's natural sense) or backward (uncalling it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Forward => Self::Backward,
            Self::Backward => Self::Forward,
        }
    }

    #[must_use]
    pub fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }
}

/// Execution context threaded through a run: the output sink, a side channel
/// `try` uses to learn whether the `catch` statement at the end of its body
/// was satisfied, a resource tracker guarding call depth and step count, and
/// a tracer notified at statement and call-chain boundaries.
pub struct ExecCtx<'a> {
    pub printer: &'a mut dyn PrintWriter,
    catch_result: Option<bool>,
    depth: usize,
    steps: usize,
    resource: Box<dyn ResourceTracker + 'a>,
    tracer: Box<dyn VmTracer + 'a>,
}

impl<'a> ExecCtx<'a> {
    #[must_use]
    pub fn new(printer: &'a mut dyn PrintWriter) -> Self {
        Self {
            printer,
            catch_result: None,
            depth: 0,
            steps: 0,
            resource: Box::new(NoLimitTracker),
            tracer: Box::new(NoopTracer),
        }
    }

    #[must_use]
    pub fn with_resource_tracker(printer: &'a mut dyn PrintWriter, resource: Box<dyn ResourceTracker + 'a>) -> Self {
        Self {
            printer,
            catch_result: None,
            depth: 0,
            steps: 0,
            resource,
            tracer: Box::new(NoopTracer),
        }
    }

    #[must_use]
    pub fn with_tracer(printer: &'a mut dyn PrintWriter, tracer: Box<dyn VmTracer + 'a>) -> Self {
        Self {
            printer,
            catch_result: None,
            depth: 0,
            steps: 0,
            resource: Box::new(NoLimitTracker),
            tracer,
        }
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Records one more call frame pushed, failing if the resource tracker's
    /// call-depth budget is now exceeded.
    pub(crate) fn enter_call(&mut self, function_name: &str) -> RunResult<()> {
        self.depth += 1;
        self.resource.on_call(self.depth).map_err(RunError::from)?;
        self.tracer.on_call(function_name, self.depth);
        Ok(())
    }

    pub(crate) fn exit_call(&mut self, function_name: &str) {
        self.tracer.on_return(function_name, self.depth);
        self.depth -= 1;
    }

    /// Records one statement having run, failing if the resource tracker's
    /// step-count budget is now exceeded.
    fn tick(&mut self, label: &'static str, direction_forward: bool) -> RunResult<()> {
        self.steps += 1;
        self.resource.on_step(self.steps).map_err(RunError::from)?;
        self.tracer.on_stmt(label, direction_forward);
        Ok(())
    }
}

/// Runs `stmts` under `direction`, returning the direction execution ends
/// in. Statements run in source order going forward, reverse order going
/// backward; each statement is itself handed the current direction and may
/// change it for the remainder of the block.
pub fn run_block(stmts: &[Stmt], scope: &mut Scope, direction: Direction, ctx: &mut ExecCtx) -> RunResult<Direction> {
    let mut current = direction;
    let indices: Box<dyn Iterator<Item = usize>> =
        if direction.is_forward() { Box::new(0..stmts.len()) } else { Box::new((0..stmts.len()).rev()) };
    for i in indices {
        ctx.tick(stmts[i].label(), current.is_forward())?;
        let next = exec_stmt(&stmts[i], scope, current, ctx)?;
        if next != current && scope.has_live_mono() {
            return Err(RunError::new(ErrorKind::DirectionChange, "time direction changed while a mono variable was live"));
        }
        current = next;
    }
    Ok(current)
}

fn exec_stmt(stmt: &Stmt, scope: &mut Scope, direction: Direction, ctx: &mut ExecCtx) -> RunResult<Direction> {
    match stmt {
        Stmt::Let { name, expr, is_mono, .. } => exec_let(name, expr, *is_mono, direction, scope),
        Stmt::Unlet { name, expr, is_mono, .. } => exec_unlet(name, expr, *is_mono, direction, scope),
        Stmt::Modop { target, op, expr, is_mono, .. } => exec_modop(target, *op, expr, *is_mono, direction, scope),
        Stmt::Swap { left, right, .. } => exec_swap(left, right, direction, scope),
        Stmt::Push { src, dst, is_mono, .. } => exec_push(src, dst, *is_mono, direction, scope),
        Stmt::Pop { src, dst, is_mono, .. } => exec_pop(src, dst, *is_mono, direction, scope),
        Stmt::Promote { src, dst, .. } => exec_promote(src, dst, direction, scope),
        Stmt::If { entry_cond, exit_cond, then_body, else_body, is_mono, mod_reverse, .. } => {
            exec_if(entry_cond, exit_cond, then_body, else_body, *is_mono, *mod_reverse, direction, scope, ctx)
        }
        Stmt::Loop { forward_cond, backward_cond, body, is_mono, mod_reverse, .. } => {
            exec_loop(forward_cond, backward_cond, body, *is_mono, *mod_reverse, direction, scope, ctx)
        }
        Stmt::For { var, var_is_mono, iterable, body, .. } => exec_for(var, *var_is_mono, iterable, body, direction, scope, ctx),
        Stmt::DoUndo { do_body, yield_body, .. } => exec_do_undo(do_body, yield_body, direction, scope, ctx),
        Stmt::Try { var, iterable, body, .. } => exec_try(var, iterable, body, direction, scope, ctx),
        Stmt::Catch { cond, .. } => {
            if !direction.is_forward() {
                return Ok(direction);
            }
            ctx.catch_result = Some(eval(cond, scope)?.is_truthy());
            Ok(direction)
        }
        Stmt::Print { args, newline, .. } => exec_print(args, *newline, direction, scope, ctx),
        Stmt::Barrier { name, .. } => exec_barrier(name, direction, scope),
        Stmt::Mutex { name, body, .. } => exec_mutex(name, body, direction, scope, ctx),
        Stmt::CallChain { in_params, calls, out_params, is_mono, .. } => {
            crate::call::exec_call_chain(in_params, calls, out_params, *is_mono, direction, scope, ctx)
        }
        Stmt::Global { name, expr, is_mono, .. } => exec_global(name, expr, *is_mono, direction, scope),
        Stmt::Import { .. } => Err(RunError::new(ErrorKind::ImportError, "import statements may only run while a module is loading")),
    }
}

fn bind_new(name: &str, expr: &crate::ast::Expr, is_mono: bool, scope: &mut Scope) -> RunResult<()> {
    let value = eval(expr, scope)?;
    scope.bind(name, Variable::new(value, is_mono, false))
}

fn unbind_checked(name: &str, expr: &crate::ast::Expr, scope: &mut Scope) -> RunResult<()> {
    let expected = eval(expr, scope)?;
    let actual = scope.take(name)?;
    if !actual.snapshot().structurally_eq(&expected) {
        return Err(RunError::new(
            ErrorKind::ValueError,
            format!("unlet value for \"{name}\" does not match its current value"),
        ));
    }
    Ok(())
}

fn exec_let(name: &str, expr: &crate::ast::Expr, is_mono: bool, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    match direction {
        Direction::Forward => bind_new(name, expr, is_mono, scope)?,
        Direction::Backward if is_mono => {}
        Direction::Backward => unbind_checked(name, expr, scope)?,
    }
    Ok(direction)
}

fn exec_unlet(name: &str, expr: &crate::ast::Expr, is_mono: bool, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    match direction {
        Direction::Forward => unbind_checked(name, expr, scope)?,
        Direction::Backward if is_mono => {}
        Direction::Backward => bind_new(name, expr, is_mono, scope)?,
    }
    Ok(direction)
}

fn apply_modop(op: ModOp, current: &Rational, rhs: &Rational) -> RunResult<Rational> {
    Ok(match op {
        ModOp::Add => current.add(rhs),
        ModOp::Sub => current.sub(rhs),
        ModOp::Mul => current.mul(rhs),
        ModOp::Div => current.div(rhs)?,
        ModOp::FloorDiv => current.floor_div(rhs)?,
        ModOp::Pow => current.pow(rhs)?,
        ModOp::Mod => current.modulo(rhs)?,
        ModOp::Xor => Rational::from_bool(current.is_truthy() ^ rhs.is_truthy()),
        ModOp::Or => Rational::from_bool(current.is_truthy() || rhs.is_truthy()),
        ModOp::And => Rational::from_bool(current.is_truthy() && rhs.is_truthy()),
    })
}

fn exec_modop(target: &Path, op: ModOp, expr: &crate::ast::Expr, is_mono: bool, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    if !direction.is_forward() && is_mono {
        return Ok(direction);
    }
    let rhs = eval_scalar(expr, scope)?;
    let effective_op = if direction.is_forward() {
        op
    } else {
        if op.inverse() == op && !is_mono {
            return Err(RunError::new(
                ErrorKind::ValueError,
                "this operator has no defined inverse outside a mono context",
            ));
        }
        op.inverse()
    };
    let path = eval_index(&target.index, scope)?;
    let var = scope.local(&target.name)?;
    var.with_memory_mut(|cell| -> RunResult<()> {
        let slot = navigate_mut(cell, &path)?;
        let current = slot
            .as_scalar()
            .cloned()
            .ok_or_else(|| RunError::new(ErrorKind::TypeError, "modop target is not a scalar"))?;
        *slot = Cell::scalar(apply_modop(effective_op, &current, &rhs)?);
        Ok(())
    })?;
    Ok(direction)
}

fn exec_swap(left: &Path, right: &Path, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    let left_path = eval_index(&left.index, scope)?;
    let right_path = eval_index(&right.index, scope)?;
    let left_var = scope.local(&left.name)?.clone();
    let right_var = scope.local(&right.name)?.clone();
    let left_val = left_var.with_memory(|c| navigate(c, &left_path).cloned())?;
    let right_val = right_var.with_memory(|c| navigate(c, &right_path).cloned())?;
    left_var.with_memory_mut(|c| -> RunResult<()> {
        *navigate_mut(c, &left_path)? = right_val;
        Ok(())
    })?;
    right_var.with_memory_mut(|c| -> RunResult<()> {
        *navigate_mut(c, &right_path)? = left_val;
        Ok(())
    })?;
    Ok(direction)
}

fn do_push(src_name: &str, dst: &Path, is_mono: bool, scope: &mut Scope) -> RunResult<()> {
    let var = scope.take(src_name)?;
    if var.is_borrowed() {
        return Err(RunError::new(ErrorKind::ReferenceOwnership, format!("cannot push borrowed variable \"{src_name}\"")));
    }
    if var.is_mono() != is_mono {
        return Err(RunError::new(ErrorKind::ValueError, format!("mono-ness mismatch pushing \"{src_name}\"")));
    }
    let value = var.snapshot();
    let path = eval_index(&dst.index, scope)?;
    let dst_var = scope.local(&dst.name)?;
    dst_var.with_memory_mut(|cell| -> RunResult<()> {
        let slot = navigate_mut(cell, &path)?;
        let arr = slot.as_array_mut().ok_or_else(|| RunError::new(ErrorKind::TypeError, "push target is not an array"))?;
        arr.push(value);
        Ok(())
    })
}

fn do_pop(src: &Path, dst_name: &str, is_mono: bool, scope: &mut Scope) -> RunResult<()> {
    let path = eval_index(&src.index, scope)?;
    let src_var = scope.local(&src.name)?;
    let popped = src_var.with_memory_mut(|cell| -> RunResult<Cell> {
        let slot = navigate_mut(cell, &path)?;
        let arr = slot.as_array_mut().ok_or_else(|| RunError::new(ErrorKind::TypeError, "pop source is not an array"))?;
        arr.pop().ok_or_else(|| RunError::new(ErrorKind::IndexError, "cannot pop from an empty array"))
    })?;
    scope.bind(dst_name, Variable::new(popped, is_mono, false))
}

fn exec_push(src: &str, dst: &Path, is_mono: bool, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    match direction {
        Direction::Forward => do_push(src, dst, is_mono, scope)?,
        Direction::Backward if is_mono => {}
        Direction::Backward => do_pop(dst, src, is_mono, scope)?,
    }
    Ok(direction)
}

fn exec_pop(src: &Path, dst: &str, is_mono: bool, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    match direction {
        Direction::Forward => do_pop(src, dst, is_mono, scope)?,
        Direction::Backward if is_mono => {}
        Direction::Backward => do_push(dst, src, is_mono, scope)?,
    }
    Ok(direction)
}

fn exec_promote(src: &str, dst: &str, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    match direction {
        Direction::Forward => {
            let mut var = scope.take(src)?;
            if !var.is_mono() {
                return Err(RunError::new(ErrorKind::ValueError, format!("cannot promote non-mono variable \"{src}\"")));
            }
            var.strip_mono();
            scope.bind(dst, var)?;
        }
        Direction::Backward => {
            let mut var = scope.take(dst)?;
            if var.is_mono() {
                return Err(RunError::new(ErrorKind::ValueError, format!("cannot un-promote already-mono variable \"{dst}\"")));
            }
            var.set_is_mono(true);
            scope.bind(src, var)?;
        }
    }
    Ok(direction)
}

#[allow(clippy::too_many_arguments)]
fn exec_if(
    entry_cond: &crate::ast::Expr,
    exit_cond: &crate::ast::Expr,
    then_body: &[Stmt],
    else_body: &[Stmt],
    is_mono: bool,
    mod_reverse: bool,
    direction: Direction,
    scope: &mut Scope,
    ctx: &mut ExecCtx,
) -> RunResult<Direction> {
    if !direction.is_forward() && !mod_reverse {
        return Ok(direction);
    }
    let check_first = if direction.is_forward() { entry_cond } else { exit_cond };
    let took_then = eval(check_first, scope)?.is_truthy();
    let branch = if took_then { then_body } else { else_body };
    let result_dir = run_block(branch, scope, direction, ctx)?;
    if !is_mono {
        let check_second = if result_dir.is_forward() { exit_cond } else { entry_cond };
        let confirmed = eval(check_second, scope)?.is_truthy();
        if confirmed != took_then {
            return Err(RunError::new(ErrorKind::FailedAssertion, "if/fi exit assertion did not match the branch taken"));
        }
    }
    Ok(result_dir)
}

#[allow(clippy::too_many_arguments)]
fn exec_loop(
    forward_cond: &crate::ast::Expr,
    backward_cond: &crate::ast::Expr,
    body: &[Stmt],
    is_mono: bool,
    mod_reverse: bool,
    direction: Direction,
    scope: &mut Scope,
    ctx: &mut ExecCtx,
) -> RunResult<Direction> {
    if !direction.is_forward() && !mod_reverse {
        return Ok(direction);
    }
    let mut current = direction;
    let (mut condition, mut assertion) =
        if current.is_forward() { (forward_cond, backward_cond) } else { (backward_cond, forward_cond) };
    if !is_mono && eval(assertion, scope)?.is_truthy() {
        return Err(RunError::new(ErrorKind::FailedAssertion, "loop reverse condition is true before loop start"));
    }
    while eval(condition, scope)?.is_truthy() {
        current = run_block(body, scope, current, ctx)?;
        (condition, assertion) = if current.is_forward() { (forward_cond, backward_cond) } else { (backward_cond, forward_cond) };
        if !is_mono && !eval(assertion, scope)?.is_truthy() {
            return Err(RunError::new(ErrorKind::FailedAssertion, "forward loop condition holds when reverse condition does not"));
        }
    }
    Ok(current)
}

/// `for` binds a deep copy of each element as a borrowed variable purely to
/// block unlet/push/promote/escape through it, then checks after the body
/// runs that its value still structurally matches the original iterator
/// element — the iterator array itself is never mutated through the loop
/// variable.
fn exec_for(
    var: &str,
    var_is_mono: bool,
    iterable: &crate::ast::Expr,
    body: &[Stmt],
    direction: Direction,
    scope: &mut Scope,
    ctx: &mut ExecCtx,
) -> RunResult<Direction> {
    let value = eval(iterable, scope)?;
    let elements = match value {
        Cell::Array(items) => items,
        Cell::Scalar(_) => return Err(RunError::new(ErrorKind::TypeError, "for loop iterable must be an array")),
    };
    let indices: Box<dyn Iterator<Item = usize>> =
        if direction.is_forward() { Box::new(0..elements.len()) } else { Box::new((0..elements.len()).rev()) };
    let mut current = direction;
    for i in indices {
        let original = elements[i].clone();
        scope.bind(var, Variable::new(original.clone(), var_is_mono, true))?;
        current = run_block(body, scope, current, ctx)?;
        let bound = scope.take(var)?;
        if !bound.snapshot().structurally_eq(&original) {
            return Err(RunError::new(
                ErrorKind::ValueError,
                format!("for loop variable \"{var}\" has a different value to the corresponding iterator element after the code block has run"),
            ));
        }
    }
    Ok(current)
}

/// `do D yield Y undo`: `D` always runs forward first. If `D` itself flips
/// direction (e.g. it contains an uncall), the block exits right there with
/// the flipped direction and `Y`/the final undo of `D` never run. Otherwise
/// `Y` runs honoring the caller's direction; if `Y` flips direction, `D` is
/// undone (run backward) and the block exits backward. Otherwise `D` is
/// unconditionally undone and the caller's direction is returned unchanged —
/// the block is transparent to its caller except for `Y`'s visible effect.
fn exec_do_undo(do_body: &[Stmt], yield_body: &[Stmt], direction: Direction, scope: &mut Scope, ctx: &mut ExecCtx) -> RunResult<Direction> {
    let after_do = run_block(do_body, scope, Direction::Forward, ctx)?;
    if !after_do.is_forward() {
        return Ok(Direction::Backward);
    }
    if !direction.is_forward() && scope.has_live_mono() {
        return Err(RunError::new(
            ErrorKind::DirectionChange,
            "changing direction of time at the end of a do block whilst a mono variable is in scope",
        ));
    }
    let after_yield = run_block(yield_body, scope, direction, ctx)?;
    if after_yield != direction {
        run_block(do_body, scope, Direction::Backward, ctx)?;
        return Ok(Direction::Backward);
    }
    if direction.is_forward() && scope.has_live_mono() {
        return Err(RunError::new(
            ErrorKind::DirectionChange,
            "changing direction of time using an undo block whilst a mono variable is in scope",
        ));
    }
    run_block(do_body, scope, Direction::Backward, ctx)?;
    Ok(direction)
}

/// Runs `try`'s candidate search: binds `var` to each element of `iterable`
/// in turn, running `body` (whose final statement is expected to be a
/// `catch`). A candidate whose catch condition comes back true is discarded
/// — `body` is replayed backward to undo it — and the next element is
/// tried; the first candidate whose catch condition is false is accepted.
///
/// Unlike the reference interpreter, which replays a forward-recorded trace
/// to uncall a `try`, this runs the same symmetric search with `body`
/// executed in whichever direction the `try` itself is running — a
/// deliberate simplification recorded in the design notes. A forward search
/// that exhausts its candidates raises [`ErrorKind::ExhaustedTry`]; a
/// backward one raises [`ErrorKind::TryReverseError`], so callers can tell
/// "nothing satisfied the catch" apart from "uncalling found no consistent
/// candidate".
fn exec_try(var: &str, iterable: &crate::ast::Expr, body: &[Stmt], direction: Direction, scope: &mut Scope, ctx: &mut ExecCtx) -> RunResult<Direction> {
    let value = eval(iterable, scope)?;
    let candidates = match value {
        Cell::Array(items) => items,
        Cell::Scalar(_) => return Err(RunError::new(ErrorKind::TypeError, "try iterable must be an array")),
    };
    for candidate in candidates {
        scope.bind(var, Variable::mono(candidate))?;
        ctx.catch_result = None;
        let result_dir = run_block(body, scope, direction, ctx)?;
        match ctx.catch_result.take() {
            Some(true) => {
                run_block(body, scope, direction.flipped(), ctx)?;
                scope.take(var)?;
            }
            _ => {
                scope.take(var)?;
                return Ok(result_dir);
            }
        }
    }
    let kind = if direction.is_forward() { ErrorKind::ExhaustedTry } else { ErrorKind::TryReverseError };
    Err(RunError::new(kind, "try exhausted all candidate values without a satisfying catch"))
}

fn exec_print(args: &[crate::ast::Expr], newline: bool, direction: Direction, scope: &mut Scope, ctx: &mut ExecCtx) -> RunResult<Direction> {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            ctx.printer.stdout_push(' ')?;
        }
        let value = eval(arg, scope)?;
        ctx.printer.stdout_write(Cow::Owned(value.to_string()))?;
    }
    if newline {
        ctx.printer.stdout_push('\n')?;
    }
    Ok(direction)
}

fn exec_barrier(name: &str, direction: Direction, scope: &Scope) -> RunResult<Direction> {
    let tm = scope
        .thread_manager()
        .ok_or_else(|| RunError::new(ErrorKind::ValueError, "barrier used outside a parallel call"))?;
    tm.wait_barrier(name)?;
    Ok(direction)
}

fn exec_mutex(name: &str, body: &[Stmt], direction: Direction, scope: &mut Scope, ctx: &mut ExecCtx) -> RunResult<Direction> {
    let tm = scope
        .thread_manager()
        .cloned()
        .ok_or_else(|| RunError::new(ErrorKind::ValueError, "mutex used outside a parallel call"))?;
    let thread_num = scope.thread_num();
    if thread_num < 0 {
        return Err(RunError::new(ErrorKind::ValueError, "mutex used outside a parallel call"));
    }
    let tn = thread_num as usize;
    tm.acquire_mutex(name, tn, direction.is_forward())?;
    let result = run_block(body, scope, direction, ctx);
    tm.release_mutex(name, tn, direction.is_forward());
    result
}

fn exec_global(name: &str, expr: &crate::ast::Expr, is_mono: bool, direction: Direction, scope: &mut Scope) -> RunResult<Direction> {
    match direction {
        Direction::Forward => {
            let value = eval(expr, scope)?;
            scope.bind_global(name, Variable::new(value, is_mono, false))?;
        }
        Direction::Backward => {
            let expected = eval(expr, scope)?;
            let actual = scope.take_global(name)?;
            if !actual.snapshot().structurally_eq(&expected) {
                return Err(RunError::new(ErrorKind::ValueError, format!("global \"{name}\" does not match its unlet value")));
            }
        }
    }
    Ok(direction)
}
