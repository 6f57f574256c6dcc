//! Call chain execution: component E.
//!
//! A `CallChain` statement steals its `in_params` out of the caller's scope,
//! threads them through one or more [`CallBlock`]s (each either calling or
//! uncalling a function, serially or across a pool of parallel workers), and
//! binds whatever comes out the far end as `out_params`. Every call site may
//! additionally borrow named variables straight from the caller instead of
//! stealing them, re-resolved fresh at each link in the chain.

use std::sync::{Arc, Mutex};

use crate::{
    ast::{CallBlock, Function, Parameter},
    error::{ErrorKind, RunError, RunResult},
    expr,
    io::PrintWriter,
    scope::Scope,
    stmt::{Direction, ExecCtx, run_block},
    thread_manager::ThreadManager,
    value::{Cell, Variable},
};

#[allow(clippy::too_many_arguments)]
pub fn exec_call_chain(
    in_params: &[String],
    calls: &[CallBlock],
    out_params: &[String],
    is_mono: bool,
    direction: Direction,
    scope: &mut Scope,
    ctx: &mut ExecCtx,
) -> RunResult<Direction> {
    if !direction.is_forward() && is_mono {
        return Ok(direction);
    }
    let stolen_params = if direction.is_forward() { in_params } else { out_params };
    let bound_params = if direction.is_forward() { out_params } else { in_params };
    let mut chain_values = stolen_params
        .iter()
        .map(|name| {
            let var = scope.local(name)?;
            if var.is_borrowed() {
                return Err(RunError::new(
                    ErrorKind::ReferenceOwnership,
                    format!("variable \"{name}\" is a borrowed reference and so may not be stolen by a call chain"),
                ));
            }
            scope.take(name)
        })
        .collect::<RunResult<Vec<_>>>()?;
    let mut ending_direction = direction;
    for block in calls {
        let (values, ending) = exec_call_block(block, chain_values, direction, scope, ctx)?;
        chain_values = values;
        ending_direction = ending;
    }
    let last_function_name = calls.last().map_or("", |b| b.function_name.as_str());
    if chain_values.len() != bound_params.len() {
        return Err(RunError::new(
            ErrorKind::LeakedInformation,
            format!(
                "function \"{last_function_name}\" returned {} variables but the result is assigned to {} variables",
                chain_values.len(),
                bound_params.len()
            ),
        ));
    }
    for (name, var) in bound_params.iter().zip(chain_values) {
        scope.bind(name, var)?;
    }
    Ok(ending_direction)
}

fn exec_call_block(
    block: &CallBlock,
    chain_values: Vec<Variable>,
    direction: Direction,
    scope: &mut Scope,
    ctx: &mut ExecCtx,
) -> RunResult<(Vec<Variable>, Direction)> {
    let function = scope
        .lookup_func(&block.function_name)
        .ok_or_else(|| RunError::new(ErrorKind::UndefinedFunction, format!("function \"{}\" is undefined", block.function_name)))?;
    let body_direction = if block.is_uncall { direction.flipped() } else { direction };
    let (formal_in, formal_out) = if body_direction.is_forward() {
        (&function.in_params, &function.out_params)
    } else {
        (&function.out_params, &function.in_params)
    };

    if let Some(num_threads_expr) = &block.num_threads {
        let n = expr::eval_scalar(num_threads_expr, scope)?.to_index()?;
        if n <= 0 {
            return Err(RunError::new(ErrorKind::ValueError, "parallel call thread count must be positive"));
        }
        ctx.enter_call(&block.function_name)?;
        let result = run_parallel(&function, formal_in, formal_out, chain_values, block, n as usize, body_direction, scope, ctx);
        ctx.exit_call(&block.function_name);
        result
    } else {
        let mut callee_scope = match_serial_inputs(scope, formal_in, chain_values, block)?;
        ctx.enter_call(&block.function_name)?;
        let outcome = run_block(&function.body, &mut callee_scope, body_direction, ctx)
            .and_then(|ending| extract_outputs(&mut callee_scope, formal_in, formal_out, &block.function_name).map(|o| (o, ending)));
        ctx.exit_call(&block.function_name);
        outcome.map_err(|e| callee_scope.wrap_error(e, &block.function_name))
    }
}

fn check_mono_match(var: &Variable, expects_mono: bool) -> RunResult<()> {
    match (var.is_mono(), expects_mono) {
        (true, false) => Err(RunError::new(ErrorKind::IllegalMono, "a mono value was passed where a non-mono parameter was expected")),
        (false, true) => Err(RunError::new(ErrorKind::ExpectedMono, "a non-mono value was passed where a mono parameter was expected")),
        _ => Ok(()),
    }
}

fn too_few_args(function_name: &str) -> RunError {
    RunError::new(ErrorKind::CallError, format!("call to \"{function_name}\" received too few arguments"))
}

fn too_many_args(function_name: &str) -> RunError {
    RunError::new(ErrorKind::CallError, format!("call to \"{function_name}\" received too many arguments"))
}

fn missing_borrowed(function_name: &str) -> RunError {
    RunError::new(ErrorKind::CallError, format!("call to \"{function_name}\" is missing a declared borrowed argument"))
}

fn match_serial_inputs(scope: &Scope, formal_in: &[Parameter], chain_values: Vec<Variable>, block: &CallBlock) -> RunResult<Scope> {
    let mut callee_scope = scope.child_frame();
    let mut stolen = chain_values.into_iter();
    let mut borrowed_names = block.borrowed_args.iter();
    for formal in formal_in {
        let var = if formal.is_borrowed {
            let name = borrowed_names.next().ok_or_else(|| missing_borrowed(&block.function_name))?;
            scope.local(name)?.borrow()
        } else {
            stolen.next().ok_or_else(|| too_few_args(&block.function_name))?
        };
        check_mono_match(&var, formal.mono_name)?;
        callee_scope.bind(&formal.name, var)?;
    }
    if stolen.next().is_some() || borrowed_names.next().is_some() {
        return Err(too_many_args(&block.function_name));
    }
    Ok(callee_scope)
}

/// Removes `formal_out`'s names from `scope` in order, failing with
/// [`ErrorKind::ReferenceOwnership`] if any of them is still only a borrowed
/// alias, and with [`ErrorKind::LeakedInformation`] if anything besides the
/// named outputs and `formal_in`'s borrowed names remains bound. Borrowed
/// parameters are never stolen back from the caller, so they're dropped from
/// the callee's scope here rather than returned.
pub(crate) fn extract_outputs(
    scope: &mut Scope,
    formal_in: &[Parameter],
    formal_out: &[Parameter],
    function_name: &str,
) -> RunResult<Vec<Variable>> {
    let mut outputs = Vec::with_capacity(formal_out.len());
    for formal in formal_out {
        let var = scope.take(&formal.name)?;
        if var.is_borrowed() {
            return Err(RunError::new(
                ErrorKind::ReferenceOwnership,
                format!("call to \"{function_name}\" returned borrowed variable \"{}\"", formal.name),
            ));
        }
        check_mono_match(&var, formal.mono_name)?;
        outputs.push(var);
    }
    for formal in formal_in {
        if formal.is_borrowed {
            scope.take(&formal.name)?;
        }
    }
    if !scope.is_empty() {
        return Err(RunError::new(ErrorKind::LeakedInformation, format!("call to \"{function_name}\" leaked local state on return")));
    }
    Ok(outputs)
}

#[allow(clippy::too_many_arguments)]
fn run_parallel(
    function: &Function,
    formal_in: &[Parameter],
    formal_out: &[Parameter],
    chain_values: Vec<Variable>,
    block: &CallBlock,
    num_threads: usize,
    body_direction: Direction,
    scope: &Scope,
    ctx: &mut ExecCtx,
) -> RunResult<(Vec<Variable>, Direction)> {
    let rows = split_parallel_inputs(scope, formal_in, chain_values, block, num_threads)?;
    let manager = ThreadManager::new(num_threads);
    let printer_mutex: Mutex<&mut dyn PrintWriter> = Mutex::new(&mut *ctx.printer);

    let worker_results: Vec<RunResult<(Vec<Variable>, Direction)>> = std::thread::scope(|thread_scope| {
        let mut handles = Vec::with_capacity(num_threads);
        for (thread_num, row) in rows.into_iter().enumerate() {
            let manager = Arc::clone(&manager);
            let printer_mutex = &printer_mutex;
            handles.push(thread_scope.spawn(move || {
                let mut worker_scope = scope.child_worker(thread_num as i64, manager.clone());
                for (name, var) in row {
                    worker_scope.bind(&name, var)?;
                }
                let mut sink = MutexPrinter(printer_mutex);
                let mut worker_ctx = ExecCtx::new(&mut sink);
                let outcome = run_block(&function.body, &mut worker_scope, body_direction, &mut worker_ctx)
                    .and_then(|ending| extract_outputs(&mut worker_scope, formal_in, formal_out, &block.function_name).map(|o| (o, ending)))
                    .map_err(|e| worker_scope.wrap_error(e, &block.function_name));
                if outcome.is_err() {
                    manager.mark_panicked();
                }
                outcome
            }));
        }
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(RunError::new(ErrorKind::SympatheticError, "a parallel worker panicked"))))
            .collect()
    });

    let mut per_worker_outputs = Vec::with_capacity(num_threads);
    let mut ending_direction = body_direction;
    for result in worker_results {
        let (outputs, ending) = result?;
        ending_direction = ending;
        per_worker_outputs.push(outputs);
    }
    let combined = (0..formal_out.len())
        .map(|i| {
            let column: Vec<Cell> = per_worker_outputs.iter().map(|row| row[i].snapshot()).collect();
            Variable::new(Cell::array(column), formal_out[i].mono_name, false)
        })
        .collect();
    Ok((combined, ending_direction))
}

type NamedVariable = (String, Variable);

fn split_parallel_inputs(
    scope: &Scope,
    formal_in: &[Parameter],
    chain_values: Vec<Variable>,
    block: &CallBlock,
    num_threads: usize,
) -> RunResult<Vec<Vec<NamedVariable>>> {
    let mut rows: Vec<Vec<NamedVariable>> = (0..num_threads).map(|_| Vec::new()).collect();
    let mut stolen = chain_values.into_iter();
    let mut borrowed_names = block.borrowed_args.iter();
    for formal in formal_in {
        if formal.is_borrowed {
            let name = borrowed_names.next().ok_or_else(|| missing_borrowed(&block.function_name))?;
            let base = scope.local(name)?;
            check_mono_match(base, formal.mono_name)?;
            for row in &mut rows {
                row.push((formal.name.clone(), base.borrow()));
            }
        } else {
            let var = stolen.next().ok_or_else(|| too_few_args(&block.function_name))?;
            check_mono_match(&var, formal.mono_name)?;
            let snapshot = var.snapshot();
            let items = snapshot.as_array().ok_or_else(|| {
                RunError::new(
                    ErrorKind::ValueError,
                    format!("parallel call to \"{}\" requires array arguments", block.function_name),
                )
            })?;
            if items.len() != num_threads {
                return Err(RunError::new(
                    ErrorKind::ValueError,
                    format!(
                        "parallel call to \"{}\" expected {num_threads} elements, found {}",
                        block.function_name,
                        items.len()
                    ),
                ));
            }
            for (row, item) in rows.iter_mut().zip(items.iter()) {
                row.push((formal.name.clone(), Variable::new(item.clone(), var.is_mono(), false)));
            }
        }
    }
    if stolen.next().is_some() || borrowed_names.next().is_some() {
        return Err(too_many_args(&block.function_name));
    }
    Ok(rows)
}

/// Adapts a shared, mutex-guarded [`PrintWriter`] so each parallel worker can
/// hold one without aliasing the caller's `&mut dyn PrintWriter` directly.
struct MutexPrinter<'a>(&'a Mutex<&'a mut dyn PrintWriter>);

impl PrintWriter for MutexPrinter<'_> {
    fn stdout_write(&mut self, output: std::borrow::Cow<'_, str>) -> RunResult<()> {
        self.0.lock().expect("printer mutex poisoned").stdout_write(output)
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        self.0.lock().expect("printer mutex poisoned").stdout_push(end)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;

    use super::*;
    use crate::{ast::Stmt, io::NoPrint, rational::Rational, scope::FunctionTable};

    fn function(name: &str, in_params: Vec<Parameter>, out_params: Vec<Parameter>, body: Vec<Stmt>) -> Function {
        Function { name: name.into(), in_params, out_params, body }
    }

    fn param(name: &str) -> Parameter {
        Parameter { name: name.into(), mono_name: false, is_borrowed: false }
    }

    fn table_with(functions: Vec<Function>) -> FunctionTable {
        let map: IndexMap<String, Arc<Function>> = functions.into_iter().map(|f| (f.name.clone(), Arc::new(f))).collect();
        Arc::new(map)
    }

    fn run(stmts: &[Stmt], scope: &mut Scope, direction: Direction) -> RunResult<Direction> {
        let mut sink = NoPrint;
        let mut ctx = ExecCtx::new(&mut sink);
        run_block(stmts, scope, direction, &mut ctx)
    }

    #[test]
    fn calls_function_and_binds_its_output() {
        let double = function(
            "double",
            vec![param("x")],
            vec![param("y")],
            vec![
                Stmt::Let {
                    name: "y".into(),
                    expr: crate::ast::Expr::Binop {
                        op: crate::ast::BinOp::Mul,
                        left: Box::new(crate::ast::Expr::Lookup { name: "x".into(), index: vec![], has_mono: false }),
                        right: Box::new(crate::ast::Expr::Literal(Rational::from_i64(2))),
                        has_mono: false,
                    },
                    is_mono: false,
                    mod_reverse: false,
                },
                Stmt::Unlet {
                    name: "x".into(),
                    expr: crate::ast::Expr::Lookup { name: "y".into(), index: vec![], has_mono: false },
                    is_mono: false,
                    mod_reverse: false,
                },
            ],
        );
        let mut scope = Scope::root(table_with(vec![double]));
        scope.bind("a", Variable::owned(Cell::scalar(Rational::from_i64(5)))).unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["a".into()],
            calls: vec![CallBlock { function_name: "double".into(), is_uncall: false, num_threads: None, borrowed_args: vec![] }],
            out_params: vec!["b".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        run(&stmts, &mut scope, Direction::Forward).unwrap();
        assert_eq!(scope.local("b").unwrap().snapshot(), Cell::scalar(Rational::from_i64(10)));
    }

    #[test]
    fn undefined_function_is_undefined_function_error() {
        let mut scope = Scope::root(table_with(vec![]));
        scope.bind("a", Variable::owned(Cell::scalar(Rational::from_i64(1)))).unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["a".into()],
            calls: vec![CallBlock { function_name: "missing".into(), is_uncall: false, num_threads: None, borrowed_args: vec![] }],
            out_params: vec!["b".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        let err = run(&stmts, &mut scope, Direction::Forward).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedFunction);
    }

    #[test]
    fn arity_mismatch_is_call_error() {
        let noop = function("noop", vec![param("x")], vec![param("x")], vec![]);
        let mut scope = Scope::root(table_with(vec![noop]));
        scope.bind("a", Variable::owned(Cell::scalar(Rational::from_i64(1)))).unwrap();
        scope.bind("b", Variable::owned(Cell::scalar(Rational::from_i64(2)))).unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["a".into(), "b".into()],
            calls: vec![CallBlock { function_name: "noop".into(), is_uncall: false, num_threads: None, borrowed_args: vec![] }],
            out_params: vec!["a".into(), "b".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        let err = run(&stmts, &mut scope, Direction::Forward).unwrap_err();
        assert_eq!(err.kind, ErrorKind::CallError);
    }

    #[test]
    fn leaked_local_state_is_rejected() {
        let leaky = function(
            "leaky",
            vec![param("x")],
            vec![param("x")],
            vec![Stmt::Let { name: "extra".into(), expr: crate::ast::Expr::Literal(Rational::from_i64(1)), is_mono: false, mod_reverse: false }],
        );
        let mut scope = Scope::root(table_with(vec![leaky]));
        scope.bind("a", Variable::owned(Cell::scalar(Rational::from_i64(1)))).unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["a".into()],
            calls: vec![CallBlock { function_name: "leaky".into(), is_uncall: false, num_threads: None, borrowed_args: vec![] }],
            out_params: vec!["a".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        let err = run(&stmts, &mut scope, Direction::Forward).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LeakedInformation);
    }

    #[test]
    fn uncalling_a_function_runs_its_body_backward() {
        let incr = function(
            "incr",
            vec![param("x")],
            vec![param("x")],
            vec![Stmt::Modop {
                target: crate::ast::Path::bare("x"),
                op: crate::ast::ModOp::Add,
                expr: crate::ast::Expr::Literal(Rational::from_i64(1)),
                is_mono: false,
                mod_reverse: false,
            }],
        );
        let mut scope = Scope::root(table_with(vec![incr]));
        scope.bind("a", Variable::owned(Cell::scalar(Rational::from_i64(5)))).unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["a".into()],
            calls: vec![CallBlock { function_name: "incr".into(), is_uncall: true, num_threads: None, borrowed_args: vec![] }],
            out_params: vec!["a".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        run(&stmts, &mut scope, Direction::Forward).unwrap();
        assert_eq!(scope.local("a").unwrap().snapshot(), Cell::scalar(Rational::from_i64(4)));
    }

    #[test]
    fn parallel_call_splits_array_args_by_thread_and_restacks_results() {
        let double = function(
            "double",
            vec![param("x")],
            vec![param("x")],
            vec![Stmt::Modop {
                target: crate::ast::Path::bare("x"),
                op: crate::ast::ModOp::Mul,
                expr: crate::ast::Expr::Literal(Rational::from_i64(2)),
                is_mono: false,
                mod_reverse: false,
            }],
        );
        let mut scope = Scope::root(table_with(vec![double]));
        scope
            .bind(
                "arr",
                Variable::owned(Cell::array(vec![
                    Cell::scalar(Rational::from_i64(1)),
                    Cell::scalar(Rational::from_i64(2)),
                    Cell::scalar(Rational::from_i64(3)),
                ])),
            )
            .unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["arr".into()],
            calls: vec![CallBlock {
                function_name: "double".into(),
                is_uncall: false,
                num_threads: Some(crate::ast::Expr::Literal(Rational::from_i64(3))),
                borrowed_args: vec![],
            }],
            out_params: vec!["arr".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        run(&stmts, &mut scope, Direction::Forward).unwrap();
        assert_eq!(
            scope.local("arr").unwrap().snapshot(),
            Cell::array(vec![
                Cell::scalar(Rational::from_i64(2)),
                Cell::scalar(Rational::from_i64(4)),
                Cell::scalar(Rational::from_i64(6)),
            ])
        );
    }

    #[test]
    fn parallel_call_thread_count_must_match_array_length() {
        let noop = function("noop", vec![param("x")], vec![param("x")], vec![]);
        let mut scope = Scope::root(table_with(vec![noop]));
        scope.bind("arr", Variable::owned(Cell::array(vec![Cell::scalar(Rational::from_i64(1))]))).unwrap();
        let stmts = vec![Stmt::CallChain {
            in_params: vec!["arr".into()],
            calls: vec![CallBlock {
                function_name: "noop".into(),
                is_uncall: false,
                num_threads: Some(crate::ast::Expr::Literal(Rational::from_i64(2))),
                borrowed_args: vec![],
            }],
            out_params: vec!["arr".into()],
            is_mono: false,
            mod_reverse: false,
        }];
        let err = run(&stmts, &mut scope, Direction::Forward).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
    }
}
