//! Expression evaluation: binops, uniops, lookups, literals, array
//! constructors, ranges, tensors, and the thread-identity expressions.

use crate::{
    ast::{BinOp, Expr, UniOp},
    error::{ErrorKind, RunError, RunResult},
    rational::Rational,
    scope::Scope,
    value::Cell,
};

/// Evaluates `expr` in `scope`, producing a fresh [`Cell`] value.
///
/// Array-valued results are freshly allocated trees: callers that want to
/// bind the result as a variable's memory decide separately (via
/// [`Expr::is_unowned`]) whether a deep copy is still required.
pub fn eval(expr: &Expr, scope: &Scope) -> RunResult<Cell> {
    match expr {
        Expr::Literal(r) => Ok(Cell::scalar(r.clone())),
        Expr::Lookup { name, index, .. } => eval_lookup(name, index, scope),
        Expr::Binop { op, left, right, .. } => eval_binop(*op, left, right, scope),
        Expr::Uniop { op, operand, .. } => eval_uniop(*op, operand, scope),
        Expr::Length { expr, .. } => {
            let value = eval(expr, scope)?;
            let len = match &value {
                Cell::Array(items) => items.len(),
                Cell::Scalar(_) => {
                    return Err(RunError::new(ErrorKind::TypeError, "cannot take the length of a scalar"));
                }
            };
            Ok(Cell::scalar(Rational::from_i64(i64::try_from(len).unwrap_or(i64::MAX))))
        }
        Expr::ArrayLiteral { elements, .. } => {
            let values = elements.iter().map(|e| eval(e, scope)).collect::<RunResult<Vec<_>>>()?;
            Ok(Cell::array(values))
        }
        Expr::ArrayRange { start, stop, step, .. } => {
            let values = materialize_range(start, stop, step, scope)?;
            Ok(Cell::array(values.into_iter().map(Cell::scalar).collect()))
        }
        Expr::ArrayTensor { dims, fill, .. } => eval_tensor(dims, fill, scope),
        Expr::ThreadId => Ok(Cell::scalar(Rational::from_i64(scope.thread_num()))),
        Expr::NumThreads => {
            let n = scope.thread_manager().map_or(-1, |tm| tm.num_threads() as i64);
            Ok(Cell::scalar(Rational::from_i64(n)))
        }
    }
}

/// Evaluates each of `index` to an `i64`: every index expression must be a
/// scalar.
pub fn eval_index(index: &[Expr], scope: &Scope) -> RunResult<Vec<i64>> {
    index
        .iter()
        .map(|e| {
            let value = eval(e, scope)?;
            match value {
                Cell::Scalar(r) => r.to_index(),
                Cell::Array(_) => Err(RunError::new(ErrorKind::TypeError, "array used as an index")),
            }
        })
        .collect()
}

fn eval_lookup(name: &str, index: &[Expr], scope: &Scope) -> RunResult<Cell> {
    let var = scope.local(name)?;
    let path = eval_index(index, scope)?;
    var.with_memory(|cell| navigate(cell, &path).cloned())
}

/// Walks `path` into `cell`, returning the cell reached.
///
/// # Errors
/// [`ErrorKind::TypeError`] if an index is applied to a scalar;
/// [`ErrorKind::IndexError`] if an index is out of bounds.
pub fn navigate<'c>(cell: &'c Cell, path: &[i64]) -> RunResult<&'c Cell> {
    let mut current = cell;
    for &i in path {
        match current {
            Cell::Array(items) => {
                let idx = normalize_index(i, items.len())?;
                current = &items[idx];
            }
            Cell::Scalar(_) => return Err(RunError::new(ErrorKind::TypeError, "cannot index a scalar")),
        }
    }
    Ok(current)
}

/// Mutable counterpart of [`navigate`].
pub fn navigate_mut<'c>(cell: &'c mut Cell, path: &[i64]) -> RunResult<&'c mut Cell> {
    let mut current = cell;
    for &i in path {
        match current {
            Cell::Array(items) => {
                let idx = normalize_index(i, items.len())?;
                current = &mut items[idx];
            }
            Cell::Scalar(_) => return Err(RunError::new(ErrorKind::TypeError, "cannot index a scalar")),
        }
    }
    Ok(current)
}

fn normalize_index(i: i64, len: usize) -> RunResult<usize> {
    let resolved = if i < 0 { i + len as i64 } else { i };
    usize::try_from(resolved)
        .ok()
        .filter(|&idx| idx < len)
        .ok_or_else(|| RunError::new(ErrorKind::IndexError, format!("index {i} out of bounds for length {len}")))
}

fn eval_binop(op: BinOp, left: &Expr, right: &Expr, scope: &Scope) -> RunResult<Cell> {
    // `&`/`|` short-circuit on the left operand's truthiness; `^` always
    // evaluates both sides since eager xor needs both operands regardless.
    if matches!(op, BinOp::And | BinOp::Or) {
        let left_val = eval(left, scope)?;
        let left_truthy = left_val.is_truthy();
        if (op == BinOp::And && !left_truthy) || (op == BinOp::Or && left_truthy) {
            return Ok(Cell::scalar(Rational::from_bool(left_truthy)));
        }
        let right_val = eval(right, scope)?;
        return Ok(Cell::scalar(Rational::from_bool(right_val.is_truthy())));
    }

    let left_val = scalar_operand(eval(left, scope)?)?;
    let right_val = scalar_operand(eval(right, scope)?)?;
    let result = match op {
        BinOp::Add => left_val.add(&right_val),
        BinOp::Sub => left_val.sub(&right_val),
        BinOp::Mul => left_val.mul(&right_val),
        BinOp::Div => left_val.div(&right_val)?,
        BinOp::FloorDiv => left_val.floor_div(&right_val)?,
        BinOp::Pow => left_val.pow(&right_val)?,
        BinOp::Mod => left_val.modulo(&right_val)?,
        BinOp::Xor => Rational::from_bool(left_val.is_truthy() ^ right_val.is_truthy()),
        BinOp::Lt => Rational::from_bool(left_val < right_val),
        BinOp::Le => Rational::from_bool(left_val <= right_val),
        BinOp::Gt => Rational::from_bool(left_val > right_val),
        BinOp::Ge => Rational::from_bool(left_val >= right_val),
        BinOp::Eq => Rational::from_bool(left_val == right_val),
        BinOp::Ne => Rational::from_bool(left_val != right_val),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    };
    Ok(Cell::scalar(result))
}

fn eval_uniop(op: UniOp, operand: &Expr, scope: &Scope) -> RunResult<Cell> {
    let value = scalar_operand(eval(operand, scope)?)?;
    let result = match op {
        UniOp::Not => Rational::from_bool(!value.is_truthy()),
        UniOp::Neg => value.neg(),
    };
    Ok(Cell::scalar(result))
}

fn scalar_operand(value: Cell) -> RunResult<Rational> {
    match value {
        Cell::Scalar(r) => Ok(r),
        Cell::Array(_) => Err(RunError::new(ErrorKind::TypeError, "array used where a scalar was expected")),
    }
}

pub(crate) fn eval_scalar(expr: &Expr, scope: &Scope) -> RunResult<Rational> {
    scalar_operand(eval(expr, scope)?)
}

/// Materializes `[start to stop by step]` as a `Vec<Rational>`. Half-open:
/// includes `start`, excludes `stop`. Empty if the step's sign disagrees
/// with the direction from `start` to `stop`.
fn materialize_range(start: &Expr, stop: &Expr, step: &Expr, scope: &Scope) -> RunResult<Vec<Rational>> {
    let start = eval_scalar(start, scope)?;
    let stop = eval_scalar(stop, scope)?;
    let step = eval_scalar(step, scope)?;
    if step.is_zero() {
        return Err(RunError::new(ErrorKind::ZeroError, "array range step cannot be zero"));
    }
    let ascending = step > Rational::zero();
    let mut values = Vec::new();
    let mut current = start;
    loop {
        let keep_going = if ascending { current < stop } else { current > stop };
        if !keep_going {
            break;
        }
        values.push(current.clone());
        current = current.add(&step);
    }
    Ok(values)
}

fn eval_tensor(dims: &[Expr], fill: &Expr, scope: &Scope) -> RunResult<Cell> {
    let dims = dims
        .iter()
        .map(|d| eval_scalar(d, scope)?.to_index())
        .collect::<RunResult<Vec<_>>>()?;
    if dims.is_empty() {
        return Err(RunError::new(ErrorKind::ValueError, "tensor must have at least one dimension"));
    }
    for (i, &d) in dims.iter().enumerate() {
        let is_last = i == dims.len() - 1;
        if d < 0 || (d == 0 && !is_last) {
            return Err(RunError::new(
                ErrorKind::ValueError,
                "only the last tensor dimension may be zero, and no dimension may be negative",
            ));
        }
    }
    let fill_value = eval(fill, scope)?;
    Ok(build_tensor(&dims, &fill_value))
}

fn build_tensor(dims: &[i64], fill: &Cell) -> Cell {
    match dims.split_first() {
        None => fill.clone(),
        Some((&len, rest)) => {
            let len = usize::try_from(len).unwrap_or(0);
            Cell::array((0..len).map(|_| build_tensor(rest, fill)).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Variable;

    fn lit(n: i64) -> Expr {
        Expr::Literal(Rational::from_i64(n))
    }

    fn root_scope() -> Scope {
        Scope::root(std::sync::Arc::new(indexmap::IndexMap::new()))
    }

    #[test]
    fn binop_add_produces_sum() {
        let scope = root_scope();
        let expr = Expr::Binop {
            op: BinOp::Add,
            left: Box::new(lit(2)),
            right: Box::new(lit(3)),
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap(), Cell::scalar(Rational::from_i64(5)));
    }

    #[test]
    fn division_by_zero_is_zero_error() {
        let scope = root_scope();
        let expr = Expr::Binop {
            op: BinOp::Div,
            left: Box::new(lit(1)),
            right: Box::new(lit(0)),
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap_err().kind, ErrorKind::ZeroError);
    }

    #[test]
    fn and_short_circuits_without_evaluating_right() {
        let scope = root_scope();
        let expr = Expr::Binop {
            op: BinOp::And,
            left: Box::new(lit(0)),
            right: Box::new(Expr::Binop {
                op: BinOp::Div,
                left: Box::new(lit(1)),
                right: Box::new(lit(0)),
                has_mono: false,
            }),
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap(), Cell::scalar(Rational::from_i64(0)));
    }

    #[test]
    fn xor_evaluates_both_sides_eagerly() {
        let scope = root_scope();
        let expr = Expr::Binop {
            op: BinOp::Xor,
            left: Box::new(lit(1)),
            right: Box::new(lit(0)),
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap(), Cell::scalar(Rational::from_i64(1)));
    }

    #[test]
    fn lookup_resolves_nested_index() {
        let mut scope = root_scope();
        let nested = Cell::array(vec![Cell::array(vec![Cell::scalar(Rational::from_i64(7))])]);
        scope.bind("arr", Variable::owned(nested)).unwrap();
        let expr = Expr::Lookup {
            name: "arr".into(),
            index: vec![lit(0), lit(0)],
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap(), Cell::scalar(Rational::from_i64(7)));
    }

    #[test]
    fn lookup_out_of_bounds_is_index_error() {
        let mut scope = root_scope();
        scope
            .bind("arr", Variable::owned(Cell::array(vec![Cell::scalar(Rational::from_i64(1))])))
            .unwrap();
        let expr = Expr::Lookup {
            name: "arr".into(),
            index: vec![lit(5)],
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap_err().kind, ErrorKind::IndexError);
    }

    #[test]
    fn array_range_is_half_open() {
        let scope = root_scope();
        let expr = Expr::ArrayRange {
            start: Box::new(lit(1)),
            stop: Box::new(lit(4)),
            step: Box::new(lit(1)),
            has_mono: false,
            unowned: true,
        };
        let values = eval(&expr, &scope).unwrap();
        assert_eq!(
            values,
            Cell::array(vec![
                Cell::scalar(Rational::from_i64(1)),
                Cell::scalar(Rational::from_i64(2)),
                Cell::scalar(Rational::from_i64(3)),
            ])
        );
    }

    #[test]
    fn array_range_empty_when_step_opposes_direction() {
        let scope = root_scope();
        let expr = Expr::ArrayRange {
            start: Box::new(lit(1)),
            stop: Box::new(lit(4)),
            step: Box::new(lit(-1)),
            has_mono: false,
            unowned: true,
        };
        assert_eq!(eval(&expr, &scope).unwrap(), Cell::array(vec![]));
    }

    #[test]
    fn tensor_rejects_non_last_zero_dimension() {
        let scope = root_scope();
        let expr = Expr::ArrayTensor {
            dims: vec![lit(0), lit(2)],
            fill: Box::new(lit(0)),
            has_mono: false,
            unowned: true,
        };
        assert_eq!(eval(&expr, &scope).unwrap_err().kind, ErrorKind::ValueError);
    }

    #[test]
    fn tensor_replicates_fill_at_every_position() {
        let scope = root_scope();
        let expr = Expr::ArrayTensor {
            dims: vec![lit(2), lit(2)],
            fill: Box::new(lit(9)),
            has_mono: false,
            unowned: true,
        };
        let value = eval(&expr, &scope).unwrap();
        let nine = Cell::scalar(Rational::from_i64(9));
        assert_eq!(
            value,
            Cell::array(vec![
                Cell::array(vec![nine.clone(), nine.clone()]),
                Cell::array(vec![nine.clone(), nine]),
            ])
        );
    }

    #[test]
    fn thread_id_and_num_threads_are_negative_one_outside_parallel_scope() {
        let scope = root_scope();
        assert_eq!(eval(&Expr::ThreadId, &scope).unwrap(), Cell::scalar(Rational::from_i64(-1)));
        assert_eq!(eval(&Expr::NumThreads, &scope).unwrap(), Cell::scalar(Rational::from_i64(-1)));
    }

    #[test]
    fn length_of_array_counts_top_level_elements() {
        let mut scope = root_scope();
        scope
            .bind(
                "arr",
                Variable::owned(Cell::array(vec![Cell::scalar(Rational::from_i64(1)), Cell::scalar(Rational::from_i64(2))])),
            )
            .unwrap();
        let expr = Expr::Length {
            expr: Box::new(Expr::Lookup {
                name: "arr".into(),
                index: vec![],
                has_mono: false,
            }),
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap(), Cell::scalar(Rational::from_i64(2)));
    }

    #[test]
    fn length_of_scalar_is_type_error() {
        let scope = root_scope();
        let expr = Expr::Length {
            expr: Box::new(lit(1)),
            has_mono: false,
        };
        assert_eq!(eval(&expr, &scope).unwrap_err().kind, ErrorKind::TypeError);
    }
}
