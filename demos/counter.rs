//! A thin reference driver exercising `railway_core` end to end, built by
//! hand rather than parsed from source text (this crate has no parser).
//! Not a product CLI — `tests/integration.rs` pulls these builders in to
//! assert on a whole-module run rather than individual statement executors.

use railway_core::{
    ast::{CallBlock, Expr, Function, Module, Parameter, Path, Stmt},
    module::ModuleLoader,
    rational::Rational,
};

/// A function `inc(n)` that adds one to its sole stolen argument and a
/// `main(argv)` that calls it once, prints the result, then unlets it.
#[allow(dead_code)]
pub fn counter_module() -> Module {
    let inc = Function {
        name: "inc".into(),
        in_params: vec![Parameter { name: "n".into(), mono_name: false, is_borrowed: false }],
        out_params: vec![Parameter { name: "n".into(), mono_name: false, is_borrowed: false }],
        body: vec![Stmt::Modop {
            target: Path::bare("n"),
            op: railway_core::ast::ModOp::Add,
            expr: Expr::Literal(Rational::from_i64(1)),
            is_mono: false,
            mod_reverse: false,
        }],
    };
    let main = Function {
        name: "main".into(),
        in_params: vec![Parameter { name: "argv".into(), mono_name: false, is_borrowed: true }],
        out_params: vec![],
        body: vec![
            Stmt::Let { name: "count".into(), expr: Expr::Literal(Rational::from_i64(0)), is_mono: false, mod_reverse: false },
            Stmt::CallChain {
                in_params: vec!["count".into()],
                calls: vec![CallBlock { function_name: "inc".into(), is_uncall: false, num_threads: None, borrowed_args: vec![] }],
                out_params: vec!["count".into()],
                is_mono: false,
                mod_reverse: false,
            },
            Stmt::Print { args: vec![Expr::Lookup { name: "count".into(), index: vec![], has_mono: false }], newline: true, is_mono: false, mod_reverse: false },
            Stmt::Unlet { name: "count".into(), expr: Expr::Literal(Rational::from_i64(1)), is_mono: false, mod_reverse: false },
        ],
    };
    Module { global_lines: vec![], functions: vec![inc, main] }
}

/// A `main(argv)` that drives a two-thread mutex-protected counter, per
/// spec scenario 6: each thread bumps a single *shared* `n` `bumps` times
/// under `mutex "m"`, so the final value is `2 * bumps`. `n` is passed
/// borrowed so every worker shares the same underlying cell rather than a
/// stolen, per-thread copy.
#[allow(dead_code)]
pub fn mutex_counter_module(bumps: i64) -> Module {
    let bump_body = vec![
        Stmt::Let { name: "i".into(), expr: Expr::Literal(Rational::from_i64(0)), is_mono: false, mod_reverse: false },
        Stmt::Loop {
            forward_cond: Expr::Binop {
                op: railway_core::ast::BinOp::Lt,
                left: Box::new(Expr::Lookup { name: "i".into(), index: vec![], has_mono: false }),
                right: Box::new(Expr::Literal(Rational::from_i64(bumps))),
                has_mono: false,
            },
            backward_cond: Expr::Binop {
                op: railway_core::ast::BinOp::Gt,
                left: Box::new(Expr::Lookup { name: "i".into(), index: vec![], has_mono: false }),
                right: Box::new(Expr::Literal(Rational::from_i64(0))),
                has_mono: false,
            },
            body: vec![
                Stmt::Mutex {
                    name: "m".into(),
                    body: vec![Stmt::Modop {
                        target: Path::bare("n"),
                        op: railway_core::ast::ModOp::Add,
                        expr: Expr::Literal(Rational::from_i64(1)),
                        is_mono: false,
                        mod_reverse: false,
                    }],
                    is_mono: false,
                    mod_reverse: false,
                },
                Stmt::Modop {
                    target: Path::bare("i"),
                    op: railway_core::ast::ModOp::Add,
                    expr: Expr::Literal(Rational::from_i64(1)),
                    is_mono: false,
                    mod_reverse: false,
                },
            ],
            is_mono: false,
            mod_reverse: false,
        },
        Stmt::Unlet { name: "i".into(), expr: Expr::Literal(Rational::from_i64(bumps)), is_mono: false, mod_reverse: false },
    ];
    let bump = Function {
        name: "bump".into(),
        in_params: vec![Parameter { name: "n".into(), mono_name: false, is_borrowed: true }],
        out_params: vec![],
        body: bump_body,
    };
    let main = Function {
        name: "main".into(),
        in_params: vec![Parameter { name: "argv".into(), mono_name: false, is_borrowed: true }],
        out_params: vec![],
        body: vec![
            Stmt::Let { name: "n".into(), expr: Expr::Literal(Rational::from_i64(0)), is_mono: false, mod_reverse: false },
            Stmt::CallChain {
                in_params: vec![],
                calls: vec![CallBlock {
                    function_name: "bump".into(),
                    is_uncall: false,
                    num_threads: Some(Expr::Literal(Rational::from_i64(2))),
                    borrowed_args: vec!["n".into()],
                }],
                out_params: vec![],
                is_mono: false,
                mod_reverse: false,
            },
            Stmt::Print { args: vec![Expr::Lookup { name: "n".into(), index: vec![], has_mono: false }], newline: true, is_mono: false, mod_reverse: false },
            Stmt::Unlet { name: "n".into(), expr: Expr::Literal(Rational::from_i64(2 * bumps)), is_mono: false, mod_reverse: false },
        ],
    };
    Module { global_lines: vec![], functions: vec![bump, main] }
}

/// A loader that never finds anything — every demo module here is
/// self-contained and has no imports.
pub struct NoImports;

impl ModuleLoader for NoImports {
    fn parse_file(&self, path: &str) -> std::io::Result<Module> {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
    }
}
