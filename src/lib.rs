//! Runtime core for Railway, a reversible programming language.
//!
//! This crate evaluates an already-parsed Railway program: bidirectional
//! statement execution, ownership-checked variables (mono/borrowed/owned),
//! reverse-aware parallel call sites, and the reversibility assertions that
//! make running a program backward meaningful. Parsing, module-path
//! resolution on disk, and any CLI are the embedder's job — this crate takes
//! a [`Module`](ast::Module) AST and an `argv` vector and runs it.
//!
//! ```
//! use railway_core::{ast::{Function, Module, Parameter, Stmt, Expr}, io::CollectStringPrint, module, rational::Rational};
//!
//! let module = Module {
//!     global_lines: vec![],
//!     functions: vec![Function {
//!         name: "main".into(),
//!         in_params: vec![Parameter { name: "argv".into(), mono_name: false, is_borrowed: true }],
//!         out_params: vec![],
//!         body: vec![Stmt::Print {
//!             args: vec![Expr::Literal(Rational::from_i64(42))],
//!             newline: true,
//!             is_mono: false,
//!             mod_reverse: false,
//!         }],
//!     }],
//! };
//! struct NoImports;
//! impl module::ModuleLoader for NoImports {
//!     fn parse_file(&self, path: &str) -> std::io::Result<Module> {
//!         Err(std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
//!     }
//! }
//! let mut out = CollectStringPrint::new();
//! module::run(&module, vec![], &NoImports, &mut out).unwrap();
//! assert_eq!(out.output(), "42\n");
//! ```

pub mod ast;
mod call;
pub mod error;
mod expr;
pub mod io;
pub mod module;
pub mod rational;
pub mod resource;
pub mod scope;
pub mod stmt;
pub mod thread_manager;
pub mod tracer;
pub mod value;

pub use crate::{
    error::{ErrorKind, RunError, RunResult},
    module::{ModuleLoader, run},
};
