//! Module driver: component G.
//!
//! Glues everything else together into one whole-program run: execute a
//! module's top-level `global`/`import` lines, merging whatever an import
//! pulls in under a dotted-prefix naming scheme, then call `main` (or
//! `.main`) forward with `argv` bound as a borrowed array local. Parsing
//! itself is out of scope here — callers hand in an already-built [`Module`]
//! AST and a [`ModuleLoader`] the driver calls back into for each `import`.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::{
    ast::{Function, Module as AstModule, Stmt},
    call,
    error::{ErrorKind, RunError, RunResult},
    io::PrintWriter,
    rational::Rational,
    scope::{Globals, Scope},
    stmt::{Direction, ExecCtx, run_block},
    value::{Cell, Variable},
};

/// Resolves and parses the file an `import` statement names.
///
/// Implemented by the embedder, which owns the real parser and file system —
/// this crate never touches a filesystem itself. Any error `parse_file`
/// returns is folded into [`ErrorKind::ImportError`] by [`run`], matching
/// spec §6's "catches not-found/permission/OS errors and re-raises as
/// `ImportError`".
pub trait ModuleLoader {
    /// # Errors
    /// Any I/O or parse failure opening or parsing `path`.
    fn parse_file(&self, path: &str) -> std::io::Result<AstModule>;
}

/// Runs `module` to completion against `argv`, writing program output
/// through `printer`.
///
/// # Errors
/// Any [`RunError`] raised while loading imports, evaluating global lines,
/// or executing `main`.
pub fn run(module: &AstModule, argv: Vec<Rational>, loader: &dyn ModuleLoader, printer: &mut dyn PrintWriter) -> RunResult<()> {
    let mut ctx = ExecCtx::new(printer);
    let own_functions = own_function_table(module)?;
    let (globals_map, functions_map) = run_global_lines(module, loader, &mut ctx, own_functions)?;

    let mut scope = Scope::for_globals(Arc::new(functions_map), Arc::new(Mutex::new(globals_map)));
    let argv_cells = argv.into_iter().map(Cell::scalar).collect();
    scope.bind("argv", Variable::new(Cell::array(argv_cells), false, true))?;

    let main_fn = scope
        .lookup_func("main")
        .or_else(|| scope.lookup_func(".main"))
        .ok_or_else(|| RunError::new(ErrorKind::UndefinedFunction, "there is no main function in this module"))?;

    run_block(&main_fn.body, &mut scope, Direction::Forward, &mut ctx)
        .and_then(|_| call::extract_outputs(&mut scope, &main_fn.in_params, &main_fn.out_params, "main"))
        .map_err(|e| scope.wrap_error(e, "main"))?;
    Ok(())
}

/// Evaluates `ast`'s global lines, seeded with `functions` (the module's own
/// function table for a top-level run, or empty for a freshly imported
/// file — imported files can't see their own functions while their global
/// lines run, only whoever imports them can). Returns the globals bound and
/// the function table grown by any nested imports.
fn run_global_lines(
    ast: &AstModule,
    loader: &dyn ModuleLoader,
    ctx: &mut ExecCtx,
    mut functions: IndexMap<String, Arc<Function>>,
) -> RunResult<(IndexMap<String, Variable>, IndexMap<String, Arc<Function>>)> {
    let globals: Globals = Arc::new(Mutex::new(IndexMap::new()));
    let mut scope = Scope::for_globals(Arc::new(IndexMap::new()), Arc::clone(&globals));

    for stmt in &ast.global_lines {
        if let Stmt::Import { path, alias, .. } = stmt {
            let imported = loader
                .parse_file(path)
                .map_err(|e| RunError::new(ErrorKind::ImportError, format!("error opening file \"{path}\": {e}")))?;
            let (imported_globals, imported_functions) = run_global_lines(&imported, loader, ctx, IndexMap::new())?;
            let own_functions = own_function_table(&imported)?;

            {
                let mut globals_guard = globals.lock().expect("globals mutex poisoned");
                merge_into(&imported_globals, alias.as_deref(), &mut globals_guard)?;
            }
            merge_into(&imported_functions, alias.as_deref(), &mut functions)?;
            merge_into(&own_functions, alias.as_deref(), &mut functions)?;
        } else {
            run_block(std::slice::from_ref(stmt), &mut scope, Direction::Forward, ctx)?;
        }
    }

    drop(scope);
    let globals_map = Arc::try_unwrap(globals).expect("module-load globals arc not aliased").into_inner().expect("globals mutex poisoned");
    Ok((globals_map, functions))
}

/// Builds the unprefixed name table for a module's own top-level functions,
/// failing with [`ErrorKind::NameClash`] if two share a name.
fn own_function_table(ast: &AstModule) -> RunResult<IndexMap<String, Arc<Function>>> {
    let mut map = IndexMap::new();
    for f in &ast.functions {
        if map.insert(f.name.clone(), Arc::new(f.clone())).is_some() {
            return Err(RunError::new(ErrorKind::NameClash, format!("function \"{}\" is defined more than once", f.name)));
        }
    }
    Ok(map)
}

/// Merges `src` into `dst` under `alias`'s dotted-prefix schema: no alias
/// means no prefix; a name already starting with `.` keeps that leading dot
/// and has the alias spliced in right after it (private-by-convention names
/// stay private under their new prefix); any other name is prefixed
/// `alias.name`. Fails with [`ErrorKind::NameClash`] on a collision with an
/// existing `dst` entry.
fn merge_into<V: Clone>(src: &IndexMap<String, V>, alias: Option<&str>, dst: &mut IndexMap<String, V>) -> RunResult<()> {
    for (key, val) in src {
        let name = match alias {
            None => key.clone(),
            Some(alias) if key.starts_with('.') => format!(".{alias}{key}"),
            Some(alias) => format!("{alias}.{key}"),
        };
        if dst.contains_key(&name) {
            return Err(RunError::new(ErrorKind::NameClash, format!("name clash of \"{name}\" during import")));
        }
        dst.insert(name, val.clone());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        ast::{Expr, Parameter},
        io::CollectStringPrint,
    };

    struct FakeLoader(HashMap<String, AstModule>);

    impl ModuleLoader for FakeLoader {
        fn parse_file(&self, path: &str) -> std::io::Result<AstModule> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string()))
        }
    }

    fn func(name: &str, in_params: Vec<Parameter>, out_params: Vec<Parameter>, body: Vec<Stmt>) -> Function {
        Function { name: name.into(), in_params, out_params, body }
    }

    fn param(name: &str, is_borrowed: bool) -> Parameter {
        Parameter { name: name.into(), mono_name: false, is_borrowed }
    }

    fn print_stmt(value: i64) -> Stmt {
        Stmt::Print {
            args: vec![Expr::Literal(Rational::from_i64(value))],
            newline: true,
            is_mono: false,
            mod_reverse: false,
        }
    }

    #[test]
    fn runs_a_module_with_no_imports() {
        let module = AstModule {
            global_lines: vec![],
            functions: vec![func("main", vec![param("argv", true)], vec![], vec![print_stmt(7)])],
        };
        let loader = FakeLoader(HashMap::new());
        let mut sink = CollectStringPrint::new();
        run(&module, vec![], &loader, &mut sink).unwrap();
        assert_eq!(sink.output(), "7\n");
    }

    #[test]
    fn missing_main_is_undefined_function() {
        let module = AstModule { global_lines: vec![], functions: vec![] };
        let loader = FakeLoader(HashMap::new());
        let mut sink = CollectStringPrint::new();
        let err = run(&module, vec![], &loader, &mut sink).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedFunction);
    }

    #[test]
    fn import_merges_functions_under_dotted_prefix() {
        let imported = AstModule {
            global_lines: vec![],
            functions: vec![func("helper", vec![], vec![], vec![print_stmt(3)])],
        };
        let mut loader_map = HashMap::new();
        loader_map.insert("lib.rail".to_string(), imported);
        let loader = FakeLoader(loader_map);

        let call_helper = Stmt::CallChain {
            in_params: vec![],
            calls: vec![crate::ast::CallBlock {
                function_name: "lib.helper".into(),
                is_uncall: false,
                num_threads: None,
                borrowed_args: vec![],
            }],
            out_params: vec![],
            is_mono: false,
            mod_reverse: false,
        };
        let module = AstModule {
            global_lines: vec![Stmt::Import { path: "lib.rail".into(), alias: Some("lib".into()), is_mono: false, mod_reverse: false }],
            functions: vec![func("main", vec![param("argv", true)], vec![], vec![call_helper])],
        };
        let mut sink = CollectStringPrint::new();
        run(&module, vec![], &loader, &mut sink).unwrap();
        assert_eq!(sink.output(), "3\n");
    }

    #[test]
    fn import_failure_is_import_error() {
        let module = AstModule {
            global_lines: vec![Stmt::Import { path: "missing.rail".into(), alias: None, is_mono: false, mod_reverse: false }],
            functions: vec![func("main", vec![param("argv", true)], vec![], vec![])],
        };
        let loader = FakeLoader(HashMap::new());
        let mut sink = CollectStringPrint::new();
        let err = run(&module, vec![], &loader, &mut sink).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ImportError);
    }

    #[test]
    fn private_name_keeps_leading_dot_after_aliasing() {
        let mut dst: IndexMap<String, i32> = IndexMap::new();
        let mut src = IndexMap::new();
        src.insert(".secret".to_string(), 1);
        merge_into(&src, Some("mod"), &mut dst).unwrap();
        assert!(dst.contains_key(".mod.secret"));
    }

    #[test]
    fn colliding_import_name_is_name_clash() {
        let mut dst: IndexMap<String, i32> = IndexMap::new();
        dst.insert("mod.helper".to_string(), 0);
        let mut src = IndexMap::new();
        src.insert("helper".to_string(), 1);
        let err = merge_into(&src, Some("mod"), &mut dst).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NameClash);
    }
}
