//! Runtime context
//!
//! [`Runtime`] owns everything a program needs: the node arena, the static
//! scopes with the universe block, the type arena and the package store.
//! Packages are parsed, their imports loaded depth first, preprocessed and
//! then initialized in the order they finished preprocessing.

use crate::ast::{Ast, NodeId, NodeKind, Span};
use crate::error::{CompileError, Result};
use crate::interp::{Machine, MachineOptions, OpCounter, OutputSink};
use crate::parser::parse_file;
use crate::preprocess::preprocess_package;
use crate::scope::Scopes;
use crate::store::{MemStore, Store};
use crate::types::Types;
use crate::uverse::define_uverse;
use crate::values::{PackageValue, TypedValue, Value};
use crate::stdlibs;
use std::rc::Rc;
use tracing::{debug, info};

/// Knobs for running programs.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Op budget for a single run; `None` is unlimited.
    pub max_ops: Option<u64>,
    pub output: OutputSink,
    /// Trace every executed op.
    pub debug: bool,
}

pub struct Runtime {
    pub ast: Ast,
    pub scopes: Scopes,
    pub types: Types,
    pub store: MemStore,
    pub options: RuntimeOptions,
    /// Import paths currently being loaded, outermost first.
    loading: Vec<String>,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Result<Self> {
        let mut scopes = Scopes::new();
        let mut types = Types::new();
        define_uverse(&mut scopes, &mut types).map_err(CompileError::name)?;
        let mut store = MemStore::new();
        stdlibs::install(&mut store);
        Ok(Self {
            ast: Ast::new(),
            scopes,
            types,
            store,
            options,
            loading: Vec::new(),
        })
    }

    /// Parses, loads the imports of and preprocesses the package made of
    /// `files` (`(name, source)` pairs).
    pub fn load_files(&mut self, pkg_path: &str, files: &[(String, String)]) -> Result<Rc<PackageValue>> {
        if files.is_empty() {
            return Err(CompileError::io_error(format!("no files in package {pkg_path}")));
        }
        let mut nodes = Vec::with_capacity(files.len());
        let mut pkg_name: Option<String> = None;
        for (name, text) in files {
            let file = parse_file(&mut self.ast, name, text)?;
            let NodeKind::File { pkg_name: pn, .. } = self.ast.kind(file) else {
                return Err(CompileError::syntax(format!("{name} is not a file")));
            };
            match &pkg_name {
                None => pkg_name = Some(pn.clone()),
                Some(expected) if expected != pn => {
                    return Err(CompileError::syntax(format!(
                        "found packages {expected} and {pn} in {pkg_path}"
                    )));
                }
                Some(_) => {}
            }
            nodes.push(file);
        }
        for &file in &nodes {
            for path in imports_of(&self.ast, file) {
                self.load_package(&path)?;
            }
        }
        let name = pkg_name.unwrap_or_default();
        let pkg = self.ast.alloc(
            NodeKind::Package {
                path: pkg_path.to_string(),
                name,
                files: nodes,
            },
            Span::default(),
        );
        info!(path = %pkg_path, "loading package");
        preprocess_package(&mut self.ast, &mut self.scopes, &mut self.types, &mut self.store, pkg)
    }

    /// Loads an imported package from the store's sources, once.
    pub fn load_package(&mut self, path: &str) -> Result<Rc<PackageValue>> {
        if let Some(pv) = self.store.get_package(path) {
            return Ok(pv);
        }
        if self.loading.iter().any(|p| p == path) {
            let mut cycle = self.loading.clone();
            cycle.push(path.to_string());
            return Err(CompileError::syntax(format!(
                "import cycle not allowed: {}",
                cycle.join(" -> ")
            )));
        }
        let files = self
            .store
            .package_source(path)
            .ok_or_else(|| CompileError::name(format!("could not import {path} (unknown package)")))?;
        debug!(%path, files = files.len(), "loading import");
        self.loading.push(path.to_string());
        let result = self.load_files(path, &files);
        self.loading.pop();
        result
    }

    /// Creates a machine over this runtime's state.
    pub fn machine(&self) -> Machine<'_> {
        let options = MachineOptions {
            output: self.options.output.clone(),
            gas: self
                .options
                .max_ops
                .map(|n| Box::new(OpCounter::new(n)) as Box<dyn crate::interp::GasMeter>),
            debug: self.options.debug,
        };
        Machine::new(&self.ast, &self.scopes, &self.types, &self.store, options)
    }

    /// Initializes every loaded package, dependencies first.
    pub fn init(&self, m: &mut Machine<'_>) -> Result<()> {
        for pv in self.store.packages() {
            m.init_package(&pv)?;
        }
        Ok(())
    }

    /// Initializes all packages and calls `main` of `pv`.
    pub fn run_main(&self, pv: &Rc<PackageValue>) -> Result<()> {
        let main = self.lookup_func(pv, "main")?;
        let mut m = self.machine();
        self.init(&mut m)?;
        m.run_call(main, Vec::new())?;
        debug!(ops = m.num_ops(), "program finished");
        Ok(())
    }

    /// Loads `files` as package `main` and runs it.
    pub fn run_files(&mut self, files: &[(String, String)]) -> Result<()> {
        let pv = self.load_files("main", files)?;
        self.run_main(&pv)
    }

    fn lookup_func(&self, pv: &PackageValue, name: &str) -> Result<TypedValue> {
        let sb = self.scopes.get(pv.scope);
        let tv = sb
            .local_index(name)
            .and_then(|i| sb.values.get(i as usize))
            .filter(|tv| matches!(tv.v, Value::Func(_)))
            .cloned();
        tv.ok_or_else(|| CompileError::name(format!("function {name} is undeclared in package {}", pv.name)))
    }
}

/// Import paths of a file node.
fn imports_of(ast: &Ast, file: NodeId) -> Vec<String> {
    let NodeKind::File { decls, .. } = ast.kind(file) else {
        return Vec::new();
    };
    decls
        .iter()
        .filter_map(|d| match ast.kind(*d) {
            NodeKind::Import { path, .. } => Some(path.clone()),
            _ => None,
        })
        .collect()
}

/// Runs a single source file and returns what it printed.
pub fn run_source(name: &str, source: &str) -> Result<String> {
    let (output, buf) = OutputSink::buffer();
    let mut rt = Runtime::new(RuntimeOptions {
        output,
        ..RuntimeOptions::default()
    })?;
    rt.run_files(&[(name.to_string(), source.to_string())])?;
    let out = buf.borrow().clone();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> String {
        run_source("main.gno", source).expect("program should run")
    }

    fn run_err(source: &str) -> String {
        run_source("main.gno", source)
            .expect_err("program should fail")
            .to_string()
    }

    // ============================================
    // Running programs
    // ============================================

    #[test]
    fn test_hello() {
        let out = run("package main\n\nfunc main() {\n\tprintln(\"hello\")\n}\n");
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn test_missing_main() {
        let err = run_err("package main\n\nfunc helper() {}\n");
        assert!(err.contains("function main is undeclared"), "{err}");
    }

    #[test]
    fn test_mixed_package_names() {
        let mut rt = Runtime::new(RuntimeOptions::default()).unwrap();
        let files = vec![
            ("a.gno".to_string(), "package a\n".to_string()),
            ("b.gno".to_string(), "package b\n".to_string()),
        ];
        let err = rt.load_files("x", &files).unwrap_err().to_string();
        assert!(err.contains("found packages a and b"), "{err}");
    }

    #[test]
    fn test_op_budget() {
        let (output, _) = OutputSink::buffer();
        let mut rt = Runtime::new(RuntimeOptions {
            max_ops: Some(1000),
            output,
            debug: false,
        })
        .unwrap();
        let src = "package main\n\nfunc main() {\n\tfor {\n\t}\n}\n";
        let err = rt
            .run_files(&[("main.gno".to_string(), src.to_string())])
            .unwrap_err();
        assert!(matches!(err, CompileError::Runtime(_)), "{err}");
    }

    // ============================================
    // Imports
    // ============================================

    #[test]
    fn test_import_stdlib() {
        let out = run(
            "package main\n\nimport \"strconv\"\n\nfunc main() {\n\tprintln(strconv.Itoa(42) + \"!\")\n}\n",
        );
        assert_eq!(out, "42!\n");
    }

    #[test]
    fn test_import_unknown() {
        let err = run_err("package main\n\nimport \"nope\"\n\nfunc main() {}\n");
        assert!(err.contains("could not import nope"), "{err}");
    }

    #[test]
    fn test_import_cycle() {
        let mut rt = Runtime::new(RuntimeOptions::default()).unwrap();
        rt.store.add_source("a", "a.gno", "package a\n\nimport \"b\"\n");
        rt.store.add_source("b", "b.gno", "package b\n\nimport \"a\"\n");
        let err = rt.load_package("a").unwrap_err().to_string();
        assert!(err.contains("import cycle not allowed: a -> b -> a"), "{err}");
    }

    #[test]
    fn test_package_loaded_once() {
        let mut rt = Runtime::new(RuntimeOptions::default()).unwrap();
        let first = rt.load_package("errors").unwrap();
        let second = rt.load_package("errors").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
    }
}
