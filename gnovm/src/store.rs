//! Package, type and native-function storage
//!
//! The preprocessor registers every package it finishes and every type it
//! declares here; the machine reads packages back when it calls top-level
//! functions. [`MemStore`] keeps everything in memory and also serves the
//! sources of the bundled standard library.

use crate::ast::{Location, NodeId};
use crate::types::TypeRef;
use crate::values::{NativeFn, PackageValue};
use std::collections::HashMap;
use std::rc::Rc;

/// Storage seam between the preprocessor, the machine and package sources.
pub trait Store {
    fn get_package(&self, path: &str) -> Option<Rc<PackageValue>>;

    fn get_package_node(&self, path: &str) -> Option<NodeId> {
        self.get_package(path).map(|pv| pv.node)
    }

    /// Registers a preprocessed package. Packages are kept in the order
    /// they were added, which is their initialization order.
    fn add_package(&mut self, pv: Rc<PackageValue>);

    fn packages(&self) -> Vec<Rc<PackageValue>>;

    fn get_type_safe(&self, id: &str) -> Option<TypeRef>;

    fn set_type(&mut self, id: &str, t: TypeRef);

    fn get_native(&self, pkg_path: &str, name: &str) -> Option<NativeFn>;

    fn set_block_node(&mut self, location: Location, node: NodeId);

    fn get_block_node(&self, location: &Location) -> Option<NodeId>;

    /// Source files `(name, text)` of a package that is not loaded yet.
    fn package_source(&self, path: &str) -> Option<Vec<(String, String)>>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemStore {
    packages: HashMap<String, Rc<PackageValue>>,
    order: Vec<String>,
    types: HashMap<String, TypeRef>,
    natives: HashMap<(String, String), NativeFn>,
    block_nodes: HashMap<Location, NodeId>,
    sources: HashMap<String, Vec<(String, String)>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_native(&mut self, pkg_path: &str, name: &str, f: NativeFn) {
        self.natives
            .insert((pkg_path.to_string(), name.to_string()), f);
    }

    pub fn add_source(&mut self, pkg_path: &str, file: &str, text: &str) {
        self.sources
            .entry(pkg_path.to_string())
            .or_default()
            .push((file.to_string(), text.to_string()));
    }

    pub fn num_types(&self) -> usize {
        self.types.len()
    }
}

impl Store for MemStore {
    fn get_package(&self, path: &str) -> Option<Rc<PackageValue>> {
        self.packages.get(path).cloned()
    }

    fn add_package(&mut self, pv: Rc<PackageValue>) {
        if !self.packages.contains_key(&pv.path) {
            self.order.push(pv.path.clone());
        }
        self.packages.insert(pv.path.clone(), pv);
    }

    fn packages(&self) -> Vec<Rc<PackageValue>> {
        self.order
            .iter()
            .filter_map(|p| self.packages.get(p).cloned())
            .collect()
    }

    fn get_type_safe(&self, id: &str) -> Option<TypeRef> {
        self.types.get(id).copied()
    }

    fn set_type(&mut self, id: &str, t: TypeRef) {
        self.types.insert(id.to_string(), t);
    }

    fn get_native(&self, pkg_path: &str, name: &str) -> Option<NativeFn> {
        self.natives
            .get(&(pkg_path.to_string(), name.to_string()))
            .copied()
    }

    fn set_block_node(&mut self, location: Location, node: NodeId) {
        self.block_nodes.insert(location, node);
    }

    fn get_block_node(&self, location: &Location) -> Option<NodeId> {
        self.block_nodes.get(location).copied()
    }

    fn package_source(&self, path: &str) -> Option<Vec<(String, String)>> {
        self.sources.get(path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, NodeKind, Span};
    use crate::scope::Scopes;
    use crate::types::Types;
    use crate::values::TypedValue;

    fn noop(_: &mut crate::interp::Machine<'_>, _: Vec<TypedValue>) -> Result<Vec<TypedValue>, crate::interp::RuntimeError> {
        Ok(vec![])
    }

    #[test]
    fn test_packages_keep_load_order() {
        let mut ast = Ast::new();
        let scopes = Scopes::new();
        let mut store = MemStore::new();
        for path in ["errors", "strconv", "main"] {
            let node = ast.alloc(
                NodeKind::Package {
                    path: path.to_string(),
                    name: path.to_string(),
                    files: vec![],
                },
                Span::default(),
            );
            store.add_package(Rc::new(PackageValue::new(path, path, node, scopes.uverse)));
        }
        let paths: Vec<_> = store.packages().iter().map(|p| p.path.clone()).collect();
        assert_eq!(paths, vec!["errors", "strconv", "main"]);
        assert!(store.get_package_node("strconv").is_some());
        assert!(store.get_package("fmt").is_none());
    }

    #[test]
    fn test_natives_by_package_and_name() {
        let mut store = MemStore::new();
        store.register_native("strconv", "Itoa", noop);
        assert!(store.get_native("strconv", "Itoa").is_some());
        assert!(store.get_native("strings", "Itoa").is_none());
    }

    #[test]
    fn test_types_and_block_nodes() {
        let types = Types::new();
        let mut ast = Ast::new();
        let mut store = MemStore::new();
        store.set_type("int", types.int());
        assert_eq!(store.get_type_safe("int"), Some(types.int()));
        assert_eq!(store.num_types(), 1);

        let node = ast.alloc(NodeKind::Block { body: vec![] }, Span::at(3, 1, 5, 2));
        let loc = Location::new("main", "a.gno", Span::at(3, 1, 5, 2));
        store.set_block_node(loc.clone(), node);
        assert_eq!(store.get_block_node(&loc), Some(node));
    }

    #[test]
    fn test_package_sources() {
        let mut store = MemStore::new();
        store.add_source("errors", "errors.gno", "package errors\n");
        let files = store.package_source("errors").unwrap();
        assert_eq!(files[0].0, "errors.gno");
        assert!(store.package_source("fmt").is_none());
    }
}
