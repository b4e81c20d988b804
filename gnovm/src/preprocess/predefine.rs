//! Package-level declarations
//!
//! Top-level names are reserved before anything is resolved, so a
//! declaration may refer to one further down the file or in another file
//! of the package. A reference to a reserved name resolves its declaration
//! on the spot; a declaration that is reached again while it is still being
//! resolved is a cycle.

use super::Preprocessor;
use crate::ast::{Ast, AttrKey, AttrValue, Field, Location, Name, NodeId, NodeKind};
use crate::error::{CompileError, Result};
use crate::scope::{BlockKind, NameSource, ScopeId};
use crate::types::{Method, Type, TypeRef};
use crate::values::{Closure, FuncValue, PackageValue, TypedValue, Value};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// A package-level name a declaration depends on.
#[derive(Debug, Clone)]
pub(super) enum Dep {
    Name(Name),
    /// Any method of this name.
    Method(Name),
}

#[derive(Debug)]
struct FileInfo {
    node: NodeId,
    scope: ScopeId,
    name: String,
}

#[derive(Default)]
pub(super) struct PackageDecls {
    node: Option<NodeId>,
    pub(super) scope: Option<ScopeId>,
    files: Vec<FileInfo>,
    /// Reserved names whose declaration has not been resolved.
    pending: HashMap<Name, NodeId>,
    decl_file: HashMap<NodeId, usize>,
    resolved: HashSet<NodeId>,
    /// Declarations being resolved, innermost last.
    resolving: Vec<NodeId>,
    declared: Vec<TypeRef>,
    inits: Vec<Rc<FuncValue>>,
    /// Top-level declaration whose parts are being walked.
    pub(super) current: Option<NodeId>,
    pub(super) deps: HashMap<NodeId, Vec<Dep>>,
    var_decls: Vec<NodeId>,
    var_of: HashMap<Name, NodeId>,
    func_of: HashMap<Name, NodeId>,
    methods_of: HashMap<Name, Vec<NodeId>>,
}

impl PackageDecls {
    pub(super) fn record(&mut self, dep: Dep) {
        if let Some(cur) = self.current {
            self.deps.entry(cur).or_default().push(dep);
        }
    }
}

fn redeclared(name: &str) -> CompileError {
    CompileError::name(format!("{name} redeclared in this block"))
}

impl Preprocessor<'_> {
    fn pkg_scope(&self) -> Result<ScopeId> {
        self.decls
            .scope
            .ok_or_else(|| CompileError::syntax("package block not open"))
    }

    pub(super) fn file_scope(&self) -> Result<ScopeId> {
        self.decls
            .files
            .get(self.file_index)
            .map(|f| f.scope)
            .ok_or_else(|| CompileError::syntax("file block not open"))
    }

    fn file_blocks(&self) -> Result<Vec<NodeId>> {
        let pkg = self
            .decls
            .node
            .ok_or_else(|| CompileError::syntax("package block not open"))?;
        let file = self
            .decls
            .files
            .get(self.file_index)
            .ok_or_else(|| CompileError::syntax("file block not open"))?;
        Ok(vec![pkg, file.node])
    }

    fn enter_file_index(&mut self, i: usize) {
        if let Some(f) = self.decls.files.get(i) {
            self.file_index = i;
            self.file = f.name.clone();
        }
    }

    /// Makes `node` the file being walked by the main pass.
    pub(super) fn open_file(&mut self, node: NodeId) -> Result<()> {
        let i = self
            .decls
            .files
            .iter()
            .position(|f| f.node == node)
            .ok_or_else(|| CompileError::syntax("file is not part of the package"))?;
        self.enter_file_index(i);
        Ok(())
    }

    /// Opens the package and file blocks and predefines every top-level
    /// declaration.
    pub(super) fn open_package(&mut self, ast: &mut Ast, node: NodeId) -> Result<()> {
        let NodeKind::Package { files, .. } = ast.kind(node) else {
            return Err(CompileError::syntax("expected a package node"));
        };
        let files = files.clone();
        let uverse = self.scopes.uverse;
        let loc = Location::new(self.pkg_path.clone(), "", ast.span(node));
        let pkg_sid = self.scopes.new_block(Some(node), BlockKind::Package, loc.clone(), uverse);
        ast.set_scope(node, pkg_sid);
        self.store.set_block_node(loc, node);
        self.decls.node = Some(node);
        self.decls.scope = Some(pkg_sid);

        for &f in &files {
            let NodeKind::File { name, .. } = ast.kind(f) else {
                return Err(CompileError::syntax("expected a file node"));
            };
            let name = name.clone();
            let loc = Location::new(self.pkg_path.clone(), name.clone(), ast.span(f));
            let sid = self.scopes.new_block(Some(f), BlockKind::File, loc.clone(), pkg_sid);
            ast.set_scope(f, sid);
            self.store.set_block_node(loc, f);
            self.decls.files.push(FileInfo { node: f, scope: sid, name });
        }

        let mut by_kind: [Vec<NodeId>; 3] = Default::default();
        for (i, &f) in files.iter().enumerate() {
            self.enter_file_index(i);
            let NodeKind::File { decls, .. } = ast.kind(f) else {
                continue;
            };
            for d in decls.clone() {
                self.decls.decl_file.insert(d, i);
                match ast.kind(d) {
                    NodeKind::Import { .. } => self.define_import(ast, d)?,
                    NodeKind::TypeDecl { .. } => {
                        self.reserve_type(ast, d)?;
                        by_kind[0].push(d);
                    }
                    NodeKind::FuncDecl { .. } => {
                        self.reserve_func(ast, d)?;
                        by_kind[1].push(d);
                    }
                    NodeKind::ValueDecl { .. } => {
                        self.reserve_values(ast, d)?;
                        by_kind[2].push(d);
                    }
                    other => {
                        return Err(CompileError::syntax(format!(
                            "unexpected {} at file level",
                            other.name()
                        )));
                    }
                }
            }
        }
        for decl in by_kind.into_iter().flatten() {
            self.resolve_decl(ast, decl)?;
        }
        for t in std::mem::take(&mut self.decls.declared) {
            self.types.seal(t).map_err(CompileError::type_error)?;
        }
        let pkg = self.pkg_scope()?;
        self.scopes.commit(pkg);
        self.enter_file_index(0);
        debug!(pkg = %self.pkg_path, files = files.len(), "predefined package");
        Ok(())
    }

    fn define_import(&mut self, ast: &mut Ast, decl: NodeId) -> Result<()> {
        let NodeKind::Import { name, path } = ast.kind(decl) else {
            return Ok(());
        };
        let (name, path) = (name.clone(), path.clone());
        let pv = self
            .store
            .get_package(&path)
            .ok_or_else(|| CompileError::name(format!("could not import {path} (unknown package)")))?;
        let local = name.unwrap_or_else(|| pv.name.clone());
        match local.as_str() {
            "_" => {}
            "." => return Err(CompileError::syntax("dot imports are not supported")),
            _ => {
                let sid = self.file_scope()?;
                if self.scopes.get(sid).local_index(&local).is_some() {
                    return Err(redeclared(&local));
                }
                let pt = self.types.package();
                self.scopes
                    .define2(self.types, sid, false, &local, Some(pt), TypedValue::new(pt, Value::Package(pv)), NameSource::Import)
                    .map_err(CompileError::name)?;
            }
        }
        ast.set_attr(decl, AttrKey::Preprocessed, AttrValue::Flag);
        Ok(())
    }

    fn reserve_name(&mut self, name: &str, is_const: bool, source: NameSource, decl: NodeId) -> Result<()> {
        if name == "_" {
            return Ok(());
        }
        let sid = self.pkg_scope()?;
        if self.scopes.get(sid).local_index(name).is_some() {
            return Err(redeclared(name));
        }
        self.scopes
            .reserve(sid, is_const, name, source)
            .map_err(CompileError::name)?;
        self.decls.pending.insert(name.to_string(), decl);
        Ok(())
    }

    /// Named types are declared right away so that type bodies can refer
    /// to themselves through pointers.
    fn reserve_type(&mut self, ast: &Ast, decl: NodeId) -> Result<()> {
        let NodeKind::TypeDecl { name, is_alias, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let name = name.name.clone();
        if *is_alias {
            return self.reserve_name(&name, false, NameSource::Type, decl);
        }
        let sid = self.pkg_scope()?;
        if self.scopes.get(sid).local_index(&name).is_some() {
            return Err(redeclared(&name));
        }
        let t = self.types.declare(&self.pkg_path, &name, None);
        let tt = self.types.type_type();
        self.scopes
            .define2(self.types, sid, false, &name, Some(tt), TypedValue::new(tt, Value::Type(t)), NameSource::Type)
            .map_err(CompileError::name)?;
        let id = self.types.type_id(t);
        self.store.set_type(&id, t);
        self.decls.declared.push(t);
        self.decls.pending.insert(name, decl);
        Ok(())
    }

    fn reserve_func(&mut self, ast: &Ast, decl: NodeId) -> Result<()> {
        let NodeKind::FuncDecl { recv, name, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let name = name.clone();
        if recv.is_some() {
            self.decls.methods_of.entry(name).or_default().push(decl);
            return Ok(());
        }
        if name == "init" {
            return Ok(());
        }
        self.reserve_name(&name, false, NameSource::Func, decl)?;
        // known to be a function before its signature is resolved
        let sid = self.pkg_scope()?;
        let ph = self.types.new_placeholder();
        self.scopes
            .define2(self.types, sid, false, &name, Some(ph), TypedValue::new(ph, Value::None), NameSource::Func)
            .map_err(CompileError::name)?;
        self.decls.func_of.insert(name, decl);
        Ok(())
    }

    fn reserve_values(&mut self, ast: &Ast, decl: NodeId) -> Result<()> {
        let NodeKind::ValueDecl { names, is_const, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let is_const = *is_const;
        let source = if is_const { NameSource::Const } else { NameSource::Var };
        let names: Vec<Name> = names.iter().map(|n| n.name.clone()).collect();
        for name in &names {
            self.reserve_name(name, is_const, source, decl)?;
            if !is_const && name != "_" {
                self.decls.var_of.insert(name.clone(), decl);
            }
        }
        if !is_const {
            self.decls.var_decls.push(decl);
        }
        Ok(())
    }

    /// Resolves the declaration of the reserved package-level `name`.
    pub(super) fn resolve_pending(&mut self, ast: &mut Ast, name: &str) -> Result<()> {
        match self.decls.pending.get(name).copied() {
            Some(decl) => self.resolve_decl(ast, decl),
            None => Ok(()),
        }
    }

    fn resolve_decl(&mut self, ast: &mut Ast, decl: NodeId) -> Result<()> {
        if self.decls.resolved.contains(&decl) {
            return Ok(());
        }
        if self.decls.resolving.contains(&decl) {
            return Err(self.cycle_error(ast, decl));
        }
        let file = self.decls.decl_file.get(&decl).copied().unwrap_or(0);
        let saved = (self.file_index, self.file.clone(), self.decls.current);
        let saved_iotas = std::mem::take(&mut self.iotas);
        self.enter_file_index(file);
        self.decls.resolving.push(decl);
        self.decls.current = Some(decl);
        trace!(decl = ast.kind(decl).name(), file = %self.file, "resolving declaration");

        let result = self.file_blocks().and_then(|blocks| match ast.kind(decl) {
            NodeKind::TypeDecl { .. } => self.predefine_type(ast, &blocks, decl),
            NodeKind::FuncDecl { .. } => self.predefine_func(ast, &blocks, decl),
            NodeKind::ValueDecl { .. } => self.predefine_values(ast, &blocks, decl),
            _ => Ok(()),
        });

        let result = result.map_err(|e| e.at(self.location(ast, decl), Vec::new()));
        self.decls.resolving.pop();
        self.iotas = saved_iotas;
        (self.file_index, self.file, self.decls.current) = saved;
        if result.is_err() {
            let pkg = self.pkg_scope()?;
            self.scopes.rollback(self.types, pkg);
        }
        result?;
        self.decls.resolved.insert(decl);
        self.decls.pending.retain(|_, d| *d != decl);
        Ok(())
    }

    fn cycle_error(&self, ast: &Ast, decl: NodeId) -> CompileError {
        match ast.kind(decl) {
            NodeKind::TypeDecl { name, .. } => {
                CompileError::type_error(format!("invalid recursive type {}", name.name))
            }
            NodeKind::ValueDecl { names, .. } => {
                let name = names.first().map(|n| n.name.as_str()).unwrap_or("_");
                CompileError::type_error(format!("initialization cycle: {name} refers to itself"))
            }
            NodeKind::FuncDecl { name, .. } => {
                CompileError::type_error(format!("initialization cycle: {name} refers to itself"))
            }
            _ => CompileError::type_error("declaration cycle"),
        }
    }

    fn predefine_type(&mut self, ast: &mut Ast, blocks: &[NodeId], decl: NodeId) -> Result<()> {
        let NodeKind::TypeDecl { name, is_alias, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let (name, is_alias) = (name.name.clone(), *is_alias);
        let ty = self
            .nested(ast, blocks, decl, Field::Type, 0)?
            .ok_or_else(|| CompileError::syntax("type declaration without type"))?;
        let t = self.type_value(ast, ty)?;
        let pkg = self.pkg_scope()?;
        let tt = self.types.type_type();
        let declared = if is_alias {
            self.scopes
                .define2(self.types, pkg, false, &name, Some(tt), TypedValue::new(tt, Value::Type(t)), NameSource::Type)
                .map_err(CompileError::name)?;
            t
        } else {
            let idx = self
                .scopes
                .get(pkg)
                .local_index(&name)
                .ok_or_else(|| CompileError::name(format!("name {name} not declared")))?;
            let Value::Type(d) = self.scopes.get(pkg).values[idx as usize].v else {
                return Err(CompileError::syntax(format!("{name} is not a declared type")));
            };
            self.types.set_base(d, t).map_err(CompileError::type_error)?;
            if self.contains_type(d, self.types.base_of(t), &mut HashSet::new()) {
                return Err(CompileError::type_error(format!("invalid recursive type {name}")));
            }
            d
        };
        self.finish_type_decl(ast, decl, declared, ty, self.file_scope()?)
    }

    /// Whether a value of type `t` holds a `target` inline, not through a
    /// reference.
    pub(super) fn contains_type(&self, target: TypeRef, t: TypeRef, seen: &mut HashSet<TypeRef>) -> bool {
        if self.types.same(t, target) {
            return true;
        }
        if !seen.insert(t) {
            return false;
        }
        match self.types.get(t) {
            Type::Declared(dt) => dt.base.is_some_and(|b| self.contains_type(target, b, seen)),
            Type::Array { elt, .. } => self.contains_type(target, *elt, seen),
            Type::Struct { fields, .. } => fields
                .iter()
                .any(|f| self.contains_type(target, f.ty, seen)),
            _ => false,
        }
    }

    /// Points the declaration at its declared type and gives its name a
    /// path relative to `sid`.
    pub(super) fn finish_type_decl(&mut self, ast: &mut Ast, decl: NodeId, declared: TypeRef, ty: NodeId, sid: ScopeId) -> Result<()> {
        let ct = self.new_const_type(ast, declared, ty);
        let NodeKind::TypeDecl { name, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let path = self
            .scopes
            .get_path_for_name(sid, &name.name)
            .map_err(CompileError::name)?;
        if let NodeKind::TypeDecl { name, ty, .. } = ast.kind_mut(decl) {
            *ty = ct;
            name.path = Some(path);
        }
        ast.set_attr(decl, AttrKey::Preprocessed, AttrValue::Flag);
        Ok(())
    }

    fn predefine_func(&mut self, ast: &mut Ast, blocks: &[NodeId], decl: NodeId) -> Result<()> {
        let NodeKind::FuncDecl { name, body, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let (name, has_body) = (name.clone(), body.is_some());
        let recv = match self.nested(ast, blocks, decl, Field::Recv, 0)? {
            Some(r) => {
                let NodeKind::Field { ty, .. } = ast.kind(r) else {
                    return Err(CompileError::syntax("malformed receiver"));
                };
                Some(self.type_value(ast, *ty)?)
            }
            None => None,
        };
        let ty = self
            .nested(ast, blocks, decl, Field::Type, 0)?
            .ok_or_else(|| CompileError::syntax("function without signature"))?;
        let sig = self.type_value(ast, ty)?;
        let (params, results, variadic) = self
            .types
            .signature(sig)
            .map(|(p, r, v)| (p.to_vec(), r.to_vec(), v))
            .ok_or_else(|| CompileError::syntax("function signature is not a func type"))?;

        let native = if has_body {
            None
        } else {
            let native = self.store.get_native(&self.pkg_path, &name).ok_or_else(|| {
                CompileError::syntax(format!("missing function body for {name}"))
            })?;
            Some(native)
        };
        let fty = match recv {
            Some(r) => {
                let mut all = vec![r];
                all.extend(params.iter().copied());
                self.types.func(all, results.clone(), variadic)
            }
            None => sig,
        };
        let fv = Rc::new(FuncValue {
            ty: fty,
            name: name.clone(),
            source: Some(decl),
            pkg_path: self.pkg_path.clone(),
            closure: Some(Closure::File {
                pkg_path: self.pkg_path.clone(),
                file: self.file_index,
            }),
            captures: Vec::new(),
            native,
            is_method: recv.is_some(),
        });

        if let Some(r) = recv {
            let (ptr_receiver, base) = match self.types.get(r) {
                Type::Pointer(e) => (true, *e),
                _ => (false, r),
            };
            let owner = self.types.declared(base).ok_or_else(|| {
                CompileError::type_error(format!(
                    "invalid receiver type {}",
                    self.types.type_string(r)
                ))
            })?;
            if owner.pkg_path != self.pkg_path {
                return Err(CompileError::type_error(format!(
                    "cannot define new methods on non-local type {}",
                    self.types.type_string(base)
                )));
            }
            if owner.find_method(&name).is_some() {
                return Err(CompileError::name(format!(
                    "method {}.{name} already declared",
                    owner.name
                )));
            }
            if matches!(self.types.base(base), Type::Pointer(_) | Type::Interface { .. }) {
                return Err(CompileError::type_error(format!(
                    "invalid receiver type {}",
                    self.types.type_string(base)
                )));
            }
            self.types
                .add_method(base, Method { name: name.clone(), ty: sig, ptr_receiver, func: None })
                .map_err(CompileError::type_error)?;
            self.types
                .set_method_func(base, &name, fv)
                .map_err(CompileError::type_error)?;
            return Ok(());
        }
        if name == "init" || (name == "main" && self.is_main_package(ast)) {
            if !params.is_empty() || !results.is_empty() {
                return Err(CompileError::type_error(format!(
                    "func {name} must have no arguments and no return values"
                )));
            }
        }
        if name == "init" {
            self.decls.inits.push(fv);
            return Ok(());
        }
        let pkg = self.pkg_scope()?;
        self.scopes
            .define2(self.types, pkg, false, &name, Some(fty), TypedValue::new(fty, Value::Func(fv)), NameSource::Func)
            .map_err(CompileError::name)?;
        Ok(())
    }

    fn is_main_package(&self, ast: &Ast) -> bool {
        self.decls
            .node
            .is_some_and(|n| matches!(ast.kind(n), NodeKind::Package { name, .. } if name == "main"))
    }

    fn predefine_values(&mut self, ast: &mut Ast, blocks: &[NodeId], decl: NodeId) -> Result<()> {
        let NodeKind::ValueDecl { names, values, is_const, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let is_const = *is_const;
        let num_names = names.len();
        self.mark_comma_ok(ast, num_names, values.clone());
        if is_const {
            let iota = match ast.attr(decl, AttrKey::Iota) {
                Some(AttrValue::Int(i)) => *i,
                _ => 0,
            };
            self.iotas.push(iota);
        }
        let ty = match self.nested(ast, blocks, decl, Field::Type, 0)? {
            Some(n) => Some(self.type_value(ast, n)?),
            None => None,
        };
        let vals = self.nested_all(ast, blocks, decl, Field::Values);
        if is_const {
            self.iotas.pop();
        }
        let vals = vals?;
        let defs = self.value_decl_types(ast, num_names, ty, &vals, is_const)?;
        let pkg = self.pkg_scope()?;
        let file = self.file_scope()?;
        let NodeKind::ValueDecl { names, .. } = ast.kind(decl) else {
            return Ok(());
        };
        let names: Vec<Name> = names.iter().map(|n| n.name.clone()).collect();
        let mut paths = Vec::with_capacity(names.len());
        for (name, (t, tv)) in names.iter().zip(defs) {
            if name != "_" {
                let source = if is_const { NameSource::Const } else { NameSource::Var };
                self.scopes
                    .define2(self.types, pkg, is_const, name, Some(t), tv, source)
                    .map_err(CompileError::name)?;
            }
            paths.push(self.scopes.get_path_for_name(file, name).map_err(CompileError::name)?);
        }
        if let NodeKind::ValueDecl { names, .. } = ast.kind_mut(decl) {
            for (ident, path) in names.iter_mut().zip(paths) {
                ident.path = Some(path);
            }
        }
        ast.set_attr(decl, AttrKey::Preprocessed, AttrValue::Flag);
        Ok(())
    }

    /// Closes the package: orders variable initialization and registers
    /// the package value.
    pub(super) fn finish_package(&mut self, ast: &Ast, node: NodeId) -> Result<NodeId> {
        let NodeKind::Package { name, path, .. } = ast.kind(node) else {
            return Err(CompileError::syntax("expected a package node"));
        };
        let sid = self.pkg_scope()?;
        let order = self.init_order()?;
        debug!(pkg = %path, vars = order.len(), inits = self.decls.inits.len(), "package preprocessed");
        let pv = PackageValue::new(name.clone(), path.clone(), node, sid);
        *pv.init_order.borrow_mut() = order;
        *pv.inits.borrow_mut() = std::mem::take(&mut self.decls.inits);
        self.store.add_package(Rc::new(pv));
        Ok(node)
    }

    /// Variable declarations in initialization order: repeatedly the
    /// earliest declaration whose initializer reads, directly or through
    /// called functions, only variables that are already initialized.
    fn init_order(&self) -> Result<Vec<(usize, NodeId)>> {
        let mut deps: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for &decl in &self.decls.var_decls {
            deps.insert(decl, self.var_deps(decl)?);
        }
        let mut done = HashSet::new();
        let mut visiting = HashSet::new();
        for &decl in &self.decls.var_decls {
            check_init_cycle(decl, &deps, &mut visiting, &mut done)?;
        }

        let mut pending: Vec<NodeId> = self.decls.var_decls.clone();
        let mut ready = HashSet::new();
        let mut order = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let i = pending
                .iter()
                .position(|d| deps.get(d).is_none_or(|ds| ds.iter().all(|x| ready.contains(x))))
                .ok_or_else(|| CompileError::type_error("initialization cycle"))?;
            let decl = pending.remove(i);
            ready.insert(decl);
            let file = self.decls.decl_file.get(&decl).copied().unwrap_or(0);
            order.push((file, decl));
        }
        Ok(order)
    }

    /// Variable declarations the initializer of `decl` depends on.
    fn var_deps(&self, decl: NodeId) -> Result<Vec<NodeId>> {
        let mut seen_funcs = HashSet::new();
        let mut stack = vec![decl];
        let mut var_deps = Vec::new();
        while let Some(d) = stack.pop() {
            let Some(deps) = self.decls.deps.get(&d) else {
                continue;
            };
            for dep in deps {
                let funcs: Vec<NodeId> = match dep {
                    Dep::Name(n) => {
                        if let Some(&vd) = self.decls.var_of.get(n) {
                            if vd == decl && d != decl {
                                return Err(CompileError::type_error(format!(
                                    "initialization cycle: {n} refers to itself"
                                )));
                            }
                            if vd != decl && !var_deps.contains(&vd) {
                                var_deps.push(vd);
                            }
                        }
                        self.decls.func_of.get(n).copied().into_iter().collect()
                    }
                    Dep::Method(m) => self.decls.methods_of.get(m).cloned().unwrap_or_default(),
                };
                for f in funcs {
                    if seen_funcs.insert(f) {
                        stack.push(f);
                    }
                }
            }
        }
        Ok(var_deps)
    }
}

fn check_init_cycle(
    decl: NodeId,
    deps: &HashMap<NodeId, Vec<NodeId>>,
    visiting: &mut HashSet<NodeId>,
    done: &mut HashSet<NodeId>,
) -> Result<()> {
    if done.contains(&decl) {
        return Ok(());
    }
    if !visiting.insert(decl) {
        return Err(CompileError::type_error("initialization cycle"));
    }
    for &d in deps.get(&decl).map(Vec::as_slice).unwrap_or_default() {
        check_init_cycle(d, deps, visiting, done)?;
    }
    visiting.remove(&decl);
    done.insert(decl);
    Ok(())
}

