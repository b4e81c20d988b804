//! Static preprocessing
//!
//! The preprocessor walks a package once with [`transcribe`](crate::transcribe::transcribe). On the way it
//! builds a static block for every block node, resolves names to value
//! paths, folds constant expressions, resolves type expressions and caches
//! the static type of every expression, so that the machine only ever sees
//! preprocessed trees.
//!
//! Package-level declarations are handled up front by the predefinition
//! pass in [`predefine`]: every top-level name is reserved first and then
//! defined on demand, which lets declarations refer to each other in any
//! order. Function bodies are walked afterwards by the main pass.

mod expr;
mod predefine;
mod stmt;
mod typeexpr;

use crate::ast::{Ast, AttrKey, AttrValue, Field, Location, NodeId, NodeKind, get_child, render, render_header, set_child};
use crate::error::{CompileError, Result};
use crate::scope::{ScopeId, Scopes};
use crate::store::Store;
use crate::transcribe::{Control, Scoped, ScopedTransform, Stage};
use crate::types::{Kind, TypeRef, Types, check_type};
use crate::values::{PackageValue, TypedValue, convert_untyped_to};
use predefine::PackageDecls;
use std::rc::Rc;
use tracing::debug;

/// Preprocesses the package node `pkg` and registers the resulting package
/// value with `store`. Imported packages must already be in the store.
pub fn preprocess_package(
    ast: &mut Ast,
    scopes: &mut Scopes,
    types: &mut Types,
    store: &mut dyn Store,
    pkg: NodeId,
) -> Result<Rc<PackageValue>> {
    let NodeKind::Package { path, .. } = ast.kind(pkg) else {
        return Err(CompileError::syntax("expected a package node"));
    };
    let path = path.clone();
    debug!(%path, "preprocessing package");
    types.preprocessing += 1;
    let result = {
        let mut pp = Preprocessor::new(types, scopes, store, &path);
        Scoped::new(&mut pp, Vec::new()).transcribe(ast, pkg).map(|_| ())
    };
    types.preprocessing -= 1;
    result?;
    store
        .get_package(&path)
        .ok_or_else(|| CompileError::syntax(format!("package {path} was not registered")))
}

pub(crate) struct Preprocessor<'a> {
    types: &'a mut Types,
    scopes: &'a mut Scopes,
    store: &'a mut dyn Store,
    pkg_path: String,
    /// File being walked.
    file: String,
    file_index: usize,
    /// Iota of the const specs being resolved, innermost last.
    iotas: Vec<i64>,
    decls: PackageDecls,
}

impl<'a> Preprocessor<'a> {
    fn new(types: &'a mut Types, scopes: &'a mut Scopes, store: &'a mut dyn Store, pkg_path: &str) -> Self {
        Self {
            types,
            scopes,
            store,
            pkg_path: pkg_path.to_string(),
            file: String::new(),
            file_index: 0,
            iotas: Vec::new(),
            decls: PackageDecls::default(),
        }
    }

    fn location(&self, ast: &Ast, node: NodeId) -> Location {
        Location::new(self.pkg_path.clone(), self.file.clone(), ast.span(node))
    }

    fn annotate(&self, ast: &Ast, blocks: &[NodeId], node: NodeId, e: CompileError) -> CompileError {
        let stack = blocks.iter().map(|b| render_header(ast, *b)).collect();
        e.at(self.location(ast, node), stack)
    }

    /// Static block of the innermost enclosing block node.
    fn scope(&self, ast: &Ast, blocks: &[NodeId]) -> Result<ScopeId> {
        blocks
            .last()
            .and_then(|b| ast.scope(*b))
            .ok_or_else(|| CompileError::syntax("expression outside of any block"))
    }

    // ---- node construction ----

    fn new_const(&self, ast: &mut Ast, tv: TypedValue, source: NodeId) -> NodeId {
        let span = ast.span(source);
        let id = ast.alloc(NodeKind::Const { tv, source }, span);
        ast.set_attr(id, AttrKey::Preprocessed, AttrValue::Flag);
        id
    }

    fn new_const_type(&self, ast: &mut Ast, ty: TypeRef, source: NodeId) -> NodeId {
        let span = ast.span(source);
        let id = ast.alloc(NodeKind::ConstType { ty, source }, span);
        ast.set_attr(id, AttrKey::Preprocessed, AttrValue::Flag);
        id
    }

    /// Walks the child of `parent` at `field[index]` ahead of the main walk
    /// and stores the replacement back into `parent`.
    fn nested(&mut self, ast: &mut Ast, blocks: &[NodeId], parent: NodeId, field: Field, index: usize) -> Result<Option<NodeId>> {
        let Some(child) = get_child(ast.kind(parent), field, index) else {
            return Ok(None);
        };
        let new = Scoped::new(self, blocks.to_vec()).transcribe(ast, child)?;
        if new != child {
            set_child(ast.kind_mut(parent), field, index, new);
        }
        Ok(Some(new))
    }

    /// Walks every child of `parent` in `field` ahead of the main walk.
    fn nested_all(&mut self, ast: &mut Ast, blocks: &[NodeId], parent: NodeId, field: Field) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut i = 0;
        while let Some(n) = self.nested(ast, blocks, parent, field, i)? {
            out.push(n);
            i += 1;
        }
        Ok(out)
    }

    // ---- static types ----

    /// Static type of a preprocessed expression. `None` for nil and for
    /// expressions without a value.
    fn type_of(&self, ast: &Ast, n: NodeId) -> Option<TypeRef> {
        match ast.kind(n) {
            NodeKind::Const { tv, .. } => tv.ty,
            NodeKind::ConstType { .. } => Some(self.types.type_type()),
            _ => ast.type_of(n),
        }
    }

    fn set_type_of(&self, ast: &mut Ast, n: NodeId, t: Option<TypeRef>) {
        match t {
            Some(t) => ast.set_attr(n, AttrKey::TypeOf, AttrValue::Type(t)),
            None => ast.del_attr(n, AttrKey::TypeOf),
        }
    }

    /// The type a type expression resolved to.
    fn type_value(&self, ast: &Ast, n: NodeId) -> Result<TypeRef> {
        match ast.kind(n) {
            NodeKind::ConstType { ty, .. } => Ok(*ty),
            _ => Err(CompileError::type_error(format!("{} is not a type", render(ast, n)))),
        }
    }

    fn type_name(&self, t: Option<TypeRef>) -> String {
        match t {
            Some(t) => self.types.type_string(t),
            None => "nil".to_string(),
        }
    }

    fn kind_of(&self, t: Option<TypeRef>) -> Kind {
        t.map_or(Kind::Invalid, |t| self.types.kind(t))
    }

    fn is_untyped_const(&self, ast: &Ast, n: NodeId) -> bool {
        matches!(ast.kind(n), NodeKind::Const { tv, .. } if tv.ty.is_some_and(|t| self.types.is_untyped(t)))
    }

    fn is_nil(&self, ast: &Ast, n: NodeId) -> bool {
        matches!(ast.kind(n), NodeKind::Const { tv, .. } if tv.is_undefined())
    }

    // ---- conversions ----

    /// Gives the untyped constant at `n` the type `t`, or its default type
    /// when `t` is `None` or an interface. Other nodes are left alone.
    fn convert_const(&mut self, ast: &mut Ast, n: NodeId, t: Option<TypeRef>) -> Result<()> {
        let types = &*self.types;
        if let NodeKind::Const { tv, .. } = ast.kind_mut(n)
            && tv.ty.is_some_and(|ty| types.is_untyped(ty))
        {
            convert_untyped_to(types, tv, t)?;
        }
        Ok(())
    }

    /// Makes the expression at `n` usable where a `dst` is expected:
    /// untyped constants and nil are converted, anything else must be
    /// assignable.
    fn assign_to(&mut self, ast: &mut Ast, n: NodeId, dst: TypeRef) -> Result<()> {
        if self.is_nil(ast, n) {
            return self.convert_nil(ast, n, dst);
        }
        if self.is_untyped_const(ast, n) {
            let src = self.type_of(ast, n);
            if let Some(src) = src {
                check_type(self.types, src, dst, true).map_err(CompileError::type_error)?;
            }
            return self.convert_const(ast, n, Some(dst));
        }
        match self.type_of(ast, n) {
            Some(src) => check_type(self.types, src, dst, true).map_err(CompileError::type_error),
            None => Err(CompileError::type_error(format!(
                "{} (no value) used as value",
                render(ast, n)
            ))),
        }
    }

    fn convert_nil(&mut self, ast: &mut Ast, n: NodeId, dst: TypeRef) -> Result<()> {
        match self.types.kind(dst) {
            Kind::Interface => Ok(()),
            Kind::Pointer | Kind::Slice | Kind::Map | Kind::Func | Kind::Chan => {
                if let NodeKind::Const { tv, .. } = ast.kind_mut(n) {
                    tv.ty = Some(dst);
                }
                Ok(())
            }
            _ => Err(CompileError::type_error(format!(
                "cannot use nil as {} value",
                self.types.type_string(dst)
            ))),
        }
    }

    /// Gives the expression at `n` a concrete type: untyped constants take
    /// their default type.
    fn default_const(&mut self, ast: &mut Ast, n: NodeId) -> Result<()> {
        self.convert_const(ast, n, None)
    }
}

impl ScopedTransform for Preprocessor<'_> {
    type Error = CompileError;

    fn transform(
        &mut self,
        ast: &mut Ast,
        blocks: &[NodeId],
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
        stage: Stage,
    ) -> Result<(NodeId, Control)> {
        let result = match stage {
            Stage::Enter => {
                if ast.is_preprocessed(node) {
                    return Ok((node, Control::Skip));
                }
                self.enter(ast, blocks, node)
            }
            Stage::Block => self.open_block(ast, blocks, node).map(|_| (node, Control::Continue)),
            Stage::Block2 => self.open_block2(ast, node).map(|_| (node, Control::Continue)),
            Stage::Leave => self
                .leave(ast, blocks, ancestors, field, index, node)
                .map(|n| {
                    ast.set_attr(n, AttrKey::Preprocessed, AttrValue::Flag);
                    (n, Control::Continue)
                }),
        };
        result.map_err(|e| self.annotate(ast, blocks, node, e))
    }
}

impl Preprocessor<'_> {
    fn enter(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<(NodeId, Control)> {
        match ast.kind(node) {
            NodeKind::Assign {
                op: crate::ast::AssignOp::Define,
                ..
            } => {
                self.define_assign(ast, blocks, node)?;
                ast.set_attr(node, AttrKey::Preprocessed, AttrValue::Flag);
                Ok((node, Control::Skip))
            }
            NodeKind::Assign { lhs, rhs, .. } => {
                let (n, rhs) = (lhs.len(), rhs.clone());
                self.mark_comma_ok(ast, n, rhs);
                Ok((node, Control::Continue))
            }
            NodeKind::ValueDecl { names, values, is_const, .. } => {
                let (n, values, is_const) = (names.len(), values.clone(), *is_const);
                self.mark_comma_ok(ast, n, values);
                if is_const {
                    let iota = match ast.attr(node, AttrKey::Iota) {
                        Some(AttrValue::Int(i)) => *i,
                        _ => 0,
                    };
                    self.iotas.push(iota);
                }
                Ok((node, Control::Continue))
            }
            NodeKind::TypeDecl { .. } => {
                self.enter_type_decl(ast, blocks, node)?;
                Ok((node, Control::Continue))
            }
            NodeKind::CompositeLit { .. } => {
                self.enter_composite(ast, blocks, node)?;
                Ok((node, Control::Continue))
            }
            NodeKind::Import { .. } => Err(CompileError::syntax("imports must appear at file level")),
            _ => Ok((node, Control::Continue)),
        }
    }

    fn leave(
        &mut self,
        ast: &mut Ast,
        blocks: &[NodeId],
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
    ) -> Result<NodeId> {
        match ast.kind(node) {
            NodeKind::Name { .. }
            | NodeKind::BasicLit { .. }
            | NodeKind::Binary { .. }
            | NodeKind::Unary { .. }
            | NodeKind::Call { .. }
            | NodeKind::Index { .. }
            | NodeKind::Selector { .. }
            | NodeKind::Slice { .. }
            | NodeKind::Star { .. }
            | NodeKind::Ref { .. }
            | NodeKind::TypeAssert { .. }
            | NodeKind::CompositeLit { .. }
            | NodeKind::KeyValue { .. }
            | NodeKind::FuncLit { .. } => self.leave_expr(ast, blocks, node),
            NodeKind::Const { .. } | NodeKind::ConstType { .. } => Ok(node),
            NodeKind::Field { .. }
            | NodeKind::ArrayType { .. }
            | NodeKind::SliceType { .. }
            | NodeKind::PointerType { .. }
            | NodeKind::InterfaceType { .. }
            | NodeKind::ChanType { .. }
            | NodeKind::FuncType { .. }
            | NodeKind::MapType { .. }
            | NodeKind::StructType { .. } => self.leave_type_expr(ast, node),
            NodeKind::Package { .. } => self.finish_package(ast, node),
            NodeKind::File { .. } => Ok(node),
            _ => self.leave_stmt(ast, blocks, ancestors, field, index, node),
        }
    }
}

#[cfg(test)]
mod tests;
