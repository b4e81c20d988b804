//! Type expressions
//!
//! Every type expression is replaced by a `ConstType` holding the resolved
//! type. The original node stays reachable as the `ConstType` source, which
//! is how function declarations find parameter names and the variadic
//! marker.

use super::Preprocessor;
use crate::ast::{Ast, Name, NodeId, NodeKind};
use crate::error::{CompileError, Result};
use crate::types::{FieldType, Type, TypeRef};
use std::collections::HashSet;

impl Preprocessor<'_> {
    pub(super) fn leave_type_expr(&mut self, ast: &mut Ast, node: NodeId) -> Result<NodeId> {
        let t = match ast.kind(node).clone() {
            NodeKind::Field { .. } => return Ok(node),
            NodeKind::ArrayType { len, elt } => {
                let elt = self.type_value(ast, elt)?;
                let len = len.ok_or_else(|| CompileError::syntax("invalid use of [...] array outside a composite literal"))?;
                let n = self.array_len(ast, len)?;
                self.types.array(n, elt)
            }
            NodeKind::SliceType { elt, .. } => {
                let elt = self.type_value(ast, elt)?;
                self.types.slice(elt)
            }
            NodeKind::PointerType { elt } => {
                let elt = self.type_value(ast, elt)?;
                self.types.pointer(elt)
            }
            NodeKind::MapType { key, value } => {
                let key = self.type_value(ast, key)?;
                let value = self.type_value(ast, value)?;
                let known = self.types.declared(key).is_none_or(|d| d.base.is_some());
                if known && !self.types.kind(key).is_comparable() {
                    return Err(CompileError::type_error(format!(
                        "invalid map key type {}",
                        self.types.type_string(key)
                    )));
                }
                self.types.map(key, value)
            }
            NodeKind::ChanType { dir, value } => {
                let elt = self.type_value(ast, value)?;
                self.types.chan(dir, elt)
            }
            NodeKind::FuncType { params, results } => {
                let variadic = params.last().is_some_and(|p| self.is_variadic_param(ast, *p));
                let params = self.field_types(ast, &params)?;
                let results = self.field_types(ast, &results)?;
                self.types.func(params, results, variadic)
            }
            NodeKind::StructType { fields } => self.struct_type(ast, &fields)?,
            NodeKind::InterfaceType { methods } => self.interface_type(ast, &methods)?,
            other => {
                return Err(CompileError::syntax(format!("{} is not a type expression", other.name())));
            }
        };
        Ok(self.new_const_type(ast, t, node))
    }

    fn array_len(&self, ast: &Ast, len: NodeId) -> Result<usize> {
        let NodeKind::Const { tv, .. } = ast.kind(len) else {
            return Err(CompileError::type_error(format!(
                "array length {} must be constant",
                crate::ast::render(ast, len)
            )));
        };
        tv.as_index().ok_or_else(|| {
            CompileError::type_error(format!(
                "invalid array length {}",
                crate::ast::render(ast, len)
            ))
        })
    }

    fn is_variadic_param(&self, ast: &Ast, field: NodeId) -> bool {
        let NodeKind::Field { ty, .. } = ast.kind(field) else {
            return false;
        };
        match ast.kind(*ty) {
            NodeKind::ConstType { source, .. } => {
                matches!(ast.kind(*source), NodeKind::SliceType { vrd: true, .. })
            }
            NodeKind::SliceType { vrd, .. } => *vrd,
            _ => false,
        }
    }

    /// Name and type of a `Field` node whose type has been resolved.
    pub(super) fn field_of(&self, ast: &Ast, field: NodeId) -> Result<(Option<Name>, TypeRef)> {
        let NodeKind::Field { name, ty, .. } = ast.kind(field) else {
            return Err(CompileError::syntax("expected a field"));
        };
        Ok((name.clone(), self.type_value(ast, *ty)?))
    }

    fn field_types(&self, ast: &Ast, fields: &[NodeId]) -> Result<Vec<TypeRef>> {
        fields
            .iter()
            .map(|f| self.field_of(ast, *f).map(|(_, t)| t))
            .collect()
    }

    /// Resolves a package-level declared type whose body has not been
    /// walked yet.
    fn resolve_declared(&mut self, ast: &mut Ast, t: TypeRef) -> Result<()> {
        let pending = match self.types.declared(t) {
            Some(dt) if dt.base.is_none() && dt.local.is_none() && dt.pkg_path == self.pkg_path => Some(dt.name.clone()),
            _ => None,
        };
        match pending {
            Some(name) => self.resolve_pending(ast, &name),
            None => Ok(()),
        }
    }

    fn struct_type(&mut self, ast: &Ast, fields: &[NodeId]) -> Result<TypeRef> {
        let mut out: Vec<FieldType> = Vec::with_capacity(fields.len());
        let mut seen = HashSet::new();
        for &f in fields {
            let NodeKind::Field { tag, .. } = ast.kind(f) else {
                continue;
            };
            let tag = tag.clone();
            let (name, ty) = self.field_of(ast, f)?;
            let (name, embedded) = match name {
                Some(n) => (n, false),
                None => (self.embedded_name(ty)?, true),
            };
            if name != "_" && !seen.insert(name.clone()) {
                return Err(CompileError::name(format!("{name} redeclared")));
            }
            out.push(FieldType { name, ty, embedded, tag });
        }
        Ok(self.types.struct_(&self.pkg_path, out))
    }

    /// Field name of an embedded type: its declared name, without any
    /// pointer.
    fn embedded_name(&self, t: TypeRef) -> Result<Name> {
        let inner = match self.types.get(t) {
            Type::Pointer(e) => *e,
            _ => t,
        };
        if let Some(dt) = self.types.declared(inner) {
            return Ok(dt.name.clone());
        }
        if let Some(p) = self.types.primitive(inner) {
            return Ok(p.name().to_string());
        }
        Err(CompileError::type_error(format!(
            "embedded field type {} must be a type name",
            self.types.type_string(t)
        )))
    }

    fn interface_type(&mut self, ast: &mut Ast, methods: &[NodeId]) -> Result<TypeRef> {
        let mut out: Vec<FieldType> = Vec::new();
        for &m in methods {
            let (name, ty) = self.field_of(ast, m)?;
            if name.is_none() {
                self.resolve_declared(ast, ty)?;
            }
            match name {
                Some(name) => {
                    if out.iter().any(|f| f.name == name) {
                        return Err(CompileError::name(format!("duplicate method {name}")));
                    }
                    out.push(FieldType::new(name, ty));
                }
                None => {
                    let embedded = self.types.interface_methods(ty).ok_or_else(|| {
                        CompileError::type_error(format!(
                            "interface contains type constraints: {}",
                            self.types.type_string(ty)
                        ))
                    })?;
                    for m in embedded {
                        match out.iter().find(|f| f.name == m.name) {
                            Some(f) if !self.types.same(f.ty, m.ty) => {
                                return Err(CompileError::name(format!("duplicate method {}", m.name)));
                            }
                            Some(_) => {}
                            None => out.push(m.clone()),
                        }
                    }
                }
            }
        }
        Ok(self.types.interface(&self.pkg_path, out))
    }
}
