//! Blocks, statements and declarations inside function bodies

use super::Preprocessor;
use crate::ast::{
    AssignOp, Ast, AttrKey, AttrValue, BinaryOp, BranchOp, Field, Name, NodeId, NodeKind, Visit, field_len, get_child,
    layout, render,
};
use crate::error::{CompileError, Result};
use crate::scope::{BlockKind, NameSource, PathKind, ScopeId, ValuePath};
use crate::types::{Type, TypeRef, check_type, implements};
use crate::values::{TypedValue, Value};
use std::collections::HashSet;

/// Static value of a variable slot: typed, with no known value.
pub(super) fn var_value(t: TypeRef) -> TypedValue {
    TypedValue { ty: Some(t), v: Value::None }
}

fn mismatch(vars: usize, values: usize) -> CompileError {
    let plural = |n: usize| if n == 1 { "" } else { "s" };
    CompileError::type_error(format!(
        "assignment mismatch: {vars} variable{} but {values} value{}",
        plural(vars),
        plural(values)
    ))
}

impl Preprocessor<'_> {
    // ---- blocks ----

    pub(super) fn open_block(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<()> {
        let kind = match ast.kind(node) {
            NodeKind::Package { .. } => return self.open_package(ast, node),
            NodeKind::File { .. } => return self.open_file(node),
            NodeKind::FuncDecl { .. } => BlockKind::FuncDecl,
            NodeKind::FuncLit { .. } => BlockKind::FuncLit,
            NodeKind::Block { .. } => BlockKind::Block,
            NodeKind::If { .. } => BlockKind::If,
            NodeKind::IfCase { .. } => BlockKind::IfCase,
            NodeKind::For { .. } => BlockKind::For,
            NodeKind::Range { .. } => BlockKind::Range,
            NodeKind::Switch { .. } => BlockKind::Switch,
            NodeKind::SwitchClause { .. } => BlockKind::SwitchClause,
            NodeKind::SelectCase { .. } => BlockKind::SelectCase,
            other => return Err(CompileError::syntax(format!("{} is not a block", other.name()))),
        };
        let parent = blocks
            .len()
            .checked_sub(2)
            .and_then(|i| ast.scope(blocks[i]))
            .ok_or_else(|| CompileError::syntax("block without an enclosing block"))?;
        let loc = self.location(ast, node);
        let sid = self.scopes.new_block(Some(node), kind, loc.clone(), parent);
        ast.set_scope(node, sid);
        self.store.set_block_node(loc, node);

        let labels: Vec<Name> = ast
            .kind(node)
            .body()
            .unwrap_or_default()
            .iter()
            .filter_map(|s| ast.label(*s).map(str::to_string))
            .collect();
        self.scopes.get_mut(sid).labels = labels;

        match kind {
            BlockKind::IfCase | BlockKind::SwitchClause => {
                self.scopes.copy_names(parent, sid).map_err(CompileError::syntax)?;
                if kind == BlockKind::SwitchClause {
                    self.open_type_clause(ast, blocks, node, sid)?;
                }
            }
            BlockKind::FuncDecl => {
                self.decls.current = Some(node);
                self.define_params(ast, node, sid)?;
            }
            BlockKind::FuncLit => self.define_params(ast, node, sid)?,
            BlockKind::Range => self.open_range(ast, blocks, node, sid)?,
            _ => {}
        }
        Ok(())
    }

    /// Second block stage of a switch: the tag has been walked, the clauses
    /// have not.
    pub(super) fn open_block2(&mut self, ast: &mut Ast, node: NodeId) -> Result<()> {
        let NodeKind::Switch { x, is_type_switch, .. } = ast.kind(node) else {
            return Ok(());
        };
        let (x, is_type_switch) = (*x, *is_type_switch);
        let Some(x) = x else {
            return Ok(());
        };
        if is_type_switch {
            let xt = self.type_of(ast, x);
            if !xt.is_some_and(|t| self.types.is_interface(t)) {
                return Err(CompileError::type_error(format!(
                    "{} (variable of type {}) is not an interface",
                    render(ast, x),
                    self.type_name(xt)
                )));
            }
            return Ok(());
        }
        self.single_value(ast, x)?;
        if self.is_nil(ast, x) {
            return Err(CompileError::type_error("use of untyped nil in switch expression"));
        }
        self.default_const(ast, x)
    }

    fn define_params(&mut self, ast: &Ast, node: NodeId, sid: ScopeId) -> Result<()> {
        let (recv, ty) = match ast.kind(node) {
            NodeKind::FuncDecl { recv, ty, .. } => (*recv, *ty),
            NodeKind::FuncLit { ty, .. } => (None, *ty),
            _ => return Ok(()),
        };
        if let Some(r) = recv {
            let (name, t) = self.field_of(ast, r)?;
            self.define_param(sid, name, ".recv".to_string(), t, NameSource::Receiver)?;
        }
        let (params, results) = self.func_type_fields(ast, ty)?;
        for (i, p) in params.iter().enumerate() {
            let (name, t) = self.field_of(ast, *p)?;
            self.define_param(sid, name, format!(".p{i}"), t, NameSource::Param)?;
        }
        for (i, r) in results.iter().enumerate() {
            let (name, t) = self.field_of(ast, *r)?;
            self.define_param(sid, name, format!(".r{i}"), t, NameSource::Result)?;
        }
        Ok(())
    }

    /// Parameter and result fields of a resolved function type.
    fn func_type_fields(&self, ast: &Ast, ty: NodeId) -> Result<(Vec<NodeId>, Vec<NodeId>)> {
        let NodeKind::ConstType { source, .. } = ast.kind(ty) else {
            return Err(CompileError::syntax("function type was not resolved"));
        };
        match ast.kind(*source) {
            NodeKind::FuncType { params, results } => Ok((params.clone(), results.clone())),
            _ => Err(CompileError::syntax("function type was not resolved")),
        }
    }

    fn define_param(&mut self, sid: ScopeId, name: Option<Name>, fallback: String, t: TypeRef, source: NameSource) -> Result<()> {
        let name = match name {
            Some(n) if n != "_" => n,
            _ => fallback,
        };
        if self.scopes.get(sid).local_index(&name).is_some() {
            return Err(CompileError::name(format!("duplicate argument {name}")));
        }
        self.scopes
            .define2(self.types, sid, false, &name, Some(t), var_value(t), source)
            .map_err(CompileError::name)?;
        Ok(())
    }

    fn set_name_path(&self, ast: &mut Ast, n: NodeId, path: ValuePath, t: Option<TypeRef>) {
        if let NodeKind::Name { path: p, .. } = ast.kind_mut(n) {
            *p = Some(path);
        }
        self.set_type_of(ast, n, t);
        ast.set_attr(n, AttrKey::Preprocessed, AttrValue::Flag);
    }

    /// Key and value types of ranging over `xt`; the value type is `None`
    /// for integers.
    fn range_types(&mut self, ast: &Ast, x: NodeId, xt: TypeRef) -> Result<(TypeRef, Option<TypeRef>)> {
        let t = match self.types.base(xt) {
            Type::Pointer(e) if matches!(self.types.base(*e), Type::Array { .. }) => *e,
            _ => xt,
        };
        let kind = self.types.kind(t);
        match self.types.base(t) {
            Type::Array { elt, .. } | Type::Slice(elt) => Ok((self.types.int(), Some(*elt))),
            Type::Map { key, value } => Ok((*key, Some(*value))),
            _ if kind == crate::types::Kind::String => Ok((self.types.int(), Some(self.types.int32()))),
            _ if kind.is_integer() => Ok((xt, None)),
            _ => Err(CompileError::type_error(format!(
                "cannot range over {} (variable of type {})",
                render(ast, x),
                self.types.type_string(xt)
            ))),
        }
    }

    fn open_range(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId, sid: ScopeId) -> Result<()> {
        let x = self
            .nested(ast, blocks, node, Field::X, 0)?
            .ok_or_else(|| CompileError::syntax("range without expression"))?;
        self.single_value(ast, x)?;
        self.default_const(ast, x)?;
        let xt = self
            .type_of(ast, x)
            .ok_or_else(|| CompileError::type_error("cannot range over nil"))?;
        let (kt, vt) = self.range_types(ast, x, xt)?;
        let NodeKind::Range { key, value, define, .. } = ast.kind(node) else {
            return Ok(());
        };
        let (key, value, define) = (*key, *value, *define);
        if value.is_some() && vt.is_none() {
            return Err(CompileError::type_error(format!(
                "range over {} permits only one iteration variable",
                render(ast, x)
            )));
        }
        if !define {
            return Ok(());
        }
        for (n, t, source) in [(key, Some(kt), NameSource::RangeKey), (value, vt, NameSource::RangeValue)] {
            let (Some(n), Some(t)) = (n, t) else {
                continue;
            };
            let NodeKind::Name { name, .. } = ast.kind(n) else {
                return Err(CompileError::syntax(format!(
                    "non-name {} on left side of :=",
                    render(ast, n)
                )));
            };
            let name = name.clone();
            let path = if name == "_" {
                ValuePath::block(0, 0, "_")
            } else {
                if self.scopes.get(sid).local_index(&name).is_some() {
                    return Err(CompileError::name(format!("{name} repeated on left side of :=")));
                }
                let idx = self
                    .scopes
                    .define2(self.types, sid, false, &name, Some(t), var_value(t), source)
                    .map_err(CompileError::name)?;
                ValuePath::block(1, idx, name)
            };
            self.set_name_path(ast, n, path, Some(t));
            ast.set_attr(n, AttrKey::LoopVar, AttrValue::Flag);
        }
        Ok(())
    }

    /// Clause of a type switch: walks the case types and defines the
    /// switch variable.
    fn open_type_clause(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId, sid: ScopeId) -> Result<()> {
        let Some(&sw) = blocks.len().checked_sub(2).and_then(|i| blocks.get(i)) else {
            return Ok(());
        };
        let NodeKind::Switch { is_type_switch: true, var_name, x, .. } = ast.kind(sw) else {
            return Ok(());
        };
        let (var_name, x) = (var_name.clone(), *x);
        let xt = x.and_then(|x| self.type_of(ast, x));
        let cases = self.nested_all(ast, blocks, node, Field::Cases)?;
        let mut case_types = Vec::new();
        for &c in &cases {
            if self.is_nil(ast, c) {
                continue;
            }
            let t = self.type_value(ast, c)?;
            if let Some(xt) = xt
                && !self.types.is_interface(t)
                && let Err(why) = implements(self.types, t, xt)
            {
                return Err(CompileError::type_error(format!(
                    "impossible type switch case: {} cannot have dynamic type {} ({why})",
                    x.map(|x| render(ast, x)).unwrap_or_default(),
                    self.types.type_string(t)
                )));
            }
            case_types.push(t);
        }
        if let Some(v) = var_name {
            let t = match (cases.len(), case_types.first()) {
                (1, Some(t)) => Some(*t),
                _ => xt,
            };
            let t = t.ok_or_else(|| CompileError::type_error("type switch on a value without type"))?;
            self.scopes
                .define2(self.types, sid, false, &v, Some(t), var_value(t), NameSource::TypeSwitch)
                .map_err(CompileError::name)?;
        }
        Ok(())
    }

    // ---- statements ----

    pub(super) fn leave_stmt(
        &mut self,
        ast: &mut Ast,
        blocks: &[NodeId],
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
    ) -> Result<NodeId> {
        match ast.kind(node).clone() {
            NodeKind::Assign { lhs, op, rhs } => self.leave_assign(ast, op, &lhs, &rhs)?,
            NodeKind::IncDec { x, .. } => {
                self.check_assignable(ast, x)?;
                let t = self.type_of(ast, x);
                if !self.kind_of(t).is_numeric() {
                    return Err(CompileError::type_error(format!(
                        "invalid operation: {} (non-numeric type {})",
                        render(ast, node),
                        self.type_name(t)
                    )));
                }
            }
            NodeKind::ExprStmt { x } => self.check_expr_stmt(ast, x)?,
            NodeKind::If { cond, .. } => self.check_cond(ast, cond, "if")?,
            NodeKind::For { cond: Some(cond), .. } => self.check_cond(ast, cond, "for")?,
            NodeKind::Range { x, key, value, define: false, .. } => {
                let xt = self
                    .type_of(ast, x)
                    .ok_or_else(|| CompileError::type_error("cannot range over nil"))?;
                let (kt, vt) = self.range_types(ast, x, xt)?;
                for (n, t) in [(key, Some(kt)), (value, vt)] {
                    if let (Some(n), Some(t)) = (n, t)
                        && !self.is_blank(ast, n)
                    {
                        self.check_assignable(ast, n)?;
                        let lt = self.type_of(ast, n).ok_or_else(|| {
                            CompileError::type_error(format!("cannot assign to {}", render(ast, n)))
                        })?;
                        check_type(self.types, t, lt, true).map_err(CompileError::type_error)?;
                    }
                }
            }
            NodeKind::SwitchClause { cases, .. } => self.leave_switch_clause(ast, blocks, &cases)?,
            NodeKind::Return { results } => self.leave_return(ast, blocks, &results)?,
            NodeKind::Branch { .. } => self.leave_branch(ast, blocks, ancestors, field, index, node)?,
            NodeKind::Defer { call } | NodeKind::Go { call } => {
                let keyword = if matches!(ast.kind(node), NodeKind::Defer { .. }) { "defer" } else { "go" };
                match ast.kind(call) {
                    NodeKind::Call { func, .. } if !matches!(ast.kind(*func), NodeKind::ConstType { .. }) => {}
                    _ => {
                        return Err(CompileError::syntax(format!(
                            "expression in {keyword} must be function call"
                        )));
                    }
                }
            }
            NodeKind::Send { chan, value } => {
                let ct = self.type_of(ast, chan);
                let elt = ct
                    .filter(|t| matches!(self.types.base(*t), Type::Chan { .. }))
                    .and_then(|t| self.types.elem(t))
                    .ok_or_else(|| {
                        CompileError::type_error(format!(
                            "invalid operation: cannot send to non-channel {}",
                            render(ast, chan)
                        ))
                    })?;
                self.assign_to(ast, value, elt)?;
            }
            NodeKind::ValueDecl { .. } => self.leave_local_values(ast, blocks, node)?,
            NodeKind::TypeDecl { .. } => self.leave_local_type(ast, blocks, node)?,
            NodeKind::FuncDecl { ty, body, .. } => {
                self.decls.current = None;
                if let Some(body) = body {
                    self.check_missing_return(ast, ty, &body)?;
                }
            }
            _ => {}
        }
        Ok(node)
    }

    pub(super) fn check_missing_return(&self, ast: &Ast, ty: NodeId, body: &[NodeId]) -> Result<()> {
        let sig = self.type_value(ast, ty)?;
        let has_results = self
            .types
            .signature(sig)
            .is_some_and(|(_, results, _)| !results.is_empty());
        if has_results && !body.last().is_some_and(|s| is_terminating(ast, *s)) {
            return Err(CompileError::type_error("missing return"));
        }
        Ok(())
    }

    fn is_blank(&self, ast: &Ast, n: NodeId) -> bool {
        matches!(ast.kind(n), NodeKind::Name { name, .. } if name == "_")
    }

    fn check_cond(&mut self, ast: &mut Ast, cond: NodeId, stmt: &str) -> Result<()> {
        let bool_t = self.types.bool();
        self.convert_const(ast, cond, Some(bool_t))?;
        if self.kind_of(self.type_of(ast, cond)) != crate::types::Kind::Bool {
            return Err(CompileError::type_error(format!(
                "non-boolean condition in {stmt} statement"
            )));
        }
        Ok(())
    }

    fn check_expr_stmt(&self, ast: &Ast, x: NodeId) -> Result<()> {
        let unused = || {
            CompileError::type_error(format!("{} is not used", render(ast, x)))
        };
        match ast.kind(x) {
            NodeKind::Call { func, .. } => match ast.kind(*func) {
                NodeKind::ConstType { .. } => Err(unused()),
                NodeKind::Name { name, path: Some(p) }
                    if p.kind == PathKind::Uverse
                        && matches!(name.as_str(), "len" | "cap" | "append" | "make" | "new") =>
                {
                    Err(unused())
                }
                _ => Ok(()),
            },
            NodeKind::Unary { op: crate::ast::UnaryOp::Recv, .. } => Ok(()),
            _ => Err(unused()),
        }
    }

    /// Rejects expressions that cannot appear on the left of `=`.
    fn check_assignable(&self, ast: &Ast, l: NodeId) -> Result<()> {
        let cannot = |why: &str| {
            CompileError::type_error(format!("cannot assign to {}{why}", render(ast, l)))
        };
        match ast.kind(l) {
            NodeKind::Name { path: Some(p), .. } => match p.kind {
                PathKind::Block => Ok(()),
                _ => Err(cannot(" (neither addressable nor a map index expression)")),
            },
            NodeKind::Index { x, .. } => {
                if self.kind_of(self.type_of(ast, *x)) == crate::types::Kind::String {
                    return Err(cannot(" (neither addressable nor a map index expression)"));
                }
                Ok(())
            }
            NodeKind::Selector { path: Some(p), .. } => match p.kind {
                PathKind::Field | PathKind::DerefField => Ok(()),
                _ => Err(cannot(" (neither addressable nor a map index expression)")),
            },
            NodeKind::Star { .. } => Ok(()),
            NodeKind::Const { .. } => Err(cannot(" (neither addressable nor a map index expression)")),
            _ => Err(cannot("")),
        }
    }

    /// An expression used as exactly one value.
    pub(super) fn single_value(&self, ast: &Ast, n: NodeId) -> Result<()> {
        if let NodeKind::ConstType { ty, .. } = ast.kind(n) {
            return Err(CompileError::type_error(format!(
                "{} (type) is not an expression",
                self.types.type_string(*ty)
            )));
        }
        if self.is_nil(ast, n) {
            return Ok(());
        }
        match self.type_of(ast, n) {
            Some(t) if self.types.tuple_elts(t).is_some() => Err(CompileError::type_error(format!(
                "multiple-value {} (value of type {}) in single-value context",
                render(ast, n),
                self.types.type_string(t)
            ))),
            Some(_) => Ok(()),
            None => Err(CompileError::type_error(format!(
                "{} (no value) used as value",
                render(ast, n)
            ))),
        }
    }

    /// Result types of a multi-value expression assigned to `n` names.
    fn multi_value(&self, ast: &Ast, v: NodeId, n: usize) -> Result<Vec<TypeRef>> {
        let elts = self.type_of(ast, v).and_then(|t| self.types.tuple_elts(t));
        match elts {
            Some(elts) if elts.len() == n => Ok(elts.to_vec()),
            Some(elts) => Err(CompileError::type_error(format!(
                "assignment mismatch: {n} variables but {} returns {} value{}",
                render(ast, v),
                elts.len(),
                if elts.len() == 1 { "" } else { "s" }
            ))),
            None => Err(mismatch(n, 1)),
        }
    }

    /// Asks index and type assertion expressions for the extra `ok` result
    /// when two names receive one value.
    pub(super) fn mark_comma_ok(&self, ast: &mut Ast, lhs: usize, rhs: Vec<NodeId>) {
        if lhs != 2 || rhs.len() != 1 {
            return;
        }
        match ast.kind_mut(rhs[0]) {
            NodeKind::Index { has_ok, .. } | NodeKind::TypeAssert { has_ok, .. } => *has_ok = true,
            _ => {}
        }
    }

    /// Types and static values of the names of a value declaration.
    pub(super) fn value_decl_types(
        &mut self,
        ast: &mut Ast,
        n: usize,
        ty: Option<TypeRef>,
        values: &[NodeId],
        is_const: bool,
    ) -> Result<Vec<(TypeRef, TypedValue)>> {
        if values.is_empty() {
            if is_const {
                return Err(CompileError::type_error("missing init expr for const declaration"));
            }
            let t = ty.ok_or_else(|| CompileError::syntax("missing type or init expr"))?;
            return Ok(vec![(t, var_value(t)); n]);
        }
        if values.len() == 1 && n > 1 {
            if is_const {
                return Err(CompileError::type_error("missing init expr for const declaration"));
            }
            let mut out = Vec::with_capacity(n);
            for et in self.multi_value(ast, values[0], n)? {
                let t = match ty {
                    Some(t) => {
                        check_type(self.types, et, t, true).map_err(CompileError::type_error)?;
                        t
                    }
                    None => et,
                };
                out.push((t, var_value(t)));
            }
            return Ok(out);
        }
        if values.len() != n {
            return Err(mismatch(n, values.len()));
        }
        let mut out = Vec::with_capacity(n);
        for &v in values {
            self.single_value(ast, v)?;
            match ty {
                Some(t) => self.assign_to(ast, v, t)?,
                None if self.is_nil(ast, v) => {
                    return Err(CompileError::type_error("use of untyped nil in variable declaration"));
                }
                None if !is_const => self.default_const(ast, v)?,
                None => {}
            }
            if is_const {
                let NodeKind::Const { tv, .. } = ast.kind(v) else {
                    return Err(CompileError::type_error(format!(
                        "{} (value of type {}) is not constant",
                        render(ast, v),
                        self.type_name(self.type_of(ast, v))
                    )));
                };
                let t = tv
                    .ty
                    .ok_or_else(|| CompileError::type_error("const initializer nil is not a constant"))?;
                out.push((t, tv.clone()));
            } else {
                let t = match ty {
                    Some(t) => t,
                    None => self
                        .type_of(ast, v)
                        .ok_or_else(|| CompileError::type_error(format!("{} (no value) used as value", render(ast, v))))?,
                };
                out.push((t, var_value(t)));
            }
        }
        Ok(out)
    }

    fn leave_local_values(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<()> {
        let NodeKind::ValueDecl { names, ty, values, is_const } = ast.kind(node).clone() else {
            return Ok(());
        };
        if is_const {
            self.iotas.pop();
        }
        let ty = match ty {
            Some(t) => Some(self.type_value(ast, t)?),
            None => None,
        };
        let defs = self.value_decl_types(ast, names.len(), ty, &values, is_const)?;
        let sid = self.scope(ast, blocks)?;
        let mut paths = Vec::with_capacity(names.len());
        for (ident, (t, tv)) in names.iter().zip(defs) {
            if ident.name == "_" {
                paths.push(ValuePath::block(0, 0, "_"));
                continue;
            }
            if self.is_local_redeclaration(sid, &ident.name) {
                return Err(CompileError::name(format!("{} redeclared in this block", ident.name)));
            }
            let source = if is_const { NameSource::Const } else { NameSource::Var };
            let idx = self
                .scopes
                .define2(self.types, sid, is_const, &ident.name, Some(t), tv, source)
                .map_err(CompileError::name)?;
            paths.push(ValuePath::block(1, idx, ident.name.clone()));
        }
        if let NodeKind::ValueDecl { names, .. } = ast.kind_mut(node) {
            for (ident, path) in names.iter_mut().zip(paths) {
                ident.path = Some(path);
            }
        }
        Ok(())
    }

    /// Whether `name` is already declared by this block itself. Names a
    /// clause copied from its statement may be declared again.
    fn is_local_redeclaration(&self, sid: ScopeId, name: &str) -> bool {
        let sb = self.scopes.get(sid);
        let Some(idx) = sb.local_index(name) else {
            return false;
        };
        if sb.kind.is_faux_child()
            && let Some(parent) = sb.parent
        {
            return idx as usize >= self.scopes.get(parent).num_names();
        }
        true
    }

    /// Declares a local named type before its body is walked, so the body
    /// may refer to it.
    pub(super) fn enter_type_decl(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<()> {
        let NodeKind::TypeDecl { name, is_alias: false, .. } = ast.kind(node) else {
            return Ok(());
        };
        let name = name.name.clone();
        let sid = self.scope(ast, blocks)?;
        if self.is_local_redeclaration(sid, &name) {
            return Err(CompileError::name(format!("{name} redeclared in this block")));
        }
        let local = self.location(ast, node).to_string();
        let t = self.types.declare(&self.pkg_path, &name, Some(local));
        let tt = self.types.type_type();
        self.scopes
            .define2(self.types, sid, false, &name, Some(tt), TypedValue::new(tt, Value::Type(t)), NameSource::Type)
            .map_err(CompileError::name)?;
        Ok(())
    }

    fn leave_local_type(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<()> {
        let NodeKind::TypeDecl { name, ty, is_alias } = ast.kind(node).clone() else {
            return Ok(());
        };
        let sid = self.scope(ast, blocks)?;
        let t = self.type_value(ast, ty)?;
        let tt = self.types.type_type();
        if is_alias {
            if self.is_local_redeclaration(sid, &name.name) {
                return Err(CompileError::name(format!("{} redeclared in this block", name.name)));
            }
            self.scopes
                .define2(self.types, sid, false, &name.name, Some(tt), TypedValue::new(tt, Value::Type(t)), NameSource::Type)
                .map_err(CompileError::name)?;
            return self.finish_type_decl(ast, node, t, ty, sid);
        }
        let idx = self
            .scopes
            .get(sid)
            .local_index(&name.name)
            .ok_or_else(|| CompileError::name(format!("name {} not declared", name.name)))?;
        let Value::Type(d) = self.scopes.get(sid).values[idx as usize].v else {
            return Err(CompileError::syntax(format!("{} is not a declared type", name.name)));
        };
        self.types.set_base(d, t).map_err(CompileError::type_error)?;
        if self.contains_type(d, self.types.base_of(t), &mut HashSet::new()) {
            return Err(CompileError::type_error(format!("invalid recursive type {}", name.name)));
        }
        self.types.seal(d).map_err(CompileError::type_error)?;
        let id = self.types.type_id(d);
        self.store.set_type(&id, d);
        self.finish_type_decl(ast, node, d, ty, sid)
    }

    // ---- assignments ----

    /// `:=`, walked ahead of its children so the new names only become
    /// visible after the right-hand side.
    pub(super) fn define_assign(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<()> {
        let NodeKind::Assign { lhs, rhs, .. } = ast.kind(node).clone() else {
            return Ok(());
        };
        self.mark_comma_ok(ast, lhs.len(), rhs.clone());
        let rhs = self.nested_all(ast, blocks, node, Field::Rhs)?;
        let sid = self.scope(ast, blocks)?;

        let mut names = Vec::with_capacity(lhs.len());
        for &l in &lhs {
            let NodeKind::Name { name, .. } = ast.kind(l) else {
                return Err(CompileError::syntax(format!(
                    "non-name {} on left side of :=",
                    render(ast, l)
                )));
            };
            let name = name.clone();
            if name != "_" && names.contains(&name) {
                return Err(CompileError::name(format!("{name} repeated on left side of :=")));
            }
            names.push(name);
        }
        // existing names keep their type; new ones take the value's
        let existing: Vec<Option<(u16, TypeRef)>> = names
            .iter()
            .map(|name| {
                let sb = self.scopes.get(sid);
                sb.local_index(name)
                    .filter(|_| name != "_")
                    .and_then(|i| sb.types[i as usize].map(|t| (i, t)))
            })
            .collect();

        let types: Vec<TypeRef> = if rhs.len() == 1 && lhs.len() > 1 {
            let elts = self.multi_value(ast, rhs[0], lhs.len())?;
            for (e, t) in existing.iter().zip(&elts) {
                if let Some((_, lt)) = e {
                    check_type(self.types, *t, *lt, true).map_err(CompileError::type_error)?;
                }
            }
            elts
        } else {
            if rhs.len() != lhs.len() {
                return Err(mismatch(lhs.len(), rhs.len()));
            }
            let mut out = Vec::with_capacity(rhs.len());
            for (&r, e) in rhs.iter().zip(&existing) {
                self.single_value(ast, r)?;
                match e {
                    Some((_, lt)) => self.assign_to(ast, r, *lt)?,
                    None if self.is_nil(ast, r) => {
                        return Err(CompileError::type_error("use of untyped nil in assignment"));
                    }
                    None => self.default_const(ast, r)?,
                }
                let t = self
                    .type_of(ast, r)
                    .ok_or_else(|| CompileError::type_error(format!("{} (no value) used as value", render(ast, r))))?;
                out.push(t);
            }
            out
        };

        let mut any_new = false;
        for ((&l, name), (e, t)) in lhs.iter().zip(&names).zip(existing.iter().zip(types)) {
            if name == "_" {
                self.set_name_path(ast, l, ValuePath::block(0, 0, "_"), Some(t));
                continue;
            }
            match e {
                Some((idx, lt)) if !self.is_copied_name(sid, *idx) => {
                    ast.set_attr(l, AttrKey::Predefined, AttrValue::Flag);
                    self.set_name_path(ast, l, ValuePath::block(1, *idx, name.clone()), Some(*lt));
                }
                _ => {
                    any_new = true;
                    let idx = self
                        .scopes
                        .define2(self.types, sid, false, name, Some(t), var_value(t), NameSource::Define)
                        .map_err(CompileError::name)?;
                    self.set_name_path(ast, l, ValuePath::block(1, idx, name.clone()), Some(t));
                }
            }
        }
        if !any_new {
            return Err(CompileError::name("no new variables on left side of :="));
        }
        Ok(())
    }

    /// Whether slot `idx` of a clause block was copied from its statement.
    fn is_copied_name(&self, sid: ScopeId, idx: u16) -> bool {
        let sb = self.scopes.get(sid);
        sb.kind.is_faux_child() && sb.parent.is_some_and(|p| (idx as usize) < self.scopes.get(p).num_names())
    }

    fn leave_assign(&mut self, ast: &mut Ast, op: AssignOp, lhs: &[NodeId], rhs: &[NodeId]) -> Result<()> {
        match op {
            AssignOp::Define => Ok(()),
            AssignOp::Assign => {
                for &l in lhs {
                    if !self.is_blank(ast, l) {
                        self.check_assignable(ast, l)?;
                    }
                }
                if rhs.len() == 1 && lhs.len() > 1 {
                    let elts = self.multi_value(ast, rhs[0], lhs.len())?;
                    for (&l, t) in lhs.iter().zip(elts) {
                        if let Some(lt) = self.type_of(ast, l).filter(|_| !self.is_blank(ast, l)) {
                            check_type(self.types, t, lt, true).map_err(CompileError::type_error)?;
                        }
                    }
                    return Ok(());
                }
                if rhs.len() != lhs.len() {
                    return Err(mismatch(lhs.len(), rhs.len()));
                }
                for (&l, &r) in lhs.iter().zip(rhs) {
                    self.single_value(ast, r)?;
                    if self.is_blank(ast, l) {
                        if self.is_nil(ast, r) {
                            return Err(CompileError::type_error("use of untyped nil in assignment"));
                        }
                        self.default_const(ast, r)?;
                        continue;
                    }
                    let lt = self
                        .type_of(ast, l)
                        .ok_or_else(|| CompileError::type_error(format!("cannot assign to {}", render(ast, l))))?;
                    self.assign_to(ast, r, lt)?;
                }
                Ok(())
            }
            AssignOp::Op(bop) => {
                let (&[l], &[r]) = (lhs, rhs) else {
                    return Err(CompileError::syntax(format!(
                        "assignment operation {op} requires single-valued expressions"
                    )));
                };
                self.check_assignable(ast, l)?;
                let lt = self
                    .type_of(ast, l)
                    .ok_or_else(|| CompileError::type_error(format!("cannot assign to {}", render(ast, l))))?;
                if bop.is_shift() {
                    self.check_shift_count(ast, r)?;
                    if !self.types.kind(lt).is_integer() {
                        return Err(CompileError::type_error(format!(
                            "invalid operation: shifted operand {} must be integer",
                            render(ast, l)
                        )));
                    }
                    return Ok(());
                }
                self.assign_to(ast, r, lt)?;
                self.check_operator(bop, lt)?;
                if matches!(bop, BinaryOp::Quo | BinaryOp::Rem) && self.is_const_zero(ast, r) && self.types.kind(lt).is_integer() {
                    return Err(CompileError::type_error("invalid operation: division by zero"));
                }
                Ok(())
            }
        }
    }

    // ---- control flow ----

    fn leave_switch_clause(&mut self, ast: &mut Ast, blocks: &[NodeId], cases: &[NodeId]) -> Result<()> {
        let Some(&sw) = blocks.len().checked_sub(2).and_then(|i| blocks.get(i)) else {
            return Ok(());
        };
        let NodeKind::Switch { x, is_type_switch, .. } = ast.kind(sw) else {
            return Ok(());
        };
        if *is_type_switch {
            return Ok(());
        }
        let x = *x;
        let tag_t = match x {
            Some(x) => self.type_of(ast, x),
            None => Some(self.types.bool()),
        };
        let Some(tag_t) = tag_t else {
            return Ok(());
        };
        for &c in cases {
            self.single_value(ast, c)?;
            if self.is_nil(ast, c) {
                self.convert_nil(ast, c, tag_t)?;
                continue;
            }
            self.convert_const(ast, c, Some(tag_t))?;
            let ct = self.type_of(ast, c);
            let ok = match ct {
                Some(ct) => {
                    self.types.same(ct, tag_t)
                        || (self.types.is_interface(tag_t) && implements(self.types, ct, tag_t).is_ok())
                        || (self.types.is_interface(ct) && implements(self.types, tag_t, ct).is_ok())
                }
                None => false,
            };
            if !ok {
                let on = match x {
                    Some(x) => format!(" on {}", render(ast, x)),
                    None => String::new(),
                };
                return Err(CompileError::type_error(format!(
                    "invalid case {} in switch{on} (mismatched types {} and {})",
                    render(ast, c),
                    self.type_name(ct),
                    self.types.type_string(tag_t)
                )));
            }
        }
        Ok(())
    }

    fn leave_return(&mut self, ast: &mut Ast, blocks: &[NodeId], results: &[NodeId]) -> Result<()> {
        let sid = self.scope(ast, blocks)?;
        let func = self
            .scopes
            .func_scope(sid)
            .and_then(|f| self.scopes.get(f).node)
            .ok_or_else(|| CompileError::syntax("return outside function"))?;
        let ty = match ast.kind(func) {
            NodeKind::FuncDecl { ty, .. } | NodeKind::FuncLit { ty, .. } => *ty,
            _ => return Err(CompileError::syntax("return outside function")),
        };
        let sig = self.type_value(ast, ty)?;
        let want: Vec<TypeRef> = self
            .types
            .signature(sig)
            .map(|(_, r, _)| r.to_vec())
            .unwrap_or_default();
        let want_str = || {
            let names: Vec<String> = want.iter().map(|t| self.types.type_string(*t)).collect();
            format!("({})", names.join(", "))
        };
        if results.is_empty() {
            if want.is_empty() {
                return Ok(());
            }
            let (_, fields) = self.func_type_fields(ast, ty)?;
            let named = fields
                .iter()
                .all(|f| matches!(ast.kind(*f), NodeKind::Field { name: Some(_), .. }));
            if named {
                return Ok(());
            }
            return Err(CompileError::type_error(format!(
                "not enough return values\n\thave ()\n\twant {}",
                want_str()
            )));
        }
        if results.len() == 1 && want.len() > 1 {
            let elts = self.multi_value(ast, results[0], want.len()).map_err(|_| {
                CompileError::type_error(format!("not enough return values\n\thave (...)\n\twant {}", want_str()))
            })?;
            for (e, w) in elts.iter().zip(&want) {
                check_type(self.types, *e, *w, true).map_err(CompileError::type_error)?;
            }
            return Ok(());
        }
        if results.len() != want.len() {
            let which = if results.len() > want.len() { "too many" } else { "not enough" };
            return Err(CompileError::type_error(format!(
                "{which} return values\n\thave ({})\n\twant {}",
                results.iter().map(|r| render(ast, *r)).collect::<Vec<_>>().join(", "),
                want_str()
            )));
        }
        for (&r, &w) in results.iter().zip(&want) {
            self.single_value(ast, r)?;
            self.assign_to(ast, r, w)?;
        }
        Ok(())
    }

    fn leave_branch(
        &mut self,
        ast: &mut Ast,
        blocks: &[NodeId],
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
    ) -> Result<()> {
        let NodeKind::Branch { op, label, .. } = ast.kind(node).clone() else {
            return Ok(());
        };
        // enclosing blocks of the current function, innermost first
        let mut within = Vec::new();
        for &b in blocks.iter().rev() {
            within.push(b);
            if matches!(ast.kind(b), NodeKind::FuncDecl { .. } | NodeKind::FuncLit { .. } | NodeKind::File { .. }) {
                break;
            }
        }
        let (target, body_index) = match op {
            BranchOp::Break | BranchOp::Continue => {
                let fits = |n: NodeId| match ast.kind(n) {
                    NodeKind::For { .. } | NodeKind::Range { .. } => true,
                    NodeKind::Switch { .. } | NodeKind::Select { .. } => op == BranchOp::Break,
                    _ => false,
                };
                let found = match &label {
                    Some(l) => {
                        let labeled = within.iter().copied().find(|b| ast.label(*b) == Some(l.as_str()));
                        match labeled {
                            Some(b) if fits(b) => b,
                            Some(_) => return Err(CompileError::syntax(format!("invalid {op} label {l}"))),
                            None => {
                                return Err(CompileError::syntax(format!(
                                    "{op} label not defined: {l}"
                                )));
                            }
                        }
                    }
                    None => within.iter().copied().find(|b| fits(*b)).ok_or_else(|| {
                        CompileError::syntax(match op {
                            BranchOp::Break => "break is not in a loop, switch, or select",
                            _ => "continue is not in a loop",
                        })
                    })?,
                };
                (found, -1)
            }
            BranchOp::Goto => {
                let l = label.ok_or_else(|| CompileError::syntax("goto without label"))?;
                within
                    .iter()
                    .find_map(|&b| {
                        let body = ast.kind(b).body()?;
                        ast.find_label(body, &l).map(|i| (b, i as i32))
                    })
                    .ok_or_else(|| CompileError::syntax(format!("label {l} not defined")))?
            }
            BranchOp::Fallthrough => {
                let out_of_place = || CompileError::syntax("fallthrough statement out of place");
                let clause = ancestors.last().copied().ok_or_else(out_of_place)?;
                let NodeKind::SwitchClause { body, .. } = ast.kind(clause) else {
                    return Err(out_of_place());
                };
                if field != Some(Field::Body) || index + 1 != body.len() {
                    return Err(out_of_place());
                }
                let sw = blocks
                    .len()
                    .checked_sub(2)
                    .and_then(|i| blocks.get(i).copied())
                    .ok_or_else(out_of_place)?;
                let NodeKind::Switch { clauses, is_type_switch, .. } = ast.kind(sw) else {
                    return Err(out_of_place());
                };
                if *is_type_switch {
                    return Err(CompileError::syntax("cannot fallthrough in type switch"));
                }
                let pos = clauses.iter().position(|c| *c == clause).ok_or_else(out_of_place)?;
                let next = clauses
                    .get(pos + 1)
                    .copied()
                    .ok_or_else(|| CompileError::syntax("cannot fallthrough final case in switch"))?;
                (next, -1)
            }
        };
        let depth = within.iter().position(|b| *b == target).unwrap_or(0);
        if let NodeKind::Branch { target: t, depth: d, body_index: bi, .. } = ast.kind_mut(node) {
            *t = Some(target);
            *d = u8::try_from(depth).unwrap_or(u8::MAX);
            *bi = body_index;
        }
        Ok(())
    }
}

/// Whether `s` ends control flow, so that nothing after it runs.
pub(super) fn is_terminating(ast: &Ast, s: NodeId) -> bool {
    match ast.kind(s) {
        NodeKind::Return { .. } | NodeKind::Branch { op: BranchOp::Goto, .. } => true,
        NodeKind::ExprStmt { x } => is_panic_call(ast, *x),
        NodeKind::Block { body } => body.last().is_some_and(|l| is_terminating(ast, *l)),
        NodeKind::If { then, els, .. } => ends_terminating(ast, *then) && ends_terminating(ast, *els),
        NodeKind::For { cond: None, .. } => !has_break(ast, s, s),
        NodeKind::Switch { clauses, .. } => {
            let has_default = clauses
                .iter()
                .any(|c| matches!(ast.kind(*c), NodeKind::SwitchClause { cases, .. } if cases.is_empty()));
            has_default
                && clauses.iter().all(|c| {
                    let last = ast.kind(*c).body().and_then(|b| b.last().copied());
                    last.is_some_and(|l| {
                        is_terminating(ast, l)
                            || matches!(ast.kind(l), NodeKind::Branch { op: BranchOp::Fallthrough, .. })
                    })
                })
                && !has_break(ast, s, s)
        }
        NodeKind::Select { cases } => cases.iter().all(|c| ends_terminating(ast, *c)) && !has_break(ast, s, s),
        _ => false,
    }
}

fn ends_terminating(ast: &Ast, block: NodeId) -> bool {
    ast.kind(block)
        .body()
        .and_then(|b| b.last().copied())
        .is_some_and(|l| is_terminating(ast, l))
}

fn is_panic_call(ast: &Ast, x: NodeId) -> bool {
    let NodeKind::Call { func, .. } = ast.kind(x) else {
        return false;
    };
    matches!(ast.kind(*func), NodeKind::Name { name, path: Some(p) } if name == "panic" && p.kind == PathKind::Uverse)
}

/// Whether a `break` inside `n` leaves `target`.
fn has_break(ast: &Ast, n: NodeId, target: NodeId) -> bool {
    let kind = ast.kind(n);
    match kind {
        NodeKind::Branch { op: BranchOp::Break, target: t, .. } => *t == Some(target),
        NodeKind::FuncLit { .. } => false,
        _ => layout(kind).iter().any(|v| match v {
            Visit::Child(f) => (0..field_len(kind, *f))
                .filter_map(|i| get_child(kind, *f, i))
                .any(|c| has_break(ast, c, target)),
            _ => false,
        }),
    }
}
