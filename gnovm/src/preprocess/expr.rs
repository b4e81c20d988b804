//! Expressions
//!
//! Names are resolved to value paths, constant operands are folded into
//! `Const` nodes and every other expression gets its static type cached
//! as the `TypeOf` attribute.

use super::Preprocessor;
use super::predefine::Dep;
use crate::ast::{Ast, AttrKey, AttrValue, BinaryOp, Field, NodeId, NodeKind, UnaryOp, render};
use crate::error::{CompileError, Result};
use crate::scope::{NameSource, PathKind, ValuePath};
use crate::types::{Kind, PrimitiveType, Type, TypeRef, check_type, find_selector, implements};
use crate::uverse::builtin_name;
use crate::values::{
    OpError, TypedValue, Value, binary_op, convert_to, is_const_zero, parse_basic_lit, unary_op,
};
use num_bigint::BigInt;

/// Rank of untyped numeric constant kinds; mixing two untyped operands
/// gives the higher one.
fn untyped_rank(p: PrimitiveType) -> u8 {
    match p {
        PrimitiveType::UntypedBigint => 0,
        PrimitiveType::UntypedRune => 1,
        PrimitiveType::UntypedBigdec => 2,
        _ => 3,
    }
}

fn op_error(e: OpError) -> CompileError {
    match e {
        OpError::DivisionByZero => CompileError::type_error("invalid operation: division by zero"),
        other => CompileError::type_error(other.to_string()),
    }
}

fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

impl Preprocessor<'_> {
    pub(super) fn leave_expr(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<NodeId> {
        match ast.kind(node).clone() {
            NodeKind::Name { .. } => self.leave_name(ast, blocks, node),
            NodeKind::BasicLit { kind, value } => {
                let tv = parse_basic_lit(self.types, kind, &value).map_err(CompileError::syntax)?;
                Ok(self.new_const(ast, tv, node))
            }
            NodeKind::Binary { op, left, right } => self.leave_binary(ast, node, op, left, right),
            NodeKind::Unary { op, x } => self.leave_unary(ast, node, op, x),
            NodeKind::Call { .. } => self.leave_call(ast, node),
            NodeKind::Index { x, index, has_ok } => self.leave_index(ast, node, x, index, has_ok),
            NodeKind::Selector { x, sel, .. } => self.leave_selector(ast, blocks, node, x, &sel),
            NodeKind::Slice { x, low, high, max } => self.leave_slice(ast, node, x, [low, high, max]),
            NodeKind::Star { x } => {
                if let NodeKind::ConstType { ty, .. } = ast.kind(x) {
                    let p = self.types.pointer(*ty);
                    return Ok(self.new_const_type(ast, p, node));
                }
                let xt = self.type_of(ast, x);
                match xt.map(|t| self.types.base(t)) {
                    Some(Type::Pointer(e)) => {
                        let e = *e;
                        self.set_type_of(ast, node, Some(e));
                        Ok(node)
                    }
                    _ => Err(CompileError::type_error(format!(
                        "invalid operation: cannot indirect {} (variable of type {})",
                        render(ast, x),
                        self.type_name(xt)
                    ))),
                }
            }
            NodeKind::Ref { x } => {
                if matches!(ast.kind(x), NodeKind::Const { .. } | NodeKind::ConstType { .. }) {
                    return Err(CompileError::type_error(format!(
                        "invalid operation: cannot take address of {}",
                        render(ast, x)
                    )));
                }
                let t = self
                    .type_of(ast, x)
                    .ok_or_else(|| CompileError::type_error(format!("cannot take address of {}", render(ast, x))))?;
                let p = self.types.pointer(t);
                self.set_type_of(ast, node, Some(p));
                Ok(node)
            }
            NodeKind::TypeAssert { x, ty, has_ok } => self.leave_type_assert(ast, node, x, ty, has_ok),
            NodeKind::CompositeLit { .. } => self.leave_composite(ast, node),
            NodeKind::KeyValue { .. } => Ok(node),
            NodeKind::FuncLit { ty, body, .. } => {
                let t = self.type_value(ast, ty)?;
                self.check_missing_return(ast, ty, &body)?;
                let captures = ast
                    .scope(node)
                    .map(|sid| self.scopes.get(sid).captures.clone())
                    .unwrap_or_default();
                if let NodeKind::FuncLit { captures: c, .. } = ast.kind_mut(node) {
                    *c = captures;
                }
                self.set_type_of(ast, node, Some(t));
                Ok(node)
            }
            other => Err(CompileError::syntax(format!("{} is not an expression", other.name()))),
        }
    }

    // ---- names ----

    fn leave_name(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<NodeId> {
        let NodeKind::Name { name, .. } = ast.kind(node) else {
            return Ok(node);
        };
        let name = name.clone();
        if name == "_" {
            if let NodeKind::Name { path, .. } = ast.kind_mut(node) {
                *path = Some(ValuePath::block(0, 0, "_"));
            }
            return Ok(node);
        }
        let sid = self.scope(ast, blocks)?;
        let mut path = self.scopes.get_path_for_name(sid, &name).map_err(|_| {
            CompileError::name(format!("undefined: {name}"))
        })?;
        let decl_scope = match path.kind {
            PathKind::Block => self.scopes.scope_at_depth(sid, path.depth),
            _ => None,
        };
        if decl_scope.is_some() && decl_scope == self.decls.scope {
            self.decls.record(Dep::Name(name.clone()));
            let pending = self
                .scopes
                .static_type_of(sid, &path)
                .is_none_or(|t| self.types.is_placeholder(t));
            if pending {
                self.resolve_pending(ast, &name)?;
                path = self.scopes.get_path_for_name(sid, &name).map_err(CompileError::name)?;
            }
        }
        if path.kind == PathKind::Uverse && name == "iota" {
            let iota = *self
                .iotas
                .last()
                .ok_or_else(|| CompileError::type_error("cannot use iota outside constant declaration"))?;
            let tv = TypedValue::new(self.types.prim(PrimitiveType::UntypedBigint), Value::bigint(BigInt::from(iota)));
            return Ok(self.new_const(ast, tv, node));
        }
        let is_const = match path.kind {
            PathKind::Uverse => self.scopes.get(self.scopes.uverse).is_const(&name),
            _ => decl_scope.is_some_and(|s| self.scopes.get(s).is_const(&name)),
        };
        let sv = self.scopes.static_value_of(sid, &path).cloned().unwrap_or_default();
        if is_const {
            return Ok(self.new_const(ast, sv, node));
        }
        let source = self.scopes.name_source_of(sid, &path);
        if let (Value::Type(t), Some(NameSource::Type)) = (&sv.v, source) {
            return Ok(self.new_const_type(ast, *t, node));
        }
        let st = self.scopes.static_type_of(sid, &path);
        if st.is_none() {
            return Err(CompileError::name(format!("name {name} not defined yet")));
        }
        if let NodeKind::Name { path: p, .. } = ast.kind_mut(node) {
            *p = Some(path);
        }
        self.set_type_of(ast, node, st);
        Ok(node)
    }

    // ---- operators ----

    /// Applies the operator's operand rules to `t`.
    pub(super) fn check_operator(&self, op: BinaryOp, t: TypeRef) -> Result<()> {
        let k = self.types.kind(t);
        let ok = match op {
            BinaryOp::Add => k.is_numeric() || k == Kind::String,
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Quo => k.is_numeric(),
            BinaryOp::Rem | BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::AndNot => k.is_integer(),
            BinaryOp::LAnd | BinaryOp::LOr => k == Kind::Bool,
            BinaryOp::Eql | BinaryOp::Neq => k.is_comparable(),
            BinaryOp::Lss | BinaryOp::Leq | BinaryOp::Gtr | BinaryOp::Geq => k.is_ordered(),
            BinaryOp::Shl | BinaryOp::Shr => k.is_integer(),
        };
        if ok {
            return Ok(());
        }
        Err(CompileError::type_error(format!(
            "invalid operation: operator {op} not defined on {}",
            self.types.type_string(t)
        )))
    }

    pub(super) fn is_const_zero(&self, ast: &Ast, n: NodeId) -> bool {
        matches!(ast.kind(n), NodeKind::Const { tv, .. } if is_const_zero(&tv.v))
    }

    /// A shift count must be an integer; untyped constants become `uint`.
    pub(super) fn check_shift_count(&mut self, ast: &mut Ast, r: NodeId) -> Result<()> {
        if self.is_untyped_const(ast, r) {
            let uint = self.types.prim(PrimitiveType::Uint);
            self.convert_const(ast, r, Some(uint)).map_err(|_| {
                CompileError::type_error(format!("invalid shift count {}", render(ast, r)))
            })?;
        }
        let rt = self.type_of(ast, r);
        if !self.kind_of(rt).is_integer() {
            return Err(CompileError::type_error(format!(
                "invalid operation: shift count type {}, must be integer",
                self.type_name(rt)
            )));
        }
        Ok(())
    }

    fn leave_binary(&mut self, ast: &mut Ast, node: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> Result<NodeId> {
        self.single_value(ast, left)?;
        self.single_value(ast, right)?;
        if op.is_shift() {
            return self.leave_shift(ast, node, op, left, right);
        }
        let (lnil, rnil) = (self.is_nil(ast, left), self.is_nil(ast, right));
        if lnil || rnil {
            return self.leave_nil_comparison(ast, node, op, left, right, lnil && rnil);
        }
        let (lc, rc) = (
            matches!(ast.kind(left), NodeKind::Const { .. }),
            matches!(ast.kind(right), NodeKind::Const { .. }),
        );
        let (lu, ru) = (self.is_untyped_const(ast, left), self.is_untyped_const(ast, right));
        match (lu, ru) {
            (true, true) => self.unify_untyped(ast, left, right)?,
            (true, false) => {
                let rt = self.type_of(ast, right);
                self.convert_operand(ast, left, rt)?;
            }
            (false, true) => {
                let lt = self.type_of(ast, left);
                self.convert_operand(ast, right, lt)?;
            }
            (false, false) => {}
        }
        let lt = self.type_of(ast, left).ok_or_else(|| CompileError::type_error("operand without type"))?;
        let rt = self.type_of(ast, right).ok_or_else(|| CompileError::type_error("operand without type"))?;
        let same = self.types.same(lt, rt);
        let iface_cmp = op.is_comparison()
            && ((self.types.is_interface(lt) && implements(self.types, rt, lt).is_ok())
                || (self.types.is_interface(rt) && implements(self.types, lt, rt).is_ok()));
        if !same && !iface_cmp {
            return Err(CompileError::type_error(format!(
                "invalid operation: {} (mismatched types {} and {})",
                render(ast, node),
                self.types.type_string(lt),
                self.types.type_string(rt)
            )));
        }
        if same {
            self.check_operator(op, lt)?;
        }
        if matches!(op, BinaryOp::Quo | BinaryOp::Rem) && self.is_const_zero(ast, right) {
            let k = self.types.kind(lt);
            if k.is_integer() || k == Kind::Bigint || (lc && rc) {
                return Err(CompileError::type_error("invalid operation: division by zero"));
            }
        }
        if lc && rc {
            let (NodeKind::Const { tv: l, .. }, NodeKind::Const { tv: r, .. }) = (ast.kind(left), ast.kind(right)) else {
                return Err(CompileError::syntax("constant operands expected"));
            };
            let tv = binary_op(self.types, op, l, r).map_err(op_error)?;
            return Ok(self.new_const(ast, tv, node));
        }
        let t = if op.is_comparison() { self.types.bool() } else { lt };
        self.set_type_of(ast, node, Some(t));
        Ok(node)
    }

    /// Converts an untyped constant operand to the type of the other side.
    fn convert_operand(&mut self, ast: &mut Ast, n: NodeId, t: Option<TypeRef>) -> Result<()> {
        self.convert_const(ast, n, t).map_err(|e| {
            CompileError::type_error(format!(
                "cannot use {} (untyped constant) as {} value: {}",
                render(ast, n),
                self.type_name(t),
                e.message()
            ))
        })
    }

    fn unify_untyped(&mut self, ast: &mut Ast, left: NodeId, right: NodeId) -> Result<()> {
        let (Some(lt), Some(rt)) = (self.type_of(ast, left), self.type_of(ast, right)) else {
            return Ok(());
        };
        let (Some(lp), Some(rp)) = (self.types.primitive(lt), self.types.primitive(rt)) else {
            return Ok(());
        };
        if lp == rp {
            return Ok(());
        }
        let (lr, rr) = (untyped_rank(lp), untyped_rank(rp));
        if lr == 3 || rr == 3 {
            return Err(CompileError::type_error(format!(
                "invalid operation: mismatched types {} and {}",
                lp.name(),
                rp.name()
            )));
        }
        if lr < rr {
            self.convert_const(ast, left, Some(rt))
        } else {
            self.convert_const(ast, right, Some(lt))
        }
    }

    fn leave_nil_comparison(&mut self, ast: &mut Ast, node: NodeId, op: BinaryOp, left: NodeId, right: NodeId, both: bool) -> Result<NodeId> {
        if !matches!(op, BinaryOp::Eql | BinaryOp::Neq) || both {
            return Err(CompileError::type_error(format!(
                "invalid operation: {} (operator {op} not defined on nil)",
                render(ast, node)
            )));
        }
        let (nil, other) = if self.is_nil(ast, left) { (left, right) } else { (right, left) };
        let ot = self.type_of(ast, other).ok_or_else(|| {
            CompileError::type_error(format!("invalid operation: {}", render(ast, node)))
        })?;
        self.convert_nil(ast, nil, ot).map_err(|_| {
            CompileError::type_error(format!(
                "invalid operation: {} (mismatched types {} and untyped nil)",
                render(ast, node),
                self.types.type_string(ot)
            ))
        })?;
        let b = self.types.bool();
        self.set_type_of(ast, node, Some(b));
        Ok(node)
    }

    fn leave_shift(&mut self, ast: &mut Ast, node: NodeId, op: BinaryOp, left: NodeId, right: NodeId) -> Result<NodeId> {
        self.check_shift_count(ast, right)?;
        let lc = matches!(ast.kind(left), NodeKind::Const { .. });
        let rc = matches!(ast.kind(right), NodeKind::Const { .. });
        if lc && rc {
            let (NodeKind::Const { tv: l, .. }, NodeKind::Const { tv: r, .. }) = (ast.kind(left), ast.kind(right)) else {
                return Err(CompileError::syntax("constant operands expected"));
            };
            if l.ty.and_then(|t| self.types.primitive(t)) == Some(PrimitiveType::UntypedBigdec) {
                let mut l = l.clone();
                let bigint = self.types.prim(PrimitiveType::UntypedBigint);
                crate::values::convert_untyped_to(self.types, &mut l, Some(bigint)).map_err(|_| {
                    CompileError::type_error(format!(
                        "invalid operation: shifted operand {} must be integer",
                        render(ast, left)
                    ))
                })?;
                let r = r.clone();
                let tv = binary_op(self.types, op, &l, &r).map_err(op_error)?;
                return Ok(self.new_const(ast, tv, node));
            }
            let tv = binary_op(self.types, op, l, r).map_err(op_error)?;
            return Ok(self.new_const(ast, tv, node));
        }
        if self.is_untyped_const(ast, left) {
            let int = self.types.int();
            self.convert_const(ast, left, Some(int))?;
        }
        let lt = self.type_of(ast, left);
        if !self.kind_of(lt).is_integer() {
            return Err(CompileError::type_error(format!(
                "invalid operation: shifted operand {} must be integer",
                render(ast, left)
            )));
        }
        self.set_type_of(ast, node, lt);
        Ok(node)
    }

    fn leave_unary(&mut self, ast: &mut Ast, node: NodeId, op: UnaryOp, x: NodeId) -> Result<NodeId> {
        self.single_value(ast, x)?;
        let xt = self.type_of(ast, x);
        if op == UnaryOp::Recv {
            let elt = xt
                .filter(|t| matches!(self.types.base(*t), Type::Chan { .. }))
                .and_then(|t| self.types.elem(t))
                .ok_or_else(|| {
                    CompileError::type_error(format!(
                        "invalid operation: cannot receive from non-channel {}",
                        render(ast, x)
                    ))
                })?;
            self.set_type_of(ast, node, Some(elt));
            return Ok(node);
        }
        if let NodeKind::Const { tv, .. } = ast.kind(x) {
            if tv.is_undefined() {
                return Err(CompileError::type_error(format!("invalid operation: operator {op} not defined on nil")));
            }
            let tv = unary_op(self.types, op, tv).map_err(op_error)?;
            return Ok(self.new_const(ast, tv, node));
        }
        let k = self.kind_of(xt);
        let ok = match op {
            UnaryOp::Pos | UnaryOp::Neg => k.is_numeric(),
            UnaryOp::Not => k == Kind::Bool,
            UnaryOp::Xor => k.is_integer(),
            UnaryOp::Recv => true,
        };
        if !ok {
            return Err(CompileError::type_error(format!(
                "invalid operation: operator {op} not defined on {} (variable of type {})",
                render(ast, x),
                self.type_name(xt)
            )));
        }
        self.set_type_of(ast, node, xt);
        Ok(node)
    }

    // ---- calls ----

    fn leave_call(&mut self, ast: &mut Ast, node: NodeId) -> Result<NodeId> {
        let NodeKind::Call { func, args, varg, .. } = ast.kind(node).clone() else {
            return Ok(node);
        };
        if let NodeKind::ConstType { ty, .. } = ast.kind(func) {
            let ty = *ty;
            if varg {
                return Err(CompileError::type_error(format!(
                    "invalid use of ... in conversion to {}",
                    self.types.type_string(ty)
                )));
            }
            return self.leave_conversion(ast, node, ty, &args);
        }
        if let NodeKind::Name { path: Some(p), .. } = ast.kind(func)
            && p.kind == PathKind::Uverse
        {
            let tv = self
                .scopes
                .get(self.scopes.uverse)
                .values
                .get(p.index as usize)
                .cloned()
                .unwrap_or_default();
            if let Some(name) = builtin_name(&tv) {
                let name = name.to_string();
                return self.leave_builtin(ast, node, &name, &args, varg);
            }
        }
        let ft = self.type_of(ast, func);
        let Some((params, results, variadic)) = ft
            .and_then(|t| self.types.signature(t))
            .map(|(p, r, v)| (p.to_vec(), r.to_vec(), v))
        else {
            return Err(CompileError::type_error(format!(
                "invalid operation: cannot call non-function {} (variable of type {})",
                render(ast, func),
                self.type_name(ft)
            )));
        };
        let fname = render(ast, func);
        let param_at = |types: &crate::types::Types, i: usize| -> Option<TypeRef> {
            if variadic && i + 1 >= params.len() {
                let last = *params.last()?;
                if varg { Some(last) } else { types.elem(last) }
            } else {
                params.get(i).copied()
            }
        };

        let spread = if args.len() == 1 {
            self.type_of(ast, args[0])
                .and_then(|t| self.types.tuple_elts(t))
                .map(<[TypeRef]>::to_vec)
        } else {
            None
        };
        let num_args = match spread {
            Some(elts) => {
                self.check_arity(&fname, params.len(), elts.len(), variadic && !varg)?;
                for (i, e) in elts.iter().enumerate() {
                    let p = param_at(&*self.types, i).ok_or_else(|| CompileError::type_error(format!("too many arguments in call to {fname}")))?;
                    check_type(self.types, *e, p, true).map_err(|e| {
                        CompileError::type_error(format!("{e} in argument to {fname}"))
                    })?;
                }
                elts.len()
            }
            None => {
                if varg && !variadic {
                    return Err(CompileError::type_error(format!(
                        "have (...) arguments but {fname} is not variadic"
                    )));
                }
                self.check_arity(&fname, params.len(), args.len(), variadic && !varg)?;
                for (i, &a) in args.iter().enumerate() {
                    self.single_value(ast, a)?;
                    let p = param_at(&*self.types, i).ok_or_else(|| CompileError::type_error(format!("too many arguments in call to {fname}")))?;
                    self.assign_to(ast, a, p).map_err(|e| {
                        CompileError::type_error(format!("{} in argument to {fname}", e.message()))
                    })?;
                }
                args.len()
            }
        };
        if let NodeKind::Call { num_args: n, .. } = ast.kind_mut(node) {
            *n = num_args;
        }
        let t = match results.len() {
            0 => None,
            1 => Some(results[0]),
            _ => Some(self.types.tuple(results)),
        };
        self.set_type_of(ast, node, t);
        Ok(node)
    }

    fn check_arity(&self, fname: &str, params: usize, args: usize, variadic: bool) -> Result<()> {
        let enough = if variadic { args + 1 >= params } else { args >= params };
        if !enough {
            return Err(CompileError::type_error(format!("not enough arguments in call to {fname}")));
        }
        if !variadic && args > params {
            return Err(CompileError::type_error(format!("too many arguments in call to {fname}")));
        }
        Ok(())
    }

    fn leave_conversion(&mut self, ast: &mut Ast, node: NodeId, t: TypeRef, args: &[NodeId]) -> Result<NodeId> {
        let ts = self.types.type_string(t);
        let &[a] = args else {
            let which = if args.is_empty() { "missing argument" } else { "too many arguments" };
            return Err(CompileError::type_error(format!("{which} in conversion to {ts}")));
        };
        self.single_value(ast, a)?;
        // a conversion left for run time is a call of the type value
        if let NodeKind::Call { num_args, varg, .. } = ast.kind_mut(node) {
            *num_args = 1;
            *varg = false;
        }
        if self.is_nil(ast, a) {
            self.convert_nil(ast, a, t)?;
            self.set_type_of(ast, node, Some(t));
            return Ok(node);
        }
        let primitive = self.types.primitive(self.types.base_of(t)).is_some();
        if primitive && let NodeKind::Const { tv, .. } = ast.kind(a) {
            let mut tv = tv.clone();
            convert_to(self.types, &mut tv, t, true).map_err(|e| {
                CompileError::type_error(format!("cannot convert {} to type {ts}: {e}", render(ast, a)))
            })?;
            return Ok(self.new_const(ast, tv, node));
        }
        if self.is_untyped_const(ast, a) {
            // non-primitive targets convert at run time from the default type
            let target = if self.types.is_interface(t) { None } else { Some(t) };
            if self.convert_const(ast, a, target).is_err() {
                self.default_const(ast, a)?;
            }
        }
        self.set_type_of(ast, node, Some(t));
        Ok(node)
    }

    fn leave_builtin(&mut self, ast: &mut Ast, node: NodeId, name: &str, args: &[NodeId], varg: bool) -> Result<NodeId> {
        let count = |want: usize| -> Result<()> {
            match args.len().cmp(&want) {
                std::cmp::Ordering::Less => Err(CompileError::type_error(format!("not enough arguments for {name}"))),
                std::cmp::Ordering::Greater => Err(CompileError::type_error(format!("too many arguments for {name}"))),
                std::cmp::Ordering::Equal => Ok(()),
            }
        };
        if varg && name != "append" {
            return Err(CompileError::type_error(format!("invalid operation: invalid use of ... with built-in {name}")));
        }
        let int = self.types.int();
        let t = match name {
            "len" | "cap" => {
                count(1)?;
                let a = args[0];
                self.single_value(ast, a)?;
                self.default_const(ast, a)?;
                let at = self.type_of(ast, a);
                let k = self.kind_of(at);
                let ptr_array = at.is_some_and(|t| {
                    matches!(self.types.base(t), Type::Pointer(e) if matches!(self.types.base(*e), Type::Array { .. }))
                });
                let ok = match name {
                    "len" => matches!(k, Kind::String | Kind::Array | Kind::Slice | Kind::Map | Kind::Chan) || ptr_array,
                    _ => matches!(k, Kind::Array | Kind::Slice | Kind::Chan) || ptr_array,
                };
                if !ok {
                    return Err(CompileError::type_error(format!(
                        "invalid argument: {} ({}) for built-in {name}",
                        render(ast, a),
                        self.type_name(at)
                    )));
                }
                if let NodeKind::Const { tv, .. } = ast.kind(a)
                    && let Some(s) = tv.as_str()
                {
                    let n = TypedValue::int(self.types, s.len() as i64);
                    return Ok(self.new_const(ast, n, node));
                }
                if let Some(n) = at.and_then(|t| self.types.array_len(t)) {
                    let n = TypedValue::int(self.types, n as i64);
                    return Ok(self.new_const(ast, n, node));
                }
                Some(int)
            }
            "append" => {
                let Some(&s) = args.first() else {
                    return Err(CompileError::type_error("not enough arguments for append"));
                };
                if self.is_nil(ast, s) {
                    return Err(CompileError::type_error(
                        "first argument to append must be a typed slice; have untyped nil",
                    ));
                }
                let st = self.type_of(ast, s);
                let elt = st
                    .filter(|t| matches!(self.types.base(*t), Type::Slice(_)))
                    .and_then(|t| self.types.elem(t))
                    .ok_or_else(|| {
                        CompileError::type_error(format!(
                            "invalid argument: {} (variable of type {}) is not a slice",
                            render(ast, s),
                            self.type_name(st)
                        ))
                    })?;
                let st = st.ok_or_else(|| CompileError::type_error("append to a value without type"))?;
                if varg {
                    count(2)?;
                    let rest = args[1];
                    let is_bytes = self.kind_of(Some(elt)) == Kind::Uint8;
                    if is_bytes && (self.kind_of(self.type_of(ast, rest)) == Kind::String || self.is_untyped_const(ast, rest)) {
                        self.default_const(ast, rest)?;
                    } else {
                        self.assign_to(ast, rest, st)?;
                    }
                } else {
                    for &a in &args[1..] {
                        self.single_value(ast, a)?;
                        self.assign_to(ast, a, elt)?;
                    }
                }
                Some(st)
            }
            "copy" => {
                count(2)?;
                for &a in args {
                    self.single_value(ast, a)?;
                    self.default_const(ast, a)?;
                }
                Some(int)
            }
            "delete" => {
                count(2)?;
                let mt = self.type_of(ast, args[0]);
                let key = mt.and_then(|t| self.types.map_key(t)).ok_or_else(|| {
                    CompileError::type_error(format!(
                        "invalid argument: {} is not a map",
                        render(ast, args[0])
                    ))
                })?;
                self.assign_to(ast, args[1], key)?;
                None
            }
            "make" => {
                let Some(&first) = args.first() else {
                    return Err(CompileError::type_error("not enough arguments for make"));
                };
                let t = self.type_value(ast, first)?;
                if !matches!(self.types.kind(t), Kind::Slice | Kind::Map | Kind::Chan) {
                    return Err(CompileError::type_error(format!(
                        "invalid argument: cannot make {}; type must be slice, map, or channel",
                        self.types.type_string(t)
                    )));
                }
                if args.len() > 3 {
                    return Err(CompileError::type_error("too many arguments for make"));
                }
                if self.types.kind(t) == Kind::Slice && args.len() < 2 {
                    return Err(CompileError::type_error(format!(
                        "invalid operation: make({}) expects 2 or 3 arguments; found 1",
                        self.types.type_string(t)
                    )));
                }
                for &a in &args[1..] {
                    self.convert_const(ast, a, Some(int))?;
                    if !self.kind_of(self.type_of(ast, a)).is_integer() {
                        return Err(CompileError::type_error(format!(
                            "cannot convert {} to type int",
                            render(ast, a)
                        )));
                    }
                }
                Some(t)
            }
            "new" => {
                count(1)?;
                let t = self.type_value(ast, args[0])?;
                Some(self.types.pointer(t))
            }
            "panic" => {
                count(1)?;
                self.single_value(ast, args[0])?;
                if !self.is_nil(ast, args[0]) {
                    self.default_const(ast, args[0])?;
                }
                None
            }
            "print" | "println" => {
                for &a in args {
                    self.single_value(ast, a)?;
                    if self.is_nil(ast, a) {
                        return Err(CompileError::type_error("use of untyped nil in argument to built-in print"));
                    }
                    self.default_const(ast, a)?;
                }
                None
            }
            "recover" => {
                count(0)?;
                Some(self.types.empty_interface())
            }
            "close" => {
                count(1)?;
                None
            }
            other => {
                return Err(CompileError::syntax(format!("unknown builtin {other}")));
            }
        };
        if let NodeKind::Call { num_args, .. } = ast.kind_mut(node) {
            *num_args = args.len();
        }
        self.set_type_of(ast, node, t);
        Ok(node)
    }

    // ---- index, slice, selector ----

    fn leave_index(&mut self, ast: &mut Ast, node: NodeId, x: NodeId, index: NodeId, has_ok: bool) -> Result<NodeId> {
        if matches!(ast.kind(x), NodeKind::ConstType { .. }) {
            return Err(CompileError::type_error("generic types are not supported"));
        }
        self.single_value(ast, x)?;
        self.default_const(ast, x)?;
        let xt = self
            .type_of(ast, x)
            .ok_or_else(|| CompileError::type_error(format!("invalid operation: cannot index {}", render(ast, x))))?;
        let bt = match self.types.base(xt) {
            Type::Pointer(e) if matches!(self.types.base(*e), Type::Array { .. }) => *e,
            _ => xt,
        };
        let kind = self.types.kind(bt);
        let t = match self.types.base(bt).clone() {
            Type::Map { key, value } => {
                self.assign_to(ast, index, key)?;
                let t = if has_ok {
                    let b = self.types.bool();
                    self.types.tuple(vec![value, b])
                } else {
                    value
                };
                self.set_type_of(ast, node, Some(t));
                return Ok(node);
            }
            Type::Array { elt, .. } | Type::Slice(elt) => elt,
            _ if kind == Kind::String => self.types.uint8(),
            _ => {
                return Err(CompileError::type_error(format!(
                    "invalid operation: cannot index {} (variable of type {})",
                    render(ast, x),
                    self.types.type_string(xt)
                )));
            }
        };
        if has_ok {
            return Err(mismatch_comma_ok());
        }
        self.check_index(ast, index, self.types.array_len(bt))?;
        self.set_type_of(ast, node, Some(t));
        Ok(node)
    }

    /// Index operands are integers; constant ones must be in range.
    fn check_index(&mut self, ast: &mut Ast, index: NodeId, len: Option<usize>) -> Result<()> {
        let int = self.types.int();
        self.convert_const(ast, index, Some(int)).map_err(|_| {
            CompileError::type_error(format!("invalid argument: index {} must be integer", render(ast, index)))
        })?;
        if !self.kind_of(self.type_of(ast, index)).is_integer() {
            return Err(CompileError::type_error(format!(
                "invalid argument: index {} (variable of type {}) must be integer",
                render(ast, index),
                self.type_name(self.type_of(ast, index))
            )));
        }
        if let NodeKind::Const { tv, .. } = ast.kind(index)
            && let Some(i) = tv.as_i64()
        {
            if i < 0 {
                return Err(CompileError::type_error(format!(
                    "invalid argument: index {} (constant of type int) must not be negative",
                    render(ast, index)
                )));
            }
            if let Some(len) = len
                && i as usize >= len
            {
                return Err(CompileError::type_error(format!(
                    "invalid argument: index {i} out of bounds [0:{len}]"
                )));
            }
        }
        Ok(())
    }

    fn leave_slice(&mut self, ast: &mut Ast, node: NodeId, x: NodeId, bounds: [Option<NodeId>; 3]) -> Result<NodeId> {
        self.single_value(ast, x)?;
        self.default_const(ast, x)?;
        let xt = self
            .type_of(ast, x)
            .ok_or_else(|| CompileError::type_error(format!("cannot slice {}", render(ast, x))))?;
        let kind = self.types.kind(xt);
        let t = match self.types.base(xt).clone() {
            Type::Slice(_) => xt,
            Type::Array { elt, .. } => self.types.slice(elt),
            Type::Pointer(e) => match self.types.base(e).clone() {
                Type::Array { elt, .. } => self.types.slice(elt),
                _ => return Err(cannot_slice(ast, x, self.types.type_string(xt))),
            },
            _ if kind == Kind::String => {
                if bounds[2].is_some() {
                    return Err(CompileError::type_error("invalid operation: 3-index slice of string"));
                }
                xt
            }
            _ => return Err(cannot_slice(ast, x, self.types.type_string(xt))),
        };
        for b in bounds.into_iter().flatten() {
            self.check_index(ast, b, None)?;
        }
        self.set_type_of(ast, node, Some(t));
        Ok(node)
    }

    fn leave_selector(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId, x: NodeId, sel: &str) -> Result<NodeId> {
        if let NodeKind::Name { path: Some(_), .. } = ast.kind(x)
            && self.type_of(ast, x) == Some(self.types.package())
        {
            return self.select_package_member(ast, blocks, node, x, sel);
        }
        if let NodeKind::ConstType { ty, .. } = ast.kind(x) {
            return Err(CompileError::syntax(format!(
                "method expression {}.{sel} is not supported",
                self.types.type_string(*ty)
            )));
        }
        self.single_value(ast, x)?;
        let xt = self
            .type_of(ast, x)
            .ok_or_else(|| CompileError::type_error(format!("{}.{sel} undefined", render(ast, x))))?;
        let found = find_selector(self.types, xt, sel).map_err(CompileError::type_error)?;
        let Some(found) = found else {
            return Err(CompileError::type_error(format!(
                "{}.{sel} undefined (type {} has no field or method {sel})",
                render(ast, x),
                self.types.type_string(xt)
            )));
        };
        let Some((last, steps)) = found.path.split_last() else {
            return Err(CompileError::syntax(format!("empty selector path for {sel}")));
        };
        let span = ast.span(node);
        let mut cur = x;
        let mut cur_t = xt;
        for step in steps {
            let recv = match self.types.base(cur_t) {
                Type::Pointer(e) => *e,
                _ => cur_t,
            };
            let ft = self
                .types
                .struct_fields(recv)
                .and_then(|f| f.get(step.index as usize))
                .map(|f| f.ty)
                .ok_or_else(|| CompileError::syntax(format!("embedded field {} not found", step.name)))?;
            let n = ast.alloc(
                NodeKind::Selector { x: cur, sel: step.name.clone(), path: Some(step.clone()) },
                span,
            );
            self.set_type_of(ast, n, Some(ft));
            ast.set_attr(n, AttrKey::Preprocessed, AttrValue::Flag);
            cur = n;
            cur_t = ft;
        }
        if found.needs_addr {
            let p = self.types.pointer(cur_t);
            let r = ast.alloc(NodeKind::Ref { x: cur }, span);
            self.set_type_of(ast, r, Some(p));
            ast.set_attr(r, AttrKey::Preprocessed, AttrValue::Flag);
            cur = r;
        }
        if found.is_method() {
            self.decls.record(Dep::Method(sel.to_string()));
        }
        if let NodeKind::Selector { x, path, .. } = ast.kind_mut(node) {
            *x = cur;
            *path = Some(last.clone());
        }
        self.set_type_of(ast, node, Some(found.ty));
        Ok(node)
    }

    fn select_package_member(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId, x: NodeId, sel: &str) -> Result<NodeId> {
        let NodeKind::Name { name, path: Some(path) } = ast.kind(x) else {
            return Err(CompileError::syntax("package selector without package"));
        };
        let (name, path) = (name.clone(), path.clone());
        let sid = self.scope(ast, blocks)?;
        let Some(Value::Package(pv)) = self.scopes.static_value_of(sid, &path).map(|tv| tv.v.clone()) else {
            return Err(CompileError::name(format!("{name} is not a package")));
        };
        if !is_exported(sel) {
            return Err(CompileError::name(format!("name {sel} not exported by package {}", pv.name)));
        }
        let psb = self.scopes.get(pv.scope);
        let idx = psb
            .local_index(sel)
            .ok_or_else(|| CompileError::name(format!("undefined: {}.{sel}", pv.name)))?;
        let i = idx as usize;
        let (st, sv, source, is_const) = (psb.types[i], psb.values[i].clone(), psb.name_sources[i], psb.is_const(sel));
        if is_const {
            return Ok(self.new_const(ast, sv, node));
        }
        if let (Value::Type(t), NameSource::Type) = (&sv.v, source) {
            return Ok(self.new_const_type(ast, *t, node));
        }
        if let NodeKind::Selector { path: p, .. } = ast.kind_mut(node) {
            *p = Some(ValuePath::selector(PathKind::Field, idx, sel));
        }
        self.set_type_of(ast, node, st);
        Ok(node)
    }

    fn leave_type_assert(&mut self, ast: &mut Ast, node: NodeId, x: NodeId, ty: Option<NodeId>, has_ok: bool) -> Result<NodeId> {
        let ty = ty.ok_or_else(|| CompileError::syntax("use of .(type) outside type switch"))?;
        self.single_value(ast, x)?;
        let xt = self.type_of(ast, x);
        let Some(xt) = xt.filter(|t| self.types.is_interface(*t)) else {
            return Err(CompileError::type_error(format!(
                "invalid operation: {} (variable of type {}) is not an interface",
                render(ast, x),
                self.type_name(xt)
            )));
        };
        let t = self.type_value(ast, ty)?;
        if !self.types.is_interface(t)
            && let Err(why) = implements(self.types, t, xt)
        {
            return Err(CompileError::type_error(format!(
                "impossible type assertion: {}.({})\n\t{}",
                render(ast, x),
                self.types.type_string(t),
                why
            )));
        }
        let result = if has_ok {
            let b = self.types.bool();
            self.types.tuple(vec![t, b])
        } else {
            t
        };
        self.set_type_of(ast, node, Some(result));
        Ok(node)
    }

    // ---- composite literals ----

    /// Resolves the literal type before the elements are walked, so that
    /// struct keys and elided element types can be filled in.
    pub(super) fn enter_composite(&mut self, ast: &mut Ast, blocks: &[NodeId], node: NodeId) -> Result<()> {
        let NodeKind::CompositeLit { ty, elts } = ast.kind(node).clone() else {
            return Ok(());
        };
        let ty = ty.ok_or_else(|| CompileError::type_error("invalid composite literal type: missing type"))?;
        if let NodeKind::ArrayType { len: None, .. } = ast.kind(ty) {
            let n = self.implicit_len(ast, blocks, &elts)?;
            let tv = TypedValue::int(self.types, n as i64);
            let c = self.new_const(ast, tv, ty);
            if let NodeKind::ArrayType { len, .. } = ast.kind_mut(ty) {
                *len = Some(c);
            }
        }
        let ty = self
            .nested(ast, blocks, node, Field::Type, 0)?
            .ok_or_else(|| CompileError::syntax("composite literal without type"))?;
        let t = self.type_value(ast, ty)?;
        match self.types.base(t).clone() {
            Type::Struct { fields, .. } => {
                for &e in &elts {
                    let NodeKind::KeyValue { key: Some(k), .. } = ast.kind(e) else {
                        continue;
                    };
                    let k = *k;
                    let NodeKind::Name { name, .. } = ast.kind(k) else {
                        return Err(CompileError::type_error(format!(
                            "invalid field name {} in struct literal",
                            render(ast, k)
                        )));
                    };
                    let i = fields.iter().position(|f| f.name == *name).ok_or_else(|| {
                        CompileError::type_error(format!(
                            "unknown field {name} in struct literal of type {}",
                            self.types.type_string(t)
                        ))
                    })?;
                    let tv = TypedValue::int(self.types, i as i64);
                    let c = self.new_const(ast, tv, k);
                    if let NodeKind::KeyValue { key, .. } = ast.kind_mut(e) {
                        *key = Some(c);
                    }
                }
            }
            Type::Array { elt, .. } | Type::Slice(elt) => {
                for &e in &elts {
                    self.elide_type(ast, e, Field::Value, elt)?;
                }
            }
            Type::Map { key, value } => {
                for &e in &elts {
                    self.elide_type(ast, e, Field::Key, key)?;
                    self.elide_type(ast, e, Field::Value, value)?;
                }
            }
            _ => {
                return Err(CompileError::type_error(format!(
                    "invalid composite literal type {}",
                    self.types.type_string(t)
                )));
            }
        }
        Ok(())
    }

    /// Length of a `[...]T` literal: one past the highest index.
    fn implicit_len(&mut self, ast: &mut Ast, blocks: &[NodeId], elts: &[NodeId]) -> Result<usize> {
        let mut next = 0usize;
        let mut max = 0usize;
        for &e in elts {
            if let NodeKind::KeyValue { key: Some(_), .. } = ast.kind(e) {
                let k = self
                    .nested(ast, blocks, e, Field::Key, 0)?
                    .ok_or_else(|| CompileError::syntax("missing key"))?;
                let int = self.types.int();
                self.convert_const(ast, k, Some(int))?;
                let NodeKind::Const { tv, .. } = ast.kind(k) else {
                    return Err(CompileError::type_error(format!(
                        "index {} must be integer constant",
                        render(ast, k)
                    )));
                };
                next = tv
                    .as_index()
                    .ok_or_else(|| CompileError::type_error(format!("invalid index {}", render(ast, k))))?;
            }
            next += 1;
            max = max.max(next);
        }
        Ok(max)
    }

    /// Gives an element literal with elided type the element type `t`,
    /// taking its address when `t` is a pointer.
    fn elide_type(&mut self, ast: &mut Ast, kv: NodeId, field: Field, t: TypeRef) -> Result<()> {
        let child = match (ast.kind(kv), field) {
            (NodeKind::KeyValue { key: Some(k), .. }, Field::Key) => *k,
            (NodeKind::KeyValue { value, .. }, Field::Value) => *value,
            _ => return Ok(()),
        };
        if !matches!(ast.kind(child), NodeKind::CompositeLit { ty: None, .. }) {
            return Ok(());
        }
        let (lit_t, is_ptr) = match self.types.get(t) {
            Type::Pointer(e) => (*e, true),
            _ => (t, false),
        };
        let ct = self.new_const_type(ast, lit_t, child);
        if let NodeKind::CompositeLit { ty, .. } = ast.kind_mut(child) {
            *ty = Some(ct);
        }
        if is_ptr {
            let r = ast.alloc(NodeKind::Ref { x: child }, ast.span(child));
            crate::ast::set_child(ast.kind_mut(kv), field, 0, r);
        }
        Ok(())
    }

    fn leave_composite(&mut self, ast: &mut Ast, node: NodeId) -> Result<NodeId> {
        let NodeKind::CompositeLit { ty: Some(ty), elts } = ast.kind(node).clone() else {
            return Err(CompileError::type_error("invalid composite literal type: missing type"));
        };
        let t = self.type_value(ast, ty)?;
        let ts = self.types.type_string(t);
        let entries: Vec<(Option<NodeId>, NodeId)> = elts
            .iter()
            .map(|&e| match ast.kind(e) {
                NodeKind::KeyValue { key, value } => (*key, *value),
                _ => (None, e),
            })
            .collect();
        match self.types.base(t).clone() {
            Type::Struct { fields, .. } => {
                let keyed = entries.iter().any(|(k, _)| k.is_some());
                if keyed {
                    for (k, v) in &entries {
                        let k = k.ok_or_else(|| {
                            CompileError::type_error("mixture of field:value and value elements in struct literal")
                        })?;
                        let NodeKind::Const { tv, .. } = ast.kind(k) else {
                            return Err(CompileError::syntax("struct literal key was not resolved"));
                        };
                        let i = tv.as_index().unwrap_or(usize::MAX);
                        let f = fields.get(i).ok_or_else(|| CompileError::syntax("struct field index out of range"))?;
                        self.single_value(ast, *v)?;
                        self.assign_to(ast, *v, f.ty)?;
                    }
                } else if !entries.is_empty() {
                    if entries.len() != fields.len() {
                        let which = if entries.len() < fields.len() { "few" } else { "many" };
                        return Err(CompileError::type_error(format!(
                            "too {which} values in struct literal of type {ts}"
                        )));
                    }
                    for ((_, v), f) in entries.iter().zip(&fields) {
                        self.single_value(ast, *v)?;
                        self.assign_to(ast, *v, f.ty)?;
                    }
                }
            }
            Type::Array { elt, len } => self.check_sequence(ast, &entries, elt, Some(len))?,
            Type::Slice(elt) => self.check_sequence(ast, &entries, elt, None)?,
            Type::Map { key, value } => {
                for (k, v) in &entries {
                    let k = k.ok_or_else(|| CompileError::type_error("missing key in map literal"))?;
                    self.single_value(ast, k)?;
                    self.assign_to(ast, k, key)?;
                    self.single_value(ast, *v)?;
                    self.assign_to(ast, *v, value)?;
                }
            }
            _ => return Err(CompileError::type_error(format!("invalid composite literal type {ts}"))),
        }
        self.set_type_of(ast, node, Some(t));
        Ok(node)
    }

    fn check_sequence(&mut self, ast: &mut Ast, entries: &[(Option<NodeId>, NodeId)], elt: TypeRef, len: Option<usize>) -> Result<()> {
        let mut next = 0usize;
        for (k, v) in entries {
            if let Some(k) = k {
                let int = self.types.int();
                self.convert_const(ast, *k, Some(int))?;
                let NodeKind::Const { tv, .. } = ast.kind(*k) else {
                    return Err(CompileError::type_error(format!(
                        "index {} must be integer constant",
                        render(ast, *k)
                    )));
                };
                next = tv
                    .as_index()
                    .ok_or_else(|| CompileError::type_error(format!("invalid index {}", render(ast, *k))))?;
            }
            if let Some(len) = len
                && next >= len
            {
                return Err(CompileError::type_error(format!(
                    "index {next} out of bounds [0:{len}]"
                )));
            }
            self.single_value(ast, *v)?;
            self.assign_to(ast, *v, elt)?;
            next += 1;
        }
        Ok(())
    }
}

fn mismatch_comma_ok() -> CompileError {
    CompileError::type_error("assignment mismatch: 2 variables but 1 value")
}

fn cannot_slice(ast: &Ast, x: NodeId, ts: String) -> CompileError {
    CompileError::type_error(format!("cannot slice {} (variable of type {ts})", render(ast, x)))
}
