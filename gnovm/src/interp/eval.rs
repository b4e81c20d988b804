//! Expression ops
//!
//! `Eval` pops an expression. A compound expression pushes itself back
//! with its completion op, then its operands, so that operands run first
//! and the completion op finds their values on the value stack.

use super::{ErrorKind, InterpResult, Machine, Op, RuntimeError};
use crate::ast::{LitKind, NodeKind, UnaryOp};
use crate::scope::{PathKind, ValuePath};
use crate::types::{Type, TypeRef, find_selector, implements};
use crate::values::{
    ArrayValue, BoundMethod, Closure, FuncValue, MapValue, Pointer, SliceValue, StructValue, TypedValue, Value,
    binary_op, map_key, new_slot, parse_float_lit, parse_int_lit, unary_op, unquote_char, unquote_string,
    zero_value,
};
use num_traits::ToPrimitive;
use std::rc::Rc;

/// An lvalue on the value stack.
pub(super) fn ptr_value(p: Pointer) -> TypedValue {
    TypedValue {
        ty: None,
        v: Value::Pointer(p),
    }
}

pub(super) fn hash_key(m: &Machine<'_>, key: &TypedValue) -> InterpResult<String> {
    map_key(m.types, key).map_err(|e| RuntimeError::new(ErrorKind::Conversion, e))
}

/// Bounds-checked index.
fn checked_index(idx: &TypedValue, len: usize) -> InterpResult<usize> {
    let i = match &idx.v {
        Value::Int(i) => *i,
        Value::Uint(u) => i64::try_from(*u).unwrap_or(i64::MAX),
        _ => return Err(RuntimeError::internal("non-integer index")),
    };
    if i < 0 || i as u64 >= len as u64 {
        return Err(RuntimeError::index_out_of_bounds(i, len));
    }
    Ok(i as usize)
}

fn slice_bound(v: Option<TypedValue>, default: usize) -> InterpResult<usize> {
    match v {
        None => Ok(default),
        Some(tv) => tv
            .as_index()
            .ok_or_else(|| RuntimeError::new(ErrorKind::IndexOutOfBounds, "runtime error: slice bounds out of range")),
    }
}

/// Value of a literal left in the tree; literals normally arrive folded.
fn literal_value(m: &Machine<'_>, kind: LitKind, text: &str) -> InterpResult<TypedValue> {
    let types = m.types;
    Ok(match kind {
        LitKind::Int => {
            let b = parse_int_lit(text).map_err(RuntimeError::internal)?;
            let i = i64::try_from(&b).map_err(|_| RuntimeError::internal(format!("constant {text} overflows int")))?;
            TypedValue::int(types, i)
        }
        LitKind::Float => {
            let d = parse_float_lit(text).map_err(RuntimeError::internal)?;
            TypedValue::new(types.float64(), Value::Float64(d.to_f64().unwrap_or(f64::NAN)))
        }
        LitKind::Char => {
            let c = unquote_char(text).map_err(RuntimeError::internal)?;
            TypedValue::new(types.int32(), Value::Int(c as i64))
        }
        LitKind::String => {
            let s = unquote_string(text).map_err(RuntimeError::internal)?;
            TypedValue::string(types, &s)
        }
        LitKind::Imag => return Err(RuntimeError::unsupported("imaginary numbers")),
    })
}

impl Machine<'_> {
    pub(super) fn op_eval(&mut self) -> InterpResult<()> {
        let ast = self.ast;
        let x = self.pop_expr()?;
        match ast.kind(x) {
            NodeKind::Name { path: Some(path), .. } => {
                let v = self.get_path(path)?;
                self.values.push(v);
            }
            NodeKind::Name { name, path: None } => {
                return Err(RuntimeError::internal(format!("unresolved name {name}")));
            }
            NodeKind::Const { tv, .. } => self.values.push(tv.clone()),
            NodeKind::ConstType { ty, .. } => {
                self.values
                    .push(TypedValue::new(self.types.type_type(), Value::Type(*ty)));
            }
            NodeKind::BasicLit { kind, value } => {
                let tv = literal_value(self, *kind, value)?;
                self.values.push(tv);
            }
            NodeKind::Binary { op, left, right } => {
                self.exprs.push(x);
                if op.is_logical() {
                    self.ops.push(Op::LogicalRight);
                } else {
                    self.ops.push(Op::Binary);
                    self.push_eval(*right);
                }
                self.push_eval(*left);
            }
            NodeKind::Unary { x: e, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::Unary);
                self.push_eval(*e);
            }
            NodeKind::Call { func, args, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::Call);
                for a in args.iter().rev() {
                    self.push_eval(*a);
                }
                self.push_eval(*func);
            }
            NodeKind::Index { x: e, index, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::Index);
                self.push_eval(*index);
                self.push_eval(*e);
            }
            NodeKind::Selector { x: e, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::Selector);
                self.push_eval(*e);
            }
            NodeKind::Slice { x: e, low, high, max } => {
                self.exprs.push(x);
                self.ops.push(Op::Slice);
                for b in [max, high, low].into_iter().flatten() {
                    self.push_eval(*b);
                }
                self.push_eval(*e);
            }
            NodeKind::Star { x: e } => {
                self.exprs.push(x);
                self.ops.push(Op::Star);
                self.push_eval(*e);
            }
            NodeKind::Ref { x: e } => {
                self.exprs.push(x);
                self.ops.push(Op::Ref);
                self.push_eval_ptr(*e);
            }
            NodeKind::TypeAssert { x: e, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::TypeAssert);
                self.push_eval(*e);
            }
            NodeKind::CompositeLit { elts, .. } => {
                let is_map = ast
                    .type_of(x)
                    .is_some_and(|t| matches!(self.types.base(t), Type::Map { .. }));
                self.exprs.push(x);
                self.ops.push(Op::CompositeLit);
                for &elt in elts.iter().rev() {
                    match ast.kind(elt) {
                        NodeKind::KeyValue { key, value } => {
                            self.push_eval(*value);
                            if is_map && let Some(k) = key {
                                self.push_eval(*k);
                            }
                        }
                        _ => self.push_eval(elt),
                    }
                }
            }
            NodeKind::FuncLit { captures, .. } => {
                let ty = ast
                    .type_of(x)
                    .ok_or_else(|| RuntimeError::internal("function literal without type"))?;
                let block = self.top_block()?;
                let slots = captures
                    .iter()
                    .map(|c| self.path_slot(&c.source))
                    .collect::<InterpResult<Vec<_>>>()?;
                let fv = FuncValue {
                    ty,
                    name: String::new(),
                    source: Some(x),
                    pkg_path: self.current_pkg_path(),
                    closure: Some(Closure::Block(block)),
                    captures: slots,
                    native: None,
                    is_method: false,
                };
                self.values.push(TypedValue::new(ty, Value::Func(Rc::new(fv))));
            }
            other => {
                return Err(RuntimeError::internal(format!(
                    "cannot evaluate {}",
                    other.name()
                )));
            }
        }
        Ok(())
    }

    pub(super) fn current_pkg_path(&self) -> String {
        if let Some(cf) = self.frames.iter().rev().find_map(|f| f.call()) {
            return cf.pkg_path.clone();
        }
        let mut cur = self.blocks.last().cloned();
        while let Some(b) = cur {
            if let Some(NodeKind::Package { path, .. }) = b.node.map(|n| self.ast.kind(n)) {
                return path.clone();
            }
            cur = b.parent.clone();
        }
        String::new()
    }

    pub(super) fn op_eval_ptr(&mut self) -> InterpResult<()> {
        let ast = self.ast;
        let x = self.pop_expr()?;
        match ast.kind(x) {
            NodeKind::Name { path: Some(path), .. } => {
                if path.depth == 0 && path.name == "_" {
                    self.values.push(ptr_value(Pointer::Discard));
                } else {
                    let slot = self.path_slot(path)?;
                    self.values.push(ptr_value(Pointer::Slot(slot)));
                }
            }
            NodeKind::Index { x: e, index, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::IndexPtr);
                self.push_eval(*index);
                self.push_eval(*e);
            }
            NodeKind::Selector { x: e, .. } => {
                self.exprs.push(x);
                self.ops.push(Op::SelectorPtr);
                self.push_eval(*e);
            }
            NodeKind::Star { x: e } => {
                self.exprs.push(x);
                self.ops.push(Op::StarPtr);
                self.push_eval(*e);
            }
            _ => {
                self.exprs.push(x);
                self.ops.push(Op::AddrOf);
                self.push_eval(x);
            }
        }
        Ok(())
    }

    pub(super) fn op_binary(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let r = self.pop_value()?;
        let l = self.pop_value()?;
        let NodeKind::Binary { op, .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("Binary op without binary expression"));
        };
        let mut res = binary_op(self.types, *op, &l, &r)?;
        if op.is_comparison() {
            let t = self
                .ast
                .type_of(x)
                .filter(|t| !self.types.is_untyped(*t))
                .unwrap_or_else(|| self.types.bool());
            res.ty = Some(t);
        }
        self.values.push(res);
        Ok(())
    }

    pub(super) fn op_logical_right(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let l = self.pop_value()?;
        let NodeKind::Binary { op, right, .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("LogicalRight without binary expression"));
        };
        let b = l
            .as_bool()
            .ok_or_else(|| RuntimeError::internal("non-bool operand of logical operator"))?;
        let short = match op {
            crate::ast::BinaryOp::LAnd => !b,
            _ => b,
        };
        if short {
            self.values.push(l);
        } else {
            self.push_eval(*right);
        }
        Ok(())
    }

    pub(super) fn op_unary(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let v = self.pop_value()?;
        let NodeKind::Unary { op, .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("Unary op without unary expression"));
        };
        if *op == UnaryOp::Recv {
            return Err(RuntimeError::unsupported("channel receive"));
        }
        let res = unary_op(self.types, *op, &v)?;
        self.values.push(res);
        Ok(())
    }

    pub(super) fn op_index(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let idx = self.pop_value()?;
        let xv = self.pop_value()?;
        let has_ok = matches!(self.ast.kind(x), NodeKind::Index { has_ok: true, .. });
        self.index_value(xv, &idx, has_ok)
    }

    fn index_value(&mut self, xv: TypedValue, idx: &TypedValue, has_ok: bool) -> InterpResult<()> {
        let types = self.types;
        let v = match &xv.v {
            Value::Array(av) => {
                let i = checked_index(idx, av.elems.len())?;
                av.get(i).unwrap_or_default()
            }
            Value::Slice(sv) => {
                let i = checked_index(idx, sv.len)?;
                sv.get(i).unwrap_or_default()
            }
            Value::String(s) => {
                let i = checked_index(idx, s.len())?;
                TypedValue::new(types.uint8(), Value::Uint(s.as_bytes()[i] as u64))
            }
            Value::Map(mv) => {
                let hash = hash_key(self, idx)?;
                let found = mv.get(&hash);
                let ok = found.is_some();
                let v = match found {
                    Some(v) => v,
                    None => self.map_zero(xv.ty)?,
                };
                self.values.push(v);
                if has_ok {
                    self.values.push(TypedValue::bool(types, ok));
                }
                return Ok(());
            }
            Value::Pointer(Pointer::Slot(s)) => {
                let inner = s.borrow().clone();
                return self.index_value(inner, idx, has_ok);
            }
            Value::None => {
                let is_map = xv.ty.is_some_and(|t| types.map_key(t).is_some());
                if !is_map {
                    return Err(match xv.ty.map(|t| types.kind(t)) {
                        Some(crate::types::Kind::Slice) => RuntimeError::index_out_of_bounds(idx.as_i64().unwrap_or(0), 0),
                        _ => RuntimeError::nil_dereference(),
                    });
                }
                self.values.push(self.map_zero(xv.ty)?);
                if has_ok {
                    self.values.push(TypedValue::bool(types, false));
                }
                return Ok(());
            }
            _ => return Err(RuntimeError::internal("cannot index value")),
        };
        self.values.push(v);
        Ok(())
    }

    fn map_zero(&self, map_ty: Option<TypeRef>) -> InterpResult<TypedValue> {
        let elem = map_ty
            .and_then(|t| self.types.elem(t))
            .ok_or_else(|| RuntimeError::internal("map without element type"))?;
        Ok(zero_value(self.types, elem))
    }

    pub(super) fn op_selector(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let xv = self.pop_value()?;
        let NodeKind::Selector { path: Some(path), .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("unresolved selector"));
        };
        let v = self.select(&xv, path, self.ast.type_of(x))?;
        self.values.push(v);
        Ok(())
    }

    /// Applies one selector step to `xv`.
    pub(super) fn select(&mut self, xv: &TypedValue, path: &ValuePath, ty: Option<TypeRef>) -> InterpResult<TypedValue> {
        let i = path.index as usize;
        match path.kind {
            PathKind::Field => match &xv.v {
                Value::Struct(sv) => Ok(sv
                    .fields
                    .get(i)
                    .map(|s| s.borrow().clone())
                    .ok_or_else(|| RuntimeError::internal("field index out of range"))?),
                Value::Package(pv) => {
                    let block = pv.block.borrow().clone().ok_or_else(|| {
                        RuntimeError::internal(format!("package {} not initialized", pv.path))
                    })?;
                    let slot = block
                        .slot(i)
                        .ok_or_else(|| RuntimeError::internal("package slot out of range"))?;
                    let v = slot.borrow().clone();
                    Ok(v)
                }
                Value::Pointer(Pointer::Slot(s)) => {
                    let inner = s.borrow().clone();
                    self.select(&inner, path, ty)
                }
                Value::None => Err(RuntimeError::nil_dereference()),
                _ => Err(RuntimeError::internal("field of non-struct value")),
            },
            PathKind::DerefField => match &xv.v {
                Value::Pointer(Pointer::Slot(s)) => {
                    let inner = s.borrow().clone();
                    let step = ValuePath::selector(PathKind::Field, path.index, path.name.clone());
                    self.select(&inner, &step, ty)
                }
                Value::None => Err(RuntimeError::nil_dereference()),
                _ => Err(RuntimeError::internal("deref field of non-pointer value")),
            },
            PathKind::ValueMethod | PathKind::DerefValueMethod | PathKind::PtrMethod => {
                let t = xv.ty.ok_or_else(RuntimeError::nil_dereference)?;
                let func = self.method_func(t, &path.name)?;
                let receiver = match path.kind {
                    PathKind::ValueMethod => xv.copy(),
                    PathKind::DerefValueMethod => match &xv.v {
                        Value::Pointer(Pointer::Slot(s)) => s.borrow().copy(),
                        _ => return Err(RuntimeError::nil_dereference()),
                    },
                    _ => match &xv.v {
                        Value::Pointer(_) | Value::None => xv.clone(),
                        _ => self.address_of_copy(xv),
                    },
                };
                let ty = ty.unwrap_or(func.ty);
                Ok(TypedValue::new(
                    ty,
                    Value::BoundMethod(Rc::new(BoundMethod { func, receiver })),
                ))
            }
            PathKind::InterfaceMethod => {
                if xv.is_undefined() {
                    return Err(RuntimeError::nil_dereference());
                }
                self.bind_method(xv, &path.name)
            }
            _ => Err(RuntimeError::internal(format!(
                "unexpected selector path {path}"
            ))),
        }
    }

    fn address_of_copy(&self, xv: &TypedValue) -> TypedValue {
        let ty = xv
            .ty
            .and_then(|t| self.types.lookup(&format!("*{}", self.types.type_id(t))));
        TypedValue {
            ty,
            v: Value::Pointer(Pointer::Slot(new_slot(xv.copy()))),
        }
    }

    fn method_func(&self, t: TypeRef, name: &str) -> InterpResult<Rc<FuncValue>> {
        let owner = self
            .types
            .method_owner(t)
            .ok_or_else(|| RuntimeError::internal(format!("{} has no methods", self.types.type_string(t))))?;
        let (_, m) = owner.find_method(name).ok_or_else(|| {
            RuntimeError::missing_method(&self.types.type_string(t), "method", name)
        })?;
        m.func
            .clone()
            .ok_or_else(|| RuntimeError::internal(format!("method {name} has no body")))
    }

    /// Binds method `name` of the dynamic value `v`.
    pub(super) fn bind_method(&mut self, v: &TypedValue, name: &str) -> InterpResult<TypedValue> {
        let t = v.ty.ok_or_else(RuntimeError::nil_dereference)?;
        let sel = find_selector(self.types, t, name)
            .map_err(RuntimeError::internal)?
            .filter(|s| s.is_method())
            .ok_or_else(|| RuntimeError::missing_method(&self.types.type_string(t), "interface", name))?;
        let Some((last, steps)) = sel.path.split_last() else {
            return Err(RuntimeError::internal("empty selector path"));
        };
        let mut cur = v.clone();
        for step in steps {
            cur = self.select(&cur, step, None)?;
        }
        self.select(&cur, last, Some(sel.ty))
    }

    pub(super) fn op_slice(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let NodeKind::Slice { low, high, max, .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("Slice op without slice expression"));
        };
        let (has_low, has_high, has_max) = (low.is_some(), high.is_some(), max.is_some());
        let maxv = if has_max { Some(self.pop_value()?) } else { None };
        let highv = if has_high { Some(self.pop_value()?) } else { None };
        let lowv = if has_low { Some(self.pop_value()?) } else { None };
        let xv = self.pop_value()?;
        let ty = self.ast.type_of(x).or(xv.ty);
        let v = self.slice_value(xv, lowv, highv, maxv, ty)?;
        self.values.push(v);
        Ok(())
    }

    fn slice_value(
        &self,
        xv: TypedValue,
        lowv: Option<TypedValue>,
        highv: Option<TypedValue>,
        maxv: Option<TypedValue>,
        ty: Option<TypeRef>,
    ) -> InterpResult<TypedValue> {
        let (base, offset, len, cap) = match &xv.v {
            Value::String(s) => {
                let low = slice_bound(lowv, 0)?;
                let high = slice_bound(highv, s.len())?;
                if low > high || high > s.len() {
                    return Err(RuntimeError::slice_bounds(low, high, s.len()));
                }
                let text = match s.get(low..high) {
                    Some(t) => t.to_string(),
                    None => String::from_utf8_lossy(&s.as_bytes()[low..high]).into_owned(),
                };
                return Ok(TypedValue { ty: xv.ty, v: Value::string(&text) });
            }
            Value::Array(av) => (av.clone(), 0, av.elems.len(), av.elems.len()),
            Value::Slice(sv) => (sv.base.clone(), sv.offset, sv.len, sv.cap),
            Value::Pointer(Pointer::Slot(s)) => {
                let inner = s.borrow().clone();
                return self.slice_value(inner, lowv, highv, maxv, ty);
            }
            Value::None => {
                let low = slice_bound(lowv, 0)?;
                let high = slice_bound(highv, 0)?;
                if low != 0 || high != 0 {
                    return Err(RuntimeError::slice_bounds(low, high, 0));
                }
                return Ok(TypedValue { ty, v: Value::None });
            }
            _ => return Err(RuntimeError::internal("cannot slice value")),
        };
        let low = slice_bound(lowv, 0)?;
        let high = slice_bound(highv, len)?;
        let max = slice_bound(maxv, cap)?;
        if high > max || max > cap {
            return Err(RuntimeError::slice_bounds(low, high.max(max), cap));
        }
        if low > high {
            return Err(RuntimeError::slice_bounds(low, high, cap));
        }
        Ok(TypedValue {
            ty,
            v: Value::Slice(SliceValue {
                base,
                offset: offset + low,
                len: high - low,
                cap: max - low,
            }),
        })
    }

    pub(super) fn op_star(&mut self) -> InterpResult<()> {
        self.pop_expr()?;
        let xv = self.pop_value()?;
        match &xv.v {
            Value::Pointer(Pointer::Slot(s)) => {
                let v = s.borrow().clone();
                self.values.push(v);
                Ok(())
            }
            Value::None => Err(RuntimeError::nil_dereference()),
            _ => Err(RuntimeError::internal("dereference of non-pointer value")),
        }
    }

    pub(super) fn op_ref(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let p = self.pop_value()?;
        self.values.push(TypedValue {
            ty: self.ast.type_of(x),
            v: p.v,
        });
        Ok(())
    }

    pub(super) fn op_type_assert(&mut self) -> InterpResult<()> {
        let ast = self.ast;
        let types = self.types;
        let x = self.pop_expr()?;
        let v = self.pop_value()?;
        let NodeKind::TypeAssert { x: inner, ty: Some(tn), has_ok } = ast.kind(x) else {
            return Err(RuntimeError::internal("type assertion without type"));
        };
        let NodeKind::ConstType { ty: target, .. } = ast.kind(*tn) else {
            return Err(RuntimeError::internal("unresolved asserted type"));
        };
        let target = *target;
        let ok = match v.ty {
            None => false,
            Some(t) if types.is_interface(target) => implements(types, t, target).is_ok(),
            Some(t) => types.same(t, target),
        };
        if *has_ok {
            let res = if ok { v } else { zero_value(types, target) };
            self.values.push(res);
            self.values.push(TypedValue::bool(types, ok));
            return Ok(());
        }
        if ok {
            self.values.push(v);
            return Ok(());
        }
        let iface = ast
            .type_of(*inner)
            .map(|t| types.type_string(t))
            .unwrap_or_else(|| "interface".to_string());
        let wanted = types.type_string(target);
        let Some(actual) = v.ty else {
            return Err(RuntimeError::type_assertion(&iface, "nil", &wanted));
        };
        let actual_str = types.type_string(actual);
        if let Some(methods) = types.interface_methods(target) {
            let missing = methods.iter().find(|m| {
                !matches!(find_selector(types, actual, &m.name), Ok(Some(sel)) if sel.is_method())
            });
            if let Some(m) = missing {
                return Err(RuntimeError::missing_method(&actual_str, &wanted, &m.name));
            }
        }
        Err(RuntimeError::type_assertion(&iface, &actual_str, &wanted))
    }

    pub(super) fn op_composite_lit(&mut self) -> InterpResult<()> {
        let ast = self.ast;
        let types = self.types;
        let x = self.pop_expr()?;
        let NodeKind::CompositeLit { elts, .. } = ast.kind(x) else {
            return Err(RuntimeError::internal("CompositeLit op without literal"));
        };
        let t = ast
            .type_of(x)
            .ok_or_else(|| RuntimeError::internal("composite literal without type"))?;
        let keys: Vec<Option<usize>> = elts
            .iter()
            .map(|&e| match ast.kind(e) {
                NodeKind::KeyValue { key: Some(k), .. } => match ast.kind(*k) {
                    NodeKind::Const { tv, .. } => tv.as_index(),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        let v = match types.base(t) {
            Type::Array { len, elt } => {
                let (len, elt) = (*len, *elt);
                let vals = self.pop_values(elts.len())?;
                let mut elems: Vec<TypedValue> = (0..len).map(|_| zero_value(types, elt)).collect();
                let mut i = 0;
                for (key, v) in keys.into_iter().zip(vals) {
                    i = key.unwrap_or(i);
                    let slot = elems
                        .get_mut(i)
                        .ok_or_else(|| RuntimeError::index_out_of_bounds(i as i64, len))?;
                    *slot = v.copy();
                    i += 1;
                }
                Value::Array(Rc::new(ArrayValue::new(elems)))
            }
            Type::Slice(elt) => {
                let elt = *elt;
                let vals = self.pop_values(elts.len())?;
                let mut elems: Vec<TypedValue> = Vec::with_capacity(vals.len());
                let mut i = 0;
                for (key, v) in keys.into_iter().zip(vals) {
                    i = key.unwrap_or(i);
                    if i >= elems.len() {
                        elems.resize_with(i + 1, || zero_value(types, elt));
                    }
                    elems[i] = v.copy();
                    i += 1;
                }
                Value::Slice(SliceValue::from_values(elems))
            }
            Type::Map { .. } => {
                let vals = self.pop_values(elts.len() * 2)?;
                let mv = MapValue::new();
                for pair in vals.chunks(2) {
                    let hash = hash_key(self, &pair[0])?;
                    mv.set(hash, pair[0].clone(), pair[1].copy());
                }
                Value::Map(Rc::new(mv))
            }
            Type::Struct { fields, .. } => {
                let mut values: Vec<TypedValue> = fields.iter().map(|f| zero_value(types, f.ty)).collect();
                let vals = self.pop_values(elts.len())?;
                for (i, (key, v)) in keys.into_iter().zip(vals).enumerate() {
                    let at = key.unwrap_or(i);
                    let slot = values
                        .get_mut(at)
                        .ok_or_else(|| RuntimeError::internal("too many values in struct literal"))?;
                    *slot = v.copy();
                }
                Value::Struct(Rc::new(StructValue::new(values)))
            }
            _ => {
                return Err(RuntimeError::internal(format!(
                    "invalid composite literal type {}",
                    types.type_string(t)
                )));
            }
        };
        self.values.push(TypedValue::new(t, v));
        Ok(())
    }

    pub(super) fn op_index_ptr(&mut self) -> InterpResult<()> {
        self.pop_expr()?;
        let idx = self.pop_value()?;
        let xv = self.pop_value()?;
        let p = self.index_pointer(&xv, idx)?;
        self.values.push(ptr_value(p));
        Ok(())
    }

    fn index_pointer(&self, xv: &TypedValue, idx: TypedValue) -> InterpResult<Pointer> {
        Ok(match &xv.v {
            Value::Array(av) => {
                let i = checked_index(&idx, av.elems.len())?;
                Pointer::Slot(av.elems[i].clone())
            }
            Value::Slice(sv) => {
                let i = checked_index(&idx, sv.len)?;
                let slot = sv
                    .slot(i)
                    .ok_or_else(|| RuntimeError::index_out_of_bounds(i as i64, sv.len))?;
                Pointer::Slot(slot.clone())
            }
            Value::Map(mv) => {
                let hash = hash_key(self, &idx)?;
                Pointer::MapEntry {
                    map: mv.clone(),
                    key: Box::new(idx),
                    hash,
                }
            }
            Value::Pointer(Pointer::Slot(s)) => {
                let inner = s.borrow().clone();
                return self.index_pointer(&inner, idx);
            }
            Value::None => {
                let is_map = xv.ty.is_some_and(|t| self.types.map_key(t).is_some());
                return Err(if is_map {
                    RuntimeError::nil_map_write()
                } else {
                    RuntimeError::index_out_of_bounds(idx.as_i64().unwrap_or(0), 0)
                });
            }
            Value::String(_) => return Err(RuntimeError::internal("cannot assign to string index")),
            _ => return Err(RuntimeError::internal("cannot index value")),
        })
    }

    pub(super) fn op_selector_ptr(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let xv = self.pop_value()?;
        let NodeKind::Selector { path: Some(path), .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("unresolved selector"));
        };
        let slot = self.field_slot(&xv, path)?;
        self.values.push(ptr_value(Pointer::Slot(slot)));
        Ok(())
    }

    fn field_slot(&self, xv: &TypedValue, path: &ValuePath) -> InterpResult<crate::values::Slot> {
        let i = path.index as usize;
        match (&xv.v, path.kind) {
            (Value::Struct(sv), PathKind::Field) => sv
                .fields
                .get(i)
                .cloned()
                .ok_or_else(|| RuntimeError::internal("field index out of range")),
            (Value::Package(pv), PathKind::Field) => {
                let block = pv
                    .block
                    .borrow()
                    .clone()
                    .ok_or_else(|| RuntimeError::internal(format!("package {} not initialized", pv.path)))?;
                block
                    .slot(i)
                    .ok_or_else(|| RuntimeError::internal("package slot out of range"))
            }
            (Value::Pointer(Pointer::Slot(s)), _) => {
                let inner = s.borrow().clone();
                let step = ValuePath::selector(PathKind::Field, path.index, path.name.clone());
                self.field_slot(&inner, &step)
            }
            (Value::None, _) => Err(RuntimeError::nil_dereference()),
            _ => Err(RuntimeError::internal(format!(
                "cannot assign to selector {}",
                path.name
            ))),
        }
    }

    pub(super) fn op_star_ptr(&mut self) -> InterpResult<()> {
        self.pop_expr()?;
        let xv = self.pop_value()?;
        match xv.v {
            Value::Pointer(p) => {
                self.values.push(ptr_value(p));
                Ok(())
            }
            Value::None => Err(RuntimeError::nil_dereference()),
            _ => Err(RuntimeError::internal("dereference of non-pointer value")),
        }
    }

    pub(super) fn op_addr_of(&mut self) -> InterpResult<()> {
        self.pop_expr()?;
        let v = self.pop_value()?;
        self.values
            .push(ptr_value(Pointer::Slot(new_slot(v.copy()))));
        Ok(())
    }
}
