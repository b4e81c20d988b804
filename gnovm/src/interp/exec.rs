//! Statement ops and control flow

use super::eval::hash_key;
use super::{Block, Frame, FrameKind, InterpResult, Machine, Op, RangeState, RuntimeError, SwitchState};
use crate::ast::{AssignOp, AttrKey, BinaryOp, BranchOp, IncDecOp, NodeId, NodeKind};
use crate::types::implements;
use crate::values::{Pointer, TypedValue, Value, binary_op, values_equal, zero_value};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::rc::Rc;

fn one_like(v: &TypedValue) -> InterpResult<TypedValue> {
    let one = match &v.v {
        Value::Int(_) => Value::Int(1),
        Value::Uint(_) => Value::Uint(1),
        Value::Float32(_) => Value::Float32(1.0),
        Value::Float64(_) => Value::Float64(1.0),
        Value::BigInt(_) => Value::bigint(BigInt::from(1)),
        Value::BigDec(_) => Value::bigdec(BigDecimal::from(1)),
        _ => return Err(RuntimeError::internal("increment of non-numeric value")),
    };
    Ok(TypedValue { ty: v.ty, v: one })
}

impl Machine<'_> {
    /// Pushes a new runtime block for block node `n`.
    fn push_block(&mut self, n: NodeId) -> InterpResult<Rc<Block>> {
        let sid = self
            .ast
            .scope(n)
            .ok_or_else(|| RuntimeError::internal(format!("{} was not preprocessed", self.ast.kind(n).name())))?;
        let parent = self.top_block()?;
        let block = Block::new(Some(n), sid, Some(parent), self.scopes.get(sid).num_names());
        self.blocks.push(block.clone());
        self.ops.push(Op::PopBlock);
        Ok(block)
    }

    /// Pushes a loop or switch frame for `n` whose block was just pushed.
    fn push_frame(&mut self, n: NodeId, kind: FrameKind) {
        let heights = self.heights();
        self.frames.push(Frame {
            node: Some(n),
            heights,
            kind,
        });
        self.ops.push(Op::PopFrame);
    }

    /// Starts executing the statement list of `n` in the current block.
    pub(super) fn start_body(&mut self, n: NodeId) -> InterpResult<()> {
        let b = self.top_block()?;
        b.body_owner.set(Some(n));
        b.cursor.set(0);
        b.heights.set(self.heights());
        self.ops.push(Op::Body);
        Ok(())
    }

    pub(super) fn op_body(&mut self) -> InterpResult<()> {
        let ast = self.ast;
        let b = self.top_block()?;
        let owner = b
            .body_owner
            .get()
            .ok_or_else(|| RuntimeError::internal("block without body"))?;
        let body = ast.kind(owner).body().unwrap_or_default();
        let i = b.cursor.get();
        if let Some(&s) = body.get(i) {
            b.cursor.set(i + 1);
            self.ops.push(Op::Body);
            self.push_exec(s);
        }
        Ok(())
    }

    pub(super) fn op_exec(&mut self) -> InterpResult<()> {
        let ast = self.ast;
        let types = self.types;
        let s = self.pop_stmt()?;
        self.last_stmt = Some(s);
        match ast.kind(s) {
            NodeKind::ExprStmt { x } => {
                self.ops.push(Op::PopValuesTo(self.values.len()));
                self.push_eval(*x);
            }
            NodeKind::Assign { lhs, op, rhs } => match op {
                AssignOp::Define => {
                    self.ops.push(Op::Define(s));
                    for r in rhs.iter().rev() {
                        self.push_eval(*r);
                    }
                }
                AssignOp::Assign => {
                    self.ops.push(Op::Assign(lhs.len()));
                    for r in rhs.iter().rev() {
                        self.push_eval(*r);
                    }
                    for l in lhs.iter().rev() {
                        self.push_eval_ptr(*l);
                    }
                }
                AssignOp::Op(_) => {
                    let (Some(&l), Some(&r)) = (lhs.first(), rhs.first()) else {
                        return Err(RuntimeError::internal("malformed assignment"));
                    };
                    self.ops.push(Op::AssignOp(s));
                    self.push_eval(r);
                    self.push_eval_ptr(l);
                }
            },
            NodeKind::IncDec { x, .. } => {
                self.ops.push(Op::IncDec(s));
                self.push_eval_ptr(*x);
            }
            NodeKind::Block { .. } => {
                self.push_block(s)?;
                self.start_body(s)?;
            }
            NodeKind::DeclStmt { body } => {
                for d in body.iter().rev() {
                    self.push_exec(*d);
                }
            }
            NodeKind::ValueDecl { values, is_const, .. } => {
                if !*is_const {
                    self.ops.push(Op::ValueDecl(s));
                    for v in values.iter().rev() {
                        self.push_eval(*v);
                    }
                }
            }
            NodeKind::TypeDecl { .. } => self.ops.push(Op::TypeDecl(s)),
            NodeKind::If { init, cond, .. } => {
                self.push_block(s)?;
                self.ops.push(Op::IfCond(s));
                self.push_eval(*cond);
                if let Some(init) = init {
                    self.push_exec(*init);
                }
            }
            NodeKind::For { init, .. } => {
                self.push_block(s)?;
                self.push_frame(s, FrameKind::Loop(None));
                self.ops.push(Op::ForCond(s));
                if let Some(init) = init {
                    self.push_exec(*init);
                }
            }
            NodeKind::Range { x, .. } => {
                self.push_block(s)?;
                self.push_frame(s, FrameKind::Loop(None));
                self.ops.push(Op::RangeInit(s));
                self.push_eval(*x);
            }
            NodeKind::Switch {
                init,
                x,
                is_type_switch,
                ..
            } => {
                self.push_block(s)?;
                self.push_frame(s, FrameKind::Switch(SwitchState::default()));
                self.ops.push(Op::SwitchClause(s));
                match x {
                    Some(x) => {
                        let tag = match ast.kind(*x) {
                            NodeKind::TypeAssert { x: inner, ty: None, .. } if *is_type_switch => *inner,
                            _ => *x,
                        };
                        self.push_eval(tag);
                    }
                    None => self.values.push(TypedValue::bool(types, true)),
                }
                if let Some(init) = init {
                    self.push_exec(*init);
                }
            }
            NodeKind::Branch { op, target, body_index, .. } => {
                self.exec_branch(*op, *target, *body_index)?;
            }
            NodeKind::Return { results } => {
                let n = match results.as_slice() {
                    [one] => ast
                        .type_of(*one)
                        .and_then(|t| types.tuple_elts(t))
                        .map_or(1, <[_]>::len),
                    rs => rs.len(),
                };
                self.ops.push(Op::Return(n));
                for r in results.iter().rev() {
                    self.push_eval(*r);
                }
            }
            NodeKind::Defer { call } => {
                let NodeKind::Call { func, args, .. } = ast.kind(*call) else {
                    return Err(RuntimeError::internal("defer of non-call expression"));
                };
                self.ops.push(Op::Defer(s));
                for a in args.iter().rev() {
                    self.push_eval(*a);
                }
                self.push_eval(*func);
            }
            NodeKind::Go { .. } => return Err(RuntimeError::unsupported("go statement")),
            NodeKind::Select { .. } => return Err(RuntimeError::unsupported("select statement")),
            NodeKind::Send { .. } => return Err(RuntimeError::unsupported("channel send")),
            NodeKind::Empty => {}
            other => {
                return Err(RuntimeError::internal(format!(
                    "cannot execute {}",
                    other.name()
                )));
            }
        }
        Ok(())
    }

    // ---- assignment ----

    fn store(&self, p: &Pointer, v: TypedValue) {
        match p {
            Pointer::Slot(s) => *s.borrow_mut() = v,
            Pointer::MapEntry { map, key, hash } => map.set(hash.clone(), (**key).clone(), v),
            Pointer::Discard => {}
        }
    }

    fn load(&self, p: &Pointer, ty: Option<crate::types::TypeRef>) -> InterpResult<TypedValue> {
        match p {
            Pointer::Slot(s) => Ok(s.borrow().clone()),
            Pointer::MapEntry { map, hash, .. } => match map.get(hash) {
                Some(v) => Ok(v),
                None => ty
                    .map(|t| zero_value(self.types, t))
                    .ok_or_else(|| RuntimeError::internal("map element without type")),
            },
            Pointer::Discard => Err(RuntimeError::internal("cannot use _ as value")),
        }
    }

    fn pop_pointer(&mut self) -> InterpResult<Pointer> {
        match self.pop_value()?.v {
            Value::Pointer(p) => Ok(p),
            _ => Err(RuntimeError::internal("expected assignment target")),
        }
    }

    pub(super) fn op_assign(&mut self, n: usize) -> InterpResult<()> {
        let values = self.pop_values(n)?;
        let mut ptrs = Vec::with_capacity(n);
        for _ in 0..n {
            ptrs.push(self.pop_pointer()?);
        }
        ptrs.reverse();
        for (p, v) in ptrs.iter().zip(values) {
            self.store(p, v.copy());
        }
        Ok(())
    }

    pub(super) fn op_assign_op(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::Assign { lhs, op: AssignOp::Op(op), .. } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("AssignOp without assignment"));
        };
        let ty = lhs.first().and_then(|l| self.ast.type_of(*l));
        let r = self.pop_value()?;
        let p = self.pop_pointer()?;
        let cur = self.load(&p, ty)?;
        let res = binary_op(self.types, *op, &cur, &r)?;
        self.store(&p, res);
        Ok(())
    }

    pub(super) fn op_inc_dec(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::IncDec { x, op } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("IncDec op without statement"));
        };
        let ty = self.ast.type_of(*x);
        let p = self.pop_pointer()?;
        let cur = self.load(&p, ty)?;
        let bop = match op {
            IncDecOp::Inc => BinaryOp::Add,
            IncDecOp::Dec => BinaryOp::Sub,
        };
        let res = binary_op(self.types, bop, &cur, &one_like(&cur)?)?;
        self.store(&p, res);
        Ok(())
    }

    pub(super) fn op_define(&mut self, n: NodeId) -> InterpResult<()> {
        let ast = self.ast;
        let NodeKind::Assign { lhs, .. } = ast.kind(n) else {
            return Err(RuntimeError::internal("Define op without assignment"));
        };
        let values = self.pop_values(lhs.len())?;
        let block = self.top_block()?;
        for (&l, v) in lhs.iter().zip(values) {
            let NodeKind::Name { path: Some(path), .. } = ast.kind(l) else {
                return Err(RuntimeError::internal("unresolved name on left side of :="));
            };
            if path.depth == 0 {
                continue;
            }
            if ast.has_attr(l, AttrKey::Predefined) {
                let slot = self.path_slot(path)?;
                *slot.borrow_mut() = v.copy();
            } else {
                block.define(path.index as usize, v.copy());
            }
        }
        Ok(())
    }

    pub(super) fn op_value_decl(&mut self, n: NodeId) -> InterpResult<()> {
        let ast = self.ast;
        let NodeKind::ValueDecl { names, ty, values, .. } = ast.kind(n) else {
            return Err(RuntimeError::internal("ValueDecl op without declaration"));
        };
        let vals = if values.is_empty() {
            let t = ty
                .and_then(|t| match ast.kind(t) {
                    NodeKind::ConstType { ty, .. } => Some(*ty),
                    _ => None,
                })
                .ok_or_else(|| RuntimeError::internal("variable declaration without type"))?;
            names.iter().map(|_| zero_value(self.types, t)).collect()
        } else {
            self.pop_values(names.len())?
        };
        let block = self.top_block()?;
        for (ident, v) in names.iter().zip(vals) {
            let Some(path) = &ident.path else {
                return Err(RuntimeError::internal(format!("unresolved variable {}", ident.name)));
            };
            match path.depth {
                0 => {}
                1 => block.define(path.index as usize, v.copy()),
                _ => {
                    let slot = self.path_slot(path)?;
                    *slot.borrow_mut() = v.copy();
                }
            }
        }
        Ok(())
    }

    pub(super) fn op_type_decl(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::TypeDecl { name, ty, .. } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("TypeDecl op without declaration"));
        };
        if let (Some(path), NodeKind::ConstType { ty, .. }) = (&name.path, self.ast.kind(*ty))
            && path.depth == 1
        {
            let block = self.top_block()?;
            block.define(
                path.index as usize,
                TypedValue::new(self.types.type_type(), Value::Type(*ty)),
            );
        }
        Ok(())
    }

    // ---- if ----

    pub(super) fn op_if_cond(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::If { then, els, .. } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("IfCond op without if statement"));
        };
        let cond = self
            .pop_value()?
            .as_bool()
            .ok_or_else(|| RuntimeError::internal("non-bool condition"))?;
        let clause = if cond { *then } else { *els };
        self.enter_clause(clause)?;
        self.start_body(clause)
    }

    /// Grows the shared block of an If or Switch to hold the names of
    /// `clause`.
    fn enter_clause(&mut self, clause: NodeId) -> InterpResult<()> {
        let sid = self
            .ast
            .scope(clause)
            .ok_or_else(|| RuntimeError::internal("clause was not preprocessed"))?;
        self.top_block()?.grow(self.scopes.get(sid).num_names());
        Ok(())
    }

    // ---- for ----

    pub(super) fn op_for_cond(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::For { cond, .. } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("ForCond op without for statement"));
        };
        match cond {
            Some(c) => {
                self.ops.push(Op::ForCheck(n));
                self.push_eval(*c);
                Ok(())
            }
            None => {
                self.ops.push(Op::ForPost(n));
                self.start_body(n)
            }
        }
    }

    pub(super) fn op_for_check(&mut self, n: NodeId) -> InterpResult<()> {
        let ok = self
            .pop_value()?
            .as_bool()
            .ok_or_else(|| RuntimeError::internal("non-bool loop condition"))?;
        if ok {
            self.ops.push(Op::ForPost(n));
            self.start_body(n)?;
        }
        Ok(())
    }

    /// Gives every captured loop variable a fresh slot, then runs the post
    /// statement.
    pub(super) fn op_for_post(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::For { post, .. } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("ForPost op without for statement"));
        };
        let block = self.top_block()?;
        let sb = self.scopes.get(block.scope);
        for (i, heap) in sb.heap_items.iter().enumerate() {
            if *heap && let Some(slot) = block.slot(i) {
                let v = slot.borrow().copy();
                block.define(i, v);
            }
        }
        self.ops.push(Op::ForCond(n));
        if let Some(p) = post {
            self.push_exec(*p);
        }
        Ok(())
    }

    // ---- range ----

    fn frame_for(&mut self, n: NodeId) -> InterpResult<&mut Frame> {
        self.frames
            .iter_mut()
            .rev()
            .find(|f| f.node == Some(n))
            .ok_or_else(|| RuntimeError::internal("missing frame"))
    }

    pub(super) fn op_range_init(&mut self, n: NodeId) -> InterpResult<()> {
        let types = self.types;
        let x = self.pop_value()?;
        let int = types.int();
        let x = match &x.v {
            Value::Pointer(Pointer::Slot(s)) => s.borrow().clone(),
            _ => x,
        };
        let state = match &x.v {
            Value::Array(av) => RangeState::Values {
                items: av
                    .elems
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (TypedValue::int(types, i as i64), s.borrow().copy()))
                    .collect(),
                next: 0,
            },
            Value::String(s) => RangeState::Values {
                items: s
                    .char_indices()
                    .map(|(i, c)| {
                        (
                            TypedValue::int(types, i as i64),
                            TypedValue::new(types.int32(), Value::Int(c as i64)),
                        )
                    })
                    .collect(),
                next: 0,
            },
            Value::Slice(sv) => RangeState::Slice {
                slice: sv.clone(),
                int,
                next: 0,
            },
            Value::Map(mv) => {
                let keys = mv
                    .entries()
                    .into_iter()
                    .map(|(k, _)| hash_key(self, &k).map(|h| (k, h)))
                    .collect::<InterpResult<Vec<_>>>()?;
                RangeState::Map {
                    map: mv.clone(),
                    keys,
                    next: 0,
                }
            }
            Value::Int(count) => RangeState::Values {
                items: (0..*count)
                    .map(|i| {
                        let k = TypedValue { ty: x.ty, v: Value::Int(i) };
                        (k, TypedValue::undefined())
                    })
                    .collect(),
                next: 0,
            },
            Value::None => RangeState::Values {
                items: vec![],
                next: 0,
            },
            _ => return Err(RuntimeError::internal("cannot range over value")),
        };
        self.frame_for(n)?.kind = FrameKind::Loop(Some(state));
        self.ops.push(Op::RangeIter(n));
        Ok(())
    }

    fn next_range_item(&mut self, n: NodeId) -> InterpResult<Option<(TypedValue, TypedValue)>> {
        let frame = self.frame_for(n)?;
        let FrameKind::Loop(Some(state)) = &mut frame.kind else {
            return Err(RuntimeError::internal("range frame without state"));
        };
        Ok(match state {
            RangeState::Values { items, next } => {
                let item = items.get(*next).cloned();
                *next += 1;
                item
            }
            RangeState::Slice { slice, int, next } => {
                let i = *next;
                *next += 1;
                slice
                    .get(i)
                    .map(|v| (TypedValue::new(*int, Value::Int(i as i64)), v))
            }
            RangeState::Map { map, keys, next } => {
                let mut found = None;
                while let Some((k, hash)) = keys.get(*next) {
                    *next += 1;
                    if let Some(v) = map.get(hash) {
                        found = Some((k.clone(), v));
                        break;
                    }
                }
                found
            }
        })
    }

    pub(super) fn op_range_iter(&mut self, n: NodeId) -> InterpResult<()> {
        let ast = self.ast;
        let NodeKind::Range { key, value, define, .. } = ast.kind(n) else {
            return Err(RuntimeError::internal("RangeIter op without range statement"));
        };
        let Some((k, v)) = self.next_range_item(n)? else {
            return Ok(());
        };
        if *define {
            let block = self.top_block()?;
            for (node, tv) in [(key, k), (value, v)] {
                if let Some(node) = node
                    && let NodeKind::Name { path: Some(path), .. } = ast.kind(*node)
                    && path.depth > 0
                {
                    block.define(path.index as usize, tv.copy());
                }
            }
            self.ops.push(Op::RangeIter(n));
            return self.start_body(n);
        }
        self.ops.push(Op::RangeIter(n));
        self.ops.push(Op::RangeBody(n));
        self.ops.push(Op::RangeAssign(n));
        if key.is_some() {
            self.values.push(k);
        }
        if value.is_some() {
            self.values.push(v);
        }
        if let Some(value) = value {
            self.push_eval_ptr(*value);
        }
        if let Some(key) = key {
            self.push_eval_ptr(*key);
        }
        Ok(())
    }

    pub(super) fn op_range_assign(&mut self, n: NodeId) -> InterpResult<()> {
        let NodeKind::Range { key, value, .. } = self.ast.kind(n) else {
            return Err(RuntimeError::internal("RangeAssign op without range statement"));
        };
        let count = key.iter().count() + value.iter().count();
        let mut ptrs = Vec::with_capacity(count);
        for _ in 0..count {
            ptrs.push(self.pop_pointer()?);
        }
        ptrs.reverse();
        let values = self.pop_values(count)?;
        for (p, v) in ptrs.iter().zip(values) {
            self.store(p, v.copy());
        }
        Ok(())
    }

    // ---- switch ----

    fn switch_state(&mut self, n: NodeId) -> InterpResult<&mut SwitchState> {
        match &mut self.frame_for(n)?.kind {
            FrameKind::Switch(state) => Ok(state),
            _ => Err(RuntimeError::internal("switch frame expected")),
        }
    }

    pub(super) fn op_switch_clause(&mut self, n: NodeId) -> InterpResult<()> {
        let ast = self.ast;
        let NodeKind::Switch { clauses, .. } = ast.kind(n) else {
            return Err(RuntimeError::internal("SwitchClause op without switch"));
        };
        let state = self.switch_state(n)?;
        let c = state.clause;
        let Some(&clause) = clauses.get(c) else {
            let default = state.default;
            return match default {
                Some(d) => self.start_clause(n, d),
                None => {
                    self.pop_value()?;
                    Ok(())
                }
            };
        };
        let NodeKind::SwitchClause { cases, .. } = ast.kind(clause) else {
            return Err(RuntimeError::internal("switch clause expected"));
        };
        match cases.first() {
            None => {
                state.default = Some(c);
                state.clause += 1;
                self.ops.push(Op::SwitchClause(n));
            }
            Some(&first) => {
                state.case = 0;
                self.ops.push(Op::SwitchCase(n));
                self.push_eval(first);
            }
        }
        Ok(())
    }

    pub(super) fn op_switch_case(&mut self, n: NodeId) -> InterpResult<()> {
        let ast = self.ast;
        let types = self.types;
        let NodeKind::Switch {
            clauses,
            is_type_switch,
            ..
        } = ast.kind(n)
        else {
            return Err(RuntimeError::internal("SwitchCase op without switch"));
        };
        let cv = self.pop_value()?;
        let tag = self
            .values
            .last()
            .ok_or_else(|| RuntimeError::internal("switch without tag"))?;
        let matched = if *is_type_switch {
            match (&cv.v, tag.ty) {
                (Value::Type(t), Some(actual)) => {
                    if types.is_interface(*t) {
                        implements(types, actual, *t).is_ok()
                    } else {
                        types.same(actual, *t)
                    }
                }
                (Value::Type(_), None) => false,
                (_, actual) => actual.is_none(),
            }
        } else {
            values_equal(types, tag, &cv)?
        };
        let state = self.switch_state(n)?;
        let c = state.clause;
        if matched {
            return self.start_clause(n, c);
        }
        let Some(NodeKind::SwitchClause { cases, .. }) = clauses.get(c).map(|&cl| ast.kind(cl)) else {
            return Err(RuntimeError::internal("switch clause expected"));
        };
        state.case += 1;
        match cases.get(state.case) {
            Some(&next) => {
                self.ops.push(Op::SwitchCase(n));
                self.push_eval(next);
            }
            None => {
                state.clause += 1;
                state.case = 0;
                self.ops.push(Op::SwitchClause(n));
            }
        }
        Ok(())
    }

    /// Pops the tag and runs clause `c` of switch `n`.
    fn start_clause(&mut self, n: NodeId, c: usize) -> InterpResult<()> {
        let ast = self.ast;
        let NodeKind::Switch { clauses, var_name, .. } = ast.kind(n) else {
            return Err(RuntimeError::internal("switch expected"));
        };
        let tag = self.pop_value()?;
        let clause = *clauses
            .get(c)
            .ok_or_else(|| RuntimeError::internal("switch clause out of range"))?;
        self.switch_state(n)?.clause = c;
        self.enter_clause(clause)?;
        if let Some(name) = var_name {
            let sid = ast
                .scope(clause)
                .ok_or_else(|| RuntimeError::internal("clause was not preprocessed"))?;
            if let Some(idx) = self.scopes.get(sid).local_index(name) {
                self.top_block()?.define(idx as usize, tag.copy());
            }
        }
        self.start_body(clause)
    }

    // ---- branches ----

    fn exec_branch(&mut self, op: BranchOp, target: Option<NodeId>, body_index: i32) -> InterpResult<()> {
        let target = target.ok_or_else(|| RuntimeError::internal("branch without target"))?;
        match op {
            BranchOp::Break => {
                let i = self.frame_index(target)?;
                let heights = self.frames[i].heights;
                self.frames.truncate(i);
                self.truncate_to(heights);
            }
            BranchOp::Continue => {
                let i = self.frame_index(target)?;
                let heights = self.frames[i].heights;
                self.frames.truncate(i + 1);
                self.truncate_to(heights);
                self.ops.push(Op::PopFrame);
                match self.ast.kind(target) {
                    NodeKind::Range { .. } => self.ops.push(Op::RangeIter(target)),
                    _ => self.ops.push(Op::ForPost(target)),
                }
            }
            BranchOp::Goto => {
                loop {
                    let b = self.top_block()?;
                    if b.body_owner.get() == Some(target) {
                        break;
                    }
                    self.blocks.pop();
                }
                let b = self.top_block()?;
                while self
                    .frames
                    .last()
                    .is_some_and(|f| !f.is_call() && f.heights.blocks > self.blocks.len())
                {
                    self.frames.pop();
                }
                self.truncate_to(b.heights.get());
                b.cursor.set(usize::try_from(body_index).unwrap_or(0));
                self.ops.push(Op::Body);
            }
            BranchOp::Fallthrough => {
                let (i, sw) = self
                    .frames
                    .iter()
                    .enumerate()
                    .rev()
                    .find_map(|(i, f)| match (&f.kind, f.node) {
                        (FrameKind::Switch(_), Some(sw)) => Some((i, sw)),
                        _ => None,
                    })
                    .ok_or_else(|| RuntimeError::internal("fallthrough outside switch"))?;
                let NodeKind::Switch { clauses, .. } = self.ast.kind(sw) else {
                    return Err(RuntimeError::internal("switch expected"));
                };
                let c = clauses
                    .iter()
                    .position(|&cl| cl == target)
                    .ok_or_else(|| RuntimeError::internal("fallthrough target not in switch"))?;
                let heights = self.frames[i].heights;
                self.frames.truncate(i + 1);
                self.truncate_to(heights);
                self.ops.push(Op::PopFrame);
                if let FrameKind::Switch(state) = &mut self.frames[i].kind {
                    state.clause = c;
                }
                self.enter_clause(target)?;
                self.start_body(target)?;
            }
        }
        Ok(())
    }

    fn frame_index(&self, target: NodeId) -> InterpResult<usize> {
        let floor = self.top_call_index().map_or(0, |i| i + 1);
        self.frames[floor..]
            .iter()
            .rposition(|f| f.node == Some(target))
            .map(|i| i + floor)
            .ok_or_else(|| RuntimeError::internal("branch target is not an enclosing statement"))
    }
}
