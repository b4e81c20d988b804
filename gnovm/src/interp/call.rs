//! Calls, returns and deferred calls

use super::{CallFrame, Deferred, Frame, FrameKind, InterpResult, Machine, Op, RuntimeError};
use crate::ast::NodeKind;
use crate::values::{Closure, FuncValue, SliceValue, TypedValue, Value, convert_to, zero_value};
use std::rc::Rc;
use tracing::trace;

impl Machine<'_> {
    pub(super) fn op_call(&mut self) -> InterpResult<()> {
        let x = self.pop_expr()?;
        let NodeKind::Call { varg, num_args, .. } = self.ast.kind(x) else {
            return Err(RuntimeError::internal("Call op without call expression"));
        };
        let (varg, num_args) = (*varg, *num_args);
        let args = self.pop_values(num_args)?;
        let f = self.pop_value()?;
        self.call_value(f, args, varg, false)
    }

    /// Calls `f`. Conversions and native functions complete immediately
    /// and push their results; calls of interpreted functions push a call
    /// frame and start the body.
    pub(super) fn call_value(&mut self, f: TypedValue, mut args: Vec<TypedValue>, varg: bool, is_defer: bool) -> InterpResult<()> {
        match f.v {
            Value::Type(t) => {
                let Some(mut v) = args.pop() else {
                    return Err(RuntimeError::internal("conversion without argument"));
                };
                convert_to(self.types, &mut v, t, false)?;
                self.values.push(v);
                Ok(())
            }
            Value::Func(fv) => self.call_func(fv, args, varg, is_defer),
            Value::BoundMethod(bm) => {
                args.insert(0, bm.receiver.clone());
                self.call_func(bm.func.clone(), args, varg, is_defer)
            }
            Value::None => Err(RuntimeError::nil_dereference()),
            _ => Err(RuntimeError::internal("call of non-function value")),
        }
    }

    fn call_func(&mut self, fv: Rc<FuncValue>, mut args: Vec<TypedValue>, varg: bool, is_defer: bool) -> InterpResult<()> {
        let types = self.types;
        if let Some(native) = fv.native {
            if fv.pkg_path.is_empty() {
                if varg {
                    spread_last(types, &mut args);
                }
            } else if !varg {
                self.pack_variadic(&fv, &mut args)?;
            }
            let results = native(self, args)?;
            self.values.extend(results);
            return Ok(());
        }
        let node = fv
            .source
            .ok_or_else(|| RuntimeError::internal(format!("function {} has no body", fv.name)))?;
        if !varg {
            self.pack_variadic(&fv, &mut args)?;
        }
        let sid = self
            .ast
            .scope(node)
            .ok_or_else(|| RuntimeError::internal(format!("function {} was not preprocessed", fv.name)))?;
        let results = types
            .signature(fv.ty)
            .map(|(_, results, _)| results.to_vec())
            .unwrap_or_default();
        let (parent, file) = match &fv.closure {
            Some(Closure::File { pkg_path, file }) => {
                let pv = self
                    .store
                    .get_package(pkg_path)
                    .ok_or_else(|| RuntimeError::internal(format!("package {pkg_path} not loaded")))?;
                let block = pv.file_blocks.borrow().get(*file).cloned().ok_or_else(|| {
                    RuntimeError::internal(format!("package {pkg_path} not initialized"))
                })?;
                let name = file_name(self, block.node);
                (block, name)
            }
            Some(Closure::Block(b)) => (b.clone(), self.enclosing_file(b)),
            None => return Err(RuntimeError::internal("function without closure")),
        };
        trace!(func = %fv.name, args = args.len(), "call");

        let base = self.heights();
        self.ops.push(Op::CallReturn);
        self.ops.push(Op::RunDefers);
        let size = self.scopes.get(sid).num_names();
        let block = super::Block::new(Some(node), sid, Some(parent), size);
        let num_params = args.len();
        for (i, arg) in args.iter().enumerate() {
            block.define(i, arg.copy());
        }
        for (j, t) in results.iter().enumerate() {
            block.define(num_params + j, zero_value(types, *t));
        }
        if let NodeKind::FuncLit { captures, .. } = self.ast.kind(node) {
            for (c, slot) in captures.iter().zip(fv.captures.iter()) {
                block.set_slot(c.index as usize, slot.clone());
            }
        }
        self.blocks.push(block.clone());
        let heights = self.heights();
        self.frames.push(Frame {
            node: Some(node),
            heights,
            kind: FrameKind::Call(Box::new(CallFrame {
                pkg_path: fv.pkg_path.clone(),
                func: fv,
                block,
                num_params,
                num_results: results.len(),
                defers: Vec::new(),
                is_defer,
                panicking: false,
                base,
                file,
            })),
        });
        self.start_body(node)
    }

    /// Collects trailing arguments of a variadic call into a slice.
    fn pack_variadic(&self, fv: &FuncValue, args: &mut Vec<TypedValue>) -> InterpResult<()> {
        let Some((params, _, true)) = self.types.signature(fv.ty) else {
            return Ok(());
        };
        let Some(&last) = params.last() else {
            return Ok(());
        };
        let fixed = params.len() - 1;
        if args.len() < fixed {
            return Err(RuntimeError::internal(format!(
                "not enough arguments in call to {}",
                fv.name
            )));
        }
        let rest: Vec<TypedValue> = args.split_off(fixed).iter().map(TypedValue::copy).collect();
        let v = if rest.is_empty() {
            Value::None
        } else {
            Value::Slice(SliceValue::from_values(rest))
        };
        args.push(TypedValue::new(last, v));
        Ok(())
    }

    fn enclosing_file(&self, b: &Rc<super::Block>) -> String {
        let mut cur = Some(b.clone());
        while let Some(block) = cur {
            if let Some(n) = block.node
                && matches!(self.ast.kind(n), NodeKind::File { .. })
            {
                return file_name(self, Some(n));
            }
            cur = block.parent.clone();
        }
        String::new()
    }

    pub(super) fn op_return(&mut self, n: usize) -> InterpResult<()> {
        let values = self.pop_values(n)?;
        let ci = self
            .top_call_index()
            .ok_or_else(|| RuntimeError::internal("return outside function"))?;
        let frame = &self.frames[ci];
        let cf = frame
            .call()
            .ok_or_else(|| RuntimeError::internal("return outside function"))?;
        if n > 0 {
            for (j, v) in values.into_iter().enumerate() {
                let slot = cf
                    .block
                    .slot(cf.num_params + j)
                    .ok_or_else(|| RuntimeError::internal("missing result slot"))?;
                *slot.borrow_mut() = v.copy();
            }
        }
        let heights = frame.heights;
        self.frames.truncate(ci + 1);
        self.truncate_to(heights);
        Ok(())
    }

    pub(super) fn op_defer(&mut self, n: crate::ast::NodeId) -> InterpResult<()> {
        let ast = self.ast;
        let NodeKind::Defer { call } = ast.kind(n) else {
            return Err(RuntimeError::internal("Defer op without defer statement"));
        };
        let NodeKind::Call { varg, num_args, .. } = ast.kind(*call) else {
            return Err(RuntimeError::internal("defer of non-call expression"));
        };
        let args = self.pop_values(*num_args)?;
        let func = self.pop_value()?;
        let ci = self
            .top_call_index()
            .ok_or_else(|| RuntimeError::internal("defer outside function"))?;
        if let Some(cf) = self.frames[ci].call_mut() {
            cf.defers.push(Deferred {
                func,
                args,
                varg: *varg,
            });
        }
        Ok(())
    }

    /// Runs the deferred calls of the innermost function, last first.
    pub(super) fn op_run_defers(&mut self) -> InterpResult<()> {
        let ci = self
            .top_call_index()
            .ok_or_else(|| RuntimeError::internal("no call frame to run defers"))?;
        let (next, panicking) = match self.frames[ci].call_mut() {
            Some(cf) => (cf.defers.pop(), cf.panicking),
            None => (None, false),
        };
        if let Some(d) = next {
            self.ops.push(Op::RunDefers);
            self.ops.push(Op::PopValuesTo(self.values.len()));
            return self.call_value(d.func, d.args, d.varg, true);
        }
        if panicking {
            self.frames.truncate(ci + 1);
            return self.unwind_panic(ci);
        }
        Ok(())
    }

    pub(super) fn op_call_return(&mut self) -> InterpResult<()> {
        let ci = self
            .top_call_index()
            .ok_or_else(|| RuntimeError::internal("return without call frame"))?;
        self.frames.truncate(ci + 1);
        let Some(Frame {
            kind: FrameKind::Call(cf),
            ..
        }) = self.frames.pop()
        else {
            return Err(RuntimeError::internal("return without call frame"));
        };
        let results: Vec<TypedValue> = (0..cf.num_results)
            .map(|j| {
                cf.block
                    .slot(cf.num_params + j)
                    .map(|s| s.borrow().copy())
                    .unwrap_or_default()
            })
            .collect();
        self.truncate_to(cf.base);
        self.values.extend(results);
        Ok(())
    }
}

/// Expands the spread final argument of a builtin call.
fn spread_last(types: &crate::types::Types, args: &mut Vec<TypedValue>) {
    let Some(last) = args.pop() else {
        return;
    };
    match &last.v {
        Value::Slice(sv) => args.extend(sv.values()),
        Value::String(s) => args.extend(
            s.bytes()
                .map(|b| TypedValue::new(types.uint8(), Value::Uint(b as u64))),
        ),
        Value::None => {}
        _ => args.push(last),
    }
}

fn file_name(m: &Machine<'_>, node: Option<crate::ast::NodeId>) -> String {
    match node.map(|n| m.ast.kind(n)) {
        Some(NodeKind::File { name, .. }) => name.clone(),
        _ => String::new(),
    }
}
