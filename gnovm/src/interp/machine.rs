//! Machine state, the step loop, panics and package initialization

use super::{Block, Frame, GasMeter, Heights, InterpResult, MachineOptions, Op, OutputSink, RuntimeError};
use crate::ast::{Ast, Location, NodeId, NodeKind};
use crate::scope::{NameSource, PathKind, Scopes, ValuePath};
use crate::store::Store;
use crate::types::{Kind, Types, find_selector};
use crate::values::{PackageValue, Slot, TypedValue, Value, sprint, zero_value};
use std::rc::Rc;
use tracing::{debug, trace};

/// Executes preprocessed code.
pub struct Machine<'a> {
    pub ast: &'a Ast,
    pub scopes: &'a Scopes,
    pub types: &'a Types,
    pub store: &'a dyn Store,
    pub(super) ops: Vec<Op>,
    pub(super) values: Vec<TypedValue>,
    pub(super) exprs: Vec<NodeId>,
    pub(super) stmts: Vec<NodeId>,
    pub(super) blocks: Vec<Rc<Block>>,
    pub(super) frames: Vec<Frame>,
    /// Value of the panic being unwound.
    pub(super) exception: Option<TypedValue>,
    /// Frames below this index belong to an outer run and are never
    /// unwound by a panic.
    pub(super) floor: usize,
    pub(super) last_stmt: Option<NodeId>,
    output: OutputSink,
    gas: Option<Box<dyn GasMeter>>,
    debug: bool,
    num_ops: u64,
}

impl<'a> Machine<'a> {
    pub fn new(ast: &'a Ast, scopes: &'a Scopes, types: &'a Types, store: &'a dyn Store, options: MachineOptions) -> Self {
        Self {
            ast,
            scopes,
            types,
            store,
            ops: Vec::new(),
            values: Vec::new(),
            exprs: Vec::new(),
            stmts: Vec::new(),
            blocks: Vec::new(),
            frames: Vec::new(),
            exception: None,
            floor: 0,
            last_stmt: None,
            output: options.output,
            gas: options.gas,
            debug: options.debug,
            num_ops: 0,
        }
    }

    /// Ops executed so far.
    pub fn num_ops(&self) -> u64 {
        self.num_ops
    }

    pub fn write_output(&self, s: &str) {
        self.output.write(s);
    }

    // ---- stacks ----

    pub(super) fn heights(&self) -> Heights {
        Heights {
            ops: self.ops.len(),
            values: self.values.len(),
            exprs: self.exprs.len(),
            stmts: self.stmts.len(),
            blocks: self.blocks.len(),
        }
    }

    pub(super) fn truncate_to(&mut self, h: Heights) {
        self.ops.truncate(h.ops);
        self.values.truncate(h.values);
        self.exprs.truncate(h.exprs);
        self.stmts.truncate(h.stmts);
        self.blocks.truncate(h.blocks);
    }

    pub(super) fn push_eval(&mut self, x: NodeId) {
        self.exprs.push(x);
        self.ops.push(Op::Eval);
    }

    pub(super) fn push_eval_ptr(&mut self, x: NodeId) {
        self.exprs.push(x);
        self.ops.push(Op::EvalPtr);
    }

    pub(super) fn push_exec(&mut self, s: NodeId) {
        self.stmts.push(s);
        self.ops.push(Op::Exec);
    }

    pub(super) fn pop_value(&mut self) -> InterpResult<TypedValue> {
        self.values
            .pop()
            .ok_or_else(|| RuntimeError::internal("value stack underflow"))
    }

    /// Pops `n` values, returned in push order.
    pub(super) fn pop_values(&mut self, n: usize) -> InterpResult<Vec<TypedValue>> {
        if self.values.len() < n {
            return Err(RuntimeError::internal("value stack underflow"));
        }
        let at = self.values.len() - n;
        Ok(self.values.split_off(at))
    }

    pub(super) fn pop_expr(&mut self) -> InterpResult<NodeId> {
        self.exprs
            .pop()
            .ok_or_else(|| RuntimeError::internal("expression stack underflow"))
    }

    pub(super) fn pop_stmt(&mut self) -> InterpResult<NodeId> {
        self.stmts
            .pop()
            .ok_or_else(|| RuntimeError::internal("statement stack underflow"))
    }

    pub(super) fn top_block(&self) -> InterpResult<Rc<Block>> {
        self.blocks
            .last()
            .cloned()
            .ok_or_else(|| RuntimeError::internal("no current block"))
    }

    /// Index of the innermost call frame.
    pub(super) fn top_call_index(&self) -> Option<usize> {
        self.frames.iter().rposition(Frame::is_call)
    }

    // ---- lexical addressing ----

    /// The block `depth` levels up from the current one (1 is current).
    pub(super) fn block_at_depth(&self, depth: u8) -> InterpResult<Rc<Block>> {
        let mut b = self.top_block()?;
        for _ in 1..depth {
            let parent = b
                .parent
                .clone()
                .ok_or_else(|| RuntimeError::internal(format!("no block at depth {depth}")))?;
            b = parent;
        }
        Ok(b)
    }

    pub(super) fn path_slot(&self, path: &ValuePath) -> InterpResult<Slot> {
        match path.kind {
            PathKind::Block => {
                let b = self.block_at_depth(path.depth)?;
                b.slot(path.index as usize).ok_or_else(|| {
                    RuntimeError::internal(format!("no slot {} for {}", path.index, path.name))
                })
            }
            _ => Err(RuntimeError::internal(format!(
                "{} is not addressable",
                path.name
            ))),
        }
    }

    pub(super) fn get_path(&self, path: &ValuePath) -> InterpResult<TypedValue> {
        match path.kind {
            PathKind::Uverse => self
                .scopes
                .get(self.scopes.uverse)
                .values
                .get(path.index as usize)
                .cloned()
                .ok_or_else(|| RuntimeError::internal(format!("no builtin {}", path.name))),
            _ => Ok(self.path_slot(path)?.borrow().clone()),
        }
    }

    // ---- running ----

    /// Executes one op. Returns `false` once the op stack is empty.
    pub fn step(&mut self) -> InterpResult<bool> {
        let Some(op) = self.ops.pop() else {
            return Ok(false);
        };
        self.num_ops += 1;
        if let Some(gas) = self.gas.as_mut() {
            gas.consume_gas(1, op.name())?;
        }
        if self.debug {
            trace!(
                op = op.name(),
                ops = self.ops.len(),
                values = self.values.len(),
                blocks = self.blocks.len(),
                frames = self.frames.len(),
                "step"
            );
        }
        self.exec_op(op)?;
        Ok(true)
    }

    pub fn run(&mut self) -> InterpResult<()> {
        self.run_until(0)
    }

    /// Steps until the op stack is back at `base`. Recoverable runtime
    /// errors become panics of the running program.
    pub(super) fn run_until(&mut self, base: usize) -> InterpResult<()> {
        while self.ops.len() > base {
            if let Err(e) = self.step() {
                if !e.is_recoverable() {
                    return Err(e);
                }
                let value = TypedValue::string(self.types, &e.message);
                self.start_panic(value)?;
            }
        }
        Ok(())
    }

    /// Calls a function value to completion and returns its results.
    pub fn run_call(&mut self, f: TypedValue, args: Vec<TypedValue>) -> InterpResult<Vec<TypedValue>> {
        let base = self.heights();
        let frames = self.frames.len();
        let floor = std::mem::replace(&mut self.floor, frames);
        let result = self
            .call_value(f, args, false, false)
            .and_then(|_| self.run_until(base.ops));
        self.floor = floor;
        match result {
            Ok(()) => {
                let results = self.values.split_off(base.values.min(self.values.len()));
                Ok(results)
            }
            Err(e) => {
                self.frames.truncate(frames);
                self.truncate_to(base);
                Err(e)
            }
        }
    }

    /// Executes one statement inside `block`.
    pub fn run_stmt(&mut self, block: Rc<Block>, stmt: NodeId) -> InterpResult<()> {
        let base = self.heights();
        let frames = self.frames.len();
        let floor = std::mem::replace(&mut self.floor, frames);
        self.blocks.push(block);
        self.ops.push(Op::PopBlock);
        self.push_exec(stmt);
        let result = self.run_until(base.ops);
        self.floor = floor;
        if result.is_err() {
            self.frames.truncate(frames);
            self.truncate_to(base);
        }
        result
    }

    fn exec_op(&mut self, op: Op) -> InterpResult<()> {
        match op {
            Op::Eval => self.op_eval(),
            Op::EvalPtr => self.op_eval_ptr(),
            Op::Binary => self.op_binary(),
            Op::LogicalRight => self.op_logical_right(),
            Op::Unary => self.op_unary(),
            Op::Call => self.op_call(),
            Op::Index => self.op_index(),
            Op::Selector => self.op_selector(),
            Op::Slice => self.op_slice(),
            Op::Star => self.op_star(),
            Op::Ref => self.op_ref(),
            Op::TypeAssert => self.op_type_assert(),
            Op::CompositeLit => self.op_composite_lit(),
            Op::IndexPtr => self.op_index_ptr(),
            Op::SelectorPtr => self.op_selector_ptr(),
            Op::StarPtr => self.op_star_ptr(),
            Op::AddrOf => self.op_addr_of(),
            Op::Exec => self.op_exec(),
            Op::Body => self.op_body(),
            Op::PopBlock => {
                self.blocks.pop();
                Ok(())
            }
            Op::PopFrame => {
                self.frames.pop();
                Ok(())
            }
            Op::PopValuesTo(h) => {
                self.values.truncate(h);
                Ok(())
            }
            Op::Assign(n) => self.op_assign(n),
            Op::AssignOp(n) => self.op_assign_op(n),
            Op::IncDec(n) => self.op_inc_dec(n),
            Op::Define(n) => self.op_define(n),
            Op::ValueDecl(n) => self.op_value_decl(n),
            Op::TypeDecl(n) => self.op_type_decl(n),
            Op::IfCond(n) => self.op_if_cond(n),
            Op::ForCond(n) => self.op_for_cond(n),
            Op::ForCheck(n) => self.op_for_check(n),
            Op::ForPost(n) => self.op_for_post(n),
            Op::RangeInit(n) => self.op_range_init(n),
            Op::RangeIter(n) => self.op_range_iter(n),
            Op::RangeAssign(n) => self.op_range_assign(n),
            Op::RangeBody(n) => self.start_body(n),
            Op::SwitchClause(n) => self.op_switch_clause(n),
            Op::SwitchCase(n) => self.op_switch_case(n),
            Op::Return(n) => self.op_return(n),
            Op::Defer(n) => self.op_defer(n),
            Op::RunDefers => self.op_run_defers(),
            Op::CallReturn => self.op_call_return(),
        }
    }

    // ---- panics ----

    /// Starts unwinding with `value`. Control moves to the deferred calls
    /// of the innermost function; with no function left the panic is
    /// returned as an error.
    pub fn start_panic(&mut self, value: TypedValue) -> InterpResult<()> {
        debug!(value = %sprint(self.types, &value), "panic");
        self.exception = Some(value);
        self.unwind_panic(self.frames.len())
    }

    /// Unwinds to the innermost call frame below `below`.
    pub(super) fn unwind_panic(&mut self, below: usize) -> InterpResult<()> {
        let floor = self.floor;
        let found = self.frames[floor..below.min(self.frames.len())]
            .iter()
            .rposition(Frame::is_call)
            .map(|i| i + floor);
        let Some(i) = found else {
            return Err(self.uncaught_panic());
        };
        self.frames.truncate(i + 1);
        let frame = &mut self.frames[i];
        let body = frame.heights;
        if let Some(cf) = frame.call_mut() {
            cf.panicking = true;
        }
        self.truncate_to(body);
        Ok(())
    }

    fn uncaught_panic(&mut self) -> RuntimeError {
        let value = self.exception.take().unwrap_or_default();
        let text = match &value.v {
            Value::String(s) if value.ty.is_some_and(|t| !self.types.is_declared(t)) => s.to_string(),
            _ => self.sprint_value(&value),
        };
        RuntimeError::panic(&text)
    }

    /// Text of `tv` as `print` shows it. Values with a `String` or
    /// `Error` method print through that method.
    pub fn sprint_value(&mut self, tv: &TypedValue) -> String {
        for method in ["String", "Error"] {
            if let Some(text) = self.call_string_method(tv, method) {
                return text;
            }
        }
        sprint(self.types, tv)
    }

    fn call_string_method(&mut self, tv: &TypedValue, method: &str) -> Option<String> {
        let t = tv.ty?;
        if self.types.is_interface(t) {
            return None;
        }
        let sel = find_selector(self.types, t, method).ok()??;
        let returns_string = self
            .types
            .signature(sel.ty)
            .is_some_and(|(params, results, _)| {
                params.is_empty() && results.len() == 1 && self.types.kind(results[0]) == Kind::String
            });
        if !sel.is_method() || !returns_string {
            return None;
        }
        let bound = self.bind_method(tv, method).ok()?;
        let results = self.run_call(bound, vec![]).ok()?;
        results.first().and_then(|r| r.as_str().map(str::to_string))
    }

    /// Stops a panic when called from a deferred function of the
    /// panicking call; returns the panic value, or nil otherwise.
    pub fn recover(&mut self) -> TypedValue {
        let Some(top) = self.top_call_index() else {
            return TypedValue::undefined();
        };
        if !self.frames[top].call().is_some_and(|cf| cf.is_defer) {
            return TypedValue::undefined();
        }
        let Some(caller) = self.frames[..top].iter().rposition(Frame::is_call) else {
            return TypedValue::undefined();
        };
        let panicking = self.frames[caller].call().is_some_and(|cf| cf.panicking);
        if !panicking {
            return TypedValue::undefined();
        }
        match self.exception.take() {
            Some(v) => {
                if let Some(cf) = self.frames[caller].call_mut() {
                    cf.panicking = false;
                }
                v
            }
            None => TypedValue::undefined(),
        }
    }

    // ---- packages ----

    /// Builds the runtime blocks of a preprocessed package, runs its
    /// variable initializers in dependency order and then its `init`
    /// functions.
    pub fn init_package(&mut self, pv: &Rc<PackageValue>) -> InterpResult<()> {
        if pv.block.borrow().is_some() {
            return Ok(());
        }
        debug!(path = %pv.path, "initializing package");
        let sb = self.scopes.get(pv.scope);
        let values = (0..sb.num_names())
            .map(|i| match (sb.name_sources[i], sb.types[i]) {
                (NameSource::Var, Some(t)) => zero_value(self.types, t),
                _ => sb.values[i].clone(),
            })
            .collect();
        let pkg_block = Block::with_values(Some(pv.node), pv.scope, None, values);
        *pv.block.borrow_mut() = Some(pkg_block.clone());

        let NodeKind::Package { files, .. } = self.ast.kind(pv.node) else {
            return Err(RuntimeError::internal("package value without package node"));
        };
        let mut file_blocks = Vec::with_capacity(files.len());
        for &file in files {
            let fs = self
                .ast
                .scope(file)
                .ok_or_else(|| RuntimeError::internal("file without scope"))?;
            let values = self.scopes.get(fs).values.clone();
            file_blocks.push(Block::with_values(Some(file), fs, Some(pkg_block.clone()), values));
        }
        *pv.file_blocks.borrow_mut() = file_blocks.clone();

        let order = pv.init_order.borrow().clone();
        for (file, decl) in order {
            let fb = file_blocks
                .get(file)
                .cloned()
                .ok_or_else(|| RuntimeError::internal("declaration in unknown file"))?;
            self.run_stmt(fb, decl)?;
        }
        let inits = pv.inits.borrow().clone();
        for f in inits {
            self.run_call(TypedValue::new(f.ty, Value::Func(f.clone())), vec![])?;
        }
        Ok(())
    }

    /// Source location of the statement executed last.
    pub fn current_location(&self) -> Option<Location> {
        let stmt = self.last_stmt?;
        let (pkg_path, file) = self
            .frames
            .iter()
            .rev()
            .find_map(|f| f.call().map(|cf| (cf.pkg_path.clone(), cf.file.clone())))
            .unwrap_or_default();
        Some(Location::new(pkg_path, file, self.ast.span(stmt)))
    }
}
