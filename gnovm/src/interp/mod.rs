//! Op-stack virtual machine
//!
//! The machine executes preprocessed trees with explicit stacks instead of
//! host recursion: an op stack drives execution, expressions and statements
//! wait on their own stacks, values accumulate on the value stack, and the
//! block and frame stacks track lexical environments and control
//! constructs. Deep recursion in the interpreted program therefore never
//! grows the host stack.

mod call;
mod error;
mod eval;
mod exec;
mod machine;
mod op;

pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use machine::Machine;
pub use op::Op;

use crate::ast::NodeId;
use crate::scope::ScopeId;
use crate::types::TypeRef;
use crate::values::{FuncValue, MapKey, MapValue, Slot, SliceValue, TypedValue, new_slot};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Stack heights captured when a frame or a block body starts, used to
/// unwind on break, continue, goto, return and panic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heights {
    pub ops: usize,
    pub values: usize,
    pub exprs: usize,
    pub stmts: usize,
    pub blocks: usize,
}

/// A runtime block: the slots of one static scope plus the position in
/// the statement list being executed.
pub struct Block {
    pub node: Option<NodeId>,
    pub scope: ScopeId,
    pub values: RefCell<Vec<Slot>>,
    pub parent: Option<Rc<Block>>,
    /// Node whose body is running in this block. For If and Switch blocks
    /// this is the selected clause.
    pub body_owner: Cell<Option<NodeId>>,
    pub cursor: Cell<usize>,
    pub heights: Cell<Heights>,
}

impl Block {
    pub fn new(node: Option<NodeId>, scope: ScopeId, parent: Option<Rc<Block>>, size: usize) -> Rc<Self> {
        Rc::new(Self {
            node,
            scope,
            values: RefCell::new((0..size).map(|_| new_slot(TypedValue::undefined())).collect()),
            parent,
            body_owner: Cell::new(None),
            cursor: Cell::new(0),
            heights: Cell::new(Heights::default()),
        })
    }

    /// Builds a block whose slots hold `values`.
    pub fn with_values(node: Option<NodeId>, scope: ScopeId, parent: Option<Rc<Block>>, values: Vec<TypedValue>) -> Rc<Self> {
        Rc::new(Self {
            node,
            scope,
            values: RefCell::new(values.into_iter().map(new_slot).collect()),
            parent,
            body_owner: Cell::new(None),
            cursor: Cell::new(0),
            heights: Cell::new(Heights::default()),
        })
    }

    pub fn slot(&self, index: usize) -> Option<Slot> {
        self.values.borrow().get(index).cloned()
    }

    /// Replaces the slot at `index` with a fresh one holding `tv`.
    pub fn define(&self, index: usize, tv: TypedValue) {
        let mut values = self.values.borrow_mut();
        if index >= values.len() {
            values.resize_with(index + 1, || new_slot(TypedValue::undefined()));
        }
        values[index] = new_slot(tv);
    }

    pub fn set_slot(&self, index: usize, slot: Slot) {
        let mut values = self.values.borrow_mut();
        if index >= values.len() {
            values.resize_with(index + 1, || new_slot(TypedValue::undefined()));
        }
        values[index] = slot;
    }

    /// Grows the block to `size` slots; clause scopes extend the block of
    /// their If or Switch.
    pub fn grow(&self, size: usize) {
        let mut values = self.values.borrow_mut();
        if size > values.len() {
            values.resize_with(size, || new_slot(TypedValue::undefined()));
        }
    }

    pub fn len(&self) -> usize {
        self.values.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("node", &self.node)
            .field("size", &self.len())
            .field("cursor", &self.cursor.get())
            .finish()
    }
}

/// A call waiting in a `defer` statement.
#[derive(Debug, Clone)]
pub struct Deferred {
    pub func: TypedValue,
    pub args: Vec<TypedValue>,
    pub varg: bool,
}

#[derive(Debug)]
pub struct CallFrame {
    pub func: Rc<FuncValue>,
    pub block: Rc<Block>,
    pub num_params: usize,
    pub num_results: usize,
    pub defers: Vec<Deferred>,
    /// The call was started by running a deferred call.
    pub is_defer: bool,
    pub panicking: bool,
    /// Heights before the call pushed anything.
    pub base: Heights,
    pub pkg_path: String,
    pub file: String,
}

/// Iteration state of a range loop. Arrays and strings are snapshotted
/// when the loop starts; slices and maps are read live.
#[derive(Debug)]
pub enum RangeState {
    Values {
        items: Vec<(TypedValue, TypedValue)>,
        next: usize,
    },
    Slice {
        slice: SliceValue,
        int: TypeRef,
        next: usize,
    },
    Map {
        map: Rc<MapValue>,
        keys: Vec<(TypedValue, MapKey)>,
        next: usize,
    },
}

#[derive(Debug, Default)]
pub struct SwitchState {
    pub clause: usize,
    pub case: usize,
    pub default: Option<usize>,
}

#[derive(Debug)]
pub enum FrameKind {
    Call(Box<CallFrame>),
    Loop(Option<RangeState>),
    Switch(SwitchState),
}

/// A control frame. `heights` are taken after the frame's block and its
/// `PopBlock` op were pushed.
#[derive(Debug)]
pub struct Frame {
    pub node: Option<NodeId>,
    pub heights: Heights,
    pub kind: FrameKind,
}

impl Frame {
    pub fn is_call(&self) -> bool {
        matches!(self.kind, FrameKind::Call(_))
    }

    pub fn call(&self) -> Option<&CallFrame> {
        match &self.kind {
            FrameKind::Call(cf) => Some(cf),
            _ => None,
        }
    }

    pub fn call_mut(&mut self) -> Option<&mut CallFrame> {
        match &mut self.kind {
            FrameKind::Call(cf) => Some(cf),
            _ => None,
        }
    }
}

/// Where `print` and `println` write.
#[derive(Debug, Clone, Default)]
pub enum OutputSink {
    #[default]
    Stdout,
    Buffer(Rc<RefCell<String>>),
}

impl OutputSink {
    /// A sink capturing into a shared string.
    pub fn buffer() -> (Self, Rc<RefCell<String>>) {
        let buf = Rc::new(RefCell::new(String::new()));
        (OutputSink::Buffer(buf.clone()), buf)
    }

    pub fn write(&self, s: &str) {
        match self {
            OutputSink::Stdout => {
                use std::io::Write;
                let mut out = std::io::stdout().lock();
                let _ = out.write_all(s.as_bytes());
                let _ = out.flush();
            }
            OutputSink::Buffer(buf) => buf.borrow_mut().push_str(s),
        }
    }
}

/// Charges execution cost. The machine consumes one unit per op.
pub trait GasMeter {
    fn consume_gas(&mut self, amount: u64, descriptor: &str) -> InterpResult<()>;

    fn gas_consumed(&self) -> u64;
}

/// Gas meter with a fixed op budget.
#[derive(Debug, Clone)]
pub struct OpCounter {
    limit: u64,
    used: u64,
}

impl OpCounter {
    pub fn new(limit: u64) -> Self {
        Self { limit, used: 0 }
    }
}

impl GasMeter for OpCounter {
    fn consume_gas(&mut self, amount: u64, _descriptor: &str) -> InterpResult<()> {
        self.used = self.used.saturating_add(amount);
        if self.used > self.limit {
            return Err(RuntimeError::out_of_gas(self.limit));
        }
        Ok(())
    }

    fn gas_consumed(&self) -> u64 {
        self.used
    }
}

#[derive(Default)]
pub struct MachineOptions {
    pub output: OutputSink,
    pub gas: Option<Box<dyn GasMeter>>,
    /// Trace every op at debug level.
    pub debug: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scopes;
    use crate::types::Types;

    #[test]
    fn test_block_define_grows() {
        let scopes = Scopes::new();
        let types = Types::new();
        let b = Block::new(None, scopes.uverse, None, 1);
        b.define(3, TypedValue::int(&types, 7));
        assert_eq!(b.len(), 4);
        assert_eq!(b.slot(3).unwrap().borrow().as_i64(), Some(7));
        assert!(b.slot(1).unwrap().borrow().is_undefined());
    }

    #[test]
    fn test_block_define_replaces_slot() {
        let scopes = Scopes::new();
        let types = Types::new();
        let b = Block::new(None, scopes.uverse, None, 1);
        let before = b.slot(0).unwrap();
        b.define(0, TypedValue::int(&types, 1));
        let after = b.slot(0).unwrap();
        assert!(!Rc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_op_counter_limit() {
        let mut g = OpCounter::new(3);
        assert!(g.consume_gas(3, "Eval").is_ok());
        let err = g.consume_gas(1, "Eval").unwrap_err();
        assert_eq!(err.kind, ErrorKind::OutOfGas);
        assert_eq!(g.gas_consumed(), 4);
    }

    #[test]
    fn test_buffer_sink() {
        let (sink, buf) = OutputSink::buffer();
        sink.write("a");
        sink.write("b\n");
        assert_eq!(buf.borrow().as_str(), "ab\n");
    }
}
