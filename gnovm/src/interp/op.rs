//! Machine operations

use crate::ast::NodeId;

/// One entry of the op stack. Expression ops pop their node from the
/// expression stack; statement-control ops carry their node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // ---- expressions ----
    Eval,
    /// Evaluates an lvalue to a pointer.
    EvalPtr,
    Binary,
    LogicalRight,
    Unary,
    Call,
    Index,
    Selector,
    Slice,
    Star,
    Ref,
    TypeAssert,
    CompositeLit,
    IndexPtr,
    SelectorPtr,
    StarPtr,
    /// Stores a non-addressable value in a fresh slot.
    AddrOf,

    // ---- statements ----
    Exec,
    Body,
    PopBlock,
    PopFrame,
    PopValuesTo(usize),
    Assign(usize),
    AssignOp(NodeId),
    IncDec(NodeId),
    Define(NodeId),
    ValueDecl(NodeId),
    TypeDecl(NodeId),
    IfCond(NodeId),
    ForCond(NodeId),
    ForCheck(NodeId),
    ForPost(NodeId),
    RangeInit(NodeId),
    RangeIter(NodeId),
    RangeAssign(NodeId),
    RangeBody(NodeId),
    SwitchClause(NodeId),
    SwitchCase(NodeId),
    Return(usize),
    Defer(NodeId),
    RunDefers,
    CallReturn,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Eval => "Eval",
            Op::EvalPtr => "EvalPtr",
            Op::Binary => "Binary",
            Op::LogicalRight => "LogicalRight",
            Op::Unary => "Unary",
            Op::Call => "Call",
            Op::Index => "Index",
            Op::Selector => "Selector",
            Op::Slice => "Slice",
            Op::Star => "Star",
            Op::Ref => "Ref",
            Op::TypeAssert => "TypeAssert",
            Op::CompositeLit => "CompositeLit",
            Op::IndexPtr => "IndexPtr",
            Op::SelectorPtr => "SelectorPtr",
            Op::StarPtr => "StarPtr",
            Op::AddrOf => "AddrOf",
            Op::Exec => "Exec",
            Op::Body => "Body",
            Op::PopBlock => "PopBlock",
            Op::PopFrame => "PopFrame",
            Op::PopValuesTo(_) => "PopValuesTo",
            Op::Assign(_) => "Assign",
            Op::AssignOp(_) => "AssignOp",
            Op::IncDec(_) => "IncDec",
            Op::Define(_) => "Define",
            Op::ValueDecl(_) => "ValueDecl",
            Op::TypeDecl(_) => "TypeDecl",
            Op::IfCond(_) => "IfCond",
            Op::ForCond(_) => "ForCond",
            Op::ForCheck(_) => "ForCheck",
            Op::ForPost(_) => "ForPost",
            Op::RangeInit(_) => "RangeInit",
            Op::RangeIter(_) => "RangeIter",
            Op::RangeAssign(_) => "RangeAssign",
            Op::RangeBody(_) => "RangeBody",
            Op::SwitchClause(_) => "SwitchClause",
            Op::SwitchCase(_) => "SwitchCase",
            Op::Return(_) => "Return",
            Op::Defer(_) => "Defer",
            Op::RunDefers => "RunDefers",
            Op::CallReturn => "CallReturn",
        }
    }
}
