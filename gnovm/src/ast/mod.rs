//! Abstract Syntax Tree definitions
//!
//! All nodes of a program live in one [`Ast`] arena and refer to each other
//! through [`NodeId`] handles. The preprocessor rewrites nodes in place by
//! replacing the handle stored in the parent.

mod attrs;
mod display;
mod dump;
mod fields;
mod span;

pub use attrs::*;
pub use display::*;
pub use dump::*;
pub use fields::*;
pub use span::*;

use crate::scope::{ScopeId, ValuePath};
use crate::types::TypeRef;
use crate::values::TypedValue;
use la_arena::{Arena, Idx};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to a node in the [`Ast`] arena.
pub type NodeId = Idx<Node>;

/// Identifier text.
pub type Name = String;

/// A node together with its position, label and side-table.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub label: Option<Name>,
    /// Static scope owned by block nodes, set during preprocessing.
    pub scope: Option<ScopeId>,
    pub attrs: Attrs,
}

/// Binary operators, in precedence groups as Go declares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Quo,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    AndNot,
    LAnd,
    LOr,
    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

impl BinaryOp {
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::LOr => 1,
            BinaryOp::LAnd => 2,
            BinaryOp::Eql
            | BinaryOp::Neq
            | BinaryOp::Lss
            | BinaryOp::Leq
            | BinaryOp::Gtr
            | BinaryOp::Geq => 3,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Or | BinaryOp::Xor => 4,
            _ => 5,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eql
                | BinaryOp::Neq
                | BinaryOp::Lss
                | BinaryOp::Leq
                | BinaryOp::Gtr
                | BinaryOp::Geq
        )
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinaryOp::Shl | BinaryOp::Shr)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::LAnd | BinaryOp::LOr)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Quo => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::AndNot => "&^",
            BinaryOp::LAnd => "&&",
            BinaryOp::LOr => "||",
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Lss => "<",
            BinaryOp::Leq => "<=",
            BinaryOp::Gtr => ">",
            BinaryOp::Geq => ">=",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Pos,
    Neg,
    Not,
    Xor,
    Recv,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Pos => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::Xor => "^",
            UnaryOp::Recv => "<-",
        };
        write!(f, "{s}")
    }
}

/// Assignment operators. `Assign` is `=`, `Define` is `:=`, the rest are
/// compound forms that carry their binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignOp {
    Assign,
    Define,
    Op(BinaryOp),
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignOp::Assign => write!(f, "="),
            AssignOp::Define => write!(f, ":="),
            AssignOp::Op(op) => write!(f, "{op}="),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IncDecOp {
    Inc,
    Dec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchOp {
    Break,
    Continue,
    Goto,
    Fallthrough,
}

impl fmt::Display for BranchOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BranchOp::Break => "break",
            BranchOp::Continue => "continue",
            BranchOp::Goto => "goto",
            BranchOp::Fallthrough => "fallthrough",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LitKind {
    Int,
    Float,
    Imag,
    Char,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChanDir {
    Both,
    Send,
    Recv,
}

/// A name declared by a value declaration, with its resolved path.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: Name,
    pub path: Option<ValuePath>,
}

impl Ident {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            name: name.into(),
            path: None,
        }
    }
}

/// A variable captured by a function literal. `index` is the slot of the
/// capture in the literal's own block; `source` addresses the captured
/// variable from the scope enclosing the literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: Name,
    pub index: u16,
    pub source: ValuePath,
}

/// Node variants.
#[derive(Debug, Clone)]
pub enum NodeKind {
    // ---- expressions ----
    Name {
        name: Name,
        path: Option<ValuePath>,
    },
    BasicLit {
        kind: LitKind,
        value: String,
    },
    Binary {
        op: BinaryOp,
        left: NodeId,
        right: NodeId,
    },
    Unary {
        op: UnaryOp,
        x: NodeId,
    },
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        /// Final argument spread with `...`.
        varg: bool,
        /// Number of values the arguments produce, set by the preprocessor.
        num_args: usize,
    },
    Index {
        x: NodeId,
        index: NodeId,
        has_ok: bool,
    },
    Selector {
        x: NodeId,
        sel: Name,
        path: Option<ValuePath>,
    },
    Slice {
        x: NodeId,
        low: Option<NodeId>,
        high: Option<NodeId>,
        max: Option<NodeId>,
    },
    Star {
        x: NodeId,
    },
    Ref {
        x: NodeId,
    },
    TypeAssert {
        x: NodeId,
        /// `None` for the `x.(type)` guard of a type switch.
        ty: Option<NodeId>,
        has_ok: bool,
    },
    CompositeLit {
        ty: Option<NodeId>,
        elts: Vec<NodeId>,
    },
    KeyValue {
        key: Option<NodeId>,
        value: NodeId,
    },
    FuncLit {
        ty: NodeId,
        body: Vec<NodeId>,
        captures: Vec<Capture>,
    },
    /// A folded constant. `source` is the node it replaced.
    Const {
        tv: TypedValue,
        source: NodeId,
    },
    /// A resolved type expression.
    ConstType {
        ty: TypeRef,
        source: NodeId,
    },

    // ---- type expressions ----
    Field {
        /// `None` for embedded fields and unnamed parameters.
        name: Option<Name>,
        ty: NodeId,
        tag: Option<String>,
    },
    ArrayType {
        /// `None` for `[...]T`.
        len: Option<NodeId>,
        elt: NodeId,
    },
    SliceType {
        elt: NodeId,
        /// Variadic parameter `...T`.
        vrd: bool,
    },
    PointerType {
        elt: NodeId,
    },
    InterfaceType {
        methods: Vec<NodeId>,
    },
    ChanType {
        dir: ChanDir,
        value: NodeId,
    },
    FuncType {
        params: Vec<NodeId>,
        results: Vec<NodeId>,
    },
    MapType {
        key: NodeId,
        value: NodeId,
    },
    StructType {
        fields: Vec<NodeId>,
    },

    // ---- statements ----
    Assign {
        lhs: Vec<NodeId>,
        op: AssignOp,
        rhs: Vec<NodeId>,
    },
    Block {
        body: Vec<NodeId>,
    },
    Branch {
        op: BranchOp,
        label: Option<Name>,
        /// Statement targeted by break/continue, clause for fallthrough.
        target: Option<NodeId>,
        /// Blocks to pop for goto.
        depth: u8,
        /// Frames to pop for goto.
        frame_depth: u8,
        /// Statement index of the goto label in the target body.
        body_index: i32,
    },
    DeclStmt {
        body: Vec<NodeId>,
    },
    Defer {
        call: NodeId,
    },
    ExprStmt {
        x: NodeId,
    },
    For {
        init: Option<NodeId>,
        cond: Option<NodeId>,
        post: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Go {
        call: NodeId,
    },
    If {
        init: Option<NodeId>,
        cond: NodeId,
        then: NodeId,
        els: NodeId,
    },
    IfCase {
        body: Vec<NodeId>,
    },
    IncDec {
        x: NodeId,
        op: IncDecOp,
    },
    Range {
        x: NodeId,
        key: Option<NodeId>,
        value: Option<NodeId>,
        define: bool,
        body: Vec<NodeId>,
    },
    Return {
        results: Vec<NodeId>,
    },
    Select {
        cases: Vec<NodeId>,
    },
    SelectCase {
        comm: Option<NodeId>,
        body: Vec<NodeId>,
    },
    Send {
        chan: NodeId,
        value: NodeId,
    },
    Switch {
        init: Option<NodeId>,
        x: Option<NodeId>,
        is_type_switch: bool,
        /// Bound name of `switch v := x.(type)`.
        var_name: Option<Name>,
        clauses: Vec<NodeId>,
    },
    SwitchClause {
        /// Empty for `default`.
        cases: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    Empty,

    // ---- declarations ----
    Import {
        name: Option<Name>,
        path: String,
    },
    ValueDecl {
        names: Vec<Ident>,
        ty: Option<NodeId>,
        values: Vec<NodeId>,
        is_const: bool,
    },
    TypeDecl {
        name: Ident,
        ty: NodeId,
        is_alias: bool,
    },
    FuncDecl {
        recv: Option<NodeId>,
        name: Name,
        ty: NodeId,
        /// `None` for a bodyless declaration backed by a native function.
        body: Option<Vec<NodeId>>,
    },

    // ---- packaging ----
    File {
        pkg_name: Name,
        name: String,
        decls: Vec<NodeId>,
    },
    Package {
        path: String,
        name: Name,
        files: Vec<NodeId>,
    },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Name { .. } => "NameExpr",
            NodeKind::BasicLit { .. } => "BasicLitExpr",
            NodeKind::Binary { .. } => "BinaryExpr",
            NodeKind::Unary { .. } => "UnaryExpr",
            NodeKind::Call { .. } => "CallExpr",
            NodeKind::Index { .. } => "IndexExpr",
            NodeKind::Selector { .. } => "SelectorExpr",
            NodeKind::Slice { .. } => "SliceExpr",
            NodeKind::Star { .. } => "StarExpr",
            NodeKind::Ref { .. } => "RefExpr",
            NodeKind::TypeAssert { .. } => "TypeAssertExpr",
            NodeKind::CompositeLit { .. } => "CompositeLitExpr",
            NodeKind::KeyValue { .. } => "KeyValueExpr",
            NodeKind::FuncLit { .. } => "FuncLitExpr",
            NodeKind::Const { .. } => "ConstExpr",
            NodeKind::ConstType { .. } => "constTypeExpr",
            NodeKind::Field { .. } => "FieldTypeExpr",
            NodeKind::ArrayType { .. } => "ArrayTypeExpr",
            NodeKind::SliceType { .. } => "SliceTypeExpr",
            NodeKind::PointerType { .. } => "StarExpr",
            NodeKind::InterfaceType { .. } => "InterfaceTypeExpr",
            NodeKind::ChanType { .. } => "ChanTypeExpr",
            NodeKind::FuncType { .. } => "FuncTypeExpr",
            NodeKind::MapType { .. } => "MapTypeExpr",
            NodeKind::StructType { .. } => "StructTypeExpr",
            NodeKind::Assign { .. } => "AssignStmt",
            NodeKind::Block { .. } => "BlockStmt",
            NodeKind::Branch { .. } => "BranchStmt",
            NodeKind::DeclStmt { .. } => "DeclStmt",
            NodeKind::Defer { .. } => "DeferStmt",
            NodeKind::ExprStmt { .. } => "ExprStmt",
            NodeKind::For { .. } => "ForStmt",
            NodeKind::Go { .. } => "GoStmt",
            NodeKind::If { .. } => "IfStmt",
            NodeKind::IfCase { .. } => "IfCaseStmt",
            NodeKind::IncDec { .. } => "IncDecStmt",
            NodeKind::Range { .. } => "RangeStmt",
            NodeKind::Return { .. } => "ReturnStmt",
            NodeKind::Select { .. } => "SelectStmt",
            NodeKind::SelectCase { .. } => "SelectCaseStmt",
            NodeKind::Send { .. } => "SendStmt",
            NodeKind::Switch { .. } => "SwitchStmt",
            NodeKind::SwitchClause { .. } => "SwitchClauseStmt",
            NodeKind::Empty => "EmptyStmt",
            NodeKind::Import { .. } => "ImportDecl",
            NodeKind::ValueDecl { .. } => "ValueDecl",
            NodeKind::TypeDecl { .. } => "TypeDecl",
            NodeKind::FuncDecl { .. } => "FuncDecl",
            NodeKind::File { .. } => "FileNode",
            NodeKind::Package { .. } => "PackageNode",
        }
    }

    pub fn is_expr(&self) -> bool {
        matches!(
            self,
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
                | NodeKind::FuncLit { .. }
                | NodeKind::Const { .. }
        ) || self.is_type_expr()
    }

    pub fn is_type_expr(&self) -> bool {
        matches!(
            self,
            NodeKind::ConstType { .. }
                | NodeKind::Field { .. }
                | NodeKind::ArrayType { .. }
                | NodeKind::SliceType { .. }
                | NodeKind::PointerType { .. }
                | NodeKind::InterfaceType { .. }
                | NodeKind::ChanType { .. }
                | NodeKind::FuncType { .. }
                | NodeKind::MapType { .. }
                | NodeKind::StructType { .. }
        )
    }

    pub fn is_decl(&self) -> bool {
        matches!(
            self,
            NodeKind::Import { .. }
                | NodeKind::ValueDecl { .. }
                | NodeKind::TypeDecl { .. }
                | NodeKind::FuncDecl { .. }
        )
    }

    /// Block nodes own a static scope.
    pub fn is_block_node(&self) -> bool {
        matches!(
            self,
            NodeKind::Package { .. }
                | NodeKind::File { .. }
                | NodeKind::FuncDecl { .. }
                | NodeKind::FuncLit { .. }
                | NodeKind::Block { .. }
                | NodeKind::If { .. }
                | NodeKind::IfCase { .. }
                | NodeKind::For { .. }
                | NodeKind::Range { .. }
                | NodeKind::Switch { .. }
                | NodeKind::SwitchClause { .. }
                | NodeKind::SelectCase { .. }
        )
    }

    /// The statement list of a block node, if it has one.
    pub fn body(&self) -> Option<&[NodeId]> {
        match self {
            NodeKind::Block { body }
            | NodeKind::IfCase { body }
            | NodeKind::For { body, .. }
            | NodeKind::Range { body, .. }
            | NodeKind::SwitchClause { body, .. }
            | NodeKind::SelectCase { body, .. }
            | NodeKind::FuncLit { body, .. } => Some(body),
            NodeKind::FuncDecl { body, .. } => body.as_deref(),
            _ => None,
        }
    }
}

/// The node arena.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Arena<Node>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        self.nodes.alloc(Node {
            kind,
            span,
            label: None,
            scope: None,
            attrs: Attrs::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id].kind
    }

    pub fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id].span
    }

    pub fn line(&self, id: NodeId) -> u32 {
        self.nodes[id].span.pos.line
    }

    /// Sets the span once. A different non-zero span already in place is
    /// an error.
    pub fn set_span(&mut self, id: NodeId, span: Span) -> Result<(), String> {
        let node = &mut self.nodes[id];
        if !node.span.is_zero() && node.span != span {
            return Err(format!(
                "span already set to {} on {}, cannot set {}",
                node.span,
                node.kind.name(),
                span
            ));
        }
        node.span = span;
        Ok(())
    }

    pub fn force_span(&mut self, id: NodeId, span: Span) {
        self.nodes[id].span = span;
    }

    pub fn label(&self, id: NodeId) -> Option<&str> {
        self.nodes[id].label.as_deref()
    }

    pub fn set_label(&mut self, id: NodeId, label: impl Into<Name>) {
        self.nodes[id].label = Some(label.into());
    }

    pub fn scope(&self, id: NodeId) -> Option<ScopeId> {
        self.nodes[id].scope
    }

    pub fn set_scope(&mut self, id: NodeId, scope: ScopeId) {
        self.nodes[id].scope = Some(scope);
    }

    pub fn attr(&self, id: NodeId, key: AttrKey) -> Option<&AttrValue> {
        self.nodes[id].attrs.get(key)
    }

    pub fn has_attr(&self, id: NodeId, key: AttrKey) -> bool {
        self.nodes[id].attrs.has(key)
    }

    pub fn set_attr(&mut self, id: NodeId, key: AttrKey, value: AttrValue) {
        self.nodes[id].attrs.set(key, value);
    }

    pub fn del_attr(&mut self, id: NodeId, key: AttrKey) {
        self.nodes[id].attrs.del(key);
    }

    /// Static type cached by the preprocessor.
    pub fn type_of(&self, id: NodeId) -> Option<TypeRef> {
        match self.attr(id, AttrKey::TypeOf) {
            Some(AttrValue::Type(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn set_coverage_index(&mut self, id: NodeId, index: i64) {
        self.set_attr(id, AttrKey::CoverageIndex, AttrValue::Int(index));
    }

    pub fn is_preprocessed(&self, id: NodeId) -> bool {
        self.has_attr(id, AttrKey::Preprocessed)
    }

    /// Allocates a copy of the subtree rooted at `id`. Attributes, scopes
    /// and resolved paths are not carried over.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
            let node = &self.nodes[id];
            let mut kind = node.kind.clone();
            clear_paths(&mut kind);
            let span = node.span;
            let label = node.label.clone();
            let layout = layout(&kind);
            for visit in layout {
                let Visit::Child(field) = *visit else { continue };
                for i in 0..field_len(&kind, field) {
                    if let Some(child) = get_child(&kind, field, i) {
                        let copy = self.deep_clone(child);
                        set_child(&mut kind, field, i, copy);
                    }
                }
            }
            let new_id = self.alloc(kind, span);
            self.nodes[new_id].label = label;
            new_id
        })
    }

    /// Statement index of the statement labeled `label` in `body`.
    pub fn find_label(&self, body: &[NodeId], label: &str) -> Option<usize> {
        body.iter()
            .position(|&s| self.nodes[s].label.as_deref() == Some(label))
    }
}

fn clear_paths(kind: &mut NodeKind) {
    match kind {
        NodeKind::Name { path, .. } | NodeKind::Selector { path, .. } => *path = None,
        NodeKind::ValueDecl { names, .. } => {
            for n in names {
                n.path = None;
            }
        }
        NodeKind::TypeDecl { name, .. } => name.path = None,
        NodeKind::FuncLit { captures, .. } => captures.clear(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(ast: &mut Ast, n: &str) -> NodeId {
        ast.alloc(
            NodeKind::Name {
                name: n.to_string(),
                path: None,
            },
            Span::at(1, 1, 1, 2),
        )
    }

    #[test]
    fn test_set_span_once() {
        let mut ast = Ast::new();
        let id = ast.alloc(NodeKind::Empty, Span::default());
        assert!(ast.set_span(id, Span::at(1, 1, 1, 5)).is_ok());
        assert!(ast.set_span(id, Span::at(1, 1, 1, 5)).is_ok());
        assert!(ast.set_span(id, Span::at(2, 1, 2, 5)).is_err());
        ast.force_span(id, Span::at(2, 1, 2, 5));
        assert_eq!(ast.span(id), Span::at(2, 1, 2, 5));
    }

    #[test]
    fn test_deep_clone_is_independent() {
        let mut ast = Ast::new();
        let l = name(&mut ast, "a");
        let r = name(&mut ast, "b");
        let bin = ast.alloc(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left: l,
                right: r,
            },
            Span::at(1, 1, 1, 6),
        );
        ast.set_attr(bin, AttrKey::Preprocessed, AttrValue::Flag);
        let copy = ast.deep_clone(bin);
        assert_ne!(copy, bin);
        assert!(!ast.is_preprocessed(copy));
        let NodeKind::Binary { left, right, .. } = ast.kind(copy) else {
            panic!("expected binary");
        };
        assert_ne!(*left, l);
        assert_ne!(*right, r);
        assert_eq!(render(&ast, copy), "a + b");
    }

    #[test]
    fn test_block_node_kinds() {
        let mut ast = Ast::new();
        let blk = ast.alloc(NodeKind::Block { body: vec![] }, Span::default());
        let e = ast.alloc(NodeKind::Empty, Span::default());
        assert!(ast.kind(blk).is_block_node());
        assert!(!ast.kind(e).is_block_node());
        assert_eq!(ast.kind(blk).body(), Some(&[][..]));
    }

    #[test]
    fn test_find_label() {
        let mut ast = Ast::new();
        let a = ast.alloc(NodeKind::Empty, Span::default());
        let b = ast.alloc(NodeKind::Empty, Span::default());
        ast.set_label(b, "L");
        assert_eq!(ast.find_label(&[a, b], "L"), Some(1));
        assert_eq!(ast.find_label(&[a, b], "M"), None);
    }
}
