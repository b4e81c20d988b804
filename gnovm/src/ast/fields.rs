//! Child fields of each node kind, in visiting order

use super::{NodeId, NodeKind};

/// A child position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Left,
    Right,
    X,
    Func,
    Args,
    Index,
    Low,
    High,
    Max,
    Type,
    Elts,
    Key,
    Value,
    Body,
    Len,
    Elt,
    Methods,
    Params,
    Results,
    Fields,
    Lhs,
    Rhs,
    Call,
    Init,
    Cond,
    Post,
    Then,
    Else,
    Cases,
    Comm,
    Chan,
    Clauses,
    Recv,
    Values,
    Decls,
    Files,
}

/// One step of a node's visiting order: a child field, or the point at
/// which the block stages fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Child(Field),
    Block,
    Block2,
}

use Field as F;
use Visit::{Block as B, Block2 as B2, Child as C};

/// Visiting order of a node's children.
pub fn layout(kind: &NodeKind) -> &'static [Visit] {
    match kind {
        NodeKind::Name { .. }
        | NodeKind::BasicLit { .. }
        | NodeKind::Const { .. }
        | NodeKind::ConstType { .. }
        | NodeKind::Branch { .. }
        | NodeKind::Empty
        | NodeKind::Import { .. } => &[],
        NodeKind::Binary { .. } => &[C(F::Left), C(F::Right)],
        NodeKind::Unary { .. }
        | NodeKind::Selector { .. }
        | NodeKind::Star { .. }
        | NodeKind::Ref { .. }
        | NodeKind::ExprStmt { .. }
        | NodeKind::IncDec { .. } => &[C(F::X)],
        NodeKind::Call { .. } => &[C(F::Func), C(F::Args)],
        NodeKind::Index { .. } => &[C(F::X), C(F::Index)],
        NodeKind::Slice { .. } => &[C(F::X), C(F::Low), C(F::High), C(F::Max)],
        NodeKind::TypeAssert { .. } => &[C(F::X), C(F::Type)],
        NodeKind::CompositeLit { .. } => &[C(F::Type), C(F::Elts)],
        NodeKind::KeyValue { .. } => &[C(F::Key), C(F::Value)],
        NodeKind::FuncLit { .. } => &[C(F::Type), B, C(F::Body)],
        NodeKind::Field { .. } => &[C(F::Type)],
        NodeKind::ArrayType { .. } => &[C(F::Len), C(F::Elt)],
        NodeKind::SliceType { .. } | NodeKind::PointerType { .. } => &[C(F::Elt)],
        NodeKind::InterfaceType { .. } => &[C(F::Methods)],
        NodeKind::ChanType { .. } => &[C(F::Value)],
        NodeKind::FuncType { .. } => &[C(F::Params), C(F::Results)],
        NodeKind::MapType { .. } => &[C(F::Key), C(F::Value)],
        NodeKind::StructType { .. } => &[C(F::Fields)],
        NodeKind::Assign { .. } => &[C(F::Lhs), C(F::Rhs)],
        NodeKind::Block { .. } | NodeKind::IfCase { .. } => &[B, C(F::Body)],
        NodeKind::DeclStmt { .. } => &[C(F::Body)],
        NodeKind::Defer { .. } | NodeKind::Go { .. } => &[C(F::Call)],
        NodeKind::For { .. } => &[B, C(F::Init), C(F::Cond), C(F::Post), C(F::Body)],
        NodeKind::If { .. } => &[B, C(F::Init), C(F::Cond), C(F::Then), C(F::Else)],
        NodeKind::Range { .. } => &[B, C(F::X), C(F::Key), C(F::Value), C(F::Body)],
        NodeKind::Return { .. } => &[C(F::Results)],
        NodeKind::Select { .. } => &[C(F::Cases)],
        NodeKind::SelectCase { .. } => &[B, C(F::Comm), C(F::Body)],
        NodeKind::Send { .. } => &[C(F::Chan), C(F::Value)],
        NodeKind::Switch { .. } => &[B, C(F::Init), C(F::X), B2, C(F::Clauses)],
        NodeKind::SwitchClause { .. } => &[B, C(F::Cases), C(F::Body)],
        NodeKind::ValueDecl { .. } => &[C(F::Type), C(F::Values)],
        NodeKind::TypeDecl { .. } => &[C(F::Type)],
        NodeKind::FuncDecl { .. } => &[C(F::Recv), C(F::Type), B, C(F::Body)],
        NodeKind::File { .. } => &[B, C(F::Decls)],
        NodeKind::Package { .. } => &[B, C(F::Files)],
    }
}

/// Children stored at a field.
#[derive(Debug, Clone, Copy)]
pub enum Children<'a> {
    One(NodeId),
    Opt(Option<NodeId>),
    List(&'a [NodeId]),
    None,
}

pub fn children(kind: &NodeKind, field: Field) -> Children<'_> {
    use Children::{List, One, Opt};
    match (kind, field) {
        (NodeKind::Binary { left, .. }, F::Left) => One(*left),
        (NodeKind::Binary { right, .. }, F::Right) => One(*right),
        (NodeKind::Unary { x, .. }, F::X)
        | (NodeKind::Selector { x, .. }, F::X)
        | (NodeKind::Star { x }, F::X)
        | (NodeKind::Ref { x }, F::X)
        | (NodeKind::ExprStmt { x }, F::X)
        | (NodeKind::IncDec { x, .. }, F::X)
        | (NodeKind::Index { x, .. }, F::X)
        | (NodeKind::Slice { x, .. }, F::X)
        | (NodeKind::TypeAssert { x, .. }, F::X)
        | (NodeKind::Range { x, .. }, F::X) => One(*x),
        (NodeKind::Call { func, .. }, F::Func) => One(*func),
        (NodeKind::Call { args, .. }, F::Args) => List(args),
        (NodeKind::Index { index, .. }, F::Index) => One(*index),
        (NodeKind::Slice { low, .. }, F::Low) => Opt(*low),
        (NodeKind::Slice { high, .. }, F::High) => Opt(*high),
        (NodeKind::Slice { max, .. }, F::Max) => Opt(*max),
        (NodeKind::TypeAssert { ty, .. }, F::Type) | (NodeKind::CompositeLit { ty, .. }, F::Type) => {
            Opt(*ty)
        }
        (NodeKind::CompositeLit { elts, .. }, F::Elts) => List(elts),
        (NodeKind::KeyValue { key, .. }, F::Key) => Opt(*key),
        (NodeKind::KeyValue { value, .. }, F::Value) => One(*value),
        (NodeKind::FuncLit { ty, .. }, F::Type)
        | (NodeKind::Field { ty, .. }, F::Type)
        | (NodeKind::TypeDecl { ty, .. }, F::Type)
        | (NodeKind::FuncDecl { ty, .. }, F::Type) => One(*ty),
        (NodeKind::FuncLit { body, .. }, F::Body)
        | (NodeKind::Block { body }, F::Body)
        | (NodeKind::IfCase { body }, F::Body)
        | (NodeKind::DeclStmt { body }, F::Body)
        | (NodeKind::For { body, .. }, F::Body)
        | (NodeKind::Range { body, .. }, F::Body)
        | (NodeKind::SelectCase { body, .. }, F::Body)
        | (NodeKind::SwitchClause { body, .. }, F::Body) => List(body),
        (NodeKind::FuncDecl { body, .. }, F::Body) => match body {
            Some(b) => List(b),
            None => Children::None,
        },
        (NodeKind::ArrayType { len, .. }, F::Len) => Opt(*len),
        (NodeKind::ArrayType { elt, .. }, F::Elt)
        | (NodeKind::SliceType { elt, .. }, F::Elt)
        | (NodeKind::PointerType { elt }, F::Elt) => One(*elt),
        (NodeKind::InterfaceType { methods }, F::Methods) => List(methods),
        (NodeKind::ChanType { value, .. }, F::Value) => One(*value),
        (NodeKind::FuncType { params, .. }, F::Params) => List(params),
        (NodeKind::FuncType { results, .. }, F::Results) => List(results),
        (NodeKind::MapType { key, .. }, F::Key) => One(*key),
        (NodeKind::MapType { value, .. }, F::Value) => One(*value),
        (NodeKind::StructType { fields }, F::Fields) => List(fields),
        (NodeKind::Assign { lhs, .. }, F::Lhs) => List(lhs),
        (NodeKind::Assign { rhs, .. }, F::Rhs) => List(rhs),
        (NodeKind::Defer { call }, F::Call) | (NodeKind::Go { call }, F::Call) => One(*call),
        (NodeKind::For { init, .. }, F::Init)
        | (NodeKind::If { init, .. }, F::Init)
        | (NodeKind::Switch { init, .. }, F::Init) => Opt(*init),
        (NodeKind::For { cond, .. }, F::Cond) => Opt(*cond),
        (NodeKind::For { post, .. }, F::Post) => Opt(*post),
        (NodeKind::If { cond, .. }, F::Cond) => One(*cond),
        (NodeKind::If { then, .. }, F::Then) => One(*then),
        (NodeKind::If { els, .. }, F::Else) => One(*els),
        (NodeKind::Range { key, .. }, F::Key) => Opt(*key),
        (NodeKind::Range { value, .. }, F::Value) => Opt(*value),
        (NodeKind::Return { results }, F::Results) => List(results),
        (NodeKind::Select { cases }, F::Cases) => List(cases),
        (NodeKind::SelectCase { comm, .. }, F::Comm) => Opt(*comm),
        (NodeKind::Send { chan, .. }, F::Chan) => One(*chan),
        (NodeKind::Send { value, .. }, F::Value) => One(*value),
        (NodeKind::Switch { x, .. }, F::X) => Opt(*x),
        (NodeKind::Switch { clauses, .. }, F::Clauses) => List(clauses),
        (NodeKind::SwitchClause { cases, .. }, F::Cases) => List(cases),
        (NodeKind::ValueDecl { ty, .. }, F::Type) => Opt(*ty),
        (NodeKind::ValueDecl { values, .. }, F::Values) => List(values),
        (NodeKind::FuncDecl { recv, .. }, F::Recv) => Opt(*recv),
        (NodeKind::File { decls, .. }, F::Decls) => List(decls),
        (NodeKind::Package { files, .. }, F::Files) => List(files),
        _ => Children::None,
    }
}

/// Number of children currently stored at `field`.
pub fn field_len(kind: &NodeKind, field: Field) -> usize {
    match children(kind, field) {
        Children::One(_) => 1,
        Children::Opt(o) => usize::from(o.is_some()),
        Children::List(l) => l.len(),
        Children::None => 0,
    }
}

pub fn get_child(kind: &NodeKind, field: Field, index: usize) -> Option<NodeId> {
    match children(kind, field) {
        Children::One(id) if index == 0 => Some(id),
        Children::Opt(o) if index == 0 => o,
        Children::List(l) => l.get(index).copied(),
        _ => None,
    }
}

/// Replaces the child at `field[index]`. Returns false if there is no such
/// child.
pub fn set_child(kind: &mut NodeKind, field: Field, index: usize, new: NodeId) -> bool {
    match child_slot(kind, field, index) {
        Some(slot) => {
            *slot = new;
            true
        }
        None => false,
    }
}

fn child_slot(kind: &mut NodeKind, field: Field, index: usize) -> Option<&mut NodeId> {
    if index > 0 && !matches!(children(kind, field), Children::List(_)) {
        return None;
    }
    match (kind, field) {
        (NodeKind::Binary { left, .. }, F::Left) => Some(left),
        (NodeKind::Binary { right, .. }, F::Right) => Some(right),
        (NodeKind::Unary { x, .. }, F::X)
        | (NodeKind::Selector { x, .. }, F::X)
        | (NodeKind::Star { x }, F::X)
        | (NodeKind::Ref { x }, F::X)
        | (NodeKind::ExprStmt { x }, F::X)
        | (NodeKind::IncDec { x, .. }, F::X)
        | (NodeKind::Index { x, .. }, F::X)
        | (NodeKind::Slice { x, .. }, F::X)
        | (NodeKind::TypeAssert { x, .. }, F::X)
        | (NodeKind::Range { x, .. }, F::X) => Some(x),
        (NodeKind::Call { func, .. }, F::Func) => Some(func),
        (NodeKind::Call { args, .. }, F::Args) => args.get_mut(index),
        (NodeKind::Index { index: i, .. }, F::Index) => Some(i),
        (NodeKind::Slice { low, .. }, F::Low) => low.as_mut(),
        (NodeKind::Slice { high, .. }, F::High) => high.as_mut(),
        (NodeKind::Slice { max, .. }, F::Max) => max.as_mut(),
        (NodeKind::TypeAssert { ty, .. }, F::Type) | (NodeKind::CompositeLit { ty, .. }, F::Type) => {
            ty.as_mut()
        }
        (NodeKind::CompositeLit { elts, .. }, F::Elts) => elts.get_mut(index),
        (NodeKind::KeyValue { key, .. }, F::Key) => key.as_mut(),
        (NodeKind::KeyValue { value, .. }, F::Value) => Some(value),
        (NodeKind::FuncLit { ty, .. }, F::Type)
        | (NodeKind::Field { ty, .. }, F::Type)
        | (NodeKind::TypeDecl { ty, .. }, F::Type)
        | (NodeKind::FuncDecl { ty, .. }, F::Type) => Some(ty),
        (NodeKind::FuncLit { body, .. }, F::Body)
        | (NodeKind::Block { body }, F::Body)
        | (NodeKind::IfCase { body }, F::Body)
        | (NodeKind::DeclStmt { body }, F::Body)
        | (NodeKind::For { body, .. }, F::Body)
        | (NodeKind::Range { body, .. }, F::Body)
        | (NodeKind::SelectCase { body, .. }, F::Body)
        | (NodeKind::SwitchClause { body, .. }, F::Body) => body.get_mut(index),
        (NodeKind::FuncDecl { body, .. }, F::Body) => body.as_mut().and_then(|b| b.get_mut(index)),
        (NodeKind::ArrayType { len, .. }, F::Len) => len.as_mut(),
        (NodeKind::ArrayType { elt, .. }, F::Elt)
        | (NodeKind::SliceType { elt, .. }, F::Elt)
        | (NodeKind::PointerType { elt }, F::Elt) => Some(elt),
        (NodeKind::InterfaceType { methods }, F::Methods) => methods.get_mut(index),
        (NodeKind::ChanType { value, .. }, F::Value) => Some(value),
        (NodeKind::FuncType { params, .. }, F::Params) => params.get_mut(index),
        (NodeKind::FuncType { results, .. }, F::Results) => results.get_mut(index),
        (NodeKind::MapType { key, .. }, F::Key) => Some(key),
        (NodeKind::MapType { value, .. }, F::Value) => Some(value),
        (NodeKind::StructType { fields }, F::Fields) => fields.get_mut(index),
        (NodeKind::Assign { lhs, .. }, F::Lhs) => lhs.get_mut(index),
        (NodeKind::Assign { rhs, .. }, F::Rhs) => rhs.get_mut(index),
        (NodeKind::Defer { call }, F::Call) | (NodeKind::Go { call }, F::Call) => Some(call),
        (NodeKind::For { init, .. }, F::Init)
        | (NodeKind::If { init, .. }, F::Init)
        | (NodeKind::Switch { init, .. }, F::Init) => init.as_mut(),
        (NodeKind::For { cond, .. }, F::Cond) => cond.as_mut(),
        (NodeKind::For { post, .. }, F::Post) => post.as_mut(),
        (NodeKind::If { cond, .. }, F::Cond) => Some(cond),
        (NodeKind::If { then, .. }, F::Then) => Some(then),
        (NodeKind::If { els, .. }, F::Else) => Some(els),
        (NodeKind::Range { key, .. }, F::Key) => key.as_mut(),
        (NodeKind::Range { value, .. }, F::Value) => value.as_mut(),
        (NodeKind::Return { results }, F::Results) => results.get_mut(index),
        (NodeKind::Select { cases }, F::Cases) => cases.get_mut(index),
        (NodeKind::SelectCase { comm, .. }, F::Comm) => comm.as_mut(),
        (NodeKind::Send { chan, .. }, F::Chan) => Some(chan),
        (NodeKind::Send { value, .. }, F::Value) => Some(value),
        (NodeKind::Switch { x, .. }, F::X) => x.as_mut(),
        (NodeKind::Switch { clauses, .. }, F::Clauses) => clauses.get_mut(index),
        (NodeKind::SwitchClause { cases, .. }, F::Cases) => cases.get_mut(index),
        (NodeKind::ValueDecl { ty, .. }, F::Type) => ty.as_mut(),
        (NodeKind::ValueDecl { values, .. }, F::Values) => values.get_mut(index),
        (NodeKind::FuncDecl { recv, .. }, F::Recv) => recv.as_mut(),
        (NodeKind::File { decls, .. }, F::Decls) => decls.get_mut(index),
        (NodeKind::Package { files, .. }, F::Files) => files.get_mut(index),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, BinaryOp, Span};

    #[test]
    fn test_layout_matches_children() {
        let mut ast = Ast::new();
        let a = ast.alloc(NodeKind::Empty, Span::default());
        let b = ast.alloc(NodeKind::Empty, Span::default());
        let mut kind = NodeKind::Binary {
            op: BinaryOp::Add,
            left: a,
            right: b,
        };
        assert_eq!(layout(&kind), &[C(F::Left), C(F::Right)]);
        assert_eq!(get_child(&kind, F::Right, 0), Some(b));
        assert!(set_child(&mut kind, F::Right, 0, a));
        assert_eq!(get_child(&kind, F::Right, 0), Some(a));
        assert!(!set_child(&mut kind, F::Right, 1, a));
    }

    #[test]
    fn test_optional_children() {
        let mut ast = Ast::new();
        let x = ast.alloc(NodeKind::Empty, Span::default());
        let kind = NodeKind::Slice {
            x,
            low: None,
            high: Some(x),
            max: None,
        };
        assert_eq!(field_len(&kind, F::Low), 0);
        assert_eq!(field_len(&kind, F::High), 1);
        assert_eq!(get_child(&kind, F::Low, 0), None);
    }

    #[test]
    fn test_switch_has_block2_stage() {
        let kind = NodeKind::Switch {
            init: None,
            x: None,
            is_type_switch: false,
            var_name: None,
            clauses: vec![],
        };
        assert!(layout(&kind).contains(&B2));
    }
}
