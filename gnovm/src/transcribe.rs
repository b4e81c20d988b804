//! Staged tree walker with in-place node replacement
//!
//! [`transcribe`] visits a subtree depth first. Every node is offered to the
//! transform at [`Stage::Enter`], block nodes additionally at
//! [`Stage::Block`] (and `Switch` at [`Stage::Block2`]) before their scoped
//! children, and every node again at [`Stage::Leave`]. The id returned by
//! the transform replaces the visited node in its parent.

use crate::ast::{Ast, Field, NodeId, Visit, field_len, get_child, layout, set_child};

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Enter,
    Block,
    Block2,
    Leave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Skip the remaining stages and children of this node.
    Skip,
    /// Abort the whole walk.
    Exit,
}

/// Callback of [`transcribe`].
pub trait Transform {
    type Error;

    /// `ancestors` lists the nodes above `node`, outermost first; `field`
    /// and `index` give the position of `node` in its parent.
    fn transform(
        &mut self,
        ast: &mut Ast,
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
        stage: Stage,
    ) -> Result<(NodeId, Control), Self::Error>;
}

/// Walks the subtree at `root` and returns the (possibly replaced) root.
pub fn transcribe<T: Transform>(ast: &mut Ast, root: NodeId, t: &mut T) -> Result<NodeId, T::Error> {
    let mut ancestors = Vec::new();
    let (id, _) = walk(ast, &mut ancestors, None, 0, root, t)?;
    Ok(id)
}

fn walk<T: Transform>(
    ast: &mut Ast,
    ancestors: &mut Vec<NodeId>,
    field: Option<Field>,
    index: usize,
    node: NodeId,
    t: &mut T,
) -> Result<(NodeId, Control), T::Error> {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || {
        walk_node(ast, ancestors, field, index, node, t)
    })
}

fn walk_node<T: Transform>(
    ast: &mut Ast,
    ancestors: &mut Vec<NodeId>,
    field: Option<Field>,
    index: usize,
    node: NodeId,
    t: &mut T,
) -> Result<(NodeId, Control), T::Error> {
    let (mut node, c) = t.transform(ast, ancestors, field, index, node, Stage::Enter)?;
    match c {
        Control::Continue => {}
        Control::Skip => return Ok((node, Control::Continue)),
        Control::Exit => return Ok((node, Control::Exit)),
    }

    ancestors.push(node);
    for visit in layout(ast.kind(node)) {
        match *visit {
            Visit::Block | Visit::Block2 => {
                let stage = if *visit == Visit::Block {
                    Stage::Block
                } else {
                    Stage::Block2
                };
                let depth = ancestors.len() - 1;
                let (n, c) = t.transform(ast, &ancestors[..depth], field, index, node, stage)?;
                node = n;
                ancestors[depth] = n;
                match c {
                    Control::Continue => {}
                    Control::Skip => {
                        ancestors.pop();
                        return Ok((node, Control::Continue));
                    }
                    Control::Exit => {
                        ancestors.pop();
                        return Ok((node, Control::Exit));
                    }
                }
            }
            Visit::Child(f) => {
                // children may be appended while walking a body
                let mut i = 0;
                while i < field_len(ast.kind(node), f) {
                    let Some(child) = get_child(ast.kind(node), f, i) else {
                        break;
                    };
                    let (new, c) = walk(ast, ancestors, Some(f), i, child, t)?;
                    if new != child {
                        set_child(ast.kind_mut(node), f, i, new);
                    }
                    if c == Control::Exit {
                        ancestors.pop();
                        return Ok((node, Control::Exit));
                    }
                    i += 1;
                }
            }
        }
    }
    ancestors.pop();

    let (node, c) = t.transform(ast, ancestors, field, index, node, Stage::Leave)?;
    let c = if c == Control::Exit {
        Control::Exit
    } else {
        Control::Continue
    };
    Ok((node, c))
}

/// A transform that also sees the stack of enclosing block nodes.
pub trait ScopedTransform {
    type Error;

    /// `blocks` lists the enclosing block nodes, innermost last. At the
    /// Block and Block2 stages it already ends with `node`.
    #[allow(clippy::too_many_arguments)]
    fn transform(
        &mut self,
        ast: &mut Ast,
        blocks: &[NodeId],
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
        stage: Stage,
    ) -> Result<(NodeId, Control), Self::Error>;
}

/// Adapts a [`ScopedTransform`] to [`Transform`], keeping the block stack
/// balanced: a block node is pushed at its Block stage and popped when it
/// is skipped, exited, fails or is left.
pub struct Scoped<'a, T> {
    pub inner: &'a mut T,
    pub blocks: Vec<NodeId>,
    base: usize,
}

impl<'a, T: ScopedTransform> Scoped<'a, T> {
    /// `blocks` are the block nodes enclosing the walk's root.
    pub fn new(inner: &'a mut T, blocks: Vec<NodeId>) -> Self {
        let base = blocks.len();
        Self { inner, blocks, base }
    }

    /// Walks `root` and restores the block stack, even when a node below a
    /// block exits the walk or fails before that block is left.
    pub fn transcribe(&mut self, ast: &mut Ast, root: NodeId) -> Result<NodeId, T::Error> {
        let result = transcribe(ast, root, self);
        self.blocks.truncate(self.base);
        result
    }

    fn pop_if_top(&mut self, node: NodeId) {
        if self.blocks.len() > self.base && self.blocks.last() == Some(&node) {
            self.blocks.pop();
        }
    }
}

impl<T: ScopedTransform> Transform for Scoped<'_, T> {
    type Error = T::Error;

    fn transform(
        &mut self,
        ast: &mut Ast,
        ancestors: &[NodeId],
        field: Option<Field>,
        index: usize,
        node: NodeId,
        stage: Stage,
    ) -> Result<(NodeId, Control), Self::Error> {
        match stage {
            Stage::Block | Stage::Block2 => {
                if stage == Stage::Block {
                    self.blocks.push(node);
                }
                let result = self
                    .inner
                    .transform(ast, &self.blocks, ancestors, field, index, node, stage);
                match result {
                    Ok((n, Control::Continue)) => {
                        if let Some(top) = self.blocks.last_mut()
                            && *top == node
                        {
                            *top = n;
                        }
                        Ok((n, Control::Continue))
                    }
                    // the walk never reaches Leave for this node
                    Ok((n, c)) => {
                        self.pop_if_top(node);
                        Ok((n, c))
                    }
                    Err(e) => {
                        self.pop_if_top(node);
                        Err(e)
                    }
                }
            }
            Stage::Enter => self
                .inner
                .transform(ast, &self.blocks, ancestors, field, index, node, stage),
            Stage::Leave => {
                let result = self
                    .inner
                    .transform(ast, &self.blocks, ancestors, field, index, node, stage);
                self.pop_if_top(node);
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, NodeKind, Span, render};

    fn name(ast: &mut Ast, n: &str) -> NodeId {
        ast.alloc(
            NodeKind::Name {
                name: n.to_string(),
                path: None,
            },
            Span::default(),
        )
    }

    fn expr_stmt(ast: &mut Ast, n: &str) -> NodeId {
        let x = name(ast, n);
        ast.alloc(NodeKind::ExprStmt { x }, Span::default())
    }

    /// Records every callback as "Stage:Kind".
    struct Recorder {
        log: Vec<String>,
    }

    impl Transform for Recorder {
        type Error = String;

        fn transform(
            &mut self,
            ast: &mut Ast,
            _ancestors: &[NodeId],
            _field: Option<Field>,
            _index: usize,
            node: NodeId,
            stage: Stage,
        ) -> Result<(NodeId, Control), String> {
            self.log.push(format!("{stage:?}:{}", ast.kind(node).name()));
            Ok((node, Control::Continue))
        }
    }

    // ====================================================================
    // Visiting order
    // ====================================================================

    #[test]
    fn test_binary_visits_left_then_right() {
        let mut ast = Ast::new();
        let l = name(&mut ast, "a");
        let r = name(&mut ast, "b");
        let bin = ast.alloc(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left: l,
                right: r,
            },
            Span::default(),
        );
        let mut rec = Recorder { log: vec![] };
        transcribe(&mut ast, bin, &mut rec).unwrap();
        assert_eq!(
            rec.log,
            vec![
                "Enter:BinaryExpr",
                "Enter:NameExpr",
                "Leave:NameExpr",
                "Enter:NameExpr",
                "Leave:NameExpr",
                "Leave:BinaryExpr",
            ]
        );
    }

    #[test]
    fn test_switch_has_block2_before_clauses() {
        let mut ast = Ast::new();
        let x = name(&mut ast, "x");
        let body = expr_stmt(&mut ast, "y");
        let clause = ast.alloc(
            NodeKind::SwitchClause {
                cases: vec![],
                body: vec![body],
            },
            Span::default(),
        );
        let sw = ast.alloc(
            NodeKind::Switch {
                init: None,
                x: Some(x),
                is_type_switch: false,
                var_name: None,
                clauses: vec![clause],
            },
            Span::default(),
        );
        let mut rec = Recorder { log: vec![] };
        transcribe(&mut ast, sw, &mut rec).unwrap();
        let pos = |s: &str| rec.log.iter().position(|l| l == s).unwrap();
        assert!(pos("Block:SwitchStmt") < pos("Enter:NameExpr"));
        assert!(pos("Block2:SwitchStmt") < pos("Enter:SwitchClauseStmt"));
        assert!(pos("Block:SwitchClauseStmt") < pos("Enter:ExprStmt"));
    }

    // ====================================================================
    // Replacement and control
    // ====================================================================

    /// Replaces every name `a` with a fresh name `z`.
    struct Renamer;

    impl Transform for Renamer {
        type Error = String;

        fn transform(
            &mut self,
            ast: &mut Ast,
            _ancestors: &[NodeId],
            _field: Option<Field>,
            _index: usize,
            node: NodeId,
            stage: Stage,
        ) -> Result<(NodeId, Control), String> {
            if stage == Stage::Leave
                && let NodeKind::Name { name: n, .. } = ast.kind(node)
                && n == "a"
            {
                return Ok((name(ast, "z"), Control::Continue));
            }
            Ok((node, Control::Continue))
        }
    }

    #[test]
    fn test_replacement_is_written_back() {
        let mut ast = Ast::new();
        let l = name(&mut ast, "a");
        let r = name(&mut ast, "a");
        let bin = ast.alloc(
            NodeKind::Binary {
                op: BinaryOp::Mul,
                left: l,
                right: r,
            },
            Span::default(),
        );
        let root = transcribe(&mut ast, bin, &mut Renamer).unwrap();
        assert_eq!(root, bin);
        assert_eq!(render(&ast, bin), "z * z");
    }

    struct SkipBlocks {
        seen: Vec<String>,
    }

    impl Transform for SkipBlocks {
        type Error = String;

        fn transform(
            &mut self,
            ast: &mut Ast,
            _ancestors: &[NodeId],
            _field: Option<Field>,
            _index: usize,
            node: NodeId,
            stage: Stage,
        ) -> Result<(NodeId, Control), String> {
            if let NodeKind::Name { name, .. } = ast.kind(node) {
                self.seen.push(name.clone());
            }
            let c = if stage == Stage::Block {
                Control::Skip
            } else {
                Control::Continue
            };
            Ok((node, c))
        }
    }

    #[test]
    fn test_skip_at_block_stage_skips_body() {
        let mut ast = Ast::new();
        let inner = expr_stmt(&mut ast, "hidden");
        let blk = ast.alloc(NodeKind::Block { body: vec![inner] }, Span::default());
        let mut t = SkipBlocks { seen: vec![] };
        transcribe(&mut ast, blk, &mut t).unwrap();
        assert!(t.seen.is_empty());
    }

    struct ExitAt {
        target: String,
        seen: Vec<String>,
    }

    impl Transform for ExitAt {
        type Error = String;

        fn transform(
            &mut self,
            ast: &mut Ast,
            _ancestors: &[NodeId],
            _field: Option<Field>,
            _index: usize,
            node: NodeId,
            stage: Stage,
        ) -> Result<(NodeId, Control), String> {
            if stage == Stage::Enter
                && let NodeKind::Name { name, .. } = ast.kind(node)
            {
                self.seen.push(name.clone());
                if *name == self.target {
                    return Ok((node, Control::Exit));
                }
            }
            Ok((node, Control::Continue))
        }
    }

    #[test]
    fn test_exit_aborts_walk() {
        let mut ast = Ast::new();
        let a = expr_stmt(&mut ast, "a");
        let b = expr_stmt(&mut ast, "b");
        let c = expr_stmt(&mut ast, "c");
        let blk = ast.alloc(NodeKind::Block { body: vec![a, b, c] }, Span::default());
        let mut t = ExitAt {
            target: "b".into(),
            seen: vec![],
        };
        transcribe(&mut ast, blk, &mut t).unwrap();
        assert_eq!(t.seen, vec!["a", "b"]);
    }

    /// Appends a statement to the block while the first one is visited.
    struct Appender {
        done: bool,
        visited: usize,
    }

    impl Transform for Appender {
        type Error = String;

        fn transform(
            &mut self,
            ast: &mut Ast,
            ancestors: &[NodeId],
            _field: Option<Field>,
            _index: usize,
            node: NodeId,
            stage: Stage,
        ) -> Result<(NodeId, Control), String> {
            if stage == Stage::Enter && matches!(ast.kind(node), NodeKind::ExprStmt { .. }) {
                self.visited += 1;
                if !self.done {
                    self.done = true;
                    let extra = expr_stmt(ast, "late");
                    let parent = *ancestors.last().ok_or("no parent")?;
                    if let NodeKind::Block { body } = ast.kind_mut(parent) {
                        body.push(extra);
                    }
                }
            }
            Ok((node, Control::Continue))
        }
    }

    #[test]
    fn test_body_grows_during_walk() {
        let mut ast = Ast::new();
        let a = expr_stmt(&mut ast, "a");
        let blk = ast.alloc(NodeKind::Block { body: vec![a] }, Span::default());
        let mut t = Appender {
            done: false,
            visited: 0,
        };
        transcribe(&mut ast, blk, &mut t).unwrap();
        assert_eq!(t.visited, 2);
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let mut ast = Ast::new();
        let mut cur = name(&mut ast, "x");
        for _ in 0..20_000 {
            cur = ast.alloc(NodeKind::Star { x: cur }, Span::default());
        }
        let mut rec = Recorder { log: vec![] };
        transcribe(&mut ast, cur, &mut rec).unwrap();
        assert_eq!(rec.log.len(), 2 * 20_001);
    }

    // ====================================================================
    // Scope stack balance
    // ====================================================================

    /// Decides the control of every block stage from a tape and checks
    /// that the innermost block is the node being visited.
    struct Balance {
        tape: Vec<Control>,
        pos: usize,
        max_depth: usize,
        errors: Vec<String>,
        fail_at_block: bool,
    }

    impl Balance {
        fn new(tape: Vec<Control>) -> Self {
            Self {
                tape,
                pos: 0,
                max_depth: 0,
                errors: vec![],
                fail_at_block: false,
            }
        }

        fn next_control(&mut self) -> Control {
            if self.tape.is_empty() {
                return Control::Continue;
            }
            let c = self.tape[self.pos % self.tape.len()];
            self.pos += 1;
            c
        }
    }

    impl ScopedTransform for Balance {
        type Error = String;

        fn transform(
            &mut self,
            ast: &mut Ast,
            blocks: &[NodeId],
            _ancestors: &[NodeId],
            _field: Option<Field>,
            _index: usize,
            node: NodeId,
            stage: Stage,
        ) -> Result<(NodeId, Control), String> {
            self.max_depth = self.max_depth.max(blocks.len());
            match stage {
                Stage::Block | Stage::Block2 => {
                    if blocks.last() != Some(&node) {
                        self.errors.push(format!("{stage:?}: top is not the node"));
                    }
                    if self.fail_at_block {
                        return Err("bad block".into());
                    }
                    Ok((node, self.next_control()))
                }
                Stage::Leave if ast.kind(node).is_block_node() => {
                    if blocks.last() != Some(&node) {
                        self.errors.push("leave: top is not the node".into());
                    }
                    Ok((node, Control::Continue))
                }
                _ => Ok((node, Control::Continue)),
            }
        }
    }

    #[test]
    fn test_exit_at_block_stage_pops_block() {
        let mut ast = Ast::new();
        let inner = expr_stmt(&mut ast, "x");
        let blk = ast.alloc(NodeKind::Block { body: vec![inner] }, Span::default());
        let mut balance = Balance::new(vec![Control::Exit]);
        let mut scoped = Scoped::new(&mut balance, vec![]);
        transcribe(&mut ast, blk, &mut scoped).unwrap();
        assert!(scoped.blocks.is_empty());
    }

    #[test]
    fn test_error_at_block_stage_pops_block() {
        let mut ast = Ast::new();
        let blk = ast.alloc(NodeKind::Block { body: vec![] }, Span::default());
        let outer = ast.alloc(NodeKind::Block { body: vec![] }, Span::default());
        let mut balance = Balance::new(vec![]);
        balance.fail_at_block = true;
        let mut scoped = Scoped::new(&mut balance, vec![outer]);
        let err = transcribe(&mut ast, blk, &mut scoped).unwrap_err();
        assert_eq!(err, "bad block");
        assert_eq!(scoped.blocks, vec![outer]);
    }

    #[test]
    fn test_exit_below_block_restores_stack() {
        let mut ast = Ast::new();
        let inner = ast.alloc(NodeKind::Block { body: vec![] }, Span::default());
        let blk = ast.alloc(NodeKind::Block { body: vec![inner] }, Span::default());
        // the outer block continues, the inner one exits the walk
        let mut balance = Balance::new(vec![Control::Continue, Control::Exit]);
        let mut scoped = Scoped::new(&mut balance, vec![]);
        scoped.transcribe(&mut ast, blk).unwrap();
        assert!(scoped.blocks.is_empty());
        assert!(balance.errors.is_empty(), "{:?}", balance.errors);
    }

    #[derive(Debug, Clone)]
    enum Shape {
        Leaf,
        Block(Vec<Shape>),
        Switch(Vec<Vec<Shape>>),
        For(Vec<Shape>),
    }

    fn build(ast: &mut Ast, shape: &Shape) -> NodeId {
        match shape {
            Shape::Leaf => expr_stmt(ast, "x"),
            Shape::Block(body) => {
                let body = body.iter().map(|s| build(ast, s)).collect();
                ast.alloc(NodeKind::Block { body }, Span::default())
            }
            Shape::For(body) => {
                let body = body.iter().map(|s| build(ast, s)).collect();
                ast.alloc(
                    NodeKind::For {
                        init: None,
                        cond: None,
                        post: None,
                        body,
                    },
                    Span::default(),
                )
            }
            Shape::Switch(clauses) => {
                let clauses = clauses
                    .iter()
                    .map(|body| {
                        let body = body.iter().map(|s| build(ast, s)).collect();
                        ast.alloc(NodeKind::SwitchClause { cases: vec![], body }, Span::default())
                    })
                    .collect();
                ast.alloc(
                    NodeKind::Switch {
                        init: None,
                        x: None,
                        is_type_switch: false,
                        var_name: None,
                        clauses,
                    },
                    Span::default(),
                )
            }
        }
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        fn shape() -> impl Strategy<Value = Shape> {
            let leaf = Just(Shape::Leaf);
            leaf.prop_recursive(6, 64, 4, |inner| {
                prop_oneof![
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::Block),
                    prop::collection::vec(inner.clone(), 0..4).prop_map(Shape::For),
                    prop::collection::vec(prop::collection::vec(inner, 0..3), 0..3)
                        .prop_map(Shape::Switch),
                ]
            })
        }

        fn control() -> impl Strategy<Value = Control> {
            prop_oneof![
                6 => Just(Control::Continue),
                3 => Just(Control::Skip),
                1 => Just(Control::Exit),
            ]
        }

        proptest! {
            #[test]
            fn prop_scope_stack_balanced(s in shape(), tape in prop::collection::vec(control(), 0..16)) {
                let mut ast = Ast::new();
                let root = build(&mut ast, &s);
                let mut balance = Balance::new(tape);
                let mut scoped = Scoped::new(&mut balance, vec![]);
                scoped.transcribe(&mut ast, root).unwrap();
                prop_assert!(scoped.blocks.is_empty());
                prop_assert!(balance.errors.is_empty(), "{:?}", balance.errors);
            }
        }
    }
}
