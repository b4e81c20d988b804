//! Source-like rendering of nodes, used in diagnostics

use super::{Ast, ChanDir, IncDecOp, NodeId, NodeKind};

/// Renders `id` as source text. Folded constants and resolved types render
/// as the expression they replaced.
pub fn render(ast: &Ast, id: NodeId) -> String {
    let mut out = String::new();
    write_node(ast, id, &mut out);
    out
}

/// Renders only the header of block statements, which is what a block stack
/// trace shows.
pub fn render_header(ast: &Ast, id: NodeId) -> String {
    let mut out = String::new();
    match ast.kind(id) {
        NodeKind::FuncDecl { recv, name, ty, .. } => {
            out.push_str("func ");
            if let Some(r) = recv {
                out.push('(');
                write_node(ast, *r, &mut out);
                out.push_str(") ");
            }
            out.push_str(name);
            write_signature(ast, *ty, &mut out);
        }
        NodeKind::FuncLit { ty, .. } => {
            out.push_str("func");
            write_signature(ast, *ty, &mut out);
        }
        NodeKind::For { .. } => out.push_str("for"),
        NodeKind::Range { x, .. } => {
            out.push_str("range ");
            write_node(ast, *x, &mut out);
        }
        NodeKind::If { cond, .. } => {
            out.push_str("if ");
            write_node(ast, *cond, &mut out);
        }
        NodeKind::IfCase { .. } => out.push_str("if case"),
        NodeKind::Switch { .. } => out.push_str("switch"),
        NodeKind::SwitchClause { cases, .. } => {
            if cases.is_empty() {
                out.push_str("default");
            } else {
                out.push_str("case ");
                write_list(ast, cases, ", ", &mut out);
            }
        }
        NodeKind::File { name, .. } => out.push_str(&format!("file {name}")),
        NodeKind::Package { path, .. } => out.push_str(&format!("package {path}")),
        NodeKind::Block { .. } => out.push_str("{ ... }"),
        _ => write_node(ast, id, &mut out),
    }
    out
}

fn write_list(ast: &Ast, ids: &[NodeId], sep: &str, out: &mut String) {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        write_node(ast, *id, out);
    }
}

fn write_signature(ast: &Ast, ty: NodeId, out: &mut String) {
    if let NodeKind::FuncType { params, results } = ast.kind(ty) {
        out.push('(');
        write_list(ast, params, ", ", out);
        out.push(')');
        match results.len() {
            0 => {}
            1 if matches!(ast.kind(results[0]), NodeKind::Field { name: None, .. }) => {
                out.push(' ');
                write_node(ast, results[0], out);
            }
            _ => {
                out.push_str(" (");
                write_list(ast, results, ", ", out);
                out.push(')');
            }
        }
    } else {
        write_node(ast, ty, out);
    }
}

fn write_body(ast: &Ast, body: &[NodeId], out: &mut String) {
    out.push_str("{ ");
    write_list(ast, body, "; ", out);
    if !body.is_empty() {
        out.push(' ');
    }
    out.push('}');
}

fn write_node(ast: &Ast, id: NodeId, out: &mut String) {
    if let Some(label) = ast.label(id) {
        out.push_str(label);
        out.push_str(": ");
    }
    match ast.kind(id) {
        NodeKind::Name { name, .. } => out.push_str(name),
        NodeKind::BasicLit { value, .. } => out.push_str(value),
        NodeKind::Binary { op, left, right } => {
            write_node(ast, *left, out);
            out.push_str(&format!(" {op} "));
            write_node(ast, *right, out);
        }
        NodeKind::Unary { op, x } => {
            out.push_str(&op.to_string());
            write_node(ast, *x, out);
        }
        NodeKind::Call { func, args, varg, .. } => {
            write_node(ast, *func, out);
            out.push('(');
            write_list(ast, args, ", ", out);
            if *varg {
                out.push_str("...");
            }
            out.push(')');
        }
        NodeKind::Index { x, index, .. } => {
            write_node(ast, *x, out);
            out.push('[');
            write_node(ast, *index, out);
            out.push(']');
        }
        NodeKind::Selector { x, sel, .. } => {
            write_node(ast, *x, out);
            out.push('.');
            out.push_str(sel);
        }
        NodeKind::Slice { x, low, high, max } => {
            write_node(ast, *x, out);
            out.push('[');
            if let Some(l) = low {
                write_node(ast, *l, out);
            }
            out.push(':');
            if let Some(h) = high {
                write_node(ast, *h, out);
            }
            if let Some(m) = max {
                out.push(':');
                write_node(ast, *m, out);
            }
            out.push(']');
        }
        NodeKind::Star { x } => {
            out.push('*');
            write_node(ast, *x, out);
        }
        NodeKind::Ref { x } => {
            out.push('&');
            write_node(ast, *x, out);
        }
        NodeKind::TypeAssert { x, ty, .. } => {
            write_node(ast, *x, out);
            out.push_str(".(");
            match ty {
                Some(t) => write_node(ast, *t, out),
                None => out.push_str("type"),
            }
            out.push(')');
        }
        NodeKind::CompositeLit { ty, elts } => {
            if let Some(t) = ty {
                write_node(ast, *t, out);
            }
            out.push('{');
            write_list(ast, elts, ", ", out);
            out.push('}');
        }
        NodeKind::KeyValue { key, value } => {
            if let Some(k) = key {
                write_node(ast, *k, out);
                out.push_str(": ");
            }
            write_node(ast, *value, out);
        }
        NodeKind::FuncLit { ty, body, .. } => {
            out.push_str("func");
            write_signature(ast, *ty, out);
            out.push(' ');
            write_body(ast, body, out);
        }
        NodeKind::Const { source, .. } | NodeKind::ConstType { source, .. } => {
            write_node(ast, *source, out)
        }
        NodeKind::Field { name, ty, .. } => {
            if let Some(n) = name {
                out.push_str(n);
                out.push(' ');
            }
            write_node(ast, *ty, out);
        }
        NodeKind::ArrayType { len, elt } => {
            out.push('[');
            match len {
                Some(l) => write_node(ast, *l, out),
                None => out.push_str("..."),
            }
            out.push(']');
            write_node(ast, *elt, out);
        }
        NodeKind::SliceType { elt, vrd } => {
            out.push_str(if *vrd { "..." } else { "[]" });
            write_node(ast, *elt, out);
        }
        NodeKind::PointerType { elt } => {
            out.push('*');
            write_node(ast, *elt, out);
        }
        NodeKind::InterfaceType { methods } => {
            out.push_str("interface{");
            for (i, m) in methods.iter().enumerate() {
                if i > 0 {
                    out.push_str("; ");
                }
                match ast.kind(*m) {
                    NodeKind::Field {
                        name: Some(n), ty, ..
                    } => {
                        out.push_str(n);
                        write_signature(ast, *ty, out);
                    }
                    _ => write_node(ast, *m, out),
                }
            }
            out.push('}');
        }
        NodeKind::ChanType { dir, value } => {
            out.push_str(match dir {
                ChanDir::Both => "chan ",
                ChanDir::Send => "chan<- ",
                ChanDir::Recv => "<-chan ",
            });
            write_node(ast, *value, out);
        }
        NodeKind::FuncType { .. } => {
            out.push_str("func");
            write_signature(ast, id, out);
        }
        NodeKind::MapType { key, value } => {
            out.push_str("map[");
            write_node(ast, *key, out);
            out.push(']');
            write_node(ast, *value, out);
        }
        NodeKind::StructType { fields } => {
            out.push_str("struct{");
            write_list(ast, fields, "; ", out);
            out.push('}');
        }
        NodeKind::Assign { lhs, op, rhs } => {
            write_list(ast, lhs, ", ", out);
            out.push_str(&format!(" {op} "));
            write_list(ast, rhs, ", ", out);
        }
        NodeKind::Block { body } | NodeKind::IfCase { body } => write_body(ast, body, out),
        NodeKind::Branch { op, label, .. } => {
            out.push_str(&op.to_string());
            if let Some(l) = label {
                out.push(' ');
                out.push_str(l);
            }
        }
        NodeKind::DeclStmt { body } => write_list(ast, body, "; ", out),
        NodeKind::Defer { call } => {
            out.push_str("defer ");
            write_node(ast, *call, out);
        }
        NodeKind::Go { call } => {
            out.push_str("go ");
            write_node(ast, *call, out);
        }
        NodeKind::ExprStmt { x } => write_node(ast, *x, out),
        NodeKind::For {
            init,
            cond,
            post,
            body,
        } => {
            out.push_str("for ");
            if init.is_some() || post.is_some() {
                if let Some(i) = init {
                    write_node(ast, *i, out);
                }
                out.push_str("; ");
                if let Some(c) = cond {
                    write_node(ast, *c, out);
                }
                out.push_str("; ");
                if let Some(p) = post {
                    write_node(ast, *p, out);
                }
                out.push(' ');
            } else if let Some(c) = cond {
                write_node(ast, *c, out);
                out.push(' ');
            }
            write_body(ast, body, out);
        }
        NodeKind::If {
            init,
            cond,
            then,
            els,
        } => {
            out.push_str("if ");
            if let Some(i) = init {
                write_node(ast, *i, out);
                out.push_str("; ");
            }
            write_node(ast, *cond, out);
            out.push(' ');
            write_node(ast, *then, out);
            if let NodeKind::IfCase { body } = ast.kind(*els)
                && !body.is_empty()
            {
                out.push_str(" else ");
                write_node(ast, *els, out);
            }
        }
        NodeKind::IncDec { x, op } => {
            write_node(ast, *x, out);
            out.push_str(match op {
                IncDecOp::Inc => "++",
                IncDecOp::Dec => "--",
            });
        }
        NodeKind::Range {
            x,
            key,
            value,
            define,
            body,
        } => {
            out.push_str("for ");
            if let Some(k) = key {
                write_node(ast, *k, out);
                if let Some(v) = value {
                    out.push_str(", ");
                    write_node(ast, *v, out);
                }
                out.push_str(if *define { " := " } else { " = " });
            }
            out.push_str("range ");
            write_node(ast, *x, out);
            out.push(' ');
            write_body(ast, body, out);
        }
        NodeKind::Return { results } => {
            out.push_str("return");
            if !results.is_empty() {
                out.push(' ');
                write_list(ast, results, ", ", out);
            }
        }
        NodeKind::Select { cases } => {
            out.push_str("select ");
            write_body(ast, cases, out);
        }
        NodeKind::SelectCase { comm, body } => {
            match comm {
                Some(c) => {
                    out.push_str("case ");
                    write_node(ast, *c, out);
                }
                None => out.push_str("default"),
            }
            out.push_str(": ");
            write_list(ast, body, "; ", out);
        }
        NodeKind::Send { chan, value } => {
            write_node(ast, *chan, out);
            out.push_str(" <- ");
            write_node(ast, *value, out);
        }
        NodeKind::Switch {
            init,
            x,
            var_name,
            clauses,
            ..
        } => {
            out.push_str("switch ");
            if let Some(i) = init {
                write_node(ast, *i, out);
                out.push_str("; ");
            }
            if let Some(v) = var_name {
                out.push_str(v);
                out.push_str(" := ");
            }
            if let Some(x) = x {
                write_node(ast, *x, out);
                out.push(' ');
            }
            write_body(ast, clauses, out);
        }
        NodeKind::SwitchClause { cases, body } => {
            if cases.is_empty() {
                out.push_str("default");
            } else {
                out.push_str("case ");
                write_list(ast, cases, ", ", out);
            }
            out.push_str(": ");
            write_list(ast, body, "; ", out);
        }
        NodeKind::Empty => {}
        NodeKind::Import { name, path } => {
            out.push_str("import ");
            if let Some(n) = name {
                out.push_str(n);
                out.push(' ');
            }
            out.push_str(&format!("{path:?}"));
        }
        NodeKind::ValueDecl {
            names,
            ty,
            values,
            is_const,
        } => {
            out.push_str(if *is_const { "const " } else { "var " });
            let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
            out.push_str(&names.join(", "));
            if let Some(t) = ty {
                out.push(' ');
                write_node(ast, *t, out);
            }
            if !values.is_empty() {
                out.push_str(" = ");
                write_list(ast, values, ", ", out);
            }
        }
        NodeKind::TypeDecl { name, ty, is_alias } => {
            out.push_str("type ");
            out.push_str(&name.name);
            out.push_str(if *is_alias { " = " } else { " " });
            write_node(ast, *ty, out);
        }
        NodeKind::FuncDecl { body, .. } => {
            out.push_str(&render_header(ast, id));
            if let Some(b) = body {
                out.push(' ');
                write_body(ast, b, out);
            }
        }
        NodeKind::File { name, .. } => out.push_str(name),
        NodeKind::Package { path, .. } => out.push_str(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, LitKind, Span};

    fn name(ast: &mut Ast, n: &str) -> NodeId {
        ast.alloc(
            NodeKind::Name {
                name: n.into(),
                path: None,
            },
            Span::default(),
        )
    }

    #[test]
    fn test_render_call_and_binary() {
        let mut ast = Ast::new();
        let f = name(&mut ast, "f");
        let a = name(&mut ast, "a");
        let one = ast.alloc(
            NodeKind::BasicLit {
                kind: LitKind::Int,
                value: "1".into(),
            },
            Span::default(),
        );
        let sum = ast.alloc(
            NodeKind::Binary {
                op: BinaryOp::Add,
                left: a,
                right: one,
            },
            Span::default(),
        );
        let call = ast.alloc(
            NodeKind::Call {
                func: f,
                args: vec![sum],
                varg: false,
                num_args: 0,
            },
            Span::default(),
        );
        insta::assert_snapshot!(render(&ast, call), @"f(a + 1)");
    }

    #[test]
    fn test_render_labeled_for() {
        let mut ast = Ast::new();
        let brk = ast.alloc(
            NodeKind::Branch {
                op: crate::ast::BranchOp::Break,
                label: Some("L".into()),
                target: None,
                depth: 0,
                frame_depth: 0,
                body_index: 0,
            },
            Span::default(),
        );
        let for_ = ast.alloc(
            NodeKind::For {
                init: None,
                cond: None,
                post: None,
                body: vec![brk],
            },
            Span::default(),
        );
        ast.set_label(for_, "L");
        insta::assert_snapshot!(render(&ast, for_), @"L: for { break L }");
    }
}
