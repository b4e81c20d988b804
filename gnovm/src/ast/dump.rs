//! JSON dump of a syntax tree, used by `gnovm parse`

use super::{Ast, Children, NodeId, NodeKind, Visit, children, layout};
use serde_json::{Map, Value, json};

/// Dumps the subtree rooted at `id`.
pub fn dump_json(ast: &Ast, id: NodeId) -> Value {
    stacker::maybe_grow(32 * 1024, 1024 * 1024, || {
        let node = ast.node(id);
        let mut obj = Map::new();
        obj.insert("kind".into(), json!(node.kind.name()));
        obj.insert("span".into(), json!(node.span.to_string()));
        if let Some(label) = &node.label {
            obj.insert("label".into(), json!(label));
        }
        scalars(&node.kind, &mut obj);
        for visit in layout(&node.kind) {
            let Visit::Child(field) = visit else { continue };
            let key = format!("{field:?}").to_lowercase();
            let value = match children(&node.kind, *field) {
                Children::One(c) => dump_json(ast, c),
                Children::Opt(Some(c)) => dump_json(ast, c),
                Children::Opt(None) | Children::None => continue,
                Children::List(l) => Value::Array(l.iter().map(|c| dump_json(ast, *c)).collect()),
            };
            obj.insert(key, value);
        }
        Value::Object(obj)
    })
}

fn scalars(kind: &NodeKind, obj: &mut Map<String, Value>) {
    match kind {
        NodeKind::Name { name, .. } => {
            obj.insert("name".into(), json!(name));
        }
        NodeKind::BasicLit { kind, value } => {
            obj.insert("lit".into(), json!(format!("{kind:?}")));
            obj.insert("value".into(), json!(value));
        }
        NodeKind::Binary { op, .. } => {
            obj.insert("op".into(), json!(op.to_string()));
        }
        NodeKind::Unary { op, .. } => {
            obj.insert("op".into(), json!(op.to_string()));
        }
        NodeKind::Call { varg, .. } if *varg => {
            obj.insert("varg".into(), json!(true));
        }
        NodeKind::Selector { sel, .. } => {
            obj.insert("sel".into(), json!(sel));
        }
        NodeKind::Field { name, tag, .. } => {
            if let Some(n) = name {
                obj.insert("name".into(), json!(n));
            }
            if let Some(t) = tag {
                obj.insert("tag".into(), json!(t));
            }
        }
        NodeKind::SliceType { vrd, .. } if *vrd => {
            obj.insert("variadic".into(), json!(true));
        }
        NodeKind::ChanType { dir, .. } => {
            obj.insert("dir".into(), json!(format!("{dir:?}")));
        }
        NodeKind::Assign { op, .. } => {
            obj.insert("op".into(), json!(op.to_string()));
        }
        NodeKind::Branch { op, label, .. } => {
            obj.insert("op".into(), json!(op.to_string()));
            if let Some(l) = label {
                obj.insert("target".into(), json!(l));
            }
        }
        NodeKind::IncDec { op, .. } => {
            obj.insert("op".into(), json!(format!("{op:?}")));
        }
        NodeKind::Range { define, .. } => {
            obj.insert("define".into(), json!(define));
        }
        NodeKind::Switch {
            is_type_switch,
            var_name,
            ..
        } => {
            obj.insert("type_switch".into(), json!(is_type_switch));
            if let Some(v) = var_name {
                obj.insert("var".into(), json!(v));
            }
        }
        NodeKind::Import { name, path } => {
            obj.insert("path".into(), json!(path));
            if let Some(n) = name {
                obj.insert("name".into(), json!(n));
            }
        }
        NodeKind::ValueDecl {
            names, is_const, ..
        } => {
            let names: Vec<&str> = names.iter().map(|n| n.name.as_str()).collect();
            obj.insert("names".into(), json!(names));
            obj.insert("const".into(), json!(is_const));
        }
        NodeKind::TypeDecl { name, is_alias, .. } => {
            obj.insert("name".into(), json!(name.name));
            obj.insert("alias".into(), json!(is_alias));
        }
        NodeKind::FuncDecl { name, body, .. } => {
            obj.insert("name".into(), json!(name));
            if body.is_none() {
                obj.insert("native".into(), json!(true));
            }
        }
        NodeKind::File { pkg_name, name, .. } => {
            obj.insert("package".into(), json!(pkg_name));
            obj.insert("name".into(), json!(name));
        }
        NodeKind::Package { path, name, .. } => {
            obj.insert("path".into(), json!(path));
            obj.insert("name".into(), json!(name));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{LitKind, Span};

    #[test]
    fn test_dump_unary_literal() {
        let mut ast = Ast::new();
        let lit = ast.alloc(
            NodeKind::BasicLit {
                kind: LitKind::Int,
                value: "7".into(),
            },
            Span::at(1, 2, 1, 3),
        );
        let neg = ast.alloc(
            NodeKind::Unary {
                op: crate::ast::UnaryOp::Neg,
                x: lit,
            },
            Span::at(1, 1, 1, 3),
        );
        let v = dump_json(&ast, neg);
        assert_eq!(v["kind"], "UnaryExpr");
        assert_eq!(v["op"], "-");
        assert_eq!(v["x"]["value"], "7");
        assert_eq!(v["x"]["span"], "1:2-1:3");
    }
}
