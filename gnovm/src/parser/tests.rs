//! Parser tests

use super::*;
use crate::ast::render;

/// Helper to parse a file into a fresh arena
fn parse_program(source: &str) -> Result<(Ast, NodeId)> {
    let mut ast = Ast::new();
    let file = parse_file(&mut ast, "test.gno", source)?;
    Ok((ast, file))
}

/// Helper to parse and expect success
fn parse_ok(source: &str) -> (Ast, NodeId) {
    parse_program(source).expect("Parse should succeed")
}

/// Helper to check if parsing fails
fn parse_fails(source: &str) -> bool {
    parse_program(source).is_err()
}

fn decls(ast: &Ast, file: NodeId) -> Vec<NodeId> {
    match ast.kind(file) {
        NodeKind::File { decls, .. } => decls.clone(),
        _ => panic!("Expected File"),
    }
}

/// Body statements of `func main`.
fn main_body(source: &str) -> (Ast, Vec<NodeId>) {
    let (ast, file) = parse_ok(source);
    for d in decls(&ast, file) {
        if let NodeKind::FuncDecl { name, body: Some(body), .. } = ast.kind(d)
            && name == "main"
        {
            let body = body.clone();
            return (ast, body);
        }
    }
    panic!("Expected func main");
}

fn stmts(src: &str) -> (Ast, Vec<NodeId>) {
    main_body(&format!("package main\n\nfunc main() {{\n{src}\n}}\n"))
}

fn expr(src: &str) -> (Ast, NodeId) {
    let mut ast = Ast::new();
    let x = parse_expr(&mut ast, src).expect("Parse should succeed");
    (ast, x)
}

// ============================================
// Files and Declarations
// ============================================

#[test]
fn test_parse_package_clause() {
    let (ast, file) = parse_ok("package foo\n");
    let NodeKind::File { pkg_name, name, decls } = ast.kind(file) else {
        panic!("Expected File");
    };
    assert_eq!(pkg_name, "foo");
    assert_eq!(name, "test.gno");
    assert!(decls.is_empty());
}

#[test]
fn test_parse_missing_package_fails() {
    assert!(parse_fails("func main() {}\n"));
}

#[test]
fn test_parse_imports() {
    let (ast, file) = parse_ok("package main\n\nimport \"strings\"\nimport (\n\ts \"strconv\"\n\t\"errors\"\n)\n");
    let d = decls(&ast, file);
    assert_eq!(d.len(), 3);
    assert!(matches!(ast.kind(d[0]), NodeKind::Import { name: None, path } if path == "strings"));
    assert!(matches!(ast.kind(d[1]), NodeKind::Import { name: Some(n), path } if n == "s" && path == "strconv"));
}

#[test]
fn test_parse_import_after_decl_fails() {
    assert!(parse_fails("package main\nvar x int\nimport \"strings\"\n"));
}

#[test]
fn test_parse_var_decls() {
    let (ast, file) = parse_ok("package main\nvar a, b int = 1, 2\nvar (\n\tc string\n\td = 3.5\n)\n");
    let d = decls(&ast, file);
    assert_eq!(d.len(), 3);
    let NodeKind::ValueDecl { names, ty, values, is_const } = ast.kind(d[0]) else {
        panic!("Expected ValueDecl");
    };
    assert_eq!(names.len(), 2);
    assert!(ty.is_some());
    assert_eq!(values.len(), 2);
    assert!(!is_const);
    assert!(matches!(ast.kind(d[2]), NodeKind::ValueDecl { ty: None, .. }));
}

#[test]
fn test_parse_const_group_repeats_values() {
    let (ast, file) = parse_ok("package main\nconst (\n\tA = iota * 10\n\tB\n\tC\n)\n");
    let d = decls(&ast, file);
    assert_eq!(d.len(), 3);
    for (i, id) in d.iter().enumerate() {
        let NodeKind::ValueDecl { values, is_const, .. } = ast.kind(*id) else {
            panic!("Expected ValueDecl");
        };
        assert!(is_const);
        assert_eq!(render(&ast, values[0]), "iota * 10");
        assert!(matches!(ast.attr(*id, AttrKey::Iota), Some(AttrValue::Int(n)) if *n == i as i64));
    }
    // each repetition is a distinct subtree
    let v = |id: NodeId| match ast.kind(id) {
        NodeKind::ValueDecl { values, .. } => values[0],
        _ => unreachable!(),
    };
    assert_ne!(v(d[0]), v(d[1]));
}

#[test]
fn test_parse_const_without_value_fails() {
    assert!(parse_fails("package main\nconst A\n"));
    assert!(parse_fails("package main\nconst (\n\tA int\n)\n"));
}

#[test]
fn test_parse_type_decls() {
    let (ast, file) = parse_ok(
        "package main\ntype Point struct {\n\tX, Y int\n\tName string `json:\"name\"`\n\t*Base\n}\ntype Alias = int\n",
    );
    let d = decls(&ast, file);
    let NodeKind::TypeDecl { name, ty, is_alias } = ast.kind(d[0]) else {
        panic!("Expected TypeDecl");
    };
    assert_eq!(name.name, "Point");
    assert!(!is_alias);
    let NodeKind::StructType { fields } = ast.kind(*ty) else {
        panic!("Expected StructType");
    };
    assert_eq!(fields.len(), 4);
    assert!(matches!(ast.kind(fields[2]), NodeKind::Field { tag: Some(t), .. } if t == "json:\"name\""));
    assert!(matches!(ast.kind(fields[3]), NodeKind::Field { name: None, .. }));
    assert!(matches!(ast.kind(d[1]), NodeKind::TypeDecl { is_alias: true, .. }));
}

#[test]
fn test_parse_interface_type() {
    let (ast, file) = parse_ok("package main\ntype RW interface {\n\tRead(p []byte) (n int, err error)\n\tfmt.Stringer\n}\n");
    let d = decls(&ast, file);
    let NodeKind::TypeDecl { ty, .. } = ast.kind(d[0]) else {
        panic!("Expected TypeDecl");
    };
    let NodeKind::InterfaceType { methods } = ast.kind(*ty) else {
        panic!("Expected InterfaceType");
    };
    assert_eq!(methods.len(), 2);
    assert!(matches!(ast.kind(methods[0]), NodeKind::Field { name: Some(n), .. } if n == "Read"));
    assert!(matches!(ast.kind(methods[1]), NodeKind::Field { name: None, .. }));
}

#[test]
fn test_parse_func_decl_params() {
    let (ast, file) = parse_ok("package main\nfunc f(a, b int, s ...string) (int, error) {\n\treturn 0, nil\n}\n");
    let d = decls(&ast, file);
    let NodeKind::FuncDecl { recv, name, ty, body } = ast.kind(d[0]) else {
        panic!("Expected FuncDecl");
    };
    assert!(recv.is_none());
    assert_eq!(name, "f");
    assert_eq!(body.as_ref().map(Vec::len), Some(1));
    let NodeKind::FuncType { params, results } = ast.kind(*ty) else {
        panic!("Expected FuncType");
    };
    assert_eq!(params.len(), 3);
    assert_eq!(results.len(), 2);
    let names: Vec<_> = params
        .iter()
        .map(|p| match ast.kind(*p) {
            NodeKind::Field { name, .. } => name.clone().unwrap_or_default(),
            _ => unreachable!(),
        })
        .collect();
    assert_eq!(names, vec!["a", "b", "s"]);
    let NodeKind::Field { ty, .. } = ast.kind(params[2]) else {
        unreachable!()
    };
    assert!(matches!(ast.kind(*ty), NodeKind::SliceType { vrd: true, .. }));
}

#[test]
fn test_parse_unnamed_params() {
    let (ast, file) = parse_ok("package main\nfunc f(int, string) bool\n");
    let d = decls(&ast, file);
    let NodeKind::FuncDecl { ty, body, .. } = ast.kind(d[0]) else {
        panic!("Expected FuncDecl");
    };
    assert!(body.is_none());
    let NodeKind::FuncType { params, results } = ast.kind(*ty) else {
        panic!("Expected FuncType");
    };
    assert!(params.iter().all(|p| matches!(ast.kind(*p), NodeKind::Field { name: None, .. })));
    assert_eq!(results.len(), 1);
}

#[test]
fn test_parse_mixed_params_fails() {
    assert!(parse_fails("package main\nfunc f(a int, string) {}\n"));
}

#[test]
fn test_parse_method_decl() {
    let (ast, file) = parse_ok("package main\nfunc (p *Point) Move(dx int) {\n\tp.X += dx\n}\n");
    let d = decls(&ast, file);
    let NodeKind::FuncDecl { recv: Some(r), name, .. } = ast.kind(d[0]) else {
        panic!("Expected method");
    };
    assert_eq!(name, "Move");
    let NodeKind::Field { name, ty, .. } = ast.kind(*r) else {
        panic!("Expected Field");
    };
    assert_eq!(name.as_deref(), Some("p"));
    assert!(matches!(ast.kind(*ty), NodeKind::PointerType { .. }));
}

// ============================================
// Expressions
// ============================================

#[test]
fn test_parse_precedence() {
    let (ast, x) = expr("a + b * c == d && e || f");
    let NodeKind::Binary { op: BinaryOp::LOr, left, .. } = ast.kind(x) else {
        panic!("Expected ||");
    };
    let NodeKind::Binary { op: BinaryOp::LAnd, left, .. } = ast.kind(*left) else {
        panic!("Expected &&");
    };
    let NodeKind::Binary { op: BinaryOp::Eql, left, .. } = ast.kind(*left) else {
        panic!("Expected ==");
    };
    let NodeKind::Binary { op: BinaryOp::Add, right, .. } = ast.kind(*left) else {
        panic!("Expected +");
    };
    assert!(matches!(ast.kind(*right), NodeKind::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn test_parse_left_associative() {
    let (ast, x) = expr("a - b - c");
    let NodeKind::Binary { left, right, .. } = ast.kind(x) else {
        panic!("Expected Binary");
    };
    assert!(matches!(ast.kind(*left), NodeKind::Binary { op: BinaryOp::Sub, .. }));
    assert!(matches!(ast.kind(*right), NodeKind::Name { .. }));
}

#[test]
fn test_parse_unary_ops() {
    let (ast, x) = expr("-x + ^y");
    let NodeKind::Binary { left, right, .. } = ast.kind(x) else {
        panic!("Expected Binary");
    };
    assert!(matches!(ast.kind(*left), NodeKind::Unary { op: UnaryOp::Neg, .. }));
    assert!(matches!(ast.kind(*right), NodeKind::Unary { op: UnaryOp::Xor, .. }));
    let (ast, x) = expr("*&p");
    let NodeKind::Star { x } = ast.kind(x) else {
        panic!("Expected Star");
    };
    assert!(matches!(ast.kind(*x), NodeKind::Ref { .. }));
}

#[test]
fn test_parse_primary_suffixes() {
    let (ast, x) = expr("a.b[1](c, d...)[2:3].(T)");
    assert_eq!(render(&ast, x), "a.b[1](c, d...)[2:3].(T)");
    let NodeKind::TypeAssert { x, .. } = ast.kind(x) else {
        panic!("Expected TypeAssert");
    };
    let NodeKind::Slice { x, .. } = ast.kind(*x) else {
        panic!("Expected Slice");
    };
    assert!(matches!(ast.kind(*x), NodeKind::Call { varg: true, .. }));
}

#[test]
fn test_parse_three_index_slice() {
    let (ast, x) = expr("s[1:2:3]");
    assert!(matches!(ast.kind(x), NodeKind::Slice { max: Some(_), .. }));
    let mut ast = Ast::new();
    assert!(parse_expr(&mut ast, "s[1::3]").is_err());
}

#[test]
fn test_parse_composite_literals() {
    let (ast, x) = expr("[]Point{{1, 2}, {X: 3}}");
    let NodeKind::CompositeLit { ty: Some(t), elts } = ast.kind(x) else {
        panic!("Expected CompositeLit");
    };
    assert!(matches!(ast.kind(*t), NodeKind::SliceType { .. }));
    assert_eq!(elts.len(), 2);
    let NodeKind::KeyValue { key: None, value } = ast.kind(elts[1]) else {
        panic!("Expected element");
    };
    let NodeKind::CompositeLit { ty: None, elts } = ast.kind(*value) else {
        panic!("Expected elided literal");
    };
    assert!(matches!(ast.kind(elts[0]), NodeKind::KeyValue { key: Some(_), .. }));

    let (ast, x) = expr("map[string]int{\"a\": 1,\n}");
    assert!(matches!(ast.kind(x), NodeKind::CompositeLit { elts, .. } if elts.len() == 1));
    let (ast, x) = expr("[...]int{1, 2, 3}");
    let NodeKind::CompositeLit { ty: Some(t), .. } = ast.kind(x) else {
        panic!("Expected CompositeLit");
    };
    assert!(matches!(ast.kind(*t), NodeKind::ArrayType { len: None, .. }));
}

#[test]
fn test_parse_composite_literal_needs_trailing_comma() {
    let mut ast = Ast::new();
    assert!(parse_expr(&mut ast, "[]int{1,\n2\n}").is_err());
}

#[test]
fn test_parse_func_literal() {
    let (ast, x) = expr("func(x int) int { return x * 2 }");
    let NodeKind::FuncLit { body, .. } = ast.kind(x) else {
        panic!("Expected FuncLit");
    };
    assert_eq!(body.len(), 1);
    assert!(ast.kind(x).is_block_node());
}

#[test]
fn test_parse_conversions() {
    let (ast, x) = expr("[]byte(s)");
    let NodeKind::Call { func, .. } = ast.kind(x) else {
        panic!("Expected Call");
    };
    assert!(matches!(ast.kind(*func), NodeKind::SliceType { .. }));
    let (ast, x) = expr("(*T)(p)");
    let NodeKind::Call { func, .. } = ast.kind(x) else {
        panic!("Expected Call");
    };
    assert!(matches!(ast.kind(*func), NodeKind::Star { .. }));
    let (ast, x) = expr("make(map[string][]int, 10)");
    assert!(matches!(ast.kind(x), NodeKind::Call { args, .. } if args.len() == 2));
}

#[test]
fn test_parse_literal_kinds() {
    for (src, kind) in [
        ("42", LitKind::Int),
        ("0x1F", LitKind::Int),
        ("1.5e3", LitKind::Float),
        ("'x'", LitKind::Char),
        ("`raw`", LitKind::String),
    ] {
        let (ast, x) = expr(src);
        assert!(matches!(ast.kind(x), NodeKind::BasicLit { kind: k, .. } if *k == kind), "{src}");
    }
}

// ============================================
// Statements
// ============================================

#[test]
fn test_parse_assignments() {
    let (ast, body) = stmts("x := 1\nx, y = y, x\nx += 2\nx++\n");
    assert_eq!(body.len(), 4);
    assert!(matches!(ast.kind(body[0]), NodeKind::Assign { op: AssignOp::Define, .. }));
    assert!(matches!(ast.kind(body[1]), NodeKind::Assign { op: AssignOp::Assign, lhs, .. } if lhs.len() == 2));
    assert!(matches!(ast.kind(body[2]), NodeKind::Assign { op: AssignOp::Op(BinaryOp::Add), .. }));
    assert!(matches!(ast.kind(body[3]), NodeKind::IncDec { op: IncDecOp::Inc, .. }));
}

#[test]
fn test_parse_op_assign_needs_single_values() {
    assert!(parse_fails("package main\nfunc main() {\n\ta, b += 1, 2\n}\n"));
}

#[test]
fn test_parse_if_else_chain() {
    let (ast, body) = stmts("if x := f(); x > 0 {\n\ty()\n} else if x < 0 {\n\tz()\n} else {\n}\n");
    let NodeKind::If { init, then, els, .. } = ast.kind(body[0]) else {
        panic!("Expected If");
    };
    assert!(init.is_some());
    assert!(matches!(ast.kind(*then), NodeKind::IfCase { body } if body.len() == 1));
    let NodeKind::IfCase { body: else_body } = ast.kind(*els) else {
        panic!("Expected IfCase");
    };
    let NodeKind::If { els: inner_els, .. } = ast.kind(else_body[0]) else {
        panic!("Expected nested If");
    };
    assert!(matches!(ast.kind(*inner_els), NodeKind::IfCase { body } if body.is_empty()));
    // the else case and the nested if cover the same text
    assert_ne!(ast.span(*els), ast.span(else_body[0]));
    assert_eq!(ast.span(*els).pos, ast.span(else_body[0]).pos);
}

#[test]
fn test_parse_if_without_else_has_empty_case() {
    let (ast, body) = stmts("if ok {\n}\n");
    let NodeKind::If { els, .. } = ast.kind(body[0]) else {
        panic!("Expected If");
    };
    assert!(matches!(ast.kind(*els), NodeKind::IfCase { body } if body.is_empty()));
}

#[test]
fn test_parse_no_composite_literal_in_header() {
    let (ast, body) = stmts("if x == y {\n}\nfor _, v := range []int{1} {\n}\n");
    assert!(matches!(ast.kind(body[0]), NodeKind::If { .. }));
    assert!(matches!(ast.kind(body[1]), NodeKind::Range { .. }));
    // a parenthesized literal is fine
    let (ast, body) = stmts("if p == (T{}) {\n}\n");
    assert!(matches!(ast.kind(body[0]), NodeKind::If { .. }));
}

#[test]
fn test_parse_for_forms() {
    let (ast, body) = stmts("for {\n}\nfor i < 10 {\n}\nfor i := 0; i < 10; i++ {\n}\nfor ;; {\n}\n");
    assert!(matches!(ast.kind(body[0]), NodeKind::For { init: None, cond: None, post: None, .. }));
    assert!(matches!(ast.kind(body[1]), NodeKind::For { init: None, cond: Some(_), post: None, .. }));
    assert!(matches!(ast.kind(body[2]), NodeKind::For { init: Some(_), cond: Some(_), post: Some(_), .. }));
    assert!(matches!(ast.kind(body[3]), NodeKind::For { init: None, cond: None, post: None, .. }));
}

#[test]
fn test_parse_range_forms() {
    let (ast, body) = stmts("for k, v := range m {\n\tuse(k, v)\n}\nfor i = range s {\n}\nfor range ch {\n}\n");
    let NodeKind::Range { key, value, define, body: rbody, .. } = ast.kind(body[0]) else {
        panic!("Expected Range");
    };
    assert!(key.is_some() && value.is_some() && *define);
    assert_eq!(rbody.len(), 1);
    assert!(matches!(ast.kind(body[1]), NodeKind::Range { define: false, value: None, .. }));
    assert!(matches!(ast.kind(body[2]), NodeKind::Range { key: None, .. }));
    assert!(ast.span(body[0]).end > ast.span(body[0]).pos);
}

#[test]
fn test_parse_switch() {
    let (ast, body) = stmts("switch x := f(); x {\ncase 1, 2:\n\ta()\n\tfallthrough\ncase 3:\ndefault:\n\tb()\n}\n");
    let NodeKind::Switch { init, x, is_type_switch, clauses, .. } = ast.kind(body[0]) else {
        panic!("Expected Switch");
    };
    assert!(init.is_some() && x.is_some() && !is_type_switch);
    assert_eq!(clauses.len(), 3);
    let NodeKind::SwitchClause { cases, body } = ast.kind(clauses[0]) else {
        panic!("Expected clause");
    };
    assert_eq!(cases.len(), 2);
    assert!(matches!(ast.kind(body[1]), NodeKind::Branch { op: BranchOp::Fallthrough, .. }));
    assert!(matches!(ast.kind(clauses[2]), NodeKind::SwitchClause { cases, .. } if cases.is_empty()));
}

#[test]
fn test_parse_type_switch() {
    let (ast, body) = stmts("switch v := i.(type) {\ncase int, *T:\ncase nil:\n}\n");
    let NodeKind::Switch { x: Some(x), is_type_switch, var_name, .. } = ast.kind(body[0]) else {
        panic!("Expected Switch");
    };
    assert!(is_type_switch);
    assert_eq!(var_name.as_deref(), Some("v"));
    assert!(matches!(ast.kind(*x), NodeKind::Name { name, .. } if name == "i"));
}

#[test]
fn test_parse_duplicate_default_fails() {
    assert!(parse_fails("package main\nfunc main() {\n\tswitch {\n\tdefault:\n\tdefault:\n\t}\n}\n"));
}

#[test]
fn test_parse_labels_and_branches() {
    let (ast, body) = stmts("outer:\nfor {\n\tfor {\n\t\tcontinue outer\n\t}\n\tbreak\n}\ngoto end\nend:\n");
    assert_eq!(ast.label(body[0]), Some("outer"));
    assert!(matches!(ast.kind(body[1]), NodeKind::Branch { op: BranchOp::Goto, label: Some(l), .. } if l == "end"));
    assert_eq!(ast.label(body[2]), Some("end"));
    assert!(matches!(ast.kind(body[2]), NodeKind::Empty));
}

#[test]
fn test_parse_defer_and_go() {
    let (ast, body) = stmts("defer f()\ngo g(1)\nreturn\n");
    assert!(matches!(ast.kind(body[0]), NodeKind::Defer { .. }));
    assert!(matches!(ast.kind(body[1]), NodeKind::Go { .. }));
    assert!(matches!(ast.kind(body[2]), NodeKind::Return { results } if results.is_empty()));
    assert!(parse_fails("package main\nfunc main() {\n\tdefer x\n}\n"));
}

#[test]
fn test_parse_select_and_send() {
    let (ast, body) = stmts("ch <- 1\nselect {\ncase v := <-ch:\n\tuse(v)\ndefault:\n}\n");
    assert!(matches!(ast.kind(body[0]), NodeKind::Send { .. }));
    assert!(matches!(ast.kind(body[1]), NodeKind::Select { cases } if cases.len() == 2));
}

#[test]
fn test_parse_local_decls_and_blocks() {
    let (ast, body) = stmts("var x int\nconst c = 2\ntype T int\n{\n\tx = c\n}\n");
    assert_eq!(body.len(), 4);
    assert!(matches!(ast.kind(body[0]), NodeKind::DeclStmt { .. }));
    assert!(matches!(ast.kind(body[3]), NodeKind::Block { body } if body.len() == 1));
}

#[test]
fn test_parse_block_spans_are_unique() {
    let (ast, file) = parse_ok("package main\nfunc main() {\n\tif a {\n\t} else if b {\n\t}\n}\n");
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![file];
    while let Some(id) = stack.pop() {
        if ast.kind(id).is_block_node() {
            assert!(seen.insert(ast.span(id)), "duplicate span for {}", ast.kind(id).name());
        }
        let kind = ast.kind(id);
        for visit in crate::ast::layout(kind) {
            if let crate::ast::Visit::Child(field) = *visit {
                for i in 0..crate::ast::field_len(kind, field) {
                    stack.extend(crate::ast::get_child(kind, field, i));
                }
            }
        }
    }
}

#[test]
fn test_parse_error_position() {
    let err = parse_program("package main\n\nfunc main() {\n\tx := 1 1\n}\n").unwrap_err();
    let (file, span) = err.position().expect("position");
    assert_eq!(file, "test.gno");
    assert_eq!(span.line(), 4);
    assert!(err.to_string().contains("unexpected 1, expected ; or newline"));
}

// ============================================
// Output Directives
// ============================================

#[test]
fn test_extract_output() {
    let src = "package main\n\nfunc main() {}\n\n// Output:\n// hello\n//   indented\n//\n";
    assert_eq!(extract_output(src).as_deref(), Some("hello\n  indented\n"));
    assert_eq!(extract_error(src), None);
}

#[test]
fn test_extract_error() {
    let src = "package main\n\n// Error:\n// main/a.gno:3:1: name error\n";
    assert_eq!(extract_error(src).as_deref(), Some("main/a.gno:3:1: name error"));
}
