//! Preprocessor tests

use crate::ast::{Ast, AttrKey, NodeId, NodeKind};
use crate::runtime::{Runtime, RuntimeOptions};
use crate::scope::PathKind;
use crate::values::{PackageValue, TypedValue};
use std::rc::Rc;

/// Preprocesses `source` as package `main`.
fn preprocess(source: &str) -> crate::Result<(Runtime, Rc<PackageValue>)> {
    let mut rt = Runtime::new(RuntimeOptions::default())?;
    let pv = rt.load_files("main", &[("main.gno".to_string(), source.to_string())])?;
    Ok((rt, pv))
}

fn preprocess_ok(source: &str) -> (Runtime, Rc<PackageValue>) {
    match preprocess(source) {
        Ok(r) => r,
        Err(e) => panic!("preprocessing failed: {e}"),
    }
}

fn preprocess_err(source: &str) -> String {
    match preprocess(source) {
        Ok(_) => panic!("preprocessing should fail"),
        Err(e) => e.to_string(),
    }
}

fn all_nodes(ast: &Ast) -> impl Iterator<Item = NodeId> + '_ {
    (0..ast.len() as u32).map(|i| NodeId::from_raw(la_arena::RawIdx::from(i)))
}

/// Name nodes called `name` that were resolved to a path.
fn resolved_names<'a>(ast: &'a Ast, name: &'a str) -> Vec<NodeId> {
    all_nodes(ast)
        .filter(|&n| matches!(ast.kind(n), NodeKind::Name { name: x, path: Some(_) } if x == name))
        .collect()
}

/// Static value of a package-level name.
fn pkg_value(rt: &Runtime, pv: &PackageValue, name: &str) -> TypedValue {
    let sb = rt.scopes.get(pv.scope);
    let i = sb.local_index(name).expect("name should be declared");
    sb.values[i as usize].clone()
}

// ============================================
// Name resolution
// ============================================

#[test]
fn test_local_paths() {
    let (rt, _) = preprocess_ok(
        "package main\n\nfunc main() {\n\tx := 1\n\tif true {\n\t\ty := x\n\t\tprintln(y)\n\t}\n}\n",
    );
    let xs = resolved_names(&rt.ast, "x");
    // definition in the function block, reference one block down
    let depths: Vec<u8> = xs
        .iter()
        .filter_map(|&n| match rt.ast.kind(n) {
            NodeKind::Name { path: Some(p), .. } => Some(p.depth),
            _ => None,
        })
        .collect();
    assert!(depths.contains(&1), "{depths:?}");
    assert!(depths.contains(&2), "{depths:?}");
}

#[test]
fn test_uverse_path() {
    let (rt, _) = preprocess_ok("package main\n\nfunc main() {\n\tprintln(len(\"abc\"))\n}\n");
    let printlns = resolved_names(&rt.ast, "println");
    assert_eq!(printlns.len(), 1);
    let NodeKind::Name { path: Some(p), .. } = rt.ast.kind(printlns[0]) else {
        panic!("println should resolve");
    };
    assert_eq!(p.kind, PathKind::Uverse);
}

#[test]
fn test_undefined_name() {
    let err = preprocess_err("package main\n\nfunc main() {\n\tprintln(y)\n}\n");
    assert!(err.contains("undefined: y"), "{err}");
}

#[test]
fn test_every_decl_marked_preprocessed() {
    let (rt, pv) = preprocess_ok(
        "package main\n\ntype T int\n\nvar v = 1\n\nconst c = 2\n\nfunc main() {}\n",
    );
    let NodeKind::Package { files, .. } = rt.ast.kind(pv.node) else {
        panic!("package node expected");
    };
    let NodeKind::File { decls, .. } = rt.ast.kind(files[0]) else {
        panic!("file node expected");
    };
    for &d in decls {
        assert!(rt.ast.is_preprocessed(d), "{} not preprocessed", rt.ast.kind(d).name());
    }
}

#[test]
fn test_expressions_get_types() {
    let (rt, _) = preprocess_ok("package main\n\nfunc main() {\n\ts := []int{1, 2}\n\tprintln(s[0] + 1)\n}\n");
    let typed = all_nodes(&rt.ast)
        .filter(|&n| matches!(rt.ast.kind(n), NodeKind::Index { .. }))
        .all(|n| rt.ast.attr(n, AttrKey::TypeOf).is_some());
    assert!(typed);
}

// ============================================
// Declarations
// ============================================

#[test]
fn test_out_of_order_declarations() {
    preprocess_ok("package main\n\nvar a = f()\n\nfunc f() int { return b * 2 }\n\nvar b = 21\n\nfunc main() {}\n");
}

#[test]
fn test_builtin_type_names() {
    let (rt, pv) = preprocess_ok(
        "package main\n\nvar a = [3]int{1, 2, 3}\nvar b = int8(a[0])\nvar c []byte\nvar e error\n\nfunc main() {}\n",
    );
    let sb = rt.scopes.get(pv.scope);
    let ty = |name: &str| {
        let i = sb.local_index(name).expect("name should be declared");
        let t = sb.types[i as usize].expect("should be typed");
        rt.types.type_string(t)
    };
    assert_eq!(ty("a"), "[3]int");
    assert_eq!(ty("b"), "int8");
    assert_eq!(ty("c"), "[]uint8");
    assert_eq!(ty("e"), "error");
}

#[test]
fn test_forward_func_reference_gets_signature() {
    let (rt, pv) = preprocess_ok(
        "package main\n\nvar a = twice(21)\n\nfunc twice(x int) int { return x * 2 }\n\nfunc main() {}\n",
    );
    let f = pkg_value(&rt, &pv, "twice");
    let t = f.ty.expect("twice should be typed");
    assert!(!rt.types.is_placeholder(t));
    assert_eq!(rt.types.type_string(t), "func(int) int");
    let sb = rt.scopes.get(pv.scope);
    let i = sb.local_index("twice").expect("twice should be declared");
    assert_eq!(sb.types[i as usize], Some(t));
}

#[test]
fn test_failed_func_signature_is_reported() {
    let err = preprocess_err("package main\n\nvar a = f()\n\nfunc f() Missing { return nil }\n\nfunc main() {}\n");
    assert!(err.contains("Missing"), "{err}");
}

#[test]
fn test_redeclared() {
    let err = preprocess_err("package main\n\nvar a = 1\nvar a = 2\n\nfunc main() {}\n");
    assert!(err.contains("a redeclared"), "{err}");
}

#[test]
fn test_initialization_cycle() {
    let err = preprocess_err("package main\n\nvar a = b\nvar b = a\n\nfunc main() {}\n");
    assert!(err.contains("initialization cycle"), "{err}");
}

#[test]
fn test_recursive_type() {
    let err = preprocess_err("package main\n\ntype T struct {\n\tt T\n}\n\nfunc main() {}\n");
    assert!(err.contains("invalid recursive type"), "{err}");
}

#[test]
fn test_recursive_type_through_pointer() {
    preprocess_ok("package main\n\ntype Node struct {\n\tnext *Node\n}\n\nfunc main() {}\n");
}

#[test]
fn test_no_new_variables() {
    let err = preprocess_err("package main\n\nfunc main() {\n\tx := 1\n\tx := 2\n\tprintln(x)\n}\n");
    assert!(err.contains("no new variables on left side of :="), "{err}");
}

#[test]
fn test_missing_return() {
    let err = preprocess_err("package main\n\nfunc f(x int) int {\n\tif x > 0 {\n\t\treturn 1\n\t}\n}\n\nfunc main() {}\n");
    assert!(err.contains("missing return"), "{err}");
}

#[test]
fn test_terminating_if_else() {
    preprocess_ok("package main\n\nfunc f(x int) int {\n\tif x > 0 {\n\t\treturn 1\n\t} else {\n\t\treturn 2\n\t}\n}\n\nfunc main() {}\n");
}

// ============================================
// Constants
// ============================================

#[test]
fn test_constant_folding() {
    let (rt, pv) = preprocess_ok("package main\n\nconst c = 1 << 10 + 1\n\nfunc main() {}\n");
    assert_eq!(pkg_value(&rt, &pv, "c").as_index(), Some(1025));
}

#[test]
fn test_iota() {
    let (rt, pv) = preprocess_ok("package main\n\nconst (\n\ta = iota\n\tb\n\tc\n)\n\nfunc main() {}\n");
    assert_eq!(pkg_value(&rt, &pv, "a").as_index(), Some(0));
    assert_eq!(pkg_value(&rt, &pv, "c").as_index(), Some(2));
}

#[test]
fn test_iota_outside_const() {
    let err = preprocess_err("package main\n\nvar x = iota\n\nfunc main() {}\n");
    assert!(err.contains("cannot use iota outside constant declaration"), "{err}");
}

#[test]
fn test_constant_overflow() {
    let err = preprocess_err("package main\n\nvar x int8 = 300\n\nfunc main() {}\n");
    assert!(err.contains("overflows"), "{err}");
}

#[test]
fn test_constant_division_by_zero() {
    let err = preprocess_err("package main\n\nfunc main() {\n\tx := 1\n\tprintln(x / 0)\n}\n");
    assert!(err.contains("division by zero"), "{err}");
}

#[test]
fn test_typed_constant_keeps_type() {
    let (rt, pv) = preprocess_ok("package main\n\nconst c int64 = 7\n\nfunc main() {}\n");
    let tv = pkg_value(&rt, &pv, "c");
    assert_eq!(tv.ty.map(|t| rt.types.type_string(t)), Some("int64".to_string()));
}

// ============================================
// Type checking
// ============================================

#[test]
fn test_mismatched_types() {
    let err = preprocess_err("package main\n\nfunc main() {\n\tx := 1\n\ty := \"a\"\n\tprintln(x + y)\n}\n");
    assert!(err.contains("mismatched types int and string"), "{err}");
}

#[test]
fn test_operator_not_defined() {
    let err = preprocess_err("package main\n\nfunc main() {\n\tx := true\n\tprintln(x + x)\n}\n");
    assert!(err.contains("operator + not defined on bool"), "{err}");
}

#[test]
fn test_call_arity() {
    let src = |call: &str| format!("package main\n\nfunc f(a, b int) int {{ return a + b }}\n\nfunc main() {{\n\tprintln({call})\n}}\n");
    let err = preprocess_err(&src("f(1)"));
    assert!(err.contains("not enough arguments in call to f"), "{err}");
    let err = preprocess_err(&src("f(1, 2, 3)"));
    assert!(err.contains("too many arguments in call to f"), "{err}");
    preprocess_ok(&src("f(1, 2)"));
}

#[test]
fn test_variadic_call() {
    preprocess_ok(
        "package main\n\nfunc sum(xs ...int) int {\n\tt := 0\n\tfor _, x := range xs {\n\t\tt += x\n\t}\n\treturn t\n}\n\nfunc main() {\n\tprintln(sum(), sum(1, 2), sum([]int{3}...))\n}\n",
    );
}

#[test]
fn test_interface_not_implemented() {
    let err = preprocess_err(
        "package main\n\ntype S interface{ String() string }\n\ntype T struct{}\n\nfunc main() {\n\tvar s S = T{}\n\tprintln(s)\n}\n",
    );
    assert!(err.contains("missing method String"), "{err}");
}

#[test]
fn test_unknown_field() {
    let err = preprocess_err(
        "package main\n\ntype P struct{ X int }\n\nfunc main() {\n\tp := P{Y: 1}\n\tprintln(p.X)\n}\n",
    );
    assert!(err.contains("unknown field Y"), "{err}");
}

#[test]
fn test_embedded_field_selector() {
    let (rt, _) = preprocess_ok(
        "package main\n\ntype A struct{ X int }\n\ntype B struct{ A }\n\nfunc main() {\n\tb := B{}\n\tprintln(b.X)\n}\n",
    );
    // b.X is rewritten to b.A.X
    let inner = all_nodes(&rt.ast).any(|n| {
        matches!(rt.ast.kind(n), NodeKind::Selector { sel, path: Some(p), .. } if sel == "A" && p.kind == PathKind::Field)
    });
    assert!(inner);
}

#[test]
fn test_method_expression_rejected() {
    let err = preprocess_err(
        "package main\n\ntype T int\n\nfunc (t T) M() int { return int(t) }\n\nfunc main() {\n\tf := T.M\n\tprintln(f(1))\n}\n",
    );
    assert!(err.contains("not supported"), "{err}");
}

// ============================================
// Imports
// ============================================

#[test]
fn test_unexported_member() {
    let err = preprocess_err("package main\n\nimport \"strconv\"\n\nfunc main() {\n\tprintln(strconv.atoi(\"1\"))\n}\n");
    assert!(err.contains("not exported"), "{err}");
}

#[test]
fn test_dot_import_rejected() {
    let err = preprocess_err("package main\n\nimport . \"strings\"\n\nfunc main() {}\n");
    assert!(err.contains("dot imports are not supported"), "{err}");
}
