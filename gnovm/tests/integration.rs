//! Integration tests for gnovm
//!
//! Whole programs through the full pipeline: parse, load imports,
//! preprocess, initialize and run `main`.

use gnovm::interp::OutputSink;
use gnovm::runtime::{Runtime, RuntimeOptions};
use gnovm::run_source;

/// Helper to run a `main` body and return its output
fn run_main(body: &str) -> String {
    run_program(&format!("package main\n\nfunc main() {{\n{body}\n}}\n"))
}

/// Helper to run a whole file and return its output
fn run_program(source: &str) -> String {
    match run_source("main.gno", source) {
        Ok(out) => out,
        Err(e) => panic!("program failed: {e}\n{source}"),
    }
}

/// Helper to run a whole file that must fail
fn run_fails(source: &str) -> String {
    match run_source("main.gno", source) {
        Ok(out) => panic!("program should fail, printed {out:?}"),
        Err(e) => e.to_string(),
    }
}

// ============================================
// Basics
// ============================================

#[test]
fn test_arithmetic() {
    assert_eq!(run_main("println(1 + 2*3, 7/2, 7%3, -7/2)"), "7 3 1 -3\n");
}

#[test]
fn test_integer_wraparound() {
    assert_eq!(run_main("var x int8 = 127\nx++\nprintln(x)"), "-128\n");
    assert_eq!(run_main("var u uint8 = 0\nu--\nprintln(u)"), "255\n");
}

#[test]
fn test_strings() {
    assert_eq!(
        run_main("s := \"héllo\"\nprintln(len(s), s[0], s[1:3] == \"é\", s + \"!\")"),
        "6 104 true héllo!\n"
    );
}

#[test]
fn test_floats() {
    assert_eq!(run_main("x := 1.5\nprintln(x*2, x/3)"), "3 0.5\n");
}

#[test]
fn test_big_untyped_constants() {
    let src = "package main\n\nconst big = 1 << 100\n\nfunc main() {\n\tprintln(big >> 98)\n}\n";
    assert_eq!(run_program(src), "4\n");
}

#[test]
fn test_conversions() {
    assert_eq!(
        run_main("f := 3.9\ni := int(f)\nprintln(i, float64(i)/2, string(rune(65)), uint8(200 + 55))"),
        "3 1.5 A 255\n"
    );
}

// ============================================
// Control flow
// ============================================

#[test]
fn test_for_loops() {
    assert_eq!(
        run_main("t := 0\nfor i := 0; i < 5; i++ {\n\tif i == 3 {\n\t\tcontinue\n\t}\n\tt += i\n}\nprintln(t)"),
        "7\n"
    );
}

#[test]
fn test_labeled_break() {
    let body = "n := 0\nouter:\nfor i := 0; i < 3; i++ {\n\tfor j := 0; j < 3; j++ {\n\t\tif j == 2 {\n\t\t\tcontinue outer\n\t\t}\n\t\tif i == 2 {\n\t\t\tbreak outer\n\t\t}\n\t\tn++\n\t}\n}\nprintln(n)";
    assert_eq!(run_main(body), "4\n");
}

#[test]
fn test_goto() {
    let body = "i := 0\nloop:\nif i < 3 {\n\ti++\n\tgoto loop\n}\nprintln(i)";
    assert_eq!(run_main(body), "3\n");
}

#[test]
fn test_switch_fallthrough() {
    let body = "switch x := 2; x {\ncase 1:\n\tprintln(\"one\")\ncase 2:\n\tprintln(\"two\")\n\tfallthrough\ncase 3:\n\tprintln(\"three\")\ndefault:\n\tprintln(\"other\")\n}";
    assert_eq!(run_main(body), "two\nthree\n");
}

#[test]
fn test_switch_without_tag() {
    let body = "x := 5\nswitch {\ncase x < 3:\n\tprintln(\"small\")\ncase x < 10:\n\tprintln(\"medium\")\n}";
    assert_eq!(run_main(body), "medium\n");
}

#[test]
fn test_range_forms() {
    let body = "s := []string{\"a\", \"b\"}\nfor i, v := range s {\n\tprintln(i, v)\n}\nfor i := range \"hé\" {\n\tprint(i)\n}\nprintln()";
    assert_eq!(run_main(body), "0 a\n1 b\n01\n");
}

// ============================================
// Functions and closures
// ============================================

#[test]
fn test_recursion() {
    let src = "package main\n\nfunc fib(n int) int {\n\tif n < 2 {\n\t\treturn n\n\t}\n\treturn fib(n-1) + fib(n-2)\n}\n\nfunc main() {\n\tprintln(fib(20))\n}\n";
    assert_eq!(run_program(src), "6765\n");
}

#[test]
fn test_deep_recursion_does_not_overflow_host_stack() {
    let src = "package main\n\nfunc depth(n int) int {\n\tif n == 0 {\n\t\treturn 0\n\t}\n\treturn depth(n-1) + 1\n}\n\nfunc main() {\n\tprintln(depth(100000))\n}\n";
    assert_eq!(run_program(src), "100000\n");
}

#[test]
fn test_multiple_results() {
    let src = "package main\n\nfunc divmod(a, b int) (q, r int) {\n\tq = a / b\n\tr = a % b\n\treturn\n}\n\nfunc main() {\n\tq, r := divmod(17, 5)\n\tprintln(q, r)\n}\n";
    assert_eq!(run_program(src), "3 2\n");
}

#[test]
fn test_closure_counter() {
    let src = "package main\n\nfunc counter() func() int {\n\tn := 0\n\treturn func() int {\n\t\tn++\n\t\treturn n\n\t}\n}\n\nfunc main() {\n\tc := counter()\n\tc()\n\tc()\n\tprintln(c())\n}\n";
    assert_eq!(run_program(src), "3\n");
}

#[test]
fn test_loop_variable_per_iteration() {
    let body = "var fs []func() int\nfor i := 0; i < 3; i++ {\n\tfs = append(fs, func() int { return i })\n}\nfor _, f := range fs {\n\tprint(f())\n}\nprintln()";
    assert_eq!(run_main(body), "012\n");
}

#[test]
fn test_defer_order_and_named_results() {
    let src = "package main\n\nfunc f() (n int) {\n\tdefer func() { n *= 2 }()\n\tdefer println(\"deferred\")\n\treturn 21\n}\n\nfunc main() {\n\tprintln(f())\n}\n";
    assert_eq!(run_program(src), "deferred\n42\n");
}

#[test]
fn test_recover() {
    let src = "package main\n\nfunc safe() (msg string) {\n\tdefer func() {\n\t\tif r := recover(); r != nil {\n\t\t\tmsg = \"recovered\"\n\t\t}\n\t}()\n\tvar s []int\n\t_ = s[3]\n\treturn \"unreachable\"\n}\n\nfunc main() {\n\tprintln(safe())\n}\n";
    assert_eq!(run_program(src), "recovered\n");
}

#[test]
fn test_unrecovered_panic() {
    let src = "package main\n\nfunc main() {\n\tpanic(\"boom\")\n}\n";
    let err = run_fails(src);
    assert!(err.contains("boom"), "{err}");
}

// ============================================
// Composite types
// ============================================

#[test]
fn test_slices_share_backing_array() {
    let body = "a := []int{1, 2, 3, 4}\nb := a[1:3]\nb[0] = 20\nprintln(a[1], len(b), cap(b))\nb = append(b, 30)\nprintln(a[3])";
    assert_eq!(run_main(body), "20 2 3\n30\n");
}

#[test]
fn test_arrays_are_values() {
    let body = "a := [3]int{1, 2, 3}\nb := a\nb[0] = 9\nprintln(a[0], b[0], len(a))";
    assert_eq!(run_main(body), "1 9 3\n");
}

#[test]
fn test_maps() {
    let body = "m := map[string]int{\"a\": 1}\nm[\"b\"] = 2\nv, ok := m[\"c\"]\nprintln(len(m), m[\"b\"], v, ok)\ndelete(m, \"a\")\n_, ok = m[\"a\"]\nprintln(len(m), ok)";
    assert_eq!(run_main(body), "2 2 0 false\n1 false\n");
}

#[test]
fn test_structs_and_pointers() {
    let src = "package main\n\ntype Point struct {\n\tX, Y int\n}\n\nfunc (p *Point) Move(dx int) {\n\tp.X += dx\n}\n\nfunc (p Point) Sum() int {\n\treturn p.X + p.Y\n}\n\nfunc main() {\n\tp := Point{1, 2}\n\tp.Move(10)\n\tq := &p\n\tq.Y = 5\n\tprintln(p.Sum(), q.Sum())\n}\n";
    assert_eq!(run_program(src), "16 16\n");
}

#[test]
fn test_embedded_promotion() {
    let src = "package main\n\ntype Base struct{ ID int }\n\nfunc (b Base) Describe() string { return \"base\" }\n\ntype Item struct {\n\tBase\n\tName string\n}\n\nfunc main() {\n\tit := Item{Base{7}, \"x\"}\n\tprintln(it.ID, it.Describe(), it.Name)\n}\n";
    assert_eq!(run_program(src), "7 base x\n");
}

// ============================================
// Interfaces
// ============================================

#[test]
fn test_interface_dispatch() {
    let src = "package main\n\ntype Shape interface {\n\tArea() int\n}\n\ntype Sq struct{ s int }\n\nfunc (q Sq) Area() int { return q.s * q.s }\n\ntype Rect struct{ w, h int }\n\nfunc (r *Rect) Area() int { return r.w * r.h }\n\nfunc main() {\n\tshapes := []Shape{Sq{3}, &Rect{2, 5}}\n\tt := 0\n\tfor _, s := range shapes {\n\t\tt += s.Area()\n\t}\n\tprintln(t)\n}\n";
    assert_eq!(run_program(src), "19\n");
}

#[test]
fn test_type_switch() {
    let src = "package main\n\nfunc kind(x interface{}) string {\n\tswitch v := x.(type) {\n\tcase int:\n\t\treturn \"int\"\n\tcase string:\n\t\treturn \"string \" + v\n\tcase nil:\n\t\treturn \"nil\"\n\t}\n\treturn \"other\"\n}\n\nfunc main() {\n\tprintln(kind(1), kind(\"s\"), kind(nil), kind(1.5))\n}\n";
    assert_eq!(run_program(src), "int string s nil other\n");
}

#[test]
fn test_type_assertion() {
    let body = "var x interface{} = 3\nn, ok := x.(int)\ns, ok2 := x.(string)\nprintln(n, ok, s == \"\", ok2)";
    assert_eq!(run_main(body), "3 true true false\n");
}

#[test]
fn test_failed_type_assertion_panics() {
    let src = "package main\n\nfunc main() {\n\tvar x interface{} = 3\n\tprintln(x.(string))\n}\n";
    let err = run_fails(src);
    assert!(err.contains("interface conversion"), "{err}");
}

// ============================================
// Standard library
// ============================================

#[test]
fn test_strconv_atoi_error() {
    let src = "package main\n\nimport \"strconv\"\n\nfunc main() {\n\t_, err := strconv.Atoi(\"x\")\n\tprintln(err.Error())\n\tn, err := strconv.Atoi(\"12\")\n\tprintln(n+1, err == nil)\n}\n";
    assert_eq!(run_program(src), "strconv.Atoi: parsing \"x\": invalid syntax\n13 true\n");
}

#[test]
fn test_strings_package() {
    let src = "package main\n\nimport \"strings\"\n\nfunc main() {\n\tparts := strings.Split(\"a,b,c\", \",\")\n\tprintln(len(parts), strings.Join(parts, \"-\"), strings.ToUpper(\"go\"), strings.Repeat(\"ab\", 2))\n}\n";
    assert_eq!(run_program(src), "3 a-b-c GO abab\n");
}

#[test]
fn test_errors_new() {
    let src = "package main\n\nimport \"errors\"\n\nvar ErrX = errors.New(\"x failed\")\n\nfunc main() {\n\terr := ErrX\n\tprintln(err.Error(), err == ErrX, errors.New(\"x failed\") == ErrX)\n}\n";
    assert_eq!(run_program(src), "x failed true false\n");
}

// ============================================
// Initialization
// ============================================

#[test]
fn test_init_functions_run_after_vars() {
    let src = "package main\n\nvar x = 1\n\nfunc init() {\n\tx *= 10\n}\n\nfunc init() {\n\tx++\n}\n\nfunc main() {\n\tprintln(x)\n}\n";
    assert_eq!(run_program(src), "11\n");
}

#[test]
fn test_deterministic_initialization_order() {
    let src = "package main\n\nvar (\n\ta = c + b\n\tb = f()\n\tc = f()\n\td = 3\n\te = a + d\n\tg = e * 2\n)\n\nfunc f() int {\n\td++\n\treturn d\n}\n\nfunc main() {\n\tprintln(a, b, c, d, e, g)\n}\n";
    let first = run_program(src);
    assert_eq!(first, "9 4 5 5 14 28\n");
    for _ in 0..100 {
        assert_eq!(run_program(src), first);
    }
}

// ============================================
// Options
// ============================================

#[test]
fn test_max_ops() {
    let (output, _) = OutputSink::buffer();
    let mut rt = Runtime::new(RuntimeOptions {
        max_ops: Some(10_000),
        output,
        debug: false,
    })
    .unwrap();
    let src = "package main\n\nfunc main() {\n\tn := 0\n\tfor {\n\t\tn++\n\t}\n}\n";
    let err = rt
        .run_files(&[("main.gno".to_string(), src.to_string())])
        .unwrap_err();
    assert!(err.to_string().contains("out of gas"), "{err}");
}

#[test]
fn test_multiple_files() {
    let (output, buf) = OutputSink::buffer();
    let mut rt = Runtime::new(RuntimeOptions {
        output,
        ..RuntimeOptions::default()
    })
    .unwrap();
    let files = vec![
        ("a.gno".to_string(), "package main\n\nfunc main() {\n\tprintln(helper())\n}\n".to_string()),
        ("b.gno".to_string(), "package main\n\nfunc helper() string { return \"from b\" }\n".to_string()),
    ];
    rt.run_files(&files).unwrap();
    assert_eq!(buf.borrow().as_str(), "from b\n");
}
