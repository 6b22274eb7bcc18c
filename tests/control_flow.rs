mod common;

use common::*;

#[test]
fn if_else_chains() {
    let out = assert_success(
        "fun classify(n) {\n\
           if (n < 0) return \"negative\";\n\
           else if (n == 0) return \"zero\";\n\
           else return \"positive\";\n\
         }\n\
         println(classify(-2)); println(classify(0)); println(classify(7));",
    );
    assert_eq!(out, "negative\nzero\npositive\n");
}

#[test]
fn if_without_else_leaves_stack_balanced() {
    let out = assert_success("var x = 1; if (false) x = 2; if (nil) {} println(x);");
    assert_eq!(out, "1\n");
}

#[test]
fn while_loop() {
    let out = assert_success("var i = 0; while (i < 3) { print(i); i = i + 1; } println();");
    assert_eq!(out, "012\n");
}

#[test]
fn for_loop_runs_three_times() {
    let out = assert_success("for (var i = 0; i < 3; i = i + 1) println(i);");
    assert_eq!(out, "0\n1\n2\n");
}

#[test]
fn for_loop_clauses_are_optional() {
    let out = assert_success(
        "var i = 0;\n\
         for (; i < 2;) { println(i); i = i + 1; }\n\
         for (i = 10; i < 12; i = i + 1) println(i);",
    );
    assert_eq!(out, "0\n1\n10\n11\n");
}

#[test]
fn for_loop_variable_is_scoped_to_the_loop() {
    let err = assert_runtime_error("for (var i = 0; i < 1; i = i + 1) {} println(i);");
    assert_eq!(err.message, "Undefined variable 'i'.");
}

#[test]
fn nested_loops_with_early_return() {
    let out = assert_success(
        "fun find(target) {\n\
           for (var i = 0; i < 5; i = i + 1) {\n\
             for (var j = 0; j < 5; j = j + 1) {\n\
               if (i * j == target) return i + j;\n\
             }\n\
           }\n\
           return nil;\n\
         }\n\
         println(find(6)); println(find(100));",
    );
    assert_eq!(out, "5\nnil\n");
}

#[test]
fn recursion() {
    let out = assert_success(
        "fun fib(n) { if (n < 2) return n; return fib(n - 2) + fib(n - 1); }\n\
         println(fib(15));",
    );
    assert_eq!(out, "610\n");
}

#[test]
fn functions_return_nil_by_default() {
    let out = assert_success("fun f() {} fun g() { return; } println(f()); println(g()); println(f);");
    assert_eq!(out, "nil\nnil\n<fn f>\n");
}
