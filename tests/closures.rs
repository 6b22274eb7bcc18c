mod common;

use common::*;

#[test]
fn counter_keeps_its_state() {
    let out = assert_success(
        "fun makeCounter() {\n\
           var count = 0;\n\
           fun inc() { count = count + 1; return count; }\n\
           return inc;\n\
         }\n\
         var c = makeCounter();\n\
         println(c()); println(c()); println(c());",
    );
    assert_eq!(out, "1\n2\n3\n");
}

#[test]
fn counters_are_independent() {
    let out = assert_success(
        "fun makeCounter() { var n = 0; fun inc() { n = n + 1; return n; } return inc; }\n\
         var a = makeCounter(); var b = makeCounter();\n\
         a(); a();\n\
         println(a()); println(b());",
    );
    assert_eq!(out, "3\n1\n");
}

#[test]
fn closures_share_a_captured_variable() {
    let out = assert_success(
        "var get; var set;\n\
         fun make() {\n\
           var value = \"before\";\n\
           fun g() { return value; }\n\
           fun s(v) { value = v; }\n\
           get = g; set = s;\n\
         }\n\
         make();\n\
         set(\"after\");\n\
         println(get());",
    );
    assert_eq!(out, "after\n");
}

#[test]
fn capture_sees_assignments_before_close() {
    let out = assert_success(
        "var f;\n\
         {\n\
           var x = 1;\n\
           fun show() { println(x); }\n\
           f = show;\n\
           x = 2;\n\
         }\n\
         f();",
    );
    assert_eq!(out, "2\n");
}

#[test]
fn each_loop_iteration_body_block_gets_its_own_variable() {
    let out = assert_success(
        "var fs0; var fs1;\n\
         for (var i = 0; i < 2; i = i + 1) {\n\
           var j = i;\n\
           fun f() { return j; }\n\
           if (i == 0) fs0 = f; else fs1 = f;\n\
         }\n\
         println(fs0()); println(fs1());",
    );
    assert_eq!(out, "0\n1\n");
}

#[test]
fn upvalues_reach_through_several_levels() {
    let out = assert_success(
        "fun outer() {\n\
           var x = \"outer\";\n\
           fun middle() {\n\
             fun inner() { return x; }\n\
             return inner;\n\
           }\n\
           return middle;\n\
         }\n\
         println(outer()()());",
    );
    assert_eq!(out, "outer\n");
}

#[test]
fn closure_displays_as_its_function() {
    let out = assert_success("fun f() { fun g() {} return g; } println(f());");
    assert_eq!(out, "<fn g>\n");
}
