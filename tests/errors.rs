mod common;

use common::*;
use lox::{Config, InterpretError};

#[test]
fn type_errors_in_operators() {
    assert_eq!(assert_runtime_error("\"a\" + 1;").message, "Operands must be two numbers or two strings.");
    assert_eq!(assert_runtime_error("1 - \"a\";").message, "Operands must be numbers.");
    assert_eq!(assert_runtime_error("nil < 1;").message, "Operands must be numbers.");
    assert_eq!(assert_runtime_error("-\"a\";").message, "Operand must be a number.");
}

#[test]
fn arity_mismatch_and_non_callable_are_distinct() {
    let arity = assert_runtime_error("fun f(a, b) {} f(1);");
    assert_eq!(arity.message, "Expected 2 arguments but got 1.");
    let not_callable = assert_runtime_error("var x = 1; x();");
    assert_eq!(not_callable.message, "Can only call functions and classes.");
    let class_arity = assert_runtime_error("class A {} A(1);");
    assert_eq!(class_arity.message, "Expected 0 arguments but got 1.");
}

#[test]
fn undefined_names() {
    assert_eq!(assert_runtime_error("println(nope);").message, "Undefined variable 'nope'.");
    assert_eq!(assert_runtime_error("nope = 1;").message, "Undefined variable 'nope'.");
    assert_eq!(assert_runtime_error("class A {} A().missing;").message, "Undefined property 'missing'.");
    assert_eq!(assert_runtime_error("class A {} A().missing();").message, "Undefined property 'missing'.");
}

#[test]
fn property_access_on_non_instances() {
    assert_eq!(assert_runtime_error("var s = \"str\"; s.len;").message, "Only instances have properties.");
    assert_eq!(assert_runtime_error("var n = 1; n.x = 2;").message, "Only instances have fields.");
    assert_eq!(assert_runtime_error("var n = 1; n.f();").message, "Only instances have methods.");
}

#[test]
fn superclass_must_be_a_class() {
    let err = assert_runtime_error("var NotAClass = 1; class B < NotAClass {}");
    assert_eq!(err.message, "Superclass must be a class.");
}

#[test]
fn runtime_error_reports_the_call_stack() {
    let err = assert_runtime_error(
        "fun inner() {\n\
           return 1 + nil;\n\
         }\n\
         fun outer() {\n\
           inner();\n\
         }\n\
         outer();",
    );
    assert_eq!(
        err.to_string(),
        "Operands must be two numbers or two strings.\n\
         [line 2] in inner()\n\
         [line 5] in outer()\n\
         [line 7] in script"
    );
}

#[test]
fn deep_recursion_is_a_stack_overflow() {
    let config = Config {max_frames: 32, ..Config::default()};
    let err = runtime_error_with(config, "fun f(n) { return f(n + 1); } f(0);");
    assert_eq!(err.message, "Stack overflow.");
    assert_eq!(err.trace.len(), 32);
}

#[test]
fn value_stack_limit_is_enforced() {
    let config = Config {max_stack: 8, ..Config::default()};
    let err = runtime_error_with(config, "fun f(a, b, c, d, e) { return a; } f(1, 2, 3, 4, f(1, 2, 3, 4, 5));");
    assert_eq!(err.message, "Stack overflow.");
}

#[test]
fn compile_errors_are_collected_per_statement() {
    let errors = assert_compile_error("var a = ;\nvar b = 1\nprintln(a);");
    assert_eq!(
        errors,
        vec![
            "[line 1] Error at ';': Expect expression.",
            "[line 3] Error at 'println': Expect ';' after variable declaration(s).",
        ]
    );
}

#[test]
fn exit_codes_distinguish_error_classes() {
    let (compile, _) = run("1 +;");
    assert!(matches!(compile, Err(InterpretError::Compile(_))));
    assert_eq!(compile.unwrap_err().exit_code(), 65);

    let (runtime, _) = run("nil();");
    assert_eq!(runtime.unwrap_err().exit_code(), 70);
}

#[test]
fn vm_is_usable_after_a_runtime_error() {
    let (mut vm, out) = vm_with(Config::default());
    assert!(vm.interpret("var x = 1; fun f() { return nil + 1; } f();").is_err());
    vm.interpret("println(x);").unwrap();
    assert_eq!(out.take(), "1\n");
}

#[test]
fn output_before_an_error_is_kept() {
    let (result, out) = run("println(\"first\"); nil + 1; println(\"never\");");
    assert!(result.is_err());
    assert_eq!(out, "first\n");
}
