mod common;

use std::{cell::RefCell, rc::Rc};
use common::*;
use indexmap::IndexMap;
use lox::{object::Function, vm::{CallFrame, Inspector}, Config, Value};

#[test]
fn print_and_println() {
    let out = assert_success("print(\"a\"); print(1); println(); println(2.5); println(nil);");
    assert_eq!(out, "a1\n2.5\nnil\n");
}

#[test]
fn natives_display_their_names() {
    let out = assert_success("println(clock); println(println);");
    assert_eq!(out, "<native fn clock>\n<native fn println>\n");
}

#[test]
fn native_arity_is_checked() {
    let err = assert_runtime_error("println(1, 2);");
    assert_eq!(err.message, "Expected up to 1 argument(s) but got 2.");
    let err = assert_runtime_error("print();");
    assert_eq!(err.message, "Expected 1 arguments but got 0.");
    let err = assert_runtime_error("clock(1);");
    assert_eq!(err.message, "Expected 0 arguments but got 1.");
}

#[test]
fn clock_counts_milliseconds() {
    let out = assert_success("var t = clock(); println(t > 1000000000000); println(clock() >= t);");
    assert_eq!(out, "true\ntrue\n");
}

#[test]
fn random_stays_in_range() {
    let out = assert_success(
        "var ok = true;\n\
         for (var i = 0; i < 50; i = i + 1) {\n\
           var r = random(2, 3);\n\
           if (r < 2 or r >= 3) ok = false;\n\
         }\n\
         println(ok);",
    );
    assert_eq!(out, "true\n");
}

#[test]
fn random_rejects_bad_arguments() {
    assert_eq!(assert_runtime_error("random(\"a\", 1);").message, "Arguments to 'random' must be numbers.");
    let err = assert_runtime_error("random(5, 5);");
    assert_eq!(err.message, "Lower bound must be less than upper bound.");
    assert_eq!(err.trace[0].line, 1);
    let huge = format!("1{}", "0".repeat(308));
    let wide = format!("random(-{0}, {0});", huge);
    for source in ["random(0, 1/0);", "random(-1/0, 0);", wide.as_str()] {
        assert_eq!(assert_runtime_error(source).message, "Bounds of 'random' must be finite.");
    }
}

#[test]
fn captured_locals_survive_a_runtime_error() {
    let (mut vm, out) = vm_with(Config::default());
    let err = vm.interpret("var f; { var a; var b; var c; var x = 42; fun g() { return x; } f = g; nil + 1; }");
    assert!(err.is_err());
    vm.interpret("println(f());").unwrap();
    assert_eq!(out.take(), "42\n");

    vm.interpret("var h; { var y = \"kept\"; fun k() { return y; } h = k; -nil; }").unwrap_err();
    vm.interpret("var pad1 = 1; var pad2 = 2; println(h());").unwrap();
    assert_eq!(out.take(), "kept\n");
}

#[test]
fn native_result_replaces_the_call_window() {
    let out = assert_success("fun id(x) { return x; } println(id(println(\"inner\")));");
    assert_eq!(out, "inner\nnil\n");
}

#[test]
fn globals_persist_between_interpret_calls() {
    let (mut vm, out) = vm_with(Config::default());
    vm.interpret("var count = 1;").unwrap();
    vm.interpret("fun bump() { count = count + 1; }").unwrap();
    vm.interpret("bump(); bump();").unwrap();
    vm.interpret("println(count);").unwrap();
    assert_eq!(out.take(), "3\n");
    assert_eq!(vm.global("count"), Some(&Value::Number(3.0)));
}

#[test]
fn compile_error_does_not_disturb_globals() {
    let (mut vm, out) = vm_with(Config::default());
    vm.interpret("var kept = \"yes\";").unwrap();
    assert!(vm.interpret("var broken = ;").is_err());
    vm.interpret("println(kept);").unwrap();
    assert_eq!(out.take(), "yes\n");
    assert!(vm.global("broken").is_none());
}

#[test]
fn host_defined_natives() {
    fn twice(_vm: &mut lox::VM, args: &[Value]) -> Result<Value, String> {
        match args[0].as_number() {
            Some(n) => Ok(Value::Number(n * 2.0)),
            None => Err("twice needs a number.".to_string()),
        }
    }
    let (mut vm, out) = vm_with(Config::default());
    vm.define_native("twice", 1, twice);
    vm.interpret("println(twice(21));").unwrap();
    assert_eq!(out.take(), "42\n");
    let err = vm.interpret("twice(nil);").unwrap_err();
    assert_eq!(err.to_string(), "twice needs a number.\n[line 1] in script");
}

#[derive(Default)]
struct Recording {
    compiled: Vec<(String, Vec<String>)>,
    steps: usize,
}

struct Recorder(Rc<RefCell<Recording>>);

impl Inspector for Recorder {
    fn function_compiled(&mut self, function: &Function, locals: &[&str]) {
        let locals = locals.iter().map(|name| name.to_string()).collect();
        self.0.borrow_mut().compiled.push((function.to_string(), locals));
    }
    fn before_instruction(&mut self, _frame: &CallFrame, _globals: &IndexMap<Rc<str>, Value>, _stack: &[Value]) {
        self.0.borrow_mut().steps += 1;
    }
}

#[test]
fn inspector_sees_compilation_and_execution() {
    let recording = Rc::new(RefCell::new(Recording::default()));
    let out = SharedBuf::default();
    let mut vm = lox::VM::new(Config::default())
        .with_output(out.clone())
        .with_inspector(Box::new(Recorder(recording.clone())));
    vm.interpret("class A { m(x) { var y = x; return y; } } println(A().m(4));").unwrap();
    assert_eq!(out.take(), "4\n");

    let recording = recording.borrow();
    assert_eq!(
        recording.compiled,
        vec![
            ("<fn m>".to_string(), vec!["this".to_string(), "x".to_string(), "y".to_string()]),
            ("<script>".to_string(), vec!["".to_string()]),
        ]
    );
    assert!(recording.steps > 10);
}

#[test]
fn debug_flags_do_not_change_behavior() {
    let config = Config::from_toml_str(
        "[debug]\nmaster = true\nprint_progress = true\nprint_source = true\nprint_code = true\ntrace_execution = true\n",
    )
    .unwrap();
    let (mut vm, out) = vm_with(config);
    vm.interpret("fun f(a) { return a * 2; } println(f(3));").unwrap();
    assert_eq!(out.take(), "6\n");
}
