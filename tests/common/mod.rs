#![allow(dead_code)]

use std::{cell::RefCell, io::{self, Write}, rc::Rc};
use lox::{Config, InterpretError, RuntimeError, VM};

/// Output sink that can still be read after the VM has taken ownership of a clone.
#[derive(Clone, Default)]
pub struct SharedBuf(Rc<RefCell<Vec<u8>>>);

impl SharedBuf {
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8(bytes).expect("output is valid utf-8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn vm_with(config: Config) -> (VM, SharedBuf) {
    let out = SharedBuf::default();
    let vm = VM::new(config).with_output(out.clone());
    (vm, out)
}

pub fn run(source: &str) -> (Result<(), InterpretError>, String) {
    let (mut vm, out) = vm_with(Config::default());
    let result = vm.interpret(source);
    (result, out.take())
}

pub fn assert_success(source: &str) -> String {
    let (result, output) = run(source);
    if let Err(e) = result {
        panic!("program should succeed, got:\n{}\noutput so far:\n{}", e, output);
    }
    output
}

pub fn assert_compile_error(source: &str) -> Vec<String> {
    match run(source).0 {
        Err(InterpretError::Compile(e)) => e.diagnostics.iter().map(ToString::to_string).collect(),
        other => panic!("expected a compile error, got {:?}", other),
    }
}

pub fn assert_runtime_error(source: &str) -> RuntimeError {
    runtime_error_with(Config::default(), source)
}

pub fn runtime_error_with(config: Config, source: &str) -> RuntimeError {
    let (mut vm, _) = vm_with(config);
    match vm.interpret(source) {
        Err(InterpretError::Runtime(e)) => e,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}
