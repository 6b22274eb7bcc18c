//! The native functions every [`VM`] starts with.

use std::{cmp::Ordering, time::{SystemTime, UNIX_EPOCH}};
use rand::Rng;
use crate::{object::NativeFn, value::Value, vm::VM};

/// Registers the default library into `vm`'s globals.
pub fn define_defaults(vm: &mut VM) {
    const DEFAULTS: &[(&str, i32, NativeFn)] = &[
        ("clock", 0, clock),
        ("print", 1, print),
        // zero or one argument
        ("println", -1, println),
        ("random", 2, random),
    ];
    for &(name, arity, function) in DEFAULTS {
        vm.define_native(name, arity, function);
    }
}

fn clock(_vm: &mut VM, _args: &[Value]) -> Result<Value, String> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| e.to_string())?;
    Ok(Value::Number(elapsed.as_millis() as f64))
}

fn print(vm: &mut VM, args: &[Value]) -> Result<Value, String> {
    write!(vm.output(), "{}", args[0]).map_err(|e| format!("Failed to write output: {}.", e))?;
    Ok(Value::Nil)
}

fn println(vm: &mut VM, args: &[Value]) -> Result<Value, String> {
    let out = vm.output();
    let written = match args.first() {
        Some(value) => writeln!(out, "{}", value),
        None => writeln!(out),
    };
    written.map_err(|e| format!("Failed to write output: {}.", e))?;
    Ok(Value::Nil)
}

fn random(_vm: &mut VM, args: &[Value]) -> Result<Value, String> {
    let (Some(lo), Some(hi)) = (args[0].as_number(), args[1].as_number()) else {
        return Err("Arguments to 'random' must be numbers.".to_string());
    };
    if lo.partial_cmp(&hi) != Some(Ordering::Less) {
        return Err("Lower bound must be less than upper bound.".to_string());
    }
    if !lo.is_finite() || !hi.is_finite() || !(hi - lo).is_finite() {
        return Err("Bounds of 'random' must be finite.".to_string());
    }
    Ok(Value::Number(rand::thread_rng().gen_range(lo..hi)))
}
