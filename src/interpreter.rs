use crate::{config::Config, errors::InterpretError, vm::VM};

/// Runs `source` once in a fresh VM with default limits, printing to standard output.
pub fn interpret(source: &str) -> Result<(), InterpretError> {
    interpret_with(source, Config::default())
}

pub fn interpret_with(source: &str, config: Config) -> Result<(), InterpretError> {
    VM::new(config).interpret(source)
}
