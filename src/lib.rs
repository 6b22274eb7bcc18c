pub mod chunk;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod errors;
pub mod interpreter;
pub mod natives;
pub mod object;
pub mod scanner;
pub mod value;
pub mod vm;

pub use config::Config;
pub use errors::{CompileError, InterpretError, RuntimeError};
pub use interpreter::interpret;
pub use value::Value;
pub use vm::VM;
