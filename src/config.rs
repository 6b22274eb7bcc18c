//! Interpreter limits and debug flags.

use std::path::Path;
use serde::Deserialize;
use crate::errors::ConfigError;

/// Debug output switches. Each flag only takes effect while `master` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugFlags {
    pub master: bool,
    pub print_progress: bool,
    pub print_source: bool,
    pub print_code: bool,
    pub trace_execution: bool,
}

impl DebugFlags {
    pub fn print_progress(&self) -> bool {
        self.master && self.print_progress
    }
    pub fn print_source(&self) -> bool {
        self.master && self.print_source
    }
    pub fn print_code(&self) -> bool {
        self.master && self.print_code
    }
    pub fn trace_execution(&self) -> bool {
        self.master && self.trace_execution
    }
}

/// Limits shared by the compiler and the VM.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Value stack slots.
    pub max_stack: usize,
    /// Call frame depth.
    pub max_frames: usize,
    /// Locals per function, the reserved slot 0 included.
    pub max_locals: usize,
    pub max_upvalues: usize,
    pub max_parameters: usize,
    pub max_arguments: usize,
    /// Constant pool entries per chunk.
    pub max_constants: usize,
    pub max_jump: usize,
    pub max_loop: usize,
    pub debug: DebugFlags,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_stack: 16384,
            max_frames: 256,
            max_locals: 256,
            max_upvalues: 256,
            max_parameters: 255,
            max_arguments: 255,
            max_constants: 65536,
            max_jump: u16::MAX as usize,
            max_loop: u16::MAX as usize,
            debug: DebugFlags::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks every limit against the width of the operand that encodes it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn check(name: &str, value: usize, min: usize, max: usize) -> Result<(), ConfigError> {
            if value < min || value > max {
                return Err(ConfigError::Invalid(format!(
                    "{} must be between {} and {}, got {}", name, min, max, value
                )));
            }
            Ok(())
        }
        let byte = u8::MAX as usize;
        let short = u16::MAX as usize;
        check("max_stack", self.max_stack, 1, usize::MAX)?;
        check("max_frames", self.max_frames, 1, usize::MAX)?;
        // captured locals are encoded in a single byte
        check("max_locals", self.max_locals, 1, byte + 1)?;
        check("max_upvalues", self.max_upvalues, 1, byte + 1)?;
        check("max_parameters", self.max_parameters, 0, byte)?;
        check("max_arguments", self.max_arguments, 0, byte)?;
        check("max_constants", self.max_constants, 1, short + 1)?;
        check("max_jump", self.max_jump, 0, short)?;
        check("max_loop", self.max_loop, 0, short)?;
        Ok(())
    }
}
