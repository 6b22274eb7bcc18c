use std::{fmt, path::PathBuf};
use thiserror::Error;

/// Where a compile error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// At a token, holding its lexeme.
    Lexeme(String),
    End,
    /// Reported by the scanner; the message already describes the location.
    Scanner,
}

/// One compile-time diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[line {}] Error", self.line)?;
        match &self.location {
            Location::Lexeme(lexeme) => write!(f, " at '{}'", lexeme)?,
            Location::End => write!(f, " at end")?,
            Location::Scanner => {}
        }
        write!(f, ": {}", self.message)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{}", render_lines(.diagnostics))]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileError {
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.diagnostics.iter().map(|d| d.message.as_str())
    }
}

/// One entry of a runtime stack trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceLine {
    pub line: u32,
    /// `None` for the top-level script.
    pub function: Option<String>,
}

impl fmt::Display for TraceLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.function {
            Some(name) => write!(f, "[line {}] in {}()", self.line, name),
            None => write!(f, "[line {}] in script", self.line),
        }
    }
}

/// A runtime error with the call stack at the moment it was raised, innermost frame first.
#[derive(Debug, Clone, Error)]
#[error("{message}\n{}", render_lines(.trace))]
pub struct RuntimeError {
    pub message: String,
    pub trace: Vec<TraceLine>,
}

#[derive(Debug, Clone, Error)]
pub enum InterpretError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

impl InterpretError {
    /// Process exit status conventionally used for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            InterpretError::Compile(_) => 65,
            InterpretError::Runtime(_) => 70,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn render_lines<T: fmt::Display>(lines: &[T]) -> String {
    lines.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n")
}
