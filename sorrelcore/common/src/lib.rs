//! Shared source positions and error types for the Sorrel BASIC engine.

use std::fmt;

/// A (line, column) source position, 1-based. Attached to tokens, AST
/// nodes, and instructions so every diagnostic can point at source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Locus {
    pub line: u32,
    pub col: u32,
}

impl Locus {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// A compile-time diagnostic: lexical, syntactic, or semantic.
#[derive(Clone, Debug, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub locus: Locus,
}

impl CompileError {
    pub fn new(message: impl Into<String>, locus: Locus) -> Self {
        Self { message: message.into(), locus }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.locus)
    }
}

impl std::error::Error for CompileError {}

/// Runtime trap kinds with their wire-visible numeric codes. The code set
/// is closed; faults without a dedicated code (type mismatches, bad
/// subscripts, exhausted DATA) surface as `IoError` with a descriptive
/// message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Trap {
    DivisionByZero = 101,
    StackOverflow = 201,
    StackUnderflow = 202,
    UnknownSyscall = 301,
    IoError = 401,
}

impl Trap {
    pub fn code(self) -> u16 {
        self as u16
    }
}

/// A runtime error decorated with the locus of the instruction that
/// raised it. Execution suspends when one of these surfaces.
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeError {
    pub trap: Trap,
    pub message: String,
    pub locus: Locus,
}

impl RuntimeError {
    pub fn new(trap: Trap, message: impl Into<String>) -> Self {
        Self { trap, message: message.into(), locus: Locus::default() }
    }

    pub fn at(mut self, locus: Locus) -> Self {
        if self.locus == Locus::default() {
            self.locus = locus;
        }
        self
    }

    pub fn code(&self) -> u16 {
        self.trap.code()
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {} at {}", self.code(), self.message, self.locus)
    }
}

impl std::error::Error for RuntimeError {}

/// Umbrella error for front ends that drive the whole pipeline.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{}", format_errors(.0))]
    Compile(Vec<CompileError>),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

fn format_errors(errors: &[CompileError]) -> String {
    errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n")
}

pub type RunResult<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_codes_are_stable() {
        assert_eq!(Trap::DivisionByZero.code(), 101);
        assert_eq!(Trap::StackOverflow.code(), 201);
        assert_eq!(Trap::StackUnderflow.code(), 202);
        assert_eq!(Trap::UnknownSyscall.code(), 301);
        assert_eq!(Trap::IoError.code(), 401);
    }

    #[test]
    fn runtime_error_keeps_first_locus() {
        let e = RuntimeError::new(Trap::DivisionByZero, "division by zero")
            .at(Locus::new(3, 7))
            .at(Locus::new(9, 9));
        assert_eq!(e.locus, Locus::new(3, 7));
        assert_eq!(e.to_string(), "error 101: division by zero at 3:7");
    }
}
