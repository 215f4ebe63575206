//! # Error Handling for the Ember VM
//!
//! This module defines the **error kinds** and **runtime errors** used
//! throughout the bytecode virtual machine, plus the top-level result type
//! returned from an `interpret` call.
//!
//! ## Design
//! - [`RuntimeError`] is a rich enum of the faults the VM can raise while
//!   executing bytecode: type mismatches, undefined names, arity mismatches,
//!   and so on. Each variant carries enough context to format the exact
//!   message text the VM prints to its error stream.
//! - [`InterpretResult`] is the sum type `Vm::interpret` returns: a program
//!   either runs to completion, fails to compile, or raises a runtime error.
//!   There is no exception-style unwinding across Rust frames; compile errors
//!   are tracked via sticky flags on the compiler and runtime errors are
//!   propagated as plain `Result` values through the dispatch loop.

use std::fmt;

/// Outcome of a single `Vm::interpret` call.
///
/// Mirrors the three-way split the driver exposes: a clean run, a compile
/// failure (diagnostics already written to the error sink), or a runtime
/// fault that unwound the VM stack.
#[derive(Debug, PartialEq)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError(RuntimeError),
}

/// Faults that can occur while executing bytecode.
///
/// Unlike a compile error (which is reported eagerly and accumulated),
/// a `RuntimeError` aborts the current `interpret` call immediately: it is
/// returned up through the dispatch loop as a plain `Result::Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// Operand(s) to an arithmetic/comparison op were not numbers.
    TypeMismatch(String),
    /// `GET_GLOBAL`/`SET_GLOBAL` referenced a name that is not defined.
    UndefinedVariable(String),
    /// `GET_PROPERTY`/`SET_PROPERTY`/`INVOKE`/`bind_method` found no such
    /// field or method on the instance/class.
    UndefinedProperty(String),
    /// A call supplied the wrong number of arguments for the callee's arity.
    ArityMismatch { expected: u8, got: u8 },
    /// `CALL`'s callee was not a closure, class, bound method, or native.
    NotCallable,
    /// Frame-count limit (`FRAMES_MAX`) exceeded by a nested call.
    StackOverflow,
    /// `GET_PROPERTY` receiver was not an instance ("Only instances have
    /// properties.") or `SET_PROPERTY` receiver was not an instance ("Only
    /// instances have fields.").
    PropertyOnNonInstance(&'static str),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::TypeMismatch(msg) => write!(f, "{}", msg),
            RuntimeError::UndefinedVariable(name) => {
                write!(f, "Undefined variable '{}'.", name)
            }
            RuntimeError::UndefinedProperty(name) => {
                write!(f, "Undefined property '{}'.", name)
            }
            RuntimeError::ArityMismatch { expected, got } => write!(
                f,
                "Expected {} arguments but got {}.",
                expected, got
            ),
            RuntimeError::NotCallable => write!(f, "Can only call functions and classes."),
            RuntimeError::StackOverflow => write!(f, "Stack overflow."),
            RuntimeError::PropertyOnNonInstance(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}
