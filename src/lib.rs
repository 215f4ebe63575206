//! # Ember
//!
//! A bytecode compiler and stack-based virtual machine for a small
//! dynamically-typed scripting language, with a mark-and-sweep garbage
//! collector. This crate is the library half of the `ember` package: it
//! exposes [`Vm`], the single entry point an embedder (the CLI binary,
//! the REPL, or `tests/scenarios.rs`) drives to compile and run source
//! text.
//!
//! ## Layout
//! - [`scanner`] turns source bytes into a token stream.
//! - [`compiler`] drives a single-pass Pratt parser over that stream,
//!   emitting bytecode into a [`chunk::Chunk`].
//! - [`vm`] executes the compiled bytecode on a stack machine.
//! - [`object`] + [`memory`] implement the garbage-collected heap every
//!   non-primitive [`value::Value`] lives on.
//! - [`table`] is the open-addressed hash map backing globals, method
//!   tables, instance fields, and the string-intern set.
//! - [`error`] defines the result/error types [`Vm::interpret`] returns.
//! - [`debug`] is a developer-mode bytecode disassembler, compiled only
//!   under the `trace` feature.

pub mod chunk;
pub mod compiler;
pub mod error;
pub mod memory;
pub mod object;
pub mod repl;
pub mod scanner;
pub mod table;
pub mod value;
pub mod vm;

#[cfg(feature = "trace")]
pub mod debug;

pub use error::{InterpretResult, RuntimeError};
pub use value::Value;
pub use vm::Vm;
