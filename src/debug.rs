//! # Bytecode Disassembler
//!
//! A developer-mode aid, not part of the Core: dumps a [`Chunk`]'s
//! instructions in a human-readable form. Ported from clox's `debug.c`
//! line for line in spirit — same
//! column layout (`%04d` offset, line number or `|` for a repeat,
//! left-justified mnemonic, operand) — just using Rust's `{:width$}`
//! formatting instead of `printf`.
//!
//! Compiled only under the `trace` feature: `Vm::run` calls
//! [`disassemble_instruction`] before executing each instruction, and
//! `Compiler::end_function_scope` calls [`disassemble_chunk`] once a
//! function's bytecode is complete. Neither call site exists in a
//! non-trace build, so this module is never linked into a release binary.

use crate::chunk::{Chunk, OpCode};

/// Dump every instruction in `chunk` under a `== name ==` banner, matching
/// clox's `disassembleChunk`.
pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {} ==", name);
    let mut offset = 0;
    while offset < chunk.code_len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

/// Print one instruction at `offset` and return the offset of the next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{:04} ", offset);
    if offset > 0 && chunk.lines[offset] == chunk.lines[offset - 1] {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.lines[offset]);
    }

    let op = OpCode::from_u8(chunk.code[offset]);
    match op {
        OpCode::Constant => constant_instruction("CONSTANT", chunk, offset),
        OpCode::Nil => simple_instruction("NIL", offset),
        OpCode::True => simple_instruction("TRUE", offset),
        OpCode::False => simple_instruction("FALSE", offset),
        OpCode::Pop => simple_instruction("POP", offset),
        OpCode::GetLocal => byte_instruction("GET_LOCAL", chunk, offset),
        OpCode::SetLocal => byte_instruction("SET_LOCAL", chunk, offset),
        OpCode::GetGlobal => constant_instruction("GET_GLOBAL", chunk, offset),
        OpCode::DefineGlobal => constant_instruction("DEFINE_GLOBAL", chunk, offset),
        OpCode::SetGlobal => constant_instruction("SET_GLOBAL", chunk, offset),
        OpCode::GetUpvalue => byte_instruction("GET_UPVALUE", chunk, offset),
        OpCode::SetUpvalue => byte_instruction("SET_UPVALUE", chunk, offset),
        OpCode::GetProperty => constant_instruction("GET_PROPERTY", chunk, offset),
        OpCode::SetProperty => constant_instruction("SET_PROPERTY", chunk, offset),
        OpCode::Equal => simple_instruction("EQUAL", offset),
        OpCode::Greater => simple_instruction("GREATER", offset),
        OpCode::Less => simple_instruction("LESS", offset),
        OpCode::Add => simple_instruction("ADD", offset),
        OpCode::Subtract => simple_instruction("SUBTRACT", offset),
        OpCode::Multiply => simple_instruction("MULTIPLY", offset),
        OpCode::Divide => simple_instruction("DIVIDE", offset),
        OpCode::Not => simple_instruction("NOT", offset),
        OpCode::Negate => simple_instruction("NEGATE", offset),
        OpCode::Print => simple_instruction("PRINT", offset),
        OpCode::Jump => jump_instruction("JUMP", 1, chunk, offset),
        OpCode::JumpIfFalse => jump_instruction("JUMP_IF_FALSE", 1, chunk, offset),
        OpCode::Loop => jump_instruction("LOOP", -1, chunk, offset),
        OpCode::Call => byte_instruction("CALL", chunk, offset),
        OpCode::Invoke => invoke_instruction("INVOKE", chunk, offset),
        OpCode::Closure => closure_instruction(chunk, offset),
        OpCode::CloseUpvalue => simple_instruction("CLOSE_UPVALUE", offset),
        OpCode::Return => simple_instruction("RETURN", offset),
        OpCode::Class => constant_instruction("CLASS", chunk, offset),
        OpCode::Method => constant_instruction("METHOD", chunk, offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{}", name);
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{:<16} {:4}", name, slot);
    offset + 2
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.code[offset + 1];
    println!("{:<16} {:4} '{}'", name, constant, chunk.constants[constant as usize]);
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = (hi << 8) | lo;
    let target = offset as i64 + 3 + sign as i64 * jump as i64;
    println!("{:<16} {:4} -> {}", name, offset, target);
    offset + 3
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.code[offset + 1];
    let arg_count = chunk.code[offset + 2];
    println!(
        "{:<16} ({} args) {:4} '{}'",
        name, arg_count, constant, chunk.constants[constant as usize]
    );
    offset + 3
}

/// `CLOSURE`'s operand is a function constant followed by one
/// `(is_local, index)` byte pair per upvalue — printed as clox does,
/// one indented `local`/`upvalue` line per pair after the header line.
fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let mut offset = offset + 1;
    let constant = chunk.code[offset];
    offset += 1;
    println!("{:<16} {:4} '{}'", "CLOSURE", constant, chunk.constants[constant as usize]);

    let function_ref = match chunk.constants[constant as usize] {
        crate::value::Value::Obj(r) => r,
        _ => unreachable!("CLOSURE operand is always a function constant"),
    };
    let upvalue_count = function_ref.as_function().upvalue_count;
    for _ in 0..upvalue_count {
        let is_local = chunk.code[offset];
        let index = chunk.code[offset + 1];
        println!(
            "{:04}      |                     {} {}",
            offset,
            if is_local != 0 { "local" } else { "upvalue" },
            index
        );
        offset += 2;
    }
    offset
}
