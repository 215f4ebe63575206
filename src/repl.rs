//! # Interactive REPL
//!
//! A line-at-a-time read-eval-print loop, the Rust shape of clox's
//! `repl()`: one persistent [`Vm`] lives
//! for the whole session, so a `var` or `fun` defined on one line is
//! still visible on the next (globals, not locals — same as clox, since
//! each line is compiled as its own top-level script). EOF (Ctrl+D)
//! exits with status 0; there is no multi-line continuation, brace
//! tracking, or history buffer — `interpret` just runs whatever is on
//! the line, compile errors and all, the way clox's loop does.

use std::io::{self, Write};

use crate::vm::Vm;

pub fn repl_interpret() {
    let mut vm = Vm::new();
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut line = String::new();
        let bytes_read = match stdin.read_line(&mut line) {
            Ok(n) => n,
            Err(_) => break,
        };
        if bytes_read == 0 {
            println!();
            break;
        }

        vm.interpret(line.as_bytes());
    }
}
