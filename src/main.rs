//! # Ember CLI
//!
//! The process entry point: wires the library's [`ember::Vm`] to
//! `stdin`/a file path/the process exit code, the Rust shape of clox's
//! `main()`.
//!
//! - Zero args → interactive REPL ([`repl::repl_interpret`]).
//! - `-h`/`--help` or `-v`/`--version` → print and exit 0.
//! - One (other) arg → read that path as source, run it. Exit 0 on
//!   success, 65 on a compile error, 70 on a runtime error, 74 if the
//!   file can't be read.
//! - More than one arg → usage error on stderr.

use std::fs;
use std::process::ExitCode;

use ember::error::InterpretResult;
use ember::repl;
use ember::vm::Vm;

const EXIT_COMPILE_ERROR: u8 = 65;
const EXIT_RUNTIME_ERROR: u8 = 70;
const EXIT_FILE_ERROR: u8 = 74;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn usage() -> String {
    format!(
        "Ember v{0}\n\nUsage:\n    ember [script]\n\nArguments:\n    \
         [script]\n        Path to a source file to execute. With no script,\n        \
         starts an interactive REPL.\n\nOptions:\n    -h, --help\n        Show this help message and exit.\n    \
         -v, --version\n        Show the interpreter version.",
        VERSION
    )
}

fn run_file(path: &str) -> ExitCode {
    let source = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => {
            eprintln!("Could not open file \"{}\".", path);
            return ExitCode::from(EXIT_FILE_ERROR);
        }
    };

    let mut vm = Vm::new();
    match vm.interpret(&source) {
        InterpretResult::Ok => ExitCode::SUCCESS,
        InterpretResult::CompileError => ExitCode::from(EXIT_COMPILE_ERROR),
        InterpretResult::RuntimeError(_) => ExitCode::from(EXIT_RUNTIME_ERROR),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    match args.len() {
        1 => {
            repl::repl_interpret();
            ExitCode::SUCCESS
        }
        2 if args[1] == "-h" || args[1] == "--help" => {
            println!("{}", usage());
            ExitCode::SUCCESS
        }
        2 if args[1] == "-v" || args[1] == "--version" => {
            println!("ember {}", VERSION);
            ExitCode::SUCCESS
        }
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: ember [path]");
            ExitCode::from(64)
        }
    }
}
