//! VM-level tests that need to inspect captured stdout/stderr directly
//! (`Vm::with_writers`) rather than just the pass/fail `InterpretResult`
//! the sibling `ops_*` test modules check. Scenario-level black-box tests
//! against `ember::Vm` live in `tests/scenarios.rs` instead.

use super::*;
use crate::error::InterpretResult;

/// Capture both streams through a shared buffer, sidestepping the
/// move-only `Box<dyn Write>` signature `with_writers` takes.
fn capture(src: &str) -> (String, String, InterpretResult) {
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SharedWriter(Rc<RefCell<Vec<u8>>>);
    impl std::io::Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let out_buf = Rc::new(RefCell::new(Vec::new()));
    let err_buf = Rc::new(RefCell::new(Vec::new()));
    let mut vm = Vm::with_writers(
        Box::new(SharedWriter(out_buf.clone())),
        Box::new(SharedWriter(err_buf.clone())),
    );
    let result = vm.interpret(src.as_bytes());
    let out = String::from_utf8(out_buf.borrow().clone()).unwrap();
    let err = String::from_utf8(err_buf.borrow().clone()).unwrap();
    (out, err, result)
}

#[test]
fn print_statement_writes_to_out_not_err() {
    let (out, err, result) = capture("print 1 + 2;");
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "3\n");
    assert!(err.is_empty());
}

#[test]
fn runtime_error_reports_a_line_and_frame_trace() {
    let (out, err, result) = capture("fun f() { return 1 + \"x\"; }\nf();");
    assert!(matches!(result, InterpretResult::RuntimeError(_)));
    assert!(out.is_empty());
    assert!(err.contains("Operands must be two numbers or two strings."));
    assert!(err.contains("[line 1] in f()"));
    assert!(err.contains("[line 2] in script"));
}

#[test]
fn compile_error_is_reported_without_running() {
    let (out, _err, result) = capture("var = 1;");
    assert_eq!(result, InterpretResult::CompileError);
    assert!(out.is_empty());
}

#[test]
fn stress_gc_produces_identical_output_to_normal_mode() {
    // Whether or not this binary was built with `--features stress_gc`,
    // running the same program must produce the same observable output;
    // this test just exercises enough allocation to matter either way.
    let src = "fun make(n) { var xs = nil; var i = 0; \
               while (i < n) { fun id(x) { return x; } xs = id(i); i = i + 1; } \
               return xs; } print make(50);";
    let (out, _err, result) = capture(src);
    assert_eq!(result, InterpretResult::Ok);
    assert_eq!(out, "49\n");
}
