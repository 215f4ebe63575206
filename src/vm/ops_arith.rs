//! # Arithmetic, Comparison, and Unary Operations
//!
//! Handlers for `OP_ADD`/`OP_SUBTRACT`/`OP_MULTIPLY`/`OP_DIVIDE`,
//! `OP_GREATER`/`OP_LESS`, and `OP_NEGATE`. `OP_EQUAL` and `OP_NOT` are
//! simple enough that [`super::Vm::run`] inlines them directly.
//!
//! ## Coercion rules
//! - `+` accepts two numbers (adds) or two strings (concatenates); any other
//!   pairing is a [`RuntimeError::TypeMismatch`].
//! - `-`, `*`, `/`, `>`, `<` all require two numbers.
//! - Division by zero is **not** an error: it produces IEEE-754 infinity or
//!   NaN, matching plain `f64` division (deliberate — see `DESIGN.md`'s Open
//!   Question resolution; clox itself never checks for it either).

use crate::error::RuntimeError;
use crate::value::Value;

use super::Vm;

impl Vm {
    pub(super) fn op_add(&mut self) -> Result<(), RuntimeError> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(x + y));
                Ok(())
            }
            _ if a.is_string() && b.is_string() => {
                // Both operands stay on the stack (peeked, not popped) while
                // `intern` runs, so they remain GC roots until the
                // concatenated result is itself pushed and rooted.
                let concatenated = format!("{}{}", a.as_obj().unwrap().as_str(), b.as_obj().unwrap().as_str());
                let r = self.intern(&concatenated);
                self.pop();
                self.pop();
                self.push(Value::Obj(r));
                Ok(())
            }
            _ => Err(RuntimeError::TypeMismatch(
                "Operands must be two numbers or two strings.".to_string(),
            )),
        }
    }

    pub(super) fn op_compare(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.push(Value::Bool(f(a, b)));
                Ok(())
            }
            _ => Err(RuntimeError::TypeMismatch("Operands must be numbers.".to_string())),
        }
    }

    pub(super) fn op_numeric(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.push(Value::Number(f(a, b)));
                Ok(())
            }
            _ => Err(RuntimeError::TypeMismatch("Operands must be numbers.".to_string())),
        }
    }

    pub(super) fn op_negate(&mut self) -> Result<(), RuntimeError> {
        match self.peek(0).as_number() {
            Some(n) => {
                self.pop();
                self.push(Value::Number(-n));
                Ok(())
            }
            None => Err(RuntimeError::TypeMismatch("Operand must be a number.".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::InterpretResult;
    use crate::vm::Vm;

    fn run_ok(src: &str) {
        let mut vm = Vm::new();
        assert_eq!(vm.interpret(src.as_bytes()), InterpretResult::Ok);
    }

    #[test]
    fn adds_two_numbers() {
        run_ok("var x = 1 + 2; if (x != 3) { print \"wrong\"; }");
    }

    #[test]
    fn concatenates_two_strings() {
        run_ok("if (\"a\" + \"b\" != \"ab\") { print \"wrong\"; }");
    }

    #[test]
    fn division_by_zero_yields_infinity_not_error() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"1 / 0;");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn adding_number_and_string_is_type_error() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"1 + \"a\";");
        assert!(matches!(result, InterpretResult::RuntimeError(_)));
    }
}
