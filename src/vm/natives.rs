//! # Native (Host) Functions
//!
//! Registers the language's small standard library of VM-implemented
//! built-ins — `clock`, `floor`, `random` — the same three clox ships, with
//! the same registration dance: intern the name, allocate the native
//! object, and anchor both on the VM stack across the two allocations via
//! `push`/`table_set`/`pop`/`pop` (`define_native` in clox's `vm.c`) so a
//! collection triggered by the second allocation can never see the name
//! string as unreachable.
//!
//! `random()` is backed by a hand-rolled xorshift64* generator seeded once
//! at `Vm` construction from the system clock — a narrow, explicitly-scoped
//! host-OS facility, not a general dependency on the `rand` crate.

use crate::error::RuntimeError;
use crate::value::Value;

use super::Vm;

pub(super) fn register(vm: &mut Vm) {
    define_native(vm, "clock", 0, native_clock);
    define_native(vm, "floor", 1, native_floor);
    define_native(vm, "random", 0, native_random);
}

fn define_native(vm: &mut Vm, name: &'static str, arity: u8, function: crate::object::NativeFn) {
    let interned = vm.intern(name);
    vm.push(Value::Obj(interned));
    let native = vm.new_native(name, arity, function);
    vm.push(Value::Obj(native));
    vm.globals_set(interned, vm.peek(0));
    vm.pop();
    vm.pop();
}

/// Seconds elapsed since this `Vm` was constructed, as a `f64`. clox's
/// `clockNative` reports process-wide wall-clock time via `clock() /
/// CLOCKS_PER_SEC`; `Vm` has no notion of "process start" of its own; using
/// its own construction time instead keeps determinism scoped to a single
/// interpreter instance, which is all `tests/scenarios.rs` needs.
fn native_clock(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    Ok(Value::Number(vm.start_time().elapsed().as_secs_f64()))
}

fn native_floor(_vm: &mut Vm, args: &[Value]) -> Result<Value, RuntimeError> {
    match args[0].as_number() {
        Some(n) => Ok(Value::Number(n.floor())),
        None => Err(RuntimeError::TypeMismatch("floor() argument must be a number.".to_string())),
    }
}

/// Returns a pseudo-random number in `[0, 1)`, matching clox's `randNative`
/// (`(double)rand() / RAND_MAX`-style usage) closely enough for scripts that
/// just want a stream of varying numbers — no claim of cryptographic
/// quality.
fn native_random(vm: &mut Vm, _args: &[Value]) -> Result<Value, RuntimeError> {
    let bits = vm.next_random();
    // Top 53 bits give a value uniformly distributed in [0, 1) at full
    // f64 mantissa precision, the standard xorshift-to-float trick.
    let frac = (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64);
    Ok(Value::Number(frac))
}

#[cfg(test)]
mod tests {
    use crate::error::InterpretResult;
    use crate::vm::Vm;

    #[test]
    fn clock_returns_a_number() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"var t = clock(); if (t < 0) { print \"bad\"; }");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn floor_truncates_toward_negative_infinity() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"if (floor(1.9) != 1) { print \"bad\"; }");
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn floor_rejects_wrong_arity() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"floor();");
        assert!(matches!(result, InterpretResult::RuntimeError(_)));
    }

    #[test]
    fn random_stays_within_unit_interval() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"var r = random(); if (r < 0 or r >= 1) { print \"bad\"; }");
        assert_eq!(result, InterpretResult::Ok);
    }
}
