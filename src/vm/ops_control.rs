//! # Calls, Closures, and Upvalues
//!
//! Everything involved in invoking a callable value (`OP_CALL`, via
//! [`Vm::call_value`]) and in building/closing over upvalues (`OP_CLOSURE`,
//! `OP_CLOSE_UPVALUE`). `OP_INVOKE` (the call-a-method-in-one-step fast path)
//! lives in [`super::ops_object`] instead, since it needs instance/class
//! lookups this module has no other reason to import.
//!
//! Upvalue capture/close are a direct port of clox's `captureUpvalue` /
//! `closeUpvalues`: the VM keeps a singly linked list of open upvalues
//! sorted by descending stack address (`Vm::open_upvalues`), so a new
//! capture only has to walk until it passes the target slot.

use crate::error::RuntimeError;
use crate::object::{ObjKind, ObjRef, UpvalueLocation};
use crate::value::Value;

use super::Vm;

impl Vm {
    /// Dispatch a call to whatever kind of callable `callee` is. `arg_count`
    /// arguments plus the callee itself already occupy the top of the stack
    /// (`callee` at `arg_count` slots below the top).
    pub(super) fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        if let Value::Obj(r) = callee {
            match r.kind() {
                ObjKind::BoundMethod => {
                    let bound = r.as_bound_method();
                    let receiver = bound.receiver;
                    let method = bound.method;
                    let callee_slot = self.stack_top() - arg_count as usize - 1;
                    self.stack_set(callee_slot, receiver);
                    return self.call_closure(method, arg_count);
                }
                ObjKind::Closure => return self.call_closure(r, arg_count),
                ObjKind::Class => {
                    let callee_slot = self.stack_top() - arg_count as usize - 1;
                    let instance = self.new_instance(r);
                    self.stack_set(callee_slot, Value::Obj(instance));
                    let initializer = r.as_class().methods.get(self.init_string());
                    return match initializer {
                        Some(Value::Obj(init)) => self.call_closure(init, arg_count),
                        _ if arg_count != 0 => Err(RuntimeError::ArityMismatch { expected: 0, got: arg_count }),
                        _ => Ok(()),
                    };
                }
                ObjKind::Native => return self.call_native(r, arg_count),
                _ => {}
            }
        }
        Err(RuntimeError::NotCallable)
    }

    pub(super) fn call_closure(&mut self, closure: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let function = closure.as_closure().function;
        let arity = function.as_function().arity;
        if arg_count != arity {
            return Err(RuntimeError::ArityMismatch { expected: arity, got: arg_count });
        }
        let slots = self.stack_top() - arg_count as usize - 1;
        self.push_frame(closure, slots)
    }

    fn call_native(&mut self, native_ref: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let native = native_ref.as_native();
        if arg_count != native.arity {
            return Err(RuntimeError::ArityMismatch { expected: native.arity, got: arg_count });
        }
        let top = self.stack_top();
        let base = top - arg_count as usize;
        let args: Vec<Value> = (0..arg_count as usize).map(|i| self.stack_get(base + i)).collect();
        let function = native.function;
        let result = function(self, &args)?;
        self.set_stack_top(base - 1);
        self.push(result);
        Ok(())
    }

    /// Emit `OP_CLOSURE`'s payload: the function constant, then one
    /// `(is_local, index)` byte pair per upvalue the compiler resolved for
    /// it (see `compiler.rs::function`).
    pub(super) fn op_closure(&mut self) {
        let function = match self.read_constant() {
            Value::Obj(r) => r,
            _ => unreachable!("OP_CLOSURE's operand is always a function constant"),
        };
        let upvalue_count = function.as_function().upvalue_count;
        let enclosing = self.current_closure();
        let frame_base = self.frame_slots();
        let mut upvalues = Vec::with_capacity(upvalue_count);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = self.read_byte() as usize;
            if is_local {
                upvalues.push(self.capture_upvalue(frame_base + index));
            } else {
                upvalues.push(enclosing.as_closure().upvalues[index]);
            }
        }
        let closure = self.new_closure(function, upvalues);
        self.push(Value::Obj(closure));
    }

    /// Find or create the open upvalue for the stack slot at `local_index`.
    /// Three outcomes, per clox's `captureUpvalue`: an existing upvalue
    /// already points here (reuse it), we walked past every open upvalue
    /// above this slot (prepend), or we stopped at one further down the
    /// stack (insert between).
    fn capture_upvalue(&mut self, local_index: usize) -> ObjRef {
        let local_ptr = self.stack_slot_ptr(local_index);
        let mut prev: Option<ObjRef> = None;
        let mut current = self.open_upvalues();
        while let Some(up) = current {
            if open_location(up) <= local_ptr {
                break;
            }
            prev = Some(up);
            current = up.as_upvalue().next_open.get();
        }
        if let Some(up) = current {
            if open_location(up) == local_ptr {
                return up;
            }
        }
        let created = self.new_open_upvalue(local_ptr);
        created.as_upvalue().next_open.set(current);
        match prev {
            Some(p) => p.as_upvalue().next_open.set(Some(created)),
            None => self.set_open_upvalues(Some(created)),
        }
        created
    }

    /// Close every open upvalue pointing at or above the stack slot
    /// `last_index`, copying its value into the upvalue itself so it
    /// survives the frame that owned that slot returning.
    pub(super) fn close_upvalues(&mut self, last_index: usize) {
        let last_ptr = self.stack_slot_ptr(last_index);
        while let Some(up) = self.open_upvalues() {
            if open_location(up) < last_ptr {
                break;
            }
            // SAFETY: still open, so this reads through a live stack slot.
            let value = unsafe { up.as_upvalue().read() };
            up.as_upvalue_mut().location = UpvalueLocation::Closed(value);
            let next = up.as_upvalue().next_open.get();
            self.set_open_upvalues(next);
        }
    }
}

fn open_location(up: ObjRef) -> *mut Value {
    match up.as_upvalue().location {
        UpvalueLocation::Open(ptr) => ptr,
        UpvalueLocation::Closed(_) => unreachable!("open_upvalues list holds only open upvalues"),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::InterpretResult;
    use crate::vm::Vm;

    #[test]
    fn calling_wrong_arity_is_runtime_error() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"fun f(a) { return a; } f();");
        assert!(matches!(result, InterpretResult::RuntimeError(_)));
    }

    #[test]
    fn closures_capture_and_mutate_shared_upvalue() {
        let out = Vec::new();
        let mut vm = Vm::with_writers(Box::new(out), Box::new(Vec::new()));
        let result = vm.interpret(
            b"fun make() { var x = 0; fun inc() { x = x + 1; return x; } return inc; } \
              var c = make(); var a = c(); var b = c(); if (a != 1 or b != 2) { print \"fail\"; }",
        );
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn calling_a_class_constructs_an_instance() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"class Point {} var p = Point(); if (p == nil) { print \"fail\"; }");
        assert_eq!(result, InterpretResult::Ok);
    }
}
