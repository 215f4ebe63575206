//! # Classes, Instances, and Methods
//!
//! `OP_CLASS`/`OP_METHOD` (defining classes and their methods), `OP_INVOKE`
//! (the call-a-method-in-one-step fast path that skips materializing a
//! bound method only to immediately call it), and the `OP_GET_PROPERTY`/
//! `OP_SET_PROPERTY` field/method lookup that underlies plain `instance.x`
//! access. There is no superclass chain (the language has no inheritance),
//! so unlike clox there is no `OP_GET_SUPER`/`OP_INHERIT` here.

use crate::error::RuntimeError;
use crate::object::{ObjKind, ObjRef};
use crate::value::Value;

use super::Vm;

impl Vm {
    pub(super) fn op_get_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string_constant();
        let instance = self.expect_instance(self.peek(0), "Only instances have properties.")?;
        if let Some(value) = instance.as_instance().fields.get(name) {
            self.pop();
            self.push(value);
            return Ok(());
        }
        self.bind_method(instance.as_instance().class, name)
    }

    pub(super) fn op_set_property(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string_constant();
        let instance = self.expect_instance(self.peek(1), "Only instances have fields.")?;
        let value = self.peek(0);
        instance.as_instance_mut().fields.set(name, value);
        let value = self.pop();
        self.pop();
        self.push(value);
        Ok(())
    }

    pub(super) fn op_invoke(&mut self) -> Result<(), RuntimeError> {
        let name = self.read_string_constant();
        let arg_count = self.read_byte();
        let instance = self.expect_instance(self.peek(arg_count as usize), "Only instances have methods.")?;

        // A field can shadow a method of the same name: if one exists, call
        // it like any other callee instead of invoking the class method
        // directly.
        if let Some(value) = instance.as_instance().fields.get(name) {
            let callee_slot = self.stack_top() - arg_count as usize - 1;
            self.stack_set(callee_slot, value);
            return self.call_value(value, arg_count);
        }

        self.invoke_from_class(instance.as_instance().class, name, arg_count)
    }

    fn invoke_from_class(&mut self, class: ObjRef, name: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        match class.as_class().methods.get(name) {
            Some(Value::Obj(method)) => self.call_closure(method, arg_count),
            _ => Err(RuntimeError::UndefinedProperty(name.as_str().to_string())),
        }
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeError> {
        let method = match class.as_class().methods.get(name) {
            Some(Value::Obj(m)) => m,
            _ => return Err(RuntimeError::UndefinedProperty(name.as_str().to_string())),
        };
        let receiver = self.peek(0);
        let bound = self.new_bound_method(receiver, method);
        self.pop();
        self.push(Value::Obj(bound));
        Ok(())
    }

    /// Attach the method on top of the stack (`OP_METHOD`'s operand names
    /// it) to the class just below it. Only the method is popped — the
    /// class stays on the stack so subsequent `OP_METHOD`s (and the final
    /// `OP_POP` the compiler emits after the class body) see it.
    pub(super) fn define_method(&mut self, name: ObjRef) {
        let method = self.peek(0);
        if let Value::Obj(class) = self.peek(1) {
            class.as_class_mut().methods.set(name, method);
        }
        self.pop();
    }

    fn expect_instance(&self, value: Value, message: &'static str) -> Result<ObjRef, RuntimeError> {
        match value {
            Value::Obj(r) if r.kind() == ObjKind::Instance => Ok(r),
            _ => Err(RuntimeError::PropertyOnNonInstance(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::InterpretResult;
    use crate::vm::Vm;

    #[test]
    fn method_call_and_field_access_round_trip() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            b"class Counter { init() { this.n = 0; } bump() { this.n = this.n + 1; return this.n; } } \
              var c = Counter(); var a = c.bump(); var b = c.bump(); if (a != 1 or b != 2) { print \"fail\"; }",
        );
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn field_shadows_method_of_the_same_name() {
        let mut vm = Vm::new();
        let result = vm.interpret(
            b"class Box { greet() { return \"method\"; } } \
              fun override() { return \"field\"; } \
              var b = Box(); b.greet = override; var r = b.greet(); \
              if (r != \"field\") { print \"fail\"; }",
        );
        assert_eq!(result, InterpretResult::Ok);
    }

    #[test]
    fn property_access_on_non_instance_is_runtime_error() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"var x = 1; print x.y;");
        assert!(matches!(result, InterpretResult::RuntimeError(_)));
    }

    #[test]
    fn undefined_method_is_runtime_error() {
        let mut vm = Vm::new();
        let result = vm.interpret(b"class Empty {} var e = Empty(); e.missing();");
        assert!(matches!(result, InterpretResult::RuntimeError(_)));
    }
}
