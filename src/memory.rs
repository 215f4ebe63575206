//! # Memory Manager: Allocation and the Tracing Collector
//!
//! [`Heap`] owns every object allocation, the string-intern table, and the
//! bookkeeping a mark-and-sweep collector needs (`bytes_allocated`,
//! `next_gc`, and the gray worklist used while tracing). It deliberately
//! does **not** own the VM's value stack, call frames, globals table, or the
//! open-upvalue list — those are roots, and only [`crate::vm::Vm`] (which
//! holds all of them plus this `Heap`) can publish them. `Heap` exposes the
//! mechanical half of collection (`mark_object`, `trace_references`,
//! `sweep`, `prune_interned_strings`); `Vm::collect_garbage` supplies the
//! roots and orchestrates the pass (see `vm.rs`).
//!
//! This split is the Rust-idiomatic stand-in for clox's single global `vm`
//! value, whose `memory.c` reaches directly into `vm.stack`/`vm.frames`
//! during marking — a literal `static mut VM` is both unidiomatic and
//! unnecessary once `Vm` is an owned struct threaded explicitly through the
//! compiler and the dispatch loop.

use crate::object::{
    Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjData, ObjFunction, ObjInstance, ObjKind,
    ObjNative, ObjRef, ObjString, ObjUpvalue, UpvalueLocation, fnv1a_hash,
};
use crate::table::Table;
use crate::value::Value;
use std::cell::Cell;

/// Initial allocation threshold before the first collection, matching
/// clox's `memory.c` starting `nextGC` of 1 MiB.
const INITIAL_NEXT_GC: usize = 1024 * 1024;

/// A nominal "size" charged against `bytes_allocated` per object kind. These
/// are not exact `size_of::<Obj>()` figures (Rust's actual allocation size
/// varies with payload, e.g. a long string); they are a fixed per-kind
/// weight, good enough to drive the same allocation-pressure heuristic
/// clox's `reallocate` implements with real byte counts.
fn nominal_size(data: &ObjData) -> usize {
    match data {
        ObjData::String(s) => 32 + s.chars.len(),
        ObjData::Function(_) => 64,
        ObjData::Native(_) => 32,
        ObjData::Closure(c) => 32 + c.upvalues.len() * 8,
        ObjData::Upvalue(_) => 24,
        ObjData::Class(_) => 48,
        ObjData::Instance(_) => 48,
        ObjData::BoundMethod(_) => 32,
    }
}

pub struct Heap {
    objects: Option<ObjRef>,
    pub strings: Table,
    bytes_allocated: usize,
    next_gc: usize,
    gray_stack: Vec<ObjRef>,
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            objects: None,
            strings: Table::new(),
            bytes_allocated: 0,
            next_gc: INITIAL_NEXT_GC,
            gray_stack: Vec::new(),
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Whether the next allocation should be preceded by a collection. The
    /// caller (a `Vm` method) is responsible for actually invoking
    /// `Vm::collect_garbage` — `Heap` has no roots to mark on its own.
    pub fn should_collect(&self) -> bool {
        cfg!(feature = "stress_gc") || self.bytes_allocated > self.next_gc
    }

    pub fn after_collect(&mut self) {
        self.next_gc = self.bytes_allocated * 2;
    }

    fn link(&mut self, data: ObjData) -> ObjRef {
        self.bytes_allocated += nominal_size(&data);
        let obj = Box::new(Obj {
            marked: Cell::new(false),
            next: Cell::new(self.objects),
            data,
        });
        let r = ObjRef::from_box(obj);
        self.objects = Some(r);
        r
    }

    pub fn allocate_function(&mut self) -> ObjRef {
        self.link(ObjData::Function(ObjFunction::new()))
    }

    pub fn allocate_native(&mut self, name: &'static str, arity: u8, function: crate::object::NativeFn) -> ObjRef {
        self.link(ObjData::Native(ObjNative { arity, name, function }))
    }

    pub fn allocate_closure(&mut self, function: ObjRef, upvalues: Vec<ObjRef>) -> ObjRef {
        self.link(ObjData::Closure(ObjClosure { function, upvalues }))
    }

    pub fn allocate_open_upvalue(&mut self, slot: *mut Value) -> ObjRef {
        self.link(ObjData::Upvalue(ObjUpvalue {
            location: UpvalueLocation::Open(slot),
            next_open: Cell::new(None),
        }))
    }

    pub fn allocate_class(&mut self, name: ObjRef) -> ObjRef {
        self.link(ObjData::Class(ObjClass {
            name,
            methods: Table::new(),
        }))
    }

    pub fn allocate_instance(&mut self, class: ObjRef) -> ObjRef {
        self.link(ObjData::Instance(ObjInstance {
            class,
            fields: Table::new(),
        }))
    }

    pub fn allocate_bound_method(&mut self, receiver: Value, method: ObjRef) -> ObjRef {
        self.link(ObjData::BoundMethod(ObjBoundMethod { receiver, method }))
    }

    /// Intern a string: reuse an existing allocation with identical content,
    /// or allocate and register a new one. This is the sole path that
    /// creates an `ObjString`, matching clox's `copyString`/`takeString`
    /// always routing through `tableSet(&vm.strings, ...)`.
    pub fn intern(&mut self, chars: &str) -> ObjRef {
        let hash = fnv1a_hash(chars.as_bytes());
        if let Some(existing) = self.strings.find_string(chars, hash) {
            return existing;
        }
        let r = self.link(ObjData::String(ObjString {
            chars: chars.to_string(),
            hash,
        }));
        self.strings.set(r, Value::Nil);
        r
    }

    // --- Marking ------------------------------------------------------

    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(r) = value {
            self.mark_object(r);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef) {
        if r.is_marked() {
            return;
        }
        r.mark();
        self.gray_stack.push(r);
    }

    pub fn mark_table(&mut self, table: &Table) {
        let entries: Vec<(ObjRef, Value)> = table.iter().collect();
        for (k, v) in entries {
            self.mark_object(k);
            self.mark_value(v);
        }
    }

    /// Drain the gray worklist, visiting each object's outgoing references
    /// per each object kind's outgoing-reference set.
    pub fn trace_references(&mut self) {
        while let Some(r) = self.gray_stack.pop() {
            self.blacken_object(r);
        }
    }

    fn blacken_object(&mut self, r: ObjRef) {
        match r.kind() {
            ObjKind::String | ObjKind::Native => {}
            ObjKind::Upvalue => {
                let value = unsafe { r.as_upvalue().read() };
                self.mark_value(value);
            }
            ObjKind::Function => {
                let func = r.as_function();
                if let Some(name) = func.name {
                    self.mark_object(name);
                }
                let constants: Vec<Value> = func.chunk.constants.clone();
                for c in constants {
                    self.mark_value(c);
                }
            }
            ObjKind::Closure => {
                let closure = r.as_closure();
                self.mark_object(closure.function);
                let upvalues = closure.upvalues.clone();
                for u in upvalues {
                    self.mark_object(u);
                }
            }
            ObjKind::Class => {
                let class = r.as_class();
                self.mark_object(class.name);
                self.mark_table(&class.methods);
            }
            ObjKind::Instance => {
                let instance = r.as_instance();
                self.mark_object(instance.class);
                self.mark_table(&instance.fields);
            }
            ObjKind::BoundMethod => {
                let bound = r.as_bound_method();
                self.mark_value(bound.receiver);
                self.mark_object(bound.method);
            }
        }
    }

    /// Remove interned strings that were not reached this pass. Must run
    /// after marking and before sweep.
    pub fn prune_interned_strings(&mut self) {
        self.strings.remove_unmarked_keys();
    }

    /// Walk the intrusive object list: unmark survivors (so the next cycle
    /// starts white), unlink and free the rest.
    pub fn sweep(&mut self) {
        let mut prev: Option<ObjRef> = None;
        let mut current = self.objects;
        while let Some(obj) = current {
            let next = obj.get().next.get();
            if obj.is_marked() {
                obj.unmark();
                prev = Some(obj);
                current = next;
            } else {
                current = next;
                match prev {
                    Some(p) => p.get().next.set(next),
                    None => self.objects = next,
                }
                // SAFETY: `obj` was not reached from any root this cycle and
                // no live `ObjRef` can refer to it going forward.
                let freed = unsafe { obj.into_box() };
                self.bytes_allocated -= nominal_size(&freed.data);
                drop(freed);
            }
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        // Free every remaining object unconditionally; there is no further
        // mutator to keep anything alive for.
        let mut current = self.objects;
        while let Some(obj) = current {
            let next = obj.get().next.get();
            let freed = unsafe { obj.into_box() };
            drop(freed);
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_same_ref_for_same_content() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("hello");
        assert_eq!(a, b);
    }

    #[test]
    fn interning_distinguishes_content() {
        let mut heap = Heap::new();
        let a = heap.intern("hello");
        let b = heap.intern("world");
        assert_ne!(a, b);
    }

    #[test]
    fn unreachable_string_is_swept() {
        let mut heap = Heap::new();
        let _keep = heap.intern("kept");
        heap.intern("gone");
        // Mark only "kept".
        heap.mark_object(_keep);
        heap.trace_references();
        heap.prune_interned_strings();
        heap.sweep();
        assert_eq!(heap.strings.find_string("gone", fnv1a_hash(b"gone")), None);
        let hash_kept = fnv1a_hash(b"kept");
        assert!(heap.strings.find_string("kept", hash_kept).is_some());
    }

    #[test]
    fn should_collect_crosses_threshold() {
        let mut heap = Heap::new();
        assert!(!heap.should_collect() || cfg!(feature = "stress_gc"));
        heap.bytes_allocated = INITIAL_NEXT_GC + 1;
        assert!(heap.should_collect());
    }
}
