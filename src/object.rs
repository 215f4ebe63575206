//! # Heap Object Representation
//!
//! Every garbage-collected value — strings, functions, closures, upvalues,
//! classes, instances, bound methods, natives — is an [`Obj`] allocated once
//! on the Rust heap (via [`crate::memory::Heap`]) and referenced everywhere
//! else through [`ObjRef`], a thin `Copy` handle wrapping a raw pointer.
//!
//! ## Why raw pointers instead of `Rc<RefCell<_>>`
//! The collector must be able to resolve reference cycles (a closure that
//! captures an instance whose class holds a method that closes back over the
//! same closure, for instance) — something reference counting cannot do on
//! its own. A tracing mark-and-sweep pass over an intrusive list of `Obj`s is
//! what a cycle-safe collector requires, so each `Obj` carries its own header (mark bit +
//! next-pointer) and objects are never moved once allocated; `ObjRef` is the
//! stable handle other data structures hold.
//!
//! ## Safety
//! All dereferencing of `ObjRef` funnels through [`ObjRef::get`] /
//! [`ObjRef::get_mut`] in this module. Nothing outside `object.rs` and
//! `memory.rs` touches the underlying `NonNull` directly. This is sound under
//! the same discipline a single-threaded interpreter loop already relies on:
//! no two live Rust references to the same `Obj` are ever held across a call
//! that could trigger a collection, and the collector itself never frees an
//! object still reachable from a root.

use std::cell::Cell;
use std::fmt;
use std::ptr::NonNull;

use crate::chunk::Chunk;
use crate::error::RuntimeError;
use crate::table::Table;
use crate::value::Value;

/// Discriminant for the kind of payload an [`Obj`] carries. Stored alongside
/// the header so `ObjRef::kind` is a cheap non-dereferencing... actually it
/// does dereference, but it never needs to match on `ObjData` to answer "is
/// this a string".
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ObjKind {
    String,
    Function,
    Native,
    Closure,
    Upvalue,
    Class,
    Instance,
    BoundMethod,
}

/// Signature for a native (host) callable. Takes the VM (for natives that
/// need VM-owned state, such as `clock`'s process-start instant) and the
/// slice of call arguments; returns the result or a runtime fault.
pub type NativeFn = fn(&mut crate::vm::Vm, &[Value]) -> Result<Value, RuntimeError>;

pub struct ObjString {
    pub chars: String,
    pub hash: u32,
}

pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: usize,
    pub chunk: Chunk,
    pub name: Option<ObjRef>, // ObjString, or None for the top-level script
}

impl ObjFunction {
    pub fn new() -> Self {
        ObjFunction {
            arity: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
            name: None,
        }
    }
}

pub struct ObjNative {
    pub arity: u8,
    pub name: &'static str,
    pub function: NativeFn,
}

/// Either an open upvalue pointing into the VM's value stack, or a closed
/// upvalue owning its value after the enclosing frame returned.
pub enum UpvalueLocation {
    Open(*mut Value),
    Closed(Value),
}

pub struct ObjUpvalue {
    pub location: UpvalueLocation,
    /// Next node in the VM's open-upvalue list, sorted by descending stack
    /// address. Unused once this upvalue is closed.
    pub next_open: Cell<Option<ObjRef>>,
}

impl ObjUpvalue {
    /// Read through the upvalue regardless of open/closed state.
    ///
    /// # Safety
    /// The caller must ensure that if this upvalue is open, the pointed-to
    /// stack slot is still within the VM's live stack range.
    pub unsafe fn read(&self) -> Value {
        match self.location {
            UpvalueLocation::Open(ptr) => *ptr,
            UpvalueLocation::Closed(v) => v,
        }
    }

    /// Write through the upvalue regardless of open/closed state.
    ///
    /// # Safety
    /// Same caveat as [`ObjUpvalue::read`].
    pub unsafe fn write(&mut self, value: Value) {
        match &mut self.location {
            UpvalueLocation::Open(ptr) => **ptr = value,
            UpvalueLocation::Closed(v) => *v = value,
        }
    }
}

pub struct ObjClosure {
    pub function: ObjRef, // ObjFunction
    pub upvalues: Vec<ObjRef>, // ObjUpvalue, length == function.upvalue_count
}

pub struct ObjClass {
    pub name: ObjRef, // ObjString
    pub methods: Table,
}

pub struct ObjInstance {
    pub class: ObjRef, // ObjClass
    pub fields: Table,
}

pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef, // ObjClosure
}

/// The tagged payload every [`Obj`] carries, behind its shared header.
pub enum ObjData {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

/// A single heap allocation: the intrusive GC header plus its payload.
///
/// `Obj`s are allocated once (`Box::new`, see [`crate::memory::Heap`]),
/// leaked into a raw pointer, and never moved again until the sweep phase
/// reclaims them. The `marked`/`next` fields are the entirety of the GC
/// header; everything else lives in `data`.
pub struct Obj {
    pub marked: Cell<bool>,
    pub next: Cell<Option<ObjRef>>,
    pub data: ObjData,
}

impl Obj {
    pub fn kind(&self) -> ObjKind {
        match &self.data {
            ObjData::String(_) => ObjKind::String,
            ObjData::Function(_) => ObjKind::Function,
            ObjData::Native(_) => ObjKind::Native,
            ObjData::Closure(_) => ObjKind::Closure,
            ObjData::Upvalue(_) => ObjKind::Upvalue,
            ObjData::Class(_) => ObjKind::Class,
            ObjData::Instance(_) => ObjKind::Instance,
            ObjData::BoundMethod(_) => ObjKind::BoundMethod,
        }
    }
}

/// A stable, `Copy` handle to a heap-allocated [`Obj`].
///
/// Equality and hashing are by pointer identity, which is sound for strings
/// because they are interned (two equal-content strings are always the same
/// allocation) and is the defined equality for every other object kind
/// (every object kind other than strings compares by identity).
#[derive(Clone, Copy)]
pub struct ObjRef(NonNull<Obj>);

impl ObjRef {
    /// Wrap a freshly boxed `Obj`, leaking ownership to the GC-managed heap.
    /// Only [`crate::memory::Heap::allocate`] should call this.
    pub(crate) fn from_box(obj: Box<Obj>) -> Self {
        ObjRef(NonNull::from(Box::leak(obj)))
    }

    /// Reconstruct the `Box` so it can be dropped. Only the sweep phase in
    /// `memory.rs` calls this; it is the one place an `Obj` is freed.
    ///
    /// # Safety
    /// The caller must guarantee no other `ObjRef` anywhere still reaches
    /// this allocation (i.e. it was confirmed unmarked/unreachable).
    pub(crate) unsafe fn into_box(self) -> Box<Obj> {
        Box::from_raw(self.0.as_ptr())
    }

    #[inline]
    pub fn get(&self) -> &Obj {
        // SAFETY: objects are never moved or freed while reachable; the
        // collector only frees objects proven unreachable from any root,
        // and no `ObjRef` to such an object can be observed afterward.
        unsafe { self.0.as_ref() }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub fn get_mut(&self) -> &mut Obj {
        // SAFETY: see `get`. The VM is single-threaded and never holds two
        // live `&mut Obj` borrows of the same object simultaneously.
        unsafe { &mut *self.0.as_ptr() }
    }

    pub fn kind(&self) -> ObjKind {
        self.get().kind()
    }

    pub fn mark(&self) {
        self.get().marked.set(true);
    }

    pub fn is_marked(&self) -> bool {
        self.get().marked.get()
    }

    pub fn unmark(&self) {
        self.get().marked.set(false);
    }

    pub fn as_string(&self) -> &ObjString {
        match &self.get().data {
            ObjData::String(s) => s,
            _ => unreachable!("as_string called on non-string Obj"),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.as_string().chars
    }

    pub fn as_function(&self) -> &ObjFunction {
        match &self.get().data {
            ObjData::Function(f) => f,
            _ => unreachable!("as_function called on non-function Obj"),
        }
    }

    pub fn as_function_mut(&self) -> &mut ObjFunction {
        match &mut self.get_mut().data {
            ObjData::Function(f) => f,
            _ => unreachable!("as_function_mut called on non-function Obj"),
        }
    }

    pub fn as_native(&self) -> &ObjNative {
        match &self.get().data {
            ObjData::Native(n) => n,
            _ => unreachable!("as_native called on non-native Obj"),
        }
    }

    pub fn as_closure(&self) -> &ObjClosure {
        match &self.get().data {
            ObjData::Closure(c) => c,
            _ => unreachable!("as_closure called on non-closure Obj"),
        }
    }

    pub fn as_closure_mut(&self) -> &mut ObjClosure {
        match &mut self.get_mut().data {
            ObjData::Closure(c) => c,
            _ => unreachable!("as_closure_mut called on non-closure Obj"),
        }
    }

    pub fn as_upvalue(&self) -> &ObjUpvalue {
        match &self.get().data {
            ObjData::Upvalue(u) => u,
            _ => unreachable!("as_upvalue called on non-upvalue Obj"),
        }
    }

    pub fn as_upvalue_mut(&self) -> &mut ObjUpvalue {
        match &mut self.get_mut().data {
            ObjData::Upvalue(u) => u,
            _ => unreachable!("as_upvalue_mut called on non-upvalue Obj"),
        }
    }

    pub fn as_class(&self) -> &ObjClass {
        match &self.get().data {
            ObjData::Class(c) => c,
            _ => unreachable!("as_class called on non-class Obj"),
        }
    }

    pub fn as_class_mut(&self) -> &mut ObjClass {
        match &mut self.get_mut().data {
            ObjData::Class(c) => c,
            _ => unreachable!("as_class_mut called on non-class Obj"),
        }
    }

    pub fn as_instance(&self) -> &ObjInstance {
        match &self.get().data {
            ObjData::Instance(i) => i,
            _ => unreachable!("as_instance called on non-instance Obj"),
        }
    }

    pub fn as_instance_mut(&self) -> &mut ObjInstance {
        match &mut self.get_mut().data {
            ObjData::Instance(i) => i,
            _ => unreachable!("as_instance_mut called on non-instance Obj"),
        }
    }

    pub fn as_bound_method(&self) -> &ObjBoundMethod {
        match &self.get().data {
            ObjData::BoundMethod(b) => b,
            _ => unreachable!("as_bound_method called on non-bound-method Obj"),
        }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &ObjRef) -> bool {
        self.0 == other.0
    }
}
impl Eq for ObjRef {}

impl std::hash::Hash for ObjRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.as_ptr().hash(state)
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({:p}, {:?})", self.0.as_ptr(), self.kind())
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.get().data {
            ObjData::String(s) => write!(f, "{}", s.chars),
            ObjData::Function(func) => match func.name {
                None => write!(f, "<script>"),
                Some(name) => write!(f, "<fn {}>", name.as_str()),
            },
            ObjData::Native(n) => write!(f, "<native fn {}>", n.name),
            ObjData::Closure(c) => write!(f, "{}", c.function),
            ObjData::Upvalue(_) => write!(f, "upvalue"),
            ObjData::Class(c) => write!(f, "{}", c.name.as_str()),
            ObjData::Instance(i) => write!(f, "{} instance", i.class.as_class().name.as_str()),
            ObjData::BoundMethod(b) => write!(f, "{}", b.method),
        }
    }
}

/// FNV-1a hash over raw bytes, matching clox's string-hashing scheme
/// (`scanner.c`'s `hashString`/`table.c`'s 32-bit FNV-1a).
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
