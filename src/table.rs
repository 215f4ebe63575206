//! # Open-Addressed String-Keyed Hash Table
//!
//! [`Table`] backs globals, class method tables, instance field tables, and
//! the VM's string-intern set. It is a direct port of clox's `table.c`:
//! open addressing with linear probing, tombstones for deletion, and a 75%
//! load-factor growth trigger.
//!
//! Keys are always interned [`ObjString`](crate::object::ObjString) handles,
//! so key comparison is pointer equality — the probe sequence itself still
//! needs the string's cached hash to find the right bucket, which is why
//! [`Table::find_string`] (used only by the interner) takes a hash and
//! content slice directly rather than an `ObjRef`.

use crate::object::ObjRef;
use crate::value::Value;

const MAX_LOAD: f64 = 0.75;

#[derive(Clone, Copy)]
struct Entry {
    key: Option<ObjRef>,
    value: Value,
}

/// An open-addressed hash map from interned strings to [`Value`]s.
pub struct Table {
    count: usize, // live entries + tombstones
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Table {
            count: 0,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.key.is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: ObjRef) -> Option<Value> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = self.find_entry_index(key);
        self.entries[idx].key.map(|_| self.entries[idx].value)
    }

    /// Insert or overwrite `key`. Returns `true` if this created a brand-new
    /// key (matches clox's `tableSet` return convention, which
    /// `OP_SET_GLOBAL` relies on to detect "assignment to undefined
    /// global").
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        if self.count + 1 > ((self.entries.len() as f64) * MAX_LOAD) as usize {
            self.grow();
        }

        let idx = self.find_entry_index(key);
        let is_new_key = self.entries[idx].key.is_none();
        if is_new_key && matches!(self.entries[idx].value, Value::Nil) {
            // Only a truly empty bucket (not a tombstone) grows `count`.
            self.count += 1;
        }
        self.entries[idx] = Entry {
            key: Some(key),
            value,
        };
        is_new_key
    }

    pub fn delete(&mut self, key: ObjRef) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        let idx = self.find_entry_index(key);
        if self.entries[idx].key.is_none() {
            return false;
        }
        // Tombstone: key=None, value=Bool(true) (matches clox's sentinel).
        self.entries[idx] = Entry {
            key: None,
            value: Value::Bool(true),
        };
        true
    }

    /// Find an interned string by content, used by the interner to detect
    /// an existing allocation before making a new one.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        if self.entries.is_empty() {
            return None;
        }
        let capacity = self.entries.len();
        let mut index = (hash as usize) & (capacity - 1);
        loop {
            let entry = &self.entries[index];
            match entry.key {
                None => {
                    // Stop only on a true empty slot, not a tombstone
                    // (value Nil marks "never used").
                    if matches!(entry.value, Value::Nil) {
                        return None;
                    }
                }
                Some(key) => {
                    let s = key.as_string();
                    if s.hash == hash && s.chars == chars {
                        return Some(key);
                    }
                }
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    /// Remove every entry whose key is not marked. Called once, before the
    /// sweep phase, on the heap's string-intern table only — the one point
    /// where interned strings may be removed.
    pub fn remove_unmarked_keys(&mut self) {
        for entry in self.entries.iter_mut() {
            if let Some(key) = entry.key {
                if !key.is_marked() {
                    entry.key = None;
                    entry.value = Value::Bool(true);
                }
            }
        }
    }

    /// Iterate live (non-tombstone) entries, for GC marking.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.key.map(|k| (k, e.value)))
    }

    fn find_entry_index(&self, key: ObjRef) -> usize {
        let capacity = self.entries.len();
        let mut index = (fnv_ptr_bucket(key) as usize) & (capacity - 1);
        let mut first_tombstone: Option<usize> = None;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                Some(k) if k == key => return index,
                None => {
                    if matches!(entry.value, Value::Nil) {
                        // Truly empty: use the first tombstone we saw, if any.
                        return first_tombstone.unwrap_or(index);
                    } else if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                Some(_) => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.entries.is_empty() {
            8
        } else {
            self.entries.len() * 2
        };
        let old_entries = std::mem::replace(
            &mut self.entries,
            vec![
                Entry {
                    key: None,
                    value: Value::Nil,
                };
                new_capacity
            ],
        );
        self.count = 0;
        for entry in old_entries {
            if let Some(key) = entry.key {
                let idx = self.find_entry_index(key);
                self.entries[idx] = entry;
                self.count += 1;
            }
        }
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

/// Bucket index is derived from the string's own cached hash rather than
/// the pointer value: two different `ObjRef`s to the same interned string
/// never coexist, so hashing the pointer would work too, but hashing the
/// string content keeps `find_entry_index` and `find_string` probing
/// identical sequences for identical content.
fn fnv_ptr_bucket(key: ObjRef) -> u32 {
    key.as_string().hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Heap;

    #[test]
    fn set_get_roundtrip() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.intern("answer");
        assert!(table.set(key, Value::Number(42.0)));
        assert_eq!(table.get(key), Some(Value::Number(42.0)));
    }

    #[test]
    fn set_existing_key_returns_false() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.intern("x");
        assert!(table.set(key, Value::Number(1.0)));
        assert!(!table.set(key, Value::Number(2.0)));
        assert_eq!(table.get(key), Some(Value::Number(2.0)));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.intern("gone");
        table.set(key, Value::Bool(true));
        assert!(table.delete(key));
        assert_eq!(table.get(key), None);
    }

    #[test]
    fn find_string_locates_interned_content() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = heap.intern("hello");
        table.set(key, Value::Nil);
        let hash = crate::object::fnv1a_hash("hello".as_bytes());
        assert_eq!(table.find_string("hello", hash), Some(key));
        assert_eq!(table.find_string("nope", hash), None);
    }

    #[test]
    fn grows_past_many_insertions() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        for i in 0..200 {
            let key = heap.intern(&format!("k{}", i));
            table.set(key, Value::Number(i as f64));
        }
        for i in 0..200 {
            let key = heap.intern(&format!("k{}", i));
            assert_eq!(table.get(key), Some(Value::Number(i as f64)));
        }
    }
}
