//! Module E — an open-addressed `Tag` → `Tag` table with tombstones and an
//! in-place, anchor-based rehash on grow.

#[cfg(feature = "std")]
use std::{format, string::String, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};

use crate::array::Array;
use crate::tag::Tag;
use crate::CoreError;

#[derive(Clone, Copy)]
struct Slot {
    key: Tag,
    value: Tag,
}

impl Slot {
    fn empty() -> Self {
        Slot { key: Tag::user_symbol(1), value: Tag::nil() }
    }
}

enum Probe {
    Found(usize),
    Insert(usize),
}

/// Power-of-two-sized, open-addressed map keyed by [`Tag`].
#[derive(Default)]
pub struct Table {
    slots: Array<Slot>,
    /// Slots occupied, including tombstones.
    len: usize,
    /// Live entries only.
    real_len: usize,
}

impl Table {
    /// Empty table, no allocation yet.
    pub fn new() -> Self {
        Self { slots: Array::new(), len: 0, real_len: 0 }
    }

    /// Current capacity (always a power of two, or zero before first insert).
    pub fn cap(&self) -> usize {
        self.slots.len()
    }

    /// Live entry count.
    pub fn len(&self) -> usize {
        self.real_len
    }

    /// True if no live entries.
    pub fn is_empty(&self) -> bool {
        self.real_len == 0
    }

    fn mask(&self) -> usize {
        self.cap().saturating_sub(1)
    }

    fn probe(&self, key: &Tag) -> Probe {
        let mask = self.mask();
        let mut idx = (key.tag_hash() as usize) & mask;
        let mut first_tombstone: Option<usize> = None;
        loop {
            let slot = self.slots.get(idx).expect("index within capacity by construction");
            if slot.key.is_empty_slot() {
                return Probe::Insert(first_tombstone.unwrap_or(idx));
            }
            if slot.key.is_tombstone() {
                if first_tombstone.is_none() {
                    first_tombstone = Some(idx);
                }
            } else if key.key_eq(&slot.key) {
                return Probe::Found(idx);
            }
            idx = (idx + 1) & mask;
        }
    }

    /// Doubles capacity and rehashes every live entry in place, following the
    /// anchor-ring algorithm: clear tombstones to empty, locate one
    /// guaranteed-empty "anchor" slot, then walk the ring starting one past
    /// it, relocating each live entry to its new-capacity probe position and
    /// marking its old slot empty as it goes. Because the anchor slot is
    /// empty before the walk starts, no entry is ever written into a slot
    /// that has not yet been visited-and-cleared.
    fn grow(&mut self) -> Result<(), CoreError> {
        let old_cap = self.cap();
        let new_cap = if old_cap == 0 { 8 } else { old_cap * 2 };

        self.slots.reserve(new_cap - self.slots.len())?;
        while self.slots.len() < new_cap {
            self.slots.append(Slot::empty())?;
        }

        for i in 0..new_cap {
            let slot = self.slots.get_mut(i).unwrap();
            if slot.key.is_tombstone() {
                *slot = Slot::empty();
                self.len -= 1;
            }
        }

        let mask = new_cap - 1;
        let anchor = (0..new_cap)
            .find(|&i| self.slots.get(i).unwrap().key.is_empty_slot())
            .expect("growing always yields at least one empty slot");

        let mut moved = 0usize;
        let mut i = (anchor + 1) % new_cap;
        while moved < self.real_len {
            let occupied = !self.slots.get(i).unwrap().key.is_empty_slot();
            if occupied {
                let entry = core::mem::replace(self.slots.get_mut(i).unwrap(), Slot::empty());
                let mut probe = (entry.key.tag_hash() as usize) & mask;
                while !self.slots.get(probe).unwrap().key.is_empty_slot() {
                    probe = (probe + 1) & mask;
                }
                *self.slots.get_mut(probe).unwrap() = entry;
                moved += 1;
            }
            i = (i + 1) % new_cap;
        }

        #[cfg(feature = "trace")]
        tracing::trace!(old_cap, new_cap, real_len = self.real_len, "table grow/rehash");

        Ok(())
    }

    /// Inserts or overwrites `key` → `value`. Returns the new `real_len`.
    /// `key` must not be one of the reserved tombstone/empty sentinels.
    pub fn set(&mut self, key: Tag, value: Tag) -> Result<usize, CoreError> {
        if key.is_tombstone() || key.is_empty_slot() {
            return Err(CoreError::ReservedKey);
        }
        if self.cap() == 0 || self.len + 1 > (self.cap() * 5) / 7 {
            self.grow()?;
        }
        match self.probe(&key) {
            Probe::Insert(idx) => {
                let was_tombstone = self.slots.get(idx).unwrap().key.is_tombstone();
                *self.slots.get_mut(idx).unwrap() = Slot { key, value };
                if was_tombstone {
                    self.real_len += 1;
                } else {
                    self.len += 1;
                    self.real_len += 1;
                }
            }
            Probe::Found(idx) => {
                let slot = self.slots.get_mut(idx).unwrap();
                slot.key.free();
                slot.value.free();
                slot.key = key;
                slot.value = value;
            }
        }
        Ok(self.real_len)
    }

    /// Looks up `key`, returning a copy of the stored value (a Tag alias,
    /// not a new owner).
    pub fn get(&self, key: &Tag) -> Option<Tag> {
        if self.cap() == 0 {
            return None;
        }
        match self.probe(key) {
            Probe::Found(idx) => Some(self.slots.get(idx).unwrap().value),
            Probe::Insert(_) => None,
        }
    }

    /// Removes `key`, freeing its key and value and leaving a tombstone.
    /// Returns whether anything was removed.
    pub fn del(&mut self, key: &Tag) -> bool {
        if self.cap() == 0 {
            return false;
        }
        match self.probe(key) {
            Probe::Found(idx) => {
                let slot = self.slots.get_mut(idx).unwrap();
                slot.key.free();
                slot.value.free();
                slot.key = Tag::user_symbol(0);
                slot.value = Tag::nil();
                self.real_len -= 1;
                true
            }
            Probe::Insert(_) => false,
        }
    }

    /// Structural equality: same live-entry count, and every key in `self`
    /// maps (by `tag_eq` on the value) to the same value in `other`.
    pub fn table_eq(&self, other: &Table) -> bool {
        if self.real_len != other.real_len {
            return false;
        }
        for i in 0..self.cap() {
            let slot = self.slots.get(i).unwrap();
            if slot.key.is_empty_slot() || slot.key.is_tombstone() {
                continue;
            }
            match other.get(&slot.key) {
                Some(v) if v.tag_eq(&slot.value) => {}
                _ => return false,
            }
        }
        true
    }

    /// Human-readable rendering, e.g. `{a: 1, b: 2}`.
    pub fn print(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        for i in 0..self.cap() {
            let slot = self.slots.get(i).unwrap();
            if slot.key.is_empty_slot() || slot.key.is_tombstone() {
                continue;
            }
            parts.push(format!("{}: {}", slot.key.print(), slot.value.print()));
        }
        format!("{{{}}}", parts.join(", "))
    }

    /// Frees every live key and value, then releases the slot storage.
    pub fn free(&mut self) {
        for i in 0..self.cap() {
            let slot = self.slots.get_mut(i).unwrap();
            if !slot.key.is_empty_slot() && !slot.key.is_tombstone() {
                slot.key.free();
                slot.value.free();
            }
        }
        self.slots.free();
        self.len = 0;
        self.real_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip() {
        let mut t = Table::new();
        t.set(Tag::double(1.0), Tag::double(10.0)).unwrap();
        assert_eq!(t.get(&Tag::double(1.0)).unwrap().as_f64(), Some(10.0));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn overwrite_keeps_one_entry() {
        let mut t = Table::new();
        t.set(Tag::double(1.0), Tag::double(10.0)).unwrap();
        t.set(Tag::double(1.0), Tag::double(20.0)).unwrap();
        assert_eq!(t.len(), 1);
        assert_eq!(t.get(&Tag::double(1.0)).unwrap().as_f64(), Some(20.0));
    }

    #[test]
    fn tombstone_reuse() {
        let mut t = Table::new();
        t.set(Tag::double(1.0), Tag::double(10.0)).unwrap();
        assert!(t.del(&Tag::double(1.0)));
        assert!(t.get(&Tag::double(1.0)).is_none());
        t.set(Tag::double(1.0), Tag::double(99.0)).unwrap();
        assert_eq!(t.get(&Tag::double(1.0)).unwrap().as_f64(), Some(99.0));
    }

    #[test]
    fn grow_preserves_all_live_keys() {
        let mut t = Table::new();
        for i in 0..40 {
            t.set(Tag::double(i as f64), Tag::double((i * 2) as f64)).unwrap();
        }
        assert_eq!(t.len(), 40);
        for i in 0..40 {
            assert_eq!(t.get(&Tag::double(i as f64)).unwrap().as_f64(), Some((i * 2) as f64));
        }
        assert!((t.real_len * 7) < t.cap() * 5);
    }

    #[test]
    fn grow_after_many_deletes_and_reinserts() {
        let mut t = Table::new();
        for i in 0..20 {
            t.set(Tag::double(i as f64), Tag::double(i as f64)).unwrap();
        }
        for i in 0..10 {
            t.del(&Tag::double(i as f64));
        }
        for i in 20..40 {
            t.set(Tag::double(i as f64), Tag::double(i as f64)).unwrap();
        }
        for i in 10..40 {
            assert!(t.get(&Tag::double(i as f64)).is_some());
        }
        for i in 0..10 {
            assert!(t.get(&Tag::double(i as f64)).is_none());
        }
    }

    #[test]
    fn reserved_sentinels_rejected_as_keys() {
        let mut t = Table::new();
        assert!(t.set(Tag::user_symbol(0), Tag::nil()).is_err());
        assert!(t.set(Tag::user_symbol(1), Tag::nil()).is_err());
    }

    #[test]
    fn table_keys_use_reference_identity() {
        let mut inner_a = Tag::owned_list(crate::list::List::new());
        let inner_a_ref = inner_a.tag_to_ref();
        let mut t = Table::new();
        t.set(inner_a_ref, Tag::double(1.0)).unwrap();
        assert!(t.get(&inner_a_ref).is_some());
        inner_a.free();
    }
}
