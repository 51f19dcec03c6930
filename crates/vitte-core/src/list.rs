//! Module D — an ordered sequence of Tags, built on the generic [`Array`].

#[cfg(feature = "std")]
use std::{format, string::String, vec::Vec};

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};

use crate::array::Array;
use crate::tag::Tag;
use crate::CoreError;

/// Ordered sequence of [`Tag`]s.
#[derive(Debug, Default)]
pub struct List {
    items: Array<Tag>,
}

impl List {
    /// Empty list.
    pub fn new() -> Self {
        Self { items: Array::new() }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends a Tag (the list becomes its owner for lifecycle purposes).
    pub fn append(&mut self, value: Tag) -> Result<(), CoreError> {
        self.items.append(value)
    }

    /// Removes and returns the last element.
    pub fn pop(&mut self) -> Option<Tag> {
        self.items.pop()
    }

    /// The last element, if any.
    pub fn last(&self) -> Option<&Tag> {
        if self.items.is_empty() {
            None
        } else {
            self.items.get(self.items.len() - 1)
        }
    }

    /// Indexed access.
    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.items.get(index)
    }

    /// Mutable indexed access.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Tag> {
        self.items.get_mut(index)
    }

    /// Linear search by `tag_eq`.
    pub fn find(&self, needle: &Tag) -> Option<usize> {
        for i in 0..self.items.len() {
            if self.items.get(i).unwrap().tag_eq(needle) {
                return Some(i);
            }
        }
        None
    }

    /// Structural equality: same length, element-wise `tag_eq`.
    pub fn list_eq(&self, other: &List) -> bool {
        if self.len() != other.len() {
            return false;
        }
        (0..self.len()).all(|i| self.items.get(i).unwrap().tag_eq(other.items.get(i).unwrap()))
    }

    /// Human-readable rendering, e.g. `[1, 2, 3]`.
    pub fn print(&self) -> String {
        let parts: Vec<String> = (0..self.len()).map(|i| self.get(i).unwrap().print()).collect();
        format!("[{}]", parts.join(", "))
    }

    /// Frees every owned element Tag, then releases the backing array.
    pub fn free(&mut self) {
        for i in 0..self.items.len() {
            if let Some(t) = self.items.get_mut(i) {
                t.free();
            }
        }
        self.items.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_pop_last() {
        let mut l = List::new();
        l.append(Tag::double(1.0)).unwrap();
        l.append(Tag::double(2.0)).unwrap();
        assert_eq!(l.len(), 2);
        assert_eq!(l.last().unwrap().as_f64(), Some(2.0));
        let popped = l.pop().unwrap();
        assert_eq!(popped.as_f64(), Some(2.0));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn find_linear() {
        let mut l = List::new();
        l.append(Tag::double(1.0)).unwrap();
        l.append(Tag::double(2.0)).unwrap();
        assert_eq!(l.find(&Tag::double(2.0)), Some(1));
        assert_eq!(l.find(&Tag::double(3.0)), None);
    }

    #[test]
    fn list_eq_elementwise() {
        let mut a = List::new();
        let mut b = List::new();
        a.append(Tag::double(1.0)).unwrap();
        b.append(Tag::double(1.0)).unwrap();
        assert!(a.list_eq(&b));
        b.append(Tag::double(2.0)).unwrap();
        assert!(!a.list_eq(&b));
    }

    #[test]
    fn free_recurses_into_owned_elements() {
        let mut l = List::new();
        l.append(Tag::owned_string(b"hi")).unwrap();
        l.free();
        assert_eq!(l.len(), 0);
    }
}
