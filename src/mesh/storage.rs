//! Tombstoned slot storage for mesh elements.
//!
//! Slots are never reused, so a handle either refers to the element it was
//! created for or to a dead slot. Iteration skips dead slots and therefore
//! yields live elements in insertion order.

/// A growable collection of elements addressed by stable slot indices.
#[derive(Debug, Clone)]
pub(crate) struct Slots<T> {
    items: Vec<Option<T>>,
    live: usize,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Slots<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            live: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            live: 0,
        }
    }

    /// Number of live elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Number of slots ever allocated, live or dead.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.items.len()
    }

    /// Store an element and return its slot index.
    pub fn insert(&mut self, item: T) -> usize {
        let index = self.items.len();
        self.items.push(Some(item));
        self.live += 1;
        index
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index).and_then(Option::as_ref)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index).and_then(Option::as_mut)
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.get(index).is_some()
    }

    /// Kill a slot, returning the element it held.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index).and_then(Option::take);
        if item.is_some() {
            self.live -= 1;
        }
        item
    }

    /// Iterate over live elements with their slot indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| item.as_ref().map(|item| (i, item)))
    }

    /// Iterate mutably over live elements with their slot indices.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> + '_ {
        self.items
            .iter_mut()
            .enumerate()
            .filter_map(|(i, item)| item.as_mut().map(|item| (i, item)))
    }
}

impl<T> std::ops::Index<usize> for Slots<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Some(item) => item,
            None => panic!("slot {} is not live", index),
        }
    }
}

impl<T> std::ops::IndexMut<usize> for Slots<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        match self.get_mut(index) {
            Some(item) => item,
            None => panic!("slot {} is not live", index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove() {
        let mut slots = Slots::new();
        let a = slots.insert("a");
        let b = slots.insert("b");
        let c = slots.insert("c");
        assert_eq!(slots.len(), 3);

        assert_eq!(slots.remove(b), Some("b"));
        assert_eq!(slots.remove(b), None);
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.slot_count(), 3);
        assert!(!slots.contains(b));

        // Slots are not reused
        let d = slots.insert("d");
        assert_eq!(d, 3);

        let live: Vec<_> = slots.iter().map(|(i, s)| (i, *s)).collect();
        assert_eq!(live, vec![(a, "a"), (c, "c"), (d, "d")]);
    }

    #[test]
    #[should_panic(expected = "not live")]
    fn test_index_dead_slot_panics() {
        let mut slots = Slots::new();
        let a = slots.insert(1);
        slots.remove(a);
        let _ = slots[a];
    }
}
