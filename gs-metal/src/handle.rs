//! Dense table mapping small integer handles to resource values.
//!
//! Handles are non-zero; zero is reserved as "absent" so it can round-trip
//! through the host ABI as a null. Freed handles recycle through a FIFO, so
//! a released handle is reissued before the table ever grows past its
//! high-water mark.

use std::collections::VecDeque;

/// An opaque, non-zero resource handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(pub u32);

impl Handle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
enum Element<T> {
    Vacant,
    Occupied(T),
}

/// A table of `T` values indexed by handle.
///
/// Not thread-safe; the device serializes access externally.
#[derive(Debug)]
pub struct HandleTable<T> {
    map: Vec<Element<T>>,
    free: VecDeque<u32>,
    kind: &'static str,
}

const INITIAL_CAPACITY: u32 = 32;

impl<T> HandleTable<T> {
    pub fn new(kind: &'static str) -> Self {
        let mut table = HandleTable {
            map: Vec::new(),
            free: VecDeque::new(),
            kind,
        };
        table.grow(INITIAL_CAPACITY);
        table
    }

    /// Extend the handle space to `capacity`, appending the new handles to
    /// the free list in ascending order.
    fn grow(&mut self, capacity: u32) {
        let old = self.map.len() as u32;
        // Slot 0 exists but is never handed out.
        self.map
            .resize_with(capacity as usize + 1, || Element::Vacant);
        let first = old.max(1);
        for h in first..=capacity {
            self.free.push_back(h);
        }
    }

    pub fn insert(&mut self, value: T) -> Handle {
        let handle = match self.free.pop_front() {
            Some(h) => h,
            None => {
                let capacity = (self.map.len() as u32 - 1) * 2;
                self.grow(capacity);
                self.free.pop_front().unwrap()
            }
        };
        self.map[handle as usize] = Element::Occupied(value);
        Handle(handle)
    }

    pub fn get(&self, handle: Handle) -> Option<&T> {
        match self.map.get(handle.index()) {
            Some(Element::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
        match self.map.get_mut(handle.index()) {
            Some(Element::Occupied(value)) => Some(value),
            _ => None,
        }
    }

    /// Overwrite the value at a live handle in place. The free list is
    /// untouched, so the handle stays valid.
    pub fn replace(&mut self, handle: Handle, value: T) -> Option<T> {
        match self.map.get_mut(handle.index()) {
            Some(slot @ Element::Occupied(_)) => {
                match std::mem::replace(slot, Element::Occupied(value)) {
                    Element::Occupied(old) => Some(old),
                    Element::Vacant => unreachable!(),
                }
            }
            _ => {
                log::warn!("{}[{}] replace on a dead handle", self.kind, handle.0);
                None
            }
        }
    }

    pub fn remove(&mut self, handle: Handle) -> Option<T> {
        match self.map.get_mut(handle.index()) {
            Some(slot @ Element::Occupied(_)) => {
                let value = match std::mem::replace(slot, Element::Vacant) {
                    Element::Occupied(value) => value,
                    Element::Vacant => unreachable!(),
                };
                self.free.push_back(handle.0);
                Some(value)
            }
            _ => {
                log::warn!("{}[{}] remove on a dead handle", self.kind, handle.0);
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> {
        self.map.iter().enumerate().filter_map(|(i, e)| match e {
            Element::Occupied(value) => Some((Handle(i as u32), value)),
            Element::Vacant => None,
        })
    }

    pub fn len(&self) -> usize {
        self.map
            .iter()
            .filter(|e| matches!(e, Element::Occupied(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let mut table = HandleTable::new("test");
        let h = table.insert("a");
        assert_ne!(h.0, 0);
        assert_eq!(table.get(h), Some(&"a"));
        assert_eq!(table.remove(h), Some("a"));
        assert_eq!(table.get(h), None);
    }

    #[test]
    fn handles_ascend_from_one() {
        let mut table = HandleTable::new("test");
        let a = table.insert(0u32);
        let b = table.insert(1u32);
        assert_eq!(a.0, 1);
        assert_eq!(b.0, 2);
    }

    #[test]
    fn released_handles_recycle_before_growth() {
        let mut table = HandleTable::new("test");
        let handles: Vec<_> = (0..INITIAL_CAPACITY).map(|i| table.insert(i)).collect();
        let victim = handles[3];
        table.remove(victim);
        // The free list is exhausted except for the recycled handle, which
        // must come back before the table doubles.
        let reissued = table.insert(99);
        assert_eq!(reissued, victim);
    }

    #[test]
    fn grows_by_doubling() {
        let mut table = HandleTable::new("test");
        for i in 0..INITIAL_CAPACITY {
            table.insert(i);
        }
        let next = table.insert(999);
        assert_eq!(next.0, INITIAL_CAPACITY + 1);
        assert_eq!(table.len() as u32, INITIAL_CAPACITY + 1);
    }

    #[test]
    fn dead_handle_is_soft_failure() {
        let mut table = HandleTable::<u32>::new("test");
        assert_eq!(table.remove(Handle(7)), None);
        assert_eq!(table.replace(Handle(7), 1), None);
    }

    #[test]
    fn replace_keeps_handle_live() {
        let mut table = HandleTable::new("test");
        let h = table.insert(1u32);
        assert_eq!(table.replace(h, 2), Some(1));
        assert_eq!(table.get(h), Some(&2));
    }
}
