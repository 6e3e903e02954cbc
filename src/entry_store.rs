//! EntryStore: insertion-ordered arena of entries addressed by stable handles.
//!
//! Entries live in a `SlotMap` and are threaded onto an intrusive doubly
//! linked list (`prev`/`next` keys plus `head`/`tail`). Appending links at the
//! tail; removing unlinks one node in O(1). The arena never moves a live node,
//! and its generational keys make a handle to a removed entry resolve to
//! nothing instead of aliasing whatever reuses the slot.

use core::iter::FusedIterator;
use slotmap::{DefaultKey, SecondaryMap, SlotMap};

/// Stable handle to an entry of a [`ChainMap`](crate::ChainMap).
///
/// A handle stays valid across unrelated inserts, removals and rehashes. It
/// goes stale only when its own entry is removed or the map is cleared; stale
/// handles resolve to `None`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryRef(DefaultKey);

impl EntryRef {
    pub(crate) fn new(k: DefaultKey) -> Self {
        EntryRef(k)
    }
    pub(crate) fn raw(&self) -> DefaultKey {
        self.0
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,
}

#[derive(Debug, Clone)]
struct Node<K, V> {
    entry: Entry<K, V>,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

#[derive(Debug, Clone)]
pub(crate) struct EntryStore<K, V> {
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

impl<K, V> EntryStore<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Link `entry` after the current tail and return its handle.
    pub(crate) fn append(&mut self, entry: Entry<K, V>) -> EntryRef {
        let prev = self.tail;
        let k = self.nodes.insert(Node {
            entry,
            prev,
            next: None,
        });
        match prev {
            Some(p) => self.nodes[p].next = Some(k),
            None => self.head = Some(k),
        }
        self.tail = Some(k);
        EntryRef::new(k)
    }

    /// Unlink and return the entry behind `r`. Neighbours are relinked; no
    /// other node moves.
    pub(crate) fn remove(&mut self, r: EntryRef) -> Option<Entry<K, V>> {
        let node = self.nodes.remove(r.raw())?;
        match node.prev {
            Some(p) => self.nodes[p].next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(n) => self.nodes[n].prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.entry)
    }

    pub(crate) fn pop_front(&mut self) -> Option<Entry<K, V>> {
        let head = self.head?;
        self.remove(EntryRef::new(head))
    }

    pub(crate) fn get(&self, r: EntryRef) -> Option<&Entry<K, V>> {
        self.nodes.get(r.raw()).map(|n| &n.entry)
    }

    pub(crate) fn get_mut(&mut self, r: EntryRef) -> Option<&mut Entry<K, V>> {
        self.nodes.get_mut(r.raw()).map(|n| &mut n.entry)
    }

    pub(crate) fn front(&self) -> Option<EntryRef> {
        self.head.map(EntryRef::new)
    }

    pub(crate) fn back(&self) -> Option<EntryRef> {
        self.tail.map(EntryRef::new)
    }

    /// Successor of `r` in insertion order.
    pub(crate) fn next_of(&self, r: EntryRef) -> Option<EntryRef> {
        self.nodes.get(r.raw())?.next.map(EntryRef::new)
    }

    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
    }

    pub(crate) fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            nodes: &self.nodes,
            next: self.head,
            remaining: self.nodes.len(),
        }
    }

    /// Mutable walk in insertion order.
    ///
    /// The arena hands out one `&mut` per node up front; the walk then takes
    /// them in list order, so no node is borrowed twice.
    pub(crate) fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let remaining = self.nodes.len();
        let next = self.head;
        IterMut {
            nodes: self.nodes.iter_mut().collect(),
            next,
            remaining,
        }
    }
}

pub(crate) struct Iter<'a, K, V> {
    nodes: &'a SlotMap<DefaultKey, Node<K, V>>,
    next: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Clone for Iter<'a, K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            next: self.next,
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (EntryRef, &'a Entry<K, V>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.next?;
        let nodes = self.nodes;
        let node = &nodes[k];
        self.next = node.next;
        self.remaining -= 1;
        Some((EntryRef::new(k), &node.entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}
impl<K, V> FusedIterator for Iter<'_, K, V> {}

pub(crate) struct IterMut<'a, K, V> {
    nodes: SecondaryMap<DefaultKey, &'a mut Node<K, V>>,
    next: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (EntryRef, &'a mut Entry<K, V>);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.next?;
        let node = self.nodes.remove(k)?;
        self.next = node.next;
        self.remaining -= 1;
        Some((EntryRef::new(k), &mut node.entry))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}
impl<K, V> FusedIterator for IterMut<'_, K, V> {}
