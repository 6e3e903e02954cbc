//! BucketIndex: separate-chaining index of non-owning entry handles.

use crate::entry_store::EntryRef;

/// `capacity` chains; chain `i` holds the handles whose cached hash satisfies
/// `hash % capacity == i`. Owns no entries.
#[derive(Debug, Clone)]
pub(crate) struct BucketIndex {
    buckets: Vec<Vec<EntryRef>>,
}

fn empty_buckets(capacity: usize) -> Vec<Vec<EntryRef>> {
    std::iter::repeat_with(Vec::new).take(capacity).collect()
}

impl BucketIndex {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            buckets: empty_buckets(capacity),
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn slot_of(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    pub(crate) fn bucket(&self, slot: usize) -> &[EntryRef] {
        &self.buckets[slot]
    }

    pub(crate) fn push(&mut self, slot: usize, r: EntryRef) {
        self.buckets[slot].push(r);
    }

    /// Drop the handle at `pos` of chain `slot`. Chain order carries no
    /// meaning, so the last handle fills the gap.
    pub(crate) fn unlink_at(&mut self, slot: usize, pos: usize) -> EntryRef {
        self.buckets[slot].swap_remove(pos)
    }

    pub(crate) fn unlink(&mut self, slot: usize, r: EntryRef) -> bool {
        match self.buckets[slot].iter().position(|&x| x == r) {
            Some(pos) => {
                self.unlink_at(slot, pos);
                true
            }
            None => false,
        }
    }

    /// Replace every chain with `new_capacity` empty ones and re-place each
    /// live `(handle, hash)` pair. Only bucket bookkeeping changes; entries stay
    /// where they are.
    pub(crate) fn rebuild<I>(&mut self, live: I, new_capacity: usize)
    where
        I: IntoIterator<Item = (EntryRef, u64)>,
    {
        self.reset(new_capacity);
        for (r, hash) in live {
            let slot = self.slot_of(hash);
            self.buckets[slot].push(r);
        }
    }

    pub(crate) fn reset(&mut self, capacity: usize) {
        debug_assert!(capacity > 0);
        self.buckets = empty_buckets(capacity);
    }

    #[cfg(test)]
    pub(crate) fn chains(&self) -> impl Iterator<Item = &[EntryRef]> {
        self.buckets.iter().map(Vec::as_slice)
    }

    /// Total handles across all chains.
    #[cfg(test)]
    pub(crate) fn linked(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}
