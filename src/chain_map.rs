//! ChainMap: table controller over the entry store and the bucket index.

use crate::bucket_index::BucketIndex;
use crate::entry_store::{Entry, EntryRef, EntryStore};
use crate::error::{InsertError, KeyNotFound};
use crate::iter::{IntoIter, Iter, IterMut, Keys, Values, ValuesMut};
use crate::reentrancy::ProbeGuard;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;
use log::{debug, trace};

/// Bucket count of a fresh or cleared map.
pub const INITIAL_CAPACITY: usize = 32;

impl EntryRef {
    pub fn key<'a, K, V, S>(&self, map: &'a ChainMap<K, V, S>) -> Option<&'a K> {
        map.entries.get(*self).map(|e| &e.key)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a ChainMap<K, V, S>) -> Option<&'a V> {
        map.entries.get(*self).map(|e| &e.value)
    }

    pub fn value_mut<'a, K, V, S>(&self, map: &'a mut ChainMap<K, V, S>) -> Option<&'a mut V> {
        map.entries.get_mut(*self).map(|e| &mut e.value)
    }
}

/// An insertion-ordered hash map using separate chaining.
///
/// Entries live in an ordered arena; the bucket index holds only handles into
/// it. Lookups hash the key, pick chain `hash % capacity` and compare keys
/// along that chain. Once `len()` reaches `capacity()` the capacity doubles and
/// the index is rebuilt from cached hashes. Capacity never shrinks on removal;
/// only [`clear`](Self::clear) brings it back to [`INITIAL_CAPACITY`].
///
/// Inserting a key that is already present keeps the stored value.
///
/// Not thread-safe: the map is `Send` but not `Sync`, so shared concurrent
/// use requires external synchronization.
pub struct ChainMap<K, V, S = DefaultHashBuilder> {
    hasher: S,
    entries: EntryStore<K, V>,
    index: BucketIndex,
    guard: ProbeGuard,
}

/// Outcome of walking one chain for a key.
struct Probe {
    hash: u64,
    slot: usize,
    hit: Option<(usize, EntryRef)>,
}

impl<K, V> ChainMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, V, S: Default> Default for ChainMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

impl<K, V, S> ChainMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            entries: EntryStore::new(),
            index: BucketIndex::with_capacity(INITIAL_CAPACITY),
            guard: ProbeGuard::new(),
        }
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current number of buckets.
    pub fn capacity(&self) -> usize {
        self.index.capacity()
    }

    /// Drop every entry and return to [`INITIAL_CAPACITY`] buckets. All
    /// outstanding handles go stale.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.index.reset(INITIAL_CAPACITY);
        trace!("cleared {} entries", dropped);
    }

    /// Oldest surviving entry.
    pub fn first(&self) -> Option<(&K, &V)> {
        let e = self.entries.get(self.entries.front()?)?;
        Some((&e.key, &e.value))
    }

    /// Newest surviving entry.
    pub fn last(&self) -> Option<(&K, &V)> {
        let e = self.entries.get(self.entries.back()?)?;
        Some((&e.key, &e.value))
    }

    /// Remove the entry behind `r`. Returns `None` for a stale handle.
    pub fn remove_ref(&mut self, r: EntryRef) -> Option<(K, V)> {
        let hash = self.entries.get(r)?.hash;
        let slot = self.index.slot_of(hash);
        let unlinked = self.index.unlink(slot, r);
        debug_assert!(unlinked, "live entry missing from its chain");
        self.entries.remove(r).map(|e| (e.key, e.value))
    }

    /// Keep only the entries for which `keep` returns true. Survivors keep
    /// their relative order and their handles.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let before = self.entries.len();
        let mut cursor = self.entries.front();
        while let Some(r) = cursor {
            cursor = self.entries.next_of(r);
            let Some(e) = self.entries.get_mut(r) else {
                continue;
            };
            if keep(&e.key, &mut e.value) {
                continue;
            }
            let slot = self.index.slot_of(e.hash);
            self.index.unlink(slot, r);
            self.entries.remove(r);
        }
        trace!("retain dropped {} entries", before - self.entries.len());
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.entries.iter())
    }

    /// Entries in insertion order, values mutable.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut::new(self.entries.iter_mut())
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys::new(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values::new(self.iter())
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut::new(self.iter_mut())
    }

    /// Double the bucket count once the load factor reaches 1.0.
    fn grow_if_full(&mut self) {
        let capacity = self.index.capacity();
        debug_assert!(self.entries.len() <= capacity);
        if self.entries.len() != capacity {
            return;
        }
        let new_capacity = capacity * 2;
        self.index.rebuild(
            self.entries.iter().map(|(r, e)| (r, e.hash)),
            new_capacity,
        );
        debug!(
            "rehashed {} entries: {} -> {} buckets",
            self.entries.len(),
            capacity,
            new_capacity
        );
    }

    fn link_new(&mut self, probe: Probe, key: K, value: V) -> EntryRef {
        debug_assert!(probe.hit.is_none());
        let r = self.entries.append(Entry {
            key,
            value,
            hash: probe.hash,
        });
        self.index.push(probe.slot, r);
        self.grow_if_full();
        r
    }
}

impl<K, V, S> ChainMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Hash `q` and walk its chain. The cached hash filters candidates; key
    /// equality decides the match.
    fn probe<Q>(&self, q: &Q) -> Probe
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.guard.enter();
        let hash = self.hasher.hash_one(q);
        let slot = self.index.slot_of(hash);
        let hit = self
            .index
            .bucket(slot)
            .iter()
            .enumerate()
            .find_map(|(pos, &r)| {
                let e = self.entries.get(r)?;
                (e.hash == hash && e.key.borrow() == q).then_some((pos, r))
            });
        Probe { hash, slot, hit }
    }

    /// Handle of the entry stored under `q`, or `None` when absent.
    pub fn find<Q>(&self, q: &Q) -> Option<EntryRef>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.probe(q).hit.map(|(_, r)| r)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.probe(q).hit.is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q)?.value(self)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let e = self.entries.get(self.find(q)?)?;
        Some((&e.key, &e.value))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q)?.value_mut(self)
    }

    /// Strict read: like [`get`](Self::get) but reports a miss as an error.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, KeyNotFound>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get(q).ok_or(KeyNotFound)
    }

    /// Insert `key -> value` if `key` is absent. Returns `false`, leaving the
    /// stored value as it was, when an equal key is already present.
    pub fn insert(&mut self, key: K, value: V) -> bool {
        self.try_insert(key, value).is_ok()
    }

    /// Like [`insert`](Self::insert) but hands back the new entry's handle, or
    /// the existing one inside the error.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<EntryRef, InsertError> {
        self.insert_with(key, || value)
    }

    /// Lazy form of [`try_insert`](Self::try_insert): `default` runs only when
    /// the key is absent.
    pub fn insert_with<F>(&mut self, key: K, default: F) -> Result<EntryRef, InsertError>
    where
        F: FnOnce() -> V,
    {
        let probe = self.probe(&key);
        if let Some((_, existing)) = probe.hit {
            return Err(InsertError::DuplicateKey { existing });
        }
        Ok(self.link_new(probe, key, default()))
    }

    /// Value stored under `key`, inserting `default()` first on a miss.
    ///
    /// This is a mutating read: a lookup that misses grows the map. Use
    /// [`get_mut`](Self::get_mut) or [`at`](Self::at) to look up without
    /// inserting.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let probe = self.probe(&key);
        let r = match probe.hit {
            Some((_, r)) => r,
            None => self.link_new(probe, key, default()),
        };
        match self.entries.get_mut(r) {
            Some(e) => &mut e.value,
            None => unreachable!("probed or freshly linked entry is live"),
        }
    }

    /// Value stored under `key`, inserting `V::default()` first on a miss.
    ///
    /// This is a mutating read, see [`get_or_insert_with`](Self::get_or_insert_with).
    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Remove `q` and return its value. A missing key is a no-op.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let probe = self.probe(q);
        let (pos, r) = probe.hit?;
        // Unlink before the entry leaves the store so the index never holds a
        // dangling handle.
        self.index.unlink_at(probe.slot, pos);
        self.entries.remove(r).map(|e| (e.key, e.value))
    }

    /// Checks every structural invariant, panicking on the first violation.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        use std::collections::HashSet;

        assert_eq!(self.index.linked(), self.entries.len(), "len mismatch");
        assert_eq!(self.entries.iter().count(), self.entries.len());
        assert!(self.index.capacity() >= INITIAL_CAPACITY);
        assert!(self.entries.len() < self.index.capacity());

        let mut seen = HashSet::new();
        for (slot, chain) in self.index.chains().enumerate() {
            for &r in chain {
                assert!(seen.insert(r), "handle linked twice");
                let e = self.entries.get(r).expect("chain holds a stale handle");
                assert_eq!(e.hash, self.hasher.hash_one(&e.key), "cached hash drifted");
                assert_eq!(self.index.slot_of(e.hash), slot, "entry in wrong chain");
            }
        }
        for (r, _) in self.entries.iter() {
            assert!(seen.contains(&r), "entry missing from index");
        }
    }
}

impl<K, V, S> Clone for ChainMap<K, V, S>
where
    K: Clone,
    V: Clone,
    S: Clone,
{
    /// The clone shares no storage with `self`. Handles taken from `self` also
    /// resolve in the clone, to the copied entry.
    fn clone(&self) -> Self {
        Self {
            hasher: self.hasher.clone(),
            entries: self.entries.clone(),
            index: self.index.clone(),
            guard: ProbeGuard::new(),
        }
    }
}

impl<K, V, S> fmt::Debug for ChainMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Order-insensitive, like `std::collections::HashMap`.
impl<K, V, S> PartialEq for ChainMap<K, V, S>
where
    K: Eq + Hash,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S> Eq for ChainMap<K, V, S>
where
    K: Eq + Hash,
    V: Eq,
    S: BuildHasher,
{
}

/// Non-mutating lookup. Panics when the key is absent; use
/// [`ChainMap::get_or_insert_default`] for insert-on-miss access.
impl<K, Q, V, S> Index<&Q> for ChainMap<K, V, S>
where
    K: Eq + Hash + Borrow<Q>,
    Q: ?Sized + Eq + Hash,
    S: BuildHasher,
{
    type Output = V;

    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in ChainMap")
    }
}

impl<K, V, S> Extend<(K, V)> for ChainMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// First occurrence of a key wins, both against stored keys and within
    /// `iter`.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for ChainMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::with_hasher(S::default());
        m.extend(iter);
        m
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for ChainMap<K, V>
where
    K: Eq + Hash,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K, V, S> IntoIterator for ChainMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> IntoIter<K, V> {
        IntoIter::new(self.entries)
    }
}

impl<'a, K, V, S> IntoIterator for &'a ChainMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut ChainMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> IterMut<'a, K, V> {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::hash::Hasher;

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        } // every key lands in chain 0
    }

    /// Hashes a `u64` key to itself, so chain placement is predictable.
    #[derive(Clone, Default)]
    struct IdentityBuildHasher;
    #[derive(Default)]
    struct IdentityHasher(u64);
    impl BuildHasher for IdentityBuildHasher {
        type Hasher = IdentityHasher;
        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher::default()
        }
    }
    impl Hasher for IdentityHasher {
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | u64::from(b);
            }
        }
        fn write_u64(&mut self, n: u64) {
            self.0 = n;
        }
        fn finish(&self) -> u64 {
            self.0
        }
    }

    fn pairs<K: Clone, V: Clone, S>(m: &ChainMap<K, V, S>) -> Vec<(K, V)> {
        m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    /// Invariant: a duplicate insert is a no-op; the first value stays.
    #[test]
    fn duplicate_insert_keeps_first_value() {
        let mut m: ChainMap<i32, &str> = ChainMap::new();
        assert!(m.insert(1, "a"));
        assert!(m.insert(2, "b"));
        assert!(!m.insert(1, "c"));
        assert_eq!(m.len(), 2);
        assert_eq!(m.get(&1), Some(&"a"));
        assert_eq!(pairs(&m), [(1, "a"), (2, "b")]);
        m.assert_consistent();
    }

    /// Invariant: `try_insert` reports the existing handle on duplicates.
    #[test]
    fn try_insert_reports_existing_handle() {
        let mut m: ChainMap<String, i32> = ChainMap::new();
        let h = m.try_insert("dup".to_string(), 1).unwrap();
        match m.try_insert("dup".to_string(), 2) {
            Err(InsertError::DuplicateKey { existing }) => assert_eq!(existing, h),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(h.value(&m), Some(&1));
        assert_eq!(m.len(), 1);
    }

    /// Invariant: `insert_with` runs its closure only on a real insert.
    #[test]
    fn insert_with_is_lazy() {
        let mut m: ChainMap<&str, i32> = ChainMap::new();
        let calls = Cell::new(0);
        let make = || {
            calls.set(calls.get() + 1);
            7
        };
        assert!(m.insert_with("k", make).is_ok());
        assert!(m.insert_with("k", make).is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(m.get("k"), Some(&7));
    }

    /// Invariant: `at` fails with `KeyNotFound` where the defaulting accessor
    /// inserts.
    #[test]
    fn at_vs_get_or_insert_default() {
        let mut m: ChainMap<i32, String> = ChainMap::new();
        assert_eq!(m.at(&5), Err(KeyNotFound));
        assert_eq!(m.get_or_insert_default(5).as_str(), "");
        assert_eq!(m.len(), 1);
        assert!(m.find(&5).is_some());
        assert_eq!(m.at(&5).map(String::as_str), Ok(""));

        m.get_or_insert_default(5).push_str("hit");
        assert_eq!(m.len(), 1);
        assert_eq!(m[&5], "hit");
    }

    #[test]
    #[should_panic(expected = "key not found")]
    fn index_panics_on_miss() {
        let m: ChainMap<i32, i32> = ChainMap::new();
        let _v: i32 = m[&1];
    }

    /// Invariant: growth fires exactly when `len` reaches `capacity`.
    #[test]
    fn capacity_doubles_at_load_factor_one() {
        let mut m: ChainMap<u64, u64> = ChainMap::new();
        for i in 0..31 {
            m.insert(i, i * 10);
        }
        assert_eq!(m.capacity(), INITIAL_CAPACITY);
        m.insert(31, 310);
        assert_eq!(m.capacity(), 64);
        for i in 0..32 {
            assert_eq!(m.get(&i), Some(&(i * 10)));
        }
        m.assert_consistent();

        for i in 32..64 {
            m.insert(i, i * 10);
        }
        assert_eq!(m.capacity(), 128);
        m.assert_consistent();
    }

    /// Invariant: removals never shrink capacity; `clear` resets it.
    #[test]
    fn remove_keeps_capacity_clear_resets() {
        let mut m: ChainMap<u32, u32> = (0..50).map(|i| (i, i)).collect();
        assert_eq!(m.capacity(), 64);
        for i in 0..50 {
            assert_eq!(m.remove(&i), Some(i));
        }
        assert!(m.is_empty());
        assert_eq!(m.capacity(), 64);

        m.extend((0..50).map(|i| (i, i)));
        m.clear();
        assert_eq!(m.len(), 0);
        assert_eq!(m.capacity(), INITIAL_CAPACITY);
        assert!(m.iter().next().is_none());
        m.assert_consistent();
    }

    /// Invariant: erasing an absent key leaves the map unchanged.
    #[test]
    fn remove_missing_is_noop() {
        let mut m = ChainMap::from([(1, 'a'), (2, 'b')]);
        assert_eq!(m.remove(&3), None);
        assert_eq!(m.remove_entry(&3), None);
        assert_eq!(pairs(&m), [(1, 'a'), (2, 'b')]);
        m.assert_consistent();
    }

    /// Invariant: chain scans compare keys, so colliding keys stay distinct.
    #[test]
    fn full_collisions_resolve_by_equality() {
        let mut m: ChainMap<String, i32, ConstBuildHasher> =
            ChainMap::with_hasher(ConstBuildHasher);
        for i in 0..40 {
            assert!(m.insert(format!("k{i}"), i));
        }
        assert_eq!(m.capacity(), 64);
        for i in 0..40 {
            assert_eq!(m.get(format!("k{i}").as_str()), Some(&i));
        }
        assert_eq!(m.remove("k7"), Some(7));
        assert!(m.get("k7").is_none());
        assert_eq!(m.len(), 39);
        m.assert_consistent();
    }

    /// Invariant: keys sharing a chain at capacity 32 split by the new
    /// modulus after growth and stay findable.
    #[test]
    fn rehash_moves_entries_between_chains() {
        let mut m: ChainMap<u64, u64, IdentityBuildHasher> =
            ChainMap::with_hasher(IdentityBuildHasher);
        // 1 and 33 share chain 1 until capacity reaches 64.
        m.insert(1, 1);
        m.insert(33, 33);
        assert_eq!(m.index.slot_of(1), m.index.slot_of(33));
        for k in 100..130 {
            m.insert(k, k);
        }
        assert_eq!(m.capacity(), 64);
        assert_ne!(m.index.slot_of(1), m.index.slot_of(33));
        assert_eq!(m.get(&1), Some(&1));
        assert_eq!(m.get(&33), Some(&33));
        m.assert_consistent();
    }

    /// Invariant: iteration follows insertion order across removals and
    /// rehashes.
    #[test]
    fn order_survives_removal_and_growth() {
        let mut m: ChainMap<u32, u32> = ChainMap::new();
        for i in 0..20 {
            m.insert(i, i);
        }
        for i in (0..20).step_by(3) {
            m.remove(&i);
        }
        for i in 100..130 {
            m.insert(i, i);
        }
        m.insert(3, 3);

        let expected: Vec<u32> = (0..20)
            .filter(|i| i % 3 != 0)
            .chain(100..130)
            .chain([3])
            .collect();
        assert_eq!(m.keys().copied().collect::<Vec<_>>(), expected);
        assert_eq!(m.first(), Some((&1, &1)));
        assert_eq!(m.last(), Some((&3, &3)));
        m.assert_consistent();
    }

    /// Invariant: handles survive rehashes and unrelated removals, and go
    /// stale when their own entry is removed.
    #[test]
    fn handles_survive_growth() {
        let mut m: ChainMap<u32, u32> = ChainMap::new();
        let h = m.try_insert(0, 0).unwrap();
        let other = m.try_insert(1, 1).unwrap();
        for i in 2..100 {
            m.insert(i, i);
        }
        assert_eq!(m.capacity(), 128);
        assert_eq!(h.key(&m), Some(&0));
        assert_eq!(m.remove_ref(other), Some((1, 1)));
        assert_eq!(m.remove_ref(other), None);
        *h.value_mut(&mut m).unwrap() = 42;
        assert_eq!(m.get(&0), Some(&42));
        m.assert_consistent();

        m.clear();
        assert!(h.value(&m).is_none());
    }

    #[test]
    fn retain_keeps_order_of_survivors() {
        let mut m: ChainMap<u32, u32> = (0..40).map(|i| (i, i * 2)).collect();
        let keep = m.find(&21).unwrap();
        m.retain(|k, v| {
            *v += 1;
            k % 3 == 0
        });
        assert_eq!(m.len(), 14);
        assert_eq!(
            m.iter().take(3).map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            [(0, 1), (3, 7), (6, 13)]
        );
        assert_eq!(keep.value(&m), Some(&43));
        m.assert_consistent();
    }

    #[test]
    fn iter_mut_and_values_mut_update_in_place() {
        let mut m = ChainMap::from([("a", 1), ("b", 2), ("c", 3)]);
        for (_, v) in m.iter_mut() {
            *v *= 10;
        }
        for v in m.values_mut() {
            *v += 1;
        }
        for (_, v) in &mut m {
            *v += 1;
        }
        assert_eq!(m.values().copied().collect::<Vec<_>>(), [12, 22, 32]);
        assert_eq!(m.iter().len(), 3);
    }

    #[test]
    fn into_iter_yields_owned_pairs_in_order() {
        let mut m: ChainMap<String, usize> = ChainMap::new();
        for w in ["one", "two", "three", "two"] {
            let n = m.len();
            m.get_or_insert_with(w.to_string(), || n);
        }
        let owned: Vec<(String, usize)> = m.into_iter().collect();
        assert_eq!(
            owned,
            [
                ("one".to_string(), 0),
                ("two".to_string(), 1),
                ("three".to_string(), 2)
            ]
        );
    }

    /// Invariant: a clone is independent; equality ignores order.
    #[test]
    fn clone_eq_and_debug() {
        let a = ChainMap::from([(1, "x"), (2, "y")]);
        let mut b = a.clone();
        assert_eq!(a, b);
        b.remove(&1);
        assert_ne!(a, b);
        assert_eq!(a.len(), 2);
        b.insert(1, "x");
        assert_eq!(a, b);
        assert_eq!(format!("{:?}", a), r#"{1: "x", 2: "y"}"#);
        b.assert_consistent();
    }

    /// Invariant (debug-only): reaching back into the map from `K: Eq` while a
    /// lookup walks a chain panics.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrant_lookup_from_eq_panics() {
        struct ReentryKey {
            id: &'static str,
            map: *const ChainMap<ReentryKey, i32, ConstBuildHasher>,
        }
        impl PartialEq for ReentryKey {
            fn eq(&self, other: &Self) -> bool {
                if !self.map.is_null() {
                    // Reach back into the map mid-probe.
                    unsafe {
                        let _ = (*self.map).contains_key(other);
                    }
                }
                self.id == other.id
            }
        }
        impl Eq for ReentryKey {}
        impl Hash for ReentryKey {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }

        let mut m: ChainMap<ReentryKey, i32, ConstBuildHasher> =
            ChainMap::with_hasher(ConstBuildHasher);
        // The stored key points back at its own map; the chain is empty, so
        // inserting it compares nothing.
        let stored = ReentryKey {
            id: "a",
            map: &m as *const _,
        };
        m.insert(stored, 1);
        let query = ReentryKey {
            id: "b",
            map: core::ptr::null(),
        };
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = m.find(&query);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
        assert_eq!(m.len(), 1);
    }
}
