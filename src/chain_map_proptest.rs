#![cfg(test)]

// Property tests for ChainMap kept inside the crate so they can check the
// bucket index and entry store directly via `assert_consistent`.

use crate::chain_map::{ChainMap, INITIAL_CAPACITY};
use crate::entry_store::EntryRef;
use crate::error::{InsertError, KeyNotFound};
use core::hash::BuildHasher;
use proptest::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// Pool-indexed operations: indices shrink to earlier keys, the pool shrinks,
// and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    TryInsert(usize, i32),
    Remove(usize),
    RemoveRef(usize),
    At(usize),
    Contains(String),
    Mutate(usize, i32),
    GetOrDefault(usize),
    Retain(i32),
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

// Pools reach 48 keys so long scenarios cross the first growth at 32.
fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,4}", 1..=48).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::TryInsert(i, v)),
            2 => idx.clone().prop_map(Op::Remove),
            1 => idx.clone().prop_map(Op::RemoveRef),
            2 => idx.clone().prop_map(Op::At),
            1 => prop_oneof![contains_pool, "[a-z]{0,4}"].prop_map(Op::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            1 => idx.clone().prop_map(Op::GetOrDefault),
            1 => any::<i32>().prop_map(Op::Retain),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..160).prop_map(move |ops| (pool.clone(), ops))
    })
}

/// Reference model: std map for contents plus a Vec for insertion order.
#[derive(Default)]
struct Model {
    map: HashMap<Key, i32>,
    order: Vec<Key>,
    capacity: usize,
}

impl Model {
    fn new() -> Self {
        Self {
            capacity: INITIAL_CAPACITY,
            ..Self::default()
        }
    }

    fn insert(&mut self, k: Key, v: i32) -> bool {
        if self.map.contains_key(&k) {
            return false;
        }
        self.map.insert(k.clone(), v);
        self.order.push(k);
        if self.map.len() == self.capacity {
            self.capacity *= 2;
        }
        true
    }

    fn remove(&mut self, k: &Key) -> Option<i32> {
        let v = self.map.remove(k)?;
        self.order.retain(|x| x != k);
        Some(v)
    }

    fn clear(&mut self) {
        *self = Self::new();
    }
}

// Property: state-machine equivalence against the model.
// Invariants exercised after every operation:
// - insert-if-absent: the first value for a key wins.
// - `at` fails with KeyNotFound exactly when the model lacks the key.
// - iteration order equals insertion order minus removed keys.
// - capacity follows the doubling schedule and resets on clear.
// - len == store length == linked handles; every handle sits in chain
//   `hash % capacity`.
// - handles of removed entries never resolve again.
fn run_scenario<S>(
    mut sut: ChainMap<Key, i32, S>,
    pool: Vec<String>,
    ops: Vec<Op>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher,
{
    let mut model = Model::new();
    let mut stale: Vec<EntryRef> = Vec::new();

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_from(&pool, i);
                prop_assert_eq!(sut.insert(k.clone(), v), model.insert(k, v));
            }
            Op::TryInsert(i, v) => {
                let k = key_from(&pool, i);
                let before = sut.find(&k);
                match sut.try_insert(k.clone(), v) {
                    Ok(h) => {
                        prop_assert!(model.insert(k, v));
                        prop_assert_eq!(h.value(&sut), Some(&v));
                    }
                    Err(InsertError::DuplicateKey { existing }) => {
                        prop_assert!(!model.insert(k, v));
                        prop_assert_eq!(Some(existing), before);
                    }
                }
            }
            Op::Remove(i) => {
                let k = key_from(&pool, i);
                let h = sut.find(&k);
                prop_assert_eq!(sut.remove(&k), model.remove(&k));
                stale.extend(h);
            }
            Op::RemoveRef(i) => {
                let k = key_from(&pool, i);
                if let Some(h) = sut.find(&k) {
                    let (kk, vv) = sut.remove_ref(h).expect("live handle");
                    prop_assert_eq!(&kk, &k);
                    prop_assert_eq!(Some(vv), model.remove(&k));
                    stale.push(h);
                }
            }
            Op::At(i) => {
                let k = key_from(&pool, i);
                match model.map.get(&k) {
                    Some(v) => prop_assert_eq!(sut.at(&k), Ok(v)),
                    None => prop_assert_eq!(sut.at(&k), Err(KeyNotFound)),
                }
            }
            Op::Contains(s) => {
                let has_model = model.map.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            Op::Mutate(i, d) => {
                let k = key_from(&pool, i);
                if let Some(v) = sut.get_mut(&k) {
                    *v = v.wrapping_add(d);
                    let mv = model.map.get_mut(&k).expect("present in model");
                    *mv = mv.wrapping_add(d);
                } else {
                    prop_assert!(!model.map.contains_key(&k));
                }
            }
            Op::GetOrDefault(i) => {
                let k = key_from(&pool, i);
                model.insert(k.clone(), 0);
                let v = *sut.get_or_insert_default(k.clone());
                prop_assert_eq!(Some(&v), model.map.get(&k));
            }
            Op::Retain(pivot) => {
                let dropped: Vec<EntryRef> = sut
                    .iter()
                    .filter(|&(_, v)| *v >= pivot)
                    .map(|(k, _)| sut.find(k).expect("iterated key is live"))
                    .collect();
                sut.retain(|_, v| *v < pivot);
                let gone: Vec<Key> = model
                    .map
                    .iter()
                    .filter(|&(_, v)| *v >= pivot)
                    .map(|(k, _)| k.clone())
                    .collect();
                for k in &gone {
                    model.remove(k);
                }
                stale.extend(dropped);
            }
            Op::Clear => {
                stale.extend(sut.iter().map(|(k, _)| sut.find(k).expect("live")));
                sut.clear();
                model.clear();
            }
        }

        sut.assert_consistent();
        for &h in &stale {
            prop_assert!(h.value(&sut).is_none(), "stale handle resolved");
        }
        prop_assert_eq!(sut.len(), model.map.len());
        prop_assert_eq!(sut.is_empty(), model.map.is_empty());
        prop_assert_eq!(sut.capacity(), model.capacity);
        let order: Vec<&Key> = sut.keys().collect();
        prop_assert_eq!(order, model.order.iter().collect::<Vec<_>>());
        for k in &model.order {
            prop_assert_eq!(sut.get(k), model.map.get(k));
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_scenario(ChainMap::new(), pool, ops)?;
    }
}

// Constant hasher: every key shares one chain, so every lookup is decided by
// key equality alone.
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
    }
}

// Coarse hasher: only the key length feeds the hash, so many distinct keys
// collide while chains still spread over several buckets.
#[derive(Clone, Default)]
struct LenBuildHasher;
struct LenHasher(u64);
impl BuildHasher for LenBuildHasher {
    type Hasher = LenHasher;
    fn build_hasher(&self) -> Self::Hasher {
        LenHasher(0)
    }
}
impl Hasher for LenHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.0 = self.0.wrapping_add(bytes.len() as u64);
    }
    fn finish(&self) -> u64 {
        self.0
    }
}

// Property: same invariants under worst-case and heavy-but-partial collisions.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_scenario(ChainMap::with_hasher(ConstBuildHasher), pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_coarse_hash((pool, ops) in arb_scenario()) {
        run_scenario(ChainMap::with_hasher(LenBuildHasher), pool, ops)?;
    }
}

// Property: growth is exactly the doubling schedule for distinct keys, and
// every value stays findable across each rehash.
proptest! {
    #[test]
    fn prop_growth_schedule(n in 0usize..300) {
        let mut m: ChainMap<usize, usize> = ChainMap::new();
        let mut expected = INITIAL_CAPACITY;
        for i in 0..n {
            m.insert(i, i * 7);
            if i + 1 == expected {
                expected *= 2;
            }
            prop_assert_eq!(m.capacity(), expected);
        }
        m.assert_consistent();
        for i in 0..n {
            prop_assert_eq!(m.get(&i), Some(&(i * 7)));
        }
    }
}

#[test]
fn hash_is_cached_per_entry() {
    #[derive(PartialEq, Eq)]
    struct Counted<'a>(u32, &'a std::cell::Cell<u32>);
    impl Hash for Counted<'_> {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.1.set(self.1.get() + 1);
            self.0.hash(state);
        }
    }

    let calls = std::cell::Cell::new(0);
    let mut m: ChainMap<Counted<'_>, ()> = ChainMap::new();
    for i in 0..(INITIAL_CAPACITY as u32) {
        m.insert(Counted(i, &calls), ());
    }
    // One hash per insert; the rehash at 32 entries reuses cached hashes.
    assert_eq!(m.capacity(), 2 * INITIAL_CAPACITY);
    assert_eq!(calls.get(), INITIAL_CAPACITY as u32);
}
