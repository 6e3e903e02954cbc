//! chain-hashmap: an insertion-ordered hash map with separate chaining and
//! stable entry handles.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a map whose iteration order is insertion order, whose entry
//!   handles survive growth, and whose lookup index can be rebuilt without
//!   touching entry storage.
//! - Layers:
//!   - EntryStore<K, V>: a `SlotMap` arena threaded onto an intrusive
//!     doubly linked list. Owns every entry; append and remove-by-handle are
//!     O(1) and never move another entry.
//!   - BucketIndex: `capacity` chains of non-owning handles, one chain per
//!     `hash % capacity`. Holds nothing but handles.
//!   - ChainMap<K, V, S>: public API. Hashes, scans one chain, and keeps
//!     both structures in step.
//!
//! Constraints
//! - Single-threaded: `ChainMap` is `Send` but never `Sync`. Sharing across
//!   threads needs an external lock.
//! - Insert-if-absent: inserting an existing key keeps the stored value.
//! - Load factor 1.0: when `len` reaches `capacity` the capacity doubles and
//!   the index is rebuilt. Removal never shrinks it; `clear` resets it to
//!   `INITIAL_CAPACITY`.
//! - Each entry caches its `u64` hash. Rehashing re-places handles from the
//!   cache and never calls `K: Hash`.
//!
//! Handles
//! - `EntryRef` wraps a generational arena key. It resolves until its own
//!   entry is removed (or the map cleared); afterwards it resolves to `None`
//!   and never aliases a later entry that reuses the slot.
//!
//! Reentrancy
//! - Lookups hold a debug-only guard while user `Hash`/`Eq` code runs; a
//!   nested lookup on the same map from inside that code panics in debug
//!   builds. Mutation paths release the guard before touching either
//!   structure.
//!
//! Errors
//! - `at` reports a miss as `KeyNotFound`. `try_insert`/`insert_with` report
//!   a duplicate key as `InsertError::DuplicateKey`. Nothing else fails.
//!
//! Example
//!
//! ```
//! use chain_hashmap::{ChainMap, KeyNotFound};
//!
//! let mut m = ChainMap::from([(1, "a"), (2, "b"), (1, "c")]);
//! assert_eq!(m.len(), 2);
//! assert_eq!(m.at(&1), Ok(&"a"));
//! assert_eq!(m.at(&5), Err(KeyNotFound));
//!
//! // Insert-on-miss access.
//! *m.get_or_insert_default(5) = "e";
//! assert_eq!(m.iter().collect::<Vec<_>>(), [(&1, &"a"), (&2, &"b"), (&5, &"e")]);
//! ```

mod bucket_index;
pub mod chain_map;
mod chain_map_proptest;
mod entry_store;
mod error;
pub mod iter;
mod reentrancy;

// Public surface
pub use chain_map::{ChainMap, INITIAL_CAPACITY};
pub use entry_store::EntryRef;
pub use error::{InsertError, KeyNotFound};
