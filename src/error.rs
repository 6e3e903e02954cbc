//! Caller-visible failures. Everything not listed here cannot fail.

use crate::entry_store::EntryRef;
use thiserror::Error;

/// Returned by [`ChainMap::at`](crate::ChainMap::at) when the key is absent.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
#[error("key not found")]
pub struct KeyNotFound;

/// Returned by the handle-returning insert methods when an equal key is
/// already stored. The stored entry is left untouched.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum InsertError {
    #[error("key already present")]
    DuplicateKey { existing: EntryRef },
}
