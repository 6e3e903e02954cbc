//! Debug-only probe guard.
//!
//! Lookups call into user code (`K: Hash`, `K: Eq`) while walking a chain.
//! If that code reaches back into the same map, the walk would observe the
//! map mid-probe. In debug builds the guard turns that into a panic; in
//! release builds it compiles away.

use core::cell::Cell;
use core::marker::PhantomData;

/// Embedded in the map; `enter` marks the span during which user code runs.
#[derive(Debug, Default)]
pub(crate) struct ProbeGuard {
    #[cfg(debug_assertions)]
    busy: Cell<bool>,
    // Keeps the owner !Sync in every build profile, not just debug.
    _not_sync: PhantomData<Cell<()>>,
}

impl ProbeGuard {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            busy: Cell::new(false),
            _not_sync: PhantomData,
        }
    }

    /// Open a probe span. Panics in debug builds if one is already open.
    #[inline]
    pub(crate) fn enter(&self) -> Probing<'_> {
        #[cfg(debug_assertions)]
        {
            assert!(
                !self.busy.replace(true),
                "reentrant access to ChainMap from Hash/Eq during a lookup"
            );
            return Probing { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return Probing { _owner: PhantomData };
        }
    }
}

// Per-map state; a clone starts idle.
impl Clone for ProbeGuard {
    fn clone(&self) -> Self {
        Self::new()
    }
}

/// Closes the span on drop.
pub(crate) struct Probing<'a> {
    #[cfg(debug_assertions)]
    owner: &'a ProbeGuard,
    #[cfg(not(debug_assertions))]
    _owner: PhantomData<&'a ProbeGuard>,
}

impl Drop for Probing<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(self.owner.busy.get());
            self.owner.busy.set(false);
        }
    }
}
