//! Debug-only reentrancy guard.
//!
//! Detects a thread re-entering a map while it already holds one of that
//! map's partition locks, e.g. an `update_or_insert` combinator or a
//! `for_each` callback calling back into the same map. With a
//! reader-writer lock such a call would deadlock (or wait on another
//! partition while holding one); in debug builds it panics instead. In
//! release builds, this compiles to a zero-cost no-op.
//!
//! Tracking is per thread: other threads entering the same map are the
//! normal concurrent case and are never flagged.

use core::marker::PhantomData;
#[cfg(debug_assertions)]
use std::cell::RefCell;
#[cfg(debug_assertions)]
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(debug_assertions)]
static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

#[cfg(debug_assertions)]
thread_local! {
    // Owners (maps) this thread is currently inside, innermost last.
    static ENTERED: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Per-map reentrancy tracker. Every partition of one map shares the same
/// owner id, so entering any partition counts as entering the map.
#[derive(Debug, Clone)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    owner: u64,
    _z: PhantomData<()>,
}

impl DebugReentrancy {
    /// Create a tracker with a fresh owner id.
    pub fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            owner: NEXT_OWNER.fetch_add(1, Ordering::Relaxed),
            _z: PhantomData,
        }
    }

    /// Enter a guarded section. In debug builds, panics if this thread is
    /// already inside the same owner.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            ENTERED.with(|entered| {
                let mut entered = entered.borrow_mut();
                assert!(
                    !entered.contains(&self.owner),
                    "reentrancy detected: map accessed while this thread holds one of its partition locks"
                );
                entered.push(self.owner);
            });
            return ReentrancyGuard { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentrancyGuard { _z: PhantomData };
        }
    }

    /// Check without entering. Used by operations that hand partition work
    /// to other threads while the calling thread waits on them.
    #[inline]
    pub fn assert_not_entered(&self) {
        #[cfg(debug_assertions)]
        ENTERED.with(|entered| {
            assert!(
                !entered.borrow().contains(&self.owner),
                "reentrancy detected: map accessed while this thread holds one of its partition locks"
            );
        });
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl<'a> Drop for ReentrancyGuard<'a> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        ENTERED.with(|entered| {
            let mut entered = entered.borrow_mut();
            let pos = entered.iter().rposition(|&o| o == self.owner.owner);
            debug_assert!(pos.is_some());
            if let Some(pos) = pos {
                entered.remove(pos);
            }
        });
    }
}
