//! A fixed-capacity table of process-wide MCS locks.
//!
//! Firmware that shares a handful of locks between cores can register each
//! one here and hand out slot indices instead of pointers. The first lock to
//! claim a slot keeps it for good. With a capacity of one, this behaves like
//! a single global lock: once a lock is registered, registering any other
//! lock fails and leaves that other lock untouched.

use core::{
    ptr,
    sync::atomic::{AtomicPtr, Ordering},
};

use log::{debug, warn};

use crate::{LockError, McsLock};

/// A table of up to `N` registered locks.
pub struct LockRegistry<const N: usize> {
    slots: [AtomicPtr<McsLock>; N],
}

/// A registry with the configured default capacity.
pub type DefaultLockRegistry = LockRegistry<{ lock_config::LOCK_REGISTRY_CAPACITY }>;

impl<const N: usize> LockRegistry<N> {
    pub const fn new() -> Self {
        Self {
            slots: [const { AtomicPtr::new(ptr::null_mut()) }; N],
        }
    }

    /// Registers `lock` and initializes it, returning its slot index.
    ///
    /// Registering a lock that is already present returns its existing slot
    /// (and its `init` is a no-op). If every slot is taken by other locks,
    /// this returns [`LockError::RegistryFull`] and does not initialize `lock`.
    ///
    /// A lock becomes visible through [`get`](Self::get) slightly before
    /// its initialization completes; using it in that window is the usual
    /// not-ready no-op.
    pub fn register(&self, lock: &'static McsLock) -> Result<usize, LockError> {
        let lock_ptr = lock as *const McsLock as *mut McsLock;

        // Slots fill strictly in order and are never cleared, so a lock that
        // is already registered is always found before any free slot.
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.compare_exchange(
                ptr::null_mut(),
                lock_ptr,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    lock.init();
                    debug!("registered MCS lock {:p} in slot {}", lock, index);
                    return Ok(index);
                }
                Err(existing) if existing == lock_ptr => {
                    lock.init();
                    return Ok(index);
                }
                Err(_) => continue,
            }
        }

        warn!("MCS lock registry is full ({} slots); ignoring lock {:p}", N, lock);
        Err(LockError::RegistryFull)
    }

    /// Returns the lock registered in slot `index`, if any.
    pub fn get(&self, index: usize) -> Option<&'static McsLock> {
        let lock_ptr = self.slots.get(index)?.load(Ordering::Acquire);
        // SAFETY: only `&'static McsLock` pointers are ever stored.
        unsafe { lock_ptr.as_ref() }
    }

    /// Returns the slot index of `lock`, if it is registered.
    pub fn position(&self, lock: &McsLock) -> Option<usize> {
        let lock_ptr = lock as *const McsLock as *mut McsLock;
        self.slots
            .iter()
            .position(|slot| slot.load(Ordering::Acquire) == lock_ptr)
    }

    /// Returns the number of registered locks.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .take_while(|slot| !slot.load(Ordering::Acquire).is_null())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for LockRegistry<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_lock_wins_single_slot() {
        static REGISTRY: LockRegistry<1> = LockRegistry::new();
        static FIRST: McsLock = McsLock::new();
        static SECOND: McsLock = McsLock::new();

        assert_eq!(REGISTRY.register(&FIRST), Ok(0));
        assert!(FIRST.is_ready());

        assert_eq!(REGISTRY.register(&SECOND), Err(LockError::RegistryFull));
        assert!(!SECOND.is_ready());
        assert!(core::ptr::eq(REGISTRY.get(0).unwrap(), &FIRST));
    }

    #[test]
    fn reregistering_returns_same_slot() {
        static REGISTRY: LockRegistry<3> = LockRegistry::new();
        static A: McsLock = McsLock::new();
        static B: McsLock = McsLock::new();

        assert_eq!(REGISTRY.register(&A), Ok(0));
        assert_eq!(REGISTRY.register(&B), Ok(1));
        assert_eq!(REGISTRY.register(&B), Ok(1));
        assert_eq!(REGISTRY.register(&A), Ok(0));
        assert_eq!(REGISTRY.len(), 2);
        assert_eq!(REGISTRY.position(&B), Some(1));
        assert!(REGISTRY.get(2).is_none());
        assert!(REGISTRY.get(7).is_none());
    }

    #[test]
    fn reregistering_a_held_lock_does_not_reset_it() {
        static REGISTRY: LockRegistry<2> = LockRegistry::new();
        static LOCK: McsLock = McsLock::new();

        REGISTRY.register(&LOCK).unwrap();
        let mut node = crate::McsNode::new();
        LOCK.lock_then(&mut node, || {
            assert_eq!(REGISTRY.register(&LOCK), Ok(0));
            assert!(LOCK.is_locked());
        })
        .unwrap();
        assert!(!LOCK.is_locked());
    }

    #[test]
    fn concurrent_registration_fills_each_slot_once() {
        use std::{sync::Arc, thread, vec::Vec};

        static REGISTRY: LockRegistry<4> = LockRegistry::new();

        let locks: Arc<Vec<&'static McsLock>> = Arc::new(
            (0..6)
                .map(|_| -> &'static McsLock { Box::leak(Box::new(McsLock::new())) })
                .collect(),
        );

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let locks = Arc::clone(&locks);
                thread::spawn(move || REGISTRY.register(locks[i]))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let mut slots: Vec<usize> = results.iter().filter_map(|r| r.ok()).collect();
        slots.sort_unstable();
        assert_eq!(slots, [0, 1, 2, 3]);
        assert_eq!(
            results.iter().filter(|r| **r == Err(LockError::RegistryFull)).count(),
            2
        );
        assert_eq!(REGISTRY.len(), REGISTRY.capacity());
    }
}
