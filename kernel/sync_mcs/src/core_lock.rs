use derive_more::{Display, From};
use mcs::{
    relax::{Relax, Spin},
    LockError, McsLock, McsNode,
};

/// The index of a CPU core taking part in a [`CoreLock`].
#[derive(Clone, Copy, Debug, Display, From, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display(fmt = "core {}", _0)]
#[repr(transparent)]
pub struct CoreId(u8);

impl CoreId {
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    /// Returns the raw core index.
    pub const fn value(self) -> u8 {
        self.0
    }
}

/// A cross-core lock with one built-in queue node for each of `CORES` cores.
///
/// Each core always queues with its own node, so callers only need to say
/// which core they are running on. Like a bare [`McsLock`], a lock created
/// with [`new`](Self::new) must be [`init`](Self::init)ialized first; until
/// then every attempt to lock it returns [`LockError::NotReady`].
#[derive(Debug)]
#[repr(C)]
pub struct CoreLock<const CORES: usize> {
    nodes: [McsNode; CORES],
    lock: McsLock,
}

/// A [`CoreLock`] sized for the configured maximum number of cores.
pub type DefaultCoreLock = CoreLock<{ lock_config::MAX_CORES }>;

impl<const CORES: usize> CoreLock<CORES> {
    pub const fn new() -> Self {
        Self {
            nodes: [const { McsNode::new() }; CORES],
            lock: McsLock::new(),
        }
    }

    pub const fn new_ready() -> Self {
        Self {
            nodes: [const { McsNode::new() }; CORES],
            lock: McsLock::new_ready(),
        }
    }

    /// Initializes the lock. Calling this again has no effect.
    pub fn init(&self) {
        self.lock.init();
    }

    pub fn is_ready(&self) -> bool {
        self.lock.is_ready()
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }

    /// The number of cores this lock has nodes for.
    pub const fn cores(&self) -> usize {
        CORES
    }

    /// Runs `f` while holding the lock on behalf of `core`.
    ///
    /// # Safety
    ///
    /// The caller must be running on `core`, and nothing else may lock this
    /// `CoreLock` as `core` until this returns: not another thread claiming
    /// the same id, and not an interrupt handler on the same core. Debug
    /// builds panic if `core` re-enters the lock while holding it.
    pub unsafe fn lock_then<F, T>(&self, core: CoreId, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        // SAFETY: forwarded to the caller.
        unsafe { self.lock_then_with::<Spin, F, T>(core, f) }
    }

    /// Like [`lock_then`](Self::lock_then), waiting with relax strategy `R`.
    ///
    /// # Safety
    ///
    /// Same as [`lock_then`](Self::lock_then).
    pub unsafe fn lock_then_with<R, F, T>(&self, core: CoreId, f: F) -> Result<T, LockError>
    where
        R: Relax,
        F: FnOnce() -> T,
    {
        let node = self.node(core)?;
        // SAFETY: the node lives as long as `self` and is used by `core` only.
        unsafe { self.lock.acquire_with::<R>(node)? };
        let _held = Held::<R> { lock: &self.lock, node, _relax: core::marker::PhantomData };
        Ok(f())
    }

    /// Runs `f` while holding the lock on behalf of `core`, but only if the
    /// lock is free right now.
    ///
    /// # Safety
    ///
    /// Same as [`lock_then`](Self::lock_then).
    pub unsafe fn try_lock_then<F, T>(&self, core: CoreId, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        let node = self.node(core)?;
        // SAFETY: as in `lock_then_with`.
        unsafe { self.lock.try_acquire(node)? };
        let _held = Held::<Spin> { lock: &self.lock, node, _relax: core::marker::PhantomData };
        Ok(f())
    }

    fn node(&self, core: CoreId) -> Result<&McsNode, LockError> {
        self.nodes
            .get(usize::from(core.value()))
            .ok_or(LockError::NoSuchCore)
    }
}

/// Unlike [`CoreLock::new`], the default lock is already initialized.
impl<const CORES: usize> Default for CoreLock<CORES> {
    fn default() -> Self {
        Self::new_ready()
    }
}

struct Held<'a, R: Relax> {
    lock: &'a McsLock,
    node: &'a McsNode,
    _relax: core::marker::PhantomData<R>,
}

impl<R: Relax> Drop for Held<'_, R> {
    fn drop(&mut self) {
        // SAFETY: only constructed right after `node` acquired `lock`.
        let result = unsafe { self.lock.release_with::<R>(self.node) };
        debug_assert!(result.is_ok(), "a ready MCS lock became unready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use mcs::relax::Yield;
    use std::{format, thread, vec::Vec};

    #[test]
    fn test_core_id_display() {
        assert_eq!(format!("{}", CoreId::new(3)), "core 3");
        assert_eq!(CoreId::from(5u8).value(), 5);
    }

    #[test]
    fn test_not_ready_and_out_of_range() {
        let lock: CoreLock<2> = CoreLock::new();
        // SAFETY: this thread is the only user of every core id here.
        unsafe {
            assert_eq!(lock.lock_then(CoreId::new(0), || ()), Err(LockError::NotReady));
            lock.init();
            assert_eq!(lock.lock_then(CoreId::new(2), || ()), Err(LockError::NoSuchCore));
            assert_eq!(lock.lock_then(CoreId::new(1), || 11), Ok(11));
        }
        assert_eq!(lock.cores(), 2);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_default_is_ready_unlike_new() {
        assert!(!CoreLock::<2>::new().is_ready());
        let lock = CoreLock::<2>::default();
        assert!(lock.is_ready());
        // SAFETY: this thread is the only user of core 0.
        assert_eq!(unsafe { lock.lock_then(CoreId::new(0), || 4) }, Ok(4));
    }

    #[test]
    fn test_try_lock_from_other_core() {
        let lock: CoreLock<2> = CoreLock::new_ready();
        // SAFETY: core 0 and core 1 are distinct nodes, and neither is reused.
        let inner = unsafe {
            lock.lock_then(CoreId::new(0), || lock.try_lock_then(CoreId::new(1), || ()))
        };
        assert_eq!(inner, Ok(Err(LockError::WouldBlock)));
    }

    #[test]
    fn test_cores_exclude_each_other() {
        const CORES: usize = 4;
        const ITERATIONS: usize = 1_000;

        static LOCK: CoreLock<CORES> = CoreLock::new();
        static INSIDE: AtomicUsize = AtomicUsize::new(0);
        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        LOCK.init();
        let threads: Vec<_> = (0..CORES as u8)
            .map(|core| {
                thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        // SAFETY: each thread plays exactly one distinct core.
                        unsafe {
                            LOCK.lock_then_with::<Yield, _, _>(CoreId::new(core), || {
                                assert_eq!(INSIDE.fetch_add(1, Ordering::Relaxed), 0);
                                let value = COUNTER.load(Ordering::Relaxed);
                                COUNTER.store(value + 1, Ordering::Relaxed);
                                INSIDE.fetch_sub(1, Ordering::Relaxed);
                            })
                        }
                        .unwrap();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(COUNTER.load(Ordering::Relaxed), CORES * ITERATIONS);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "still queued")]
    fn test_reentry_panics_in_debug() {
        let lock: CoreLock<1> = CoreLock::new_ready();
        let core = CoreId::new(0);
        // SAFETY: deliberately violated; debug builds catch the re-entry.
        let _ = unsafe { lock.lock_then(core, || lock.lock_then(core, || ())) };
    }
}
