use core::{
    ptr,
    sync::atomic::{AtomicPtr, AtomicU8, Ordering},
};

use log::debug;

use crate::{
    node::McsNode,
    relax::{Relax, Spin},
    LockError,
};

/// The state of a lock that is ready for use.
///
/// Every other value means "not initialized". Zeroed memory, a byte left
/// behind by a core that reset in the middle of [`McsLock::init`], and a
/// C-style `is_ready = 1` flag all read as not ready, and `init` accepts
/// each of them.
const READY: u8 = 0xA5;
/// The state a freshly constructed, uninitialized lock starts in.
const UNINIT: u8 = 0;

/// Picks the state an initializer moves the lock to from `observed`.
///
/// Every claim differs from the state it replaces, so an initializer that
/// was overtaken by a later one can tell from the state alone.
const fn next_claim(observed: u8) -> u8 {
    let claim = observed.wrapping_add(1);
    if claim == READY {
        claim.wrapping_add(1)
    } else {
        claim
    }
}

/// An MCS queue spinlock.
///
/// The lock holds no data of its own; it only orders its users. For a lock
/// that owns the data it protects, see `sync_mcs::Mutex`.
///
/// A lock created with [`new`](Self::new) (or found in zeroed memory) must be
/// [`init`](Self::init)ialized before use. Until then, every acquire and
/// release is a no-op that returns [`LockError::NotReady`].
#[derive(Debug)]
#[repr(C)]
pub struct McsLock {
    /// The most recently enqueued node, or null if nobody holds the lock.
    pub(crate) tail: AtomicPtr<McsNode>,
    pub(crate) state: AtomicU8,
}

impl McsLock {
    /// Creates a lock that has not been initialized yet, exactly as if it
    /// were found in zero-filled memory.
    pub const fn new() -> Self {
        Self {
            tail: AtomicPtr::new(ptr::null_mut()),
            state: AtomicU8::new(UNINIT),
        }
    }

    /// Creates a lock that is ready for use.
    pub const fn new_ready() -> Self {
        Self {
            tail: AtomicPtr::new(ptr::null_mut()),
            state: AtomicU8::new(READY),
        }
    }

    /// Initializes this lock, leaving it free.
    ///
    /// Any state other than ready is treated as uninitialized, including one
    /// left behind by a core that reset while initializing this lock. Once the
    /// lock is ready, further calls do nothing, so a held lock is never reset.
    ///
    /// When several cores call this at the same time, the last one to claim
    /// the lock resets it and the others wait until it is ready.
    pub fn init(&self) {
        let mut observed = self.state.load(Ordering::Acquire);
        let claim = loop {
            if observed == READY {
                debug!("MCS lock at {:p} is already initialized", self);
                return;
            }
            let claim = next_claim(observed);
            match self.state.compare_exchange_weak(
                observed,
                claim,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => break claim,
                Err(now) => observed = now,
            }
        };

        // The tail is only reset while this claim is still the latest one, and
        // only if nobody has changed it since, so a late reset cannot clobber
        // a lock that a later initializer has already published.
        let stale = self.tail.load(Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) == claim {
            let _ = self.tail.compare_exchange(
                stale,
                ptr::null_mut(),
                Ordering::SeqCst,
                Ordering::Relaxed,
            );
            // Nobody may observe READY before the tail reset is visible.
            if self
                .state
                .compare_exchange(claim, READY, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }

        // A later initializer took over and will publish the lock.
        while !self.is_ready() {
            core::hint::spin_loop();
        }
    }

    /// Returns whether [`init`](Self::init) has completed.
    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == READY
    }

    /// Returns whether any core holds or waits for this lock.
    ///
    /// The answer may be stale by the time it is used; this is only
    /// meant for diagnostics.
    pub fn is_locked(&self) -> bool {
        !self.tail.load(Ordering::Relaxed).is_null()
    }

    #[cfg(test)]
    pub(crate) fn tail_ptr(&self) -> *mut McsNode {
        self.tail.load(Ordering::SeqCst)
    }

    /// Acquires the lock, spinning with [`Spin`] until it is granted.
    ///
    /// See [`acquire_with`](Self::acquire_with).
    ///
    /// # Safety
    ///
    /// Same as [`acquire_with`](Self::acquire_with).
    #[inline]
    pub unsafe fn acquire(&self, node: &McsNode) -> Result<(), LockError> {
        // SAFETY: forwarded to the caller.
        unsafe { self.acquire_with::<Spin>(node) }
    }

    /// Acquires the lock, using `node` as this caller's queue entry and
    /// waiting with the relax strategy `R`.
    ///
    /// Returns immediately if the lock is free. Otherwise the caller joins
    /// the end of the queue and spins on `node` alone until its predecessor
    /// hands the lock over. Callers are served in the order in which they
    /// joined the queue.
    ///
    /// Returns [`LockError::NotReady`] without touching `node` if the lock
    /// has not been initialized.
    ///
    /// # Safety
    ///
    /// * `node` must not be in use by any other acquisition, on any lock.
    /// * `node` must not move or be freed until [`release_with`](Self::release_with)
    ///   has been called on this lock with the same `node` and has returned.
    /// * The lock must be released exactly once per successful acquisition.
    pub unsafe fn acquire_with<R: Relax>(&self, node: &McsNode) -> Result<(), LockError> {
        if !self.is_ready() {
            return Err(LockError::NotReady);
        }

        node.prepare();
        let node_ptr = node.as_ptr();

        let prev = self.tail.swap(node_ptr, Ordering::AcqRel);
        // SAFETY: the predecessor cannot finish its release until it sees
        // this link, so its node is still alive.
        match unsafe { prev.as_ref() } {
            None => {
                // Uncontended: nobody will ever clear this flag for us.
                node.locked.store(false, Ordering::Relaxed);
            }
            Some(prev) => {
                prev.next.store(node_ptr, Ordering::Release);
                node.wait_until_granted::<R>();
            }
        }
        Ok(())
    }

    /// Acquires the lock only if nobody holds or waits for it.
    ///
    /// This never joins the queue, so a failed attempt leaves nothing behind.
    /// Returns [`LockError::WouldBlock`] if the lock is taken.
    ///
    /// # Safety
    ///
    /// Same as [`acquire_with`](Self::acquire_with), for the case where this
    /// returns `Ok`.
    pub unsafe fn try_acquire(&self, node: &McsNode) -> Result<(), LockError> {
        if !self.is_ready() {
            return Err(LockError::NotReady);
        }

        node.claim();
        node.next.store(ptr::null_mut(), Ordering::Relaxed);
        node.locked.store(false, Ordering::Relaxed);

        match self.tail.compare_exchange(
            ptr::null_mut(),
            node.as_ptr(),
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => Ok(()),
            Err(_) => {
                node.unclaim();
                Err(LockError::WouldBlock)
            }
        }
    }

    /// Releases the lock, spinning with [`Spin`] if a successor is still linking itself.
    ///
    /// # Safety
    ///
    /// Same as [`release_with`](Self::release_with).
    #[inline]
    pub unsafe fn release(&self, node: &McsNode) -> Result<(), LockError> {
        // SAFETY: forwarded to the caller.
        unsafe { self.release_with::<Spin>(node) }
    }

    /// Releases the lock held through `node`, handing it to the next waiter
    /// if there is one.
    ///
    /// If a waiter has already joined the queue but not yet linked itself
    /// behind `node`, this waits (with relax strategy `R`) for that link
    /// before handing over.
    ///
    /// # Safety
    ///
    /// The caller must currently hold this lock through `node`, i.e. this
    /// must pair with the most recent successful acquisition that used `node`.
    /// Debug builds panic on a release without a matching acquisition.
    pub unsafe fn release_with<R: Relax>(&self, node: &McsNode) -> Result<(), LockError> {
        if !self.is_ready() {
            return Err(LockError::NotReady);
        }
        node.unclaim();

        let node_ptr = node.as_ptr();
        let mut next = node.next.load(Ordering::Acquire);
        if next.is_null() {
            if self
                .tail
                .compare_exchange(node_ptr, ptr::null_mut(), Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return Ok(());
            }
            // A new waiter swapped itself into the tail after us but has
            // not stored its link yet.
            next = node.wait_for_successor::<R>();
        }

        // SAFETY: the successor spins on its own node until this store, so
        // that node is alive. It must not be touched afterwards.
        unsafe { &*next }.locked.store(false, Ordering::Release);
        Ok(())
    }

    /// Runs `f` while holding the lock, using `node` as the queue entry.
    ///
    /// The lock is released when `f` returns or unwinds.
    pub fn lock_then<F, T>(&self, node: &mut McsNode, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        self.lock_then_with::<Spin, F, T>(node, f)
    }

    /// Like [`lock_then`](Self::lock_then), waiting with relax strategy `R`.
    pub fn lock_then_with<R, F, T>(&self, node: &mut McsNode, f: F) -> Result<T, LockError>
    where
        R: Relax,
        F: FnOnce() -> T,
    {
        // SAFETY: `node` is exclusively borrowed for the whole critical
        // section and the release below cannot be skipped.
        unsafe { self.acquire_with::<R>(node)? };
        let _release = Release::<R> { lock: self, node, _relax: core::marker::PhantomData };
        Ok(f())
    }

    /// Runs `f` while holding the lock, if the lock is free right now.
    pub fn try_lock_then<F, T>(&self, node: &mut McsNode, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        // SAFETY: as in `lock_then_with`.
        unsafe { self.try_acquire(node)? };
        let _release = Release::<Spin> { lock: self, node, _relax: core::marker::PhantomData };
        Ok(f())
    }

    /// Runs `f` while holding the lock, with a queue node on this stack frame.
    pub fn with_lock<F, T>(&self, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> T,
    {
        let mut node = McsNode::new();
        self.lock_then(&mut node, f)
    }
}

/// Unlike [`McsLock::new`], the default lock is already initialized, so a
/// lock embedded in a `Default` struct can be used right away.
impl Default for McsLock {
    fn default() -> Self {
        Self::new_ready()
    }
}

/// Releases a lock acquired by one of the closure-based methods, including
/// when the critical section unwinds.
struct Release<'a, R: Relax> {
    lock: &'a McsLock,
    node: &'a McsNode,
    _relax: core::marker::PhantomData<R>,
}

impl<R: Relax> Drop for Release<'_, R> {
    fn drop(&mut self) {
        // SAFETY: only constructed right after a successful acquisition
        // through `node`.
        let result = unsafe { self.lock.release_with::<R>(self.node) };
        debug_assert!(result.is_ok(), "a ready MCS lock became unready");
    }
}
