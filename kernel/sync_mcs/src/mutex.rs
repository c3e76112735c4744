use core::{cell::UnsafeCell, fmt, marker::PhantomData};

use mcs::{
    relax::{Relax, Spin},
    LockError, McsLock, McsNode,
};

/// A mutual exclusion primitive that grants access in FIFO order.
///
/// The data can only be reached inside a closure passed to one of the
/// `*lock*_then` methods; the lock is released when the closure returns
/// or unwinds.
pub struct Mutex<T, R = Spin>
where
    T: ?Sized,
{
    lock: McsLock,
    _relax: PhantomData<fn() -> R>,
    data: UnsafeCell<T>,
}

// Same unsafe impls as `std::sync::Mutex`.
unsafe impl<T: ?Sized + Send, R> Sync for Mutex<T, R> {}
unsafe impl<T: ?Sized + Send, R> Send for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    /// Creates a new, unlocked mutex.
    pub const fn new(value: T) -> Self {
        Self {
            lock: McsLock::new_ready(),
            _relax: PhantomData,
            data: UnsafeCell::new(value),
        }
    }

    /// Consumes this mutex, returning the underlying data.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T, R> Mutex<T, R>
where
    T: ?Sized,
    R: Relax,
{
    /// Runs `f` on the protected data, waiting for the lock if needed.
    pub fn lock_then<F, U>(&self, f: F) -> U
    where
        F: FnOnce(&mut T) -> U,
    {
        let mut node = McsNode::new();
        self.lock_with_then(&mut node, f)
    }

    /// Runs `f` on the protected data, using `node` as this caller's queue
    /// entry instead of one on the stack.
    pub fn lock_with_then<F, U>(&self, node: &mut McsNode, f: F) -> U
    where
        F: FnOnce(&mut T) -> U,
    {
        // SAFETY: the lock is held for the duration of the closure.
        let result = self
            .lock
            .lock_then_with::<R, _, _>(node, || f(unsafe { &mut *self.data.get() }));
        match result {
            Ok(value) => value,
            Err(err) => unreachable!("mutex lock failed: {}", err),
        }
    }

    /// Runs `f` on the protected data if nobody holds or waits for the lock.
    pub fn try_lock_then<F, U>(&self, f: F) -> Option<U>
    where
        F: FnOnce(&mut T) -> U,
    {
        let mut node = McsNode::new();
        // SAFETY: the lock is held for the duration of the closure.
        match self
            .lock
            .try_lock_then(&mut node, || f(unsafe { &mut *self.data.get() }))
        {
            Ok(value) => Some(value),
            Err(LockError::WouldBlock) => None,
            Err(err) => unreachable!("mutex lock failed: {}", err),
        }
    }

    /// Returns a mutable reference to the underlying data.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Checks whether the mutex is currently held or contended.
    pub fn is_locked(&self) -> bool {
        self.lock.is_locked()
    }
}

impl<T: Default, R> Default for Mutex<T, R> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, R> From<T> for Mutex<T, R> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T, R> fmt::Debug for Mutex<T, R>
where
    T: ?Sized + fmt::Debug,
    R: Relax,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Mutex");
        let locked = self
            .try_lock_then(|data| {
                d.field("data", &&*data);
            })
            .is_none();
        if locked {
            struct LockedPlaceholder;
            impl fmt::Debug for LockedPlaceholder {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("<locked>")
                }
            }
            d.field("data", &LockedPlaceholder);
        }
        d.finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use mcs::relax::{self, Yield};
    use std::{format, sync::Arc, thread, vec::Vec};

    #[test]
    fn test_lock_then_and_into_inner() {
        let mutex: Mutex<Vec<u32>> = Mutex::new(Vec::new());
        mutex.lock_then(|v| v.push(1));
        mutex.lock_then(|v| v.push(2));
        assert!(!mutex.is_locked());
        assert_eq!(mutex.into_inner(), [1, 2]);
    }

    #[test]
    fn test_try_lock_while_held() {
        let mutex: Mutex<u32> = Mutex::new(5);
        let inner = mutex.lock_then(|value| {
            *value += 1;
            mutex.try_lock_then(|_| ())
        });
        assert_eq!(inner, None);
        assert_eq!(mutex.try_lock_then(|value| *value), Some(6));
    }

    #[test]
    fn test_debug_shows_locked_placeholder() {
        let mutex: Mutex<u32> = Mutex::new(9);
        assert_eq!(format!("{:?}", mutex), "Mutex { data: 9, .. }");
        mutex.lock_then(|_| {
            assert_eq!(format!("{:?}", mutex), "Mutex { data: <locked>, .. }");
        });
    }

    #[test]
    fn test_caller_supplied_node() {
        static NODE_OWNER: Mutex<u64> = Mutex::new(0);
        let mut node = McsNode::new();
        for _ in 0..10 {
            NODE_OWNER.lock_with_then(&mut node, |value| *value += 1);
        }
        assert_eq!(NODE_OWNER.lock_then(|value| *value), 10);
    }

    fn count_under_contention<R: Relax + 'static>(num_threads: usize, iterations: u64) {
        let mutex: Arc<Mutex<u64, R>> = Arc::new(Mutex::new(0));
        let threads: Vec<_> = (0..num_threads)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..iterations {
                        mutex.lock_then(|value| *value += 1);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }
        assert!(!mutex.is_locked());
        assert_eq!(mutex.lock_then(|value| *value), num_threads as u64 * iterations);
    }

    #[test]
    fn test_contended_counter() {
        count_under_contention::<Yield>(8, 1_000);
    }

    #[test]
    fn test_backoff_mutex_contended() {
        let mutex: crate::BackoffMutex<u32> = Mutex::new(0);
        mutex.lock_then(|value| *value += 1);
        assert_eq!(mutex.into_inner(), 1);

        count_under_contention::<relax::SpinBackoff>(3, 500);
    }

    #[test]
    fn test_hooked_mutex_contended() {
        static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

        struct Scheduler;
        impl relax::YieldHook for Scheduler {
            const INTERVAL: u32 = 4;
            fn yield_now() {
                HOOK_CALLS.fetch_add(1, Ordering::Relaxed);
                thread::yield_now();
            }
        }

        count_under_contention::<relax::Hooked<Scheduler>>(4, 1_000);

        // Hold the lock until a waiter has been through the hook at least once.
        let mutex: Arc<crate::HookedMutex<u32, Scheduler>> = Arc::new(Mutex::new(0));
        let before = HOOK_CALLS.load(Ordering::Relaxed);
        let c_mutex = Arc::clone(&mutex);
        let waiter = mutex.lock_then(|_| {
            let waiter = thread::spawn(move || c_mutex.lock_then(|value| *value += 1));
            while HOOK_CALLS.load(Ordering::Relaxed) == before {
                thread::yield_now();
            }
            waiter
        });
        waiter.join().unwrap();
        assert_eq!(mutex.lock_then(|value| *value), 1);
    }

    #[test]
    fn test_poison_free_after_panic() {
        let mutex: Arc<Mutex<u32, Yield>> = Arc::new(Mutex::new(1));
        let c_mutex = Arc::clone(&mutex);
        let result = thread::spawn(move || {
            c_mutex.lock_then(|value| {
                *value = 2;
                panic!("critical section failed");
            })
        })
        .join();
        assert!(result.is_err());
        assert!(!mutex.is_locked());
        assert_eq!(mutex.lock_then(|value| *value), 2);
    }
}
