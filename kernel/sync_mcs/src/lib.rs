//! Higher level locks built on the [`mcs`] queue spinlock.
//!
//! * [`Mutex`] owns the data it protects, in the manner of `std::sync::Mutex`,
//!   but is entered through closures so that the queue node can never be
//!   leaked while it is still linked into the lock.
//! * [`CoreLock`] carries one queue node per CPU core, for code that only
//!   knows which core it is running on, such as a logger shared by all cores.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

mod core_lock;
mod mutex;

pub use core_lock::{CoreId, CoreLock, DefaultCoreLock};
pub use mcs::{relax, LockError, McsLock, McsNode};
pub use mutex::Mutex;

/// A [`Mutex`] whose waiters back off exponentially while spinning.
pub type BackoffMutex<T> = Mutex<T, relax::SpinBackoff>;

/// A [`Mutex`] whose waiters call `H::yield_now()` periodically while spinning.
pub type HookedMutex<T, H> = Mutex<T, relax::Hooked<H>>;
