//! A Mellor-Crummey & Scott (MCS) queue spinlock for mutual exclusion across
//! CPU cores, including cores running separate images over shared memory (AMP).
//!
//! Every waiter brings its own [`McsNode`] and spins only on that node, so
//! contention never bounces a shared cache line between cores. The lock itself
//! is a single atomic tail pointer plus a readiness flag. Waiters are granted
//! the lock in the exact order in which they swapped themselves into the tail.
//!
//! There are two ways to use a lock:
//! * the closure API ([`McsLock::lock_then`], [`McsLock::with_lock`]), which
//!   guarantees that the node stays pinned and the lock is released, and
//! * the raw API ([`McsLock::acquire`] / [`McsLock::release`]), for callers
//!   such as firmware that must split the two halves across function
//!   boundaries and can uphold the node-lifetime contract themselves.
//!
//! How a waiter passes time while spinning is chosen by a [`Relax`] strategy;
//! see the [`relax`] module for the provided strategies and for hooking an
//! RTOS yield into the spin loops.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

mod error;
mod lock;
mod node;
pub mod registry;
pub mod relax;
pub mod shared;


pub use error::LockError;
pub use lock::McsLock;
pub use node::McsNode;
pub use registry::LockRegistry;
pub use relax::Relax;
