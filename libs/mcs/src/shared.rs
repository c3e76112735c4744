//! Placing locks and nodes in memory shared between core images.
//!
//! In an AMP system every core runs its own image, so a cross-core lock
//! cannot be an ordinary static of one image. Instead the images agree on a
//! region of shared memory and each of them views the lock (and each core's
//! node) at a fixed address in it. Zero-filled memory holds an uninitialized
//! lock and idle nodes, and `init` also recovers a lock left over from an
//! earlier boot. Exactly one image should call [`McsLock::init`]
//! before the others start locking, though extra `init` calls are harmless.
//!
//! All images must be built with the same `debug_assertions` setting, since
//! debug builds carry an extra bookkeeping flag in every [`McsNode`].

use core::mem;

use crate::{LockError, McsLock, McsNode};

/// Bytes to reserve for one [`McsLock`] in a shared region.
pub const SHARED_LOCK_SIZE: usize = mem::size_of::<McsLock>();
/// Bytes to reserve for one [`McsNode`] in a shared region.
pub const SHARED_NODE_SIZE: usize = mem::size_of::<McsNode>();

/// Views the lock that lives at `addr`.
///
/// # Safety
///
/// `addr` must point to `SHARED_LOCK_SIZE` bytes that are mapped for the
/// rest of the program and are only ever accessed as this lock. Their
/// contents do not matter until [`McsLock::init`] is called: anything other
/// than a ready lock is reset by it.
pub unsafe fn lock_at(addr: usize) -> Result<&'static McsLock, LockError> {
    let lock = checked_ptr::<McsLock>(addr)?;
    // SAFETY: upheld by the caller; the pointer is non-null and aligned.
    Ok(unsafe { &*lock })
}

/// Views the node that lives at `addr`.
///
/// # Safety
///
/// Same as [`lock_at`], with `SHARED_NODE_SIZE` bytes. In addition, only one
/// core may use the node at a time.
pub unsafe fn node_at(addr: usize) -> Result<&'static McsNode, LockError> {
    let node = checked_ptr::<McsNode>(addr)?;
    // SAFETY: upheld by the caller; the pointer is non-null and aligned.
    Ok(unsafe { &*node })
}

fn checked_ptr<T>(addr: usize) -> Result<*const T, LockError> {
    if addr == 0 {
        return Err(LockError::NullAddress);
    }
    if addr % mem::align_of::<T>() != 0 {
        return Err(LockError::Misaligned);
    }
    Ok(addr as *const T)
}
