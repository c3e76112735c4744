//! Tunables for the lock algorithm and its wrappers.

/// Number of independent locks a `LockRegistry` tracks by default.
/// A capacity of 1 gives the single-global-lock behaviour.
pub const LOCK_REGISTRY_CAPACITY: usize = 4;

/// A `Hooked` relax strategy calls its yield hook once every this many spins.
pub const RELAX_HOOK_INTERVAL: u32 = 64;

/// `SpinBackoff` doubles its spin count up to `1 << BACKOFF_MAX_SHIFT`.
pub const BACKOFF_MAX_SHIFT: u32 = 6;
