use core::{
    ptr,
    sync::atomic::{AtomicBool, AtomicPtr, Ordering},
};

use crate::relax::Relax;

/// A queue entry for one waiter on an [`McsLock`](crate::McsLock).
///
/// Each core (or task) that wants the lock supplies its own node. While the
/// node's owner waits, it spins on `locked` and nothing else; its predecessor
/// clears that flag to hand the lock over.
///
/// A node must stay at the same address from the start of an acquisition
/// until the matching release has returned, since the predecessor and the
/// successor both write into it through raw pointers. Nodes are aligned to
/// a full cache line so that two waiters never share one.
///
/// The all-zero bit pattern is a valid idle node, so nodes may be placed in
/// zero-filled shared memory (see [`shared`](crate::shared)).
#[derive(Debug)]
#[repr(C, align(64))]
pub struct McsNode {
    /// The next waiter in FIFO order, or null if none has linked itself yet.
    pub(crate) next: AtomicPtr<McsNode>,
    /// True while this node's owner must keep waiting.
    pub(crate) locked: AtomicBool,
    /// Set from the start of an acquisition until its release, to catch
    /// contract violations in debug builds.
    #[cfg(debug_assertions)]
    in_use: AtomicBool,
}

const _: () = assert!(core::mem::align_of::<McsNode>() == lock_config::CACHE_LINE_SIZE);

impl McsNode {
    /// Creates an idle node.
    pub const fn new() -> Self {
        Self {
            next: AtomicPtr::new(ptr::null_mut()),
            locked: AtomicBool::new(false),
            #[cfg(debug_assertions)]
            in_use: AtomicBool::new(false),
        }
    }

    /// Returns whether this node's owner is currently queued behind another
    /// holder and still waiting to be granted the lock.
    pub fn is_waiting(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    /// Returns whether a successor has linked itself behind this node.
    pub fn has_successor(&self) -> bool {
        !self.next.load(Ordering::Relaxed).is_null()
    }

    pub(crate) fn as_ptr(&self) -> *mut McsNode {
        self as *const McsNode as *mut McsNode
    }

    /// Resets the node to the "must wait" state at the start of an acquisition.
    #[inline]
    pub(crate) fn prepare(&self) {
        self.claim();
        self.next.store(ptr::null_mut(), Ordering::Relaxed);
        self.locked.store(true, Ordering::Relaxed);
    }

    /// Spins until the predecessor hands the lock over.
    #[inline]
    pub(crate) fn wait_until_granted<R: Relax>(&self) {
        let mut relax = R::new();
        while self.locked.load(Ordering::Acquire) {
            relax.relax();
        }
    }

    /// Spins until the successor that already swapped itself into the tail
    /// has finished linking itself behind this node.
    #[inline]
    pub(crate) fn wait_for_successor<R: Relax>(&self) -> *mut McsNode {
        let mut relax = R::new();
        loop {
            let next = self.next.load(Ordering::Acquire);
            if !next.is_null() {
                return next;
            }
            relax.relax();
        }
    }

    #[cfg(debug_assertions)]
    #[inline]
    pub(crate) fn claim(&self) {
        let was_in_use = self.in_use.swap(true, Ordering::Relaxed);
        debug_assert!(
            !was_in_use,
            "MCS node reused while it is still queued on or holding a lock"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub(crate) fn claim(&self) {}

    #[cfg(debug_assertions)]
    #[inline]
    pub(crate) fn unclaim(&self) {
        let was_in_use = self.in_use.swap(false, Ordering::Relaxed);
        debug_assert!(
            was_in_use,
            "MCS node released without a matching acquisition"
        );
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub(crate) fn unclaim(&self) {}
}

impl Default for McsNode {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::McsNode;

    #[test]
    fn new_node_is_idle() {
        let node = McsNode::new();
        assert!(!node.is_waiting());
        assert!(!node.has_successor());
    }

    #[test]
    fn nodes_do_not_share_cache_lines() {
        let nodes = [McsNode::new(), McsNode::new()];
        let first = &nodes[0] as *const McsNode as usize;
        let second = &nodes[1] as *const McsNode as usize;
        assert!(second - first >= lock_config::CACHE_LINE_SIZE);
        assert_eq!(first % lock_config::CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn zeroed_memory_is_an_idle_node() {
        // SAFETY: every field is an atomic whose zero value is valid.
        let node: McsNode = unsafe { core::mem::zeroed() };
        assert!(!node.is_waiting());
        assert!(!node.has_successor());
    }

    #[test]
    fn prepare_enters_waiting_state() {
        let node = McsNode::new();
        node.prepare();
        assert!(node.is_waiting());
        assert!(!node.has_successor());
        node.unclaim();
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "still queued")]
    fn double_prepare_panics_in_debug() {
        let node = McsNode::new();
        node.prepare();
        node.prepare();
    }
}
