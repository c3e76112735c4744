//! Strategies for what a waiter does on each iteration of a spin loop.
//!
//! The lock algorithm never changes with the strategy; only the busy-wait
//! body does. A fresh strategy value is created for every spin loop, so
//! strategies may keep per-wait state such as a backoff step.
//!
//! To let an RTOS run other work while a core waits, implement [`YieldHook`]
//! for a zero-sized type that calls the scheduler, and spin with
//! [`Hooked<ThatType>`](Hooked).

use core::{hint, marker::PhantomData};

use lock_config::{BACKOFF_MAX_SHIFT, RELAX_HOOK_INTERVAL};

/// The body of a busy-wait loop.
pub trait Relax {
    /// Creates the state for one spin loop.
    fn new() -> Self;

    /// Called once per failed check of the awaited condition.
    fn relax(&mut self);
}

/// Signals the processor that it is in a spin loop. The default.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Spin {}

impl Relax for Spin {
    #[inline(always)]
    fn new() -> Self {
        Self {}
    }

    #[inline(always)]
    fn relax(&mut self) {
        hint::spin_loop();
    }
}

/// Re-checks the condition immediately, without any spin-loop hint.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Loop {}

impl Relax for Loop {
    #[inline(always)]
    fn new() -> Self {
        Self {}
    }

    #[inline(always)]
    fn relax(&mut self) {}
}

/// Spins with exponential backoff, doubling the number of spin-loop hints
/// on every call up to `1 << BACKOFF_MAX_SHIFT`.
#[derive(Clone, Debug, Default)]
pub struct SpinBackoff {
    step: u32,
}

impl Relax for SpinBackoff {
    #[inline]
    fn new() -> Self {
        Self { step: 0 }
    }

    #[inline]
    fn relax(&mut self) {
        for _ in 0..(1u32 << self.step) {
            hint::spin_loop();
        }
        if self.step < BACKOFF_MAX_SHIFT {
            self.step += 1;
        }
    }
}

/// Gives up the rest of the time slice to the host OS scheduler.
#[cfg(any(test, feature = "std"))]
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Yield {}

#[cfg(any(test, feature = "std"))]
impl Relax for Yield {
    #[inline]
    fn new() -> Self {
        Self {}
    }

    #[inline]
    fn relax(&mut self) {
        std::thread::yield_now();
    }
}

/// A scheduler hook invoked periodically by [`Hooked`] while spinning.
pub trait YieldHook {
    /// Number of spins between two calls to [`yield_now`](Self::yield_now).
    const INTERVAL: u32 = RELAX_HOOK_INTERVAL;

    /// Lets other work on this core run, e.g. by calling the RTOS yield.
    fn yield_now();
}

/// Spins, and calls `H::yield_now()` once every `H::INTERVAL` spins.
#[derive(Debug)]
pub struct Hooked<H> {
    spins: u32,
    _hook: PhantomData<fn() -> H>,
}

impl<H: YieldHook> Relax for Hooked<H> {
    #[inline]
    fn new() -> Self {
        Self { spins: 0, _hook: PhantomData }
    }

    #[inline]
    fn relax(&mut self) {
        self.spins += 1;
        if self.spins >= H::INTERVAL {
            self.spins = 0;
            H::yield_now();
        } else {
            hint::spin_loop();
        }
    }
}
