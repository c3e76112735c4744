use derive_more::Display;

/// The ways in which an MCS lock operation can decline to do anything.
///
/// None of these leave the lock in a changed state: an operation that
/// returns an error was a no-op.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum LockError {
    /// The lock has not been initialized yet.
    #[display(fmt = "MCS lock used before it was initialized")]
    NotReady,
    /// A non-blocking acquisition found the lock held or contended.
    #[display(fmt = "MCS lock is already held")]
    WouldBlock,
    /// A [`LockRegistry`](crate::LockRegistry) has no free slot left.
    #[display(fmt = "MCS lock registry has no free slots")]
    RegistryFull,
    /// A shared-memory object was requested at address zero.
    #[display(fmt = "null address given for a shared MCS object")]
    NullAddress,
    /// A shared-memory object was requested at an address that is not
    /// suitably aligned for it.
    #[display(fmt = "misaligned address given for a shared MCS object")]
    Misaligned,
    /// A per-core lock was asked to use a core it has no node for.
    #[display(fmt = "core id is out of range for this MCS lock")]
    NoSuchCore,
}

impl LockError {
    /// Returns a static description, for callers that report `&'static str` errors.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotReady => "MCS lock used before it was initialized",
            Self::WouldBlock => "MCS lock is already held",
            Self::RegistryFull => "MCS lock registry has no free slots",
            Self::NullAddress => "null address given for a shared MCS object",
            Self::Misaligned => "misaligned address given for a shared MCS object",
            Self::NoSuchCore => "core id is out of range for this MCS lock",
        }
    }
}

impl From<LockError> for &'static str {
    fn from(err: LockError) -> Self {
        err.as_str()
    }
}
