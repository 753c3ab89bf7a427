//! Error taxonomy for the process-management core.
//!
//! Resource exhaustion, invalid arguments and copy-in/out faults are
//! ordinary `Result` values; kernel invariant violations are not — those
//! `panic!` at the point of detection, since they indicate a bug rather
//! than a runtime condition a caller can recover from.

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum KError {
    /// No UNUSED process slot was available (`alloc_proc`).
    NoFreeSlot,
    /// The page allocator or address-space collaborator reported OOM.
    OutOfMemory,
    /// The MMR family registry has no free listid.
    NoFreeListid,
    /// The semaphore table has no free slot.
    NoFreeSem,
    /// A syscall argument failed validation (bad pointer, out-of-range value).
    BadArgument,
    /// `kill`/`wait` referenced a pid that doesn't exist (or isn't a child).
    BadPid,
    /// A semaphore/MMR handle didn't name a valid, currently-allocated slot.
    BadHandle,
    /// A user-space copy-in/copy-out failed partway through.
    Fault,
    /// The calling process was killed while blocked in a cooperative sleep:
    /// `killed` is observed at cooperative checks inside long-running
    /// kernel loops rather than via preemption.
    Interrupted,
}

pub type KResult<T> = Result<T, KError>;
