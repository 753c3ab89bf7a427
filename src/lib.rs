//! Process-management core of a multiprocessor teaching kernel: process
//! table and lifecycle, MLFQ/RR scheduling, sleep/wakeup, counting
//! semaphores, and mapped memory regions with copy-on-fork/shared-family
//! semantics.
//!
//! Real hardware (page tables, trap entry/exit, the physical allocator,
//! the clock) sits behind the [`hal::Hal`] trait (see that module). This
//! crate is `no_std` outside of test builds, so a bare-metal platform can
//! link it against a real `Hal` implementation; under `cargo test` it
//! runs on the host against [`sim::TestHal`].

#![cfg_attr(not(any(test, feature = "sim")), no_std)]

pub mod cpu;
pub mod error;
pub mod hal;
pub mod mmr;
pub mod param;
pub mod proc;
pub mod queue;
pub mod sched;
pub mod sem;
pub mod sleep;
pub mod spinlock;
pub mod syscall;

/// `TestHal`, a host-only `Hal` double. Always built under `cargo test`
/// (the lib's own unit tests use it); the `sim` feature additionally
/// exposes it to external callers such as `tests/integration.rs`, which
/// link against the library as compiled (not under `--cfg test`).
#[cfg(any(test, feature = "sim"))]
pub mod sim;

use core::sync::atomic::AtomicIsize;

pub use param::KernelConfig;

use mmr::MmrFamilyTable;
use proc::ProcTable;
use queue::Queues;
use sem::SemTable;
use spinlock::Spinlock;

/// Every global table the process-management core needs, bundled as one
/// object rather than scattered statics. Passing `&Kernel` explicitly
/// rather than reaching for a singleton everywhere also means tests can
/// each build their own, fully isolated, instance.
pub struct Kernel {
    pub procs: ProcTable,
    pub queues: Queues,
    pub mmr_families: MmrFamilyTable,
    pub sems: SemTable,
    /// Orders before any single process's slot lock: `wait_lock` →
    /// `p->lock` → queue/family/sem locks.
    pub wait_lock: Spinlock<()>,
    pub config: KernelConfig,
    /// Slot index of the init process, or -1 before `proc::userinit` runs.
    pub(crate) init_proc: AtomicIsize,
}

impl Kernel {
    pub fn new(config: KernelConfig) -> Self {
        Kernel {
            procs: ProcTable::new(),
            queues: Queues::new(),
            mmr_families: MmrFamilyTable::new(),
            sems: SemTable::new(),
            wait_lock: Spinlock::new("wait_lock", ()),
            config,
            init_proc: AtomicIsize::new(-1),
        }
    }
}

/// Boot entry point for a platform embedding this crate: install the
/// `Hal`, build the kernel object, create the init process, and hand off
/// to this cpu's scheduler loop. Never returns.
///
/// # Safety
/// Must be called exactly once, at boot, before any other cpu has started
/// running kernel code.
pub unsafe fn boot(hal: &'static dyn hal::Hal, config: KernelConfig) -> ! {
    hal::init(hal);
    let kernel = Kernel::new(config);
    proc::userinit(&kernel);
    sched::scheduler(&kernel)
}

