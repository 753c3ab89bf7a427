//! Host-side `Hal` test double (test-only).
//!
//! Keeping the hardware boundary behind one small trait means the core can
//! run on the host: this is the trivial implementation of `hal::Hal` that
//! lets `cargo test` exercise
//! the scheduler/fork/exit/wait/sleep/sem logic without real page tables,
//! a real trap path, or real interrupts. Every method either no-ops or
//! hands out a fresh opaque handle; none of it is meant to resemble real
//! memory management.
//!
//! `cpuid()` assigns each calling OS thread a stable slot via a
//! thread-local counter, so tests that spawn real `std::thread`s to play
//! the role of separate processes get distinct per-CPU state instead of
//! racing on slot 0.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::KResult;
use crate::hal::{AddrSpace, Context, Hal, Trapframe};
use crate::param::NCPU;

pub struct TestHal {
    now: AtomicU64,
    next_handle: AtomicUsize,
}

thread_local! {
    static CPU_SLOT: Cell<Option<usize>> = Cell::new(None);
}

static NEXT_CPU_SLOT: AtomicUsize = AtomicUsize::new(0);

impl TestHal {
    fn new() -> Self {
        TestHal {
            now: AtomicU64::new(0),
            next_handle: AtomicUsize::new(1),
        }
    }

    /// A process-wide singleton, since `hal::init` takes a `'static` ref
    /// and every test needs one installed before touching a `Spinlock`.
    pub fn shared() -> &'static dyn Hal {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<TestHal> = OnceLock::new();
        INSTANCE.get_or_init(TestHal::new)
    }

    fn fresh_handle(&self) -> usize {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}

impl Hal for TestHal {
    fn cpuid(&self) -> usize {
        CPU_SLOT.with(|slot| {
            if let Some(v) = slot.get() {
                v
            } else {
                let v = NEXT_CPU_SLOT.fetch_add(1, Ordering::Relaxed) % NCPU;
                slot.set(Some(v));
                v
            }
        })
    }

    fn intr_get(&self) -> bool {
        false
    }

    fn intr_on(&self) {}

    fn intr_off(&self) {}

    fn now(&self) -> u64 {
        self.now.fetch_add(1, Ordering::Relaxed)
    }

    fn free_pages(&self) -> usize {
        0
    }

    /// Not a real stack switch: the calling thread simply continues. Tests
    /// that need genuine blocking behavior observe it through process
    /// state (`Sleeping` + a matching `chan`) rather than actual
    /// suspension of the OS thread.
    fn switch(&self, _from: &mut Context, _to: &Context) {}

    fn create_address_space(&self) -> KResult<AddrSpace> {
        Ok(self.fresh_handle())
    }

    fn destroy_address_space(&self, _pt: AddrSpace, _size: usize) {}

    fn grow(&self, _pt: AddrSpace, _old_sz: usize, new_sz: usize) -> KResult<usize> {
        Ok(new_sz)
    }

    fn shrink(&self, _pt: AddrSpace, _old_sz: usize, new_sz: usize) -> usize {
        new_sz
    }

    fn copy_full(&self, _src: AddrSpace, _dst: AddrSpace, _size: usize) -> KResult<()> {
        Ok(())
    }

    fn copy_private_page(&self, _src: AddrSpace, _dst: AddrSpace, _addr: usize) -> KResult<()> {
        Ok(())
    }

    fn copy_shared_page(&self, _src: AddrSpace, _dst: AddrSpace, _addr: usize) -> KResult<()> {
        Ok(())
    }

    fn page_present(&self, _pt: AddrSpace, _addr: usize) -> bool {
        false
    }

    fn unmap_region(&self, _pt: AddrSpace, _addr: usize, _len: usize, _dofree: bool) {}

    fn alloc_trapframe(&self) -> KResult<Trapframe> {
        Ok(self.fresh_handle())
    }

    fn free_trapframe(&self, _tf: Trapframe) {}

    fn copy_trapframe(&self, _src: Trapframe, _dst: Trapframe) {}

    fn set_return_value(&self, _tf: Trapframe, _value: i64) {}

    fn set_entry(&self, _tf: Trapframe, _pc: usize, _sp: usize) {}
}
