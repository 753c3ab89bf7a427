//! Hardware/platform boundary.
//!
//! Trap entry/exit, page-table walking, the physical page allocator and
//! virtual-memory primitives (`map_pages`, `unmap`, `copy`, `copy_shared`,
//! `free`, `walk_addr`) are treated as external collaborators with named
//! interfaces only. This module is that boundary, expressed as a single
//! trait a platform implements once, isolating the hardware surface
//! (page tables, trapframes, the physical allocator, the clock) behind one
//! `Hal` façade rather than scattering `cfg(target_arch)` through the core.
//!
//! Addresses and page-table handles are opaque `usize`s end to end; the
//! process-management core never dereferences one, only indexes by it.

use crate::error::KResult;

/// Saved callee-saved register set for a kernel context switch. The actual
/// register layout is an ABI detail of `swtch.S`/the trampoline, which is
/// out of scope here; this is an opaque bag a `Hal` implementation fills in.
#[derive(Copy, Clone, Default)]
pub struct Context {
    pub regs: [u64; 14],
}

bitflags::bitflags! {
    #[derive(Copy, Clone)]
    pub struct Perm: u8 {
        const R = 0b001;
        const W = 0b010;
        const X = 0b100;
    }
}

/// An opaque handle to a process's page table, as returned by
/// `Hal::create_address_space`. Never dereferenced by this crate.
pub type AddrSpace = usize;
/// An opaque handle to a process's trapframe page.
pub type Trapframe = usize;
/// An opaque open-file handle. The file table itself is out of scope
/// (filesystem Non-goal); `proc` only ever stores and copies these.
pub type FileHandle = usize;
/// An opaque inode handle, e.g. a process's `cwd`.
pub type InodeHandle = usize;

pub trait Hal: Sync {
    // -- per-CPU / interrupt control (component A) --
    fn cpuid(&self) -> usize;
    fn intr_get(&self) -> bool;
    fn intr_on(&self);
    fn intr_off(&self);

    // -- clock (explicitly out of scope as a real device; named interface only) --
    fn now(&self) -> u64;

    /// Free physical page count, for the diagnostic `freepmem` syscall.
    fn free_pages(&self) -> usize;

    // -- context switch (trap/trampoline boundary) --
    fn switch(&self, from: &mut Context, to: &Context);

    // -- address-space glue (component D) --
    fn create_address_space(&self) -> KResult<AddrSpace>;
    fn destroy_address_space(&self, pt: AddrSpace, size: usize);
    fn grow(&self, pt: AddrSpace, old_sz: usize, new_sz: usize) -> KResult<usize>;
    fn shrink(&self, pt: AddrSpace, old_sz: usize, new_sz: usize) -> usize;
    /// Copy the whole of `[0, size)` from `src` into a freshly-sized `dst`
    /// (xv6's `uvmcopy`, used by plain `fork`).
    fn copy_full(&self, src: AddrSpace, dst: AddrSpace, size: usize) -> KResult<()>;
    /// Copy one present page's content at `addr` from `src` into a newly
    /// allocated frame in `dst` (MAP_PRIVATE MMR fork).
    fn copy_private_page(&self, src: AddrSpace, dst: AddrSpace, addr: usize) -> KResult<()>;
    /// Map `dst` to the same backing frame `src` has at `addr`, bumping the
    /// frame's refcount (MAP_SHARED MMR fork; xv6's `uvmcopyshared`).
    fn copy_shared_page(&self, src: AddrSpace, dst: AddrSpace, addr: usize) -> KResult<()>;
    fn page_present(&self, pt: AddrSpace, addr: usize) -> bool;
    /// Unmap `[addr, addr+len)`, optionally freeing the backing frames
    /// (`dofree`, per `free_proc`'s MMR teardown rule).
    fn unmap_region(&self, pt: AddrSpace, addr: usize, len: usize, dofree: bool);

    // -- trapframe (trap boundary) --
    fn alloc_trapframe(&self) -> KResult<Trapframe>;
    fn free_trapframe(&self, tf: Trapframe);
    fn copy_trapframe(&self, src: Trapframe, dst: Trapframe);
    /// Set the trapframe's return-value register (xv6's `a0`) — used so a
    /// forked child observes a 0 return from `fork`.
    fn set_return_value(&self, tf: Trapframe, value: i64);
    /// Set the trapframe's entry pc/sp — used once, by `userinit`.
    fn set_entry(&self, tf: Trapframe, pc: usize, sp: usize);
}

static mut HAL: Option<&'static dyn Hal> = None;

/// Install the platform's `Hal`. Must be called exactly once, before any
/// other call into this crate (mirrors xv6's one-shot boot-time statics).
///
/// # Safety
/// Must not be called concurrently with any other use of the HAL, and must
/// not be called more than once.
pub unsafe fn init(hal: &'static dyn Hal) {
    HAL = Some(hal);
}

/// Fetch the installed `Hal`. Panics if `init` was never called — an
/// invariant violation, not a runtime condition.
pub fn hal() -> &'static dyn Hal {
    unsafe { HAL.expect("hal::init was never called") }
}
