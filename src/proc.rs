//! Process table, allocation, and the fork/exit/wait family.
//!
//! Follows xv6's `allocproc`/`freeproc`/`fork`/`exit`/`wait`/`wait2`/`kill`/
//! `reparent`/`procinfo`; struct/field naming (`kstack`, `sz`, `pagetable`,
//! `trapframe`, `ofile`, `cwd`, `name`) follows the same convention.

use core::sync::atomic::Ordering;

use crate::error::{KError, KResult};
use crate::hal::{self, AddrSpace, FileHandle, InodeHandle, Trapframe};
use crate::mmr::{self, MmrFlags, MmrTable};
use crate::param::{NOFILE, NPROC, PGSIZE};
use crate::queue::Priority;
use crate::spinlock::{Spinlock, SpinlockGuard};
use crate::Kernel;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProcState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

/// A sleep/wakeup channel. Exit/wait rendezvous on the parent's own slot
/// index; other callers (semaphores, MMR teardown) mint their own channel
/// values from whatever address-like token they own.
pub type Chan = usize;

#[derive(Copy, Clone)]
pub struct ProcInner {
    pub state: ProcState,
    pub chan: Option<Chan>,
    pub killed: bool,
    pub xstate: i32,
    pub pid: u32,
    /// Guarded by the table's `wait_lock`, not this slot's own lock.
    pub parent: Option<usize>,
    pub sz: usize,
    pub pagetable: Option<AddrSpace>,
    pub trapframe: Option<Trapframe>,
    pub kstack: usize,
    pub context: hal::Context,
    pub ofile: [Option<FileHandle>; NOFILE],
    pub cwd: Option<InodeHandle>,
    pub name: [u8; 16],
    pub priority: Priority,
    pub tsticks: u32,
    pub cputime: u64,
    /// Owned exclusively by `queue`; no other code reads or writes it.
    pub(crate) next: Option<usize>,
    pub mmr: MmrTable,
}

impl ProcInner {
    const fn new() -> Self {
        ProcInner {
            state: ProcState::Unused,
            chan: None,
            killed: false,
            xstate: 0,
            pid: 0,
            parent: None,
            sz: 0,
            pagetable: None,
            trapframe: None,
            kstack: 0,
            context: hal::Context { regs: [0; 14] },
            ofile: [None; NOFILE],
            cwd: None,
            name: [0; 16],
            priority: Priority::High,
            tsticks: 0,
            cputime: 0,
            next: None,
            mmr: mmr::empty_mmr_table(),
        }
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; 16];
        let bytes = name.as_bytes();
        let n = bytes.len().min(self.name.len());
        self.name[..n].copy_from_slice(&bytes[..n]);
    }
}

pub struct ProcTable {
    slots: [Spinlock<ProcInner>; NPROC],
    next_pid: Spinlock<u32>,
}

impl ProcTable {
    pub fn new() -> Self {
        ProcTable {
            slots: core::array::from_fn(|_| Spinlock::new("proc", ProcInner::new())),
            next_pid: Spinlock::new("pid_lock", 1),
        }
    }

    pub fn lock_slot(&self, idx: usize) -> SpinlockGuard<'_, ProcInner> {
        self.slots[idx].lock()
    }

    pub fn try_lock_slot(&self, idx: usize) -> Option<SpinlockGuard<'_, ProcInner>> {
        self.slots[idx].try_lock()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn alloc_pid(&self) -> u32 {
        let mut n = self.next_pid.lock();
        let pid = *n;
        *n += 1;
        pid
    }

    /// Claim the first `Unused` slot, stamp it `Used` with a fresh pid, and
    /// wire up its trapframe and address space. Returns the slot locked, so
    /// the caller can finish initializing it atomically (xv6's `allocproc`).
    pub fn alloc_proc(&self) -> KResult<(usize, SpinlockGuard<'_, ProcInner>)> {
        for idx in 0..self.slots.len() {
            let mut g = self.slots[idx].lock();
            if g.state == ProcState::Unused {
                let pid = self.alloc_pid();
                let trapframe = hal::hal().alloc_trapframe()?;
                let pagetable = match hal::hal().create_address_space() {
                    Ok(pt) => pt,
                    Err(e) => {
                        hal::hal().free_trapframe(trapframe);
                        return Err(e);
                    }
                };
                *g = ProcInner::new();
                g.state = ProcState::Used;
                g.pid = pid;
                g.trapframe = Some(trapframe);
                g.pagetable = Some(pagetable);
                return Ok((idx, g));
            }
        }
        Err(KError::NoFreeSlot)
    }

    /// Release a slot's hardware-backed resources and return it to
    /// `Unused`. Caller must hold `guard` and must have already resolved
    /// any MMR family membership (see `teardown_mmrs`).
    pub fn free_proc(&self, guard: &mut SpinlockGuard<'_, ProcInner>) {
        if let Some(tf) = guard.trapframe.take() {
            hal::hal().free_trapframe(tf);
        }
        if let Some(pt) = guard.pagetable.take() {
            hal::hal().destroy_address_space(pt, guard.sz);
        }
        **guard = ProcInner::new();
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

fn chan_of(idx: usize) -> Chan {
    idx
}

/// Tear down a departing process's MMR table: unmap every region out of
/// `pt` before it is destroyed. For MAP_SHARED regions, leave the family
/// first and free the backing frames only if this was the last member
/// (`dofree = last`); for MAP_PRIVATE, the frames are this process's own,
/// so they are always freed (`dofree = true`).
fn teardown_mmrs(kernel: &Kernel, idx: usize, pt: AddrSpace, mmrs: &MmrTable) {
    for m in mmrs.iter() {
        if !m.valid {
            continue;
        }
        let dofree = if m.flags.contains(MmrFlags::MAP_SHARED) {
            let last = kernel.mmr_families.leave(m.listid, idx);
            if last {
                kernel.mmr_families.dealloc_listid(m.listid);
            }
            last
        } else {
            true
        };
        hal::hal().unmap_region(pt, m.addr, m.length, dofree);
    }
}

fn make_runnable(kernel: &Kernel, idx: usize, guard: &mut SpinlockGuard<'_, ProcInner>) {
    guard.state = ProcState::Runnable;
    let prio = guard.priority;
    kernel.queues.enqueue_head(guard, idx, prio);
}

/// The first process. Grounded on `proc.c`'s `userinit`: allocate a slot,
/// give it a minimal address space, mark it runnable with no parent.
pub fn userinit(kernel: &Kernel) -> usize {
    let (idx, mut g) = kernel
        .procs
        .alloc_proc()
        .expect("userinit: process table exhausted at boot");
    g.sz = PGSIZE;
    g.cwd = Some(0);
    g.set_name("initcode");
    g.parent = None;
    make_runnable(kernel, idx, &mut g);
    drop(g);
    kernel.init_proc.store(idx as isize, Ordering::Release);
    idx
}

/// Establish a new mapped region in `idx`'s MMR table. Nothing else in
/// this crate creates one (there's no file-backed `mmap` surface here),
/// but the MMR component's fork/teardown rules only make sense once
/// something has populated a slot, so this is that entry point.
/// `MAP_SHARED` regions are seeded as a singleton family.
pub fn create_mmr(
    kernel: &Kernel,
    idx: usize,
    addr: usize,
    length: usize,
    flags: MmrFlags,
) -> KResult<usize> {
    let mut g = kernel.procs.lock_slot(idx);
    let slot = g
        .mmr
        .iter()
        .position(|m| !m.valid)
        .ok_or(KError::BadArgument)?;

    let listid = if flags.contains(MmrFlags::MAP_SHARED) {
        kernel.mmr_families.alloc_listid(idx)?
    } else {
        -1
    };

    g.mmr[slot] = mmr::Mmr {
        valid: true,
        addr,
        length,
        flags,
        listid,
    };
    Ok(slot)
}

/// Duplicate the calling process. Returns the child's pid.
pub fn fork(kernel: &Kernel, parent_idx: usize) -> KResult<u32> {
    let (child_idx, mut child) = kernel.procs.alloc_proc()?;

    let result = (|| -> KResult<()> {
        let parent = kernel.procs.lock_slot(parent_idx);
        let parent_pt = parent.pagetable.expect("fork: parent has no address space");
        let parent_tf = parent.trapframe.expect("fork: parent has no trapframe");
        let child_pt = child.pagetable.expect("fork: child has no address space");
        let child_tf = child.trapframe.expect("fork: child has no trapframe");

        hal::hal().copy_full(parent_pt, child_pt, parent.sz)?;
        child.sz = parent.sz;
        hal::hal().copy_trapframe(parent_tf, child_tf);
        hal::hal().set_return_value(child_tf, 0);

        child.ofile = parent.ofile;
        child.cwd = parent.cwd;
        child.name = parent.name;
        child.priority = parent.priority;

        let parent_mmrs = parent.mmr;
        drop(parent);

        for (i, m) in parent_mmrs.iter().enumerate() {
            if !m.valid {
                continue;
            }
            if m.flags.contains(MmrFlags::MAP_SHARED) {
                let mut addr = m.addr;
                let end = m.addr + m.length;
                while addr < end {
                    hal::hal().copy_shared_page(parent_pt, child_pt, addr)?;
                    addr += PGSIZE;
                }
                kernel.mmr_families.join(m.listid, child_idx);
            } else {
                let mut addr = m.addr;
                let end = m.addr + m.length;
                while addr < end {
                    if hal::hal().page_present(parent_pt, addr) {
                        hal::hal().copy_private_page(parent_pt, child_pt, addr)?;
                    }
                    addr += PGSIZE;
                }
            }
            child.mmr[i] = *m;
        }
        Ok(())
    })();

    if let Err(e) = result {
        let mmrs = child.mmr;
        let pt = child.pagetable.expect("fork: child has no address space");
        teardown_mmrs(kernel, child_idx, pt, &mmrs);
        kernel.procs.free_proc(&mut child);
        return Err(e);
    }

    let child_pid = child.pid;
    drop(child);
    {
        let _wl = kernel.wait_lock.lock();
        kernel.procs.lock_slot(child_idx).parent = Some(parent_idx);
    }
    let mut child = kernel.procs.lock_slot(child_idx);
    make_runnable(kernel, child_idx, &mut child);
    drop(child);

    log::debug!("fork: pid {} -> pid {}", kernel.procs.lock_slot(parent_idx).pid, child_pid);
    Ok(child_pid)
}

/// Reparent every child of `idx` to the init process (orphan reparenting).
/// Caller must hold `wait_lock`.
fn reparent(kernel: &Kernel, idx: usize) {
    let init = kernel.init_proc.load(Ordering::Acquire);
    if init < 0 {
        return;
    }
    let init = init as usize;
    for other in 0..kernel.procs.len() {
        if other == idx {
            continue;
        }
        let mut g = kernel.procs.lock_slot(other);
        if g.parent == Some(idx) {
            g.parent = Some(init);
            if g.state == ProcState::Zombie {
                drop(g);
                wakeup_locked(kernel, init);
            }
        }
    }
}

/// Wake anything sleeping on `chan`, without itself blocking. Grounded on
/// `proc.c`'s `wakeup`, which scans every slot looking for a match. Public
/// entry point is `sleep::wakeup`; this is the shared implementation also
/// used internally by `exit`/`kill`/`reparent`.
pub(crate) fn wakeup_locked(kernel: &Kernel, chan: Chan) {
    for idx in 0..kernel.procs.len() {
        let mut g = kernel.procs.lock_slot(idx);
        if g.state == ProcState::Sleeping && g.chan == Some(chan) {
            g.chan = None;
            make_runnable(kernel, idx, &mut g);
        }
    }
}

/// Every bookkeeping step of `exit` except the final scheduler handoff:
/// close files, drop `cwd`, leave MMR families, reparent orphans, wake the
/// parent, and go `Zombie`. Split out from `exit` so it can be driven
/// without a live per-cpu scheduler loop behind it — real callers only
/// ever reach this through `exit` itself. Panics if `idx` is the init
/// process (xv6's `panic("init exiting")`).
pub fn exit_prepare(kernel: &Kernel, idx: usize, xstate: i32) {
    if kernel.init_proc.load(Ordering::Acquire) == idx as isize {
        panic!("init exiting");
    }

    let (pt, mmrs) = {
        let mut g = kernel.procs.lock_slot(idx);
        for fd in g.ofile.iter_mut() {
            *fd = None;
        }
        g.cwd = None;
        (g.pagetable.expect("exit: process has no address space"), g.mmr)
    };
    teardown_mmrs(kernel, idx, pt, &mmrs);

    let _wl = kernel.wait_lock.lock();
    reparent(kernel, idx);

    let parent = kernel.procs.lock_slot(idx).parent;
    if let Some(p) = parent {
        wakeup_locked(kernel, p);
    }

    let mut g = kernel.procs.lock_slot(idx);
    g.xstate = xstate;
    g.state = ProcState::Zombie;
}

/// Terminate the calling process. Does not return; the caller's next step
/// is always `sched()`.
pub fn exit(kernel: &Kernel, idx: usize, xstate: i32) -> ! {
    exit_prepare(kernel, idx, xstate);
    crate::sched::yield_to_scheduler(kernel, idx);
    unreachable!("exited process was rescheduled")
}

/// Outcome of a successful `wait`/`wait2`.
pub struct WaitResult {
    pub pid: u32,
    pub xstate: i32,
    pub cputime: u64,
}

/// Block until a child of `waiter_idx` exits, reap it, and report its exit
/// status. `wait2` additionally reports accumulated cpu time.
pub fn wait(kernel: &Kernel, waiter_idx: usize) -> KResult<WaitResult> {
    let mut wl = kernel.wait_lock.lock();
    loop {
        let mut have_child = false;
        for idx in 0..kernel.procs.len() {
            if idx == waiter_idx {
                continue;
            }
            let mut g = kernel.procs.lock_slot(idx);
            if g.parent != Some(waiter_idx) {
                continue;
            }
            have_child = true;
            if g.state == ProcState::Zombie {
                let pid = g.pid;
                let xstate = g.xstate;
                let cputime = g.cputime;
                kernel.procs.free_proc(&mut g);
                return Ok(WaitResult { pid, xstate, cputime });
            }
        }
        if !have_child || kernel.procs.lock_slot(waiter_idx).killed {
            return Err(KError::BadPid);
        }
        wl = crate::sleep::sleep(kernel, waiter_idx, chan_of(waiter_idx), wl);
    }
}

/// Grow (`n > 0`) or shrink (`n < 0`) the calling process's address space
/// by `n` bytes, returning the size before the change (xv6's `growproc`,
/// wired for `sys_sbrk`).
pub fn grow(kernel: &Kernel, idx: usize, n: i64) -> KResult<usize> {
    let mut g = kernel.procs.lock_slot(idx);
    let pt = g.pagetable.expect("grow: process has no address space");
    let old_sz = g.sz;
    let new_sz = (old_sz as i64 + n) as usize;
    g.sz = if n > 0 {
        hal::hal().grow(pt, old_sz, new_sz)?
    } else if n < 0 {
        hal::hal().shrink(pt, old_sz, new_sz)
    } else {
        old_sz
    };
    Ok(old_sz)
}

/// Mark the process with pid `target_pid` as killed. If it is currently
/// sleeping, force it runnable so it observes `killed` promptly.
pub fn kill(kernel: &Kernel, target_pid: u32) -> KResult<()> {
    for idx in 0..kernel.procs.len() {
        let mut g = kernel.procs.lock_slot(idx);
        if g.state != ProcState::Unused && g.pid == target_pid {
            g.killed = true;
            if g.state == ProcState::Sleeping {
                g.chan = None;
                make_runnable(kernel, idx, &mut g);
            }
            return Ok(());
        }
    }
    Err(KError::BadPid)
}

/// A snapshot row for `procinfo`/`pstat`.
#[derive(Copy, Clone)]
pub struct Pstat {
    pub pid: u32,
    pub name: [u8; 16],
    pub state: ProcState,
    pub size: usize,
    pub cpu_time: u64,
    /// Parent's pid, or 0 for a parentless process (`proc.c`'s convention).
    pub ppid: u32,
}

/// Fill `out` with one row per non-`Unused` slot, returning the count
/// written. Mirrors `proc.c`'s `procinfo`.
pub fn procinfo(kernel: &Kernel, out: &mut [Pstat]) -> usize {
    let mut n = 0;
    for idx in 0..kernel.procs.len() {
        if n >= out.len() {
            break;
        }
        let g = kernel.procs.lock_slot(idx);
        if g.state == ProcState::Unused {
            continue;
        }
        let ppid = g.parent.map_or(0, |p| kernel.procs.lock_slot(p).pid);
        out[n] = Pstat {
            pid: g.pid,
            name: g.name,
            state: g.state,
            size: g.sz,
            cpu_time: g.cputime,
            ppid,
        };
        n += 1;
    }
    n
}

/// Logs one line per non-`Unused` slot. Stands in for xv6's console
/// `procdump` — no console driver here, so this reports through `log`
/// instead, with the unconditional print made an opt-in debug log.
pub fn dump(kernel: &Kernel) {
    for idx in 0..kernel.procs.len() {
        let g = kernel.procs.lock_slot(idx);
        if g.state == ProcState::Unused {
            continue;
        }
        log::debug!(
            "proc[{}] pid={} state={:?} priority={:?}",
            idx,
            g.pid,
            g.state,
            g.priority
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::TestHal;
    use crate::KernelConfig;

    fn test_kernel() -> Kernel {
        unsafe { hal::init(TestHal::shared()) };
        Kernel::new(KernelConfig::default())
    }

    #[test]
    fn fork_exit_wait_reaps_child() {
        let kernel = test_kernel();
        let parent = userinit(&kernel);
        kernel.procs.lock_slot(parent).state = ProcState::Used;

        let child_pid = fork(&kernel, parent).unwrap();
        let child_idx = (0..kernel.procs.len())
            .find(|&i| kernel.procs.lock_slot(i).pid == child_pid)
            .unwrap();

        exit_prepare(&kernel, child_idx, 7);

        let result = wait(&kernel, parent).unwrap();
        assert_eq!(result.pid, child_pid);
        assert_eq!(result.xstate, 7);
        assert_eq!(kernel.procs.lock_slot(child_idx).state, ProcState::Unused);
    }

    #[test]
    fn orphan_is_reparented_to_init() {
        let kernel = test_kernel();
        let init = userinit(&kernel);
        kernel.procs.lock_slot(init).state = ProcState::Used;

        let mid_pid = fork(&kernel, init).unwrap();
        let mid = (0..kernel.procs.len())
            .find(|&i| kernel.procs.lock_slot(i).pid == mid_pid)
            .unwrap();

        let grandchild_pid = fork(&kernel, mid).unwrap();
        let grandchild = (0..kernel.procs.len())
            .find(|&i| kernel.procs.lock_slot(i).pid == grandchild_pid)
            .unwrap();

        exit_prepare(&kernel, mid, 0);
        wait(&kernel, init).unwrap();

        assert_eq!(kernel.procs.lock_slot(grandchild).parent, Some(init));
    }

    #[test]
    fn kill_wakes_a_sleeper() {
        let kernel = test_kernel();
        let p = userinit(&kernel);
        {
            let mut g = kernel.procs.lock_slot(p);
            g.state = ProcState::Sleeping;
            g.chan = Some(999);
        }
        let pid = kernel.procs.lock_slot(p).pid;
        kill(&kernel, pid).unwrap();
        let g = kernel.procs.lock_slot(p);
        assert!(g.killed);
        assert_eq!(g.state, ProcState::Runnable);
    }
}
