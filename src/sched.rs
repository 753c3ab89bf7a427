//! Per-CPU scheduler loop and the `sched()`/`yield_()` context-switch
//! contract.
//!
//! Follows xv6's `scheduler`/`sched`/`yield`, generalized over both
//! policies `param::SchedPolicy` names: flat round robin (every process
//! stays at `Priority::High`, so the three queues degrade to one) and MLFQ
//! (a process that exhausts its level's timeslice is demoted one level; it
//! is never promoted back up).

use crate::cpu;
use crate::param::SchedPolicy;
use crate::proc::{ProcInner, ProcState};
use crate::queue::Priority;
use crate::spinlock::SpinlockGuard;
use crate::Kernel;

/// Runs forever on the calling cpu. Never returns under real operation —
/// tests drive `schedule_once` directly instead, since this cpu's context
/// switch is a real stack swap `hal::Hal::switch` performs, not something
/// host test code can meaningfully loop on.
pub fn scheduler(kernel: &Kernel) -> ! {
    loop {
        schedule_once(kernel);
    }
}

/// Pick one runnable process, highest priority first, and switch into it.
/// Returns `true` if a process ran. Split out from `scheduler` so it can
/// be driven once at a time by tests or by a single-step debug command.
pub fn schedule_once(kernel: &Kernel) -> bool {
    let idx = match next_runnable(kernel) {
        Some(idx) => idx,
        None => return false,
    };

    let mut g = kernel.procs.lock_slot(idx);
    if g.state != ProcState::Runnable {
        return false;
    }
    g.state = ProcState::Running;
    g.tsticks = 0;
    cpu::set_current_proc(Some(idx));

    let cpu_ctx = cpu::current_cpu_state();
    unsafe {
        crate::hal::hal().switch(&mut (*cpu_ctx).context, &g.context);
    }

    cpu::set_current_proc(None);
    true
}

fn next_runnable(kernel: &Kernel) -> Option<usize> {
    for p in [Priority::High, Priority::Medium, Priority::Low] {
        if let Some(idx) = kernel.queues.dequeue(&kernel.procs, p) {
            return Some(idx);
        }
    }
    None
}

fn demote(p: Priority) -> Priority {
    match p {
        Priority::High => Priority::Medium,
        Priority::Medium => Priority::Low,
        Priority::Low => Priority::Low,
    }
}

/// The context-switch contract: hand control back to this cpu's scheduler
/// loop. Caller must hold `guard` (the running process's own slot lock)
/// and must have already left state `Running`. The two checks mirror
/// `proc.c`'s `sched` — both are invariant violations, not runtime
/// conditions, so they panic rather than return `Result`.
pub fn sched(guard: &mut SpinlockGuard<'_, ProcInner>) {
    if guard.state == ProcState::Running {
        panic!("sched: process still marked running");
    }
    if crate::hal::hal().intr_get() {
        panic!("sched: interruptible");
    }
    let cpu_ctx = cpu::current_cpu_state();
    unsafe {
        crate::hal::hal().switch(&mut guard.context, &(*cpu_ctx).context);
    }
}

/// Used by `proc::exit`: the process is already `Zombie` and holds its own
/// lock; this just performs the final handoff.
pub(crate) fn yield_to_scheduler(kernel: &Kernel, idx: usize) {
    let mut g = kernel.procs.lock_slot(idx);
    let _ = kernel;
    sched(&mut g);
}

/// Voluntarily give up the cpu (trailing underscore because `yield` is a
/// keyword). Under MLFQ, demotes the caller one priority level if it has
/// exhausted its current level's timeslice.
pub fn yield_(kernel: &Kernel, idx: usize) {
    let mut g = kernel.procs.lock_slot(idx);
    g.state = ProcState::Runnable;
    if kernel.config.sched_policy == SchedPolicy::Mlfq && g.tsticks >= g.priority.timeslice() {
        g.priority = demote(g.priority);
    }
    let prio = g.priority;
    kernel.queues.enqueue_tail(&kernel.procs, &mut g, idx, prio);
    sched(&mut g);
}

/// Timer-tick accounting for the currently running process on this cpu.
/// The actual timer interrupt source lives on real hardware; this is the
/// named interface it calls once per tick.
pub fn tick(kernel: &Kernel, idx: usize) {
    let mut g = kernel.procs.lock_slot(idx);
    if g.state != ProcState::Running {
        return;
    }
    g.tsticks += 1;
    g.cputime += 1;
}

/// Full per-tick hook for a platform's timer interrupt handler: accounts
/// cpu time for whatever this cpu is running, then wakes every process
/// blocked in `sys_sleep`.
pub fn clock_tick(kernel: &Kernel, running_idx: Option<usize>) {
    if let Some(idx) = running_idx {
        tick(kernel, idx);
    }
    crate::sleep::wakeup(kernel, crate::sleep::TICK_CHAN);
}
