//! Sleep/wakeup rendezvous.
//!
//! Follows xv6's `sleep`/`wakeup`. The no-lost-wakeup invariant depends on
//! never releasing the caller's lock
//! before acquiring the sleeper's own slot lock: `wakeup` can only observe
//! `Sleeping` + a matching `chan` once both have been set, and both are
//! set while holding the slot lock, so a `wakeup` racing a `sleep` either
//! sees the old state (and misses nothing, because the sleeper hasn't
//! committed to sleeping yet) or the new one (and wakes it).

use crate::proc::{Chan, ProcState};
use crate::spinlock::{Spinlock, SpinlockGuard};
use crate::Kernel;

/// The channel `sys_sleep` blocks on; the clock-tick source wakes it once
/// per tick via [`crate::sched::clock_tick`].
pub const TICK_CHAN: Chan = usize::MAX;

/// Atomically: mark the calling process (`idx`) asleep on `chan`, release
/// `guard`, and hand control to the scheduler. Returns a freshly
/// re-acquired guard on the same lock once woken — callers must not reuse
/// the original `guard` after this call.
pub fn sleep<'a, T>(
    kernel: &Kernel,
    idx: usize,
    chan: Chan,
    guard: SpinlockGuard<'a, T>,
) -> SpinlockGuard<'a, T> {
    let caller_lock: &'a Spinlock<T> = guard.source();

    let mut p = kernel.procs.lock_slot(idx);
    drop(guard);

    p.chan = Some(chan);
    p.state = ProcState::Sleeping;
    crate::sched::sched(&mut p);

    p.chan = None;
    drop(p);

    caller_lock.lock()
}

/// Wake every process sleeping on `chan`.
pub fn wakeup(kernel: &Kernel, chan: Chan) {
    crate::proc::wakeup_locked(kernel, chan);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::TestHal;
    use crate::spinlock::Spinlock;
    use crate::KernelConfig;

    #[test]
    fn wakeup_before_sleep_is_not_lost_once_state_is_set() {
        // This exercises the observable half of the no-lost-wakeup
        // invariant: once a process has committed to `Sleeping` on a
        // channel, `wakeup` on that channel reliably finds and runs it.
        unsafe { crate::hal::init(TestHal::shared()) };
        let kernel = Kernel::new(KernelConfig::default());
        let idx = crate::proc::userinit(&kernel);
        assert!(crate::sched::schedule_once(&kernel));

        let aux: Spinlock<()> = Spinlock::new("aux", ());
        {
            let mut g = kernel.procs.lock_slot(idx);
            g.state = ProcState::Sleeping;
            g.chan = Some(42);
        }
        let _ = aux.lock();
        wakeup(&kernel, 42);
        let g = kernel.procs.lock_slot(idx);
        assert_eq!(g.state, ProcState::Runnable);
        assert_eq!(g.chan, None);
    }
}
