//! Syscall-layer wrappers.
//!
//! Thin `Result`-returning shims over `proc`/`sem`; none of them touch a
//! real trapframe or do the final `-1`-on-error flattening a real
//! dispatcher would (the trap/syscall-dispatch path is real hardware's
//! problem, not this crate's). Argument fetching is expressed as the
//! `SyscallArgs` trait, matching xv6's `argint`/`argaddr`/`argstr`/
//! `fetchstr` calling convention, so this module is testable without a
//! real trapframe or copyin/copyout.

use crate::error::{KError, KResult};
use crate::proc::{Pstat, WaitResult};
use crate::Kernel;

/// Stands in for xv6's `argint`/`argaddr`/`argstr`/`fetchstr`. A real
/// trap-entry implementation reads these out of the caller's saved
/// registers/trapframe and copies strings in from user memory; that
/// plumbing belongs to a real platform, so only the shape of the calling
/// convention is kept here.
pub trait SyscallArgs {
    fn argint(&self, n: usize) -> KResult<i32>;
    fn argaddr(&self, n: usize) -> KResult<usize>;
    /// Copies at most `buf.len()` bytes of the `n`th argument (a
    /// NUL-terminated user string) into `buf`, returning the length.
    fn argstr(&self, n: usize, buf: &mut [u8]) -> KResult<usize>;
}

/// cpu-time report for `wait2`.
#[derive(Copy, Clone, Debug, Default)]
pub struct Rusage {
    pub cputime: u64,
}

pub fn sys_getpid(kernel: &Kernel, caller: usize) -> u32 {
    kernel.procs.lock_slot(caller).pid
}

pub fn sys_fork(kernel: &Kernel, caller: usize) -> KResult<u32> {
    crate::proc::fork(kernel, caller)
}

/// Does not return; matches `proc::exit`.
pub fn sys_exit(kernel: &Kernel, caller: usize, status: i32) -> ! {
    crate::proc::exit(kernel, caller, status)
}

pub fn sys_wait(kernel: &Kernel, caller: usize) -> KResult<u32> {
    crate::proc::wait(kernel, caller).map(|r| r.pid)
}

/// As `sys_wait`, but also reports the reaped child's accumulated cpu
/// time. No unconditional console print here; see `proc::dump` for the
/// debug-log equivalent.
pub fn sys_wait2(kernel: &Kernel, caller: usize) -> KResult<(WaitResult, Rusage)> {
    let result = crate::proc::wait(kernel, caller)?;
    let rusage = Rusage {
        cputime: result.cputime,
    };
    Ok((result, rusage))
}

pub fn sys_kill(kernel: &Kernel, target_pid: u32) -> KResult<()> {
    crate::proc::kill(kernel, target_pid)
}

/// Block the caller for `ticks` clock ticks, or until `kill` observes it.
/// Returns `Err(KError::Interrupted)` in the latter case, matching xv6's
/// "-1 from `sys_sleep`" behavior.
pub fn sys_sleep(kernel: &Kernel, caller: usize, ticks: u64) -> KResult<()> {
    let wake_at = crate::hal::hal().now() + ticks;
    let mut g = kernel.procs.lock_slot(caller);
    while crate::hal::hal().now() < wake_at {
        if g.killed {
            return Err(KError::Interrupted);
        }
        g = crate::sleep::sleep(kernel, caller, crate::sleep::TICK_CHAN, g);
        if g.killed {
            return Err(KError::Interrupted);
        }
    }
    Ok(())
}

pub fn sys_procinfo(kernel: &Kernel, out: &mut [Pstat]) -> usize {
    crate::proc::procinfo(kernel, out)
}

/// Grow/shrink the caller's heap by `n` bytes; returns the break before
/// the change.
pub fn sys_sbrk(kernel: &Kernel, caller: usize, n: i64) -> KResult<usize> {
    crate::proc::grow(kernel, caller, n)
}

pub fn sys_uptime(_kernel: &Kernel) -> u64 {
    crate::hal::hal().now()
}

/// Free physical page count; a diagnostic, not load-bearing state.
pub fn sys_freepmem(_kernel: &Kernel) -> usize {
    crate::hal::hal().free_pages()
}

pub fn sys_sem_init(kernel: &Kernel, value: i32) -> KResult<usize> {
    kernel.sems.init(value)
}

pub fn sys_sem_wait(kernel: &Kernel, caller: usize, handle: usize) -> KResult<()> {
    kernel.sems.wait(kernel, caller, handle)
}

pub fn sys_sem_post(kernel: &Kernel, handle: usize) -> KResult<()> {
    kernel.sems.post(kernel, handle)
}

pub fn sys_sem_destroy(kernel: &Kernel, handle: usize) -> KResult<()> {
    kernel.sems.destroy(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KError;
    use crate::sim::TestHal;
    use crate::KernelConfig;

    struct FakeArgs(Vec<i64>);

    impl SyscallArgs for FakeArgs {
        fn argint(&self, n: usize) -> KResult<i32> {
            self.0
                .get(n)
                .map(|v| *v as i32)
                .ok_or(KError::BadArgument)
        }
        fn argaddr(&self, n: usize) -> KResult<usize> {
            self.0
                .get(n)
                .map(|v| *v as usize)
                .ok_or(KError::BadArgument)
        }
        fn argstr(&self, _n: usize, _buf: &mut [u8]) -> KResult<usize> {
            Err(KError::BadArgument)
        }
    }

    #[test]
    fn sem_init_wait_post_round_trip() {
        unsafe { crate::hal::init(TestHal::shared()) };
        let kernel = Kernel::new(KernelConfig::default());
        let caller = crate::proc::userinit(&kernel);

        let args = FakeArgs(vec![0, 0, 1]);
        let value = args.argint(2).unwrap();
        let handle = sys_sem_init(&kernel, value).unwrap();

        sys_sem_wait(&kernel, caller, handle).unwrap();
        sys_sem_post(&kernel, handle).unwrap();
        sys_sem_destroy(&kernel, handle).unwrap();

        assert_eq!(sys_sem_post(&kernel, handle), Err(KError::BadHandle));
    }

    #[test]
    fn procinfo_reports_ppid_zero_for_parentless() {
        unsafe { crate::hal::init(TestHal::shared()) };
        let kernel = Kernel::new(KernelConfig::default());
        let idx = crate::proc::userinit(&kernel);

        let mut rows = [Pstat {
            pid: 0,
            name: [0; 16],
            state: crate::proc::ProcState::Unused,
            size: 0,
            cpu_time: 0,
            ppid: 0,
        }; 4];
        let n = sys_procinfo(&kernel, &mut rows);
        assert_eq!(n, 1);
        assert_eq!(rows[0].pid, kernel.procs.lock_slot(idx).pid);
        assert_eq!(rows[0].ppid, 0);
    }
}
