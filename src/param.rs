// Kernel-wide size constants, mirroring xv6's param.h.

pub const NPROC: usize = 64;
pub const NCPU: usize = 8;
pub const NOFILE: usize = 16;
pub const NSEM: usize = 64;
pub const MAX_MMR: usize = 16;
pub const NQUEUE: usize = 3;

// MLFQ per-level timeslices, in scheduler ticks.
pub const TSTICKSHIGH: u32 = 2;
pub const TSTICKSMEDIUM: u32 = 4;
pub const TSTICKSLOW: u32 = 8;

pub const ROOTDEV: u32 = 1;

/// Page size assumed by MMR region bookkeeping (fork-time page-by-page
/// copy/share). The real value is a platform detail owned by the `Hal`;
/// this is the granularity the process-management core reasons in.
pub const PGSIZE: usize = 4096;

/// Scheduler policy, a process-wide setting.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SchedPolicy {
    Rr,
    Mlfq,
}

/// Runtime configuration: the one scheduling knob a booting platform picks.
#[derive(Copy, Clone, Debug)]
pub struct KernelConfig {
    pub sched_policy: SchedPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            sched_policy: SchedPolicy::Mlfq,
        }
    }
}
