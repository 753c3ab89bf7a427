//! Per-CPU state.
//!
//! Each CPU's scratch is touched only by that CPU's own code path between a
//! matched `push_off`/`pop_off`, exactly as on real hardware — so this is a
//! plain `static mut` array rather than an array of locks (a CPU never
//! needs to take a lock to read its own state).

use crate::param::NCPU;

#[derive(Copy, Clone)]
pub struct CpuState {
    /// Slot index of the process currently RUNNING on this CPU, or `None`.
    pub current: Option<usize>,
    pub context: crate::hal::Context,
    /// Depth of `push_off()` nesting.
    pub noff: u32,
    /// Were interrupts enabled before the outermost `push_off()`?
    pub intena: bool,
}

impl CpuState {
    const fn new() -> Self {
        CpuState {
            current: None,
            context: crate::hal::Context { regs: [0; 14] },
            noff: 0,
            intena: false,
        }
    }
}

static mut CPUS: [CpuState; NCPU] = [CpuState::new(); NCPU];

/// Must be called with interrupts disabled, to prevent migration mid-read.
pub fn cpuid() -> usize {
    crate::hal::hal().cpuid() % NCPU
}

/// Raw pointer to the calling CPU's scratch state. Interrupts must be
/// disabled by the caller (`push_off`/`pop_off` do this internally).
pub(crate) fn current_cpu_state() -> *mut CpuState {
    unsafe { &mut CPUS[cpuid()] as *mut CpuState }
}

/// The process slot currently RUNNING on this CPU, if any.
pub fn current_proc() -> Option<usize> {
    crate::spinlock::push_off();
    let p = unsafe { (*current_cpu_state()).current };
    crate::spinlock::pop_off();
    p
}

pub(crate) fn set_current_proc(slot: Option<usize>) {
    unsafe {
        (*current_cpu_state()).current = slot;
    }
}
