//! Counting semaphores.
//!
//! A reference xv6 variant's `sys_sem_wait`/`sys_sem_post` carries three
//! bugs worth not repeating: a double-`acquire` of one global
//! `semtable.lock`, a loop indexing `semtable.sem[idx]` with an `idx` that
//! counts up from zero instead of naming the caller's slot, and
//! `sys_sem_post` never reading the handle it's supposed to operate on at
//! all. This module gives each slot its own lock and always operates on
//! the handle the caller passed in.

use crate::error::{KError, KResult};
use crate::param::NSEM;
use crate::proc::Chan;
use crate::spinlock::Spinlock;
use crate::Kernel;

struct SemSlot {
    valid: bool,
    count: i32,
}

impl SemSlot {
    const fn empty() -> Self {
        SemSlot {
            valid: false,
            count: 0,
        }
    }
}

pub struct SemTable {
    slots: [Spinlock<SemSlot>; NSEM],
}

impl SemTable {
    pub fn new() -> Self {
        SemTable {
            slots: core::array::from_fn(|_| Spinlock::new("sem", SemSlot::empty())),
        }
    }

    fn check_handle(&self, handle: usize) -> KResult<()> {
        if handle >= self.slots.len() {
            Err(KError::BadHandle)
        } else {
            Ok(())
        }
    }

    /// Allocate a slot seeded with `value`, returning its handle.
    pub fn init(&self, value: i32) -> KResult<usize> {
        for (i, slot) in self.slots.iter().enumerate() {
            let mut g = slot.lock();
            if !g.valid {
                g.valid = true;
                g.count = value;
                return Ok(i);
            }
        }
        Err(KError::NoFreeSem)
    }

    /// Block `proc_idx` until `handle`'s count is positive, then consume
    /// one unit. The slot's own lock is both the count guard and the lock
    /// `sleep` releases/reacquires around the block.
    pub fn wait(&self, kernel: &Kernel, proc_idx: usize, handle: usize) -> KResult<()> {
        self.check_handle(handle)?;
        let mut g = self.slots[handle].lock();
        if !g.valid {
            return Err(KError::BadHandle);
        }
        let chan: Chan = handle;
        while g.count == 0 {
            g = crate::sleep::sleep(kernel, proc_idx, chan, g);
            if !g.valid {
                return Err(KError::BadHandle);
            }
        }
        g.count -= 1;
        Ok(())
    }

    /// Increment `handle`'s count and wake every process blocked on it.
    pub fn post(&self, kernel: &Kernel, handle: usize) -> KResult<()> {
        self.check_handle(handle)?;
        {
            let mut g = self.slots[handle].lock();
            if !g.valid {
                return Err(KError::BadHandle);
            }
            g.count += 1;
        }
        crate::sleep::wakeup(kernel, handle);
        Ok(())
    }

    /// Invalidate `handle`. This must not disturb the slot's lock itself —
    /// only the `valid`/`count` fields — since the lock is acquired and
    /// released around this call exactly like any other slot operation.
    pub fn destroy(&self, handle: usize) -> KResult<()> {
        self.check_handle(handle)?;
        let mut g = self.slots[handle].lock();
        if !g.valid {
            return Err(KError::BadHandle);
        }
        g.valid = false;
        g.count = 0;
        Ok(())
    }
}

impl Default for SemTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::TestHal;
    use crate::KernelConfig;

    fn test_kernel() -> Kernel {
        unsafe { crate::hal::init(TestHal::shared()) };
        Kernel::new(KernelConfig::default())
    }

    /// A single-threaded `sem_wait`; `sem_post` on an initially-1
    /// semaphore should leave `count == 1`.
    #[test]
    fn single_thread_wait_then_post_preserves_count() {
        let kernel = test_kernel();
        let idx = crate::proc::userinit(&kernel);
        let handle = kernel.sems.init(1).unwrap();

        kernel.sems.wait(&kernel, idx, handle).unwrap();
        kernel.sems.post(&kernel, handle).unwrap();

        let g = kernel.sems.slots[handle].lock();
        assert_eq!(g.count, 1);
    }

    #[test]
    fn destroyed_handle_is_rejected() {
        let kernel = test_kernel();
        let idx = crate::proc::userinit(&kernel);
        let handle = kernel.sems.init(0).unwrap();
        kernel.sems.destroy(handle).unwrap();

        assert_eq!(kernel.sems.post(&kernel, handle), Err(KError::BadHandle));
        assert_eq!(
            kernel.sems.wait(&kernel, idx, handle),
            Err(KError::BadHandle)
        );
    }

    #[test]
    fn out_of_range_handle_is_rejected() {
        let kernel = test_kernel();
        assert_eq!(kernel.sems.post(&kernel, NSEM), Err(KError::BadHandle));
    }
}
