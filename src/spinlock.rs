//! Spinlock with disable-interrupt nesting.
//!
//! The `push_off`/`pop_off` discipline: acquiring any lock disables
//! interrupts on the local CPU, the first acquisition saves the prior
//! interrupt-enable flag, and the last release restores it. This is
//! load-bearing on an interrupt-driven kernel, so it stays even though the
//! lock itself is recast as a data-guarding `Spinlock<T>` rather than a
//! bare flag sitting next to the fields it protects.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::hal::hal;

/// A spinlock guarding the data `T` it wraps.
///
/// Unlike a bare C-style `struct spinlock` (a flag sitting next to the
/// fields it protects, trusted by convention), this type makes the
/// protected data inaccessible except through a held guard.
pub struct Spinlock<T> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(data),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquire the lock, spinning until it is free.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        push_off();
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        SpinlockGuard { lock: self }
    }

    /// Try to acquire without spinning. Used where the caller must not block
    /// (e.g. `wakeup` must not stall behind a sleeper's own lock).
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        push_off();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinlockGuard { lock: self })
        } else {
            pop_off();
            None
        }
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
        pop_off();
    }

    /// True if currently held by *some* holder. Debug/assert use only:
    /// there's no per-holder identity check, since ownership is enforced
    /// by the borrow checker instead.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<'a, T> SpinlockGuard<'a, T> {
    /// The lock this guard was issued from, without releasing it. Used by
    /// `sleep` to re-acquire a caller's lock after a context switch.
    pub(crate) fn source(&self) -> &'a Spinlock<T> {
        self.lock
    }
}

impl<'a, T> Deref for SpinlockGuard<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<'a, T> DerefMut for SpinlockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<'a, T> Drop for SpinlockGuard<'a, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

/// push_off/pop_off are matched: it takes two pop_off()s to undo two
/// push_off()s. If interrupts are initially off, push_off/pop_off leaves
/// them off.
pub fn push_off() {
    let h = hal();
    let old = h.intr_get();
    h.intr_off();
    let cpu = crate::cpu::current_cpu_state();
    unsafe {
        if (*cpu).noff == 0 {
            (*cpu).intena = old;
        }
        (*cpu).noff += 1;
    }
}

pub fn pop_off() {
    let h = hal();
    if h.intr_get() {
        panic!("pop_off - interruptible");
    }
    let cpu = crate::cpu::current_cpu_state();
    unsafe {
        if (*cpu).noff == 0 {
            panic!("pop_off");
        }
        (*cpu).noff -= 1;
        if (*cpu).noff == 0 && (*cpu).intena {
            h.intr_on();
        }
    }
}
