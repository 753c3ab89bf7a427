//! Scheduler run queues.
//!
//! Three priority FIFOs (HIGH/MEDIUM/LOW). The queue module alone owns the
//! linkage discipline: queues are modelled as indexes into the process
//! table rather than aliased references, via `ProcInner`'s
//! `next: Option<usize>` field and this module's `enqueue_tail`/
//! `enqueue_head`/`dequeue` — no code outside this module ever reads or
//! writes a slot's `next`.

use crate::param::NQUEUE;
use crate::proc::{ProcInner, ProcTable};
use crate::spinlock::{Spinlock, SpinlockGuard};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    High = 0,
    Medium = 1,
    Low = 2,
}

impl Priority {
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn timeslice(self) -> u32 {
        use crate::param::{TSTICKSHIGH, TSTICKSLOW, TSTICKSMEDIUM};
        match self {
            Priority::High => TSTICKSHIGH,
            Priority::Medium => TSTICKSMEDIUM,
            Priority::Low => TSTICKSLOW,
        }
    }
}

#[derive(Copy, Clone, Default)]
struct QueueState {
    head: Option<usize>,
    tail: Option<usize>,
}

impl QueueState {
    /// Queue invariant: head is `None` iff tail is `None`.
    fn check_invariant(&self) {
        if self.head.is_none() != self.tail.is_none() {
            panic!("scheduler queue: head/tail inconsistency");
        }
    }
}

pub struct Queues {
    queues: [Spinlock<QueueState>; NQUEUE],
}

impl Queues {
    pub fn new() -> Self {
        Queues {
            queues: core::array::from_fn(|_| Spinlock::new("queue", QueueState::default())),
        }
    }

    pub fn is_empty(&self, priority: Priority) -> bool {
        self.queues[priority.index()].lock().head.is_none()
    }

    /// Enqueue slot `idx` at the tail of `priority`'s queue. `guard` must be
    /// `idx`'s own already-held slot lock (the caller must hold a slot's
    /// lock before enqueueing it); this avoids re-locking a lock the caller is
    /// already holding while still allowing the (different) old-tail slot
    /// to be locked briefly to splice it in.
    pub fn enqueue_tail(
        &self,
        table: &ProcTable,
        guard: &mut SpinlockGuard<'_, ProcInner>,
        idx: usize,
        priority: Priority,
    ) {
        let mut q = self.queues[priority.index()].lock();
        q.check_invariant();
        guard.next = None;
        match q.tail {
            None => {
                q.head = Some(idx);
                q.tail = Some(idx);
            }
            Some(tail) => {
                table.lock_slot(tail).next = Some(idx);
                q.tail = Some(idx);
            }
        }
    }

    /// Enqueue at the head. Used on wakeup and kill-wake to give freshly
    /// runnable processes urgency.
    pub fn enqueue_head(
        &self,
        guard: &mut SpinlockGuard<'_, ProcInner>,
        idx: usize,
        priority: Priority,
    ) {
        let mut q = self.queues[priority.index()].lock();
        q.check_invariant();
        match q.head {
            None => {
                guard.next = None;
                q.head = Some(idx);
                q.tail = Some(idx);
            }
            Some(head) => {
                guard.next = Some(head);
                q.head = Some(idx);
            }
        }
    }

    /// Pop the head of `priority`'s queue, or `None` if empty.
    pub fn dequeue(&self, table: &ProcTable, priority: Priority) -> Option<usize> {
        let mut q = self.queues[priority.index()].lock();
        q.check_invariant();
        let head = q.head?;
        let next = {
            let mut g = table.lock_slot(head);
            let n = g.next;
            g.next = None;
            n
        };
        q.head = next;
        if q.head.is_none() {
            q.tail = None;
        }
        Some(head)
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::ProcState;

    #[test]
    fn fifo_order_within_priority() {
        let table = ProcTable::new();
        let queues = Queues::new();

        for idx in [3usize, 1, 2] {
            let mut g = table.lock_slot(idx);
            g.state = ProcState::Runnable;
            queues.enqueue_tail(&table, &mut g, idx, Priority::High);
        }

        assert_eq!(queues.dequeue(&table, Priority::High), Some(3));
        assert_eq!(queues.dequeue(&table, Priority::High), Some(1));
        assert_eq!(queues.dequeue(&table, Priority::High), Some(2));
        assert_eq!(queues.dequeue(&table, Priority::High), None);
    }

    #[test]
    fn enqueue_head_jumps_the_line() {
        let table = ProcTable::new();
        let queues = Queues::new();
        {
            let mut g = table.lock_slot(1);
            queues.enqueue_tail(&table, &mut g, 1, Priority::Low);
        }
        {
            let mut g = table.lock_slot(2);
            queues.enqueue_tail(&table, &mut g, 2, Priority::Low);
        }
        {
            let mut g = table.lock_slot(3);
            queues.enqueue_head(&mut g, 3, Priority::Low);
        }

        assert_eq!(queues.dequeue(&table, Priority::Low), Some(3));
        assert_eq!(queues.dequeue(&table, Priority::Low), Some(1));
        assert_eq!(queues.dequeue(&table, Priority::Low), Some(2));
    }
}
