//! Ready queues and the dispatcher.
//!
//! One circular doubly-linked ring of READY processes per priority,
//! threaded through the process arena by slot index. A process is on
//! exactly one ring (its own priority's) while READY and on none
//! otherwise; `next`/`prev` are `Some` exactly while queued, which the
//! queue operations assert.
//!
//! Scheduling is strict priority with round-robin inside a level:
//! the highest non-empty ring wins, and if the active process sits at
//! that level the CPU passes to its ring successor, so voluntary
//! yielders give way to their peers. Starvation of lower priorities
//! under a persistently-ready higher one is intended.

use crate::{
    kernel::Kernel,
    param::MAX_READY_QUEUES,
    proc::{Pid, ProcState},
};

impl Kernel {
    /// Inserts `pid` at the back of its priority's ready ring and marks
    /// it READY. O(1).
    pub(crate) fn add_ready_queue(&mut self, pid: Pid) {
        let p = self.procs.get(pid);
        let slot = p.pid.slot;
        let prio = p.priority;
        assert!(prio < MAX_READY_QUEUES, "{pid} has priority {prio}");
        assert!(
            p.next.is_none() && p.prev.is_none(),
            "{pid} is already on a ready queue"
        );

        match self.ready[prio] {
            None => {
                self.ready[prio] = Some(slot);
                let p = self.procs.by_slot_mut(slot);
                p.next = Some(slot);
                p.prev = Some(slot);
            }
            Some(head) => {
                let last = self.procs.by_slot(head).prev.unwrap();
                self.procs.by_slot_mut(head).prev = Some(slot);
                self.procs.by_slot_mut(last).next = Some(slot);
                let p = self.procs.by_slot_mut(slot);
                p.prev = Some(last);
                p.next = Some(head);
            }
        }
        self.procs.by_slot_mut(slot).state = ProcState::Ready;
    }

    /// Splices `pid` out of its ready ring. Leaves its state alone; the
    /// caller records why it left.
    ///
    /// The ring head moves to the removed process's successor, so a
    /// dispatch right after the active process blocks picks up where it
    /// left off.
    pub(crate) fn remove_ready_queue(&mut self, pid: Pid) {
        let p = self.procs.get(pid);
        let slot = p.pid.slot;
        let prio = p.priority;
        assert!(prio < MAX_READY_QUEUES, "{pid} has priority {prio}");
        let (Some(next), Some(prev)) = (p.next, p.prev) else {
            panic!("{pid} is not on a ready queue");
        };

        if next == slot {
            self.ready[prio] = None;
        } else {
            self.procs.by_slot_mut(prev).next = Some(next);
            self.procs.by_slot_mut(next).prev = Some(prev);
            self.ready[prio] = Some(next);
        }
        let p = self.procs.by_slot_mut(slot);
        p.next = None;
        p.prev = None;
    }

    /// Picks the next process to run: the highest non-empty priority
    /// wins; within it, the active process's ring successor if the
    /// active process is READY at that level, the ring head otherwise.
    ///
    /// The idle process guarantees a winner always exists.
    pub(crate) fn dispatcher(&self) -> Pid {
        let mut winner = None;
        for prio in (0..MAX_READY_QUEUES).rev() {
            if let Some(head) = self.ready[prio] {
                winner = Some((prio, head));
                break;
            }
        }
        let (prio, head) = winner.expect("ready set is empty; idle process is missing");

        let a = self.procs.get(self.active);
        let slot = if a.priority == prio && a.state == ProcState::Ready {
            a.next.expect("active READY process is not queued")
        } else {
            head
        };
        self.procs.by_slot(slot).pid
    }
}
