//! Process table: process control blocks and their fixed-capacity
//! arena.
//!
//! Processes are addressed by [`Pid`], a slot index plus a generation
//! tag; every lookup checks the tag, so a stale handle is caught as a
//! fatal invariant violation rather than silently aliasing whatever now
//! occupies the slot. Slots are handed out from an intrusive free list
//! and, deliberately, never returned to it: a process that terminates
//! stays in the table as a zombie together with its ports.

use std::fmt;

use arrayvec::ArrayString;
use log::debug;

use crate::{
    context::Context,
    error::KernelError,
    kernel::Kernel,
    param::{MAX_PROCS, MAX_READY_QUEUES, PROC_NAME_LEN},
    port::{Payload, PortId},
};

/// Process handle: a slot index plus a generation tag that catches
/// references to a slot the process no longer occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("pid{slot}.{tag}")]
pub struct Pid {
    pub(crate) slot: usize,
    pub(crate) tag: u32,
}

/// Run state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcState {
    /// On its priority's ready queue, runnable.
    Ready,
    /// Terminated; the slot is never reused.
    Zombie,
    /// Queued on a port, waiting for a receiver, then for a reply.
    SendBlocked,
    /// Handed off its request, waiting for an explicit reply.
    ReplyBlocked,
    /// Waiting for a sender on one of its own ports.
    ReceiveBlocked,
    /// Queued on a port; receipt alone will unblock it.
    MessageBlocked,
    /// Sole waiter on a hardware interrupt line.
    IntrBlocked,
}

/// Process control block.
pub(crate) struct Pcb {
    pub(crate) pid: Pid,
    pub(crate) name: ArrayString<PROC_NAME_LEN>,
    /// Ready-queue index. Immutable after creation.
    pub(crate) priority: usize,
    pub(crate) state: ProcState,
    /// Ready-ring links; `Some` exactly while the process is queued.
    pub(crate) next: Option<usize>,
    pub(crate) prev: Option<usize>,
    /// Successor on a port's wait list, while queued there.
    pub(crate) next_blocked: Option<usize>,
    /// Head of the list of ports this process owns (most recently
    /// created first).
    pub(crate) first_port: Option<usize>,
    /// Rendezvous parameter slots, meaningful only during a handoff.
    pub(crate) peer: Option<Pid>,
    pub(crate) payload: Payload,
    /// Saved execution state while not running.
    pub(crate) context: Context,
}

pub(crate) enum ProcSlot {
    Free { next_free: Option<usize> },
    Used(Pcb),
}

/// Fixed-capacity process arena with an intrusive free list.
pub(crate) struct ProcTable {
    slots: Vec<ProcSlot>,
    free_head: Option<usize>,
    next_tag: u32,
}

impl ProcTable {
    pub(crate) fn new() -> Self {
        let slots = (0..MAX_PROCS)
            .map(|idx| ProcSlot::Free {
                next_free: (idx + 1 < MAX_PROCS).then_some(idx + 1),
            })
            .collect();
        Self {
            slots,
            free_head: Some(0),
            next_tag: 1,
        }
    }

    /// Takes a slot off the free list and initializes a READY process
    /// in it. The caller is responsible for queueing it.
    pub(crate) fn alloc(&mut self, name: &str, priority: usize) -> Result<Pid, KernelError> {
        let Ok(name) = ArrayString::from(name) else {
            panic!("process name too long: {name:?}");
        };
        let slot = self.free_head.ok_or(KernelError::ProcessTableFull)?;
        let ProcSlot::Free { next_free } = self.slots[slot] else {
            panic!("free list points at a live slot");
        };
        self.free_head = next_free;

        let pid = Pid {
            slot,
            tag: self.next_tag,
        };
        self.next_tag += 1;
        self.slots[slot] = ProcSlot::Used(Pcb {
            pid,
            name,
            priority,
            state: ProcState::Ready,
            next: None,
            prev: None,
            next_blocked: None,
            first_port: None,
            peer: None,
            payload: None,
            context: Context::new(),
        });
        Ok(pid)
    }

    /// Looks up a process by handle; a stale or never-issued handle is
    /// fatal.
    pub(crate) fn get(&self, pid: Pid) -> &Pcb {
        let p = self.by_slot(pid.slot);
        assert_eq!(p.pid, pid, "stale process handle {pid}");
        p
    }

    pub(crate) fn get_mut(&mut self, pid: Pid) -> &mut Pcb {
        let p = self.by_slot_mut(pid.slot);
        assert_eq!(p.pid, pid, "stale process handle {pid}");
        p
    }

    pub(crate) fn by_slot(&self, slot: usize) -> &Pcb {
        match &self.slots[slot] {
            ProcSlot::Used(p) => p,
            ProcSlot::Free { .. } => panic!("process slot {slot} is free"),
        }
    }

    pub(crate) fn by_slot_mut(&mut self, slot: usize) -> &mut Pcb {
        match &mut self.slots[slot] {
            ProcSlot::Used(p) => p,
            ProcSlot::Free { .. } => panic!("process slot {slot} is free"),
        }
    }

    pub(crate) fn iter_live(&self) -> impl Iterator<Item = &Pcb> {
        self.slots.iter().filter_map(|s| match s {
            ProcSlot::Used(p) => Some(p),
            ProcSlot::Free { .. } => None,
        })
    }
}

impl Kernel {
    /// Creates a process: allocates a slot, gives it its home port,
    /// queues it READY, and returns the home port as the caller's
    /// contact address for the new process.
    ///
    /// The process does not start running here; the dispatcher picks it
    /// up at the next switch.
    pub(crate) fn create_process(
        &mut self,
        name: &str,
        priority: usize,
    ) -> Result<(Pid, PortId), KernelError> {
        assert!(
            (1..MAX_READY_QUEUES).contains(&priority),
            "priority {priority} out of range"
        );
        if !self.ports.has_free() {
            return Err(KernelError::PortTableFull);
        }
        let pid = self.procs.alloc(name, priority)?;
        let port = self.create_new_port(pid)?;
        self.add_ready_queue(pid);
        debug!("created {pid} ({name}) at priority {priority}, home port {port}");
        Ok((pid, port))
    }

    /// Terminates the active process. Its slot, stack and ports are
    /// never reclaimed.
    pub(crate) fn mark_zombie(&mut self) {
        let me = self.active;
        self.procs.get_mut(me).state = ProcState::Zombie;
        self.remove_ready_queue(me);
        debug!("{me} exited");
    }

    /// Writes a table of all live processes, one line per slot.
    pub(crate) fn write_listing(&self, w: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(w, "State            Active Prio Name")?;
        writeln!(w, "------------------------------------------------")?;
        for p in self.procs.iter_live() {
            let state = p.state.to_string();
            let marker = if p.pid == self.active { "*" } else { "" };
            writeln!(w, "{state:<16} {marker:<6} {:>4} {}", p.priority, p.name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_assigns_distinct_tags() {
        let mut procs = ProcTable::new();
        let a = procs.alloc("a", 1).unwrap();
        let b = procs.alloc("b", 1).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.tag, b.tag);
        assert_eq!(procs.get(a).name.as_str(), "a");
    }

    #[test]
    fn test_alloc_exhausts_table() {
        let mut procs = ProcTable::new();
        for idx in 0..MAX_PROCS {
            procs.alloc("p", 1).unwrap_or_else(|_| panic!("slot {idx}"));
        }
        assert_eq!(procs.alloc("p", 1), Err(KernelError::ProcessTableFull));
    }

    #[test]
    #[should_panic(expected = "stale process handle")]
    fn test_stale_handle_is_fatal() {
        let mut procs = ProcTable::new();
        let a = procs.alloc("a", 1).unwrap();
        let stale = Pid {
            slot: a.slot,
            tag: a.tag + 1,
        };
        procs.get(stale);
    }

    #[test]
    fn test_listing_shows_live_processes() {
        let mut kernel = Kernel::new();
        kernel.create_process("shell", 3).unwrap();
        let mut out = String::new();
        kernel.write_listing(&mut out).unwrap();
        assert!(out.contains("shell"));
        assert!(out.contains("READY"));
        // The idle process is the active one and carries the marker.
        assert!(out.contains("null"));
        assert!(out.contains('*'));
    }
}
