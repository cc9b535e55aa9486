//! Ports and the rendezvous IPC protocol.
//!
//! A port is a process-owned mailbox. Senders rendezvous with the
//! owner: `send` hands a payload over and waits for an explicit reply,
//! `message` hands it over and is done the moment it is received, and
//! `receive` either completes an already-queued handoff or blocks the
//! owner until one arrives. There is no buffering beyond the one
//! in-flight payload parked in the blocked sender's parameter slot.
//!
//! Within one port, waiting senders are served strictly FIFO. Across
//! ports of one receiver, service follows the ownership list, which is
//! ordered most-recently-created first - not arrival time.
//!
//! The methods here mutate kernel state only; the suspension that
//! every IPC call ends in is the machine's job (see `machine`).

use std::any::Any;

use log::trace;

use crate::{
    error::KernelError,
    kernel::Kernel,
    param::MAX_PORTS,
    proc::{Pid, ProcState},
};

/// An owned, opaque IPC payload.
pub type Message = Box<dyn Any + Send>;

/// What travels through a rendezvous; `None` is the null message.
pub type Payload = Option<Message>;

/// Port handle: slot index plus generation tag, checked on every use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
#[display("port{slot}.{tag}")]
pub struct PortId {
    pub(crate) slot: usize,
    pub(crate) tag: u32,
}

pub(crate) struct Port {
    pub(crate) id: PortId,
    /// Set at creation, never changes.
    pub(crate) owner: Pid,
    /// Gate for receive-side availability.
    pub(crate) open: bool,
    /// FIFO wait list of blocked sender slots.
    pub(crate) head: Option<usize>,
    pub(crate) tail: Option<usize>,
    /// Next port owned by the same process.
    pub(crate) next_owned: Option<usize>,
}

pub(crate) enum PortSlot {
    Free { next_free: Option<usize> },
    Used(Port),
}

/// Fixed-capacity port arena with an intrusive free list. Ports are
/// never freed.
pub(crate) struct PortTable {
    slots: Vec<PortSlot>,
    free_head: Option<usize>,
    next_tag: u32,
}

impl PortTable {
    pub(crate) fn new() -> Self {
        let slots = (0..MAX_PORTS)
            .map(|idx| PortSlot::Free {
                next_free: (idx + 1 < MAX_PORTS).then_some(idx + 1),
            })
            .collect();
        Self {
            slots,
            free_head: Some(0),
            next_tag: 1,
        }
    }

    pub(crate) fn has_free(&self) -> bool {
        self.free_head.is_some()
    }

    fn alloc(&mut self, owner: Pid) -> Result<PortId, KernelError> {
        let slot = self.free_head.ok_or(KernelError::PortTableFull)?;
        let PortSlot::Free { next_free } = self.slots[slot] else {
            panic!("free list points at a live slot");
        };
        self.free_head = next_free;

        let id = PortId {
            slot,
            tag: self.next_tag,
        };
        self.next_tag += 1;
        self.slots[slot] = PortSlot::Used(Port {
            id,
            owner,
            open: true,
            head: None,
            tail: None,
            next_owned: None,
        });
        Ok(id)
    }

    pub(crate) fn get(&self, id: PortId) -> &Port {
        let p = self.by_slot(id.slot);
        assert_eq!(p.id, id, "stale port handle {id}");
        p
    }

    pub(crate) fn get_mut(&mut self, id: PortId) -> &mut Port {
        let p = self.by_slot_mut(id.slot);
        assert_eq!(p.id, id, "stale port handle {id}");
        p
    }

    pub(crate) fn by_slot(&self, slot: usize) -> &Port {
        match &self.slots[slot] {
            PortSlot::Used(p) => p,
            PortSlot::Free { .. } => panic!("port slot {slot} is free"),
        }
    }

    pub(crate) fn by_slot_mut(&mut self, slot: usize) -> &mut Port {
        match &mut self.slots[slot] {
            PortSlot::Used(p) => p,
            PortSlot::Free { .. } => panic!("port slot {slot} is free"),
        }
    }
}

impl Kernel {
    /// Creates a port owned by `owner` and pushes it at the front of
    /// the owner's ownership list.
    pub(crate) fn create_new_port(&mut self, owner: Pid) -> Result<PortId, KernelError> {
        let first = self.procs.get(owner).first_port;
        let id = self.ports.alloc(owner)?;
        self.ports.by_slot_mut(id.slot).next_owned = first;
        self.procs.get_mut(owner).first_port = Some(id.slot);
        Ok(id)
    }

    pub(crate) fn open_port(&mut self, id: PortId) {
        self.ports.get_mut(id).open = true;
    }

    pub(crate) fn close_port(&mut self, id: PortId) {
        self.ports.get_mut(id).open = false;
    }

    /// Appends the active process to `port`'s FIFO wait list.
    fn enqueue_blocked(&mut self, port: PortId, pid: Pid) {
        let slot = pid.slot;
        self.procs.by_slot_mut(slot).next_blocked = None;
        let tail = self.ports.get(port).tail;
        match tail {
            Some(t) => self.procs.by_slot_mut(t).next_blocked = Some(slot),
            None => self.ports.get_mut(port).head = Some(slot),
        }
        self.ports.get_mut(port).tail = Some(slot);
    }

    /// Pops the head of `port`'s wait list.
    fn dequeue_blocked(&mut self, port: PortId) -> Pid {
        let slot = self.ports.get(port).head.expect("wait list is empty");
        let next = self.procs.by_slot(slot).next_blocked;
        let p = self.ports.get_mut(port);
        p.head = next;
        if next.is_none() {
            p.tail = None;
        }
        self.procs.by_slot_mut(slot).next_blocked = None;
        self.procs.by_slot(slot).pid
    }

    /// The state half of `send`: blocking call-with-reply.
    ///
    /// If the port is open and its owner is waiting in `receive`, the
    /// payload is handed straight to the owner and the sender becomes
    /// REPLY_BLOCKED; otherwise the sender queues on the port as
    /// SEND_BLOCKED. Either way the sender leaves the ready queue and
    /// must suspend; it resumes only when the owner calls `reply`.
    pub(crate) fn do_send(&mut self, dest: PortId, data: Payload) {
        let sender = self.active;
        assert_eq!(self.procs.get(sender).state, ProcState::Ready);
        let owner = self.ports.get(dest).owner;

        if self.ports.get(dest).open && self.procs.get(owner).state == ProcState::ReceiveBlocked {
            // Owner is parked in receive(): direct handoff.
            let o = self.procs.get_mut(owner);
            o.peer = Some(sender);
            o.payload = data;
            self.procs.get_mut(sender).state = ProcState::ReplyBlocked;
            self.add_ready_queue(owner);
        } else {
            // Port closed or owner busy: wait for a receiver.
            let s = self.procs.get_mut(sender);
            s.state = ProcState::SendBlocked;
            s.payload = data;
            self.enqueue_blocked(dest, sender);
        }
        self.remove_ready_queue(sender);
        trace!("{sender} send on {dest} -> {}", self.procs.get(sender).state);
    }

    /// The state half of `message`: blocking fire-and-continue.
    ///
    /// On direct handoff the sender stays READY - no reply is owed. If
    /// it has to queue it becomes MESSAGE_BLOCKED and is made READY
    /// again the moment a `receive` dequeues it.
    pub(crate) fn do_message(&mut self, dest: PortId, data: Payload) {
        let sender = self.active;
        assert_eq!(self.procs.get(sender).state, ProcState::Ready);
        let owner = self.ports.get(dest).owner;

        if self.ports.get(dest).open && self.procs.get(owner).state == ProcState::ReceiveBlocked {
            let o = self.procs.get_mut(owner);
            o.peer = Some(sender);
            o.payload = data;
            self.add_ready_queue(owner);
        } else {
            let s = self.procs.get_mut(sender);
            s.state = ProcState::MessageBlocked;
            s.payload = data;
            self.remove_ready_queue(sender);
            self.enqueue_blocked(dest, sender);
        }
        trace!(
            "{sender} message on {dest} -> {}",
            self.procs.get(sender).state
        );
    }

    /// The state half of `receive`.
    ///
    /// Scans the active process's owned ports in ownership-list order
    /// for the first open port with a waiting sender and completes that
    /// handoff without suspending: a SEND_BLOCKED sender is left
    /// REPLY_BLOCKED (the receiver now owes it a reply), a
    /// MESSAGE_BLOCKED sender goes straight back to READY.
    ///
    /// Returns `None` if no port has a waiter; the caller is then
    /// RECEIVE_BLOCKED and off the ready queue, and must suspend and
    /// pick up the rendezvous from its parameter slots on resumption.
    pub(crate) fn do_receive(&mut self) -> Option<(Pid, Payload)> {
        let rcv = self.active;
        assert_eq!(self.procs.get(rcv).state, ProcState::Ready);
        assert!(
            self.procs.get(rcv).first_port.is_some(),
            "{rcv} receives but owns no ports"
        );

        let mut cursor = self.procs.get(rcv).first_port;
        let mut found = None;
        while let Some(slot) = cursor {
            let port = self.ports.by_slot(slot);
            if port.open && port.head.is_some() {
                found = Some(port.id);
                break;
            }
            cursor = port.next_owned;
        }

        let Some(port) = found else {
            // No pending sender anywhere: block.
            let r = self.procs.get_mut(rcv);
            r.peer = None;
            r.payload = None;
            r.state = ProcState::ReceiveBlocked;
            self.remove_ready_queue(rcv);
            trace!("{rcv} receive -> RECEIVE_BLOCKED");
            return None;
        };

        let sender = self.dequeue_blocked(port);
        let state = self.procs.get(sender).state;
        let data = self.procs.get_mut(sender).payload.take();
        match state {
            ProcState::SendBlocked => {
                self.procs.get_mut(sender).state = ProcState::ReplyBlocked;
            }
            ProcState::MessageBlocked => {
                self.add_ready_queue(sender);
            }
            other => panic!("{sender} is on {port}'s wait list in state {other}"),
        }
        trace!("{rcv} receive from {sender} on {port}");
        Some((sender, data))
    }

    /// Recovers the peer and payload a blocked `receive` was handed,
    /// from the active process's own parameter slots.
    pub(crate) fn take_rendezvous(&mut self) -> (Pid, Payload) {
        let me = self.active;
        let p = self.procs.get_mut(me);
        let peer = p.peer.take().expect("resumed receive without a sender");
        let data = p.payload.take();
        (peer, data)
    }

    /// The state half of `reply`: releases a REPLY_BLOCKED sender.
    pub(crate) fn do_reply(&mut self, sender: Pid) {
        let state = self.procs.get(sender).state;
        assert_eq!(
            state,
            ProcState::ReplyBlocked,
            "reply to {sender} in state {state}"
        );
        self.add_ready_queue(sender);
        trace!("{} reply to {sender}", self.active);
    }
}
