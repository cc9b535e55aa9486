//! The kernel state proper: one explicit object holding the process
//! table, the ready queues, the port table, the interrupt-wait table
//! and the active process.
//!
//! Every core operation is a method on [`Kernel`] and runs under the
//! machine's single critical-section lock; there are no ambient
//! globals, so several machines can coexist (the tests rely on this).
//! The methods are spread over the `sched`, `port` and `interrupt`
//! modules next to the data they work on.

use strum::EnumCount as _;

use crate::{
    interrupt::InterruptLine,
    param::{IDLE_PRIO, MAX_READY_QUEUES},
    port::{PortId, PortTable},
    proc::{Pid, ProcTable},
};

pub(crate) struct Kernel {
    pub(crate) procs: ProcTable,
    pub(crate) ports: PortTable,
    /// Heads of the per-priority ready rings.
    pub(crate) ready: [Option<usize>; MAX_READY_QUEUES],
    /// At most one registered waiter per interrupt line.
    pub(crate) intr: [Option<Pid>; InterruptLine::COUNT],
    /// The process currently holding the CPU.
    pub(crate) active: Pid,
    /// Contact address of the timer service, once started.
    pub(crate) timer_port: Option<PortId>,
}

impl Kernel {
    /// Boots a kernel whose slot 0 holds the idle process: permanently
    /// READY at the reserved lowest priority, so the dispatcher always
    /// finds a winner. It owns no ports and runs no code.
    pub(crate) fn new() -> Self {
        let mut procs = ProcTable::new();
        let idle = procs.alloc("null", IDLE_PRIO).expect("fresh process table");
        let mut kernel = Self {
            procs,
            ports: PortTable::new(),
            ready: [None; MAX_READY_QUEUES],
            intr: [None; InterruptLine::COUNT],
            active: idle,
            timer_port: None,
        };
        kernel.add_ready_queue(idle);
        kernel
    }

    pub(crate) fn idle_pid(&self) -> Pid {
        self.procs.by_slot(0).pid
    }
}
