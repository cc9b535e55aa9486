//! The hosted machine: one kernel instance, its critical-section
//! discipline, and the per-process system-call surface.
//!
//! All shared kernel state sits behind a single non-reentrant mutex -
//! the hosted stand-in for "disable interrupts around the critical
//! section". Exactly one process holds the CPU at a time: every other
//! process thread is parked on its continuation, and `resign` is the
//! only place control passes from one continuation to another. The
//! idle process (slot 0) has no thread; while it "runs", the machine
//! is quiescent and the driver side (`run_until_idle`,
//! `raise_interrupt`) is in charge.
//!
//! Interrupt delivery while a non-idle process is mid-run cannot
//! preempt its thread; the woken waiter is queued and the switch
//! happens at the running process's next suspension point. At every
//! suspension point the ordering is exactly the bare-metal one.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

use log::trace;

use crate::{
    console::Console,
    context::Context,
    error::KernelError,
    interrupt::InterruptLine,
    kernel::Kernel,
    param::PROC_STACK_SIZE,
    port::{Payload, PortId},
    proc::{Pid, ProcState},
    timer,
};

/// A booted machine. Clones share the same kernel.
#[derive(Clone)]
pub struct Machine {
    mach: Arc<Mach>,
}

pub(crate) struct Mach {
    kernel: Mutex<Kernel>,
    /// The idle process's continuation; the driver parks here while
    /// any other process holds the CPU.
    idle: Context,
}

impl Mach {
    /// Enters the critical section. A poisoned lock means a previous
    /// invariant violation already halted the machine, which halts
    /// every later entry too.
    pub(crate) fn cpu(&self) -> MutexGuard<'_, Kernel> {
        self.kernel
            .lock()
            .expect("machine halted by an earlier invariant violation")
    }

    /// Publishes `next` as the active process and resumes its
    /// continuation. Must run inside the critical section.
    fn activate(k: &mut Kernel, next: Pid) {
        if k.active != next {
            trace!("context switch {} -> {next}", k.active);
        }
        k.active = next;
        k.procs.get(next).context.resume();
    }

    /// The single suspension point: dispatches the next process,
    /// transfers control to it, and parks the caller until it is
    /// dispatched again. Returns with the critical section re-entered.
    fn resign<'a>(
        mach: &'a Mach,
        mut k: MutexGuard<'a, Kernel>,
        pid: Pid,
    ) -> MutexGuard<'a, Kernel> {
        let next = k.dispatcher();
        Self::activate(&mut k, next);
        let ctx = k.procs.get(pid).context.clone();
        drop(k);
        ctx.wait();
        let k = mach.cpu();
        debug_assert_eq!(k.active, pid);
        k
    }

    /// Terminates the calling process: marks it a zombie, hands the
    /// CPU to the dispatcher's pick, and lets the thread run out.
    fn exit_current(mach: &Mach, pid: Pid) {
        let mut k = mach.cpu();
        assert_eq!(
            k.active, pid,
            "exit from a process that does not hold the CPU"
        );
        k.mark_zombie();
        let next = k.dispatcher();
        Self::activate(&mut k, next);
    }

    /// `create_process`: allocates the process and its home port, and
    /// spins up the fixed-stack thread that backs its continuation.
    /// The new process is READY but does not run until dispatched.
    fn spawn<A, F>(
        mach: &Arc<Mach>,
        name: &str,
        priority: usize,
        arg: A,
        entry: F,
    ) -> Result<PortId, KernelError>
    where
        A: Send + 'static,
        F: FnOnce(Api, A) + Send + 'static,
    {
        let (pid, port, ctx) = {
            let mut k = mach.cpu();
            let (pid, port) = k.create_process(name, priority)?;
            let ctx = k.procs.get(pid).context.clone();
            (pid, port, ctx)
        };

        let mach = Arc::clone(mach);
        thread::Builder::new()
            .name(format!("{pid}-{name}"))
            .stack_size(PROC_STACK_SIZE)
            .spawn(move || {
                // Park until dispatched for the first time.
                ctx.wait();
                let api = Api {
                    mach: Arc::clone(&mach),
                    pid,
                };
                entry(api, arg);
                // Returning from the entry terminates the process.
                Self::exit_current(&mach, pid);
            })
            .expect("failed to back a process with a thread");
        Ok(port)
    }
}

impl Machine {
    /// Boots a machine: a fresh kernel with only the idle process.
    pub fn new() -> Self {
        let kernel = Kernel::new();
        let idle = kernel.procs.get(kernel.active).context.clone();
        Self {
            mach: Arc::new(Mach {
                kernel: Mutex::new(kernel),
                idle,
            }),
        }
    }

    /// Creates a process and returns its home port - the caller's
    /// contact address for it. `entry` runs as `entry(api, arg)` on
    /// the process's own fixed-size stack once the dispatcher first
    /// picks it.
    pub fn spawn<A, F>(
        &self,
        name: &str,
        priority: usize,
        arg: A,
        entry: F,
    ) -> Result<PortId, KernelError>
    where
        A: Send + 'static,
        F: FnOnce(Api, A) + Send + 'static,
    {
        Mach::spawn(&self.mach, name, priority, arg, entry)
    }

    /// Delivers a firing of `line` - the interrupt-controller
    /// boundary. The handler wakes the registered waiter (no waiter is
    /// a fatal spurious interrupt) and runs the dispatcher, so the
    /// "interrupt return" may hand the CPU to a different process than
    /// the one interrupted.
    pub fn raise_interrupt(&self, line: InterruptLine) {
        let mut k = self.mach.cpu();
        k.handle_interrupt(line);
        if k.active == k.idle_pid() {
            let next = k.dispatcher();
            if next != k.active {
                Mach::activate(&mut k, next);
            }
        }
    }

    /// Runs the machine until the idle process holds the CPU again,
    /// i.e. every other process is blocked. This is the driver-side
    /// resign: call it after spawning processes or raising interrupts.
    pub fn run_until_idle(&self) {
        loop {
            let mut k = self.mach.cpu();
            if k.active == k.idle_pid() {
                let next = k.dispatcher();
                if next == k.active {
                    return;
                }
                Mach::activate(&mut k, next);
            }
            drop(k);
            self.mach.idle.wait();
        }
    }

    /// Current run state of a process.
    pub fn state_of(&self, pid: Pid) -> ProcState {
        self.mach.cpu().procs.get(pid).state
    }

    /// The process that owns `port`.
    pub fn owner_of(&self, port: PortId) -> Pid {
        self.mach.cpu().ports.get(port).owner
    }

    /// A formatted table of all live processes.
    pub fn process_listing(&self) -> String {
        let k = self.mach.cpu();
        let mut out = String::new();
        k.write_listing(&mut out)
            .expect("writing to a String cannot fail");
        out
    }

    /// Writes the process table through the console capability.
    pub fn print_processes(&self, console: &mut dyn Console) {
        console.write(&self.process_listing());
    }

    pub(crate) fn set_timer_port(&self, port: PortId) {
        self.mach.cpu().timer_port = Some(port);
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// A process's handle onto the kernel. Every process entry receives
/// one; all system calls go through it, and each call asserts that the
/// caller actually holds the CPU.
pub struct Api {
    mach: Arc<Mach>,
    pid: Pid,
}

impl Api {
    /// The calling process's own handle.
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub(crate) fn enter(&self) -> MutexGuard<'_, Kernel> {
        let k = self.mach.cpu();
        assert_eq!(
            k.active, self.pid,
            "kernel call from a process that does not hold the CPU"
        );
        k
    }

    /// Creates a child process; see [`Machine::spawn`].
    pub fn spawn<A, F>(
        &self,
        name: &str,
        priority: usize,
        arg: A,
        entry: F,
    ) -> Result<PortId, KernelError>
    where
        A: Send + 'static,
        F: FnOnce(Api, A) + Send + 'static,
    {
        Mach::spawn(&self.mach, name, priority, arg, entry)
    }

    /// Creates an additional port owned by the calling process.
    pub fn create_port(&self) -> Result<PortId, KernelError> {
        let mut k = self.enter();
        k.create_new_port(self.pid)
    }

    pub fn open_port(&self, port: PortId) {
        self.enter().open_port(port);
    }

    pub fn close_port(&self, port: PortId) {
        self.enter().close_port(port);
    }

    /// Blocking call-with-reply: hands `data` to the port's owner and
    /// parks until the owner calls [`reply`](Self::reply).
    pub fn send(&self, port: PortId, data: Payload) {
        let mut k = self.enter();
        k.do_send(port, data);
        drop(Mach::resign(&self.mach, k, self.pid));
    }

    /// Blocking fire-and-continue: hands `data` to the port's owner;
    /// receipt alone completes the call, no reply owed.
    pub fn message(&self, port: PortId, data: Payload) {
        let mut k = self.enter();
        k.do_message(port, data);
        drop(Mach::resign(&self.mach, k, self.pid));
    }

    /// Waits for the next sender on any of the caller's open ports and
    /// returns its handle and payload. A `send`er is left waiting for
    /// [`reply`](Self::reply); a `message`r continues on its own.
    pub fn receive(&self) -> (Pid, Payload) {
        let mut k = self.enter();
        match k.do_receive() {
            Some(rendezvous) => rendezvous,
            None => {
                let mut k = Mach::resign(&self.mach, k, self.pid);
                k.take_rendezvous()
            }
        }
    }

    /// Releases a sender parked by [`send`](Self::send), then yields.
    pub fn reply(&self, sender: Pid) {
        let mut k = self.enter();
        k.do_reply(sender);
        drop(Mach::resign(&self.mach, k, self.pid));
    }

    /// Parks the caller until `line` fires. At most one waiter per
    /// line.
    pub fn wait_for_interrupt(&self, line: InterruptLine) {
        let mut k = self.enter();
        k.register_intr_waiter(line);
        drop(Mach::resign(&self.mach, k, self.pid));
    }

    /// Voluntarily yields the CPU to the dispatcher's next pick;
    /// same-priority peers get their turn first.
    pub fn yield_now(&self) {
        let k = self.enter();
        drop(Mach::resign(&self.mach, k, self.pid));
    }

    /// The caller's home port, created with the process itself (the
    /// oldest entry on its ownership list).
    pub fn home_port(&self) -> PortId {
        let k = self.enter();
        let mut cursor = k.procs.get(self.pid).first_port;
        let mut last = None;
        while let Some(slot) = cursor {
            let port = k.ports.by_slot(slot);
            last = Some(port.id);
            cursor = port.next_owned;
        }
        last.expect("process owns no ports")
    }

    /// Parks the caller for `ticks` timer ticks via the timer service.
    pub fn sleep(&self, ticks: u32) {
        timer::sleep(self, ticks);
    }
}
