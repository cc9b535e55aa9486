//! The interrupt-wait mechanism.
//!
//! A process binds itself to a hardware interrupt line so that one
//! firing of that line makes exactly one waiting process runnable. At
//! most one waiter per line; the binding is one-shot and cleared the
//! moment the waiter is woken, so a second firing before anyone
//! re-registers is a spurious interrupt and halts the machine.
//!
//! The hardware side (PIC programming, vector tables) lives outside
//! this crate; `Machine::raise_interrupt` is the delivery boundary and
//! calls into [`Kernel::handle_interrupt`] by symbolic line id.

use log::debug;

use crate::{
    kernel::Kernel,
    proc::{Pid, ProcState},
};

/// Symbolic interrupt line identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumCount)]
pub enum InterruptLine {
    /// Periodic timer tick.
    Timer,
    /// Keyboard, one firing per keystroke.
    Keyboard,
    /// First serial port.
    Com1,
}

impl InterruptLine {
    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl Kernel {
    /// Registers the active process as the sole waiter on `line` and
    /// takes it off the ready queue as INTR_BLOCKED. The caller must
    /// suspend afterwards; the process resumes when the line fires.
    pub(crate) fn register_intr_waiter(&mut self, line: InterruptLine) {
        let me = self.active;
        assert!(
            self.intr[line.index()].is_none(),
            "interrupt line {line} already has a waiter"
        );
        self.intr[line.index()] = Some(me);
        self.remove_ready_queue(me);
        self.procs.get_mut(me).state = ProcState::IntrBlocked;
    }

    /// The handler body for a firing of `line`: wakes the registered
    /// waiter and clears the binding. Exactly one INTR_BLOCKED waiter
    /// must be registered; anything else is a spurious interrupt and
    /// fatal.
    ///
    /// Returns the woken process so the caller can run the dispatcher
    /// before "returning from the interrupt".
    pub(crate) fn handle_interrupt(&mut self, line: InterruptLine) -> Pid {
        let Some(pid) = self.intr[line.index()].take() else {
            panic!("spurious interrupt on line {line}: no waiter registered");
        };
        let state = self.procs.get(pid).state;
        assert_eq!(
            state,
            ProcState::IntrBlocked,
            "spurious interrupt on line {line}: waiter {pid} in state {state}"
        );
        self.add_ready_queue(pid);
        debug!("interrupt {line} woke {pid}");
        pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_and_wake_round_trip() {
        let mut k = Kernel::new();
        let (a, _) = k.create_process("a", 5).unwrap();

        k.active = a;
        k.register_intr_waiter(InterruptLine::Timer);
        assert_eq!(k.procs.get(a).state, ProcState::IntrBlocked);
        assert!(k.procs.get(a).next.is_none());

        let woken = k.handle_interrupt(InterruptLine::Timer);
        assert_eq!(woken, a);
        assert_eq!(k.procs.get(a).state, ProcState::Ready);
    }

    #[test]
    #[should_panic(expected = "spurious interrupt")]
    fn test_binding_is_one_shot() {
        let mut k = Kernel::new();
        let (a, _) = k.create_process("a", 5).unwrap();

        k.active = a;
        k.register_intr_waiter(InterruptLine::Timer);
        k.handle_interrupt(InterruptLine::Timer);
        // Nobody re-registered: the second firing is spurious.
        k.handle_interrupt(InterruptLine::Timer);
    }

    #[test]
    #[should_panic(expected = "no waiter registered")]
    fn test_firing_with_no_waiter_is_fatal() {
        let mut k = Kernel::new();
        k.handle_interrupt(InterruptLine::Keyboard);
    }

    #[test]
    #[should_panic(expected = "already has a waiter")]
    fn test_double_registration_is_fatal() {
        let mut k = Kernel::new();
        let (a, _) = k.create_process("a", 5).unwrap();
        let (b, _) = k.create_process("b", 5).unwrap();

        k.active = a;
        k.register_intr_waiter(InterruptLine::Com1);
        k.active = b;
        k.register_intr_waiter(InterruptLine::Com1);
    }

    #[test]
    fn test_lines_are_independent() {
        let mut k = Kernel::new();
        let (a, _) = k.create_process("a", 5).unwrap();
        let (b, _) = k.create_process("b", 5).unwrap();

        k.active = a;
        k.register_intr_waiter(InterruptLine::Timer);
        k.active = b;
        k.register_intr_waiter(InterruptLine::Keyboard);

        assert_eq!(k.handle_interrupt(InterruptLine::Keyboard), b);
        assert_eq!(k.handle_interrupt(InterruptLine::Timer), a);
    }
}
