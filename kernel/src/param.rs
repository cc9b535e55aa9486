//! Kernel tunables.

/// Maximum number of processes.
pub const MAX_PROCS: usize = 32;

/// Maximum number of ports.
pub const MAX_PORTS: usize = 64;

/// Number of priority levels. A process's priority doubles as the
/// index of its ready queue.
pub const MAX_READY_QUEUES: usize = 8;

/// Priority of the idle process. Reserved; `spawn` rejects it.
pub const IDLE_PRIO: usize = 0;

/// Fixed stack size handed to every process, in bytes.
pub const PROC_STACK_SIZE: usize = 64 * 1024;

/// Maximum length of a process name, in bytes.
pub const PROC_NAME_LEN: usize = 24;

/// Priority of the timer service process.
pub const TIMER_PRIO: usize = 6;

/// Priority of the timer notifier process.
pub const NOTIFIER_PRIO: usize = 7;
