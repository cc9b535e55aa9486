//! Kernel error types.
//!
//! Only resource exhaustion at creation time is recoverable. Invariant
//! violations in the scheduler/IPC hot path halt the machine via panic;
//! the poisoned kernel lock then turns every later kernel entry into a
//! halt as well.

/// Errors returned from kernel entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// All process slots are in use.
    #[error("process table full")]
    ProcessTableFull,

    /// All port slots are in use.
    #[error("port table full")]
    PortTableFull,
}
