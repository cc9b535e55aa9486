//! A tiny rendezvous micro-kernel core, hosted.
//!
//! The classic teaching-kernel trio: a strict-priority round-robin
//! scheduler over cooperating processes, synchronous port-based IPC
//! (`send`/`receive`/`reply`, plus one-way `message`), and interrupt
//! waiting - with a timer service composed on top of nothing but
//! those primitives.
//!
//! Processes are backed by parked OS threads behind an opaque
//! save/resume context pair, and the whole kernel state
//! sits behind one critical-section lock, so the single-CPU ordering
//! guarantees of the bare-metal original carry over unchanged. Boot a
//! [`Machine`], [`spawn`](Machine::spawn) processes, and drive it with
//! [`run_until_idle`](Machine::run_until_idle) and
//! [`raise_interrupt`](Machine::raise_interrupt).
//!
//! # Example
//!
//! ```
//! use rondo_kernel::Machine;
//!
//! let machine = Machine::new();
//! let echo = machine
//!     .spawn("echo", 5, (), |api, ()| {
//!         let (sender, payload) = api.receive();
//!         let word = payload.unwrap().downcast::<String>().unwrap();
//!         assert_eq!(*word, "ping");
//!         api.reply(sender);
//!     })
//!     .unwrap();
//! machine
//!     .spawn("caller", 4, echo, |api, echo| {
//!         api.send(echo, Some(Box::new(String::from("ping"))));
//!     })
//!     .unwrap();
//! machine.run_until_idle();
//! ```

mod console;
mod context;
mod error;
mod interrupt;
mod kernel;
mod machine;
pub mod param;
mod port;
mod proc;
mod sched;
mod timer;

pub use self::{
    console::{Console, StdoutConsole},
    error::KernelError,
    interrupt::InterruptLine,
    machine::{Api, Machine},
    port::{Message, Payload, PortId},
    proc::{Pid, ProcState},
    timer::{SleepRequest, init_timer},
};
