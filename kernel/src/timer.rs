//! The timer service: time-based sleeping built entirely out of the
//! rendezvous primitives, with no scheduler support.
//!
//! Two cooperating processes. The notifier does nothing but wait for
//! the timer interrupt line and turn each firing into a `message` on
//! the service's port, so the interrupt handler side stays trivial.
//! The service itself owns the port, keeps one countdown per process
//! slot, and answers two kinds of payload: a [`SleepRequest`] arms the
//! sender's countdown (the sender is already parked REPLY_BLOCKED by
//! its `send`), and an empty payload is a tick that ages every armed
//! countdown and replies to the ones reaching zero.

use log::debug;

use crate::{
    error::KernelError,
    interrupt::InterruptLine,
    machine::{Api, Machine},
    param::{MAX_PROCS, NOTIFIER_PRIO, TIMER_PRIO},
    port::PortId,
    proc::Pid,
};

/// Payload of a [`sleep`](Api::sleep) call.
#[derive(Debug, Clone, Copy)]
pub struct SleepRequest {
    /// How many timer ticks to stay parked.
    pub ticks: u32,
}

/// Starts the timer service and its interrupt notifier, and runs the
/// machine until both are parked. After this returns, every timer
/// firing raised on the machine is accounted for and [`Api::sleep`]
/// works from any process. Returns the service's port.
pub fn init_timer(machine: &Machine) -> Result<PortId, KernelError> {
    let port = machine.spawn("timer", TIMER_PRIO, (), timer_process)?;
    machine.set_timer_port(port);
    machine.run_until_idle();
    Ok(port)
}

fn timer_process(api: Api, (): ()) {
    let port = api.home_port();
    api.spawn("timer_notifier", NOTIFIER_PRIO, port, timer_notifier)
        .expect("spawning the timer notifier");
    debug!("timer service listening on {port}");

    let mut sleepers: [Option<(Pid, u32)>; MAX_PROCS] = [None; MAX_PROCS];
    loop {
        let (sender, payload) = api.receive();
        match payload {
            // A tick from the notifier.
            None => {
                for entry in &mut sleepers {
                    if let Some((pid, left)) = entry {
                        *left -= 1;
                        if *left == 0 {
                            let pid = *pid;
                            *entry = None;
                            api.reply(pid);
                        }
                    }
                }
            }
            Some(msg) => {
                let Ok(req) = msg.downcast::<SleepRequest>() else {
                    panic!("timer port got a payload that is not a sleep request");
                };
                if req.ticks == 0 {
                    api.reply(sender);
                } else {
                    sleepers[sender.slot] = Some((sender, req.ticks));
                }
            }
        }
    }
}

fn timer_notifier(api: Api, timer_port: PortId) {
    loop {
        api.wait_for_interrupt(InterruptLine::Timer);
        api.message(timer_port, None);
    }
}

/// Body of [`Api::sleep`]: a plain `send` to the timer port. The reply
/// arrives when the countdown expires, so the caller parks for the
/// whole duration without touching the scheduler.
pub(crate) fn sleep(api: &Api, ticks: u32) {
    let port = {
        let k = api.enter();
        k.timer_port.expect("timer service is not running")
    };
    api.send(port, Some(Box::new(SleepRequest { ticks })));
}
