//! Timer-service scenarios: the sleep protocol end to end, with the
//! test driving the timer interrupt line by hand.

use std::sync::{Arc, Mutex};

use rondo_kernel::{InterruptLine, Machine, ProcState, init_timer};

type EventLog = Arc<Mutex<Vec<String>>>;

fn push(events: &EventLog, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

fn taken(events: &EventLog) -> Vec<String> {
    events.lock().unwrap().clone()
}

#[test]
fn sleepers_wake_in_tick_order() {
    let machine = Machine::new();
    init_timer(&machine).unwrap();
    let events: EventLog = Arc::default();

    for (name, ticks) in [("three", 3_u32), ("one", 1), ("two", 2)] {
        let ev = Arc::clone(&events);
        machine
            .spawn(name, 4, ticks, move |api, ticks| {
                api.sleep(ticks);
                push(&ev, name);
            })
            .unwrap();
    }

    machine.run_until_idle();
    // Everyone is parked on the timer service; no wakeups yet.
    assert!(taken(&events).is_empty());

    machine.raise_interrupt(InterruptLine::Timer);
    machine.run_until_idle();
    assert_eq!(taken(&events), ["one"]);

    machine.raise_interrupt(InterruptLine::Timer);
    machine.run_until_idle();
    machine.raise_interrupt(InterruptLine::Timer);
    machine.run_until_idle();
    assert_eq!(taken(&events), ["one", "two", "three"]);
}

#[test]
fn sleep_zero_returns_without_a_tick() {
    let machine = Machine::new();
    init_timer(&machine).unwrap();

    let port = machine.spawn("eager", 4, (), |api, ()| api.sleep(0)).unwrap();
    let eager = machine.owner_of(port);

    machine.run_until_idle();
    assert_eq!(machine.state_of(eager), ProcState::Zombie);
}

#[test]
fn sleeping_processes_park_reply_blocked() {
    let machine = Machine::new();
    init_timer(&machine).unwrap();

    let port = machine.spawn("napper", 4, (), |api, ()| api.sleep(3)).unwrap();
    let napper = machine.owner_of(port);

    machine.run_until_idle();
    assert_eq!(machine.state_of(napper), ProcState::ReplyBlocked);

    // Not a tick early.
    for _ in 0..2 {
        machine.raise_interrupt(InterruptLine::Timer);
        machine.run_until_idle();
        assert_eq!(machine.state_of(napper), ProcState::ReplyBlocked);
    }

    machine.raise_interrupt(InterruptLine::Timer);
    machine.run_until_idle();
    assert_eq!(machine.state_of(napper), ProcState::Zombie);
}
