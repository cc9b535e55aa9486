//! End-to-end scenarios on a booted machine: real process threads,
//! driven from the outside through `run_until_idle` and
//! `raise_interrupt`, observed at quiescence.

use std::sync::{Arc, Mutex};

use rondo_kernel::{InterruptLine, KernelError, Machine, ProcState, param};

type EventLog = Arc<Mutex<Vec<String>>>;

fn push(events: &EventLog, event: impl Into<String>) {
    events.lock().unwrap().push(event.into());
}

fn taken(events: &EventLog) -> Vec<String> {
    events.lock().unwrap().clone()
}

#[test]
fn rendezvous_parks_sender_until_reply() {
    let machine = Machine::new();
    let events: EventLog = Arc::default();

    let ev = Arc::clone(&events);
    let server = machine
        .spawn("server", 5, (), move |api, ()| {
            let (sender, payload) = api.receive();
            let n = *payload.unwrap().downcast::<u32>().unwrap();
            push(&ev, format!("served {n}"));
            // Hold the sender until the driver fires the keyboard line.
            api.wait_for_interrupt(InterruptLine::Keyboard);
            api.reply(sender);
        })
        .unwrap();

    let ev = Arc::clone(&events);
    let client_port = machine
        .spawn("client", 4, server, move |api, server| {
            push(&ev, "calling");
            api.send(server, Some(Box::new(42_u32)));
            push(&ev, "returned");
        })
        .unwrap();
    let client = machine.owner_of(client_port);

    machine.run_until_idle();
    // Handoff done, reply still owed: the client stays parked.
    assert_eq!(machine.state_of(client), ProcState::ReplyBlocked);
    assert_eq!(taken(&events), ["calling", "served 42"]);

    machine.raise_interrupt(InterruptLine::Keyboard);
    machine.run_until_idle();
    assert_eq!(machine.state_of(client), ProcState::Zombie);
    assert_eq!(taken(&events), ["calling", "served 42", "returned"]);
}

#[test]
fn message_completes_on_receipt_without_reply() {
    let machine = Machine::new();
    let events: EventLog = Arc::default();

    let ev = Arc::clone(&events);
    // Lower priority than the messenger, so the message queues first.
    let server = machine
        .spawn("server", 3, (), move |api, ()| {
            let (_, payload) = api.receive();
            let word = payload.unwrap().downcast::<&'static str>().unwrap();
            push(&ev, format!("got {word}"));
        })
        .unwrap();

    let ev = Arc::clone(&events);
    let messenger_port = machine
        .spawn("messenger", 4, server, move |api, server| {
            api.message(server, Some(Box::new("ding")));
            push(&ev, "continued");
        })
        .unwrap();
    let messenger = machine.owner_of(messenger_port);

    machine.run_until_idle();
    // Receipt alone released the messenger; nobody ever replied.
    assert_eq!(taken(&events), ["got ding", "continued"]);
    assert_eq!(machine.state_of(messenger), ProcState::Zombie);
}

#[test]
fn waiting_senders_are_served_fifo() {
    let machine = Machine::new();
    let events: EventLog = Arc::default();

    let ev = Arc::clone(&events);
    let server = machine
        .spawn("server", 2, (), move |api, ()| {
            for _ in 0..2 {
                let (sender, payload) = api.receive();
                let who = payload.unwrap().downcast::<&'static str>().unwrap();
                push(&ev, format!("serve {who}"));
                api.reply(sender);
            }
        })
        .unwrap();

    for (name, priority) in [("first", 5), ("second", 4)] {
        let ev = Arc::clone(&events);
        machine
            .spawn(name, priority, server, move |api, server| {
                push(&ev, format!("call {name}"));
                api.send(server, Some(Box::new(name)));
                push(&ev, format!("done {name}"));
            })
            .unwrap();
    }

    machine.run_until_idle();
    assert_eq!(
        taken(&events),
        [
            "call first",
            "call second",
            "serve first",
            "done first",
            "serve second",
            "done second",
        ]
    );
}

#[test]
fn yield_alternates_same_priority_peers() {
    let machine = Machine::new();
    let events: EventLog = Arc::default();

    for name in ["a", "b"] {
        let ev = Arc::clone(&events);
        machine
            .spawn(name, 5, (), move |api, ()| {
                for _ in 0..3 {
                    push(&ev, name);
                    api.yield_now();
                }
            })
            .unwrap();
    }

    machine.run_until_idle();
    assert_eq!(taken(&events), ["a", "b", "a", "b", "a", "b"]);
}

#[test]
fn higher_priority_runs_first() {
    let machine = Machine::new();
    let events: EventLog = Arc::default();

    let ev = Arc::clone(&events);
    machine
        .spawn("low", 2, (), move |_api, ()| push(&ev, "low"))
        .unwrap();
    let ev = Arc::clone(&events);
    machine
        .spawn("high", 6, (), move |_api, ()| push(&ev, "high"))
        .unwrap();

    machine.run_until_idle();
    // Spawn order loses to priority.
    assert_eq!(taken(&events), ["high", "low"]);
}

#[test]
fn process_table_exhaustion_is_reported() {
    let machine = Machine::new();

    // Slot 0 belongs to the idle process.
    for i in 1..param::MAX_PROCS {
        machine.spawn(&format!("p{i}"), 1, (), |_api, ()| {}).unwrap();
    }
    let err = machine
        .spawn("overflow", 1, (), |_api, ()| {})
        .unwrap_err();
    assert!(matches!(err, KernelError::ProcessTableFull));
}

#[test]
fn port_table_exhaustion_is_reported() {
    let machine = Machine::new();
    let created = Arc::new(Mutex::new(0_usize));

    let count = Arc::clone(&created);
    machine
        .spawn("hog", 1, (), move |api, ()| {
            loop {
                match api.create_port() {
                    Ok(_) => *count.lock().unwrap() += 1,
                    Err(err) => {
                        assert!(matches!(err, KernelError::PortTableFull));
                        break;
                    }
                }
            }
        })
        .unwrap();
    machine.run_until_idle();

    // Everything beyond the hog's own home port.
    assert_eq!(*created.lock().unwrap(), param::MAX_PORTS - 1);
}

#[test]
#[should_panic(expected = "spurious interrupt")]
fn spurious_interrupt_halts_the_machine() {
    let machine = Machine::new();
    machine.raise_interrupt(InterruptLine::Com1);
}
