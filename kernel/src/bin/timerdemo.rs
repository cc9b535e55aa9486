//! Boot demo: a machine running the timer service and a few sleepers.
//!
//! The main thread plays the hardware: it pumps the timer interrupt
//! line at a fixed cadence and lets the machine quiesce between ticks.

use std::{thread, time::Duration};

use log::{Level, LevelFilter, Metadata, Record};
use rondo_kernel::{InterruptLine, Machine, StdoutConsole, init_timer};

struct StderrLog;

impl log::Log for StderrLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLog = StderrLog;

fn main() {
    log::set_logger(&LOGGER).expect("no logger installed yet");
    log::set_max_level(LevelFilter::Debug);

    let machine = Machine::new();
    init_timer(&machine).expect("starting the timer service");

    for (name, priority, ticks) in [("hare", 4, 2_u32), ("tortoise", 3, 5), ("dozer", 2, 8)] {
        machine
            .spawn(name, priority, ticks, move |api, ticks| {
                println!("{name}: sleeping for {ticks} ticks");
                api.sleep(ticks);
                println!("{name}: awake");
            })
            .expect("spawning a sleeper");
    }
    machine.run_until_idle();

    let mut console = StdoutConsole;
    machine.print_processes(&mut console);

    for tick in 1..=8 {
        thread::sleep(Duration::from_millis(20));
        println!("-- tick {tick}");
        machine.raise_interrupt(InterruptLine::Timer);
        machine.run_until_idle();
    }

    machine.print_processes(&mut console);
}
