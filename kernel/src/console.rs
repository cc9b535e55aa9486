//! The console write capability.
//!
//! The kernel never assumes a display technology; anything that can
//! take a chunk of text qualifies. The process listing and the demo
//! binary write through this trait.

use std::io::Write as _;

/// Something that can display kernel text output.
pub trait Console {
    fn write(&mut self, text: &str);
}

/// A console backed by the host's stdout.
#[derive(Debug, Default)]
pub struct StdoutConsole;

impl Console for StdoutConsole {
    fn write(&mut self, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl Console for String {
    fn write(&mut self, text: &str) {
        self.push_str(text);
    }
}
