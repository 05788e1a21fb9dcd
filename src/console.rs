//! Output sink of a running program.
//!
//! The emulator pushes syscall output, halt notices and runtime error reports here and nowhere
//! else. Hosts render them however they like.

use crossbeam::channel::{Receiver, Sender, unbounded};

pub trait Console {
    /// Text printed by the program.
    fn write(&mut self, text: &str);

    /// A runtime error that ended the current step or run.
    fn error(&mut self, message: &str);

    /// The program executed the exit syscall.
    fn halted(&mut self) {}
}

/// Collects everything in memory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BufferConsole {
    output: String,
    errors: Vec<String>,
    halted: bool,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Returns the collected output and clears it.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Console for BufferConsole {
    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn error(&mut self, message: &str) {
        self.errors.push(message.to_owned());
    }

    fn halted(&mut self) {
        self.halted = true;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    Output(String),
    Error(String),
    Halted,
}

/// Forwards every event over a channel, for hosts that render on another thread.
#[derive(Debug, Clone)]
pub struct ChannelConsole {
    tx: Sender<ConsoleEvent>,
}

impl ChannelConsole {
    pub fn new() -> (Self, Receiver<ConsoleEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn send(&self, event: ConsoleEvent) {
        // The receiver going away only means nobody is watching any more.
        if self.tx.send(event).is_err() {
            log::debug!("console receiver dropped");
        }
    }
}

impl Console for ChannelConsole {
    fn write(&mut self, text: &str) {
        self.send(ConsoleEvent::Output(text.to_owned()));
    }

    fn error(&mut self, message: &str) {
        self.send(ConsoleEvent::Error(message.to_owned()));
    }

    fn halted(&mut self) {
        self.send(ConsoleEvent::Halted);
    }
}
