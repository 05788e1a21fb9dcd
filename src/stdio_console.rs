use std::io::Write;

use crossterm::style::Stylize;
use riscv_asm_emulator::Console;

/// Program output goes to stdout, runtime errors to stderr in red.
#[derive(Debug, Default)]
pub struct StdioConsole;

impl StdioConsole {
    pub fn new() -> Self {
        Self
    }
}

impl Console for StdioConsole {
    fn write(&mut self, text: &str) {
        let mut stdout = std::io::stdout().lock();
        // a closed stdout only loses program output
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    fn error(&mut self, message: &str) {
        eprintln!("{}", format!("error: {message}").red());
    }
}
