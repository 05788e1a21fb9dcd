//! Browser bindings: one [`WebSession`] per editor tab.
//!
//! Every call returns quickly. `run` executes a single burst, so the page keeps control
//! between bursts and can call `stop` from a button handler.

use wasm_bindgen::prelude::*;

use crate::{
    BufferConsole, Emulator, EmulatorConfig, RunOutcome, SourceFile, StopHandle, assemble,
    config::arch_config::REGFILE_CNT,
};

#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(log::Level::Info));
}

#[wasm_bindgen]
pub struct WebSession {
    emulator: Option<Emulator<BufferConsole>>,
    config: EmulatorConfig,
    stop: StopHandle,
    listing: String,
}

#[wasm_bindgen]
impl WebSession {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            emulator: None,
            config: EmulatorConfig::default(),
            stop: StopHandle::new(),
            listing: String::new(),
        }
    }

    pub fn set_burst_steps(&mut self, steps: usize) {
        self.config = self.config.clone().burst_steps(steps);
    }

    pub fn set_history_capacity(&mut self, capacity: usize) {
        self.config = self.config.clone().history_capacity(capacity);
    }

    /// Assembles `sources` (paired with `names`) and loads the result.
    ///
    /// Fails with the rendered assembly error, leaving no program loaded.
    pub fn assemble(&mut self, names: Vec<String>, sources: Vec<String>) -> Result<(), JsValue> {
        self.emulator = None;
        self.listing.clear();

        let files: Vec<_> = names
            .iter()
            .zip(&sources)
            .map(|(name, text)| SourceFile::new(name, text))
            .collect();
        let program = assemble(&files).map_err(|e| JsValue::from_str(&e.to_string()))?;

        self.listing = program.listing();
        self.emulator = Some(Emulator::with_config(
            program,
            BufferConsole::new(),
            self.config.clone(),
        ));
        self.stop.clear();
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.emulator.is_some()
    }

    pub fn listing(&self) -> String {
        self.listing.clone()
    }

    pub fn step(&mut self) -> bool {
        self.emulator.as_mut().is_some_and(|emu| emu.step())
    }

    pub fn step_back(&mut self) -> bool {
        self.emulator.as_mut().is_some_and(|emu| emu.step_back())
    }

    /// One burst. Returns `yielded`, `halted`, `paused`, `stopped`, `breakpoint` or `faulted`.
    pub fn run(&mut self) -> String {
        let Some(emu) = self.emulator.as_mut() else {
            return "halted".into();
        };
        let outcome = match emu.run(&self.stop) {
            RunOutcome::Yielded => "yielded",
            RunOutcome::Halted => "halted",
            RunOutcome::Paused => "paused",
            RunOutcome::Stopped => {
                self.stop.clear();
                "stopped"
            }
            RunOutcome::Breakpoint { .. } => "breakpoint",
            RunOutcome::Faulted(_) => "faulted",
        };
        outcome.into()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn reset(&mut self) {
        if let Some(emu) = self.emulator.as_mut() {
            emu.reset();
            emu.console_mut().clear();
        }
    }

    pub fn is_done(&self) -> bool {
        self.emulator.as_ref().is_none_or(|emu| emu.is_done())
    }

    pub fn pc(&self) -> u32 {
        self.emulator.as_ref().map_or(0, |emu| emu.pc() as u32)
    }

    /// Low 32 bits of every integer register.
    pub fn registers(&self) -> Vec<i32> {
        match self.emulator.as_ref() {
            Some(emu) => emu
                .registers()
                .as_slice()
                .iter()
                .map(|&value| value as i32)
                .collect(),
            None => vec![0; REGFILE_CNT],
        }
    }

    pub fn read_word(&self, addr: u32) -> Option<u32> {
        self.emulator
            .as_ref()
            .and_then(|emu| emu.memory().read::<u32>(addr.into()).ok())
    }

    pub fn read_byte(&self, addr: u32) -> Option<u8> {
        self.emulator
            .as_ref()
            .and_then(|emu| emu.memory().read::<u8>(addr.into()).ok())
    }

    pub fn disassemble_at(&self, addr: u32) -> Option<String> {
        self.emulator
            .as_ref()
            .and_then(|emu| emu.disassemble_at(addr.into()))
    }

    pub fn set_breakpoint(&mut self, addr: u32) -> bool {
        self.emulator
            .as_mut()
            .is_some_and(|emu| emu.set_breakpoint(addr.into()))
    }

    pub fn clear_breakpoint(&mut self, addr: u32) -> bool {
        self.emulator
            .as_mut()
            .is_some_and(|emu| emu.clear_breakpoint(addr.into()))
    }

    pub fn history_len(&self) -> usize {
        self.emulator.as_ref().map_or(0, |emu| emu.history_len())
    }

    /// Program output since the last call.
    pub fn take_output(&mut self) -> String {
        self.emulator
            .as_mut()
            .map(|emu| emu.console_mut().take_output())
            .unwrap_or_default()
    }

    /// Runtime errors since the last call, one per line.
    pub fn take_errors(&mut self) -> String {
        self.emulator
            .as_mut()
            .map(|emu| emu.console_mut().take_errors().join("\n"))
            .unwrap_or_default()
    }
}

impl Default for WebSession {
    fn default() -> Self {
        Self::new()
    }
}
