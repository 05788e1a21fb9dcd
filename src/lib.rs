pub mod asm;
pub mod config;
pub mod console;
pub mod cpu;
pub mod history;
pub mod isa;
pub mod ram;
pub mod utils;

#[cfg(all(feature = "web", target_arch = "wasm32"))]
pub mod web;

pub use asm::{Assembler, AssemblyError, AssemblyErrorKind, Program, SourceFile, assemble};
pub use config::{EmulatorConfig, ram_config};
pub use console::{BufferConsole, ChannelConsole, Console, ConsoleEvent};
pub use isa::riscv::{Catalog, RuntimeError, decode, disassemble};

use std::{
    collections::BTreeSet,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use log::{info, warn};

use crate::{
    config::arch_config::WordType,
    cpu::{FloatRegFile, RegFile},
    history::{Snapshot, SnapshotRing},
    isa::riscv::RV32CPU,
    ram::Ram,
};

/// Cooperative cancellation flag for [`Emulator::run`], checked once per step.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a [`Emulator::run`] burst returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The burst budget ran out; call `run` again to continue.
    Yielded,
    /// The program exited.
    Halted,
    /// `ebreak`
    Paused,
    /// The stop flag was raised.
    Stopped,
    Breakpoint { pc: WordType },
    /// Already reported to the console.
    Faulted(RuntimeError),
}

/// An assembled program being executed, with step-back history and breakpoints.
pub struct Emulator<C: Console> {
    cpu: RV32CPU,
    initial: Snapshot,
    history: SnapshotRing,
    console: C,
    breakpoints: BTreeSet<WordType>,
    /// Breakpoint `run` last stopped on, skipped once when resuming.
    paused_at: Option<WordType>,
    config: EmulatorConfig,
}

impl<C: Console> Emulator<C> {
    pub fn new(program: Program, console: C) -> Self {
        Self::with_config(program, console, EmulatorConfig::default())
    }

    pub fn with_config(program: Program, console: C, config: EmulatorConfig) -> Self {
        let entry = program.entry();
        let ram = program.into_ram().with_stack(config.stack_size);
        let cpu = RV32CPU::new(ram).with_entry(entry, config.init_stack_pointer);

        Self {
            initial: Snapshot::capture(&cpu),
            history: SnapshotRing::new(config.history_capacity),
            cpu,
            console,
            breakpoints: BTreeSet::new(),
            paused_at: None,
            config,
        }
    }

    /// Executes one instruction and returns whether execution may continue.
    ///
    /// Runtime errors are written to the console and end the step with `false`.
    pub fn step(&mut self) -> bool {
        match self.try_step() {
            Ok(more) => more,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    /// Like [`step`](Self::step) but hands the error back instead of reporting it.
    ///
    /// A failed step leaves the machine and the history as they were.
    pub fn try_step(&mut self) -> Result<bool, RuntimeError> {
        if self.cpu.is_done() {
            return Ok(false);
        }

        // kept only if the step succeeds
        let before = (self.history.capacity() > 0).then(|| Snapshot::capture(&self.cpu));
        let more = self.cpu.step(&mut self.console)?;
        if let Some(snapshot) = before {
            self.history.push(snapshot);
        }
        self.paused_at = None;
        Ok(more)
    }

    /// Runs at most one burst of [`EmulatorConfig::burst_steps`] instructions.
    pub fn run(&mut self, stop: &StopHandle) -> RunOutcome {
        if self.cpu.is_done() {
            return RunOutcome::Halted;
        }

        for _ in 0..self.config.burst_steps {
            if stop.is_stopped() {
                return RunOutcome::Stopped;
            }

            let pc = self.cpu.pc();
            if self.breakpoints.contains(&pc) && self.paused_at != Some(pc) {
                self.paused_at = Some(pc);
                return RunOutcome::Breakpoint { pc };
            }

            match self.try_step() {
                Ok(true) => {}
                Ok(false) if self.cpu.is_done() => return RunOutcome::Halted,
                Ok(false) => return RunOutcome::Paused,
                Err(err) => {
                    self.report(err);
                    return RunOutcome::Faulted(err);
                }
            }
        }

        RunOutcome::Yielded
    }

    /// Calls [`run`](Self::run) until something other than a yield happens.
    pub fn run_to_end(&mut self, stop: &StopHandle) -> RunOutcome {
        loop {
            match self.run(stop) {
                RunOutcome::Yielded => continue,
                outcome => return outcome,
            }
        }
    }

    /// Undoes the most recent step. Returns `false` when the history is empty.
    pub fn step_back(&mut self) -> bool {
        match self.history.pop() {
            Some(snapshot) => {
                self.cpu = snapshot.restore();
                self.paused_at = None;
                true
            }
            None => false,
        }
    }

    /// Back to the state right after loading. Breakpoints are kept.
    pub fn reset(&mut self) {
        self.cpu = self.initial.restore();
        self.history.clear();
        self.paused_at = None;
        info!("emulator reset, pc {:#010x}", self.cpu.pc());
    }

    fn report(&mut self, err: RuntimeError) {
        let pc = self.cpu.pc();
        warn!("runtime error at {pc:#010x}: {err}");
        self.console.error(&format!("{err} (pc = {pc:#010x})"));
    }

    pub fn pc(&self) -> WordType {
        self.cpu.pc()
    }

    pub fn is_done(&self) -> bool {
        self.cpu.is_done()
    }

    pub fn registers(&self) -> &RegFile {
        self.cpu.reg_file()
    }

    pub fn float_registers(&self) -> &FloatRegFile {
        self.cpu.float_reg_file()
    }

    pub fn memory(&self) -> &Ram {
        self.cpu.memory()
    }

    pub fn cpu(&self) -> &RV32CPU {
        &self.cpu
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Number of steps that can currently be undone.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Disassembly of the word at `addr`, `None` outside memory.
    pub fn disassemble_at(&self, addr: WordType) -> Option<String> {
        self.cpu.memory().read::<u32>(addr).ok().map(disassemble)
    }

    /// Returns `false` if the breakpoint was already set.
    pub fn set_breakpoint(&mut self, addr: WordType) -> bool {
        self.breakpoints.insert(addr)
    }

    /// Returns `false` if there was no breakpoint at `addr`.
    pub fn clear_breakpoint(&mut self, addr: WordType) -> bool {
        self.breakpoints.remove(&addr)
    }

    pub fn clear_breakpoints(&mut self) {
        self.breakpoints.clear();
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = WordType> + '_ {
        self.breakpoints.iter().copied()
    }
}
