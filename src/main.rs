mod dbg_repl;
mod logging;
mod stdio_console;

use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use crossterm::style::Stylize;
use log::{error, info};
use riscv_asm_emulator::{
    Emulator, EmulatorConfig, RunOutcome, SourceFile, StopHandle, assemble,
    config::{history_config, ram_config::DEFAULT_STACK_SIZE},
};

use crate::{dbg_repl::DebugREPL, logging::LogLevel, stdio_console::StdioConsole};

#[derive(Parser, Debug)]
#[command(version, about = "RV32I assembler and emulator", long_about = None)]
struct Args {
    /// Assembly source files, linked in the given order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Enable debugger REPL.
    #[arg(short = 'g', long = "debug", default_value_t = false)]
    debug: bool,

    /// Print the assembled text segment instead of running it.
    #[arg(long, default_value_t = false)]
    listing: bool,

    /// Stop after this many instructions.
    #[arg(long)]
    max_steps: Option<usize>,

    /// Stack size in bytes.
    #[arg(long, default_value_t = DEFAULT_STACK_SIZE)]
    stack_size: usize,

    /// How many steps the debugger can undo.
    #[arg(long, default_value_t = history_config::DEFAULT_CAPACITY)]
    history: usize,

    /// Switch log level.
    #[arg(value_enum, long = "loglevel", default_value_t = LogLevel::Warn)]
    log_level: LogLevel,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _logger_handle = match logging::init(args.log_level) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("failed to start logger: {}", e);
            None
        }
    };

    let mut sources = Vec::with_capacity(args.files.len());
    for path in &args.files {
        match std::fs::read_to_string(path) {
            Ok(text) => sources.push((path.display().to_string(), text)),
            Err(e) => {
                eprintln!("{}", format!("cannot read {}: {}", path.display(), e).red());
                return ExitCode::FAILURE;
            }
        }
    }
    let files: Vec<_> = sources
        .iter()
        .map(|(name, text)| SourceFile::new(name, text))
        .collect();

    let now = Instant::now();
    let program = match assemble(&files) {
        Ok(program) => program,
        Err(e) => {
            error!("assembly failed: {}", e);
            eprintln!("{}", format!("error: {}", e).red());
            return ExitCode::FAILURE;
        }
    };
    info!(
        "assembled {} text bytes and {} data bytes in {}s",
        program.text_len(),
        program.data_len(),
        now.elapsed().as_secs_f32()
    );

    if args.listing {
        print!("{}", program.listing());
        return ExitCode::SUCCESS;
    }

    let mut config = EmulatorConfig::new()
        .stack_size(args.stack_size)
        .history_capacity(args.history);
    if let Some(max_steps) = args.max_steps {
        config = config.burst_steps(max_steps);
    }
    let mut emulator = Emulator::with_config(program, StdioConsole::new(), config);

    if args.debug {
        match DebugREPL::new(&mut emulator) {
            Ok(mut repl) => repl.run(),
            Err(e) => {
                eprintln!("failed to create line editor of rvdb: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    let stop = StopHandle::new();
    let now = Instant::now();
    let outcome = if args.max_steps.is_some() {
        emulator.run(&stop)
    } else {
        emulator.run_to_end(&stop)
    };
    info!("run ended with {:?} after {}s", outcome, now.elapsed().as_secs_f32());

    match outcome {
        RunOutcome::Halted => ExitCode::SUCCESS,
        RunOutcome::Yielded => {
            eprintln!("step limit reached at pc = 0x{:08x}", emulator.pc());
            ExitCode::FAILURE
        }
        RunOutcome::Paused | RunOutcome::Breakpoint { .. } => {
            eprintln!("stopped at pc = 0x{:08x}", emulator.pc());
            ExitCode::SUCCESS
        }
        RunOutcome::Stopped | RunOutcome::Faulted(_) => ExitCode::FAILURE,
    }
}
