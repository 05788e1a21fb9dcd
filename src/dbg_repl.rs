use clap::{Parser, Subcommand};

use crossterm::style::Stylize;
use lazy_static::lazy_static;
use riscv_asm_emulator::{
    Catalog, Emulator, RunOutcome, StopHandle,
    config::arch_config::{REGFILE_CNT, WordType},
    isa::riscv::catalog::RegClass,
};
use rustyline::error::ReadlineError;

use crate::stdio_console::StdioConsole;

#[derive(Debug, Parser)]
#[command(multicall = true)]
enum Cli {
    /// Print items such as registers, the PC, or memory.
    #[command(alias = "p", subcommand)]
    Print(PrintCmd),

    /// Display a given item each time the program stops.
    #[command(alias = "d", subcommand)]
    Display(PrintCmd),

    /// Cancel a display request.
    #[command(subcommand)]
    Undisplay(PrintCmd),

    /// List assembly around the current position.
    #[command(aliases = ["l", "ls"])]
    List,

    /// Step a single instruction.
    #[command(aliases = ["s", "step"])]
    Si {
        #[arg(default_value_t = 1)]
        count: u64,
    },

    /// Undo the last steps.
    #[command(aliases = ["bs", "back"])]
    StepBack {
        #[arg(default_value_t = 1)]
        count: u64,
    },

    /// Continue running until a breakpoint, `ebreak`, an error or the exit.
    #[command(name = "continue", aliases = ["c"])]
    Continue,

    /// Set or delete a breakpoint.
    #[command(name = "break", alias = "b")]
    Breakpoint {
        #[arg(short = 'd', long = "delete")]
        delete: bool,
        /// Address to set/delete the breakpoint; decimal by default, or hex if prefixed with `0x`.
        addr: String,
    },

    /// Show information such as breakpoints.
    #[command(subcommand)]
    Info(InfoCmd),

    /// Restart the program from its entry point.
    Reset,

    /// Quit the debugger
    #[command(name = "quit", aliases = ["q", "exit"]) ]
    Quit,
}

#[derive(Debug, Subcommand)]
enum PrintCmd {
    /// Program counter
    Pc,
    /// General-purpose register
    Reg {
        /// Register name
        reg: String,
    },
    /// Some general-purpose registers
    Regs {
        /// Starting register index
        #[arg(long, default_value_t = 0)]
        start: u8,
        /// Number of registers
        #[arg(short, long, default_value_t = REGFILE_CNT as u8)]
        len: u8,
    },
    /// Memory
    Mem {
        addr: String,
        #[arg(short, long, default_value_t = 16)]
        len: u32,
    },
    /// Floating-point register
    FReg { reg: String },
}

#[derive(Debug, Subcommand)]
enum InfoCmd {
    #[command(aliases = ["b", "bp", "break"])]
    Breakpoints,
}

const PROMPT: &str = "(rvdb) ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrintObject {
    Pc,
    Reg(u8),
    Regs(u8, u8),
    Mem(WordType, u32),
    FReg(u8),
}

pub struct DebugREPL<'a> {
    emu: &'a mut Emulator<StdioConsole>,
    watch_list: Vec<PrintObject>,
    editor: rustyline::DefaultEditor,
}

impl<'a> DebugREPL<'a> {
    pub fn new(emu: &'a mut Emulator<StdioConsole>) -> Result<Self, ReadlineError> {
        Ok(DebugREPL {
            emu,
            watch_list: Vec::new(),
            editor: rustyline::DefaultEditor::new()?,
        })
    }

    pub fn run(&mut self) {
        let mut last_line = String::new();
        loop {
            match self.editor.readline(PROMPT) {
                Ok(line) => {
                    let mut line = line.trim();

                    if line.is_empty() {
                        if last_line.is_empty() {
                            continue;
                        } else {
                            line = last_line.as_str();
                        }
                    } else {
                        last_line = line.to_string();
                        let _ = self.editor.add_history_entry(line);
                    }

                    match self.respond(line) {
                        Ok(quit) => {
                            if quit {
                                break;
                            }
                        }
                        Err(err) => {
                            eprintln!("{}", err);
                        }
                    }
                }

                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    break;
                }

                Err(ex) => {
                    eprintln!("Error occurred while reading line: {}", ex);
                }
            }
        }
    }

    fn handle_step(&mut self, count: u64) -> Result<(), String> {
        for _ in 0..count {
            if !self.emu.step() {
                break;
            }
        }
        self.report_stop();
        self.show_watch_list()
    }

    fn handle_continue(&mut self) -> Result<(), String> {
        match self.emu.run_to_end(&StopHandle::new()) {
            RunOutcome::Breakpoint { pc } => {
                println!(
                    "breakpoint hit at pc = {}: {}",
                    format_addr(pc),
                    self.asm_formatted_at(pc)
                );
            }
            RunOutcome::Paused => {
                println!("paused by ebreak");
                self.report_stop();
            }
            // the console already printed the exit notice or the error
            _ => {}
        }
        self.show_watch_list()
    }

    fn report_stop(&self) {
        if self.emu.is_done() {
            println!("program has exited");
        } else {
            let pc = self.emu.pc();
            println!("{}: {}", format_addr(pc), self.asm_formatted_at(pc));
        }
    }

    fn show_watch_list(&self) -> Result<(), String> {
        for item in &self.watch_list {
            match *item {
                PrintObject::Pc => self.print_pc(),
                PrintObject::Reg(idx) => self.print_reg(idx),
                PrintObject::Regs(start, len) => self.print_regs(start, len)?,
                PrintObject::Mem(addr, len) => self.print_mem(addr, len),
                PrintObject::FReg(idx) => self.print_float_reg(idx),
            }
        }
        Ok(())
    }

    fn respond(&mut self, line: &str) -> Result<bool, String> {
        let argv = line.split_whitespace().map(|s| s.to_string());
        let cli = Cli::try_parse_from(argv).map_err(|e| e.to_string())?;

        match cli {
            Cli::Print(cmd) => match print_object(cmd)? {
                PrintObject::Pc => self.print_pc(),
                PrintObject::Reg(idx) => self.print_reg(idx),
                PrintObject::Regs(start, len) => self.print_regs(start, len)?,
                PrintObject::Mem(addr, len) => self.print_mem(addr, len),
                PrintObject::FReg(idx) => self.print_float_reg(idx),
            },
            Cli::Display(cmd) => {
                let item = print_object(cmd)?;
                if !self.watch_list.contains(&item) {
                    self.watch_list.push(item);
                }
            }
            Cli::Undisplay(cmd) => {
                let item = print_object(cmd)?;
                self.watch_list.retain(|&watched| watched != item);
            }

            Cli::List => {
                const LIST_INSTR: WordType = 10;

                let pc = self.emu.pc();
                let mut curr_addr = pc.saturating_sub(LIST_INSTR / 2 * 4);
                for _ in 0..LIST_INSTR {
                    if curr_addr == pc {
                        print!("{} ", palette.arrow(">"));
                    } else {
                        print!("  ");
                    }

                    println!(
                        "{}: {} {}",
                        format_addr(curr_addr),
                        self.raw_formatted_at(curr_addr),
                        self.asm_formatted_at(curr_addr)
                    );
                    curr_addr += 4;
                }
            }

            Cli::Si { count } => {
                self.handle_step(count)?;
            }

            Cli::StepBack { count } => {
                let mut undone = 0;
                while undone < count && self.emu.step_back() {
                    undone += 1;
                }
                if undone < count {
                    println!("history exhausted after {} steps", undone);
                }
                self.report_stop();
            }

            Cli::Continue => {
                self.handle_continue()?;
            }

            Cli::Info(InfoCmd::Breakpoints) => {
                println!("Breakpoints:");
                for (idx, addr) in self.emu.breakpoints().enumerate() {
                    println!(
                        "{}: {}, {}",
                        format_idx(idx),
                        format_addr(addr),
                        self.asm_formatted_at(addr),
                    );
                }
            }

            Cli::Breakpoint { delete, addr } => {
                let addr = parse_word(&addr)?;
                if delete {
                    if !self.emu.clear_breakpoint(addr) {
                        return Err(format!("no breakpoint at {}", format_addr(addr)));
                    }
                    println!(
                        "cleared breakpoint at {}: {}",
                        format_addr(addr),
                        self.asm_formatted_at(addr)
                    );
                } else {
                    self.emu.set_breakpoint(addr);
                    println!(
                        "set breakpoint at {}: {}",
                        format_addr(addr),
                        self.asm_formatted_at(addr)
                    );
                }
            }

            Cli::Reset => {
                self.emu.reset();
                self.report_stop();
            }

            Cli::Quit => return Ok(true),
        }

        Ok(false)
    }

    fn print_pc(&self) {
        println!("pc = {}", format_addr(self.emu.pc()));
    }

    fn print_reg(&self, idx: u8) {
        let val = self.emu.registers().read(idx, 0).0;
        println!(
            "{} = {}",
            palette.reg(Catalog::global().int_reg_name(idx), 5),
            format_data(val)
        );
    }

    fn print_regs(&self, start: u8, len: u8) -> Result<(), String> {
        for i in start..start.saturating_add(len) {
            if i >= REGFILE_CNT as u8 {
                return Err(String::from("register index out of range."));
            }
            print!("{:<4} ", format!("x{}.", i));
            self.print_reg(i);
        }
        Ok(())
    }

    fn print_float_reg(&self, idx: u8) {
        let regs = self.emu.float_registers();
        println!(
            "{} = {:.4} ({:.4})",
            palette.reg(Catalog::global().float_reg_name(idx), 0),
            regs.read_float(idx, 0).0,
            regs.read_double(idx),
        );
    }

    fn print_mem(&self, addr: WordType, len: u32) {
        const BYTE_PER_LINE: u32 = 16;

        let mut curr_addr = addr;
        for i in 0..len {
            if i % BYTE_PER_LINE == 0 {
                if i != 0 {
                    println!();
                }
                print!("{}: ", format_addr(curr_addr));
            }
            print!("{} ", self.read_byte_formatted(curr_addr));
            curr_addr += 1;
        }

        if len > 0 {
            println!();
        }
    }

    fn read_byte_formatted(&self, addr: WordType) -> impl std::fmt::Display {
        self.emu
            .memory()
            .read::<u8>(addr)
            .map(|b| format!("{:02x}", b))
            .unwrap_or("**".into())
    }

    fn raw_formatted_at(&self, addr: WordType) -> impl std::fmt::Display {
        match self.emu.memory().read::<u32>(addr) {
            Ok(raw) => palette.data(&format!("0x{:08x}", raw)).to_string(),
            Err(_) => palette.invalid("<invalid>").to_string(),
        }
    }

    fn asm_formatted_at(&self, addr: WordType) -> impl std::fmt::Display {
        match self.emu.disassemble_at(addr) {
            Some(asm) => palette.instr(&asm).to_string(),
            None => palette.invalid("<invalid instruction>").to_string(),
        }
    }
}

lazy_static! {
    static ref palette: OutputPalette = OutputPalette {};
}

struct OutputPalette;

impl OutputPalette {
    fn index(&self, index: &str) -> impl std::fmt::Display {
        index.yellow()
    }

    fn addr(&self, addr: &str) -> impl std::fmt::Display {
        addr.blue()
    }

    fn reg(&self, reg: &str, padding: usize) -> impl std::fmt::Display {
        format!("{:<width$}", reg, width = padding).magenta()
    }

    fn instr(&self, instr: &str) -> impl std::fmt::Display {
        instr.green()
    }

    fn arrow(&self, ch: &str) -> impl std::fmt::Display {
        ch.cyan()
    }

    fn data(&self, value: &str) -> impl std::fmt::Display {
        value.yellow()
    }

    fn invalid(&self, value: &str) -> impl std::fmt::Display {
        value.red()
    }
}

// helpers

fn print_object(cmd: PrintCmd) -> Result<PrintObject, String> {
    Ok(match cmd {
        PrintCmd::Pc => PrintObject::Pc,
        PrintCmd::Reg { reg } => PrintObject::Reg(parse_reg(&reg, RegClass::Int)?),
        PrintCmd::Regs { start, len } => PrintObject::Regs(start, len),
        PrintCmd::Mem { addr, len } => PrintObject::Mem(parse_word(&addr)?, len),
        PrintCmd::FReg { reg } => PrintObject::FReg(parse_reg(&reg, RegClass::Float)?),
    })
}

fn parse_word(s: &str) -> Result<WordType, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        WordType::from_str_radix(hex, 16).map_err(|e| e.to_string())
    } else {
        s.parse::<WordType>().map_err(|e| e.to_string())
    }
}

fn parse_reg(s: &str, class: RegClass) -> Result<u8, String> {
    match Catalog::global().register(s.trim()) {
        Some(reg) if reg.class == class => Ok(reg.index),
        _ => Err(format!("invalid register: {}", s)),
    }
}

fn format_idx(idx: usize) -> impl std::fmt::Display {
    palette.index(&idx.to_string()).to_string()
}

fn format_addr(word: WordType) -> impl std::fmt::Display {
    palette.addr(&format!("0x{:08x}", word)).to_string()
}

fn format_data(data: WordType) -> impl std::fmt::Display {
    palette.data(&format!("0x{:08x}", data)).to_string()
}
