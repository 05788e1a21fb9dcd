#![cfg(test)]
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

use crate::{
    config::{
        arch_config::{REGFILE_CNT, WordType},
        ram_config::{DATA_BASE, TEXT_BASE},
    },
    console::BufferConsole,
    isa::riscv::{
        decoder::decode,
        executor::RV32CPU,
        instruction::{RVInstrInfo, RiscvInstr, exec_mapping::get_exec_func},
    },
    ram::Ram,
    utils::{MemValue, sign_extend},
};

pub(super) struct TestCPUBuilder {
    cpu: RV32CPU,
}

impl TestCPUBuilder {
    pub(super) fn new() -> Self {
        Self {
            cpu: RV32CPU::new(Ram::new()),
        }
    }

    pub(super) fn reg(mut self, idx: u8, value: WordType) -> Self {
        self.cpu.reg_file.write(idx, value);
        self
    }

    pub(super) fn pc(mut self, value: WordType) -> Self {
        self.cpu.pc = value;
        self
    }

    /// Writes `value` at `DATA_BASE + offset`.
    pub(super) fn mem_base<T: MemValue>(mut self, offset: WordType, value: T) -> Self {
        self.cpu.memory.write(DATA_BASE + offset, value).unwrap();
        self
    }

    /// Places `instrs` at the start of the text segment.
    pub(super) fn program(mut self, instrs: &[u32]) -> Self {
        let mut addr = TEXT_BASE;
        for instr in instrs {
            self.cpu.memory.write(addr, *instr).unwrap();
            addr += 4;
        }
        self
    }

    pub(super) fn build(self) -> RV32CPU {
        self.cpu
    }
}

pub(super) struct CPUChecker<'a> {
    pub(super) cpu: &'a mut RV32CPU,
}

impl<'a> CPUChecker<'a> {
    pub(super) fn new(cpu: &'a mut RV32CPU) -> Self {
        Self { cpu }.reg(0, 0) // x0 is always 0
    }

    pub(super) fn reg(self, idx: u8, value: WordType) -> Self {
        assert_eq!(
            self.cpu.reg_file.read(idx, 0).0,
            value,
            "Register #{} incorrect",
            idx,
        );
        self
    }

    pub(super) fn pc(self, value: WordType) -> Self {
        assert_eq!(self.cpu.pc, value, "PC incorrect");
        self
    }

    pub(super) fn mem_base<T>(self, offset: WordType, value: WordType) -> Self
    where
        T: MemValue + Into<u64>,
    {
        let addr = DATA_BASE + offset;
        assert_eq!(
            self.cpu.memory.read::<T>(addr).unwrap().into(),
            value,
            "Memory value incorrect at {:#x}",
            addr
        );
        self
    }
}

/// Executes one already decoded instruction at the builder's pc.
pub(super) fn run_test_exec<F, G>(instr: RiscvInstr, info: RVInstrInfo, build: F, check: G)
where
    F: FnOnce(TestCPUBuilder) -> TestCPUBuilder,
    G: FnOnce(CPUChecker) -> CPUChecker,
{
    let mut cpu = build(TestCPUBuilder::new()).build();
    let mut console = BufferConsole::new();
    get_exec_func(instr)(info, &mut cpu, &mut console).unwrap();
    cpu.reg_file[0] = 0;
    check(CPUChecker::new(&mut cpu));
}

/// Decodes `raw_instr` and executes it at the builder's pc, without fetching.
pub(super) fn run_test_exec_decode<F, G>(raw_instr: u32, build: F, check: G)
where
    F: FnOnce(TestCPUBuilder) -> TestCPUBuilder,
    G: FnOnce(CPUChecker) -> CPUChecker,
{
    let decoded = decode(raw_instr).unwrap();
    let instr = decoded.instr().unwrap();
    run_test_exec(instr, decoded.info(), build, check);
}

pub(super) struct ExecTester {
    rng: ChaCha12Rng,
}

impl ExecTester {
    pub(super) fn new() -> Self {
        Self {
            rng: ChaCha12Rng::seed_from_u64(0721),
        }
    }

    pub(super) fn rand_imm12(&mut self) -> WordType {
        self.rng.random_range(0..=4095) as WordType
    }

    pub(super) fn rand_word(&mut self) -> WordType {
        self.rng.random_range(0..=WordType::MAX)
    }

    pub(super) fn rand_word2(&mut self) -> (WordType, WordType) {
        (self.rand_word(), self.rand_word())
    }

    pub(super) fn rand_reg_idx(&mut self) -> u8 {
        self.rng.random_range(1..REGFILE_CNT) as u8
    }

    pub(super) fn rand_reg_idx2(&mut self) -> (u8, u8) {
        (self.rand_reg_idx(), self.rand_reg_idx())
    }

    pub(super) fn rand_unique_reg_idx2(&mut self) -> (u8, u8) {
        let idx1 = self.rand_reg_idx();
        let mut idx2 = self.rand_reg_idx();
        while idx1 == idx2 {
            idx2 = self.rand_reg_idx();
        }
        (idx1, idx2)
    }

    pub(super) fn test_rand_r<F>(&mut self, instr: RiscvInstr, calc: F)
    where
        F: FnOnce(WordType, WordType) -> WordType,
    {
        let (lhs, rhs) = self.rand_word2();
        let rd = self.rand_reg_idx();
        let (rs1, rs2) = self.rand_unique_reg_idx2();

        run_test_exec(
            instr,
            RVInstrInfo::R { rd, rs1, rs2 },
            |builder| builder.reg(rs1, lhs).reg(rs2, rhs).pc(TEXT_BASE),
            |checker| checker.reg(rd, calc(lhs, rhs)).pc(TEXT_BASE + 4),
        );
    }

    /// `calc` receives the sign extended immediate.
    pub(super) fn test_rand_i<F>(&mut self, instr: RiscvInstr, calc: F)
    where
        F: FnOnce(WordType, WordType) -> WordType,
    {
        let lhs = self.rand_word();
        let imm = sign_extend(self.rand_imm12(), 12);
        let (rd, rs1) = self.rand_reg_idx2();

        run_test_exec(
            instr,
            RVInstrInfo::I { rd, rs1, imm },
            |builder| builder.reg(rs1, lhs).pc(TEXT_BASE),
            |checker| checker.reg(rd, calc(lhs, imm)).pc(TEXT_BASE + 4),
        );
    }
}
