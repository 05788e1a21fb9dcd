use crate::{
    config::{
        arch_config::{REG_SP, WordType},
        ram_config::{DEFAULT_PC_VALUE, STACK_TOP},
    },
    console::Console,
    cpu::{FloatRegFile, RegFile},
    isa::riscv::{
        decoder::{DecodeError, decode},
        instruction::{ExecResult, exec_mapping::get_exec_func},
    },
    ram::{MemError, Ram},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown instruction 0x{raw:08x} (opcode 0x{opcode:02x})")]
    UnknownInstruction { raw: u32, opcode: u8 },
    #[error("unknown syscall {0}")]
    UnknownSyscall(WordType),
    #[error(transparent)]
    Memory(#[from] MemError),
}

impl From<DecodeError> for RuntimeError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::UnknownOpcode { raw, opcode } => {
                RuntimeError::UnknownInstruction { raw, opcode }
            }
        }
    }
}

/// Architectural state of the interpreted hart.
#[derive(Debug, Clone)]
pub struct RV32CPU {
    pub(crate) reg_file: RegFile,
    pub(crate) float_reg_file: FloatRegFile,
    pub(crate) memory: Ram,
    pub(crate) pc: WordType,
    pub(crate) done: bool,
}

impl RV32CPU {
    pub fn new(memory: Ram) -> Self {
        Self {
            reg_file: RegFile::new(),
            float_reg_file: FloatRegFile::new(),
            memory,
            pc: DEFAULT_PC_VALUE,
            done: false,
        }
    }

    /// Points pc at `entry` and, if asked, `sp` at the top of the stack.
    pub fn with_entry(mut self, entry: WordType, init_sp: bool) -> Self {
        self.pc = entry;
        if init_sp {
            self.reg_file.write(REG_SP, STACK_TOP);
        }
        self
    }

    pub fn pc(&self) -> WordType {
        self.pc
    }

    pub fn reg_file(&self) -> &RegFile {
        &self.reg_file
    }

    pub fn float_reg_file(&self) -> &FloatRegFile {
        &self.float_reg_file
    }

    pub fn memory(&self) -> &Ram {
        &self.memory
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Fetches, decodes and executes one instruction.
    ///
    /// Returns whether a run may continue. A halted CPU does nothing and returns `Ok(false)`.
    /// On error nothing has been committed: pc, registers and memory are as before the call.
    pub fn step(&mut self, console: &mut dyn Console) -> ExecResult {
        if self.done {
            return Ok(false);
        }

        // IF
        let raw = self.memory.read::<u32>(self.pc)?;

        // ID
        let decoded = decode(raw)?;
        let instr = decoded.instr().ok_or(RuntimeError::UnknownInstruction {
            raw,
            opcode: decoded.opcode as u8,
        })?;
        log::trace!("{:#010x}: {:?} {:?}", self.pc, instr, decoded.info());

        // EX && MEM && WB
        let rst = get_exec_func(instr)(decoded.info(), self, console);
        self.reg_file[0] = 0;

        rst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ram_config::{DATA_BASE, TEXT_BASE},
        console::BufferConsole,
        isa::riscv::{
            cpu_tester::*,
            decoder::tests::*,
            instruction::{RVInstrInfo, RiscvInstr},
        },
        utils::sign_extend,
    };

    #[test]
    fn test_exec_arith() {
        let mut tester = ExecTester::new();

        run_test_exec(
            RiscvInstr::ADDI,
            RVInstrInfo::I {
                rd: 2,
                rs1: 3,
                imm: (-5i64) as WordType,
            },
            |builder| builder.reg(3, 10).pc(0x2000),
            |checker| checker.reg(2, 5).pc(0x2004),
        );

        for _ in 1..=100 {
            tester.test_rand_r(RiscvInstr::ADD, |lhs, rhs| lhs.wrapping_add(rhs));
            tester.test_rand_r(RiscvInstr::SUB, |lhs, rhs| lhs.wrapping_sub(rhs));
            tester.test_rand_r(RiscvInstr::XOR, |lhs, rhs| lhs ^ rhs);
            tester.test_rand_r(RiscvInstr::SLL, |lhs, rhs| lhs << (rhs & 0x3f));
            tester.test_rand_r(RiscvInstr::SRA, |lhs, rhs| {
                (lhs.cast_signed() >> (rhs & 0x3f)) as WordType
            });
            tester.test_rand_r(RiscvInstr::SLT, |lhs, rhs| {
                (lhs.cast_signed() < rhs.cast_signed()) as WordType
            });
            tester.test_rand_r(RiscvInstr::SLTU, |lhs, rhs| (lhs < rhs) as WordType);

            tester.test_rand_i(RiscvInstr::ADDI, |lhs, imm| lhs.wrapping_add(imm));
            tester.test_rand_i(RiscvInstr::ANDI, |lhs, imm| lhs & imm);
            tester.test_rand_i(RiscvInstr::SLTI, |lhs, imm| {
                (lhs.cast_signed() < imm.cast_signed()) as WordType
            });
            tester.test_rand_i(RiscvInstr::SLTIU, |lhs, imm| (lhs < imm) as WordType);
            tester.test_rand_i(RiscvInstr::ADDIW, |lhs, imm| {
                sign_extend(lhs.wrapping_add(imm) & 0xffff_ffff, 32)
            });
        }
    }

    #[test]
    fn test_slt_signedness() {
        // slt t0, t1, t2 with -1 < 1
        run_test_exec_decode(
            get_instr_r(0x33, 2, 0, 5, 6, 7),
            |builder| builder.reg(6, WordType::MAX).reg(7, 1),
            |checker| checker.reg(5, 1),
        );
        // sltu t0, t1, t2 with u64::MAX > 1
        run_test_exec_decode(
            get_instr_r(0x33, 3, 0, 5, 6, 7),
            |builder| builder.reg(6, WordType::MAX).reg(7, 1),
            |checker| checker.reg(5, 0),
        );
        // sltiu t0, t1, -1 compares against u64::MAX
        run_test_exec_decode(
            get_instr_i(0x13, 3, 5, 6, 0xfff),
            |builder| builder.reg(6, 7),
            |checker| checker.reg(5, 1),
        );
    }

    #[test]
    fn test_shift_immediates() {
        run_test_exec_decode(
            get_instr_i(0x13, 5, 5, 6, 0x400 | 4), // srai t0, t1, 4
            |builder| builder.reg(6, (-64i64) as WordType),
            |checker| checker.reg(5, (-4i64) as WordType),
        );
        run_test_exec_decode(
            get_instr_i(0x13, 5, 5, 6, 4), // srli t0, t1, 4
            |builder| builder.reg(6, 0x100),
            |checker| checker.reg(5, 0x10),
        );
        run_test_exec_decode(
            get_instr_i(0x13, 1, 5, 6, 31), // slli t0, t1, 31
            |builder| builder.reg(6, 1),
            |checker| checker.reg(5, 1 << 31),
        );
    }

    #[test]
    fn test_load_store_decode() {
        run_test_exec_decode(
            0x00812183, // lw x3, 8(x2)
            |builder| builder.reg(2, DATA_BASE).mem_base::<u32>(8, 123).pc(TEXT_BASE),
            |checker| checker.reg(3, 123).pc(TEXT_BASE + 4),
        );

        run_test_exec_decode(
            0xfec42783, // lw a5,-20(s0)
            |builder| builder.reg(8, DATA_BASE + 36).mem_base(16, 0xffff_fff0u32),
            |checker| checker.reg(15, (-16i64) as WordType),
        );

        run_test_exec_decode(
            get_instr_i(0x03, 4, 15, 8, 0), // lbu a5, 0(s0)
            |builder| builder.reg(8, DATA_BASE).mem_base(0, 0xf0u8),
            |checker| checker.reg(15, 0xf0),
        );

        run_test_exec_decode(
            0xfe112c23, // sw x1, -8(x2)
            |builder| builder.reg(2, DATA_BASE + 16).reg(1, 123),
            |checker| checker.mem_base::<u32>(8, 123),
        );

        run_test_exec_decode(
            get_instr_s(0x23, 3, 8, 1, 0), // sd ra, 0(s0)
            |builder| builder.reg(8, DATA_BASE).reg(1, 0x1122_3344_5566_7788),
            |checker| {
                checker
                    .mem_base::<u64>(0, 0x1122_3344_5566_7788)
                    .mem_base::<u8>(0, 0x88)
            },
        );
    }

    #[test]
    fn test_u_types_decode() {
        run_test_exec_decode(
            0x12233097, // auipc x1, 0x12233
            |builder| builder.reg(1, 3).pc(0x0040_1000),
            |checker| checker.reg(1, 0x1263_4000).pc(0x0040_1004),
        );

        run_test_exec_decode(
            0x123451b7, // lui x3, 0x12345
            |builder| builder.reg(3, 0x54321),
            |checker| checker.reg(3, 0x12345000),
        );

        run_test_exec_decode(
            get_instr_u(0x37, 3, 0x8000_0000), // lui x3, 0x80000
            |builder| builder,
            |checker| checker.reg(3, 0xffff_ffff_8000_0000),
        );
    }

    #[test]
    fn test_branch_decode() {
        run_test_exec_decode(
            0xf8c318e3, // bne x6, x12, -112
            |builder| builder.reg(6, 5).reg(12, 10).pc(TEXT_BASE + 0x1000),
            |checker| checker.pc(TEXT_BASE + 0x1000 - 112),
        );

        run_test_exec_decode(
            0xf8c318e3, // bne x6, x12, -112
            |builder| builder.reg(6, 5).reg(12, 5).pc(TEXT_BASE + 0x1000),
            |checker| checker.pc(TEXT_BASE + 0x1004),
        );

        run_test_exec_decode(
            get_instr_b(0x63, 6, 6, 12, 16), // bltu x6, x12, 16
            |builder| builder.reg(6, 1).reg(12, WordType::MAX),
            |checker| checker.pc(TEXT_BASE + 16),
        );
    }

    #[test]
    fn test_jump_decode() {
        run_test_exec_decode(
            0xf81ff06f, // jal x0, -128
            |builder| builder.pc(TEXT_BASE + 0x1234),
            |checker| checker.pc(TEXT_BASE + 0x1234 - 128),
        );

        run_test_exec_decode(
            get_instr_j(0x6f, 1, 8), // jal ra, 8
            |builder| builder,
            |checker| checker.pc(TEXT_BASE + 8).reg(1, TEXT_BASE + 4),
        );

        run_test_exec_decode(
            0x00078067, // jr a5
            |builder| builder.reg(15, 0x2468),
            |checker| checker.pc(0x2468),
        );

        // jalr a5, a5, 0: the target comes from the old a5
        run_test_exec_decode(
            get_instr_i(0x67, 0, 15, 15, 0),
            |builder| builder.reg(15, TEXT_BASE + 0x40),
            |checker| checker.pc(TEXT_BASE + 0x40).reg(15, TEXT_BASE + 4),
        );
    }

    #[test]
    fn test_zero_register_stays_zero() {
        run_test_exec_decode(
            0x0050_0013, // addi zero, zero, 5
            |builder| builder,
            |checker| checker.reg(0, 0).pc(TEXT_BASE + 4),
        );
    }

    #[test]
    fn test_syscalls() {
        let mut console = BufferConsole::new();
        let mut cpu = TestCPUBuilder::new()
            .reg(10, (-42i64) as WordType)
            .reg(17, 1)
            .program(&[0x73, 0x73, 0x73, 0x73])
            .build();

        assert_eq!(cpu.step(&mut console), Ok(true));
        assert_eq!(console.output(), "-42");

        cpu.reg_file.write(10, 'A' as WordType);
        cpu.reg_file.write(17, 11);
        assert_eq!(cpu.step(&mut console), Ok(true));
        assert_eq!(console.output(), "-42A");

        cpu.memory.insert_section(b"hi\0", DATA_BASE).unwrap();
        cpu.reg_file.write(10, DATA_BASE);
        cpu.reg_file.write(17, 4);
        assert_eq!(cpu.step(&mut console), Ok(true));
        assert_eq!(console.output(), "-42Ahi");

        cpu.reg_file.write(17, 10);
        assert_eq!(cpu.step(&mut console), Ok(false));
        assert!(cpu.is_done());
        assert!(console.is_halted());
        assert!(console.output().ends_with("-- program is finished running (0) --\n\n"));

        // halted: nothing moves any more
        let pc = cpu.pc();
        assert_eq!(cpu.step(&mut console), Ok(false));
        assert_eq!(cpu.pc(), pc);
    }

    #[test]
    fn test_ebreak_stops_without_halting() {
        let mut console = BufferConsole::new();
        let mut cpu = TestCPUBuilder::new().program(&[0x0010_0073]).build();

        assert_eq!(cpu.step(&mut console), Ok(false));
        assert!(!cpu.is_done());
        assert_eq!(cpu.pc(), TEXT_BASE + 4);
    }

    #[test]
    fn test_runtime_errors_leave_state_untouched() {
        let mut console = BufferConsole::new();

        // unknown syscall
        let mut cpu = TestCPUBuilder::new().reg(17, 99).program(&[0x73]).build();
        let before = cpu.clone();
        assert_eq!(cpu.step(&mut console), Err(RuntimeError::UnknownSyscall(99)));
        assert_eq!(cpu.pc(), before.pc());
        assert_eq!(cpu.reg_file(), before.reg_file());

        // unknown opcode
        let mut cpu = TestCPUBuilder::new().program(&[0xffff_ffff]).build();
        assert_eq!(
            cpu.step(&mut console),
            Err(RuntimeError::UnknownInstruction {
                raw: 0xffff_ffff,
                opcode: 0x7f,
            })
        );
        assert_eq!(cpu.pc(), TEXT_BASE);

        // lw a5, 0(s0) with s0 outside every region
        let mut cpu = TestCPUBuilder::new()
            .reg(8, 0x10)
            .program(&[get_instr_i(0x03, 2, 15, 8, 0)])
            .build();
        let before = cpu.clone();
        assert_eq!(
            cpu.step(&mut console),
            Err(RuntimeError::Memory(MemError::OutOfBoundsRead(0x10)))
        );
        assert_eq!(cpu.reg_file(), before.reg_file());
        assert_eq!(cpu.pc(), before.pc());
        assert_eq!(cpu.memory(), before.memory());

        // fetch outside every region
        let mut cpu = TestCPUBuilder::new().pc(0x8).build();
        assert_eq!(
            cpu.step(&mut console),
            Err(RuntimeError::Memory(MemError::OutOfBoundsRead(0x8)))
        );
    }
}
