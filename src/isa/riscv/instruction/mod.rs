pub(super) mod exec_function;
pub mod exec_mapping;

use crate::{
    config::arch_config::WordType,
    console::Console,
    isa::riscv::executor::{RV32CPU, RuntimeError},
};

/// Instructions the interpreter executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiscvInstr {
    // R
    ADD,
    SUB,
    SLL,
    SLT,
    SLTU,
    XOR,
    SRL,
    SRA,
    OR,
    AND,

    // I
    ADDI,
    SLTI,
    SLTIU,
    XORI,
    ORI,
    ANDI,
    SLLI,
    SRLI,
    SRAI,
    ADDIW,
    JALR,

    LB,
    LH,
    LW,
    LD,
    LBU,
    LHU,

    // S
    SB,
    SH,
    SW,
    SD,

    // B
    BEQ,
    BNE,
    BLT,
    BGE,
    BLTU,
    BGEU,

    JAL,
    LUI,
    AUIPC,

    ECALL,
    EBREAK,
}

/// Operand fields of a decoded instruction.
///
/// `imm` is already sign extended to the register width. For U-type it holds the upper
/// 20 bits in place (`raw & 0xfffff000`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RVInstrInfo {
    None,
    R { rs1: u8, rs2: u8, rd: u8 },
    I { rs1: u8, rd: u8, imm: WordType },
    S { rs1: u8, rs2: u8, imm: WordType },
    B { rs1: u8, rs2: u8, imm: WordType },
    U { rd: u8, imm: WordType },
    J { rd: u8, imm: WordType },
}

/// `Ok(true)` keeps a run going, `Ok(false)` asks the run loop to stop after this step.
pub(crate) type ExecResult = Result<bool, RuntimeError>;

pub(crate) type ExecFn = fn(RVInstrInfo, &mut RV32CPU, &mut dyn Console) -> ExecResult;

/// Runs `f` and advances pc by 4 once it succeeded.
#[inline(always)]
pub(super) fn normal_exec<F>(cpu: &mut RV32CPU, f: F) -> ExecResult
where
    F: FnOnce(&mut RV32CPU) -> Result<(), RuntimeError>,
{
    f(cpu)?;
    cpu.pc = cpu.pc.wrapping_add(4);
    Ok(true)
}
