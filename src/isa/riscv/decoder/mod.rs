use std::fmt::Display;

use num_enum::TryFromPrimitive;

use crate::{
    config::arch_config::WordType,
    isa::riscv::instruction::{RVInstrInfo, RiscvInstr},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown opcode 0x{opcode:02x} in instruction 0x{raw:08x}")]
    UnknownOpcode { raw: u32, opcode: u8 },
}

#[repr(u8)]
#[derive(TryFromPrimitive, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Op = 0x33,
    OpImm = 0x13,
    Load = 0x03,
    Jalr = 0x67,
    OpImm32 = 0x1b,
    Store = 0x23,
    Branch = 0x63,
    Jal = 0x6f,
    Lui = 0x37,
    Auipc = 0x17,
    System = 0x73,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrFormat {
    R,
    I,
    S,
    B,
    J,
    U,
    W,
}

impl Opcode {
    pub fn format(self) -> InstrFormat {
        match self {
            Opcode::Op => InstrFormat::R,
            Opcode::OpImm | Opcode::Load | Opcode::Jalr | Opcode::OpImm32 => InstrFormat::I,
            Opcode::Store => InstrFormat::S,
            Opcode::Branch => InstrFormat::B,
            Opcode::Jal => InstrFormat::J,
            Opcode::Lui | Opcode::Auipc => InstrFormat::U,
            Opcode::System => InstrFormat::W,
        }
    }
}

/// Every field of a 32-bit instruction word, with the format-specific immediate rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstr {
    pub raw: u32,
    pub opcode: Opcode,
    pub funct3: u8,
    pub funct7: u8,
    pub rd: u8,
    pub rs1: u8,
    pub rs2: u8,
    /// Sign extended. U-type keeps the upper 20 bits in place.
    pub imm: i32,
}

impl Display for DecodedInstr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?}({:#010x}), imm {}", self.opcode, self.raw, self.imm)
    }
}

/// Sign extends the low `bits` bits of `value`.
#[inline]
fn sext(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

pub fn decode(raw: u32) -> Result<DecodedInstr, DecodeError> {
    let opcode_bits = (raw & 0x7f) as u8;
    let opcode = Opcode::try_from(opcode_bits).map_err(|_| DecodeError::UnknownOpcode {
        raw,
        opcode: opcode_bits,
    })?;

    let imm = match opcode.format() {
        InstrFormat::I => sext(raw >> 20, 12),
        InstrFormat::S => sext(((raw >> 25) << 5) | ((raw >> 7) & 0x1f), 12),
        InstrFormat::B => sext(
            (((raw >> 31) & 1) << 12)
                | (((raw >> 7) & 1) << 11)
                | (((raw >> 25) & 0x3f) << 5)
                | (((raw >> 8) & 0xf) << 1),
            13,
        ),
        InstrFormat::J => sext(
            (((raw >> 31) & 1) << 20)
                | (((raw >> 12) & 0xff) << 12)
                | (((raw >> 20) & 1) << 11)
                | (((raw >> 21) & 0x3ff) << 1),
            21,
        ),
        InstrFormat::U => (raw & 0xffff_f000) as i32,
        InstrFormat::R | InstrFormat::W => 0,
    };

    Ok(DecodedInstr {
        raw,
        opcode,
        funct3: ((raw >> 12) & 0b111) as u8,
        funct7: (raw >> 25) as u8,
        rd: ((raw >> 7) & 0b11111) as u8,
        rs1: ((raw >> 15) & 0b11111) as u8,
        rs2: ((raw >> 20) & 0b11111) as u8,
        imm,
    })
}

impl DecodedInstr {
    pub fn format(&self) -> InstrFormat {
        self.opcode.format()
    }

    /// Maps the opcode/funct fields onto an executable instruction.
    pub fn instr(&self) -> Option<RiscvInstr> {
        use RiscvInstr::*;

        let instr = match (self.opcode, self.funct3, self.funct7) {
            (Opcode::Op, 0, 0x00) => ADD,
            (Opcode::Op, 0, 0x20) => SUB,
            (Opcode::Op, 1, 0x00) => SLL,
            (Opcode::Op, 2, 0x00) => SLT,
            (Opcode::Op, 3, 0x00) => SLTU,
            (Opcode::Op, 4, 0x00) => XOR,
            (Opcode::Op, 5, 0x00) => SRL,
            (Opcode::Op, 5, 0x20) => SRA,
            (Opcode::Op, 6, 0x00) => OR,
            (Opcode::Op, 7, 0x00) => AND,

            (Opcode::OpImm, 0, _) => ADDI,
            (Opcode::OpImm, 2, _) => SLTI,
            (Opcode::OpImm, 3, _) => SLTIU,
            (Opcode::OpImm, 4, _) => XORI,
            (Opcode::OpImm, 6, _) => ORI,
            (Opcode::OpImm, 7, _) => ANDI,
            (Opcode::OpImm, 1, 0x00) => SLLI,
            (Opcode::OpImm, 5, 0x00) => SRLI,
            (Opcode::OpImm, 5, 0x20) => SRAI,

            (Opcode::OpImm32, 0, _) => ADDIW,
            (Opcode::Jalr, 0, _) => JALR,

            (Opcode::Load, 0, _) => LB,
            (Opcode::Load, 1, _) => LH,
            (Opcode::Load, 2, _) => LW,
            (Opcode::Load, 3, _) => LD,
            (Opcode::Load, 4, _) => LBU,
            (Opcode::Load, 5, _) => LHU,

            (Opcode::Store, 0, _) => SB,
            (Opcode::Store, 1, _) => SH,
            (Opcode::Store, 2, _) => SW,
            (Opcode::Store, 3, _) => SD,

            (Opcode::Branch, 0, _) => BEQ,
            (Opcode::Branch, 1, _) => BNE,
            (Opcode::Branch, 4, _) => BLT,
            (Opcode::Branch, 5, _) => BGE,
            (Opcode::Branch, 6, _) => BLTU,
            (Opcode::Branch, 7, _) => BGEU,

            (Opcode::Jal, _, _) => JAL,
            (Opcode::Lui, _, _) => LUI,
            (Opcode::Auipc, _, _) => AUIPC,

            (Opcode::System, _, _) => match self.raw {
                0x0000_0073 => ECALL,
                0x0010_0073 => EBREAK,
                _ => return None,
            },

            _ => return None,
        };

        Some(instr)
    }

    /// Operand fields in the shape the executor consumes.
    pub fn info(&self) -> RVInstrInfo {
        let imm = self.imm as i64 as WordType;
        let Self { rd, rs1, rs2, .. } = *self;

        match self.format() {
            InstrFormat::R => RVInstrInfo::R { rs1, rs2, rd },
            InstrFormat::I => RVInstrInfo::I { rs1, rd, imm },
            InstrFormat::S => RVInstrInfo::S { rs1, rs2, imm },
            InstrFormat::B => RVInstrInfo::B { rs1, rs2, imm },
            InstrFormat::J => RVInstrInfo::J { rd, imm },
            InstrFormat::U => RVInstrInfo::U { rd, imm },
            InstrFormat::W => RVInstrInfo::None,
        }
    }
}
