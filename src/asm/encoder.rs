//! Instruction encoding.

use std::collections::HashMap;

use super::{
    AssemblyError, AssemblyErrorKind, Assembler, FileState, KindResult, Place, Scope, call_args,
    linker::{RelocKind, Relocation},
    operand::{LineReader, Operand, fits_imm12},
};
use crate::{
    config::arch_config::AddrType,
    isa::riscv::{
        catalog::{IForm, InstrKind, PseudoOp, RegClass},
        decoder::Opcode,
    },
};

const LUI: u8 = Opcode::Lui as u8;
const AUIPC: u8 = Opcode::Auipc as u8;
const OP_IMM: u8 = Opcode::OpImm as u8;
const OP_IMM_32: u8 = Opcode::OpImm32 as u8;

/// First `li` value whose carry-rounded upper part no longer fits a positive `lui`.
const LI_WRAP_START: i128 = 0x7fff_f800;

const U_IMM_RANGE: std::ops::RangeInclusive<i128> = -524_288..=524_287;

fn r_type(opcode: u8, funct3: u8, funct7: u8, rd: u8, rs1: u8, rs2: u8) -> u32 {
    opcode as u32
        | (rd as u32) << 7
        | (funct3 as u32) << 12
        | (rs1 as u32) << 15
        | (rs2 as u32) << 20
        | (funct7 as u32) << 25
}

fn i_type(opcode: u8, funct3: u8, rd: u8, rs1: u8, imm: u32) -> u32 {
    opcode as u32 | (rd as u32) << 7 | (funct3 as u32) << 12 | (rs1 as u32) << 15 | (imm & 0xfff) << 20
}

fn s_type(opcode: u8, funct3: u8, rs1: u8, rs2: u8, imm: u32) -> u32 {
    opcode as u32
        | (imm & 0x1f) << 7
        | (funct3 as u32) << 12
        | (rs1 as u32) << 15
        | (rs2 as u32) << 20
        | ((imm >> 5) & 0x7f) << 25
}

fn u_type(opcode: u8, rd: u8, upper: u32) -> u32 {
    opcode as u32 | (rd as u32) << 7 | (upper & 0xffff_f000)
}

/// Upper 20 bits for a `lui`, rounded so adding the sign-extended low 12 bits lands on `value`.
fn upper_rounded(value: u32) -> u32 {
    value.wrapping_add(0x800) & 0xffff_f000
}

/// Base register and low offset of a memory operand.
struct OffReg {
    reg: u8,
    offset: u32,
    /// Label whose pc-relative low bits still have to be patched in.
    link: Option<String>,
}

/// The only register inside `(reg)`.
fn base_reg(items: Vec<Operand>) -> KindResult<u8> {
    let mut items = items.into_iter();
    match (items.next(), items.next()) {
        (None, _) => Err(AssemblyErrorKind::TooFewInParens),
        (Some(_), Some(_)) => Err(AssemblyErrorKind::TooManyInParens),
        (Some(Operand::Register(reg)), None) if reg.class == RegClass::Int => Ok(reg.index),
        (Some(Operand::Register(_)), None) => Err(AssemblyErrorKind::ExpectedIntRegister),
        (Some(_), None) => Err(AssemblyErrorKind::ExpectedOffReg),
    }
}

/// The only label inside `%modifier(label)`.
fn label_in_parens(items: Vec<Operand>) -> KindResult<String> {
    let mut items = items.into_iter();
    match (items.next(), items.next()) {
        (None, _) => Err(AssemblyErrorKind::TooFewInParens),
        (Some(_), Some(_)) => Err(AssemblyErrorKind::TooManyInParens),
        (Some(Operand::Symbol(label)), None) => Ok(label),
        (Some(other), None) => Err(AssemblyErrorKind::ExpectedLabel(other.describe())),
    }
}

impl Assembler<'_> {
    pub(super) fn instruction(
        &mut self,
        fs: &mut FileState<'_>,
        scope: &mut Scope,
        reader: &mut LineReader<'_>,
        name: &str,
        line: usize,
    ) -> Result<(), AssemblyError> {
        let catalog = self.catalog;
        let Some(desc) = catalog.instr(name) else {
            unreachable!("`{name}` was tokenized as an instruction");
        };

        match &desc.kind {
            InstrKind::Fake { params, template } => {
                let args = call_args(reader, name, *params).map_err(|kind| fs.error(kind, line))?;
                let vars: HashMap<String, Operand> = args
                    .into_iter()
                    .enumerate()
                    .map(|(idx, arg)| ((idx + 1).to_string(), arg))
                    .collect();
                // every template line reports the caller's line
                let body: Vec<(usize, &str)> =
                    template.iter().map(|text| (line, text.as_str())).collect();
                self.expand(fs, scope, vars, &body, line, false)
            }
            kind => self
                .encode(fs, scope, reader, kind, line)
                .map_err(|kind| fs.error(kind, line)),
        }
    }

    fn emit(&mut self, place: Place, word: u32) -> KindResult<AddrType> {
        self.put(place, word)
    }

    /// Emits `word` and, if `link` is set, records a relocation against its address.
    fn emit_linked(
        &mut self,
        fs: &FileState<'_>,
        scope: &mut Scope,
        word: u32,
        link: Option<(RelocKind, String)>,
        line: usize,
    ) -> KindResult<()> {
        let address = self.emit(fs.place, word)?;
        if let Some((kind, label)) = link {
            scope.relocs.push(Relocation {
                address,
                label,
                kind,
                line,
                file: fs.name.to_owned(),
            });
        }
        Ok(())
    }

    fn encode(
        &mut self,
        fs: &FileState<'_>,
        scope: &mut Scope,
        reader: &mut LineReader<'_>,
        kind: &InstrKind,
        line: usize,
    ) -> KindResult<()> {
        let place = fs.place;

        match *kind {
            InstrKind::R {
                opcode,
                funct3,
                funct7,
                regs,
            } => {
                let rd = reader.expect_reg(regs[0])?;
                let rs1 = reader.expect_reg(regs[1])?;
                let rs2 = reader.expect_reg(regs[2])?;
                reader.assert_clear()?;
                self.emit(place, r_type(opcode, funct3, funct7, rd, rs1, rs2))?;
            }

            InstrKind::I {
                opcode,
                funct3,
                form: IForm::RegImm { rd, rs1 },
            } => {
                let rd = reader.expect_reg(rd)?;
                let rs1 = reader.expect_reg(rs1)?;
                let imm = reader.expect_imm12()?;
                reader.assert_clear()?;
                self.emit(place, i_type(opcode, funct3, rd, rs1, imm as u32))?;
            }
            InstrKind::I {
                opcode,
                funct3,
                form: IForm::Shift { rd, rs1, pimm },
            } => {
                let rd = reader.expect_reg(rd)?;
                let rs1 = reader.expect_reg(rs1)?;
                let shamt = reader.expect_imm5()? as u32;
                reader.assert_clear()?;
                let imm = shamt | (pimm as u32) << 5;
                self.emit(place, i_type(opcode, funct3, rd, rs1, imm))?;
            }
            InstrKind::I {
                opcode,
                funct3,
                form: IForm::OffReg { rd: class },
            } => {
                let rd = reader.expect_reg(class)?;
                // a float destination cannot hold the address
                let scratch = (class == RegClass::Int).then_some(rd);
                let off = self.off_reg(fs, scope, reader, scratch, line)?;
                reader.assert_clear()?;
                let word = i_type(opcode, funct3, rd, off.reg, off.offset);
                self.emit_linked(fs, scope, word, off.link.map(|l| (RelocKind::RI, l)), line)?;
            }

            InstrKind::S {
                opcode,
                funct3,
                src,
            } => {
                let rs2 = reader.expect_reg(src)?;
                let off = self.off_reg(fs, scope, reader, None, line)?;
                reader.assert_clear()?;
                let word = s_type(opcode, funct3, off.reg, rs2, off.offset);
                self.emit_linked(fs, scope, word, off.link.map(|l| (RelocKind::RS, l)), line)?;
            }

            InstrKind::B {
                opcode,
                funct3,
                regs,
            } => {
                let rs1 = reader.expect_reg(regs[0])?;
                let rs2 = reader.expect_reg(regs[1])?;
                let label = reader.expect_label()?;
                reader.assert_clear()?;
                let word = s_type(opcode, funct3, rs1, rs2, 0);
                self.emit_linked(fs, scope, word, Some((RelocKind::B, label)), line)?;
            }

            InstrKind::J { opcode } => {
                let rd = reader.expect_reg(RegClass::Int)?;
                let label = reader.expect_label()?;
                reader.assert_clear()?;
                let word = u_type(opcode, rd, 0);
                self.emit_linked(fs, scope, word, Some((RelocKind::J, label)), line)?;
            }

            InstrKind::U { opcode } => {
                let rd = reader.expect_reg(RegClass::Int)?;
                let (upper, link) = match reader.required()? {
                    Operand::Symbol(label) => (0, Some(label)),
                    // `%hi(label)` style modifier
                    Operand::Variable(_) => match reader.required()? {
                        Operand::Group(items) => (0, Some(label_in_parens(items)?)),
                        _ => return Err(AssemblyErrorKind::ExpectedLabelInParens),
                    },
                    Operand::Int(v) if U_IMM_RANGE.contains(&v) => ((v as u32) << 12, None),
                    Operand::Int(v) => return Err(AssemblyErrorKind::OutOfRange20Bit(v)),
                    _ => return Err(AssemblyErrorKind::UOperandType),
                };
                reader.assert_clear()?;

                let reloc = if opcode == AUIPC {
                    RelocKind::AU
                } else {
                    RelocKind::U
                };
                let word = u_type(opcode, rd, upper);
                self.emit_linked(fs, scope, word, link.map(|l| (reloc, l)), line)?;
            }

            InstrKind::W { code } => {
                reader.assert_clear()?;
                self.emit(place, code)?;
            }

            InstrKind::ReallyFake(PseudoOp::La) => {
                let rd = reader.expect_reg(RegClass::Int)?;
                let label = reader.expect_label()?;
                reader.assert_clear()?;
                let auipc = u_type(AUIPC, rd, 0);
                self.emit_linked(fs, scope, auipc, Some((RelocKind::AU, label.clone())), line)?;
                let addi = i_type(OP_IMM, 0, rd, rd, 0);
                self.emit_linked(fs, scope, addi, Some((RelocKind::RI, label)), line)?;
            }

            InstrKind::ReallyFake(PseudoOp::Li) => {
                let rd = reader.expect_reg(RegClass::Int)?;
                let value = reader.expect_int()?;
                reader.assert_clear()?;

                if fits_imm12(value) {
                    self.emit(place, i_type(OP_IMM, 0, rd, 0, value as u32))?;
                } else if (i128::from(i32::MIN)..=i128::from(i32::MAX)).contains(&value) {
                    // from 0x7fff_f800 up the rounded upper part is 0x80000, which `lui`
                    // sign-extends; only a 32-bit add wraps that back to the positive value
                    let low_op = if value >= LI_WRAP_START { OP_IMM_32 } else { OP_IMM };
                    let value = value as u32;
                    self.emit(place, u_type(LUI, rd, upper_rounded(value)))?;
                    self.emit(place, i_type(low_op, 0, rd, rd, value))?;
                } else {
                    return Err(AssemblyErrorKind::LiOutOfRange(value));
                }
            }

            InstrKind::Fake { .. } => unreachable!("fake instructions are expanded, not encoded"),
        }

        Ok(())
    }

    /// Memory operand: `imm(reg)`, `(reg)`, a bare immediate or a label.
    ///
    /// A label becomes an `auipc` into `scratch` plus a pc-relative low part for the instruction
    /// emitted next. Without a scratch register (stores) a temporary must follow the label:
    /// `sw a0, label, t0`. A bare immediate outside 12 bits is built with `lui` into `scratch`.
    fn off_reg(
        &mut self,
        fs: &FileState<'_>,
        scope: &mut Scope,
        reader: &mut LineReader<'_>,
        scratch: Option<u8>,
        line: usize,
    ) -> KindResult<OffReg> {
        match reader.required()? {
            Operand::Int(v) => match reader.next_operand()? {
                None if fits_imm12(v) => Ok(OffReg {
                    reg: 0,
                    offset: v as u32 & 0xfff,
                    link: None,
                }),
                None => {
                    let in_32_bits = (i128::from(i32::MIN)..=i128::from(u32::MAX)).contains(&v);
                    let Some(scratch) = scratch.filter(|_| in_32_bits) else {
                        return Err(AssemblyErrorKind::OutOfRangeOffset(v));
                    };
                    let value = v as u32;
                    self.emit(fs.place, u_type(LUI, scratch, upper_rounded(value)))?;
                    Ok(OffReg {
                        reg: scratch,
                        offset: value & 0xfff,
                        link: None,
                    })
                }
                Some(Operand::Group(items)) => {
                    if !fits_imm12(v) {
                        return Err(AssemblyErrorKind::OutOfRangeOffset(v));
                    }
                    Ok(OffReg {
                        reg: base_reg(items)?,
                        offset: v as u32 & 0xfff,
                        link: None,
                    })
                }
                Some(_) => Err(AssemblyErrorKind::ExpectedOffReg),
            },
            Operand::Group(items) => Ok(OffReg {
                reg: base_reg(items)?,
                offset: 0,
                link: None,
            }),
            Operand::Symbol(label) => {
                let temp = match scratch {
                    Some(reg) => reg,
                    None => reader.expect_reg(RegClass::Int)?,
                };
                let auipc = u_type(AUIPC, temp, 0);
                self.emit_linked(fs, scope, auipc, Some((RelocKind::AU, label.clone())), line)?;
                Ok(OffReg {
                    reg: temp,
                    offset: 0,
                    link: Some(label),
                })
            }
            _ => Err(AssemblyErrorKind::ExpectedOffReg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_packing() {
        // add a0, a1, a2
        assert_eq!(r_type(0x33, 0, 0, 10, 11, 12), 0x00c5_8533);
        // addi a0, zero, -1
        assert_eq!(i_type(0x13, 0, 10, 0, -1i32 as u32), 0xfff0_0513);
        // sw a5, -36(s0)
        assert_eq!(s_type(0x23, 2, 8, 15, -36i32 as u32), 0xfcf4_2e23);
        // lui gp, 0x12345
        assert_eq!(u_type(0x37, 3, 0x1234_5000), 0x1234_51b7);
    }

    #[test]
    fn test_upper_rounding() {
        assert_eq!(upper_rounded(0x1388), 0x1000);
        assert_eq!(upper_rounded(0x1800), 0x2000);
        assert_eq!(upper_rounded(0x7fff_ffff), 0x8000_0000);
        assert_eq!(upper_rounded(-2049i32 as u32), 0xffff_f000);
    }
}
