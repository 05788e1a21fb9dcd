use crate::isa::riscv::{
    catalog::{Catalog, IForm, InstrDesc, InstrKind, RegClass},
    decoder::{DecodedInstr, InstrFormat, decode},
};

/// Text for words no catalog entry matches.
pub const UNKNOWN_INSTRUCTION: &str = "unknown";

/// Renders `raw` with the built-in catalog. Never fails.
pub fn disassemble(raw: u32) -> String {
    disassemble_with(Catalog::global(), raw)
}

pub fn disassemble_with(catalog: &Catalog, raw: u32) -> String {
    decode(raw)
        .ok()
        .and_then(|d| render(catalog, &d))
        .unwrap_or_else(|| UNKNOWN_INSTRUCTION.to_owned())
}

fn hex(value: i32) -> String {
    if value < 0 {
        format!("-0x{:x}", -(value as i64))
    } else {
        format!("0x{value:x}")
    }
}

fn reg(catalog: &Catalog, class: RegClass, idx: u8) -> &str {
    match class {
        RegClass::Int => catalog.int_reg_name(idx),
        RegClass::Float => catalog.float_reg_name(idx),
    }
}

fn lookup<'c>(catalog: &'c Catalog, d: &DecodedInstr) -> Option<&'c InstrDesc> {
    let opcode = d.opcode as u8;
    catalog.find(|kind| match *kind {
        InstrKind::R {
            opcode: o,
            funct3,
            funct7,
            ..
        } => d.format() == InstrFormat::R && o == opcode && funct3 == d.funct3 && funct7 == d.funct7,
        InstrKind::I {
            opcode: o,
            funct3,
            form,
        } => {
            let pimm_ok = match form {
                IForm::Shift { pimm, .. } => pimm == d.funct7,
                _ => true,
            };
            d.format() == InstrFormat::I && o == opcode && funct3 == d.funct3 && pimm_ok
        }
        InstrKind::S { opcode: o, funct3, .. } | InstrKind::B { opcode: o, funct3, .. } => {
            matches!(d.format(), InstrFormat::S | InstrFormat::B) && o == opcode && funct3 == d.funct3
        }
        InstrKind::J { opcode: o } | InstrKind::U { opcode: o } => {
            matches!(d.format(), InstrFormat::J | InstrFormat::U) && o == opcode
        }
        InstrKind::W { code } => code == d.raw,
        InstrKind::Fake { .. } | InstrKind::ReallyFake(_) => false,
    })
}

fn render(catalog: &Catalog, d: &DecodedInstr) -> Option<String> {
    let desc = lookup(catalog, d)?;
    let name = &desc.name;

    let text = match desc.kind {
        InstrKind::R { regs: [c0, c1, c2], .. } => format!(
            "{name} {},{},{}",
            reg(catalog, c0, d.rd),
            reg(catalog, c1, d.rs1),
            reg(catalog, c2, d.rs2)
        ),
        InstrKind::I { form, .. } => match form {
            IForm::RegImm { rd, rs1 } => format!(
                "{name} {},{},{}",
                reg(catalog, rd, d.rd),
                reg(catalog, rs1, d.rs1),
                hex(d.imm)
            ),
            IForm::Shift { rd, rs1, .. } => format!(
                "{name} {},{},{}",
                reg(catalog, rd, d.rd),
                reg(catalog, rs1, d.rs1),
                hex(d.imm & 0x1f)
            ),
            IForm::OffReg { rd } => format!(
                "{name} {},{}({})",
                reg(catalog, rd, d.rd),
                hex(d.imm),
                catalog.int_reg_name(d.rs1)
            ),
        },
        InstrKind::S { src, .. } => format!(
            "{name} {},{}({})",
            reg(catalog, src, d.rs2),
            hex(d.imm),
            catalog.int_reg_name(d.rs1)
        ),
        InstrKind::B { regs: [c0, c1], .. } => format!(
            "{name} {},{},{}",
            reg(catalog, c0, d.rs1),
            reg(catalog, c1, d.rs2),
            hex(d.imm)
        ),
        InstrKind::U { .. } => format!("{name} {},{}", catalog.int_reg_name(d.rd), hex(d.imm >> 12)),
        InstrKind::J { .. } => format!("{name} {},{}", catalog.int_reg_name(d.rd), hex(d.imm)),
        InstrKind::W { .. } => name.clone(),
        InstrKind::Fake { .. } | InstrKind::ReallyFake(_) => return None,
    };

    Some(text)
}
