//! Relocations: placeholders patched once a label's address is known.

use super::error::AssemblyErrorKind;
use crate::{
    config::{
        arch_config::{AddrType, WordType},
        ram_config::DATA_BASE,
    },
    ram::Ram,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocKind {
    Byte,
    Half,
    Word,
    Dword,
    /// Absolute upper 20 bits (`lui`).
    U,
    /// pc-relative upper 20 bits, rounded for a following sign-extended low part (`auipc`).
    AU,
    /// Absolute low 12 bits, I-type.
    I,
    /// Low 12 bits relative to the `auipc` just before, I-type.
    RI,
    /// Low 12 bits relative to the `auipc` just before, S-type.
    RS,
    B,
    J,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub address: AddrType,
    pub label: String,
    pub kind: RelocKind,
    pub line: usize,
    pub file: String,
}

const BRANCH_RANGE: std::ops::RangeInclusive<i64> = -4096..=4094;
const JUMP_RANGE: std::ops::RangeInclusive<i64> = -(1 << 20)..=(1 << 20) - 2;

fn overflow(address: AddrType) -> AssemblyErrorKind {
    AssemblyErrorKind::SegmentOverflow(if WordType::from(address) >= DATA_BASE {
        "data"
    } else {
        "text"
    })
}

/// pc-relative offset of a control transfer, checked for alignment and reach.
fn jump_offset(
    target: AddrType,
    address: AddrType,
    range: std::ops::RangeInclusive<i64>,
    kind: &'static str,
) -> Result<u32, AssemblyErrorKind> {
    let offset = i64::from(target) - i64::from(address);
    if offset & 1 != 0 {
        return Err(AssemblyErrorKind::EvilJump);
    }
    if !range.contains(&offset) {
        return Err(AssemblyErrorKind::TargetOutOfRange { kind, offset });
    }
    Ok(offset as u32)
}

impl Relocation {
    /// Patches the placeholder at `self.address` with `target`.
    pub fn apply(&self, ram: &mut Ram, target: AddrType) -> Result<(), AssemblyErrorKind> {
        let addr = self.address as WordType;
        let err = |_| overflow(self.address);

        let bits = match self.kind {
            RelocKind::Byte => return ram.write(addr, target as u8).map_err(err),
            RelocKind::Half => return ram.write(addr, target as u16).map_err(err),
            RelocKind::Word => return ram.write(addr, target).map_err(err),
            RelocKind::Dword => return ram.write(addr, u64::from(target)).map_err(err),
            RelocKind::U => target & 0xffff_f000,
            RelocKind::AU => {
                let mut offset = target.wrapping_sub(self.address);
                if offset & 0xfff > 2047 {
                    offset = offset.wrapping_add(0x1000);
                }
                offset & 0xffff_f000
            }
            RelocKind::I => (target & 0xfff) << 20,
            RelocKind::RI => {
                let offset = target.wrapping_sub(self.address).wrapping_add(4) & 0xfff;
                offset << 20
            }
            RelocKind::RS => {
                let offset = target.wrapping_sub(self.address).wrapping_add(4) & 0xfff;
                ((offset & 0x1f) << 7) | ((offset >> 5) << 25)
            }
            RelocKind::B => {
                let o = jump_offset(target, self.address, BRANCH_RANGE, "branch")?;
                ((o & 0x1e) << 7) | ((o & 0x7e0) << 20) | ((o & 0x800) >> 4) | ((o & 0x1000) << 19)
            }
            RelocKind::J => {
                let o = jump_offset(target, self.address, JUMP_RANGE, "jump")?;
                ((o & 0x7fe) << 20) ^ ((o & 0x800) << 9) ^ (o & 0xff000) ^ ((o & 0x10_0000) << 11)
            }
        };

        let inst = ram.read::<u32>(addr).map_err(err)?;
        ram.write(addr, inst | bits).map_err(err)
    }
}
