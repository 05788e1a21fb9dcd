use crate::{
    config::arch_config::{REG_A0, REG_A7, WordType},
    console::Console,
    isa::riscv::{
        executor::{RV32CPU, RuntimeError},
        instruction::{ExecResult, RVInstrInfo, normal_exec},
    },
    utils::{MemValue, sign_extend},
};

/// ExecTrait only computes a result from two operands.
/// `exec_xxx` functions read the operands and commit the result to the CPU.
pub(super) trait ExecTrait<T> {
    fn exec(a: WordType, b: WordType) -> T;
}

/// Register-register (`R`) or register-immediate (`I`) arithmetic.
/// The immediate arrives already sign extended.
pub(super) fn exec_arith<F>(info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console) -> ExecResult
where
    F: ExecTrait<WordType>,
{
    let (rd, rst) = match info {
        RVInstrInfo::R { rs1, rs2, rd } => {
            let (val1, val2) = cpu.reg_file.read(rs1, rs2);
            (rd, F::exec(val1, val2))
        }
        RVInstrInfo::I { rs1, rd, imm } => {
            let val1 = cpu.reg_file.read(rs1, 0).0;
            (rd, F::exec(val1, imm))
        }
        _ => std::unreachable!(),
    };

    normal_exec(cpu, |cpu| {
        cpu.reg_file.write(rd, rst);
        Ok(())
    })
}

pub(super) fn exec_branch<F>(info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console) -> ExecResult
where
    F: ExecTrait<bool>,
{
    if let RVInstrInfo::B { rs1, rs2, imm } = info {
        let (val1, val2) = cpu.reg_file.read(rs1, rs2);

        if F::exec(val1, val2) {
            cpu.pc = cpu.pc.wrapping_add(imm);
        } else {
            cpu.pc = cpu.pc.wrapping_add(4);
        }
    } else {
        std::unreachable!();
    }

    Ok(true)
}

/// Loads `T` from `rs1 + imm`. Narrow values are sign extended when `EXTEND` is set.
pub(super) fn exec_load<T, const EXTEND: bool>(
    info: RVInstrInfo,
    cpu: &mut RV32CPU,
    _: &mut dyn Console,
) -> ExecResult
where
    T: MemValue + Into<u64>,
{
    if let RVInstrInfo::I { rs1, rd, imm } = info {
        let addr = cpu.reg_file.read(rs1, 0).0.wrapping_add(imm);
        let mut data: WordType = cpu.memory.read::<T>(addr)?.into();
        if EXTEND && T::SIZE < 8 {
            data = sign_extend(data, (T::SIZE as u32) * 8);
        }

        normal_exec(cpu, |cpu| {
            cpu.reg_file.write(rd, data);
            Ok(())
        })
    } else {
        std::unreachable!();
    }
}

/// Stores the low `T` bits of `rs2` to `rs1 + imm`.
pub(super) fn exec_store<T>(info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console) -> ExecResult
where
    T: MemValue + TruncateFrom,
{
    if let RVInstrInfo::S { rs1, rs2, imm } = info {
        let (val1, val2) = cpu.reg_file.read(rs1, rs2);
        let addr = val1.wrapping_add(imm);

        normal_exec(cpu, |cpu| {
            cpu.memory.write(addr, T::truncate_from(val2))?;
            Ok(())
        })
    } else {
        std::unreachable!();
    }
}

/// Console text is byte-per-char: every byte is the Latin-1 code point of the same value.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// Environment call. The syscall number lives in `a7`, its argument in `a0`.
pub(super) fn exec_ecall(_info: RVInstrInfo, cpu: &mut RV32CPU, console: &mut dyn Console) -> ExecResult {
    let code = cpu.reg_file[REG_A7 as usize];
    let arg = cpu.reg_file[REG_A0 as usize];
    log::trace!("syscall {} with a0 = {:#x}", code, arg);

    let keep_running = match code {
        1 => {
            console.write(&arg.cast_signed().to_string());
            true
        }
        4 => {
            let bytes = cpu.memory.read_c_string(arg)?;
            console.write(&latin1(&bytes));
            true
        }
        10 => {
            cpu.done = true;
            console.write("\n-- program is finished running (0) --\n\n");
            console.halted();
            log::info!("program exited at pc {:#010x}", cpu.pc);
            false
        }
        11 => {
            console.write(&latin1(&[arg as u8]));
            true
        }
        _ => return Err(RuntimeError::UnknownSyscall(code)),
    };

    cpu.pc = cpu.pc.wrapping_add(4);
    Ok(keep_running)
}

/// Stops a run without halting the program.
pub(super) fn exec_ebreak(_info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console) -> ExecResult {
    log::debug!("ebreak at {:#010x}", cpu.pc);
    cpu.pc = cpu.pc.wrapping_add(4);
    Ok(false)
}

pub(super) trait TruncateFrom {
    fn truncate_from(value: WordType) -> Self;
}

macro_rules! impl_truncate_from {
    ($($t:ty),*) => {
        $(
            impl TruncateFrom for $t {
                fn truncate_from(value: WordType) -> Self {
                    value as $t
                }
            }
        )*
    };
}

impl_truncate_from!(u8, u16, u32, u64);

// =============================================
//                  ExecTrait
// =============================================
// Arith
pub(super) struct ExecAdd {}
impl ExecTrait<WordType> for ExecAdd {
    fn exec(a: WordType, b: WordType) -> WordType {
        a.wrapping_add(b)
    }
}

pub(super) struct ExecSub {}
impl ExecTrait<WordType> for ExecSub {
    fn exec(a: WordType, b: WordType) -> WordType {
        a.wrapping_sub(b)
    }
}

/// 32-bit add, result sign extended to the register width.
pub(super) struct ExecAddw {}
impl ExecTrait<WordType> for ExecAddw {
    fn exec(a: WordType, b: WordType) -> WordType {
        sign_extend(a.wrapping_add(b) & 0xffff_ffff, 32)
    }
}

// Shift. Only the low 6 bits of the amount count; for shift-immediates this drops the
// funct7 bits carried in the immediate.
pub(super) struct ExecSLL {}
impl ExecTrait<WordType> for ExecSLL {
    fn exec(a: WordType, b: WordType) -> WordType {
        a << (b & 0x3f)
    }
}

pub(super) struct ExecSRL {}
impl ExecTrait<WordType> for ExecSRL {
    fn exec(a: WordType, b: WordType) -> WordType {
        a >> (b & 0x3f)
    }
}

pub(super) struct ExecSRA {}
impl ExecTrait<WordType> for ExecSRA {
    fn exec(a: WordType, b: WordType) -> WordType {
        (a.cast_signed() >> (b & 0x3f)) as WordType
    }
}

// Bit
pub(super) struct ExecAnd {}
impl ExecTrait<WordType> for ExecAnd {
    fn exec(a: WordType, b: WordType) -> WordType {
        a & b
    }
}

pub(super) struct ExecOr {}
impl ExecTrait<WordType> for ExecOr {
    fn exec(a: WordType, b: WordType) -> WordType {
        a | b
    }
}

pub(super) struct ExecXor {}
impl ExecTrait<WordType> for ExecXor {
    fn exec(a: WordType, b: WordType) -> WordType {
        a ^ b
    }
}

// Compare. Usable both as `slt`-style arithmetic and as branch conditions.
pub(super) struct ExecSignedLess {}
impl ExecTrait<bool> for ExecSignedLess {
    fn exec(a: WordType, b: WordType) -> bool {
        a.cast_signed() < b.cast_signed()
    }
}
impl ExecTrait<WordType> for ExecSignedLess {
    fn exec(a: WordType, b: WordType) -> WordType {
        <Self as ExecTrait<bool>>::exec(a, b) as WordType
    }
}

pub(super) struct ExecUnsignedLess {}
impl ExecTrait<bool> for ExecUnsignedLess {
    fn exec(a: WordType, b: WordType) -> bool {
        a < b
    }
}
impl ExecTrait<WordType> for ExecUnsignedLess {
    fn exec(a: WordType, b: WordType) -> WordType {
        <Self as ExecTrait<bool>>::exec(a, b) as WordType
    }
}

pub(super) struct ExecSignedGreatEqual {}
impl ExecTrait<bool> for ExecSignedGreatEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a.cast_signed() >= b.cast_signed()
    }
}

pub(super) struct ExecUnsignedGreatEqual {}
impl ExecTrait<bool> for ExecUnsignedGreatEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a >= b
    }
}

pub(super) struct ExecEqual {}
impl ExecTrait<bool> for ExecEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a == b
    }
}

pub(super) struct ExecNotEqual {}
impl ExecTrait<bool> for ExecNotEqual {
    fn exec(a: WordType, b: WordType) -> bool {
        a != b
    }
}
