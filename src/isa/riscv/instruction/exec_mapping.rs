use crate::{
    console::Console,
    isa::riscv::{
        executor::RV32CPU,
        instruction::{ExecFn, RVInstrInfo, RiscvInstr, exec_function::*, normal_exec},
    },
    utils::sign_extend_u32,
};

pub(in crate::isa::riscv) fn get_exec_func(instr: RiscvInstr) -> ExecFn {
    match instr {
        // Arith
        RiscvInstr::ADD | RiscvInstr::ADDI => exec_arith::<ExecAdd>,
        RiscvInstr::SUB => exec_arith::<ExecSub>,
        RiscvInstr::ADDIW => exec_arith::<ExecAddw>,

        // Shift
        RiscvInstr::SLL | RiscvInstr::SLLI => exec_arith::<ExecSLL>,
        RiscvInstr::SRL | RiscvInstr::SRLI => exec_arith::<ExecSRL>,
        RiscvInstr::SRA | RiscvInstr::SRAI => exec_arith::<ExecSRA>,

        // Cond set
        RiscvInstr::SLT | RiscvInstr::SLTI => exec_arith::<ExecSignedLess>,
        RiscvInstr::SLTU | RiscvInstr::SLTIU => exec_arith::<ExecUnsignedLess>,

        // Bit
        RiscvInstr::AND | RiscvInstr::ANDI => exec_arith::<ExecAnd>,
        RiscvInstr::OR | RiscvInstr::ORI => exec_arith::<ExecOr>,
        RiscvInstr::XOR | RiscvInstr::XORI => exec_arith::<ExecXor>,

        // Branch
        RiscvInstr::BEQ => exec_branch::<ExecEqual>,
        RiscvInstr::BNE => exec_branch::<ExecNotEqual>,
        RiscvInstr::BLT => exec_branch::<ExecSignedLess>,
        RiscvInstr::BGE => exec_branch::<ExecSignedGreatEqual>,
        RiscvInstr::BLTU => exec_branch::<ExecUnsignedLess>,
        RiscvInstr::BGEU => exec_branch::<ExecUnsignedGreatEqual>,

        // Load
        RiscvInstr::LB => exec_load::<u8, true>,
        RiscvInstr::LBU => exec_load::<u8, false>,
        RiscvInstr::LH => exec_load::<u16, true>,
        RiscvInstr::LHU => exec_load::<u16, false>,
        RiscvInstr::LW => exec_load::<u32, true>,
        RiscvInstr::LD => exec_load::<u64, false>,

        // Store
        RiscvInstr::SB => exec_store::<u8>,
        RiscvInstr::SH => exec_store::<u16>,
        RiscvInstr::SW => exec_store::<u32>,
        RiscvInstr::SD => exec_store::<u64>,

        // Jump and link
        RiscvInstr::JAL => |info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console| {
            if let RVInstrInfo::J { rd, imm } = info {
                let link = cpu.pc.wrapping_add(4);
                cpu.pc = cpu.pc.wrapping_add(imm);
                cpu.reg_file.write(rd, link);
            } else {
                std::unreachable!();
            }
            Ok(true)
        },

        // The target is `rs1 + imm` as is; bit 0 is not cleared.
        RiscvInstr::JALR => |info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console| {
            if let RVInstrInfo::I { rs1, rd, imm } = info {
                let link = cpu.pc.wrapping_add(4);
                let target = cpu.reg_file.read(rs1, 0).0.wrapping_add(imm);

                cpu.pc = target;
                cpu.reg_file.write(rd, link);
            } else {
                std::unreachable!();
            }
            Ok(true)
        },

        RiscvInstr::AUIPC => |info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console| {
            if let RVInstrInfo::U { rd, imm } = info {
                let value = cpu.pc.wrapping_add(sign_extend_u32(imm as u32));
                normal_exec(cpu, |cpu| {
                    cpu.reg_file.write(rd, value);
                    Ok(())
                })
            } else {
                std::unreachable!();
            }
        },

        RiscvInstr::LUI => |info: RVInstrInfo, cpu: &mut RV32CPU, _: &mut dyn Console| {
            if let RVInstrInfo::U { rd, imm } = info {
                normal_exec(cpu, |cpu| {
                    cpu.reg_file.write(rd, sign_extend_u32(imm as u32));
                    Ok(())
                })
            } else {
                std::unreachable!();
            }
        },

        RiscvInstr::ECALL => exec_ecall,
        RiscvInstr::EBREAK => exec_ebreak,
    }
}
