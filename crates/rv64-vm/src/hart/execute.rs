//! The RV64IMA + Zicsr instruction dispatch.

use crate::bus::{BYTE, DOUBLEWORD, HALFWORD, WORD};
use crate::exception::Exception;
use crate::hart::{Hart, Mode};
use crate::reg::csr::{
    MEPC, MSTATUS_MIE, MSTATUS_MPIE, MSTATUS_MPP, SATP, SEPC, XSTATUS_SIE, XSTATUS_SPIE,
    XSTATUS_SPP,
};
use std::cmp;

/// Execute one 32-bit instruction. The program counter has already been
/// advanced past it, so control-flow targets are applied as `imm - 4` and
/// `auipc` recovers the instruction address as `pc - 4`. Raises an
/// exception if something is wrong.
pub fn execute_general(hart: &mut Hart, inst: u64) -> Result<(), Exception> {
    // Decode.
    let opcode = inst & 0x0000007f;
    let rd = (inst & 0x00000f80) >> 7;
    let rs1 = (inst & 0x000f8000) >> 15;
    let rs2 = (inst & 0x01f00000) >> 20;
    let funct3 = (inst & 0x00007000) >> 12;
    let funct7 = (inst & 0xfe000000) >> 25;

    // Execute.
    match opcode {
        0x03 => {
            // imm[11:0] = inst[31:20]
            let offset = ((inst as i32 as i64) >> 20) as u64;
            let addr = hart.regs.read(rs1).wrapping_add(offset);
            match funct3 {
                0x0 => {
                    // lb

                    let val = hart.read(addr, BYTE)?;
                    hart.regs.write(rd, val as i8 as i64 as u64);
                }
                0x1 => {
                    // lh

                    let val = hart.read(addr, HALFWORD)?;
                    hart.regs.write(rd, val as i16 as i64 as u64);
                }
                0x2 => {
                    // lw

                    let val = hart.read(addr, WORD)?;
                    hart.regs.write(rd, val as i32 as i64 as u64);
                }
                0x3 => {
                    // ld

                    let val = hart.read(addr, DOUBLEWORD)?;
                    hart.regs.write(rd, val);
                }
                0x4 => {
                    // lbu

                    let val = hart.read(addr, BYTE)?;
                    hart.regs.write(rd, val);
                }
                0x5 => {
                    // lhu

                    let val = hart.read(addr, HALFWORD)?;
                    hart.regs.write(rd, val);
                }
                0x6 => {
                    // lwu

                    let val = hart.read(addr, WORD)?;
                    hart.regs.write(rd, val);
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x0f => {
            // fence is a no-op: this machine executes one instruction at a
            // time with no caches to order.
            match funct3 {
                0x0 => {
                    // fence
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x13 => {
            // imm[11:0] = inst[31:20]
            let imm = ((inst as i32 as i64) >> 20) as u64;
            let funct6 = funct7 >> 1;
            match funct3 {
                0x0 => {
                    // addi

                    hart.regs.write(rd, hart.regs.read(rs1).wrapping_add(imm));
                }
                0x1 => {
                    // slli

                    // shamt size is 6 bits for RV64I.
                    let shamt = (inst >> 20) & 0x3f;
                    hart.regs.write(rd, hart.regs.read(rs1) << shamt);
                }
                0x2 => {
                    // slti

                    hart.regs.write(
                        rd,
                        if (hart.regs.read(rs1) as i64) < (imm as i64) {
                            1
                        } else {
                            0
                        },
                    );
                }
                0x3 => {
                    // sltiu

                    hart.regs
                        .write(rd, if hart.regs.read(rs1) < imm { 1 } else { 0 });
                }
                0x4 => {
                    // xori

                    hart.regs.write(rd, hart.regs.read(rs1) ^ imm);
                }
                0x5 => {
                    match funct6 {
                        0x00 => {
                            // srli

                            let shamt = (inst >> 20) & 0x3f;
                            hart.regs.write(rd, hart.regs.read(rs1) >> shamt);
                        }
                        0x10 => {
                            // srai

                            let shamt = (inst >> 20) & 0x3f;
                            hart.regs
                                .write(rd, ((hart.regs.read(rs1) as i64) >> shamt) as u64);
                        }
                        _ => {
                            return Err(Exception::IllegalInstruction(inst));
                        }
                    }
                }
                0x6 => {
                    // ori

                    hart.regs.write(rd, hart.regs.read(rs1) | imm);
                }
                0x7 => {
                    // andi

                    hart.regs.write(rd, hart.regs.read(rs1) & imm);
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x17 => {
            // auipc

            // "AUIPC forms a 32-bit offset from the 20-bit U-immediate,
            // filling in the lowest 12 bits with zeros", added to the
            // address of the instruction itself.
            let imm = (inst & 0xfffff000) as i32 as i64 as u64;
            hart.regs
                .write(rd, hart.pc.wrapping_sub(4).wrapping_add(imm));
        }
        0x1b => {
            // imm[11:0] = inst[31:20]
            let imm = ((inst as i32 as i64) >> 20) as u64;
            match funct3 {
                0x0 => {
                    // addiw

                    hart.regs
                        .write(rd, hart.regs.read(rs1).wrapping_add(imm) as i32 as i64 as u64);
                }
                0x1 => {
                    // slliw

                    // "SLLIW, SRLIW, and SRAIW encodings with imm[5] != 0
                    // are reserved."
                    let shamt = (imm & 0x1f) as u32;
                    hart.regs
                        .write(rd, (hart.regs.read(rs1) << shamt) as i32 as i64 as u64);
                }
                0x5 => {
                    match funct7 {
                        0x00 => {
                            // srliw

                            let shamt = (imm & 0x1f) as u32;
                            hart.regs.write(
                                rd,
                                ((hart.regs.read(rs1) as u32) >> shamt) as i32 as i64 as u64,
                            )
                        }
                        0x20 => {
                            // sraiw

                            let shamt = (imm & 0x1f) as u32;
                            hart.regs
                                .write(rd, ((hart.regs.read(rs1) as i32) >> shamt) as i64 as u64);
                        }
                        _ => {
                            return Err(Exception::IllegalInstruction(inst));
                        }
                    }
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x23 => {
            // offset[11:5|4:0] = inst[31:25|11:7]
            let offset = (((inst & 0xfe000000) as i32 as i64 >> 20) as u64) | ((inst >> 7) & 0x1f);
            let addr = hart.regs.read(rs1).wrapping_add(offset);
            match funct3 {
                0x0 => {
                    // sb

                    hart.write(addr, hart.regs.read(rs2), BYTE)?
                }
                0x1 => {
                    // sh

                    hart.write(addr, hart.regs.read(rs2), HALFWORD)?
                }
                0x2 => {
                    // sw

                    hart.write(addr, hart.regs.read(rs2), WORD)?
                }
                0x3 => {
                    // sd

                    hart.write(addr, hart.regs.read(rs2), DOUBLEWORD)?
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x2f => {
            // RV64A
            let funct5 = (funct7 & 0b1111100) >> 2;
            let _aq = (funct7 & 0b0000010) >> 1; // acquire access
            let _rl = funct7 & 0b0000001; // release access

            // "For AMOs, the A extension requires that the address held in
            // rs1 be naturally aligned to the size of the operand." Each
            // operation reads the original value, stores the combined one,
            // and returns the original.
            match (funct3, funct5) {
                (0x2, 0x00) => {
                    // amoadd.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(addr, t.wrapping_add(hart.regs.read(rs2)), WORD)?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x00) => {
                    // amoadd.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, t.wrapping_add(hart.regs.read(rs2)), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x01) => {
                    // amoswap.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(addr, hart.regs.read(rs2), WORD)?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x01) => {
                    // amoswap.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, hart.regs.read(rs2), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x04) => {
                    // amoxor.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(addr, t ^ hart.regs.read(rs2), WORD)?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x04) => {
                    // amoxor.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, t ^ hart.regs.read(rs2), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x08) => {
                    // amoor.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(addr, t | hart.regs.read(rs2), WORD)?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x08) => {
                    // amoor.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, t | hart.regs.read(rs2), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x0c) => {
                    // amoand.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(addr, t & hart.regs.read(rs2), WORD)?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x0c) => {
                    // amoand.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, t & hart.regs.read(rs2), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x10) => {
                    // amomin.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(
                        addr,
                        cmp::min(t as i32, hart.regs.read(rs2) as i32) as i64 as u64,
                        WORD,
                    )?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x10) => {
                    // amomin.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(
                        addr,
                        cmp::min(t as i64, hart.regs.read(rs2) as i64) as u64,
                        DOUBLEWORD,
                    )?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x14) => {
                    // amomax.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(
                        addr,
                        cmp::max(t as i32, hart.regs.read(rs2) as i32) as i64 as u64,
                        WORD,
                    )?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x14) => {
                    // amomax.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(
                        addr,
                        cmp::max(t as i64, hart.regs.read(rs2) as i64) as u64,
                        DOUBLEWORD,
                    )?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x18) => {
                    // amominu.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(
                        addr,
                        cmp::min(t as u32, hart.regs.read(rs2) as u32) as u64,
                        WORD,
                    )?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x18) => {
                    // amominu.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, cmp::min(t, hart.regs.read(rs2)), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                (0x2, 0x1c) => {
                    // amomaxu.w

                    let addr = hart.regs.read(rs1);
                    if addr % 4 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, WORD)?;
                    hart.write(
                        addr,
                        cmp::max(t as u32, hart.regs.read(rs2) as u32) as u64,
                        WORD,
                    )?;
                    hart.regs.write(rd, t as i32 as i64 as u64);
                }
                (0x3, 0x1c) => {
                    // amomaxu.d

                    let addr = hart.regs.read(rs1);
                    if addr % 8 != 0 {
                        return Err(Exception::LoadAddressMisaligned);
                    }
                    let t = hart.read(addr, DOUBLEWORD)?;
                    hart.write(addr, cmp::max(t, hart.regs.read(rs2)), DOUBLEWORD)?;
                    hart.regs.write(rd, t);
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x33 => {
            // RV64I and RV64M
            match (funct3, funct7) {
                (0x0, 0x00) => {
                    // add

                    hart.regs
                        .write(rd, hart.regs.read(rs1).wrapping_add(hart.regs.read(rs2)));
                }
                (0x0, 0x01) => {
                    // mul

                    hart.regs.write(
                        rd,
                        (hart.regs.read(rs1) as i64).wrapping_mul(hart.regs.read(rs2) as i64)
                            as u64,
                    );
                }
                (0x0, 0x20) => {
                    // sub

                    hart.regs
                        .write(rd, hart.regs.read(rs1).wrapping_sub(hart.regs.read(rs2)));
                }
                (0x1, 0x00) => {
                    // sll

                    // "In RV64I, only the low 6 bits of rs2 are considered
                    // for the shift amount."
                    let shamt = hart.regs.read(rs2) & 0x3f;
                    hart.regs.write(rd, hart.regs.read(rs1) << shamt);
                }
                (0x1, 0x01) => {
                    // mulh

                    // signed x signed, high 64 bits of the 128-bit product
                    hart.regs.write(
                        rd,
                        ((hart.regs.read(rs1) as i64 as i128)
                            .wrapping_mul(hart.regs.read(rs2) as i64 as i128)
                            >> 64) as u64,
                    );
                }
                (0x2, 0x00) => {
                    // slt

                    hart.regs.write(
                        rd,
                        if (hart.regs.read(rs1) as i64) < (hart.regs.read(rs2) as i64) {
                            1
                        } else {
                            0
                        },
                    );
                }
                (0x2, 0x01) => {
                    // mulhsu

                    // signed x unsigned
                    hart.regs.write(
                        rd,
                        ((hart.regs.read(rs1) as i64 as i128 as u128)
                            .wrapping_mul(hart.regs.read(rs2) as u128)
                            >> 64) as u64,
                    );
                }
                (0x3, 0x00) => {
                    // sltu

                    hart.regs.write(
                        rd,
                        if hart.regs.read(rs1) < hart.regs.read(rs2) {
                            1
                        } else {
                            0
                        },
                    );
                }
                (0x3, 0x01) => {
                    // mulhu

                    // unsigned x unsigned
                    hart.regs.write(
                        rd,
                        ((hart.regs.read(rs1) as u128).wrapping_mul(hart.regs.read(rs2) as u128)
                            >> 64) as u64,
                    );
                }
                (0x4, 0x00) => {
                    // xor

                    hart.regs
                        .write(rd, hart.regs.read(rs1) ^ hart.regs.read(rs2));
                }
                (0x4, 0x01) => {
                    // div

                    let dividend = hart.regs.read(rs1) as i64;
                    let divisor = hart.regs.read(rs2) as i64;
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            // "The quotient of division by zero has all
                            // bits set"
                            u64::MAX
                        } else if dividend == i64::MIN && divisor == -1 {
                            // "The quotient of a signed division with
                            // overflow is equal to the dividend"
                            dividend as u64
                        } else {
                            dividend.wrapping_div(divisor) as u64
                        },
                    );
                }
                (0x5, 0x00) => {
                    // srl

                    let shamt = hart.regs.read(rs2) & 0x3f;
                    hart.regs.write(rd, hart.regs.read(rs1) >> shamt);
                }
                (0x5, 0x01) => {
                    // divu

                    let dividend = hart.regs.read(rs1);
                    let divisor = hart.regs.read(rs2);
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            u64::MAX
                        } else {
                            dividend.wrapping_div(divisor)
                        },
                    );
                }
                (0x5, 0x20) => {
                    // sra

                    let shamt = hart.regs.read(rs2) & 0x3f;
                    hart.regs
                        .write(rd, ((hart.regs.read(rs1) as i64) >> shamt) as u64);
                }
                (0x6, 0x00) => {
                    // or

                    hart.regs
                        .write(rd, hart.regs.read(rs1) | hart.regs.read(rs2));
                }
                (0x6, 0x01) => {
                    // rem

                    let dividend = hart.regs.read(rs1) as i64;
                    let divisor = hart.regs.read(rs2) as i64;
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            // "the remainder of division by zero equals the
                            // dividend"
                            dividend as u64
                        } else if dividend == i64::MIN && divisor == -1 {
                            // "the remainder is zero"
                            0
                        } else {
                            dividend.wrapping_rem(divisor) as u64
                        },
                    );
                }
                (0x7, 0x00) => {
                    // and

                    hart.regs
                        .write(rd, hart.regs.read(rs1) & hart.regs.read(rs2));
                }
                (0x7, 0x01) => {
                    // remu

                    let dividend = hart.regs.read(rs1);
                    let divisor = hart.regs.read(rs2);
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            dividend
                        } else {
                            dividend.wrapping_rem(divisor)
                        },
                    );
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            };
        }
        0x37 => {
            // lui

            // "LUI places the U-immediate value in the top 20 bits of the
            // destination register rd, filling in the lowest 12 bits with
            // zeros."
            hart.regs
                .write(rd, (inst & 0xfffff000) as i32 as i64 as u64);
        }
        0x3b => {
            // RV64I and RV64M, 32-bit operations with sign-extension of
            // the 32-bit result.
            match (funct3, funct7) {
                (0x0, 0x00) => {
                    // addw

                    hart.regs.write(
                        rd,
                        hart.regs.read(rs1).wrapping_add(hart.regs.read(rs2)) as i32 as i64 as u64,
                    );
                }
                (0x0, 0x01) => {
                    // mulw

                    let n1 = hart.regs.read(rs1) as i32;
                    let n2 = hart.regs.read(rs2) as i32;
                    let result = n1.wrapping_mul(n2);
                    hart.regs.write(rd, result as i64 as u64);
                }
                (0x0, 0x20) => {
                    // subw

                    hart.regs.write(
                        rd,
                        ((hart.regs.read(rs1).wrapping_sub(hart.regs.read(rs2))) as i32) as u64,
                    );
                }
                (0x1, 0x00) => {
                    // sllw

                    // The shift amount is given by rs2[4:0].
                    let shamt = hart.regs.read(rs2) & 0x1f;
                    hart.regs
                        .write(rd, ((hart.regs.read(rs1)) << shamt) as i32 as i64 as u64);
                }
                (0x4, 0x01) => {
                    // divw

                    let dividend = hart.regs.read(rs1) as i32;
                    let divisor = hart.regs.read(rs2) as i32;
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            u64::MAX
                        } else if dividend == i32::MIN && divisor == -1 {
                            dividend as i64 as u64
                        } else {
                            dividend.wrapping_div(divisor) as i64 as u64
                        },
                    );
                }
                (0x5, 0x00) => {
                    // srlw

                    let shamt = hart.regs.read(rs2) & 0x1f;
                    hart.regs.write(
                        rd,
                        ((hart.regs.read(rs1) as u32) >> shamt) as i32 as i64 as u64,
                    );
                }
                (0x5, 0x01) => {
                    // divuw

                    let dividend = hart.regs.read(rs1) as u32;
                    let divisor = hart.regs.read(rs2) as u32;
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            u64::MAX
                        } else {
                            dividend.wrapping_div(divisor) as i32 as i64 as u64
                        },
                    );
                }
                (0x5, 0x20) => {
                    // sraw

                    let shamt = hart.regs.read(rs2) & 0x1f;
                    hart.regs
                        .write(rd, ((hart.regs.read(rs1) as i32) >> shamt) as i64 as u64);
                }
                (0x6, 0x01) => {
                    // remw

                    let dividend = hart.regs.read(rs1) as i32;
                    let divisor = hart.regs.read(rs2) as i32;
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            dividend as i64 as u64
                        } else if dividend == i32::MIN && divisor == -1 {
                            0
                        } else {
                            dividend.wrapping_rem(divisor) as i64 as u64
                        },
                    );
                }
                (0x7, 0x01) => {
                    // remuw

                    let dividend = hart.regs.read(rs1) as u32;
                    let divisor = hart.regs.read(rs2) as u32;
                    hart.regs.write(
                        rd,
                        if divisor == 0 {
                            dividend as i32 as i64 as u64
                        } else {
                            dividend.wrapping_rem(divisor) as i32 as i64 as u64
                        },
                    );
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x63 => {
            // imm[12|10:5|4:1|11] = inst[31|30:25|11:8|7]
            let imm = (((inst & 0x80000000) as i32 as i64 >> 19) as u64)
                | ((inst & 0x80) << 4) // imm[11]
                | ((inst >> 20) & 0x7e0) // imm[10:5]
                | ((inst >> 7) & 0x1e); // imm[4:1]

            match funct3 {
                0x0 => {
                    // beq

                    if hart.regs.read(rs1) == hart.regs.read(rs2) {
                        hart.pc = hart.pc.wrapping_add(imm).wrapping_sub(4);
                    }
                }
                0x1 => {
                    // bne

                    if hart.regs.read(rs1) != hart.regs.read(rs2) {
                        hart.pc = hart.pc.wrapping_add(imm).wrapping_sub(4);
                    }
                }
                0x4 => {
                    // blt

                    if (hart.regs.read(rs1) as i64) < (hart.regs.read(rs2) as i64) {
                        hart.pc = hart.pc.wrapping_add(imm).wrapping_sub(4);
                    }
                }
                0x5 => {
                    // bge

                    if (hart.regs.read(rs1) as i64) >= (hart.regs.read(rs2) as i64) {
                        hart.pc = hart.pc.wrapping_add(imm).wrapping_sub(4);
                    }
                }
                0x6 => {
                    // bltu

                    if hart.regs.read(rs1) < hart.regs.read(rs2) {
                        hart.pc = hart.pc.wrapping_add(imm).wrapping_sub(4);
                    }
                }
                0x7 => {
                    // bgeu

                    if hart.regs.read(rs1) >= hart.regs.read(rs2) {
                        hart.pc = hart.pc.wrapping_add(imm).wrapping_sub(4);
                    }
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        0x67 => {
            // jalr

            // The return address is the instruction after the jump; the PC
            // already points there.
            let t = hart.pc;

            let offset = (inst as i32 as i64) >> 20;
            let target = ((hart.regs.read(rs1) as i64).wrapping_add(offset)) & !1;

            hart.pc = target as u64;

            hart.regs.write(rd, t);
        }
        0x6f => {
            // jal

            hart.regs.write(rd, hart.pc);

            // imm[20|10:1|11|19:12] = inst[31|30:21|20|19:12]
            let offset = (((inst & 0x80000000) as i32 as i64 >> 11) as u64) // imm[20]
                | (inst & 0xff000) // imm[19:12]
                | ((inst >> 9) & 0x800) // imm[11]
                | ((inst >> 20) & 0x7fe); // imm[10:1]

            hart.pc = hart.pc.wrapping_add(offset).wrapping_sub(4);
        }
        0x73 => {
            // RV64I, Zicsr and the supervisor ISA
            let csr_addr = ((inst >> 20) & 0xfff) as u16;
            match funct3 {
                0x0 => {
                    match (rs2, funct7) {
                        (0x0, 0x0) => {
                            // ecall

                            // Makes a request of the execution environment
                            // by raising an environment call exception from
                            // the current mode.
                            match hart.mode {
                                Mode::User => {
                                    return Err(Exception::EnvironmentCallFromUMode);
                                }
                                Mode::Supervisor => {
                                    return Err(Exception::EnvironmentCallFromSMode);
                                }
                                Mode::Machine => {
                                    return Err(Exception::EnvironmentCallFromMMode);
                                }
                            }
                        }
                        (0x1, 0x0) => {
                            // ebreak

                            return Err(Exception::Breakpoint);
                        }
                        (0x2, 0x8) => {
                            // sret

                            // Return from a supervisor trap handler: pc
                            // from sepc, privilege from sstatus.SPP, SIE
                            // from SPIE, then SPIE=1 and SPP=0.
                            hart.pc = hart.state.read(SEPC);

                            hart.mode = match hart.state.read_sstatus(XSTATUS_SPP) {
                                0b0 => Mode::User,
                                _ => Mode::Supervisor,
                            };

                            hart.state
                                .write_sstatus(XSTATUS_SIE, hart.state.read_sstatus(XSTATUS_SPIE));
                            hart.state.write_sstatus(XSTATUS_SPIE, 1);
                            hart.state.write_sstatus(XSTATUS_SPP, 0);
                        }
                        (0x2, 0x18) => {
                            // mret

                            // Return from a machine trap handler: pc from
                            // mepc, privilege from mstatus.MPP, MIE from
                            // MPIE, then MPIE=1 and MPP=0.
                            hart.pc = hart.state.read(MEPC);

                            hart.mode = match hart.state.read_mstatus(MSTATUS_MPP) {
                                0b01 => Mode::Supervisor,
                                0b11 => Mode::Machine,
                                _ => Mode::User,
                            };

                            hart.state
                                .write_mstatus(MSTATUS_MIE, hart.state.read_mstatus(MSTATUS_MPIE));
                            hart.state.write_mstatus(MSTATUS_MPIE, 1);
                            hart.state.write_mstatus(MSTATUS_MPP, Mode::User as u64);
                        }
                        (0x5, 0x8) => {
                            // wfi

                            // "provides a hint to the implementation that
                            // the current hart can be stalled" - interrupts
                            // are polled every step anyway.
                        }
                        (_, 0x9) => {
                            // sfence.vma

                            // No TLB to invalidate.
                        }
                        _ => {
                            return Err(Exception::IllegalInstruction(inst));
                        }
                    }
                }
                0x1 => {
                    // csrrw

                    let t = hart.state.read(csr_addr);
                    hart.state.write(csr_addr, hart.regs.read(rs1));
                    hart.regs.write(rd, t);

                    if csr_addr == SATP {
                        hart.update_paging();
                    }
                }
                0x2 => {
                    // csrrs

                    let t = hart.state.read(csr_addr);
                    hart.state.write(csr_addr, t | hart.regs.read(rs1));
                    hart.regs.write(rd, t);

                    if csr_addr == SATP {
                        hart.update_paging();
                    }
                }
                0x3 => {
                    // csrrc

                    let t = hart.state.read(csr_addr);
                    hart.state.write(csr_addr, t & (!hart.regs.read(rs1)));
                    hart.regs.write(rd, t);

                    if csr_addr == SATP {
                        hart.update_paging();
                    }
                }
                0x5 => {
                    // csrrwi

                    let zimm = rs1;
                    hart.regs.write(rd, hart.state.read(csr_addr));
                    hart.state.write(csr_addr, zimm);

                    if csr_addr == SATP {
                        hart.update_paging();
                    }
                }
                0x6 => {
                    // csrrsi

                    let zimm = rs1;
                    let t = hart.state.read(csr_addr);
                    hart.state.write(csr_addr, t | zimm);
                    hart.regs.write(rd, t);

                    if csr_addr == SATP {
                        hart.update_paging();
                    }
                }
                0x7 => {
                    // csrrci

                    let zimm = rs1;
                    let t = hart.state.read(csr_addr);
                    hart.state.write(csr_addr, t & (!zimm));
                    hart.regs.write(rd, t);

                    if csr_addr == SATP {
                        hart.update_paging();
                    }
                }
                _ => {
                    return Err(Exception::IllegalInstruction(inst));
                }
            }
        }
        _ => {
            return Err(Exception::IllegalInstruction(inst));
        }
    }
    Ok(())
}
