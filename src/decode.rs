//! RV64I instruction decoding.
//!
//! The grouped variants (`Branch`, `Load`, `Store`, `RegImm`,
//! `RegReg`, ...) follow the teacher's decomposition of the
//! instruction set by format (see `src/instr/decode.rs`'s `Instr`
//! enum), with the teacher's string mnemonics replaced by typed enums
//! and its `unsafe { mem::transmute }` sign-extension replaced by a
//! safe shift-based one, since this crate forbids unsafe code.
//!
//! Decoding never executes anything; it only recognizes the
//! instruction and extracts its fields. An encoding this module
//! doesn't recognize becomes `DecodeError`, which the caller turns
//! into an illegal-instruction trap with `mtval` set to the
//! instruction word.

use thiserror::Error;

const OP_LUI: u32 = 0x37;
const OP_AUIPC: u32 = 0x17;
const OP_JAL: u32 = 0x6f;
const OP_JALR: u32 = 0x67;
const OP_BRANCH: u32 = 0x63;
const OP_LOAD: u32 = 0x03;
const OP_STORE: u32 = 0x23;
const OP_IMM: u32 = 0x13;
const OP_REG: u32 = 0x33;
const OP_IMM_32: u32 = 0x1b;
const OP_REG_32: u32 = 0x3b;
const OP_MISC_MEM: u32 = 0x0f;
const OP_SYSTEM: u32 = 0x73;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("unrecognized encoding 0x{word:08x}")]
pub struct DecodeError {
    pub word: u32,
}

fn unrecognized(word: u32) -> DecodeError {
    DecodeError { word }
}

fn opcode(word: u32) -> u32 {
    word & 0x7f
}

fn rd(word: u32) -> u8 {
    ((word >> 7) & 0x1f) as u8
}

fn funct3(word: u32) -> u32 {
    (word >> 12) & 0x7
}

fn rs1(word: u32) -> u8 {
    ((word >> 15) & 0x1f) as u8
}

fn rs2(word: u32) -> u8 {
    ((word >> 20) & 0x1f) as u8
}

fn funct7(word: u32) -> u32 {
    (word >> 25) & 0x7f
}

/// Sign-extend the low `bits` bits of `value` to a 64-bit signed
/// integer, entirely in safe arithmetic (left-shift into a signed
/// `i32`, then arithmetic right-shift back).
fn sign_extend(value: u32, bits: u32) -> i64 {
    let shift = 32 - bits;
    (((value << shift) as i32) >> shift) as i64
}

fn imm_i(word: u32) -> i64 {
    sign_extend((word >> 20) & 0xFFF, 12)
}

fn imm_s(word: u32) -> i64 {
    let raw = ((word >> 25) & 0x7f) << 5 | (word >> 7) & 0x1f;
    sign_extend(raw, 12)
}

fn imm_b(word: u32) -> i64 {
    let raw = (word >> 31 & 1) << 12
        | (word >> 7 & 1) << 11
        | (word >> 25 & 0x3f) << 5
        | (word >> 8 & 0xf) << 1;
    sign_extend(raw, 13)
}

fn imm_u(word: u32) -> i64 {
    (word & 0xFFFF_F000) as i32 as i64
}

fn imm_j(word: u32) -> i64 {
    let raw = (word >> 31 & 1) << 20
        | (word >> 12 & 0xff) << 12
        | (word >> 20 & 1) << 11
        | (word >> 21 & 0x3ff) << 1;
    sign_extend(raw, 21)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Beq,
    Bne,
    Blt,
    Bge,
    Bltu,
    Bgeu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Load {
    Lb,
    Lh,
    Lw,
    Ld,
    Lbu,
    Lhu,
    Lwu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Sb,
    Sh,
    Sw,
    Sd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegImm {
    Addi,
    Slti,
    Sltiu,
    Xori,
    Ori,
    Andi,
    Slli,
    Srli,
    Srai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegReg {
    Add,
    Sub,
    Sll,
    Slt,
    Sltu,
    Xor,
    Srl,
    Sra,
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegImm32 {
    Addiw,
    Slliw,
    Srliw,
    Sraiw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegReg32 {
    Addw,
    Subw,
    Sllw,
    Srlw,
    Sraw,
}

/// The three register-source `CSR*` forms (`CSRRW`, `CSRRS`, `CSRRC`)
/// share one shape; `rs1 == 0` selects the pure-read case for
/// `CSRRS`/`CSRRC` per the access-control rule in `hart.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrOp {
    Rw,
    Rs,
    Rc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Lui { rd: u8, imm: i64 },
    Auipc { rd: u8, imm: i64 },
    Jal { rd: u8, imm: i64 },
    Jalr { rd: u8, rs1: u8, imm: i64 },
    Branch { op: Branch, rs1: u8, rs2: u8, imm: i64 },
    Load { op: Load, rd: u8, rs1: u8, imm: i64 },
    Store { op: Store, rs1: u8, rs2: u8, imm: i64 },
    RegImm { op: RegImm, rd: u8, rs1: u8, imm: i64 },
    RegReg { op: RegReg, rd: u8, rs1: u8, rs2: u8 },
    RegImm32 { op: RegImm32, rd: u8, rs1: u8, imm: i64 },
    RegReg32 { op: RegReg32, rd: u8, rs1: u8, rs2: u8 },
    Fence,
    Ecall,
    Ebreak,
    Mret,
    /// Register-source CSR instructions (`CSRRW`/`CSRRS`/`CSRRC`).
    Csr { op: CsrOp, rd: u8, rs1: u8, csr: u16 },
    /// Immediate-source CSR instructions (`CSRRWI`/`CSRRSI`/`CSRRCI`);
    /// `uimm` is the 5-bit value taken from the `rs1` field.
    CsrImm { op: CsrOp, rd: u8, uimm: u8, csr: u16 },
}

/// Distinguish `SLLI`/`SRLI`/`SRAI`'s 6-bit shift-amount encoding:
/// bits[31:26] of the word must be all-zero (logical) or exactly
/// `0b010000` (arithmetic); anything else is an illegal encoding.
fn decode_shift64(word: u32, is_right_shift: bool) -> Result<(u8, bool), DecodeError> {
    let shamt = ((word >> 20) & 0x3f) as u8;
    let top6 = (word >> 26) & 0x3f;
    match (is_right_shift, top6) {
        (false, 0) => Ok((shamt, false)),
        (true, 0) => Ok((shamt, false)),
        (true, 0b010000) => Ok((shamt, true)),
        _ => Err(unrecognized(word)),
    }
}

/// Same idea as [`decode_shift64`] for the `-W` shift variants: the
/// shift amount is 5 bits (bits[24:20]); bit 25 set is itself an
/// illegal encoding ("bit 5 of the shift field"), independent of the
/// logical/arithmetic selector in bits[31:26].
fn decode_shift32(word: u32, is_right_shift: bool) -> Result<(u8, bool), DecodeError> {
    if word >> 25 & 1 != 0 {
        return Err(unrecognized(word));
    }
    let shamt = ((word >> 20) & 0x1f) as u8;
    let top6 = (word >> 26) & 0x3f;
    match (is_right_shift, top6) {
        (false, 0) => Ok((shamt, false)),
        (true, 0) => Ok((shamt, false)),
        (true, 0b010000) => Ok((shamt, true)),
        _ => Err(unrecognized(word)),
    }
}

pub fn decode(word: u32) -> Result<Instruction, DecodeError> {
    match opcode(word) {
        OP_LUI => Ok(Instruction::Lui { rd: rd(word), imm: imm_u(word) }),
        OP_AUIPC => Ok(Instruction::Auipc { rd: rd(word), imm: imm_u(word) }),
        OP_JAL => Ok(Instruction::Jal { rd: rd(word), imm: imm_j(word) }),
        OP_JALR => {
            if funct3(word) != 0 {
                return Err(unrecognized(word));
            }
            Ok(Instruction::Jalr { rd: rd(word), rs1: rs1(word), imm: imm_i(word) })
        }
        OP_BRANCH => {
            let op = match funct3(word) {
                0b000 => Branch::Beq,
                0b001 => Branch::Bne,
                0b100 => Branch::Blt,
                0b101 => Branch::Bge,
                0b110 => Branch::Bltu,
                0b111 => Branch::Bgeu,
                _ => return Err(unrecognized(word)),
            };
            Ok(Instruction::Branch { op, rs1: rs1(word), rs2: rs2(word), imm: imm_b(word) })
        }
        OP_LOAD => {
            let op = match funct3(word) {
                0b000 => Load::Lb,
                0b001 => Load::Lh,
                0b010 => Load::Lw,
                0b011 => Load::Ld,
                0b100 => Load::Lbu,
                0b101 => Load::Lhu,
                0b110 => Load::Lwu,
                _ => return Err(unrecognized(word)),
            };
            Ok(Instruction::Load { op, rd: rd(word), rs1: rs1(word), imm: imm_i(word) })
        }
        OP_STORE => {
            let op = match funct3(word) {
                0b000 => Store::Sb,
                0b001 => Store::Sh,
                0b010 => Store::Sw,
                0b011 => Store::Sd,
                _ => return Err(unrecognized(word)),
            };
            Ok(Instruction::Store { op, rs1: rs1(word), rs2: rs2(word), imm: imm_s(word) })
        }
        OP_IMM => {
            let op = match funct3(word) {
                0b000 => RegImm::Addi,
                0b010 => RegImm::Slti,
                0b011 => RegImm::Sltiu,
                0b100 => RegImm::Xori,
                0b110 => RegImm::Ori,
                0b111 => RegImm::Andi,
                0b001 => {
                    decode_shift64(word, false)?;
                    RegImm::Slli
                }
                0b101 => {
                    let (_, arithmetic) = decode_shift64(word, true)?;
                    if arithmetic { RegImm::Srai } else { RegImm::Srli }
                }
                _ => unreachable!("funct3 is 3 bits"),
            };
            let imm = match op {
                RegImm::Slli | RegImm::Srli | RegImm::Srai => ((word >> 20) & 0x3f) as i64,
                _ => imm_i(word),
            };
            Ok(Instruction::RegImm { op, rd: rd(word), rs1: rs1(word), imm })
        }
        OP_REG => {
            let f3 = funct3(word);
            let f7 = funct7(word);
            let op = match (f3, f7) {
                (0b000, 0b0000000) => RegReg::Add,
                (0b000, 0b0100000) => RegReg::Sub,
                (0b001, 0b0000000) => RegReg::Sll,
                (0b010, 0b0000000) => RegReg::Slt,
                (0b011, 0b0000000) => RegReg::Sltu,
                (0b100, 0b0000000) => RegReg::Xor,
                (0b101, 0b0000000) => RegReg::Srl,
                (0b101, 0b0100000) => RegReg::Sra,
                (0b110, 0b0000000) => RegReg::Or,
                (0b111, 0b0000000) => RegReg::And,
                _ => return Err(unrecognized(word)),
            };
            Ok(Instruction::RegReg { op, rd: rd(word), rs1: rs1(word), rs2: rs2(word) })
        }
        OP_IMM_32 => {
            let op = match funct3(word) {
                0b000 => RegImm32::Addiw,
                0b001 => {
                    decode_shift32(word, false)?;
                    RegImm32::Slliw
                }
                0b101 => {
                    let (_, arithmetic) = decode_shift32(word, true)?;
                    if arithmetic { RegImm32::Sraiw } else { RegImm32::Srliw }
                }
                _ => return Err(unrecognized(word)),
            };
            let imm = match op {
                RegImm32::Slliw | RegImm32::Srliw | RegImm32::Sraiw => ((word >> 20) & 0x1f) as i64,
                RegImm32::Addiw => imm_i(word),
            };
            Ok(Instruction::RegImm32 { op, rd: rd(word), rs1: rs1(word), imm })
        }
        OP_REG_32 => {
            let f3 = funct3(word);
            let f7 = funct7(word);
            let op = match (f3, f7) {
                (0b000, 0b0000000) => RegReg32::Addw,
                (0b000, 0b0100000) => RegReg32::Subw,
                (0b001, 0b0000000) => RegReg32::Sllw,
                (0b101, 0b0000000) => RegReg32::Srlw,
                (0b101, 0b0100000) => RegReg32::Sraw,
                _ => return Err(unrecognized(word)),
            };
            Ok(Instruction::RegReg32 { op, rd: rd(word), rs1: rs1(word), rs2: rs2(word) })
        }
        OP_MISC_MEM => Ok(Instruction::Fence),
        OP_SYSTEM => decode_system(word),
        _ => Err(unrecognized(word)),
    }
}

fn decode_system(word: u32) -> Result<Instruction, DecodeError> {
    let csr = ((word >> 20) & 0xFFF) as u16;
    match funct3(word) {
        0b000 => match csr {
            0x000 => Ok(Instruction::Ecall),
            0x001 => Ok(Instruction::Ebreak),
            0x302 => Ok(Instruction::Mret),
            _ => Err(unrecognized(word)),
        },
        0b001 => Ok(Instruction::Csr { op: CsrOp::Rw, rd: rd(word), rs1: rs1(word), csr }),
        0b010 => Ok(Instruction::Csr { op: CsrOp::Rs, rd: rd(word), rs1: rs1(word), csr }),
        0b011 => Ok(Instruction::Csr { op: CsrOp::Rc, rd: rd(word), rs1: rs1(word), csr }),
        0b101 => Ok(Instruction::CsrImm { op: CsrOp::Rw, rd: rd(word), uimm: rs1(word), csr }),
        0b110 => Ok(Instruction::CsrImm { op: CsrOp::Rs, rd: rd(word), uimm: rs1(word), csr }),
        0b111 => Ok(Instruction::CsrImm { op: CsrOp::Rc, rd: rd(word), uimm: rs1(word), csr }),
        _ => Err(unrecognized(word)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtype(funct7: u32, rs2: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        funct7 << 25 | rs2 << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    fn itype(imm12: u32, rs1: u32, funct3: u32, rd: u32, opcode: u32) -> u32 {
        (imm12 & 0xFFF) << 20 | rs1 << 15 | funct3 << 12 | rd << 7 | opcode
    }

    #[test]
    fn lui_decodes_u_immediate() {
        // LUI x5, 0x12345
        let word = (0x12345 << 12) | (5 << 7) | OP_LUI;
        assert_eq!(decode(word), Ok(Instruction::Lui { rd: 5, imm: 0x12345000 }));
    }

    #[test]
    fn addi_decodes_sign_extended_negative_immediate() {
        // ADDI x1, x0, -1
        let word = itype(0xFFF, 0, 0b000, 1, OP_IMM);
        assert_eq!(
            decode(word),
            Ok(Instruction::RegImm { op: RegImm::Addi, rd: 1, rs1: 0, imm: -1 })
        );
    }

    #[test]
    fn srai_distinguished_from_srli_by_bit_30() {
        let srli = itype(0b000000_000001, 1, 0b101, 2, OP_IMM);
        let srai = itype(0b010000_000001, 1, 0b101, 2, OP_IMM);
        assert_eq!(decode(srli), Ok(Instruction::RegImm { op: RegImm::Srli, rd: 2, rs1: 1, imm: 1 }));
        assert_eq!(decode(srai), Ok(Instruction::RegImm { op: RegImm::Srai, rd: 2, rs1: 1, imm: 1 }));
    }

    #[test]
    fn shift_with_stray_funct7_bits_is_illegal() {
        let word = itype(0b000001_000001, 1, 0b101, 2, OP_IMM);
        assert!(decode(word).is_err());
    }

    #[test]
    fn op_with_unrecognized_funct7_is_illegal() {
        let word = rtype(0b1111111, 2, 1, 0b000, 3, OP_REG);
        assert!(decode(word).is_err());
    }

    #[test]
    fn sraiw_requires_bit25_clear() {
        // top6 = 0b010000 (the SRAI/SRAIW marker), bit 5 set, shamt = 1.
        let imm12 = (0b010000 << 6) | (1 << 5) | 0b00001;
        let illegal = itype(imm12, 1, 0b101, 2, OP_IMM_32);
        assert!(decode(illegal).is_err());
    }

    #[test]
    fn branch_immediate_is_thirteen_bit_signed() {
        // BEQ x1, x2, -8
        let imm = (-8i32 as u32) & 0x1fff;
        let bit12 = (imm >> 12) & 1;
        let bit11 = (imm >> 11) & 1;
        let bits10_5 = (imm >> 5) & 0x3f;
        let bits4_1 = (imm >> 1) & 0xf;
        let word = bit12 << 31 | bits10_5 << 25 | 2 << 20 | 1 << 15 | 0b000 << 12 | bit11 << 7 | bits4_1 << 8 | OP_BRANCH;
        assert_eq!(
            decode(word),
            Ok(Instruction::Branch { op: Branch::Beq, rs1: 1, rs2: 2, imm: -8 })
        );
    }

    #[test]
    fn csrrw_extracts_csr_address_and_registers() {
        let word = itype(0x305, 7, 0b001, 8, OP_SYSTEM);
        assert_eq!(
            decode(word),
            Ok(Instruction::Csr { op: CsrOp::Rw, rd: 8, rs1: 7, csr: 0x305 })
        );
    }

    #[test]
    fn csrrwi_takes_uimm_from_rs1_field() {
        let word = itype(0x340, 17, 0b101, 0, OP_SYSTEM);
        assert_eq!(
            decode(word),
            Ok(Instruction::CsrImm { op: CsrOp::Rw, rd: 0, uimm: 17, csr: 0x340 })
        );
    }

    #[test]
    fn ecall_ebreak_mret_recognized_by_upper_immediate() {
        assert_eq!(decode(OP_SYSTEM), Ok(Instruction::Ecall));
        assert_eq!(decode(itype(1, 0, 0, 0, OP_SYSTEM)), Ok(Instruction::Ebreak));
        assert_eq!(decode(itype(0x302, 0, 0, 0, OP_SYSTEM)), Ok(Instruction::Mret));
    }

    #[test]
    fn unrecognized_encoding_is_an_error_carrying_the_word() {
        let word = itype(0, 0, 0b100, 0, OP_SYSTEM); // funct3 100 is unused
        assert_eq!(decode(word), Err(DecodeError { word }));
    }

    #[test]
    fn jal_immediate_is_twenty_one_bit_signed_even() {
        // JAL x1, -4
        let offset = (-4i32 as u32) & 0x1f_ffff;
        let bit20 = (offset >> 20) & 1;
        let bits10_1 = (offset >> 1) & 0x3ff;
        let bit11 = (offset >> 11) & 1;
        let bits19_12 = (offset >> 12) & 0xff;
        let word = bit20 << 31 | bits10_1 << 21 | bit11 << 20 | bits19_12 << 12 | 1 << 7 | OP_JAL;
        assert_eq!(decode(word), Ok(Instruction::Jal { rd: 1, imm: -4 }));
    }
}
