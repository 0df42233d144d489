use std::fmt;

use crate::abi::SP_CODE;

/// General register width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W,
    X,
}

impl Width {
    const fn from_sf(sf: u32) -> Self {
        if sf == 1 { Self::X } else { Self::W }
    }

    const fn sf(self) -> u32 {
        match self {
            Self::W => 0,
            Self::X => 1,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::W => 32,
            Self::X => 64,
        }
    }

    /// Truncate a 64-bit result to this width, zero-extended.
    #[must_use]
    pub const fn truncate(self, value: u64) -> u64 {
        match self {
            Self::W => value as u32 as u64,
            Self::X => value,
        }
    }
}

/// Floating-point register width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpWidth {
    S,
    D,
}

impl FpWidth {
    const fn from_ftype(ftype: u32) -> Option<Self> {
        match ftype {
            0 => Some(Self::S),
            1 => Some(Self::D),
            _ => None,
        }
    }

    const fn ftype(self) -> u32 {
        match self {
            Self::S => 0,
            Self::D => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shift {
    Lsl,
    Lsr,
    Asr,
}

impl Shift {
    const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Lsl),
            1 => Some(Self::Lsr),
            2 => Some(Self::Asr),
            _ => None,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::Lsl => 0,
            Self::Lsr => 1,
            Self::Asr => 2,
        }
    }

    /// Apply the shift to `value` at `width`.
    #[must_use]
    pub fn apply(self, value: u64, amount: u8, width: Width) -> u64 {
        let amount = u32::from(amount);
        let value = width.truncate(value);
        let shifted = match (self, width) {
            (Self::Lsl, _) => value << amount,
            (Self::Lsr, _) => value >> amount,
            (Self::Asr, Width::X) => ((value as i64) >> amount) as u64,
            (Self::Asr, Width::W) => u64::from(((value as u32 as i32) >> amount) as u32),
        };
        width.truncate(shifted)
    }
}

/// Addressing mode of a register-pair access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairIndex {
    PostIndex,
    SignedOffset,
    PreIndex,
}

impl PairIndex {
    const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::PostIndex),
            2 => Some(Self::SignedOffset),
            3 => Some(Self::PreIndex),
            _ => None,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::PostIndex => 1,
            Self::SignedOffset => 2,
            Self::PreIndex => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpOp {
    Mul,
    Div,
    Add,
    Sub,
}

impl FpOp {
    const fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            0 => Some(Self::Mul),
            1 => Some(Self::Div),
            2 => Some(Self::Add),
            3 => Some(Self::Sub),
            _ => None,
        }
    }

    const fn bits(self) -> u32 {
        match self {
            Self::Mul => 0,
            Self::Div => 1,
            Self::Add => 2,
            Self::Sub => 3,
        }
    }

    const fn mnemonic(self) -> &'static str {
        match self {
            Self::Mul => "fmul",
            Self::Div => "fdiv",
            Self::Add => "fadd",
            Self::Sub => "fsub",
        }
    }
}

/// The AArch64 subset understood by the reference engine.
///
/// Load/store offsets are in bytes; branch offsets are in bytes relative to
/// the branch instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Brk {
        imm: u16,
    },
    Movz {
        width: Width,
        rd: u8,
        imm16: u16,
        hw: u8,
    },
    Movn {
        width: Width,
        rd: u8,
        imm16: u16,
        hw: u8,
    },
    Movk {
        width: Width,
        rd: u8,
        imm16: u16,
        hw: u8,
    },
    AddImm {
        width: Width,
        rd: u8,
        rn: u8,
        imm12: u16,
        shift12: bool,
    },
    SubImm {
        width: Width,
        rd: u8,
        rn: u8,
        imm12: u16,
        shift12: bool,
    },
    AddReg {
        width: Width,
        rd: u8,
        rn: u8,
        rm: u8,
        shift: Shift,
        amount: u8,
    },
    SubReg {
        width: Width,
        rd: u8,
        rn: u8,
        rm: u8,
        shift: Shift,
        amount: u8,
    },
    AndReg {
        width: Width,
        rd: u8,
        rn: u8,
        rm: u8,
        shift: Shift,
        amount: u8,
    },
    OrrReg {
        width: Width,
        rd: u8,
        rn: u8,
        rm: u8,
        shift: Shift,
        amount: u8,
    },
    EorReg {
        width: Width,
        rd: u8,
        rn: u8,
        rm: u8,
        shift: Shift,
        amount: u8,
    },
    Madd {
        width: Width,
        rd: u8,
        rn: u8,
        rm: u8,
        ra: u8,
    },
    Ldr {
        width: Width,
        rt: u8,
        rn: u8,
        offset: u16,
    },
    Str {
        width: Width,
        rt: u8,
        rn: u8,
        offset: u16,
    },
    LdrFp {
        width: FpWidth,
        rt: u8,
        rn: u8,
        offset: u16,
    },
    StrFp {
        width: FpWidth,
        rt: u8,
        rn: u8,
        offset: u16,
    },
    /// `LDR Xt, <pc + offset>`
    LdrLiteral {
        rt: u8,
        offset: i32,
    },
    Stp {
        rt: u8,
        rt2: u8,
        rn: u8,
        offset: i16,
        index: PairIndex,
    },
    Ldp {
        rt: u8,
        rt2: u8,
        rn: u8,
        offset: i16,
        index: PairIndex,
    },
    B {
        offset: i32,
    },
    Bl {
        offset: i32,
    },
    Cbz {
        width: Width,
        rt: u8,
        offset: i32,
    },
    Cbnz {
        width: Width,
        rt: u8,
        offset: i32,
    },
    Br {
        rn: u8,
    },
    Blr {
        rn: u8,
    },
    Ret {
        rn: u8,
    },
    FmovReg {
        width: FpWidth,
        rd: u8,
        rn: u8,
    },
    /// `FMOV Sd, Wn` / `FMOV Dd, Xn`
    FmovToFp {
        width: FpWidth,
        rd: u8,
        rn: u8,
    },
    /// `FMOV Wd, Sn` / `FMOV Xd, Dn`
    FmovFromFp {
        width: FpWidth,
        rd: u8,
        rn: u8,
    },
    FpArith {
        op: FpOp,
        width: FpWidth,
        rd: u8,
        rn: u8,
        rm: u8,
    },
}

const NOP: u32 = 0xD503_201F;
const FMOV_S_FROM_W: u32 = 0x1E27_0000;
const FMOV_W_FROM_S: u32 = 0x1E26_0000;
const FMOV_D_FROM_X: u32 = 0x9E67_0000;
const FMOV_X_FROM_D: u32 = 0x9E66_0000;

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

fn field(word: u32, lsb: u32, len: u32) -> u32 {
    (word >> lsb) & ((1 << len) - 1)
}

fn reg(word: u32, lsb: u32) -> u8 {
    field(word, lsb, 5) as u8
}

impl Instruction {
    /// Decode a 32-bit instruction word. Returns `None` for encodings outside the subset.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn decode(word: u32) -> Option<Self> {
        let rd = reg(word, 0);
        let rn = reg(word, 5);
        let rm = reg(word, 16);

        if word == NOP {
            return Some(Self::Nop);
        }
        if word & 0xFFE0_001F == 0xD420_0000 {
            return Some(Self::Brk {
                imm: field(word, 5, 16) as u16,
            });
        }
        match word & 0xFFFF_FC1F {
            0xD61F_0000 => return Some(Self::Br { rn }),
            0xD63F_0000 => return Some(Self::Blr { rn }),
            0xD65F_0000 => return Some(Self::Ret { rn }),
            _ => {}
        }
        match word & 0xFFFF_FC00 {
            FMOV_S_FROM_W => {
                return Some(Self::FmovToFp {
                    width: FpWidth::S,
                    rd,
                    rn,
                });
            }
            FMOV_D_FROM_X => {
                return Some(Self::FmovToFp {
                    width: FpWidth::D,
                    rd,
                    rn,
                });
            }
            FMOV_W_FROM_S => {
                return Some(Self::FmovFromFp {
                    width: FpWidth::S,
                    rd,
                    rn,
                });
            }
            FMOV_X_FROM_D => {
                return Some(Self::FmovFromFp {
                    width: FpWidth::D,
                    rd,
                    rn,
                });
            }
            _ => {}
        }
        if word & 0xFF3F_FC00 == 0x1E20_4000 {
            let width = FpWidth::from_ftype(field(word, 22, 2))?;
            return Some(Self::FmovReg { width, rd, rn });
        }
        if word & 0xFF20_0C00 == 0x1E20_0800 {
            let width = FpWidth::from_ftype(field(word, 22, 2))?;
            let op = FpOp::from_bits(field(word, 12, 4))?;
            return Some(Self::FpArith {
                op,
                width,
                rd,
                rn,
                rm,
            });
        }

        let width = Width::from_sf(word >> 31);

        // Move wide immediate.
        if word & 0x1F80_0000 == 0x1280_0000 {
            let hw = field(word, 21, 2) as u8;
            if width == Width::W && hw > 1 {
                return None;
            }
            let imm16 = field(word, 5, 16) as u16;
            return match field(word, 29, 2) {
                0 => Some(Self::Movn {
                    width,
                    rd,
                    imm16,
                    hw,
                }),
                2 => Some(Self::Movz {
                    width,
                    rd,
                    imm16,
                    hw,
                }),
                3 => Some(Self::Movk {
                    width,
                    rd,
                    imm16,
                    hw,
                }),
                _ => None,
            };
        }

        // Add/subtract immediate (flag-setting forms are not supported).
        if word & 0x1F80_0000 == 0x1100_0000 {
            if field(word, 29, 1) == 1 {
                return None;
            }
            let imm12 = field(word, 10, 12) as u16;
            let shift12 = field(word, 22, 1) == 1;
            return Some(if field(word, 30, 1) == 1 {
                Self::SubImm {
                    width,
                    rd,
                    rn,
                    imm12,
                    shift12,
                }
            } else {
                Self::AddImm {
                    width,
                    rd,
                    rn,
                    imm12,
                    shift12,
                }
            });
        }

        // Add/subtract and logical, shifted register.
        if word & 0x1F20_0000 == 0x0B00_0000 || word & 0x1F20_0000 == 0x0A00_0000 {
            let shift = Shift::from_bits(field(word, 22, 2))?;
            let amount = field(word, 10, 6);
            if amount >= width.bits() {
                return None;
            }
            let amount = amount as u8;
            if word & 0x1F20_0000 == 0x0B00_0000 {
                if field(word, 29, 1) == 1 {
                    return None;
                }
                return Some(if field(word, 30, 1) == 1 {
                    Self::SubReg {
                        width,
                        rd,
                        rn,
                        rm,
                        shift,
                        amount,
                    }
                } else {
                    Self::AddReg {
                        width,
                        rd,
                        rn,
                        rm,
                        shift,
                        amount,
                    }
                });
            }
            return match field(word, 29, 2) {
                0 => Some(Self::AndReg {
                    width,
                    rd,
                    rn,
                    rm,
                    shift,
                    amount,
                }),
                1 => Some(Self::OrrReg {
                    width,
                    rd,
                    rn,
                    rm,
                    shift,
                    amount,
                }),
                2 => Some(Self::EorReg {
                    width,
                    rd,
                    rn,
                    rm,
                    shift,
                    amount,
                }),
                _ => None,
            };
        }

        if word & 0x7FE0_8000 == 0x1B00_0000 {
            return Some(Self::Madd {
                width,
                rd,
                rn,
                rm,
                ra: reg(word, 10),
            });
        }

        // Load/store register, unsigned offset.
        if word & 0x3B00_0000 == 0x3900_0000 {
            let size = field(word, 30, 2);
            let is_fp = field(word, 26, 1) == 1;
            let is_load = match field(word, 22, 2) {
                0 => false,
                1 => true,
                _ => return None,
            };
            let offset = (field(word, 10, 12) << size) as u16;
            let rt = rd;
            return match (is_fp, size) {
                (false, 2 | 3) => {
                    let width = if size == 3 { Width::X } else { Width::W };
                    Some(if is_load {
                        Self::Ldr {
                            width,
                            rt,
                            rn,
                            offset,
                        }
                    } else {
                        Self::Str {
                            width,
                            rt,
                            rn,
                            offset,
                        }
                    })
                }
                (true, 2 | 3) => {
                    let width = if size == 3 { FpWidth::D } else { FpWidth::S };
                    Some(if is_load {
                        Self::LdrFp {
                            width,
                            rt,
                            rn,
                            offset,
                        }
                    } else {
                        Self::StrFp {
                            width,
                            rt,
                            rn,
                            offset,
                        }
                    })
                }
                _ => None,
            };
        }

        if word & 0xFF00_0000 == 0x5800_0000 {
            return Some(Self::LdrLiteral {
                rt: rd,
                offset: sign_extend(field(word, 5, 19), 19) * 4,
            });
        }

        // Load/store pair of x registers.
        if word & 0xFE00_0000 == 0xA800_0000 {
            let index = PairIndex::from_bits(field(word, 23, 2))?;
            let offset = (sign_extend(field(word, 15, 7), 7) * 8) as i16;
            let rt2 = reg(word, 10);
            return Some(if field(word, 22, 1) == 1 {
                Self::Ldp {
                    rt: rd,
                    rt2,
                    rn,
                    offset,
                    index,
                }
            } else {
                Self::Stp {
                    rt: rd,
                    rt2,
                    rn,
                    offset,
                    index,
                }
            });
        }

        if word & 0x7C00_0000 == 0x1400_0000 {
            let offset = sign_extend(field(word, 0, 26), 26) * 4;
            return Some(if word >> 31 == 1 {
                Self::Bl { offset }
            } else {
                Self::B { offset }
            });
        }

        if word & 0x7E00_0000 == 0x3400_0000 {
            let offset = sign_extend(field(word, 5, 19), 19) * 4;
            return Some(if field(word, 24, 1) == 1 {
                Self::Cbnz {
                    width,
                    rt: rd,
                    offset,
                }
            } else {
                Self::Cbz {
                    width,
                    rt: rd,
                    offset,
                }
            });
        }

        None
    }

    /// Encode into a 32-bit instruction word.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn encode(&self) -> u32 {
        match *self {
            Self::Nop => NOP,
            Self::Brk { imm } => 0xD420_0000 | u32::from(imm) << 5,
            Self::Movn {
                width,
                rd,
                imm16,
                hw,
            } => encode_move_wide(0, width, rd, imm16, hw),
            Self::Movz {
                width,
                rd,
                imm16,
                hw,
            } => encode_move_wide(2, width, rd, imm16, hw),
            Self::Movk {
                width,
                rd,
                imm16,
                hw,
            } => encode_move_wide(3, width, rd, imm16, hw),
            Self::AddImm {
                width,
                rd,
                rn,
                imm12,
                shift12,
            } => encode_add_sub_imm(0, width, rd, rn, imm12, shift12),
            Self::SubImm {
                width,
                rd,
                rn,
                imm12,
                shift12,
            } => encode_add_sub_imm(1, width, rd, rn, imm12, shift12),
            Self::AddReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => encode_shifted_reg(0x0B00_0000, width, rd, rn, rm, shift, amount),
            Self::SubReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => encode_shifted_reg(0x4B00_0000, width, rd, rn, rm, shift, amount),
            Self::AndReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => encode_shifted_reg(0x0A00_0000, width, rd, rn, rm, shift, amount),
            Self::OrrReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => encode_shifted_reg(0x2A00_0000, width, rd, rn, rm, shift, amount),
            Self::EorReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => encode_shifted_reg(0x4A00_0000, width, rd, rn, rm, shift, amount),
            Self::Madd {
                width,
                rd,
                rn,
                rm,
                ra,
            } => {
                width.sf() << 31
                    | 0x1B00_0000
                    | u32::from(rm) << 16
                    | u32::from(ra) << 10
                    | u32::from(rn) << 5
                    | u32::from(rd)
            }
            Self::Ldr {
                width,
                rt,
                rn,
                offset,
            } => encode_unsigned_offset(gpr_size(width), false, true, rt, rn, offset),
            Self::Str {
                width,
                rt,
                rn,
                offset,
            } => encode_unsigned_offset(gpr_size(width), false, false, rt, rn, offset),
            Self::LdrFp {
                width,
                rt,
                rn,
                offset,
            } => encode_unsigned_offset(fp_size(width), true, true, rt, rn, offset),
            Self::StrFp {
                width,
                rt,
                rn,
                offset,
            } => encode_unsigned_offset(fp_size(width), true, false, rt, rn, offset),
            Self::LdrLiteral { rt, offset } => {
                0x5800_0000 | (((offset >> 2) as u32) & 0x7_FFFF) << 5 | u32::from(rt)
            }
            Self::Stp {
                rt,
                rt2,
                rn,
                offset,
                index,
            } => encode_pair(false, rt, rt2, rn, offset, index),
            Self::Ldp {
                rt,
                rt2,
                rn,
                offset,
                index,
            } => encode_pair(true, rt, rt2, rn, offset, index),
            Self::B { offset } => 0x1400_0000 | ((offset >> 2) as u32 & 0x03FF_FFFF),
            Self::Bl { offset } => 0x9400_0000 | ((offset >> 2) as u32 & 0x03FF_FFFF),
            Self::Cbz { width, rt, offset } => encode_compare_branch(0, width, rt, offset),
            Self::Cbnz { width, rt, offset } => encode_compare_branch(1, width, rt, offset),
            Self::Br { rn } => 0xD61F_0000 | u32::from(rn) << 5,
            Self::Blr { rn } => 0xD63F_0000 | u32::from(rn) << 5,
            Self::Ret { rn } => 0xD65F_0000 | u32::from(rn) << 5,
            Self::FmovReg { width, rd, rn } => {
                0x1E20_4000 | width.ftype() << 22 | u32::from(rn) << 5 | u32::from(rd)
            }
            Self::FmovToFp { width, rd, rn } => {
                let base = match width {
                    FpWidth::S => FMOV_S_FROM_W,
                    FpWidth::D => FMOV_D_FROM_X,
                };
                base | u32::from(rn) << 5 | u32::from(rd)
            }
            Self::FmovFromFp { width, rd, rn } => {
                let base = match width {
                    FpWidth::S => FMOV_W_FROM_S,
                    FpWidth::D => FMOV_X_FROM_D,
                };
                base | u32::from(rn) << 5 | u32::from(rd)
            }
            Self::FpArith {
                op,
                width,
                rd,
                rn,
                rm,
            } => {
                0x1E20_0800
                    | width.ftype() << 22
                    | u32::from(rm) << 16
                    | op.bits() << 12
                    | u32::from(rn) << 5
                    | u32::from(rd)
            }
        }
    }

    /// `MOV Xd, Xm` (alias of `ORR Xd, XZR, Xm`).
    #[must_use]
    pub const fn mov(rd: u8, rm: u8) -> Self {
        Self::OrrReg {
            width: Width::X,
            rd,
            rn: SP_CODE,
            rm,
            shift: Shift::Lsl,
            amount: 0,
        }
    }

    /// `RET` through the link register.
    #[must_use]
    pub const fn ret() -> Self {
        Self::Ret { rn: 30 }
    }
}

fn encode_move_wide(opc: u32, width: Width, rd: u8, imm16: u16, hw: u8) -> u32 {
    width.sf() << 31
        | opc << 29
        | 0x1280_0000
        | u32::from(hw) << 21
        | u32::from(imm16) << 5
        | u32::from(rd)
}

fn encode_add_sub_imm(op: u32, width: Width, rd: u8, rn: u8, imm12: u16, shift12: bool) -> u32 {
    width.sf() << 31
        | op << 30
        | 0x1100_0000
        | u32::from(shift12) << 22
        | (u32::from(imm12) & 0xFFF) << 10
        | u32::from(rn) << 5
        | u32::from(rd)
}

fn encode_shifted_reg(
    base: u32,
    width: Width,
    rd: u8,
    rn: u8,
    rm: u8,
    shift: Shift,
    amount: u8,
) -> u32 {
    width.sf() << 31
        | base
        | shift.bits() << 22
        | u32::from(rm) << 16
        | u32::from(amount) << 10
        | u32::from(rn) << 5
        | u32::from(rd)
}

const fn gpr_size(width: Width) -> u32 {
    match width {
        Width::W => 2,
        Width::X => 3,
    }
}

const fn fp_size(width: FpWidth) -> u32 {
    match width {
        FpWidth::S => 2,
        FpWidth::D => 3,
    }
}

fn encode_unsigned_offset(
    size: u32,
    is_fp: bool,
    is_load: bool,
    rt: u8,
    rn: u8,
    offset: u16,
) -> u32 {
    size << 30
        | 0x3900_0000
        | u32::from(is_fp) << 26
        | u32::from(is_load) << 22
        | (u32::from(offset) >> size) << 10
        | u32::from(rn) << 5
        | u32::from(rt)
}

fn encode_pair(is_load: bool, rt: u8, rt2: u8, rn: u8, offset: i16, index: PairIndex) -> u32 {
    0xA800_0000
        | index.bits() << 23
        | u32::from(is_load) << 22
        | ((i32::from(offset) / 8) as u32 & 0x7F) << 15
        | u32::from(rt2) << 10
        | u32::from(rn) << 5
        | u32::from(rt)
}

fn encode_compare_branch(op: u32, width: Width, rt: u8, offset: i32) -> u32 {
    width.sf() << 31
        | 0x3400_0000
        | op << 24
        | ((offset >> 2) as u32 & 0x7_FFFF) << 5
        | u32::from(rt)
}

struct Gpr {
    code: u8,
    width: Width,
    sp: bool,
}

impl fmt::Display for Gpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.width, self.sp) {
            (SP_CODE, Width::X, true) => f.write_str("sp"),
            (SP_CODE, Width::W, true) => f.write_str("wsp"),
            (SP_CODE, Width::X, false) => f.write_str("xzr"),
            (SP_CODE, Width::W, false) => f.write_str("wzr"),
            (code, Width::X, _) => write!(f, "x{code}"),
            (code, Width::W, _) => write!(f, "w{code}"),
        }
    }
}

const fn x(code: u8) -> Gpr {
    Gpr {
        code,
        width: Width::X,
        sp: false,
    }
}

const fn r(code: u8, width: Width) -> Gpr {
    Gpr {
        code,
        width,
        sp: false,
    }
}

const fn rsp(code: u8, width: Width) -> Gpr {
    Gpr {
        code,
        width,
        sp: true,
    }
}

const fn base(code: u8) -> Gpr {
    rsp(code, Width::X)
}

fn fpr(code: u8, width: FpWidth) -> String {
    match width {
        FpWidth::S => format!("s{code}"),
        FpWidth::D => format!("d{code}"),
    }
}

fn shift_suffix(shift: Shift, amount: u8) -> String {
    if amount == 0 && shift == Shift::Lsl {
        return String::new();
    }
    let name = match shift {
        Shift::Lsl => "lsl",
        Shift::Lsr => "lsr",
        Shift::Asr => "asr",
    };
    format!(", {name} #{amount}")
}

impl fmt::Display for Instruction {
    #[allow(clippy::too_many_lines)]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Nop => f.write_str("nop"),
            Self::Brk { imm } => write!(f, "brk #{imm:#x}"),
            Self::Movz {
                width,
                rd,
                imm16,
                hw,
            } => write!(f, "movz {}, #{imm16:#x}, lsl #{}", r(rd, width), hw * 16),
            Self::Movn {
                width,
                rd,
                imm16,
                hw,
            } => write!(f, "movn {}, #{imm16:#x}, lsl #{}", r(rd, width), hw * 16),
            Self::Movk {
                width,
                rd,
                imm16,
                hw,
            } => write!(f, "movk {}, #{imm16:#x}, lsl #{}", r(rd, width), hw * 16),
            Self::AddImm {
                width,
                rd,
                rn,
                imm12,
                shift12,
            } => {
                let lsl = if shift12 { ", lsl #12" } else { "" };
                write!(f, "add {}, {}, #{imm12}{lsl}", rsp(rd, width), rsp(rn, width))
            }
            Self::SubImm {
                width,
                rd,
                rn,
                imm12,
                shift12,
            } => {
                let lsl = if shift12 { ", lsl #12" } else { "" };
                write!(f, "sub {}, {}, #{imm12}{lsl}", rsp(rd, width), rsp(rn, width))
            }
            Self::AddReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => write_three_reg(f, "add", width, rd, rn, rm, &shift_suffix(shift, amount)),
            Self::SubReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => write_three_reg(f, "sub", width, rd, rn, rm, &shift_suffix(shift, amount)),
            Self::AndReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => write_three_reg(f, "and", width, rd, rn, rm, &shift_suffix(shift, amount)),
            Self::OrrReg {
                width,
                rd,
                rn: SP_CODE,
                rm,
                shift: Shift::Lsl,
                amount: 0,
            } => write!(f, "mov {}, {}", r(rd, width), r(rm, width)),
            Self::OrrReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => write_three_reg(f, "orr", width, rd, rn, rm, &shift_suffix(shift, amount)),
            Self::EorReg {
                width,
                rd,
                rn,
                rm,
                shift,
                amount,
            } => write_three_reg(f, "eor", width, rd, rn, rm, &shift_suffix(shift, amount)),
            Self::Madd {
                width,
                rd,
                rn,
                rm,
                ra: SP_CODE,
            } => write_three_reg(f, "mul", width, rd, rn, rm, ""),
            Self::Madd {
                width,
                rd,
                rn,
                rm,
                ra,
            } => write!(
                f,
                "madd {}, {}, {}, {}",
                r(rd, width),
                r(rn, width),
                r(rm, width),
                r(ra, width)
            ),
            Self::Ldr {
                width,
                rt,
                rn,
                offset,
            } => write!(f, "ldr {}, [{}, #{offset}]", r(rt, width), base(rn)),
            Self::Str {
                width,
                rt,
                rn,
                offset,
            } => write!(f, "str {}, [{}, #{offset}]", r(rt, width), base(rn)),
            Self::LdrFp {
                width,
                rt,
                rn,
                offset,
            } => write!(f, "ldr {}, [{}, #{offset}]", fpr(rt, width), base(rn)),
            Self::StrFp {
                width,
                rt,
                rn,
                offset,
            } => write!(f, "str {}, [{}, #{offset}]", fpr(rt, width), base(rn)),
            Self::LdrLiteral { rt, offset } => write!(f, "ldr {}, pc{offset:+}", x(rt)),
            Self::Stp {
                rt,
                rt2,
                rn,
                offset,
                index,
            } => write_pair(f, "stp", rt, rt2, rn, offset, index),
            Self::Ldp {
                rt,
                rt2,
                rn,
                offset,
                index,
            } => write_pair(f, "ldp", rt, rt2, rn, offset, index),
            Self::B { offset } => write!(f, "b pc{offset:+}"),
            Self::Bl { offset } => write!(f, "bl pc{offset:+}"),
            Self::Cbz { width, rt, offset } => write!(f, "cbz {}, pc{offset:+}", r(rt, width)),
            Self::Cbnz { width, rt, offset } => write!(f, "cbnz {}, pc{offset:+}", r(rt, width)),
            Self::Br { rn } => write!(f, "br {}", x(rn)),
            Self::Blr { rn } => write!(f, "blr {}", x(rn)),
            Self::Ret { rn: 30 } => f.write_str("ret"),
            Self::Ret { rn } => write!(f, "ret {}", x(rn)),
            Self::FmovReg { width, rd, rn } => {
                write!(f, "fmov {}, {}", fpr(rd, width), fpr(rn, width))
            }
            Self::FmovToFp { width, rd, rn } => {
                let src = match width {
                    FpWidth::S => r(rn, Width::W),
                    FpWidth::D => r(rn, Width::X),
                };
                write!(f, "fmov {}, {src}", fpr(rd, width))
            }
            Self::FmovFromFp { width, rd, rn } => {
                let dst = match width {
                    FpWidth::S => r(rd, Width::W),
                    FpWidth::D => r(rd, Width::X),
                };
                write!(f, "fmov {dst}, {}", fpr(rn, width))
            }
            Self::FpArith {
                op,
                width,
                rd,
                rn,
                rm,
            } => write!(
                f,
                "{} {}, {}, {}",
                op.mnemonic(),
                fpr(rd, width),
                fpr(rn, width),
                fpr(rm, width)
            ),
        }
    }
}

fn write_three_reg(
    f: &mut fmt::Formatter<'_>,
    mnemonic: &str,
    width: Width,
    rd: u8,
    rn: u8,
    rm: u8,
    suffix: &str,
) -> fmt::Result {
    write!(
        f,
        "{mnemonic} {}, {}, {}{suffix}",
        r(rd, width),
        r(rn, width),
        r(rm, width)
    )
}

fn write_pair(
    f: &mut fmt::Formatter<'_>,
    mnemonic: &str,
    rt: u8,
    rt2: u8,
    rn: u8,
    offset: i16,
    index: PairIndex,
) -> fmt::Result {
    let (rt, rt2, rn) = (x(rt), x(rt2), base(rn));
    match index {
        PairIndex::SignedOffset => write!(f, "{mnemonic} {rt}, {rt2}, [{rn}, #{offset}]"),
        PairIndex::PreIndex => write!(f, "{mnemonic} {rt}, {rt2}, [{rn}, #{offset}]!"),
        PairIndex::PostIndex => write!(f, "{mnemonic} {rt}, {rt2}, [{rn}], #{offset}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_encodings() {
        // Reference words from the AArch64 encoding tables.
        assert_eq!(Instruction::ret().encode(), 0xD65F_03C0);
        assert_eq!(Instruction::Br { rn: 16 }.encode(), 0xD61F_0200);
        assert_eq!(Instruction::Blr { rn: 16 }.encode(), 0xD63F_0200);
        assert_eq!(Instruction::mov(0, 1).encode(), 0xAA01_03E0);
        assert_eq!(
            Instruction::Movz {
                width: Width::X,
                rd: 0,
                imm16: 42,
                hw: 0
            }
            .encode(),
            0xD280_0540
        );
        assert_eq!(
            Instruction::Stp {
                rt: 29,
                rt2: 30,
                rn: SP_CODE,
                offset: -16,
                index: PairIndex::PreIndex
            }
            .encode(),
            0xA9BF_7BFD
        );
        assert_eq!(
            Instruction::Ldp {
                rt: 29,
                rt2: 30,
                rn: SP_CODE,
                offset: 16,
                index: PairIndex::PostIndex
            }
            .encode(),
            0xA8C1_7BFD
        );
        assert_eq!(
            Instruction::FpArith {
                op: FpOp::Add,
                width: FpWidth::D,
                rd: 0,
                rn: 0,
                rm: 1
            }
            .encode(),
            0x1E61_2800
        );
    }

    #[test]
    fn test_decode_known_words() {
        assert_eq!(Instruction::decode(0xD503_201F), Some(Instruction::Nop));
        assert_eq!(
            Instruction::decode(0xF940_0BE0),
            Some(Instruction::Ldr {
                width: Width::X,
                rt: 0,
                rn: SP_CODE,
                offset: 16
            })
        );
        assert_eq!(
            Instruction::decode(0xD100_43FF),
            Some(Instruction::SubImm {
                width: Width::X,
                rd: SP_CODE,
                rn: SP_CODE,
                imm12: 16,
                shift12: false
            })
        );
        assert_eq!(
            Instruction::decode(0x5800_0050),
            Some(Instruction::LdrLiteral { rt: 16, offset: 8 })
        );
    }

    #[test]
    fn test_negative_branch_offsets_survive_encoding() {
        for instr in [
            Instruction::B { offset: -8 },
            Instruction::Bl { offset: -0x1000 },
            Instruction::Cbnz {
                width: Width::W,
                rt: 3,
                offset: -4,
            },
            Instruction::LdrLiteral { rt: 1, offset: -12 },
        ] {
            assert_eq!(Instruction::decode(instr.encode()), Some(instr), "{instr}");
        }
    }

    #[test]
    fn test_unsupported_encodings_decode_to_none() {
        // ADDS x0, x0, #1 (flag setting)
        assert_eq!(Instruction::decode(0xB100_0400), None);
        // MOVZ w0 with hw=2 is unallocated
        assert_eq!(Instruction::decode(0x52C0_0000), None);
        // All zeros is permanently undefined
        assert_eq!(Instruction::decode(0), None);
    }

    #[test]
    fn test_display_disassembly() {
        assert_eq!(Instruction::ret().to_string(), "ret");
        assert_eq!(Instruction::mov(0, 1).to_string(), "mov x0, x1");
        assert_eq!(Instruction::Blr { rn: 16 }.to_string(), "blr x16");
        assert_eq!(
            Instruction::Stp {
                rt: 29,
                rt2: 30,
                rn: SP_CODE,
                offset: -16,
                index: PairIndex::PreIndex
            }
            .to_string(),
            "stp x29, x30, [sp, #-16]!"
        );
        assert_eq!(
            Instruction::AddImm {
                width: Width::X,
                rd: 29,
                rn: SP_CODE,
                imm12: 0,
                shift12: false
            }
            .to_string(),
            "add x29, sp, #0"
        );
    }

    #[test]
    fn test_shift_apply() {
        assert_eq!(Shift::Lsl.apply(1, 4, Width::X), 16);
        assert_eq!(Shift::Lsl.apply(0x8000_0000, 1, Width::W), 0);
        assert_eq!(Shift::Asr.apply(0x8000_0000, 4, Width::W), 0xF800_0000);
        assert_eq!(Shift::Asr.apply(u64::MAX, 60, Width::X), u64::MAX);
        assert_eq!(Shift::Lsr.apply(u64::MAX, 60, Width::X), 0xF);
    }
}
