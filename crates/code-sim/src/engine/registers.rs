//! Register file for the simulated AArch64 core.

use crate::abi::{END_OF_SIM_ADDRESS, FP_REG, LR_REG, SP_CODE};

/// How register code 31 is interpreted by an access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg31 {
    ZeroRegister,
    StackPointer,
}

/// General-purpose, floating-point, stack pointer and pc state.
///
/// Floating-point registers hold raw 64-bit patterns. The `s` view is the low
/// 32 bits; writing it clears the upper half, as does writing a `w` view of an
/// x register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    x: [u64; 31],
    sp: u64,
    pc: u64,
    v: [u64; 32],
}

impl RegisterFile {
    #[must_use]
    pub fn new() -> Self {
        let mut regs = Self {
            x: [0; 31],
            sp: 0,
            pc: 0,
            v: [0; 32],
        };
        regs.x[LR_REG as usize] = END_OF_SIM_ADDRESS;
        regs
    }

    /// Clear every register. The link register points at the end-of-simulation address.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    #[must_use]
    pub fn read_register(&self, code: u8, r31: Reg31) -> u64 {
        match (code, r31) {
            (SP_CODE, Reg31::StackPointer) => self.sp,
            (SP_CODE, Reg31::ZeroRegister) => 0,
            _ => self.x[code as usize],
        }
    }

    pub fn write_register(&mut self, code: u8, value: u64, r31: Reg31) {
        match (code, r31) {
            (SP_CODE, Reg31::StackPointer) => self.sp = value,
            (SP_CODE, Reg31::ZeroRegister) => {}
            _ => self.x[code as usize] = value,
        }
    }

    /// Read an x register; code 31 reads as zero.
    #[must_use]
    pub fn read_x(&self, code: u8) -> u64 {
        self.read_register(code, Reg31::ZeroRegister)
    }

    pub fn write_x(&mut self, code: u8, value: u64) {
        self.write_register(code, value, Reg31::ZeroRegister);
    }

    #[must_use]
    pub fn read_w(&self, code: u8) -> u32 {
        self.read_x(code) as u32
    }

    pub fn write_w(&mut self, code: u8, value: u32) {
        self.write_x(code, u64::from(value));
    }

    #[must_use]
    pub fn read_d(&self, code: u8) -> f64 {
        f64::from_bits(self.v[code as usize])
    }

    pub fn write_d(&mut self, code: u8, value: f64) {
        self.v[code as usize] = value.to_bits();
    }

    #[must_use]
    pub fn read_s(&self, code: u8) -> f32 {
        f32::from_bits(self.v[code as usize] as u32)
    }

    pub fn write_s(&mut self, code: u8, value: f32) {
        self.v[code as usize] = u64::from(value.to_bits());
    }

    /// Raw 64-bit pattern of a floating-point register.
    #[must_use]
    pub fn read_v_bits(&self, code: u8) -> u64 {
        self.v[code as usize]
    }

    pub fn write_v_bits(&mut self, code: u8, bits: u64) {
        self.v[code as usize] = bits;
    }

    #[must_use]
    pub const fn sp(&self) -> u64 {
        self.sp
    }

    pub fn set_sp(&mut self, sp: u64) {
        self.sp = sp;
    }

    #[must_use]
    pub const fn pc(&self) -> u64 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    #[must_use]
    pub const fn lr(&self) -> u64 {
        self.x[LR_REG as usize]
    }

    #[must_use]
    pub const fn fp(&self) -> u64 {
        self.x[FP_REG as usize]
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_31_views() {
        let mut regs = RegisterFile::new();
        regs.write_register(SP_CODE, 0x1000, Reg31::StackPointer);
        assert_eq!(regs.sp(), 0x1000);
        assert_eq!(regs.read_x(SP_CODE), 0);

        // Writes to the zero register are discarded.
        regs.write_x(SP_CODE, 0xDEAD);
        assert_eq!(regs.sp(), 0x1000);
        assert_eq!(regs.read_register(SP_CODE, Reg31::StackPointer), 0x1000);
    }

    #[test]
    fn test_w_write_zero_extends() {
        let mut regs = RegisterFile::new();
        regs.write_x(3, u64::MAX);
        regs.write_w(3, 0x8000_0001);
        assert_eq!(regs.read_x(3), 0x8000_0001);
        assert_eq!(regs.read_w(3), 0x8000_0001);
    }

    #[test]
    fn test_s_and_d_views_share_storage() {
        let mut regs = RegisterFile::new();
        regs.write_d(2, -1.5);
        assert!((regs.read_d(2) + 1.5).abs() < f64::EPSILON);

        regs.write_s(2, 2.25);
        assert_eq!(regs.read_v_bits(2), u64::from(2.25f32.to_bits()));
        assert!((regs.read_s(2) - 2.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_reset_points_lr_at_end_of_sim() {
        let mut regs = RegisterFile::new();
        regs.write_x(LR_REG, 0x4000);
        regs.set_sp(0x8000);
        regs.reset();
        assert_eq!(regs.lr(), END_OF_SIM_ADDRESS);
        assert_eq!(regs.sp(), 0);
    }
}
