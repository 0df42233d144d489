//! AArch64 managed-code ABI constants (Registers, Frame Layout, Address Space).
//!
//! Register roles follow the managed runtime's quick calling convention for
//! arm64, so compiled methods find their inputs where a native invoke stub
//! would have left them.

use std::fmt;

// ── Register Assignments ──

/// Current `ArtMethod`-style method handle on entry.
pub const METHOD_REG: u8 = 0;

/// Return value register (x0, or s0/d0 for floating-point results).
pub const RETURN_REG: u8 = 0;

/// Second argument register of a native runtime call (w1).
pub const SECOND_ARG_REG: u8 = 1;

/// Result slot address (`JValue*`), preserved across the call.
pub const RESULT_REG: u8 = 4;

/// Shorty descriptor address, preserved across the call.
pub const SHORTY_REG: u8 = 5;

/// Indirect branch scratch register used by runtime thunks (`LDR x16, [..]; BR x16`).
pub const IP0: u8 = 16;

/// Reserved: holds the current execution-context handle.
pub const SELF_REG: u8 = 19;

/// Reserved: holds the GC marking flag mirrored from the execution context.
pub const MARKING_REG: u8 = 20;

/// First and last callee-saved registers after the reserved pair.
pub const FIRST_CALLEE_SAVED: u8 = 20;
pub const LAST_CALLEE_SAVED: u8 = 28;

/// Frame pointer (x29).
pub const FP_REG: u8 = 29;

/// Link register (x30).
pub const LR_REG: u8 = 30;

/// Register code 31: stack pointer or zero register depending on the instruction.
pub const SP_CODE: u8 = 31;

/// First general register available to method parameters (x0 is the method).
pub const FIRST_GPR_ARG: u8 = 1;

/// First floating-point register available to method parameters.
pub const FIRST_FPR_ARG: u8 = 0;

/// Parameters must fit in registers with an index below this limit, per class.
pub const REGISTER_INDEX_LIMIT: u8 = 8;

// ── Stack Frame Layout ──

/// Size of an x register in bytes.
pub const X_REG_SIZE: u64 = 8;

/// Number of words in the saved-register block.
///
/// Layout (relative to the frame pointer):
/// - 0: Saved fp
/// - 8: Saved lr
/// - 16: x4 (result)
/// - 24: x5 (shorty)
/// - 32: Caller sp
/// - 40: x19 (self)
/// - 48..120: x20 .. x28
pub const SAVED_REGS_COUNT: usize = 15;

/// Total saved-register block size: 15 * 8 = 120 bytes.
pub const SAVED_REGS_SIZE: u64 = SAVED_REGS_COUNT as u64 * X_REG_SIZE;

/// Slot at the bottom of the frame holding a null method handle.
pub const METHOD_SENTINEL_SIZE: u64 = X_REG_SIZE;

/// The stack pointer must stay 16-byte aligned.
pub const STACK_ALIGNMENT: u64 = 16;

// ── Address Space ──

/// Reaching this pc ends simulation. The link register holds it after reset.
pub const END_OF_SIM_ADDRESS: u64 = 0;

/// Lowest address of the simulated stack region.
pub const STACK_BASE: u64 = 0x7F00_0000_0000;

/// Default simulated stack size (1 MiB).
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Round `value` down to the stack alignment.
#[must_use]
pub const fn align_down(value: u64) -> u64 {
    value & !(STACK_ALIGNMENT - 1)
}

/// Register class used when distributing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    General,
    FloatingPoint,
}

impl fmt::Display for RegisterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::General => f.write_str("general"),
            Self::FloatingPoint => f.write_str("floating-point"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_down() {
        assert_eq!(align_down(0x1000), 0x1000);
        assert_eq!(align_down(0x100F), 0x1000);
        assert_eq!(align_down(0x1010), 0x1010);
    }

    #[test]
    fn test_saved_block_covers_callee_saved_registers() {
        let callee_saved = usize::from(LAST_CALLEE_SAVED - FIRST_CALLEE_SAVED + 1);
        // fp, lr, result, shorty, sp, self + x20..x28
        assert_eq!(6 + callee_saved, SAVED_REGS_COUNT);
    }
}
