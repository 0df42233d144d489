//! Seam between the call bridge and an instruction-level simulator engine.
//!
//! The engine owns decode/execute and the architectural state. The bridge
//! only needs register and memory access, a way to run from an address, a
//! reset, and a chance to look at every indirect branch before it is taken.

mod memory;
mod registers;

pub use memory::Memory;
pub use registers::{Reg31, RegisterFile};

use crate::Result;

/// Indirect branch forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// `BR Xn`: branch without writing the link register.
    Br,
    /// `BLR Xn`: branch and link to the next instruction.
    Blr,
}

/// What the engine should do after consulting the interceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchAction {
    /// Perform the architectural branch and keep simulating at the target.
    Simulate,
    /// The branch was serviced natively; continue at this address.
    Resume(u64),
}

pub trait BranchInterceptor {
    /// Called for every `BR`/`BLR` before the branch is taken.
    ///
    /// `next_pc` is the address of the instruction after the branch.
    fn intercept(
        &self,
        kind: BranchKind,
        target: u64,
        next_pc: u64,
        regs: &mut RegisterFile,
    ) -> BranchAction;
}

/// Interceptor that never intercepts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl BranchInterceptor for Passthrough {
    fn intercept(&self, _: BranchKind, _: u64, _: u64, _: &mut RegisterFile) -> BranchAction {
        BranchAction::Simulate
    }
}

pub trait Engine {
    fn registers(&self) -> &RegisterFile;
    fn registers_mut(&mut self) -> &mut RegisterFile;
    fn memory(&self) -> &Memory;
    fn memory_mut(&mut self) -> &mut Memory;

    /// Lowest valid stack address; frames must not extend below it.
    fn stack_base(&self) -> u64;

    /// Execute from `pc` until the end-of-simulation address is reached.
    fn run_from(&mut self, pc: u64, interceptor: &dyn BranchInterceptor) -> Result<()>;

    /// Reset all architectural state. Memory contents are kept.
    fn reset_state(&mut self);
}
