//! Reference AArch64 engine.
//!
//! Decodes and executes the instruction subset that compiled managed methods
//! and runtime thunks need, and hands every indirect branch to a
//! [`BranchInterceptor`](crate::engine::BranchInterceptor).

mod instruction;
mod simulator;

pub use instruction::{FpOp, FpWidth, Instruction, PairIndex, Shift, Width};
pub use simulator::A64Simulator;
