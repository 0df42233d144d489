#![allow(
    clippy::cast_possible_truncation, // intentional: w/s register views truncate x/d registers
    clippy::cast_possible_wrap, // intentional: registers are raw bits, signedness is per use
    clippy::cast_sign_loss, // intentional: argument slots are reinterpreted between i32 and u32
    clippy::missing_errors_doc // errors are documented on the `Error` variants
)]

pub mod a64;
pub mod abi;
pub mod args;
pub mod bridge;
pub mod engine;
pub mod error;
pub mod frame;
pub mod policy;
pub mod result;
pub mod runtime;
pub mod shorty;
pub mod simulator;

/// Test harness module for writing unit and integration tests.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use a64::{A64Simulator, Instruction};
pub use args::ArgValue;
pub use bridge::{CallBridge, EntryPoints};
pub use engine::{BranchAction, BranchInterceptor, BranchKind, Engine, Memory, RegisterFile};
pub use error::{Error, Result};
pub use policy::SimulationPolicy;
pub use result::JValue;
pub use runtime::{ExecutionContext, MethodDescriptor};
pub use shorty::{Shorty, ShortyType};
pub use simulator::{CAN_SIMULATE, CodeSimulator, SimulatorOptions};
