//! Test harness for code-sim unit and integration tests
//!
//! Provides runtime doubles (methods, execution contexts, entry points) and
//! helpers to assemble small arm64 programs.
//!
//! # Example
//!
//! ```rust
//! use code_sim::test_harness::*;
//! use code_sim::{Instruction, JValue, Shorty};
//!
//! let mut sim = simulator_with_code(&[
//!     Instruction::FmovReg { width: code_sim::a64::FpWidth::S, rd: 0, rn: 0 },
//!     Instruction::ret(),
//! ]);
//! let method = TestMethod::new("float Foo.id(float)", CODE_BASE);
//! let shorty = Shorty::new("FF").unwrap();
//! let mut result = JValue::Void;
//! sim.invoke(&method, &[1.5f32.to_bits()], &TestContext::new(1), &mut result, &shorty, true)
//!     .unwrap();
//! assert_eq!(result, JValue::Float(1.5));
//! ```

#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::cast_possible_truncation
)]

use std::cell::Cell;

use crate::a64::{Instruction, Width};
use crate::bridge::EntryPoints;
use crate::runtime::{ExecutionContext, MethodDescriptor};
use crate::simulator::{CodeSimulator, SimulatorOptions};

/// Where [`simulator_with_code`] maps its program.
pub const CODE_BASE: u64 = 0x4000_0000;

/// Handle every [`TestMethod`] reports unless overridden.
pub const TEST_METHOD_HANDLE: u64 = 0x00AB_CDEF;

/// A method descriptor with plain fields.
#[derive(Debug, Clone)]
pub struct TestMethod {
    pub name: String,
    pub handle: u64,
    pub code: Option<u64>,
    pub is_abstract: bool,
    pub is_native: bool,
    pub simulatable: bool,
}

impl TestMethod {
    pub fn new(name: impl Into<String>, code: u64) -> Self {
        Self {
            name: name.into(),
            handle: TEST_METHOD_HANDLE,
            code: Some(code),
            is_abstract: false,
            is_native: false,
            simulatable: true,
        }
    }

    pub fn without_code(mut self) -> Self {
        self.code = None;
        self
    }
}

impl MethodDescriptor for TestMethod {
    fn handle(&self) -> u64 {
        self.handle
    }

    fn pretty_name(&self) -> String {
        self.name.clone()
    }

    fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    fn is_native(&self) -> bool {
        self.is_native
    }

    fn can_be_simulated(&self) -> bool {
        self.simulatable
    }

    fn quick_code(&self) -> Option<u64> {
        self.code
    }
}

/// An execution context with a fixed handle and marking flag.
#[derive(Debug, Clone, Copy)]
pub struct TestContext {
    pub handle: u64,
    pub marking: bool,
}

impl TestContext {
    pub fn new(handle: u64) -> Self {
        Self {
            handle,
            marking: false,
        }
    }

    pub fn with_marking(mut self, marking: bool) -> Self {
        self.marking = marking;
        self
    }
}

impl ExecutionContext for TestContext {
    fn handle(&self) -> u64 {
        self.handle
    }

    fn is_gc_marking(&self) -> bool {
        self.marking
    }
}

// ============================================================================
// Runtime entry point doubles
// ============================================================================

thread_local! {
    static SUSPEND_CHECKS: Cell<usize> = const { Cell::new(0) };
}

/// Number of times [`stub_entry_points`]' suspend check ran on this thread.
pub fn suspend_checks() -> usize {
    SUSPEND_CHECKS.with(Cell::get)
}

extern "C" fn stub_test_suspend() {
    SUSPEND_CHECKS.with(|count| count.set(count.get() + 1));
}

/// Fake object address for a class handle.
pub const fn fake_object(klass: usize) -> usize {
    klass.wrapping_add(0x10)
}

/// Fake array address for a class handle, element count and element size.
pub const fn fake_array(klass: usize, count: i32, element_size: usize) -> usize {
    klass
        .wrapping_add(0x1000 * element_size)
        .wrapping_add(count as usize)
}

extern "C" fn stub_alloc_object(klass: usize) -> usize {
    fake_object(klass)
}

extern "C" fn stub_alloc_array8(klass: usize, count: i32) -> usize {
    fake_array(klass, count, 1)
}

extern "C" fn stub_alloc_array16(klass: usize, count: i32) -> usize {
    fake_array(klass, count, 2)
}

extern "C" fn stub_alloc_array32(klass: usize, count: i32) -> usize {
    fake_array(klass, count, 4)
}

extern "C" fn stub_alloc_array64(klass: usize, count: i32) -> usize {
    fake_array(klass, count, 8)
}

/// Entry points whose results are computable with [`fake_object`] and [`fake_array`].
pub fn stub_entry_points() -> EntryPoints {
    EntryPoints {
        test_suspend: stub_test_suspend,
        alloc_object_initialized: stub_alloc_object,
        alloc_array_resolved8: stub_alloc_array8,
        alloc_array_resolved16: stub_alloc_array16,
        alloc_array_resolved32: stub_alloc_array32,
        alloc_array_resolved64: stub_alloc_array64,
    }
}

// ============================================================================
// Code assembly
// ============================================================================

/// Encode a program into instruction words.
pub fn assemble(program: &[Instruction]) -> Vec<u32> {
    program.iter().map(Instruction::encode).collect()
}

/// `MOVZ` plus three `MOVK`s materializing a 64-bit constant.
pub fn load_imm64(rd: u8, value: u64) -> Vec<Instruction> {
    let chunk = |hw: u8| (value >> (u32::from(hw) * 16)) as u16;
    let mut program = vec![Instruction::Movz {
        width: Width::X,
        rd,
        imm16: chunk(0),
        hw: 0,
    }];
    program.extend((1..4).map(|hw| Instruction::Movk {
        width: Width::X,
        rd,
        imm16: chunk(hw),
        hw,
    }));
    program
}

/// A default simulator with stub entry points and `program` mapped at [`CODE_BASE`].
pub fn simulator_with_code(program: &[Instruction]) -> CodeSimulator {
    simulator_with_options(program, SimulatorOptions::default().with_max_steps(Some(10_000)))
}

pub fn simulator_with_options(program: &[Instruction], options: SimulatorOptions) -> CodeSimulator {
    let mut sim = CodeSimulator::with_options(options).expect("host cannot simulate");
    sim.install_entry_points(&stub_entry_points());
    sim.map_code(CODE_BASE, &assemble(program))
        .expect("code region overlaps");
    sim
}
