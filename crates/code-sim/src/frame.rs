//! Call frame construction for entering compiled code from a native caller.
//!
//! Reproduces the state the runtime's arm64 invoke stub leaves behind:
//!
//! ```text
//!  +----------------------+
//!  |  caller frame        |
//!  |                      | <- saved sp
//!  +----------------------+
//!  |  x28                 |
//!  |   :                  |
//!  |  x20                 |
//!  |  x19 (self)          |        SavedFrame
//!  |  saved sp            |
//!  |  x5 (shorty)         |
//!  |  x4 (result)         |
//!  |  lr                  |
//!  |  fp                  | <- fp
//!  +----------------------+
//!  |  (alignment padding) |
//!  |  uint32_t out[n-1]   |
//!  |   :                  |        Outs
//!  |  uint32_t out[0]     |
//!  |  null method         | <- sp
//!  +----------------------+
//! ```
//!
//! Outgoing registers: x0 method, x1-x7 integer parameters (x1 is the
//! receiver of an instance call), d0-d7/s0-s7 floating-point parameters,
//! x19 self, x20 marking flag.

use tracing::warn;

use crate::abi::{
    FIRST_CALLEE_SAVED, FIRST_FPR_ARG, FIRST_GPR_ARG, FP_REG, LAST_CALLEE_SAVED,
    MARKING_REG, METHOD_REG, METHOD_SENTINEL_SIZE, REGISTER_INDEX_LIMIT, RESULT_REG,
    RegisterClass, SAVED_REGS_COUNT, SAVED_REGS_SIZE, SELF_REG, SHORTY_REG, X_REG_SIZE,
    align_down,
};
use crate::args::{ArgValue, check_arguments};
use crate::engine::{Engine, Memory, RegisterFile};
use crate::runtime::ExecutionContext;
use crate::shorty::{Shorty, ShortyType};
use crate::{Error, Result};

const CALLEE_SAVED_COUNT: usize = (LAST_CALLEE_SAVED - FIRST_CALLEE_SAVED + 1) as usize;

/// Caller state preserved below the caller's stack pointer, in ABI order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedFrame {
    pub fp: u64,
    pub lr: u64,
    pub result: u64,
    pub shorty: u64,
    pub sp: u64,
    pub context: u64,
    /// x20 through x28.
    pub callee_saved: [u64; CALLEE_SAVED_COUNT],
}

impl SavedFrame {
    #[must_use]
    pub fn to_words(&self) -> [u64; SAVED_REGS_COUNT] {
        let mut words = [0; SAVED_REGS_COUNT];
        words[..6].copy_from_slice(&[
            self.fp,
            self.lr,
            self.result,
            self.shorty,
            self.sp,
            self.context,
        ]);
        words[6..].copy_from_slice(&self.callee_saved);
        words
    }

    #[must_use]
    pub fn from_words(words: &[u64; SAVED_REGS_COUNT]) -> Self {
        let mut callee_saved = [0; CALLEE_SAVED_COUNT];
        callee_saved.copy_from_slice(&words[6..]);
        Self {
            fp: words[0],
            lr: words[1],
            result: words[2],
            shorty: words[3],
            sp: words[4],
            context: words[5],
            callee_saved,
        }
    }

    pub fn write(&self, memory: &mut Memory, address: u64) -> Result<()> {
        for (i, word) in self.to_words().into_iter().enumerate() {
            memory.write_u64(address + i as u64 * X_REG_SIZE, word)?;
        }
        Ok(())
    }

    pub fn read(memory: &Memory, address: u64) -> Result<Self> {
        let mut words = [0; SAVED_REGS_COUNT];
        for (i, word) in words.iter_mut().enumerate() {
            *word = memory.read_u64(address + i as u64 * X_REG_SIZE)?;
        }
        Ok(Self::from_words(&words))
    }
}

/// Where one parameter lives on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgLocation {
    W(u8),
    X(u8),
    S(u8),
    D(u8),
}

/// A parameter's register and the index of its first argument buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgAssignment {
    pub location: ArgLocation,
    pub slot: usize,
}

/// Assign registers to the receiver (for instance calls) and every parameter.
///
/// General and floating-point registers are counted independently. Running
/// out of either class is an unsupported call shape: stack spilling is not
/// implemented.
pub fn plan_arguments(shorty: &Shorty, is_static: bool) -> Result<Vec<ArgAssignment>> {
    let mut gpr = FIRST_GPR_ARG;
    let mut fpr = FIRST_FPR_ARG;
    let mut slot = 0;
    let mut plan = Vec::new();

    let receiver = (!is_static).then_some(ShortyType::Int);
    for ty in receiver.into_iter().chain(shorty.params()) {
        let (class, index) = if ty.is_floating_point() {
            (RegisterClass::FloatingPoint, &mut fpr)
        } else {
            (RegisterClass::General, &mut gpr)
        };
        if *index >= REGISTER_INDEX_LIMIT {
            warn!(%shorty, %class, "argument registers exhausted; stack spill is not supported");
            return Err(Error::UnsupportedCallShape {
                shorty: shorty.to_string(),
                class,
            });
        }
        let location = match ty {
            ShortyType::Double => ArgLocation::D(*index),
            ShortyType::Float => ArgLocation::S(*index),
            ShortyType::Long => ArgLocation::X(*index),
            ShortyType::Int | ShortyType::Void => ArgLocation::W(*index),
        };
        *index += 1;
        plan.push(ArgAssignment { location, slot });
        slot += ty.slots();
    }
    Ok(plan)
}

/// Read parameters back out of the entry registers; inverse of frame construction.
pub fn decode_arguments(
    regs: &RegisterFile,
    shorty: &Shorty,
    is_static: bool,
) -> Result<Vec<ArgValue>> {
    Ok(plan_arguments(shorty, is_static)?
        .into_iter()
        .map(|assignment| match assignment.location {
            ArgLocation::W(r) => ArgValue::Int(regs.read_w(r) as i32),
            ArgLocation::X(r) => ArgValue::Long(regs.read_x(r) as i64),
            ArgLocation::S(r) => ArgValue::Float(regs.read_s(r)),
            ArgLocation::D(r) => ArgValue::Double(regs.read_d(r)),
        })
        .collect())
}

/// Everything the frame builder needs to know about one call.
#[derive(Clone, Copy)]
pub struct CallSite<'a> {
    /// Method handle for x0.
    pub method: u64,
    /// Packed argument buffer.
    pub args: &'a [u32],
    pub context: &'a dyn ExecutionContext,
    /// Address of the result slot for x4.
    pub result: u64,
    pub shorty: &'a Shorty,
    pub is_static: bool,
}

/// Stack addresses of a constructed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    /// Stack pointer captured before construction; restored after the call.
    pub saved_sp: u64,
    /// New stack pointer, pointing at the null method sentinel.
    pub sp: u64,
    /// Frame pointer, pointing at the `SavedFrame`.
    pub fp: u64,
}

impl FrameLayout {
    fn compute(saved_sp: u64, args_bytes: u64, stack_base: u64) -> Result<Self> {
        let frame_size = SAVED_REGS_SIZE + METHOD_SENTINEL_SIZE + args_bytes;
        let sp = saved_sp
            .checked_sub(frame_size)
            .map(align_down)
            .filter(|&sp| sp >= stack_base)
            .ok_or(Error::StackOverflow {
                sp: saved_sp.saturating_sub(frame_size),
                base: stack_base,
            })?;
        Ok(Self {
            saved_sp,
            sp,
            fp: saved_sp - SAVED_REGS_SIZE,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FrameBuilder {
    read_barrier: bool,
}

impl FrameBuilder {
    #[must_use]
    pub const fn new(read_barrier: bool) -> Self {
        Self { read_barrier }
    }

    /// Lay out the frame for `call` and load the entry registers.
    ///
    /// The call shape is fully validated first; on error the register file
    /// is untouched.
    pub fn build<E: Engine + ?Sized>(
        &self,
        engine: &mut E,
        call: &CallSite<'_>,
    ) -> Result<FrameLayout> {
        check_arguments(call.shorty, call.args, call.is_static)?;
        let plan = plan_arguments(call.shorty, call.is_static)?;

        let regs = engine.registers();
        let args_bytes = call.args.len() as u64 * 4;
        let layout = FrameLayout::compute(regs.sp(), args_bytes, engine.stack_base())?;

        let mut callee_saved = [0; CALLEE_SAVED_COUNT];
        for (i, value) in callee_saved.iter_mut().enumerate() {
            *value = regs.read_x(FIRST_CALLEE_SAVED + i as u8);
        }
        let saved = SavedFrame {
            fp: regs.fp(),
            lr: regs.lr(),
            result: call.result,
            shorty: call.shorty.address(),
            sp: layout.saved_sp,
            context: call.context.handle(),
            callee_saved,
        };

        let memory = engine.memory_mut();
        memory.write_u64(layout.sp, 0)?;
        let arg_bytes: Vec<u8> = call.args.iter().flat_map(|slot| slot.to_le_bytes()).collect();
        memory.write_bytes(layout.sp + METHOD_SENTINEL_SIZE, &arg_bytes)?;
        saved.write(memory, layout.fp)?;

        let regs = engine.registers_mut();
        regs.write_x(METHOD_REG, call.method);
        regs.write_x(SELF_REG, call.context.handle());
        regs.write_x(RESULT_REG, call.result);
        regs.write_x(SHORTY_REG, call.shorty.address());
        regs.set_sp(layout.sp);
        // The frame pointer stays valid while the callee spills d8-d15.
        regs.write_x(FP_REG, layout.fp);

        for assignment in plan {
            load_argument(regs, call.args, assignment);
        }

        if self.read_barrier {
            regs.write_w(MARKING_REG, u32::from(call.context.is_gc_marking()));
        }
        Ok(layout)
    }
}

fn load_argument(regs: &mut RegisterFile, args: &[u32], assignment: ArgAssignment) {
    let slot = assignment.slot;
    let wide = || u64::from(args[slot]) | u64::from(args[slot + 1]) << 32;
    match assignment.location {
        ArgLocation::W(r) => regs.write_w(r, args[slot]),
        ArgLocation::X(r) => regs.write_x(r, wide()),
        ArgLocation::S(r) => regs.write_s(r, f32::from_bits(args[slot])),
        ArgLocation::D(r) => regs.write_d(r, f64::from_bits(wide())),
    }
}
