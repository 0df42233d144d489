//! Public entry point: run a managed method's compiled arm64 code on the simulator.
//!
//! ```text
//!   policy check -> frame builder -> engine run -> result extraction -> reset
//!                                      |    ^
//!                                      v    |
//!                                   call bridge (runtime entry points)
//! ```

use tracing::debug;

use crate::a64::A64Simulator;
use crate::abi::{DEFAULT_STACK_SIZE, RETURN_REG};
use crate::bridge::{CallBridge, EntryPoints};
use crate::engine::Engine;
use crate::frame::{CallSite, FrameBuilder};
use crate::policy::SimulationPolicy;
use crate::result::{JValue, extract_result};
use crate::runtime::{ExecutionContext, MethodDescriptor};
use crate::shorty::Shorty;
use crate::{Error, Result};

/// Whether this host can simulate at all.
///
/// Frame construction passes host pointers (the result slot and the shorty)
/// through 64-bit simulated registers.
pub const CAN_SIMULATE: bool = cfg!(target_pointer_width = "64");

/// Options for a [`CodeSimulator`].
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    /// Size in bytes of the simulated stack.
    pub stack_size: usize,
    /// Abort a run after this many instructions.
    pub max_steps: Option<u64>,
    /// Trace every executed instruction.
    pub trace: bool,
    /// Refresh the marking register from the context before entry.
    pub read_barrier: bool,
    pub policy: SimulationPolicy,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            max_steps: None,
            trace: false,
            read_barrier: true,
            policy: SimulationPolicy::default(),
        }
    }
}

impl SimulatorOptions {
    #[must_use]
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: Option<u64>) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    #[must_use]
    pub fn with_read_barrier(mut self, read_barrier: bool) -> Self {
        self.read_barrier = read_barrier;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: SimulationPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Simulator bound to one engine instance. Not shareable across threads.
pub struct CodeSimulator<E: Engine = A64Simulator> {
    engine: E,
    bridge: CallBridge,
    frames: FrameBuilder,
    options: SimulatorOptions,
}

impl CodeSimulator {
    /// A simulator with default options, or `None` when [`CAN_SIMULATE`] is false.
    #[must_use]
    pub fn create() -> Option<Self> {
        Self::with_options(SimulatorOptions::default())
    }

    #[must_use]
    pub fn with_options(options: SimulatorOptions) -> Option<Self> {
        let engine = A64Simulator::new(options.stack_size)
            .with_max_steps(options.max_steps)
            .with_trace(options.trace);
        Self::with_engine(engine, options)
    }
}

impl<E: Engine> CodeSimulator<E> {
    /// Wrap an existing engine. `options.stack_size`, `max_steps` and `trace`
    /// are the engine's business and are not applied here.
    #[must_use]
    pub fn with_engine(engine: E, options: SimulatorOptions) -> Option<Self> {
        CAN_SIMULATE.then(|| Self {
            engine,
            bridge: CallBridge::new(),
            frames: FrameBuilder::new(options.read_barrier),
            options,
        })
    }

    /// Install the runtime entry points. Must be called once, before any run.
    pub fn install_entry_points(&self, entry_points: &EntryPoints) {
        self.bridge.install(entry_points);
    }

    /// Place compiled code at `base` in the simulated address space.
    pub fn map_code(&mut self, base: u64, words: &[u32]) -> Result<()> {
        self.engine.memory_mut().map_words(base, words)
    }

    /// Eligibility decision for `method`, by its pretty name.
    #[must_use]
    pub fn can_simulate(&self, method: &dyn MethodDescriptor) -> bool {
        self.options.policy.can_simulate(&method.pretty_name())
    }

    /// Run `method` with the packed `args` and store its return value in `result`.
    ///
    /// The engine is reset and the stack pointer restored afterwards, also
    /// when the call fails; `result` is only written on success.
    pub fn invoke(
        &mut self,
        method: &dyn MethodDescriptor,
        args: &[u32],
        context: &dyn ExecutionContext,
        result: &mut JValue,
        shorty: &Shorty,
        is_static: bool,
    ) -> Result<()> {
        debug_assert!(!method.is_abstract(), "abstract methods have no code");
        debug_assert!(!method.is_native(), "native methods run natively");
        debug_assert!(method.can_be_simulated(), "method is not a simulation candidate");

        let name = method.pretty_name();
        debug!(method = %name, %shorty, is_static, "simulate");
        let entry = method.quick_code().ok_or(Error::NoCompiledCode(name))?;

        let call = CallSite {
            method: method.handle(),
            args,
            context,
            result: std::ptr::from_mut(result) as u64,
            shorty,
            is_static,
        };
        let saved_sp = self.engine.registers().sp();
        let outcome = self
            .frames
            .build(&mut self.engine, &call)
            .and_then(|_| self.engine.run_from(entry, &self.bridge));
        if outcome.is_ok() {
            extract_result(result, shorty.return_type(), self.engine.registers());
        }

        self.engine.reset_state();
        self.engine.registers_mut().set_sp(saved_sp);
        outcome
    }

    /// Run from `address` without building a frame. Registers are left as
    /// the code leaves them; read them with the `c_return_*` accessors.
    pub fn run_from(&mut self, address: u64) -> Result<()> {
        self.engine.run_from(address, &self.bridge)
    }

    #[must_use]
    pub fn c_return_bool(&self) -> bool {
        self.engine.registers().read_w(RETURN_REG) != 0
    }

    #[must_use]
    pub fn c_return_i32(&self) -> i32 {
        self.engine.registers().read_w(RETURN_REG) as i32
    }

    #[must_use]
    pub fn c_return_i64(&self) -> i64 {
        self.engine.registers().read_x(RETURN_REG) as i64
    }

    #[must_use]
    pub fn c_return_ptr(&self) -> u64 {
        self.engine.registers().read_x(RETURN_REG)
    }

    #[must_use]
    pub fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    #[must_use]
    pub fn bridge(&self) -> &CallBridge {
        &self.bridge
    }

    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }
}
