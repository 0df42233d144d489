//! Interfaces the managed runtime provides to the simulator.

/// A callable managed method. Owned by the runtime; only read here.
pub trait MethodDescriptor {
    /// Opaque handle passed to compiled code in x0.
    fn handle(&self) -> u64;

    /// Fully-qualified, human-readable name used by the eligibility policy.
    fn pretty_name(&self) -> String;

    fn is_abstract(&self) -> bool;

    fn is_native(&self) -> bool;

    /// Whether the runtime considers this method a simulation candidate at all.
    fn can_be_simulated(&self) -> bool;

    /// Entry address of the method's compiled code in the simulated address space.
    fn quick_code(&self) -> Option<u64>;
}

/// The thread-like execution context a call runs on.
pub trait ExecutionContext {
    /// Opaque handle passed to compiled code in the self register.
    fn handle(&self) -> u64;

    /// Current value of the context's GC marking flag.
    fn is_gc_marking(&self) -> bool;
}
