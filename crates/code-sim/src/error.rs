use crate::abi::RegisterClass;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid shorty descriptor {shorty:?}: {reason}")]
    InvalidShorty { shorty: String, reason: &'static str },

    #[error("Argument buffer holds {actual} slots but shorty {shorty:?} needs {expected}")]
    ArgumentMismatch {
        shorty: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unsupported call shape {shorty:?}: out of {class} argument registers")]
    UnsupportedCallShape {
        shorty: String,
        class: RegisterClass,
    },

    #[error("Simulated stack overflow: sp {sp:#x} below stack base {base:#x}")]
    StackOverflow { sp: u64, base: u64 },

    #[error("Method {0} has no compiled code")]
    NoCompiledCode(String),

    #[error("Memory fault: {size}-byte access at {address:#x}")]
    MemoryFault { address: u64, size: usize },

    #[error("Region at {base:#x} ({len} bytes) extends past the end of the address space")]
    AddressOverflow { base: u64, len: usize },

    #[error("Region at {base:#x} ({len} bytes) overlaps an existing mapping")]
    RegionOverlap { base: u64, len: usize },

    #[error("Undefined instruction {word:#010x} at {pc:#x}")]
    UndefinedInstruction { pc: u64, word: u32 },

    #[error("Breakpoint #{imm} at {pc:#x}")]
    Breakpoint { pc: u64, imm: u16 },

    #[error("Step limit of {0} instructions exceeded")]
    StepLimitExceeded(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
