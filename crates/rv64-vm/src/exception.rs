//! Architectural exceptions raised by fetch, execute and translation.

use thiserror::Error;

/// All exception kinds a hart can raise. The discriminant-bearing variants
/// carry the offending instruction or virtual address for diagnostics only;
/// `mtval`/`stval` are written as zero at trap time.
#[derive(Error, Debug, PartialEq, Copy, Clone)]
pub enum Exception {
    #[error("instruction address misaligned")]
    InstructionAddressMisaligned,
    #[error("instruction access fault")]
    InstructionAccessFault,
    #[error("illegal instruction {0:#010x}")]
    IllegalInstruction(u64),
    #[error("breakpoint")]
    Breakpoint,
    #[error("load address misaligned")]
    LoadAddressMisaligned,
    #[error("load access fault")]
    LoadAccessFault,
    #[error("store/AMO address misaligned")]
    StoreAMOAddressMisaligned,
    #[error("store/AMO access fault")]
    StoreAMOAccessFault,
    #[error("environment call from U-mode")]
    EnvironmentCallFromUMode,
    #[error("environment call from S-mode")]
    EnvironmentCallFromSMode,
    #[error("environment call from M-mode")]
    EnvironmentCallFromMMode,
    #[error("instruction page fault at {0:#018x}")]
    InstructionPageFault(u64),
    #[error("load page fault at {0:#018x}")]
    LoadPageFault(u64),
    #[error("store/AMO page fault at {0:#018x}")]
    StoreAMOPageFault(u64),
}

impl Exception {
    /// The exception code written to `mcause`/`scause`.
    pub fn code(&self) -> u64 {
        match self {
            Exception::InstructionAddressMisaligned => 0,
            Exception::InstructionAccessFault => 1,
            Exception::IllegalInstruction(_) => 2,
            Exception::Breakpoint => 3,
            Exception::LoadAddressMisaligned => 4,
            Exception::LoadAccessFault => 5,
            Exception::StoreAMOAddressMisaligned => 6,
            Exception::StoreAMOAccessFault => 7,
            Exception::EnvironmentCallFromUMode => 8,
            Exception::EnvironmentCallFromSMode => 9,
            Exception::EnvironmentCallFromMMode => 11,
            Exception::InstructionPageFault(_) => 12,
            Exception::LoadPageFault(_) => 13,
            Exception::StoreAMOPageFault(_) => 15,
        }
    }

    /// Misaligned and access-fault conditions are delivered as a trap once,
    /// then reported to the outer program, which terminates the process.
    /// Everything else is handled by the guest kernel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Exception::InstructionAddressMisaligned
                | Exception::InstructionAccessFault
                | Exception::LoadAddressMisaligned
                | Exception::LoadAccessFault
                | Exception::StoreAMOAddressMisaligned
                | Exception::StoreAMOAccessFault
        )
    }
}
