//! Asynchronous interrupts delivered at the end-of-step poll.

/// The interrupt kinds this machine can deliver, one per bit shared by
/// `mie`/`mip`.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Interrupt {
    SupervisorSoftwareInterrupt,
    MachineSoftwareInterrupt,
    SupervisorTimerInterrupt,
    MachineTimerInterrupt,
    SupervisorExternalInterrupt,
    MachineExternalInterrupt,
}

impl Interrupt {
    /// The interrupt code, which doubles as the bit index in `mie`/`mip`.
    pub fn code(&self) -> u64 {
        match self {
            Interrupt::SupervisorSoftwareInterrupt => 1,
            Interrupt::MachineSoftwareInterrupt => 3,
            Interrupt::SupervisorTimerInterrupt => 5,
            Interrupt::MachineTimerInterrupt => 7,
            Interrupt::SupervisorExternalInterrupt => 9,
            Interrupt::MachineExternalInterrupt => 11,
        }
    }

    /// The value written to `mcause`/`scause`: the code with the interrupt
    /// bit set.
    pub fn cause(&self) -> u64 {
        (1 << 63) | self.code()
    }
}
