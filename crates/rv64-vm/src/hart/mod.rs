//! The hart: one hardware thread of RV64 execution, with its privileged
//! state machine, Sv39 translation and the interrupt/device-claim protocol.

use crate::{
    bus::{Bus, BYTE, DOUBLEWORD, WORD},
    devices::{
        disk::{
            DISK_BUFFER_ADDR_HI, DISK_BUFFER_ADDR_LO, DISK_BUFFER_LEN_HI, DISK_BUFFER_LEN_LO,
            DISK_DIRECTION, DISK_DONE, DISK_IRQ, DISK_SECTOR, SECTOR_SIZE,
        },
        uart::UART_IRQ,
    },
    exception::Exception,
    hart::execute::execute_general,
    interrupt::Interrupt,
    mem::RAM_BASE,
    reg::{
        csr::{
            State, MCAUSE, MEDELEG, MEIP_BIT, MEPC, MIDELEG, MIE, MIP, MSIP_BIT, MSTATUS_MIE,
            MSTATUS_MPIE, MSTATUS_MPP, MTIP_BIT, MTVAL, MTVEC, SATP, SCAUSE, SEIP_BIT, SEPC,
            SSIP_BIT, STIP_BIT, STVAL, STVEC, XSTATUS_SIE, XSTATUS_SPIE, XSTATUS_SPP,
        },
        IntRegister,
    },
};
use tracing::{debug, trace};

pub mod execute;

/// The page size (4 KiB) for the virtual memory system.
const PAGE_SIZE: u64 = 4096;

/// Access type used in the virtual address translation process. It decides
/// which exception is raised on a failed walk (InstructionPageFault,
/// LoadPageFault or StoreAMOPageFault).
#[derive(Debug, PartialEq, PartialOrd)]
pub enum AccessType {
    /// Raises InstructionPageFault. Used for an instruction fetch.
    Instruction,
    /// Raises LoadPageFault.
    Load,
    /// Raises StoreAMOPageFault.
    Store,
}

/// The privileged mode.
#[derive(Debug, PartialEq, PartialOrd, Eq, Copy, Clone)]
pub enum Mode {
    User = 0b00,
    Supervisor = 0b01,
    Machine = 0b11,
}

/// A trap cause: either a synchronous exception or an asynchronous
/// interrupt chosen at the end-of-step poll.
#[derive(Debug, PartialEq, Copy, Clone)]
pub enum Trap {
    Exception(Exception),
    Interrupt(Interrupt),
}

impl Trap {
    /// The value written to `mcause`/`scause`.
    pub fn cause(&self) -> u64 {
        match self {
            Trap::Exception(e) => e.code(),
            Trap::Interrupt(i) => i.cause(),
        }
    }

    /// The cause with the interrupt bit stripped: the delegation-register
    /// bit index and the vectored-dispatch slot.
    pub fn code(&self) -> u64 {
        match self {
            Trap::Exception(e) => e.code(),
            Trap::Interrupt(i) => i.code(),
        }
    }

    pub fn is_interrupt(&self) -> bool {
        matches!(self, Trap::Interrupt(_))
    }
}

/// A single RV64IMA hardware thread.
#[derive(Debug)]
pub struct Hart {
    /// Integer registers.
    pub regs: IntRegister,
    /// Program counter. Advanced past the current instruction before
    /// execute runs, so control-flow instructions compensate with
    /// `imm - 4` and the trap EPC is `pc - 4`.
    pub pc: u64,
    /// Control and status registers (CSR).
    pub state: State,
    /// Privilege level.
    pub mode: Mode,
    /// System bus.
    pub bus: Bus,
    /// Sv39 paging flag, cached from the last `satp` write.
    enable_paging: bool,
    /// Physical page number (PPN) x PAGE_SIZE (4096), cached from `satp`.
    page_table: u64,
}

impl Hart {
    /// Create a hart with the kernel image in RAM and the boot register
    /// state: `pc` at the bottom of RAM, `sp` at the top, machine mode.
    pub fn new(kernel: &[u8], disk_image: Option<Vec<u8>>) -> Hart {
        Hart {
            regs: IntRegister::new(),
            pc: RAM_BASE,
            state: State::new(),
            mode: Mode::Machine,
            bus: Bus::new(kernel, disk_image),
            enable_paging: false,
            page_table: 0,
        }
    }

    /// Run one step: fetch, advance the PC, execute, poll interrupts, take
    /// any resulting trap. A fatal exception is delivered as a trap first
    /// and then returned so the outer program can terminate.
    pub fn step(&mut self) -> Result<(), Exception> {
        if let Err(exception) = self.execute_cycle() {
            self.take_trap(Trap::Exception(exception));
            if exception.is_fatal() {
                return Err(exception);
            }
        }

        if let Some(interrupt) = self.check_pending_interrupt() {
            self.take_trap(Trap::Interrupt(interrupt));
        }

        Ok(())
    }

    fn execute_cycle(&mut self) -> Result<(), Exception> {
        let inst = self.fetch()?;
        self.pc = self.pc.wrapping_add(4);
        execute_general(self, inst)
    }

    /// Check whether device activity should become an interrupt, following
    /// the claim protocol: UART first, then the disk (whose outstanding
    /// transfer is performed now), then the highest-priority bit pending in
    /// both `mie` and `mip`. The chosen bit is cleared on delivery.
    pub fn check_pending_interrupt(&mut self) -> Option<Interrupt> {
        // "When a hart is executing in privilege mode x, interrupts are
        // globally enabled when xIE=1 and globally disabled when xIE=0."
        match self.mode {
            Mode::Machine => {
                if self.state.read_mstatus(MSTATUS_MIE) == 0 {
                    return None;
                }
            }
            Mode::Supervisor => {
                if self.state.read_sstatus(XSTATUS_SIE) == 0 {
                    return None;
                }
            }
            _ => {}
        }

        // Check external interrupts for the UART and the disk.
        let irq;
        if self.bus.uart.is_interrupting() {
            irq = UART_IRQ;
        } else if self.bus.disk.is_notifying() {
            // The requested transfer runs now, between instructions; the
            // interrupt tells the guest it completed.
            self.disk_access().expect("failed to access the disk");
            irq = DISK_IRQ;
        } else {
            irq = 0;
        }

        if irq != 0 {
            self.bus.plic.update_claim(irq as u32);
            self.state.write(MIP, self.state.read(MIP) | SEIP_BIT);
        }

        // The timer registers are guest-driven; surface the pending bit
        // whenever the comparison holds.
        if self.bus.clint.is_interrupting() {
            self.state.write(MIP, self.state.read(MIP) | MTIP_BIT);
        }

        // "An interrupt i will be taken if bit i is set in both mip and
        // mie, and if interrupts are globally enabled."
        let pending = self.state.read(MIE) & self.state.read(MIP);

        if (pending & MEIP_BIT) != 0 {
            self.state.write(MIP, self.state.read(MIP) & !MEIP_BIT);
            return Some(Interrupt::MachineExternalInterrupt);
        }
        if (pending & MSIP_BIT) != 0 {
            self.state.write(MIP, self.state.read(MIP) & !MSIP_BIT);
            return Some(Interrupt::MachineSoftwareInterrupt);
        }
        if (pending & MTIP_BIT) != 0 {
            self.state.write(MIP, self.state.read(MIP) & !MTIP_BIT);
            return Some(Interrupt::MachineTimerInterrupt);
        }
        if (pending & SEIP_BIT) != 0 {
            self.state.write(MIP, self.state.read(MIP) & !SEIP_BIT);
            return Some(Interrupt::SupervisorExternalInterrupt);
        }
        if (pending & SSIP_BIT) != 0 {
            self.state.write(MIP, self.state.read(MIP) & !SSIP_BIT);
            return Some(Interrupt::SupervisorSoftwareInterrupt);
        }
        if (pending & STIP_BIT) != 0 {
            self.state.write(MIP, self.state.read(MIP) & !STIP_BIT);
            return Some(Interrupt::SupervisorTimerInterrupt);
        }

        None
    }

    /// Perform the DMA transfer the guest requested through the disk
    /// registers: a byte-granular copy between RAM and the backing image,
    /// driven through the bus so the register reads follow the device's
    /// access contract.
    fn disk_access(&mut self) -> Result<(), Exception> {
        let addr_lo = self.bus.read(DISK_BUFFER_ADDR_LO, WORD)?;
        let addr_hi = self.bus.read(DISK_BUFFER_ADDR_HI, WORD)?;
        let len_lo = self.bus.read(DISK_BUFFER_LEN_LO, WORD)?;
        let len_hi = self.bus.read(DISK_BUFFER_LEN_HI, WORD)?;
        let buffer_addr = (addr_hi << 32) | addr_lo;
        let buffer_len = (len_hi << 32) | len_lo;
        let sector = self.bus.read(DISK_SECTOR, WORD)?;
        let direction = self.bus.read(DISK_DIRECTION, WORD)?;

        debug!(
            sector,
            len = buffer_len,
            to_disk = direction == 1,
            "disk transfer"
        );

        if direction == 1 {
            // RAM to disk.
            for i in 0..buffer_len {
                let byte = self.bus.read(buffer_addr + i, BYTE)?;
                self.bus
                    .disk
                    .set_image_byte(sector * SECTOR_SIZE + i, byte as u8);
            }
        } else {
            // Disk to RAM.
            for i in 0..buffer_len {
                let byte = self.bus.disk.image_byte(sector * SECTOR_SIZE + i);
                self.bus.write(buffer_addr + i, byte as u64, BYTE)?;
            }
        }

        self.bus.write(DISK_DONE, 0, WORD)?;
        self.bus.disk.clear_notify();
        Ok(())
    }

    /// Deliver a trap: pick the target privilege through the delegation
    /// registers, record the cause and the faulting PC, and swap the
    /// interrupt-enable stack.
    pub fn take_trap(&mut self, trap: Trap) {
        // The PC was advanced past the trapping instruction before execute
        // ran, so the recorded EPC steps back.
        let exception_pc = self.pc.wrapping_sub(4);
        let previous_mode = self.mode;

        let cause = trap.cause();
        let code = trap.code();
        trace!("trap: cause={cause:#x} epc={exception_pc:#x}");

        // Exceptions delegate through medeleg, interrupts through mideleg,
        // both indexed by the code.
        let deleg = if trap.is_interrupt() {
            self.state.read(MIDELEG)
        } else {
            self.state.read(MEDELEG)
        };

        if previous_mode <= Mode::Supervisor && ((deleg >> code) & 1) == 1 {
            // Trap to S-mode.
            self.mode = Mode::Supervisor;

            // For a vectored trap vector, interrupts dispatch to
            // base + 4 x code; exceptions always use the base.
            let vector = self.state.read(STVEC);
            self.pc = if trap.is_interrupt() && (vector & 1) == 1 {
                (vector & !1).wrapping_add(4 * code)
            } else {
                vector & !1
            };

            self.state.write(SEPC, exception_pc & !1);
            self.state.write(SCAUSE, cause);
            self.state.write(STVAL, 0);

            // Save the interrupt-enable bit into SPIE, disable interrupts,
            // and remember the interrupted privilege in SPP.
            self.state
                .write_sstatus(XSTATUS_SPIE, self.state.read_sstatus(XSTATUS_SIE));
            self.state.write_sstatus(XSTATUS_SIE, 0);
            self.state.write_sstatus(
                XSTATUS_SPP,
                match previous_mode {
                    Mode::User => 0,
                    _ => 1,
                },
            );
        } else {
            // Trap to M-mode.
            self.mode = Mode::Machine;

            let vector = self.state.read(MTVEC);
            self.pc = if trap.is_interrupt() && (vector & 1) == 1 {
                (vector & !1).wrapping_add(4 * code)
            } else {
                vector & !1
            };

            self.state.write(MEPC, exception_pc & !1);
            self.state.write(MCAUSE, cause);
            self.state.write(MTVAL, 0);

            self.state
                .write_mstatus(MSTATUS_MPIE, self.state.read_mstatus(MSTATUS_MIE));
            self.state.write_mstatus(MSTATUS_MIE, 0);
            self.state
                .write_mstatus(MSTATUS_MPP, previous_mode as u64);
        }
    }

    /// Refresh the cached physical page number and addressing mode. Called
    /// on every write to `satp`.
    pub fn update_paging(&mut self) {
        // The PPN of the root page table: its physical address divided by
        // 4 KiB.
        self.page_table = self.state.read_bits(SATP, ..44) * PAGE_SIZE;

        // The MODE field selects the address-translation scheme; 8 is Sv39.
        let mode = self.state.read_bits(SATP, 60..);
        self.enable_paging = mode == 8;
    }

    /// The cached paging state, as derived from the last `satp` write.
    pub fn paging(&self) -> (bool, u64) {
        (self.enable_paging, self.page_table)
    }

    /// Translate a virtual address to a physical address through the Sv39
    /// three-level walk. The identity map applies while paging is off.
    fn translate(&mut self, addr: u64, access_type: AccessType) -> Result<u64, Exception> {
        if !self.enable_paging {
            return Ok(addr);
        }

        let page_fault = |access_type: &AccessType| match access_type {
            AccessType::Instruction => Exception::InstructionPageFault(addr),
            AccessType::Load => Exception::LoadPageFault(addr),
            AccessType::Store => Exception::StoreAMOPageFault(addr),
        };

        // A 39-bit virtual address is three 9-bit VPN indices over a 12-bit
        // page offset.
        let vpn = [
            (addr >> 12) & 0x1ff,
            (addr >> 21) & 0x1ff,
            (addr >> 30) & 0x1ff,
        ];

        let mut a = self.page_table;
        let mut i: i64 = 2;
        let pte = loop {
            let pte = self.bus.read(a + vpn[i as usize] * 8, DOUBLEWORD)?;

            // "If pte.v = 0, or if pte.r = 0 and pte.w = 1, stop and raise
            // a page-fault exception corresponding to the original access
            // type."
            let v = pte & 1;
            let r = (pte >> 1) & 1;
            let w = (pte >> 2) & 1;
            let x = (pte >> 3) & 1;
            if v == 0 || (r == 0 && w == 1) {
                return Err(page_fault(&access_type));
            }

            // A leaf has R or X set; anything else points at the next
            // level of the table.
            if r == 1 || x == 1 {
                break pte;
            }
            i -= 1;
            if i < 0 {
                return Err(page_fault(&access_type));
            }
            let ppn = (pte >> 10) & 0x0fff_ffff_ffff;
            a = ppn * PAGE_SIZE;
        };

        // A leaf above level 0 is a superpage; the low VPN indices come
        // from the virtual address.
        let ppn = [
            (pte >> 10) & 0x1ff,
            (pte >> 19) & 0x1ff,
            (pte >> 28) & 0x03ff_ffff,
        ];
        let offset = addr & 0xfff;
        match i {
            0 => {
                let ppn = (pte >> 10) & 0x0fff_ffff_ffff;
                Ok((ppn << 12) | offset)
            }
            1 => Ok((ppn[2] << 30) | (ppn[1] << 21) | (vpn[0] << 12) | offset),
            2 => Ok((ppn[2] << 30) | (vpn[1] << 21) | (vpn[0] << 12) | offset),
            _ => Err(page_fault(&access_type)),
        }
    }

    /// Read `size`-bit data through address translation and the bus.
    fn read(&mut self, v_addr: u64, size: u8) -> Result<u64, Exception> {
        let p_addr = self.translate(v_addr, AccessType::Load)?;
        self.bus.read(p_addr, size)
    }

    /// Write `size`-bit data through address translation and the bus.
    fn write(&mut self, v_addr: u64, value: u64, size: u8) -> Result<(), Exception> {
        let p_addr = self.translate(v_addr, AccessType::Store)?;
        self.bus.write(p_addr, value, size)
    }

    /// Fetch the next instruction at the current program counter.
    fn fetch(&mut self) -> Result<u64, Exception> {
        // Compressed instructions are not supported, so every fetch must be
        // 32-bit aligned.
        if self.pc % 4 != 0 {
            return Err(Exception::InstructionAddressMisaligned);
        }

        let p_pc = self.translate(self.pc, AccessType::Instruction)?;

        // A failed read surfaces as an instruction fault, not a load fault.
        match self.bus.read(p_pc, WORD) {
            Ok(value) => Ok(value),
            Err(_) => Err(Exception::InstructionAccessFault),
        }
    }
}
