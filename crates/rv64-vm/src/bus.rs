//! System bus: routes a physical (address, width) access to exactly one
//! device or to RAM. The regions are disjoint; every device lives below
//! `RAM_BASE`.

use crate::devices::clint::{Clint, CLINT_BASE, CLINT_SIZE};
use crate::devices::disk::{Disk, DISK_BASE, DISK_SIZE};
use crate::devices::kbd::{Kbd, KBD_BASE, KBD_SIZE};
use crate::devices::plic::{Plic, PLIC_BASE, PLIC_SIZE};
use crate::devices::uart::{Uart, UART_BASE, UART_SIZE};
use crate::exception::Exception;
use crate::mem::{Ram, RAM_BASE};

/// 8 bits. 1 byte.
pub const BYTE: u8 = 8;
/// 16 bits. 2 bytes.
pub const HALFWORD: u8 = 16;
/// 32 bits. 4 bytes.
pub const WORD: u8 = 32;
/// 64 bits. 8 bytes.
pub const DOUBLEWORD: u8 = 64;

/// The system bus and everything hanging off it.
#[derive(Debug)]
pub struct Bus {
    pub clint: Clint,
    pub plic: Plic,
    pub uart: Uart,
    pub disk: Disk,
    pub kbd: Kbd,
    pub ram: Ram,
}

impl Bus {
    pub fn new(kernel: &[u8], disk_image: Option<Vec<u8>>) -> Self {
        Self {
            clint: Clint::new(),
            plic: Plic::new(),
            uart: Uart::new(),
            disk: Disk::new(disk_image),
            kbd: Kbd::new(),
            ram: Ram::new(kernel),
        }
    }

    /// Read `size`-bit data from the device claiming `addr`.
    pub fn read(&mut self, addr: u64, size: u8) -> Result<u64, Exception> {
        match addr {
            CLINT_BASE..=CLINT_END => self.clint.read(addr, size),
            PLIC_BASE..=PLIC_END => self.plic.read(addr, size),
            UART_BASE..=UART_END => self.uart.read(addr, size),
            DISK_BASE..=DISK_END => self.disk.read(addr, size),
            KBD_BASE..=KBD_END => self.kbd.read(addr, size),
            addr if addr >= RAM_BASE => self.ram.read(addr, size),
            _ => Err(Exception::LoadAccessFault),
        }
    }

    /// Write `size`-bit data to the device claiming `addr`.
    pub fn write(&mut self, addr: u64, value: u64, size: u8) -> Result<(), Exception> {
        match addr {
            CLINT_BASE..=CLINT_END => self.clint.write(addr, value, size),
            PLIC_BASE..=PLIC_END => self.plic.write(addr, value, size),
            UART_BASE..=UART_END => self.uart.write(addr, value, size),
            DISK_BASE..=DISK_END => self.disk.write(addr, value, size),
            KBD_BASE..=KBD_END => self.kbd.write(addr, value, size),
            addr if addr >= RAM_BASE => self.ram.write(addr, value, size),
            _ => Err(Exception::StoreAMOAccessFault),
        }
    }
}

const CLINT_END: u64 = CLINT_BASE + CLINT_SIZE - 1;
const PLIC_END: u64 = PLIC_BASE + PLIC_SIZE - 1;
const UART_END: u64 = UART_BASE + UART_SIZE - 1;
const DISK_END: u64 = DISK_BASE + DISK_SIZE - 1;
const KBD_END: u64 = KBD_BASE + KBD_SIZE - 1;
